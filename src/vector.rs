//! Numeric buffers bound to a [`Layout`].
use crate::constraint::ConstraintSet;
use crate::error::OperatorError;
use crate::layout::{Context, Layout};
use ferroform_traits::Real;
use nalgebra::{DVector, Scalar};

pub mod kernels;

/// A vector whose buffer is bound to exactly one [`Layout`].
///
/// All binary operations check operand layouts before touching any data, and fail with
/// [`OperatorError::LayoutMismatch`] if they differ.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceVector<T: Scalar> {
    layout: Layout,
    data: DVector<T>,
}

impl<T: Real> DeviceVector<T> {
    pub fn zeros(layout: Layout) -> Self {
        let data = DVector::zeros(layout.len());
        Self { layout, data }
    }

    pub fn from_vec(layout: Layout, values: Vec<T>) -> Result<Self, OperatorError> {
        if values.len() != layout.len() {
            return Err(OperatorError::invalid_argument(
                "values",
                format!("expected {} values for layout, got {}", layout.len(), values.len()),
            ));
        }
        Ok(Self {
            layout,
            data: DVector::from_vec(values),
        })
    }

    pub fn from_slice(context: &Context, values: &[T]) -> Self {
        Self {
            layout: Layout::new(values.len(), context.clone()),
            data: DVector::from_column_slice(values),
        }
    }

    pub fn from_dvector(context: &Context, data: DVector<T>) -> Self {
        Self {
            layout: Layout::new(data.len(), context.clone()),
            data,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn context(&self) -> &Context {
        self.layout.context()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        self.data.as_slice()
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.data.as_mut_slice()
    }

    pub fn as_dvector(&self) -> &DVector<T> {
        &self.data
    }

    pub fn into_dvector(self) -> DVector<T> {
        self.data
    }

    /// Mutable access to the underlying storage for matrix-backed kernels.
    ///
    /// The length of the returned vector must not be changed.
    pub(crate) fn data_mut(&mut self) -> &mut DVector<T> {
        &mut self.data
    }

    pub fn fill(&mut self, value: T) {
        kernels::fill(self.layout.context(), self.data.as_mut_slice(), value);
    }

    /// `self = other`.
    pub fn assign(&mut self, other: &DeviceVector<T>) -> Result<(), OperatorError> {
        self.layout.check("other", &other.layout)?;
        kernels::copy(self.layout.context(), self.data.as_mut_slice(), other.as_slice());
        Ok(())
    }

    /// `self = alpha * self + beta * y`.
    pub fn axpby(&mut self, alpha: T, beta: T, y: &DeviceVector<T>) -> Result<(), OperatorError> {
        self.layout.check("y", &y.layout)?;
        kernels::axpby(self.layout.context(), self.data.as_mut_slice(), alpha, beta, y.as_slice());
        Ok(())
    }

    pub fn dot(&self, other: &DeviceVector<T>) -> Result<T, OperatorError> {
        self.layout.check("other", &other.layout)?;
        Ok(kernels::dot(self.layout.context(), self.as_slice(), other.as_slice()))
    }

    pub fn norm(&self) -> T {
        kernels::dot(self.layout.context(), self.as_slice(), self.as_slice()).sqrt()
    }

    /// Gathers the entries at `indices` into `dst`, i.e. `dst[i] = self[indices[i]]`.
    ///
    /// `dst` must have `indices.len()` entries on the same context as `self`.
    pub fn get_subvector(&self, indices: &ConstraintSet, dst: &mut DeviceVector<T>) -> Result<(), OperatorError> {
        self.check_indices(indices)?;
        self.layout.with_len(indices.len()).check("dst", &dst.layout)?;
        kernels::get_subvector(
            self.layout.context(),
            dst.data.as_mut_slice(),
            self.as_slice(),
            indices.indices(),
        );
        Ok(())
    }

    /// Allocates a new vector holding the entries at `indices`.
    pub fn subvector(&self, indices: &ConstraintSet) -> Result<DeviceVector<T>, OperatorError> {
        let mut dst = DeviceVector::zeros(self.layout.with_len(indices.len()));
        self.get_subvector(indices, &mut dst)?;
        Ok(dst)
    }

    /// Scatters `src` into the entries at `indices`, i.e. `self[indices[i]] = src[i]`.
    pub fn set_subvector(&mut self, src: &DeviceVector<T>, indices: &ConstraintSet) -> Result<(), OperatorError> {
        self.check_indices(indices)?;
        self.layout.with_len(indices.len()).check("src", &src.layout)?;
        kernels::set_subvector(
            self.layout.context(),
            self.data.as_mut_slice(),
            src.as_slice(),
            indices.indices(),
        );
        Ok(())
    }

    /// Sets the entries at `indices` to zero.
    pub fn clear_dofs(&mut self, indices: &ConstraintSet) -> Result<(), OperatorError> {
        self.check_indices(indices)?;
        kernels::clear_dofs(self.layout.context(), self.data.as_mut_slice(), indices.indices());
        Ok(())
    }

    /// Copies the entries at `indices` from `src` into the same positions of `self`.
    pub fn map_dofs(&mut self, src: &DeviceVector<T>, indices: &ConstraintSet) -> Result<(), OperatorError> {
        self.check_indices(indices)?;
        self.layout.check("src", &src.layout)?;
        kernels::map_dofs(
            self.layout.context(),
            self.data.as_mut_slice(),
            src.as_slice(),
            indices.indices(),
        );
        Ok(())
    }

    fn check_indices(&self, indices: &ConstraintSet) -> Result<(), OperatorError> {
        if indices.global_size() != self.len() {
            Err(OperatorError::invalid_argument(
                "indices",
                format!(
                    "index set refers into {} degrees of freedom, but the vector has {} entries",
                    indices.global_size(),
                    self.len()
                ),
            ))
        } else {
            Ok(())
        }
    }
}
