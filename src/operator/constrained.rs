use crate::constraint::ConstraintSet;
use crate::error::OperatorError;
use crate::layout::Layout;
use crate::operator::{LinearOperator, OperatorRef, Ownership};
use crate::vector::DeviceVector;
use ferroform_traits::Real;
use std::cell::RefCell;

/// Enforces essential boundary conditions on a square operator by elimination.
///
/// Partitioning the degrees of freedom into the constrained set $S$ and the free set $F$, the
/// constrained operator acts as
///
/// $$
/// \begin{pmatrix} I & 0 \\\\ 0 & A_{FF} \end{pmatrix},
/// $$
///
/// i.e. it is the identity on constrained rows and the native action of $A$ on free rows, with
/// all coupling between the two removed. The coupling is moved to the right-hand side by
/// [`eliminate_rhs`](Self::eliminate_rhs). The constrained operator is symmetric positive
/// (semi-)definite whenever $A$ is.
///
/// The operator holds private scratch buffers and is therefore not `Sync`. Calls on the same
/// instance are serialized by construction.
#[derive(Debug)]
pub struct ConstrainedOperator<'a, T: Real> {
    a: OperatorRef<'a, T>,
    constraints: ConstraintSet,
    z: RefCell<DeviceVector<T>>,
    w: RefCell<DeviceVector<T>>,
}

impl<'a, T: Real> ConstrainedOperator<'a, T> {
    /// Wraps `a` with the given constraints.
    ///
    /// # Errors
    ///
    /// Fails with [`OperatorError::LayoutMismatch`] if `a` is not square (its input and output
    /// layouts differ), and with [`OperatorError::InvalidArgument`] if the constraint set does not
    /// refer into a space of the size of `a`.
    pub fn new(a: OperatorRef<'a, T>, constraints: ConstraintSet) -> Result<Self, OperatorError> {
        a.in_layout().check("output", a.out_layout())?;
        if constraints.global_size() != a.in_layout().len() {
            return Err(OperatorError::invalid_argument(
                "constraints",
                format!(
                    "constraint set refers into {} degrees of freedom, but the operator acts on {}",
                    constraints.global_size(),
                    a.in_layout().len()
                ),
            ));
        }

        let layout = a.out_layout().clone();
        Ok(Self {
            a,
            constraints,
            z: RefCell::new(DeviceVector::zeros(layout.clone())),
            w: RefCell::new(DeviceVector::zeros(layout)),
        })
    }

    /// Wraps an operator that the constrained operator takes ownership of.
    pub fn owned(a: Box<dyn LinearOperator<T> + 'a>, constraints: ConstraintSet) -> Result<Self, OperatorError> {
        Self::new(OperatorRef::Owned(a), constraints)
    }

    /// Wraps a borrowed operator.
    pub fn borrowed(a: &'a dyn LinearOperator<T>, constraints: ConstraintSet) -> Result<Self, OperatorError> {
        Self::new(OperatorRef::Borrowed(a), constraints)
    }

    /// The wrapped operator.
    pub fn inner(&self) -> &(dyn LinearOperator<T> + 'a) {
        &*self.a
    }

    pub fn ownership(&self) -> Ownership {
        self.a.ownership()
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// Eliminates the constrained degrees of freedom from the right-hand side `b`.
    ///
    /// `x` holds the prescribed values at the constrained indices; its other entries are ignored.
    /// On return, `b` holds `b - A w` on free rows, where `w` equals `x` on constrained indices and
    /// zero elsewhere, and exactly the prescribed values on constrained rows.
    pub fn eliminate_rhs(&self, x: &DeviceVector<T>, b: &mut DeviceVector<T>) -> Result<(), OperatorError> {
        self.in_layout().check("x", x.layout())?;
        self.out_layout().check("b", b.layout())?;

        let w = &mut *self.w.borrow_mut();
        let z = &mut *self.z.borrow_mut();

        w.fill(T::zero());
        if !self.constraints.is_empty() {
            w.map_dofs(x, &self.constraints)?;
        }
        self.a.mult(w, z)?;
        b.axpby(T::one(), -T::one(), z)?;
        if !self.constraints.is_empty() {
            b.map_dofs(x, &self.constraints)?;
        }
        Ok(())
    }
}

impl<'a, T: Real> LinearOperator<T> for ConstrainedOperator<'a, T> {
    fn in_layout(&self) -> &Layout {
        self.a.in_layout()
    }

    fn out_layout(&self) -> &Layout {
        self.a.out_layout()
    }

    fn apply(&self, x: &DeviceVector<T>, y: &mut DeviceVector<T>) -> Result<(), OperatorError> {
        if self.constraints.is_empty() {
            return self.a.mult(x, y);
        }

        let z = &mut *self.z.borrow_mut();
        z.assign(x)?;
        z.clear_dofs(&self.constraints)?;
        self.a.mult(z, y)?;
        y.map_dofs(x, &self.constraints)
    }

    /// The transpose has the same block structure, with $A_{FF}^T$ on the free block.
    fn apply_transpose(&self, x: &DeviceVector<T>, y: &mut DeviceVector<T>) -> Result<(), OperatorError> {
        if self.constraints.is_empty() {
            return self.a.mult_transpose(x, y);
        }

        let z = &mut *self.z.borrow_mut();
        z.assign(x)?;
        z.clear_dofs(&self.constraints)?;
        self.a.mult_transpose(z, y)?;
        y.map_dofs(x, &self.constraints)
    }
}
