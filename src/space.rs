//! Finite element spaces as seen by bilinear forms.
//!
//! A bilinear form only needs a small slice of what a finite element space is: the layout of
//! its global vectors, the layout of its element-local vectors, the maps between the two, and
//! optionally a conforming prolongation/restriction pair to a space of unique ("true")
//! degrees of freedom.
use crate::error::OperatorError;
use crate::layout::{Context, Layout};
use crate::operator::{LinearOperator, SparseOperator};
use crate::vector::{kernels, DeviceVector};
use ferroform_traits::Real;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

pub trait FiniteElementSpace<T: Real> {
    /// Layout of global vectors.
    fn layout(&self) -> &Layout;

    /// Layout of element-local vectors, in which degrees of freedom shared by several elements
    /// appear once per element.
    fn element_layout(&self) -> &Layout;

    /// Map from true degrees of freedom to global vectors, if the space has one.
    fn prolongation(&self) -> Option<&dyn LinearOperator<T>>;

    /// Map from global vectors to true degrees of freedom, if the space has one.
    fn restriction(&self) -> Option<&dyn LinearOperator<T>>;

    /// Scatters a global vector into element-local storage, duplicating shared values.
    fn global_to_local(&self, global: &DeviceVector<T>, local: &mut DeviceVector<T>) -> Result<(), OperatorError>;

    /// Gathers element-local storage into a global vector, summing contributions to shared
    /// degrees of freedom. The previous contents of `global` are overwritten.
    fn local_to_global(&self, local: &DeviceVector<T>, global: &mut DeviceVector<T>) -> Result<(), OperatorError>;

    /// Layout of the true degrees of freedom.
    ///
    /// This is the input layout of the prolongation, or [`layout`](Self::layout) if there is no
    /// prolongation.
    fn true_layout(&self) -> &Layout {
        match self.prolongation() {
            Some(p) => p.in_layout(),
            None => self.layout(),
        }
    }
}

/// A finite element space described by the global degrees of freedom of each element.
///
/// Element-local vectors store the degrees of freedom of element 0, followed by those of
/// element 1, and so on.
#[derive(Debug, Clone)]
pub struct ElementDofSpace<T: Real> {
    layout: Layout,
    element_layout: Layout,
    element_offsets: Vec<usize>,
    element_dofs: Vec<usize>,
    prolongation: Option<SparseOperator<T>>,
    restriction: Option<SparseOperator<T>>,
}

impl<T: Real> ElementDofSpace<T> {
    /// Creates a space with `num_dofs` global degrees of freedom.
    ///
    /// # Errors
    ///
    /// Fails with [`OperatorError::InvalidArgument`] if an element references a degree of
    /// freedom that is not smaller than `num_dofs`.
    pub fn from_element_dofs<I, E>(context: &Context, num_dofs: usize, elements: I) -> Result<Self, OperatorError>
    where
        I: IntoIterator<Item = E>,
        E: AsRef<[usize]>,
    {
        let mut element_offsets = vec![0];
        let mut element_dofs = Vec::new();
        for (element_index, element) in elements.into_iter().enumerate() {
            let dofs = element.as_ref();
            if let Some(&dof) = dofs.iter().find(|&&dof| dof >= num_dofs) {
                return Err(OperatorError::invalid_argument(
                    "elements",
                    format!(
                        "element {} references degree of freedom {}, but the space only has {}",
                        element_index, dof, num_dofs
                    ),
                ));
            }
            element_dofs.extend_from_slice(dofs);
            element_offsets.push(element_dofs.len());
        }

        Ok(Self {
            layout: Layout::new(num_dofs, context.clone()),
            element_layout: Layout::new(element_dofs.len(), context.clone()),
            element_offsets,
            element_dofs,
            prolongation: None,
            restriction: None,
        })
    }

    /// Attaches a conforming prolongation `P` and restriction `R`.
    ///
    /// # Errors
    ///
    /// Fails with [`OperatorError::LayoutMismatch`] unless `P` maps into the global layout, `R`
    /// maps from the global layout, and `R` maps into the input layout of `P`.
    pub fn with_conforming_maps(
        mut self,
        prolongation: SparseOperator<T>,
        restriction: SparseOperator<T>,
    ) -> Result<Self, OperatorError> {
        self.layout
            .check("prolongation output", prolongation.out_layout())?;
        self.layout
            .check("restriction input", restriction.in_layout())?;
        prolongation
            .in_layout()
            .check("restriction output", restriction.out_layout())?;
        self.prolongation = Some(prolongation);
        self.restriction = Some(restriction);
        Ok(self)
    }

    /// Identifies global degrees of freedom with true degrees of freedom.
    ///
    /// Global degree of freedom `i` is a copy of true degree of freedom `true_dof_map[i]`.
    /// The prolongation copies true values to all of their global copies, and the restriction
    /// picks the first global copy of each true degree of freedom.
    ///
    /// # Errors
    ///
    /// Fails with [`OperatorError::InvalidArgument`] if `true_dof_map` does not have one entry per
    /// global degree of freedom, references a true degree of freedom out of bounds, or leaves a
    /// true degree of freedom without any global copy.
    pub fn with_dof_identification(self, true_dof_map: &[usize], num_true_dofs: usize) -> Result<Self, OperatorError> {
        let num_dofs = self.layout.len();
        if true_dof_map.len() != num_dofs {
            return Err(OperatorError::invalid_argument(
                "true_dof_map",
                format!("expected {} entries, got {}", num_dofs, true_dof_map.len()),
            ));
        }

        let mut p = CooMatrix::new(num_dofs, num_true_dofs);
        let mut first_copy = vec![None; num_true_dofs];
        for (dof, &true_dof) in true_dof_map.iter().enumerate() {
            if true_dof >= num_true_dofs {
                return Err(OperatorError::invalid_argument(
                    "true_dof_map",
                    format!(
                        "degree of freedom {} maps to true degree of freedom {}, but there are only {}",
                        dof, true_dof, num_true_dofs
                    ),
                ));
            }
            p.push(dof, true_dof, T::one());
            first_copy[true_dof].get_or_insert(dof);
        }

        let mut r = CooMatrix::new(num_true_dofs, num_dofs);
        for (true_dof, copy) in first_copy.into_iter().enumerate() {
            let dof = copy.ok_or_else(|| {
                OperatorError::invalid_argument(
                    "true_dof_map",
                    format!("true degree of freedom {} has no global copy", true_dof),
                )
            })?;
            r.push(true_dof, dof, T::one());
        }

        let context = self.layout.context().clone();
        let p = SparseOperator::new(CsrMatrix::from(&p), &context);
        let r = SparseOperator::new(CsrMatrix::from(&r), &context);
        self.with_conforming_maps(p, r)
    }

    pub fn num_elements(&self) -> usize {
        self.element_offsets.len() - 1
    }

    pub fn element_dofs(&self, element_index: usize) -> &[usize] {
        let begin = self.element_offsets[element_index];
        let end = self.element_offsets[element_index + 1];
        &self.element_dofs[begin..end]
    }

    /// Offset of the first entry of each element in element-local vectors, followed by the
    /// total element-local length.
    pub fn element_offsets(&self) -> &[usize] {
        &self.element_offsets
    }
}

impl<T: Real> FiniteElementSpace<T> for ElementDofSpace<T> {
    fn layout(&self) -> &Layout {
        &self.layout
    }

    fn element_layout(&self) -> &Layout {
        &self.element_layout
    }

    fn prolongation(&self) -> Option<&dyn LinearOperator<T>> {
        self.prolongation
            .as_ref()
            .map(|p| p as &dyn LinearOperator<T>)
    }

    fn restriction(&self) -> Option<&dyn LinearOperator<T>> {
        self.restriction
            .as_ref()
            .map(|r| r as &dyn LinearOperator<T>)
    }

    fn global_to_local(&self, global: &DeviceVector<T>, local: &mut DeviceVector<T>) -> Result<(), OperatorError> {
        self.layout.check("global", global.layout())?;
        self.element_layout.check("local", local.layout())?;
        kernels::get_subvector(
            self.layout.context(),
            local.as_mut_slice(),
            global.as_slice(),
            &self.element_dofs,
        );
        Ok(())
    }

    fn local_to_global(&self, local: &DeviceVector<T>, global: &mut DeviceVector<T>) -> Result<(), OperatorError> {
        self.element_layout.check("local", local.layout())?;
        self.layout.check("global", global.layout())?;
        global.fill(T::zero());
        kernels::scatter_add(
            self.layout.context(),
            global.as_mut_slice(),
            local.as_slice(),
            &self.element_dofs,
        );
        Ok(())
    }
}
