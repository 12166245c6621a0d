use crate::integrator::{Integrator, IntegratorSetup};
use crate::layout::Context;
use crate::vector::DeviceVector;
use eyre::eyre;
use ferroform_traits::Real;
use nalgebra::{DMatrix, DMatrixViewMut, DVectorView, DVectorViewMut};
use rayon::prelude::*;

/// A source of dense element matrices.
///
/// Element `i` couples `element_trial_dof_count(i)` trial degrees of freedom to
/// `element_test_dof_count(i)` test degrees of freedom. Elements are laid out consecutively in
/// element-local vectors, in element order.
pub trait ElementMatrixAssembler<T: Real> {
    fn num_elements(&self) -> usize;

    fn element_test_dof_count(&self, element_index: usize) -> usize;

    fn element_trial_dof_count(&self, element_index: usize) -> usize {
        self.element_test_dof_count(element_index)
    }

    /// Writes the element matrix of the given element into `output`.
    ///
    /// `output` has `element_test_dof_count` rows and `element_trial_dof_count` columns and is
    /// zero on entry.
    fn assemble_element_matrix_into(&self, element_index: usize, output: DMatrixViewMut<T>) -> eyre::Result<()>;
}

/// An integrator that caches one dense matrix per element.
///
/// [`assemble`](Integrator::assemble) recomputes all element matrices, so repeated assembly is
/// idempotent.
#[derive(Debug)]
pub struct ElementMatrixIntegrator<T: Real, A> {
    name: String,
    assembler: A,
    context: Option<Context>,
    test_offsets: Vec<usize>,
    trial_offsets: Vec<usize>,
    element_matrices: Vec<DMatrix<T>>,
}

impl<T: Real, A> ElementMatrixIntegrator<T, A>
where
    A: ElementMatrixAssembler<T>,
{
    pub fn new(name: impl Into<String>, assembler: A) -> Self {
        Self {
            name: name.into(),
            assembler,
            context: None,
            test_offsets: Vec::new(),
            trial_offsets: Vec::new(),
            element_matrices: Vec::new(),
        }
    }

    pub fn assembler(&self) -> &A {
        &self.assembler
    }

    /// The cached element matrices. Empty until the integrator has been assembled.
    pub fn element_matrices(&self) -> &[DMatrix<T>] {
        &self.element_matrices
    }

    fn assemble_element(&self, element_index: usize) -> eyre::Result<DMatrix<T>> {
        let rows = self.assembler.element_test_dof_count(element_index);
        let cols = self.assembler.element_trial_dof_count(element_index);
        let mut matrix = DMatrix::zeros(rows, cols);
        self.assembler
            .assemble_element_matrix_into(element_index, DMatrixViewMut::from(&mut matrix))?;
        Ok(matrix)
    }
}

fn compute_offsets(num_elements: usize, count: impl Fn(usize) -> usize) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(num_elements + 1);
    offsets.push(0);
    for i in 0..num_elements {
        offsets.push(offsets[i] + count(i));
    }
    offsets
}

impl<T: Real, A> Integrator<T> for ElementMatrixIntegrator<T, A>
where
    A: ElementMatrixAssembler<T> + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self, setup: &IntegratorSetup<T>) -> eyre::Result<()> {
        let n = self.assembler.num_elements();
        let test_offsets = compute_offsets(n, |i| self.assembler.element_test_dof_count(i));
        let trial_offsets = compute_offsets(n, |i| self.assembler.element_trial_dof_count(i));

        let test_len = setup.test_space().element_layout().len();
        let trial_len = setup.trial_space().element_layout().len();
        if test_offsets[n] != test_len {
            return Err(eyre!(
                "element matrices cover {} test degrees of freedom, but element-local test vectors have {} entries",
                test_offsets[n],
                test_len
            ));
        }
        if trial_offsets[n] != trial_len {
            return Err(eyre!(
                "element matrices cover {} trial degrees of freedom, but element-local trial vectors have {} entries",
                trial_offsets[n],
                trial_len
            ));
        }

        self.context = Some(setup.trial_space().element_layout().context().clone());
        self.test_offsets = test_offsets;
        self.trial_offsets = trial_offsets;
        self.element_matrices.clear();
        Ok(())
    }

    fn assemble(&mut self) -> eyre::Result<()> {
        let context = self
            .context
            .as_ref()
            .ok_or_else(|| eyre!("integrator '{}' must be set up before assembly", self.name))?;

        let n = self.assembler.num_elements();
        let matrices = if context.runs_parallel(n) {
            (0..n)
                .into_par_iter()
                .map(|i| self.assemble_element(i))
                .collect::<eyre::Result<Vec<_>>>()?
        } else {
            (0..n)
                .map(|i| self.assemble_element(i))
                .collect::<eyre::Result<Vec<_>>>()?
        };
        self.element_matrices = matrices;
        Ok(())
    }

    fn mult_add(&self, x_local: &DeviceVector<T>, y_local: &mut DeviceVector<T>) -> eyre::Result<()> {
        self.check_assembled()?;
        self.check_local_len("input", &self.trial_offsets, x_local)?;
        self.check_local_len("output", &self.test_offsets, y_local)?;
        let x = x_local.as_slice();
        let y = y_local.as_mut_slice();
        for (i, matrix) in self.element_matrices.iter().enumerate() {
            let x_e = &x[self.trial_offsets[i]..self.trial_offsets[i + 1]];
            let y_e = &mut y[self.test_offsets[i]..self.test_offsets[i + 1]];
            let (x_len, y_len) = (x_e.len(), y_e.len());
            DVectorViewMut::from_slice(y_e, y_len).gemv(
                T::one(),
                matrix,
                &DVectorView::from_slice(x_e, x_len),
                T::one(),
            );
        }
        Ok(())
    }

    fn mult_transpose_add(&self, x_local: &DeviceVector<T>, y_local: &mut DeviceVector<T>) -> eyre::Result<()> {
        self.check_assembled()?;
        self.check_local_len("input", &self.test_offsets, x_local)?;
        self.check_local_len("output", &self.trial_offsets, y_local)?;
        let x = x_local.as_slice();
        let y = y_local.as_mut_slice();
        for (i, matrix) in self.element_matrices.iter().enumerate() {
            let x_e = &x[self.test_offsets[i]..self.test_offsets[i + 1]];
            let y_e = &mut y[self.trial_offsets[i]..self.trial_offsets[i + 1]];
            let (x_len, y_len) = (x_e.len(), y_e.len());
            DVectorViewMut::from_slice(y_e, y_len).gemv_tr(
                T::one(),
                matrix,
                &DVectorView::from_slice(x_e, x_len),
                T::one(),
            );
        }
        Ok(())
    }
}

impl<T: Real, A> ElementMatrixIntegrator<T, A> {
    fn check_assembled(&self) -> eyre::Result<()> {
        let num_elements = self.test_offsets.len().saturating_sub(1);
        if self.element_matrices.len() != num_elements || self.test_offsets.is_empty() {
            Err(eyre!("integrator '{}' has not been assembled", self.name))
        } else {
            Ok(())
        }
    }

    fn check_local_len(&self, operand: &str, offsets: &[usize], local: &DeviceVector<T>) -> eyre::Result<()> {
        let expected = offsets.last().copied().unwrap_or(0);
        if local.len() != expected {
            Err(eyre!(
                "integrator '{}' expects {} element-local {} entries, got {}",
                self.name,
                expected,
                operand,
                local.len()
            ))
        } else {
            Ok(())
        }
    }
}
