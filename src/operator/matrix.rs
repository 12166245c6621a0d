use crate::error::OperatorError;
use crate::layout::{Context, Layout};
use crate::operator::LinearOperator;
use crate::vector::DeviceVector;
use ferroform_traits::Real;
use nalgebra::DMatrix;
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::CsrMatrix;

/// An operator backed by a dense matrix.
#[derive(Debug, Clone)]
pub struct DenseOperator<T: Real> {
    matrix: DMatrix<T>,
    in_layout: Layout,
    out_layout: Layout,
}

impl<T: Real> DenseOperator<T> {
    pub fn new(matrix: DMatrix<T>, context: &Context) -> Self {
        Self {
            in_layout: Layout::new(matrix.ncols(), context.clone()),
            out_layout: Layout::new(matrix.nrows(), context.clone()),
            matrix,
        }
    }

    pub fn matrix(&self) -> &DMatrix<T> {
        &self.matrix
    }
}

impl<T: Real> LinearOperator<T> for DenseOperator<T> {
    fn in_layout(&self) -> &Layout {
        &self.in_layout
    }

    fn out_layout(&self) -> &Layout {
        &self.out_layout
    }

    fn apply(&self, x: &DeviceVector<T>, y: &mut DeviceVector<T>) -> Result<(), OperatorError> {
        y.data_mut()
            .gemv(T::one(), &self.matrix, x.as_dvector(), T::zero());
        Ok(())
    }

    fn apply_transpose(&self, x: &DeviceVector<T>, y: &mut DeviceVector<T>) -> Result<(), OperatorError> {
        y.data_mut()
            .gemv_tr(T::one(), &self.matrix, x.as_dvector(), T::zero());
        Ok(())
    }
}

/// An operator backed by a CSR matrix.
///
/// Typically used for externally supplied prolongation and restriction maps.
#[derive(Debug, Clone)]
pub struct SparseOperator<T: Real> {
    matrix: CsrMatrix<T>,
    in_layout: Layout,
    out_layout: Layout,
}

impl<T: Real> SparseOperator<T> {
    pub fn new(matrix: CsrMatrix<T>, context: &Context) -> Self {
        Self {
            in_layout: Layout::new(matrix.ncols(), context.clone()),
            out_layout: Layout::new(matrix.nrows(), context.clone()),
            matrix,
        }
    }

    pub fn matrix(&self) -> &CsrMatrix<T> {
        &self.matrix
    }
}

impl<T: Real> LinearOperator<T> for SparseOperator<T> {
    fn in_layout(&self) -> &Layout {
        &self.in_layout
    }

    fn out_layout(&self) -> &Layout {
        &self.out_layout
    }

    fn apply(&self, x: &DeviceVector<T>, y: &mut DeviceVector<T>) -> Result<(), OperatorError> {
        // spmm reads y even with a zero beta, so stale non-finite values would leak through
        y.fill(T::zero());
        spmm_csr_dense(
            T::zero(),
            y.data_mut(),
            T::one(),
            Op::NoOp(&self.matrix),
            Op::NoOp(x.as_dvector()),
        );
        Ok(())
    }

    fn apply_transpose(&self, x: &DeviceVector<T>, y: &mut DeviceVector<T>) -> Result<(), OperatorError> {
        y.fill(T::zero());
        spmm_csr_dense(
            T::zero(),
            y.data_mut(),
            T::one(),
            Op::Transpose(&self.matrix),
            Op::NoOp(x.as_dvector()),
        );
        Ok(())
    }
}
