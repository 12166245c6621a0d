use crate::error::OperatorError;
use crate::layout::Layout;
use crate::operator::LinearOperator;
use crate::vector::DeviceVector;
use ferroform_traits::Real;
use std::cell::RefCell;
use std::fmt;

/// The variational composition `R^T A P`.
///
/// `P` maps the trial true-dof space into the input space of `A`, and `R` maps the test
/// true-dof space into the output space of `A`. The composite maps trial true dofs to test
/// true dofs.
pub struct RapOperator<'a, T: Real> {
    rt: &'a dyn LinearOperator<T>,
    a: &'a dyn LinearOperator<T>,
    p: &'a dyn LinearOperator<T>,
    // px lives in A's input space, apx in A's output space
    px: RefCell<DeviceVector<T>>,
    apx: RefCell<DeviceVector<T>>,
}

impl<'a, T: Real> RapOperator<'a, T> {
    /// Composes `rt^T a p`.
    ///
    /// # Errors
    ///
    /// Fails with [`OperatorError::LayoutMismatch`] if the output layout of `p` is not the input
    /// layout of `a`, or if the output layout of `rt` is not the output layout of `a`.
    pub fn new(
        rt: &'a dyn LinearOperator<T>,
        a: &'a dyn LinearOperator<T>,
        p: &'a dyn LinearOperator<T>,
    ) -> Result<Self, OperatorError> {
        a.in_layout().check("p", p.out_layout())?;
        a.out_layout().check("rt", rt.out_layout())?;
        Ok(Self {
            rt,
            a,
            p,
            px: RefCell::new(DeviceVector::zeros(a.in_layout().clone())),
            apx: RefCell::new(DeviceVector::zeros(a.out_layout().clone())),
        })
    }
}

impl<'a, T: Real> LinearOperator<T> for RapOperator<'a, T> {
    fn in_layout(&self) -> &Layout {
        self.p.in_layout()
    }

    fn out_layout(&self) -> &Layout {
        self.rt.in_layout()
    }

    fn apply(&self, x: &DeviceVector<T>, y: &mut DeviceVector<T>) -> Result<(), OperatorError> {
        let px = &mut *self.px.borrow_mut();
        let apx = &mut *self.apx.borrow_mut();
        self.p.mult(x, px)?;
        self.a.mult(px, apx)?;
        self.rt.mult_transpose(apx, y)
    }

    fn apply_transpose(&self, x: &DeviceVector<T>, y: &mut DeviceVector<T>) -> Result<(), OperatorError> {
        let px = &mut *self.px.borrow_mut();
        let apx = &mut *self.apx.borrow_mut();
        self.rt.mult(x, apx)?;
        self.a.mult_transpose(apx, px)?;
        self.p.mult_transpose(px, y)
    }
}

impl<'a, T: Real> fmt::Debug for RapOperator<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RapOperator")
            .field("in_layout", self.in_layout())
            .field("out_layout", self.out_layout())
            .finish()
    }
}
