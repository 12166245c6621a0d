//! Linear operators acting on [`DeviceVector`]s.
use crate::error::OperatorError;
use crate::layout::Layout;
use crate::vector::DeviceVector;
use ferroform_traits::Real;
use std::fmt;
use std::ops::Deref;

mod constrained;
mod matrix;
mod rap;

pub use constrained::*;
pub use matrix::*;
pub use rap::*;

/// A linear map `A` from vectors with layout [`in_layout`](Self::in_layout) to vectors with
/// layout [`out_layout`](Self::out_layout).
///
/// Implementors provide [`apply`](Self::apply) and optionally
/// [`apply_transpose`](Self::apply_transpose). Callers use [`mult`](Self::mult) and
/// [`mult_transpose`](Self::mult_transpose), which check operand layouts before dispatching.
pub trait LinearOperator<T: Real> {
    fn in_layout(&self) -> &Layout;

    fn out_layout(&self) -> &Layout;

    /// Computes `y = A x`.
    ///
    /// Operand layouts have already been checked by the caller.
    fn apply(&self, x: &DeviceVector<T>, y: &mut DeviceVector<T>) -> Result<(), OperatorError>;

    /// Computes `y = A^T x`.
    ///
    /// Operand layouts have already been checked by the caller. The default implementation
    /// reports that the transpose action is unavailable.
    fn apply_transpose(&self, _x: &DeviceVector<T>, _y: &mut DeviceVector<T>) -> Result<(), OperatorError> {
        Err(OperatorError::unsupported(
            "mult_transpose",
            "operator does not provide a transpose action",
        ))
    }

    /// Computes `y = A x` after checking that `x` has the input layout and `y` the output layout.
    fn mult(&self, x: &DeviceVector<T>, y: &mut DeviceVector<T>) -> Result<(), OperatorError> {
        self.in_layout().check("x", x.layout())?;
        self.out_layout().check("y", y.layout())?;
        self.apply(x, y)
    }

    /// Computes `y = A^T x` after checking that `x` has the output layout and `y` the input layout.
    fn mult_transpose(&self, x: &DeviceVector<T>, y: &mut DeviceVector<T>) -> Result<(), OperatorError> {
        self.out_layout().check("x", x.layout())?;
        self.in_layout().check("y", y.layout())?;
        self.apply_transpose(x, y)
    }
}

impl<'a, T, A> LinearOperator<T> for &'a A
where
    T: Real,
    A: ?Sized + LinearOperator<T>,
{
    fn in_layout(&self) -> &Layout {
        <A as LinearOperator<T>>::in_layout(self)
    }

    fn out_layout(&self) -> &Layout {
        <A as LinearOperator<T>>::out_layout(self)
    }

    fn apply(&self, x: &DeviceVector<T>, y: &mut DeviceVector<T>) -> Result<(), OperatorError> {
        <A as LinearOperator<T>>::apply(self, x, y)
    }

    fn apply_transpose(&self, x: &DeviceVector<T>, y: &mut DeviceVector<T>) -> Result<(), OperatorError> {
        <A as LinearOperator<T>>::apply_transpose(self, x, y)
    }
}

impl<T, A> LinearOperator<T> for Box<A>
where
    T: Real,
    A: ?Sized + LinearOperator<T>,
{
    fn in_layout(&self) -> &Layout {
        <A as LinearOperator<T>>::in_layout(self)
    }

    fn out_layout(&self) -> &Layout {
        <A as LinearOperator<T>>::out_layout(self)
    }

    fn apply(&self, x: &DeviceVector<T>, y: &mut DeviceVector<T>) -> Result<(), OperatorError> {
        <A as LinearOperator<T>>::apply(self, x, y)
    }

    fn apply_transpose(&self, x: &DeviceVector<T>, y: &mut DeviceVector<T>) -> Result<(), OperatorError> {
        <A as LinearOperator<T>>::apply_transpose(self, x, y)
    }
}

/// Whether a composing operator owns the operator it wraps.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    Borrowed,
}

/// An operator that is either owned or borrowed by the type that holds it.
///
/// The variant is fixed at construction. Dropping an `Owned` reference drops the operator,
/// dropping a `Borrowed` reference leaves it untouched.
pub enum OperatorRef<'a, T: Real> {
    Owned(Box<dyn LinearOperator<T> + 'a>),
    Borrowed(&'a dyn LinearOperator<T>),
}

impl<'a, T: Real> OperatorRef<'a, T> {
    pub fn ownership(&self) -> Ownership {
        match self {
            Self::Owned(_) => Ownership::Owned,
            Self::Borrowed(_) => Ownership::Borrowed,
        }
    }

    pub fn is_owned(&self) -> bool {
        self.ownership() == Ownership::Owned
    }
}

impl<'a, T: Real> Deref for OperatorRef<'a, T> {
    type Target = dyn LinearOperator<T> + 'a;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Owned(owned) => owned.as_ref(),
            Self::Borrowed(borrowed) => *borrowed,
        }
    }
}

impl<'a, T: Real> fmt::Debug for OperatorRef<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorRef")
            .field("ownership", &self.ownership())
            .field("in_layout", self.in_layout())
            .field("out_layout", self.out_layout())
            .finish()
    }
}
