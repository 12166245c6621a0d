//! Matrix-free bilinear forms with essential boundary conditions enforced by elimination.
//!
//! The central types are [`BilinearForm`](form::BilinearForm), which applies a set of
//! [`Integrator`](integrator::Integrator)s matrix-free through the element-local storage of a
//! [`FiniteElementSpace`](space::FiniteElementSpace), and
//! [`ConstrainedOperator`](operator::ConstrainedOperator), which wraps any square
//! [`LinearOperator`](operator::LinearOperator) so that prescribed values at a
//! [`ConstraintSet`](constraint::ConstraintSet) are reproduced exactly.
//!
//! All vectors are [`DeviceVector`](vector::DeviceVector)s bound to a
//! [`Layout`](layout::Layout), i.e. a length and an execution [`Context`](layout::Context).
pub mod constraint;
pub mod error;
pub mod form;
pub mod integrator;
pub mod layout;
pub mod operator;
pub mod space;
pub mod vector;

pub(crate) mod span;

#[cfg(feature = "proptest")]
pub mod proptest;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

pub use ferroform_traits::Real;
