//! Pluggable element-local contributions to a bilinear form.
use crate::error::OperatorError;
use crate::space::FiniteElementSpace;
use crate::vector::DeviceVector;
use ferroform_traits::Real;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

mod element_matrix;

pub use element_matrix::*;

/// The kind of entities an integrator contributes over.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntegratorKind {
    Domain,
    Boundary,
    InteriorFace,
    BoundaryFace,
}

impl IntegratorKind {
    pub const ALL: [IntegratorKind; 4] = [
        IntegratorKind::Domain,
        IntegratorKind::Boundary,
        IntegratorKind::InteriorFace,
        IntegratorKind::BoundaryFace,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::Boundary => "boundary",
            Self::InteriorFace => "interior-face",
            Self::BoundaryFace => "boundary-face",
        }
    }
}

impl fmt::Display for IntegratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for IntegratorKind {
    type Err = OperatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == normalized)
            .ok_or_else(|| OperatorError::invalid_argument("kind", format!("unrecognized integrator kind \"{s}\"")))
    }
}

/// Information handed to an integrator when it is registered with a bilinear form.
#[derive(Clone, Copy)]
pub struct IntegratorSetup<'a, T: Real> {
    kind: IntegratorKind,
    position: usize,
    trial_space: &'a dyn FiniteElementSpace<T>,
    test_space: &'a dyn FiniteElementSpace<T>,
}

impl<'a, T: Real> IntegratorSetup<'a, T> {
    pub fn new(
        kind: IntegratorKind,
        position: usize,
        trial_space: &'a dyn FiniteElementSpace<T>,
        test_space: &'a dyn FiniteElementSpace<T>,
    ) -> Self {
        Self {
            kind,
            position,
            trial_space,
            test_space,
        }
    }

    pub fn kind(&self) -> IntegratorKind {
        self.kind
    }

    /// Position of the integrator in the registry of the form.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn trial_space(&self) -> &'a dyn FiniteElementSpace<T> {
        self.trial_space
    }

    pub fn test_space(&self) -> &'a dyn FiniteElementSpace<T> {
        self.test_space
    }
}

/// An element-local contribution to a bilinear form.
///
/// Integrators operate on element-local vectors (see
/// [`FiniteElementSpace::element_layout`]): the input is laid out according to the trial space,
/// the output according to the test space. Contributions must always be *added* to the output.
pub trait Integrator<T: Real> {
    fn name(&self) -> &str;

    /// Called once when the integrator is registered with a form.
    fn setup(&mut self, setup: &IntegratorSetup<T>) -> eyre::Result<()>;

    /// Precomputes whatever data the integrator needs for its action.
    ///
    /// Whether repeated assembly recomputes or accumulates is up to the integrator.
    fn assemble(&mut self) -> eyre::Result<()>;

    /// Computes `y_local += A_local x_local`.
    fn mult_add(&self, x_local: &DeviceVector<T>, y_local: &mut DeviceVector<T>) -> eyre::Result<()>;

    /// Computes `y_local += A_local^T x_local`.
    fn mult_transpose_add(&self, _x_local: &DeviceVector<T>, _y_local: &mut DeviceVector<T>) -> eyre::Result<()> {
        Err(eyre::eyre!("integrator '{}' has no transpose action", self.name()))
    }
}
