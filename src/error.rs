//! Error types for operator construction and application.
use crate::integrator::IntegratorKind;
use crate::layout::Layout;
use std::error::Error;
use std::fmt;

/// Errors reported by vectors, operators and bilinear forms.
///
/// All errors are detected synchronously, before any kernel runs wherever possible. They signal
/// usage or programming errors and are never transient.
#[derive(Debug)]
#[non_exhaustive]
pub enum OperatorError {
    /// An argument is malformed, e.g. an out-of-range or repeated constraint index.
    InvalidArgument { arg: &'static str, reason: String },
    /// An operand layout does not match the layout declared by the operator.
    LayoutMismatch {
        operand: &'static str,
        expected: Layout,
        actual: Layout,
    },
    /// The requested action is not available for this operator.
    UnsupportedOperation { operation: &'static str, reason: String },
    /// An internal invariant of the operator protocol was broken by the caller.
    ContractViolation(String),
    /// An integrator failed during setup, assembly or application.
    Integrator {
        name: String,
        kind: IntegratorKind,
        source: eyre::Report,
    },
}

impl OperatorError {
    pub fn invalid_argument(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }

    pub fn unsupported(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation,
            reason: reason.into(),
        }
    }

    pub fn contract_violation(message: impl Into<String>) -> Self {
        Self::ContractViolation(message.into())
    }
}

impl fmt::Display for OperatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument { arg, reason } => {
                write!(f, "Invalid argument '{}': {}", arg, reason)
            }
            Self::LayoutMismatch {
                operand,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Layout mismatch for operand '{}': expected {}, got {}",
                    operand, expected, actual
                )
            }
            Self::UnsupportedOperation { operation, reason } => {
                write!(f, "Unsupported operation '{}': {}", operation, reason)
            }
            Self::ContractViolation(message) => write!(f, "Contract violation: {}", message),
            Self::Integrator { name, kind, source } => {
                write!(f, "{} integrator '{}' failed: {}", kind, name, source)
            }
        }
    }
}

impl Error for OperatorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Integrator { source, .. } => {
                let source: &(dyn Error + 'static) = source.as_ref();
                Some(source)
            }
            _ => None,
        }
    }
}
