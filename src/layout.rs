//! Execution contexts and vector layouts.
//!
//! A [`Layout`] describes how many entries a vector holds and which execution [`Context`] its
//! buffer is bound to. Operators declare the layouts of their operands, and every application
//! checks the layouts of the actual operands against the declared ones before any work is done.
use crate::error::OperatorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// Default number of entries below which the parallel backend falls back to serial execution.
pub const DEFAULT_MIN_PARALLEL_LEN: usize = 4096;

/// The kind of executor that runs the kernels of a [`Context`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// All kernels run on the calling thread.
    Serial,
    /// Dense kernels run on the rayon thread pool.
    ///
    /// Scatter-type kernels still run serially in index order.
    Parallel,
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Serial => "serial",
            Self::Parallel => "parallel",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Backend {
    type Err = OperatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serial" => Ok(Self::Serial),
            "parallel" => Ok(Self::Parallel),
            other => Err(OperatorError::invalid_argument(
                "backend",
                format!("unrecognized backend \"{other}\" (expected \"serial\" or \"parallel\")"),
            )),
        }
    }
}

#[derive(Debug)]
struct ContextInner {
    id: usize,
    backend: Backend,
    min_parallel_len: usize,
}

/// A handle to an execution context.
///
/// Handles are cheap to clone. Two handles compare equal only if they refer to the same context,
/// so vectors created on different contexts are never considered compatible, even if the
/// contexts happen to use the same backend.
#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

static NEXT_CONTEXT_ID: AtomicUsize = AtomicUsize::new(0);

impl Context {
    pub fn new(backend: Backend) -> Self {
        Self::with_min_parallel_len(backend, DEFAULT_MIN_PARALLEL_LEN)
    }

    /// Creates a context whose parallel kernels only engage for buffers with at least
    /// `min_parallel_len` entries.
    pub fn with_min_parallel_len(backend: Backend, min_parallel_len: usize) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
                backend,
                min_parallel_len,
            }),
        }
    }

    pub fn serial() -> Self {
        Self::new(Backend::Serial)
    }

    pub fn parallel() -> Self {
        Self::new(Backend::Parallel)
    }

    /// The process-wide shared serial context.
    pub fn host() -> Self {
        static HOST: OnceLock<Context> = OnceLock::new();
        HOST.get_or_init(Context::serial).clone()
    }

    pub fn id(&self) -> usize {
        self.inner.id
    }

    pub fn backend(&self) -> Backend {
        self.inner.backend
    }

    pub fn min_parallel_len(&self) -> usize {
        self.inner.min_parallel_len
    }

    /// Whether a kernel over `len` entries should run on the thread pool.
    pub(crate) fn runs_parallel(&self, len: usize) -> bool {
        self.inner.backend == Backend::Parallel && len >= self.inner.min_parallel_len
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::host()
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Context {}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.inner.backend, self.inner.id)
    }
}

/// The size of a vector together with the context its buffer lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    len: usize,
    context: Context,
}

impl Layout {
    pub fn new(len: usize, context: Context) -> Self {
        Self { len, context }
    }

    /// A layout bound to the shared host context.
    pub fn host(len: usize) -> Self {
        Self::new(len, Context::host())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// A layout with a different length on the same context.
    pub fn with_len(&self, len: usize) -> Self {
        Self::new(len, self.context.clone())
    }

    /// Checks that `actual` matches this layout.
    ///
    /// `operand` names the operand in the error message.
    pub fn check(&self, operand: &'static str, actual: &Layout) -> Result<(), OperatorError> {
        if self == actual {
            Ok(())
        } else {
            Err(OperatorError::LayoutMismatch {
                operand,
                expected: self.clone(),
                actual: actual.clone(),
            })
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} entries on {}]", self.len, self.context)
    }
}
