use nalgebra::RealField;

pub use nalgebra;

/// Scalar type used by all numeric kernels.
///
/// `Send + Sync` is required so that buffers can be processed by the parallel backend.
pub trait Real: RealField + Copy + Send + Sync {}

impl<T: RealField + Copy + Send + Sync> Real for T {}
