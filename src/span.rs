use log::trace;
use std::time::Instant;

/// Emits `trace!` markers when a scope is entered and left.
///
/// Spans only log; they never influence the computation they wrap.
pub(crate) struct Span {
    name: &'static str,
    start: Instant,
}

impl Span {
    pub(crate) fn enter(name: &'static str) -> Self {
        trace!("enter {}", name);
        Self {
            name,
            start: Instant::now(),
        }
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        trace!("exit {} after {:?}", self.name, self.start.elapsed());
    }
}
