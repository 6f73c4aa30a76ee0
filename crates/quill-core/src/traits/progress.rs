//! Progress reporting for long embedding passes.

/// Receives `(current, total)` after each embedded chunk.
pub trait ProgressSink: Send + Sync {
    fn report(&self, current: usize, total: usize);
}

impl<F> ProgressSink for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn report(&self, current: usize, total: usize) {
        self(current, total)
    }
}

/// Logs each step through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, current: usize, total: usize) {
        tracing::info!("Embedding chunk {current}/{total}");
    }
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _current: usize, _total: usize) {}
}
