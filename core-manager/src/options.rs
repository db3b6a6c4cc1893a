//! Per-call options for manager read operations.

use std::fmt;
use std::sync::Arc;

type BeforeDownload = Arc<dyn Fn() + Send + Sync>;

/// Options accepted by every `get_*` operation.
#[derive(Clone, Default)]
pub struct FetchOptions {
    /// Skip the cache read and soft-invalidate the entry before fetching, so
    /// a fresh ground-truth result is forced.
    pub force: bool,
    /// Invoked once, on the pool task, just before a ground-truth fetch
    /// actually starts. Never invoked on a cache hit. Lets a UI flip into a
    /// loading state only when a download really happens.
    pub before_download: Option<BeforeDownload>,
}

impl FetchOptions {
    pub fn force() -> Self {
        Self {
            force: true,
            before_download: None,
        }
    }

    pub fn on_before_download(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.before_download = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("force", &self.force)
            .field("before_download", &self.before_download.is_some())
            .finish()
    }
}
