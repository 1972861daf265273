//! Host runtime hooks
//!
//! The embedding application decides what "page view" and "cleanup" mean.
//! Every hook is a no-op unless overridden.

/// Callbacks into the host runtime, invoked by [`super::SyncClient`]
pub trait RuntimeHooks: Send + Sync {
    fn add_page_view_listeners(&self) {}

    fn add_cleanup_listeners(&self) {}

    fn remove_all_listeners(&self) {}

    /// Re-evaluate page-url based triggers after setup
    fn check_page_url(&self) {}
}

/// Hooks that do nothing; used by headless clients such as the CLI
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl RuntimeHooks for NoopHooks {}
