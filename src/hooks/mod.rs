//! Side effects of a completed push.
//!
//! Both transports call [`PushObserver::on_push_completed`] once per
//! successful `receive-pack`. Observers must return promptly and keep any
//! failure to themselves; the push has already succeeded.

mod artifacts;

pub use artifacts::RefArtifacts;

pub trait PushObserver: Send + Sync {
    fn on_push_completed(&self, repository: &str);
}

impl<F> PushObserver for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_push_completed(&self, repository: &str) {
        self(repository)
    }
}
