use crate::core::probe::{Executor, Probe, Resource, Retry};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A single declarative unit of desired host state.
///
/// Cloning a step is cheap: the probe and executor are shared behind `Arc`,
/// which lets the same plan be converged more than once.
#[derive(Clone)]
pub struct Step {
    id: String,
    description: String,
    requires: Vec<String>,
    fatal: bool,
    timeout: Option<Duration>,
    probe: Arc<dyn Probe>,
    executor: Arc<dyn Executor>,
}

impl Step {
    pub fn new(
        id: impl Into<String>,
        probe: impl Probe + 'static,
        executor: impl Executor + 'static,
    ) -> Self {
        let id = id.into();
        Self {
            description: id.clone(),
            id,
            requires: Vec::new(),
            fatal: false,
            timeout: None,
            probe: Arc::new(probe),
            executor: Arc::new(executor),
        }
    }

    /// Builds a step whose probe and executor are the same resource.
    pub fn from_resource<R: Resource + 'static>(id: impl Into<String>, resource: R) -> Self {
        let description = resource.describe();
        let shared = Arc::new(resource);
        Self {
            id: id.into(),
            description,
            requires: Vec::new(),
            fatal: false,
            timeout: None,
            probe: Arc::clone(&shared) as Arc<dyn Probe>,
            executor: shared as Arc<dyn Executor>,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn requires<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn fatal(mut self, fatal: bool) -> Self {
        self.fatal = fatal;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Wraps the executor so a failed apply is attempted again, up to
    /// `attempts` times in total. The probe is not retried.
    pub fn with_retries(mut self, attempts: u32, backoff: Duration) -> Self {
        if attempts > 1 {
            self.executor = Arc::new(Retry::new(self.executor, attempts, backoff));
        }
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn dependencies(&self) -> &[String] {
        &self.requires
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn probe(&self) -> Arc<dyn Probe> {
        Arc::clone(&self.probe)
    }

    pub(crate) fn executor(&self) -> Arc<dyn Executor> {
        Arc::clone(&self.executor)
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("requires", &self.requires)
            .field("fatal", &self.fatal)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
