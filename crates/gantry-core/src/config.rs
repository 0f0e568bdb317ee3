//! Engine configuration.

use std::time::Duration;

/// Configuration for a Gantry engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Store URL (`memory:`, `sqlite::memory:`, `sqlite:<path>`).
    pub store_url: String,

    /// Default queue name for jobs without an explicit queue.
    pub namespace: String,

    /// Delay inserted before each enqueue, in seconds.
    pub job_delay_secs: u64,

    /// TTL applied to a workflow's keys once it finishes, in seconds.
    pub ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_url: "memory:".to_string(),
            namespace: "gantry".to_string(),
            job_delay_secs: 0,
            ttl_secs: 60 * 60 * 24 * 30, // 30 days
        }
    }
}

impl EngineConfig {
    /// Build a configuration from `GANTRY_*` environment variables,
    /// falling back to the defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            store_url: std::env::var("GANTRY_STORE_URL").unwrap_or(defaults.store_url),
            namespace: std::env::var("GANTRY_NAMESPACE").unwrap_or(defaults.namespace),
            job_delay_secs: std::env::var("GANTRY_JOB_DELAY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.job_delay_secs),
            ttl_secs: std::env::var("GANTRY_TTL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.ttl_secs),
        }
    }

    /// Set the store URL.
    pub fn with_store_url(mut self, url: impl Into<String>) -> Self {
        self.store_url = url.into();
        self
    }

    /// Set the default queue name.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the enqueue delay.
    pub fn with_job_delay(mut self, secs: u64) -> Self {
        self.job_delay_secs = secs;
        self
    }

    /// Set the finished-workflow TTL.
    pub fn with_ttl(mut self, secs: u64) -> Self {
        self.ttl_secs = secs;
        self
    }

    /// Enqueue delay as a [`Duration`].
    pub fn job_delay(&self) -> Duration {
        Duration::from_secs(self.job_delay_secs)
    }

    /// Finished-workflow TTL as a [`Duration`].
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}
