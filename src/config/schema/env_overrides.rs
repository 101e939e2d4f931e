use super::Config;

impl Config {
    /// Unparseable or empty values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var("HOSTCONVERGE_MAX_PARALLEL")
            && let Ok(parallel) = raw.trim().parse::<usize>()
        {
            self.runner.max_parallel = parallel;
        }

        if let Ok(raw) = std::env::var("HOSTCONVERGE_TIMEOUT_SECS")
            && let Ok(secs) = raw.trim().parse::<u64>()
        {
            self.runner.default_timeout_secs = secs;
        }

        if let Ok(level) = std::env::var("HOSTCONVERGE_LOG_LEVEL")
            && !level.trim().is_empty()
        {
            self.observability.log_level = level.trim().to_string();
        }
    }
}
