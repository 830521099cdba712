use std::time::Duration;

/// Configuration for operation handling behind the domain directory.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Maximum number of restores running at once.
    pub restore_workers: u32,
    /// Restores that may wait for a worker before new ones are refused.
    pub restore_queue_capacity: usize,
    /// How long a request waits for its restore. `None` waits indefinitely.
    pub restore_timeout: Option<Duration>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            restore_workers: 4,
            restore_queue_capacity: 64,
            restore_timeout: Some(Duration::from_secs(300)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_config_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.restore_workers, 4);
        assert_eq!(config.restore_queue_capacity, 64);
        assert_eq!(config.restore_timeout, Some(Duration::from_secs(300)));
    }
}
