use std::time::Duration;

/// Default interval between sweep passes
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Smallest accepted sweep interval
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for a [`RetentionEngine`](crate::RetentionEngine)
///
/// # Example
///
/// ```rust
/// use retention_core::RetentionConfig;
/// use std::time::Duration;
///
/// let config = RetentionConfig::default()
///     .with_sweep_interval(Duration::from_millis(50))
///     .with_stream_buffer(16);
/// ```
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// Interval between sweep passes (default: 100 milliseconds)
    pub sweep_interval: Duration,
    /// Items a consumer stream may hold before its worker stops popping (default: 1)
    pub stream_buffer: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            stream_buffer: 1,
        }
    }
}

impl RetentionConfig {
    /// Creates a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sweep interval
    ///
    /// This is the granularity of expiry: a value is delivered at most one interval
    /// after its deadline. Intervals below one millisecond are raised to one millisecond.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval.max(MIN_SWEEP_INTERVAL);
        self
    }

    /// Sets how many delivered items each consumer stream buffers
    ///
    /// A larger buffer lets a worker pop ahead of a slow reader; those items are then
    /// committed to that stream. Zero is raised to one.
    pub fn with_stream_buffer(mut self, slots: usize) -> Self {
        self.stream_buffer = slots.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RetentionConfig::default();
        assert_eq!(config.sweep_interval, Duration::from_millis(100));
        assert_eq!(config.stream_buffer, 1);
    }

    #[test]
    fn test_builder_pattern_chaining() {
        let config = RetentionConfig::new()
            .with_sweep_interval(Duration::from_millis(20))
            .with_stream_buffer(8);
        assert_eq!(config.sweep_interval, Duration::from_millis(20));
        assert_eq!(config.stream_buffer, 8);
    }

    #[test]
    fn test_zero_values_are_clamped() {
        let config = RetentionConfig::new()
            .with_sweep_interval(Duration::ZERO)
            .with_stream_buffer(0);
        assert_eq!(config.sweep_interval, Duration::from_millis(1));
        assert_eq!(config.stream_buffer, 1);
    }
}
