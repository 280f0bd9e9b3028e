use std::time::Duration;
use taglink_core::constants::{
    DEFAULT_COMMAND_RETRIES, DEFAULT_FRAGMENT_TIMEOUT_MS, DEFAULT_HEALTH_CHECK_FRAMES,
    DEFAULT_LOCATE_EMIT_INTERVAL_MS, DEFAULT_PRESSURE_THRESHOLD_PERCENT, DEFAULT_RESPONSE_TIMEOUT_MS,
    DEFAULT_RSSI_HISTORY_DEPTH, DEFAULT_SCRATCH_CAPACITY,
};

/// Engine tuning knobs.
///
/// Every value defaults to the reference constants in
/// [`taglink_core::constants`]. The timing values are operational defaults,
/// not protocol invariants; hosts with unusual link characteristics adjust
/// them here.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use taglink_engine::EngineConfig;
///
/// let config = EngineConfig {
///     response_timeout: Duration::from_millis(500),
///     ..Default::default()
/// };
/// assert_eq!(config.command_retries, 2);
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long to wait for each command's response frame.
    pub response_timeout: Duration,

    /// Extra send attempts for commands flagged retry-on-error.
    pub command_retries: u8,

    /// Fragment reassembly timeout for the framer.
    pub fragment_timeout: Duration,

    /// Minimum interval between emitted locate updates.
    pub locate_emit_interval: Duration,

    /// Depth of the locate RSSI history ring.
    pub rssi_history_depth: usize,

    /// Parsed-frame count between scratch-buffer health checks.
    pub health_check_frames: u32,

    /// Scratch utilization (percent) above which a buffer warning is emitted.
    pub pressure_threshold_percent: u8,

    /// Inventory parser scratch-ring capacity in bytes.
    pub scratch_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_millis(DEFAULT_RESPONSE_TIMEOUT_MS),
            command_retries: DEFAULT_COMMAND_RETRIES,
            fragment_timeout: Duration::from_millis(DEFAULT_FRAGMENT_TIMEOUT_MS),
            locate_emit_interval: Duration::from_millis(DEFAULT_LOCATE_EMIT_INTERVAL_MS),
            rssi_history_depth: DEFAULT_RSSI_HISTORY_DEPTH,
            health_check_frames: DEFAULT_HEALTH_CHECK_FRAMES,
            pressure_threshold_percent: DEFAULT_PRESSURE_THRESHOLD_PERCENT,
            scratch_capacity: DEFAULT_SCRATCH_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.response_timeout, Duration::from_millis(3000));
        assert_eq!(config.command_retries, 2);
        assert_eq!(config.fragment_timeout, Duration::from_millis(200));
        assert_eq!(config.locate_emit_interval, Duration::from_millis(50));
        assert_eq!(config.rssi_history_depth, 10);
        assert_eq!(config.health_check_frames, 100);
        assert_eq!(config.pressure_threshold_percent, 80);
    }
}
