//! Centralized configuration constants for the bus client layer.

use std::time::Duration;

/// Bus-level configuration.
pub struct BusConfig;

impl BusConfig {
    /// Default bus server port.
    pub const DEFAULT_PORT: u16 = 8088;

    /// Wire client-type tag for commander endpoints.
    pub const COMMANDER_CLIENT_TYPE: u8 = 10;

    /// Wire client-type tag for monitor endpoints.
    pub const MONITOR_CLIENT_TYPE: u8 = 3;

    /// Default timeout for an RPC call when the caller does not specify one.
    pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Telemetry record format constants.
pub struct TelemetryConfig;

impl TelemetryConfig {
    /// Record-kind tag for a server descriptor record.
    pub const DESCRIPTOR_TAG: &'static str = "svr";

    /// Record-kind tag for a load-values record.
    pub const LOAD_VALUES_TAG: &'static str = "svrres";

    /// Timestamp format of the `startup_time` descriptor field.
    pub const STARTUP_TIME_FORMAT: &'static str = "%Y-%m-%d %H:%M:%S";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_reasonable() {
        assert!(BusConfig::DEFAULT_CALL_TIMEOUT > Duration::ZERO);
        assert_ne!(
            BusConfig::COMMANDER_CLIENT_TYPE,
            BusConfig::MONITOR_CLIENT_TYPE
        );
    }
}
