//! Constants and configuration values for mce
//!
//! Centralizes setting keys, defaults, led pattern names and timing values.

/// System paths
pub mod paths {
    /// Control socket served by mced
    pub const CONTROL_SOCKET: &str = "/run/mce-fingerprint.sock";

    /// Socket of the fingerprint daemon
    pub const FPD_SOCKET: &str = "/run/fpd/fpd.sock";

    /// Persistent fingerprint settings
    pub const SETTINGS_FILE: &str = "/etc/mce/fingerprint.json";

    /// PID file of mced
    pub const PID_FILE: &str = "/run/mced.pid";

    /// Kernel wakelock interface
    pub const WAKE_LOCK: &str = "/sys/power/wake_lock";
    pub const WAKE_UNLOCK: &str = "/sys/power/wake_unlock";
}

/// Fingerprint wakeup setting keys and defaults
pub mod settings {
    /// When fingerprint wakeup is allowed
    pub const FPWAKEUP_MODE: &str = "/system/osso/dsm/fingerprint/mode";
    pub const DEFAULT_FPWAKEUP_MODE: i64 = 0;

    /// Delay between policy change and activating fingerprint daemon [ms]
    pub const FPWAKEUP_ALLOW_DELAY: &str = "/system/osso/dsm/fingerprint/allow_delay";
    pub const DEFAULT_FPWAKEUP_ALLOW_DELAY: u32 = 500;

    /// Delay between getting identified fingerprint and acting on it [ms]
    pub const FPWAKEUP_TRIGGER_DELAY: &str = "/system/osso/dsm/fingerprint/trigger_delay";
    pub const DEFAULT_FPWAKEUP_TRIGGER_DELAY: u32 = 100;

    /// Delay between ipc attempts with fingerprint daemon [ms]
    pub const FPWAKEUP_THROTTLE_DELAY: &str = "/system/osso/dsm/fingerprint/throttle_delay";
    pub const DEFAULT_FPWAKEUP_THROTTLE_DELAY: u32 = 250;

    /// Upper bound accepted for any of the delay settings [ms]
    pub const MAX_DELAY_MS: u32 = 60_000;
}

/// Led pattern names
pub mod leds {
    pub const PATTERN_SCANNING_FINGERPRINT: &str = "PatternScanningFingerprint";
    pub const PATTERN_FINGERPRINT_ACQUIRED: &str = "PatternFingerprintAcquired";
}

/// Timing values
pub mod timing {
    /// How long the acquired led pattern stays on after AcquisitionInfo [ms]
    pub const ACQUIRED_LED_DURATION_MS: u64 = 200;

    /// Method calls to fpd fail if no reply arrives within this time [ms]
    pub const FPD_CALL_TIMEOUT_MS: u64 = 5000;

    /// Delay between fpd reconnect attempts [ms]
    pub const FPD_RECONNECT_DELAY_MS: u64 = 1000;
}

/// Wakelock names
pub mod wakelocks {
    pub const FINGERPRINT: &str = "mce_fpwakeup";
}

/// Feedback event played when a fingerprint wakes the device
pub const NGF_EVENT_UNLOCK_DEVICE: &str = "unlock_device";
