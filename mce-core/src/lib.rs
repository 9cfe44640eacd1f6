//! mce Core Library
//!
//! Device side policy for fingerprint wakeups: tracks the fingerprint daemon
//! (fpd), decides when a successful identification may wake the device and
//! arbitrates the race against physical power key presses.
//!
//! # Module Structure
//!
//! - `fingerprint/` - fpd tracking, operation state machine and wake policy
//! - `datapipe` - values published to the rest of the system
//! - `effects` - call/timer handles and the effect outbox drained by the event loop
//! - `settings` - hot reloadable fingerprint wakeup settings
//! - `wakelock` - reference counted suspend blocking
//!
//! The core never blocks, never reads clocks and never touches sockets.
//! Everything asynchronous is expressed as an [`effects::Effect`] and the
//! outcome is fed back in as an event carrying the original handle.

// Grouped modules
pub mod fingerprint;

// Standalone modules
pub mod constants;
pub mod datapipe;
pub mod effects;
pub mod settings;
pub mod wakelock;

// Re-export error types
pub use mce_error::{MceError, Result};

pub use datapipe::{ActivityEvent, Gesture, Output, TklockRequest};
pub use effects::{CallError, CallHandle, Effect, Outbox, TimerHandle};
pub use fingerprint::{FingerprintModule, OperationState, ResultEvent};
pub use settings::{FpWakeupMode, FpWakeupSettings, SettingChange, SettingsStore};
pub use wakelock::{Wakelock, WakelockBackend, WakelockGuard};
