//! Values the fingerprint module publishes to the rest of the system
//!
//! Inputs arrive as [`mce_protocol::BusSignal`]; everything flowing the other
//! way is an [`Output`], handed to the event loop through the effect outbox.

use mce_protocol::{DisplayState, FpState};

/// Lock screen requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TklockRequest {
    Off,
    On,
}

/// Touch / sensor gestures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    DoubleTap,
    FpWakeup,
}

/// Synthetic input activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityEvent {
    Gesture { gesture: Gesture, synthesized: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Operational state of fpd, for other modules
    FpState(FpState),
    /// Fingerprint enroll ongoing; blocks display blanking elsewhere
    EnrollInProgress(bool),
    LedPatternActivate(&'static str),
    LedPatternDeactivate(&'static str),
    /// Inactivity hint; `false` means the user is active
    InactivityEvent(bool),
    /// Haptic / audio feedback event
    NgfEvent(&'static str),
    DisplayStateRequest(DisplayState),
    TklockRequest(TklockRequest),
    UserActivity(ActivityEvent),
}

impl Output {
    pub fn type_name(&self) -> &'static str {
        match self {
            Output::FpState(_) => "fpstate",
            Output::EnrollInProgress(_) => "enroll_in_progress",
            Output::LedPatternActivate(_) => "led_pattern_activate",
            Output::LedPatternDeactivate(_) => "led_pattern_deactivate",
            Output::InactivityEvent(_) => "inactivity_event",
            Output::NgfEvent(_) => "ngfd_event_request",
            Output::DisplayStateRequest(_) => "display_state_request",
            Output::TklockRequest(_) => "tklock_request",
            Output::UserActivity(_) => "user_activity_event",
        }
    }
}
