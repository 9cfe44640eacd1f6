//! Fingerprint wakeup policy
//!
//! Mirrors the bus signals that matter for fingerprint wakeups and reduces
//! them to a single `allowed` flag. Denial takes effect immediately, while
//! allowing only happens after the inputs have stayed favorable for the
//! whole allow delay.
//!
//! A successful identification "primes" the policy. The wakeup itself is
//! attempted a little later via [`WakePolicy::trigger`]; any power key
//! activity in between unprimes and the wakeup is dropped.

use tracing::{debug, info};

use mce_protocol::{
    BusSignal, CoverState, DeviceLockState, DisplayState, ServiceState, Submode, SystemState,
};

use crate::constants::NGF_EVENT_UNLOCK_DEVICE;
use crate::datapipe::{ActivityEvent, Gesture, Output, TklockRequest};
use crate::effects::{Outbox, PendingTimer, TimerHandle};
use crate::settings::{FpWakeupMode, FpWakeupSettings};

/// Cached copies of the upstream signals
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PolicyInputs {
    pub fpd_service_state: ServiceState,
    pub system_state: SystemState,
    pub devicelock_state: DeviceLockState,
    pub submode: Submode,
    pub display_state_next: DisplayState,
    pub interaction_expected: bool,
    pub topmost_window_pid: Option<u32>,
    pub proximity: CoverState,
    pub lid: CoverState,
    pub powerkey_pressed: bool,
}

#[derive(Debug, Default)]
pub struct WakePolicy {
    inputs: PolicyInputs,
    allowed: bool,
    primed: bool,
    allow_timer: Option<PendingTimer>,
}

/// Store `new` into `slot`, logging and reporting whether it changed
fn update<T: PartialEq + std::fmt::Debug>(name: &str, slot: &mut T, new: T) -> bool {
    if *slot == new {
        return false;
    }
    debug!("{}: {:?} -> {:?}", name, slot, new);
    *slot = new;
    true
}

impl WakePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inputs(&self) -> &PolicyInputs {
        &self.inputs
    }

    pub fn allowed(&self) -> bool {
        self.allowed
    }

    pub fn primed(&self) -> bool {
        self.primed
    }

    pub fn service_running(&self) -> bool {
        self.inputs.fpd_service_state == ServiceState::Running
    }

    pub fn has_allow_timer(&self) -> bool {
        self.allow_timer.is_some()
    }

    /// Update the cached inputs; returns true if anything changed
    ///
    /// Key events are not handled here, see [`WakePolicy::on_power_key`].
    pub fn apply_signal(&mut self, signal: &BusSignal) -> bool {
        let name = signal.type_name();
        let inputs = &mut self.inputs;
        match *signal {
            BusSignal::FpdServiceState(v) => update(name, &mut inputs.fpd_service_state, v),
            BusSignal::SystemState(v) => update(name, &mut inputs.system_state, v),
            BusSignal::DeviceLockState(v) => update(name, &mut inputs.devicelock_state, v),
            BusSignal::Submode(v) => update(name, &mut inputs.submode, v),
            BusSignal::DisplayStateNext(v) => update(name, &mut inputs.display_state_next, v),
            BusSignal::InteractionExpected(v) => update(name, &mut inputs.interaction_expected, v),
            BusSignal::TopmostWindowPid(v) => update(name, &mut inputs.topmost_window_pid, v),
            BusSignal::ProximitySensor(v) => update(name, &mut inputs.proximity, v),
            BusSignal::LidSensor(v) => update(name, &mut inputs.lid, v),
            BusSignal::Key(_) => false,
        }
    }

    /// First reason why wakeups are currently denied, if any
    pub fn deny_reason(&self, settings: &FpWakeupSettings, have_fingerprints: bool) -> Option<&'static str> {
        let inputs = &self.inputs;

        if inputs.system_state != SystemState::User {
            return Some("not in user mode");
        }
        if inputs.fpd_service_state != ServiceState::Running {
            return Some("fpd not running");
        }
        if !have_fingerprints {
            return Some("no fingerprints enrolled");
        }

        match settings.mode {
            FpWakeupMode::Never => return Some("disabled in settings"),
            FpWakeupMode::Always => {
                if inputs.lid == CoverState::Closed {
                    return Some("lid closed");
                }
            }
            FpWakeupMode::NoProximity => {
                if inputs.lid == CoverState::Closed {
                    return Some("lid closed");
                }
                if inputs.proximity != CoverState::Open {
                    return Some("proximity sensor not open");
                }
            }
        }

        if inputs.powerkey_pressed {
            return Some("power key pressed");
        }

        match inputs.display_state_next {
            DisplayState::Off | DisplayState::LpmOff => None,
            DisplayState::LpmOn => {
                if inputs.devicelock_state != DeviceLockState::Unlocked {
                    return Some("lpm display with device locked");
                }
                None
            }
            DisplayState::On | DisplayState::Dim => {
                if inputs.devicelock_state != DeviceLockState::Unlocked {
                    return Some("display on with device locked");
                }
                if !inputs.submode.contains(Submode::TKLOCK) {
                    return Some("display on without lockscreen");
                }
                if inputs.interaction_expected {
                    return Some("interaction expected");
                }
                if inputs.topmost_window_pid.is_some() {
                    return Some("application on top of lockscreen");
                }
                None
            }
            _ => Some("display in transition"),
        }
    }

    pub fn evaluate_allowed(&self, settings: &FpWakeupSettings, have_fingerprints: bool) -> bool {
        self.deny_reason(settings, have_fingerprints).is_none()
    }

    /// Apply the current evaluation with allow-side hysteresis
    pub fn update_allowed(&mut self, settings: &FpWakeupSettings, have_fingerprints: bool, outbox: &mut Outbox) {
        match self.deny_reason(settings, have_fingerprints) {
            Some(reason) => {
                if let Some(timer) = self.allow_timer.take() {
                    debug!("allow delay cancelled: {}", reason);
                    outbox.cancel_timer(timer);
                }
                if self.allowed {
                    info!("fpwakeup allowed: true -> false ({})", reason);
                    self.allowed = false;
                    outbox.request_rethink();
                }
            }
            None => {
                if !self.allowed && self.allow_timer.is_none() {
                    debug!("allow delay started: {:?}", settings.allow_delay());
                    self.allow_timer = Some(outbox.arm_timer(settings.allow_delay()));
                }
            }
        }
    }

    /// Allow delay expiry; returns false if the handle is not ours
    pub fn handle_timer(&mut self, handle: TimerHandle, outbox: &mut Outbox) -> bool {
        if self.allow_timer.as_ref().map(PendingTimer::handle) != Some(handle) {
            return false;
        }
        self.allow_timer = None;
        if !self.allowed {
            info!("fpwakeup allowed: false -> true");
            self.allowed = true;
        }
        outbox.request_rethink();
        true
    }

    pub fn prime(&mut self) {
        if !self.primed {
            debug!("fpwakeup primed");
            self.primed = true;
        }
    }

    pub fn unprime(&mut self) {
        if self.primed {
            debug!("fpwakeup unprimed");
            self.primed = false;
        }
    }

    /// Power key press or release; takes priority over fingerprint wakeups
    pub fn on_power_key(&mut self, pressed: bool, outbox: &mut Outbox) {
        self.unprime();
        update("powerkey_pressed", &mut self.inputs.powerkey_pressed, pressed);
        if pressed {
            if let Some(timer) = self.allow_timer.take() {
                outbox.cancel_timer(timer);
            }
            if self.allowed {
                info!("fpwakeup allowed: true -> false (power key pressed)");
                self.allowed = false;
            }
        }
        outbox.request_rethink();
    }

    /// Wake the device if still primed and allowed; returns true if it did
    pub fn trigger(&mut self, outbox: &mut Outbox) -> bool {
        let primed = std::mem::replace(&mut self.primed, false);
        if !primed {
            info!("fpwakeup ignored: unprimed");
            return false;
        }
        if !self.allowed {
            info!("fpwakeup ignored: not allowed");
            return false;
        }

        info!("fpwakeup triggered");
        outbox.publish(Output::NgfEvent(NGF_EVENT_UNLOCK_DEVICE));
        outbox.publish(Output::DisplayStateRequest(DisplayState::On));
        outbox.publish(Output::TklockRequest(TklockRequest::Off));
        outbox.publish(Output::UserActivity(ActivityEvent::Gesture {
            gesture: Gesture::DoubleTap,
            synthesized: true,
        }));
        true
    }

    pub fn shutdown(&mut self, outbox: &mut Outbox) {
        if let Some(timer) = self.allow_timer.take() {
            outbox.cancel_timer(timer);
        }
        self.allowed = false;
        self.primed = false;
    }
}
