//! Fingerprint daemon tracking and fingerprint wakeups
//!
//! [`FingerprintModule`] is the single owner of everything fingerprint
//! related: the cached fpd state, the enrolled fingerprint set, the wake
//! policy and the table of operations run against fpd.
//!
//! The event loop feeds it bus signals, fpd signals, method call replies
//! and timer expiries, then drains the resulting effects. Whenever
//! [`FingerprintModule::rethink_pending`] reports true, the loop should run
//! [`FingerprintModule::rethink`] once it has nothing more urgent to do.

mod data;
mod identify;
mod operation;
mod policy;

use std::time::Duration;
use tracing::{debug, info, warn};

use mce_protocol::{
    BusSignal, DeviceLockState, FingerprintStatus, FpState, FpdReply, FpdRequest, FpdSignal,
    Submode, SystemState,
};

use crate::constants::{leds, timing};
use crate::datapipe::Output;
use crate::effects::{CallError, CallHandle, Effect, Outbox, PendingCall, PendingTimer, TimerHandle};
use crate::settings::{FpWakeupSettings, SettingChange};
use crate::wakelock::Wakelock;

pub use data::FingerprintData;
pub use identify::IdentifyOperation;
pub use operation::{OpEnv, Operation, OperationHooks, OperationState, ResultEvent};
pub use policy::{PolicyInputs, WakePolicy};

/// Operations instantiated at startup
static OPERATIONS: &[&dyn OperationHooks] = &[&identify::IDENTIFY];

/// Led pattern that remembers whether it is active
#[derive(Debug)]
struct LedPattern {
    name: &'static str,
    active: bool,
}

impl LedPattern {
    const fn new(name: &'static str) -> Self {
        Self { name, active: false }
    }

    fn set(&mut self, active: bool, outbox: &mut Outbox) {
        if self.active == active {
            return;
        }
        self.active = active;
        outbox.publish(if active {
            Output::LedPatternActivate(self.name)
        } else {
            Output::LedPatternDeactivate(self.name)
        });
    }
}

pub struct FingerprintModule {
    settings: FpWakeupSettings,
    policy: WakePolicy,
    data: FingerprintData,
    operations: Vec<Operation>,
    outbox: Outbox,
    fpstate: FpState,
    enroll_in_progress: bool,
    scanning_led: LedPattern,
    acquired_led: LedPattern,
    acquired_led_timer: Option<PendingTimer>,
    state_query: Option<PendingCall>,
    data_query: Option<PendingCall>,
    shut_down: bool,
}

impl FingerprintModule {
    pub fn new(settings: FpWakeupSettings, wakelock: Wakelock) -> Self {
        let mut module = Self {
            settings,
            policy: WakePolicy::new(),
            data: FingerprintData::new(),
            operations: OPERATIONS.iter().map(|hooks| Operation::new(*hooks)).collect(),
            outbox: Outbox::new(wakelock),
            fpstate: FpState::Unset,
            enroll_in_progress: false,
            scanning_led: LedPattern::new(leds::PATTERN_SCANNING_FINGERPRINT),
            acquired_led: LedPattern::new(leds::PATTERN_FINGERPRINT_ACQUIRED),
            acquired_led_timer: None,
            state_query: None,
            data_query: None,
            shut_down: false,
        };

        module.with_operations(|op, env| {
            op.start(env);
            false
        });
        module.outbox.request_rethink();
        module
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn settings(&self) -> &FpWakeupSettings {
        &self.settings
    }

    pub fn policy(&self) -> &WakePolicy {
        &self.policy
    }

    pub fn data(&self) -> &FingerprintData {
        &self.data
    }

    pub fn fpstate(&self) -> FpState {
        self.fpstate
    }

    pub fn enroll_in_progress(&self) -> bool {
        self.enroll_in_progress
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.name() == name)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn status(&self) -> FingerprintStatus {
        let (operation, operation_state) = self
            .operations
            .first()
            .map(|op| (op.name().to_string(), op.state().as_str().to_string()))
            .unwrap_or_default();
        FingerprintStatus {
            service: self.policy.inputs().fpd_service_state,
            fpstate: self.fpstate,
            operation,
            operation_state,
            allowed: self.policy.allowed(),
            primed: self.policy.primed(),
            enrolled: self.data.len(),
            enroll_in_progress: self.enroll_in_progress,
        }
    }

    // ------------------------------------------------------------------
    // Event entry points
    // ------------------------------------------------------------------

    pub fn handle_bus_signal(&mut self, signal: &BusSignal) {
        if self.shut_down {
            return;
        }

        if let BusSignal::Key(key) = signal {
            if key.is_power_key() {
                debug!("power key {}", if key.pressed { "pressed" } else { "released" });
                self.policy.on_power_key(key.pressed, &mut self.outbox);
            }
            return;
        }

        if !self.policy.apply_signal(signal) {
            return;
        }

        match signal {
            BusSignal::FpdServiceState(_) => self.update_service_state(),
            BusSignal::SystemState(_)
            | BusSignal::DeviceLockState(_)
            | BusSignal::Submode(_)
            | BusSignal::DisplayStateNext(_) => self.update_enroll_in_progress(),
            _ => {}
        }
        self.outbox.request_rethink();
    }

    pub fn handle_fpd_signal(&mut self, signal: &FpdSignal) {
        if self.shut_down {
            return;
        }
        debug!("fpd signal: {}", signal.type_name());

        match signal {
            FpdSignal::StateChanged { state } => self.fpstate_reported(FpState::parse(state)),
            FpdSignal::AcquisitionInfo { info } => {
                debug!("fpacquired: {}", info);
                if self.fpstate.is_scanning() {
                    self.generate_activity();
                }
                self.trigger_acquired_led();
            }
            FpdSignal::Added { name } => {
                if self.data.add(name) {
                    self.outbox.request_rethink();
                }
            }
            FpdSignal::Removed { name } => {
                if self.data.remove(name) {
                    self.outbox.request_rethink();
                }
            }
            FpdSignal::Identified { name } => {
                info!("fingerprint identified: {}", name);
                self.deliver_result(ResultEvent::Identified);
            }
            FpdSignal::Verified { name } => {
                info!("fingerprint verified: {}", name);
                self.deliver_result(ResultEvent::Verified);
            }
            FpdSignal::Aborted => self.deliver_result(ResultEvent::Aborted),
            FpdSignal::Failed => self.deliver_result(ResultEvent::Failed),
            FpdSignal::ErrorInfo { info } => info!("fperror: {}", info),
            FpdSignal::EnrollProgressChanged { percent } => info!("fpprogress: {}%", percent),
        }
    }

    /// Method call completion; stale handles are ignored
    pub fn handle_reply(&mut self, handle: CallHandle, reply: Result<FpdReply, CallError>) {
        if self.shut_down {
            return;
        }

        if take_if_matches(&mut self.state_query, handle).is_some() {
            self.state_query_done(reply);
            return;
        }
        if take_if_matches(&mut self.data_query, handle).is_some() {
            self.data_query_done(reply);
            return;
        }

        if !self.with_operations(|op, env| op.handle_reply(env, handle, reply.clone())) {
            debug!("stale reply {:?} ignored", handle);
        }
    }

    /// Timer expiry; stale handles are ignored
    pub fn handle_timer(&mut self, handle: TimerHandle) {
        if self.shut_down {
            return;
        }

        if self.policy.handle_timer(handle, &mut self.outbox) {
            return;
        }

        if self.acquired_led_timer.as_ref().map(PendingTimer::handle) == Some(handle) {
            self.acquired_led_timer = None;
            self.acquired_led.set(false, &mut self.outbox);
            return;
        }

        if !self.with_operations(|op, env| op.handle_timer(env, handle)) {
            debug!("stale timer {:?} ignored", handle);
        }
    }

    /// Hot reloaded setting; delays apply the next time a timer is armed
    pub fn handle_setting_change(&mut self, change: SettingChange) {
        if self.shut_down {
            return;
        }
        if self.settings.apply(change) {
            debug!("setting {} changed", change.key());
            self.outbox.request_rethink();
        }
    }

    pub fn rethink_pending(&self) -> bool {
        !self.shut_down && self.outbox.rethink_requested()
    }

    /// One evaluation pass over the policy and all operations
    ///
    /// Transitions made during the pass request another pass instead of
    /// recursing.
    pub fn rethink(&mut self) {
        if self.shut_down || !self.outbox.take_rethink() {
            return;
        }

        let have_fingerprints = !self.data.is_empty();
        self.policy.update_allowed(&self.settings, have_fingerprints, &mut self.outbox);

        self.with_operations(|op, env| {
            op.evaluate(env);
            false
        });
    }

    pub fn drain_effects(&mut self) -> Vec<Effect> {
        self.outbox.drain()
    }

    /// Cancel everything outstanding; safe to call more than once
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        info!("fingerprint module shutting down");

        self.with_operations(|op, env| {
            op.shutdown(env);
            false
        });
        self.policy.shutdown(&mut self.outbox);
        self.cancel_queries();
        if let Some(timer) = self.acquired_led_timer.take() {
            self.outbox.cancel_timer(timer);
        }
        self.acquired_led.set(false, &mut self.outbox);
        self.scanning_led.set(false, &mut self.outbox);
        if self.enroll_in_progress {
            self.enroll_in_progress = false;
            self.outbox.publish(Output::EnrollInProgress(false));
        }
        self.data.clear();
        self.outbox.take_rethink();
        self.shut_down = true;
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Run `f` on each operation in table order until it returns true
    fn with_operations(&mut self, mut f: impl FnMut(&mut Operation, &mut OpEnv<'_>) -> bool) -> bool {
        let Self { settings, policy, outbox, operations, .. } = self;
        let mut env = OpEnv { settings, policy, outbox };
        operations.iter_mut().any(|op| f(op, &mut env))
    }

    fn deliver_result(&mut self, event: ResultEvent) {
        self.with_operations(|op, env| {
            op.deliver_result(env, event);
            false
        });
    }

    fn update_service_state(&mut self) {
        if self.policy.service_running() {
            info!("fpd is running");
            self.start_queries();
        } else {
            info!("fpd is not running");
            self.cancel_queries();
            self.fpstate_reported(FpState::Unset);
            if self.data.clear() {
                debug!("fingerprint cache cleared");
            }
        }
    }

    fn start_queries(&mut self) {
        self.cancel_queries();
        self.state_query = Some(self.outbox.begin_call(FpdRequest::GetState));
        self.data_query = Some(self.outbox.begin_call(FpdRequest::GetAll));
    }

    fn cancel_queries(&mut self) {
        if let Some(call) = self.state_query.take() {
            self.outbox.cancel_call(call);
        }
        if let Some(call) = self.data_query.take() {
            self.outbox.cancel_call(call);
        }
    }

    fn state_query_done(&mut self, reply: Result<FpdReply, CallError>) {
        match reply {
            Ok(FpdReply::State(state)) => self.fpstate_reported(FpState::parse(&state)),
            Ok(other) => warn!("GetState: unexpected {} reply", other.type_name()),
            Err(e) => warn!("GetState: {}", e),
        }
    }

    fn data_query_done(&mut self, reply: Result<FpdReply, CallError>) {
        match reply {
            Ok(FpdReply::Names(names)) => {
                if self.data.replace(&names) {
                    self.outbox.request_rethink();
                }
            }
            Ok(other) => warn!("GetAll: unexpected {} reply", other.type_name()),
            Err(e) => warn!("GetAll: {}", e),
        }
    }

    /// fpd told us its state, either by signal or by query reply
    fn fpstate_reported(&mut self, state: FpState) {
        for op in self.operations.iter_mut() {
            op.set_fpstate(state);
        }
        self.outbox.request_rethink();

        let prev = std::mem::replace(&mut self.fpstate, state);
        if prev == state {
            return;
        }
        info!("fpstate: {} -> {}", prev, state);
        self.outbox.publish(Output::FpState(state));
        self.scanning_led.set(state.is_scanning(), &mut self.outbox);
        self.update_enroll_in_progress();
    }

    fn evaluate_enroll_in_progress(&self) -> bool {
        let inputs = self.policy.inputs();
        self.fpstate == FpState::Enrolling
            && inputs.display_state_next.is_powered_on()
            && !inputs.submode.contains(Submode::TKLOCK)
            && inputs.devicelock_state == DeviceLockState::Unlocked
            && inputs.system_state == SystemState::User
    }

    fn update_enroll_in_progress(&mut self) {
        let in_progress = self.evaluate_enroll_in_progress();
        if in_progress == self.enroll_in_progress {
            return;
        }
        info!("enroll_in_progress: {} -> {}", self.enroll_in_progress, in_progress);
        self.enroll_in_progress = in_progress;
        self.outbox.publish(Output::EnrollInProgress(in_progress));
    }

    /// Sensor activity counts as user activity while the display is on
    fn generate_activity(&mut self) {
        if !self.policy.inputs().display_state_next.is_powered_on() {
            return;
        }
        debug!("generating activity from fingerprint sensor");
        self.outbox.publish(Output::InactivityEvent(false));
    }

    fn trigger_acquired_led(&mut self) {
        if let Some(timer) = self.acquired_led_timer.take() {
            self.outbox.cancel_timer(timer);
        }
        let delay = Duration::from_millis(timing::ACQUIRED_LED_DURATION_MS);
        self.acquired_led_timer = Some(self.outbox.arm_timer(delay));
        self.acquired_led.set(true, &mut self.outbox);
    }
}

impl Drop for FingerprintModule {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn take_if_matches(slot: &mut Option<PendingCall>, handle: CallHandle) -> Option<PendingCall> {
    if slot.as_ref().map(PendingCall::handle) == Some(handle) {
        slot.take()
    } else {
        None
    }
}
