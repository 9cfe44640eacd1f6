/*
 * Integration tests for mce
 *
 * These drive the fingerprint module the way mced does, with a virtual
 * clock standing in for the timer tasks and a recorder standing in for
 * the fpd link.
 */

use mce::{FingerprintModule, FpWakeupSettings, SettingsStore};
use mce_core::datapipe::{Output, TklockRequest};
use mce_core::effects::{CallError, CallHandle, Effect, TimerHandle};
use mce_core::settings::{FpWakeupMode, SettingChange};
use mce_core::{OperationState, Wakelock};
use mce_protocol::{
    BusSignal, CoverState, DeviceLockState, DisplayState, FpdReply, FpdReplyCode, FpdRequest, FpdSignal,
    KeyEvent, ServiceState, SystemState,
};
use serial_test::serial;

// Test utilities

struct Driver {
    module: FingerprintModule,
    wakelock: Wakelock,
    /// Virtual time in milliseconds
    now: u64,
    timers: Vec<(TimerHandle, u64)>,
    calls: Vec<(CallHandle, FpdRequest)>,
    cancelled: Vec<CallHandle>,
    outputs: Vec<Output>,
}

impl Driver {
    fn new(settings: FpWakeupSettings) -> Self {
        let wakelock = Wakelock::disabled("mce_test");
        let module = FingerprintModule::new(settings, wakelock.clone());
        let mut driver = Self {
            module,
            wakelock,
            now: 0,
            timers: Vec::new(),
            calls: Vec::new(),
            cancelled: Vec::new(),
            outputs: Vec::new(),
        };
        driver.pump();
        driver
    }

    fn with_mode(mode: FpWakeupMode) -> Self {
        Self::new(FpWakeupSettings { mode, ..FpWakeupSettings::default() })
    }

    /// Execute effects and run rethink passes until nothing is left
    fn pump(&mut self) {
        for _ in 0..64 {
            for effect in self.module.drain_effects() {
                match effect {
                    Effect::BeginCall { handle, request } => self.calls.push((handle, request)),
                    Effect::CancelCall { handle } => {
                        self.calls.retain(|(h, _)| *h != handle);
                        self.cancelled.push(handle);
                    }
                    Effect::ArmTimer { handle, delay } => {
                        self.timers.push((handle, self.now + delay.as_millis() as u64))
                    }
                    Effect::CancelTimer { handle } => self.timers.retain(|(h, _)| *h != handle),
                    Effect::Publish(output) => self.outputs.push(output),
                }
            }

            let identify_calls = self
                .calls
                .iter()
                .filter(|(_, r)| matches!(r, FpdRequest::Identify | FpdRequest::Abort))
                .count();
            assert!(identify_calls <= 1, "more than one outstanding identify/abort call");

            if !self.module.rethink_pending() {
                return;
            }
            self.module.rethink();
        }
        panic!("module did not settle");
    }

    /// Advance virtual time, firing due timers in deadline order
    fn advance(&mut self, ms: u64) {
        let target = self.now + ms;
        loop {
            self.pump();
            let next = self
                .timers
                .iter()
                .enumerate()
                .filter(|(_, (_, deadline))| *deadline <= target)
                .min_by_key(|(_, (_, deadline))| *deadline)
                .map(|(i, _)| i);
            let Some(index) = next else { break };
            let (handle, deadline) = self.timers.remove(index);
            self.now = deadline;
            self.module.handle_timer(handle);
        }
        self.now = target;
        self.pump();
    }

    fn bus(&mut self, signal: BusSignal) {
        self.module.handle_bus_signal(&signal);
        self.pump();
    }

    fn fpd(&mut self, signal: FpdSignal) {
        self.module.handle_fpd_signal(&signal);
        self.pump();
    }

    fn power_key(&mut self, pressed: bool) {
        self.bus(BusSignal::Key(KeyEvent::power(pressed)));
    }

    /// Remove and return the outstanding call of the given kind
    fn take_call(&mut self, request: FpdRequest) -> Option<CallHandle> {
        let index = self.calls.iter().position(|(_, r)| *r == request)?;
        Some(self.calls.remove(index).0)
    }

    fn reply(&mut self, handle: CallHandle, reply: Result<FpdReply, CallError>) {
        self.calls.retain(|(h, _)| *h != handle);
        self.module.handle_reply(handle, reply);
        self.pump();
    }

    fn state(&self) -> OperationState {
        self.module.operation("identify").unwrap().state()
    }

    fn count(&self, output: &Output) -> usize {
        self.outputs.iter().filter(|o| *o == output).count()
    }

    /// Device asleep and locked, fpd idle with one enrolled fingerprint,
    /// and the allow delay already expired
    fn bring_up(&mut self) {
        for signal in [
            BusSignal::SystemState(SystemState::User),
            BusSignal::DeviceLockState(DeviceLockState::Locked),
            BusSignal::DisplayStateNext(DisplayState::Off),
            BusSignal::LidSensor(CoverState::Open),
            BusSignal::ProximitySensor(CoverState::Open),
            BusSignal::FpdServiceState(ServiceState::Running),
        ] {
            self.bus(signal);
        }

        let state = self.take_call(FpdRequest::GetState).expect("GetState query");
        let all = self.take_call(FpdRequest::GetAll).expect("GetAll query");
        self.reply(state, Ok(FpdReply::State("FPSTATE_IDLE".into())));
        self.reply(all, Ok(FpdReply::Names(vec!["alice".into()])));

        let delay = self.module.settings().allow_delay_ms as u64;
        self.advance(delay);
    }

    /// Identify accepted and a fingerprint recognized
    fn identify_alice(&mut self) {
        let call = self.take_call(FpdRequest::Identify).expect("identify call");
        self.reply(call, Ok(FpdReply::Code(FpdReplyCode::Started)));
        assert_eq!(self.state(), OperationState::Pending);
        self.fpd(FpdSignal::Identified { name: "alice".into() });
        assert_eq!(self.state(), OperationState::Success);
    }
}

const DISPLAY_ON: Output = Output::DisplayStateRequest(DisplayState::On);
const TKLOCK_OFF: Output = Output::TklockRequest(TklockRequest::Off);

// Scenarios

#[test]
fn test_identify_wakes_device() {
    let mut d = Driver::with_mode(FpWakeupMode::Always);
    d.bring_up();
    assert!(d.module.policy().allowed());
    assert_eq!(d.state(), OperationState::Request);

    d.identify_alice();
    assert!(d.module.policy().primed());

    d.advance(99);
    assert_eq!(d.count(&DISPLAY_ON), 0);

    d.advance(1);
    assert_eq!(d.count(&DISPLAY_ON), 1);
    assert_eq!(d.count(&TKLOCK_OFF), 1);
    assert!(!d.module.policy().primed());
    assert_eq!(d.state(), OperationState::Throttling);
}

#[test]
fn test_power_key_press_wins_race() {
    let mut d = Driver::with_mode(FpWakeupMode::Always);
    d.bring_up();
    d.identify_alice();

    d.advance(10);
    d.power_key(true);
    assert!(!d.module.policy().primed());

    d.advance(90);
    assert_eq!(d.count(&DISPLAY_ON), 0);
    assert_eq!(d.state(), OperationState::Throttling);

    // Nothing more happens while the key is held
    d.advance(5_000);
    assert_eq!(d.count(&DISPLAY_ON), 0);
    assert_eq!(d.state(), OperationState::Waiting);
}

#[test]
fn test_power_key_release_also_unprimes() {
    let mut d = Driver::with_mode(FpWakeupMode::Always);
    d.bring_up();
    d.identify_alice();

    d.power_key(false);
    assert!(!d.module.policy().primed());
    d.advance(1_000);
    assert_eq!(d.count(&DISPLAY_ON), 0);
}

#[test]
fn test_service_loss_while_pending_aborts() {
    let mut d = Driver::with_mode(FpWakeupMode::Always);
    d.bring_up();
    let call = d.take_call(FpdRequest::Identify).unwrap();
    d.reply(call, Ok(FpdReply::Code(FpdReplyCode::Started)));
    assert_eq!(d.state(), OperationState::Pending);

    d.bus(BusSignal::FpdServiceState(ServiceState::Stopped));
    // Aborted passes straight on to throttling
    assert_eq!(d.state(), OperationState::Throttling);
    assert!(!d.module.policy().allowed());
}

#[test]
fn test_service_loss_cancels_outstanding_call() {
    let mut d = Driver::with_mode(FpWakeupMode::Always);
    d.bring_up();
    let call = d.calls.iter().find(|(_, r)| *r == FpdRequest::Identify).unwrap().0;

    d.bus(BusSignal::FpdServiceState(ServiceState::Stopped));
    assert!(d.cancelled.contains(&call));
    assert_eq!(d.state(), OperationState::Throttling);

    // A late reply to the cancelled call is ignored
    d.reply(call, Ok(FpdReply::Code(FpdReplyCode::Started)));
    assert_eq!(d.state(), OperationState::Throttling);
}

/// Identify accepted, then the lid closes so the module starts aborting
fn abort_in_flight(d: &mut Driver) -> CallHandle {
    d.bring_up();
    let call = d.take_call(FpdRequest::Identify).unwrap();
    d.reply(call, Ok(FpdReply::Code(FpdReplyCode::Started)));
    d.bus(BusSignal::LidSensor(CoverState::Closed));
    assert_eq!(d.state(), OperationState::Abort);
    d.calls.iter().find(|(_, r)| *r == FpdRequest::Abort).expect("abort call").0
}

#[test]
fn test_service_loss_while_abort_call_in_flight() {
    let mut d = Driver::with_mode(FpWakeupMode::Always);
    let abort = abort_in_flight(&mut d);

    d.bus(BusSignal::FpdServiceState(ServiceState::Stopped));
    assert!(d.cancelled.contains(&abort));
    assert!(d.calls.is_empty());
    assert_eq!(d.state(), OperationState::Throttling);

    // fpd accepting the abort after the fact changes nothing
    d.reply(abort, Ok(FpdReply::Code(FpdReplyCode::Started)));
    assert_eq!(d.state(), OperationState::Throttling);
    d.advance(1_000);
    assert_eq!(d.state(), OperationState::Waiting);
    assert!(d.calls.is_empty());
}

#[test]
fn test_service_loss_while_aborting() {
    let mut d = Driver::with_mode(FpWakeupMode::Always);
    let abort = abort_in_flight(&mut d);
    d.take_call(FpdRequest::Abort);
    d.reply(abort, Ok(FpdReply::Code(FpdReplyCode::Started)));
    assert_eq!(d.state(), OperationState::Aborting);

    d.bus(BusSignal::FpdServiceState(ServiceState::Stopped));
    assert_eq!(d.state(), OperationState::Throttling);
    let throttle = d.module.operation("identify").unwrap().timer_handle();
    assert!(throttle.is_some());

    // Stale broadcasts from the old fpd instance do not restart anything
    d.fpd(FpdSignal::StateChanged { state: "FPSTATE_IDLE".into() });
    d.fpd(FpdSignal::Aborted);
    assert_eq!(d.state(), OperationState::Throttling);
    assert_eq!(d.module.operation("identify").unwrap().timer_handle(), throttle);

    d.advance(1_000);
    assert_eq!(d.state(), OperationState::Waiting);
    assert!(d.calls.is_empty());
}

#[test]
fn test_mode_never_denies_everything() {
    let mut d = Driver::with_mode(FpWakeupMode::Never);
    d.bring_up();
    d.advance(10_000);

    let policy = d.module.policy();
    assert!(!policy.evaluate_allowed(d.module.settings(), true));
    assert_eq!(policy.deny_reason(d.module.settings(), true), Some("disabled in settings"));
    assert_eq!(d.state(), OperationState::Waiting);
    assert!(d.take_call(FpdRequest::Identify).is_none());
}

#[test]
fn test_closed_lid_denies_in_always_mode() {
    let mut d = Driver::with_mode(FpWakeupMode::Always);
    d.bring_up();
    d.bus(BusSignal::LidSensor(CoverState::Closed));

    let policy = d.module.policy();
    assert!(!policy.evaluate_allowed(d.module.settings(), true));
    assert_eq!(policy.deny_reason(d.module.settings(), true), Some("lid closed"));
    assert!(!policy.allowed());
}

// Laws

#[test]
fn test_allow_hysteresis() {
    let mut d = Driver::with_mode(FpWakeupMode::Always);
    d.bring_up();
    assert!(d.module.policy().allowed());

    // Denial takes effect immediately
    d.bus(BusSignal::LidSensor(CoverState::Closed));
    assert!(!d.module.policy().allowed());

    // A flicker shorter than the allow delay does not allow
    d.bus(BusSignal::LidSensor(CoverState::Open));
    d.advance(300);
    d.bus(BusSignal::LidSensor(CoverState::Closed));
    d.bus(BusSignal::LidSensor(CoverState::Open));
    d.advance(300);
    assert!(!d.module.policy().allowed());

    // Sustained allow for the full delay does
    d.advance(200);
    assert!(d.module.policy().allowed());
}

#[test]
fn test_leaving_success_early_drops_wakeup() {
    let mut d = Driver::with_mode(FpWakeupMode::Always);
    d.bring_up();
    d.identify_alice();
    let trigger = d.module.operation("identify").unwrap().timer_handle().unwrap();

    d.bus(BusSignal::FpdServiceState(ServiceState::Stopped));
    assert!(!d.module.policy().primed());

    // The old trigger timer firing anyway is ignored
    d.module.handle_timer(trigger);
    d.pump();
    assert_eq!(d.count(&DISPLAY_ON), 0);
}

#[test]
fn test_abort_when_disallowed() {
    let mut d = Driver::with_mode(FpWakeupMode::Always);
    d.bring_up();
    let call = d.take_call(FpdRequest::Identify).unwrap();
    d.reply(call, Ok(FpdReply::Code(FpdReplyCode::Started)));

    d.bus(BusSignal::LidSensor(CoverState::Closed));
    assert_eq!(d.state(), OperationState::Abort);
    let abort = d.take_call(FpdRequest::Abort).expect("abort call");

    d.reply(abort, Ok(FpdReply::Code(FpdReplyCode::Started)));
    assert_eq!(d.state(), OperationState::Aborting);
    d.fpd(FpdSignal::StateChanged { state: "FPSTATE_ABORTING".into() });
    assert_eq!(d.state(), OperationState::Aborting);

    d.fpd(FpdSignal::StateChanged { state: "FPSTATE_IDLE".into() });
    assert_eq!(d.state(), OperationState::Throttling);
    d.advance(1_000);
    assert_eq!(d.state(), OperationState::Waiting);
}

#[test]
fn test_failed_identify_retries_after_throttle() {
    let mut d = Driver::with_mode(FpWakeupMode::Always);
    d.bring_up();
    let call = d.take_call(FpdRequest::Identify).unwrap();
    d.reply(call, Err(CallError::Timeout));
    assert_eq!(d.state(), OperationState::Throttling);

    d.advance(249);
    assert!(d.take_call(FpdRequest::Identify).is_none());
    d.advance(1);
    assert_eq!(d.state(), OperationState::Request);
    assert!(d.take_call(FpdRequest::Identify).is_some());
}

#[test]
fn test_removing_last_fingerprint_denies() {
    let mut d = Driver::with_mode(FpWakeupMode::Always);
    d.bring_up();
    d.fpd(FpdSignal::Removed { name: "alice".into() });
    assert!(d.module.data().is_empty());
    assert!(!d.module.policy().allowed());
}

#[test]
fn test_shutdown_releases_everything() {
    let mut d = Driver::with_mode(FpWakeupMode::Always);
    d.bring_up();
    d.identify_alice();
    assert!(d.wakelock.count() > 0);

    d.module.shutdown();
    d.pump();
    assert_eq!(d.wakelock.count(), 0);
    assert!(d.timers.is_empty());
    assert!(d.module.data().is_empty());

    d.module.shutdown();
    assert!(d.module.drain_effects().is_empty());
}

#[test]
#[serial]
fn test_setting_persisted_and_applied() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("fingerprint.json");
    let mut store = SettingsStore::load(&path).unwrap();
    assert_eq!(store.settings().mode, FpWakeupMode::Never);

    let mut d = Driver::new(store.settings().clone());
    d.bring_up();
    assert!(!d.module.policy().allowed());

    let change = store.set("/system/osso/dsm/fingerprint/mode", 1).unwrap().unwrap();
    assert_eq!(change, SettingChange::Mode(FpWakeupMode::Always));
    d.module.handle_setting_change(change);
    d.advance(500);
    assert!(d.module.policy().allowed());

    let reloaded = SettingsStore::load(&path).unwrap();
    assert_eq!(reloaded.settings().mode, FpWakeupMode::Always);
}

#[test]
#[serial]
fn test_invalid_setting_rejected() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut store = SettingsStore::load(dir.path().join("fingerprint.json")).unwrap();
    assert!(store.set("/system/osso/dsm/fingerprint/mode", 7).is_err());
    assert!(store.set("/system/osso/dsm/fingerprint/bogus", 1).is_err());
    assert_eq!(store.settings(), &FpWakeupSettings::default());
}
