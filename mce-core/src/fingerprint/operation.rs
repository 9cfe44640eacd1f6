//! Generic fpd operation state machine
//!
//! An [`Operation`] is mechanical: it owns the current [`OperationState`],
//! at most one outstanding fpd call and at most one armed timer, and it
//! forwards everything else to an [`OperationHooks`] implementation that
//! decides what each state actually means.
//!
//! Hooks never evaluate recursively. A transition only requests another
//! evaluation pass through the outbox; the module runs it later.

use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info};

use mce_protocol::{FpState, FpdReply, FpdRequest};

use crate::effects::{CallError, CallHandle, Outbox, PendingCall, PendingTimer, TimerHandle};
use crate::settings::FpWakeupSettings;

use super::policy::WakePolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationState {
    /// Initial state used only during construction
    Initialize,
    /// Waiting for fpd and policy to allow the operation
    Waiting,
    /// Method call to start the operation is in flight
    Request,
    /// fpd accepted the request, waiting for a result signal
    Pending,
    Success,
    Failure,
    /// Method call to abort the operation is in flight
    Abort,
    /// fpd accepted the abort, waiting for it to go idle
    Aborting,
    Aborted,
    /// Cooldown before returning to Waiting
    Throttling,
}

impl OperationState {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationState::Initialize => "INITIALIZE",
            OperationState::Waiting => "WAITING",
            OperationState::Request => "REQUEST",
            OperationState::Pending => "PENDING",
            OperationState::Success => "SUCCESS",
            OperationState::Failure => "FAILURE",
            OperationState::Abort => "ABORT",
            OperationState::Aborting => "ABORTING",
            OperationState::Aborted => "ABORTED",
            OperationState::Throttling => "THROTTLING",
        }
    }

    /// States in which losing fpd forces an abort
    fn requires_service(self) -> bool {
        matches!(
            self,
            OperationState::Request
                | OperationState::Pending
                | OperationState::Success
                | OperationState::Failure
                | OperationState::Abort
                | OperationState::Aborting
        )
    }

    /// States allowed to be entered while a method call is outstanding
    fn may_hold_call(self) -> bool {
        matches!(self, OperationState::Request | OperationState::Abort)
    }

    /// States allowed to be entered while a timer is armed
    fn may_hold_timer(self) -> bool {
        matches!(self, OperationState::Throttling)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation results broadcast by fpd
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultEvent {
    Aborted,
    Failed,
    Identified,
    Verified,
}

impl ResultEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultEvent::Aborted => "ABORTED",
            ResultEvent::Failed => "FAILED",
            ResultEvent::Identified => "IDENTIFIED",
            ResultEvent::Verified => "VERIFIED",
        }
    }
}

/// Module state a hook may look at or act on
pub struct OpEnv<'a> {
    pub settings: &'a FpWakeupSettings,
    pub policy: &'a mut WakePolicy,
    pub outbox: &'a mut Outbox,
}

impl OpEnv<'_> {
    /// fpd is currently reachable
    pub fn service_running(&self) -> bool {
        self.policy.service_running()
    }
}

/// Per operation behavior
///
/// Every method has a no-op default so an implementation only needs to
/// describe the states it cares about.
pub trait OperationHooks: Sync {
    fn name(&self) -> &'static str;

    fn enter(&self, _op: &mut Operation, _env: &mut OpEnv<'_>) {}

    fn leave(&self, _op: &mut Operation, _env: &mut OpEnv<'_>) {}

    fn evaluate(&self, _op: &mut Operation, _env: &mut OpEnv<'_>) {}

    fn result(&self, _op: &mut Operation, _env: &mut OpEnv<'_>, _event: ResultEvent) {}

    fn reply(&self, _op: &mut Operation, _env: &mut OpEnv<'_>, _reply: Result<FpdReply, CallError>) {}

    fn timer(&self, _op: &mut Operation, _env: &mut OpEnv<'_>) {}
}

pub struct Operation {
    state: OperationState,
    fpstate: FpState,
    call: Option<PendingCall>,
    timer: Option<PendingTimer>,
    hooks: &'static dyn OperationHooks,
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name())
            .field("state", &self.state)
            .field("fpstate", &self.fpstate)
            .field("call", &self.call)
            .field("timer", &self.timer)
            .finish()
    }
}

impl Operation {
    pub fn new(hooks: &'static dyn OperationHooks) -> Self {
        Self {
            state: OperationState::Initialize,
            fpstate: FpState::Unset,
            call: None,
            timer: None,
            hooks,
        }
    }

    pub fn name(&self) -> &'static str {
        self.hooks.name()
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    /// fpd state as last seen by this operation
    pub fn fpstate(&self) -> FpState {
        self.fpstate
    }

    pub fn set_fpstate(&mut self, fpstate: FpState) {
        if self.fpstate != fpstate {
            debug!("{}: fpstate {} -> {}", self.name(), self.fpstate, fpstate);
            self.fpstate = fpstate;
        }
    }

    pub fn has_pending_call(&self) -> bool {
        self.call.is_some()
    }

    pub fn has_pending_timer(&self) -> bool {
        self.timer.is_some()
    }

    pub fn call_handle(&self) -> Option<CallHandle> {
        self.call.as_ref().map(PendingCall::handle)
    }

    pub fn timer_handle(&self) -> Option<TimerHandle> {
        self.timer.as_ref().map(PendingTimer::handle)
    }

    /// Run the enter hook of the constructor state
    pub fn start(&mut self, env: &mut OpEnv<'_>) {
        let hooks = self.hooks;
        hooks.enter(self, env);
    }

    pub fn transition(&mut self, env: &mut OpEnv<'_>, state: OperationState) {
        if self.state == state {
            return;
        }

        let hooks = self.hooks;
        hooks.leave(self, env);

        if self.call.is_some() && !state.may_hold_call() {
            error!("{}: entering {} with a pending call", self.name(), state);
            self.cancel_call(env);
        }
        if self.timer.is_some() && !state.may_hold_timer() {
            error!("{}: entering {} with a pending timer", self.name(), state);
            self.cancel_timer(env);
        }

        info!("{}: {} -> {}", self.name(), self.state, state);
        self.state = state;

        hooks.enter(self, env);
        env.outbox.request_rethink();
    }

    /// Evaluation pass: loss of fpd overrides whatever the hooks would do
    pub fn evaluate(&mut self, env: &mut OpEnv<'_>) {
        if !env.service_running() && self.state.requires_service() {
            self.transition(env, OperationState::Aborted);
            return;
        }
        let hooks = self.hooks;
        hooks.evaluate(self, env);
    }

    pub fn deliver_result(&mut self, env: &mut OpEnv<'_>, event: ResultEvent) {
        debug!("{}: result {} in {}", self.name(), event.as_str(), self.state);
        let hooks = self.hooks;
        hooks.result(self, env, event);
    }

    /// Route a method call reply; returns false if the handle is not ours
    pub fn handle_reply(
        &mut self,
        env: &mut OpEnv<'_>,
        handle: CallHandle,
        reply: Result<FpdReply, CallError>,
    ) -> bool {
        if self.call_handle() != Some(handle) {
            return false;
        }
        // Wakelock is held until the hook has acted on the reply
        let _call = self.call.take();
        let hooks = self.hooks;
        hooks.reply(self, env, reply);
        true
    }

    /// Route a timer expiry; returns false if the handle is not ours
    pub fn handle_timer(&mut self, env: &mut OpEnv<'_>, handle: TimerHandle) -> bool {
        if self.timer_handle() != Some(handle) {
            return false;
        }
        let _timer = self.timer.take();
        let hooks = self.hooks;
        hooks.timer(self, env);
        true
    }

    pub fn start_call(&mut self, env: &mut OpEnv<'_>, request: FpdRequest) {
        self.cancel_call(env);
        debug!("{}: calling {}", self.name(), request.method_name());
        self.call = Some(env.outbox.begin_call(request));
    }

    pub fn cancel_call(&mut self, env: &mut OpEnv<'_>) {
        if let Some(call) = self.call.take() {
            debug!("{}: cancel {}", self.name(), call.request().method_name());
            env.outbox.cancel_call(call);
        }
    }

    pub fn start_timer(&mut self, env: &mut OpEnv<'_>, delay: Duration) {
        self.cancel_timer(env);
        self.timer = Some(env.outbox.arm_timer(delay));
    }

    pub fn cancel_timer(&mut self, env: &mut OpEnv<'_>) {
        if let Some(timer) = self.timer.take() {
            env.outbox.cancel_timer(timer);
        }
    }

    /// Drop outstanding call and timer without running any hooks
    pub fn shutdown(&mut self, env: &mut OpEnv<'_>) {
        self.cancel_call(env);
        self.cancel_timer(env);
    }
}
