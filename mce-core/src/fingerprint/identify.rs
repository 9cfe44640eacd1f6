//! Identify operation
//!
//! Keeps fpd identifying while the wake policy allows it, and primes a
//! wakeup when a fingerprint is recognized.

use tracing::{info, warn};

use mce_protocol::{FpState, FpdReply, FpdReplyCode, FpdRequest};

use crate::effects::CallError;

use super::operation::{OpEnv, Operation, OperationHooks, OperationState, ResultEvent};

pub struct IdentifyOperation;

pub static IDENTIFY: IdentifyOperation = IdentifyOperation;

/// Reply code from an Identify/Abort reply, logging anything unusable
fn reply_code(op: &Operation, reply: Result<FpdReply, CallError>) -> Option<FpdReplyCode> {
    match reply {
        Ok(FpdReply::Code(code)) => {
            info!("{}: reply {}", op.name(), code);
            Some(code)
        }
        Ok(other) => {
            warn!("{}: unexpected {} reply", op.name(), other.type_name());
            None
        }
        Err(e) => {
            warn!("{}: {}", op.name(), e);
            None
        }
    }
}

impl OperationHooks for IdentifyOperation {
    fn name(&self) -> &'static str {
        "identify"
    }

    fn enter(&self, op: &mut Operation, env: &mut OpEnv<'_>) {
        match op.state() {
            OperationState::Initialize => op.transition(env, OperationState::Waiting),
            OperationState::Waiting => {}
            OperationState::Request => op.start_call(env, FpdRequest::Identify),
            OperationState::Pending => op.set_fpstate(FpState::Identifying),
            OperationState::Success => {
                env.policy.prime();
                let delay = env.settings.trigger_delay();
                op.start_timer(env, delay);
            }
            OperationState::Failure | OperationState::Aborted => {
                op.transition(env, OperationState::Throttling)
            }
            OperationState::Abort => op.start_call(env, FpdRequest::Abort),
            OperationState::Aborting => op.set_fpstate(FpState::Aborting),
            OperationState::Throttling => {
                let delay = env.settings.throttle_delay();
                op.start_timer(env, delay);
            }
        }
    }

    fn leave(&self, op: &mut Operation, env: &mut OpEnv<'_>) {
        match op.state() {
            OperationState::Request | OperationState::Abort => op.cancel_call(env),
            OperationState::Success => {
                // Left before the trigger delay expired
                if op.has_pending_timer() {
                    op.cancel_timer(env);
                    env.policy.unprime();
                }
            }
            OperationState::Throttling => op.cancel_timer(env),
            _ => {}
        }
    }

    fn evaluate(&self, op: &mut Operation, env: &mut OpEnv<'_>) {
        match op.state() {
            OperationState::Waiting => {
                if env.policy.allowed() && op.fpstate() == FpState::Idle {
                    op.transition(env, OperationState::Request);
                }
            }
            OperationState::Pending => {
                if !env.policy.allowed() {
                    op.transition(env, OperationState::Abort);
                } else if op.fpstate() != FpState::Identifying {
                    op.transition(env, OperationState::Failure);
                }
            }
            OperationState::Aborting => match op.fpstate() {
                FpState::Idle => op.transition(env, OperationState::Aborted),
                FpState::Aborting => {}
                _ => op.transition(env, OperationState::Failure),
            },
            _ => {}
        }
    }

    fn result(&self, op: &mut Operation, env: &mut OpEnv<'_>, event: ResultEvent) {
        match (op.state(), event) {
            (OperationState::Pending, ResultEvent::Identified) => op.transition(env, OperationState::Success),
            (OperationState::Pending, ResultEvent::Failed) => op.transition(env, OperationState::Failure),
            (OperationState::Pending, ResultEvent::Aborted) => op.transition(env, OperationState::Aborted),
            (OperationState::Aborting, ResultEvent::Aborted) => op.transition(env, OperationState::Aborted),
            _ => {}
        }
    }

    fn reply(&self, op: &mut Operation, env: &mut OpEnv<'_>, reply: Result<FpdReply, CallError>) {
        let code = reply_code(op, reply);
        match op.state() {
            OperationState::Request => match code {
                Some(FpdReplyCode::Started) => op.transition(env, OperationState::Pending),
                _ => op.transition(env, OperationState::Failure),
            },
            OperationState::Abort => match code {
                Some(FpdReplyCode::Started) => op.transition(env, OperationState::Aborting),
                Some(FpdReplyCode::AlreadyIdle) => op.transition(env, OperationState::Aborted),
                _ => op.transition(env, OperationState::Failure),
            },
            _ => {}
        }
    }

    fn timer(&self, op: &mut Operation, env: &mut OpEnv<'_>) {
        match op.state() {
            OperationState::Success => {
                env.policy.trigger(env.outbox);
                op.transition(env, OperationState::Throttling);
            }
            OperationState::Throttling => op.transition(env, OperationState::Waiting),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{Effect, Outbox};
    use crate::fingerprint::policy::WakePolicy;
    use crate::settings::{FpWakeupMode, FpWakeupSettings};
    use crate::wakelock::Wakelock;
    use mce_protocol::{BusSignal, CoverState, DisplayState, ServiceState, SystemState};

    struct Fixture {
        settings: FpWakeupSettings,
        policy: WakePolicy,
        outbox: Outbox,
        op: Operation,
    }

    impl Fixture {
        /// Operation in Waiting with the policy already allowing wakeups
        fn allowed() -> Self {
            let settings = FpWakeupSettings { mode: FpWakeupMode::Always, ..FpWakeupSettings::default() };
            let mut policy = WakePolicy::new();
            for signal in [
                BusSignal::SystemState(SystemState::User),
                BusSignal::FpdServiceState(ServiceState::Running),
                BusSignal::DisplayStateNext(DisplayState::Off),
                BusSignal::LidSensor(CoverState::Open),
            ] {
                policy.apply_signal(&signal);
            }
            let mut outbox = Outbox::new(Wakelock::disabled("test"));
            policy.update_allowed(&settings, true, &mut outbox);
            let handle = match outbox.drain().as_slice() {
                [Effect::ArmTimer { handle, .. }] => *handle,
                other => panic!("unexpected effects: {:?}", other),
            };
            policy.handle_timer(handle, &mut outbox);

            let mut fx = Self { settings, policy, outbox, op: Operation::new(&IDENTIFY) };
            fx.with_env(|op, env| op.start(env));
            fx.outbox.take_rethink();
            fx
        }

        fn with_env<R>(&mut self, f: impl FnOnce(&mut Operation, &mut OpEnv<'_>) -> R) -> R {
            let mut env = OpEnv {
                settings: &self.settings,
                policy: &mut self.policy,
                outbox: &mut self.outbox,
            };
            f(&mut self.op, &mut env)
        }

        fn evaluate(&mut self) {
            self.with_env(|op, env| op.evaluate(env));
        }

        fn reply(&mut self, reply: Result<FpdReply, CallError>) {
            let handle = self.op.call_handle().unwrap();
            assert!(self.with_env(|op, env| op.handle_reply(env, handle, reply)));
        }

        fn fire_timer(&mut self) {
            let handle = self.op.timer_handle().unwrap();
            assert!(self.with_env(|op, env| op.handle_timer(env, handle)));
        }

        fn pending(&mut self) {
            self.op.set_fpstate(FpState::Idle);
            self.evaluate();
            assert_eq!(self.op.state(), OperationState::Request);
            self.reply(Ok(FpdReply::Code(FpdReplyCode::Started)));
            assert_eq!(self.op.state(), OperationState::Pending);
        }
    }

    #[test]
    fn test_starts_waiting() {
        let mut fx = Fixture::allowed();
        assert_eq!(fx.op.state(), OperationState::Waiting);
        // fpd state not known yet
        fx.evaluate();
        assert_eq!(fx.op.state(), OperationState::Waiting);
    }

    #[test]
    fn test_identify_success_primes_and_throttles() {
        let mut fx = Fixture::allowed();
        fx.pending();
        assert_eq!(fx.op.fpstate(), FpState::Identifying);

        fx.with_env(|op, env| op.deliver_result(env, ResultEvent::Identified));
        assert_eq!(fx.op.state(), OperationState::Success);
        assert!(fx.policy.primed());
        assert!(fx.op.has_pending_timer());

        fx.outbox.drain();
        fx.fire_timer();
        assert_eq!(fx.op.state(), OperationState::Throttling);
        let effects = fx.outbox.drain();
        assert!(effects.contains(&Effect::Publish(crate::Output::DisplayStateRequest(DisplayState::On))));

        fx.fire_timer();
        assert_eq!(fx.op.state(), OperationState::Waiting);
    }

    #[test]
    fn test_busy_reply_fails() {
        let mut fx = Fixture::allowed();
        fx.op.set_fpstate(FpState::Idle);
        fx.evaluate();
        fx.reply(Ok(FpdReply::Code(FpdReplyCode::AlreadyBusy)));
        assert_eq!(fx.op.state(), OperationState::Throttling);
    }

    #[test]
    fn test_malformed_reply_fails() {
        let mut fx = Fixture::allowed();
        fx.op.set_fpstate(FpState::Idle);
        fx.evaluate();
        fx.reply(Ok(FpdReply::State("FPSTATE_IDLE".into())));
        assert_eq!(fx.op.state(), OperationState::Throttling);
    }

    #[test]
    fn test_transport_error_fails() {
        let mut fx = Fixture::allowed();
        fx.op.set_fpstate(FpState::Idle);
        fx.evaluate();
        fx.reply(Err(CallError::Transport("broken pipe".into())));
        assert_eq!(fx.op.state(), OperationState::Throttling);
    }

    #[test]
    fn test_unexpected_fpstate_fails() {
        let mut fx = Fixture::allowed();
        fx.pending();
        fx.op.set_fpstate(FpState::Enrolling);
        fx.evaluate();
        assert_eq!(fx.op.state(), OperationState::Throttling);
    }

    #[test]
    fn test_denial_aborts_cleanly() {
        let mut fx = Fixture::allowed();
        fx.pending();

        fx.policy.apply_signal(&BusSignal::LidSensor(CoverState::Closed));
        let settings = fx.settings.clone();
        fx.policy.update_allowed(&settings, true, &mut fx.outbox);
        fx.evaluate();
        assert_eq!(fx.op.state(), OperationState::Abort);
        assert!(fx.op.has_pending_call());

        fx.reply(Ok(FpdReply::Code(FpdReplyCode::Started)));
        assert_eq!(fx.op.state(), OperationState::Aborting);

        fx.op.set_fpstate(FpState::Idle);
        fx.evaluate();
        assert_eq!(fx.op.state(), OperationState::Throttling);
    }

    #[test]
    fn test_abort_already_idle() {
        let mut fx = Fixture::allowed();
        fx.pending();
        fx.policy.on_power_key(true, &mut fx.outbox);
        fx.evaluate();
        assert_eq!(fx.op.state(), OperationState::Abort);
        fx.reply(Ok(FpdReply::Code(FpdReplyCode::AlreadyIdle)));
        assert_eq!(fx.op.state(), OperationState::Throttling);
    }

    #[test]
    fn test_aborted_result_while_aborting() {
        let mut fx = Fixture::allowed();
        fx.pending();
        fx.policy.on_power_key(true, &mut fx.outbox);
        fx.evaluate();
        fx.reply(Ok(FpdReply::Code(FpdReplyCode::Started)));
        fx.with_env(|op, env| op.deliver_result(env, ResultEvent::Aborted));
        assert_eq!(fx.op.state(), OperationState::Throttling);
    }

    #[test]
    fn test_wakelock_released_after_cycle() {
        let mut fx = Fixture::allowed();
        fx.pending();
        fx.with_env(|op, env| op.deliver_result(env, ResultEvent::Failed));
        assert_eq!(fx.op.state(), OperationState::Throttling);
        assert_eq!(fx.outbox.wakelock().count(), 1);
        fx.fire_timer();
        assert_eq!(fx.outbox.wakelock().count(), 0);
    }
}
