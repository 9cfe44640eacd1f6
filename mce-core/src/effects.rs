//! Effect outbox
//!
//! The core never performs I/O itself. Starting a method call, arming a
//! timer or publishing a value pushes an [`Effect`]; the event loop drains
//! the outbox after every dispatched event and feeds completions back in,
//! tagged with the handle that was issued here.
//!
//! Handles are generation numbers from a single counter and are never
//! reused, so a completion carrying a handle the owner no longer holds is
//! stale by construction.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tracing::trace;

use mce_protocol::FpdRequest;

use crate::datapipe::Output;
use crate::wakelock::{Wakelock, WakelockGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl CallHandle {
    pub fn from_raw(id: u64) -> Self {
        CallHandle(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

impl TimerHandle {
    pub fn from_raw(id: u64) -> Self {
        TimerHandle(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// Why a method call produced no usable reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// No reply within the call timeout
    Timeout,
    /// Connection lost or could not send
    Transport(String),
    /// fpd answered with an error message
    Remote(String),
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Timeout => write!(f, "no reply"),
            CallError::Transport(msg) => write!(f, "transport error: {}", msg),
            CallError::Remote(msg) => write!(f, "error reply: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    BeginCall { handle: CallHandle, request: FpdRequest },
    CancelCall { handle: CallHandle },
    ArmTimer { handle: TimerHandle, delay: Duration },
    CancelTimer { handle: TimerHandle },
    Publish(Output),
}

/// An outstanding method call; dropping it releases its suspend block
#[derive(Debug)]
pub struct PendingCall {
    handle: CallHandle,
    request: FpdRequest,
    _wakelock: WakelockGuard,
}

impl PendingCall {
    pub fn handle(&self) -> CallHandle {
        self.handle
    }

    pub fn request(&self) -> FpdRequest {
        self.request
    }
}

/// An armed timer; dropping it releases its suspend block
#[derive(Debug)]
pub struct PendingTimer {
    handle: TimerHandle,
    delay: Duration,
    _wakelock: WakelockGuard,
}

impl PendingTimer {
    pub fn handle(&self) -> TimerHandle {
        self.handle
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[derive(Debug)]
pub struct Outbox {
    next_id: u64,
    effects: VecDeque<Effect>,
    rethink: bool,
    wakelock: Wakelock,
}

impl Outbox {
    pub fn new(wakelock: Wakelock) -> Self {
        Self {
            next_id: 1,
            effects: VecDeque::new(),
            rethink: false,
            wakelock,
        }
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn begin_call(&mut self, request: FpdRequest) -> PendingCall {
        let handle = CallHandle(self.allocate());
        trace!("begin call {:?} {}", handle, request.method_name());
        self.effects.push_back(Effect::BeginCall { handle, request });
        PendingCall {
            handle,
            request,
            _wakelock: self.wakelock.acquire(),
        }
    }

    pub fn cancel_call(&mut self, call: PendingCall) {
        trace!("cancel call {:?} {}", call.handle, call.request.method_name());
        self.effects.push_back(Effect::CancelCall { handle: call.handle });
    }

    pub fn arm_timer(&mut self, delay: Duration) -> PendingTimer {
        let handle = TimerHandle(self.allocate());
        trace!("arm timer {:?} {:?}", handle, delay);
        self.effects.push_back(Effect::ArmTimer { handle, delay });
        PendingTimer {
            handle,
            delay,
            _wakelock: self.wakelock.acquire(),
        }
    }

    pub fn cancel_timer(&mut self, timer: PendingTimer) {
        trace!("cancel timer {:?}", timer.handle);
        self.effects.push_back(Effect::CancelTimer { handle: timer.handle });
    }

    pub fn publish(&mut self, output: Output) {
        self.effects.push_back(Effect::Publish(output));
    }

    /// Ask for a policy re-evaluation pass; repeated requests coalesce
    pub fn request_rethink(&mut self) {
        self.rethink = true;
    }

    pub fn rethink_requested(&self) -> bool {
        self.rethink
    }

    /// Clear the rethink request, returning whether one was pending
    pub fn take_rethink(&mut self) -> bool {
        std::mem::replace(&mut self.rethink, false)
    }

    pub fn drain(&mut self) -> Vec<Effect> {
        self.effects.drain(..).collect()
    }

    pub fn wakelock(&self) -> &Wakelock {
        &self.wakelock
    }
}
