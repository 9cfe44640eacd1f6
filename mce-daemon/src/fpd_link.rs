//! Connection to the fingerprint daemon
//!
//! fpd speaks line delimited JSON over a Unix socket: we send
//! [`FpdCall`]s tagged with the call handle id, it answers with
//! [`FpdMessage::Reply`]/[`FpdMessage::Error`] carrying the same id and
//! broadcasts [`FpdMessage::Signal`]s at any time.
//!
//! Being connected is what "fpd service running" means to the rest of the
//! daemon, so connection changes are reported as
//! [`BusSignal::FpdServiceState`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::UnixStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use mce_core::constants::timing;
use mce_core::{CallError, CallHandle};
use mce_protocol::{BusSignal, FpdCall, FpdMessage, FpdReply, FpdRequest, ServiceState, MAX_MESSAGE_SIZE};

use crate::event_loop::{Event, EventSender};
use crate::lines::{read_line_bounded, write_json_line};

#[derive(Debug)]
pub enum LinkCommand {
    Call { handle: CallHandle, request: FpdRequest },
    Cancel(CallHandle),
}

/// Handle for issuing calls through the link task
#[derive(Debug, Clone)]
pub struct FpdLink {
    commands: UnboundedSender<LinkCommand>,
}

impl FpdLink {
    /// Start the link task; it keeps reconnecting until the handle is dropped
    pub fn spawn(path: PathBuf, events: EventSender) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_link(path, rx, events));
        (Self { commands: tx }, task)
    }

    pub fn from_sender(commands: UnboundedSender<LinkCommand>) -> Self {
        Self { commands }
    }

    /// Queue a method call; returns false if the link task is gone
    pub fn call(&self, handle: CallHandle, request: FpdRequest) -> bool {
        self.commands.send(LinkCommand::Call { handle, request }).is_ok()
    }

    /// Forget a call; a late reply to it is dropped
    pub fn cancel(&self, handle: CallHandle) {
        let _ = self.commands.send(LinkCommand::Cancel(handle));
    }
}

enum SessionEnd {
    /// Connection lost, try again later
    Disconnected,
    /// Every link handle is gone
    Finished,
}

async fn run_link(path: PathBuf, mut commands: UnboundedReceiver<LinkCommand>, events: EventSender) {
    let reconnect_delay = Duration::from_millis(timing::FPD_RECONNECT_DELAY_MS);
    let mut connected = None;

    loop {
        match UnixStream::connect(&path).await {
            Ok(stream) => {
                info!("connected to fpd at {}", path.display());
                if !report(&events, &mut connected, true) {
                    return;
                }
                let end = run_session(stream, &mut commands, &events).await;
                info!("fpd connection lost");
                if !report(&events, &mut connected, false) {
                    return;
                }
                if let SessionEnd::Finished = end {
                    return;
                }
            }
            Err(e) => {
                trace!("connect {}: {}", path.display(), e);
                if !report(&events, &mut connected, false) {
                    return;
                }
            }
        }

        // Nothing can be delivered while disconnected
        let sleep = tokio::time::sleep(reconnect_delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                command = commands.recv() => match command {
                    Some(LinkCommand::Call { handle, request }) => {
                        debug!("{} while disconnected", request.method_name());
                        let reply = Err(CallError::Transport("fpd not connected".into()));
                        if events.send(Event::Reply { handle, reply }).is_err() {
                            return;
                        }
                    }
                    Some(LinkCommand::Cancel(_)) => {}
                    None => return,
                },
            }
        }
    }
}

/// Report a connection state change; returns false if the event loop is gone
fn report(events: &EventSender, connected: &mut Option<bool>, now: bool) -> bool {
    if *connected == Some(now) {
        return true;
    }
    *connected = Some(now);
    let state = if now { ServiceState::Running } else { ServiceState::Stopped };
    events.send(Event::Bus(BusSignal::FpdServiceState(state))).is_ok()
}

/// Outstanding calls keyed by handle id
struct PendingCalls {
    calls: HashMap<u64, (CallHandle, Instant)>,
    timeout: Duration,
}

impl PendingCalls {
    fn new(timeout: Duration) -> Self {
        Self { calls: HashMap::new(), timeout }
    }

    fn insert(&mut self, handle: CallHandle) {
        self.calls.insert(handle.id(), (handle, Instant::now() + self.timeout));
    }

    fn remove(&mut self, id: u64) -> Option<CallHandle> {
        self.calls.remove(&id).map(|(handle, _)| handle)
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.calls.values().map(|(_, deadline)| *deadline).min()
    }

    fn take_expired(&mut self, now: Instant) -> Vec<CallHandle> {
        let expired: Vec<u64> = self
            .calls
            .iter()
            .filter(|(_, (_, deadline))| *deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        expired.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    fn drain(&mut self) -> Vec<CallHandle> {
        self.calls.drain().map(|(_, (handle, _))| handle).collect()
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run_session(
    stream: UnixStream,
    commands: &mut UnboundedReceiver<LinkCommand>,
    events: &EventSender,
) -> SessionEnd {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line: Vec<u8> = Vec::with_capacity(MAX_MESSAGE_SIZE);
    let mut pending = PendingCalls::new(Duration::from_millis(timing::FPD_CALL_TIMEOUT_MS));

    let end = loop {
        tokio::select! {
            read = read_line_bounded(&mut reader, &mut line, MAX_MESSAGE_SIZE) => match read {
                Ok(0) => break SessionEnd::Disconnected,
                Ok(_) => {
                    let event = parse_message(&line, &mut pending);
                    line.clear();
                    if let Some(event) = event {
                        if events.send(event).is_err() {
                            break SessionEnd::Finished;
                        }
                    }
                }
                Err(e) => {
                    warn!("fpd read: {}", e);
                    break SessionEnd::Disconnected;
                }
            },
            command = commands.recv() => match command {
                Some(LinkCommand::Call { handle, request }) => {
                    trace!("fpd call {} {}", handle.id(), request.method_name());
                    let call = FpdCall { id: handle.id(), request };
                    pending.insert(handle);
                    if let Err(e) = write_json_line(&mut writer, &call).await {
                        warn!("fpd write: {}", e);
                        break SessionEnd::Disconnected;
                    }
                }
                Some(LinkCommand::Cancel(handle)) => {
                    pending.remove(handle.id());
                }
                None => break SessionEnd::Finished,
            },
            _ = sleep_until(pending.next_deadline()) => {
                for handle in pending.take_expired(Instant::now()) {
                    debug!("fpd call {} timed out", handle.id());
                    let _ = events.send(Event::Reply { handle, reply: Err(CallError::Timeout) });
                }
            }
        }
    };

    // The Stopped report that follows makes the module cancel these
    for handle in pending.drain() {
        debug!("fpd call {} dropped with the connection", handle.id());
    }
    end
}

/// Turn one line from fpd into an event, dropping replies nobody waits for
fn parse_message(line: &[u8], pending: &mut PendingCalls) -> Option<Event> {
    let message: FpdMessage = match serde_json::from_slice(line) {
        Ok(message) => message,
        Err(e) => {
            warn!("malformed message from fpd: {}", e);
            return None;
        }
    };

    let (id, reply): (u64, Result<FpdReply, CallError>) = match message {
        FpdMessage::Signal(signal) => return Some(Event::Fpd(signal)),
        FpdMessage::Reply { id, reply } => (id, Ok(reply)),
        FpdMessage::Error { id, message } => (id, Err(CallError::Remote(message))),
    };

    match pending.remove(id) {
        Some(handle) => Some(Event::Reply { handle, reply }),
        None => {
            debug!("reply to unknown or cancelled call {} dropped", id);
            None
        }
    }
}
