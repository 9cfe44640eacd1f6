//! Single threaded driver for the fingerprint module
//!
//! Every input (bus signals, fpd traffic, timer expiries, control socket
//! requests) arrives as an [`Event`] on one channel and is dispatched to
//! the module to completion before the next one is looked at. After each
//! event the module's effects are executed.
//!
//! Policy re-evaluation runs at idle priority: only when the channel has
//! nothing immediately ready.

use std::collections::HashMap;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use mce_core::{CallError, CallHandle, Effect, FingerprintModule, Output, SettingsStore, TimerHandle};
use mce_protocol::{BusSignal, FpdReply, FpdSignal, Request, Response, ResponseData};

use crate::fpd_link::FpdLink;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug)]
pub enum Event {
    Bus(BusSignal),
    Fpd(FpdSignal),
    Reply {
        handle: CallHandle,
        reply: Result<FpdReply, CallError>,
    },
    TimerFired(TimerHandle),
    Control {
        request: Request,
        respond: oneshot::Sender<Response>,
    },
    Shutdown,
}

pub type EventSender = UnboundedSender<Event>;

pub struct EventLoop {
    module: FingerprintModule,
    store: SettingsStore,
    fpd: FpdLink,
    events: EventSender,
    timers: HashMap<TimerHandle, JoinHandle<()>>,
}

impl EventLoop {
    pub fn new(module: FingerprintModule, store: SettingsStore, fpd: FpdLink, events: EventSender) -> Self {
        Self {
            module,
            store,
            fpd,
            events,
            timers: HashMap::new(),
        }
    }

    pub fn module(&self) -> &FingerprintModule {
        &self.module
    }

    /// Run until a shutdown event arrives or every sender is gone
    pub async fn run(mut self, mut rx: UnboundedReceiver<Event>) {
        self.flush();
        loop {
            let event = match rx.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) if self.module.rethink_pending() => {
                    self.module.rethink();
                    self.flush();
                    continue;
                }
                Err(TryRecvError::Empty) => match rx.recv().await {
                    Some(event) => event,
                    None => break,
                },
                Err(TryRecvError::Disconnected) => break,
            };
            if !self.dispatch(event) {
                break;
            }
            self.flush();
        }
        self.shutdown();
    }

    /// Handle one event; returns false when the loop should stop
    pub fn dispatch(&mut self, event: Event) -> bool {
        match event {
            Event::Bus(signal) => self.module.handle_bus_signal(&signal),
            Event::Fpd(signal) => self.module.handle_fpd_signal(&signal),
            Event::Reply { handle, reply } => self.module.handle_reply(handle, reply),
            Event::TimerFired(handle) => {
                self.timers.remove(&handle);
                self.module.handle_timer(handle);
            }
            Event::Control { request, respond } => {
                let response = self.control(request);
                if respond.send(response).is_err() {
                    debug!("control client went away before the response");
                }
            }
            Event::Shutdown => {
                info!("shutdown requested");
                return false;
            }
        }
        true
    }

    /// Run pending evaluation passes until the module is quiescent
    #[cfg(test)]
    pub fn settle(&mut self) {
        while self.module.rethink_pending() {
            self.module.rethink();
            self.flush();
        }
    }

    fn control(&mut self, request: Request) -> Response {
        match request {
            Request::Ping => Response::ok_string("pong"),
            Request::Version => Response::ok_string(VERSION),
            Request::GetStatus => Response::Ok(ResponseData::fingerprint(self.module.status())),
            Request::GetSettings => Response::Ok(ResponseData::setting_list(self.store.settings().entries())),
            Request::SetSetting { key, value } => match self.store.set(&key, value) {
                Ok(Some(change)) => {
                    self.module.handle_setting_change(change);
                    Response::ok()
                }
                Ok(None) => Response::ok(),
                Err(e) => {
                    warn!("SetSetting {}: {}", key, e);
                    Response::error(e.to_string())
                }
            },
            Request::Signal(signal) => {
                info!("injected {} signal", signal.type_name());
                self.module.handle_bus_signal(&signal);
                Response::ok()
            }
        }
    }

    /// Execute everything the module asked for
    pub fn flush(&mut self) {
        for effect in self.module.drain_effects() {
            match effect {
                Effect::BeginCall { handle, request } => {
                    if !self.fpd.call(handle, request) {
                        let reply = Err(CallError::Transport("fpd link is down".into()));
                        let _ = self.events.send(Event::Reply { handle, reply });
                    }
                }
                Effect::CancelCall { handle } => self.fpd.cancel(handle),
                Effect::ArmTimer { handle, delay } => {
                    let events = self.events.clone();
                    let task = tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = events.send(Event::TimerFired(handle));
                    });
                    self.timers.insert(handle, task);
                }
                Effect::CancelTimer { handle } => {
                    if let Some(task) = self.timers.remove(&handle) {
                        task.abort();
                    }
                }
                Effect::Publish(output) => publish(&output),
            }
        }
    }

    fn shutdown(&mut self) {
        self.module.shutdown();
        self.flush();
        for (_, task) in self.timers.drain() {
            task.abort();
        }
    }
}

/// Hand an output to the rest of the system
fn publish(output: &Output) {
    match output {
        Output::LedPatternActivate(_) | Output::LedPatternDeactivate(_) | Output::InactivityEvent(_) => {
            trace!("{}: {:?}", output.type_name(), output)
        }
        _ => info!("{}: {:?}", output.type_name(), output),
    }
}
