//! Control Socket Server
//!
//! Serves `mcetool` and test setups over a Unix socket. Each request line
//! is forwarded to the event loop and answered with the loop's response.
//!
//! # Limits
//! - **Socket permissions**: mode 0660 with symlink attack prevention
//! - **Peer credentials**: UID/PID logged for every connection
//! - **Connection limits**: Maximum concurrent connections enforced
//! - **Timeouts**: Read/write timeouts prevent resource exhaustion
//! - **Message limits**: Maximum message size prevents memory exhaustion

use anyhow::{bail, Context};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use mce_protocol::{RequestEnvelope, Response, ResponseEnvelope, MAX_MESSAGE_SIZE};

use crate::event_loop::{Event, EventSender};
use crate::lines::{is_too_large, read_line_bounded, write_json_line};

/// Maximum concurrent client connections
const MAX_CONNECTIONS: usize = 16;

/// Read timeout per message
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Write timeout per response
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Owner and group may connect
const SOCKET_MODE: u32 = 0o660;

/// Create the listening socket, replacing a stale one
pub fn bind(socket_path: &Path) -> anyhow::Result<UnixListener> {
    if let Ok(metadata) = socket_path.symlink_metadata() {
        // Refuse to remove symlinks (prevent symlink attacks)
        if metadata.file_type().is_symlink() {
            bail!("{} is a symlink - refusing", socket_path.display());
        }
        std::fs::remove_file(socket_path)
            .with_context(|| format!("removing stale socket {}", socket_path.display()))?;
        debug!("Removed existing socket file");
    }

    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("binding {}", socket_path.display()))?;
    std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(SOCKET_MODE))?;

    info!("Listening on {} (mode {:o})", socket_path.display(), SOCKET_MODE);
    Ok(listener)
}

/// Accept clients until the task is aborted
pub async fn run_server(listener: UnixListener, events: EventSender) {
    let active = Arc::new(AtomicUsize::new(0));

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let current = active.load(Ordering::SeqCst);
                if current >= MAX_CONNECTIONS {
                    warn!("Connection limit reached ({}), rejecting new connection", current);
                    drop(stream);
                    continue;
                }

                active.fetch_add(1, Ordering::SeqCst);
                let active = active.clone();
                let events = events.clone();
                tokio::spawn(async move {
                    handle_client(stream, events).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                });
            }
            Err(e) => {
                error!("Accept error: {}", e);
            }
        }
    }
}

/// Client credentials from Unix socket peer
#[derive(Debug, Clone, Copy, Default)]
struct PeerCredentials {
    uid: u32,
    pid: i32,
}

/// Get peer credentials (uid, pid) from Unix socket
fn get_peer_credentials(stream: &UnixStream) -> Option<PeerCredentials> {
    use std::os::unix::io::AsRawFd;

    let fd = stream.as_raw_fd();

    // SAFETY: ucred is a simple C struct with no pointers. Zeroing it is safe and creates a valid initial state.
    let mut cred: libc::ucred = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

    // SAFETY: fd is a valid socket owned by `stream`, cred is initialized and
    // len holds its exact size.
    let result = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_PEERCRED,
            &mut cred as *mut _ as *mut libc::c_void,
            &mut len,
        )
    };

    if result == 0 {
        Some(PeerCredentials { uid: cred.uid, pid: cred.pid })
    } else {
        None
    }
}

async fn handle_client(stream: UnixStream, events: EventSender) {
    let cred = get_peer_credentials(&stream).unwrap_or_default();
    debug!("Connection from uid={}, pid={}", cred.uid, cred.pid);

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line: Vec<u8> = Vec::with_capacity(MAX_MESSAGE_SIZE);
    let mut request_count: u64 = 0;

    loop {
        let read_result = timeout(READ_TIMEOUT, read_line_bounded(&mut reader, &mut line, MAX_MESSAGE_SIZE)).await;

        let response = match read_result {
            Ok(Ok(0)) => {
                debug!("Client disconnected: uid={}, pid={}, requests={}", cred.uid, cred.pid, request_count);
                break;
            }
            Ok(Ok(n)) => {
                request_count += 1;
                trace!("Request #{} from uid={}: {} bytes", request_count, cred.uid, n);
                let response = process_request(&line, &cred, &events).await;
                line.clear();
                response
            }
            Ok(Err(e)) if is_too_large(&e) => {
                warn!("Message too large (>{} bytes) from uid={}, pid={}", MAX_MESSAGE_SIZE, cred.uid, cred.pid);
                let response = ResponseEnvelope::new(0, Response::error("Message too large"));
                let _ = send_response(&mut writer, &response).await;
                break;
            }
            Ok(Err(e)) => {
                error!("Read error from uid={}, pid={}: {}", cred.uid, cred.pid, e);
                break;
            }
            Err(_) => {
                debug!("Read timeout for uid={}, pid={}", cred.uid, cred.pid);
                break;
            }
        };

        if send_response(&mut writer, &response).await.is_err() {
            break;
        }
    }
}

async fn send_response(
    writer: &mut tokio::net::unix::OwnedWriteHalf,
    response: &ResponseEnvelope,
) -> Result<(), ()> {
    match timeout(WRITE_TIMEOUT, write_json_line(writer, response)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!("Write error: {}", e);
            Err(())
        }
        Err(_) => {
            error!("Write timeout");
            Err(())
        }
    }
}

async fn process_request(line: &[u8], cred: &PeerCredentials, events: &EventSender) -> ResponseEnvelope {
    let envelope: RequestEnvelope = match serde_json::from_slice(line) {
        Ok(e) => e,
        Err(e) => {
            debug!("Invalid JSON from uid={}: {}", cred.uid, e);
            return ResponseEnvelope::new(0, Response::error("Invalid request format"));
        }
    };

    let request_id = envelope.id;
    let request = envelope.request;

    // Validate again server-side
    if let Err(e) = request.validate() {
        warn!("Request validation failed from uid={}: {}", cred.uid, e);
        return ResponseEnvelope::new(request_id, Response::error(e));
    }

    debug!("Processing {} (id={}) from uid={}, pid={}", request.type_name(), request_id, cred.uid, cred.pid);

    let (respond, response) = oneshot::channel();
    if events.send(Event::Control { request, respond }).is_err() {
        return ResponseEnvelope::new(request_id, Response::error("Daemon is shutting down"));
    }
    let response = response
        .await
        .unwrap_or_else(|_| Response::error("Daemon is shutting down"));
    ResponseEnvelope::new(request_id, response)
}
