/*
 * This file is part of mce.
 *
 * Copyright (C) 2025 mce contributors
 *
 * mce is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Lesser General Public License as published
 * by the Free Software Foundation, version 2.1 of the License.
 *
 * mce is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Lesser General Public License for more details.
 *
 * You should have received a copy of the GNU Lesser General Public License
 * along with mce. If not, see <https://www.gnu.org/licenses/>.
 */

//! Control socket client
//!
//! Talks to mced over its Unix socket: one request line out, one response
//! line back, correlated by request id.

use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mce_error::{MceError, Result};
use mce_protocol::{
    BusSignal, FingerprintStatus, Request, RequestEnvelope, Response, ResponseData, ResponseEnvelope,
    SettingEntry, MAX_MESSAGE_SIZE,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn transport_error(what: &str, e: io::Error) -> MceError {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
            MceError::Timeout(format!("No reply from mced while trying to {}", what))
        }
        _ => MceError::DaemonConnection(format!("Failed to {}: {}", what, e)),
    }
}

/// Connection to the daemon control socket
pub struct MceClient {
    path: PathBuf,
    writer: UnixStream,
    reader: BufReader<UnixStream>,
}

impl MceClient {
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect_with_timeout(path, TIMEOUT)
    }

    /// Connect with a custom read/write timeout
    pub fn connect_with_timeout(path: impl AsRef<Path>, timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let stream = UnixStream::connect(&path).map_err(|e| {
            MceError::DaemonConnection(format!("Failed to connect to mced at {}: {}", path.display(), e))
        })?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self { path, writer: stream, reader })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Send a request and wait for its response
    pub fn request(&mut self, request: Request) -> Result<ResponseData> {
        request.validate().map_err(MceError::DaemonRequest)?;

        let envelope = RequestEnvelope::new(request);
        let mut json = serde_json::to_vec(&envelope)?;
        json.push(b'\n');
        if json.len() > MAX_MESSAGE_SIZE {
            return Err(MceError::MessageTooLarge { size: json.len(), max_size: MAX_MESSAGE_SIZE });
        }

        self.writer
            .write_all(&json)
            .map_err(|e| transport_error("send request", e))?;

        let mut line = Vec::with_capacity(512);
        self.reader
            .read_until(b'\n', &mut line)
            .map_err(|e| transport_error("read response", e))?;
        if line.is_empty() {
            return Err(MceError::DaemonConnection("Daemon closed connection".into()));
        }
        if line.len() > MAX_MESSAGE_SIZE {
            return Err(MceError::MessageTooLarge { size: line.len(), max_size: MAX_MESSAGE_SIZE });
        }

        let response: ResponseEnvelope = serde_json::from_slice(&line)?;
        if response.id != envelope.id {
            return Err(MceError::protocol(format!(
                "Response ID mismatch: expected {}, got {}",
                envelope.id, response.id
            )));
        }

        match response.response {
            Response::Ok(data) => Ok(data),
            Response::Error { message } => Err(MceError::DaemonResponse(message)),
        }
    }

    pub fn ping(&mut self) -> Result<()> {
        self.request(Request::Ping).map(|_| ())
    }

    pub fn version(&mut self) -> Result<String> {
        self.request(Request::Version)?
            .value
            .ok_or_else(|| MceError::protocol("Version reply without value"))
    }

    pub fn status(&mut self) -> Result<FingerprintStatus> {
        self.request(Request::GetStatus)?
            .fingerprint
            .ok_or_else(|| MceError::protocol("Status reply without status"))
    }

    pub fn settings(&mut self) -> Result<Vec<SettingEntry>> {
        self.request(Request::GetSettings)?
            .settings
            .ok_or_else(|| MceError::protocol("Settings reply without settings"))
    }

    pub fn set_setting(&mut self, key: &str, value: i64) -> Result<()> {
        self.request(Request::SetSetting { key: key.to_string(), value }).map(|_| ())
    }

    pub fn signal(&mut self, signal: BusSignal) -> Result<()> {
        self.request(Request::Signal(signal)).map(|_| ())
    }
}
