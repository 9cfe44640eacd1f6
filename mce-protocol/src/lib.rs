//! Shared IPC protocol types
//!
//! Three groups of types live here:
//!
//! - **System state**: the values carried by bus signals (display state,
//!   lock state, lid/proximity, ...). Shared by the daemon, the core and
//!   `mcetool`.
//! - **Fingerprint daemon wire format**: requests sent to fpd, their replies
//!   and the broadcast signals fpd emits.
//! - **Control socket**: request/response envelopes served by `mced`.
//!
//! All messages are single-line JSON documents.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global request ID counter for correlation
static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Maximum message size for IPC (8KB)
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024;

/// Maximum length of a fingerprint template name
pub const MAX_TEMPLATE_NAME_LENGTH: usize = 256;

/// Maximum length of a setting key
const MAX_SETTING_KEY_LENGTH: usize = 128;

/// All setting keys understood by the daemon live below this prefix
pub const SETTING_KEY_PREFIX: &str = "/system/osso/dsm/";

/// Linux input event code for the power key
pub const KEY_POWER: u16 = 116;

/// Generate a unique request ID for correlation
pub fn generate_request_id() -> u64 {
    REQUEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Parse a kebab/snake case token into one of the wire enums
fn parse_token<T: DeserializeOwned>(s: &str) -> Result<T, String> {
    let token = s.trim().to_ascii_lowercase().replace('-', "_");
    serde_json::from_value(serde_json::Value::String(token))
        .map_err(|_| format!("Invalid value: {:?}", s))
}

// ============================================================================
// System State
// ============================================================================

/// Availability of a D-Bus style service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    #[default]
    Undef,
    Stopped,
    Running,
}

impl ServiceState {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceState::Undef => "undefined",
            ServiceState::Stopped => "stopped",
            ServiceState::Running => "running",
        }
    }
}

/// Overall device operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SystemState {
    #[default]
    Undef,
    User,
    ActDead,
    Boot,
    Reboot,
    Shutdown,
}

impl SystemState {
    pub fn as_str(self) -> &'static str {
        match self {
            SystemState::Undef => "UNDEF",
            SystemState::User => "USER",
            SystemState::ActDead => "ACTDEAD",
            SystemState::Boot => "BOOT",
            SystemState::Reboot => "REBOOT",
            SystemState::Shutdown => "SHUTDOWN",
        }
    }
}

/// Display power state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisplayState {
    #[default]
    Undef,
    Off,
    LpmOff,
    LpmOn,
    Dim,
    On,
    PowerUp,
    PowerDown,
}

impl DisplayState {
    pub fn as_str(self) -> &'static str {
        match self {
            DisplayState::Undef => "undefined",
            DisplayState::Off => "off",
            DisplayState::LpmOff => "lpm_off",
            DisplayState::LpmOn => "lpm_on",
            DisplayState::Dim => "dim",
            DisplayState::On => "on",
            DisplayState::PowerUp => "power_up",
            DisplayState::PowerDown => "power_down",
        }
    }

    /// Display is on or dimmed, i.e. showing normal ui
    pub fn is_powered_on(self) -> bool {
        matches!(self, DisplayState::On | DisplayState::Dim)
    }
}

/// Secure lock screen status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceLockState {
    Unlocked,
    Locked,
    #[default]
    Undefined,
}

impl DeviceLockState {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceLockState::Unlocked => "unlocked",
            DeviceLockState::Locked => "locked",
            DeviceLockState::Undefined => "undefined",
        }
    }
}

/// Lid / proximity sensor state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CoverState {
    #[default]
    Undef,
    Closed,
    Open,
}

impl CoverState {
    pub fn as_str(self) -> &'static str {
        match self {
            CoverState::Undef => "undefined",
            CoverState::Closed => "closed",
            CoverState::Open => "open",
        }
    }
}

/// Bitmask of orthogonal ui override flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Submode(pub u32);

impl Submode {
    pub const NORMAL: Submode = Submode(0);
    pub const INVALID: Submode = Submode(1 << 0);
    /// Lock screen is active
    pub const TKLOCK: Submode = Submode(1 << 1);
    pub const EVEATER: Submode = Submode(1 << 2);
    pub const BOOTUP: Submode = Submode(1 << 4);
    pub const TRANSITION: Submode = Submode(1 << 5);
    pub const AUTORELOCK: Submode = Submode(1 << 6);
    pub const VISUAL_TKLOCK: Submode = Submode(1 << 7);
    pub const POCKET: Submode = Submode(1 << 8);
    pub const DEVICELOCK: Submode = Submode(1 << 9);

    pub fn contains(self, other: Submode) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn with(self, other: Submode) -> Submode {
        Submode(self.0 | other.0)
    }

    pub fn without(self, other: Submode) -> Submode {
        Submode(self.0 & !other.0)
    }
}

impl Default for Submode {
    fn default() -> Self {
        Submode::INVALID
    }
}

/// Operating mode reported by the fingerprint daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FpState {
    #[default]
    Unset,
    Unknown,
    Idle,
    Enrolling,
    Identifying,
    Removing,
    Verifying,
    Aborting,
    Terminating,
}

impl FpState {
    /// Parse the state string broadcast by fpd
    ///
    /// Unrecognized strings map to `Unknown`, never to an error: the daemon
    /// may grow new states without breaking us.
    pub fn parse(s: &str) -> FpState {
        match s {
            "FPSTATE_UNSET" => FpState::Unset,
            "FPSTATE_IDLE" => FpState::Idle,
            "FPSTATE_ENROLLING" => FpState::Enrolling,
            "FPSTATE_IDENTIFYING" => FpState::Identifying,
            "FPSTATE_REMOVING" => FpState::Removing,
            "FPSTATE_VERIFYING" => FpState::Verifying,
            "FPSTATE_ABORTING" => FpState::Aborting,
            "FPSTATE_TERMINATING" => FpState::Terminating,
            _ => FpState::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FpState::Unset => "FPSTATE_UNSET",
            FpState::Unknown => "FPSTATE_UNKNOWN",
            FpState::Idle => "FPSTATE_IDLE",
            FpState::Enrolling => "FPSTATE_ENROLLING",
            FpState::Identifying => "FPSTATE_IDENTIFYING",
            FpState::Removing => "FPSTATE_REMOVING",
            FpState::Verifying => "FPSTATE_VERIFYING",
            FpState::Aborting => "FPSTATE_ABORTING",
            FpState::Terminating => "FPSTATE_TERMINATING",
        }
    }

    /// Daemon is actively scanning the sensor
    pub fn is_scanning(self) -> bool {
        matches!(self, FpState::Enrolling | FpState::Identifying | FpState::Verifying)
    }
}

macro_rules! impl_display_fromstr {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }

            impl FromStr for $ty {
                type Err = String;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    parse_token(s)
                }
            }
        )*
    };
}

impl_display_fromstr!(ServiceState, SystemState, DisplayState, DeviceLockState, CoverState);

impl fmt::Display for FpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw input event relevant to fingerprint wakeups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub code: u16,
    pub pressed: bool,
}

impl KeyEvent {
    pub fn power(pressed: bool) -> Self {
        Self { code: KEY_POWER, pressed }
    }

    pub fn is_power_key(&self) -> bool {
        self.code == KEY_POWER
    }
}

/// Inputs published on the system bus that the fingerprint module consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", content = "value", rename_all = "snake_case")]
pub enum BusSignal {
    FpdServiceState(ServiceState),
    SystemState(SystemState),
    DeviceLockState(DeviceLockState),
    Submode(Submode),
    DisplayStateNext(DisplayState),
    InteractionExpected(bool),
    /// Pid of the application owning the topmost window, if any
    TopmostWindowPid(Option<u32>),
    ProximitySensor(CoverState),
    LidSensor(CoverState),
    Key(KeyEvent),
}

impl BusSignal {
    pub fn type_name(&self) -> &'static str {
        match self {
            BusSignal::FpdServiceState(_) => "fpd_service_state",
            BusSignal::SystemState(_) => "system_state",
            BusSignal::DeviceLockState(_) => "devicelock_state",
            BusSignal::Submode(_) => "submode",
            BusSignal::DisplayStateNext(_) => "display_state_next",
            BusSignal::InteractionExpected(_) => "interaction_expected",
            BusSignal::TopmostWindowPid(_) => "topmost_window_pid",
            BusSignal::ProximitySensor(_) => "proximity_sensor",
            BusSignal::LidSensor(_) => "lid_sensor",
            BusSignal::Key(_) => "keypress",
        }
    }
}

// ============================================================================
// Fingerprint Daemon Wire Format
// ============================================================================

/// Method calls made to the fingerprint daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FpdRequest {
    Identify,
    Abort,
    GetState,
    GetAll,
}

impl FpdRequest {
    pub fn method_name(&self) -> &'static str {
        match self {
            FpdRequest::Identify => "Identify",
            FpdRequest::Abort => "Abort",
            FpdRequest::GetState => "GetState",
            FpdRequest::GetAll => "GetAll",
        }
    }
}

/// Result codes returned by operation requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FpdReplyCode {
    Started,
    Failed,
    AlreadyIdle,
    AlreadyBusy,
    Denied,
    KeyAlreadyExists,
    KeyDoesNotExist,
    NoKeysAvailable,
}

impl FpdReplyCode {
    pub fn as_str(self) -> &'static str {
        match self {
            FpdReplyCode::Started => "FPREPLY_STARTED",
            FpdReplyCode::Failed => "FPREPLY_FAILED",
            FpdReplyCode::AlreadyIdle => "FPREPLY_ALREADY_IDLE",
            FpdReplyCode::AlreadyBusy => "FPREPLY_ALREADY_BUSY",
            FpdReplyCode::Denied => "FPREPLY_DENIED",
            FpdReplyCode::KeyAlreadyExists => "FPREPLY_KEY_ALREADY_EXISTS",
            FpdReplyCode::KeyDoesNotExist => "FPREPLY_KEY_DOES_NOT_EXIST",
            FpdReplyCode::NoKeysAvailable => "FPREPLY_NO_KEYS_AVAILABLE",
        }
    }
}

impl fmt::Display for FpdReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reply payload; the shape depends on the request that was made
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FpdReply {
    /// Identify / Abort
    Code(FpdReplyCode),
    /// GetState
    State(String),
    /// GetAll
    Names(Vec<String>),
}

impl FpdReply {
    pub fn type_name(&self) -> &'static str {
        match self {
            FpdReply::Code(_) => "code",
            FpdReply::State(_) => "state",
            FpdReply::Names(_) => "names",
        }
    }
}

/// Broadcast signals emitted by the fingerprint daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum FpdSignal {
    StateChanged { state: String },
    AcquisitionInfo { info: String },
    Added { name: String },
    Removed { name: String },
    Identified { name: String },
    Aborted,
    Failed,
    Verified { name: String },
    ErrorInfo { info: String },
    EnrollProgressChanged { percent: i32 },
}

impl FpdSignal {
    pub fn type_name(&self) -> &'static str {
        match self {
            FpdSignal::StateChanged { .. } => "StateChanged",
            FpdSignal::AcquisitionInfo { .. } => "AcquisitionInfo",
            FpdSignal::Added { .. } => "Added",
            FpdSignal::Removed { .. } => "Removed",
            FpdSignal::Identified { .. } => "Identified",
            FpdSignal::Aborted => "Aborted",
            FpdSignal::Failed => "Failed",
            FpdSignal::Verified { .. } => "Verified",
            FpdSignal::ErrorInfo { .. } => "ErrorInfo",
            FpdSignal::EnrollProgressChanged { .. } => "EnrollProgressChanged",
        }
    }
}

/// Outbound method call envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FpdCall {
    pub id: u64,
    pub request: FpdRequest,
}

/// Inbound message from the fingerprint daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FpdMessage {
    Reply { id: u64, reply: FpdReply },
    Error { id: u64, message: String },
    Signal(FpdSignal),
}

/// Check a template name received from fpd before caching it
pub fn validate_template_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Template name cannot be empty".into());
    }
    if name.len() > MAX_TEMPLATE_NAME_LENGTH {
        return Err(format!(
            "Template name too long: {} > {} chars",
            name.len(),
            MAX_TEMPLATE_NAME_LENGTH
        ));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err("Template name contains control characters".into());
    }
    Ok(())
}

// ============================================================================
// Control Socket
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Unique request ID for correlation and debugging
    pub id: u64,
    /// The actual request
    #[serde(flatten)]
    pub request: Request,
}

impl RequestEnvelope {
    pub fn new(request: Request) -> Self {
        Self {
            id: generate_request_id(),
            request,
        }
    }

    pub fn with_id(request: Request, id: u64) -> Self {
        Self { id, request }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "data")]
pub enum Request {
    Ping,
    Version,
    GetStatus,
    GetSettings,
    SetSetting { key: String, value: i64 },
    /// Inject a bus signal (stand-in for the system bus on test setups)
    Signal(BusSignal),
}

impl Request {
    /// Validate request parameters before sending to daemon
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Request::Ping | Request::Version | Request::GetStatus | Request::GetSettings => Ok(()),
            Request::SetSetting { key, value: _ } => validate_setting_key(key),
            Request::Signal(_) => Ok(()),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Request::Ping => "Ping",
            Request::Version => "Version",
            Request::GetStatus => "GetStatus",
            Request::GetSettings => "GetSettings",
            Request::SetSetting { .. } => "SetSetting",
            Request::Signal(_) => "Signal",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Request ID this response corresponds to
    pub id: u64,
    /// The actual response
    #[serde(flatten)]
    pub response: Response,
}

impl ResponseEnvelope {
    pub fn new(id: u64, response: Response) -> Self {
        Self { id, response }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Response {
    #[serde(rename = "ok")]
    Ok(ResponseData),
    #[serde(rename = "error")]
    Error { message: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<FingerprintStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<Vec<SettingEntry>>,
}

impl ResponseData {
    pub fn none() -> Self { Self::default() }
    pub fn string(v: String) -> Self { Self { value: Some(v), ..Self::default() } }
    pub fn fingerprint(s: FingerprintStatus) -> Self { Self { fingerprint: Some(s), ..Self::default() } }
    pub fn setting_list(s: Vec<SettingEntry>) -> Self { Self { settings: Some(s), ..Self::default() } }
}

impl Response {
    pub fn ok() -> Self {
        Response::Ok(ResponseData::none())
    }

    pub fn ok_string(s: impl Into<String>) -> Self {
        Response::Ok(ResponseData::string(s.into()))
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Response::Error { message: msg.into() }
    }
}

/// Snapshot of the fingerprint wakeup machinery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintStatus {
    pub service: ServiceState,
    pub fpstate: FpState,
    pub operation: String,
    pub operation_state: String,
    pub allowed: bool,
    pub primed: bool,
    pub enrolled: usize,
    pub enroll_in_progress: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingEntry {
    pub key: String,
    pub value: i64,
}

pub fn validate_setting_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("Setting key cannot be empty".into());
    }
    if key.len() > MAX_SETTING_KEY_LENGTH {
        return Err(format!(
            "Setting key too long: {} > {} chars",
            key.len(),
            MAX_SETTING_KEY_LENGTH
        ));
    }
    if !key.starts_with(SETTING_KEY_PREFIX) {
        return Err(format!("Setting key must start with {}", SETTING_KEY_PREFIX));
    }
    for c in key.chars() {
        if !c.is_ascii_alphanumeric() && c != '/' && c != '_' && c != '-' {
            return Err(format!("Setting key contains invalid character: {:?}", c));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fpstate_parse() {
        assert_eq!(FpState::parse("FPSTATE_IDLE"), FpState::Idle);
        assert_eq!(FpState::parse("FPSTATE_IDENTIFYING"), FpState::Identifying);
        assert_eq!(FpState::parse("FPSTATE_WHATEVER"), FpState::Unknown);
        assert_eq!(FpState::Aborting.to_string(), "FPSTATE_ABORTING");
    }

    #[test]
    fn test_bus_signal_wire_format() {
        let json = serde_json::to_string(&BusSignal::DisplayStateNext(DisplayState::LpmOn)).unwrap();
        assert_eq!(json, r#"{"signal":"display_state_next","value":"lpm_on"}"#);

        let parsed: BusSignal =
            serde_json::from_str(r#"{"signal":"key","value":{"code":116,"pressed":true}}"#).unwrap();
        assert_eq!(parsed, BusSignal::Key(KeyEvent::power(true)));
    }

    #[test]
    fn test_fpd_message_parse() {
        let msg: FpdMessage =
            serde_json::from_str(r#"{"type":"reply","id":7,"reply":{"kind":"code","value":"already_idle"}}"#)
                .unwrap();
        match msg {
            FpdMessage::Reply { id, reply } => {
                assert_eq!(id, 7);
                assert_eq!(reply, FpdReply::Code(FpdReplyCode::AlreadyIdle));
            }
            other => panic!("unexpected message: {:?}", other),
        }

        let msg: FpdMessage =
            serde_json::from_str(r#"{"type":"signal","signal":"identified","name":"alice"}"#).unwrap();
        assert!(matches!(msg, FpdMessage::Signal(FpdSignal::Identified { ref name }) if name == "alice"));
    }

    #[test]
    fn test_state_from_str() {
        assert_eq!("lpm-on".parse::<DisplayState>().unwrap(), DisplayState::LpmOn);
        assert_eq!("Closed".parse::<CoverState>().unwrap(), CoverState::Closed);
        assert!("sideways".parse::<DisplayState>().is_err());
    }

    #[test]
    fn test_submode_bits() {
        let sm = Submode::NORMAL.with(Submode::TKLOCK);
        assert!(sm.contains(Submode::TKLOCK));
        assert!(!sm.without(Submode::TKLOCK).contains(Submode::TKLOCK));
        assert!(Submode::default().contains(Submode::INVALID));
    }

    fn round_trip(response: Response) -> Response {
        let json = serde_json::to_string(&ResponseEnvelope::new(3, response)).unwrap();
        let parsed: ResponseEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, 3);
        parsed.response
    }

    #[test]
    fn test_response_envelope_wire_format() {
        let status = FingerprintStatus {
            service: ServiceState::Running,
            fpstate: FpState::Identifying,
            operation: "identify".into(),
            operation_state: "pending".into(),
            allowed: true,
            primed: false,
            enrolled: 2,
            enroll_in_progress: false,
        };
        match round_trip(Response::Ok(ResponseData::fingerprint(status.clone()))) {
            Response::Ok(data) => {
                assert_eq!(data.fingerprint, Some(status));
                assert!(data.value.is_none());
                assert!(data.settings.is_none());
            }
            other => panic!("unexpected response: {:?}", other),
        }

        let entries = vec![SettingEntry { key: "/system/osso/dsm/fingerprint/mode".into(), value: 2 }];
        match round_trip(Response::Ok(ResponseData::setting_list(entries.clone()))) {
            Response::Ok(data) => assert_eq!(data.settings, Some(entries)),
            other => panic!("unexpected response: {:?}", other),
        }

        match round_trip(Response::ok_string("pong")) {
            Response::Ok(data) => assert_eq!(data.value.as_deref(), Some("pong")),
            other => panic!("unexpected response: {:?}", other),
        }

        match round_trip(Response::ok()) {
            Response::Ok(data) => {
                assert!(data.value.is_none() && data.fingerprint.is_none() && data.settings.is_none())
            }
            other => panic!("unexpected response: {:?}", other),
        }

        assert!(matches!(
            round_trip(Response::error("nope")),
            Response::Error { ref message } if message == "nope"
        ));
    }

    #[test]
    fn test_validate_setting_key() {
        assert!(validate_setting_key("/system/osso/dsm/fingerprint/mode").is_ok());
        assert!(validate_setting_key("/etc/passwd").is_err());
        assert!(validate_setting_key("/system/osso/dsm/fingerprint/../x").is_err());
        assert!(validate_setting_key("").is_err());
    }

    #[test]
    fn test_validate_template_name() {
        assert!(validate_template_name("alice").is_ok());
        assert!(validate_template_name("").is_err());
        assert!(validate_template_name("a\nb").is_err());
        assert!(validate_template_name(&"x".repeat(MAX_TEMPLATE_NAME_LENGTH + 1)).is_err());
    }
}
