//! Fingerprint Wakeup Settings
//!
//! Persistent settings stored as JSON (default /etc/mce/fingerprint.json).
//! Every value is hot reloadable: a change is reported to the fingerprint
//! module as a [`SettingChange`] and takes effect the next time the
//! corresponding timer is armed or the policy is evaluated.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use mce_protocol::SettingEntry;

use crate::constants::settings as keys;
use crate::{MceError, Result};

/// Fingerprint wakeup enable modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FpWakeupMode {
    /// Fingerprint wakeups disabled
    #[default]
    Never,
    /// Fingerprint wakeups always enabled
    Always,
    /// Fingerprint wakeups enabled when PS is not covered
    NoProximity,
}

impl FpWakeupMode {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(FpWakeupMode::Never),
            1 => Some(FpWakeupMode::Always),
            2 => Some(FpWakeupMode::NoProximity),
            _ => None,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            FpWakeupMode::Never => 0,
            FpWakeupMode::Always => 1,
            FpWakeupMode::NoProximity => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FpWakeupMode::Never => "never",
            FpWakeupMode::Always => "always",
            FpWakeupMode::NoProximity => "no_proximity",
        }
    }
}

/// A single validated setting update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingChange {
    Mode(FpWakeupMode),
    AllowDelay(u32),
    TriggerDelay(u32),
    ThrottleDelay(u32),
}

impl SettingChange {
    /// Validate a raw key/value pair
    pub fn parse(key: &str, value: i64) -> Result<Self> {
        match key {
            keys::FPWAKEUP_MODE => FpWakeupMode::from_i64(value)
                .map(SettingChange::Mode)
                .ok_or_else(|| MceError::invalid_setting(key, format!("unknown mode {}", value))),
            keys::FPWAKEUP_ALLOW_DELAY => parse_delay(key, value).map(SettingChange::AllowDelay),
            keys::FPWAKEUP_TRIGGER_DELAY => parse_delay(key, value).map(SettingChange::TriggerDelay),
            keys::FPWAKEUP_THROTTLE_DELAY => parse_delay(key, value).map(SettingChange::ThrottleDelay),
            _ => Err(MceError::UnknownSetting(key.to_string())),
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            SettingChange::Mode(_) => keys::FPWAKEUP_MODE,
            SettingChange::AllowDelay(_) => keys::FPWAKEUP_ALLOW_DELAY,
            SettingChange::TriggerDelay(_) => keys::FPWAKEUP_TRIGGER_DELAY,
            SettingChange::ThrottleDelay(_) => keys::FPWAKEUP_THROTTLE_DELAY,
        }
    }
}

fn parse_delay(key: &str, value: i64) -> Result<u32> {
    if value < 0 || value > keys::MAX_DELAY_MS as i64 {
        return Err(MceError::invalid_setting(
            key,
            format!("{} ms out of range (0-{})", value, keys::MAX_DELAY_MS),
        ));
    }
    Ok(value as u32)
}

/// Fingerprint wakeup settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FpWakeupSettings {
    #[serde(default)]
    pub mode: FpWakeupMode,

    #[serde(default = "default_allow_delay")]
    pub allow_delay_ms: u32,

    #[serde(default = "default_trigger_delay")]
    pub trigger_delay_ms: u32,

    #[serde(default = "default_throttle_delay")]
    pub throttle_delay_ms: u32,
}

fn default_allow_delay() -> u32 {
    keys::DEFAULT_FPWAKEUP_ALLOW_DELAY
}

fn default_trigger_delay() -> u32 {
    keys::DEFAULT_FPWAKEUP_TRIGGER_DELAY
}

fn default_throttle_delay() -> u32 {
    keys::DEFAULT_FPWAKEUP_THROTTLE_DELAY
}

impl Default for FpWakeupSettings {
    fn default() -> Self {
        Self {
            mode: FpWakeupMode::from_i64(keys::DEFAULT_FPWAKEUP_MODE).unwrap_or_default(),
            allow_delay_ms: default_allow_delay(),
            trigger_delay_ms: default_trigger_delay(),
            throttle_delay_ms: default_throttle_delay(),
        }
    }
}

impl FpWakeupSettings {
    pub fn allow_delay(&self) -> Duration {
        Duration::from_millis(self.allow_delay_ms as u64)
    }

    pub fn trigger_delay(&self) -> Duration {
        Duration::from_millis(self.trigger_delay_ms as u64)
    }

    pub fn throttle_delay(&self) -> Duration {
        Duration::from_millis(self.throttle_delay_ms as u64)
    }

    /// Apply a validated change, returning true if a value actually changed
    pub fn apply(&mut self, change: SettingChange) -> bool {
        match change {
            SettingChange::Mode(mode) => std::mem::replace(&mut self.mode, mode) != mode,
            SettingChange::AllowDelay(ms) => std::mem::replace(&mut self.allow_delay_ms, ms) != ms,
            SettingChange::TriggerDelay(ms) => std::mem::replace(&mut self.trigger_delay_ms, ms) != ms,
            SettingChange::ThrottleDelay(ms) => std::mem::replace(&mut self.throttle_delay_ms, ms) != ms,
        }
    }

    /// Key/value listing in the form used by the control socket
    pub fn entries(&self) -> Vec<SettingEntry> {
        vec![
            SettingEntry { key: keys::FPWAKEUP_MODE.to_string(), value: self.mode.as_i64() },
            SettingEntry { key: keys::FPWAKEUP_ALLOW_DELAY.to_string(), value: self.allow_delay_ms as i64 },
            SettingEntry { key: keys::FPWAKEUP_TRIGGER_DELAY.to_string(), value: self.trigger_delay_ms as i64 },
            SettingEntry { key: keys::FPWAKEUP_THROTTLE_DELAY.to_string(), value: self.throttle_delay_ms as i64 },
        ]
    }
}

/// File backed settings
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    settings: FpWakeupSettings,
}

impl SettingsStore {
    /// Load settings from `path`; a missing file yields defaults
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings = load_settings_file(&path)?;
        debug!("Loaded fingerprint settings from {}: {:?}", path.display(), settings);
        Ok(Self { path, settings })
    }

    pub fn settings(&self) -> &FpWakeupSettings {
        &self.settings
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validate, apply and persist a single key
    ///
    /// Returns `Ok(None)` when the value was already in effect. A value
    /// that cannot be persisted is not applied either.
    pub fn set(&mut self, key: &str, value: i64) -> Result<Option<SettingChange>> {
        let change = SettingChange::parse(key, value)?;
        let previous = self.settings.clone();
        if !self.settings.apply(change) {
            return Ok(None);
        }
        if let Err(e) = self.save() {
            self.settings = previous;
            return Err(e);
        }
        info!("setting {} = {}", key, value);
        Ok(Some(change))
    }

    /// Write settings atomically (temp file + rename)
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| MceError::FileWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path).map_err(|e| MceError::FileWrite {
            path: temp_path.clone(),
            source: e,
        })?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| MceError::FileWrite {
                path: temp_path.clone(),
                source: e,
            })?;
        drop(file);

        fs::rename(&temp_path, &self.path).map_err(|e| MceError::FileWrite {
            path: self.path.clone(),
            source: e,
        })?;

        Ok(())
    }
}

fn load_settings_file(path: &Path) -> Result<FpWakeupSettings> {
    if !path.exists() {
        return Ok(FpWakeupSettings::default());
    }

    let content = fs::read_to_string(path).map_err(|e| MceError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let settings: FpWakeupSettings = serde_json::from_str(&content)
        .map_err(|e| MceError::config(format!("Failed to parse {}: {}", path.display(), e)))?;

    for (key, ms) in [
        (keys::FPWAKEUP_ALLOW_DELAY, settings.allow_delay_ms),
        (keys::FPWAKEUP_TRIGGER_DELAY, settings.trigger_delay_ms),
        (keys::FPWAKEUP_THROTTLE_DELAY, settings.throttle_delay_ms),
    ] {
        parse_delay(key, ms as i64)?;
    }

    Ok(settings)
}
