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

//! mcetool command line interface

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

use mce_core::constants::paths;
use mce_protocol::{BusSignal, KeyEvent, Submode};

use crate::client::MceClient;

#[derive(Parser, Debug)]
#[command(name = "mcetool")]
#[command(version)]
#[command(about = "Inspect and drive the mce fingerprint wakeup daemon")]
#[command(long_about = "Inspect and drive the mce fingerprint wakeup daemon

EXAMPLES:
    mcetool status                                      Show fingerprint wakeup state
    mcetool settings show                               List settings
    mcetool settings set /system/osso/dsm/fingerprint/mode 1
    mcetool signal display-next off                     Inject a display state change
    mcetool signal powerkey press                       Inject a power key press")]
pub struct Cli {
    /// Control socket of mced
    #[arg(short, long, default_value = paths::CONTROL_SOCKET)]
    pub socket: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show fingerprint wakeup state
    Status,

    /// View and modify settings
    #[command(subcommand)]
    Settings(SettingsCommands),

    /// Inject a system signal
    Signal {
        /// fpd-service, system, devicelock, submode, display-next, interaction,
        /// topmost, proximity, lid or powerkey
        name: String,
        value: String,
    },

    /// Check that the daemon answers
    Ping,
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommands {
    /// Show all settings
    Show,
    /// Change a setting
    Set { key: String, value: i64 },
}

/// Build the bus signal named on the command line
pub fn parse_signal(name: &str, value: &str) -> Result<BusSignal> {
    let signal = match name {
        "fpd-service" => BusSignal::FpdServiceState(value.parse().map_err(|e: String| anyhow!(e))?),
        "system" => BusSignal::SystemState(value.parse().map_err(|e: String| anyhow!(e))?),
        "devicelock" => BusSignal::DeviceLockState(value.parse().map_err(|e: String| anyhow!(e))?),
        "submode" => BusSignal::Submode(parse_submode(value)?),
        "display-next" => BusSignal::DisplayStateNext(value.parse().map_err(|e: String| anyhow!(e))?),
        "interaction" => BusSignal::InteractionExpected(parse_bool(value)?),
        "topmost" => BusSignal::TopmostWindowPid(match value {
            "none" | "0" => None,
            pid => Some(pid.parse().with_context(|| format!("Invalid pid: {:?}", pid))?),
        }),
        "proximity" => BusSignal::ProximitySensor(value.parse().map_err(|e: String| anyhow!(e))?),
        "lid" => BusSignal::LidSensor(value.parse().map_err(|e: String| anyhow!(e))?),
        "powerkey" => BusSignal::Key(KeyEvent::power(match value {
            "press" => true,
            "release" => false,
            other => return Err(anyhow!("Expected press or release, got {:?}", other)),
        })),
        other => return Err(anyhow!("Unknown signal: {}", other)),
    };
    Ok(signal)
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        other => Err(anyhow!("Expected true or false, got {:?}", other)),
    }
}

/// Accepts a raw bitmask or `+`-joined flag names such as `tklock+devicelock`
fn parse_submode(value: &str) -> Result<Submode> {
    if let Some(hex) = value.strip_prefix("0x") {
        return Ok(Submode(u32::from_str_radix(hex, 16).context("Invalid submode mask")?));
    }
    if let Ok(bits) = value.parse::<u32>() {
        return Ok(Submode(bits));
    }

    value.split('+').try_fold(Submode::NORMAL, |acc, flag| {
        let bit = match flag {
            "normal" => Submode::NORMAL,
            "tklock" => Submode::TKLOCK,
            "eveater" => Submode::EVEATER,
            "bootup" => Submode::BOOTUP,
            "transition" => Submode::TRANSITION,
            "autorelock" => Submode::AUTORELOCK,
            "visual-tklock" => Submode::VISUAL_TKLOCK,
            "pocket" => Submode::POCKET,
            "devicelock" => Submode::DEVICELOCK,
            other => return Err(anyhow!("Unknown submode flag: {}", other)),
        };
        Ok(acc.with(bit))
    })
}

pub fn run_cli(cli: &Cli) -> Result<()> {
    let mut client = MceClient::connect(&cli.socket)?;

    match &cli.command {
        Commands::Status => cmd_status(&mut client),
        Commands::Settings(SettingsCommands::Show) => {
            for entry in client.settings()? {
                println!("{} = {}", entry.key, entry.value);
            }
            Ok(())
        }
        Commands::Settings(SettingsCommands::Set { key, value }) => {
            client.set_setting(key, *value)?;
            println!("{} = {}", key, value);
            Ok(())
        }
        Commands::Signal { name, value } => {
            client.signal(parse_signal(name, value)?)?;
            Ok(())
        }
        Commands::Ping => {
            client.ping()?;
            println!("mced {} is alive", client.version()?);
            Ok(())
        }
    }
}

fn cmd_status(client: &mut MceClient) -> Result<()> {
    let status = client.status()?;

    println!("Fingerprint Wakeup Status");
    println!("=========================");
    println!();
    println!("Service:            {}", status.service);
    println!("Daemon state:       {}", status.fpstate);
    println!("Operation:          {} ({})", status.operation, status.operation_state);
    println!("Wakeup allowed:     {}", if status.allowed { "yes" } else { "no" });
    println!("Primed:             {}", if status.primed { "yes" } else { "no" });
    println!("Enrolled templates: {}", status.enrolled);
    println!("Enroll in progress: {}", if status.enroll_in_progress { "yes" } else { "no" });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mce_protocol::{CoverState, DisplayState, ServiceState};

    #[test]
    fn test_parse_signals() {
        assert_eq!(parse_signal("display-next", "lpm-on").unwrap(), BusSignal::DisplayStateNext(DisplayState::LpmOn));
        assert_eq!(parse_signal("fpd-service", "running").unwrap(), BusSignal::FpdServiceState(ServiceState::Running));
        assert_eq!(parse_signal("lid", "closed").unwrap(), BusSignal::LidSensor(CoverState::Closed));
        assert_eq!(parse_signal("powerkey", "press").unwrap(), BusSignal::Key(KeyEvent::power(true)));
        assert_eq!(parse_signal("interaction", "no").unwrap(), BusSignal::InteractionExpected(false));
        assert_eq!(parse_signal("topmost", "none").unwrap(), BusSignal::TopmostWindowPid(None));
        assert_eq!(parse_signal("topmost", "1234").unwrap(), BusSignal::TopmostWindowPid(Some(1234)));
    }

    #[test]
    fn test_parse_signal_errors() {
        assert!(parse_signal("display-next", "sideways").is_err());
        assert!(parse_signal("powerkey", "hold").is_err());
        assert!(parse_signal("volume", "up").is_err());
        assert!(parse_signal("topmost", "abc").is_err());
    }

    #[test]
    fn test_parse_submode() {
        assert_eq!(parse_submode("tklock").unwrap(), Submode::TKLOCK);
        assert_eq!(parse_submode("tklock+devicelock").unwrap(), Submode::TKLOCK.with(Submode::DEVICELOCK));
        assert_eq!(parse_submode("0x2").unwrap(), Submode::TKLOCK);
        assert_eq!(parse_submode("2").unwrap(), Submode::TKLOCK);
        assert!(parse_submode("tklock+bogus").is_err());
    }

    #[test]
    fn test_cli_parse() {
        let cli = Cli::try_parse_from(["mcetool", "settings", "set", "/system/osso/dsm/fingerprint/mode", "2"]).unwrap();
        match cli.command {
            Commands::Settings(SettingsCommands::Set { key, value }) => {
                assert_eq!(key, "/system/osso/dsm/fingerprint/mode");
                assert_eq!(value, 2);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(cli.socket, paths::CONTROL_SOCKET);

        let cli = Cli::try_parse_from(["mcetool", "-s", "/tmp/x.sock", "signal", "powerkey", "release"]).unwrap();
        assert_eq!(cli.socket, "/tmp/x.sock");
        assert!(Cli::try_parse_from(["mcetool"]).is_err());
    }
}
