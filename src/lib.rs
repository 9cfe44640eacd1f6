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

//! mce - fingerprint wakeup for Mode Control Entity
//!
//! Client side of the `mced` daemon: the control socket client and the
//! `mcetool` command line. The wakeup machinery itself lives in
//! [`mce_core`], re-exported here for convenience.

pub mod cli;
pub mod client;

pub use client::MceClient;
pub use mce_core::{FingerprintModule, FpWakeupSettings, SettingsStore};
pub use mce_error::{MceError, Result};
