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

use clap::Parser;

use mce::cli::{run_cli, Cli};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run_cli(&cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
