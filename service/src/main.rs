// Copyright 2025 HEM Sp. z o.o.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod action_cli;
mod cli;
mod logger;
mod poll;
mod serve;

use clap::Parser;
use log::{debug, error, info};
use tokio::runtime::Runtime;

use crate::cli::{Cli, Commands};
use crate::logger::init_logger;
use crate::serve::shutdown_signal;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(e) = init_logger(cli.log_file.clone(), cli.log_level) {
        eprintln!("Failed to initialize logger: {}", e);
    }

    let command = cli.command.unwrap_or(Commands::Serve);
    if let Commands::Actions = command {
        action_cli::print_actions();
        return Ok(());
    }

    info!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    debug!("Creating Tokio runtime");
    let rt = Runtime::new()?;
    let result = rt.block_on(async {
        match &command {
            Commands::Serve => serve::serve(&cli.server).await,
            Commands::Run { connection, action } => action_cli::run_action(connection, action).await,
            Commands::Poll { connection } => poll::poll_events(connection, shutdown_signal()).await,
            Commands::Actions => Ok(()),
        }
    });

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}
