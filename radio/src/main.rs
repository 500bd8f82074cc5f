// Copyright 2025 Radio Team
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

use anyhow::Context;
use radio::{config, server, storage};
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use radio_heal::{ClientLookup, HealSys, spawn_replay_loop};
use radio_lock::spawn_lease_maintenance;
use storage::api::ObjectLayer;
use storage::radio::Radio;

#[derive(Parser)]
#[command(name = "radio", version, about = "Active-active S3 mirroring gateway")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the radio gateway server
    Server(ServerArgs),
}

#[derive(Args, Debug, Clone)]
struct ServerArgs {
    /// Path to the YAML configuration; "-" reads it from stdin
    #[arg(short = 'c', long = "config", env = "RADIO_CONFIG")]
    config: String,

    /// Bind address for the peer lock service
    #[arg(long, default_value = "0.0.0.0:9000", env = "RADIO_ADDRESS")]
    address: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Server(args) => match run_server(args).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!("{:#}", err);
                ExitCode::FAILURE
            }
        },
    }
}

async fn run_server(args: ServerArgs) -> anyhow::Result<()> {
    let rconfig = config::load(&args.config).context("invalid command line arguments")?;

    let local_addr: SocketAddr = args
        .address
        .parse()
        .with_context(|| format!("invalid bind address {}", args.address))?;
    let endpoints = rconfig.peer_endpoints(&local_addr)?;
    if !endpoints.is_empty() {
        info!("lock cluster of {} peers configured", endpoints.len());
    }

    let cancel = CancellationToken::new();

    let heal = HealSys::new(rconfig.journal.dir.clone(), cancel.child_token());

    let radio = Radio {
        rconfig: rconfig.clone(),
        endpoints,
        owner: args.address.clone(),
    };
    let store = radio
        .new_object_layer(Arc::clone(&heal), &cancel)
        .await
        .context("unable to initialize the object layer")?;

    for bucket in store.list_buckets().await? {
        info!("serving mirrored bucket {}", bucket.name);
    }

    let lookup: Arc<dyn ClientLookup> = store.clone();
    spawn_replay_loop(Arc::clone(&heal), lookup, cancel.child_token());
    spawn_lease_maintenance(cancel.child_token());

    let rpc = server::start_lock_rpc(local_addr, rconfig.distribute.token.clone(), cancel.child_token())
        .await
        .context("unable to start the lock rpc listener")?;

    info!("radio is ready");

    tokio::signal::ctrl_c().await.context("unable to wait for shutdown signal")?;
    info!("shutdown signal received");
    cancel.cancel();
    let _ = rpc.await;

    Ok(())
}
