/*
 * 5D Labs Agent Platform - Event Alerter
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! Event Alerter - Kubernetes events to Alertmanager
//!
//! This service watches core/v1 Events across all namespaces and forwards
//! the ones matching the configured filter rules as alerts:
//! - Watching the cluster event stream with an initial full sync
//! - Coalescing bursts of updates into a deduplicating work queue
//! - Retrying failed deliveries with exponential backoff

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use event_alerter::controller::{Controller, ControllerOptions};
use event_alerter::{AlertManager, FilterConfig};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "event-alerter", version, about = "Forward Kubernetes events to Alertmanager")]
struct Args {
    /// Base URL of the Alertmanager gateway
    #[arg(long, env = "ALERTMANAGER_URL", default_value = "http://127.0.0.1:9093")]
    alertmanager: String,

    /// Path to the YAML filter rules file; omit to alert on every event
    #[arg(long = "config-file", env = "FILTER_CONFIG_FILE")]
    config_file: Option<PathBuf>,

    /// Number of concurrent reconciliation workers
    #[arg(long, env = "ALERT_WORKERS", default_value_t = 1)]
    workers: usize,

    /// Per-request timeout for alert deliveries, in seconds
    #[arg(long = "request-timeout", env = "ALERT_REQUEST_TIMEOUT", default_value_t = 10)]
    request_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let filter_config = match &args.config_file {
        Some(path) => FilterConfig::from_file(path)
            .with_context(|| format!("failed to load filter rules from {}", path.display()))?,
        None => {
            info!("no filter rules configured, every event will fire an alert");
            FilterConfig::default()
        }
    };

    let client = kube::Client::try_default()
        .await
        .context("failed to initialize Kubernetes client")?;

    let handler = AlertManager::new(
        &args.alertmanager,
        &filter_config,
        Duration::from_secs(args.request_timeout),
    )
    .context("failed to build Alertmanager handler")?;

    info!(
        alertmanager = %args.alertmanager,
        workers = args.workers,
        "starting event alerter"
    );

    let controller = Controller::new(
        client,
        handler,
        ControllerOptions {
            workers: args.workers,
            ..ControllerOptions::default()
        },
    );

    controller.run(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
