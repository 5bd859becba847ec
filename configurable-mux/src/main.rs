/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Drives a socket multiplexer from a json5 configuration and replays recorded
//! Socket Mode events through it, printing every emitted payload as a JSON line.

mod config;
mod replay;
mod sink;

use crate::config::Config;
use crate::replay::{replay, ReplayConnector};
use crate::sink::{JsonLineSink, SharedWriter};
use anyhow::Context;
use clap::Parser;
use socket_mux::{Activation, ActivationMode, SocketMux, SubscriberId};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Parser)]
#[command(name = "configurable-mux")]
#[command(about = "Replay recorded Socket Mode events through configured subscribers")]
struct Cli {
    /// json5 file with `mux`, `credentials` and `subscribers`
    #[arg(short, long, default_value = "config/DEFAULT_CONFIG.json5")]
    config: PathBuf,

    /// JSON-lines event records; standard input when omitted
    #[arg(short, long)]
    events: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    info!(
        config = %cli.config.display(),
        credentials = config.credentials.len(),
        subscribers = config.subscribers.len(),
        "loaded configuration"
    );

    let connector = Arc::new(ReplayConnector::default());
    let mux = SocketMux::builder("configurable-mux", connector.clone())
        .config(config.mux.clone())
        .build();
    let out: SharedWriter = Arc::new(Mutex::new(std::io::stdout()));

    let activations = activate_subscribers(&mux, &config, &out).await;

    let summary = match &cli.events {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("unable to open events file {}", path.display()))?;
            replay(BufReader::new(file), &config, &connector).await?
        }
        None => replay(BufReader::new(tokio::io::stdin()), &config, &connector).await?,
    };

    for activation in activations {
        activation.close().await;
    }
    info!(
        dispatched = summary.dispatched,
        skipped = summary.skipped,
        "done"
    );
    Ok(())
}

/// Activates every valid subscriber entry; invalid ones are logged and skipped.
async fn activate_subscribers(
    mux: &SocketMux,
    config: &Config,
    out: &SharedWriter,
) -> Vec<Activation> {
    let mut activations = Vec::with_capacity(config.subscribers.len());

    for subscriber in &config.subscribers {
        let Some(credential) = config.credential(&subscriber.credential) else {
            warn!(
                subscriber = subscriber.id.as_str(),
                credential = subscriber.credential.as_str(),
                "skipping subscriber with unknown credential"
            );
            continue;
        };

        let sink = Arc::new(JsonLineSink::new(
            SubscriberId::new(subscriber.id.as_str()),
            subscriber.flow_id.clone(),
            out.clone(),
        ));
        let descriptor = match subscriber.descriptor(credential.bot_token(), sink) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                warn!(
                    subscriber = subscriber.id.as_str(),
                    err = %err,
                    "skipping invalid subscriber"
                );
                continue;
            }
        };

        match mux.activate(credential, descriptor, subscriber.mode).await {
            Ok(activation) => {
                if subscriber.mode == ActivationMode::Manual {
                    info!(
                        subscriber = subscriber.id.as_str(),
                        "manual subscriber registered, starting for replay"
                    );
                    if let Err(err) = activation.start().await {
                        warn!(subscriber = subscriber.id.as_str(), err = %err, "unable to start");
                    }
                }
                activations.push(activation);
            }
            Err(err) => {
                warn!(subscriber = subscriber.id.as_str(), err = %err, "activation failed");
            }
        }
    }
    activations
}
