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

//! json5 configuration for the replay tool.

use anyhow::{bail, Context};
use serde::Deserialize;
use socket_mux::{
    ActivationMode, BotToken, Credential, EmitSink, EventKind, MuxConfig, MuxError,
    SubscriptionDescriptor,
};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    #[serde(default)]
    pub(crate) mux: MuxConfig,
    /// Credentials referenced by name from subscribers and event records.
    pub(crate) credentials: HashMap<String, Credential>,
    #[serde(default)]
    pub(crate) subscribers: Vec<SubscriberConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SubscriberConfig {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) flow_id: Option<String>,
    pub(crate) credential: String,
    /// Event kind names, e.g. `message` or `reaction_added`.
    pub(crate) events: Vec<String>,
    #[serde(default)]
    pub(crate) channels: Vec<String>,
    #[serde(default)]
    pub(crate) message_filter: Option<String>,
    #[serde(default)]
    pub(crate) allow_bot_messages: bool,
    #[serde(default)]
    pub(crate) action_id: Option<String>,
    #[serde(default)]
    pub(crate) mode: ActivationMode,
}

impl Config {
    pub(crate) fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub(crate) fn parse(raw: &str) -> anyhow::Result<Self> {
        let config: Config = json5::from_str(raw)?;
        if config.credentials.is_empty() {
            bail!("at least one credential must be configured");
        }
        Ok(config)
    }

    pub(crate) fn credential(&self, name: &str) -> Option<&Credential> {
        self.credentials.get(name)
    }
}

impl SubscriberConfig {
    pub(crate) fn descriptor(
        &self,
        bot_token: &BotToken,
        sink: Arc<dyn EmitSink>,
    ) -> Result<SubscriptionDescriptor, MuxError> {
        let kinds = self
            .events
            .iter()
            .map(|name| EventKind::from_str(name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut builder = SubscriptionDescriptor::builder(self.id.as_str(), bot_token.clone(), sink)
            .event_kinds(kinds)
            .watched_channels(self.channels.iter().map(String::as_str))
            .allow_bot_messages(self.allow_bot_messages);
        if let Some(flow_id) = &self.flow_id {
            builder = builder.flow_id(flow_id.as_str());
        }
        if let Some(pattern) = &self.message_filter {
            builder = builder.message_filter(pattern.as_str());
        }
        if let Some(action_id) = &self.action_id {
            builder = builder.action_id(action_id.as_str());
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::Config;
    use async_trait::async_trait;
    use socket_mux::{ActivationMode, EmitError, EmitSink, EventKind, EventPayload, MuxError};
    use std::io::Write;
    use std::sync::Arc;

    struct NoopSink;

    #[async_trait]
    impl EmitSink for NoopSink {
        async fn emit(&self, _payload: EventPayload) -> Result<(), EmitError> {
            Ok(())
        }
    }

    const SAMPLE: &str = r#"{
        // comments and trailing commas are json5
        mux: { pattern_cache_capacity: 32 },
        credentials: {
            ops: { signing_secret: "s", bot_token: "xoxb-ops", app_token: "xapp-ops" },
        },
        subscribers: [
            {
                id: "deploys",
                credential: "ops",
                events: ["message"],
                channels: ["C1"],
                message_filter: "deploy",
            },
            { id: "reactions", credential: "ops", events: ["reaction_added"], mode: "manual" },
        ],
    }"#;

    #[test]
    fn loads_json5_file_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(SAMPLE.as_bytes()).expect("write config");

        let config = Config::load(file.path()).expect("valid config");

        assert_eq!(config.mux.pattern_cache_capacity, 32);
        assert_eq!(config.mux.channel_list_limit, 200);
        assert_eq!(config.subscribers.len(), 2);
        assert_eq!(config.subscribers[0].mode, ActivationMode::Trigger);
        assert_eq!(config.subscribers[1].mode, ActivationMode::Manual);
        assert_eq!(
            config.credential("ops").expect("ops credential").bot_token().expose(),
            "xoxb-ops"
        );
    }

    #[test]
    fn subscriber_entries_build_descriptors() {
        let config = Config::parse(SAMPLE).expect("valid config");
        let bot = config.credential("ops").expect("ops credential").bot_token().clone();

        let descriptor = config.subscribers[0]
            .descriptor(&bot, Arc::new(NoopSink))
            .expect("valid descriptor");

        assert!(descriptor.subscribes_to(EventKind::Message));
        assert_eq!(descriptor.message_filter(), Some("deploy"));
        assert!(descriptor.watches(Some("C1")));
        assert!(!descriptor.watches(Some("C2")));
    }

    #[test]
    fn unknown_event_names_are_rejected_per_subscriber() {
        let config = Config::parse(
            r#"{
                credentials: { ops: { signing_secret: "s", bot_token: "xoxb-1", app_token: "xapp-1" } },
                subscribers: [
                    { id: "bad", credential: "ops", events: ["channel_created"] },
                    { id: "none", credential: "ops", events: [] },
                ],
            }"#,
        )
        .expect("valid config");
        let bot = config.credential("ops").expect("ops credential").bot_token().clone();

        assert!(matches!(
            config.subscribers[0].descriptor(&bot, Arc::new(NoopSink)),
            Err(MuxError::UnknownEventKind(_))
        ));
        assert!(matches!(
            config.subscribers[1].descriptor(&bot, Arc::new(NoopSink)),
            Err(MuxError::NoEventKinds)
        ));
    }

    #[test]
    fn missing_file_and_empty_credentials_are_errors() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert!(Config::load(&dir.path().join("absent.json5")).is_err());
        assert!(Config::parse("{ credentials: {} }").is_err());
    }
}
