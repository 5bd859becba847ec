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

use crate::transport::ChannelQuery;
use serde::{Deserialize, Serialize};

const DEFAULT_PATTERN_CACHE_CAPACITY: usize = 1024;
const DEFAULT_CHANNEL_LIST_LIMIT: u32 = 200;
const DEFAULT_CHANNEL_TYPES: [&str; 2] = ["public_channel", "private_channel"];

/// Tunables for a [`crate::SocketMux`]. Every field falls back to its default
/// when missing from a configuration file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    /// Maximum number of distinct message filter patterns kept compiled.
    pub pattern_cache_capacity: usize,
    /// Page size requested when listing channels for configuration UIs.
    pub channel_list_limit: u32,
    /// Conversation types requested when listing channels.
    pub channel_types: Vec<String>,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            pattern_cache_capacity: DEFAULT_PATTERN_CACHE_CAPACITY,
            channel_list_limit: DEFAULT_CHANNEL_LIST_LIMIT,
            channel_types: DEFAULT_CHANNEL_TYPES.map(String::from).to_vec(),
        }
    }
}

impl MuxConfig {
    pub(crate) fn channel_query(&self) -> ChannelQuery {
        ChannelQuery {
            types: self.channel_types.clone(),
            limit: self.channel_list_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MuxConfig;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: MuxConfig =
            serde_json::from_str(r#"{"pattern_cache_capacity": 8}"#).expect("valid config");

        assert_eq!(config.pattern_cache_capacity, 8);
        assert_eq!(config.channel_list_limit, 200);
        assert_eq!(
            config.channel_query().types,
            vec!["public_channel".to_string(), "private_channel".to_string()]
        );
    }
}
