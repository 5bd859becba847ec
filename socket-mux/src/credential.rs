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

//! Socket Mode credentials and the bot-token pool key.

use crate::error::MuxError;
use crate::observability::events;
use serde::Deserialize;
use std::collections::hash_map::DefaultHasher;
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use tracing::warn;

const COMPONENT: &str = "credential";

const BOT_TOKEN_PREFIX: &str = "xoxb-";
const APP_TOKEN_PREFIX: &str = "xapp-";

/// Bot token a connection authenticates as.
///
/// Two credentials share a pooled connection if and only if their bot tokens are
/// equal. `Debug` and `Display` only ever print [`BotToken::fingerprint`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct BotToken(String);

impl BotToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw secret, for handing to a transport.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Stable, non-reversible label used in logs and diagnostics.
    pub fn fingerprint(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.0.hash(&mut hasher);
        format!("bot#{:08x}", hasher.finish() as u32)
    }
}

impl Debug for BotToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "BotToken({})", self.fingerprint())
    }
}

impl Display for BotToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fingerprint())
    }
}

/// The three Socket Mode secrets. Immutable for the lifetime of a connection.
#[derive(Clone, Deserialize)]
pub struct Credential {
    signing_secret: String,
    bot_token: BotToken,
    app_token: String,
}

impl Credential {
    pub fn new(
        signing_secret: impl Into<String>,
        bot_token: impl Into<String>,
        app_token: impl Into<String>,
    ) -> Self {
        Self {
            signing_secret: signing_secret.into(),
            bot_token: BotToken::new(bot_token),
            app_token: app_token.into(),
        }
    }

    pub fn signing_secret(&self) -> &str {
        &self.signing_secret
    }

    pub fn bot_token(&self) -> &BotToken {
        &self.bot_token
    }

    pub fn app_token(&self) -> &str {
        &self.app_token
    }

    /// Fails on empty secrets. Unexpected token prefixes are only warned about,
    /// since the platform is the authority on token validity.
    pub fn validate(&self) -> Result<(), MuxError> {
        if self.signing_secret.is_empty() {
            return Err(MuxError::InvalidCredential("signing secret"));
        }
        if self.bot_token.expose().is_empty() {
            return Err(MuxError::InvalidCredential("bot token"));
        }
        if self.app_token.is_empty() {
            return Err(MuxError::InvalidCredential("app-level token"));
        }

        if !self.bot_token.expose().starts_with(BOT_TOKEN_PREFIX) {
            warn!(
                event = events::CREDENTIAL_UNEXPECTED_PREFIX,
                component = COMPONENT,
                bot = %self.bot_token,
                expected = BOT_TOKEN_PREFIX,
                "bot token does not carry the expected prefix"
            );
        }
        if !self.app_token.starts_with(APP_TOKEN_PREFIX) {
            warn!(
                event = events::CREDENTIAL_UNEXPECTED_PREFIX,
                component = COMPONENT,
                bot = %self.bot_token,
                expected = APP_TOKEN_PREFIX,
                "app-level token does not carry the expected prefix"
            );
        }
        Ok(())
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("bot_token", &self.bot_token)
            .finish_non_exhaustive()
    }
}
