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

//! Bounded cache of compiled message filter patterns.

use crate::error::MuxError;
use crate::error_sink::ErrorSink;
use crate::observability::events;
use lru::LruCache;
use regex::{Regex, RegexBuilder};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

const COMPONENT: &str = "pattern_cache";

/// Result of compiling one pattern string.
#[derive(Clone, Debug)]
pub enum CompiledPattern {
    Matcher(Regex),
    /// The pattern failed to compile and never matches.
    Invalid,
}

impl CompiledPattern {
    /// Unanchored, case-insensitive search.
    pub fn is_match(&self, text: &str) -> bool {
        match self {
            CompiledPattern::Matcher(regex) => regex.is_match(text),
            CompiledPattern::Invalid => false,
        }
    }
}

/// Compiles each distinct pattern once and remembers the outcome, failures included.
///
/// The cache is an LRU bounded by `capacity`; a failed pattern that gets evicted is
/// compiled and reported again on its next use.
pub struct PatternCache {
    entries: Mutex<LruCache<String, CompiledPattern>>,
    error_sink: Arc<dyn ErrorSink>,
}

impl PatternCache {
    pub fn new(capacity: usize, error_sink: Arc<dyn ErrorSink>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            error_sink,
        }
    }

    pub fn compile(&self, pattern: &str) -> CompiledPattern {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(compiled) = entries.get(pattern) {
            return compiled.clone();
        }

        let (compiled, failure) = match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(regex) => {
                debug!(
                    event = events::PATTERN_COMPILE,
                    component = COMPONENT,
                    pattern,
                    "compiled message filter pattern"
                );
                (CompiledPattern::Matcher(regex), None)
            }
            Err(source) => {
                warn!(
                    event = events::PATTERN_COMPILE_FAILED,
                    component = COMPONENT,
                    pattern,
                    "message filter pattern is invalid and will never match"
                );
                (CompiledPattern::Invalid, Some(source))
            }
        };

        entries.put(pattern.to_string(), compiled.clone());
        drop(entries);

        // Reported without the lock held; the sink may call back into routing.
        if let Some(source) = failure {
            self.error_sink.report(
                "Invalid regex pattern",
                &MuxError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                },
            );
        }
        compiled
    }

    pub fn is_match(&self, pattern: &str, text: &str) -> bool {
        self.compile(pattern).is_match(text)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
