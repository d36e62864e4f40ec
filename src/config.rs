// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub feed: FeedConfig,
    pub ranking: RankingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Fixed number of rows per feed page
    pub page_size: i64,
    /// Deadline for a single relation-store or tag-hierarchy call
    pub dependency_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Exponent applied to post age when decaying engagement
    pub gravity: f64,
}

static CONFIG: OnceCell<Config> = OnceCell::new();

impl Config {
    pub fn from_env() -> Self {
        // Load .env file if present
        let _ = dotenv::dotenv();

        Config {
            feed: FeedConfig {
                page_size: env::var("FEED_PAGE_SIZE")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .expect("FEED_PAGE_SIZE must be a number"),
                dependency_timeout_ms: env::var("DEPENDENCY_TIMEOUT_MS")
                    .unwrap_or_else(|_| "2000".to_string()) // 2 seconds by default
                    .parse()
                    .expect("DEPENDENCY_TIMEOUT_MS must be a number"),
            },
            ranking: RankingConfig {
                gravity: env::var("RANKING_GRAVITY")
                    .unwrap_or_else(|_| "1.5".to_string())
                    .parse()
                    .expect("RANKING_GRAVITY must be a number"),
            },
        }
    }

    /// Get the process-wide configuration, loading it from the environment on first use
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(Config::from_env)
    }

    pub fn dependency_timeout(&self) -> Duration {
        Duration::from_millis(self.feed.dependency_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            feed: FeedConfig {
                page_size: 20,
                dependency_timeout_ms: 2000,
            },
            ranking: RankingConfig { gravity: 1.5 },
        }
    }
}
