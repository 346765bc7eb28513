// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Subcommand implementations and shared setup.

pub mod bench;
pub mod inspect;

use anyhow::Context;
use snippet_runtime::{RepackingPolicy, RuntimeConfig};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` wins over the `-v` count.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Loads the runtime configuration and applies command-line overrides.
///
/// The repacking policy is never guessed: without a file it must come from
/// `--repacking`.
pub fn load_config(
    path: Option<&Path>,
    repacking: Option<&str>,
    threads: Option<usize>,
) -> anyhow::Result<RuntimeConfig> {
    let policy = repacking.map(str::parse::<RepackingPolicy>).transpose()?;
    let mut config = match (path, policy) {
        (Some(path), _) => RuntimeConfig::from_file(path)
            .with_context(|| format!("failed to load config from '{}'", path.display()))?,
        (None, Some(policy)) => RuntimeConfig::new(policy),
        (None, None) => anyhow::bail!(
            "no repacking policy given: pass --repacking <none|in_parallel|separate> or --config <file>"
        ),
    };
    if let Some(policy) = policy {
        config.repacking = policy;
    }
    if threads.is_some() {
        config.num_threads = threads;
    }
    tracing::debug!(?config, "runtime configuration");
    Ok(config)
}

/// Formats a byte count for tables.
pub fn human_bytes(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b >= KB * KB {
        format!("{:.2} MB", b / (KB * KB))
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_is_required_without_config() {
        let err = load_config(None, None, Some(2)).unwrap_err();
        assert!(err.to_string().contains("--repacking"));
    }

    #[test]
    fn test_policy_from_flag() {
        let config = load_config(None, Some("separate"), Some(3)).unwrap();
        assert_eq!(config.repacking, RepackingPolicy::Separate);
        assert_eq!(config.num_threads, Some(3));
    }

    #[test]
    fn test_unknown_policy_is_an_error() {
        assert!(load_config(None, Some("sometimes"), None).is_err());
    }

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(2048), "2.0 KB");
        assert_eq!(human_bytes(3 * 1024 * 1024), "3.00 MB");
    }
}
