// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Runtime configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! num_threads = 4
//! repacking = "in_parallel"
//! specialization = "dynamic"
//! scratch_budget = "64M"
//! enable_profiling = true
//! ```
//!
//! `repacking` has no default: whether inputs are converted by every
//! worker or once up front is a property of how the kernel was compiled,
//! so it must be stated.

use crate::{RuntimeError, SpecializationMode};
use memory_manager::MemoryBudget;
use snippet_ir::SubgraphAttrs;
use std::fmt;
use std::path::Path;

/// How inputs that need a layout conversion are repacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepackingPolicy {
    /// No runtime repacking; only valid if no non-constant input needs it.
    None,
    /// Each worker repacks the matrices its own work items read.
    InParallel,
    /// Every input is repacked once, serially, before dispatch.
    Separate,
}

impl fmt::Display for RepackingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::InParallel => "in_parallel",
            Self::Separate => "separate",
        })
    }
}

impl std::str::FromStr for RepackingPolicy {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "none" => Ok(Self::None),
            "in_parallel" | "parallel" => Ok(Self::InParallel),
            "separate" | "serial" => Ok(Self::Separate),
            other => Err(RuntimeError::ConfigError(format!(
                "unknown repacking policy '{other}'; expected 'none', 'in_parallel' or 'separate'"
            ))),
        }
    }
}

/// Configuration for executors and their shared context.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RuntimeConfig {
    /// Worker lanes per call (defaults to the number of online CPU cores).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_threads: Option<usize>,
    /// Repacking policy. Required.
    pub repacking: RepackingPolicy,
    /// Specialization mode; derived from the attribute shapes when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialization: Option<SpecializationMode>,
    /// Budget of the scratchpad pool (human-readable, e.g. `"64M"`).
    #[serde(default = "default_budget")]
    pub scratch_budget: String,
    /// Whether executors keep per-call metrics.
    #[serde(default = "default_true")]
    pub enable_profiling: bool,
}

fn default_budget() -> String {
    "64M".to_string()
}

fn default_true() -> bool {
    true
}

impl RuntimeConfig {
    /// A configuration with the given policy and defaults elsewhere.
    pub fn new(repacking: RepackingPolicy) -> Self {
        Self {
            num_threads: None,
            repacking,
            specialization: None,
            scratch_budget: default_budget(),
            enable_profiling: true,
        }
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::ConfigError(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, RuntimeError> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| RuntimeError::ConfigError(format!("TOML parse error: {e}")))?;
        if config.num_threads == Some(0) {
            return Err(RuntimeError::ConfigError("num_threads must be at least 1".into()));
        }
        Ok(config)
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, RuntimeError> {
        toml::to_string_pretty(self)
            .map_err(|e| RuntimeError::ConfigError(format!("TOML serialise error: {e}")))
    }

    /// Parses the scratch budget string into a [`MemoryBudget`].
    pub fn parse_budget(&self) -> Result<MemoryBudget, RuntimeError> {
        MemoryBudget::parse(&self.scratch_budget)
            .map_err(|e| RuntimeError::ConfigError(e.to_string()))
    }

    /// Resolves the number of worker lanes.
    pub fn resolve_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }

    /// The configured mode, or `Static` for fully known shapes and
    /// `DynamicSpecialized` otherwise.
    pub fn resolve_mode(&self, attrs: &SubgraphAttrs) -> SpecializationMode {
        self.specialization.unwrap_or(if attrs.is_static() {
            SpecializationMode::Static
        } else {
            SpecializationMode::DynamicSpecialized
        })
    }
}
