// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Executor profiling metrics.
//!
//! [`ExecutionMetrics`] aggregates every call of one executor;
//! [`CallMetrics`] describes a single call and is kept in the history only
//! when profiling is enabled. The history holds the most recent
//! [`HISTORY_CAPACITY`] calls.

use std::collections::VecDeque;
use std::time::Duration;

/// Calls kept in [`ExecutionMetrics::history`].
pub const HISTORY_CAPACITY: usize = 64;

/// Metrics of a single `execute` call.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct CallMetrics {
    /// Work items of the call.
    pub work_amount: usize,
    /// Lanes that received work.
    pub lanes: usize,
    pub kernel_invocations: u64,
    pub repack_copies: u64,
    pub repack_skips: u64,
    /// Time spent repacking, summed over lanes.
    pub repack_duration: Duration,
    /// Wall-clock time of the call.
    pub total_duration: Duration,
}

/// Aggregate metrics of an executor.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ExecutionMetrics {
    pub calls: u64,
    pub kernel_invocations: u64,
    pub repack_copies: u64,
    pub repack_skips: u64,
    pub total_repack_duration: Duration,
    pub total_duration: Duration,
    /// Times the layout was (re)built.
    pub layout_builds: u64,
    /// Most recent calls, oldest first; empty unless profiling is enabled.
    pub history: VecDeque<CallMetrics>,
    profiling: bool,
}

impl ExecutionMetrics {
    pub fn new(profiling: bool) -> Self {
        Self {
            profiling,
            ..Self::default()
        }
    }

    pub fn profiling(&self) -> bool {
        self.profiling
    }

    /// Records one finished call.
    pub fn record_call(&mut self, call: CallMetrics) {
        self.calls += 1;
        self.kernel_invocations += call.kernel_invocations;
        self.repack_copies += call.repack_copies;
        self.repack_skips += call.repack_skips;
        self.total_repack_duration += call.repack_duration;
        self.total_duration += call.total_duration;
        if self.profiling {
            if self.history.len() == HISTORY_CAPACITY {
                self.history.pop_front();
            }
            self.history.push_back(call);
        }
    }

    pub fn record_layout_build(&mut self) {
        self.layout_builds += 1;
    }

    pub fn last_call(&self) -> Option<&CallMetrics> {
        self.history.back()
    }

    /// Mean wall-clock time per call.
    pub fn mean_call_duration(&self) -> Duration {
        if self.calls == 0 {
            return Duration::ZERO;
        }
        self.total_duration / self.calls as u32
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        let repack_pct = if self.total_duration.as_secs_f64() > 0.0 {
            self.total_repack_duration.as_secs_f64() / self.total_duration.as_secs_f64() * 100.0
        } else {
            0.0
        };
        format!(
            "Execution: {} calls, {:.3}ms total ({:.3}ms/call), {} kernel calls, \
             {} repacks, {} skipped, {:.3}ms repacking ({:.0}%), {} layout builds",
            self.calls,
            self.total_duration.as_secs_f64() * 1000.0,
            self.mean_call_duration().as_secs_f64() * 1000.0,
            self.kernel_invocations,
            self.repack_copies,
            self.repack_skips,
            self.total_repack_duration.as_secs_f64() * 1000.0,
            repack_pct,
            self.layout_builds,
        )
    }
}
