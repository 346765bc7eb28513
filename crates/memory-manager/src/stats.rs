// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pool statistics.

/// Cumulative counters for a [`MemoryPool`](crate::MemoryPool).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct AllocationStats {
    /// Requests served from the free list.
    pub reused: u64,
    /// Requests that needed a new buffer.
    pub fresh: u64,
    /// Requests refused for lack of budget.
    pub rejections: u64,
    /// Guards dropped.
    pub releases: u64,
    /// Sum of all granted request sizes.
    pub requested_bytes: u64,
    /// High-water mark of live bytes.
    pub peak_live_bytes: usize,
}

impl AllocationStats {
    /// Granted requests.
    pub fn granted(&self) -> u64 {
        self.reused + self.fresh
    }

    /// Fraction of granted requests served from the free list.
    pub fn reuse_ratio(&self) -> f64 {
        match self.granted() {
            0 => 0.0,
            n => self.reused as f64 / n as f64,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} granted ({} reused, {:.0}%), {} rejected, peak {:.1} KiB",
            self.granted(),
            self.reused,
            self.reuse_ratio() * 100.0,
            self.rejections,
            self.peak_live_bytes as f64 / 1024.0,
        )
    }
}
