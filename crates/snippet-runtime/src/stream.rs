// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Worker pool that executor lanes run on.

use crate::{RuntimeConfig, RuntimeError};

/// A fixed-size `rayon` pool.
pub struct ExecutionStream {
    pool: rayon::ThreadPool,
    num_threads: usize,
}

impl ExecutionStream {
    /// Builds a pool of `num_threads` workers.
    pub fn new(num_threads: usize) -> Result<Self, RuntimeError> {
        if num_threads == 0 {
            return Err(RuntimeError::ThreadPool("stream needs at least one worker".into()));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("snippet-worker-{i}"))
            .build()
            .map_err(|e| RuntimeError::ThreadPool(e.to_string()))?;
        tracing::debug!(num_threads, "execution stream started");
        Ok(Self { pool, num_threads })
    }

    pub fn from_config(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        Self::new(config.resolve_threads())
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Runs `op` inside the pool.
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }
}

impl std::fmt::Debug for ExecutionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionStream")
            .field("num_threads", &self.num_threads)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_install_runs_on_workers() {
        let stream = ExecutionStream::new(2).unwrap();
        assert_eq!(stream.num_threads(), 2);
        let names: Vec<String> = stream.install(|| {
            (0..4)
                .into_par_iter()
                .map(|_| std::thread::current().name().unwrap_or_default().to_string())
                .collect()
        });
        assert!(names.iter().all(|n| n.starts_with("snippet-worker-")));
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(ExecutionStream::new(0), Err(RuntimeError::ThreadPool(_))));
    }
}
