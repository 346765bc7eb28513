// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Input repacking with skip-if-unchanged caching.
//!
//! Every lane owns one [`RepackCache`]: for each configured input it
//! remembers the [`SourceKey`] of the bytes it last converted into its
//! slot. A lane only ever touches its own cache, which is handed to it by
//! `&mut` for the duration of a call.

use crate::repacked_input::RepackedInput;
use crate::RuntimeError;
use serde::Serialize;
use tensor_core::Memory;

/// Identity of the source bytes behind one conversion.
///
/// Two keys are equal only if they name the same memory handle, at the
/// same modification version, at the same byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceKey {
    pub memory_id: u64,
    pub version: u64,
    pub offset: usize,
}

impl SourceKey {
    pub fn new(memory: &Memory, offset: usize) -> Self {
        Self {
            memory_id: memory.id(),
            version: memory.version(),
            offset,
        }
    }
}

/// Per-lane cache of converted sources plus copy and skip counters.
///
/// Cells are indexed by position in the repacking configuration.
#[derive(Debug, Clone, Default)]
pub struct RepackCache {
    last: Vec<Option<SourceKey>>,
    copies: Vec<u64>,
    skips: Vec<u64>,
}

impl RepackCache {
    pub fn new(inputs: usize) -> Self {
        Self {
            last: vec![None; inputs],
            copies: vec![0; inputs],
            skips: vec![0; inputs],
        }
    }

    /// Forgets every converted source; counters are kept.
    pub fn clean(&mut self) {
        self.last.iter_mut().for_each(|k| *k = None);
    }

    /// Resizes to `inputs` cells and forgets every converted source.
    pub fn resize(&mut self, inputs: usize) {
        self.last.clear();
        self.last.resize(inputs, None);
        self.copies.resize(inputs, 0);
        self.skips.resize(inputs, 0);
    }

    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }

    pub fn is_current(&self, pos: usize, key: &SourceKey) -> bool {
        self.last.get(pos).copied().flatten().as_ref() == Some(key)
    }

    pub fn record_copy(&mut self, pos: usize, key: SourceKey) {
        self.last[pos] = Some(key);
        self.copies[pos] += 1;
    }

    pub fn record_skip(&mut self, pos: usize) {
        self.skips[pos] += 1;
    }

    pub fn copies(&self, pos: usize) -> u64 {
        self.copies.get(pos).copied().unwrap_or(0)
    }

    pub fn skips(&self, pos: usize) -> u64 {
        self.skips.get(pos).copied().unwrap_or(0)
    }
}

/// Copy and skip counts of one (lane, input) cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RepackStat {
    pub thread: usize,
    pub input: usize,
    pub copies: u64,
    pub skips: u64,
}

/// Converts `src` into `dst` unless `cache` says `dst` already holds it.
///
/// Returns `true` if bytes were copied.
pub(crate) fn repack_if_changed(
    input: &RepackedInput,
    matrices: usize,
    src: &[u8],
    dst: &mut [u8],
    key: SourceKey,
    cache: &mut RepackCache,
    pos: usize,
) -> Result<bool, RuntimeError> {
    if cache.is_current(pos, &key) {
        cache.record_skip(pos);
        return Ok(false);
    }
    input.kernel().repack(src, dst, matrices)?;
    cache.record_copy(pos, key);
    Ok(true)
}
