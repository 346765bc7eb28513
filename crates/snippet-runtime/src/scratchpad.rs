// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Partitioning of the shared scratch buffer.
//!
//! One allocation serves every worker lane of a call:
//!
//! ```text
//! ┌────────────────────────────┬──────────────────────────────────────────┐
//! │ internal                   │ repacked inputs                          │
//! │ lane0 │ lane1 │ ... │ laneN │ in a: lane0 .. laneN │ in b: lane0 .. laneN│
//! └────────────────────────────┴──────────────────────────────────────────┘
//! ```
//!
//! Segments follow ascending input index. All lookups go through
//! [`ScratchLayout`]; raw offsets never leave this module except as
//! reporting values.

use crate::repacked_input::RepackedInputConfig;
use crate::{InternalError, RepackingPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    input: usize,
    /// Start of the segment inside the repacked region.
    offset: usize,
    slot_size: usize,
}

/// Offset table of one scratch buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchLayout {
    nthreads: usize,
    internal_per_thread: usize,
    segments: Vec<Segment>,
}

/// One lane's share of the scratch buffer.
#[derive(Debug)]
pub struct ThreadScratch<'a> {
    /// Kernel working memory.
    pub internal: &'a mut [u8],
    /// Repack slots in configuration order.
    pub slots: Vec<&'a mut [u8]>,
}

impl ScratchLayout {
    /// Builds the layout from `(input index, per-thread slot size)` pairs.
    ///
    /// Pairs are sorted by input index; duplicate indices are rejected.
    pub fn from_slot_sizes(
        nthreads: usize,
        internal_per_thread: usize,
        slots: &[(usize, usize)],
    ) -> Result<Self, InternalError> {
        if nthreads == 0 {
            return Err(InternalError::MalformedConfig("scratch layout needs at least one lane".into()));
        }
        let mut sorted = slots.to_vec();
        sorted.sort_unstable_by_key(|&(input, _)| input);
        if sorted.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(InternalError::MalformedConfig("duplicate scratch slot input".into()));
        }

        let mut offset = 0;
        let segments = sorted
            .into_iter()
            .map(|(input, slot_size)| {
                let segment = Segment {
                    input,
                    offset,
                    slot_size,
                };
                offset += nthreads * slot_size;
                segment
            })
            .collect();
        Ok(Self {
            nthreads,
            internal_per_thread,
            segments,
        })
    }

    /// Builds the layout of a repacking configuration under `policy`.
    pub fn new(
        config: &RepackedInputConfig,
        nthreads: usize,
        internal_per_thread: usize,
        policy: RepackingPolicy,
    ) -> Result<Self, InternalError> {
        let slots: Vec<_> = config
            .iter()
            .map(|(index, input)| (index, input.slot_size(policy)))
            .collect();
        Self::from_slot_sizes(nthreads, internal_per_thread, &slots)
    }

    pub fn nthreads(&self) -> usize {
        self.nthreads
    }

    pub fn internal_per_thread(&self) -> usize {
        self.internal_per_thread
    }

    pub fn internal_size(&self) -> usize {
        self.nthreads * self.internal_per_thread
    }

    /// Bytes reserved for repacked inputs, all lanes included.
    pub fn repacked_region_size(&self) -> usize {
        self.segments
            .iter()
            .map(|s| self.nthreads * s.slot_size)
            .sum()
    }

    pub fn total_size(&self) -> usize {
        self.internal_size() + self.repacked_region_size()
    }

    /// Input indices with a slot, ascending.
    pub fn inputs(&self) -> impl Iterator<Item = usize> + '_ {
        self.segments.iter().map(|s| s.input)
    }

    fn segment(&self, input: usize) -> Result<&Segment, InternalError> {
        self.segments
            .iter()
            .find(|s| s.input == input)
            .ok_or(InternalError::ScratchSlotNotFound { input })
    }

    /// Position of `input`'s slot inside [`ThreadScratch::slots`].
    pub fn position(&self, input: usize) -> Result<usize, InternalError> {
        self.segments
            .iter()
            .position(|s| s.input == input)
            .ok_or(InternalError::ScratchSlotNotFound { input })
    }

    pub fn slot_size(&self, input: usize) -> Result<usize, InternalError> {
        self.segment(input).map(|s| s.slot_size)
    }

    /// Offset of `input`'s segment inside the repacked region.
    pub fn region_offset(&self, input: usize) -> Result<usize, InternalError> {
        self.segment(input).map(|s| s.offset)
    }

    /// Absolute offset of lane `ithr`'s slot for `input`.
    pub fn slot_offset(&self, ithr: usize, input: usize) -> Result<usize, InternalError> {
        if ithr >= self.nthreads {
            return Err(InternalError::ThreadOutOfRange {
                thread: ithr,
                nthreads: self.nthreads,
            });
        }
        let segment = self.segment(input)?;
        Ok(self.internal_size() + segment.offset + ithr * segment.slot_size)
    }

    fn check(&self, len: usize) -> Result<(), InternalError> {
        if len < self.total_size() {
            return Err(InternalError::UndersizedMemory {
                what: "scratch buffer".into(),
                required: self.total_size(),
                actual: len,
            });
        }
        Ok(())
    }

    /// Lane `ithr`'s slot for `input`, borrowed mutably from `buf`.
    pub fn slot_mut<'a>(&self, buf: &'a mut [u8], ithr: usize, input: usize) -> Result<&'a mut [u8], InternalError> {
        self.check(buf.len())?;
        let offset = self.slot_offset(ithr, input)?;
        let size = self.slot_size(input)?;
        Ok(&mut buf[offset..offset + size])
    }

    /// Splits `buf` into one disjoint view per lane.
    pub fn partition<'a>(&self, buf: &'a mut [u8]) -> Result<Vec<ThreadScratch<'a>>, InternalError> {
        self.check(buf.len())?;
        let total = self.total_size();
        let (mut internal, mut rest) = buf[..total].split_at_mut(self.internal_size());

        let mut lanes = Vec::with_capacity(self.nthreads);
        for _ in 0..self.nthreads {
            let (mine, tail) = std::mem::take(&mut internal).split_at_mut(self.internal_per_thread);
            internal = tail;
            lanes.push(ThreadScratch {
                internal: mine,
                slots: Vec::with_capacity(self.segments.len()),
            });
        }
        for segment in &self.segments {
            for lane in lanes.iter_mut() {
                let (slot, tail) = std::mem::take(&mut rest).split_at_mut(segment.slot_size);
                rest = tail;
                lane.slots.push(slot);
            }
        }
        Ok(lanes)
    }

    /// Splits `buf` into per-lane internal views and the repacked region,
    /// shared read-only by every lane.
    pub fn split_shared<'a>(&self, buf: &'a mut [u8]) -> Result<(Vec<&'a mut [u8]>, &'a [u8]), InternalError> {
        self.check(buf.len())?;
        let total = self.total_size();
        let (mut internal, region) = buf[..total].split_at_mut(self.internal_size());

        let mut lanes = Vec::with_capacity(self.nthreads);
        for _ in 0..self.nthreads {
            let (mine, tail) = std::mem::take(&mut internal).split_at_mut(self.internal_per_thread);
            internal = tail;
            lanes.push(mine);
        }
        Ok((lanes, region))
    }
}
