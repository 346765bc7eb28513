// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Cursor-style traversal of a graph description.
//!
//! Frontends expose their graphs through [`GraphIterator`] so the attribute
//! extractor never depends on a concrete file format. The cursor starts on
//! the first node; [`GraphIterator::next`] advances it and
//! [`GraphIterator::is_end`] reports exhaustion.

use crate::NodeDecoder;

/// A resettable cursor over the nodes of one graph or function body.
pub trait GraphIterator {
    /// Moves the cursor back to the first node.
    fn reset(&mut self);

    /// Number of nodes this iterator visits.
    fn size(&self) -> usize;

    /// Advances to the next node. No-op once the end is reached.
    fn next(&mut self);

    fn is_end(&self) -> bool;

    /// The node under the cursor, or `None` past the end.
    fn decoder(&self) -> Option<&NodeDecoder>;

    /// Iterator over the body of the named library function.
    fn body_graph_iterator(&self, func_name: &str) -> Option<Box<dyn GraphIterator>>;

    /// Names of the graph's inputs, in declaration order.
    fn input_names(&self) -> Vec<String>;

    /// Names of the graph's outputs, in declaration order.
    fn output_names(&self) -> Vec<String>;
}

/// Resets `it` and clones every decoder it yields.
pub fn collect_decoders(it: &mut dyn GraphIterator) -> Vec<NodeDecoder> {
    it.reset();
    let mut out = Vec::with_capacity(it.size());
    while !it.is_end() {
        if let Some(decoder) = it.decoder() {
            out.push(decoder.clone());
        }
        it.next();
    }
    out
}
