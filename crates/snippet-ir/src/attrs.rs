// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Attributes of a compiled subgraph.
//!
//! [`SubgraphAttrs`] is everything the executor needs to know about a
//! compiled kernel's boundary: the ports it reads and writes, the layout
//! each input must be in when the kernel sees it, which inputs are constant
//! weights, the tile rank the kernel processes per call and the size of the
//! per-thread working buffer it expects.

use crate::graph::{INPUT_ARG_OP, OUTPUT_ARG_OP, PARAMETER_OP, RESULT_OP};
use crate::{GraphIterator, IrError, NodeDecoder};
use std::fmt;
use tensor_core::{DType, Layout, Shape};

/// Op type of the node carrying kernel-level attributes.
pub const SNIPPET_OP: &str = "Snippet";

/// Default number of trailing dimensions one kernel call processes.
pub const DEFAULT_TILE_RANK: usize = 2;

// ── PartialShape ───────────────────────────────────────────────────

/// A shape whose dimensions may be unknown until execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartialShape(Vec<Option<usize>>);

impl PartialShape {
    pub fn new(dims: Vec<Option<usize>>) -> Self {
        Self(dims)
    }

    /// Builds from graph dims, where `-1` marks a dynamic dimension.
    pub fn from_graph_dims(dims: &[i64]) -> Result<Self, String> {
        dims.iter()
            .map(|&d| match d {
                -1 => Ok(None),
                d if d >= 0 => Ok(Some(d as usize)),
                d => Err(format!("dimension {d} is neither -1 nor non-negative")),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn dims(&self) -> &[Option<usize>] {
        &self.0
    }

    pub fn is_static(&self) -> bool {
        self.0.iter().all(Option::is_some)
    }

    /// The concrete shape, if every dimension is known.
    pub fn to_shape(&self) -> Option<Shape> {
        self.0
            .iter()
            .copied()
            .collect::<Option<Vec<_>>>()
            .map(Shape::new)
    }

    /// Returns `true` if `shape` is one of the shapes this describes.
    pub fn admits(&self, shape: &Shape) -> bool {
        self.rank() == shape.rank()
            && self
                .0
                .iter()
                .zip(shape.dims())
                .all(|(p, &d)| p.map_or(true, |p| p == d))
    }
}

impl From<Shape> for PartialShape {
    fn from(shape: Shape) -> Self {
        Self(shape.dims().iter().map(|&d| Some(d)).collect())
    }
}

impl From<Vec<usize>> for PartialShape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims.into_iter().map(Some).collect())
    }
}

impl fmt::Display for PartialShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match d {
                Some(d) => write!(f, "{d}")?,
                None => write!(f, "?")?,
            }
        }
        write!(f, "]")
    }
}

// ── PortDesc ───────────────────────────────────────────────────────

/// One input or output of a compiled subgraph.
#[derive(Debug, Clone, PartialEq)]
pub struct PortDesc {
    pub name: String,
    pub shape: PartialShape,
    pub dtype: DType,
    /// Layout the kernel reads this port in.
    pub layout: Layout,
    /// Constant weights are repacked once, ahead of execution.
    pub constant: bool,
}

impl PortDesc {
    pub fn new(name: impl Into<String>, shape: impl Into<PartialShape>, dtype: DType) -> Self {
        Self {
            name: name.into(),
            shape: shape.into(),
            dtype,
            layout: Layout::Planar,
            constant: false,
        }
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn constant(mut self) -> Self {
        self.constant = true;
        self
    }

    pub fn requires_repacking(&self) -> bool {
        !self.layout.is_planar()
    }

    fn from_decoder(node: &NodeDecoder) -> Result<Self, IrError> {
        let invalid = |attr: &str, detail: String| IrError::InvalidAttr {
            node: node.name().to_string(),
            attr: attr.to_string(),
            detail,
        };

        let shape = PartialShape::from_graph_dims(&node.attr_ints("shape")?)
            .map_err(|detail| invalid("shape", detail))?;
        let dtype = if node.has_attr("dtype") {
            let s = node.attr_str("dtype")?;
            DType::from_str_loose(s).ok_or_else(|| invalid("dtype", format!("unknown dtype '{s}'")))?
        } else {
            DType::F32
        };
        let layout = if node.has_attr("layout") {
            node.attr_str("layout")?.parse()?
        } else {
            Layout::Planar
        };

        Ok(Self {
            name: node.name().to_string(),
            shape,
            dtype,
            layout,
            constant: node.attr_bool_or("constant", false)?,
        })
    }
}

impl fmt::Display for PortDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {} {}", self.name, self.shape, self.dtype, self.layout)?;
        if self.constant {
            write!(f, " (constant)")?;
        }
        Ok(())
    }
}

// ── SubgraphAttrs ──────────────────────────────────────────────────

/// Boundary description of one compiled subgraph.
#[derive(Debug, Clone, PartialEq)]
pub struct SubgraphAttrs {
    pub name: String,
    pub inputs: Vec<PortDesc>,
    pub outputs: Vec<PortDesc>,
    /// Trailing dimensions handled inside one kernel call.
    pub tile_rank: usize,
    /// Per-thread working buffer the kernel expects, in bytes.
    pub internal_buffer_size: usize,
}

impl SubgraphAttrs {
    pub fn new(name: impl Into<String>, inputs: Vec<PortDesc>, outputs: Vec<PortDesc>) -> Self {
        Self {
            name: name.into(),
            inputs,
            outputs,
            tile_rank: DEFAULT_TILE_RANK,
            internal_buffer_size: 0,
        }
    }

    pub fn with_tile_rank(mut self, tile_rank: usize) -> Self {
        self.tile_rank = tile_rank;
        self
    }

    pub fn with_internal_buffer_size(mut self, bytes: usize) -> Self {
        self.internal_buffer_size = bytes;
        self
    }

    /// Reads attributes from a function body or flat graph.
    ///
    /// Inputs come from `input_arg`/`Parameter` nodes and outputs from
    /// `output_arg`/`Result` nodes, in visiting order. A `Snippet` node, if
    /// present, may set `tile_rank` and `internal_buffer_size`.
    pub fn from_graph(name: &str, it: &mut dyn GraphIterator) -> Result<Self, IrError> {
        let mut attrs = Self::new(name, Vec::new(), Vec::new());

        it.reset();
        while !it.is_end() {
            if let Some(node) = it.decoder() {
                match node.op_type() {
                    INPUT_ARG_OP | PARAMETER_OP => attrs.inputs.push(PortDesc::from_decoder(node)?),
                    OUTPUT_ARG_OP | RESULT_OP => attrs.outputs.push(PortDesc::from_decoder(node)?),
                    SNIPPET_OP => {
                        if node.has_attr("tile_rank") {
                            attrs.tile_rank = non_negative(node, "tile_rank")?;
                        }
                        if node.has_attr("internal_buffer_size") {
                            attrs.internal_buffer_size = non_negative(node, "internal_buffer_size")?;
                        }
                    }
                    _ => {}
                }
            }
            it.next();
        }

        if attrs.outputs.is_empty() {
            return Err(IrError::InvalidGraph(format!(
                "subgraph '{name}' declares no outputs"
            )));
        }
        tracing::debug!(
            subgraph = name,
            inputs = attrs.inputs.len(),
            outputs = attrs.outputs.len(),
            tile_rank = attrs.tile_rank,
            "extracted subgraph attributes"
        );
        Ok(attrs)
    }

    /// Returns `true` if every port shape is fully known.
    pub fn is_static(&self) -> bool {
        self.inputs
            .iter()
            .chain(&self.outputs)
            .all(|p| p.shape.is_static())
    }

    /// Indices of inputs whose required layout differs from planar.
    pub fn repacked_inputs(&self) -> impl Iterator<Item = (usize, &PortDesc)> {
        self.inputs
            .iter()
            .enumerate()
            .filter(|(_, p)| p.requires_repacking())
    }

    pub fn requires_repacking(&self) -> bool {
        self.repacked_inputs().next().is_some()
    }
}

fn non_negative(node: &NodeDecoder, attr: &str) -> Result<usize, IrError> {
    let value = node.attr_i64(attr)?;
    usize::try_from(value).map_err(|_| IrError::InvalidAttr {
        node: node.name().to_string(),
        attr: attr.to_string(),
        detail: format!("{value} is negative"),
    })
}

impl fmt::Display for SubgraphAttrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Subgraph '{}' (tile rank {}, {} B kernel buffer per thread)",
            self.name, self.tile_rank, self.internal_buffer_size
        )?;
        for (i, p) in self.inputs.iter().enumerate() {
            writeln!(f, "  in[{i}]  {p}")?;
        }
        for (i, p) in self.outputs.iter().enumerate() {
            writeln!(f, "  out[{i}] {p}")?;
        }
        Ok(())
    }
}
