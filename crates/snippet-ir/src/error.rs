// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for graph loading and attribute extraction.

/// Errors that can occur when reading a graph description.
#[derive(Debug, thiserror::Error)]
pub enum IrError {
    /// The graph file could not be read.
    #[error("failed to read graph: {0}")]
    Io(#[from] std::io::Error),

    /// The graph JSON is malformed.
    #[error("failed to parse graph: {0}")]
    Parse(#[from] serde_json::Error),

    /// The graph is structurally invalid.
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// A node is missing a required attribute.
    #[error("node '{node}' has no attribute '{attr}'")]
    MissingAttr { node: String, attr: String },

    /// An attribute holds a value of the wrong kind.
    #[error("attribute '{attr}' of node '{node}' is not {expected}")]
    AttrType {
        node: String,
        attr: String,
        expected: &'static str,
    },

    /// An attribute value is well-typed but unusable.
    #[error("invalid attribute '{attr}' on node '{node}': {detail}")]
    InvalidAttr {
        node: String,
        attr: String,
        detail: String,
    },

    /// A function body was requested that the library does not define.
    #[error("function '{0}' not found in graph library")]
    UnknownFunction(String),

    /// A layout or shape attribute was rejected by the tensor layer.
    #[error(transparent)]
    Tensor(#[from] tensor_core::TensorError),
}
