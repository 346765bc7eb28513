// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # snippet-ir
//!
//! The boundary between a graph frontend and the snippet executor.
//!
//! - [`GraphIterator`]: a cursor over graph nodes, with access to function
//!   bodies, implemented by frontends.
//! - [`NodeDecoder`]: the node under the cursor with typed attribute access.
//! - [`GraphDef`]: a JSON graph with a function library, validated through
//!   a **type-state** transition (`Loaded` → `Validated`), and
//!   [`GraphDefIterator`] over it.
//! - [`SubgraphAttrs`]: ports, required layouts and kernel parameters of a
//!   compiled subgraph, extracted from any [`GraphIterator`].
//!
//! # Example
//! ```
//! use snippet_ir::{GraphDef, GraphDefIterator, SubgraphAttrs};
//! use std::sync::Arc;
//!
//! let json = r#"{ "library": [{
//!     "name": "f",
//!     "inputs":  [ { "name": "a", "attrs": { "shape": [4, 8] } } ],
//!     "outputs": [ { "name": "c", "attrs": { "shape": [4, 8] } } ],
//!     "ret": { "c": "a" }
//! }] }"#;
//! let graph = Arc::new(GraphDef::from_json_str(json).unwrap().validate().unwrap());
//! let mut body = GraphDefIterator::for_function(graph, "f").unwrap();
//! let attrs = SubgraphAttrs::from_graph("f", &mut body).unwrap();
//! assert!(attrs.is_static());
//! ```

mod attrs;
mod decoder;
mod error;
pub mod graph;
mod iterator;

pub use attrs::{PartialShape, PortDesc, SubgraphAttrs, DEFAULT_TILE_RANK, SNIPPET_OP};
pub use decoder::{AttrValue, NodeDecoder};
pub use error::IrError;
pub use graph::{GraphDef, GraphDefIterator};
pub use iterator::{collect_decoders, GraphIterator};
