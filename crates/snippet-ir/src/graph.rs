// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! JSON graph descriptions with a function library.
//!
//! # Type-State Pattern
//!
//! ```text
//! GraphDef<Loaded>     : parsed, not yet checked.
//!       │  .validate()
//!       ▼
//! GraphDef<Validated>  : names unique, function outputs resolved.
//! ```
//!
//! Only a validated graph can be iterated, so the attribute extractor
//! never sees dangling function outputs.
//!
//! # Format
//! ```json
//! {
//!   "name": "matmul_block",
//!   "nodes": [ { "name": "snippet", "op": "Snippet", "attrs": { "body": "mm" } } ],
//!   "library": [
//!     {
//!       "name": "mm",
//!       "inputs":  [ { "name": "a", "attrs": { "shape": [-1, 64] } } ],
//!       "outputs": [ { "name": "c", "attrs": { "shape": [-1, 32] } } ],
//!       "nodes":   [ { "name": "gemm", "op": "MatMul", "inputs": ["a", "b"] } ],
//!       "ret":     { "c": "gemm" }
//!     }
//!   ]
//! }
//! ```

use crate::{AttrValue, GraphIterator, IrError, NodeDecoder};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

/// Op type given to graph-level inputs.
pub const PARAMETER_OP: &str = "Parameter";
/// Op type given to graph-level outputs.
pub const RESULT_OP: &str = "Result";
/// Op type reported for a function input argument.
pub const INPUT_ARG_OP: &str = "input_arg";
/// Op type reported for a function output argument.
pub const OUTPUT_ARG_OP: &str = "output_arg";

// ── Serialized form ────────────────────────────────────────────────

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NodeDef {
    pub name: String,
    pub op: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub attrs: BTreeMap<String, AttrValue>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ArgDef {
    pub name: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, AttrValue>,
}

/// A library function: argument lists, body and output bindings.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionDef {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<ArgDef>,
    #[serde(default)]
    pub outputs: Vec<ArgDef>,
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
    /// Output argument name → producing node.
    #[serde(default)]
    pub ret: BTreeMap<String, String>,
}

#[derive(serde::Deserialize)]
struct GraphFile {
    #[serde(default)]
    name: String,
    #[serde(default)]
    nodes: Vec<NodeDef>,
    #[serde(default)]
    library: Vec<FunctionDef>,
}

// ── Type-state markers ─────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Loaded;

#[derive(Debug, Clone)]
pub struct Validated;

pub trait GraphState: fmt::Debug + Clone {}
impl GraphState for Loaded {}
impl GraphState for Validated {}

// ── GraphDef ───────────────────────────────────────────────────────

/// A top-level graph plus the functions its nodes may reference.
#[derive(Debug, Clone)]
pub struct GraphDef<S: GraphState = Loaded> {
    pub name: String,
    pub nodes: Vec<NodeDef>,
    pub library: Vec<FunctionDef>,
    _state: PhantomData<S>,
}

impl GraphDef<Loaded> {
    pub fn new(name: impl Into<String>, nodes: Vec<NodeDef>, library: Vec<FunctionDef>) -> Self {
        Self {
            name: name.into(),
            nodes,
            library,
            _state: PhantomData,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, IrError> {
        let file: GraphFile = serde_json::from_str(json)?;
        Ok(Self::new(file.name, file.nodes, file.library))
    }

    pub fn from_file(path: &Path) -> Result<Self, IrError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Checks structure and transitions to [`Validated`].
    ///
    /// # Checks
    /// - The graph has at least one node or function.
    /// - Node names are unique within each scope.
    /// - Function names are unique.
    /// - Every function output argument is bound in `ret` to a body node
    ///   or input argument.
    ///
    /// Inputs naming unknown nodes are only warned about: they may refer to
    /// outer-scope values the frontend resolves.
    pub fn validate(self) -> Result<GraphDef<Validated>, IrError> {
        if self.nodes.is_empty() && self.library.is_empty() {
            return Err(IrError::InvalidGraph(format!(
                "graph '{}' has no nodes and no functions",
                self.name
            )));
        }

        check_scope(&self.name, self.nodes.iter().map(|n| n.name.as_str()), &self.nodes)?;

        let mut seen = HashSet::new();
        for func in &self.library {
            if !seen.insert(func.name.as_str()) {
                return Err(IrError::InvalidGraph(format!(
                    "duplicate function '{}'",
                    func.name
                )));
            }

            let names = func
                .inputs
                .iter()
                .map(|a| a.name.as_str())
                .chain(func.nodes.iter().map(|n| n.name.as_str()));
            check_scope(&func.name, names, &func.nodes)?;

            let producers: HashSet<&str> = func
                .inputs
                .iter()
                .map(|a| a.name.as_str())
                .chain(func.nodes.iter().map(|n| n.name.as_str()))
                .collect();
            for out in &func.outputs {
                let producer = func.ret.get(&out.name).ok_or_else(|| {
                    IrError::InvalidGraph(format!(
                        "output '{}' of function '{}' has no producer in ret",
                        out.name, func.name
                    ))
                })?;
                if !producers.contains(base_name(producer)) {
                    return Err(IrError::InvalidGraph(format!(
                        "output '{}' of function '{}' is bound to unknown node '{producer}'",
                        out.name, func.name
                    )));
                }
            }
        }

        Ok(GraphDef {
            name: self.name,
            nodes: self.nodes,
            library: self.library,
            _state: PhantomData,
        })
    }
}

impl GraphDef<Validated> {
    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.library.iter().find(|f| f.name == name)
    }

    pub fn summary(&self) -> String {
        let body_nodes: usize = self.library.iter().map(|f| f.nodes.len()).sum();
        format!(
            "Graph '{}': {} nodes, {} functions ({} body nodes)",
            self.name,
            self.nodes.len(),
            self.library.len(),
            body_nodes,
        )
    }
}

/// Strips an output-port suffix: `"gemm:0"` → `"gemm"`.
fn base_name(input: &str) -> &str {
    input.split(':').next().unwrap_or(input)
}

fn check_scope<'a>(
    scope: &str,
    names: impl Iterator<Item = &'a str>,
    nodes: &[NodeDef],
) -> Result<(), IrError> {
    let mut known = HashSet::new();
    for name in names {
        if !known.insert(name) {
            return Err(IrError::InvalidGraph(format!(
                "duplicate node '{name}' in '{scope}'"
            )));
        }
    }
    for node in nodes {
        for input in &node.inputs {
            if !known.contains(base_name(input)) {
                tracing::warn!(
                    scope,
                    node = %node.name,
                    input = %input,
                    "input refers to a node outside this scope"
                );
            }
        }
    }
    Ok(())
}

impl<S: GraphState> fmt::Display for GraphDef<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "GraphDef '{}':", self.name)?;
        for node in &self.nodes {
            writeln!(f, "  {} ({})", node.name, node.op)?;
        }
        for func in &self.library {
            writeln!(
                f,
                "  fn {}({} in, {} out, {} nodes)",
                func.name,
                func.inputs.len(),
                func.outputs.len(),
                func.nodes.len()
            )?;
        }
        Ok(())
    }
}

// ── Iteration ──────────────────────────────────────────────────────

/// [`GraphIterator`] over a validated [`GraphDef`] or one of its functions.
///
/// Function bodies are visited as input arguments, then body nodes, then
/// output arguments; an output argument's decoder names its producer.
#[derive(Debug, Clone)]
pub struct GraphDefIterator {
    graph: Arc<GraphDef<Validated>>,
    decoders: Vec<NodeDecoder>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    cursor: usize,
}

impl GraphDefIterator {
    /// Iterates the top-level nodes.
    pub fn new(graph: Arc<GraphDef<Validated>>) -> Self {
        let decoders: Vec<NodeDecoder> = graph.nodes.iter().map(decode).collect();
        let names_of = |op: &str| {
            graph
                .nodes
                .iter()
                .filter(|n| n.op == op)
                .map(|n| n.name.clone())
                .collect::<Vec<_>>()
        };
        let inputs = names_of(PARAMETER_OP);
        let outputs = names_of(RESULT_OP);
        Self {
            graph,
            decoders,
            inputs,
            outputs,
            cursor: 0,
        }
    }

    /// Iterates the body of the named library function.
    pub fn for_function(graph: Arc<GraphDef<Validated>>, name: &str) -> Result<Self, IrError> {
        let func = graph
            .function(name)
            .ok_or_else(|| IrError::UnknownFunction(name.to_string()))?;

        let mut decoders = Vec::with_capacity(func.inputs.len() + func.nodes.len() + func.outputs.len());
        decoders.extend(
            func.inputs
                .iter()
                .map(|a| NodeDecoder::new(&a.name, INPUT_ARG_OP, Vec::new(), a.attrs.clone())),
        );
        decoders.extend(func.nodes.iter().map(decode));
        for out in &func.outputs {
            // validate() guarantees the binding exists.
            let producer = func.ret.get(&out.name).cloned().unwrap_or_default();
            decoders.push(
                NodeDecoder::new(&out.name, OUTPUT_ARG_OP, vec![producer.clone()], out.attrs.clone())
                    .with_producer(producer),
            );
        }

        let inputs = func.inputs.iter().map(|a| a.name.clone()).collect();
        let outputs = func.outputs.iter().map(|a| a.name.clone()).collect();
        Ok(Self {
            graph,
            decoders,
            inputs,
            outputs,
            cursor: 0,
        })
    }
}

fn decode(node: &NodeDef) -> NodeDecoder {
    NodeDecoder::new(&node.name, &node.op, node.inputs.clone(), node.attrs.clone())
}

impl GraphIterator for GraphDefIterator {
    fn reset(&mut self) {
        self.cursor = 0;
    }

    fn size(&self) -> usize {
        self.decoders.len()
    }

    fn next(&mut self) {
        if self.cursor < self.decoders.len() {
            self.cursor += 1;
        }
    }

    fn is_end(&self) -> bool {
        self.cursor >= self.decoders.len()
    }

    fn decoder(&self) -> Option<&NodeDecoder> {
        self.decoders.get(self.cursor)
    }

    fn body_graph_iterator(&self, func_name: &str) -> Option<Box<dyn GraphIterator>> {
        Self::for_function(Arc::clone(&self.graph), func_name)
            .ok()
            .map(|it| Box::new(it) as Box<dyn GraphIterator>)
    }

    fn input_names(&self) -> Vec<String> {
        self.inputs.clone()
    }

    fn output_names(&self) -> Vec<String> {
        self.outputs.clone()
    }
}
