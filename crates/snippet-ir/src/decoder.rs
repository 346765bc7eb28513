// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-node view handed out by a [`GraphIterator`](crate::GraphIterator).

use crate::IrError;
use std::collections::BTreeMap;

/// A node attribute value as it appears in graph JSON.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Ints(Vec<i64>),
    Strs(Vec<String>),
}

impl AttrValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Ints(_) => "int list",
            Self::Strs(_) => "string list",
        }
    }
}

/// Name, operation, inputs and attributes of the node under the cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDecoder {
    name: String,
    op_type: String,
    inputs: Vec<String>,
    attrs: BTreeMap<String, AttrValue>,
    producer: Option<String>,
}

impl NodeDecoder {
    pub fn new(
        name: impl Into<String>,
        op_type: impl Into<String>,
        inputs: Vec<String>,
        attrs: BTreeMap<String, AttrValue>,
    ) -> Self {
        Self {
            name: name.into(),
            op_type: op_type.into(),
            inputs,
            attrs,
            producer: None,
        }
    }

    /// Marks this node as a function output fed by `producer`.
    pub fn with_producer(mut self, producer: impl Into<String>) -> Self {
        self.producer = Some(producer.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op_type(&self) -> &str {
        &self.op_type
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// The node feeding a function output argument.
    pub fn producer(&self) -> Option<&str> {
        self.producer.as_deref()
    }

    pub fn attrs(&self) -> &BTreeMap<String, AttrValue> {
        &self.attrs
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    fn require(&self, name: &str) -> Result<&AttrValue, IrError> {
        self.attrs.get(name).ok_or_else(|| IrError::MissingAttr {
            node: self.name.clone(),
            attr: name.to_string(),
        })
    }

    fn mismatch(&self, name: &str, expected: &'static str, found: &AttrValue) -> IrError {
        tracing::debug!(
            node = %self.name,
            attr = name,
            found = found.kind(),
            "attribute kind mismatch"
        );
        IrError::AttrType {
            node: self.name.clone(),
            attr: name.to_string(),
            expected,
        }
    }

    pub fn attr_i64(&self, name: &str) -> Result<i64, IrError> {
        match self.require(name)? {
            AttrValue::Int(v) => Ok(*v),
            other => Err(self.mismatch(name, "an int", other)),
        }
    }

    /// Reads an integer list. An empty JSON array is an empty list.
    pub fn attr_ints(&self, name: &str) -> Result<Vec<i64>, IrError> {
        match self.require(name)? {
            AttrValue::Ints(v) => Ok(v.clone()),
            AttrValue::Strs(v) if v.is_empty() => Ok(Vec::new()),
            other => Err(self.mismatch(name, "an int list", other)),
        }
    }

    pub fn attr_str(&self, name: &str) -> Result<&str, IrError> {
        match self.require(name)? {
            AttrValue::Str(v) => Ok(v),
            other => Err(self.mismatch(name, "a string", other)),
        }
    }

    /// Reads a flag, falling back to `default` when absent.
    pub fn attr_bool_or(&self, name: &str, default: bool) -> Result<bool, IrError> {
        match self.attrs.get(name) {
            None => Ok(default),
            Some(AttrValue::Bool(v)) => Ok(*v),
            Some(other) => Err(self.mismatch(name, "a bool", other)),
        }
    }
}
