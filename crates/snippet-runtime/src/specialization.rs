// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Shape specialization strategies.
//!
//! A [`ShapeResolver`] decides, per call, which concrete shapes the
//! executor's layout is built for. [`StaticShapes`] fixes them at
//! construction; [`DynamicShapes`] re-derives them from the memories of
//! every call and reports a change when they differ.

use crate::InternalError;
use snippet_ir::{PortDesc, SubgraphAttrs};
use std::fmt;
use tensor_core::{Memory, MemoryPtr, Shape};

/// When the execution layout is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SpecializationMode {
    /// Once, at construction, from fully static attribute shapes.
    #[serde(rename = "static")]
    Static,
    /// On every call whose shapes differ from the previous one.
    #[serde(rename = "dynamic", alias = "dynamic_specialized")]
    DynamicSpecialized,
}

impl fmt::Display for SpecializationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Static => "static",
            Self::DynamicSpecialized => "dynamic",
        })
    }
}

/// Concrete shapes of every port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeSet {
    pub inputs: Vec<Shape>,
    pub outputs: Vec<Shape>,
}

impl ShapeSet {
    /// Shapes of the given memories.
    pub fn of(inputs: &[MemoryPtr], outputs: &[Memory]) -> Self {
        Self {
            inputs: inputs.iter().map(|m| m.shape().clone()).collect(),
            outputs: outputs.iter().map(|m| m.shape().clone()).collect(),
        }
    }
}

/// Strategy deciding the shapes a call runs with.
pub trait ShapeResolver: Send + fmt::Debug {
    fn mode(&self) -> SpecializationMode;

    /// Shapes to build the layout for at construction, if known.
    fn initial(&self, attrs: &SubgraphAttrs) -> Result<Option<ShapeSet>, InternalError>;

    /// Checks the memories of a call against the `current` shapes.
    ///
    /// Returns `Some` with new shapes if the layout must be rebuilt.
    fn resolve(
        &self,
        attrs: &SubgraphAttrs,
        current: Option<&ShapeSet>,
        inputs: &[MemoryPtr],
        outputs: &[Memory],
    ) -> Result<Option<ShapeSet>, InternalError>;
}

fn check_ports(kind: &str, ports: &[PortDesc], shapes: &[Shape]) -> Result<(), InternalError> {
    for (i, (port, shape)) in ports.iter().zip(shapes).enumerate() {
        if !port.shape.admits(shape) {
            return Err(InternalError::ShapeMismatch {
                port: format!("{kind} {i} ('{}')", port.name),
                detail: format!("{shape} does not match {}", port.shape),
            });
        }
    }
    Ok(())
}

/// Layout fixed at construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticShapes;

impl ShapeResolver for StaticShapes {
    fn mode(&self) -> SpecializationMode {
        SpecializationMode::Static
    }

    fn initial(&self, attrs: &SubgraphAttrs) -> Result<Option<ShapeSet>, InternalError> {
        let fixed = |ports: &[PortDesc]| -> Result<Vec<Shape>, InternalError> {
            ports
                .iter()
                .map(|p| {
                    p.shape.to_shape().ok_or_else(|| {
                        InternalError::MalformedConfig(format!(
                            "static executor over dynamic port '{}' {}",
                            p.name, p.shape
                        ))
                    })
                })
                .collect()
        };
        Ok(Some(ShapeSet {
            inputs: fixed(&attrs.inputs)?,
            outputs: fixed(&attrs.outputs)?,
        }))
    }

    fn resolve(
        &self,
        attrs: &SubgraphAttrs,
        _current: Option<&ShapeSet>,
        inputs: &[MemoryPtr],
        outputs: &[Memory],
    ) -> Result<Option<ShapeSet>, InternalError> {
        let actual = ShapeSet::of(inputs, outputs);
        check_ports("input", &attrs.inputs, &actual.inputs)?;
        check_ports("output", &attrs.outputs, &actual.outputs)?;
        Ok(None)
    }
}

/// Layout re-derived from every call's memories.
#[derive(Debug, Clone, Copy, Default)]
pub struct DynamicShapes;

impl ShapeResolver for DynamicShapes {
    fn mode(&self) -> SpecializationMode {
        SpecializationMode::DynamicSpecialized
    }

    fn initial(&self, attrs: &SubgraphAttrs) -> Result<Option<ShapeSet>, InternalError> {
        if !attrs.is_static() {
            return Ok(None);
        }
        StaticShapes.initial(attrs)
    }

    fn resolve(
        &self,
        attrs: &SubgraphAttrs,
        current: Option<&ShapeSet>,
        inputs: &[MemoryPtr],
        outputs: &[Memory],
    ) -> Result<Option<ShapeSet>, InternalError> {
        let actual = ShapeSet::of(inputs, outputs);
        check_ports("input", &attrs.inputs, &actual.inputs)?;
        check_ports("output", &attrs.outputs, &actual.outputs)?;
        if current == Some(&actual) {
            return Ok(None);
        }
        Ok(Some(actual))
    }
}

/// The resolver implementing `mode`.
pub fn resolver_for(mode: SpecializationMode) -> Box<dyn ShapeResolver> {
    match mode {
        SpecializationMode::Static => Box::new(StaticShapes),
        SpecializationMode::DynamicSpecialized => Box::new(DynamicShapes),
    }
}
