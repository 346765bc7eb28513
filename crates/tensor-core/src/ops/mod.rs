// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reference arithmetic used to validate compiled kernels.

mod matmul_op;

pub use matmul_op::matmul;
