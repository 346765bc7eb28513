// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Logical tensor shapes.
//!
//! The executor only asks positional questions of a shape: where the
//! parallel domain ends and the tile starts, whether leading dims
//! broadcast over a domain, and how large the trailing matrix is.
//!
//! ```text
//! [B, H, M, N]    split_at_tile(2)  -> domain [B, H] + tile [M, N]
//!                 matrix_extent()   -> (M, N)
//!                 batch()           -> B * H matrices
//! ```

use std::fmt;

/// Dimensions of a tensor, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// # Examples
    /// ```
    /// use tensor_core::Shape;
    /// let s = Shape::new(vec![4, 8, 16]);
    /// let (domain, tile) = s.split_at_tile(2);
    /// assert_eq!(domain.dims(), &[4]);
    /// assert_eq!(tile.matrix_extent(), (8, 16));
    /// ```
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    pub fn vector(len: usize) -> Self {
        Self::new(vec![len])
    }

    /// A single `[rows, cols]` matrix.
    pub fn matrix(rows: usize, cols: usize) -> Self {
        Self::new(vec![rows, cols])
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Element count; 1 for rank 0, 0 when any dim is 0.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// The first `n` dims, clamped to the rank.
    pub fn leading(&self, n: usize) -> Shape {
        Shape::new(self.dims[..n.min(self.rank())].to_vec())
    }

    /// The last `n` dims, clamped to the rank.
    pub fn trailing(&self, n: usize) -> Shape {
        let n = n.min(self.rank());
        Shape::new(self.dims[self.rank() - n..].to_vec())
    }

    /// Splits into the parallel domain and the tile of `tile_rank` dims.
    ///
    /// A shape of rank `tile_rank` or less is all tile: its domain is
    /// empty and holds a single work item.
    pub fn split_at_tile(&self, tile_rank: usize) -> (Shape, Shape) {
        let lead = self.rank().saturating_sub(tile_rank);
        (self.leading(lead), self.trailing(self.rank() - lead))
    }

    /// `(rows, cols)` of the trailing matrix.
    ///
    /// A vector is one row; a scalar is `1 × 1`.
    pub fn matrix_extent(&self) -> (usize, usize) {
        match self.dims[..] {
            [] => (1, 1),
            [cols] => (1, cols),
            [.., rows, cols] => (rows, cols),
        }
    }

    /// Number of trailing matrices stacked along the leading dims.
    pub fn batch(&self) -> usize {
        self.split_at_tile(2).0.num_elements()
    }

    /// `true` if `self` can be read at every index of `target`.
    ///
    /// Dims are matched from the right and a dim of 1 repeats. A shape of
    /// higher rank than `target` never broadcasts.
    pub fn broadcasts_to(&self, target: &Shape) -> bool {
        let Some(skip) = target.rank().checked_sub(self.rank()) else {
            return false;
        };
        self.dims
            .iter()
            .zip(&target.dims[skip..])
            .all(|(&d, &t)| d == 1 || d == t)
    }

    /// Output shape of `self @ rhs`, or `None` if the inner dims differ.
    ///
    /// Both sides need rank 2 or more. The batch dims come from `self`; an
    /// `rhs` batch is matched separately by the caller.
    pub fn matmul_output(&self, rhs: &Shape) -> Option<Shape> {
        if self.rank() < 2 || rhs.rank() < 2 {
            return None;
        }
        let (m, k) = self.matrix_extent();
        let (rhs_k, n) = rhs.matrix_extent();
        if k != rhs_k {
            return None;
        }
        let mut dims = self.leading(self.rank() - 2).dims;
        dims.extend([m, n]);
        Some(Shape::new(dims))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_at_tile() {
        let s = Shape::new(vec![2, 3, 8, 16]);
        let (domain, tile) = s.split_at_tile(2);
        assert_eq!(domain.dims(), &[2, 3]);
        assert_eq!(tile.dims(), &[8, 16]);
        assert_eq!(domain.num_elements(), 6);

        // Tile rank 1 walks rows as work items.
        let (domain, tile) = s.split_at_tile(1);
        assert_eq!(domain.dims(), &[2, 3, 8]);
        assert_eq!(tile.dims(), &[16]);
    }

    #[test]
    fn test_split_short_shape_is_all_tile() {
        let (domain, tile) = Shape::matrix(4, 4).split_at_tile(3);
        assert_eq!(domain.rank(), 0);
        assert_eq!(domain.num_elements(), 1);
        assert_eq!(tile, Shape::matrix(4, 4));
    }

    #[test]
    fn test_matrix_extent_and_batch() {
        let s = Shape::new(vec![2, 5, 3, 7]);
        assert_eq!(s.matrix_extent(), (3, 7));
        assert_eq!(s.batch(), 10);
        assert_eq!(Shape::vector(9).matrix_extent(), (1, 9));
        assert_eq!(Shape::new(vec![]).matrix_extent(), (1, 1));
        assert_eq!(Shape::matrix(4, 6).batch(), 1);
        assert_eq!(Shape::new(vec![0, 4, 6]).batch(), 0);
    }

    #[test]
    fn test_leading_and_trailing_clamp() {
        let s = Shape::new(vec![6, 1, 4]);
        assert_eq!(s.leading(5), s);
        assert_eq!(s.trailing(5), s);
        assert_eq!(s.leading(1).dims(), &[6]);
        assert_eq!(s.trailing(0).rank(), 0);
    }

    #[test]
    fn test_broadcast_over_domain() {
        let domain = Shape::new(vec![4, 3]);
        // Weights shared by every item, per-row weights, full batch.
        assert!(Shape::new(vec![]).broadcasts_to(&domain));
        assert!(Shape::new(vec![1, 3]).broadcasts_to(&domain));
        assert!(Shape::new(vec![4, 1]).broadcasts_to(&domain));
        assert!(Shape::new(vec![3]).broadcasts_to(&domain));
        assert!(!Shape::new(vec![2, 3]).broadcasts_to(&domain));
        assert!(!Shape::new(vec![1, 4, 3]).broadcasts_to(&domain));
    }

    #[test]
    fn test_matmul_output() {
        let lhs = Shape::new(vec![8, 4, 32]);
        assert_eq!(lhs.matmul_output(&Shape::matrix(32, 16)), Some(Shape::new(vec![8, 4, 16])));
        assert_eq!(
            lhs.matmul_output(&Shape::new(vec![8, 32, 16])),
            Some(Shape::new(vec![8, 4, 16]))
        );
        assert_eq!(lhs.matmul_output(&Shape::matrix(16, 32)), None);
        assert_eq!(Shape::vector(32).matmul_output(&Shape::matrix(32, 16)), None);
    }

    #[test]
    fn test_display_in_error_messages() {
        assert_eq!(Shape::new(vec![2, 8, 16]).to_string(), "[2, 8, 16]");
        assert_eq!(Shape::new(vec![]).to_string(), "[]");
    }
}
