//! A tensor's extents, independent of its component type (spec.md §3).
//!
//! Ported from `original_source/src/prtcl/data/shape.{hpp,cpp}`. Rank 0 is a
//! scalar (empty extents), rank 1 a vector, rank 2 a matrix; this crate's
//! schemes only ever use rank 0/1/2 with extents in `1..=3`, but `Shape`
//! itself does not enforce that — the DSL compiler and field managers do.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Shape {
    extents: Vec<usize>,
}

impl Shape {
    pub fn scalar() -> Self {
        Shape { extents: Vec::new() }
    }

    pub fn new(extents: impl Into<Vec<usize>>) -> Self {
        Shape {
            extents: extents.into(),
        }
    }

    pub fn rank(&self) -> usize {
        self.extents.len()
    }

    pub fn extents(&self) -> &[usize] {
        &self.extents
    }

    pub fn is_empty(&self) -> bool {
        self.extents.iter().any(|&n| n == 0)
    }

    /// Total number of scalar components, i.e. the product of all extents
    /// (1 for a scalar).
    pub fn component_count(&self) -> usize {
        if self.extents.is_empty() {
            1
        } else {
            self.extents.iter().product()
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, e) in self.extents.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{e}")?;
        }
        write!(f, "]")
    }
}

impl FromStr for Shape {
    type Err = crate::errors::DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let inner = s
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .ok_or_else(|| crate::errors::DataError::NotImplemented(format!("malformed shape {s:?}")))?;
        let inner = inner.trim();
        if inner.is_empty() {
            return Ok(Shape::scalar());
        }
        let mut extents = Vec::new();
        for part in inner.split(',') {
            let n: usize = part.trim().parse().map_err(|_| {
                crate::errors::DataError::NotImplemented(format!("malformed shape extent {part:?}"))
            })?;
            extents.push(n);
        }
        Ok(Shape::new(extents))
    }
}
