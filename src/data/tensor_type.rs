//! `(ComponentType, Shape)` — a field's full type identity (spec.md §3).
//!
//! Ported from `original_source/src/prtcl/data/tensor_type.{hpp,cpp}`. Two
//! fields with the same name but different `TensorType` can never coexist
//! on the same group (spec.md §3 Field invariants) — this is the type that
//! gets compared to enforce it.

use std::fmt;
use std::str::FromStr;

use super::component_type::ComponentType;
use super::shape::Shape;
use crate::errors::DataError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorType {
    component_type: ComponentType,
    shape: Shape,
}

impl TensorType {
    pub fn new(component_type: ComponentType, shape: Shape) -> Self {
        TensorType { component_type, shape }
    }

    pub fn scalar(component_type: ComponentType) -> Self {
        TensorType::new(component_type, Shape::scalar())
    }

    pub fn component_type(&self) -> ComponentType {
        self.component_type
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn with_component_type(&self, component_type: ComponentType) -> Self {
        TensorType::new(component_type, self.shape.clone())
    }

    pub fn with_shape(&self, shape: Shape) -> Self {
        TensorType::new(self.component_type, shape)
    }

    pub fn component_count(&self) -> usize {
        self.shape.component_count()
    }

    pub fn is_empty(&self) -> bool {
        self.shape.is_empty()
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.component_type, self.shape)
    }
}

impl FromStr for TensorType {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bracket = s
            .find('[')
            .ok_or_else(|| DataError::NotImplemented(format!("malformed tensor type {s:?}")))?;
        let (ctype, shape) = s.split_at(bracket);
        Ok(TensorType::new(ctype.parse()?, shape.parse()?))
    }
}
