//! The scalar component type stored in a field (spec.md §3).
//!
//! Ported from `original_source/src/prtcl/data/component_type.{hpp,cpp}`: a
//! closed enumeration plus a short string code used by the `.prtcl` DSL and
//! by the binary archive format.

use std::fmt;
use std::io;
use std::str::FromStr;

use crate::archive::{ArchiveReader, ArchiveWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentType {
    Boolean,
    SInt32,
    SInt64,
    Float32,
    Float64,
}

impl ComponentType {
    /// The short code used in `.prtcl` source and archives (`b`, `s32`,
    /// `s64`, `f32`, `f64`).
    pub fn as_str(self) -> &'static str {
        match self {
            ComponentType::Boolean => "b",
            ComponentType::SInt32 => "s32",
            ComponentType::SInt64 => "s64",
            ComponentType::Float32 => "f32",
            ComponentType::Float64 => "f64",
        }
    }

    pub fn size_of_component(self) -> usize {
        match self {
            ComponentType::Boolean => std::mem::size_of::<bool>(),
            ComponentType::SInt32 => std::mem::size_of::<i32>(),
            ComponentType::SInt64 => std::mem::size_of::<i64>(),
            ComponentType::Float32 => std::mem::size_of::<f32>(),
            ComponentType::Float64 => std::mem::size_of::<f64>(),
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentType {
    type Err = crate::errors::DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "b" => Ok(ComponentType::Boolean),
            "s32" => Ok(ComponentType::SInt32),
            "s64" => Ok(ComponentType::SInt64),
            "f32" => Ok(ComponentType::Float32),
            "f64" => Ok(ComponentType::Float64),
            other => Err(crate::errors::DataError::NotImplemented(format!(
                "unknown component type {other:?}"
            ))),
        }
    }
}

/// Implemented for every Rust type a field can store its components as.
/// Mirrors the original's `MakeComponentType<T>()` template.
pub trait Component: Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    const COMPONENT_TYPE: ComponentType;

    /// Dispatches to the matching [`ArchiveWriter`] overload. Exists so
    /// type-erased field storage can serialize itself through a `&mut dyn
    /// ArchiveWriter` without knowing its own component type at the call
    /// site (spec.md §12).
    fn archive_save(writer: &mut dyn ArchiveWriter, values: &[Self]) -> io::Result<()>;
    fn archive_load(reader: &mut dyn ArchiveReader, count: usize) -> io::Result<Vec<Self>>;
}

impl Component for bool {
    const COMPONENT_TYPE: ComponentType = ComponentType::Boolean;

    fn archive_save(writer: &mut dyn ArchiveWriter, values: &[Self]) -> io::Result<()> {
        writer.save_bool_values(values)
    }
    fn archive_load(reader: &mut dyn ArchiveReader, count: usize) -> io::Result<Vec<Self>> {
        reader.load_bool_values(count)
    }
}
impl Component for i32 {
    const COMPONENT_TYPE: ComponentType = ComponentType::SInt32;

    fn archive_save(writer: &mut dyn ArchiveWriter, values: &[Self]) -> io::Result<()> {
        writer.save_i32_values(values)
    }
    fn archive_load(reader: &mut dyn ArchiveReader, count: usize) -> io::Result<Vec<Self>> {
        reader.load_i32_values(count)
    }
}
impl Component for i64 {
    const COMPONENT_TYPE: ComponentType = ComponentType::SInt64;

    fn archive_save(writer: &mut dyn ArchiveWriter, values: &[Self]) -> io::Result<()> {
        writer.save_i64_values(values)
    }
    fn archive_load(reader: &mut dyn ArchiveReader, count: usize) -> io::Result<Vec<Self>> {
        reader.load_i64_values(count)
    }
}
impl Component for f32 {
    const COMPONENT_TYPE: ComponentType = ComponentType::Float32;

    fn archive_save(writer: &mut dyn ArchiveWriter, values: &[Self]) -> io::Result<()> {
        writer.save_f32_values(values)
    }
    fn archive_load(reader: &mut dyn ArchiveReader, count: usize) -> io::Result<Vec<Self>> {
        reader.load_f32_values(count)
    }
}
impl Component for f64 {
    const COMPONENT_TYPE: ComponentType = ComponentType::Float64;

    fn archive_save(writer: &mut dyn ArchiveWriter, values: &[Self]) -> io::Result<()> {
        writer.save_f64_values(values)
    }
    fn archive_load(reader: &mut dyn ArchiveReader, count: usize) -> io::Result<Vec<Self>> {
        reader.load_f64_values(count)
    }
}
