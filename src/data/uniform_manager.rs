//! Per-group or per-model manager for uniform (single-value) fields
//! (spec.md §3).
//!
//! Ported from `original_source/src/prtcl/data/uniform_manager.hpp`. Much
//! simpler than [`super::varying_manager::VaryingManager`]: there is no
//! item count to track, so no resize/permute/destroy bookkeeping.

use std::collections::BTreeMap;
use std::io;

use super::component_type::Component;
use super::field::{DynUniformField, UniformFieldData};
use super::is_valid_identifier;
use super::shape::Shape;
use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::errors::DataError;

#[derive(Debug, Default)]
pub struct UniformManager {
    fields: BTreeMap<String, Box<dyn DynUniformField>>,
}

impl UniformManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|s| s.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &dyn DynUniformField)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    pub fn add_field<T: Component, const N: usize>(
        &mut self,
        name: &str,
        shape: Shape,
    ) -> Result<(), DataError> {
        if !is_valid_identifier(name) {
            return Err(DataError::InvalidIdentifier(name.to_string()));
        }
        if let Some(existing) = self.fields.get(name) {
            let candidate = super::tensor_type::TensorType::new(T::COMPONENT_TYPE, shape);
            if existing.tensor_type() != &candidate {
                return Err(DataError::FieldOfDifferentTypeAlreadyExists(name.to_string()));
            }
            return Ok(());
        }
        self.fields
            .insert(name.to_string(), Box::new(UniformFieldData::<T, N>::new(shape)));
        Ok(())
    }

    pub fn remove_field(&mut self, name: &str) -> bool {
        self.fields.remove(name).is_some()
    }

    pub fn try_get<T: Component, const N: usize>(&self, name: &str) -> Option<&UniformFieldData<T, N>> {
        self.fields
            .get(name)?
            .as_any()
            .downcast_ref::<UniformFieldData<T, N>>()
    }

    pub fn try_get_mut<T: Component, const N: usize>(
        &mut self,
        name: &str,
    ) -> Option<&mut UniformFieldData<T, N>> {
        self.fields
            .get_mut(name)?
            .as_any_mut()
            .downcast_mut::<UniformFieldData<T, N>>()
    }

    pub fn get_dyn(&self, name: &str) -> Option<&dyn DynUniformField> {
        self.fields.get(name).map(|f| f.as_ref())
    }

    /// Writes every field (name, tensor type, value) in name order (spec.md
    /// §12: "member-order delegation for compound types").
    pub fn save(&self, writer: &mut dyn ArchiveWriter) -> io::Result<()> {
        writer.save_size(self.fields.len())?;
        for (name, field) in &self.fields {
            writer.save_string(name)?;
            writer.save_string(&field.tensor_type().to_string())?;
            field.save(writer)?;
        }
        Ok(())
    }

    /// Loads data written by [`UniformManager::save`]. Every field must
    /// already be declared with the same name and tensor type.
    pub fn load(&mut self, reader: &mut dyn ArchiveReader) -> io::Result<()> {
        let field_count = reader.load_size()?;
        for _ in 0..field_count {
            let name = reader.load_string()?;
            let tensor_type = reader.load_string()?;
            let field = self.fields.get_mut(&name).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("field {name:?} was not declared before loading"),
                )
            })?;
            if field.tensor_type().to_string() != tensor_type {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("field {name:?} has type {tensor_type}, expected {}", field.tensor_type()),
                ));
            }
            field.load(reader)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{NativeBinaryArchiveReader, NativeBinaryArchiveWriter};

    #[test]
    fn save_load_round_trips_values() {
        let mut m = UniformManager::new();
        m.add_field::<f64, 3>("gravity", Shape::new(vec![3])).unwrap();
        m.try_get_mut::<f64, 3>("gravity").unwrap().set([0.0, -9.81, 0.0]);

        let mut buf = Vec::new();
        m.save(&mut NativeBinaryArchiveWriter::new(&mut buf)).unwrap();

        let mut loaded = UniformManager::new();
        loaded.add_field::<f64, 3>("gravity", Shape::new(vec![3])).unwrap();
        loaded.load(&mut NativeBinaryArchiveReader::new(buf.as_slice())).unwrap();

        assert_eq!(loaded.try_get::<f64, 3>("gravity").unwrap().get(), [0.0, -9.81, 0.0]);
    }

    #[test]
    fn add_get_set_round_trip() {
        let mut m = UniformManager::new();
        m.add_field::<f64, 3>("gravity", Shape::new(vec![3])).unwrap();
        m.try_get_mut::<f64, 3>("gravity").unwrap().set([0.0, -9.81, 0.0]);
        assert_eq!(m.try_get::<f64, 3>("gravity").unwrap().get(), [0.0, -9.81, 0.0]);
    }

    #[test]
    fn rejects_type_conflict() {
        let mut m = UniformManager::new();
        m.add_field::<f64, 1>("dt", Shape::scalar()).unwrap();
        let err = m.add_field::<i32, 1>("dt", Shape::scalar()).unwrap_err();
        assert!(matches!(err, DataError::FieldOfDifferentTypeAlreadyExists(_)));
    }
}
