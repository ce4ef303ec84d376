//! Per-group manager for varying (per-item) fields (spec.md §3).
//!
//! Ported from `original_source/src/prtcl/data/varying_manager.hpp`. Fields
//! are kept in a `BTreeMap` (the original's `boost::container::flat_map`
//! keeps keys sorted too; `BTreeMap` gets the same iteration order without
//! adding a dependency — see `DESIGN.md`).

use std::collections::BTreeMap;
use std::io;
use std::ops::Range;

use super::component_type::Component;
use super::field::{DynVaryingField, VaryingFieldData};
use super::is_valid_identifier;
use super::shape::Shape;
use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::errors::DataError;

#[derive(Debug, Default)]
pub struct VaryingManager {
    fields: BTreeMap<String, Box<dyn DynVaryingField>>,
    item_count: usize,
    dirty: bool,
}

impl VaryingManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|s| s.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &dyn DynVaryingField)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    /// Adds a varying field of type `T`/shape, sized to the current item
    /// count. Idempotent if a field of the same name and identical shape
    /// already exists; errors if the name exists with a different shape or
    /// component type.
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
        let mut field = VaryingFieldData::<T, N>::new(shape);
        field.resize(self.item_count);
        self.fields.insert(name.to_string(), Box::new(field));
        Ok(())
    }

    pub fn remove_field(&mut self, name: &str) -> bool {
        self.fields.remove(name).is_some()
    }

    pub fn try_get<T: Component, const N: usize>(&self, name: &str) -> Option<&VaryingFieldData<T, N>> {
        self.fields
            .get(name)?
            .as_any()
            .downcast_ref::<VaryingFieldData<T, N>>()
    }

    pub fn try_get_mut<T: Component, const N: usize>(
        &mut self,
        name: &str,
    ) -> Option<&mut VaryingFieldData<T, N>> {
        self.fields
            .get_mut(name)?
            .as_any_mut()
            .downcast_mut::<VaryingFieldData<T, N>>()
    }

    pub fn get_dyn(&self, name: &str) -> Option<&dyn DynVaryingField> {
        self.fields.get(name).map(|f| f.as_ref())
    }

    /// Resizes every field to `new_count`, zero-filling new elements, and
    /// marks the manager dirty.
    pub fn resize_items(&mut self, new_count: usize) {
        for field in self.fields.values_mut() {
            field.resize(new_count);
        }
        self.item_count = new_count;
        self.dirty = true;
    }

    /// Reorders every field's items so index `i` holds what used to be at
    /// `permutation[i]`. `permutation` must be a permutation of
    /// `0..item_count()`.
    pub fn permute_items(&mut self, permutation: &[usize]) {
        debug_assert_eq!(permutation.len(), self.item_count);
        for field in self.fields.values_mut() {
            field.permute(permutation);
        }
        self.dirty = true;
    }

    /// Grows the group by `count` items, returning the range of newly
    /// created item indices.
    pub fn create_items(&mut self, count: usize) -> Range<usize> {
        let start = self.item_count;
        self.resize_items(start + count);
        start..start + count
    }

    /// Destroys the items at `indices` (order-preserving among survivors),
    /// shrinking every field.
    ///
    /// Ported from `VaryingManager::DestroyItems`: build a permutation that
    /// moves the items to destroy to the tail (in ascending index order),
    /// keeps every surviving item in its original relative order at the
    /// front, applies it, then truncates.
    pub fn destroy_items(&mut self, indices: &[usize]) {
        if indices.is_empty() {
            return;
        }
        let mut to_destroy = indices.to_vec();
        to_destroy.sort_unstable();
        to_destroy.dedup();

        let mut permutation = Vec::with_capacity(self.item_count);
        let mut destroy_iter = to_destroy.iter().peekable();
        for i in 0..self.item_count {
            if destroy_iter.peek() == Some(&&i) {
                destroy_iter.next();
            } else {
                permutation.push(i);
            }
        }
        permutation.extend(to_destroy.iter().copied());

        self.permute_items(&permutation);
        self.resize_items(self.item_count - to_destroy.len());
    }

    /// Writes the item count, then every field (name, tensor type, flattened
    /// values) in name order, matching [`BTreeMap`]'s deterministic
    /// iteration (spec.md §12: "member-order delegation for compound
    /// types").
    pub fn save(&self, writer: &mut dyn ArchiveWriter) -> io::Result<()> {
        writer.save_size(self.item_count)?;
        writer.save_size(self.fields.len())?;
        for (name, field) in &self.fields {
            writer.save_string(name)?;
            writer.save_string(&field.tensor_type().to_string())?;
            field.save(writer)?;
        }
        Ok(())
    }

    /// Loads data written by [`VaryingManager::save`]. Every field must
    /// already be declared (via [`VaryingManager::add_field`]) with the same
    /// name and tensor type; this fills the existing fields' data rather
    /// than reconstructing the schema from scratch.
    pub fn load(&mut self, reader: &mut dyn ArchiveReader) -> io::Result<()> {
        let item_count = reader.load_size()?;
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
            field.load(reader, item_count)?;
        }
        self.item_count = item_count;
        self.dirty = true;
        Ok(())
    }
}
