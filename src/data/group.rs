//! A named, typed collection of particles sharing varying and uniform
//! fields (spec.md §3).
//!
//! Ported from `original_source/src/prtcl/data/group.hpp`, which in the
//! original is left half-finished (`AddUniform`, `Create`, `Erase`, `Dirty`
//! are all `// TODO` stubs there) — this completes them by delegating to
//! [`VaryingManager`]/[`UniformManager`], which is what the surrounding code
//! already implies they should do.

use std::io;
use std::ops::Range;

use fxhash::FxHashSet;

use super::component_type::Component;
use super::is_valid_identifier;
use super::shape::Shape;
use super::uniform_manager::UniformManager;
use super::varying_manager::VaryingManager;
use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::errors::DataError;

/// A stable index into a [`super::model::Model`]'s groups, valid for the
/// model's lifetime even as other groups are added or removed (spec.md §3
/// Group invariants: "arena + indices instead of smart-pointer graphs").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupIndex(pub usize);

#[derive(Debug)]
pub struct Group {
    name: String,
    group_type: String,
    tags: FxHashSet<String>,
    varying: VaryingManager,
    uniform: UniformManager,
}

impl Group {
    pub fn new(name: impl Into<String>, group_type: impl Into<String>) -> Result<Self, DataError> {
        let name = name.into();
        let group_type = group_type.into();
        if !is_valid_identifier(&name) {
            return Err(DataError::InvalidIdentifier(name));
        }
        if !is_valid_identifier(&group_type) {
            return Err(DataError::InvalidIdentifier(group_type));
        }
        Ok(Group {
            name,
            group_type,
            tags: FxHashSet::default(),
            varying: VaryingManager::new(),
            uniform: UniformManager::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group_type(&self) -> &str {
        &self.group_type
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|s| s.as_str())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.tags.insert(tag.into());
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        self.tags.remove(tag)
    }

    pub fn varying(&self) -> &VaryingManager {
        &self.varying
    }

    pub fn varying_mut(&mut self) -> &mut VaryingManager {
        &mut self.varying
    }

    pub fn uniform(&self) -> &UniformManager {
        &self.uniform
    }

    pub fn uniform_mut(&mut self) -> &mut UniformManager {
        &mut self.uniform
    }

    pub fn item_count(&self) -> usize {
        self.varying.item_count()
    }

    pub fn add_varying<T: Component, const N: usize>(
        &mut self,
        name: &str,
        shape: Shape,
    ) -> Result<(), DataError> {
        self.varying.add_field::<T, N>(name, shape)
    }

    pub fn add_uniform<T: Component, const N: usize>(
        &mut self,
        name: &str,
        shape: Shape,
    ) -> Result<(), DataError> {
        self.uniform.add_field::<T, N>(name, shape)
    }

    /// Creates `count` new items, returning their indices.
    pub fn create(&mut self, count: usize) -> Range<usize> {
        self.varying.create_items(count)
    }

    /// Destroys the items at `indices`.
    pub fn erase(&mut self, indices: &[usize]) {
        self.varying.destroy_items(indices)
    }

    pub fn resize(&mut self, new_count: usize) {
        self.varying.resize_items(new_count)
    }

    pub fn permute(&mut self, permutation: &[usize]) {
        self.varying.permute_items(permutation)
    }

    pub fn is_dirty(&self) -> bool {
        self.varying.is_dirty()
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.varying.set_dirty(dirty)
    }

    /// Saves the group's tags, uniform fields and varying fields, in that
    /// order (spec.md §12). `name`/`group_type` are not written here — the
    /// caller ([`super::model::Model::save`]) already knows them, since it
    /// looks the group up by name before calling this.
    pub fn save(&self, writer: &mut dyn ArchiveWriter) -> io::Result<()> {
        let mut tags: Vec<&str> = self.tags.iter().map(|s| s.as_str()).collect();
        tags.sort_unstable();
        writer.save_size(tags.len())?;
        for tag in tags {
            writer.save_string(tag)?;
        }
        self.uniform.save(writer)?;
        self.varying.save(writer)
    }

    /// Loads data written by [`Group::save`]. The group's uniform/varying
    /// fields must already be declared with matching types.
    pub fn load(&mut self, reader: &mut dyn ArchiveReader) -> io::Result<()> {
        self.tags.clear();
        let tag_count = reader.load_size()?;
        for _ in 0..tag_count {
            self.tags.insert(reader.load_string()?);
        }
        self.uniform.load(reader)?;
        self.varying.load(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{NativeBinaryArchiveReader, NativeBinaryArchiveWriter};
    use crate::data::component_type::ComponentType;

    #[test]
    fn save_load_round_trips_tags_and_fields() {
        let mut g = Group::new("water", "fluid").unwrap();
        g.add_tag("dynamic");
        g.add_uniform::<f64, 1>("rest_density", Shape::scalar()).unwrap();
        g.uniform_mut().try_get_mut::<f64, 1>("rest_density").unwrap().set([1000.0]);
        g.add_varying::<f64, 1>("mass", Shape::scalar()).unwrap();
        g.create(2);
        g.varying_mut()
            .try_get_mut::<f64, 1>("mass")
            .unwrap()
            .as_mut_slice()
            .copy_from_slice(&[[1.0], [2.0]]);

        let mut buf = Vec::new();
        g.save(&mut NativeBinaryArchiveWriter::new(&mut buf)).unwrap();

        let mut loaded = Group::new("water", "fluid").unwrap();
        loaded.add_uniform::<f64, 1>("rest_density", Shape::scalar()).unwrap();
        loaded.add_varying::<f64, 1>("mass", Shape::scalar()).unwrap();
        loaded.load(&mut NativeBinaryArchiveReader::new(buf.as_slice())).unwrap();

        assert!(loaded.has_tag("dynamic"));
        assert_eq!(
            loaded.uniform().try_get::<f64, 1>("rest_density").unwrap().get(),
            [1000.0]
        );
        assert_eq!(loaded.item_count(), 2);
        assert_eq!(
            loaded.varying().try_get::<f64, 1>("mass").unwrap().as_slice(),
            &[[1.0], [2.0]]
        );
    }

    #[test]
    fn rejects_invalid_names() {
        assert!(Group::new("0bad", "fluid").is_err());
        assert!(Group::new("water", "0bad").is_err());
    }

    #[test]
    fn create_grows_varying_fields() {
        let mut g = Group::new("water", "fluid").unwrap();
        g.add_varying::<f64, 3>("position", Shape::new(vec![3])).unwrap();
        let r = g.create(4);
        assert_eq!(r, 0..4);
        assert_eq!(g.item_count(), 4);
        assert_eq!(
            g.varying().try_get::<f64, 3>("position").unwrap().as_slice().len(),
            4
        );
    }

    #[test]
    fn tags_round_trip() {
        let mut g = Group::new("water", "fluid").unwrap();
        assert!(!g.has_tag("dynamic"));
        g.add_tag("dynamic");
        assert!(g.has_tag("dynamic"));
        g.remove_tag("dynamic");
        assert!(!g.has_tag("dynamic"));
    }

    #[test]
    fn add_uniform_round_trips_type() {
        let mut g = Group::new("water", "fluid").unwrap();
        g.add_uniform::<f64, 1>("rest_density", Shape::scalar()).unwrap();
        assert_eq!(
            g.uniform().get_dyn("rest_density").unwrap().tensor_type().component_type(),
            ComponentType::Float64
        );
    }
}
