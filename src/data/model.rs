//! The root particle data model: a set of groups plus global fields
//! (spec.md §3).
//!
//! Ported from `original_source/src/prtcl/data/model.hpp`, whose
//! `AddGroup`/`GetGroup`/`Groups`/`AddGlobal`/`Globals` are all `// TODO`
//! stubs in the original — completed here against a `Vec<Option<Group>>`
//! arena so that a [`GroupIndex`] stays valid across group removals
//! (spec.md §9 design note: "arena + indices instead of smart-pointer
//! graphs").

use std::collections::BTreeMap;
use std::io;

use super::component_type::Component;
use super::group::{Group, GroupIndex};
use super::shape::Shape;
use super::uniform_manager::UniformManager;
use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::errors::DataError;

#[derive(Debug, Default)]
pub struct Model {
    groups: Vec<Option<Group>>,
    name_to_index: BTreeMap<String, GroupIndex>,
    global: UniformManager,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global(&self) -> &UniformManager {
        &self.global
    }

    pub fn global_mut(&mut self) -> &mut UniformManager {
        &mut self.global
    }

    pub fn add_global<T: Component, const N: usize>(
        &mut self,
        name: &str,
        shape: Shape,
    ) -> Result<(), DataError> {
        self.global.add_field::<T, N>(name, shape)
    }

    /// Adds a new group, or returns the existing one's index if a group of
    /// that name with the same type already exists.
    pub fn add_group(&mut self, name: &str, group_type: &str) -> Result<GroupIndex, DataError> {
        if let Some(&index) = self.name_to_index.get(name) {
            let existing = self.groups[index.0].as_ref().expect("live index");
            if existing.group_type() != group_type {
                return Err(DataError::GroupOfDifferentTypeAlreadyExists(name.to_string()));
            }
            return Ok(index);
        }
        let group = Group::new(name, group_type)?;
        let index = GroupIndex(self.groups.len());
        self.groups.push(Some(group));
        self.name_to_index.insert(name.to_string(), index);
        Ok(index)
    }

    pub fn group_index(&self, name: &str) -> Option<GroupIndex> {
        self.name_to_index.get(name).copied()
    }

    pub fn get_group(&self, index: GroupIndex) -> Option<&Group> {
        self.groups.get(index.0)?.as_ref()
    }

    pub fn get_group_mut(&mut self, index: GroupIndex) -> Option<&mut Group> {
        self.groups.get_mut(index.0)?.as_mut()
    }

    /// Removes a group. Other groups' [`GroupIndex`] values remain valid.
    pub fn remove_group(&mut self, index: GroupIndex) -> bool {
        match self.groups.get_mut(index.0) {
            Some(slot @ Some(_)) => {
                let name = slot.as_ref().unwrap().name().to_string();
                *slot = None;
                self.name_to_index.remove(&name);
                true
            }
            _ => false,
        }
    }

    pub fn groups(&self) -> impl Iterator<Item = (GroupIndex, &Group)> {
        self.groups
            .iter()
            .enumerate()
            .filter_map(|(i, g)| g.as_ref().map(|g| (GroupIndex(i), g)))
    }

    pub fn groups_mut(&mut self) -> impl Iterator<Item = (GroupIndex, &mut Group)> {
        self.groups
            .iter_mut()
            .enumerate()
            .filter_map(|(i, g)| g.as_mut().map(|g| (GroupIndex(i), g)))
    }

    pub fn group_count(&self) -> usize {
        self.name_to_index.len()
    }

    /// True if any group's varying fields have been resized or permuted
    /// since the last [`Model::clear_dirty`].
    pub fn is_dirty(&self) -> bool {
        self.groups().any(|(_, g)| g.is_dirty())
    }

    pub fn clear_dirty(&mut self) {
        for (_, g) in self.groups_mut() {
            g.set_dirty(false);
        }
    }

    /// Saves every live group (by name, in `name_to_index`'s sorted order)
    /// followed by the global fields (spec.md §12: "member-order delegation
    /// for compound types").
    pub fn save(&self, writer: &mut dyn ArchiveWriter) -> io::Result<()> {
        writer.save_size(self.name_to_index.len())?;
        for (name, &index) in &self.name_to_index {
            writer.save_string(name)?;
            self.groups[index.0].as_ref().expect("live index").save(writer)?;
        }
        self.global.save(writer)
    }

    /// Loads data written by [`Model::save`]. Every named group must already
    /// exist (via [`Model::add_group`]) with matching fields, and the global
    /// fields must already be declared.
    pub fn load(&mut self, reader: &mut dyn ArchiveReader) -> io::Result<()> {
        let group_count = reader.load_size()?;
        for _ in 0..group_count {
            let name = reader.load_string()?;
            let index = self.group_index(&name).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("group {name:?} was not declared before loading"),
                )
            })?;
            self.get_group_mut(index).expect("live index").load(reader)?;
        }
        self.global.load(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{NativeBinaryArchiveReader, NativeBinaryArchiveWriter};

    #[test]
    fn save_load_round_trips_groups_and_globals() {
        let mut m = Model::new();
        m.add_global::<f64, 1>("time", Shape::scalar()).unwrap();
        m.global_mut().try_get_mut::<f64, 1>("time").unwrap().set([3.5]);
        let water = m.add_group("water", "fluid").unwrap();
        m.get_group_mut(water)
            .unwrap()
            .add_varying::<f64, 1>("mass", Shape::scalar())
            .unwrap();
        m.get_group_mut(water).unwrap().create(2);
        m.get_group_mut(water)
            .unwrap()
            .varying_mut()
            .try_get_mut::<f64, 1>("mass")
            .unwrap()
            .as_mut_slice()
            .copy_from_slice(&[[1.0], [2.0]]);

        let mut buf = Vec::new();
        m.save(&mut NativeBinaryArchiveWriter::new(&mut buf)).unwrap();

        let mut loaded = Model::new();
        loaded.add_global::<f64, 1>("time", Shape::scalar()).unwrap();
        let loaded_water = loaded.add_group("water", "fluid").unwrap();
        loaded
            .get_group_mut(loaded_water)
            .unwrap()
            .add_varying::<f64, 1>("mass", Shape::scalar())
            .unwrap();
        loaded.load(&mut NativeBinaryArchiveReader::new(buf.as_slice())).unwrap();

        assert_eq!(loaded.global().try_get::<f64, 1>("time").unwrap().get(), [3.5]);
        assert_eq!(
            loaded
                .get_group(loaded_water)
                .unwrap()
                .varying()
                .try_get::<f64, 1>("mass")
                .unwrap()
                .as_slice(),
            &[[1.0], [2.0]]
        );
    }

    #[test]
    fn add_group_is_idempotent_by_name_and_type() {
        let mut m = Model::new();
        let a = m.add_group("water", "fluid").unwrap();
        let b = m.add_group("water", "fluid").unwrap();
        assert_eq!(a, b);
        assert_eq!(m.group_count(), 1);
    }

    #[test]
    fn add_group_rejects_type_conflict() {
        let mut m = Model::new();
        m.add_group("water", "fluid").unwrap();
        let err = m.add_group("water", "boundary").unwrap_err();
        assert!(matches!(err, DataError::GroupOfDifferentTypeAlreadyExists(_)));
    }

    #[test]
    fn remove_group_keeps_other_indices_stable() {
        let mut m = Model::new();
        let a = m.add_group("a", "fluid").unwrap();
        let b = m.add_group("b", "fluid").unwrap();
        m.remove_group(a);
        assert!(m.get_group(a).is_none());
        assert!(m.get_group(b).is_some());
        assert_eq!(m.group_count(), 1);
    }

    #[test]
    fn dirty_aggregates_across_groups() {
        let mut m = Model::new();
        let a = m.add_group("a", "fluid").unwrap();
        assert!(!m.is_dirty());
        m.get_group_mut(a).unwrap().create(3);
        assert!(m.is_dirty());
        m.clear_dirty();
        assert!(!m.is_dirty());
    }
}
