//! A grouped uniform grid for fixed-radius neighbor queries (spec.md §4.2).
//!
//! Ported from `original_source/src/prtcl/util/grouped_uniform_grid.hpp`
//! (itself inspired by `CompactNSearch::NeighbourhoodSearch`, per that
//! file's attribution comment). Particles are bucketed into cells of a
//! single uniform size, the cells are visited in Morton (Z-curve) order so
//! that spatially close particles end up close in memory, and a query
//! radius is served by scanning the `3^D` cells around the query cell.
//!
//! Unlike the original, which precomputes a symmetric half of the adjacent
//! cell offsets and mirrors them via a binary search, this keeps the full
//! `3^D - 1` offset table and looks up each candidate cell independently —
//! simpler, and the asymptotic cost is identical since every candidate cell
//! is visited exactly once either way. Noted in `DESIGN.md`.

pub mod morton;

use std::ops::Range;

use rayon::prelude::*;

use crate::data::component_type::Component;
use crate::data::group::GroupIndex;
use crate::data::model::Model;
use crate::tensor::Real;
use morton::morton_cmp;

/// Identifies a single particle: which group it belongs to, and its item
/// index within that group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticleRef {
    pub group: GroupIndex,
    pub index: usize,
}

struct CellRange<const D: usize> {
    cell: [i64; D],
    range: Range<usize>,
}

/// A grouped uniform grid over `D`-dimensional positions.
///
/// Call [`GroupedUniformGrid::update`] with the current positions of every
/// particle to (re)bucket them, then query with [`GroupedUniformGrid::neighbors_of`]
/// or [`GroupedUniformGrid::neighbors_at`].
pub struct GroupedUniformGrid<R: Real, const D: usize> {
    cell_size: R,
    entries: Vec<(ParticleRef, [R; D])>,
    sorted_to_raw: Vec<usize>,
    cell_of_sorted: Vec<[i64; D]>,
    cells: Vec<CellRange<D>>,
    adjacent_offsets: Vec<[i64; D]>,
}

impl<R: Real, const D: usize> GroupedUniformGrid<R, D> {
    pub fn new(cell_size: R) -> Self {
        assert!(cell_size > R::zero(), "cell size must be positive");
        GroupedUniformGrid {
            cell_size,
            entries: Vec::new(),
            sorted_to_raw: Vec::new(),
            cell_of_sorted: Vec::new(),
            cells: Vec::new(),
            adjacent_offsets: Self::make_adjacent_offsets(),
        }
    }

    pub fn cell_size(&self) -> R {
        self.cell_size
    }

    /// Changes the query/bucketing radius. Takes effect on the next
    /// [`GroupedUniformGrid::update`]/[`GroupedUniformGrid::load`] — existing
    /// bucketing is left as-is until then.
    pub fn set_radius(&mut self, radius: R) {
        assert!(radius > R::zero(), "radius must be positive");
        self.cell_size = radius;
    }

    /// Reads every particle of `model` into this grid, skipping groups
    /// tagged `cannot_be_neighbor` (spec.md §4.4 permutation support), then
    /// rebuilds it via [`GroupedUniformGrid::update`].
    pub fn load(&mut self, model: &Model)
    where
        R: Component,
    {
        let mut positions = Vec::new();
        for (index, group) in model.groups() {
            if group.has_tag("cannot_be_neighbor") {
                continue;
            }
            let Some(field) = group.varying().try_get::<R, D>("position") else {
                continue;
            };
            for (item, &position) in field.as_slice().iter().enumerate() {
                positions.push((ParticleRef { group: index, index: item }, position));
            }
        }
        self.update(positions);
    }

    /// The permutation this grid's Morton order implies for `group`'s items:
    /// `result[i]` is the old item index that should move to sorted slot
    /// `i` (matching [`crate::data::varying_manager::VaryingManager::permute_items`]'s
    /// `new[i] = old[permutation[i]]` contract).
    pub fn compute_group_permutation(&self, group: GroupIndex) -> Vec<usize> {
        let mut permutation = Vec::new();
        for &raw in &self.sorted_to_raw {
            let (pref, _) = self.entries[raw];
            if pref.group == group {
                permutation.push(pref.index);
            }
        }
        permutation
    }

    /// Physically reorders every group's storage to match this grid's
    /// current Morton order (spec.md §4.4 "Permutation support"), and
    /// updates the grid's own cached particle indices to stay consistent
    /// with the reordered storage.
    pub fn permute(&mut self, model: &mut Model) {
        let mut groups: Vec<GroupIndex> = self.entries.iter().map(|(pref, _)| pref.group).collect();
        groups.sort();
        groups.dedup();

        for group in groups {
            let permutation = self.compute_group_permutation(group);
            if let Some(g) = model.get_group_mut(group) {
                g.permute(&permutation);
            }
            let mut new_index_of = vec![0usize; permutation.len()];
            for (new_index, &old_index) in permutation.iter().enumerate() {
                new_index_of[old_index] = new_index;
            }
            for (pref, _) in self.entries.iter_mut() {
                if pref.group == group {
                    pref.index = new_index_of[pref.index];
                }
            }
        }
    }

    fn make_adjacent_offsets() -> Vec<[i64; D]> {
        let mut offsets = Vec::with_capacity(3usize.pow(D as u32) - 1);
        let mut current = [-1i64; D];
        loop {
            if current.iter().any(|&c| c != 0) {
                offsets.push(current);
            }
            let mut dim = 0;
            loop {
                if dim == D {
                    return offsets;
                }
                current[dim] += 1;
                if current[dim] > 1 {
                    current[dim] = -1;
                    dim += 1;
                } else {
                    break;
                }
            }
        }
    }

    fn cell_of(&self, position: [R; D]) -> [i64; D] {
        use num::ToPrimitive;
        std::array::from_fn(|i| (position[i] / self.cell_size).floor().to_i64().unwrap_or(0))
    }

    /// Rebuilds the grid from scratch given every particle's current
    /// position. `positions` need not be in any particular order.
    pub fn update(&mut self, positions: Vec<(ParticleRef, [R; D])>) {
        self.entries = positions;
        let n = self.entries.len();
        log::debug!("rebuilding grouped uniform grid with {n} particle(s), cell_size={:?}", self.cell_size);

        let cells: Vec<[i64; D]> = self.entries.iter().map(|(_, p)| self.cell_of(*p)).collect();

        let mut order: Vec<usize> = (0..n).collect();
        order.par_sort_unstable_by(|&a, &b| morton_cmp(&cells[a], &cells[b]));

        self.cell_of_sorted = order.iter().map(|&i| cells[i]).collect();
        self.sorted_to_raw = order;

        self.cells.clear();
        let mut start = 0;
        while start < n {
            let cell = self.cell_of_sorted[start];
            let mut end = start + 1;
            while end < n && self.cell_of_sorted[end] == cell {
                end += 1;
            }
            self.cells.push(CellRange {
                cell,
                range: start..end,
            });
            start = end;
        }
    }

    fn find_cell(&self, cell: [i64; D]) -> Option<&CellRange<D>> {
        self.cells
            .binary_search_by(|c| morton_cmp(&c.cell, &cell))
            .ok()
            .map(|i| &self.cells[i])
    }

    /// Invokes `callback(other, squared_distance)` for every particle within
    /// `radius` of `position` (excluding nothing — the caller filters out
    /// self-pairs if needed).
    pub fn neighbors_at(&self, position: [R; D], radius: R, mut callback: impl FnMut(ParticleRef, R)) {
        let radius_sq = radius * radius;
        let home = self.cell_of(position);
        let mut candidate_cells = Vec::with_capacity(self.adjacent_offsets.len() + 1);
        candidate_cells.push(home);
        for offset in &self.adjacent_offsets {
            let mut c = home;
            for d in 0..D {
                c[d] += offset[d];
            }
            candidate_cells.push(c);
        }
        for cell in candidate_cells {
            let Some(found) = self.find_cell(cell) else {
                continue;
            };
            for &raw in &self.sorted_to_raw[found.range.clone()] {
                let (pref, p) = self.entries[raw];
                let d = crate::tensor::sub(p, position);
                let dist_sq = crate::tensor::norm_squared(d);
                if dist_sq <= radius_sq {
                    callback(pref, dist_sq);
                }
            }
        }
    }

    /// Same as [`GroupedUniformGrid::neighbors_at`], but centered on a
    /// particle already present in the grid (and excludes that particle
    /// from its own neighbor set).
    pub fn neighbors_of(&self, of: ParticleRef, radius: R, mut callback: impl FnMut(ParticleRef, R)) {
        let Some((_, position)) = self.entries.iter().find(|(p, _)| *p == of).copied() else {
            return;
        };
        self.neighbors_at(position, radius, |other, dist_sq| {
            if other != of {
                callback(other, dist_sq);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pref(group: usize, index: usize) -> ParticleRef {
        ParticleRef {
            group: GroupIndex(group),
            index,
        }
    }

    #[test]
    fn unit_cube_eight_particles_find_seven_neighbors_within_1_74() {
        // Unit cube corners at {0,1}^3; diagonal length is sqrt(3) ~= 1.732.
        let mut grid = GroupedUniformGrid::<f64, 3>::new(1.0);
        let mut positions = Vec::new();
        let mut i = 0;
        for x in [0.0, 1.0] {
            for y in [0.0, 1.0] {
                for z in [0.0, 1.0] {
                    positions.push((pref(0, i), [x, y, z]));
                    i += 1;
                }
            }
        }
        grid.update(positions);

        let mut count = 0;
        grid.neighbors_of(pref(0, 0), 1.74, |_, _| count += 1);
        assert_eq!(count, 7);
    }

    #[test]
    fn query_outside_any_particle_finds_nothing() {
        let mut grid = GroupedUniformGrid::<f64, 2>::new(1.0);
        grid.update(vec![(pref(0, 0), [0.0, 0.0])]);
        let mut count = 0;
        grid.neighbors_at([100.0, 100.0], 1.0, |_, _| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn adjacent_offset_table_has_3_pow_d_minus_one_entries() {
        let grid = GroupedUniformGrid::<f64, 3>::new(1.0);
        assert_eq!(grid.adjacent_offsets.len(), 26);
        let grid2 = GroupedUniformGrid::<f64, 2>::new(1.0);
        assert_eq!(grid2.adjacent_offsets.len(), 8);
    }

    #[test]
    fn set_radius_changes_cell_size() {
        let mut grid = GroupedUniformGrid::<f64, 3>::new(1.0);
        grid.set_radius(2.5);
        assert_eq!(grid.cell_size(), 2.5);
    }

    #[test]
    fn load_skips_groups_tagged_cannot_be_neighbor() {
        use crate::data::model::Model;
        use crate::data::shape::Shape;

        let mut model = Model::new();
        let visible = model.add_group("fluid", "particle").unwrap();
        model
            .get_group_mut(visible)
            .unwrap()
            .add_varying::<f64, 3>("position", Shape::new(vec![3]))
            .unwrap();
        model.get_group_mut(visible).unwrap().create(2);

        let hidden = model.add_group("boundary", "particle").unwrap();
        model
            .get_group_mut(hidden)
            .unwrap()
            .add_varying::<f64, 3>("position", Shape::new(vec![3]))
            .unwrap();
        model.get_group_mut(hidden).unwrap().create(5);
        model.get_group_mut(hidden).unwrap().add_tag("cannot_be_neighbor");

        let mut grid = GroupedUniformGrid::<f64, 3>::new(1.0);
        grid.load(&model);
        assert_eq!(grid.entries.len(), 2);
        assert!(grid.entries.iter().all(|(pref, _)| pref.group == visible));
    }

    #[test]
    fn permute_reorders_group_storage_to_match_grid_order() {
        use crate::data::model::Model;
        use crate::data::shape::Shape;

        let mut model = Model::new();
        let group = model.add_group("fluid", "particle").unwrap();
        model
            .get_group_mut(group)
            .unwrap()
            .add_varying::<f64, 3>("position", Shape::new(vec![3]))
            .unwrap();
        model
            .get_group_mut(group)
            .unwrap()
            .add_varying::<f64, 1>("id", Shape::scalar())
            .unwrap();
        model.get_group_mut(group).unwrap().create(3);
        let positions = [[5.0, 0.0, 0.0], [0.0, 0.0, 0.0], [2.5, 0.0, 0.0]];
        {
            let g = model.get_group_mut(group).unwrap();
            g.varying_mut()
                .try_get_mut::<f64, 3>("position")
                .unwrap()
                .as_mut_slice()
                .copy_from_slice(&positions);
            let ids = g.varying_mut().try_get_mut::<f64, 1>("id").unwrap();
            for (i, v) in ids.as_mut_slice().iter_mut().enumerate() {
                v[0] = i as f64;
            }
        }

        let mut grid = GroupedUniformGrid::<f64, 3>::new(1.0);
        grid.load(&model);
        grid.permute(&mut model);

        let ids = model
            .get_group(group)
            .unwrap()
            .varying()
            .try_get::<f64, 1>("id")
            .unwrap();
        let new_positions = model
            .get_group(group)
            .unwrap()
            .varying()
            .try_get::<f64, 3>("position")
            .unwrap();
        for (slot, id) in ids.as_slice().iter().enumerate() {
            let original_index = id[0] as usize;
            assert_eq!(new_positions.as_slice()[slot], positions[original_index]);
        }

        let mut found_all = vec![false; 3];
        grid.neighbors_at([0.0, 0.0, 0.0], 10.0, |pref, _| found_all[pref.index] = true);
        assert!(found_all.iter().all(|&f| f));
    }
}
