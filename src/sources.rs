//! A disc-shaped particle source that emits hexagonal-close-packed layers of
//! particles over virtual time (spec.md §4.8).
//!
//! Ported from `original_source/src/prtcl/util/hcp_lattice_source.hpp`. The
//! original leaves the actual per-particle field initialization (position,
//! velocity, mass, time of birth) as commented-out TODO blocks; this
//! completes them, since a source that creates particles without
//! initializing their physical fields isn't useful to any scheme (spec.md
//! §9 "supplement dropped features").

use itertools::iproduct;

use crate::data::group::GroupIndex;
use crate::data::model::Model;
use crate::data::shape::Shape;
use crate::errors::DataError;
use crate::scheduler::{CallbackReturn, VirtualTime};
use crate::tensor;

/// Emits HCP-lattice layers of particles, perpendicular to `velocity`,
/// clipped to a disc of `radius`, until `remaining` particles have been
/// created.
pub struct HcpLatticeSource {
    group: GroupIndex,
    position: [f64; 3],
    velocity: [f64; 3],
    radius: f64,
    remaining: usize,
    age: u64,
    rest_density: f64,
    smoothing_scale: f64,
    layer_height: f64,
    regular_spawn_interval: VirtualTime,
}

impl HcpLatticeSource {
    /// `rest_density` and the model's global `smoothing_scale` field
    /// determine each new particle's mass (`h^3 * rest_density` in 3D).
    pub fn new(
        model: &Model,
        group: GroupIndex,
        position: [f64; 3],
        velocity: [f64; 3],
        radius: f64,
        remaining: usize,
        rest_density: f64,
    ) -> Result<Self, DataError> {
        let smoothing_scale = model
            .global()
            .try_get::<f64, 1>("smoothing_scale")
            .map(|f| f.get()[0])
            .ok_or_else(|| DataError::NotImplemented("model has no global smoothing_scale field".to_string()))?;

        let speed = tensor::norm(velocity);
        if speed <= 0.0 {
            return Err(DataError::NotImplemented(
                "HCP lattice source requires a nonzero velocity to orient its emission plane".to_string(),
            ));
        }
        let layer_height = (6.0_f64).sqrt() * smoothing_scale / 3.0;
        let regular_spawn_interval_secs = layer_height / speed;

        Ok(HcpLatticeSource {
            group,
            position,
            velocity,
            radius,
            remaining,
            age: 0,
            rest_density,
            smoothing_scale,
            layer_height,
            regular_spawn_interval: VirtualTime::from_secs_f64(regular_spawn_interval_secs.max(0.0)),
        })
    }

    fn orientation(&self) -> ([f64; 3], [f64; 3], [f64; 3]) {
        let orientation = tensor::normalized(self.velocity);
        // Threshold from the original: pick a reference axis that is not
        // nearly parallel to `orientation`.
        let threshold = (1.0 + 1.0 / 3.0_f64.sqrt()) / 2.0;
        let candidate = if tensor::dot3(orientation, [1.0, 0.0, 0.0]).abs() < threshold {
            [1.0, 0.0, 0.0]
        } else {
            [0.0, 1.0, 0.0]
        };
        let d1 = tensor::normalized(tensor::cross3(orientation, candidate));
        let d2 = tensor::normalized(tensor::cross3(orientation, d1));
        (orientation, d1, d2)
    }

    /// Emits one layer (if `remaining > 0`), returning the scheduler
    /// callback result: reschedule for the next layer, or stop.
    pub fn emit(&mut self, model: &mut Model, delay: VirtualTime) -> CallbackReturn {
        if self.remaining == 0 {
            return CallbackReturn::DoNothing;
        }

        let (orientation, d1, d2) = self.orientation();
        let spacing = self.smoothing_scale;
        // Hexagonal-close-packed offset: odd layers are shifted by half a
        // lattice spacing in both in-plane directions.
        let parity = if self.age % 2 == 1 { 0.5 } else { 0.0 };
        let layer_offset = tensor::scale(orientation, self.layer_height * self.age as f64);

        let half_extent = (self.radius / spacing).floor() as i64 + 1;
        let mut positions = Vec::new();
        for (row, col) in iproduct!(-half_extent..=half_extent, -half_extent..=half_extent) {
            if positions.len() >= self.remaining {
                break;
            }
            let u = (row as f64 + parity) * spacing;
            let v = (col as f64 + parity) * spacing;
            if u * u + v * v > self.radius * self.radius {
                continue;
            }
            let offset = tensor::add(tensor::scale(d1, u), tensor::scale(d2, v));
            let offset = tensor::add(offset, layer_offset);
            positions.push(tensor::add(self.position, offset));
        }
        positions.truncate(self.remaining);
        let count = positions.len();
        if count == 0 {
            self.age += 1;
            return CallbackReturn::RescheduleAfter(self.regular_spawn_interval);
        }

        let group = model.get_group_mut(self.group).expect("source group must exist");
        group.add_varying::<f64, 3>("position", Shape::new(vec![3])).ok();
        group.add_varying::<f64, 3>("velocity", Shape::new(vec![3])).ok();
        group.add_varying::<f64, 1>("mass", Shape::scalar()).ok();
        group.add_varying::<f64, 1>("time_of_birth", Shape::scalar()).ok();

        let range = group.create(count);
        let mass = self.smoothing_scale.powi(3) * self.rest_density;
        let birth_time = self.age as f64 * self.regular_spawn_interval.as_secs_f64() + delay.as_secs_f64();

        {
            let field = group.varying_mut().try_get_mut::<f64, 3>("position").unwrap();
            for (i, item) in range.clone().enumerate() {
                field.as_mut_slice()[item] = positions[i];
            }
        }
        {
            let field = group.varying_mut().try_get_mut::<f64, 3>("velocity").unwrap();
            for item in range.clone() {
                field.as_mut_slice()[item] = self.velocity;
            }
        }
        {
            let field = group.varying_mut().try_get_mut::<f64, 1>("mass").unwrap();
            for item in range.clone() {
                field.as_mut_slice()[item] = [mass];
            }
        }
        {
            let field = group.varying_mut().try_get_mut::<f64, 1>("time_of_birth").unwrap();
            for item in range {
                field.as_mut_slice()[item] = [birth_time];
            }
        }

        self.remaining -= count;
        self.age += 1;
        log::info!(
            "emitted {} particle(s) from HCP lattice source (layer {}, {} remaining)",
            count,
            self.age,
            self.remaining
        );

        if self.remaining > 0 {
            CallbackReturn::RescheduleAfter(self.regular_spawn_interval)
        } else {
            CallbackReturn::DoNothing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_with_h(h: f64) -> Model {
        let mut model = Model::new();
        model.add_global::<f64, 1>("smoothing_scale", Shape::scalar()).unwrap();
        model
            .global_mut()
            .try_get_mut::<f64, 1>("smoothing_scale")
            .unwrap()
            .set([h]);
        model
    }

    #[test]
    fn errors_without_a_smoothing_scale_global() {
        let model = Model::new();
        let err = HcpLatticeSource::new(
            &model,
            GroupIndex(0),
            [0.0, 0.0, 0.0],
            [0.0, 0.0, 1.0],
            1.0,
            10,
            1000.0,
        )
        .unwrap_err();
        assert!(matches!(err, DataError::NotImplemented(_)));
    }

    #[test]
    fn emits_until_remaining_particles_are_created() {
        let mut model = model_with_h(0.1);
        let group = model.add_group("water", "fluid").unwrap();
        let mut source =
            HcpLatticeSource::new(&model, group, [0.0, 0.0, 0.0], [0.0, 0.0, 1.0], 0.3, 25, 1000.0).unwrap();

        let mut guard = 0;
        loop {
            let result = source.emit(&mut model, VirtualTime::ZERO);
            guard += 1;
            assert!(guard < 10_000, "emitter never drained `remaining`");
            if matches!(result, CallbackReturn::DoNothing) {
                break;
            }
        }
        assert_eq!(model.get_group(group).unwrap().item_count(), 25);
    }
}
