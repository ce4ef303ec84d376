//! A pinhole camera and sphere tracer for visualizing a particle set as
//! implicit spheres, independent of the marching-cubes surface
//! reconstruction this crate deliberately does not implement (spec.md
//! §4.9, a Non-goal for mesh extraction but not for this lightweight
//! auxiliary viewer).
//!
//! Ported from `original_source/src/prtcl/{geometry/pinhole_camera,
//! util/sphere_tracer}.hpp`.

use crate::grid::{GroupedUniformGrid, ParticleRef};
use crate::tensor::{add, cross3, normalized, scale};

/// A simple pinhole camera producing view rays for a `width x height` image
/// plane.
#[derive(Debug, Clone, Copy)]
pub struct PinholeCamera {
    pub position: [f64; 3],
    pub forward: [f64; 3],
    pub up: [f64; 3],
    pub fov_y_radians: f64,
}

impl PinholeCamera {
    /// Builds the ray through normalized image-plane coordinates `u, v in
    /// [-1, 1]` (`(0, 0)` is the image center).
    pub fn ray(&self, u: f64, v: f64) -> ([f64; 3], [f64; 3]) {
        let forward = normalized(self.forward);
        let right = normalized(cross3(forward, self.up));
        let up = cross3(right, forward);
        let tan_half_fov = (self.fov_y_radians / 2.0).tan();
        let direction = normalized(add(
            add(forward, scale(right, u * tan_half_fov)),
            scale(up, v * tan_half_fov),
        ));
        (self.position, direction)
    }

    /// Builds the ray through a pixel of a `width x height` image, with
    /// `(0, 0)` at the top-left corner.
    pub fn ray_for_pixel(&self, x: u32, y: u32, width: u32, height: u32) -> ([f64; 3], [f64; 3]) {
        let aspect = width as f64 / height as f64;
        let u = (2.0 * (x as f64 + 0.5) / width as f64 - 1.0) * aspect;
        let v = 1.0 - 2.0 * (y as f64 + 0.5) / height as f64;
        self.ray(u, v)
    }
}

/// A hit against one particle's implicit sphere.
#[derive(Debug, Clone, Copy)]
pub struct Hit {
    pub particle: ParticleRef,
    pub position: [f64; 3],
    pub distance: f64,
}

/// Sphere-traces rays against a particle set, treating every particle as a
/// sphere of `particle_radius`.
pub struct SphereTracer<'a> {
    grid: &'a GroupedUniformGrid<f64, 3>,
    particle_radius: f64,
    max_steps: usize,
    max_distance: f64,
    epsilon: f64,
}

impl<'a> SphereTracer<'a> {
    pub fn new(grid: &'a GroupedUniformGrid<f64, 3>, particle_radius: f64, max_distance: f64) -> Self {
        SphereTracer {
            grid,
            particle_radius,
            max_steps: 256,
            max_distance,
            epsilon: particle_radius * 1e-3,
        }
    }

    /// March along the ray until within `epsilon` of some particle's
    /// surface, or `max_distance` is exceeded.
    pub fn trace(&self, origin: [f64; 3], direction: [f64; 3]) -> Option<Hit> {
        let search_radius = self.grid.cell_size();
        let mut t = 0.0_f64;
        for _ in 0..self.max_steps {
            let p = add(origin, scale(direction, t));

            let mut nearest_surface_distance = f64::INFINITY;
            let mut nearest_particle = None;
            self.grid.neighbors_at(p, search_radius, |particle, dist_sq| {
                let surface_distance = dist_sq.sqrt() - self.particle_radius;
                if surface_distance < nearest_surface_distance {
                    nearest_surface_distance = surface_distance;
                    nearest_particle = Some(particle);
                }
            });

            if let Some(particle) = nearest_particle {
                if nearest_surface_distance < self.epsilon {
                    return Some(Hit {
                        particle,
                        position: p,
                        distance: t,
                    });
                }
                t += nearest_surface_distance.max(self.epsilon);
            } else {
                t += search_radius;
            }

            if t > self.max_distance {
                return None;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::group::GroupIndex;

    #[test]
    fn camera_forward_ray_points_along_forward_axis() {
        let camera = PinholeCamera {
            position: [0.0, 0.0, 0.0],
            forward: [0.0, 0.0, -1.0],
            up: [0.0, 1.0, 0.0],
            fov_y_radians: std::f64::consts::FRAC_PI_2,
        };
        let (origin, direction) = camera.ray(0.0, 0.0);
        assert_eq!(origin, [0.0, 0.0, 0.0]);
        assert!((direction[2] - (-1.0)).abs() < 1e-9);
    }

    #[test]
    fn trace_hits_a_single_particle_head_on() {
        let mut grid = GroupedUniformGrid::<f64, 3>::new(1.0);
        grid.update(vec![(
            ParticleRef {
                group: GroupIndex(0),
                index: 0,
            },
            [0.0, 0.0, 5.0],
        )]);
        let tracer = SphereTracer::new(&grid, 0.1, 100.0);
        let hit = tracer.trace([0.0, 0.0, 0.0], [0.0, 0.0, 1.0]).expect("should hit");
        assert!((hit.distance - 4.9).abs() < 0.05);
    }

    #[test]
    fn trace_misses_empty_space() {
        let mut grid = GroupedUniformGrid::<f64, 3>::new(1.0);
        grid.update(vec![(
            ParticleRef {
                group: GroupIndex(0),
                index: 0,
            },
            [100.0, 100.0, 100.0],
        )]);
        let tracer = SphereTracer::new(&grid, 0.1, 10.0);
        assert!(tracer.trace([0.0, 0.0, 0.0], [0.0, 0.0, 1.0]).is_none());
    }
}
