//! Fixed-shape small tensor algebra (spec.md §3/§4.1).
//!
//! A particle-field "tensor" of shape `Shape` and component type `T` is
//! represented as a flat, row-major `[T; N]` where `N` is the shape's
//! component count known at compile time (scalar = 1, a 3-vector = 3, a
//! row-major 3x3 matrix = 9, ...). This plays the same role as the
//! original's `math::Tensor<T, N...>` non-type-template-parameter pack
//! without requiring const-generic variadics Rust doesn't have; the
//! [`crate::data::tensor_type::TensorType`] that tags a field still carries
//! the full runtime `Shape` (rank + every extent) for the type-erased
//! boundary.
//!
//! Operations that need genuine linear algebra (inversion, rotation,
//! symmetric solves) go through `nalgebra`'s fixed-size `Matrix2`/`Matrix3`,
//! exactly as the teacher crate uses `nalgebra::Vector3` for particle
//! positions.

use nalgebra::{Matrix2, Matrix3, Rotation3, Unit, Vector2, Vector3};

/// Marker trait for the floating point component types tensors operate on.
///
/// Mirrors the teacher's `Real` trait (re-exported from `numeric_types` in
/// `splashsurf_lib`): a small, closed set of blanket-implemented floats.
pub trait Real: nalgebra::RealField + num::ToPrimitive + Copy + Send + Sync + 'static {}
impl Real for f32 {}
impl Real for f64 {}

/// Returns `1/value`, or zero if `|value| < epsilon`.
///
/// Generated scheme code must use this instead of unchecked division
/// whenever a denominator can be structurally zero (e.g. inverse distance
/// between coincident particles) — spec.md §4.1.
pub fn reciprocal_or_zero<R: Real>(value: R, epsilon: R) -> R {
    if num::Float::abs(value) < epsilon {
        R::zero()
    } else {
        R::one() / value
    }
}

/// A tensor of zero components.
pub fn zeros<const N: usize, R: Real>() -> [R; N] {
    [R::zero(); N]
}

pub fn add<const N: usize, R: Real>(a: [R; N], b: [R; N]) -> [R; N] {
    std::array::from_fn(|i| a[i] + b[i])
}

pub fn sub<const N: usize, R: Real>(a: [R; N], b: [R; N]) -> [R; N] {
    std::array::from_fn(|i| a[i] - b[i])
}

/// Componentwise (Hadamard) product.
pub fn cmul<const N: usize, R: Real>(a: [R; N], b: [R; N]) -> [R; N] {
    std::array::from_fn(|i| a[i] * b[i])
}

pub fn scale<const N: usize, R: Real>(a: [R; N], s: R) -> [R; N] {
    std::array::from_fn(|i| a[i] * s)
}

pub fn cmin<const N: usize, R: Real>(a: [R; N], b: [R; N]) -> [R; N] {
    std::array::from_fn(|i| num::Float::min(a[i], b[i]))
}

pub fn cmax<const N: usize, R: Real>(a: [R; N], b: [R; N]) -> [R; N] {
    std::array::from_fn(|i| num::Float::max(a[i], b[i]))
}

pub fn sum<const N: usize, R: Real>(a: [R; N]) -> R {
    a.iter().fold(R::zero(), |acc, &x| acc + x)
}

pub fn norm_squared<const N: usize, R: Real>(a: [R; N]) -> R {
    sum(cmul(a, a))
}

pub fn norm<const N: usize, R: Real>(a: [R; N]) -> R {
    num::Float::sqrt(norm_squared(a))
}

/// Normalizes `a`, returning `a` unchanged if its norm is (numerically)
/// zero, following the same "don't divide by structural zero" discipline
/// as [`reciprocal_or_zero`].
pub fn normalized<const N: usize, R: Real>(a: [R; N]) -> [R; N] {
    let n = norm(a);
    let r = reciprocal_or_zero(n, R::default_epsilon());
    scale(a, r)
}

// --- rank-1, N=2/3 specific: dot, cross, outer ---------------------------

pub fn dot2<R: Real>(a: [R; 2], b: [R; 2]) -> R {
    Vector2::from(a).dot(&Vector2::from(b))
}

pub fn dot3<R: Real>(a: [R; 3], b: [R; 3]) -> R {
    Vector3::from(a).dot(&Vector3::from(b))
}

/// Cross product, defined only for 3-vectors.
pub fn cross3<R: Real>(a: [R; 3], b: [R; 3]) -> [R; 3] {
    Vector3::from(a).cross(&Vector3::from(b)).into()
}

/// Outer product `a ⊗ b`, row-major.
pub fn outer3<R: Real>(a: [R; 3], b: [R; 3]) -> [R; 9] {
    let m = Vector3::from(a) * Vector3::from(b).transpose();
    mat3_to_array(m)
}

// --- rank-2 conversions ----------------------------------------------------

fn mat2_from_array<R: Real>(m: [R; 4]) -> Matrix2<R> {
    Matrix2::new(m[0], m[1], m[2], m[3])
}

fn mat2_to_array<R: Real>(m: Matrix2<R>) -> [R; 4] {
    [m[(0, 0)], m[(0, 1)], m[(1, 0)], m[(1, 1)]]
}

fn mat3_from_array<R: Real>(m: [R; 9]) -> Matrix3<R> {
    Matrix3::from_row_slice(&m)
}

fn mat3_to_array<R: Real>(m: Matrix3<R>) -> [R; 9] {
    std::array::from_fn(|i| m[(i / 3, i % 3)])
}

pub fn identity2<R: Real>() -> [R; 4] {
    mat2_to_array(Matrix2::identity())
}

pub fn identity3<R: Real>() -> [R; 9] {
    mat3_to_array(Matrix3::identity())
}

pub fn transpose2<R: Real>(m: [R; 4]) -> [R; 4] {
    mat2_to_array(mat2_from_array(m).transpose())
}

pub fn transpose3<R: Real>(m: [R; 9]) -> [R; 9] {
    mat3_to_array(mat3_from_array(m).transpose())
}

/// Matrix inverse, or `None` if the matrix is (numerically) singular.
pub fn invert2<R: Real>(m: [R; 4]) -> Option<[R; 4]> {
    mat2_from_array(m)
        .try_inverse()
        .map(mat2_to_array)
}

/// Matrix inverse, or `None` if the matrix is (numerically) singular.
pub fn invert3<R: Real>(m: [R; 9]) -> Option<[R; 9]> {
    mat3_from_array(m)
        .try_inverse()
        .map(mat3_to_array)
}

pub fn matvec2<R: Real>(m: [R; 4], v: [R; 2]) -> [R; 2] {
    (mat2_from_array(m) * Vector2::from(v)).into()
}

pub fn matvec3<R: Real>(m: [R; 9], v: [R; 3]) -> [R; 3] {
    (mat3_from_array(m) * Vector3::from(v)).into()
}

/// Solves the 2x2 symmetric positive-definite system `A x = b`.
///
/// Required by §4.1 for surface sampling. `A` is given as `[a00, a01, a01,
/// a11]` (row-major; off-diagonal entries must already agree). Uses a
/// direct closed form rather than a general solver since the system is
/// fixed-size and always has exactly one solution when `A` is SPD.
pub fn solve_sd2<R: Real>(a: [R; 4], b: [R; 2]) -> [R; 2] {
    let det = a[0] * a[3] - a[1] * a[2];
    let inv_det = reciprocal_or_zero(det, R::default_epsilon());
    [
        (a[3] * b[0] - a[1] * b[1]) * inv_det,
        (a[0] * b[1] - a[2] * b[0]) * inv_det,
    ]
}

/// The rotation matrix for a rotation of `angle` radians about `axis`
/// (right-hand rule). Required by the PT16 scheme's tensor algebra
/// (spec.md §4.1); `axis` need not be normalized.
pub fn rotation_matrix3<R: Real>(angle: R, axis: [R; 3]) -> [R; 9] {
    let axis = Unit::new_normalize(Vector3::from(axis));
    mat3_to_array(Rotation3::from_axis_angle(&axis, angle).into_inner())
}

/// The cross-product ("hat"/antisymmetric) matrix of `v`, such that
/// `hat3(v) * w == cross3(v, w)` for all `w`.
pub fn hat3<R: Real>(v: [R; 3]) -> [R; 9] {
    let z = R::zero();
    [z, -v[2], v[1], v[2], z, -v[0], -v[1], v[0], z]
}

/// Recovers the vector `v` from its antisymmetric matrix `hat3(v)`.
///
/// Undefined (returns the average of the two off-diagonal readings) if `m`
/// is not antisymmetric; callers are expected to only pass matrices
/// produced by [`hat3`] or close to it.
pub fn hat_inv3<R: Real>(m: [R; 9]) -> [R; 3] {
    let half = R::from_f64(0.5).unwrap_or_else(R::one);
    [
        (m[7] - m[5]) * half,
        (m[2] - m[6]) * half,
        (m[3] - m[1]) * half,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reciprocal_or_zero_guards_small_denominators() {
        assert_eq!(reciprocal_or_zero(0.0_f64, 1e-9), 0.0);
        assert!((reciprocal_or_zero(2.0_f64, 1e-9) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn cross_is_orthogonal_to_operands() {
        let a = [1.0_f64, 0.0, 0.0];
        let b = [0.0_f64, 1.0, 0.0];
        let c = cross3(a, b);
        assert!((dot3(c, a)).abs() < 1e-12);
        assert!((dot3(c, b)).abs() < 1e-12);
        assert!((c[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn invert3_round_trips_identity() {
        let id = identity3::<f64>();
        let inv = invert3(id).unwrap();
        assert_eq!(inv, id);
    }

    #[test]
    fn hat_and_hat_inv_round_trip() {
        let v = [1.0_f64, -2.0, 3.0];
        let m = hat3(v);
        let back = hat_inv3(m);
        for i in 0..3 {
            assert!((v[i] - back[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn solve_sd2_matches_direct_inverse() {
        // A = [[4,1],[1,3]], b = [1,2] -> x = 1/11 * [1, 7]
        let a = [4.0_f64, 1.0, 1.0, 3.0];
        let b = [1.0_f64, 2.0];
        let x = solve_sd2(a, b);
        assert!((x[0] - 1.0 / 11.0).abs() < 1e-12);
        assert!((x[1] - 7.0 / 11.0).abs() < 1e-12);
    }

    #[test]
    fn normalized_handles_zero_vector() {
        let z = [0.0_f64, 0.0, 0.0];
        assert_eq!(normalized(z), z);
    }
}
