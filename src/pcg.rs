//! Preconditioned conjugate gradient solver for per-particle linear systems
//! (spec.md §4.4).
//!
//! Ported from `original_source/src/prtcl/solver/cg_openmp.hpp`. The
//! operator, right-hand side, preconditioner and initial guess are supplied
//! as closures reading positions/cached scheme parameters and writing into
//! mutable out-arrays (spec.md §9 "linear-system interface closures" design
//! note), so this module has no dependency on the data model or DSL at all.
//! Parallel loops use `rayon`, replacing the original's `#pragma omp for`.

use rayon::prelude::*;

use crate::tensor::Real;

/// Tunables for [`solve`], defaulting to the original's `tol=1e-2,
/// max_k=100`.
#[derive(Debug, Clone, Copy)]
pub struct Tolerances<R> {
    pub tolerance: R,
    pub min_iterations: usize,
    pub max_iterations: usize,
}

impl<R: Real> Default for Tolerances<R> {
    fn default() -> Self {
        Tolerances {
            tolerance: R::from_f64(1e-2).unwrap(),
            min_iterations: 1,
            max_iterations: 100,
        }
    }
}

/// Solves `system(x) = rhs` for `x`, one scalar unknown per particle, via
/// preconditioned conjugate gradients.
///
/// - `count`: number of unknowns (particles in the solved group).
/// - `rhs`: fills `out[i]` with particle `i`'s right-hand-side value.
/// - `guess`: fills `out[i]` with particle `i`'s initial guess for `x`.
/// - `system`: applies the linear operator, `out[i] = (A * x)[i]`.
/// - `precond`: applies the preconditioner, `out[i] = (M^-1 * r)[i]`.
/// - `apply`: called once at the end with the converged `x`, to write it
///   back into the caller's data (e.g. a pressure field).
///
/// Returns the number of iterations performed. A breakdown (a vanishing
/// denominator) is not an error: the solver stops and returns its best
/// iterate so far, exactly as the original does.
pub fn solve<R: Real>(
    count: usize,
    rhs: impl Fn(&mut [R]),
    guess: impl Fn(&mut [R]),
    system: impl Fn(&[R], &mut [R]) + Sync,
    precond: impl Fn(&[R], &mut [R]) + Sync,
    apply: impl Fn(&[R]),
    tolerances: Tolerances<R>,
) -> usize {
    if count == 0 {
        return 0;
    }

    let mut x = vec![R::zero(); count];
    let mut b = vec![R::zero(); count];
    let mut r = vec![R::zero(); count];
    let mut p = vec![R::zero(); count];
    let mut q = vec![R::zero(); count];
    let mut y = vec![R::zero(); count];

    guess(&mut x);
    rhs(&mut b);

    system(&x, &mut r);
    par_axpy_inplace(&mut r, -R::one(), &b); // r = A*x - b

    let b_nsq = par_norm_squared(&b);
    let smallest_positive = R::default_epsilon();
    let threshold = num::Float::max(tolerances.tolerance * tolerances.tolerance * b_nsq, smallest_positive);

    precond(&r, &mut y);
    par_scale_into(&mut p, &y, -R::one());
    let mut prev_r_dot_y = par_dot(&r, &y);

    let mut k = 0usize;
    let mut r_nsq = par_norm_squared(&r);
    while !converged(k, r_nsq, threshold, tolerances.min_iterations, tolerances.max_iterations) {
        system(&p, &mut q);
        let p_dot_q = par_dot(&p, &q);
        if num::Float::abs(p_dot_q) < tolerances.tolerance {
            break;
        }
        let alpha = prev_r_dot_y / p_dot_q;
        par_axpy_inplace(&mut x, alpha, &p);
        par_axpy_inplace(&mut r, alpha, &q);
        r_nsq = par_norm_squared(&r);

        precond(&r, &mut y);
        let next_r_dot_y = par_dot(&r, &y);
        if num::Float::abs(prev_r_dot_y) < tolerances.tolerance {
            break;
        }
        let beta = next_r_dot_y / prev_r_dot_y;
        for i in 0..count {
            p[i] = -y[i] + beta * p[i];
        }
        prev_r_dot_y = next_r_dot_y;
        k += 1;
    }

    apply(&x);
    log::debug!("pcg converged after {k} iteration(s), residual^2={:?}", r_nsq);
    k
}

pub(crate) fn converged<R: Real>(k: usize, r_nsq: R, threshold: R, min_k: usize, max_k: usize) -> bool {
    if k < min_k {
        false
    } else if k > max_k {
        true
    } else {
        r_nsq < threshold
    }
}

pub(crate) fn par_dot<R: Real>(a: &[R], b: &[R]) -> R {
    a.par_iter()
        .zip(b.par_iter())
        .map(|(&x, &y)| x * y)
        .reduce(R::zero, |a, b| a + b)
}

pub(crate) fn par_norm_squared<R: Real>(a: &[R]) -> R {
    par_dot(a, a)
}

pub(crate) fn par_axpy_inplace<R: Real>(y: &mut [R], alpha: R, x: &[R]) {
    y.par_iter_mut().zip(x.par_iter()).for_each(|(yi, &xi)| {
        *yi += alpha * xi;
    });
}

pub(crate) fn par_scale_into<R: Real>(out: &mut [R], x: &[R], alpha: R) {
    out.par_iter_mut().zip(x.par_iter()).for_each(|(o, &xi)| {
        *o = alpha * xi;
    });
}
