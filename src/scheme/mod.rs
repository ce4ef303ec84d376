//! The `Scheme` trait: a compiled or hand-written procedure set that runs
//! against a [`crate::data::model::Model`] and a neighborhood (spec.md
//! §4.5).
//!
//! Ported from `original_source/src/prtcl/schemes/scheme_base.hpp`. The
//! original's `SchemeBase::RegisterProcedure` stores a free function pointer
//! rather than a closure specifically so scheme objects stay copyable; this
//! port keeps procedures as plain methods dispatched through
//! [`Scheme::run_procedure`] by name instead, since Rust trait objects don't
//! need the same function-pointer indirection to stay `Send`.

pub mod registry;

use crate::data::model::Model;
use crate::errors::SchemeError;
use crate::grid::GroupedUniformGrid;
use crate::tensor::Real;

/// A runnable particle scheme: loads its field references from a model once,
/// then runs named procedures against a neighborhood.
pub trait Scheme<R: Real, const D: usize>: Send + Sync {
    /// The scheme's name, as referenced from `.prtcl` source and the
    /// registry (e.g. `"sesph"`).
    fn name(&self) -> &str;

    /// Re-resolves every field reference this scheme needs against `model`.
    /// Must be called again whenever the model's groups or fields change.
    fn load(&mut self, model: &Model) -> Result<(), SchemeError>;

    /// Runs the named procedure.
    fn run_procedure(
        &mut self,
        name: &str,
        model: &mut Model,
        neighborhood: &GroupedUniformGrid<R, D>,
    ) -> Result<(), SchemeError>;

    /// The procedure names this scheme exposes, in registration order.
    fn procedure_names(&self) -> &[String];
}
