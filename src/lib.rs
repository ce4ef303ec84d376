//!
//! A particle-method simulation engine: the `.prtcl` domain-specific
//! language (parser, AST, compile prepass), a type-erased particle data
//! model (tensors, fields, groups, model), and the neighborhood-search,
//! scheduling and PCG-solver runtime that SPH schemes run against. Entry
//! points are [`dsl::compile::compile`] to lower a parsed `.prtcl` program
//! and [`dsl::compile::CompiledScheme::run_procedure`]/[`scheme::Scheme::run_procedure`]
//! to run it.
//!

/// Re-export the version of nalgebra used by this crate
pub use nalgebra;

pub mod archive;
pub mod data;
/// The `.prtcl` domain-specific language: AST, parser, and the compile
/// prepass
pub mod dsl;
/// Error types shared across the data model, the DSL and the scheme runtime
pub mod errors;
/// A grouped uniform grid for fixed-radius neighbor queries
pub mod grid;
/// Preconditioned conjugate gradient solver for the linear systems a
/// `solve` block compiles to
pub mod pcg;
/// The `Scheme` trait and its registry
pub mod scheme;
/// Virtual-time scheduler for reschedulable callbacks (particle sources,
/// periodic output, ...)
pub mod scheduler;
/// Disc-shaped HCP-lattice particle source
pub mod sources;
/// Pinhole camera and sphere tracer for visualizing a particle set
pub mod sphere_tracer;
/// Fixed-shape small tensor algebra
pub mod tensor;

pub use archive::{ArchiveReader, ArchiveWriter, NativeBinaryArchiveReader, NativeBinaryArchiveWriter};
pub use data::group::{Group, GroupIndex};
pub use data::model::Model;
pub use dsl::compile::{compile, CompiledScheme};
pub use errors::{DataError, ParseError, SchemeError, Span};
pub use grid::{GroupedUniformGrid, ParticleRef};
pub use scheduler::{CallbackReturn, Scheduler, VirtualTime};
pub use scheme::{registry::SchemeRegistry, Scheme};
pub use tensor::Real;

/// The hasher this crate uses for its internal maps, following the teacher
/// crate's choice of `fxhash` over `std`'s default SipHash: field and group
/// names are short, trusted, in-process keys, not attacker-controlled input,
/// so there's no need to pay for DoS-resistant hashing.
pub(crate) type HashState = fxhash::FxBuildHasher;
pub(crate) type MapType<V> = std::collections::HashMap<String, V, HashState>;

pub(crate) fn new_map<V>() -> MapType<V> {
    MapType::with_hasher(HashState::default())
}
