//! A process-wide registry of scheme constructors, keyed by name (spec.md
//! §4.5).
//!
//! Ported from `original_source/src/prtcl/schemes/scheme_base.hpp`'s
//! `SchemeRegistry`/`SchemeRegistration`. The original is a singleton
//! populated by static-initialization side effects (each scheme's
//! translation unit runs a `SchemeRegistration<Scheme>` constructor before
//! `main`); this port drops that trick in favor of an explicit, owned
//! registry the caller constructs and populates — there is no equivalent to
//! C++ static init order in Rust, and an explicit registry is the idiomatic
//! substitute.

use crate::errors::SchemeError;
use crate::scheme::Scheme;
use crate::tensor::Real;

type SchemeCtor<R, const D: usize> = Box<dyn Fn() -> Box<dyn Scheme<R, D>> + Send + Sync>;

/// Maps scheme names to constructors, so a `.prtcl` program's `scheme ...
/// : name { ... }` declaration can be resolved to a concrete implementation
/// at compile (lowering) time.
pub struct SchemeRegistry<R: Real, const D: usize> {
    constructors: crate::MapType<SchemeCtor<R, D>>,
}

impl<R: Real, const D: usize> Default for SchemeRegistry<R, D> {
    fn default() -> Self {
        SchemeRegistry {
            constructors: crate::new_map(),
        }
    }
}

impl<R: Real, const D: usize> SchemeRegistry<R, D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        ctor: impl Fn() -> Box<dyn Scheme<R, D>> + Send + Sync + 'static,
    ) {
        self.constructors.insert(name.into(), Box::new(ctor));
    }

    pub fn instantiate(&self, name: &str) -> Result<Box<dyn Scheme<R, D>>, SchemeError> {
        self.constructors
            .get(name)
            .map(|ctor| ctor())
            .ok_or_else(|| SchemeError::SchemeNotRegistered(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(|s| s.as_str())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Model;
    use crate::grid::GroupedUniformGrid;

    struct NoOpScheme {
        procedures: Vec<String>,
    }

    impl Scheme<f64, 3> for NoOpScheme {
        fn name(&self) -> &str {
            "no_op"
        }
        fn load(&mut self, _model: &Model) -> Result<(), SchemeError> {
            Ok(())
        }
        fn run_procedure(
            &mut self,
            name: &str,
            _model: &mut Model,
            _neighborhood: &GroupedUniformGrid<f64, 3>,
        ) -> Result<(), SchemeError> {
            if self.procedures.iter().any(|p| p == name) {
                Ok(())
            } else {
                Err(SchemeError::UnknownProcedure(name.to_string()))
            }
        }
        fn procedure_names(&self) -> &[String] {
            &self.procedures
        }
    }

    #[test]
    fn register_and_instantiate_round_trip() {
        let mut registry = SchemeRegistry::<f64, 3>::new();
        registry.register("no_op", || {
            Box::new(NoOpScheme {
                procedures: vec!["step".to_string()],
            })
        });
        assert!(registry.is_registered("no_op"));
        let mut scheme = registry.instantiate("no_op").unwrap();
        let model = Model::new();
        scheme.load(&model).unwrap();
        assert_eq!(scheme.name(), "no_op");
    }

    #[test]
    fn instantiate_unknown_scheme_errors() {
        let registry = SchemeRegistry::<f64, 3>::new();
        let err = registry.instantiate("missing").unwrap_err();
        assert!(matches!(err, SchemeError::SchemeNotRegistered(_)));
    }
}
