//! Type-assignability engine
//!
//! Decides whether a candidate implementation type satisfies an injection
//! point. Injection points must be closed types (no wildcards, no type
//! variables at any depth); implementation types may be open. Generic type
//! arguments are matched invariantly, with pragmatic holes for open
//! implementation-side arguments and raw/parameterized mixing.

use crate::cache::Cache;
use crate::config::CacheConfig;
use crate::error::{DiError, Result};
use crate::metadata::ClassRegistry;
use crate::types::TypeDescriptor;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

/// Assignability decisions with a thread-safe memo over `(target, impl)`.
pub struct Assignability {
    registry: Arc<ClassRegistry>,
    memo: Cache<(TypeDescriptor, TypeDescriptor), bool>,
}

impl Assignability {
    /// Create an engine over the given class registry.
    pub fn new(registry: Arc<ClassRegistry>, cache: &CacheConfig) -> Result<Self> {
        Ok(Self {
            registry,
            memo: Cache::with_config(cache)?,
        })
    }

    /// Validate an injection-point type: fails when the type contains a
    /// wildcard or a type variable at any depth.
    pub fn validate_injection_point(&self, ty: &TypeDescriptor) -> Result<()> {
        Self::validate_closed(ty, ty)
    }

    fn validate_closed(root: &TypeDescriptor, ty: &TypeDescriptor) -> Result<()> {
        match ty {
            TypeDescriptor::Wildcard { .. } => Err(DiError::definition(format!(
                "injection point {root} contains a wildcard"
            ))),
            TypeDescriptor::Variable { name, .. } => Err(DiError::definition(format!(
                "injection point {root} contains the type variable {name}"
            ))),
            TypeDescriptor::Parameterized { args, .. } => {
                for arg in args {
                    Self::validate_closed(root, arg)?;
                }
                Ok(())
            }
            TypeDescriptor::GenericArray { component } => Self::validate_closed(root, component),
            TypeDescriptor::Class(_) => Ok(()),
        }
    }

    /// Decide `target <- impl`.
    ///
    /// `target` must have been validated; `impl_ty` may contain wildcards or
    /// variables. Results are memoized keyed on the pair.
    pub fn is_assignable(&self, target: &TypeDescriptor, impl_ty: &TypeDescriptor) -> Result<bool> {
        let key = (target.clone(), impl_ty.clone());
        self.memo
            .try_compute_if_absent(key, || self.decide(target, impl_ty))
    }

    fn decide(&self, target: &TypeDescriptor, impl_ty: &TypeDescriptor) -> Result<bool> {
        if target == impl_ty {
            return Ok(true);
        }

        let target_raw = target.raw_class();
        let impl_raw = impl_ty.raw_class();
        if !self.registry.is_supertype(&target_raw, &impl_raw) {
            return Ok(false);
        }

        let decision = match target {
            // A raw target is satisfied by any erased subtype.
            TypeDescriptor::Class(_) => Ok(true),

            TypeDescriptor::Parameterized { args, .. } => {
                let resolved = self
                    .registry
                    .generic_supertype(impl_ty, &target_raw)
                    .ok_or_else(|| {
                        DiError::internal(format!(
                            "no supertype of {impl_ty} with raw class {target_raw} \
                             despite raw assignability"
                        ))
                    })?;
                let resolved_args = resolved.type_args();
                if resolved_args.is_empty() {
                    // Raw use of the generic supertype on the implementation
                    // side; erased assignability already holds.
                    return Ok(true);
                }
                if resolved_args.len() != args.len() {
                    return Ok(false);
                }
                for (t_arg, i_arg) in args.iter().zip(resolved_args) {
                    if !self.argument_matches(t_arg, i_arg)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }

            TypeDescriptor::GenericArray { component } => {
                let Some(impl_component) = impl_ty.array_component() else {
                    return Ok(false);
                };
                self.decide(component, &impl_component)
            }

            // Validated targets cannot be wildcards or variables.
            TypeDescriptor::Variable { .. } | TypeDescriptor::Wildcard { .. } => {
                Err(DiError::internal(format!(
                    "unvalidated injection point reached assignability: {target}"
                )))
            }
        };

        #[cfg(feature = "logging")]
        if let Ok(matched) = &decision {
            trace!(
                target: "wirecore",
                target_type = %target,
                impl_type = %impl_ty,
                matched,
                "Assignability decided"
            );
        }

        decision
    }

    /// Match one pair of type arguments, invariantly.
    fn argument_matches(&self, t_arg: &TypeDescriptor, i_arg: &TypeDescriptor) -> Result<bool> {
        if t_arg == i_arg {
            return Ok(true);
        }
        match (t_arg, i_arg) {
            // The implementation side is permitted to be open.
            (_, TypeDescriptor::Wildcard { .. }) | (_, TypeDescriptor::Variable { .. }) => Ok(true),

            (
                TypeDescriptor::Parameterized { raw: t_raw, args: t_args },
                TypeDescriptor::Parameterized { raw: i_raw, args: i_args },
            ) => {
                if t_raw != i_raw || t_args.len() != i_args.len() {
                    return Ok(false);
                }
                for (t, i) in t_args.iter().zip(i_args) {
                    if !self.argument_matches(t, i)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }

            // Mixed raw/parameterized bean types: the raw side must be a
            // supertype of the other's raw.
            (TypeDescriptor::Class(t_raw), TypeDescriptor::Parameterized { raw: i_raw, .. }) => {
                Ok(self.registry.is_supertype(t_raw, i_raw))
            }
            (TypeDescriptor::Parameterized { raw: t_raw, .. }, TypeDescriptor::Class(i_raw)) => {
                Ok(self.registry.is_supertype(i_raw, t_raw))
            }

            _ => Ok(false),
        }
    }

    /// Hit/miss statistics of the memo.
    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.memo.stats()
    }
}

impl std::fmt::Debug for Assignability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assignability")
            .field("memo", &self.memo)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ClassDescriptor;

    fn engine() -> Assignability {
        let registry = Arc::new(ClassRegistry::new());
        registry.insert(
            ClassDescriptor::builder("app.List")
                .interface()
                .type_param("E")
                .build(),
        );
        registry.insert(
            ClassDescriptor::builder("app.ArrayList")
                .type_param("E")
                .implements(TypeDescriptor::parameterized("app.List", vec![
                    TypeDescriptor::variable("E", vec![]),
                ]))
                .build(),
        );
        registry.insert(ClassDescriptor::builder("app.Number").build());
        registry.insert(
            ClassDescriptor::builder("app.Integer")
                .superclass("app.Number")
                .build(),
        );
        registry.insert(ClassDescriptor::builder("app.String").build());
        Assignability::new(registry, &CacheConfig::default()).unwrap()
    }

    fn list_of(arg: &str) -> TypeDescriptor {
        TypeDescriptor::parameterized("app.List", vec![TypeDescriptor::class(arg)])
    }

    fn array_list_of(arg: &str) -> TypeDescriptor {
        TypeDescriptor::parameterized("app.ArrayList", vec![TypeDescriptor::class(arg)])
    }

    #[test]
    fn validation_rejects_open_types() {
        let engine = engine();

        let wildcard_list =
            TypeDescriptor::parameterized("app.List", vec![TypeDescriptor::wildcard()]);
        assert!(matches!(
            engine.validate_injection_point(&wildcard_list),
            Err(DiError::DefinitionFailure(_)),
        ));

        let var_array = TypeDescriptor::generic_array(TypeDescriptor::variable("T", vec![]));
        assert!(engine.validate_injection_point(&var_array).is_err());

        assert!(engine.validate_injection_point(&list_of("app.Integer")).is_ok());
    }

    #[test]
    fn reflexive_for_closed_types() {
        let engine = engine();
        for ty in [
            TypeDescriptor::class("app.Number"),
            list_of("app.Integer"),
            TypeDescriptor::generic_array(TypeDescriptor::class("app.Number")),
        ] {
            assert!(engine.is_assignable(&ty, &ty).unwrap(), "{ty} <- {ty}");
        }
    }

    #[test]
    fn raw_target_accepts_erased_subtype() {
        let engine = engine();
        let target = TypeDescriptor::class("app.List");
        assert!(engine.is_assignable(&target, &array_list_of("app.String")).unwrap());
        assert!(!engine
            .is_assignable(&target, &TypeDescriptor::class("app.Number"))
            .unwrap());
    }

    #[test]
    fn generics_are_invariant() {
        let engine = engine();

        // List<Integer> <- ArrayList<String>: raws assignable, args differ.
        assert!(!engine
            .is_assignable(&list_of("app.Integer"), &array_list_of("app.String"))
            .unwrap());

        // List<Number> <- ArrayList<Integer>: invariance rejects subtype args.
        assert!(!engine
            .is_assignable(&list_of("app.Number"), &array_list_of("app.Integer"))
            .unwrap());

        // Exact argument matches.
        assert!(engine
            .is_assignable(&list_of("app.Integer"), &array_list_of("app.Integer"))
            .unwrap());
    }

    #[test]
    fn open_impl_arguments_match() {
        let engine = engine();

        let open_var = TypeDescriptor::parameterized("app.ArrayList", vec![
            TypeDescriptor::variable("E", vec![]),
        ]);
        assert!(engine.is_assignable(&list_of("app.Integer"), &open_var).unwrap());

        let open_wild = TypeDescriptor::parameterized("app.ArrayList", vec![
            TypeDescriptor::wildcard(),
        ]);
        assert!(engine.is_assignable(&list_of("app.Integer"), &open_wild).unwrap());
    }

    #[test]
    fn raw_impl_of_generic_supertype_matches() {
        let engine = engine();
        // Implementation uses the raw supertype; erasure already holds.
        let raw_impl = TypeDescriptor::class("app.ArrayList");
        assert!(engine.is_assignable(&list_of("app.Integer"), &raw_impl).unwrap());
    }

    #[test]
    fn arrays_are_reference_covariant_only() {
        let engine = engine();

        let num_arr = TypeDescriptor::generic_array(TypeDescriptor::class("app.Number"));
        let int_arr = TypeDescriptor::generic_array(TypeDescriptor::class("app.Integer"));
        assert!(engine.is_assignable(&num_arr, &int_arr).unwrap());
        assert!(!engine.is_assignable(&int_arr, &num_arr).unwrap());

        let int_prim = TypeDescriptor::class("int[]");
        let long_prim = TypeDescriptor::class("long[]");
        assert!(engine.is_assignable(&int_prim, &int_prim).unwrap());
        assert!(!engine.is_assignable(&int_prim, &long_prim).unwrap());

        // Non-array impl never satisfies an array target.
        assert!(!engine
            .is_assignable(&num_arr, &TypeDescriptor::class("app.Number"))
            .unwrap());
    }

    #[test]
    fn mixed_raw_and_parameterized_arguments() {
        let engine = engine();

        // Target List<List> (raw arg), impl ArrayList<List<Integer>>.
        let target = TypeDescriptor::parameterized("app.List", vec![
            TypeDescriptor::class("app.List"),
        ]);
        let impl_ty = TypeDescriptor::parameterized("app.ArrayList", vec![list_of("app.Integer")]);
        assert!(engine.is_assignable(&target, &impl_ty).unwrap());

        // Reversed nesting: parameterized target arg, raw impl arg. The raw
        // side must be a supertype of the target arg's raw.
        let target = TypeDescriptor::parameterized("app.List", vec![list_of("app.Integer")]);
        let impl_ty = TypeDescriptor::parameterized("app.ArrayList", vec![
            TypeDescriptor::class("app.List"),
        ]);
        assert!(engine.is_assignable(&target, &impl_ty).unwrap());

        // A raw impl arg that is not a supertype of the target arg's raw
        // does not match.
        let impl_ty = TypeDescriptor::parameterized("app.ArrayList", vec![
            TypeDescriptor::class("app.Integer"),
        ]);
        assert!(!engine.is_assignable(&target, &impl_ty).unwrap());
    }

    #[test]
    fn decisions_are_memoized() {
        let engine = engine();
        let target = list_of("app.Integer");
        let impl_ty = array_list_of("app.Integer");

        assert!(engine.is_assignable(&target, &impl_ty).unwrap());
        assert_eq!(engine.cache_stats().misses, 1);

        assert!(engine.is_assignable(&target, &impl_ty).unwrap());
        let stats = engine.cache_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn assignable_implies_raw_supertype() {
        let registry = Arc::new(ClassRegistry::new());
        registry.insert(
            ClassDescriptor::builder("app.List")
                .interface()
                .type_param("E")
                .build(),
        );
        registry.insert(
            ClassDescriptor::builder("app.ArrayList")
                .type_param("E")
                .implements(TypeDescriptor::parameterized("app.List", vec![
                    TypeDescriptor::variable("E", vec![]),
                ]))
                .build(),
        );
        registry.insert(ClassDescriptor::builder("app.Number").build());
        registry.insert(
            ClassDescriptor::builder("app.Integer")
                .superclass("app.Number")
                .build(),
        );
        let engine =
            Assignability::new(Arc::clone(&registry), &CacheConfig::default()).unwrap();

        let cases = [
            (TypeDescriptor::class("app.List"), array_list_of("app.Integer")),
            (list_of("app.Integer"), array_list_of("app.Integer")),
            (TypeDescriptor::class("app.Number"), TypeDescriptor::class("app.Integer")),
        ];
        for (target, impl_ty) in cases {
            assert!(engine.is_assignable(&target, &impl_ty).unwrap());
            assert!(
                registry.is_supertype(&target.raw_class(), &impl_ty.raw_class()),
                "raw supertype property violated for {target} <- {impl_ty}"
            );
        }
    }
}
