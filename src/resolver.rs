//! Class resolver
//!
//! Maps an abstract request (target type plus qualifiers) to exactly one
//! concrete implementation. Priority order: enabled alternatives, then
//! programmatic bindings, then the identity shortcut for concrete targets,
//! then qualifier matching over the scanned candidates. Candidate sets are
//! memoized per target type; qualifier filtering happens after the cached
//! lookup.

use crate::assignability::Assignability;
use crate::cache::Cache;
use crate::config::CacheConfig;
use crate::error::{DiError, Result};
use crate::metadata::{
    ClassDescriptor, ClassRegistry, MappingKey, Qualifier, format_qualifiers,
};
use crate::scanner::{ClassScanner, PackageFilter};
use crate::types::{ClassId, TypeDescriptor};
use ahash::RandomState;
use dashmap::{DashMap, DashSet};
use once_cell::sync::OnceCell;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Result of a one-implementation resolution.
#[derive(Debug, Clone)]
pub enum ResolutionOutcome {
    Found(Arc<ClassDescriptor>),
    Unsatisfied,
    Ambiguous(Vec<ClassId>),
}

impl ResolutionOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn is_unsatisfied(&self) -> bool {
        matches!(self, Self::Unsatisfied)
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Ambiguous(_))
    }
}

/// Resolves `(type, qualifiers)` requests against the scanned class set.
///
/// Bindings and the enabled-alternative set are concurrently mutable;
/// observers see atomic insertions. Both are expected to settle before
/// resolution begins; a mutation racing a resolution yields either the old
/// or the new configuration, never a corrupted result.
pub struct ClassResolver {
    registry: Arc<ClassRegistry>,
    assignability: Arc<Assignability>,
    scanner: Arc<dyn ClassScanner>,
    package_filters: Vec<PackageFilter>,
    bindings: DashMap<MappingKey, Arc<ClassDescriptor>, RandomState>,
    enabled_alternatives: DashSet<ClassId, RandomState>,
    bindings_only: AtomicBool,
    /// Per-target candidate memo; stable across requests because the scan
    /// result is stable per class-loading domain.
    candidates: Cache<TypeDescriptor, Arc<Vec<Arc<ClassDescriptor>>>>,
    scanned: OnceCell<Vec<Arc<ClassDescriptor>>>,
}

impl ClassResolver {
    pub fn new(
        registry: Arc<ClassRegistry>,
        assignability: Arc<Assignability>,
        scanner: Arc<dyn ClassScanner>,
        package_filters: Vec<PackageFilter>,
        cache: &CacheConfig,
    ) -> Result<Self> {
        Ok(Self {
            registry,
            assignability,
            scanner,
            package_filters,
            bindings: DashMap::with_hasher(RandomState::new()),
            enabled_alternatives: DashSet::with_hasher(RandomState::new()),
            bindings_only: AtomicBool::new(false),
            candidates: Cache::with_config(cache)?,
            scanned: OnceCell::new(),
        })
    }

    // =========================================================================
    // Configuration surface
    // =========================================================================

    /// Install an override for `(target, qualifiers)`.
    pub fn bind(
        &self,
        target: TypeDescriptor,
        qualifiers: BTreeSet<Qualifier>,
        implementation: Arc<ClassDescriptor>,
    ) {
        #[cfg(feature = "logging")]
        debug!(
            target: "wirecore",
            bound_type = %target,
            implementation = %implementation.id(),
            "Installing binding"
        );

        self.registry.insert(Arc::clone(&implementation));
        self.bindings
            .insert(MappingKey::new(target, qualifiers), implementation);
    }

    /// Add a class to the enabled-alternatives set.
    pub fn enable_alternative(&self, class: ClassId) {
        #[cfg(feature = "logging")]
        debug!(target: "wirecore", class = %class, "Enabling alternative");

        self.enabled_alternatives.insert(class);
    }

    /// When true, refuse classpath fallback for targets without a binding.
    pub fn set_bindings_only(&self, flag: bool) {
        self.bindings_only.store(flag, Ordering::Release);
    }

    pub fn is_bindings_only(&self) -> bool {
        self.bindings_only.load(Ordering::Acquire)
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve to exactly one implementation, as an outcome.
    pub fn resolve(
        &self,
        target: &TypeDescriptor,
        qualifiers: &BTreeSet<Qualifier>,
    ) -> Result<ResolutionOutcome> {
        let target_raw = target.raw_class();
        if target_raw.name().is_empty() {
            return Err(DiError::domain("target type has an empty class name"));
        }

        let candidates = self.candidate_set(target)?;

        // 1. Enabled alternatives take priority over everything.
        let alternatives: Vec<&Arc<ClassDescriptor>> = candidates
            .iter()
            .filter(|c| self.enabled_alternatives.contains(c.id()))
            .collect();
        match alternatives.len() {
            1 => return Ok(ResolutionOutcome::Found(Arc::clone(alternatives[0]))),
            0 => {}
            _ => {
                return Ok(ResolutionOutcome::Ambiguous(
                    alternatives.iter().map(|c| c.id().clone()).collect(),
                ));
            }
        }

        // 2. Programmatic bindings.
        let key = MappingKey::new(target.clone(), qualifiers.clone());
        if let Some(bound) = self.bindings.get(&key) {
            return Ok(ResolutionOutcome::Found(Arc::clone(bound.value())));
        }
        if self.is_bindings_only() {
            return Ok(ResolutionOutcome::Unsatisfied);
        }

        // 3. Identity shortcut: a concrete (or array) target with no
        //    qualifiers beyond Default resolves to itself.
        let default_only = qualifiers.is_empty()
            || qualifiers.iter().all(|q| q.is_default());
        if default_only
            && let Some(desc) = self.registry.get(&target_raw)
            && (desc.is_concrete() || desc.is_array())
        {
            return Ok(ResolutionOutcome::Found(desc));
        }

        // 4. Disabled alternatives are out of the running from here on.
        let standard: Vec<&Arc<ClassDescriptor>> = candidates
            .iter()
            .filter(|c| !c.is_alternative())
            .collect();

        // 5. Qualified request: first candidate satisfying all qualifiers.
        if !qualifiers.is_empty() {
            for &candidate in &standard {
                if qualifiers_satisfied(candidate, qualifiers) {
                    return Ok(ResolutionOutcome::Found(Arc::clone(candidate)));
                }
            }
            return Ok(ResolutionOutcome::Unsatisfied);
        }

        // 6. Unqualified request: only no-qualifier / Default-only
        //    candidates remain eligible.
        let defaults: Vec<&Arc<ClassDescriptor>> = standard
            .iter()
            .copied()
            .filter(|c| !c.has_user_qualifiers())
            .collect();
        match defaults.len() {
            1 => Ok(ResolutionOutcome::Found(Arc::clone(defaults[0]))),
            0 => Ok(ResolutionOutcome::Unsatisfied),
            _ => Ok(ResolutionOutcome::Ambiguous(
                defaults.iter().map(|c| c.id().clone()).collect(),
            )),
        }
    }

    /// Resolve to exactly one implementation, turning non-results into
    /// errors carrying the target, qualifiers and candidate names.
    pub fn resolve_one(
        &self,
        target: &TypeDescriptor,
        qualifiers: &BTreeSet<Qualifier>,
    ) -> Result<Arc<ClassDescriptor>> {
        match self.resolve(target, qualifiers)? {
            ResolutionOutcome::Found(desc) => Ok(desc),
            ResolutionOutcome::Unsatisfied => Err(DiError::unsatisfied(
                target,
                format_qualifiers(qualifiers),
            )),
            ResolutionOutcome::Ambiguous(ids) => {
                let names: Vec<&str> = ids.iter().map(ClassId::name).collect();
                Err(DiError::ambiguous(target, &names))
            }
        }
    }

    /// Resolve the full matching set: enabled alternatives plus every
    /// non-alternative candidate, qualifier-filtered when qualifiers are
    /// present. Stable scan order, duplicate-free, never ambiguous.
    pub fn resolve_many(
        &self,
        target: &TypeDescriptor,
        qualifiers: &BTreeSet<Qualifier>,
    ) -> Result<Vec<Arc<ClassDescriptor>>> {
        let candidates = self.candidate_set(target)?;
        let mut matches = Vec::new();
        for candidate in candidates.iter() {
            let eligible = !candidate.is_alternative()
                || self.enabled_alternatives.contains(candidate.id());
            if !eligible {
                continue;
            }
            if !qualifiers.is_empty() && !qualifiers_satisfied(candidate, qualifiers) {
                continue;
            }
            matches.push(Arc::clone(candidate));
        }
        Ok(matches)
    }

    /// Assignability-filtered candidate set for a target, memoized per
    /// target type.
    fn candidate_set(&self, target: &TypeDescriptor) -> Result<Arc<Vec<Arc<ClassDescriptor>>>> {
        self.candidates
            .try_compute_if_absent(target.clone(), || self.compute_candidates(target))
    }

    fn compute_candidates(&self, target: &TypeDescriptor) -> Result<Arc<Vec<Arc<ClassDescriptor>>>> {
        let scanned = self.ensure_scanned()?;
        let mut matched = Vec::new();
        for candidate in scanned {
            if !candidate.is_concrete() {
                continue;
            }
            if self
                .assignability
                .is_assignable(target, &self_type(candidate))?
            {
                matched.push(Arc::clone(candidate));
            }
        }

        #[cfg(feature = "logging")]
        trace!(
            target: "wirecore",
            target_type = %target,
            candidates = matched.len(),
            "Computed candidate set"
        );

        Ok(Arc::new(matched))
    }

    /// Run the scan once; a failed scan is retried on the next resolution.
    fn ensure_scanned(&self) -> Result<&Vec<Arc<ClassDescriptor>>> {
        self.scanned.get_or_try_init(|| {
            let classes = self.scanner.scan(&self.package_filters)?;
            for class in &classes {
                self.registry.insert(Arc::clone(class));
            }

            #[cfg(feature = "logging")]
            debug!(
                target: "wirecore",
                classes = classes.len(),
                "Scan registered candidate classes"
            );

            Ok(classes)
        })
    }

    /// Statistics of the per-target candidate memo.
    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.candidates.stats()
    }
}

impl std::fmt::Debug for ClassResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassResolver")
            .field("bindings", &self.bindings.len())
            .field("enabled_alternatives", &self.enabled_alternatives.len())
            .field("bindings_only", &self.is_bindings_only())
            .finish()
    }
}

/// The type a candidate class presents to assignability: its raw class, or
/// its generic self-type when it declares type parameters.
fn self_type(candidate: &Arc<ClassDescriptor>) -> TypeDescriptor {
    if candidate.type_params().is_empty() {
        TypeDescriptor::Class(candidate.id().clone())
    } else {
        TypeDescriptor::Parameterized {
            raw: candidate.id().clone(),
            args: candidate
                .type_params()
                .iter()
                .map(|name| TypeDescriptor::variable(name.clone(), vec![]))
                .collect(),
        }
    }
}

/// Every requested qualifier must be present on the candidate, or be `Any`
/// (matches everything), or be `Default` against a candidate declaring no
/// user qualifiers. `Any` combined with a user qualifier is an intersection:
/// the user qualifier is still required.
fn qualifiers_satisfied(
    candidate: &Arc<ClassDescriptor>,
    requested: &BTreeSet<Qualifier>,
) -> bool {
    requested.iter().all(|q| {
        if q.is_any() {
            return true;
        }
        if q.is_default() {
            return !candidate.has_user_qualifiers()
                || candidate.qualifiers().contains(q);
        }
        candidate.qualifiers().contains(q)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ScopeTag;
    use crate::scanner::StaticScanner;

    fn resolver_with(classes: Vec<Arc<ClassDescriptor>>) -> ClassResolver {
        let registry = Arc::new(ClassRegistry::new());
        let assignability =
            Arc::new(Assignability::new(Arc::clone(&registry), &CacheConfig::default()).unwrap());
        let scanner = Arc::new(StaticScanner::with_classes(classes));
        ClassResolver::new(
            registry,
            assignability,
            scanner,
            Vec::new(),
            &CacheConfig::default(),
        )
        .unwrap()
    }

    fn repo_world() -> Vec<Arc<ClassDescriptor>> {
        vec![
            ClassDescriptor::builder("app.Repo").interface().build(),
            ClassDescriptor::builder("app.PrimaryRepo")
                .implements("app.Repo")
                .qualifier(Qualifier::named("primary"))
                .build(),
            ClassDescriptor::builder("app.BackupRepo")
                .implements("app.Repo")
                .qualifier(Qualifier::named("backup"))
                .build(),
        ]
    }

    #[test]
    fn qualifier_disambiguation() {
        let resolver = resolver_with(repo_world());
        let target = TypeDescriptor::class("app.Repo");

        let mut quals = BTreeSet::new();
        quals.insert(Qualifier::named("backup"));
        let found = resolver.resolve_one(&target, &quals).unwrap();
        assert_eq!(found.id().name(), "app.BackupRepo");

        let mut quals = BTreeSet::new();
        quals.insert(Qualifier::named("primary"));
        let found = resolver.resolve_one(&target, &quals).unwrap();
        assert_eq!(found.id().name(), "app.PrimaryRepo");
    }

    #[test]
    fn unqualified_candidates_with_user_qualifiers_are_unsatisfied() {
        let resolver = resolver_with(repo_world());
        let target = TypeDescriptor::class("app.Repo");

        // Both implementations carry a user qualifier, so an unqualified
        // request matches nothing.
        let err = resolver.resolve_one(&target, &BTreeSet::new()).unwrap_err();
        assert!(err.is_unsatisfied());
    }

    #[test]
    fn ambiguity_lists_candidates() {
        let resolver = resolver_with(vec![
            ClassDescriptor::builder("app.R").interface().build(),
            ClassDescriptor::builder("app.R1").implements("app.R").build(),
            ClassDescriptor::builder("app.R2").implements("app.R").build(),
        ]);
        let target = TypeDescriptor::class("app.R");

        let err = resolver.resolve_one(&target, &BTreeSet::new()).unwrap_err();
        match err {
            DiError::Ambiguous { candidates, .. } => {
                assert!(candidates.contains("app.R1"));
                assert!(candidates.contains("app.R2"));
            }
            other => panic!("expected Ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn single_implementation_resolves() {
        let resolver = resolver_with(vec![
            ClassDescriptor::builder("app.R").interface().build(),
            ClassDescriptor::builder("app.OnlyImpl").implements("app.R").build(),
        ]);
        let found = resolver
            .resolve_one(&TypeDescriptor::class("app.R"), &BTreeSet::new())
            .unwrap();
        assert_eq!(found.id().name(), "app.OnlyImpl");
    }

    #[test]
    fn enabled_alternative_wins() {
        let resolver = resolver_with(vec![
            ClassDescriptor::builder("app.R").interface().build(),
            ClassDescriptor::builder("app.Standard").implements("app.R").build(),
            ClassDescriptor::builder("app.Mock")
                .implements("app.R")
                .alternative()
                .build(),
        ]);
        let target = TypeDescriptor::class("app.R");

        // Disabled alternative is ignored.
        let found = resolver.resolve_one(&target, &BTreeSet::new()).unwrap();
        assert_eq!(found.id().name(), "app.Standard");

        // Enabled alternative overrides the standard candidate.
        resolver.enable_alternative(ClassId::new("app.Mock"));
        let found = resolver.resolve_one(&target, &BTreeSet::new()).unwrap();
        assert_eq!(found.id().name(), "app.Mock");
    }

    #[test]
    fn two_enabled_alternatives_are_ambiguous() {
        let resolver = resolver_with(vec![
            ClassDescriptor::builder("app.R").interface().build(),
            ClassDescriptor::builder("app.AltA")
                .implements("app.R")
                .alternative()
                .build(),
            ClassDescriptor::builder("app.AltB")
                .implements("app.R")
                .alternative()
                .build(),
        ]);
        resolver.enable_alternative(ClassId::new("app.AltA"));
        resolver.enable_alternative(ClassId::new("app.AltB"));

        let outcome = resolver
            .resolve(&TypeDescriptor::class("app.R"), &BTreeSet::new())
            .unwrap();
        assert!(outcome.is_ambiguous());
    }

    #[test]
    fn binding_overrides_candidates() {
        let resolver = resolver_with(vec![
            ClassDescriptor::builder("app.R").interface().build(),
            ClassDescriptor::builder("app.Standard").implements("app.R").build(),
        ]);
        let target = TypeDescriptor::class("app.R");

        let override_impl = ClassDescriptor::builder("app.Override")
            .implements("app.R")
            .build();
        resolver.bind(target.clone(), BTreeSet::new(), override_impl);

        let found = resolver.resolve_one(&target, &BTreeSet::new()).unwrap();
        assert_eq!(found.id().name(), "app.Override");
    }

    #[test]
    fn bindings_only_blocks_classpath_fallback() {
        let resolver = resolver_with(vec![
            ClassDescriptor::builder("app.R").interface().build(),
            ClassDescriptor::builder("app.Standard").implements("app.R").build(),
        ]);
        resolver.set_bindings_only(true);

        let err = resolver
            .resolve_one(&TypeDescriptor::class("app.R"), &BTreeSet::new())
            .unwrap_err();
        assert!(err.is_unsatisfied());
    }

    #[test]
    fn identity_shortcut_for_concrete_targets() {
        let resolver = resolver_with(vec![
            ClassDescriptor::builder("app.Service")
                .scope(ScopeTag::singleton())
                .build(),
        ]);

        let found = resolver
            .resolve_one(&TypeDescriptor::class("app.Service"), &BTreeSet::new())
            .unwrap();
        assert_eq!(found.id().name(), "app.Service");

        // Also with an explicit Default qualifier.
        let mut quals = BTreeSet::new();
        quals.insert(Qualifier::default_qualifier());
        let found = resolver
            .resolve_one(&TypeDescriptor::class("app.Service"), &quals)
            .unwrap();
        assert_eq!(found.id().name(), "app.Service");
    }

    #[test]
    fn any_does_not_override_user_qualifier() {
        let resolver = resolver_with(repo_world());
        let target = TypeDescriptor::class("app.Repo");

        // Any alone matches everything; the first candidate in scan order wins.
        let mut quals = BTreeSet::new();
        quals.insert(Qualifier::any());
        let found = resolver.resolve_one(&target, &quals).unwrap();
        assert_eq!(found.id().name(), "app.PrimaryRepo");

        // Any plus Named("backup") still requires the Named match.
        let mut quals = BTreeSet::new();
        quals.insert(Qualifier::any());
        quals.insert(Qualifier::named("backup"));
        let found = resolver.resolve_one(&target, &quals).unwrap();
        assert_eq!(found.id().name(), "app.BackupRepo");

        // Any plus a Named value nobody declares stays unsatisfied.
        let mut quals = BTreeSet::new();
        quals.insert(Qualifier::any());
        quals.insert(Qualifier::named("tertiary"));
        assert!(resolver.resolve_one(&target, &quals).unwrap_err().is_unsatisfied());
    }

    #[test]
    fn resolve_many_unions_alternatives_and_standard() {
        let resolver = resolver_with(vec![
            ClassDescriptor::builder("app.R").interface().build(),
            ClassDescriptor::builder("app.A").implements("app.R").build(),
            ClassDescriptor::builder("app.B").implements("app.R").build(),
            ClassDescriptor::builder("app.Alt")
                .implements("app.R")
                .alternative()
                .build(),
        ]);
        let target = TypeDescriptor::class("app.R");

        // Disabled alternative excluded.
        let many = resolver.resolve_many(&target, &BTreeSet::new()).unwrap();
        let names: Vec<_> = many.iter().map(|c| c.id().name().to_string()).collect();
        assert_eq!(names, vec!["app.A", "app.B"]);

        // Enabled alternative included, order stable.
        resolver.enable_alternative(ClassId::new("app.Alt"));
        let many = resolver.resolve_many(&target, &BTreeSet::new()).unwrap();
        assert_eq!(many.len(), 3);
    }

    #[test]
    fn resolve_many_filters_by_qualifier() {
        let resolver = resolver_with(repo_world());
        let target = TypeDescriptor::class("app.Repo");

        let mut quals = BTreeSet::new();
        quals.insert(Qualifier::named("primary"));
        let many = resolver.resolve_many(&target, &quals).unwrap();
        assert_eq!(many.len(), 1);
        assert_eq!(many[0].id().name(), "app.PrimaryRepo");
    }

    #[test]
    fn candidate_sets_are_memoized_per_target() {
        let resolver = resolver_with(repo_world());
        let target = TypeDescriptor::class("app.Repo");

        let _ = resolver.resolve_many(&target, &BTreeSet::new()).unwrap();
        let misses = resolver.cache_stats().misses;
        let _ = resolver.resolve_many(&target, &BTreeSet::new()).unwrap();
        assert_eq!(resolver.cache_stats().misses, misses);
        assert!(resolver.cache_stats().hits > 0);
    }

    #[test]
    fn empty_target_name_is_a_domain_error() {
        let resolver = resolver_with(vec![]);
        let err = resolver
            .resolve_one(&TypeDescriptor::class(""), &BTreeSet::new())
            .unwrap_err();
        assert!(matches!(err, DiError::DomainFailure(_)));
    }

    #[test]
    fn scan_failure_propagates_as_resolution_failure() {
        let registry = Arc::new(ClassRegistry::new());
        let assignability =
            Arc::new(Assignability::new(Arc::clone(&registry), &CacheConfig::default()).unwrap());
        let scanner = Arc::new(StaticScanner::failing("bad scan"));
        let resolver = ClassResolver::new(
            registry,
            assignability,
            scanner,
            Vec::new(),
            &CacheConfig::default(),
        )
        .unwrap();

        let err = resolver
            .resolve_one(&TypeDescriptor::class("app.R"), &BTreeSet::new())
            .unwrap_err();
        assert!(matches!(err, DiError::ResolutionFailure(_)));
    }

    #[test]
    fn generic_target_filters_candidates_invariantly() {
        let resolver = resolver_with(vec![
            ClassDescriptor::builder("app.List")
                .interface()
                .type_param("E")
                .build(),
            ClassDescriptor::builder("app.IntList")
                .implements(TypeDescriptor::parameterized("app.List", vec![
                    TypeDescriptor::class("app.Integer"),
                ]))
                .build(),
            ClassDescriptor::builder("app.StrList")
                .implements(TypeDescriptor::parameterized("app.List", vec![
                    TypeDescriptor::class("app.String"),
                ]))
                .build(),
        ]);

        let target =
            TypeDescriptor::parameterized("app.List", vec![TypeDescriptor::class("app.Integer")]);
        let found = resolver.resolve_one(&target, &BTreeSet::new()).unwrap();
        assert_eq!(found.id().name(), "app.IntList");
    }
}
