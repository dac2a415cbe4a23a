//! Deferred handles
//!
//! A [`LazyInstance`] captures an injection request (target type plus
//! qualifiers) and re-enters the resolution pipeline only when consumed.
//! Handed out at `Provider<T>` / `LazyInstance<T>` injection points, where
//! deferral is what breaks dependency cycles.

use crate::bean::Bean;
use crate::error::{DiError, Result};
use crate::injector::InjectorShared;
use crate::metadata::Qualifier;
use crate::types::TypeDescriptor;
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

/// Deferred, iterable handle to one or more resolvable instances.
///
/// Holds no instance itself; every [`LazyInstance::get`] runs the normal
/// resolution pipeline with the qualifiers captured at the injection site.
#[derive(Clone)]
pub struct LazyInstance {
    target: TypeDescriptor,
    qualifiers: BTreeSet<Qualifier>,
    shared: Weak<InjectorShared>,
}

impl LazyInstance {
    pub(crate) fn new(
        target: TypeDescriptor,
        qualifiers: BTreeSet<Qualifier>,
        shared: Weak<InjectorShared>,
    ) -> Self {
        Self {
            target,
            qualifiers,
            shared,
        }
    }

    #[inline]
    pub fn target(&self) -> &TypeDescriptor {
        &self.target
    }

    #[inline]
    pub fn qualifiers(&self) -> &BTreeSet<Qualifier> {
        &self.qualifiers
    }

    fn shared(&self) -> Result<Arc<InjectorShared>> {
        self.shared
            .upgrade()
            .ok_or_else(|| DiError::illegal_state("injector has been shut down and dropped"))
    }

    /// Resolve and construct the instance now.
    pub fn get(&self) -> Result<Arc<Bean>> {
        self.shared()?.inject_bean(&self.target, &self.qualifiers)
    }

    /// A refined handle with the union of the captured and extra qualifiers.
    pub fn select(&self, extra: impl IntoIterator<Item = Qualifier>) -> LazyInstance {
        let mut qualifiers = self.qualifiers.clone();
        qualifiers.extend(extra);
        Self {
            target: self.target.clone(),
            qualifiers,
            shared: self.shared.clone(),
        }
    }

    /// Construct every matching implementation, in resolution order.
    pub fn iter(&self) -> Result<Vec<Arc<Bean>>> {
        let shared = self.shared()?;
        let classes = shared
            .resolver()
            .resolve_many(&self.target, &self.qualifiers)?;
        classes
            .into_iter()
            .map(|class| {
                let target = TypeDescriptor::Class(class.id().clone());
                shared.inject_bean(&target, &self.qualifiers)
            })
            .collect()
    }

    /// True when the current candidate set resolves to nothing.
    pub fn is_unsatisfied(&self) -> bool {
        match self.shared() {
            Ok(shared) => shared
                .resolver()
                .resolve(&self.target, &self.qualifiers)
                .map(|outcome| outcome.is_unsatisfied())
                .unwrap_or(false),
            Err(_) => true,
        }
    }

    /// True when the current candidate set resolves to more than one
    /// implementation.
    pub fn is_ambiguous(&self) -> bool {
        self.shared()
            .ok()
            .and_then(|shared| {
                shared
                    .resolver()
                    .resolve(&self.target, &self.qualifiers)
                    .ok()
            })
            .map(|outcome| outcome.is_ambiguous())
            .unwrap_or(false)
    }

    /// Invoke pre-destroy on an instance previously obtained from this
    /// handle.
    pub fn destroy(&self, instance: &Arc<Bean>) -> Result<()> {
        self.shared()?.lifecycle().invoke_pre_destroy(instance)
    }
}

impl std::fmt::Debug for LazyInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyInstance")
            .field("target", &self.target)
            .field("qualifiers", &self.qualifiers)
            .finish()
    }
}

/// Get-only deferred handle; the `Provider<T>` injection-point shape.
#[derive(Clone)]
pub struct Provider {
    inner: LazyInstance,
}

impl Provider {
    pub(crate) fn new(inner: LazyInstance) -> Self {
        Self { inner }
    }

    #[inline]
    pub fn target(&self) -> &TypeDescriptor {
        self.inner.target()
    }

    /// Resolve and construct the instance now.
    pub fn get(&self) -> Result<Arc<Bean>> {
        self.inner.get()
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("target", self.target())
            .finish()
    }
}
