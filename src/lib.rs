//! # wirecore - Runtime Dependency-Injection Container Core
//!
//! A container core that resolves a typed request into a fully constructed,
//! wired and lifecycle-managed instance. Classes are described once as
//! metadata (constructors, fields, methods, qualifiers, scope) and the
//! container does the rest at runtime.
//!
//! ## Features
//!
//! - 🧭 **Typed resolution** - structural type descriptors with strict
//!   generic invariance and qualifier matching
//! - 🔀 **Alternatives and bindings** - programmatic overrides with a
//!   deterministic priority order
//! - ♻️ **Scopes** - singleton, application, request, session, conversation
//!   and dependent, plus user-defined handlers
//! - 🧵 **Concurrent** - lock-free reads, per-key double-checked
//!   construction, reentrancy-safe scope storage
//! - ⏱️ **Lazy handles** - `Provider` / `LazyInstance` wrappers that defer
//!   resolution and break dependency cycles
//! - 📊 **Observable** - optional tracing integration with JSON or pretty
//!   output, hit/miss statistics on every cache
//!
//! ## Quick Start
//!
//! ```rust
//! use wirecore::prelude::*;
//! use wirecore::metadata::FieldDescriptor;
//! use wirecore::scanner::StaticScanner;
//!
//! // Describe the classes the container may construct.
//! let scanner = StaticScanner::with_classes([
//!     ClassDescriptor::builder("app.Database")
//!         .scope(ScopeTag::singleton())
//!         .build(),
//!     ClassDescriptor::builder("app.UserService")
//!         .field(FieldDescriptor::injectable("db", "app.Database"))
//!         .build(),
//! ]);
//!
//! let injector = Injector::new(Arc::new(scanner)).unwrap();
//!
//! // Resolve - returns a fully wired instance.
//! let users = injector.inject(&TypeDescriptor::class("app.UserService")).unwrap();
//! let db = users.bean("db").unwrap();
//! assert_eq!(db.class_id().name(), "app.Database");
//! ```
//!
//! ## Resolution order
//!
//! For a request `(type, qualifiers)` the resolver picks, in order: the
//! enabled alternative that matches, the programmatic binding for the exact
//! key, the target itself when it is a concrete class without user
//! qualifiers, and finally the qualifier-matching scan candidate. More than
//! one surviving candidate is ambiguous, zero is unsatisfied; both cases
//! name the target and the competing classes in the error.

pub mod assignability;
pub mod bean;
pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod injector;
pub mod lazy;
pub mod lifecycle;
#[cfg(feature = "logging")]
pub mod logging;
pub mod metadata;
pub mod resolver;
pub mod scanner;
pub mod scope;
pub mod types;

pub use bean::{Bean, Value};
pub use error::{DiError, Result};
pub use injector::Injector;
pub use lazy::{LazyInstance, Provider};
pub use metadata::{ClassDescriptor, Qualifier, ScopeTag};
pub use resolver::ResolutionOutcome;
pub use types::{ClassId, TypeDescriptor};

// Re-export tracing macros for convenience when logging feature is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

// Re-export for convenience
pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Bean, ClassDescriptor, ClassId, DiError, Injector, LazyInstance, Provider, Qualifier,
        Result, ScopeTag, TypeDescriptor, Value,
    };
    pub use std::sync::Arc;
}
