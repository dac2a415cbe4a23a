//! Injector core
//!
//! Drives the whole pipeline: resolve the request to a concrete class,
//! dispatch to its scope handler, and inside the scope's factory construct
//! the instance: constructor selection, recursive dependency resolution,
//! static and instance field/method injection over the root-to-leaf
//! hierarchy, then post-construct callbacks. A per-thread injection stack
//! turns revisits into circular-dependency errors carrying the full chain.

use crate::assignability::Assignability;
use crate::bean::{Bean, Value};
use crate::config::ContainerConfig;
use crate::error::{DiError, Result};
use crate::lazy::{LazyInstance, Provider};
use crate::lifecycle::LifecycleRunner;
use crate::metadata::{
    ClassDescriptor, ClassRegistry, ConstructorDescriptor, MethodDescriptor, MethodRole,
    Qualifier, ScopeTag, Visibility,
};
use crate::resolver::ClassResolver;
use crate::scanner::ClassScanner;
use crate::scope::{
    ConversationHandler, DependentHandler, RequestHandler, ScopeHandler, ScopeRegistry,
    SessionHandler, SingletonHandler,
};
use crate::types::{ClassId, LAZY_INSTANCE, OPTIONAL, PROVIDER, TypeDescriptor};
use ahash::RandomState;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

// =============================================================================
// Per-thread injection stack
// =============================================================================

thread_local! {
    /// Types currently being resolved on this thread, outermost first.
    static INJECTION_STACK: RefCell<Vec<TypeDescriptor>> = const { RefCell::new(Vec::new()) };
}

/// Pops its pushed entries when dropped, so the stack unwinds with errors.
struct StackGuard {
    entries: usize,
}

impl StackGuard {
    fn push(entry: &TypeDescriptor) -> Result<Self> {
        Self::push_entry(entry)?;
        Ok(Self { entries: 1 })
    }

    fn extend(&mut self, entry: &TypeDescriptor) -> Result<()> {
        Self::push_entry(entry)?;
        self.entries += 1;
        Ok(())
    }

    fn push_entry(entry: &TypeDescriptor) -> Result<()> {
        INJECTION_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(entry) {
                let mut chain: Vec<String> = stack.iter().map(ToString::to_string).collect();
                chain.push(entry.to_string());
                return Err(DiError::circular(&chain));
            }
            stack.push(entry.clone());
            Ok(())
        })
    }
}

impl Drop for StackGuard {
    fn drop(&mut self) {
        INJECTION_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            for _ in 0..self.entries {
                stack.pop();
            }
        });
    }
}

// =============================================================================
// Shared internals
// =============================================================================

/// Everything the injector and its deferred handles share. Handles hold a
/// `Weak` to these internals so scope-owned beans never keep the injector
/// alive through a reference cycle.
pub(crate) struct InjectorShared {
    registry: Arc<ClassRegistry>,
    resolver: Arc<ClassResolver>,
    assignability: Arc<Assignability>,
    lifecycle: Arc<LifecycleRunner>,
    scopes: ScopeRegistry,
    session: Arc<SessionHandler>,
    conversation: Arc<ConversationHandler>,
    /// Once-per-class-per-injector guard for static injection.
    statics_done: DashMap<ClassId, Arc<OnceCell<()>>, RandomState>,
    /// Injected static field values, keyed `(class, field)`.
    static_values: DashMap<(ClassId, String), Value, RandomState>,
    shut_down: AtomicBool,
    self_weak: Weak<InjectorShared>,
}

impl InjectorShared {
    pub(crate) fn resolver(&self) -> &ClassResolver {
        &self.resolver
    }

    pub(crate) fn lifecycle(&self) -> &LifecycleRunner {
        &self.lifecycle
    }

    fn ensure_active(&self) -> Result<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(DiError::illegal_state("injector has been shut down"));
        }
        Ok(())
    }

    /// Resolve and construct one instance for a non-deferred request.
    pub(crate) fn inject_bean(
        &self,
        target: &TypeDescriptor,
        qualifiers: &BTreeSet<Qualifier>,
    ) -> Result<Arc<Bean>> {
        self.ensure_active()?;

        let raw = target.raw_class();
        if matches!(raw.name(), PROVIDER | LAZY_INSTANCE | OPTIONAL) {
            return Err(DiError::InvalidType(format!(
                "{target} is only resolvable at an injection site"
            )));
        }
        self.assignability.validate_injection_point(target)?;

        let mut guard = StackGuard::push(target)?;

        let class = self.resolver.resolve_one(target, qualifiers)?;
        self.validate_type(target)?;

        // Guard the resolved class as well: the same class reached through
        // two different request types is still a cycle, and must surface as
        // one instead of deadlocking its scope cell.
        let canonical = TypeDescriptor::Class(class.id().clone());
        if canonical != *target {
            guard.extend(&canonical)?;
        }

        #[cfg(feature = "logging")]
        trace!(
            target: "wirecore",
            request = %target,
            class = %class.id(),
            "Resolved injection request"
        );

        let scope_tag = class.scope().cloned().unwrap_or_else(ScopeTag::dependent);
        let handler = self.scopes.get(&scope_tag).ok_or_else(|| {
            DiError::illegal_state(format!(
                "no handler registered for scope {scope_tag} of {}",
                class.id()
            ))
        })?;

        handler.get(&class, &mut || self.construct(&class))
    }

    /// Build, wire and initialize one instance of `class`.
    fn construct(&self, class: &Arc<ClassDescriptor>) -> Result<Arc<Bean>> {
        let ctor = select_constructor(class)?;

        let mut args = Vec::with_capacity(ctor.params.len());
        for param in &ctor.params {
            args.push(self.resolve_site(&param.ty, &param.qualifiers)?);
        }

        let initial: HashMap<String, Value, RandomState> = match &ctor.body {
            Some(body) => body(&args)?,
            None => ctor
                .params
                .iter()
                .map(|p| p.name.clone())
                .zip(args.iter().cloned())
                .collect(),
        };
        let bean = Bean::new(Arc::clone(class), initial);

        let hierarchy = self.registry.hierarchy_of(class.id());

        for cls in &hierarchy {
            self.inject_statics(cls, &bean)?;
        }
        for (idx, cls) in hierarchy.iter().enumerate() {
            self.inject_instance_fields(cls, &bean)?;
            self.invoke_instance_methods(cls, idx, &hierarchy, &bean)?;
        }

        self.lifecycle.invoke_post_construct(&bean)?;

        #[cfg(feature = "logging")]
        debug!(
            target: "wirecore",
            class = %class.id(),
            "Constructed and wired instance"
        );

        Ok(bean)
    }

    /// Resolve one injection site: a field, constructor parameter or method
    /// parameter. Deferred and optional shapes are handled here and only
    /// here.
    fn resolve_site(&self, ty: &TypeDescriptor, qualifiers: &BTreeSet<Qualifier>) -> Result<Value> {
        self.assignability.validate_injection_point(ty)?;

        match ty.raw_class().name() {
            PROVIDER => {
                let inner = sole_type_arg(ty)?;
                Ok(Value::Provider(Provider::new(
                    self.lazy_handle(inner, qualifiers),
                )))
            }
            LAZY_INSTANCE => {
                let inner = sole_type_arg(ty)?;
                Ok(Value::Lazy(self.lazy_handle(inner, qualifiers)))
            }
            OPTIONAL => {
                let inner = sole_type_arg(ty)?;
                if inner.raw_class().name() == OPTIONAL {
                    return Err(DiError::InvalidType(format!(
                        "nested optional injection point: {ty}"
                    )));
                }
                match self.inject_bean(&inner, qualifiers) {
                    Ok(bean) => Ok(Value::Optional(Some(bean))),
                    Err(err) if err.is_unsatisfied() => Ok(Value::Optional(None)),
                    Err(err) => Err(err),
                }
            }
            _ => Ok(Value::Bean(self.inject_bean(ty, qualifiers)?)),
        }
    }

    fn lazy_handle(&self, target: TypeDescriptor, qualifiers: &BTreeSet<Qualifier>) -> LazyInstance {
        LazyInstance::new(target, qualifiers.clone(), self.self_weak.clone())
    }

    /// Static fields and static injectable methods run once per class per
    /// injector, however many instances get built.
    fn inject_statics(&self, class: &Arc<ClassDescriptor>, trigger: &Arc<Bean>) -> Result<()> {
        let cell = if let Some(cell) = self.statics_done.get(class.id()) {
            Arc::clone(cell.value())
        } else {
            Arc::clone(
                self.statics_done
                    .entry(class.id().clone())
                    .or_insert_with(|| Arc::new(OnceCell::new()))
                    .value(),
            )
        };

        cell.get_or_try_init(|| {
            for field in class.fields().iter().filter(|f| f.injectable && f.is_static) {
                if field.is_final {
                    return Err(DiError::InvalidTarget(format!(
                        "static final field {}::{} cannot be injected",
                        class.id(),
                        field.name
                    )));
                }
                let value = self.resolve_site(&field.ty, &field.qualifiers)?;
                self.static_values
                    .insert((class.id().clone(), field.name.clone()), value);
            }

            for method in class
                .methods()
                .iter()
                .filter(|m| m.role == MethodRole::Inject && m.is_static)
            {
                check_method_shape(class, method)?;
                let args = self.resolve_params(method)?;
                if let Some(body) = &method.body {
                    body(trigger, &args)?;
                }
            }
            Ok(())
        })
        .map(|_| ())
    }

    fn inject_instance_fields(&self, class: &Arc<ClassDescriptor>, bean: &Arc<Bean>) -> Result<()> {
        for field in class.fields().iter().filter(|f| f.injectable && !f.is_static) {
            if field.is_final {
                return Err(DiError::InvalidTarget(format!(
                    "final field {}::{} cannot be injected",
                    class.id(),
                    field.name
                )));
            }
            let value = self.resolve_site(&field.ty, &field.qualifiers)?;
            bean.set(field.name.clone(), value);
        }
        Ok(())
    }

    fn invoke_instance_methods(
        &self,
        class: &Arc<ClassDescriptor>,
        idx: usize,
        hierarchy: &[Arc<ClassDescriptor>],
        bean: &Arc<Bean>,
    ) -> Result<()> {
        for method in class
            .methods()
            .iter()
            .filter(|m| m.role == MethodRole::Inject && !m.is_static)
        {
            if is_overridden(class, method, idx, hierarchy) {
                #[cfg(feature = "logging")]
                trace!(
                    target: "wirecore",
                    class = %class.id(),
                    method = method.name.as_str(),
                    "Skipping injectable method overridden in a subclass"
                );
                continue;
            }
            check_method_shape(class, method)?;
            let args = self.resolve_params(method)?;
            if let Some(body) = &method.body {
                body(bean, &args)?;
            }
        }
        Ok(())
    }

    fn resolve_params(&self, method: &MethodDescriptor) -> Result<Vec<Value>> {
        method
            .params
            .iter()
            .map(|param| self.resolve_site(&param.ty, &param.qualifiers))
            .collect()
    }

    /// Reject types the container must not construct: enums, primitives,
    /// synthetic, local and anonymous classes, non-static inner classes,
    /// recursively through generic type arguments.
    fn validate_type(&self, ty: &TypeDescriptor) -> Result<()> {
        let raw = ty.raw_class();
        if let Some(desc) = self.registry.get(&raw) {
            let rejected = if desc.is_enum() {
                Some("an enum")
            } else if desc.is_primitive() {
                Some("a primitive")
            } else if desc.is_synthetic() {
                Some("a synthetic class")
            } else if desc.is_local() {
                Some("a local class")
            } else if desc.is_anonymous() {
                Some("an anonymous class")
            } else if desc.is_inner() && !desc.is_static_member() {
                Some("a non-static inner class")
            } else {
                None
            };
            if let Some(kind) = rejected {
                return Err(DiError::InvalidType(format!("{raw} is {kind}")));
            }
        }
        for arg in ty.type_args() {
            if matches!(
                arg,
                TypeDescriptor::Class(_) | TypeDescriptor::Parameterized { .. }
            ) {
                self.validate_type(arg)?;
            }
        }
        if let TypeDescriptor::GenericArray { component } = ty {
            self.validate_type(component)?;
        }
        Ok(())
    }
}

// =============================================================================
// Public injector
// =============================================================================

/// The container facade: wires the resolver, scopes and lifecycle together.
///
/// # Examples
///
/// ```rust
/// use wirecore::injector::Injector;
/// use wirecore::metadata::{ClassDescriptor, FieldDescriptor, ScopeTag};
/// use wirecore::scanner::StaticScanner;
/// use wirecore::types::TypeDescriptor;
/// use std::sync::Arc;
///
/// let scanner = StaticScanner::with_classes([
///     ClassDescriptor::builder("app.Config")
///         .scope(ScopeTag::singleton())
///         .build(),
///     ClassDescriptor::builder("app.Service")
///         .field(FieldDescriptor::injectable("config", "app.Config"))
///         .build(),
/// ]);
///
/// let injector = Injector::new(Arc::new(scanner)).unwrap();
/// let service = injector.inject(&TypeDescriptor::class("app.Service")).unwrap();
/// assert!(service.bean("config").is_some());
/// ```
pub struct Injector {
    shared: Arc<InjectorShared>,
}

impl Injector {
    /// Create an injector with default configuration.
    pub fn new(scanner: Arc<dyn ClassScanner>) -> Result<Self> {
        Self::with_config(scanner, ContainerConfig::default())
    }

    /// Create an injector from validated configuration.
    pub fn with_config(scanner: Arc<dyn ClassScanner>, config: ContainerConfig) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(ClassRegistry::new());
        let assignability = Arc::new(Assignability::new(Arc::clone(&registry), &config.cache)?);
        let resolver = Arc::new(ClassResolver::new(
            Arc::clone(&registry),
            Arc::clone(&assignability),
            scanner,
            config.package_filters.clone(),
            &config.cache,
        )?);
        resolver.set_bindings_only(config.bindings_only);

        let lifecycle = Arc::new(LifecycleRunner::new(Arc::clone(&registry)));
        let session = Arc::new(SessionHandler::new(Arc::clone(&lifecycle)));
        let conversation = Arc::new(ConversationHandler::new(Arc::clone(&lifecycle)));

        let scopes = ScopeRegistry::new();
        scopes.register(
            ScopeTag::singleton(),
            Arc::new(SingletonHandler::new(Arc::clone(&lifecycle))),
        )?;
        scopes.register(
            ScopeTag::application(),
            Arc::new(SingletonHandler::new(Arc::clone(&lifecycle))),
        )?;
        scopes.register(
            ScopeTag::request(),
            Arc::new(RequestHandler::new(Arc::clone(&lifecycle))),
        )?;
        scopes.register(ScopeTag::session(), Arc::clone(&session) as Arc<dyn ScopeHandler>)?;
        scopes.register(
            ScopeTag::conversation(),
            Arc::clone(&conversation) as Arc<dyn ScopeHandler>,
        )?;
        scopes.register(ScopeTag::dependent(), Arc::new(DependentHandler::new()))?;

        #[cfg(feature = "logging")]
        debug!(
            target: "wirecore",
            bindings_only = config.bindings_only,
            package_filters = config.package_filters.len(),
            "Creating injector"
        );

        let shared = Arc::new_cyclic(|weak| InjectorShared {
            registry,
            resolver,
            assignability,
            lifecycle,
            scopes,
            session,
            conversation,
            statics_done: DashMap::with_hasher(RandomState::new()),
            static_values: DashMap::with_hasher(RandomState::new()),
            shut_down: AtomicBool::new(false),
            self_weak: weak.clone(),
        });

        Ok(Self { shared })
    }

    // =========================================================================
    // Injection
    // =========================================================================

    /// Resolve and construct a fully wired instance of `target`.
    ///
    /// The descriptor carries parameterization, so generic requests go
    /// through the same entry point.
    pub fn inject(&self, target: &TypeDescriptor) -> Result<Arc<Bean>> {
        self.shared.inject_bean(target, &BTreeSet::new())
    }

    /// [`Injector::inject`] with explicit qualifiers.
    pub fn inject_with(
        &self,
        target: &TypeDescriptor,
        qualifiers: BTreeSet<Qualifier>,
    ) -> Result<Arc<Bean>> {
        self.shared.inject_bean(target, &qualifiers)
    }

    /// Optional resolution: `Ok(None)` when nothing matches, every other
    /// failure propagates.
    pub fn inject_optional(
        &self,
        target: &TypeDescriptor,
        qualifiers: BTreeSet<Qualifier>,
    ) -> Result<Option<Arc<Bean>>> {
        match self.shared.inject_bean(target, &qualifiers) {
            Ok(bean) => Ok(Some(bean)),
            Err(err) if err.is_unsatisfied() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// A deferred iterable handle for `target`.
    pub fn lazy(&self, target: TypeDescriptor, qualifiers: BTreeSet<Qualifier>) -> LazyInstance {
        LazyInstance::new(target, qualifiers, Arc::downgrade(&self.shared))
    }

    /// A deferred get-only handle for `target`.
    pub fn provider(&self, target: TypeDescriptor, qualifiers: BTreeSet<Qualifier>) -> Provider {
        Provider::new(self.lazy(target, qualifiers))
    }

    /// Invoke pre-destroy on an instance owned by the caller (dependent
    /// beans and handle-produced instances).
    pub fn destroy(&self, instance: &Arc<Bean>) -> Result<()> {
        self.shared.lifecycle.invoke_pre_destroy(instance)
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Register a handler for a custom scope tag. Duplicate registration
    /// fails.
    pub fn register_scope(&self, tag: ScopeTag, handler: Arc<dyn ScopeHandler>) -> Result<()> {
        self.shared.ensure_active()?;
        self.shared.scopes.register(tag, handler)
    }

    /// Enable an alternative class; delegated to the resolver.
    pub fn enable_alternative(&self, class: ClassId) {
        self.shared.resolver.enable_alternative(class);
    }

    /// Install a binding; delegated to the resolver.
    pub fn bind(
        &self,
        target: TypeDescriptor,
        qualifiers: BTreeSet<Qualifier>,
        implementation: Arc<ClassDescriptor>,
    ) {
        self.shared.resolver.bind(target, qualifiers, implementation);
    }

    /// Toggle bindings-only resolution; delegated to the resolver.
    pub fn set_bindings_only(&self, flag: bool) {
        self.shared.resolver.set_bindings_only(flag);
    }

    // =========================================================================
    // Session and conversation context
    // =========================================================================

    /// Bind the calling thread to a session id.
    pub fn attach_session(&self, session: impl AsRef<str>) {
        self.shared.session.attach(session);
    }

    /// Unbind the calling thread from its session.
    pub fn detach_session(&self) {
        self.shared.session.detach();
    }

    /// Begin a conversation on the calling thread.
    pub fn begin_conversation(&self, conversation: impl AsRef<str>) {
        self.shared.conversation.begin(conversation);
    }

    /// End the calling thread's conversation, destroying its instances.
    /// Teardown failures are collected, not short-circuited.
    pub fn end_conversation(&self) -> Vec<DiError> {
        self.shared.conversation.end()
    }

    // =========================================================================
    // Introspection and shutdown
    // =========================================================================

    /// Value injected into a static field, if static injection ran for the
    /// class.
    pub fn static_value(&self, class: &ClassId, field: &str) -> Option<Value> {
        self.shared
            .static_values
            .get(&(class.clone(), field.to_string()))
            .map(|v| v.value().clone())
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shut_down.load(Ordering::Acquire)
    }

    /// Close every scope in registration order. Each scope's teardown
    /// errors are collected and returned; one failing scope never prevents
    /// the next from closing. Subsequent injections fail with an
    /// illegal-state error.
    pub fn shutdown(&self) -> Vec<DiError> {
        if self.shared.shut_down.swap(true, Ordering::AcqRel) {
            return Vec::new();
        }

        #[cfg(feature = "logging")]
        debug!(target: "wirecore", "Shutting down injector");

        self.shared.scopes.close_all()
    }
}

impl std::fmt::Debug for Injector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Injector")
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

// =============================================================================
// Construction helpers
// =============================================================================

/// Exactly one injectable constructor, else the no-argument constructor.
fn select_constructor(class: &Arc<ClassDescriptor>) -> Result<&ConstructorDescriptor> {
    let injectable: Vec<&ConstructorDescriptor> = class
        .constructors()
        .iter()
        .filter(|c| c.injectable)
        .collect();
    match injectable.len() {
        1 => Ok(injectable[0]),
        0 => class
            .constructors()
            .iter()
            .find(|c| c.params.is_empty())
            .ok_or_else(|| DiError::NoUsableConstructor {
                class: class.id().to_string(),
            }),
        count => Err(DiError::ConstructorAmbiguity {
            class: class.id().to_string(),
            count,
        }),
    }
}

/// Injectable methods must be concrete and non-generic.
fn check_method_shape(class: &Arc<ClassDescriptor>, method: &MethodDescriptor) -> Result<()> {
    if method.is_abstract {
        return Err(DiError::InvalidTarget(format!(
            "abstract method {}::{} cannot be injectable",
            class.id(),
            method.name
        )));
    }
    if method.is_generic {
        return Err(DiError::InvalidTarget(format!(
            "generic method {}::{} cannot be injectable",
            class.id(),
            method.name
        )));
    }
    Ok(())
}

/// A superclass method is skipped when a more derived class declares the
/// same signature. Private methods are never overridden; package-private
/// methods are overridden only within the same package.
fn is_overridden(
    class: &Arc<ClassDescriptor>,
    method: &MethodDescriptor,
    idx: usize,
    hierarchy: &[Arc<ClassDescriptor>],
) -> bool {
    if method.visibility == Visibility::Private {
        return false;
    }
    for derived in &hierarchy[idx + 1..] {
        for candidate in derived.methods() {
            if !method.same_signature(candidate) {
                continue;
            }
            if method.visibility == Visibility::PackagePrivate
                && class.package() != derived.package()
            {
                continue;
            }
            return true;
        }
    }
    false
}

/// `Provider<T>` / `LazyInstance<T>` / `Optional<T>` carry exactly one
/// type argument.
fn sole_type_arg(ty: &TypeDescriptor) -> Result<TypeDescriptor> {
    match ty.type_args() {
        [arg] => Ok(arg.clone()),
        _ => Err(DiError::definition(format!(
            "{ty} must carry exactly one type argument"
        ))),
    }
}
