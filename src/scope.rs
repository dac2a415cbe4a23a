//! Scope registry and handlers
//!
//! A scope handler owns the instances of one sharing policy and decides
//! when the injector's factory closure runs. Shared scopes guard only the
//! key being produced: a factory may re-enter the same handler for a
//! different class while its own key is still initializing.

use crate::bean::Bean;
use crate::error::{DiError, Result};
use crate::lifecycle::LifecycleRunner;
use crate::metadata::{ClassDescriptor, ScopeTag};
use crate::types::ClassId;
use ahash::RandomState;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "logging")]
use tracing::{debug, warn};

/// Instance-producing closure supplied by the injector.
pub type BeanFactory<'a> = dyn FnMut() -> Result<Arc<Bean>> + 'a;

/// Storage policy for one scope tag.
///
/// `get` returns an instance obeying the handler's sharing semantics;
/// `close` invokes pre-destroy on every owned instance (child-to-parent
/// within each instance's hierarchy) and releases storage. Close failures
/// are collected, not short-circuited.
pub trait ScopeHandler: Send + Sync {
    fn get(&self, class: &Arc<ClassDescriptor>, factory: &mut BeanFactory<'_>) -> Result<Arc<Bean>>;
    fn close(&self) -> Vec<DiError>;
}

/// Unique id distinguishing handler instances in thread-local partitions.
fn next_handler_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

// =============================================================================
// Singleton / application
// =============================================================================

/// One instance per class, shared across all threads.
///
/// Acquisition is per-key double-checked: a lock-free read of the cell map,
/// then initialization guarded by the key's own cell. The map's shard lock
/// is held only for the cheap cell insertion, never across the factory, so
/// producers can re-enter the scope for other keys.
pub struct SingletonHandler {
    lifecycle: Arc<LifecycleRunner>,
    cells: DashMap<ClassId, Arc<OnceCell<Arc<Bean>>>, RandomState>,
}

/// The application scope shares the singleton storage policy.
pub type ApplicationHandler = SingletonHandler;

impl SingletonHandler {
    pub fn new(lifecycle: Arc<LifecycleRunner>) -> Self {
        Self {
            lifecycle,
            cells: DashMap::with_hasher(RandomState::new()),
        }
    }

    fn cell_for(&self, id: &ClassId) -> Arc<OnceCell<Arc<Bean>>> {
        if let Some(cell) = self.cells.get(id) {
            return Arc::clone(cell.value());
        }
        Arc::clone(
            self.cells
                .entry(id.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        )
    }
}

impl ScopeHandler for SingletonHandler {
    fn get(&self, class: &Arc<ClassDescriptor>, factory: &mut BeanFactory<'_>) -> Result<Arc<Bean>> {
        let cell = self.cell_for(class.id());
        let bean = cell.get_or_try_init(|| factory())?;
        Ok(Arc::clone(bean))
    }

    fn close(&self) -> Vec<DiError> {
        let mut errors = Vec::new();
        let ids: Vec<ClassId> = self.cells.iter().map(|r| r.key().clone()).collect();
        for id in ids {
            if let Some((_, cell)) = self.cells.remove(&id)
                && let Some(bean) = cell.get()
                && let Err(err) = self.lifecycle.invoke_pre_destroy(bean)
            {
                #[cfg(feature = "logging")]
                warn!(
                    target: "wirecore",
                    class = %id,
                    error = %err,
                    "Pre-destroy failed during scope close"
                );
                errors.push(err);
            }
        }
        errors
    }
}

impl std::fmt::Debug for SingletonHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingletonHandler")
            .field("instances", &self.cells.len())
            .finish()
    }
}

// =============================================================================
// Request
// =============================================================================

thread_local! {
    /// Per-thread stores, partitioned by handler id. Insertion order is
    /// kept so teardown can run newest-first.
    static THREAD_STORES: RefCell<HashMap<u64, Vec<(ClassId, Arc<Bean>)>>> =
        RefCell::new(HashMap::new());

    /// Current session / conversation id per handler id.
    static CURRENT_CONTEXT: RefCell<HashMap<u64, Arc<str>>> = RefCell::new(HashMap::new());
}

/// One instance per thread per class; `close` tears down only the calling
/// thread's partition.
pub struct RequestHandler {
    id: u64,
    lifecycle: Arc<LifecycleRunner>,
}

impl RequestHandler {
    pub fn new(lifecycle: Arc<LifecycleRunner>) -> Self {
        Self {
            id: next_handler_id(),
            lifecycle,
        }
    }

    fn lookup(&self, id: &ClassId) -> Option<Arc<Bean>> {
        THREAD_STORES.with(|stores| {
            stores.borrow().get(&self.id).and_then(|store| {
                store
                    .iter()
                    .find(|(key, _)| key == id)
                    .map(|(_, bean)| Arc::clone(bean))
            })
        })
    }
}

impl ScopeHandler for RequestHandler {
    fn get(&self, class: &Arc<ClassDescriptor>, factory: &mut BeanFactory<'_>) -> Result<Arc<Bean>> {
        if let Some(bean) = self.lookup(class.id()) {
            return Ok(bean);
        }

        // The store borrow is released before the factory runs; a reentrant
        // factory resolving another class on this thread sees a consistent
        // store.
        let bean = factory()?;
        THREAD_STORES.with(|stores| {
            let mut stores = stores.borrow_mut();
            let store = stores.entry(self.id).or_default();
            if let Some((_, existing)) = store.iter().find(|(key, _)| key == class.id()) {
                return Ok(Arc::clone(existing));
            }
            store.push((class.id().clone(), Arc::clone(&bean)));
            Ok(bean)
        })
    }

    fn close(&self) -> Vec<DiError> {
        let drained = THREAD_STORES
            .with(|stores| stores.borrow_mut().remove(&self.id))
            .unwrap_or_default();

        let mut errors = Vec::new();
        for (_, bean) in drained.into_iter().rev() {
            if let Err(err) = self.lifecycle.invoke_pre_destroy(&bean) {
                errors.push(err);
            }
        }
        errors
    }
}

impl std::fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandler").field("id", &self.id).finish()
    }
}

// =============================================================================
// Session / conversation
// =============================================================================

/// Instances partitioned by a caller-supplied session id held in
/// thread-local context.
pub struct SessionHandler {
    id: u64,
    lifecycle: Arc<LifecycleRunner>,
    cells: DashMap<(Arc<str>, ClassId), Arc<OnceCell<Arc<Bean>>>, RandomState>,
}

impl SessionHandler {
    pub fn new(lifecycle: Arc<LifecycleRunner>) -> Self {
        Self {
            id: next_handler_id(),
            lifecycle,
            cells: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Bind the calling thread to a session.
    pub fn attach(&self, session: impl AsRef<str>) {
        let session: Arc<str> = Arc::from(session.as_ref());
        CURRENT_CONTEXT.with(|ctx| {
            ctx.borrow_mut().insert(self.id, session);
        });
    }

    /// Unbind the calling thread without destroying instances.
    pub fn detach(&self) {
        CURRENT_CONTEXT.with(|ctx| {
            ctx.borrow_mut().remove(&self.id);
        });
    }

    fn current(&self) -> Option<Arc<str>> {
        CURRENT_CONTEXT.with(|ctx| ctx.borrow().get(&self.id).cloned())
    }

    fn destroy_partition(&self, partition: &Arc<str>) -> Vec<DiError> {
        let keys: Vec<(Arc<str>, ClassId)> = self
            .cells
            .iter()
            .filter(|r| r.key().0 == *partition)
            .map(|r| r.key().clone())
            .collect();

        let mut errors = Vec::new();
        for key in keys {
            if let Some((_, cell)) = self.cells.remove(&key)
                && let Some(bean) = cell.get()
                && let Err(err) = self.lifecycle.invoke_pre_destroy(bean)
            {
                errors.push(err);
            }
        }
        errors
    }
}

impl ScopeHandler for SessionHandler {
    fn get(&self, class: &Arc<ClassDescriptor>, factory: &mut BeanFactory<'_>) -> Result<Arc<Bean>> {
        let session = self.current().ok_or_else(|| {
            DiError::illegal_state(format!(
                "no session attached while resolving {}",
                class.id()
            ))
        })?;

        let key = (session, class.id().clone());
        let cell = if let Some(cell) = self.cells.get(&key) {
            Arc::clone(cell.value())
        } else {
            Arc::clone(
                self.cells
                    .entry(key)
                    .or_insert_with(|| Arc::new(OnceCell::new()))
                    .value(),
            )
        };
        let bean = cell.get_or_try_init(|| factory())?;
        Ok(Arc::clone(bean))
    }

    /// Destroy the current session's contents and detach the thread.
    fn close(&self) -> Vec<DiError> {
        let Some(session) = self.current() else {
            return Vec::new();
        };
        self.detach();
        self.destroy_partition(&session)
    }
}

impl std::fmt::Debug for SessionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandler")
            .field("instances", &self.cells.len())
            .finish()
    }
}

/// Like the session scope, but demarcated by explicit `begin`/`end` calls
/// on a caller-supplied conversation id.
pub struct ConversationHandler {
    inner: SessionHandler,
}

impl ConversationHandler {
    pub fn new(lifecycle: Arc<LifecycleRunner>) -> Self {
        Self {
            inner: SessionHandler::new(lifecycle),
        }
    }

    /// Begin (or resume) a conversation on the calling thread.
    pub fn begin(&self, conversation: impl AsRef<str>) {
        self.inner.attach(conversation);
    }

    /// End the current conversation: destroy its instances and detach.
    pub fn end(&self) -> Vec<DiError> {
        self.inner.close()
    }

    pub fn current(&self) -> Option<Arc<str>> {
        self.inner.current()
    }
}

impl ScopeHandler for ConversationHandler {
    fn get(&self, class: &Arc<ClassDescriptor>, factory: &mut BeanFactory<'_>) -> Result<Arc<Bean>> {
        if self.inner.current().is_none() {
            return Err(DiError::illegal_state(format!(
                "no conversation begun while resolving {}",
                class.id()
            )));
        }
        self.inner.get(class, factory)
    }

    fn close(&self) -> Vec<DiError> {
        self.inner.close()
    }
}

impl std::fmt::Debug for ConversationHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationHandler")
            .field("current", &self.current())
            .finish()
    }
}

// =============================================================================
// Dependent
// =============================================================================

/// Never caches: a fresh instance per injection, owned by the injecting
/// site rather than the scope.
#[derive(Debug, Default)]
pub struct DependentHandler;

impl DependentHandler {
    pub fn new() -> Self {
        Self
    }
}

impl ScopeHandler for DependentHandler {
    fn get(&self, _class: &Arc<ClassDescriptor>, factory: &mut BeanFactory<'_>) -> Result<Arc<Bean>> {
        factory()
    }

    fn close(&self) -> Vec<DiError> {
        Vec::new()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Maps scope tags to handlers, preserving registration order for shutdown.
pub struct ScopeRegistry {
    handlers: Mutex<Vec<(ScopeTag, Arc<dyn ScopeHandler>)>>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Register a handler for a tag. Duplicate registration fails.
    pub fn register(&self, tag: ScopeTag, handler: Arc<dyn ScopeHandler>) -> Result<()> {
        let mut handlers = self.handlers.lock();
        if handlers.iter().any(|(existing, _)| *existing == tag) {
            return Err(DiError::illegal_state(format!(
                "scope {tag} is already registered"
            )));
        }

        #[cfg(feature = "logging")]
        debug!(target: "wirecore", scope = %tag, "Registering scope handler");

        handlers.push((tag, handler));
        Ok(())
    }

    pub fn get(&self, tag: &ScopeTag) -> Option<Arc<dyn ScopeHandler>> {
        self.handlers
            .lock()
            .iter()
            .find(|(existing, _)| existing == tag)
            .map(|(_, handler)| Arc::clone(handler))
    }

    pub fn is_registered(&self, tag: &ScopeTag) -> bool {
        self.get(tag).is_some()
    }

    /// Close every scope in registration order; each scope's errors are
    /// collected so one failing scope never prevents the next from closing.
    pub fn close_all(&self) -> Vec<DiError> {
        let handlers: Vec<(ScopeTag, Arc<dyn ScopeHandler>)> =
            self.handlers.lock().iter().cloned().collect();

        let mut errors = Vec::new();
        for (_tag, handler) in handlers {
            let scope_errors = handler.close();

            #[cfg(feature = "logging")]
            if !scope_errors.is_empty() {
                warn!(
                    target: "wirecore",
                    scope = %_tag,
                    errors = scope_errors.len(),
                    "Scope close reported errors"
                );
            }

            errors.extend(scope_errors);
        }
        errors
    }
}

impl Default for ScopeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScopeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeRegistry")
            .field("scopes", &self.handlers.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ClassRegistry, MethodDescriptor};
    use std::sync::Barrier;
    use std::sync::atomic::AtomicU32;

    fn lifecycle() -> Arc<LifecycleRunner> {
        Arc::new(LifecycleRunner::new(Arc::new(ClassRegistry::new())))
    }

    fn fresh_bean(class: &Arc<ClassDescriptor>) -> Arc<Bean> {
        Bean::new(Arc::clone(class), HashMap::default())
    }

    #[test]
    fn singleton_shares_one_instance() {
        let handler = SingletonHandler::new(lifecycle());
        let class = ClassDescriptor::builder("app.S").build();
        let created = AtomicU32::new(0);

        let a = handler
            .get(&class, &mut || {
                created.fetch_add(1, Ordering::SeqCst);
                Ok(fresh_bean(&class))
            })
            .unwrap();
        let b = handler.get(&class, &mut || unreachable!()).unwrap();

        assert!(Bean::same_instance(&a, &b));
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn singleton_shares_across_threads() {
        let handler = Arc::new(SingletonHandler::new(lifecycle()));
        let class = ClassDescriptor::builder("app.S").build();
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let handler = Arc::clone(&handler);
                let class = Arc::clone(&class);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    let bean = handler
                        .get(&class, &mut || {
                            Ok(Bean::new(Arc::clone(&class), HashMap::default()))
                        })
                        .unwrap();
                    Arc::as_ptr(&bean) as usize
                })
            })
            .collect();

        let ptrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ptrs.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn singleton_factory_may_reenter_for_other_keys() {
        let handler = Arc::new(SingletonHandler::new(lifecycle()));
        let class_a = ClassDescriptor::builder("app.A").build();
        let class_b = ClassDescriptor::builder("app.B").build();

        let inner_handler = Arc::clone(&handler);
        let inner_class = Arc::clone(&class_b);
        let a = handler
            .get(&class_a, &mut || {
                // Producing A resolves B through the same scope.
                let b = inner_handler
                    .get(&inner_class, &mut || {
                        Ok(Bean::new(Arc::clone(&inner_class), HashMap::default()))
                    })
                    .unwrap();
                let bean = Bean::new(Arc::clone(&class_a), HashMap::default());
                bean.set("b", crate::bean::Value::Bean(b));
                Ok(bean)
            })
            .unwrap();

        assert!(a.bean("b").is_some());
        let b_again = handler.get(&class_b, &mut || unreachable!()).unwrap();
        assert!(Bean::same_instance(&a.bean("b").unwrap(), &b_again));
    }

    #[test]
    fn singleton_close_invokes_pre_destroy_and_continues_on_error() {
        let registry = Arc::new(ClassRegistry::new());
        let destroyed = Arc::new(parking_lot::Mutex::new(Vec::<String>::new()));

        let log = Arc::clone(&destroyed);
        registry.insert(
            ClassDescriptor::builder("app.Good")
                .method(MethodDescriptor::pre_destroy("close").with_body(Arc::new(
                    move |bean, _| {
                        log.lock().push(bean.class_id().name().to_string());
                        Ok(())
                    },
                )))
                .build(),
        );
        registry.insert(
            ClassDescriptor::builder("app.Bad")
                .method(MethodDescriptor::pre_destroy("close").with_body(Arc::new(|_, _| {
                    Err(DiError::internal("teardown failure"))
                })))
                .build(),
        );

        let handler = SingletonHandler::new(Arc::new(LifecycleRunner::new(Arc::clone(&registry))));
        for name in ["app.Good", "app.Bad"] {
            let class = registry.get(&ClassId::new(name)).unwrap();
            handler
                .get(&class, &mut || {
                    Ok(Bean::new(Arc::clone(&class), HashMap::default()))
                })
                .unwrap();
        }

        let errors = handler.close();
        assert_eq!(errors.len(), 1);
        assert_eq!(destroyed.lock().as_slice(), ["app.Good"]);
    }

    #[test]
    fn request_scope_partitions_per_thread() {
        let handler = Arc::new(RequestHandler::new(lifecycle()));
        let class = ClassDescriptor::builder("app.Ctx").build();

        let local = handler
            .get(&class, &mut || Ok(fresh_bean(&class)))
            .unwrap();
        let local_again = handler.get(&class, &mut || unreachable!()).unwrap();
        assert!(Bean::same_instance(&local, &local_again));

        let other_ptr = {
            let handler = Arc::clone(&handler);
            let class = Arc::clone(&class);
            std::thread::spawn(move || {
                let bean = handler
                    .get(&class, &mut || {
                        Ok(Bean::new(Arc::clone(&class), HashMap::default()))
                    })
                    .unwrap();
                Arc::as_ptr(&bean) as usize
            })
            .join()
            .unwrap()
        };
        assert_ne!(Arc::as_ptr(&local) as usize, other_ptr);

        // Closing on this thread empties only this thread's partition.
        assert!(handler.close().is_empty());
        let recreated = handler
            .get(&class, &mut || Ok(fresh_bean(&class)))
            .unwrap();
        assert!(!Bean::same_instance(&local, &recreated));
    }

    #[test]
    fn session_scope_partitions_by_id() {
        let handler = SessionHandler::new(lifecycle());
        let class = ClassDescriptor::builder("app.Cart").build();

        handler.attach("alice");
        let alice = handler
            .get(&class, &mut || Ok(fresh_bean(&class)))
            .unwrap();

        handler.attach("bob");
        let bob = handler
            .get(&class, &mut || Ok(fresh_bean(&class)))
            .unwrap();
        assert!(!Bean::same_instance(&alice, &bob));

        // Closing bob's session leaves alice's instance in place.
        let errors = handler.close();
        assert!(errors.is_empty());

        handler.attach("alice");
        let alice_again = handler.get(&class, &mut || unreachable!()).unwrap();
        assert!(Bean::same_instance(&alice, &alice_again));
    }

    #[test]
    fn session_get_without_attachment_is_illegal_state() {
        let handler = SessionHandler::new(lifecycle());
        let class = ClassDescriptor::builder("app.Cart").build();

        let err = handler
            .get(&class, &mut || Ok(fresh_bean(&class)))
            .unwrap_err();
        assert!(matches!(err, DiError::IllegalState(_)));
    }

    #[test]
    fn conversation_begin_end() {
        let handler = ConversationHandler::new(lifecycle());
        let class = ClassDescriptor::builder("app.Flow").build();

        handler.begin("checkout");
        let first = handler
            .get(&class, &mut || Ok(fresh_bean(&class)))
            .unwrap();
        assert_eq!(handler.current().as_deref(), Some("checkout"));

        assert!(handler.end().is_empty());
        assert!(handler.current().is_none());

        // A new conversation under the same id starts fresh.
        handler.begin("checkout");
        let second = handler
            .get(&class, &mut || Ok(fresh_bean(&class)))
            .unwrap();
        assert!(!Bean::same_instance(&first, &second));
    }

    #[test]
    fn dependent_scope_never_caches() {
        let handler = DependentHandler::new();
        let class = ClassDescriptor::builder("app.D").build();

        let a = handler
            .get(&class, &mut || Ok(fresh_bean(&class)))
            .unwrap();
        let b = handler
            .get(&class, &mut || Ok(fresh_bean(&class)))
            .unwrap();
        assert!(!Bean::same_instance(&a, &b));
        assert!(handler.close().is_empty());
    }

    #[test]
    fn scope_registry_rejects_duplicates() {
        let registry = ScopeRegistry::new();
        registry
            .register(ScopeTag::singleton(), Arc::new(SingletonHandler::new(lifecycle())))
            .unwrap();

        let err = registry
            .register(ScopeTag::singleton(), Arc::new(SingletonHandler::new(lifecycle())))
            .unwrap_err();
        assert!(matches!(err, DiError::IllegalState(_)));
        assert!(registry.is_registered(&ScopeTag::singleton()));
    }
}
