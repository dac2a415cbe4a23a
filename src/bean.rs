//! Constructed-instance model
//!
//! A [`Bean`] is one container-constructed instance: a handle to its class
//! descriptor plus named slots holding whatever the constructor and the
//! injected fields put there. Scope records own beans; `Arc` identity is
//! instance identity.

use crate::error::Result;
use crate::lazy::{LazyInstance, Provider};
use crate::metadata::ClassDescriptor;
use crate::types::ClassId;
use ahash::RandomState;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Constructor body: maps resolved arguments to the initial slot state.
pub type ConstructorFn =
    dyn Fn(&[Value]) -> Result<HashMap<String, Value, RandomState>> + Send + Sync;

/// Method body: invoked with the receiving bean and resolved arguments.
pub type MethodFn = dyn Fn(&Bean, &[Value]) -> Result<()> + Send + Sync;

/// A value held in a bean slot or passed to a method.
#[derive(Clone)]
pub enum Value {
    /// A fully constructed instance.
    Bean(Arc<Bean>),
    /// A deferred iterable handle captured at the injection site.
    Lazy(LazyInstance),
    /// A deferred get-only handle captured at the injection site.
    Provider(Provider),
    /// An optional dependency; `None` when resolution was unsatisfied.
    Optional(Option<Arc<Bean>>),
}

impl Value {
    /// The instance, when this value is a constructed bean.
    pub fn as_bean(&self) -> Option<&Arc<Bean>> {
        match self {
            Self::Bean(bean) => Some(bean),
            _ => None,
        }
    }

    pub fn as_lazy(&self) -> Option<&LazyInstance> {
        match self {
            Self::Lazy(lazy) => Some(lazy),
            _ => None,
        }
    }

    pub fn as_provider(&self) -> Option<&Provider> {
        match self {
            Self::Provider(provider) => Some(provider),
            _ => None,
        }
    }

    pub fn as_optional(&self) -> Option<&Option<Arc<Bean>>> {
        match self {
            Self::Optional(opt) => Some(opt),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bean(bean) => write!(f, "Bean({})", bean.class_id()),
            Self::Lazy(lazy) => write!(f, "Lazy({})", lazy.target()),
            Self::Provider(provider) => write!(f, "Provider({})", provider.target()),
            Self::Optional(Some(bean)) => write!(f, "Optional({})", bean.class_id()),
            Self::Optional(None) => write!(f, "Optional(empty)"),
        }
    }
}

/// One constructed, wired instance.
pub struct Bean {
    class: Arc<ClassDescriptor>,
    state: RwLock<HashMap<String, Value, RandomState>>,
}

impl Bean {
    /// Create an instance with the given initial slot state.
    pub(crate) fn new(
        class: Arc<ClassDescriptor>,
        initial: HashMap<String, Value, RandomState>,
    ) -> Arc<Self> {
        Arc::new(Self {
            class,
            state: RwLock::new(initial),
        })
    }

    #[inline]
    pub fn class(&self) -> &Arc<ClassDescriptor> {
        &self.class
    }

    #[inline]
    pub fn class_id(&self) -> &ClassId {
        self.class.id()
    }

    /// Read a slot. Values are cheap clones (`Arc` handles).
    pub fn get(&self, slot: &str) -> Option<Value> {
        self.state.read().get(slot).cloned()
    }

    /// Write a slot; field injection goes through here.
    pub fn set(&self, slot: impl Into<String>, value: Value) {
        self.state.write().insert(slot.into(), value);
    }

    /// Convenience: read a slot holding a constructed bean.
    pub fn bean(&self, slot: &str) -> Option<Arc<Bean>> {
        match self.get(slot) {
            Some(Value::Bean(bean)) => Some(bean),
            _ => None,
        }
    }

    /// Instance identity.
    #[inline]
    pub fn same_instance(a: &Arc<Bean>, b: &Arc<Bean>) -> bool {
        Arc::ptr_eq(a, b)
    }
}

impl std::fmt::Debug for Bean {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bean")
            .field("class", &self.class_id())
            .field("slots", &self.state.read().len())
            .finish()
    }
}
