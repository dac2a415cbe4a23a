//! Lifecycle callbacks
//!
//! Walks the precomputed root-to-leaf class hierarchy and invokes
//! post-construct callbacks parent-first and pre-destroy callbacks
//! child-first. Private callbacks are included; a callback declaring
//! parameters is malformed.

use crate::bean::Bean;
use crate::error::{DiError, Result};
use crate::metadata::{ClassDescriptor, ClassRegistry, MethodDescriptor, MethodRole};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

/// Invokes lifecycle callbacks over the class hierarchy.
pub struct LifecycleRunner {
    registry: Arc<ClassRegistry>,
}

impl LifecycleRunner {
    pub fn new(registry: Arc<ClassRegistry>) -> Self {
        Self { registry }
    }

    /// Root-to-leaf hierarchy of a class, the class itself last.
    pub fn hierarchy_of(&self, bean: &Bean) -> Vec<Arc<ClassDescriptor>> {
        self.registry.hierarchy_of(bean.class_id())
    }

    /// Invoke every post-construct callback, root to leaf, once per class.
    ///
    /// Callback errors propagate to the caller.
    pub fn invoke_post_construct(&self, bean: &Bean) -> Result<()> {
        for class in self.hierarchy_of(bean) {
            for method in declared_callbacks(&class, MethodRole::PostConstruct) {
                self.invoke(bean, &class, method)?;
            }
        }
        Ok(())
    }

    /// Invoke every pre-destroy callback, leaf to root, once per class.
    pub fn invoke_pre_destroy(&self, bean: &Bean) -> Result<()> {
        for class in self.hierarchy_of(bean).iter().rev() {
            for method in declared_callbacks(class, MethodRole::PreDestroy) {
                self.invoke(bean, class, method)?;
            }
        }
        Ok(())
    }

    fn invoke(
        &self,
        bean: &Bean,
        class: &Arc<ClassDescriptor>,
        method: &MethodDescriptor,
    ) -> Result<()> {
        if !method.params.is_empty() {
            return Err(DiError::InvalidLifecycle(format!(
                "{}::{} must not declare parameters",
                class.id(),
                method.name
            )));
        }

        #[cfg(feature = "logging")]
        trace!(
            target: "wirecore",
            class = %class.id(),
            method = method.name.as_str(),
            role = ?method.role,
            "Invoking lifecycle callback"
        );

        if let Some(body) = &method.body {
            body(bean, &[])?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for LifecycleRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleRunner").finish()
    }
}

fn declared_callbacks(
    class: &Arc<ClassDescriptor>,
    role: MethodRole,
) -> impl Iterator<Item = &MethodDescriptor> {
    class.methods().iter().filter(move |m| m.role == role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Visibility;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    type EventLog = Arc<Mutex<Vec<String>>>;

    fn recording(log: &EventLog, event: &str) -> Arc<crate::bean::MethodFn> {
        let log = Arc::clone(log);
        let event = event.to_string();
        Arc::new(move |_bean, _args| {
            log.lock().push(event.clone());
            Ok(())
        })
    }

    fn parent_child_registry(log: &EventLog) -> (Arc<ClassRegistry>, Arc<Bean>) {
        let registry = Arc::new(ClassRegistry::new());
        registry.insert(
            ClassDescriptor::builder("app.Parent")
                .method(
                    MethodDescriptor::post_construct("initParent")
                        .visibility(Visibility::Private)
                        .with_body(recording(log, "parent.init")),
                )
                .method(
                    MethodDescriptor::pre_destroy("closeParent")
                        .with_body(recording(log, "parent.close")),
                )
                .build(),
        );
        let child = ClassDescriptor::builder("app.Child")
            .superclass("app.Parent")
            .method(
                MethodDescriptor::post_construct("initChild")
                    .with_body(recording(log, "child.init")),
            )
            .method(
                MethodDescriptor::pre_destroy("closeChild")
                    .with_body(recording(log, "child.close")),
            )
            .build();
        registry.insert(Arc::clone(&child));

        let bean = Bean::new(child, HashMap::default());
        (registry, bean)
    }

    #[test]
    fn post_construct_runs_parent_before_child() {
        let log: EventLog = Arc::default();
        let (registry, bean) = parent_child_registry(&log);

        LifecycleRunner::new(registry)
            .invoke_post_construct(&bean)
            .unwrap();
        assert_eq!(*log.lock(), vec!["parent.init", "child.init"]);
    }

    #[test]
    fn pre_destroy_runs_child_before_parent() {
        let log: EventLog = Arc::default();
        let (registry, bean) = parent_child_registry(&log);

        LifecycleRunner::new(registry)
            .invoke_pre_destroy(&bean)
            .unwrap();
        assert_eq!(*log.lock(), vec!["child.close", "parent.close"]);
    }

    #[test]
    fn callback_with_parameters_is_invalid() {
        let registry = Arc::new(ClassRegistry::new());
        let class = ClassDescriptor::builder("app.Bad")
            .method(
                MethodDescriptor::post_construct("init").with_params(vec![
                    crate::metadata::ParamDescriptor::new("x", "app.Dep"),
                ]),
            )
            .build();
        registry.insert(Arc::clone(&class));
        let bean = Bean::new(class, HashMap::default());

        let err = LifecycleRunner::new(registry)
            .invoke_post_construct(&bean)
            .unwrap_err();
        assert!(matches!(err, DiError::InvalidLifecycle(_)));
    }

    #[test]
    fn callback_errors_propagate() {
        let registry = Arc::new(ClassRegistry::new());
        let class = ClassDescriptor::builder("app.Flaky")
            .method(
                MethodDescriptor::pre_destroy("close").with_body(Arc::new(|_, _| {
                    Err(DiError::internal("close blew up"))
                })),
            )
            .build();
        registry.insert(Arc::clone(&class));
        let bean = Bean::new(class, HashMap::default());

        let err = LifecycleRunner::new(registry)
            .invoke_pre_destroy(&bean)
            .unwrap_err();
        assert!(matches!(err, DiError::InternalInvariant(_)));
    }
}
