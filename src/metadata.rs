//! Class metadata model
//!
//! Descriptors replace reflection: an embedding layer (or a test) describes
//! each concrete class once (constructors, fields, methods, qualifiers,
//! scope) and the container works exclusively against that model.
//! Descriptors are immutable after construction and shared via `Arc`.

use crate::bean::{ConstructorFn, MethodFn};
use crate::types::{ClassId, OBJECT, TypeDescriptor};
use ahash::RandomState;
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

// =============================================================================
// Qualifiers and scope tags
// =============================================================================

/// A tagged annotation value narrowing candidate selection.
///
/// Equality is structural over `kind` and `members`. The built-ins are
/// `Default`, `Any` and `Named{value}`; every other kind is a user qualifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Qualifier {
    kind: String,
    members: BTreeMap<String, String>,
}

impl Qualifier {
    pub const DEFAULT: &'static str = "Default";
    pub const ANY: &'static str = "Any";
    pub const NAMED: &'static str = "Named";

    /// A user-defined qualifier with no members.
    pub fn user(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            members: BTreeMap::new(),
        }
    }

    /// The built-in `Default` qualifier.
    pub fn default_qualifier() -> Self {
        Self::user(Self::DEFAULT)
    }

    /// The built-in `Any` qualifier, which matches every candidate.
    pub fn any() -> Self {
        Self::user(Self::ANY)
    }

    /// The built-in `Named{value}` qualifier.
    pub fn named(value: impl Into<String>) -> Self {
        let mut members = BTreeMap::new();
        members.insert("value".to_string(), value.into());
        Self {
            kind: Self::NAMED.to_string(),
            members,
        }
    }

    /// Add a member to this qualifier.
    pub fn with_member(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.members.insert(name.into(), value.into());
        self
    }

    #[inline]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[inline]
    pub fn member(&self, name: &str) -> Option<&str> {
        self.members.get(name).map(String::as_str)
    }

    #[inline]
    pub fn is_default(&self) -> bool {
        self.kind == Self::DEFAULT
    }

    #[inline]
    pub fn is_any(&self) -> bool {
        self.kind == Self::ANY
    }

    /// True for everything that is not `Default` or `Any`. `Named` counts as
    /// a user qualifier for selection purposes.
    #[inline]
    pub fn is_user(&self) -> bool {
        !self.is_default() && !self.is_any()
    }
}

impl std::fmt::Display for Qualifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.members.is_empty() {
            return write!(f, "@{}", self.kind);
        }
        write!(f, "@{}(", self.kind)?;
        for (i, (k, v)) in self.members.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        write!(f, ")")
    }
}

impl std::fmt::Debug for Qualifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

/// Render a qualifier set for error messages.
pub(crate) fn format_qualifiers(qualifiers: &BTreeSet<Qualifier>) -> String {
    qualifiers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Identifier of an instance-sharing policy.
///
/// A class carries at most one scope tag; a class without one is dependent
/// (fresh instance per injection).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeTag(Arc<str>);

impl ScopeTag {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn singleton() -> Self {
        Self::new("singleton")
    }

    pub fn application() -> Self {
        Self::new("application")
    }

    pub fn request() -> Self {
        Self::new("request")
    }

    pub fn session() -> Self {
        Self::new("session")
    }

    pub fn conversation() -> Self {
        Self::new("conversation")
    }

    pub fn dependent() -> Self {
        Self::new("dependent")
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ScopeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Debug for ScopeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ScopeTag({})", self.0)
    }
}

/// Binding-table key: a target type plus the qualifier set requested at the
/// injection point. Hash and equality are structural.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct MappingKey {
    pub target: TypeDescriptor,
    pub qualifiers: BTreeSet<Qualifier>,
}

impl MappingKey {
    pub fn new(target: TypeDescriptor, qualifiers: BTreeSet<Qualifier>) -> Self {
        Self { target, qualifiers }
    }
}

// =============================================================================
// Member descriptors
// =============================================================================

/// Method (and constructor-parameter) visibility, used by override detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    PackagePrivate,
    Private,
}

/// One formal parameter of a constructor or method.
#[derive(Clone)]
pub struct ParamDescriptor {
    pub name: String,
    pub ty: TypeDescriptor,
    pub qualifiers: BTreeSet<Qualifier>,
}

impl ParamDescriptor {
    pub fn new(name: impl Into<String>, ty: impl Into<TypeDescriptor>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            qualifiers: BTreeSet::new(),
        }
    }

    pub fn with_qualifier(mut self, q: Qualifier) -> Self {
        self.qualifiers.insert(q);
        self
    }
}

impl std::fmt::Debug for ParamDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.ty)
    }
}

/// A declared constructor.
///
/// The optional body maps resolved arguments to the instance's initial slot
/// state; without one, arguments land in slots named after the parameters.
#[derive(Clone)]
pub struct ConstructorDescriptor {
    pub params: Vec<ParamDescriptor>,
    pub injectable: bool,
    pub body: Option<Arc<ConstructorFn>>,
}

impl ConstructorDescriptor {
    /// The implicit no-argument constructor.
    pub fn no_arg() -> Self {
        Self {
            params: Vec::new(),
            injectable: false,
            body: None,
        }
    }

    /// A constructor marked injectable with the given parameters.
    pub fn injectable(params: Vec<ParamDescriptor>) -> Self {
        Self {
            params,
            injectable: true,
            body: None,
        }
    }

    pub fn with_body(mut self, body: Arc<ConstructorFn>) -> Self {
        self.body = Some(body);
        self
    }
}

impl std::fmt::Debug for ConstructorDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstructorDescriptor")
            .field("params", &self.params)
            .field("injectable", &self.injectable)
            .finish()
    }
}

/// A declared field.
#[derive(Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: TypeDescriptor,
    pub qualifiers: BTreeSet<Qualifier>,
    pub injectable: bool,
    pub is_static: bool,
    pub is_final: bool,
}

impl FieldDescriptor {
    /// An instance field marked injectable.
    pub fn injectable(name: impl Into<String>, ty: impl Into<TypeDescriptor>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            qualifiers: BTreeSet::new(),
            injectable: true,
            is_static: false,
            is_final: false,
        }
    }

    pub fn with_qualifier(mut self, q: Qualifier) -> Self {
        self.qualifiers.insert(q);
        self
    }

    pub fn static_(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn final_(mut self) -> Self {
        self.is_final = true;
        self
    }
}

impl std::fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.ty)
    }
}

/// Role a method plays for the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MethodRole {
    /// Declared but not container-driven; participates in override shadowing.
    #[default]
    Plain,
    /// Injectable initializer invoked with resolved parameters.
    Inject,
    /// Zero-parameter callback invoked after construction, root to leaf.
    PostConstruct,
    /// Zero-parameter callback invoked before destruction, leaf to root.
    PreDestroy,
}

/// A declared method.
#[derive(Clone)]
pub struct MethodDescriptor {
    pub name: String,
    pub params: Vec<ParamDescriptor>,
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_generic: bool,
    pub role: MethodRole,
    pub body: Option<Arc<MethodFn>>,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>, role: MethodRole) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            visibility: Visibility::Public,
            is_static: false,
            is_abstract: false,
            is_generic: false,
            role,
            body: None,
        }
    }

    /// An injectable initializer method.
    pub fn inject(name: impl Into<String>, params: Vec<ParamDescriptor>) -> Self {
        let mut m = Self::new(name, MethodRole::Inject);
        m.params = params;
        m
    }

    /// A post-construct callback.
    pub fn post_construct(name: impl Into<String>) -> Self {
        Self::new(name, MethodRole::PostConstruct)
    }

    /// A pre-destroy callback.
    pub fn pre_destroy(name: impl Into<String>) -> Self {
        Self::new(name, MethodRole::PreDestroy)
    }

    /// A plain method that only participates in override shadowing.
    pub fn plain(name: impl Into<String>, params: Vec<ParamDescriptor>) -> Self {
        let mut m = Self::new(name, MethodRole::Plain);
        m.params = params;
        m
    }

    pub fn with_body(mut self, body: Arc<MethodFn>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_params(mut self, params: Vec<ParamDescriptor>) -> Self {
        self.params = params;
        self
    }

    pub fn visibility(mut self, v: Visibility) -> Self {
        self.visibility = v;
        self
    }

    pub fn static_(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn abstract_(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn generic(mut self) -> Self {
        self.is_generic = true;
        self
    }

    /// True when `other`, declared in a more derived class, has the same
    /// name and parameter types.
    pub fn same_signature(&self, other: &MethodDescriptor) -> bool {
        self.name == other.name
            && self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(other.params.iter())
                .all(|(a, b)| a.ty == b.ty)
    }
}

impl std::fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("role", &self.role)
            .finish()
    }
}

// =============================================================================
// Class descriptors
// =============================================================================

/// A concrete class known to the container.
///
/// Built once per scan through [`ClassDescriptor::builder`], then shared
/// read-only until container shutdown.
pub struct ClassDescriptor {
    id: ClassId,
    superclass: Option<TypeDescriptor>,
    interfaces: Vec<TypeDescriptor>,
    type_params: Vec<String>,
    qualifiers: BTreeSet<Qualifier>,
    scope: Option<ScopeTag>,
    is_alternative: bool,
    is_abstract: bool,
    is_interface: bool,
    is_array: bool,
    is_enum: bool,
    is_primitive: bool,
    is_synthetic: bool,
    is_local: bool,
    is_anonymous: bool,
    is_inner: bool,
    is_static_member: bool,
    constructors: Vec<ConstructorDescriptor>,
    fields: Vec<FieldDescriptor>,
    methods: Vec<MethodDescriptor>,
}

impl ClassDescriptor {
    /// Start describing a class.
    pub fn builder(name: impl AsRef<str>) -> ClassDescriptorBuilder {
        ClassDescriptorBuilder::new(ClassId::new(name))
    }

    #[inline]
    pub fn id(&self) -> &ClassId {
        &self.id
    }

    #[inline]
    pub fn package(&self) -> &str {
        self.id.package()
    }

    /// Generic superclass descriptor; `None` for the root, interfaces and
    /// primitives.
    #[inline]
    pub fn superclass(&self) -> Option<&TypeDescriptor> {
        self.superclass.as_ref()
    }

    /// Generic interface descriptors.
    #[inline]
    pub fn interfaces(&self) -> &[TypeDescriptor] {
        &self.interfaces
    }

    #[inline]
    pub fn type_params(&self) -> &[String] {
        &self.type_params
    }

    #[inline]
    pub fn qualifiers(&self) -> &BTreeSet<Qualifier> {
        &self.qualifiers
    }

    #[inline]
    pub fn scope(&self) -> Option<&ScopeTag> {
        self.scope.as_ref()
    }

    #[inline]
    pub fn is_alternative(&self) -> bool {
        self.is_alternative
    }

    #[inline]
    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    #[inline]
    pub fn is_interface(&self) -> bool {
        self.is_interface
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        self.is_array
    }

    #[inline]
    pub fn is_enum(&self) -> bool {
        self.is_enum
    }

    #[inline]
    pub fn is_primitive(&self) -> bool {
        self.is_primitive
    }

    #[inline]
    pub fn is_synthetic(&self) -> bool {
        self.is_synthetic
    }

    #[inline]
    pub fn is_local(&self) -> bool {
        self.is_local
    }

    #[inline]
    pub fn is_anonymous(&self) -> bool {
        self.is_anonymous
    }

    #[inline]
    pub fn is_inner(&self) -> bool {
        self.is_inner
    }

    #[inline]
    pub fn is_static_member(&self) -> bool {
        self.is_static_member
    }

    /// Instantiable: neither abstract nor an interface.
    #[inline]
    pub fn is_concrete(&self) -> bool {
        !self.is_abstract && !self.is_interface
    }

    #[inline]
    pub fn constructors(&self) -> &[ConstructorDescriptor] {
        &self.constructors
    }

    #[inline]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    #[inline]
    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    /// True when any declared qualifier is a user qualifier.
    pub fn has_user_qualifiers(&self) -> bool {
        self.qualifiers.iter().any(Qualifier::is_user)
    }
}

impl std::fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("qualifiers", &self.qualifiers)
            .field("is_alternative", &self.is_alternative)
            .finish()
    }
}

/// Fluent builder for [`ClassDescriptor`].
pub struct ClassDescriptorBuilder {
    desc: ClassDescriptor,
    explicit_superclass: bool,
}

impl ClassDescriptorBuilder {
    fn new(id: ClassId) -> Self {
        Self {
            desc: ClassDescriptor {
                id,
                superclass: None,
                interfaces: Vec::new(),
                type_params: Vec::new(),
                qualifiers: BTreeSet::new(),
                scope: None,
                is_alternative: false,
                is_abstract: false,
                is_interface: false,
                is_array: false,
                is_enum: false,
                is_primitive: false,
                is_synthetic: false,
                is_local: false,
                is_anonymous: false,
                is_inner: false,
                is_static_member: false,
                constructors: Vec::new(),
                fields: Vec::new(),
                methods: Vec::new(),
            },
            explicit_superclass: false,
        }
    }

    pub fn superclass(mut self, ty: impl Into<TypeDescriptor>) -> Self {
        self.desc.superclass = Some(ty.into());
        self.explicit_superclass = true;
        self
    }

    pub fn implements(mut self, ty: impl Into<TypeDescriptor>) -> Self {
        self.desc.interfaces.push(ty.into());
        self
    }

    pub fn type_param(mut self, name: impl Into<String>) -> Self {
        self.desc.type_params.push(name.into());
        self
    }

    pub fn qualifier(mut self, q: Qualifier) -> Self {
        self.desc.qualifiers.insert(q);
        self
    }

    pub fn scope(mut self, tag: ScopeTag) -> Self {
        self.desc.scope = Some(tag);
        self
    }

    pub fn alternative(mut self) -> Self {
        self.desc.is_alternative = true;
        self
    }

    pub fn abstract_(mut self) -> Self {
        self.desc.is_abstract = true;
        self
    }

    pub fn interface(mut self) -> Self {
        self.desc.is_interface = true;
        self.desc.is_abstract = true;
        self
    }

    pub fn array(mut self) -> Self {
        self.desc.is_array = true;
        self
    }

    pub fn enum_(mut self) -> Self {
        self.desc.is_enum = true;
        self
    }

    pub fn primitive(mut self) -> Self {
        self.desc.is_primitive = true;
        self
    }

    pub fn synthetic(mut self) -> Self {
        self.desc.is_synthetic = true;
        self
    }

    pub fn local(mut self) -> Self {
        self.desc.is_local = true;
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.desc.is_anonymous = true;
        self
    }

    /// Mark as an inner (member) class; `static_member` distinguishes the
    /// injectable static form from the non-injectable bound form.
    pub fn inner(mut self, static_member: bool) -> Self {
        self.desc.is_inner = true;
        self.desc.is_static_member = static_member;
        self
    }

    pub fn constructor(mut self, ctor: ConstructorDescriptor) -> Self {
        self.desc.constructors.push(ctor);
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.desc.fields.push(field);
        self
    }

    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.desc.methods.push(method);
        self
    }

    /// Finish the descriptor.
    ///
    /// Classes without an explicit superclass default to the root class;
    /// interfaces, primitives and the root itself have none. Classes without
    /// a declared constructor get the implicit no-argument constructor.
    pub fn build(mut self) -> Arc<ClassDescriptor> {
        let is_rootless = self.desc.is_interface
            || self.desc.is_primitive
            || self.desc.id.name() == OBJECT;
        if !self.explicit_superclass && !is_rootless {
            self.desc.superclass = Some(TypeDescriptor::Class(ClassId::object()));
        }
        if self.desc.constructors.is_empty() && self.desc.is_concrete() {
            self.desc.constructors.push(ConstructorDescriptor::no_arg());
        }
        Arc::new(self.desc)
    }
}

// =============================================================================
// Class registry
// =============================================================================

/// Id-indexed store of every class the container knows.
///
/// Answers supertype queries, root-to-leaf hierarchies and exact generic
/// supertype resolution; array descriptors are synthesized on demand.
pub struct ClassRegistry {
    classes: DashMap<ClassId, Arc<ClassDescriptor>, RandomState>,
}

const PRIMITIVES: &[&str] = &[
    "boolean", "byte", "short", "int", "long", "char", "float", "double",
];

impl ClassRegistry {
    /// Create a registry pre-populated with the root class and primitives.
    pub fn new() -> Self {
        let registry = Self {
            classes: DashMap::with_hasher(RandomState::new()),
        };
        registry.insert(ClassDescriptor::builder(OBJECT).build());
        for p in PRIMITIVES {
            registry.insert(ClassDescriptor::builder(p).primitive().build());
        }
        registry
    }

    /// Register a descriptor, replacing any previous one with the same id.
    pub fn insert(&self, desc: Arc<ClassDescriptor>) {
        self.classes.insert(desc.id().clone(), desc);
    }

    /// Look up a descriptor; array descriptors are synthesized on first use.
    pub fn get(&self, id: &ClassId) -> Option<Arc<ClassDescriptor>> {
        if let Some(found) = self.classes.get(id) {
            return Some(Arc::clone(found.value()));
        }
        if id.is_array() {
            let desc = ClassDescriptor::builder(id.name()).array().build();
            self.classes.insert(id.clone(), Arc::clone(&desc));
            return Some(desc);
        }
        None
    }

    pub fn contains(&self, id: &ClassId) -> bool {
        self.classes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Snapshot of every registered descriptor.
    pub fn all(&self) -> Vec<Arc<ClassDescriptor>> {
        self.classes.iter().map(|r| Arc::clone(r.value())).collect()
    }

    /// Erased-class supertype check.
    ///
    /// Arrays are covariant at the reference level only: a primitive-element
    /// array accepts exactly its own element type.
    pub fn is_supertype(&self, sup: &ClassId, sub: &ClassId) -> bool {
        if sup == sub {
            return true;
        }
        if sub.is_array() {
            if sup.name() == OBJECT {
                return true;
            }
            if let (Some(sup_comp), Some(sub_comp)) = (sup.component(), sub.component()) {
                if self.is_primitive_class(&sup_comp) || self.is_primitive_class(&sub_comp) {
                    return false; // unequal primitives already ruled out
                }
                return self.is_supertype(&sup_comp, &sub_comp);
            }
            return false;
        }
        if self.is_primitive_class(sub) || self.is_primitive_class(sup) {
            return false;
        }
        if sup.name() == OBJECT {
            return true;
        }

        // Walk the declared hierarchy.
        let mut queue = vec![sub.clone()];
        let mut seen = BTreeSet::new();
        while let Some(current) = queue.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let Some(desc) = self.get(&current) else {
                continue;
            };
            for iface in desc.interfaces() {
                let raw = iface.raw_class();
                if raw == *sup {
                    return true;
                }
                queue.push(raw);
            }
            if let Some(superclass) = desc.superclass() {
                let raw = superclass.raw_class();
                if raw == *sup {
                    return true;
                }
                queue.push(raw);
            }
        }
        false
    }

    fn is_primitive_class(&self, id: &ClassId) -> bool {
        self.classes
            .get(id)
            .map(|d| d.is_primitive())
            .unwrap_or(false)
    }

    /// Superclass chain of `id` ordered root to leaf, `id` last. The root
    /// class itself is omitted.
    pub fn hierarchy_of(&self, id: &ClassId) -> Vec<Arc<ClassDescriptor>> {
        let mut chain = Vec::new();
        let mut current = self.get(id);
        while let Some(desc) = current {
            if desc.id().name() == OBJECT {
                break;
            }
            current = desc
                .superclass()
                .map(TypeDescriptor::raw_class)
                .and_then(|raw| self.get(&raw));
            chain.push(desc);
        }
        chain.reverse();
        chain
    }

    /// Resolve `impl_ty` to its exact supertype whose raw class is
    /// `target_raw`, substituting type variables along the way. Interfaces
    /// are walked before the superclass.
    pub fn generic_supertype(
        &self,
        impl_ty: &TypeDescriptor,
        target_raw: &ClassId,
    ) -> Option<TypeDescriptor> {
        let raw = impl_ty.raw_class();
        if raw == *target_raw {
            return Some(impl_ty.clone());
        }
        let desc = self.get(&raw)?;

        let substitution: BTreeMap<&str, &TypeDescriptor> = desc
            .type_params()
            .iter()
            .map(String::as_str)
            .zip(impl_ty.type_args().iter())
            .collect();

        for iface in desc.interfaces() {
            let applied = substitute(iface, &substitution);
            if let Some(found) = self.generic_supertype(&applied, target_raw) {
                return Some(found);
            }
        }
        if let Some(superclass) = desc.superclass() {
            let applied = substitute(superclass, &substitution);
            return self.generic_supertype(&applied, target_raw);
        }
        None
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("count", &self.classes.len())
            .finish()
    }
}

/// Replace type variables in `ty` with their bound arguments.
fn substitute(ty: &TypeDescriptor, bindings: &BTreeMap<&str, &TypeDescriptor>) -> TypeDescriptor {
    match ty {
        TypeDescriptor::Variable { name, .. } => bindings
            .get(name.as_str())
            .map(|bound| (*bound).clone())
            .unwrap_or_else(|| ty.clone()),
        TypeDescriptor::Parameterized { raw, args } => TypeDescriptor::Parameterized {
            raw: raw.clone(),
            args: args.iter().map(|a| substitute(a, bindings)).collect(),
        },
        TypeDescriptor::GenericArray { component } => TypeDescriptor::GenericArray {
            component: Box::new(substitute(component, bindings)),
        },
        TypeDescriptor::Wildcard { upper, lower } => TypeDescriptor::Wildcard {
            upper: upper.iter().map(|b| substitute(b, bindings)).collect(),
            lower: lower.iter().map(|b| substitute(b, bindings)).collect(),
        },
        TypeDescriptor::Class(_) => ty.clone(),
    }
}
