//! Structural type descriptors
//!
//! Types are modeled as data, independent of any language's reflection API.
//! A [`TypeDescriptor`] is a structural tree (class, generic application,
//! generic array, variable, wildcard) with structural equality, and a
//! [`ClassId`] is the interned name of an erased class.

use std::fmt;
use std::sync::Arc;

/// Interned identifier of an erased class.
///
/// Cheap to clone; equality and hashing go through the class name. Array
/// classes use the `component[]` naming convention and are synthesized on
/// demand by the class registry.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(Arc<str>);

/// Root of every class hierarchy; implicit superclass and implicit bound of
/// unbounded type variables and wildcards.
pub const OBJECT: &str = "Object";

/// Raw class of `Provider<T>` injection points.
pub const PROVIDER: &str = "Provider";

/// Raw class of `LazyInstance<T>` injection points.
pub const LAZY_INSTANCE: &str = "LazyInstance";

/// Raw class of `Optional<T>` injection points.
pub const OPTIONAL: &str = "Optional";

impl ClassId {
    /// Intern a class name.
    #[inline]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// The root class id.
    #[inline]
    pub fn object() -> Self {
        Self::new(OBJECT)
    }

    /// Full class name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Package portion of the name, empty for unpackaged classes.
    ///
    /// Array suffixes do not count as name segments.
    pub fn package(&self) -> &str {
        let base = self.0.trim_end_matches("[]");
        match base.rfind('.') {
            Some(idx) => &base[..idx],
            None => "",
        }
    }

    /// Name without the package prefix.
    pub fn simple_name(&self) -> &str {
        match self.0.rfind('.') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// The array class whose element is `self`.
    #[inline]
    pub fn array_of(&self) -> Self {
        Self(Arc::from(format!("{}[]", self.0)))
    }

    /// True when this id names an array class.
    #[inline]
    pub fn is_array(&self) -> bool {
        self.0.ends_with("[]")
    }

    /// Element class of an array id, `None` for non-arrays.
    pub fn component(&self) -> Option<Self> {
        self.0
            .strip_suffix("[]")
            .map(|component| Self(Arc::from(component)))
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({})", self.0)
    }
}

impl From<&str> for ClassId {
    #[inline]
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Structural representation of a type.
///
/// Equality and hashing are structural, which makes descriptors usable as
/// cache keys throughout the container.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeDescriptor {
    /// A non-generic class.
    Class(ClassId),
    /// A generic application: `raw<args...>`.
    Parameterized {
        raw: ClassId,
        args: Vec<TypeDescriptor>,
    },
    /// An array whose element is itself a type descriptor.
    GenericArray { component: Box<TypeDescriptor> },
    /// A type variable with its declared bounds.
    Variable {
        name: String,
        bounds: Vec<TypeDescriptor>,
    },
    /// A wildcard with upper and lower bounds.
    Wildcard {
        upper: Vec<TypeDescriptor>,
        lower: Vec<TypeDescriptor>,
    },
}

impl TypeDescriptor {
    /// A plain class type.
    #[inline]
    pub fn class(name: impl AsRef<str>) -> Self {
        Self::Class(ClassId::new(name))
    }

    /// A generic application `raw<args...>`.
    #[inline]
    pub fn parameterized(raw: impl AsRef<str>, args: Vec<TypeDescriptor>) -> Self {
        Self::Parameterized {
            raw: ClassId::new(raw),
            args,
        }
    }

    /// An array of the given component type.
    #[inline]
    pub fn generic_array(component: TypeDescriptor) -> Self {
        Self::GenericArray {
            component: Box::new(component),
        }
    }

    /// A type variable. Empty bounds mean the implicit root bound.
    #[inline]
    pub fn variable(name: impl Into<String>, bounds: Vec<TypeDescriptor>) -> Self {
        Self::Variable {
            name: name.into(),
            bounds,
        }
    }

    /// An unbounded wildcard.
    #[inline]
    pub fn wildcard() -> Self {
        Self::Wildcard {
            upper: Vec::new(),
            lower: Vec::new(),
        }
    }

    /// A wildcard with an upper bound (`? extends T`).
    #[inline]
    pub fn wildcard_extends(upper: TypeDescriptor) -> Self {
        Self::Wildcard {
            upper: vec![upper],
            lower: Vec::new(),
        }
    }

    /// Reduce this descriptor to its erased class.
    ///
    /// - a class erases to itself
    /// - a generic application erases to its raw class
    /// - a generic array erases to the array class of its erased component
    /// - variables and wildcards erase to their first (upper) bound, or to
    ///   the root class when unbounded
    pub fn raw_class(&self) -> ClassId {
        match self {
            Self::Class(id) => id.clone(),
            Self::Parameterized { raw, .. } => raw.clone(),
            Self::GenericArray { component } => component.raw_class().array_of(),
            Self::Variable { bounds, .. } => bounds
                .first()
                .map(TypeDescriptor::raw_class)
                .unwrap_or_else(ClassId::object),
            Self::Wildcard { upper, .. } => upper
                .first()
                .map(TypeDescriptor::raw_class)
                .unwrap_or_else(ClassId::object),
        }
    }

    /// The type arguments of a generic application, empty otherwise.
    pub fn type_args(&self) -> &[TypeDescriptor] {
        match self {
            Self::Parameterized { args, .. } => args,
            _ => &[],
        }
    }

    /// True for `Class` descriptors (raw, non-generic references).
    #[inline]
    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Class(_))
    }

    /// True for array-shaped descriptors: `GenericArray` or a `Class` whose
    /// id names an array.
    pub fn is_array_shaped(&self) -> bool {
        match self {
            Self::GenericArray { .. } => true,
            Self::Class(id) => id.is_array(),
            _ => false,
        }
    }

    /// The component of an array-shaped descriptor.
    pub fn array_component(&self) -> Option<TypeDescriptor> {
        match self {
            Self::GenericArray { component } => Some((**component).clone()),
            Self::Class(id) => id.component().map(TypeDescriptor::Class),
            _ => None,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class(id) => write!(f, "{id}"),
            Self::Parameterized { raw, args } => {
                write!(f, "{raw}<")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ">")
            }
            Self::GenericArray { component } => write!(f, "{component}[]"),
            Self::Variable { name, .. } => write!(f, "{name}"),
            Self::Wildcard { upper, lower } => {
                write!(f, "?")?;
                if let Some(bound) = upper.first() {
                    write!(f, " extends {bound}")?;
                }
                if let Some(bound) = lower.first() {
                    write!(f, " super {bound}")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl From<ClassId> for TypeDescriptor {
    #[inline]
    fn from(id: ClassId) -> Self {
        Self::Class(id)
    }
}

impl From<&str> for TypeDescriptor {
    #[inline]
    fn from(name: &str) -> Self {
        Self::class(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_erases_to_itself() {
        let t = TypeDescriptor::class("app.Service");
        assert_eq!(t.raw_class().name(), "app.Service");
    }

    #[test]
    fn parameterized_erases_to_raw() {
        let t = TypeDescriptor::parameterized("app.List", vec![TypeDescriptor::class("app.Item")]);
        assert_eq!(t.raw_class().name(), "app.List");
    }

    #[test]
    fn generic_array_erases_to_array_of_erased_component() {
        let inner =
            TypeDescriptor::parameterized("app.List", vec![TypeDescriptor::class("app.Item")]);
        let t = TypeDescriptor::generic_array(inner);
        assert_eq!(t.raw_class().name(), "app.List[]");
    }

    #[test]
    fn variable_erases_to_first_bound() {
        let t = TypeDescriptor::variable("T", vec![TypeDescriptor::class("app.Number")]);
        assert_eq!(t.raw_class().name(), "app.Number");

        let unbounded = TypeDescriptor::variable("T", vec![]);
        assert_eq!(unbounded.raw_class().name(), OBJECT);
    }

    #[test]
    fn wildcard_erases_to_first_upper_bound() {
        let t = TypeDescriptor::wildcard_extends(TypeDescriptor::class("app.Number"));
        assert_eq!(t.raw_class().name(), "app.Number");
        assert_eq!(TypeDescriptor::wildcard().raw_class().name(), OBJECT);
    }

    #[test]
    fn structural_equality_and_display() {
        let a = TypeDescriptor::parameterized("app.Map", vec![
            TypeDescriptor::class("app.Key"),
            TypeDescriptor::class("app.Val"),
        ]);
        let b = TypeDescriptor::parameterized("app.Map", vec![
            TypeDescriptor::class("app.Key"),
            TypeDescriptor::class("app.Val"),
        ]);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "app.Map<app.Key, app.Val>");
    }

    #[test]
    fn package_and_simple_name() {
        let id = ClassId::new("app.data.Repo");
        assert_eq!(id.package(), "app.data");
        assert_eq!(id.simple_name(), "Repo");

        let arr = id.array_of();
        assert!(arr.is_array());
        assert_eq!(arr.package(), "app.data");
        assert_eq!(arr.component().unwrap(), id);
    }
}
