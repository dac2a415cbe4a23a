//! Error types for the container core

use thiserror::Error;

/// Errors that can occur during resolution, injection and lifecycle handling
#[derive(Error, Debug)]
pub enum DiError {
    /// Invalid argument: empty name, out-of-range size/capacity/load factor
    #[error("invalid argument: {0}")]
    DomainFailure(String),

    /// Injection point contains a wildcard or type variable, or a package
    /// pattern is malformed
    #[error("invalid definition: {0}")]
    DefinitionFailure(String),

    /// No implementation matches the request
    #[error("unsatisfied dependency: {target} with qualifiers [{qualifiers}]")]
    Unsatisfied { target: String, qualifiers: String },

    /// More than one implementation matches with no disambiguator
    #[error("ambiguous dependency: {target} matched by {candidates}")]
    Ambiguous {
        target: String,
        /// Comma-separated class names of the competing candidates
        candidates: String,
    },

    /// The per-thread resolution stack revisited a type
    #[error("circular dependency: {chain}")]
    CircularDependency {
        /// The full chain `T0 -> T1 -> ... -> T0`
        chain: String,
    },

    /// More than one constructor is marked injectable
    #[error("ambiguous constructors on {class}: {count} marked injectable")]
    ConstructorAmbiguity { class: String, count: usize },

    /// No injectable constructor and no no-argument constructor
    #[error("no usable constructor on {class}")]
    NoUsableConstructor { class: String },

    /// Final-field injection, or an abstract/generic injectable method
    #[error("invalid injection target: {0}")]
    InvalidTarget(String),

    /// The type is not injectable (enum, primitive, synthetic, local,
    /// anonymous, non-static inner, or parameterized with such an argument)
    #[error("type is not injectable: {0}")]
    InvalidType(String),

    /// A post-construct or pre-destroy method has the wrong shape
    #[error("invalid lifecycle method: {0}")]
    InvalidLifecycle(String),

    /// The underlying scan or class load failed
    #[error("resolution failed: {0}")]
    ResolutionFailure(String),

    /// Operation after shutdown, or duplicate scope registration
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Bug signal; should never fire on correct input
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}

impl DiError {
    /// Create an Unsatisfied error for a target and its qualifier set
    #[inline]
    pub fn unsatisfied(target: impl ToString, qualifiers: impl ToString) -> Self {
        Self::Unsatisfied {
            target: target.to_string(),
            qualifiers: qualifiers.to_string(),
        }
    }

    /// Create an Ambiguous error from the competing candidate names
    #[inline]
    pub fn ambiguous(target: impl ToString, candidates: &[impl AsRef<str>]) -> Self {
        Self::Ambiguous {
            target: target.to_string(),
            candidates: candidates
                .iter()
                .map(|c| c.as_ref())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Create a CircularDependency error from the resolution chain
    #[inline]
    pub fn circular(chain: &[impl ToString]) -> Self {
        Self::CircularDependency {
            chain: chain
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" -> "),
        }
    }

    /// Create a DomainFailure
    #[inline]
    pub fn domain(msg: impl Into<String>) -> Self {
        Self::DomainFailure(msg.into())
    }

    /// Create a DefinitionFailure
    #[inline]
    pub fn definition(msg: impl Into<String>) -> Self {
        Self::DefinitionFailure(msg.into())
    }

    /// Create an IllegalState error
    #[inline]
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }

    /// Create an InternalInvariant error
    #[inline]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalInvariant(msg.into())
    }

    /// True when this error means "nothing matched" rather than a hard failure.
    ///
    /// Optional injection sites use this to map a missing dependency to an
    /// empty value while letting every other failure propagate.
    #[inline]
    pub fn is_unsatisfied(&self) -> bool {
        matches!(self, Self::Unsatisfied { .. })
    }
}

/// Result type alias for container operations
pub type Result<T> = std::result::Result<T, DiError>;
