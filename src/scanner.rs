//! Scanner adapter
//!
//! Candidate discovery is an external collaborator: anything that can hand
//! the container a set of class descriptors for a package filter. The
//! in-process [`StaticScanner`] is the embedding (and test) implementation;
//! per-class load failures are skipped the way classpath scanners skip
//! unloadable candidates.

use crate::error::{DiError, Result};
use crate::metadata::ClassDescriptor;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, warn};

/// A package-name restriction for scans.
///
/// `app.data` matches exactly that package; `app.data.*` matches it and
/// every package beneath it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageFilter {
    pattern: String,
    recursive: bool,
}

impl PackageFilter {
    /// Parse a filter string.
    ///
    /// Empty input is a domain error; a pattern whose segments are not
    /// identifiers is a definition error.
    pub fn parse(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(DiError::domain("package filter must not be empty"));
        }
        let (base, recursive) = match pattern.strip_suffix(".*") {
            Some(base) => (base, true),
            None => (pattern, false),
        };
        if base.is_empty() || !base.split('.').all(is_identifier) {
            return Err(DiError::definition(format!(
                "malformed package pattern: {pattern}"
            )));
        }
        Ok(Self {
            pattern: base.to_string(),
            recursive,
        })
    }

    /// True when `package` falls under this filter.
    pub fn matches(&self, package: &str) -> bool {
        if package == self.pattern {
            return true;
        }
        self.recursive
            && package.len() > self.pattern.len()
            && package.starts_with(&self.pattern)
            && package.as_bytes()[self.pattern.len()] == b'.'
    }

    #[inline]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl std::fmt::Display for PackageFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.recursive {
            write!(f, "{}.*", self.pattern)
        } else {
            f.write_str(&self.pattern)
        }
    }
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// True when `package` passes the filter set; an empty set admits everything.
pub fn matches_any(filters: &[PackageFilter], package: &str) -> bool {
    filters.is_empty() || filters.iter().any(|f| f.matches(package))
}

/// Produces the candidate classes for a package filter.
///
/// Implementations must be idempotent; the container may scan lazily and
/// more than once.
pub trait ClassScanner: Send + Sync {
    fn scan(&self, filters: &[PackageFilter]) -> Result<Vec<Arc<ClassDescriptor>>>;
}

enum Candidate {
    Ready(Arc<ClassDescriptor>),
    /// A deferred load that may fail; failures skip the candidate.
    Deferred {
        name: String,
        load: Box<dyn Fn() -> Result<Arc<ClassDescriptor>> + Send + Sync>,
    },
}

/// In-process scanner over a fixed candidate set.
#[derive(Default)]
pub struct StaticScanner {
    candidates: Vec<Candidate>,
    /// When set, the whole scan fails with this message.
    failure: Option<String>,
}

impl StaticScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an iterator of ready descriptors.
    pub fn with_classes(classes: impl IntoIterator<Item = Arc<ClassDescriptor>>) -> Self {
        let mut scanner = Self::new();
        for class in classes {
            scanner.add(class);
        }
        scanner
    }

    pub fn add(&mut self, class: Arc<ClassDescriptor>) -> &mut Self {
        self.candidates.push(Candidate::Ready(class));
        self
    }

    /// Register a candidate whose descriptor is produced on scan; a failing
    /// loader is skipped, not propagated.
    pub fn add_deferred(
        &mut self,
        name: impl Into<String>,
        load: impl Fn() -> Result<Arc<ClassDescriptor>> + Send + Sync + 'static,
    ) -> &mut Self {
        self.candidates.push(Candidate::Deferred {
            name: name.into(),
            load: Box::new(load),
        });
        self
    }

    /// A scanner whose every scan fails; models an unreadable source.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            candidates: Vec::new(),
            failure: Some(message.into()),
        }
    }
}

impl ClassScanner for StaticScanner {
    fn scan(&self, filters: &[PackageFilter]) -> Result<Vec<Arc<ClassDescriptor>>> {
        if let Some(message) = &self.failure {
            return Err(DiError::ResolutionFailure(message.clone()));
        }

        let mut found = Vec::new();
        for candidate in &self.candidates {
            match candidate {
                Candidate::Ready(class) => {
                    if matches_any(filters, class.package()) {
                        found.push(Arc::clone(class));
                    }
                }
                Candidate::Deferred { name, load } => match load() {
                    Ok(class) => {
                        if matches_any(filters, class.package()) {
                            found.push(class);
                        }
                    }
                    Err(_err) => {
                        #[cfg(feature = "logging")]
                        warn!(
                            target: "wirecore",
                            candidate = name.as_str(),
                            error = %_err,
                            "Skipping candidate that failed to load"
                        );
                        #[cfg(not(feature = "logging"))]
                        let _ = name;
                    }
                },
            }
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "wirecore",
            candidates = found.len(),
            filters = filters.len(),
            "Scan completed"
        );

        Ok(found)
    }
}

impl std::fmt::Debug for StaticScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticScanner")
            .field("candidates", &self.candidates.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_parsing() {
        assert!(PackageFilter::parse("app").is_ok());
        assert!(PackageFilter::parse("app.data.*").is_ok());

        assert!(matches!(
            PackageFilter::parse(""),
            Err(DiError::DomainFailure(_)),
        ));
        for bad in ["app..data", ".app", "app.", "app.1data", "app.*.*"] {
            assert!(
                matches!(PackageFilter::parse(bad), Err(DiError::DefinitionFailure(_))),
                "{bad} should be malformed"
            );
        }
    }

    #[test]
    fn exact_and_recursive_matching() {
        let exact = PackageFilter::parse("app.data").unwrap();
        assert!(exact.matches("app.data"));
        assert!(!exact.matches("app.data.sub"));
        assert!(!exact.matches("app.database"));

        let recursive = PackageFilter::parse("app.data.*").unwrap();
        assert!(recursive.matches("app.data"));
        assert!(recursive.matches("app.data.sub.deep"));
        assert!(!recursive.matches("app.database"));
    }

    #[test]
    fn empty_filter_set_admits_everything() {
        assert!(matches_any(&[], "anything.at.all"));
    }

    #[test]
    fn scan_respects_filters() {
        let scanner = StaticScanner::with_classes([
            ClassDescriptor::builder("app.data.Repo").build(),
            ClassDescriptor::builder("app.web.Handler").build(),
        ]);

        let filters = vec![PackageFilter::parse("app.data").unwrap()];
        let found = scanner.scan(&filters).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id().name(), "app.data.Repo");

        assert_eq!(scanner.scan(&[]).unwrap().len(), 2);
    }

    #[test]
    fn failing_candidate_is_skipped() {
        let mut scanner = StaticScanner::new();
        scanner.add(ClassDescriptor::builder("app.Good").build());
        scanner.add_deferred("app.Broken", || {
            Err(DiError::ResolutionFailure("missing dependency".into()))
        });

        let found = scanner.scan(&[]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id().name(), "app.Good");
    }

    #[test]
    fn scanner_level_failure_propagates() {
        let scanner = StaticScanner::failing("source unreadable");
        assert!(matches!(
            scanner.scan(&[]),
            Err(DiError::ResolutionFailure(_)),
        ));
    }
}
