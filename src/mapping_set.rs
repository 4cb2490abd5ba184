//! Loading the mapping views relevant to one event.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::resolver::MappingProvider;
use crate::view::{LoadError, MappingView};

/// The identifier of one mapping file, bound to an obfuscated build.
///
/// For proguard mappings this is usually the UUID of the mapping file, see
/// [`ProguardMapping::uuid`](crate::ProguardMapping::uuid). The value is
/// treated as an opaque string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DebugIdentifier(String);

impl DebugIdentifier {
    /// Create a new DebugIdentifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DebugIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DebugIdentifier {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DebugIdentifier {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The result of loading the mapping for one [`DebugIdentifier`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingOutcome {
    /// The mapping was loaded and takes part in remapping.
    Loaded,
    /// No usable mapping file was found.
    MissingMappingFile,
    /// The mapping file has no line information and is not used.
    MissingLineInfo,
}

impl ProcessingOutcome {
    /// The diagnostic reported for this outcome, if any.
    pub fn diagnostic(self) -> Option<DiagnosticKind> {
        match self {
            Self::Loaded => None,
            Self::MissingMappingFile => Some(DiagnosticKind::MissingMappingFile),
            Self::MissingLineInfo => Some(DiagnosticKind::MissingLineInfo),
        }
    }
}

/// The kind of a [`Diagnostic`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// No usable mapping file was found.
    MissingMappingFile,
    /// The mapping file has no line information.
    MissingLineInfo,
}

impl DiagnosticKind {
    /// The event error code for this diagnostic.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingMappingFile => "proguard_missing_mapping",
            Self::MissingLineInfo => "proguard_missing_lineno",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A problem with the mapping of one debug identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Diagnostic {
    /// The affected debug identifier.
    pub debug_id: DebugIdentifier,
    /// What went wrong.
    pub kind: DiagnosticKind,
}

/// Receives the [`Diagnostic`]s produced while building a [`MappingSet`].
pub trait DiagnosticSink {
    /// Records one diagnostic.
    fn report(&mut self, diagnostic: Diagnostic);
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

/// The mapping views used to deobfuscate one event.
///
/// Views are kept in the order their debug identifiers were given. This order
/// decides which view wins when more than one could remap something: the
/// first view that produces a result is used, and results are never merged.
#[derive(Debug)]
pub struct MappingSet<V> {
    views: Vec<V>,
    outcomes: Vec<(DebugIdentifier, ProcessingOutcome)>,
}

impl<V> Default for MappingSet<V> {
    fn default() -> Self {
        Self {
            views: Vec::new(),
            outcomes: Vec::new(),
        }
    }
}

impl<V: MappingView> MappingSet<V> {
    /// Loads the mappings for all `debug_ids` from `provider`.
    ///
    /// Every identifier is handled independently. Identifiers without a
    /// mapping file, or whose mapping has no line information, are reported
    /// to `sink` and left out of the set. Repeated identifiers are loaded once.
    #[tracing::instrument(
        name = "proguard.fetch_debug_files",
        skip_all,
        fields(debug_ids = debug_ids.len())
    )]
    pub fn build<P, S>(debug_ids: &[DebugIdentifier], provider: &P, sink: &mut S) -> Self
    where
        P: MappingProvider<View = V> + ?Sized,
        S: DiagnosticSink + ?Sized,
    {
        let mut seen = HashSet::new();
        let debug_ids: Vec<_> = debug_ids
            .iter()
            .filter(|id| seen.insert(*id))
            .cloned()
            .collect();

        let mut results = provider.load_all(&debug_ids).into_iter();
        let mut set = Self::default();

        for debug_id in debug_ids {
            let outcome = match results.next().unwrap_or(Err(LoadError::NotFound)) {
                Err(error) => {
                    tracing::debug!(%debug_id, %error, "no mapping file");
                    ProcessingOutcome::MissingMappingFile
                }
                Ok(view) if !view.has_line_info() => {
                    tracing::debug!(%debug_id, "mapping file has no line info");
                    ProcessingOutcome::MissingLineInfo
                }
                Ok(view) => {
                    tracing::debug!(%debug_id, "loaded mapping file");
                    set.views.push(view);
                    ProcessingOutcome::Loaded
                }
            };

            if let Some(kind) = outcome.diagnostic() {
                sink.report(Diagnostic {
                    debug_id: debug_id.clone(),
                    kind,
                });
            }
            set.outcomes.push((debug_id, outcome));
        }

        set
    }
}

impl<V> MappingSet<V> {
    /// The usable views, in precedence order.
    pub fn views(&self) -> &[V] {
        &self.views
    }

    /// The outcome for every distinct debug identifier, in input order.
    pub fn outcomes(&self) -> &[(DebugIdentifier, ProcessingOutcome)] {
        &self.outcomes
    }

    /// The outcome for a single debug identifier.
    pub fn outcome(&self, debug_id: &DebugIdentifier) -> Option<ProcessingOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| id == debug_id)
            .map(|(_, outcome)| *outcome)
    }

    /// Whether no view is usable, in which case nothing can be remapped.
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// The number of usable views.
    pub fn len(&self) -> usize {
        self.views.len()
    }
}
