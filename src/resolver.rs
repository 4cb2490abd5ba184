//! Locating and loading mapping files for debug identifiers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::mapping_set::DebugIdentifier;
use crate::view::{LoadError, MappingView, ProguardMappingView};

/// Resolves debug identifiers to the paths of their mapping files.
pub trait MappingResolver {
    /// Returns a path for every identifier that has a mapping file.
    ///
    /// Identifiers without an entry in the returned map have no mapping file.
    fn resolve(&self, debug_ids: &[DebugIdentifier]) -> HashMap<DebugIdentifier, PathBuf>;
}

/// Loads [`MappingView`]s for debug identifiers.
pub trait MappingProvider {
    /// The view produced by this provider.
    type View: MappingView;

    /// Loads the mapping view for a single debug identifier.
    fn load(&self, debug_id: &DebugIdentifier) -> Result<Self::View, LoadError>;

    /// Loads the mapping views for all `debug_ids`.
    ///
    /// Returns exactly one result per identifier, in the same order.
    fn load_all(&self, debug_ids: &[DebugIdentifier]) -> Vec<Result<Self::View, LoadError>> {
        debug_ids.iter().map(|id| self.load(id)).collect()
    }
}

/// Looks up mapping files in a list of directories.
///
/// A mapping for `<debug_id>` is expected at `<dir>/<debug_id>` or
/// `<dir>/<debug_id>.txt`. Directories are searched in order.
#[derive(Clone, Debug, Default)]
pub struct DirectoryResolver {
    dirs: Vec<PathBuf>,
    index: HashMap<DebugIdentifier, PathBuf>,
}

impl DirectoryResolver {
    /// Create a new DirectoryResolver searching `dirs`.
    pub fn new<I>(dirs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<PathBuf>,
    {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
            index: HashMap::new(),
        }
    }

    /// Create a new DirectoryResolver that indexes all mapping files in `dirs`.
    ///
    /// Every file below the directories is inspected, and valid mappings are
    /// registered under their content UUID. The first file wins if the same
    /// mapping is found more than once. Lookups by file name keep working for
    /// identifiers that are not in the index.
    #[cfg(feature = "uuid")]
    #[tracing::instrument(name = "proguard.scan", skip_all)]
    pub fn scan<I>(dirs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<PathBuf>,
    {
        use symbolic_common::ByteView;
        use walkdir::WalkDir;

        use crate::mapping::ProguardMapping;

        let mut resolver = Self::new(dirs);

        for dir in &resolver.dirs {
            for entry in WalkDir::new(dir).into_iter().filter_map(Result::ok) {
                if !entry.file_type().is_file() {
                    continue;
                }

                // Silently skip files that cannot be read or are not mappings
                let Ok(data) = ByteView::open(entry.path()) else {
                    continue;
                };
                let mapping = ProguardMapping::new(&data);
                if !mapping.is_valid() {
                    continue;
                }

                let debug_id = DebugIdentifier::new(mapping.uuid().to_string());
                tracing::trace!(%debug_id, path = %entry.path().display(), "indexed mapping file");
                resolver
                    .index
                    .entry(debug_id)
                    .or_insert_with(|| entry.path().to_owned());
            }
        }

        resolver
    }

    /// The directories searched by this resolver.
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    fn lookup(&self, debug_id: &DebugIdentifier) -> Option<PathBuf> {
        if let Some(path) = self.index.get(debug_id) {
            return Some(path.clone());
        }

        let name = debug_id.as_str();
        if !is_plain_file_name(name) {
            return None;
        }

        self.dirs
            .iter()
            .flat_map(|dir| [dir.join(name), dir.join(format!("{name}.txt"))])
            .find(|path| path.is_file())
    }
}

impl MappingResolver for DirectoryResolver {
    fn resolve(&self, debug_ids: &[DebugIdentifier]) -> HashMap<DebugIdentifier, PathBuf> {
        debug_ids
            .iter()
            .filter_map(|id| Some((id.clone(), self.lookup(id)?)))
            .collect()
    }
}

/// Identifiers are joined onto directories, so they must not name anything
/// outside of them.
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && Path::new(name).file_name().is_some()
}

/// A [`MappingProvider`] that opens mapping files from disk.
#[derive(Clone, Debug)]
pub struct FileProvider<R> {
    resolver: R,
}

impl<R: MappingResolver> FileProvider<R> {
    /// Create a new FileProvider.
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    /// The resolver used to locate mapping files.
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    fn open(path: Option<&PathBuf>) -> Result<ProguardMappingView<'static>, LoadError> {
        ProguardMappingView::open(path.ok_or(LoadError::NotFound)?)
    }
}

impl<R: MappingResolver> MappingProvider for FileProvider<R> {
    type View = ProguardMappingView<'static>;

    fn load(&self, debug_id: &DebugIdentifier) -> Result<Self::View, LoadError> {
        let paths = self.resolver.resolve(std::slice::from_ref(debug_id));
        Self::open(paths.get(debug_id))
    }

    fn load_all(&self, debug_ids: &[DebugIdentifier]) -> Vec<Result<Self::View, LoadError>> {
        let paths = self.resolver.resolve(debug_ids);
        debug_ids
            .iter()
            .map(|id| Self::open(paths.get(id)))
            .collect()
    }
}

/// A [`MappingProvider`] over views that are already in memory.
#[derive(Clone, Debug)]
pub struct MemoryProvider<V> {
    views: HashMap<DebugIdentifier, V>,
}

impl<V> Default for MemoryProvider<V> {
    fn default() -> Self {
        Self {
            views: HashMap::new(),
        }
    }
}

impl<V> MemoryProvider<V> {
    /// Create an empty MemoryProvider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `view` for `debug_id`, replacing any previous view.
    pub fn insert(&mut self, debug_id: impl Into<DebugIdentifier>, view: V) {
        self.views.insert(debug_id.into(), view);
    }
}

impl<I: Into<DebugIdentifier>, V> FromIterator<(I, V)> for MemoryProvider<V> {
    fn from_iter<T: IntoIterator<Item = (I, V)>>(iter: T) -> Self {
        Self {
            views: iter.into_iter().map(|(id, view)| (id.into(), view)).collect(),
        }
    }
}

impl<V: MappingView + Clone> MappingProvider for MemoryProvider<V> {
    type View = V;

    fn load(&self, debug_id: &DebugIdentifier) -> Result<V, LoadError> {
        self.views.get(debug_id).cloned().ok_or(LoadError::NotFound)
    }
}
