//! The mapping view capability and its proguard implementation.

use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

use symbolic_common::{AsSelf, ByteView, SelfCell};
use thiserror::Error;

use crate::mapper::ProguardMapper;
use crate::mapping::ProguardMapping;

/// A single original call site, produced by expanding an obfuscated frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MappedFrame<'a> {
    pub(crate) class_name: &'a str,
    pub(crate) method: &'a str,
    pub(crate) line: usize,
}

impl<'a> MappedFrame<'a> {
    /// Create a new MappedFrame.
    pub fn new(class_name: &'a str, method: &'a str, line: usize) -> Self {
        Self {
            class_name,
            method,
            line,
        }
    }

    /// The fully-qualified original class name.
    pub fn class_name(&self) -> &'a str {
        self.class_name
    }

    /// The original method name.
    pub fn method(&self) -> &'a str {
        self.method
    }

    /// The original line number, or `0` if unknown.
    pub fn line(&self) -> usize {
        self.line
    }
}

/// A parsed, immutable view over one mapping file.
///
/// Lookups are exact-key; implementations never guess.
pub trait MappingView {
    /// Whether the mapping encodes method line ranges.
    ///
    /// Views without line info cannot remap frames and are not used at all.
    fn has_line_info(&self) -> bool;

    /// Remaps a fully-qualified obfuscated class name.
    fn remap_class(&self, class: &str) -> Option<&str>;

    /// Expands an obfuscated frame into its original frames.
    ///
    /// Returns an empty list if no entry matches. When the result has more
    /// than one element, the last one belongs to the obfuscated method itself
    /// and every preceding element was inlined into it.
    fn remap_frame(&self, class: &str, method: &str, line: usize) -> Vec<MappedFrame<'_>>;
}

impl<V: MappingView + ?Sized> MappingView for &V {
    fn has_line_info(&self) -> bool {
        (**self).has_line_info()
    }

    fn remap_class(&self, class: &str) -> Option<&str> {
        (**self).remap_class(class)
    }

    fn remap_frame(&self, class: &str, method: &str, line: usize) -> Vec<MappedFrame<'_>> {
        (**self).remap_frame(class, method, line)
    }
}

impl<V: MappingView + ?Sized> MappingView for Box<V> {
    fn has_line_info(&self) -> bool {
        (**self).has_line_info()
    }

    fn remap_class(&self, class: &str) -> Option<&str> {
        (**self).remap_class(class)
    }

    fn remap_frame(&self, class: &str, method: &str, line: usize) -> Vec<MappedFrame<'_>> {
        (**self).remap_frame(class, method, line)
    }
}

impl<V: MappingView + ?Sized> MappingView for Arc<V> {
    fn has_line_info(&self) -> bool {
        (**self).has_line_info()
    }

    fn remap_class(&self, class: &str) -> Option<&str> {
        (**self).remap_class(class)
    }

    fn remap_frame(&self, class: &str, method: &str, line: usize) -> Vec<MappedFrame<'_>> {
        (**self).remap_frame(class, method, line)
    }
}

impl MappingView for ProguardMapper<'_> {
    fn has_line_info(&self) -> bool {
        ProguardMapper::has_line_info(self)
    }

    fn remap_class(&self, class: &str) -> Option<&str> {
        ProguardMapper::remap_class(self, class)
    }

    fn remap_frame(&self, class: &str, method: &str, line: usize) -> Vec<MappedFrame<'_>> {
        ProguardMapper::remap_frame(self, class, method, line)
    }
}

/// Errors when loading a mapping file for a debug identifier.
///
/// All of these are reported as a missing mapping file.
#[derive(Debug, Error)]
pub enum LoadError {
    /// No mapping file is available for the debug identifier.
    #[error("mapping file not found")]
    NotFound,
    /// The mapping file could not be read.
    #[error("failed to read mapping file")]
    Io(#[from] io::Error),
    /// The file does not look like a proguard mapping.
    #[error("file is not a valid proguard mapping")]
    InvalidMapping,
}

struct Inner<'a> {
    mapper: ProguardMapper<'a>,
}

impl<'slf, 'a: 'slf> AsSelf<'slf> for Inner<'a> {
    type Ref = Inner<'slf>;

    fn as_self(&'slf self) -> &'slf Self::Ref {
        self
    }
}

/// A [`MappingView`] that owns the bytes of a proguard mapping file.
///
/// When opened from a path, the file is memory-mapped.
pub struct ProguardMappingView<'d> {
    inner: SelfCell<ByteView<'d>, Inner<'d>>,
}

impl ProguardMappingView<'static> {
    /// Opens and indexes the mapping file at `path`.
    #[tracing::instrument(
        name = "proguard.open",
        level = "debug",
        skip_all,
        fields(path = %path.as_ref().display())
    )]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let byteview = ByteView::open(path)?;
        Self::parse(byteview)
    }
}

impl<'d> ProguardMappingView<'d> {
    /// Indexes the mapping contained in `byteview`.
    ///
    /// Fails with [`LoadError::InvalidMapping`] if the data does not look like
    /// a proguard mapping file.
    pub fn parse(byteview: ByteView<'d>) -> Result<Self, LoadError> {
        // NB: the mapper borrows from the ByteView, so both are kept together
        // in a `SelfCell`. The borrow does not escape the callback.
        let inner = SelfCell::try_new(byteview, |data| {
            let mapping = ProguardMapping::new(unsafe { &*data });
            if !mapping.is_valid() {
                return Err(LoadError::InvalidMapping);
            }
            Ok(Inner {
                mapper: ProguardMapper::new(mapping),
            })
        })?;

        Ok(Self { inner })
    }

    /// Indexes a mapping from a borrowed byte slice.
    pub fn from_slice(bytes: &'d [u8]) -> Result<Self, LoadError> {
        Self::parse(ByteView::from_slice(bytes))
    }

    /// The raw mapping file contents.
    pub fn data(&self) -> &[u8] {
        self.inner.owner()
    }

    /// Calculates the UUID of the mapping file.
    #[cfg(feature = "uuid")]
    pub fn uuid(&self) -> uuid::Uuid {
        ProguardMapping::new(self.data()).uuid()
    }

    fn mapper(&self) -> &ProguardMapper<'_> {
        &self.inner.get().mapper
    }
}

impl fmt::Debug for ProguardMappingView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProguardMappingView")
            .field("len", &self.data().len())
            .field("has_line_info", &self.mapper().has_line_info())
            .finish()
    }
}

impl MappingView for ProguardMappingView<'_> {
    fn has_line_info(&self) -> bool {
        self.mapper().has_line_info()
    }

    fn remap_class(&self, class: &str) -> Option<&str> {
        self.mapper().remap_class(class)
    }

    fn remap_frame(&self, class: &str, method: &str, line: usize) -> Vec<MappedFrame<'_>> {
        self.mapper().remap_frame(class, method, line)
    }
}
