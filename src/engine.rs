//! Remapping of single exceptions and stack frames.

use crate::mapping_set::MappingSet;
use crate::protocol::{Exception, Frame};
use crate::view::MappingView;

/// The platform handled by default.
pub const JAVA_PLATFORM: &str = "java";

/// Whether `frame` is a candidate for deobfuscation.
///
/// The frame's own platform takes precedence over `event_platform`. Frames
/// need both a `module` and a `function` to be remapped.
pub fn handles_frame(frame: &Frame, event_platform: Option<&str>, platform: &str) -> bool {
    let frame_platform = frame.platform.as_deref().or(event_platform);
    frame_platform == Some(platform)
        && frame.module.as_deref().is_some_and(|m| !m.is_empty())
        && frame.function.as_deref().is_some_and(|f| !f.is_empty())
}

/// How a frame was remapped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RemapStrategy {
    /// The method and line were remapped, possibly expanding inlined calls.
    Frame,
    /// Only the class name was remapped.
    ClassOnly,
}

/// The replacement for one obfuscated frame.
#[derive(Clone, Debug, PartialEq)]
pub struct RemappedFrame {
    /// The frames replacing the obfuscated frame, in stack trace order.
    ///
    /// Stack traces list the oldest call first, so the obfuscated method's
    /// own frame comes first and the innermost inlined call last.
    pub frames: Vec<Frame>,
    /// The obfuscated frames that were replaced.
    pub raw_frames: Vec<Frame>,
    /// How the frames were produced.
    pub strategy: RemapStrategy,
}

/// Remaps exceptions and frames against the views of a [`MappingSet`].
///
/// Views are consulted in order and the first one that produces a result
/// wins. The engine never modifies the set.
#[derive(Debug)]
pub struct RemapEngine<'a, V> {
    mappings: &'a MappingSet<V>,
}

impl<V> Clone for RemapEngine<'_, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for RemapEngine<'_, V> {}

impl<'a, V: MappingView> RemapEngine<'a, V> {
    /// Create a new RemapEngine.
    pub fn new(mappings: &'a MappingSet<V>) -> Self {
        Self { mappings }
    }

    /// The mapping set used by this engine.
    pub fn mappings(&self) -> &'a MappingSet<V> {
        self.mappings
    }

    /// Remaps the class of an exception in place.
    ///
    /// The obfuscated class is `module.type`. Returns `true` if the exception
    /// was changed.
    pub fn remap_exception(&self, exception: &mut Exception) -> bool {
        let module = exception.module.as_deref().filter(|m| !m.is_empty());
        let ty = exception.ty.as_deref().filter(|t| !t.is_empty());
        let (Some(module), Some(ty)) = (module, ty) else {
            return false;
        };

        let key = format!("{module}.{ty}");
        let Some(original) = self
            .mappings
            .views()
            .iter()
            .find_map(|view| view.remap_class(&key).filter(|c| !c.is_empty()))
        else {
            return false;
        };

        tracing::trace!(obfuscated = %key, original, "remapped exception");
        match original.rsplit_once('.') {
            Some((module, ty)) => {
                exception.module = Some(module.to_owned());
                exception.ty = Some(ty.to_owned());
            }
            None => {
                exception.module = None;
                exception.ty = Some(original.to_owned());
            }
        }

        true
    }

    /// Remaps one obfuscated frame.
    ///
    /// The first view that expands the frame's method and line wins. If none
    /// does, the first view that knows the frame's class is used to remap
    /// just the module. Returns `None` if neither matches, or if the frame
    /// lacks a module or function.
    pub fn remap_frame(&self, frame: &Frame) -> Option<RemappedFrame> {
        let module = frame.module.as_deref().filter(|m| !m.is_empty())?;
        let function = frame.function.as_deref().filter(|f| !f.is_empty())?;
        let line = frame.lineno.unwrap_or(0);

        for view in self.mappings.views() {
            let mapped = view.remap_frame(module, function, line);
            // the last record belongs to the obfuscated method itself
            let Some(bottom) = mapped.last() else {
                continue;
            };
            let bottom_class = bottom.class_name();

            let frames = mapped
                .iter()
                .rev()
                .map(|mapped| {
                    let mut new_frame = frame.clone();
                    new_frame.module = Some(mapped.class_name().to_owned());
                    new_frame.function = Some(mapped.method().to_owned());
                    new_frame.lineno = Some(mapped.line());

                    if mapped.class_name() != bottom_class {
                        new_frame.filename = None;
                        new_frame.abs_path = None;
                    }

                    new_frame
                })
                .collect::<Vec<_>>();

            tracing::trace!(module, function, line, expanded = frames.len(), "remapped frame");
            return Some(RemappedFrame {
                frames,
                raw_frames: vec![frame.clone()],
                strategy: RemapStrategy::Frame,
            });
        }

        let original = self
            .mappings
            .views()
            .iter()
            .find_map(|view| view.remap_class(module).filter(|c| !c.is_empty()))?;

        tracing::trace!(module, original, "remapped frame class");
        let mut new_frame = frame.clone();
        new_frame.module = Some(original.to_owned());

        Some(RemappedFrame {
            frames: vec![new_frame],
            raw_frames: vec![frame.clone()],
            strategy: RemapStrategy::ClassOnly,
        })
    }
}
