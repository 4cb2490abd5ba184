//! The crash event data model.
//!
//! Only the attributes touched by deobfuscation are modelled explicitly. All
//! other attributes are kept in `other` maps and written back unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::mapping_set::{DebugIdentifier, Diagnostic, DiagnosticSink};

/// Attributes that are not interpreted, keyed by name.
pub type Object = BTreeMap<String, Value>;

/// A single stack frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// The platform of this frame, overriding the event platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// The fully-qualified class name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// The method name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// The line number, 1-based.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineno: Option<usize>,
    /// The source file name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// The absolute path of the source file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abs_path: Option<String>,
    /// Any other attributes.
    #[serde(flatten)]
    pub other: Object,
}

/// A list of stack frames, oldest call first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Stacktrace {
    /// The frames of this stack trace.
    #[serde(default)]
    pub frames: Vec<Frame>,
    /// Any other attributes.
    #[serde(flatten)]
    pub other: Object,
}

/// An exception, possibly with its stack trace.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Exception {
    /// The exception class name without its package.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    /// The package of the exception class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// The exception message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// The stack trace of the exception.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<Stacktrace>,
    /// The stack trace before deobfuscation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_stacktrace: Option<Stacktrace>,
    /// Any other attributes.
    #[serde(flatten)]
    pub other: Object,
}

/// A thread, possibly with its stack trace.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    /// The stack trace of the thread.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<Stacktrace>,
    /// The stack trace before deobfuscation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_stacktrace: Option<Stacktrace>,
    /// Any other attributes.
    #[serde(flatten)]
    pub other: Object,
}

/// A wrapper around a list of values, as used by `exception` and `threads`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Values<T> {
    /// The values.
    #[serde(default = "Vec::new")]
    pub values: Vec<T>,
    /// Any other attributes.
    #[serde(flatten)]
    pub other: Object,
}

impl<T> Default for Values<T> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            other: Object::new(),
        }
    }
}

impl<T> From<Vec<T>> for Values<T> {
    fn from(values: Vec<T>) -> Self {
        Self {
            values,
            other: Object::new(),
        }
    }
}

/// A debug file referenced by an event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugImage {
    /// The kind of debug file, `proguard` for mapping files.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    /// The identifier of a proguard mapping file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<DebugIdentifier>,
    /// Any other attributes.
    #[serde(flatten)]
    pub other: Object,
}

/// Debug files referenced by an event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugMeta {
    /// The referenced debug files.
    #[serde(default)]
    pub images: Vec<DebugImage>,
    /// Any other attributes.
    #[serde(flatten)]
    pub other: Object,
}

/// A processing error attached to an event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventError {
    /// The error code, for example `proguard_missing_mapping`.
    #[serde(rename = "type")]
    pub ty: String,
    /// The debug identifier of the affected mapping file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_uuid: Option<DebugIdentifier>,
    /// Any other attributes.
    #[serde(flatten)]
    pub other: Object,
}

impl From<Diagnostic> for EventError {
    fn from(diagnostic: Diagnostic) -> Self {
        Self {
            ty: diagnostic.kind.as_str().to_owned(),
            mapping_uuid: Some(diagnostic.debug_id),
            other: Object::new(),
        }
    }
}

/// The metric flag set when an event had processing errors.
pub const PROCESSING_ERROR_FLAG: &str = "flag.processing.error";

/// A crash event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// The platform of the event, used for frames without their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// The exceptions, innermost cause first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<Values<Exception>>,
    /// The threads running at the time of the crash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<Values<Thread>>,
    /// Debug files referenced by the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_meta: Option<DebugMeta>,
    /// Errors encountered while processing the event.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<EventError>,
    /// Internal processing metrics.
    #[serde(rename = "_metrics", default, skip_serializing_if = "Object::is_empty")]
    pub metrics: Object,
    /// Any other attributes.
    #[serde(flatten)]
    pub other: Object,
}

impl Event {
    /// The identifiers of all proguard mapping files referenced by the event.
    ///
    /// Identifiers are returned in the order of their images, without
    /// duplicates.
    pub fn proguard_images(&self) -> Vec<DebugIdentifier> {
        let mut debug_ids: Vec<DebugIdentifier> = Vec::new();
        let images = self.debug_meta.iter().flat_map(|meta| &meta.images);

        for image in images {
            if image.ty.as_deref() != Some("proguard") {
                continue;
            }
            if let Some(uuid) = &image.uuid {
                if !debug_ids.contains(uuid) {
                    debug_ids.push(uuid.clone());
                }
            }
        }

        debug_ids
    }
}

impl DiagnosticSink for Event {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.metrics
            .insert(PROCESSING_ERROR_FLAG.to_owned(), Value::Bool(true));
        self.errors.push(diagnostic.into());
    }
}
