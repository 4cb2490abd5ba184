//! This crate deobfuscates Java and Android crash events using proguard
//! mapping files.
//!
//! Mapping files are identified by a [`DebugIdentifier`]. The mappings for
//! one event are loaded into a [`MappingSet`], which a [`RemapEngine`] uses to
//! restore exception classes and stack frames, including methods that were
//! inlined by the compiler. [`JavaStacktraceProcessor`] drives this for a
//! whole [`Event`].
//!
//! # Examples
//!
//! ```
//! use proguard_remap::{Event, JavaStacktraceProcessor, MemoryProvider, ProguardMapper};
//!
//! let mapping = "\
//! com.example.MainActivity -> a.b:
//!     4:4:void buttonClicked(android.view.View):29:29 -> onClick
//! ";
//! let provider: MemoryProvider<_> =
//!     [("5e9f6a21", ProguardMapper::from(mapping))].into_iter().collect();
//!
//! let mut event: Event = serde_json::from_str(r#"{
//!     "platform": "java",
//!     "exception": {"values": [{
//!         "type": "RuntimeException",
//!         "module": "java.lang",
//!         "stacktrace": {"frames": [{"module": "a.b", "function": "onClick", "lineno": 4}]}
//!     }]},
//!     "debug_meta": {"images": [{"type": "proguard", "uuid": "5e9f6a21"}]}
//! }"#).unwrap();
//!
//! let summary = JavaStacktraceProcessor::new(&provider).process_event(&mut event);
//! assert_eq!(summary.remapped_frames, 1);
//!
//! let exceptions = event.exception.unwrap();
//! let frame = &exceptions.values[0].stacktrace.as_ref().unwrap().frames[0];
//! assert_eq!(frame.module.as_deref(), Some("com.example.MainActivity"));
//! assert_eq!(frame.function.as_deref(), Some("buttonClicked"));
//! assert_eq!(frame.lineno, Some(29));
//! ```

#![warn(missing_docs)]

mod config;
mod engine;
mod mapper;
mod mapping;
mod mapping_set;
mod processor;
pub mod protocol;
mod resolver;
mod view;

pub use config::{Config, ConfigError};
pub use engine::{handles_frame, RemapEngine, RemapStrategy, RemappedFrame, JAVA_PLATFORM};
pub use mapper::ProguardMapper;
pub use mapping::{
    LineMapping, ParseError, ParseErrorKind, ProguardMapping, ProguardRecord, ProguardRecordIter,
};
pub use mapping_set::{
    DebugIdentifier, Diagnostic, DiagnosticKind, DiagnosticSink, MappingSet, ProcessingOutcome,
};
pub use processor::{JavaStacktraceProcessor, ProcessingSummary};
pub use protocol::Event;
pub use resolver::{
    DirectoryResolver, FileProvider, MappingProvider, MappingResolver, MemoryProvider,
};
pub use view::{LoadError, MappedFrame, MappingView, ProguardMappingView};
