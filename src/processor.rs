//! Deobfuscation of whole events.

use std::mem;

use serde::Serialize;

use crate::config::Config;
use crate::engine::{handles_frame, RemapEngine, RemapStrategy, JAVA_PLATFORM};
use crate::mapping_set::{DebugIdentifier, MappingSet, ProcessingOutcome};
use crate::protocol::{Event, Exception, Stacktrace};
use crate::resolver::MappingProvider;
use crate::view::MappingView;

/// Counters collected while processing one event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingSummary {
    /// The outcome for every referenced mapping file.
    pub outcomes: Vec<(DebugIdentifier, ProcessingOutcome)>,
    /// Exceptions whose class was remapped.
    pub remapped_exceptions: usize,
    /// Frames whose method and line were remapped.
    pub remapped_frames: usize,
    /// Frames of which only the class was remapped.
    pub class_only_frames: usize,
    /// Handled frames that no mapping knew about.
    pub unmapped_frames: usize,
    /// Exception messages in which an obfuscated method name was replaced.
    pub remapped_values: usize,
}

impl ProcessingSummary {
    /// Whether any part of the event was changed.
    pub fn has_changes(&self) -> bool {
        self.remapped_exceptions
            + self.remapped_frames
            + self.class_only_frames
            + self.remapped_values
            > 0
    }
}

/// Deobfuscates Java exceptions and stack traces in events.
#[derive(Debug)]
pub struct JavaStacktraceProcessor<'p, P> {
    provider: &'p P,
    platform: String,
}

impl<'p, P> JavaStacktraceProcessor<'p, P>
where
    P: MappingProvider,
{
    /// Create a new JavaStacktraceProcessor handling `java` frames.
    pub fn new(provider: &'p P) -> Self {
        Self {
            provider,
            platform: JAVA_PLATFORM.to_owned(),
        }
    }

    /// Create a new JavaStacktraceProcessor from a configuration.
    pub fn with_config(provider: &'p P, config: &Config) -> Self {
        Self::new(provider).with_platform(config.platform.clone())
    }

    /// Sets the platform of the frames to deobfuscate.
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// The platform of the frames deobfuscated by this processor.
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Deobfuscates `event` in place.
    ///
    /// Nothing happens unless the event references mapping files and has at
    /// least one stack frame of the processor's platform. Missing or unusable
    /// mapping files are recorded as errors on the event. Frames that cannot
    /// be remapped are left untouched. When a stack trace changes, its
    /// original is kept in `raw_stacktrace` unless that is already set.
    ///
    /// Finally, the obfuscated name of the last exception's top frame is
    /// replaced in that exception's message.
    pub fn process_event(&self, event: &mut Event) -> ProcessingSummary {
        let mut summary = ProcessingSummary::default();

        let debug_ids = event.proguard_images();
        if debug_ids.is_empty() {
            return summary;
        }

        if self.handles_event(event) {
            self.remap_event(event, &debug_ids, &mut summary);
        }

        if let Some(exception) = event
            .exception
            .as_mut()
            .and_then(|exceptions| exceptions.values.last_mut())
        {
            if deobfuscate_exception_value(exception) {
                summary.remapped_values += 1;
            }
        }

        tracing::debug!(
            remapped_exceptions = summary.remapped_exceptions,
            remapped_frames = summary.remapped_frames,
            class_only_frames = summary.class_only_frames,
            unmapped_frames = summary.unmapped_frames,
            remapped_values = summary.remapped_values,
            "processed event"
        );

        summary
    }

    /// Whether any stack frame of the event belongs to the handled platform.
    fn handles_event(&self, event: &Event) -> bool {
        let event_platform = event.platform.as_deref();
        let exceptions = event
            .exception
            .iter()
            .flat_map(|exceptions| &exceptions.values)
            .map(|exception| &exception.stacktrace);
        let threads = event
            .threads
            .iter()
            .flat_map(|threads| &threads.values)
            .map(|thread| &thread.stacktrace);

        exceptions
            .chain(threads)
            .flatten()
            .flat_map(|stacktrace| &stacktrace.frames)
            .any(|frame| {
                frame.platform.as_deref().or(event_platform) == Some(self.platform.as_str())
            })
    }

    fn remap_event(
        &self,
        event: &mut Event,
        debug_ids: &[DebugIdentifier],
        summary: &mut ProcessingSummary,
    ) {
        let mappings = MappingSet::build(debug_ids, self.provider, &mut *event);
        summary.outcomes = mappings.outcomes().to_vec();
        if mappings.is_empty() {
            return;
        }

        let engine = RemapEngine::new(&mappings);
        let event_platform = event.platform.clone();
        let event_platform = event_platform.as_deref();

        if let Some(exceptions) = &mut event.exception {
            for exception in &mut exceptions.values {
                if engine.remap_exception(exception) {
                    summary.remapped_exceptions += 1;
                }
                self.process_stacktrace(
                    engine,
                    event_platform,
                    &mut exception.stacktrace,
                    &mut exception.raw_stacktrace,
                    summary,
                );
            }
        }

        if let Some(threads) = &mut event.threads {
            for thread in &mut threads.values {
                self.process_stacktrace(
                    engine,
                    event_platform,
                    &mut thread.stacktrace,
                    &mut thread.raw_stacktrace,
                    summary,
                );
            }
        }
    }

    fn process_stacktrace<V: MappingView>(
        &self,
        engine: RemapEngine<'_, V>,
        event_platform: Option<&str>,
        stacktrace: &mut Option<Stacktrace>,
        raw_stacktrace: &mut Option<Stacktrace>,
        summary: &mut ProcessingSummary,
    ) {
        let Some(stacktrace) = stacktrace else {
            return;
        };

        let mut changed = false;
        let mut frames = Vec::with_capacity(stacktrace.frames.len());

        for frame in &stacktrace.frames {
            if !handles_frame(frame, event_platform, &self.platform) {
                frames.push(frame.clone());
                continue;
            }

            match engine.remap_frame(frame) {
                Some(remapped) => {
                    match remapped.strategy {
                        RemapStrategy::Frame => summary.remapped_frames += 1,
                        RemapStrategy::ClassOnly => summary.class_only_frames += 1,
                    }
                    frames.extend(remapped.frames);
                    changed = true;
                }
                None => {
                    summary.unmapped_frames += 1;
                    frames.push(frame.clone());
                }
            }
        }

        if !changed {
            return;
        }

        let original = mem::replace(&mut stacktrace.frames, frames);
        if raw_stacktrace.is_none() {
            *raw_stacktrace = Some(Stacktrace {
                frames: original,
                other: stacktrace.other.clone(),
            });
        }
    }
}

/// Replaces the obfuscated `module.function` of the exception's top raw frame
/// in its message with the deobfuscated name of its top frame.
///
/// Returns `true` if the message changed.
fn deobfuscate_exception_value(exception: &mut Exception) -> bool {
    let frame = exception
        .stacktrace
        .as_ref()
        .and_then(|stacktrace| stacktrace.frames.last());
    let raw_frame = exception
        .raw_stacktrace
        .as_ref()
        .and_then(|stacktrace| stacktrace.frames.last());
    let (Some(frame), Some(raw_frame), Some(value)) = (frame, raw_frame, &exception.value) else {
        return false;
    };

    fn non_empty(s: &Option<String>) -> Option<&str> {
        s.as_deref().filter(|s| !s.is_empty())
    }

    let (Some(module), Some(function)) = (non_empty(&frame.module), non_empty(&frame.function))
    else {
        return false;
    };
    let (Some(raw_module), Some(raw_function)) =
        (non_empty(&raw_frame.module), non_empty(&raw_frame.function))
    else {
        return false;
    };

    let obfuscated = format!("{raw_module}.{raw_function}");
    let deobfuscated = format!("{module}.{function}");
    if obfuscated == deobfuscated || !value.contains(&obfuscated) {
        return false;
    }

    tracing::trace!(%obfuscated, %deobfuscated, "remapped exception value");
    let value = value.replace(&obfuscated, &deobfuscated);
    exception.value = Some(value);
    true
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::protocol::Frame;
    use crate::resolver::MemoryProvider;
    use crate::ProguardMapper;

    const MAPPING: &str = "\
com.example.Main -> a:
    1:1:void main(java.lang.String[]):10 -> a
com.example.Error -> x.b:
    1:1:void <init>():5 -> <init>
";

    fn event() -> Event {
        serde_json::from_value(json!({
            "platform": "java",
            "exception": {
                "values": [{
                    "type": "b",
                    "module": "x",
                    "stacktrace": {
                        "frames": [
                            {"module": "a", "function": "a", "lineno": 1},
                            {"module": "a", "function": "x", "lineno": 1},
                            {"module": "z", "function": "z", "lineno": 1},
                            {"platform": "native", "function": "abort"}
                        ]
                    }
                }]
            },
            "debug_meta": {"images": [{"type": "proguard", "uuid": "main"}]}
        }))
        .unwrap()
    }

    #[test]
    fn processes_stacktraces() {
        let provider: MemoryProvider<_> =
            [("main", ProguardMapper::from(MAPPING))].into_iter().collect();
        let processor = JavaStacktraceProcessor::new(&provider);

        let mut event = event();
        let summary = processor.process_event(&mut event);

        assert_eq!(
            summary,
            ProcessingSummary {
                outcomes: vec![("main".into(), ProcessingOutcome::Loaded)],
                remapped_exceptions: 1,
                remapped_frames: 1,
                class_only_frames: 1,
                unmapped_frames: 1,
                remapped_values: 0,
            }
        );
        assert!(summary.has_changes());

        let exception = &event.exception.as_ref().unwrap().values[0];
        assert_eq!(exception.module.as_deref(), Some("com.example"));
        assert_eq!(exception.ty.as_deref(), Some("Error"));

        let frames = &exception.stacktrace.as_ref().unwrap().frames;
        assert_eq!(frames[0].module.as_deref(), Some("com.example.Main"));
        assert_eq!(frames[0].function.as_deref(), Some("main"));
        assert_eq!(frames[0].lineno, Some(10));
        assert_eq!(frames[1].module.as_deref(), Some("com.example.Main"));
        assert_eq!(frames[1].function.as_deref(), Some("x"));
        assert_eq!(frames[2].module.as_deref(), Some("z"));

        let raw = exception.raw_stacktrace.as_ref().unwrap();
        assert_eq!(raw.frames[0].module.as_deref(), Some("a"));
        assert_eq!(raw.frames.len(), 4);
        assert!(event.errors.is_empty());
    }

    #[test]
    fn without_images() {
        let provider: MemoryProvider<ProguardMapper> = MemoryProvider::new();
        let processor = JavaStacktraceProcessor::new(&provider);

        let mut event = event();
        event.debug_meta = None;
        let before = event.clone();

        let summary = processor.process_event(&mut event);
        assert_eq!(summary, ProcessingSummary::default());
        assert_eq!(event, before);
    }

    #[test]
    fn missing_mapping_is_recorded() {
        let provider: MemoryProvider<ProguardMapper> = MemoryProvider::new();
        let processor = JavaStacktraceProcessor::new(&provider);

        let mut event = event();
        let summary = processor.process_event(&mut event);

        assert!(!summary.has_changes());
        assert_eq!(event.errors.len(), 1);
        assert_eq!(event.errors[0].ty, "proguard_missing_mapping");
        assert_eq!(event.errors[0].mapping_uuid, Some(DebugIdentifier::from("main")));
        assert_eq!(event.metrics.get("flag.processing.error"), Some(&json!(true)));

        let exception = &event.exception.as_ref().unwrap().values[0];
        assert!(exception.raw_stacktrace.is_none());
    }

    #[test]
    fn other_platform() {
        let provider: MemoryProvider<_> =
            [("main", ProguardMapper::from(MAPPING))].into_iter().collect();
        let processor = JavaStacktraceProcessor::new(&provider).with_platform("kotlin");
        assert_eq!(processor.platform(), "kotlin");

        // without kotlin frames, mappings are neither fetched nor applied
        let mut event = event();
        let before = event.clone();
        let summary = processor.process_event(&mut event);
        assert_eq!(summary, ProcessingSummary::default());
        assert_eq!(event, before);
    }

    #[test]
    fn exception_value_names_the_original_method() {
        let provider: MemoryProvider<_> =
            [("main", ProguardMapper::from(MAPPING))].into_iter().collect();
        let processor = JavaStacktraceProcessor::new(&provider);

        let mut event = event();
        {
            let exception = &mut event.exception.as_mut().unwrap().values[0];
            exception.value = Some("Crashed in a.a while starting".into());
            exception.stacktrace.as_mut().unwrap().frames.truncate(1);
        }

        let summary = processor.process_event(&mut event);
        assert_eq!(summary.remapped_values, 1);
        assert!(summary.has_changes());

        let exception = &event.exception.as_ref().unwrap().values[0];
        assert_eq!(
            exception.value.as_deref(),
            Some("Crashed in com.example.Main.main while starting")
        );
    }

    #[test]
    fn exception_value_needs_both_stacktraces() {
        let mut exception = Exception {
            value: Some("Crashed in a.a".into()),
            stacktrace: Some(Stacktrace {
                frames: vec![Frame {
                    module: Some("com.example.Main".into()),
                    function: Some("main".into()),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(!deobfuscate_exception_value(&mut exception));

        exception.raw_stacktrace = Some(Stacktrace {
            frames: vec![Frame {
                module: Some("a".into()),
                function: Some("a".into()),
                ..Default::default()
            }],
            ..Default::default()
        });
        assert!(deobfuscate_exception_value(&mut exception));
        assert_eq!(exception.value.as_deref(), Some("Crashed in com.example.Main.main"));

        // nothing left to replace
        assert!(!deobfuscate_exception_value(&mut exception));
    }
}
