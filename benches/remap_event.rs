use criterion::{black_box, criterion_group, criterion_main, Criterion};
use proguard_remap::{
    Event, JavaStacktraceProcessor, MemoryProvider, ProguardMapper, ProguardMapping,
};
use serde_json::json;

static MAPPING: &str = r#"# compiler: R8
io.sentry.sample.MainActivity -> io.sentry.sample.MainActivity:
    void <init>() -> <init>
    1:1:void bar():54:54 -> a
    1:1:void foo():44 -> a
    1:1:void onClickHandler(android.view.View):40 -> a
    2:2:void io.sentry.sample.Util.helper():12:12 -> a
    2:2:void onClickHandler(android.view.View):41 -> a
    1:1:void onCreate(android.os.Bundle):21:21 -> onCreate
io.sentry.sample.MainActivity$OneMoreInnerClass -> io.sentry.sample.MainActivity$b:
    1:1:void run():67:67 -> run
io.sentry.sample.RocketException -> io.sentry.sample.e:
    1:1:void <init>(java.lang.String):12:12 -> <init>
io.sentry.sample.Util -> io.sentry.sample.a:
    1:1:void helper():12:12 -> a
"#;

fn event() -> Event {
    let mut frames = vec![
        json!({"function": "main", "module": "com.android.internal.os.ZygoteInit", "lineno": 930}),
        json!({"function": "invoke", "module": "java.lang.reflect.Method"}),
        json!({"function": "loop", "module": "android.os.Looper", "lineno": 214}),
        json!({"function": "performClick", "module": "android.view.View", "lineno": 7125}),
    ];
    for lineno in [1, 2, 1, 2] {
        frames.push(json!({
            "function": "a",
            "module": "io.sentry.sample.MainActivity",
            "lineno": lineno,
            "filename": "SourceFile"
        }));
    }
    frames.push(json!({
        "function": "run",
        "module": "io.sentry.sample.MainActivity$b",
        "lineno": 1
    }));
    frames.push(json!({"function": "x", "module": "io.sentry.sample.a", "lineno": 3}));

    serde_json::from_value(json!({
        "platform": "java",
        "exception": {
            "values": [{
                "type": "e",
                "module": "io.sentry.sample",
                "stacktrace": {"frames": frames.clone()}
            }]
        },
        "threads": {
            "values": [{"stacktrace": {"frames": frames}}]
        },
        "debug_meta": {"images": [{"type": "proguard", "uuid": "sample"}]}
    }))
    .unwrap()
}

fn benchmark_remap_event(c: &mut Criterion) {
    let provider: MemoryProvider<_> =
        [("sample", ProguardMapper::from(MAPPING))].into_iter().collect();
    let processor = JavaStacktraceProcessor::new(&provider);
    let event = event();

    let mut group = c.benchmark_group("Event Remapping");

    group.bench_function("Processor, preparsed", |b| {
        b.iter(|| {
            let mut event = event.clone();
            processor.process_event(black_box(&mut event));
            event
        })
    });
    group.bench_function("Processor", |b| {
        b.iter(|| {
            let provider: MemoryProvider<_> = [(
                "sample",
                ProguardMapper::new(black_box(ProguardMapping::new(MAPPING.as_bytes()))),
            )]
            .into_iter()
            .collect();
            let mut event = event.clone();
            JavaStacktraceProcessor::new(&provider).process_event(black_box(&mut event));
            event
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_remap_event);
criterion_main!(benches);
