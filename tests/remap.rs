use std::sync::Arc;

use similar_asserts::assert_eq;

use proguard_remap::protocol::{Exception, Frame};
use proguard_remap::{
    DebugIdentifier, Diagnostic, MappedFrame, MappingSet, MappingView, MemoryProvider,
    ProcessingOutcome, ProguardMappingView, RemapEngine, RemapStrategy,
};

const INLINE_MAPPING: &[u8] = br#"# compiler: R8
# {"id":"com.android.tools.r8.mapping","version":"2.0"}
com.android.tools.r8.naming.retrace.Main -> com.android.tools.r8.naming.retrace.Main:
# {"id":"sourceFile","fileName":"Main.java"}
    1:1:void main(java.lang.String[]):101:101 -> main
    2:4:void method1(java.lang.String):94:96 -> main
    2:4:void main(java.lang.String[]):102 -> main
    5:5:void method2(int):86:86 -> main
    5:5:void method1(java.lang.String):96 -> main
    5:5:void main(java.lang.String[]):102 -> main
    6:7:void method3(long):80:81 -> main
    6:7:void method2(int):88 -> main
    6:7:void method1(java.lang.String):96 -> main
    6:7:void main(java.lang.String[]):102 -> main
"#;

const FOREIGN_INLINE_MAPPING: &[u8] = b"\
io.sentry.sample.MainActivity -> io.sentry.sample.MainActivity:
    void <init>() -> <init>
    1:1:void bar():54:54 -> a
    1:1:void foo():44 -> a
    1:1:void onClickHandler(android.view.View):40 -> a
    2:2:void io.sentry.sample.Util.helper():12:12 -> a
    2:2:void onClickHandler(android.view.View):41 -> a
io.sentry.sample.Util -> io.sentry.sample.a:
    1:1:void helper():12:12 -> a
";

const NO_LINES_MAPPING: &[u8] = br#"io.sentry.sample.MainActivity -> a:
    void onClickHandler(android.view.View) -> a
"#;

type View = Arc<ProguardMappingView<'static>>;

fn view(mapping: &'static [u8]) -> View {
    Arc::new(ProguardMappingView::from_slice(mapping).unwrap())
}

fn mapping_set(views: &[(&str, &'static [u8])]) -> MappingSet<View> {
    let ids: Vec<DebugIdentifier> = views.iter().map(|(id, _)| (*id).into()).collect();
    let provider: MemoryProvider<View> = views
        .iter()
        .map(|&(id, mapping)| (id, view(mapping)))
        .collect();
    MappingSet::build(&ids, &provider, &mut Vec::<Diagnostic>::new())
}

fn frame(module: &str, function: &str, lineno: usize) -> Frame {
    Frame {
        platform: Some("java".into()),
        module: Some(module.into()),
        function: Some(function.into()),
        lineno: Some(lineno),
        filename: Some("SourceFile".into()),
        abs_path: Some("SourceFile".into()),
        ..Default::default()
    }
}

fn lines(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|line| line.to_string()).collect()
}

fn describe(frames: &[Frame]) -> Vec<String> {
    frames
        .iter()
        .map(|frame| {
            format!(
                "{}.{}:{} ({})",
                frame.module.as_deref().unwrap_or("?"),
                frame.function.as_deref().unwrap_or("?"),
                frame.lineno.unwrap_or(0),
                frame.filename.as_deref().unwrap_or("-"),
            )
        })
        .collect()
}

#[test]
fn view_expands_r8_inline_chain() {
    let view = view(INLINE_MAPPING);

    assert!(view.has_line_info());
    assert_eq!(
        view.remap_frame("com.android.tools.r8.naming.retrace.Main", "main", 7),
        vec![
            MappedFrame::new("com.android.tools.r8.naming.retrace.Main", "method3", 81),
            MappedFrame::new("com.android.tools.r8.naming.retrace.Main", "method2", 88),
            MappedFrame::new("com.android.tools.r8.naming.retrace.Main", "method1", 96),
            MappedFrame::new("com.android.tools.r8.naming.retrace.Main", "main", 102),
        ]
    );
}

#[test]
fn engine_expands_inline_chain_in_stack_order() {
    let set = mapping_set(&[("main", INLINE_MAPPING)]);
    let engine = RemapEngine::new(&set);

    let remapped = engine
        .remap_frame(&frame("com.android.tools.r8.naming.retrace.Main", "main", 3))
        .unwrap();

    assert_eq!(remapped.strategy, RemapStrategy::Frame);
    assert_eq!(
        describe(&remapped.frames),
        lines(&[
            "com.android.tools.r8.naming.retrace.Main.main:102 (SourceFile)",
            "com.android.tools.r8.naming.retrace.Main.method1:95 (SourceFile)",
        ])
    );
}

#[test]
fn foreign_classes_lose_their_file_name() {
    let set = mapping_set(&[("sample", FOREIGN_INLINE_MAPPING)]);
    let engine = RemapEngine::new(&set);

    let remapped = engine
        .remap_frame(&frame("io.sentry.sample.MainActivity", "a", 2))
        .unwrap();

    assert_eq!(
        describe(&remapped.frames),
        lines(&[
            "io.sentry.sample.MainActivity.onClickHandler:41 (SourceFile)",
            "io.sentry.sample.Util.helper:12 (-)",
        ])
    );
    assert_eq!(remapped.frames[1].abs_path, None);

    let remapped = engine
        .remap_frame(&frame("io.sentry.sample.MainActivity", "a", 1))
        .unwrap();
    assert_eq!(
        describe(&remapped.frames),
        lines(&[
            "io.sentry.sample.MainActivity.onClickHandler:40 (SourceFile)",
            "io.sentry.sample.MainActivity.foo:44 (SourceFile)",
            "io.sentry.sample.MainActivity.bar:54 (SourceFile)",
        ])
    );
}

#[test]
fn mappings_without_lines_are_excluded() {
    let set = mapping_set(&[("no-lines", NO_LINES_MAPPING), ("sample", FOREIGN_INLINE_MAPPING)]);

    assert_eq!(set.len(), 1);
    assert_eq!(
        set.outcomes(),
        &[
            (DebugIdentifier::from("no-lines"), ProcessingOutcome::MissingLineInfo),
            (DebugIdentifier::from("sample"), ProcessingOutcome::Loaded),
        ]
    );

    // the excluded mapping would know about `a`, but is never consulted
    let engine = RemapEngine::new(&set);
    assert_eq!(engine.remap_frame(&frame("a", "a", 1)), None);
}

#[test]
fn earlier_mapping_takes_precedence() {
    let set = mapping_set(&[("sample", FOREIGN_INLINE_MAPPING), ("main", INLINE_MAPPING)]);
    let engine = RemapEngine::new(&set);

    let remapped = engine
        .remap_frame(&frame("io.sentry.sample.a", "x", 1))
        .unwrap();
    assert_eq!(remapped.strategy, RemapStrategy::ClassOnly);
    assert_eq!(
        describe(&remapped.frames),
        lines(&["io.sentry.sample.Util.x:1 (SourceFile)"])
    );

    let mut exception = Exception {
        ty: Some("a".into()),
        module: Some("io.sentry.sample".into()),
        ..Default::default()
    };
    assert!(engine.remap_exception(&mut exception));
    assert_eq!(exception.module.as_deref(), Some("io.sentry.sample"));
    assert_eq!(exception.ty.as_deref(), Some("Util"));

    // the second mapping still resolves what the first doesn't know
    let remapped = engine
        .remap_frame(&frame("com.android.tools.r8.naming.retrace.Main", "main", 1))
        .unwrap();
    assert_eq!(
        describe(&remapped.frames),
        lines(&["com.android.tools.r8.naming.retrace.Main.main:101 (SourceFile)"])
    );
}
