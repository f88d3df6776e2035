//! Performance benchmarks for native dispatch.
//!
//! Measures the cost of each call shape end to end through `ScriptState`:
//! free functions, const and mutable methods, inherited methods, constructors
//! and property access.
//!
//! ## Profiling with Puffin
//!
//! Run with the `profile-with-puffin` feature to collect scope timings for
//! the instrumented dispatch paths:
//!
//! ```bash
//! cargo bench --features profile-with-puffin -- --profile-time 5
//! ```

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use stackbind::prelude::*;

#[cfg(feature = "profile-with-puffin")]
static FRAME_VIEW: std::sync::OnceLock<puffin::GlobalFrameView> = std::sync::OnceLock::new();

/// Initialize puffin profiler.
#[cfg(feature = "profile-with-puffin")]
fn setup_profiler() {
    puffin::set_scopes_on(true);
    FRAME_VIEW.get_or_init(puffin::GlobalFrameView::default);
}

#[cfg(not(feature = "profile-with-puffin"))]
fn setup_profiler() {}

/// Call at the end of each benchmark iteration to flush profiling data.
#[cfg(feature = "profile-with-puffin")]
fn end_profiling_frame() {
    puffin::GlobalProfiler::lock().new_frame();
}

#[cfg(not(feature = "profile-with-puffin"))]
fn end_profiling_frame() {}

#[cfg(feature = "profile-with-puffin")]
fn print_profiling_stats() {
    let Some(frame_view) = FRAME_VIEW.get() else {
        println!("Profiler not initialized");
        return;
    };
    let view = frame_view.lock();
    println!(
        "\n=== Profiling Summary ({} frames) ===",
        view.recent_frames().count()
    );
}

#[cfg(not(feature = "profile-with-puffin"))]
fn print_profiling_stats() {}

#[derive(Debug, Clone, Default)]
struct Vec2 {
    x: f64,
    y: f64,
}

impl NativeType for Vec2 {
    const NAME: &'static str = "Vec2";
}

#[derive(Debug, Clone, Default)]
struct Body {
    position: Vec2,
    mass: f64,
}

impl NativeType for Body {
    const NAME: &'static str = "Body";
}

impl Inherits<Vec2> for Body {
    fn upcast(&self) -> &Vec2 {
        &self.position
    }

    fn upcast_mut(&mut self) -> &mut Vec2 {
        &mut self.position
    }
}

fn state() -> ScriptState {
    let mut registry = TypeRegistry::new();
    Class::<Vec2>::new(&mut registry, "Vec2")
        .constructor(|x: f64, y: f64| Vec2 { x, y })
        .method("length", |v: &Vec2| (v.x * v.x + v.y * v.y).sqrt())
        .method_mut("scale", |v: &mut Vec2, k: f64| {
            v.x *= k;
            v.y *= k;
        })
        .method("dot", |a: &Vec2, b: Vec2| a.x * b.x + a.y * b.y)
        .property("x", |v: &Vec2| v.x, |v: &mut Vec2, x: f64| v.x = x);
    Class::<Body>::new(&mut registry, "Body")
        .default_constructor()
        .inherits::<Vec2>()
        .property_get("mass", |b: &Body| b.mass);
    registry.register_function("add", (|a: i64, b: i64| a + b).into_function());
    ScriptState::new(registry)
}

fn bench_dispatch(c: &mut Criterion) {
    setup_profiler();

    let mut state = state();
    let v = state
        .construct("Vec2", vec![Value::Float(3.0), Value::Float(4.0)])
        .unwrap_or_default();
    let body = state.construct("Body", vec![]).unwrap_or_default();

    let mut group = c.benchmark_group("dispatch");

    group.bench_function("function", |b| {
        b.iter(|| {
            let r = state.call_function("add", vec![Value::Int(1), Value::Int(2)]);
            end_profiling_frame();
            black_box(r)
        })
    });

    group.bench_function("const_method", |b| {
        b.iter(|| {
            let r = state.call_method(&v, "length", vec![]);
            end_profiling_frame();
            black_box(r)
        })
    });

    group.bench_function("mut_method", |b| {
        b.iter(|| {
            let r = state.call_method(&v, "scale", vec![Value::Float(1.0)]);
            end_profiling_frame();
            black_box(r)
        })
    });

    group.bench_function("inherited_method", |b| {
        b.iter(|| {
            let r = state.call_method(&body, "length", vec![]);
            end_profiling_frame();
            black_box(r)
        })
    });

    group.bench_function("object_argument", |b| {
        b.iter(|| {
            let r = state.call_method(&v, "dot", vec![v.clone()]);
            end_profiling_frame();
            black_box(r)
        })
    });

    group.bench_function("constructor", |b| {
        b.iter(|| {
            let r = state.construct("Vec2", vec![Value::Float(1.0), Value::Float(2.0)]);
            end_profiling_frame();
            black_box(r)
        })
    });

    group.bench_function("property_get", |b| {
        b.iter(|| {
            let r = state.get_field(&v, "x");
            end_profiling_frame();
            black_box(r)
        })
    });

    group.finish();
    print_profiling_stats();
}

fn bench_failures(c: &mut Criterion) {
    let mut state = state();
    let mut group = c.benchmark_group("failures");

    for depth in [0usize, 8, 32] {
        for level in 0..depth {
            state.push_frame(FrameInfo::script("@bench.lua").at_line(level as u32 + 1));
        }
        group.bench_with_input(BenchmarkId::new("argument_count", depth), &depth, |b, _| {
            b.iter(|| black_box(state.call_function("add", vec![Value::Int(1)])))
        });
        while state.pop_frame().is_some() {}
    }

    group.finish();
}

criterion_group!(benches, bench_dispatch, bench_failures);
criterion_main!(benches);
