//! Frame loop, submission and surface management.

mod common;

use std::time::Duration;

use common::{TestContext, draw_node, tinted_pipeline, vertex_only_pipeline};
use plugin_gpu_host::{
    BufferUsage, EngineConfig, EngineState, GraphicsError, HeadlessSurface, RenderGraph,
    TextureFormat,
};

#[test]
fn test_frame_timing() {
    let mut ctx = TestContext::new();
    ctx.engine.start().unwrap();

    let first = ctx.run_frame(|_, _| Ok(())).unwrap().unwrap();
    assert_eq!(first.frame_index, 0);
    assert_eq!(first.delta, Duration::ZERO);

    let second = ctx.run_frame(|_, _| Ok(())).unwrap().unwrap();
    assert_eq!(second.frame_index, 1);
    assert_eq!(second.delta, Duration::from_millis(16));
    assert_eq!(ctx.engine.time(), second);
    assert_eq!(ctx.engine.metrics().frame_count, 2);
}

#[test]
fn test_long_gap_is_clamped() {
    let mut ctx = TestContext::new();
    ctx.engine.start().unwrap();
    ctx.run_frame(|_, _| Ok(())).unwrap();

    ctx.scheduler.take_pending();
    let time = ctx
        .engine
        .frame(Duration::from_secs(10), |_, _| Ok(()))
        .unwrap()
        .unwrap();
    assert_eq!(time.delta, Duration::from_millis(250));
}

#[test]
fn test_pause_excludes_paused_interval() {
    let mut ctx = TestContext::new();
    ctx.engine.start().unwrap();
    ctx.run_frame(|_, _| Ok(())).unwrap();
    ctx.run_frame(|_, _| Ok(())).unwrap();

    ctx.engine.pause().unwrap();
    assert_eq!(ctx.engine.state(), EngineState::Paused);
    assert_eq!(ctx.scheduler.cancelled_count(), 1);

    ctx.engine.resume().unwrap();
    let time = ctx.run_frame(|_, _| Ok(())).unwrap().unwrap();
    assert_eq!(time.delta, Duration::ZERO);
    assert_eq!(time.elapsed, Duration::from_millis(16));
}

#[test]
fn test_one_request_outstanding() {
    let mut ctx = TestContext::new();
    ctx.engine.start().unwrap();
    for _ in 0..3 {
        ctx.run_frame(|_, _| Ok(())).unwrap();
    }
    assert_eq!(ctx.scheduler.requested_count(), 4);
    assert!(ctx.scheduler.pending().is_some());

    // A frame body that stops the engine leaves nothing requested.
    ctx.run_frame(|engine, _| engine.stop()).unwrap();
    assert!(ctx.scheduler.pending().is_none());
    assert_eq!(ctx.run_frame(|_, _| Ok(())).unwrap(), None);
}

#[test]
fn test_failing_frame_still_requests_next() {
    let mut ctx = TestContext::new();
    ctx.engine.start().unwrap();
    let err = ctx
        .run_frame(|_, _| Err(GraphicsError::Validation("boom".into())))
        .unwrap_err();
    assert!(err.is_validation());
    assert!(ctx.scheduler.pending().is_some());
    assert_eq!(ctx.engine.state(), EngineState::Running);
}

#[test]
fn test_manual_submission() {
    let mut ctx = TestContext::with_config(
        EngineConfig::default()
            .with_label("manual")
            .with_auto_submit(false),
    );
    ctx.add_surface();
    let p = ctx.plugin("p");
    let pipeline = ctx.pipeline(&p, &vertex_only_pipeline());
    ctx.engine
        .register_graph(RenderGraph::new("main").with_node(draw_node("draw", pipeline)))
        .unwrap();

    ctx.engine.start().unwrap();
    for _ in 0..2 {
        ctx.run_frame(|engine, _| engine.encode("frame", |enc| enc.execute_all_graphs().map(|_| ())))
            .unwrap();
    }
    assert_eq!(ctx.engine.pending_command_buffers(), 2);
    assert_eq!(ctx.backend.stats().submissions, 0);

    assert_eq!(ctx.engine.submit().unwrap(), 2);
    assert_eq!(ctx.engine.submit().unwrap(), 0);
    let metrics = ctx.engine.metrics();
    assert_eq!(metrics.command_buffers_submitted, 2);
    assert_eq!(metrics.total_draw_calls, 2);
    assert_eq!(ctx.backend.stats().submissions, 1);
}

#[test]
fn test_empty_encoding_is_not_queued() {
    let mut ctx = TestContext::new();
    let value = ctx.engine.encode("nothing", |_| Ok(42)).unwrap();
    assert_eq!(value, 42);
    assert_eq!(ctx.engine.pending_command_buffers(), 0);
}

#[test]
fn test_copy_commands_through_encoder() {
    let mut ctx = TestContext::new();
    let p = ctx.plugin("p");
    let src = ctx.buffer(&p, 64, BufferUsage::COPY_SRC);
    let dst = ctx.buffer(&p, 64, BufferUsage::COPY_DST);

    ctx.engine
        .encode("upload", |enc| {
            enc.encoder().copy_buffer_to_buffer(&src, 0, &dst, 16, 32)?;
            enc.encoder().clear_buffer(&dst, 0, None)
        })
        .unwrap();
    assert_eq!(ctx.engine.submit().unwrap(), 1);
    assert_eq!(ctx.backend.stats().commands_submitted, 2);

    let err = ctx
        .engine
        .encode("bad", |enc| enc.encoder().copy_buffer_to_buffer(&dst, 0, &src, 0, 4))
        .unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_metrics_snapshot() {
    let mut ctx = TestContext::new();
    ctx.add_surface();
    let p = ctx.plugin("p");
    ctx.buffer(&p, 256, BufferUsage::UNIFORM);
    ctx.texture(&p, 8, 8);
    ctx.pipeline(&p, &tinted_pipeline(TextureFormat::Bgra8Unorm));
    let misses = ctx.engine.metrics().shader_cache.misses;
    ctx.pipeline(&p, &tinted_pipeline(TextureFormat::Bgra8Unorm));

    let metrics = ctx.engine.metrics();
    assert_eq!(metrics.buffers, 1);
    assert_eq!(metrics.textures, 1);
    assert_eq!(metrics.pipelines, 2);
    assert_eq!(metrics.registered_plugins, 1);
    assert_eq!(metrics.surfaces, 1);
    assert_eq!(metrics.estimated_memory_bytes, 256 + 8 * 8 * 4);
    assert_eq!(metrics.shader_cache.misses, misses);
    assert!(metrics.shader_cache.hits > 0);
}

#[test]
fn test_shader_errors_are_reported() {
    let mut ctx = TestContext::new();
    let p = ctx.plugin("p");
    let broken = plugin_gpu_host::RenderPipelineDescriptor::new(
        plugin_gpu_host::ShaderStageDescriptor::new("fn vs_main( {", "vs_main"),
    )
    .with_label("broken");

    let err = ctx.engine.plugin(&p).unwrap().create_pipeline(&broken).unwrap_err();
    match err {
        GraphicsError::ShaderCompilationFailed { label, errors } => {
            assert_eq!(label, "broken");
            assert!(!errors.is_empty());
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(ctx.engine.pipelines().pipeline_count(), 0);
}

#[test]
fn test_surface_management() {
    let mut ctx = TestContext::new();
    let first = ctx
        .engine
        .add_surface(Box::new(
            HeadlessSurface::new("main", 800, 600, TextureFormat::Bgra8Unorm).unwrap(),
        ))
        .unwrap();
    let second = ctx
        .engine
        .add_surface(Box::new(
            HeadlessSurface::new("preview", 128, 128, TextureFormat::Rgba8Unorm).unwrap(),
        ))
        .unwrap();
    assert_ne!(first, second);
    assert_eq!(ctx.engine.bound_surface(), Some(first));
    assert_eq!(ctx.engine.surface_count(), 2);

    ctx.engine.bind_surface(second).unwrap();
    ctx.engine.resize_surface(second, 256, 64).unwrap();
    let view = ctx.engine.encode("view", |enc| enc.surface_view()).unwrap();
    assert_eq!((view.size.width, view.size.height), (256, 64));
    assert_eq!(view.format, TextureFormat::Rgba8Unorm);

    assert!(ctx.engine.resize_surface(second, 0, 64).unwrap_err().is_validation());

    ctx.engine.remove_surface(second).unwrap();
    assert_eq!(ctx.engine.bound_surface(), None);
    assert!(ctx.engine.bind_surface(second).unwrap_err().is_validation());
    assert!(ctx.engine.remove_surface(second).unwrap_err().is_validation());
    assert_eq!(ctx.engine.surface_count(), 1);
}

#[test]
fn test_surface_rejects_bad_parameters() {
    assert!(matches!(
        HeadlessSurface::new("empty", 0, 16, TextureFormat::Bgra8Unorm),
        Err(GraphicsError::SurfaceCreationFailed(_))
    ));
    assert!(matches!(
        HeadlessSurface::new("depth", 16, 16, TextureFormat::Depth32Float),
        Err(GraphicsError::SurfaceCreationFailed(_))
    ));
}

#[test]
fn test_device_loss_during_submit() {
    let mut ctx = TestContext::new();
    ctx.add_surface();
    let p = ctx.plugin("p");
    let buffer = ctx.buffer(&p, 32, BufferUsage::VERTEX);
    let pipeline = ctx.pipeline(&p, &vertex_only_pipeline());
    ctx.engine
        .register_graph(RenderGraph::new("main").with_node(draw_node("draw", pipeline)))
        .unwrap();
    ctx.engine.start().unwrap();

    let backend = ctx.backend.clone();
    let err = ctx
        .run_frame(move |engine, _| {
            engine.encode("frame", |enc| enc.execute_all_graphs().map(|_| ()))?;
            backend.simulate_device_loss("driver reset");
            Ok(())
        })
        .unwrap_err();

    assert_eq!(err, GraphicsError::DeviceLost("driver reset".into()));
    assert!(ctx.engine.is_disposed());
    assert!(buffer.is_disposed());
    assert!(ctx.scheduler.pending().is_none());
    assert_eq!(ctx.engine.metrics().pending_command_buffers, 0);
}

#[test]
fn test_disposed_engine_rejects_work() {
    let mut ctx = TestContext::new();
    let surface = ctx.add_surface();
    ctx.engine.dispose();

    assert_eq!(ctx.engine.state(), EngineState::Disposed);
    assert_eq!(ctx.engine.surface_count(), 0);
    assert!(matches!(
        ctx.engine.encode("late", |_| Ok(())),
        Err(GraphicsError::AlreadyDisposed(_))
    ));
    assert!(matches!(
        ctx.engine.bind_surface(surface),
        Err(GraphicsError::AlreadyDisposed(_))
    ));
    assert!(matches!(
        ctx.engine.submit(),
        Err(GraphicsError::AlreadyDisposed(_))
    ));
}
