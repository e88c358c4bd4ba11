//! Plugin teardown and leak reporting through the engine.

mod common;

use rstest::rstest;

use common::{TestContext, draw_node, vertex_only_pipeline};
use plugin_gpu_host::{
    BufferUsage, DrainPolicy, GraphicsError, PluginId, RenderGraph, ResourceKind,
};

#[test]
fn test_invalidate_plugin_without_leaks() {
    let mut ctx = TestContext::new();
    let p1 = ctx.plugin("p1");
    let buffer = ctx.buffer(&p1, 128, BufferUsage::VERTEX);
    let pipeline = ctx.pipeline(&p1, &vertex_only_pipeline());

    let report = ctx.engine.invalidate_plugin(&p1).unwrap();
    assert!(!report.has_leaks);
    assert_eq!(report.total_leak_count, 0);
    assert_eq!(report.plugin_id, Some(p1.clone()));
    assert!(buffer.is_disposed());
    assert!(pipeline.is_disposed());

    // Still registered: the reloaded plugin can create again.
    let again = ctx.buffer(&p1, 128, BufferUsage::VERTEX);
    assert_ne!(again.id(), buffer.id());
}

#[test]
fn test_unregister_with_own_extra_reference() {
    let mut ctx = TestContext::new();
    let p2 = ctx.plugin("p2");
    let texture = ctx.texture(&p2, 16, 16);
    texture.add_ref().unwrap();
    assert_eq!(texture.ref_count(), 2);

    let report = ctx.engine.unregister_plugin(&p2).unwrap();
    assert!(!report.has_leaks);
    assert!(texture.is_disposed());
    assert_eq!(ctx.backend.stats().textures_destroyed, 1);

    assert!(ctx.engine.plugin(&p2).unwrap_err().is_validation());
    assert!(ctx.engine.unregister_plugin(&p2).unwrap_err().is_validation());
}

#[rstest]
#[case::force(DrainPolicy::Force, 0)]
#[case::respect_foreign(DrainPolicy::RespectForeignReferences, 1)]
fn test_shared_texture_teardown(#[case] policy: DrainPolicy, #[case] expected_leaks: usize) {
    let mut ctx = TestContext::with_policy(policy);
    let owner = ctx.plugin("owner");
    let borrower = ctx.plugin("borrower");
    let texture = ctx.texture(&owner, 32, 32);
    ctx.engine.plugin(&borrower).unwrap().retain(&texture).unwrap();

    let report = ctx.engine.unregister_plugin(&owner).unwrap();
    assert_eq!(report.total_leak_count, expected_leaks);
    assert_eq!(texture.is_disposed(), expected_leaks == 0);

    if expected_leaks > 0 {
        let leak = &report.leaks[0];
        assert_eq!(leak.resource_kind, ResourceKind::Texture);
        assert_eq!(leak.plugin_id, owner);
        assert_eq!(leak.holders, vec![(borrower.clone(), 1)]);
    }

    // The borrower's teardown always finishes the job.
    ctx.engine.unregister_plugin(&borrower).unwrap();
    assert!(texture.is_disposed());
    assert_eq!(ctx.backend.stats().textures_destroyed, 1);
}

#[test]
fn test_borrower_teardown_releases_its_references() {
    let mut ctx = TestContext::new();
    let owner = ctx.plugin("owner");
    let borrower = ctx.plugin("borrower");
    let buffer = ctx.buffer(&owner, 64, BufferUsage::UNIFORM);
    {
        let scope = ctx.engine.plugin(&borrower).unwrap();
        scope.retain(&buffer).unwrap();
        scope.retain(&buffer).unwrap();
    }
    assert_eq!(buffer.ref_count(), 3);

    let report = ctx.engine.invalidate_plugin(&borrower).unwrap();
    assert!(!report.has_leaks);
    assert_eq!(buffer.ref_count(), 1);
    assert_eq!(buffer.held_by(&borrower), 0);
    assert!(!buffer.is_disposed());
}

#[test]
fn test_teardown_removes_plugin_graphs() {
    let mut ctx = TestContext::new();
    let p = ctx.plugin("p");
    let pipeline = ctx.pipeline(&p, &vertex_only_pipeline());
    ctx.engine
        .plugin(&p)
        .unwrap()
        .register_graph(RenderGraph::new("p-main").with_node(draw_node("draw", pipeline)))
        .unwrap();
    assert!(ctx.engine.graphs().contains("p-main"));

    ctx.engine.invalidate_plugin(&p).unwrap();
    assert!(!ctx.engine.graphs().contains("p-main"));
}

#[test]
fn test_teardown_flushes_pending_commands() {
    let mut ctx = TestContext::new();
    ctx.add_surface();
    let p = ctx.plugin("p");
    let pipeline = ctx.pipeline(&p, &vertex_only_pipeline());
    ctx.engine
        .plugin(&p)
        .unwrap()
        .register_graph(RenderGraph::new("p-main").with_node(draw_node("draw", pipeline.clone())))
        .unwrap();

    ctx.engine
        .encode("frame", |enc| enc.execute_graph("p-main").map(|_| ()))
        .unwrap();
    assert_eq!(ctx.engine.pending_command_buffers(), 1);
    // The queued buffer holds the pipeline alive.
    assert_eq!(pipeline.held_by(&PluginId::host()), 1);

    let report = ctx.engine.invalidate_plugin(&p).unwrap();
    assert!(!report.has_leaks);
    assert_eq!(ctx.engine.pending_command_buffers(), 0);
    assert_eq!(ctx.backend.stats().command_buffers_submitted, 1);
    assert!(pipeline.is_disposed());
}

#[test]
fn test_aggregated_leak_report() {
    let mut ctx = TestContext::with_policy(DrainPolicy::RespectForeignReferences);
    let host = PluginId::host();
    let a = ctx.plugin("a");
    let b = ctx.plugin("b");
    let a_buffer = ctx.buffer(&a, 16, BufferUsage::UNIFORM);
    let b_texture = ctx.texture(&b, 2, 2);
    a_buffer.add_ref_for(&host).unwrap();
    b_texture.add_ref_for(&host).unwrap();

    ctx.engine.invalidate_plugin(&a).unwrap();
    ctx.engine.unregister_plugin(&b).unwrap();

    let all = ctx.engine.leak_report(None);
    assert_eq!(all.total_leak_count, 2);
    assert!(all.has_leaks);
    assert_eq!(ctx.engine.leak_report(Some(&b)).leaks[0].resource_id, b_texture.id());

    ctx.engine.hot_reload().clear_leak_reports(None);
    assert!(!ctx.engine.leak_report(None).has_leaks);
}

#[test]
fn test_dispose_force_unregisters_everything() {
    let mut ctx = TestContext::with_policy(DrainPolicy::RespectForeignReferences);
    let p = ctx.plugin("p");
    let texture = ctx.texture(&p, 8, 8);
    texture.add_ref_for(&PluginId::new("elsewhere")).unwrap();

    ctx.engine.dispose();
    assert!(texture.is_disposed());
    assert_eq!(ctx.engine.resources().live_count(), 0);
    assert!(matches!(
        ctx.engine.invalidate_plugin(&p),
        Err(GraphicsError::AlreadyDisposed(_))
    ));
}
