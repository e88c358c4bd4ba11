use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use plugin_gpu_host::{
    BufferDescriptor, BufferUsage, ColorAttachment, CommandEncoder, DrainPolicy, DummyBackend,
    FrameTime, HeadlessSurface, PassDescriptor, PluginId, RenderGraph, RenderGraphExecutor,
    RenderGraphNode, ResourceManager, TextureFormat,
};

fn noop_node(id: String) -> RenderGraphNode {
    RenderGraphNode::from_fn(id, PassDescriptor::new().with_color(ColorAttachment::screen()), |_, _| {
        Ok(())
    })
}

fn chain_graph(len: usize) -> RenderGraph {
    let mut graph = RenderGraph::new("chain");
    // Inserted back to front so the sort has work to do.
    for i in (0..len).rev() {
        let mut node = noop_node(format!("pass_{i}"));
        if i > 0 {
            node = node.with_dependency(format!("pass_{}", i - 1));
        }
        graph.add_node(node);
    }
    graph
}

fn diamond_graph(width: usize) -> RenderGraph {
    let mut graph = RenderGraph::new("diamond").with_node(noop_node("source".into()));
    for i in 0..width {
        graph.add_node(noop_node(format!("branch_{i}")).with_dependency("source"));
    }
    graph.with_node(
        noop_node("sink".into()).with_dependencies((0..width).map(|i| format!("branch_{i}"))),
    )
}

// ---------------------------------------------------------------------------
// Render graph sorting
// ---------------------------------------------------------------------------

fn bench_sort_chain(c: &mut Criterion) {
    let graph = chain_graph(32);
    c.bench_function("render_graph_sort_32_chain", |b| {
        b.iter(|| black_box(graph.sorted_indices().unwrap()));
    });
}

fn bench_sort_diamond(c: &mut Criterion) {
    let graph = diamond_graph(64);
    c.bench_function("render_graph_sort_64_diamond", |b| {
        b.iter(|| black_box(graph.sorted_indices().unwrap()));
    });
}

fn bench_register_graph(c: &mut Criterion) {
    c.bench_function("render_graph_register_32_chain", |b| {
        b.iter_with_setup(
            || (RenderGraphExecutor::new(), chain_graph(32)),
            |(mut executor, graph)| {
                executor.register_graph(graph, None).unwrap();
                black_box(executor);
            },
        );
    });
}

fn bench_execute_graph(c: &mut Criterion) {
    let mut executor = RenderGraphExecutor::new();
    executor.register_graph(chain_graph(16), None).unwrap();
    let mut surface = HeadlessSurface::new("bench", 256, 256, TextureFormat::Bgra8Unorm).unwrap();

    c.bench_function("render_graph_execute_16_passes", |b| {
        b.iter(|| {
            let mut encoder = CommandEncoder::new(Some("bench"));
            executor
                .execute("chain", &mut encoder, Some(&mut surface), FrameTime::default())
                .unwrap();
            black_box(encoder.finish());
        });
    });
}

// ---------------------------------------------------------------------------
// Resource churn
// ---------------------------------------------------------------------------

fn bench_buffer_churn(c: &mut Criterion) {
    let manager = ResourceManager::new(Arc::new(DummyBackend::new()), DrainPolicy::Force);
    let plugin = PluginId::new("bench");
    let descriptor = BufferDescriptor::new(256, BufferUsage::UNIFORM);

    c.bench_function("buffer_create_release", |b| {
        b.iter(|| {
            let buffer = manager.create_buffer(&plugin, &descriptor).unwrap();
            black_box(buffer.release());
        });
    });
}

fn bench_refcount(c: &mut Criterion) {
    let manager = ResourceManager::new(Arc::new(DummyBackend::new()), DrainPolicy::Force);
    let plugin = PluginId::new("bench");
    let buffer = manager
        .create_buffer(&plugin, &BufferDescriptor::new(256, BufferUsage::UNIFORM))
        .unwrap();
    let viewer = PluginId::new("viewer");

    c.bench_function("handle_guard_acquire_drop", |b| {
        b.iter(|| black_box(buffer.guard_for(&viewer).unwrap()));
    });
}

fn bench_plugin_drain(c: &mut Criterion) {
    c.bench_function("release_plugin_resources_100_buffers", |b| {
        b.iter_with_setup(
            || {
                let manager =
                    ResourceManager::new(Arc::new(DummyBackend::new()), DrainPolicy::Force);
                let plugin = PluginId::new("bench");
                let descriptor = BufferDescriptor::new(64, BufferUsage::VERTEX);
                for _ in 0..100 {
                    manager.create_buffer(&plugin, &descriptor).unwrap();
                }
                (manager, plugin)
            },
            |(manager, plugin)| black_box(manager.release_plugin_resources(&plugin)),
        );
    });
}

criterion_group!(
    graph_benches,
    bench_sort_chain,
    bench_sort_diamond,
    bench_register_graph,
    bench_execute_graph
);
criterion_group!(resource_benches, bench_buffer_churn, bench_refcount, bench_plugin_drain);
criterion_main!(graph_benches, resource_benches);
