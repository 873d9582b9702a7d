use chrono::Utc;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use epigraph::community::LabelPropagation;
use epigraph::nodes::entity::EntityNode;
use epigraph::repo::EdgeRef;

/// A ring of `cliques` cliques of `size` nodes, adjacent cliques joined by a
/// single bridge edge. Bridges keep the cliques as separate communities, so
/// the detector has real work at every scale.
fn ring_of_cliques(cliques: usize, size: usize) -> (Vec<EntityNode>, Vec<EdgeRef>) {
    let now = Utc::now();
    let mut nodes = Vec::with_capacity(cliques * size);
    let mut edges = Vec::new();

    for c in 0..cliques {
        for i in 0..size {
            let uuid = format!("n-{c}-{i}");
            nodes.push(EntityNode::new(uuid, format!("node {c}/{i}"), "bench", now));
        }
        for i in 0..size {
            for j in (i + 1)..size {
                edges.push(EdgeRef {
                    uuid: format!("e-{c}-{i}-{j}"),
                    source_node_uuid: format!("n-{c}-{i}"),
                    target_node_uuid: format!("n-{c}-{j}"),
                    name: "RELATES".to_string(),
                    fact: String::new(),
                });
            }
        }
    }

    for c in 0..cliques {
        let next = (c + 1) % cliques;
        edges.push(EdgeRef {
            uuid: format!("bridge-{c}"),
            source_node_uuid: format!("n-{c}-0"),
            target_node_uuid: format!("n-{next}-1"),
            name: "RELATES".to_string(),
            fact: String::new(),
        });
    }

    (nodes, edges)
}

fn community_benchmarks(c: &mut Criterion) {
    let detector = LabelPropagation::default();
    let mut group = c.benchmark_group("label_propagation");

    for cliques in [10, 50, 200] {
        let (nodes, edges) = ring_of_cliques(cliques, 5);
        group.bench_with_input(
            BenchmarkId::from_parameter(nodes.len()),
            &(nodes, edges),
            |b, (nodes, edges)| b.iter(|| detector.detect(nodes, edges)),
        );
    }

    group.finish();
}

criterion_group!(benches, community_benchmarks);
criterion_main!(benches);
