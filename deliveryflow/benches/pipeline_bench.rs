//! Benchmarks for pipeline assembly and variable resolution.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use deliveryflow::pipeline::{invoke_input, StageGraphAssembler, VariableStore};
use deliveryflow::testing::sample_config;
use std::collections::BTreeMap;

fn assembly_benchmark(c: &mut Criterion) {
    let config = sample_config();
    c.bench_function("assemble_release_pipeline", |b| {
        b.iter(|| StageGraphAssembler::assemble(black_box(&config)))
    });
}

fn resolve_benchmark(c: &mut Criterion) {
    let config = sample_config();
    let input = invoke_input(&config);
    let store = VariableStore::new();
    let outputs: BTreeMap<String, String> = [
        (config.stream_output_name.clone(), "kinesis-input-stream".to_string()),
        (config.bucket_output_name.clone(), "firehose-output-bucket".to_string()),
    ]
    .into_iter()
    .collect();
    store.publish(&config.application_namespace, &outputs);

    c.bench_function("resolve_invoke_input", |b| {
        b.iter(|| store.resolve(black_box(&input)))
    });
}

criterion_group!(benches, assembly_benchmark, resolve_benchmark);
criterion_main!(benches);
