//! Benchmarks for variable interpolation and test script evaluation.
//!
//! These run on every send, so they bound how quickly a collection can be
//! replayed.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rest_workbench::models::{BodyType, HeaderMap, HttpMethod, ProcessedResponse, RequestDefinition};
use rest_workbench::scripts::run_test_script;
use rest_workbench::variables::{interpolate, resolve_request, VariableScope, VariableStore};
use serde_json::json;

/// Generate a store with a specified number of global variables.
fn generate_store(num_vars: usize) -> VariableStore {
    let mut store = VariableStore::new();
    store.set_active_environment(Some("bench".to_string()));

    for i in 0..num_vars {
        let _ = store.set(VariableScope::Global, format!("var_{}", i), format!("value_{}", i), "");
    }

    let _ = store.set(VariableScope::Environment, "baseUrl", "https://api.example.com", "");
    let _ = store.set(VariableScope::Environment, "authToken", "bearer_token_12345", "");
    let _ = store.set(VariableScope::Environment, "userId", "user_123", "");
    store
}

/// Generate a template with a specified number of variable references.
fn generate_template(num_refs: usize) -> String {
    let mut template = String::from("{{baseUrl}}/api/v1/users/{{userId}}?");
    for i in 0..num_refs {
        template.push_str(&format!("p{}={{{{var_{}}}}}&", i, i % 100));
    }
    template
}

fn bench_interpolate_simple(c: &mut Criterion) {
    let store = generate_store(10);
    let template = "{{baseUrl}}/users/{{userId}}?token={{authToken}}";

    c.bench_function("interpolate_simple", |b| {
        b.iter(|| interpolate(black_box(template), black_box(&store)))
    });
}

fn bench_interpolate_large_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("interpolate_large_store");

    for store_size in [10, 100, 1000].iter() {
        let store = generate_store(*store_size);
        let template = generate_template(10);

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_vars", store_size)),
            store_size,
            |b, _| b.iter(|| interpolate(black_box(&template), black_box(&store))),
        );
    }

    group.finish();
}

fn bench_interpolate_many_refs(c: &mut Criterion) {
    let mut group = c.benchmark_group("interpolate_many_refs");
    let store = generate_store(100);

    for num_refs in [10, 100, 500].iter() {
        let template = generate_template(*num_refs);

        group.throughput(Throughput::Elements(*num_refs as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_refs", num_refs)),
            num_refs,
            |b, _| b.iter(|| interpolate(black_box(&template), black_box(&store))),
        );
    }

    group.finish();
}

fn bench_interpolate_no_markers(c: &mut Criterion) {
    let store = generate_store(10);
    let template = "https://api.example.com/users/123?include=posts&sort=desc";

    c.bench_function("interpolate_no_markers", |b| {
        b.iter(|| interpolate(black_box(template), black_box(&store)))
    });
}

/// Benchmark resolving a whole request with a JSON body.
fn bench_resolve_request(c: &mut Criterion) {
    let store = generate_store(50);

    let mut body = String::from("{");
    for i in 0..100 {
        body.push_str(&format!("\"field_{}\": \"{{{{var_{}}}}}\",", i, i % 50));
    }
    body.push_str("\"end\": true}");

    let mut request = RequestDefinition::new("bench", HttpMethod::POST, "{{baseUrl}}/data");
    request.add_header("Authorization", "Bearer {{authToken}}");
    request.params.insert("user".to_string(), "{{userId}}".to_string());
    request.set_body(body, BodyType::Json);

    c.bench_function("resolve_request_json_body", |b| {
        b.iter(|| resolve_request(black_box(&request), black_box(&store)))
    });
}

fn response() -> ProcessedResponse {
    let body = json!({
        "items": (0..50).map(|i| json!({"id": i, "name": format!("item {}", i)})).collect::<Vec<_>>(),
        "total": 50
    });
    let mut headers = HeaderMap::new();
    headers.append("Content-Type", "application/json");
    ProcessedResponse {
        status: 200,
        status_text: "OK".to_string(),
        headers,
        body_text: body.to_string(),
        body,
        duration: 12,
        size: 0,
    }
}

/// Benchmark both test script flavours against the same response.
fn bench_test_scripts(c: &mut Criterion) {
    let response = response();
    let mut group = c.benchmark_group("test_scripts");

    let commands = "status 200\njsonHasProperty items\njsonArrayLengthEquals items 50\njsonValueEquals total 50";
    group.bench_function("line_commands", |b| {
        b.iter(|| {
            let mut store = VariableStore::new();
            run_test_script(black_box(commands), black_box(&response), &mut store)
        })
    });

    let sandbox = r#"
        const body = pm.response.json();
        pm.test("status", () => pm.response.to.have.status(200));
        pm.test("items", () => {
            pm.expect(body.items).to.have.lengthOf(50);
            const names = body.items.filter(item => item.id % 2 === 0).map(item => item.name);
            pm.expect(names.length).to.equal(25);
        });
    "#;
    group.bench_function("pm_sandbox", |b| {
        b.iter(|| {
            let mut store = VariableStore::new();
            run_test_script(black_box(sandbox), black_box(&response), &mut store)
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_interpolate_simple,
    bench_interpolate_large_store,
    bench_interpolate_many_refs,
    bench_interpolate_no_markers,
    bench_resolve_request,
    bench_test_scripts,
);

criterion_main!(benches);
