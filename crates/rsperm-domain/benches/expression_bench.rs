//! Performance benchmarks for permission expressions.
//!
//! Run with: cargo bench -p rsperm-domain --bench expression_bench
//!
//! These benchmarks measure:
//! - Rule parsing (cold) versus cached compilation
//! - Building and evaluating any-field expressions as field count grows
//! - Result cache reuse across repeated decisions in one request

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use rsperm_domain::check::Role;
use rsperm_domain::model::parse_rule;
use rsperm_domain::{
    EntityBinding, EntityDictionary, ExpressionResultCache, PermissionCategory,
    PermissionExpressionBuilder, Resource, RuleCompiler, User,
};

const RULE: &str = "is admin OR (is editor AND NOT is suspended) OR user has all access";

fn dictionary(fields: usize) -> EntityDictionary {
    let mut binding = EntityBinding::new("document").permission(PermissionCategory::Read, RULE);
    for i in 0..fields {
        binding = binding.field_permission(
            format!("field{i:04}"),
            PermissionCategory::Read,
            "is editor AND NOT is suspended",
        );
    }

    EntityDictionary::new()
        .with_check("is admin", Role::has("admin"))
        .with_check("is editor", Role::has("editor"))
        .with_check("is suspended", Role::has("suspended"))
        .with_check("user has all access", Role::all())
        .bind_entity(binding)
}

fn builder(dictionary: &Arc<EntityDictionary>, compiler: &Arc<RuleCompiler>) -> PermissionExpressionBuilder {
    PermissionExpressionBuilder::new(
        Arc::new(ExpressionResultCache::default()),
        Arc::clone(dictionary) as Arc<dyn rsperm_domain::PermissionDictionary>,
    )
    .with_compiler(Arc::clone(compiler))
    .with_user(User::named("bench").with_role("viewer"))
}

/// Benchmark rule parsing without and with the compiler cache.
fn bench_rule_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("rule_parsing");
    group.throughput(Throughput::Elements(1));

    group.bench_function("parse_uncached", |b| {
        b.iter(|| black_box(parse_rule(black_box(RULE))))
    });

    let compiler = RuleCompiler::new();
    group.bench_function("parse_cached", |b| {
        b.iter(|| black_box(compiler.parse(black_box(RULE))))
    });

    group.finish();
}

/// Benchmark build + evaluate of any-field expressions by field count.
fn bench_any_field_scalability(c: &mut Criterion) {
    let mut group = c.benchmark_group("any_field_build_and_evaluate");

    for field_count in [0usize, 10, 100] {
        let dictionary = Arc::new(dictionary(field_count));
        let compiler = Arc::new(RuleCompiler::new());
        let resource = Resource::with_id("document", "doc1");

        group.bench_with_input(
            BenchmarkId::from_parameter(field_count),
            &field_count,
            |b, _| {
                b.iter(|| {
                    // Fresh request each iteration so no result is reused.
                    let builder = builder(&dictionary, &compiler);
                    let expressions = builder
                        .build_any_field_expressions(&resource, &PermissionCategory::Read, None)
                        .map(|expressions| expressions.commit_expression().evaluate());
                    black_box(expressions)
                })
            },
        );
    }

    group.finish();
}

/// Benchmark repeated decisions sharing one request cache.
fn bench_shared_request_cache(c: &mut Criterion) {
    let dictionary = Arc::new(dictionary(10));
    let compiler = Arc::new(RuleCompiler::new());
    let builder = builder(&dictionary, &compiler);
    let resource = Resource::with_id("document", "doc1");

    let mut group = c.benchmark_group("shared_request_cache");
    group.throughput(Throughput::Elements(1));

    group.bench_function("repeat_decision", |b| {
        b.iter(|| {
            let expressions = builder
                .build_any_field_expressions(&resource, &PermissionCategory::Read, None)
                .map(|expressions| expressions.commit_expression().evaluate());
            black_box(expressions)
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_rule_parsing,
    bench_any_field_scalability,
    bench_shared_request_cache,
);
criterion_main!(benches);
