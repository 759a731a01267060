use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use gleaner_core::{AdaptiveParser, ArticleRecord, Document, FieldKind, discover};

fn bench_parse(c: &mut Criterion) {
    let small = std::fs::read_to_string("../../tests/fixtures/ledger_a.html").unwrap();
    let medium = std::fs::read_to_string("../../tests/fixtures/landmark_article.html").unwrap();

    let mut group = c.benchmark_group("parse");

    group.bench_with_input(BenchmarkId::new("small", "ledger"), &small, |b, html| {
        b.iter(|| Document::parse(black_box(html)))
    });

    group.bench_with_input(BenchmarkId::new("medium", "landmark"), &medium, |b, html| {
        b.iter(|| Document::parse(black_box(html)))
    });

    group.finish();
}

fn bench_discovery(c: &mut Criterion) {
    let html = std::fs::read_to_string("../../tests/fixtures/landmark_article.html").unwrap();
    let doc = Document::parse(&html).unwrap();

    let mut group = c.benchmark_group("discovery");
    for kind in FieldKind::ALL {
        group.bench_with_input(BenchmarkId::from_parameter(kind), &kind, |b, kind| {
            b.iter(|| discover(black_box(&doc), *kind))
        });
    }
    group.finish();
}

fn bench_structural_parse(c: &mut Criterion) {
    let html = std::fs::read_to_string("../../tests/fixtures/landmark_article.html").unwrap();
    let url = "https://valleyledger.example/metro/transit";

    c.bench_function("structural_parse_cold", |b| {
        b.iter(|| AdaptiveParser::new().parse::<ArticleRecord>(black_box(&html), url))
    });

    let warm = AdaptiveParser::new();
    warm.parse::<ArticleRecord>(&html, url);
    c.bench_function("structural_parse_cached", |b| {
        b.iter(|| warm.parse::<ArticleRecord>(black_box(&html), url))
    });
}

criterion_group!(benches, bench_parse, bench_discovery, bench_structural_parse);
criterion_main!(benches);
