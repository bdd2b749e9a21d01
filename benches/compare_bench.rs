use criterion::{black_box, criterion_group, criterion_main, Criterion};

use render_compare_core::blocklist::wildcard_match;
use render_compare_core::compare::{classify_impact, diff};
use render_compare_core::document::{RenderedDocument, Section};

fn sample_document(variant: u8) -> RenderedDocument {
    let sections: Vec<Section> = (0..20)
        .map(|i| Section {
            section_id: format!("s{i}"),
            heading_level: 2,
            heading_text: format!("Heading {i}"),
            body_markdown: format!("Body text for section {i}, variant {variant}."),
            detection_method: "semantic".to_string(),
        })
        .collect();

    RenderedDocument {
        title: format!("Title variant {variant}"),
        word_count: 2000 + variant as usize * 10,
        sections,
        ..Default::default()
    }
}

fn bench_compare(c: &mut Criterion) {
    let a = sample_document(0);
    let b = sample_document(1);

    c.bench_function("diff_two_documents", |bencher| {
        bencher.iter(|| {
            let d = diff(black_box(&a), black_box(&b));
            black_box(d);
        });
    });

    c.bench_function("classify_impact", |bencher| {
        bencher.iter(|| {
            let d = diff(black_box(&a), black_box(&b));
            let impact = classify_impact(black_box(&a), black_box(&b), &d);
            black_box(impact);
        });
    });
}

fn bench_wildcard_match(c: &mut Criterion) {
    let pattern = "*googletagmanager.com*";
    let text = "https://www.googletagmanager.com/gtag/js?id=GT-XXXX";

    c.bench_function("wildcard_match", |bencher| {
        bencher.iter(|| {
            black_box(wildcard_match(black_box(pattern), black_box(text)));
        });
    });
}

criterion_group!(benches, bench_compare, bench_wildcard_match);
criterion_main!(benches);
