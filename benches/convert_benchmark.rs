//! Benchmarks for mdocx conversion performance.
//!
//! Run with: cargo bench
//!
//! These benchmarks use synthetic Markdown of increasing size.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mdocx::{DocxReader, DocxWriter, MarkdownParser, RenderOptions};

/// Creates a synthetic Markdown document with the given number of sections.
fn create_test_markdown(sections: usize) -> String {
    let mut text = String::from("# Benchmark document\n\n");
    for i in 0..sections {
        text.push_str(&format!("## Section {}\n\n", i + 1));
        text.push_str("Some **bold** text, some *italic* text and a [link](https://example.com).\n\n");
        text.push_str("- first point\n  - nested point\n1. step one\n2. step two\n\n");
        text.push_str("| Name | Value |\n| --- | --- |\n| alpha | 1 |\n| beta | 2 |\n\n");
        text.push_str("```rust\nfn main() {\n    println!(\"hi\");\n}\n```\n\n");
    }
    text
}

/// Benchmark format detection.
fn bench_format_detection(c: &mut Criterion) {
    let markdown = create_test_markdown(1);
    let docx = DocxWriter::default()
        .build(&MarkdownParser::default().parse(&markdown).document)
        .unwrap()
        .bytes;

    c.bench_function("detect_markdown", |b| {
        b.iter(|| mdocx::detect_format_from_bytes(black_box(markdown.as_bytes())).unwrap());
    });

    c.bench_function("detect_docx", |b| {
        b.iter(|| mdocx::detect_format_from_bytes(black_box(&docx)).unwrap());
    });
}

/// Benchmark Markdown parsing and rendering at various sizes.
fn bench_markdown(c: &mut Criterion) {
    let mut group = c.benchmark_group("markdown");

    for sections in [1, 10, 100].iter() {
        let text = create_test_markdown(*sections);
        let doc = MarkdownParser::default().parse(&text).document;

        group.bench_function(format!("parse_{}_sections", sections), |b| {
            b.iter(|| MarkdownParser::default().parse(black_box(&text)));
        });
        group.bench_function(format!("render_{}_sections", sections), |b| {
            b.iter(|| mdocx::render::to_markdown(black_box(&doc), &RenderOptions::default()));
        });
    }

    group.finish();
}

/// Benchmark Word package writing and reading.
fn bench_docx(c: &mut Criterion) {
    let mut group = c.benchmark_group("docx");

    for sections in [1, 10, 100].iter() {
        let doc = MarkdownParser::default()
            .parse(&create_test_markdown(*sections))
            .document;
        let bytes = DocxWriter::default().build(&doc).unwrap().bytes;

        group.bench_function(format!("write_{}_sections", sections), |b| {
            b.iter(|| DocxWriter::default().build(black_box(&doc)).unwrap());
        });
        group.bench_function(format!("read_{}_sections", sections), |b| {
            b.iter(|| DocxReader::default().read_bytes(black_box(&bytes)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_format_detection, bench_markdown, bench_docx);
criterion_main!(benches);
