use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use palabre::core::extract::extract_text;
use palabre::core::turn::word_groups;
use serde_json::{json, Value};

fn reply_shapes(text: &str) -> Vec<(&'static str, Value)> {
    vec![
        ("bare_string", json!(text)),
        ("text_field", json!({ "text": text })),
        (
            "message_content",
            json!({ "message": { "content": [{ "type": "text", "text": text }] } }),
        ),
        ("content_blocks", json!({ "content": [{ "text": text }] })),
        (
            "choices_message",
            json!({ "choices": [{ "message": { "content": text } }] }),
        ),
        ("choices_text", json!({ "choices": [{ "text": text }] })),
    ]
}

fn make_reply_text(sentences: usize) -> String {
    "The quick brown fox jumps over the lazy dog near the riverbank at dawn. "
        .repeat(sentences)
        .trim_end()
        .to_string()
}

fn bench_extract_text(c: &mut Criterion) {
    let text = make_reply_text(20);

    let mut group = c.benchmark_group("extract_text");
    group.throughput(Throughput::Bytes(text.len() as u64));
    for (name, value) in reply_shapes(&text) {
        group.bench_function(name, |b| b.iter(|| extract_text(&value)));
    }
    group.finish();
}

fn bench_word_groups(c: &mut Criterion) {
    for &sentences in &[5usize, 80usize] {
        let text = make_reply_text(sentences);

        let mut group = c.benchmark_group(format!("word_groups_sentences{}", sentences));
        group.throughput(Throughput::Bytes(text.len() as u64));
        for &width in &[1usize, 3usize, 8usize] {
            group.bench_function(BenchmarkId::new("width", width), |b| {
                b.iter(|| word_groups(&text, width))
            });
        }
        group.finish();
    }
}

criterion_group!(benches, bench_extract_text, bench_word_groups);
criterion_main!(benches);
