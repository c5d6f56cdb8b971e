use cbson::{deserialize, doc, serialize, Bson, CodecContext, DecodeOptions, Document, EncodeOptions, Regex};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn sample_document() -> Document {
    doc! {
        "_id" => 1,
        "name" => "Miku",
        "age" => 16i64,
        "active" => true,
        "score" => 99.5f64,
        "tags" => vec!["vocaloid", "crypton"],
        "address" => doc! { "street" => "123 Main St", "city" => "Sapporo" },
        "pattern" => Regex::new("^miku", "i"),
    }
}

fn bench_document_serialize(c: &mut Criterion) {
    let doc = sample_document();
    let options = EncodeOptions::default();

    c.bench_function("document_serialize", |b| {
        b.iter(|| serialize(black_box(&doc), &options))
    });
}

fn bench_document_serialize_checked(c: &mut Criterion) {
    let doc = sample_document();
    let options = EncodeOptions {
        check_keys: true,
        move_id: true,
        ..Default::default()
    };

    c.bench_function("document_serialize_checked", |b| {
        b.iter(|| serialize(black_box(&doc), &options))
    });
}

fn bench_document_deserialize(c: &mut Criterion) {
    let encoded = serialize(&sample_document(), &EncodeOptions::default()).unwrap();
    let compiled = DecodeOptions::default();
    let portable = DecodeOptions { compile_regex: false };

    c.bench_function("document_deserialize", |b| {
        b.iter(|| deserialize(black_box(&encoded), &compiled))
    });
    c.bench_function("document_deserialize_portable_regex", |b| {
        b.iter(|| deserialize(black_box(&encoded), &portable))
    });
}

fn bench_large_array(c: &mut Criterion) {
    let items: Vec<Bson> = (0..1000).map(Bson::from).collect();
    let doc = doc! { "items" => items };
    let options = EncodeOptions::default();

    c.bench_function("large_array_serialize", |b| {
        b.iter(|| serialize(black_box(&doc), &options))
    });
}

fn bench_object_id_generate(c: &mut Criterion) {
    let ctx = CodecContext::new();

    c.bench_function("object_id_generate", |b| {
        b.iter(|| ctx.generate_object_id(None))
    });
}

criterion_group!(
    benches,
    bench_document_serialize,
    bench_document_serialize_checked,
    bench_document_deserialize,
    bench_large_array,
    bench_object_id_generate
);
criterion_main!(benches);
