//! Message codec benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use taxii_protocol::{
    serialize, validate_and_parse, ContentBinding, ContentBlock, InboxMessage, Message,
    ProtocolMessage, ProtocolVersion,
};

fn inbox_message(blocks: usize) -> Message {
    let binding = ContentBinding::new("urn:stix.mitre.org:xml:1.1.1");
    Message::InboxMessage(InboxMessage {
        message_id: "bench-1".to_string(),
        message: None,
        destination_collection_names: Vec::new(),
        record_count: None,
        content_blocks: (0..blocks)
            .map(|i| {
                ContentBlock::new(
                    binding.clone(),
                    format!("<stix:STIX_Package id=\"example:package-{i}\"/>"),
                )
            })
            .collect(),
    })
}

fn bench_serialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialize");

    for blocks in [1, 10, 100] {
        for version in ProtocolVersion::ALL {
            let message = ProtocolMessage::new(version, inbox_message(blocks));
            group.bench_with_input(
                BenchmarkId::new(version.as_str(), blocks),
                &message,
                |b, message| {
                    b.iter(|| black_box(serialize(message).unwrap()));
                },
            );
        }
    }

    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate_and_parse");

    for blocks in [1, 10, 100] {
        for version in ProtocolVersion::ALL {
            let encoded = serialize(&ProtocolMessage::new(version, inbox_message(blocks))).unwrap();
            group.throughput(Throughput::Bytes(encoded.len() as u64));

            for validate in [true, false] {
                let name = if validate { "validated" } else { "unvalidated" };
                group.bench_with_input(
                    BenchmarkId::new(format!("{}/{}", version.as_str(), name), blocks),
                    &encoded,
                    |b, encoded| {
                        b.iter(|| black_box(validate_and_parse(version, encoded, validate).unwrap()));
                    },
                );
            }
        }
    }

    group.finish();
}

criterion_group!(benches, bench_serialize, bench_parse);
criterion_main!(benches);
