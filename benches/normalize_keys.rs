/// Benchmarks for response key normalization, which runs on every successful body before it is
/// mapped onto typed records.
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use propheseer_client_sdk::serde_helpers::{normalize_keys, to_snake_case};
use propheseer_client_sdk::types::response::Market;
use serde_json::{Value, json};

fn market(index: usize) -> Value {
    json!({
        "id": format!("pm_{index}"),
        "source": "polymarket",
        "sourceId": format!("0x{index:040x}"),
        "question": "Will the Fed cut rates in March?",
        "description": "Resolves YES if the FOMC lowers the target range at the March meeting.",
        "category": "finance",
        "status": "open",
        "outcomes": [
            {"name": "Yes", "probability": 0.34, "volume24h": 125_000.5},
            {"name": "No", "probability": 0.66, "volume24h": 98_000}
        ],
        "resolutionDate": "2025-03-19T18:00:00Z",
        "createdAt": "2024-12-01T00:00:00Z",
        "updatedAt": "2025-01-15T08:30:00Z",
        "url": "https://polymarket.com/event/fed-march",
        "imageUrl": "https://polymarket.com/images/fed.png",
        "tags": ["fed", "rates", "economy"]
    })
}

fn market_page(size: usize) -> Value {
    json!({
        "data": (0..size).map(market).collect::<Vec<_>>(),
        "meta": {"total": size * 4, "limit": size, "offset": 0, "sources": {"polymarket": size}}
    })
}

fn bench_to_snake_case(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize/to_snake_case");

    for key in ["id", "sourceId", "volume24h", "HTTPResponseCode", "x_already_snake"] {
        group.bench_with_input(BenchmarkId::from_parameter(key), key, |b, key| {
            b.iter(|| to_snake_case(std::hint::black_box(key)));
        });
    }

    group.finish();
}

fn bench_market_page(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize/market_page");

    for size in [1_usize, 50, 200] {
        let page = market_page(size);
        let bytes = serde_json::to_vec(&page).expect("Serialization should succeed");
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(BenchmarkId::new("normalize_keys", size), &page, |b, page| {
            b.iter(|| normalize_keys(std::hint::black_box(page.clone())));
        });

        group.bench_with_input(BenchmarkId::new("parse_and_map", size), &bytes, |b, bytes| {
            b.iter(|| {
                let raw: Value = serde_json::from_slice(std::hint::black_box(bytes))
                    .expect("Deserialization should succeed");
                let mut body = normalize_keys(raw);
                let data = body.get_mut("data").map(Value::take).unwrap_or_default();
                let _: Vec<Market> =
                    serde_json::from_value(data).expect("Deserialization should succeed");
            });
        });
    }

    group.finish();
}

criterion_group!(normalize_benches, bench_to_snake_case, bench_market_page);
criterion_main!(normalize_benches);
