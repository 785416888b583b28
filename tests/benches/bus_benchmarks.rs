//! # Applet Bus Benchmarks
//!
//! | Path | Measures |
//! |------|----------|
//! | serializer | pack / unpack of a registered payload, inline and overflowed |
//! | contract | permission lookups on the calculator contract |
//! | fan-out | request to first reply over the in-memory transport |

use applet_bus::{
    BlobStore, BusConfig, DtoSerializer, FanOutRequest, InMemoryBlobStore, InMemoryMessageBroker,
};
use applet_tests::calculator::{
    calc_reply_intent, calc_request_intent, calculator_contract, calculator_serializer, client_id,
    server_id, spawn_calculator, CalcOperation, CalcRequest, CalcResponse,
};
use applet_bus::Payload;
use applet_types::AppContract;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

fn random_request() -> CalcRequest {
    let mut rng = rand::thread_rng();
    CalcRequest::new(rng.gen_range(-1e6..1e6), rng.gen_range(1.0..1e6), CalcOperation::Divide)
}

// ============================================================================
// SERIALIZER
// ============================================================================

fn bench_serializer(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("serializer");

    let inline = calculator_serializer().unwrap();
    let store: Arc<dyn BlobStore> = Arc::new(InMemoryBlobStore::new());
    let overflowing = DtoSerializer::builder()
        .register::<CalcRequest>()
        .register::<CalcResponse>()
        .with_blob_store(store)
        .with_max_message_body_bytes(8)
        .build()
        .unwrap();

    for (name, serializer) in [("inline", &inline), ("overflow", &overflowing)] {
        let request = random_request();
        group.bench_function(BenchmarkId::new("pack", name), |b| {
            b.iter(|| rt.block_on(serializer.pack(black_box(&request))).unwrap())
        });

        let package = rt.block_on(serializer.pack(&request)).unwrap();
        group.bench_function(BenchmarkId::new("unpack", name), |b| {
            b.iter(|| {
                rt.block_on(serializer.unpack_as::<CalcRequest>(black_box(&package)))
                    .unwrap()
            })
        });
    }
    group.finish();
}

// ============================================================================
// CONTRACT
// ============================================================================

fn bench_contract(c: &mut Criterion) {
    let contract = calculator_contract().unwrap();
    let (client, server) = (client_id(), server_id());
    let (request, reply) = (calc_request_intent(), calc_reply_intent());

    let mut group = c.benchmark_group("contract");
    group.throughput(Throughput::Elements(4));
    group.bench_function("permission_checks", |b| {
        b.iter(|| {
            black_box(contract.is_valid_request(&client, &request, CalcRequest::PAYLOAD_TYPE))
                && black_box(contract.is_valid_response(&client, &reply, CalcResponse::PAYLOAD_TYPE))
                && black_box(contract.is_valid_subscription(&server, &request, CalcRequest::PAYLOAD_TYPE))
                && black_box(contract.is_valid_event(&server, &reply, CalcResponse::PAYLOAD_TYPE))
        })
    });
    group.finish();
}

// ============================================================================
// FAN-OUT
// ============================================================================

fn bench_fan_out(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let cancel = CancellationToken::new();

    let mut group = c.benchmark_group("fan-out");
    group.measurement_time(Duration::from_secs(10));

    for servers in [1usize, 4, 16] {
        let (broker, client) = rt.block_on(async {
            let contract: Arc<dyn AppContract> = Arc::new(calculator_contract().unwrap());
            let broker = InMemoryMessageBroker::new(
                contract,
                Arc::new(calculator_serializer().unwrap()),
                BusConfig::default().without_heartbeat(),
            )
            .unwrap();
            for _ in 0..servers {
                spawn_calculator(broker.create_channel(&server_id()).unwrap(), cancel.clone());
            }
            let client = broker.create_channel(&client_id()).unwrap();
            (broker, client)
        });

        group.bench_with_input(BenchmarkId::new("first_in_wins", servers), &servers, |b, _| {
            b.iter(|| {
                rt.block_on(random_request().aggregate(&client, &cancel))
                    .unwrap()
            })
        });
        drop(client);
        broker.transport().shutdown();
    }
    group.finish();
    cancel.cancel();
}

criterion_group!(benches, bench_serializer, bench_contract, bench_fan_out);
criterion_main!(benches);
