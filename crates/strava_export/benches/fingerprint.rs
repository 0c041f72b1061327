use std::sync::Arc;
use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};
use secrecy::SecretString;
use serde_json::{Value, json};
use strava_client::http_client::ReqwestStravaClient;
use strava_client::retry::RetryPolicy;
use strava_export::checksum::fingerprint;
use strava_export::{
    ActivityStore, Clock, Fetcher, Granularity, PassRequest, RateGovernor, RateLimitMode,
    SyncOrchestrator, SyncStrategy, SystemClock,
};
use tokio::runtime::Builder;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn detail_payload() -> Value {
    let splits: Vec<Value> = (0..40)
        .map(|i| {
            json!({
                "split": i + 1,
                "distance": 1000.0,
                "elapsed_time": 290 + i,
                "average_speed": 3.41,
                "average_heartrate": 151.0 + f64::from(i) / 10.0
            })
        })
        .collect();
    json!({
        "id": 13389554554i64,
        "name": "Long Run",
        "description": "40k with the last 10k at marathon pace",
        "start_date": "2025-01-18T06:00:00Z",
        "elapsed_time": 11_700,
        "distance": 40_000.0,
        "gear_id": "g42",
        "gear": {"id": "g42", "name": "Pegasus", "distance": 812_345.0},
        "splits_metric": splits
    })
}

fn bench_fingerprint(c: &mut Criterion) {
    let payload = detail_payload();
    c.bench_function("fingerprint_detail_payload", |b| {
        b.iter(|| fingerprint(std::hint::black_box(&payload)))
    });
}

fn bench_summary_pass(c: &mut Criterion) {
    let rt = Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime");

    let server = rt.block_on(async {
        let server = MockServer::start().await;
        let page: Vec<Value> = (1..=150)
            .map(|i| {
                json!({
                    "id": i,
                    "name": format!("Run {i}"),
                    "sport_type": "Run",
                    "start_date": format!("2024-06-01T{:02}:{:02}:00Z", i / 60, i % 60),
                    "elapsed_time": 1800,
                    "distance": 5000.0
                })
            })
            .collect();
        Mock::given(method("GET"))
            .and(path("/athlete/activities"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page))
            .mount(&server)
            .await;
        server
    });

    c.bench_function("summary_pass_150_records", |b| {
        b.to_async(&rt).iter(|| {
            let uri = server.uri();
            async move {
                let client = ReqwestStravaClient::new(&uri, SecretString::new("tok".into()))
                    .expect("client");
                let clock: Arc<dyn Clock> = Arc::new(SystemClock);
                let fetcher = Fetcher::new(
                    Arc::new(client),
                    clock.clone(),
                    RateGovernor::new(u32::MAX, clock.now()),
                    RetryPolicy::new(0, Duration::ZERO),
                    RateLimitMode::Stop,
                );
                let store = ActivityStore::open_in_memory().expect("store");
                // A page shorter than the page size ends the walk after one call.
                let mut orch = SyncOrchestrator::new(fetcher, store, 200);
                orch.run(&PassRequest {
                    granularity: Granularity::Summary,
                    strategy: SyncStrategy::OverwriteIfChanged,
                    after: None,
                    before: None,
                })
                .await
                .expect("pass")
            }
        })
    });
}

criterion_group!(benches, bench_fingerprint, bench_summary_pass);
criterion_main!(benches);
