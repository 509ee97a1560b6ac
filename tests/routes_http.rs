mod common;

use std::sync::Arc;

use actix_web::{test, web, App};
use serde_json::{json, Value};

use common::{config_with_critical, job, MemoryBackend};
use qdeck::routes::{manager_routes, ManagerContext};
use qdeck::store::{now_epoch, JobSet, QueueBackend};

fn context(backend: &Arc<MemoryBackend>) -> web::Data<ManagerContext> {
    let config = config_with_critical(&["mailers"]);
    web::Data::new(ManagerContext::new(
        config,
        backend.clone() as Arc<dyn QueueBackend>,
    ))
}

#[actix_web::test]
async fn metrics_endpoint_wraps_snapshot_in_envelope() {
    let backend = MemoryBackend::new();
    backend.add_queue("default", vec![job("j1", "Worker", "default")]);

    let app = test::init_service(
        App::new()
            .app_data(context(&backend))
            .configure(manager_routes),
    )
    .await;

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["success"], json!(true));
    assert!(body["data"]["global_stats"]["enqueued"].is_number());
    assert!(body["data"]["queues"]["default"]["size"].is_number());
    assert!(body["timestamp"].is_string());
}

#[actix_web::test]
async fn pausing_critical_queue_is_unprocessable() {
    let backend = MemoryBackend::new();
    backend.add_queue("mailers", vec![]);

    let app = test::init_service(
        App::new()
            .app_data(context(&backend))
            .configure(manager_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/queues/mailers/pause")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 422);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], json!(false));
}

#[actix_web::test]
async fn unknown_queue_returns_not_found_envelope() {
    let backend = MemoryBackend::new();

    let app = test::init_service(
        App::new()
            .app_data(context(&backend))
            .configure(manager_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/queues/ghost/pause")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["message"], json!("Invalid queue name: ghost"));
}

#[actix_web::test]
async fn set_limit_round_trip_and_validation() {
    let backend = MemoryBackend::new();
    backend.add_queue("default", vec![]);

    let app = test::init_service(
        App::new()
            .app_data(context(&backend))
            .configure(manager_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/queues/default/set_limit")
        .set_json(json!({ "limit": 3 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert_eq!(
        backend.state.lock().unwrap().limits.get("default"),
        Some(&3)
    );

    let req = test::TestRequest::post()
        .uri("/queues/default/set_limit")
        .set_json(json!({ "limit": -2 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::delete()
        .uri("/queues/default/remove_limit")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert!(backend.state.lock().unwrap().limits.is_empty());
}

#[actix_web::test]
async fn job_set_listing_and_unknown_set() {
    let backend = MemoryBackend::new();
    backend.push_set(
        JobSet::Scheduled,
        now_epoch() + 60.0,
        job("s1", "MailWorker", "mailers"),
    );

    let app = test::init_service(
        App::new()
            .app_data(context(&backend))
            .configure(manager_routes),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/scheduled?page=1&per_page=10")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["total_count"], json!(1));
    assert_eq!(body["data"]["jobs"][0]["jid"], json!("s1"));
    assert_eq!(body["data"]["pagination"]["total_pages"], json!(1));

    let req = test::TestRequest::get().uri("/bogus").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn deleting_missing_retry_job_is_not_found() {
    let backend = MemoryBackend::new();

    let app = test::init_service(
        App::new()
            .app_data(context(&backend))
            .configure(manager_routes),
    )
    .await;

    let req = test::TestRequest::delete().uri("/retries/nope").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn bulk_pause_summary_reports_skipped_critical_queues() {
    let backend = MemoryBackend::new();
    backend.add_queue("default", vec![]);
    backend.add_queue("mailers", vec![]);

    let app = test::init_service(
        App::new()
            .app_data(context(&backend))
            .configure(manager_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/queues/pause_all")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["paused"], json!(1));
    assert_eq!(body["data"]["skipped"], json!(1));
    assert_eq!(body["data"]["failed"], json!([]));
}

#[actix_web::test]
async fn summary_endpoint_counts_queues() {
    let backend = MemoryBackend::new();
    backend.add_queue("default", vec![job("j1", "Worker", "default")]);
    backend.add_queue("mailers", vec![]);

    let app = test::init_service(
        App::new()
            .app_data(context(&backend))
            .configure(manager_routes),
    )
    .await;

    let req = test::TestRequest::get().uri("/queues/summary").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["data"]["total_queues"], json!(2));
    assert_eq!(body["data"]["total_enqueued"], json!(1));
    assert_eq!(body["data"]["critical_queues"], json!(1));
}

#[actix_web::test]
async fn kill_and_resurrect_round_trip_over_http() {
    let backend = MemoryBackend::new();
    backend.push_set(
        JobSet::Retry,
        now_epoch() + 60.0,
        job("r1", "FlakyWorker", "default"),
    );

    let app = test::init_service(
        App::new()
            .app_data(context(&backend))
            .configure(manager_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/retries/r1/kill")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::post()
        .uri("/dead/r1/resurrect")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["message"], json!("Dead job resurrected successfully"));

    let state = backend.state.lock().unwrap();
    assert!(state.dead.is_empty());
    assert_eq!(state.retry.len(), 1);
}
