
use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use booking_service::api::{booking_config, health_config, validation, API_TOKEN_HEADER};
use booking_service::store::JobStore;
use test_harness::{admin, customer, details, translator, TestHarness};

macro_rules! booking_app {
    ($harness:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::from(Arc::clone(&$harness.service)))
                .app_data(validation::json_config())
                .configure(booking_config),
        )
        .await
    };
}

fn create_body(hours_ahead: i64) -> Value {
    json!({
        "from_language": "sv",
        "to_language": "en",
        "due": Utc::now() + Duration::hours(hours_ahead),
        "duration_minutes": 60,
    })
}

#[actix_web::test]
async fn booking_round_trip_over_http() {
    let harness = TestHarness::new();
    harness.add_user("tok-alice", customer(1)).await;

    let app = booking_app!(harness);

    let req = test::TestRequest::post()
        .uri("/api/jobs")
        .insert_header((API_TOKEN_HEADER, "tok-alice"))
        .set_json(create_body(6))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Booking created successfully");
    assert_eq!(body["job"]["status"], "open");
    let job_id = body["job"]["id"].as_i64().expect("job id in response");

    let req = test::TestRequest::get()
        .uri(&format!("/api/jobs/{}", job_id))
        .insert_header((API_TOKEN_HEADER, "tok-alice"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["job"]["id"].as_i64(), Some(job_id));
}

#[actix_web::test]
async fn requests_without_a_token_get_401() {
    let harness = TestHarness::new();
    harness.add_user("tok-alice", customer(1)).await;

    let app = booking_app!(harness);

    let req = test::TestRequest::post()
        .uri("/api/jobs")
        .set_json(create_body(6))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Authentication required");

    let req = test::TestRequest::post()
        .uri("/api/jobs")
        .insert_header((API_TOKEN_HEADER, "tok-wrong"))
        .set_json(create_body(6))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn bearer_tokens_are_accepted_too() {
    let harness = TestHarness::new();
    harness.add_user("tok-alice", customer(1)).await;

    let app = booking_app!(harness);

    let req = test::TestRequest::post()
        .uri("/api/jobs")
        .insert_header(("Authorization", "Bearer tok-alice"))
        .set_json(create_body(6))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[actix_web::test]
async fn invalid_payloads_name_the_offending_fields() {
    let harness = TestHarness::new();
    harness.add_user("tok-alice", customer(1)).await;

    let app = booking_app!(harness);

    let req = test::TestRequest::post()
        .uri("/api/jobs")
        .insert_header((API_TOKEN_HEADER, "tok-alice"))
        .set_json(json!({
            "from_language": "x",
            "to_language": "en",
            "due": Utc::now() + Duration::hours(6),
            "duration_minutes": 0,
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Validation failed");
    assert!(body["fields"].get("from_language").is_some());
    assert!(body["fields"].get("duration_minutes").is_some());
}

#[actix_web::test]
async fn updates_reject_unknown_fields() {
    let harness = TestHarness::new();
    let alice = harness.add_user("tok-alice", customer(1)).await;

    let job = harness
        .service
        .create_job(&alice, details("sv", "en", 6, 60))
        .await
        .unwrap();

    let app = booking_app!(harness);

    // Status changes must go through the transition endpoints
    let req = test::TestRequest::put()
        .uri(&format!("/api/jobs/{}", job.id))
        .insert_header((API_TOKEN_HEADER, "tok-alice"))
        .set_json(json!({"status": "cancelled"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn role_gates_surface_as_403() {
    let harness = TestHarness::new();
    harness.add_user("tok-bob", translator(2, &["sv", "en"])).await;

    let app = booking_app!(harness);

    let req = test::TestRequest::post()
        .uri("/api/jobs")
        .insert_header((API_TOKEN_HEADER, "tok-bob"))
        .set_json(create_body(6))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Forbidden");
}

#[actix_web::test]
async fn accepting_a_taken_job_is_unprocessable() {
    let harness = TestHarness::new();
    let alice = harness.add_user("tok-alice", customer(1)).await;
    harness.add_user("tok-bob", translator(2, &["sv", "en"])).await;
    harness.add_user("tok-carol", translator(3, &["sv", "en"])).await;

    let job = harness
        .service
        .create_job(&alice, details("sv", "en", 6, 60))
        .await
        .unwrap();

    let app = booking_app!(harness);

    let req = test::TestRequest::post()
        .uri("/api/jobs/accept")
        .insert_header((API_TOKEN_HEADER, "tok-bob"))
        .set_json(json!({"job_id": job.id.0}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // Path-parameter variant behaves identically for the loser
    let req = test::TestRequest::post()
        .uri(&format!("/api/jobs/{}/accept", job.id))
        .insert_header((API_TOKEN_HEADER, "tok-carol"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Invalid job state");
}

#[actix_web::test]
async fn unknown_jobs_are_404() {
    let harness = TestHarness::new();
    harness.add_user("tok-alice", customer(1)).await;

    let app = booking_app!(harness);

    let req = test::TestRequest::get()
        .uri("/api/jobs/424242")
        .insert_header((API_TOKEN_HEADER, "tok-alice"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn listing_dispatches_on_the_user_id_parameter() {
    let harness = TestHarness::new();
    let alice = harness.add_user("tok-alice", customer(1)).await;
    harness.add_user("tok-boss", admin(9)).await;

    harness
        .service
        .create_job(&alice, details("sv", "en", 6, 60))
        .await
        .unwrap();

    let app = booking_app!(harness);

    let req = test::TestRequest::get()
        .uri("/api/jobs?user_id=1")
        .insert_header((API_TOKEN_HEADER, "tok-alice"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["count"], 1);

    // Without user_id the listing is the admin-wide one
    let req = test::TestRequest::get()
        .uri("/api/jobs?status=open")
        .insert_header((API_TOKEN_HEADER, "tok-alice"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::get()
        .uri("/api/jobs?status=open")
        .insert_header((API_TOKEN_HEADER, "tok-boss"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["count"], 1);

    let req = test::TestRequest::get()
        .uri("/api/jobs?status=bogus")
        .insert_header((API_TOKEN_HEADER, "tok-boss"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn health_endpoints_report_the_store() {
    let harness = TestHarness::new();
    let store_data: web::Data<dyn JobStore> =
        web::Data::from(Arc::clone(&harness.store) as Arc<dyn JobStore>);

    let app = test::init_service(
        App::new()
            .app_data(store_data)
            .configure(health_config),
    )
    .await;

    for uri in ["/health", "/ready", "/live"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK, "{} should be 200", uri);
    }

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "connected");
}
