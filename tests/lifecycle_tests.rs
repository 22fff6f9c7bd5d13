
use booking_service::booking::JobUpdate;
use booking_service::domain::{JobStatus, LanguagePair};
use booking_service::error::BookingError;
use chrono::{Duration, Utc};
use test_harness::{admin, customer, details, translator, TestHarness};

#[tokio::test]
async fn created_booking_goes_straight_onto_the_board() {
    let harness = TestHarness::new();
    let alice = harness.add_user("tok-alice", customer(1)).await;

    let before = Utc::now();
    let job = harness
        .service
        .create_job(&alice, details("sv", "en", 6, 60))
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Open);
    assert_eq!(job.customer, alice.id);
    assert!(job.assigned_translator.is_none());
    // Offer window defaults to 90 minutes from opening
    let window = job.expires_at - before;
    assert!(window >= Duration::minutes(89) && window <= Duration::minutes(91));
}

#[tokio::test]
async fn create_rejects_bad_requests() {
    let harness = TestHarness::new();
    let alice = harness.add_user("tok-alice", customer(1)).await;
    let trans = harness.add_user("tok-t", translator(2, &["sv", "en"])).await;

    let past_due = harness
        .service
        .create_job(&alice, details("sv", "en", -2, 60))
        .await;
    assert!(matches!(past_due, Err(BookingError::Validation(_))));

    let mut same_pair = details("sv", "en", 4, 60);
    same_pair.language_pair = LanguagePair::new("sv", "sv");
    let same_pair = harness.service.create_job(&alice, same_pair).await;
    assert!(matches!(same_pair, Err(BookingError::Validation(_))));

    let zero_duration = harness
        .service
        .create_job(&alice, details("sv", "en", 4, 0))
        .await;
    assert!(matches!(zero_duration, Err(BookingError::Validation(_))));

    let by_translator = harness
        .service
        .create_job(&trans, details("sv", "en", 4, 60))
        .await;
    assert!(matches!(by_translator, Err(BookingError::Forbidden(_))));
}

#[tokio::test]
async fn assignment_runs_through_start_and_end() {
    let harness = TestHarness::new();
    let alice = harness.add_user("tok-alice", customer(1)).await;
    let bob = harness.add_user("tok-bob", translator(2, &["sv", "en"])).await;

    let job = harness
        .service
        .create_job(&alice, details("sv", "en", 6, 60))
        .await
        .unwrap();
    let job = harness.service.accept_job(&bob, job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Assigned);
    assert_eq!(job.assigned_translator, Some(bob.id));

    let job = harness.service.start_job(&bob, job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::InProgress);
    assert!(job.started_at.is_some());

    let job = harness.service.end_job(&bob, job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Ended);
    assert_eq!(job.assigned_translator, None);
    assert_eq!(job.previous_translator, Some(bob.id));
    assert!(job.session_time_minutes.unwrap_or(-1) >= 0);
}

#[tokio::test]
async fn only_the_assigned_translator_or_admin_controls_the_session() {
    let harness = TestHarness::new();
    let alice = harness.add_user("tok-alice", customer(1)).await;
    let bob = harness.add_user("tok-bob", translator(2, &["sv", "en"])).await;
    let eve = harness.add_user("tok-eve", translator(3, &["sv", "en"])).await;
    let boss = harness.add_user("tok-boss", admin(4)).await;

    let job = harness
        .service
        .create_job(&alice, details("sv", "en", 6, 60))
        .await
        .unwrap();
    let job = harness.service.accept_job(&bob, job.id).await.unwrap();

    let eve_starts = harness.service.start_job(&eve, job.id).await;
    assert!(matches!(eve_starts, Err(BookingError::Forbidden(_))));

    // An admin may drive the session on the translator's behalf
    let job = harness.service.start_job(&boss, job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::InProgress);

    let eve_ends = harness.service.end_job(&eve, job.id).await;
    assert!(matches!(eve_ends, Err(BookingError::Forbidden(_))));

    let job = harness.service.end_job(&bob, job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Ended);
}

#[tokio::test]
async fn sessions_only_start_from_assigned_and_end_from_in_progress() {
    let harness = TestHarness::new();
    let alice = harness.add_user("tok-alice", customer(1)).await;
    let bob = harness.add_user("tok-bob", translator(2, &["sv", "en"])).await;

    let job = harness
        .service
        .create_job(&alice, details("sv", "en", 6, 60))
        .await
        .unwrap();

    let start_open = harness.service.start_job(&bob, job.id).await;
    assert!(matches!(
        start_open,
        Err(BookingError::Forbidden(_)) | Err(BookingError::InvalidTransition { .. })
    ));

    let job = harness.service.accept_job(&bob, job.id).await.unwrap();
    let end_assigned = harness.service.end_job(&bob, job.id).await;
    assert!(matches!(
        end_assigned,
        Err(BookingError::InvalidTransition { action: "end", .. })
    ));

    let job = harness.service.start_job(&bob, job.id).await.unwrap();
    let start_again = harness.service.start_job(&bob, job.id).await;
    assert!(matches!(
        start_again,
        Err(BookingError::InvalidTransition { action: "start", .. })
    ));
}

#[tokio::test]
async fn no_show_closes_the_job_without_session_time() {
    let harness = TestHarness::new();
    let alice = harness.add_user("tok-alice", customer(1)).await;
    let bob = harness.add_user("tok-bob", translator(2, &["sv", "en"])).await;

    let job = harness
        .service
        .create_job(&alice, details("sv", "en", 6, 60))
        .await
        .unwrap();
    let job = harness.service.accept_job(&bob, job.id).await.unwrap();

    let job = harness.service.record_no_show(&bob, job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Ended);
    assert!(job.customer_no_show);
    assert_eq!(job.session_time_minutes, None);
    assert_eq!(job.assigned_translator, None);
    assert_eq!(job.previous_translator, Some(bob.id));
}

#[tokio::test]
async fn cancel_works_on_any_live_status_but_not_after_the_end() {
    let harness = TestHarness::new();
    let alice = harness.add_user("tok-alice", customer(1)).await;
    let bob = harness.add_user("tok-bob", translator(2, &["sv", "en"])).await;

    let open_job = harness
        .service
        .create_job(&alice, details("sv", "en", 6, 60))
        .await
        .unwrap();
    let cancelled = harness.service.cancel_job(&alice, open_job.id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);

    let again = harness.service.cancel_job(&alice, open_job.id).await;
    assert!(matches!(
        again,
        Err(BookingError::InvalidTransition { action: "cancel", .. })
    ));

    let held = harness
        .service
        .create_job(&alice, details("sv", "en", 8, 60))
        .await
        .unwrap();
    let held = harness.service.accept_job(&bob, held.id).await.unwrap();
    let cancelled = harness.service.cancel_job(&alice, held.id).await.unwrap();
    assert_eq!(cancelled.assigned_translator, None);
    assert_eq!(cancelled.previous_translator, Some(bob.id));
}

#[tokio::test]
async fn strangers_cannot_cancel_or_view_a_booking() {
    let harness = TestHarness::new();
    let alice = harness.add_user("tok-alice", customer(1)).await;
    let mallory = harness.add_user("tok-mallory", customer(2)).await;

    let job = harness
        .service
        .create_job(&alice, details("sv", "en", 6, 60))
        .await
        .unwrap();

    let cancel = harness.service.cancel_job(&mallory, job.id).await;
    assert!(matches!(cancel, Err(BookingError::Forbidden(_))));

    let view = harness.service.get_job(&mallory, job.id).await;
    assert!(matches!(view, Err(BookingError::Forbidden(_))));

    let owner_view = harness.service.get_job(&alice, job.id).await;
    assert!(owner_view.is_ok());
}

#[tokio::test]
async fn reopen_clones_a_terminal_booking() {
    let harness = TestHarness::new();
    let alice = harness.add_user("tok-alice", customer(1)).await;

    let job = harness
        .service
        .create_job(&alice, details("sv", "en", 6, 60))
        .await
        .unwrap();
    let original_id = job.id;
    harness.service.cancel_job(&alice, original_id).await.unwrap();

    let reopened = harness.service.reopen_job(&alice, original_id).await.unwrap();
    assert_ne!(reopened.id, original_id);
    assert_eq!(reopened.status, JobStatus::Open);
    assert_eq!(reopened.reopened_from, Some(original_id));
    assert_eq!(reopened.language_pair, job.language_pair);

    // The terminal record stays terminal
    let original = harness.job(original_id).await;
    assert_eq!(original.status, JobStatus::Cancelled);

    let live = harness.service.reopen_job(&alice, reopened.id).await;
    assert!(matches!(
        live,
        Err(BookingError::InvalidTransition { action: "reopen", .. })
    ));
}

#[tokio::test]
async fn customers_reschedule_their_own_live_bookings() {
    let harness = TestHarness::new();
    let alice = harness.add_user("tok-alice", customer(1)).await;
    let mallory = harness.add_user("tok-mallory", customer(2)).await;

    let job = harness
        .service
        .create_job(&alice, details("sv", "en", 6, 60))
        .await
        .unwrap();

    let new_due = Utc::now() + Duration::hours(12);
    let update = JobUpdate {
        due: Some(new_due),
        duration_minutes: Some(90),
        ..Default::default()
    };
    let job = harness
        .service
        .update_job(&alice, job.id, update)
        .await
        .unwrap();
    assert_eq!(job.due, new_due);
    assert_eq!(job.duration_minutes, 90);

    let foreign = harness
        .service
        .update_job(
            &mallory,
            job.id,
            JobUpdate {
                duration_minutes: Some(30),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(foreign, Err(BookingError::Forbidden(_))));
}

#[tokio::test]
async fn admin_fields_are_admin_only_and_survive_terminal_status() {
    let harness = TestHarness::new();
    let alice = harness.add_user("tok-alice", customer(1)).await;
    let boss = harness.add_user("tok-boss", admin(9)).await;

    let job = harness
        .service
        .create_job(&alice, details("sv", "en", 6, 60))
        .await
        .unwrap();

    let sneaky = harness
        .service
        .update_job(
            &alice,
            job.id,
            JobUpdate {
                flagged: Some(true),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(sneaky, Err(BookingError::Forbidden(_))));

    harness.service.cancel_job(&alice, job.id).await.unwrap();

    // Annotating a closed record is allowed, rescheduling it is not
    let annotated = harness
        .service
        .update_job(
            &boss,
            job.id,
            JobUpdate {
                flagged: Some(true),
                admin_comments: Some(Some("customer asked to rebook".to_string())),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(annotated.flagged);
    assert_eq!(
        annotated.admin_comments.as_deref(),
        Some("customer asked to rebook")
    );

    let reschedule = harness
        .service
        .update_job(
            &boss,
            job.id,
            JobUpdate {
                due: Some(Utc::now() + Duration::hours(20)),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(
        reschedule,
        Err(BookingError::InvalidTransition { action: "reschedule", .. })
    ));
}

#[tokio::test]
async fn update_validates_like_create() {
    let harness = TestHarness::new();
    let alice = harness.add_user("tok-alice", customer(1)).await;

    let job = harness
        .service
        .create_job(&alice, details("sv", "en", 6, 60))
        .await
        .unwrap();

    let past = harness
        .service
        .update_job(
            &alice,
            job.id,
            JobUpdate {
                due: Some(Utc::now() - Duration::hours(1)),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(past, Err(BookingError::Validation(_))));

    let over_long = harness
        .service
        .update_job(
            &alice,
            job.id,
            JobUpdate {
                duration_minutes: Some(24 * 60 + 1),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(over_long, Err(BookingError::Validation(_))));
}
