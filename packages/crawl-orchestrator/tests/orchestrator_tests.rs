//! Integration tests for launching and tracking crawl sessions.
//!
//! All tests run on a paused tokio clock, so poll intervals elapse
//! instantly and fetch counts are deterministic.

mod common;

use std::sync::Arc;
use std::time::Duration;

use crawl_orchestrator::testing::{LogsReply, MockScrapeApi, SessionFixture};
use crawl_orchestrator::{
    BucketStatus, LaunchError, LaunchFilters, OrchestratorConfig, OrchestratorEvent, PollError,
    SessionId, SessionStatus, TrackingPhase,
};
use tokio::sync::Notify;

use crate::common::{
    buckets, spawn, tracking_only_config, wait_for, wait_for_finish, wait_for_logs_calls,
};

// =============================================================================
// Launch guards
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_empty_selection_never_calls_backend() {
    let api = Arc::new(MockScrapeApi::new().with_run("s-1"));
    let orchestrator = spawn(&api, tracking_only_config());

    let result = orchestrator.start(vec![], LaunchFilters::new()).await;

    assert!(matches!(result, Err(LaunchError::EmptySelection)));
    assert!(api.calls().is_empty());
    assert_eq!(orchestrator.snapshot().phase, TrackingPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_second_start_while_tracking_is_rejected() {
    let api = Arc::new(
        MockScrapeApi::new()
            .with_run("s-1")
            .with_run("s-2")
            .with_logs(vec![SessionFixture::new("s-1", SessionStatus::InProgress)
                .requested(&["fresher"])
                .build()]),
    );
    let orchestrator = spawn(&api, tracking_only_config());

    let first = orchestrator
        .start(buckets(&["fresher"]), LaunchFilters::new())
        .await
        .unwrap();
    let second = orchestrator
        .start(buckets(&["cloud"]), LaunchFilters::new())
        .await;

    assert_eq!(first, SessionId::from("s-1"));
    assert!(matches!(second, Err(LaunchError::SessionAlreadyActive)));
    assert_eq!(api.run_calls().len(), 1);
    assert_eq!(orchestrator.tracked_session(), Some(SessionId::from("s-1")));
    assert_eq!(orchestrator.snapshot().selected, buckets(&["fresher"]));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_launch_leaves_orchestrator_idle() {
    let api = Arc::new(
        MockScrapeApi::new()
            .with_run_error(409, "a crawl is already running")
            .with_run("s-2"),
    );
    let orchestrator = spawn(&api, tracking_only_config());

    let rejected = orchestrator
        .start(buckets(&["cloud"]), LaunchFilters::new())
        .await;

    match rejected {
        Err(LaunchError::LaunchRejected { status, message }) => {
            assert_eq!(status, 409);
            assert_eq!(message, "a crawl is already running");
        }
        other => panic!("expected LaunchRejected, got {:?}", other),
    }
    assert_eq!(orchestrator.snapshot().phase, TrackingPhase::Idle);

    // No automatic retry; an explicit second call goes through.
    assert_eq!(api.run_calls().len(), 1);
    let retried = orchestrator
        .start(buckets(&["cloud"]), LaunchFilters::new())
        .await;
    assert_eq!(retried.unwrap(), SessionId::from("s-2"));
}

#[tokio::test(start_paused = true)]
async fn test_launch_request_carries_filters_and_deduped_buckets() {
    let api = Arc::new(MockScrapeApi::new().with_run("s-1"));
    let config = tracking_only_config().with_triggered_by("scheduler");
    let orchestrator = spawn(&api, config);

    orchestrator
        .start(
            buckets(&["cloud", "fresher", "cloud"]),
            LaunchFilters::new()
                .with_country("India")
                .with_location("Bengaluru")
                .indian_jobs_only(),
        )
        .await
        .unwrap();

    let requests = api.run_calls();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].buckets, buckets(&["cloud", "fresher"]));
    assert_eq!(requests[0].triggered_by, "scheduler");
    assert_eq!(requests[0].country.as_deref(), Some("India"));
    assert_eq!(requests[0].location.as_deref(), Some("Bengaluru"));
    assert!(requests[0].filter_indian_jobs);
}

#[tokio::test(start_paused = true)]
async fn test_start_while_launch_in_flight_is_rejected() {
    let gate = Arc::new(Notify::new());
    let api = Arc::new(MockScrapeApi::new().with_gated_run(gate.clone(), "s-1"));
    let orchestrator = spawn(&api, tracking_only_config());

    let (first, second) = tokio::join!(
        orchestrator.start(buckets(&["A"]), LaunchFilters::new()),
        async {
            while api.run_calls().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            assert_eq!(orchestrator.snapshot().phase, TrackingPhase::Launching);
            let second = orchestrator
                .start(buckets(&["B"]), LaunchFilters::new())
                .await;
            gate.notify_one();
            second
        }
    );

    assert_eq!(first.unwrap(), SessionId::from("s-1"));
    assert!(matches!(second, Err(LaunchError::SessionAlreadyActive)));
    assert_eq!(api.run_calls().len(), 1);
    assert_eq!(orchestrator.tracked_session(), Some(SessionId::from("s-1")));
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_launch_returns_to_idle() {
    let api = Arc::new(
        MockScrapeApi::new()
            .with_gated_run(Arc::new(Notify::new()), "s-1")
            .with_run("s-2"),
    );
    let orchestrator = spawn(&api, tracking_only_config());

    let abandoned = tokio::time::timeout(
        Duration::from_secs(1),
        orchestrator.start(buckets(&["A"]), LaunchFilters::new()),
    )
    .await;

    assert!(abandoned.is_err());
    assert_eq!(orchestrator.snapshot().phase, TrackingPhase::Idle);
    assert_eq!(orchestrator.tracked_session(), None);

    let retried = orchestrator
        .start(buckets(&["A"]), LaunchFilters::new())
        .await
        .unwrap();
    assert_eq!(retried, SessionId::from("s-2"));
    assert_eq!(api.run_calls().len(), 2);
}

// =============================================================================
// Polling lifecycle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_polling_stops_after_terminal_status() {
    let running = SessionFixture::new("s-1", SessionStatus::InProgress).requested(&["A", "B"]);
    let api = Arc::new(
        MockScrapeApi::new()
            .with_run("s-1")
            .with_logs(vec![running.clone().build()])
            .with_logs(vec![running.clone().completed(&["A"]).build()])
            .with_logs(vec![SessionFixture::new("s-1", SessionStatus::Completed)
                .requested(&["A", "B"])
                .completed(&["A", "B"])
                .jobs(80, 12, 5)
                .build()]),
    );
    let orchestrator = spawn(&api, tracking_only_config());
    let mut events = orchestrator.subscribe();

    orchestrator
        .start(buckets(&["A", "B"]), LaunchFilters::new())
        .await
        .unwrap();
    let summary = wait_for_finish(&mut events).await;

    assert_eq!(summary.session_id, SessionId::from("s-1"));
    assert_eq!(summary.status, SessionStatus::Completed);
    assert_eq!(summary.stats.total_jobs_found, 80);
    assert_eq!(summary.stats.total_jobs_added, 12);
    assert_eq!(summary.stats.jobs_updated, 5);
    assert_eq!(summary.completed, buckets(&["A", "B"]));

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(api.logs_calls(), 3);

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.phase, TrackingPhase::Idle);
    assert_eq!(snapshot.last_summary, Some(summary));
    assert_eq!(snapshot.progress.percent_complete(), 100);
}

#[tokio::test(start_paused = true)]
async fn test_partial_status_is_terminal() {
    let api = Arc::new(
        MockScrapeApi::new().with_run("s-1").with_logs(vec![SessionFixture::new(
            "s-1",
            SessionStatus::Partial,
        )
        .requested(&["A", "B", "C"])
        .completed(&["A"])
        .failed(&["B", "C"])
        .build()]),
    );
    let orchestrator = spawn(&api, tracking_only_config());
    let mut events = orchestrator.subscribe();

    orchestrator
        .start(buckets(&["A", "B", "C"]), LaunchFilters::new())
        .await
        .unwrap();
    let summary = wait_for_finish(&mut events).await;

    assert_eq!(summary.status, SessionStatus::Partial);
    assert_eq!(summary.failed, buckets(&["B", "C"]));
    assert_eq!(summary.stats.failed_buckets, 2);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(api.logs_calls(), 1);
    assert_eq!(orchestrator.tracked_session(), None);
}

#[tokio::test(start_paused = true)]
async fn test_poll_interval_is_two_seconds() {
    let api = Arc::new(
        MockScrapeApi::new()
            .with_run("s-1")
            .with_logs(vec![SessionFixture::new("s-1", SessionStatus::InProgress).build()]),
    );
    let orchestrator = spawn(&api, tracking_only_config());

    orchestrator
        .start(buckets(&["A"]), LaunchFilters::new())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1900)).await;
    assert_eq!(api.logs_calls(), 0);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(api.logs_calls(), 1);
    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert_eq!(api.logs_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_failures_do_not_stop_polling() {
    let api = Arc::new(
        MockScrapeApi::new()
            .with_run("s-1")
            .with_logs_reply(LogsReply::Error {
                status: 503,
                message: "backend restarting".to_string(),
            })
            .with_logs_reply(LogsReply::Hang)
            .with_logs(vec![SessionFixture::new("s-1", SessionStatus::Completed)
                .requested(&["A"])
                .completed(&["A"])
                .build()]),
    );
    let config = tracking_only_config().with_request_timeout(Duration::from_secs(3));
    let orchestrator = spawn(&api, config);
    let mut events = orchestrator.subscribe();

    orchestrator
        .start(buckets(&["A"]), LaunchFilters::new())
        .await
        .unwrap();

    let mut failures = Vec::new();
    loop {
        match events.recv().await.unwrap() {
            OrchestratorEvent::PollFetchFailed { session_id, error } => {
                assert_eq!(session_id, Some(SessionId::from("s-1")));
                failures.push(error);
            }
            OrchestratorEvent::SessionFinished(summary) => {
                assert_eq!(summary.status, SessionStatus::Completed);
                break;
            }
            _ => {}
        }
    }

    assert_eq!(failures.len(), 2);
    assert!(failures[0].contains("503"));
    assert!(failures[1].contains("timed out"));
    assert_eq!(api.logs_calls(), 3);
    assert_eq!(orchestrator.snapshot().last_error, None);
}

#[tokio::test(start_paused = true)]
async fn test_session_not_yet_listed_keeps_polling() {
    let api = Arc::new(
        MockScrapeApi::new()
            .with_run("s-new")
            .with_logs(vec![SessionFixture::new("s-old", SessionStatus::Completed).build()])
            .with_logs(vec![SessionFixture::new("s-new", SessionStatus::Failed)
                .requested(&["A"])
                .failed(&["A"])
                .build()]),
    );
    let orchestrator = spawn(&api, tracking_only_config());
    let mut events = orchestrator.subscribe();

    orchestrator
        .start(buckets(&["A"]), LaunchFilters::new())
        .await
        .unwrap();
    let summary = wait_for_finish(&mut events).await;

    assert_eq!(summary.session_id, SessionId::from("s-new"));
    assert_eq!(summary.status, SessionStatus::Failed);
    assert_eq!(api.logs_calls(), 2);
}

// =============================================================================
// Progress derivation while tracking
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_progress_uses_selection_snapshot() {
    let api = Arc::new(
        MockScrapeApi::new()
            .with_run("s-1")
            .with_logs(vec![SessionFixture::new("s-1", SessionStatus::InProgress)
                .requested(&["A", "B"])
                .completed(&["B"])
                .build()]),
    );
    let orchestrator = spawn(&api, tracking_only_config());
    let mut events = orchestrator.subscribe();

    orchestrator
        .start(buckets(&["A", "B"]), LaunchFilters::new())
        .await
        .unwrap();
    orchestrator.set_selected_buckets(buckets(&["B", "C"]));

    let event = wait_for(&mut events, |e| {
        matches!(e, OrchestratorEvent::ProgressUpdated { .. })
    })
    .await;
    let OrchestratorEvent::ProgressUpdated { progress, .. } = event else {
        unreachable!()
    };

    let statuses: Vec<(String, BucketStatus, u8)> = progress
        .buckets
        .iter()
        .map(|b| (b.bucket.to_string(), b.status, b.progress))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("B".to_string(), BucketStatus::Completed, 100),
            ("C".to_string(), BucketStatus::Pending, 0),
        ]
    );
    assert_eq!(progress.stats.completed_buckets, 1);
    assert_eq!(orchestrator.snapshot().progress, progress);
}

// =============================================================================
// Cancellation and stale ticks
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_stale_tick_does_not_touch_new_session() {
    let gate = Arc::new(Notify::new());
    let api = Arc::new(
        MockScrapeApi::new()
            .with_run("s-1")
            .with_run("s-2")
            .with_logs_reply(LogsReply::Gated {
                gate: gate.clone(),
                sessions: vec![SessionFixture::new("s-1", SessionStatus::Completed)
                    .requested(&["A"])
                    .completed(&["A"])
                    .jobs(10, 10, 0)
                    .build()],
            })
            .with_logs(vec![SessionFixture::new("s-2", SessionStatus::InProgress)
                .requested(&["B"])
                .build()]),
    );
    let orchestrator = spawn(&api, tracking_only_config());
    let mut events = orchestrator.subscribe();

    orchestrator
        .start(buckets(&["A"]), LaunchFilters::new())
        .await
        .unwrap();
    wait_for_logs_calls(&api, 1).await;

    // The fetch for s-1 is in flight; switch to a new session.
    assert_eq!(orchestrator.stop_tracking(), Some(SessionId::from("s-1")));
    orchestrator
        .start(buckets(&["B"]), LaunchFilters::new())
        .await
        .unwrap();
    gate.notify_one();

    let event = wait_for(&mut events, |e| {
        matches!(e, OrchestratorEvent::StaleTickDiscarded { .. })
    })
    .await;
    assert_eq!(
        event,
        OrchestratorEvent::StaleTickDiscarded {
            fetched_for: SessionId::from("s-1"),
            tracked: Some(SessionId::from("s-2")),
        }
    );

    let snapshot = orchestrator.snapshot();
    assert_eq!(
        snapshot.phase,
        TrackingPhase::Tracking {
            session_id: SessionId::from("s-2")
        }
    );
    assert!(snapshot.last_summary.is_none());
    assert!(snapshot.session.is_none());

    // The next tick tracks s-2 normally.
    let event = wait_for(&mut events, |e| {
        matches!(e, OrchestratorEvent::ProgressUpdated { .. })
    })
    .await;
    let OrchestratorEvent::ProgressUpdated { session_id, progress } = event else {
        unreachable!()
    };
    assert_eq!(session_id, SessionId::from("s-2"));
    assert_eq!(progress.buckets[0].status, BucketStatus::InProgress);
    assert_eq!(progress.buckets[0].progress, 50);
}

#[tokio::test(start_paused = true)]
async fn test_failed_tick_for_abandoned_session_is_discarded() {
    let api = Arc::new(
        MockScrapeApi::new()
            .with_run("s-1")
            .with_run("s-2")
            .with_logs_reply(LogsReply::Hang)
            .with_logs(vec![SessionFixture::new("s-2", SessionStatus::InProgress)
                .requested(&["B"])
                .build()]),
    );
    let config = tracking_only_config().with_request_timeout(Duration::from_secs(5));
    let orchestrator = spawn(&api, config);
    let mut events = orchestrator.subscribe();

    orchestrator
        .start(buckets(&["A"]), LaunchFilters::new())
        .await
        .unwrap();
    wait_for_logs_calls(&api, 1).await;

    // The fetch for s-1 hangs until the timeout; switch sessions meanwhile.
    orchestrator.stop_tracking();
    orchestrator
        .start(buckets(&["B"]), LaunchFilters::new())
        .await
        .unwrap();

    let mut failures = 0;
    let event = wait_for(&mut events, |e| {
        if matches!(e, OrchestratorEvent::PollFetchFailed { .. }) {
            failures += 1;
        }
        matches!(e, OrchestratorEvent::StaleTickDiscarded { .. })
    })
    .await;

    assert_eq!(
        event,
        OrchestratorEvent::StaleTickDiscarded {
            fetched_for: SessionId::from("s-1"),
            tracked: Some(SessionId::from("s-2")),
        }
    );
    assert_eq!(failures, 0);
    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.last_error, None);
    assert_eq!(orchestrator.tracked_session(), Some(SessionId::from("s-2")));

    let event = wait_for(&mut events, |e| {
        matches!(e, OrchestratorEvent::ProgressUpdated { .. })
    })
    .await;
    let OrchestratorEvent::ProgressUpdated { session_id, .. } = event else {
        unreachable!()
    };
    assert_eq!(session_id, SessionId::from("s-2"));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_all_ticks() {
    let api = Arc::new(
        MockScrapeApi::new()
            .with_run("s-1")
            .with_logs(vec![SessionFixture::new("s-1", SessionStatus::InProgress).build()]),
    );
    let orchestrator = spawn(&api, OrchestratorConfig::default());

    orchestrator
        .start(buckets(&["A"]), LaunchFilters::new())
        .await
        .unwrap();
    wait_for_logs_calls(&api, 2).await;

    orchestrator.shutdown().await;
    let calls = api.logs_calls();
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(api.logs_calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_orchestrator_cancels_worker() {
    let api = Arc::new(MockScrapeApi::new().with_run("s-1"));
    let orchestrator = spawn(&api, tracking_only_config());

    orchestrator
        .start(buckets(&["A"]), LaunchFilters::new())
        .await
        .unwrap();
    drop(orchestrator);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(api.logs_calls(), 0);
}

// =============================================================================
// History
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_passive_refresh_while_idle() {
    let api = Arc::new(MockScrapeApi::new().with_logs(vec![
        SessionFixture::new("s-1", SessionStatus::Completed).build(),
        SessionFixture::new("s-2", SessionStatus::Failed).build(),
    ]));
    let orchestrator = spawn(&api, OrchestratorConfig::default());

    tokio::time::sleep(Duration::from_millis(14_900)).await;
    assert_eq!(api.logs_calls(), 0);
    tokio::time::sleep(Duration::from_millis(16_000)).await;
    assert_eq!(api.logs_calls(), 2);

    let history = orchestrator.cached_history();
    assert_eq!(history.len(), 2);
    assert_eq!(history.terminal().count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_list_history_on_demand() {
    let api = Arc::new(MockScrapeApi::new().with_logs(vec![
        SessionFixture::new("s-1", SessionStatus::InProgress).build(),
    ]));
    let orchestrator = spawn(&api, tracking_only_config());
    let mut events = orchestrator.subscribe();

    let sessions = orchestrator.list_history().await.unwrap();

    assert_eq!(sessions.len(), 1);
    assert_eq!(api.logs_calls(), 1);
    assert_eq!(
        events.recv().await.unwrap(),
        OrchestratorEvent::HistoryRefreshed { sessions: 1 }
    );
    // Listing does not start tracking.
    assert_eq!(orchestrator.tracked_session(), None);
    assert_eq!(orchestrator.cached_history().in_progress().count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_hung_history_fetch_does_not_starve_tracking() {
    let api = Arc::new(
        MockScrapeApi::new()
            .with_run("s-1")
            .with_logs_reply(LogsReply::Hang)
            .with_logs(vec![SessionFixture::new("s-1", SessionStatus::Completed)
                .requested(&["A"])
                .completed(&["A"])
                .build()]),
    );
    let orchestrator = spawn(&api, tracking_only_config());
    let mut events = orchestrator.subscribe();

    let (history, finished) = tokio::join!(orchestrator.list_history(), async {
        wait_for_logs_calls(&api, 1).await;
        orchestrator
            .start(buckets(&["A"]), LaunchFilters::new())
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(15), wait_for_finish(&mut events)).await
    });

    assert!(matches!(history, Err(PollError::TimedOut(_))));
    let summary = finished.expect("tracking stalled behind the history fetch");
    assert_eq!(summary.status, SessionStatus::Completed);
    assert_eq!(api.logs_calls(), 2);
}
