//! Integration tests for the crawl pipeline
//!
//! These tests use wiremock to stand in for the statistics source and drive
//! the full orchestrator end-to-end against a temporary queue database.

use statline::config::{
    CompetitionEntry, Config, FallbackConfig, FetchConfig, IdentityConfig, OutputConfig,
    SourceConfig, ThrottleConfig, TrafficConfig,
};
use statline::crawler::{HrefScanParser, Orchestrator};
use statline::queue::{QueueStore, RunStatus, SqliteQueue, TargetKind, TargetStatus};
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Throttle tuning that keeps tests fast while preserving the semantics
fn fast_throttle() -> ThrottleConfig {
    ThrottleConfig {
        base_delay_ms: 5,
        min_delay_ms: 1,
        max_delay_ms: 50,
        growth_factor: 1.5,
        backoff_exponent_cap: 3,
        reconfigure_delay_ms: 5,
        jitter_fraction: 0.0,
        failures_before_reconfigure: 3,
        max_consecutive_failures: 20,
        max_identity_changes: 5,
    }
}

fn fast_traffic() -> TrafficConfig {
    TrafficConfig {
        peak_base_ms: 1,
        peak_variance_ms: 0,
        off_hours_base_ms: 1,
        off_hours_variance_ms: 0,
        night_base_ms: 1,
        night_variance_ms: 0,
        weekend_base_ms: 1,
        weekend_variance_ms: 0,
        block_penalty_growth: 1.5,
        block_penalty_cap: 2,
        success_window_secs: 300,
        low_success_threshold: 0.6,
        low_success_multiplier: 1.5,
        critical_success_threshold: 0.3,
        critical_success_multiplier: 3.0,
        human_pause_probability: 0.0,
        human_pause_max_ms: 0,
        burst_success_threshold: 0.8,
        burst_probability: 0.0,
        burst_factor: 0.5,
        burst_min_sample: 1_000,
    }
}

fn test_config(base_url: &str, db_path: &str, competitions: Vec<CompetitionEntry>) -> Config {
    Config {
        source: SourceConfig {
            base_url: base_url.to_string(),
        },
        throttle: fast_throttle(),
        traffic: fast_traffic(),
        identity: IdentityConfig {
            cooldown_secs: 0,
            block_min_failures: 50,
            block_success_floor: 0.3,
        },
        fallback: FallbackConfig::default(),
        fetch: FetchConfig {
            hard_timeout_secs: 5,
            connect_timeout_secs: 2,
        },
        output: OutputConfig {
            database_path: db_path.to_string(),
        },
        proxies: vec![],
        competitions,
    }
}

fn competition_entry(base_url: &str) -> CompetitionEntry {
    CompetitionEntry {
        id: 17,
        name: "Premier League".to_string(),
        slug: "premier-league".to_string(),
        url: format!("{}/league/17/premier-league", base_url),
        seasons_url_pattern: format!("{}/league/{{id}}/{{slug}}/{{season}}", base_url),
        known_seasons: vec!["2024-2025".to_string()],
    }
}

async fn mount_page(server: &MockServer, page_path: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(page_path.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_pipeline_happy_path() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/league/17/premier-league",
        r#"<html><body>
            <a href="/season/2024">2024-2025</a>
            <a href="/season/2023">2023-2024</a>
        </body></html>"#
            .to_string(),
    )
    .await;
    for season in ["/season/2024", "/season/2023"] {
        mount_page(
            &server,
            season,
            r#"<html><body>
                <a href="/m/1">Match 1</a>
                <a href="/m/2">Match 2</a>
            </body></html>"#
                .to_string(),
        )
        .await;
    }
    for m in ["/m/1", "/m/2"] {
        mount_page(
            &server,
            m,
            format!(r#"<html><body><a href="{}/detail">Detail</a></body></html>"#, m),
        )
        .await;
    }
    for detail in ["/m/1/detail", "/m/2/detail"] {
        mount_page(
            &server,
            detail,
            "<html><body>Final score and lineups</body></html>".to_string(),
        )
        .await;
    }

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("statline.db");
    let config = test_config(
        &base,
        db_path.to_str().unwrap(),
        vec![competition_entry(&base)],
    );

    let mut orchestrator = Orchestrator::new(config, "happy", HrefScanParser).unwrap();
    let report = orchestrator.run().await.unwrap();
    drop(orchestrator);

    assert!(!report.halted);

    let queue = SqliteQueue::new(Path::new(&db_path)).unwrap();
    let done = |kind| {
        queue
            .count_by_kind_and_status(kind, TargetStatus::Done)
            .unwrap()
    };
    assert_eq!(done(TargetKind::Competition), 1);
    assert_eq!(done(TargetKind::SeasonLink), 2);
    assert_eq!(done(TargetKind::Match), 2);
    assert_eq!(done(TargetKind::MatchDetail), 2);
    assert_eq!(queue.count_by_status(TargetStatus::Pending).unwrap(), 0);
    assert_eq!(queue.count_by_status(TargetStatus::Error).unwrap(), 0);

    // Everything finished, so the run closed
    let run = queue.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.finished_at.is_some());
}

#[tokio::test]
async fn test_429_storm_suspends_stage_and_preserves_queue() {
    let server = MockServer::start().await;
    let base = server.uri();

    // The source rate-limits everything
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("statline.db");
    let config = test_config(
        &base,
        db_path.to_str().unwrap(),
        vec![competition_entry(&base)],
    );

    let mut orchestrator = Orchestrator::new(config, "storm", HrefScanParser).unwrap();
    let report = orchestrator.run().await.unwrap();
    drop(orchestrator);

    // Rate limiting suspends the crawl; it never halts the session
    assert!(!report.halted);
    let competition_stage = report
        .stages
        .iter()
        .find(|s| s.kind == TargetKind::Competition)
        .unwrap();
    assert!(competition_stage.attempted >= 1);
    assert!(competition_stage.skipped >= 1);

    let queue = SqliteQueue::new(Path::new(&db_path)).unwrap();

    // The competition target survives as pending with its retries recorded,
    // ready for the next run
    let target = queue
        .get_target_by_url(&format!("{}/league/17/premier-league", base))
        .unwrap()
        .unwrap();
    assert_eq!(target.status, TargetStatus::Pending);
    assert_eq!(target.retry_count, 3);

    // Refused live discovery fell back to synthetic season targets
    assert_eq!(
        queue
            .count_by_kind_and_status(TargetKind::SeasonLink, TargetStatus::Pending)
            .unwrap(),
        1
    );
    let synthetic = queue
        .get_target_by_url(&format!("{}/league/17/premier-league/2024-2025", base))
        .unwrap();
    assert!(synthetic.is_some());

    // Work remains, so the run stays open for resume
    let run = queue.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Running);
}

#[tokio::test]
async fn test_resume_processes_only_pending_targets() {
    let server = MockServer::start().await;
    let base = server.uri();

    for i in 0..8 {
        mount_page(
            &server,
            &format!("/m/{}", i),
            "<html><body>No links here</body></html>".to_string(),
        )
        .await;
    }

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("statline.db");

    // Simulate an earlier interrupted run: 8 matches known, 3 already done
    {
        let mut queue = SqliteQueue::new(&db_path).unwrap();
        let run_id = queue.create_run("earlier").unwrap();
        let mut ids = Vec::new();
        for i in 0..8 {
            let id = queue
                .enqueue(&format!("{}/m/{}", base, i), TargetKind::Match, None, run_id)
                .unwrap();
            ids.push(id);
        }
        for id in &ids[..3] {
            queue.mark(*id, TargetStatus::Done, None).unwrap();
        }
    }

    let config = test_config(&base, db_path.to_str().unwrap(), vec![]);
    let mut orchestrator = Orchestrator::new(config, "resume", HrefScanParser).unwrap();
    let report = orchestrator.run().await.unwrap();
    drop(orchestrator);

    // Only the 5 pending targets were fetched
    let match_stage = report
        .stages
        .iter()
        .find(|s| s.kind == TargetKind::Match)
        .unwrap();
    assert_eq!(match_stage.attempted, 5);

    let queue = SqliteQueue::new(&db_path).unwrap();
    assert_eq!(
        queue
            .count_by_kind_and_status(TargetKind::Match, TargetStatus::Done)
            .unwrap(),
        3
    );
    // Linkless match pages legitimately yield nothing
    assert_eq!(
        queue
            .count_by_kind_and_status(TargetKind::Match, TargetStatus::NoData)
            .unwrap(),
        5
    );
    assert_eq!(queue.count_by_status(TargetStatus::Pending).unwrap(), 0);
}

#[tokio::test]
async fn test_slow_source_hits_deadline_and_errors_out() {
    let server = MockServer::start().await;
    let base = server.uri();

    // Responds, but far too slowly
    Mock::given(method("GET"))
        .and(path("/m/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html></html>")
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("statline.db");

    {
        let mut queue = SqliteQueue::new(&db_path).unwrap();
        let run_id = queue.create_run("slow").unwrap();
        queue
            .enqueue(&format!("{}/m/slow", base), TargetKind::Match, None, run_id)
            .unwrap();
    }

    let mut config = test_config(&base, db_path.to_str().unwrap(), vec![]);
    config.fetch.hard_timeout_secs = 1;
    config.fetch.connect_timeout_secs = 1;
    // Keep the gate out of the way so every retry is attempted
    config.fallback.consecutive_failure_threshold = 50;

    let started = Instant::now();
    let mut orchestrator = Orchestrator::new(config, "slow", HrefScanParser).unwrap();
    let report = orchestrator.run().await.unwrap();
    drop(orchestrator);

    // Initial attempt plus three retries, each cut off at the deadline
    assert!(started.elapsed() < Duration::from_secs(15));
    assert!(!report.halted);

    let queue = SqliteQueue::new(&db_path).unwrap();
    let target = queue
        .get_target_by_url(&format!("{}/m/slow", base))
        .unwrap()
        .unwrap();
    assert_eq!(target.status, TargetStatus::Error);
    assert!(target
        .error_message
        .as_deref()
        .unwrap()
        .contains("deadline"));
    assert_eq!(target.retry_count, 3);
}
