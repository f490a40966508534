//! Integration tests for the crawler
//!
//! These tests drive the full crawl cycle end-to-end against the simulated
//! portal and target system, with paused tokio time so the long seat-limit
//! and cooldown waits complete instantly.

use stacks_crawler::config::{Credentials, PageFailurePolicy};
use stacks_crawler::crawler::{crawl, shutdown_channel, CrawlOrchestrator, SetupPhase, ShutdownSignal};
use stacks_crawler::output::{collect_statistics, format_markdown_report, write_markdown_report, UnitStatus};
use stacks_crawler::state::SessionState;
use stacks_crawler::testing::{test_config, MemoryArtifactStore, SimulatedSite};
use stacks_crawler::Config;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn credentials() -> Credentials {
    Credentials::new("alice", "secret").expect("valid credentials")
}

fn units(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

fn orchestrator(
    config: Config,
    site: &SimulatedSite,
    store: &MemoryArtifactStore,
    shutdown: ShutdownSignal,
) -> CrawlOrchestrator {
    CrawlOrchestrator::new(config, Arc::new(site.clone()), Arc::new(store.clone()), shutdown)
}

#[tokio::test(start_paused = true)]
async fn test_full_crawl_until_results_end() {
    let store = MemoryArtifactStore::new();
    let site = SimulatedSite::builder().pages(4).store(store.clone()).build();

    let summary = crawl(
        test_config(),
        &units(&["2024"]),
        &credentials(),
        Arc::new(site.clone()),
        Arc::new(store.clone()),
        ShutdownSignal::never(),
    )
    .await;

    assert_eq!(summary.units.len(), 1);
    let unit = &summary.units[0];
    assert_eq!(unit.status, UnitStatus::Completed);
    assert_eq!(unit.session_state, SessionState::PageSizeSet);
    assert!(unit.degraded.is_empty());
    assert_eq!(unit.visited_count, 4);
    assert_eq!(
        unit.pages.iter().map(|p| p.page).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );

    assert_eq!(site.visited_pages(), vec![1, 2, 3, 4]);
    assert_eq!(site.downloads_triggered(), 4);
    assert_eq!(store.files_in(Path::new("/downloads/2024")).len(), 4);
    assert_eq!(summary.total_artifacts(), 4);
    assert!(summary.all_succeeded());
    assert_eq!(site.sessions_closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_safety_cap_with_contention_on_second_page() {
    let store = MemoryArtifactStore::new();
    let site = SimulatedSite::builder()
        .pages(5)
        .contention_on_page(2, 1)
        .store(store.clone())
        .build();
    let mut config = test_config();
    config.crawl.max_page_visits = 3;

    let orchestrator = orchestrator(config, &site, &store, ShutdownSignal::never());
    let planned = orchestrator.plan_units(&units(&["2024"]));
    let summary = orchestrator.run_all(&planned, &credentials()).await;

    let unit = &summary.units[0];
    assert_eq!(unit.status, UnitStatus::SafetyCap);
    assert_eq!(unit.visited_count, 3);
    assert_eq!(
        unit.pages.iter().map(|p| p.page).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(unit.pages.iter().all(|p| p.is_completed()));
    assert_eq!(unit.pages[0].contention_cycles, 0);
    assert_eq!(unit.pages[1].contention_cycles, 1);
    assert_eq!(unit.pages[2].contention_cycles, 0);

    assert_eq!(site.visited_pages(), vec![1, 2, 3]);
    assert_eq!(store.files_in(Path::new("/downloads/2024")).len(), 3);

    let stats = collect_statistics(&summary);
    assert_eq!(stats.units_capped, 1);
    assert_eq!(stats.contention_cycles, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_login_processes_no_pages() {
    let store = MemoryArtifactStore::new();
    let site = SimulatedSite::builder()
        .pages(3)
        .login_rejected()
        .store(store.clone())
        .build();

    let orchestrator = orchestrator(test_config(), &site, &store, ShutdownSignal::never());
    let planned = orchestrator.plan_units(&units(&["2024"]));
    let summary = orchestrator.run_all(&planned, &credentials()).await;

    let unit = &summary.units[0];
    match &unit.status {
        UnitStatus::Fatal { reason } => assert!(reason.contains("Authentication")),
        other => panic!("expected fatal status, got {:?}", other),
    }
    assert_eq!(unit.session_state, SessionState::Failed);
    assert!(unit.pages.is_empty());
    assert_eq!(site.downloads_triggered(), 0);
    assert_eq!(site.sessions_closed(), 1);
    assert_eq!(summary.failed_units(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_filter_degrades_but_crawls() {
    let store = MemoryArtifactStore::new();
    let site = SimulatedSite::builder()
        .pages(2)
        .without("filter-input")
        .store(store.clone())
        .build();

    let orchestrator = orchestrator(test_config(), &site, &store, ShutdownSignal::never());
    let planned = orchestrator.plan_units(&units(&["2024"]));
    let summary = orchestrator.run_all(&planned, &credentials()).await;

    let unit = &summary.units[0];
    assert_eq!(unit.status, UnitStatus::Completed);
    assert_eq!(unit.session_state, SessionState::PageSizeSet);
    assert_eq!(unit.degraded, vec![SetupPhase::ApplyFilter]);
    assert_eq!(unit.artifact_count(), 2);

    let report = format_markdown_report(&summary);
    assert!(report.contains("apply-filter"));
}

#[tokio::test(start_paused = true)]
async fn test_failing_unit_does_not_stop_later_units() {
    let store = MemoryArtifactStore::new();
    let site = SimulatedSite::builder()
        .pages(2)
        .failing_opens(1)
        .store(store.clone())
        .build();

    let orchestrator = orchestrator(test_config(), &site, &store, ShutdownSignal::never());
    let planned = orchestrator.plan_units(&units(&["2023", "2024", "2025"]));
    let summary = orchestrator.run_all(&planned, &credentials()).await;

    assert!(matches!(summary.units[0].status, UnitStatus::Fatal { .. }));
    assert_eq!(summary.units[1].status, UnitStatus::Completed);
    assert_eq!(summary.units[2].status, UnitStatus::Completed);
    assert!(store.files_in(Path::new("/downloads/2023")).is_empty());
    assert_eq!(store.files_in(Path::new("/downloads/2024")).len(), 2);
    assert_eq!(store.files_in(Path::new("/downloads/2025")).len(), 2);
    assert_eq!(site.sessions_opened(), 2);
    assert_eq!(site.sessions_closed(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_unit_is_isolated() {
    let store = MemoryArtifactStore::new();
    let site = SimulatedSite::builder()
        .pages(2)
        .panic_on_click("format-option")
        .store(store.clone())
        .build();

    let orchestrator = orchestrator(test_config(), &site, &store, ShutdownSignal::never());
    let planned = orchestrator.plan_units(&units(&["2023", "2024"]));
    let summary = orchestrator.run_all(&planned, &credentials()).await;

    assert_eq!(summary.units.len(), 2);
    for unit in &summary.units {
        match &unit.status {
            UnitStatus::Fatal { reason } => assert!(reason.contains("format-option")),
            other => panic!("expected fatal status, got {:?}", other),
        }
    }
    assert_eq!(site.sessions_opened(), 2);
    assert_eq!(site.sessions_closed(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_seat_limit_wait() {
    let store = MemoryArtifactStore::new();
    let site = SimulatedSite::builder()
        .pages(3)
        .contention_on_page(2, 1)
        .store(store.clone())
        .build();
    let config = test_config();
    let wait = config.timing.contention_wait();

    let (handle, signal) = shutdown_channel();
    let orchestrator = orchestrator(config, &site, &store, signal);
    let planned = orchestrator.plan_units(&units(&["2024", "2025"]));

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(120)).await;
        handle.trigger();
    });

    let started = tokio::time::Instant::now();
    let summary = orchestrator.run_all(&planned, &credentials()).await;

    assert!(summary.interrupted);
    assert_eq!(summary.units.len(), 1);
    let unit = &summary.units[0];
    assert_eq!(unit.status, UnitStatus::Interrupted);
    assert_eq!(unit.visited_count, 1);
    assert!(unit.pages[0].is_completed());
    assert!(!unit.pages[1].is_completed());
    assert!(started.elapsed() < wait);
    assert_eq!(site.sessions_closed(), 1);
    assert!(!summary.all_succeeded());
}

#[tokio::test(start_paused = true)]
async fn test_skip_policy_keeps_going_past_broken_page() {
    let store = MemoryArtifactStore::new();
    let site = SimulatedSite::builder()
        .pages(3)
        .failing_downloads_on_page(2, u32::MAX)
        .store(store.clone())
        .build();
    let mut config = test_config();
    config.crawl.on_page_failure = PageFailurePolicy::Skip;
    config.timing.max_page_retries = 2;

    let orchestrator = orchestrator(config, &site, &store, ShutdownSignal::never());
    let planned = orchestrator.plan_units(&units(&["2024"]));
    let summary = orchestrator.run_all(&planned, &credentials()).await;

    let unit = &summary.units[0];
    assert_eq!(unit.status, UnitStatus::Completed);
    assert_eq!(unit.visited_count, 3);
    assert_eq!(unit.pages[1].attempts, 2);
    assert_eq!(unit.artifact_count(), 2);

    let stats = collect_statistics(&summary);
    assert_eq!(stats.pages_failed, 1);
    assert_eq!(stats.page_retries, 1);
}

#[tokio::test(start_paused = true)]
async fn test_markdown_report_written_after_run() {
    let store = MemoryArtifactStore::new();
    let site = SimulatedSite::builder().pages(2).store(store.clone()).build();

    let mut summary = crawl(
        test_config(),
        &units(&["2024"]),
        &credentials(),
        Arc::new(site.clone()),
        Arc::new(store.clone()),
        ShutdownSignal::never(),
    )
    .await;
    summary.config_hash = Some("abc123".to_string());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.md");
    write_markdown_report(&summary, &path).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("# Stacks-Crawler Run Report"));
    assert!(content.contains("abc123"));
    assert!(content.contains("## Unit 2024"));
}
