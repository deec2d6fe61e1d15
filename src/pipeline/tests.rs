use super::*;
use crate::testing::{FakeApi, settle};
use std::sync::atomic::{AtomicUsize, Ordering};

const SETTLE: Duration = Duration::from_millis(1000);

fn runner() -> (Arc<FakeApi>, PipelineRunner) {
    let api = FakeApi::new();
    let runner = PipelineRunner::new(api.clone(), SETTLE);
    (api, runner)
}

#[test]
fn progress_uses_four_step_denominator() {
    let percents: Vec<u8> = PROGRESS_ORDER.iter().map(|s| s.progress_percent()).collect();
    assert_eq!(percents, vec![0, 25, 50, 75, 100]);
    assert_eq!(Stage::Error.progress_percent(), 0);
}

#[test]
fn stage_texts() {
    let labels: Vec<&str> = STEPS.iter().map(|s| s.step_label()).collect();
    assert_eq!(labels, vec!["Scrape", "Index", "Ingest"]);
    assert_eq!(Stage::CreateIndex.busy_text(), "Creating Index...");
    assert_eq!(Stage::Ingest.status_text(), Some("Ingesting Content"));
    assert_eq!(Stage::Done.status_text(), Some("Complete"));
    assert_eq!(Stage::Idle.status_text(), None);
}

#[test]
fn step_markers_follow_stage() {
    let mut state = PipelineState::default();
    let markers = |state: &PipelineState| -> Vec<String> {
        STEPS.iter().map(|s| state.step_marker(*s).symbol()).collect()
    };
    assert_eq!(markers(&state), vec!["1", "2", "3"]);

    state.apply(PipelineEvent::StageStarted(Stage::CreateIndex));
    assert_eq!(state.step_marker(Stage::CreateIndex), StepMarker::Active);
    assert_eq!(markers(&state), vec!["✓", "•", "3"]);

    state.apply(PipelineEvent::StageFailed {
        stage: Stage::CreateIndex,
        message: "boom".into(),
    });
    assert_eq!(markers(&state), vec!["✓", "!", "3"]);
    assert_eq!(state.error(), Some("boom"));

    state.apply(PipelineEvent::Completed);
    assert_eq!(markers(&state), vec!["✓", "✓", "✓"]);
    assert_eq!(state.progress_text(), "Redirecting...");

    state.reset();
    assert_eq!(state.stage(), Stage::Idle);
    assert!(state.error().is_none());
    assert!(!state.has_progress());
}

#[tokio::test(start_paused = true)]
async fn successful_run_visits_every_stage_then_navigates_once() {
    let (api, runner) = runner();
    let mut seen = Vec::new();
    let navigations = AtomicUsize::new(0);

    let outcome = runner
        .run(
            |stage| seen.push(stage),
            |target| {
                assert_eq!(target, Navigate::Results);
                navigations.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await;

    assert_eq!(outcome, Some(RunOutcome::Completed));
    assert_eq!(
        seen,
        vec![Stage::Scrape, Stage::CreateIndex, Stage::Ingest, Stage::Done]
    );
    assert_eq!(api.calls(), vec!["scrape", "create-index", "ingest-latest"]);
    assert_eq!(navigations.load(Ordering::SeqCst), 1);

    let state = runner.state();
    assert_eq!(state.stage(), Stage::Done);
    assert_eq!(state.progress_percent(), 100);
    assert!(!state.is_running());
}

#[tokio::test(start_paused = true)]
async fn navigation_waits_for_settle_delay() {
    let (api, runner) = runner();
    let navigated = Arc::new(AtomicUsize::new(0));

    let running = tokio::spawn({
        let runner = runner.clone();
        let navigated = navigated.clone();
        async move {
            runner
                .run(|_| {}, move |_| {
                    navigated.fetch_add(1, Ordering::SeqCst);
                })
                .await
        }
    });
    settle(&api, 3).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert_eq!(runner.state().stage(), Stage::Done);
    assert!(runner.state().is_running());
    assert_eq!(runner.state().button_text(), "Done");
    assert_eq!(navigated.load(Ordering::SeqCst), 0);

    tokio::time::advance(Duration::from_millis(999)).await;
    tokio::task::yield_now().await;
    assert_eq!(navigated.load(Ordering::SeqCst), 0);

    tokio::time::advance(Duration::from_millis(1)).await;
    assert_eq!(running.await.unwrap(), Some(RunOutcome::Completed));
    assert_eq!(navigated.load(Ordering::SeqCst), 1);
    assert_eq!(runner.state().button_text(), "Start Analysis");
}

#[tokio::test(start_paused = true)]
async fn failing_create_index_stops_before_ingest() {
    let (api, runner) = runner();
    api.fail("create-index");
    let mut seen = Vec::new();
    let navigations = AtomicUsize::new(0);

    let outcome = runner
        .run(
            |stage| seen.push(stage),
            |_| {
                navigations.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await;

    assert_eq!(
        outcome,
        Some(RunOutcome::Failed {
            stage: Stage::CreateIndex,
            message: "Request failed: 500 (Server error)".into(),
        })
    );
    assert_eq!(seen, vec![Stage::Scrape, Stage::CreateIndex, Stage::Error]);
    assert_eq!(api.calls(), vec!["scrape", "create-index"]);
    assert_eq!(navigations.load(Ordering::SeqCst), 0);

    let state = runner.state();
    assert_eq!(state.stage(), Stage::Error);
    assert_eq!(state.progress_percent(), 0);
    assert_eq!(state.step_marker(Stage::CreateIndex), StepMarker::Failed);
    assert!(state.has_progress());
    assert!(!state.is_running());
}

#[tokio::test(start_paused = true)]
async fn failed_scrape_skips_the_rest() {
    let (api, runner) = runner();
    api.fail("scrape");
    let outcome = runner.run(|_| {}, |_| {}).await;
    assert!(matches!(outcome, Some(RunOutcome::Failed { stage: Stage::Scrape, .. })));
    assert_eq!(api.calls(), vec!["scrape"]);
}

#[tokio::test(start_paused = true)]
async fn rerun_after_error_starts_from_scrape() {
    let (api, runner) = runner();
    api.fail("ingest-latest");
    runner.run(|_| {}, |_| {}).await;
    assert_eq!(runner.state().stage(), Stage::Error);

    api.recover("ingest-latest");
    let mut seen = Vec::new();
    let outcome = runner.run(|stage| seen.push(stage), |_| {}).await;
    assert_eq!(outcome, Some(RunOutcome::Completed));
    assert_eq!(seen[0], Stage::Scrape);
    assert_eq!(
        api.calls(),
        vec![
            "scrape",
            "create-index",
            "ingest-latest",
            "scrape",
            "create-index",
            "ingest-latest"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn second_run_while_running_is_a_no_op() {
    let (api, runner) = runner();
    let gate = api.hold();

    let running = tokio::spawn({
        let runner = runner.clone();
        async move { runner.run(|_| {}, |_| {}).await }
    });
    settle(&api, 1).await;
    assert_eq!(runner.state().stage(), Stage::Scrape);
    assert_eq!(runner.state().button_text(), "Scraping...");

    assert_eq!(runner.run(|_| {}, |_| {}).await, None);
    runner.state().reset();
    assert_eq!(runner.state().stage(), Stage::Scrape);

    for _ in 0..3 {
        gate.notify_one();
        tokio::task::yield_now().await;
    }
    assert_eq!(running.await.unwrap(), Some(RunOutcome::Completed));
    assert_eq!(api.calls(), vec!["scrape", "create-index", "ingest-latest"]);
}

#[tokio::test(start_paused = true)]
async fn disposed_run_stops_and_never_navigates() {
    let (api, runner) = runner();
    let _gate = api.hold();
    let navigated = Arc::new(AtomicUsize::new(0));

    let running = tokio::spawn({
        let runner = runner.clone();
        let navigated = navigated.clone();
        async move {
            runner
                .run(|_| {}, move |_| {
                    navigated.fetch_add(1, Ordering::SeqCst);
                })
                .await
        }
    });
    settle(&api, 1).await;
    runner.dispose();

    assert_eq!(running.await.unwrap(), Some(RunOutcome::Cancelled));
    assert_eq!(api.calls(), vec!["scrape"]);
    assert_eq!(navigated.load(Ordering::SeqCst), 0);
    assert!(!runner.state().is_running());
}
