//! End-to-end runs of the orchestrator against in-process collaborators.

mod common;

use common::{wait_for_status, FakeImages, FakeVoices, GatedRepository, Harness};
use reel_models::{JobParams, JobStatus};
use reel_store::JobRepository;
use reel_worker::{Collaborators, JobOrchestrator, PipelineError};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn history_of_ai() -> JobParams {
    JobParams::new("history of AI", 30)
}

#[tokio::test]
async fn test_thirty_second_job_matches_measured_narration() {
    let harness = Harness::new(FakeImages::default());
    let orchestrator = harness.orchestrator();

    let id = orchestrator.submit("user-1", history_of_ai()).await.unwrap();
    let view = orchestrator.wait(&id).await.unwrap();

    assert_eq!(view.status, JobStatus::Completed, "{:?}", view.error_detail);
    assert_eq!(view.progress, 100);
    let output = view.output_path.clone().unwrap();
    assert_eq!(output, harness.output_path(&id));
    assert!(output.exists());

    let job = orchestrator.job(&id).await.unwrap();
    assert_eq!(job.segments.len(), 6);
    assert!(job.segments.iter().enumerate().all(|(i, s)| s.index == i));
    let total: f64 = job.segments.iter().map(|s| s.duration).sum();
    assert!((total - 28.4).abs() <= 0.1, "durations sum to {}", total);
    assert!(job.segments.iter().all(|s| s.duration >= 2.0));
    assert_eq!(job.narration_duration, Some(28.4));
    assert!(job.scene_context.as_ref().is_some_and(|c| !c.is_fallback));

    let final_secs = harness.encoder.durations.lock().unwrap()[&output];
    assert!((final_secs - 28.4).abs() <= 0.1, "output is {}s", final_secs);

    let order: Vec<String> = harness
        .encoder
        .concat_order
        .lock()
        .unwrap()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    let expected: Vec<String> = (0..6).map(|i| format!("clip_{:03}.mp4", i)).collect();
    assert_eq!(order, expected);

    let subtitles = harness.encoder.subtitles.lock().unwrap().clone().unwrap();
    let last = subtitles.lines().filter(|l| l.starts_with("Dialogue:")).last().unwrap();
    let end = reel_media::subtitles::format_ass_timestamp(total);
    assert!(last.contains(&format!(",{},Default", end)), "{}", last);

    orchestrator.cleanup_job(&id, true).await.unwrap();
    assert!(!harness.config().job_dir(&id).exists());
    assert!(output.exists());
}

#[tokio::test]
async fn test_two_subjects_are_separated_before_image_requests() {
    let harness = Harness::new(FakeImages::default());
    let orchestrator = harness.orchestrator();

    let id = orchestrator.submit("user-1", history_of_ai()).await.unwrap();
    assert_eq!(orchestrator.wait(&id).await.unwrap().status, JobStatus::Completed);

    let job = orchestrator.job(&id).await.unwrap();
    assert!(job.segments[3]
        .visual
        .contains("two different people: one is President A, another is President B"));

    let prompts = harness.images.prompts.lock().unwrap();
    assert!(prompts.iter().any(|p| p.contains("two different people")));
    assert!(!prompts.iter().any(|p| p.contains("President A and President B")));
}

#[tokio::test]
async fn test_near_duplicates_share_one_image() {
    let harness = Harness::new(FakeImages::default());
    let orchestrator = harness.orchestrator();

    let id = orchestrator.submit("user-1", history_of_ai()).await.unwrap();
    assert_eq!(orchestrator.wait(&id).await.unwrap().status, JobStatus::Completed);

    let job = orchestrator.job(&id).await.unwrap();
    assert_eq!(job.segments[2].visual, job.segments[1].visual);
    assert_eq!(job.segments[2].tags.reuses, Some(1));
    assert_eq!(job.segments[2].image_path, job.segments[1].image_path);
    assert!(job.segments[2].text.starts_with("Moreover, "));
    assert_eq!(harness.images.calls(), 5);
    assert_eq!(harness.voices.calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_image_retried_within_budget_completes() {
    let images = FakeImages::default();
    images.failures.store(2, Ordering::SeqCst);
    let harness = Harness::new(images);
    let orchestrator = harness.orchestrator();

    let id = orchestrator.submit("user-1", history_of_ai()).await.unwrap();
    let view = orchestrator.wait(&id).await.unwrap();

    assert_eq!(view.status, JobStatus::Completed, "{:?}", view.error_detail);
    assert_eq!(harness.images.calls(), 7);
}

#[tokio::test]
async fn test_exhausted_image_budget_fails_without_output() {
    let harness = Harness::new(FakeImages {
        always_fail: true,
        ..FakeImages::default()
    });
    let orchestrator = harness.orchestrator();

    let id = orchestrator.submit("user-1", history_of_ai()).await.unwrap();
    let view = orchestrator.wait(&id).await.unwrap();

    assert_eq!(view.status, JobStatus::Failed);
    let detail = view.error_detail.unwrap();
    assert!(detail.starts_with("generation_failed: "), "{}", detail);
    assert!(view.output_path.is_none());
    assert!(!harness.output_path(&id).exists());

    let job = orchestrator.job(&id).await.unwrap();
    assert_eq!(job.failure.unwrap().failed_in, JobStatus::AssetGeneration);
}

#[tokio::test]
async fn test_cancel_during_asset_generation_stops_collaborator_calls() {
    let harness = Harness::new(FakeImages {
        delay: Duration::from_millis(300),
        ..FakeImages::default()
    });
    let orchestrator = harness.orchestrator();

    let id = orchestrator.submit("user-1", history_of_ai()).await.unwrap();
    wait_for_status(&orchestrator, &id, JobStatus::AssetGeneration).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(orchestrator.cancel(&id).await.unwrap());
    let view = orchestrator.wait(&id).await.unwrap();
    assert_eq!(view.status, JobStatus::Cancelled);
    assert!(view.output_path.is_none());
    assert!(!harness.output_path(&id).exists());

    let calls = harness.images.calls();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(harness.images.calls(), calls);
    assert!(!orchestrator.cancel(&id).await.unwrap());
}

#[tokio::test]
async fn test_detached_submission_runs_to_completion() {
    let harness = Harness::new(FakeImages::default());
    let orchestrator = harness.orchestrator();

    let _ = orchestrator
        .submit("detached", history_of_ai())
        .await
        .unwrap();

    let completed = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let jobs = orchestrator.list_jobs(Some("detached")).await.unwrap();
            if jobs.iter().any(|j| j.status == JobStatus::Completed) {
                return jobs;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(completed.len(), 1);
    assert!(completed[0].output_path.as_ref().is_some_and(|p| p.exists()));
}

#[tokio::test]
async fn test_interrupted_job_resumes_at_persisted_stage() {
    let harness = Harness::new(FakeImages {
        delay: Duration::from_millis(300),
        ..FakeImages::default()
    });
    let first = harness.orchestrator();

    let id = first.submit("user-1", history_of_ai()).await.unwrap();
    wait_for_status(&first, &id, JobStatus::AssetGeneration).await;
    first.shutdown().await;

    let stored = first.job(&id).await.unwrap();
    assert_eq!(stored.status, JobStatus::AssetGeneration);
    assert_eq!(stored.segments.len(), 6);

    let second = JobOrchestrator::new(
        harness.config(),
        harness.repo.clone(),
        Collaborators {
            text: harness.text.clone(),
            images: Arc::new(FakeImages::default()),
            voices: Arc::new(FakeVoices::new(4.7)),
            encoder: harness.encoder.clone(),
        },
    );
    assert_eq!(second.resume_interrupted().await.unwrap(), vec![id.clone()]);
    let view = second.wait(&id).await.unwrap();

    assert_eq!(view.status, JobStatus::Completed, "{:?}", view.error_detail);
    assert_eq!(harness.text.script_calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.text.scene_calls.load(Ordering::SeqCst), 1);
    assert!(!second.resume(&id).await.unwrap());
}

#[tokio::test]
async fn test_scene_analysis_failure_falls_back() {
    let mut harness = Harness::new(FakeImages::default());
    Arc::get_mut(&mut harness.text).unwrap().scene = None;
    let orchestrator = harness.orchestrator();

    let id = orchestrator.submit("user-1", history_of_ai()).await.unwrap();
    assert_eq!(orchestrator.wait(&id).await.unwrap().status, JobStatus::Completed);

    let job = orchestrator.job(&id).await.unwrap();
    let context = job.scene_context.unwrap();
    assert!(context.is_fallback);
    assert_eq!(context.era, "contemporary");
}

#[tokio::test]
async fn test_disabled_subtitles_are_not_burned_in() {
    let harness = Harness::new(FakeImages::default());
    let orchestrator = harness.orchestrator();
    let mut params = history_of_ai();
    params.subtitle_style = reel_models::SubtitleStyle::None;

    let id = orchestrator.submit("user-1", params).await.unwrap();
    let view = orchestrator.wait(&id).await.unwrap();

    assert_eq!(view.status, JobStatus::Completed, "{:?}", view.error_detail);
    assert!(harness.encoder.subtitles.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_invalid_request_is_rejected() {
    let harness = Harness::new(FakeImages::default());
    let orchestrator = harness.orchestrator();

    let result = orchestrator.submit("user-1", JobParams::new("AI", 30)).await;
    assert!(matches!(result, Err(PipelineError::InvalidRequest(_))));
    assert!(orchestrator.list_jobs(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cleanup_rejects_running_job() {
    let harness = Harness::new(FakeImages {
        delay: Duration::from_millis(200),
        ..FakeImages::default()
    });
    let orchestrator = harness.orchestrator();

    let id = orchestrator.submit("user-1", history_of_ai()).await.unwrap();
    wait_for_status(&orchestrator, &id, JobStatus::AssetGeneration).await;
    assert!(matches!(
        orchestrator.cleanup_job(&id, false).await,
        Err(PipelineError::InvalidRequest(_))
    ));
    orchestrator.cancel(&id).await.unwrap();
    orchestrator.wait(&id).await.unwrap();
}

#[tokio::test]
async fn test_cancel_racing_final_save_keeps_completed_job() {
    let harness = Harness::new(FakeImages::default());
    let repo = Arc::new(GatedRepository::new(harness.repo.clone()));
    let orchestrator = harness.orchestrator_with(repo.clone());

    let id = orchestrator.submit("user-1", history_of_ai()).await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), repo.reached.notified())
        .await
        .unwrap();
    assert_eq!(harness.repo.load(&id).await.unwrap().unwrap().status, JobStatus::Assembly);

    assert!(orchestrator.cancel(&id).await.unwrap());
    let view = orchestrator.wait(&id).await.unwrap();

    assert_eq!(view.status, JobStatus::Completed);
    let stored = harness.repo.load(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.progress, 100);
    assert!(stored.output_path.is_some_and(|p| p.exists()));
}
