//! Worker queue and processing-timeout behavior

mod common;

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use common::{orchestrator, source_image, MockRuntime};
use stylize_worker::engine::orchestrator::GenerationJob;
use stylize_worker::engine::traits::EngineId;
use stylize_worker::error::AppError;
use stylize_worker::pipeline::worker::GenerationWorker;

fn job(image: std::path::PathBuf) -> GenerationJob {
    GenerationJob {
        source_image: image,
        prompt: "a portrait".to_string(),
        style_key: "cinematic".to_string(),
        engine: EngineId::PrimaryIdentity,
    }
}

#[tokio::test]
async fn submitted_job_completes_and_updates_status() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = MockRuntime::new();
    let worker = GenerationWorker::spawn(
        orchestrator(runtime.clone(), dir.path()),
        Duration::from_secs(5),
    );

    assert!(!worker.status().engine_loaded);

    let outcome = worker.submit(job(source_image(dir.path()))).await.unwrap();
    assert!(!outcome.image.is_empty());
    assert!(worker.status().engine_loaded);
}

#[tokio::test]
async fn slow_job_times_out_without_waiting_for_completion() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = MockRuntime::new();
    runtime.generate_delay_ms.store(2_000, Ordering::SeqCst);
    let worker = GenerationWorker::spawn(
        orchestrator(runtime.clone(), dir.path()),
        Duration::from_millis(100),
    );

    let started = Instant::now();
    let err = worker
        .submit(job(source_image(dir.path())))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ProcessingTimeout(_)));
    // The caller is released at the deadline, not when the job finishes
    assert!(started.elapsed() < Duration::from_millis(1_000));
}

#[tokio::test]
async fn abandoned_job_leaves_device_state_cached() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = MockRuntime::new();
    runtime.generate_delay_ms.store(300, Ordering::SeqCst);
    let worker = GenerationWorker::spawn(
        orchestrator(runtime.clone(), dir.path()),
        Duration::from_millis(100),
    );

    let err = worker
        .submit(job(source_image(dir.path())))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ProcessingTimeout(_)));

    // Let the abandoned job run to completion in the background
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(runtime.loaded_engine(), Some(EngineId::PrimaryIdentity));
    assert_eq!(runtime.generate_calls.load(Ordering::SeqCst), 1);

    // The next request reuses the resident engine instead of reloading
    runtime.generate_delay_ms.store(0, Ordering::SeqCst);
    worker.submit(job(source_image(dir.path()))).await.unwrap();
    assert_eq!(runtime.load_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn queued_jobs_run_in_arrival_order() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = MockRuntime::new();
    runtime.generate_delay_ms.store(50, Ordering::SeqCst);
    let worker = std::sync::Arc::new(GenerationWorker::spawn(
        orchestrator(runtime.clone(), dir.path()),
        Duration::from_secs(5),
    ));

    let mut handles = Vec::new();
    for _ in 0..3 {
        let worker = worker.clone();
        let image = source_image(dir.path());
        handles.push(tokio::spawn(async move { worker.submit(job(image)).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(runtime.generate_calls.load(Ordering::SeqCst), 3);
}
