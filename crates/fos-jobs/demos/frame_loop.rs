//! Frame loop demo
//!
//! Simulates an engine main loop: each frame runs a data-parallel particle
//! update, then a worker builds a frame summary and hands it to the main
//! thread, which "presents" it while draining the dispatch queue.
//!
//! Run with `RUST_LOG=fos_jobs=debug cargo run --example frame_loop`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use fos_jobs::{BatchRange, JobPriority, JobSystem, JobSystemConfig, SubmitParams};
use tracing_subscriber::EnvFilter;

const PARTICLES: usize = 10_000;
const GROUP_SIZE: usize = 512;
const FRAMES: u32 = 120;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let jobs = Arc::new(JobSystem::new(
        JobSystemConfig::default().with_thread_name_prefix("demo-job"),
    )?);

    let positions = Arc::new(Mutex::new(vec![0.0f32; PARTICLES]));
    let updated = Arc::new(AtomicU64::new(0));
    // Only ever touched on the main thread.
    let presented = Arc::new(Mutex::new(Vec::with_capacity(FRAMES as usize)));

    for frame in 0..FRAMES {
        let counter = jobs.create_counter();

        let pos = Arc::clone(&positions);
        let count = Arc::clone(&updated);
        jobs.submit_batch(
            Some(&counter),
            PARTICLES,
            GROUP_SIZE,
            move |range: BatchRange| -> anyhow::Result<()> {
                let local: Vec<f32> = range
                    .range()
                    .map(|i| (i as f32 * 0.001 + frame as f32 * 0.016).sin())
                    .collect();
                let mut pos = pos
                    .lock()
                    .map_err(|_| anyhow::anyhow!("particle buffer poisoned"))?;
                pos[range.range()].copy_from_slice(&local);
                count.fetch_add(range.len as u64, Ordering::Relaxed);
                Ok(())
            },
            SubmitParams::priority(JobPriority::High).named("particles"),
        )?;
        jobs.wait(&counter);

        let summary = jobs.create_counter();
        let system = Arc::clone(&jobs);
        let pos = Arc::clone(&positions);
        let frames = Arc::clone(&presented);
        jobs.submit_job(
            Some(&summary),
            move || -> anyhow::Result<()> {
                let energy: f32 = pos
                    .lock()
                    .map_err(|_| anyhow::anyhow!("particle buffer poisoned"))?
                    .iter()
                    .map(|p| p * p)
                    .sum();
                system.execute_in_main_thread(move || {
                    if let Ok(mut frames) = frames.lock() {
                        frames.push((frame, energy));
                    }
                });
                Ok(())
            },
            SubmitParams::priority(JobPriority::Low).named("frame-summary"),
        )?;
        jobs.wait(&summary);

        let report = jobs.process_main_thread_queue();
        if report.failed > 0 {
            tracing::warn!("Frame {}: {} main-thread actions failed", frame, report.failed);
        }

        jobs.update();
    }

    for failure in jobs.take_failures() {
        tracing::error!("{}: {}", failure.name, failure.message);
    }

    let stats = jobs.stats();
    let frames = presented
        .lock()
        .map_err(|_| anyhow::anyhow!("frame list poisoned"))?
        .len();
    tracing::info!(
        "{} frames presented, {} particle updates, {} jobs executed on {} workers",
        frames,
        updated.load(Ordering::Relaxed),
        stats.executed,
        stats.worker_count
    );

    Ok(())
}
