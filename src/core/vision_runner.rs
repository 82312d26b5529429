use crate::core::capture_source::VideoSource;
use crate::pipeline::BlurPipeline;
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Feeds frames from one source through the pipeline on a blocking worker.
pub struct VisionRunner {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Result<u64>>,
}

impl VisionRunner {
    /// `on_frame` sees the pipeline after every processed frame; returning `false` ends the loop.
    /// `idle` is how long to wait when the source has no frame ready.
    pub fn spawn<F>(
        source: Arc<dyn VideoSource>,
        mut pipeline: BlurPipeline,
        idle: Duration,
        mut on_frame: F,
    ) -> Self
    where
        F: FnMut(&BlurPipeline) -> bool + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let handle = tokio::task::spawn_blocking(move || -> Result<u64> {
            info!("👁️ Vision runner started on '{}'", source.name());
            let start_time = Instant::now();
            let mut processed = 0u64;
            while !stop_flag.load(Ordering::Relaxed) {
                let frame = source
                    .grab_frame()
                    .with_context(|| format!("Failed to read frame from camera '{}'", source.name()))?;
                let Some(frame) = frame else {
                    debug!("No frame from '{}', waiting {:?}", source.name(), idle);
                    std::thread::sleep(idle);
                    continue;
                };
                pipeline.process(&frame).context("Pipeline processing failed")?;
                processed += 1;
                if !on_frame(&pipeline) {
                    break;
                }
            }
            info!(
                "🏁 Vision runner on '{}' processed {} frames in {:?}",
                source.name(),
                processed,
                start_time.elapsed()
            );
            Ok(processed)
        });
        VisionRunner { stop, handle }
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Waits for the worker and returns how many frames it processed.
    ///
    /// Dropping this future before it resolves leaves the worker running, so it
    /// can be raced against other events. Once it has resolved it must not be awaited again.
    async fn wait(&mut self) -> Result<u64> {
        match (&mut self.handle).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Vision runner task did not finish cleanly: {}", e);
                Err(e).context("Vision runner task panicked or was cancelled")
            }
        }
    }

    pub async fn join(mut self) -> Result<u64> {
        self.wait().await
    }

    /// Runs until `shutdown` resolves, then stops the worker and waits for it.
    /// If the worker ends first (an error, or the callback declining) that result
    /// is returned straight away.
    pub async fn run_until<S>(mut self, shutdown: S) -> Result<u64>
    where
        S: Future<Output = ()>,
    {
        let finished_early = tokio::select! {
            _ = shutdown => None,
            result = self.wait() => Some(result),
        };
        match finished_early {
            Some(Err(e)) => {
                error!("❌ Vision runner stopped on its own: {:#}", e);
                Err(e)
            }
            Some(Ok(frames)) => {
                warn!("⚠️ Vision runner finished before shutdown after {} frames", frames);
                Ok(frames)
            }
            None => {
                self.stop();
                self.wait().await
            }
        }
    }
}
