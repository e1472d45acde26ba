//! Scheduler wiring for the three periodic jobs.
//!
//! The main per-user loop and the deferred-send sweep run on fixed
//! intervals; reflection runs on a cron expression. All three cadences come
//! from configuration.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::engine::ProactiveEngine;
use crate::error::{NudgeError, NudgeResult};

/// Owns the job scheduler and the engine it drives.
pub struct EngineScheduler {
    scheduler: JobScheduler,
    engine: Arc<ProactiveEngine>,
    running: RwLock<bool>,
}

impl EngineScheduler {
    /// Create a scheduler around an engine.
    pub async fn new(engine: Arc<ProactiveEngine>) -> NudgeResult<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| NudgeError::Scheduler(format!("failed to create scheduler: {}", e)))?;
        Ok(Self {
            scheduler,
            engine,
            running: RwLock::new(false),
        })
    }

    /// Register the three jobs and start ticking.
    pub async fn start(&self) -> NudgeResult<()> {
        let mut running = self.running.write().await;
        if *running {
            return Ok(());
        }

        let config = self.engine.config().clone();
        config.validate()?;

        let engine = self.engine.clone();
        let loop_job = Job::new_repeated_async(
            Duration::from_secs(config.loop_interval_secs),
            move |_uuid, _lock| {
                let engine = engine.clone();
                Box::pin(async move {
                    if let Err(e) = engine.run_loop_tick().await {
                        error!(error = %e, "loop tick failed");
                    }
                })
            },
        )
        .map_err(|e| NudgeError::Scheduler(format!("failed to create loop job: {}", e)))?;

        let engine = self.engine.clone();
        let sweep_job = Job::new_repeated_async(
            Duration::from_secs(config.deferred_sweep_secs),
            move |_uuid, _lock| {
                let engine = engine.clone();
                Box::pin(async move {
                    if let Err(e) = engine.run_deferred_sweep().await {
                        error!(error = %e, "deferred sweep failed");
                    }
                })
            },
        )
        .map_err(|e| NudgeError::Scheduler(format!("failed to create sweep job: {}", e)))?;

        let engine = self.engine.clone();
        let reflection_job = Job::new_async(config.reflection_cron.as_str(), move |_uuid, _lock| {
            let engine = engine.clone();
            Box::pin(async move {
                if let Err(e) = engine.run_reflection().await {
                    error!(error = %e, "reflection run failed");
                }
            })
        })
        .map_err(|e| NudgeError::Scheduler(format!("failed to create reflection job: {}", e)))?;

        for job in [loop_job, sweep_job, reflection_job] {
            self.scheduler
                .add(job)
                .await
                .map_err(|e| NudgeError::Scheduler(format!("failed to add job: {}", e)))?;
        }

        self.scheduler
            .start()
            .await
            .map_err(|e| NudgeError::Scheduler(format!("failed to start scheduler: {}", e)))?;
        *running = true;
        info!(
            loop_interval_secs = config.loop_interval_secs,
            sweep_secs = config.deferred_sweep_secs,
            reflection_cron = %config.reflection_cron,
            "engine scheduler started"
        );
        Ok(())
    }

    /// Stop all jobs.
    pub async fn shutdown(&mut self) -> NudgeResult<()> {
        let mut running = self.running.write().await;
        if *running {
            self.scheduler
                .shutdown()
                .await
                .map_err(|e| NudgeError::Scheduler(format!("failed to shutdown: {}", e)))?;
            *running = false;
        }
        Ok(())
    }

    /// Whether the scheduler is ticking.
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}
