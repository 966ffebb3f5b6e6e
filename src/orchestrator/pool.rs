use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{error, info};

use super::JobRunner;
use crate::error::ConfigError;
use crate::models::{Job, JobResult, RecordingReference};

/// Worker count meaning "use every available core"
pub const ALL_WORKERS: i64 = -1;

/// Number of cores available to this process
pub fn available_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Validate a requested worker count against the available cores
pub fn resolve_workers(n_jobs: i64) -> Result<usize, ConfigError> {
    resolve_workers_with(n_jobs, available_workers())
}

pub fn resolve_workers_with(n_jobs: i64, available: usize) -> Result<usize, ConfigError> {
    match n_jobs {
        ALL_WORKERS => Ok(available),
        n if n >= 1 && n as u64 <= available as u64 => Ok(n as usize),
        _ => Err(ConfigError::InvalidWorkerCount {
            requested: n_jobs,
            available,
        }),
    }
}

/// One job per selected recording
pub fn build_jobs(references: Vec<RecordingReference>, input_root: &Path, output_root: &Path) -> Vec<Job> {
    references
        .into_iter()
        .map(|reference| Job::new(reference, input_root, output_root))
        .collect()
}

/// Run every job on a bounded pool of blocking workers.
///
/// The worker count is checked before anything is dispatched. Each job runs
/// independently; a failing or panicking job yields a failed result and never
/// affects the others. Exactly one result is returned per job.
pub async fn run_batch(
    runner: Arc<JobRunner>,
    jobs: Vec<Job>,
    n_jobs: i64,
) -> Result<Vec<JobResult>, ConfigError> {
    let workers = resolve_workers(n_jobs)?;
    info!("Running {} jobs on {} workers", jobs.len(), workers);

    let semaphore = Arc::new(Semaphore::new(workers));
    let mut handles = Vec::with_capacity(jobs.len());

    for job in jobs {
        let path = job.reference.path.clone();
        let runner = Arc::clone(&runner);
        let semaphore = Arc::clone(&semaphore);

        let handle = tokio::spawn(async move {
            // The semaphore is never closed
            let _permit = semaphore.acquire_owned().await;
            tokio::task::spawn_blocking(move || runner.run(&job)).await
        });
        handles.push((path, handle));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (path, handle) in handles {
        let result = match handle.await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) | Err(err) => lost_job(path, err),
        };
        results.push(result);
    }

    let failures = results.iter().filter(|r| !r.is_success()).count();
    info!(
        "Batch complete: {} succeeded, {} failed",
        results.len() - failures,
        failures
    );
    Ok(results)
}

/// Failed result for a job whose worker panicked or was cancelled
fn lost_job(path: PathBuf, err: JoinError) -> JobResult {
    let trace = if err.is_panic() {
        let panic = err.into_panic();
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        format!("worker panicked: {}", message)
    } else {
        "worker was cancelled".to_string()
    };

    error!("{:?} failed: {}", path, trace);
    JobResult::failure(path, trace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ProtocolValidator, TriggerChannelDecoder};
    use crate::fixtures::{self, MemoryStore};
    use crate::models::{Recording, RecordingKind};
    use crate::stages::{AnnotateEvents, BadChannelStage, Stage, StagePipeline};
    use anyhow::{bail, Result};

    /// Fails (or panics) on one run index
    struct Trap {
        run_index: u32,
        panic: bool,
    }

    impl Stage for Trap {
        fn name(&self) -> &str {
            "trap"
        }

        fn apply(&self, recording: &mut Recording) -> Result<Option<serde_json::Value>> {
            if recording.reference.run_index == self.run_index {
                if self.panic {
                    panic!("trap sprung on run {}", self.run_index);
                }
                bail!("trap sprung on run {}", self.run_index);
            }
            Ok(None)
        }
    }

    fn jobs(k: u32) -> Vec<Job> {
        (1..=k)
            .map(|run| fixtures::job(RecordingKind::Neurofeedback, run))
            .collect()
    }

    fn runner(jobs: &[Job], trap: Option<Trap>) -> Arc<JobRunner> {
        let store = Arc::new(MemoryStore::with_jobs(jobs, |j| {
            fixtures::markers(j.reference.kind)
        }));
        let mut pipeline = StagePipeline::new()
            .with_stage(AnnotateEvents::default())
            .with_stage(BadChannelStage::default());
        if let Some(trap) = trap {
            pipeline.push(Box::new(trap));
        }
        Arc::new(JobRunner::new(
            store,
            Arc::new(TriggerChannelDecoder),
            ProtocolValidator::default(),
            pipeline,
        ))
    }

    #[test]
    fn test_resolve_workers() {
        assert_eq!(resolve_workers_with(-1, 8).unwrap(), 8);
        assert_eq!(resolve_workers_with(1, 8).unwrap(), 1);
        assert_eq!(resolve_workers_with(8, 8).unwrap(), 8);

        for bad in [0, -2, 9] {
            assert!(matches!(
                resolve_workers_with(bad, 8),
                Err(ConfigError::InvalidWorkerCount { requested, available: 8 }) if requested == bad
            ));
        }
    }

    #[tokio::test]
    async fn test_invalid_worker_count_dispatches_nothing() {
        let jobs = jobs(2);
        let too_many = available_workers() as i64 + 1;

        let err = run_batch(runner(&jobs, None), jobs, too_many).await.unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWorkerCount { .. }));
    }

    #[tokio::test]
    async fn test_one_result_per_job() {
        let jobs = jobs(6);
        let results = run_batch(runner(&jobs, None), jobs.clone(), ALL_WORKERS)
            .await
            .unwrap();

        assert_eq!(results.len(), 6);
        assert!(results.iter().all(JobResult::is_success));
        let mut paths: Vec<_> = results.iter().map(|r| r.path.clone()).collect();
        paths.sort();
        let mut expected: Vec<_> = jobs.iter().map(|j| j.reference.path.clone()).collect();
        expected.sort();
        assert_eq!(paths, expected);
    }

    #[tokio::test]
    async fn test_failure_isolation() {
        let k = 5;
        let jobs = jobs(k);
        let trap = Trap { run_index: 3, panic: false };

        let with_failure = run_batch(runner(&jobs, Some(trap)), jobs.clone(), 1)
            .await
            .unwrap();
        let clean_jobs: Vec<Job> = jobs
            .iter()
            .filter(|j| j.reference.run_index != 3)
            .cloned()
            .collect();
        let clean = run_batch(runner(&clean_jobs, None), clean_jobs, 1).await.unwrap();

        assert_eq!(with_failure.len(), k as usize);
        let failed: Vec<&JobResult> = with_failure.iter().filter(|r| !r.is_success()).collect();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].error_trace().unwrap().contains("trap sprung on run 3"));

        let succeeded: Vec<JobResult> = with_failure
            .into_iter()
            .filter(JobResult::is_success)
            .collect();
        assert_eq!(succeeded, clean);
    }

    #[tokio::test]
    async fn test_panicking_job_is_a_failed_result() {
        let jobs = jobs(3);
        let trap = Trap { run_index: 2, panic: true };

        let results = run_batch(runner(&jobs, Some(trap)), jobs, 1).await.unwrap();

        assert_eq!(results.len(), 3);
        let failed: Vec<&JobResult> = results.iter().filter(|r| !r.is_success()).collect();
        assert_eq!(failed.len(), 1);
        assert!(failed[0]
            .error_trace()
            .unwrap()
            .contains("worker panicked: trap sprung on run 2"));
    }
}
