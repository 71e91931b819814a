// Download orchestration
//
// One job per request. Jobs are isolated by their generated id alone; the
// only shared state is the storage directory and the cleanup registry.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

use super::engine::MediaEngine;
use super::errors::DownloadError;
use super::id;
use super::instructions::EngineInstructions;
use super::lifecycle::CleanupScheduler;
use super::models::{Delivery, DeliveryMode, JobRequest};
use super::storage::Storage;

/// Lifecycle of a single job.
///
/// `Created → BuildingInstructions → EngineRunning → LocatingArtifact →
/// Ready → ScheduledDelete → Deleted`, with `Failed` reachable from every
/// non-terminal state. `Deleted` is reached once the cleanup timer has fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    BuildingInstructions,
    EngineRunning,
    LocatingArtifact,
    Ready,
    ScheduledDelete,
    Deleted,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deleted | Self::Failed)
    }

    /// Successor on the happy path.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Created => Some(Self::BuildingInstructions),
            Self::BuildingInstructions => Some(Self::EngineRunning),
            Self::EngineRunning => Some(Self::LocatingArtifact),
            Self::LocatingArtifact => Some(Self::Ready),
            Self::Ready => Some(Self::ScheduledDelete),
            Self::ScheduledDelete => Some(Self::Deleted),
            Self::Deleted | Self::Failed => None,
        }
    }

    pub fn can_transition_to(&self, to: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Self::Failed || self.next() == Some(to)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::BuildingInstructions => "building_instructions",
            Self::EngineRunning => "engine_running",
            Self::LocatingArtifact => "locating_artifact",
            Self::Ready => "ready",
            Self::ScheduledDelete => "scheduled_delete",
            Self::Deleted => "deleted",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// States of jobs that have not reached a terminal state yet.
type JobTable = Arc<Mutex<HashMap<String, JobState>>>;

fn lock_jobs(table: &JobTable) -> MutexGuard<'_, HashMap<String, JobState>> {
    table.lock().unwrap_or_else(|e| e.into_inner())
}

struct Job {
    id: String,
    mode: DeliveryMode,
    state: JobState,
    table: JobTable,
}

impl Job {
    fn new(mode: DeliveryMode, table: JobTable) -> Self {
        let id = id::new_id();
        lock_jobs(&table).insert(id.clone(), JobState::Created);
        Self {
            id,
            mode,
            state: JobState::Created,
            table,
        }
    }

    fn advance(&mut self, to: JobState) {
        debug_assert!(
            self.state.can_transition_to(to),
            "illegal job transition {} -> {}",
            self.state,
            to
        );
        debug!(from = %self.state, to = %to, "job state");
        self.state = to;

        let mut jobs = lock_jobs(&self.table);
        if to.is_terminal() {
            jobs.remove(&self.id);
        } else {
            jobs.insert(self.id.clone(), to);
        }
    }
}

/// Pick the job's artifact given the path the engine reported.
///
/// The reported file must exist under the job prefix, and it must be the only
/// entry there; leftovers from intermediate steps make the result ambiguous.
pub fn locate_artifact(
    storage: &Storage,
    job_id: &str,
    reported: &Path,
) -> Result<PathBuf, DownloadError> {
    let mut candidates = storage.job_entries(job_id)?;
    let reported_name = reported.file_name();

    let Some(position) = candidates
        .iter()
        .position(|c| c.file_name() == reported_name && c.is_file())
    else {
        return Err(DownloadError::ArtifactNotFound {
            job_id: job_id.to_string(),
        });
    };

    if candidates.len() > 1 {
        return Err(DownloadError::AmbiguousArtifact {
            job_id: job_id.to_string(),
            candidates,
        });
    }

    Ok(candidates.swap_remove(position))
}

/// Runs download jobs against an engine inside one storage directory.
#[derive(Clone)]
pub struct Downloader {
    engine: Arc<dyn MediaEngine>,
    storage: Storage,
    cleanup: CleanupScheduler,
    permits: Arc<Semaphore>,
    jobs: JobTable,
}

impl Downloader {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        storage: Storage,
        cleanup: CleanupScheduler,
        max_concurrent_jobs: usize,
    ) -> Self {
        Self {
            engine,
            storage,
            cleanup,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn cleanup(&self) -> &CleanupScheduler {
        &self.cleanup
    }

    /// Current state of a job, or `None` once it is deleted or failed.
    pub fn job_state(&self, job_id: &str) -> Option<JobState> {
        lock_jobs(&self.jobs).get(job_id).copied()
    }

    /// Jobs not yet deleted or failed.
    pub fn active_jobs(&self) -> usize {
        lock_jobs(&self.jobs).len()
    }

    /// Run one job to completion.
    ///
    /// The job runs on its own task: dropping the returned future does not
    /// stop it, and a finished artifact is still scheduled for deletion.
    pub async fn download(&self, request: JobRequest) -> Result<Delivery, DownloadError> {
        let job = Job::new(request.mode, Arc::clone(&self.jobs));
        let job_id = job.id.clone();
        let span = info_span!("job", job_id = %job.id, mode = %job.mode);
        let this = self.clone();

        match tokio::spawn(async move { this.run(job, request).await }.instrument(span)).await {
            Ok(result) => result,
            Err(e) => {
                lock_jobs(&self.jobs).remove(&job_id);
                let purged = self.storage.purge_job(&job_id);
                warn!(job_id = %job_id, error = %e, purged, "job task aborted");
                Err(DownloadError::TaskFailed(e.to_string()))
            }
        }
    }

    async fn run(&self, mut job: Job, request: JobRequest) -> Result<Delivery, DownloadError> {
        info!(url = %request.source_url, format_id = ?request.format_id, "job started");

        match self.drive(&mut job, &request).await {
            Ok((delivery, deletion)) => {
                info!(path = %delivery.path.display(), "job ready");
                tokio::spawn(
                    async move {
                        let removed = deletion.await.unwrap_or(false);
                        job.advance(JobState::Deleted);
                        debug!(removed, "artifact deleted");
                    }
                    .in_current_span(),
                );
                Ok(delivery)
            }
            Err(e) => {
                job.advance(JobState::Failed);
                let purged = self.storage.purge_job(&job.id);
                warn!(error = %e, purged, "job failed");
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        job: &mut Job,
        request: &JobRequest,
    ) -> Result<(Delivery, JoinHandle<bool>), DownloadError> {
        job.advance(JobState::BuildingInstructions);
        let instructions = EngineInstructions::for_job(
            job.mode,
            request.format_id.as_deref(),
            &self.storage,
            &job.id,
        )?;

        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| DownloadError::TaskFailed(e.to_string()))?;
        job.advance(JobState::EngineRunning);
        let reported = self
            .engine
            .download(&request.source_url, &instructions)
            .await
            .map_err(DownloadError::Engine)?;
        drop(permit);

        job.advance(JobState::LocatingArtifact);
        if reported != instructions.expected_path {
            debug!(
                expected = %instructions.expected_path.display(),
                reported = %reported.display(),
                "engine chose a different output path"
            );
        }
        let path = locate_artifact(&self.storage, &job.id, &reported)?;

        job.advance(JobState::Ready);
        let delivery = Delivery {
            job_id: job.id.clone(),
            path: path.clone(),
            file_name: job.mode.delivery_name(&job.id),
            content_type: job.mode.content_type(),
        };

        let deletion = self.cleanup.schedule(path);
        job.advance(JobState::ScheduledDelete);
        Ok((delivery, deletion))
    }
}
