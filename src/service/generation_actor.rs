use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::GenerationConfig;
use crate::error::NexusError;
use crate::llm::AiProvider;
use crate::notation::MathNormalizer;
use crate::service::generation_pipeline::{GenerationJob, spawn_pipeline};
use crate::service::material::{GeneratedMaterial, MaterialRequest};

/// Finished jobs are forgotten after this long.
const FINISHED_JOB_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: String,
    pub status: JobState,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GeneratedMaterial>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug)]
pub enum GenerationMessage {
    /// Queue a job for a user; replies with the job id.
    Submit(i64, MaterialRequest, RpcReplyPort<String>),
    /// Look up a job owned by the given user.
    Status(String, i64, RpcReplyPort<Option<JobSnapshot>>),

    // Sent by the pipeline
    Progress {
        id: String,
        progress: u8,
    },
    Finished {
        id: String,
        result: Result<GeneratedMaterial, String>,
    },
}

#[derive(Clone)]
pub struct GenerationHandle {
    actor: ActorRef<GenerationMessage>,
}

impl GenerationHandle {
    pub async fn submit(&self, user_id: i64, request: MaterialRequest) -> Result<String, NexusError> {
        ractor::call!(self.actor, GenerationMessage::Submit, user_id, request)
            .map_err(|e| NexusError::RactorError(format!("Submit RPC failed: {e}")))
    }

    pub async fn status(
        &self,
        job_id: impl Into<String>,
        user_id: i64,
    ) -> Result<Option<JobSnapshot>, NexusError> {
        ractor::call!(self.actor, GenerationMessage::Status, job_id.into(), user_id)
            .map_err(|e| NexusError::RactorError(format!("Status RPC failed: {e}")))
    }
}

struct JobEntry {
    owner: i64,
    state: JobState,
    progress: u8,
    result: Option<GeneratedMaterial>,
    error: Option<String>,
    finished_at: Option<Instant>,
}

impl JobEntry {
    fn snapshot(&self, id: &str) -> JobSnapshot {
        JobSnapshot {
            job_id: id.to_string(),
            status: self.state,
            progress: self.progress,
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }
}

pub struct GenerationArgs {
    pub provider: Arc<dyn AiProvider>,
    pub normalizer: MathNormalizer,
    pub settings: GenerationConfig,
}

struct GenerationState {
    jobs: HashMap<String, JobEntry>,
    job_tx: mpsc::Sender<GenerationJob>,
    seq: u64,
}

impl GenerationState {
    fn next_id(&mut self) -> String {
        self.seq += 1;
        format!("job_{}_{}", chrono::Utc::now().timestamp_millis(), self.seq)
    }

    fn prune(&mut self, now: Instant) {
        let before = self.jobs.len();
        self.jobs.retain(|_, job| {
            job.finished_at
                .is_none_or(|at| now.duration_since(at) < FINISHED_JOB_TTL)
        });
        let pruned = before - self.jobs.len();
        if pruned > 0 {
            debug!(pruned, "expired generation jobs removed");
        }
    }
}

struct GenerationActor;

#[ractor::async_trait]
impl Actor for GenerationActor {
    type Msg = GenerationMessage;
    type State = GenerationState;
    type Arguments = GenerationArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let job_tx = spawn_pipeline(myself, args.provider, args.normalizer, args.settings);
        info!("GenerationActor started");
        Ok(GenerationState {
            jobs: HashMap::new(),
            job_tx,
            seq: 0,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            GenerationMessage::Submit(owner, request, rp) => {
                state.prune(Instant::now());
                let id = state.next_id();
                state.jobs.insert(
                    id.clone(),
                    JobEntry {
                        owner,
                        state: JobState::Waiting,
                        progress: 0,
                        result: None,
                        error: None,
                        finished_at: None,
                    },
                );
                // try_send: a full queue must not block the actor.
                let job = GenerationJob {
                    id: id.clone(),
                    request,
                };
                if let Err(e) = state.job_tx.try_send(job) {
                    warn!(job = %id, "generation queue rejected job: {e}");
                    if let Some(entry) = state.jobs.get_mut(&id) {
                        entry.state = JobState::Failed;
                        entry.error = Some("generation queue is full".to_string());
                        entry.finished_at = Some(Instant::now());
                    }
                }
                info!(job = %id, owner, "generation job queued");
                let _ = rp.send(id);
            }
            GenerationMessage::Status(id, user_id, rp) => {
                state.prune(Instant::now());
                let snapshot = state
                    .jobs
                    .get(&id)
                    .filter(|job| job.owner == user_id)
                    .map(|job| job.snapshot(&id));
                let _ = rp.send(snapshot);
            }
            GenerationMessage::Progress { id, progress } => {
                if let Some(job) = state.jobs.get_mut(&id) {
                    if job.finished_at.is_none() {
                        job.state = JobState::Active;
                        job.progress = progress;
                    }
                }
            }
            GenerationMessage::Finished { id, result } => {
                let Some(job) = state.jobs.get_mut(&id) else {
                    return Ok(());
                };
                match result {
                    Ok(material) => {
                        job.state = JobState::Completed;
                        job.progress = 100;
                        job.result = Some(material);
                    }
                    Err(e) => {
                        job.state = JobState::Failed;
                        job.error = Some(e);
                    }
                }
                job.finished_at = Some(Instant::now());
                debug!(job = %id, state = ?job.state, "generation job finished");
            }
        }
        Ok(())
    }
}

/// Spawn the generation actor with its worker pipeline.
pub async fn spawn(args: GenerationArgs) -> Result<GenerationHandle, NexusError> {
    let (actor, _jh) = Actor::spawn(None, GenerationActor, args)
        .await
        .map_err(|e| NexusError::RactorError(format!("failed to spawn GenerationActor: {e}")))?;
    Ok(GenerationHandle { actor })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::CompletionRequest;
    use futures::FutureExt;
    use futures::future::BoxFuture;

    struct Canned(Result<&'static str, u16>);

    impl AiProvider for Canned {
        fn name(&self) -> &'static str {
            "canned"
        }

        fn complete<'a>(
            &'a self,
            _req: &'a CompletionRequest,
        ) -> BoxFuture<'a, Result<String, NexusError>> {
            let out = match self.0 {
                Ok(text) => Ok(text.to_string()),
                Err(code) => Err(NexusError::UpstreamStatus(
                    axum::http::StatusCode::from_u16(code).unwrap(),
                )),
            };
            async move { out }.boxed()
        }
    }

    fn args(provider: Canned) -> GenerationArgs {
        GenerationArgs {
            provider: Arc::new(provider),
            normalizer: MathNormalizer::default(),
            settings: GenerationConfig {
                concurrency: 2,
                requests_per_minute: 600,
            },
        }
    }

    fn request() -> MaterialRequest {
        MaterialRequest {
            subject: "数学".to_string(),
            grade: "中学1年".to_string(),
            unit: "正負の数".to_string(),
            difficulty: "基礎".to_string(),
        }
    }

    async fn wait_finished(handle: &GenerationHandle, id: &str, owner: i64) -> JobSnapshot {
        for _ in 0..100 {
            let snap = handle.status(id, owner).await.unwrap().unwrap();
            if matches!(snap.status, JobState::Completed | JobState::Failed) {
                return snap;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} did not finish");
    }

    #[tokio::test]
    async fn job_completes_with_material() {
        let handle = spawn(args(Canned(Ok("問題1: 3-5=?\n解答1: -2")))).await.unwrap();
        let id = handle.submit(7, request()).await.unwrap();
        assert!(id.starts_with("job_"));

        let snap = wait_finished(&handle, &id, 7).await;
        assert_eq!(snap.status, JobState::Completed);
        assert_eq!(snap.progress, 100);
        let material = snap.result.unwrap();
        assert_eq!(material.problems[0].answer, "−2");
    }

    #[tokio::test]
    async fn jobs_are_private_to_their_owner() {
        let handle = spawn(args(Canned(Ok("問題1: x")))).await.unwrap();
        let id = handle.submit(1, request()).await.unwrap();
        assert!(handle.status(&id, 2).await.unwrap().is_none());
        assert!(handle.status("job_missing", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn provider_failure_marks_job_failed() {
        let handle = spawn(args(Canned(Err(429)))).await.unwrap();
        let id = handle.submit(3, request()).await.unwrap();
        let snap = wait_finished(&handle, &id, 3).await;
        assert_eq!(snap.status, JobState::Failed);
        assert!(snap.error.is_some());
        assert!(snap.result.is_none());
    }

    /// Never answers, so the first job holds the only worker slot.
    struct Stalled;

    impl AiProvider for Stalled {
        fn name(&self) -> &'static str {
            "stalled"
        }

        fn complete<'a>(
            &'a self,
            _req: &'a CompletionRequest,
        ) -> BoxFuture<'a, Result<String, NexusError>> {
            futures::future::pending().boxed()
        }
    }

    #[tokio::test]
    async fn jobs_beyond_queue_capacity_fail_without_blocking() {
        use crate::service::generation_pipeline::QUEUE_CAPACITY;

        let handle = spawn(GenerationArgs {
            provider: Arc::new(Stalled),
            normalizer: MathNormalizer::default(),
            settings: GenerationConfig {
                concurrency: 1,
                requests_per_minute: 600,
            },
        })
        .await
        .unwrap();

        let mut last = String::new();
        for _ in 0..QUEUE_CAPACITY + 2 {
            last = handle.submit(5, request()).await.unwrap();
        }
        let snap = handle.status(&last, 5).await.unwrap().unwrap();
        assert_eq!(snap.status, JobState::Failed);
        assert_eq!(snap.error.as_deref(), Some("generation queue is full"));
    }

    #[test]
    fn prune_drops_only_expired_finished_jobs() {
        let (job_tx, _rx) = mpsc::channel(1);
        let mut state = GenerationState {
            jobs: HashMap::new(),
            job_tx,
            seq: 0,
        };
        let base = Instant::now();
        let entry = |finished_at| JobEntry {
            owner: 1,
            state: JobState::Completed,
            progress: 100,
            result: None,
            error: None,
            finished_at,
        };
        state.jobs.insert("running".into(), entry(None));
        state.jobs.insert("stale".into(), entry(Some(base)));
        state
            .jobs
            .insert("fresh".into(), entry(Some(base + FINISHED_JOB_TTL)));

        state.prune(base + FINISHED_JOB_TTL + Duration::from_secs(1));
        let mut left: Vec<_> = state.jobs.keys().cloned().collect();
        left.sort();
        assert_eq!(left, vec!["fresh", "running"]);
    }
}
