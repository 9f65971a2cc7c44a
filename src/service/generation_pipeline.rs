use futures::stream::StreamExt;
use governor::{Quota, RateLimiter};
use ractor::ActorRef;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::config::GenerationConfig;
use crate::error::NexusError;
use crate::llm::prompts::{material_system_prompt, material_user_prompt};
use crate::llm::{AiProvider, CompletionRequest};
use crate::notation::MathNormalizer;
use crate::service::generation_actor::GenerationMessage;
use crate::service::material::{GeneratedMaterial, MaterialRequest, build_material};

/// Jobs submitted while this many are queued are marked failed, not queued.
pub(crate) const QUEUE_CAPACITY: usize = 256;

const MATERIAL_MAX_TOKENS: u32 = 2000;

pub const PROGRESS_STARTED: u8 = 25;
pub const PROGRESS_GENERATED: u8 = 75;

#[derive(Debug)]
pub struct GenerationJob {
    pub id: String,
    pub request: MaterialRequest,
}

/// Run one job against the provider. Progress is reported through `report`.
pub async fn run_job(
    provider: &dyn AiProvider,
    normalizer: &MathNormalizer,
    request: &MaterialRequest,
    report: impl Fn(u8),
) -> Result<GeneratedMaterial, NexusError> {
    report(PROGRESS_STARTED);
    let prompt = CompletionRequest::new(
        material_system_prompt(
            &request.subject,
            &request.grade,
            &request.unit,
            &request.difficulty,
        ),
        material_user_prompt(&request.subject, &request.unit, &request.difficulty),
    )
    .with_max_tokens(MATERIAL_MAX_TOKENS);

    let raw = provider.complete(&prompt).await?;
    report(PROGRESS_GENERATED);

    if raw.trim().is_empty() {
        return Err(NexusError::EmptyCompletion);
    }
    Ok(build_material(request, &raw, normalizer))
}

/// Spawn the worker pipeline feeding results back to `actor`.
pub fn spawn_pipeline(
    actor: ActorRef<GenerationMessage>,
    provider: Arc<dyn AiProvider>,
    normalizer: MathNormalizer,
    settings: GenerationConfig,
) -> mpsc::Sender<GenerationJob> {
    let (job_tx, job_rx) = mpsc::channel::<GenerationJob>(QUEUE_CAPACITY);
    let per_minute = NonZeroU32::new(settings.requests_per_minute).unwrap_or(NonZeroU32::MIN);
    let limiter = Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)));
    let concurrency = settings.concurrency.max(1);

    tokio::spawn(async move {
        info!(
            concurrency,
            rate_per_minute = per_minute.get(),
            "Generation pipeline started"
        );

        let mut pipeline = ReceiverStream::new(job_rx)
            .map(|job| {
                let lim = limiter.clone();
                let provider = provider.clone();
                let actor = actor.clone();
                async move {
                    lim.until_ready().await;
                    let report = |progress| {
                        let _ = actor.cast(GenerationMessage::Progress {
                            id: job.id.clone(),
                            progress,
                        });
                    };
                    let result = run_job(provider.as_ref(), &normalizer, &job.request, report)
                        .await
                        .map_err(|e| {
                            warn!(job = %job.id, "generation failed: {e}");
                            e.to_string()
                        });
                    (job.id, result)
                }
            })
            .buffer_unordered(concurrency);

        while let Some((id, result)) = pipeline.next().await {
            debug!(job = %id, ok = result.is_ok(), "generation finished");
            if let Err(e) = actor.cast(GenerationMessage::Finished { id, result }) {
                warn!("Generation actor unreachable, pipeline stopping: {e}");
                break;
            }
        }
        info!("Generation pipeline stopped");
    });

    job_tx
}
