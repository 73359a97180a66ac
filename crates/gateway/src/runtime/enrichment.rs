//! Post-turn background enrichment.
//!
//! Jobs go through a bounded queue drained by a fixed set of workers.
//! Dispatch never waits: a full queue drops the job with a trace event.
//! Each job runs in its own task so a panic is contained to that job, and
//! errors are logged, never retried and never surfaced to the turn.

use std::sync::Arc;

use regex::Regex;
use serde_json::json;
use tokio::sync::{mpsc, Mutex};

use asp_domain::billing::Tier;
use asp_domain::config::EnrichmentConfig;
use asp_domain::error::{Error, Result};
use asp_domain::trace::TraceEvent;
use asp_memory::{reflect, MemoryBackend, Sector};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Jobs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What a finished turn hands to the pool.
#[derive(Debug, Clone)]
pub struct TurnSummary {
    pub user_id: String,
    pub tier: Tier,
    pub query: String,
    pub response: String,
    pub memory_used: bool,
}

#[derive(Debug, Clone)]
pub enum EnrichmentJob {
    MemoryExtraction(TurnSummary),
    SelfReflection(TurnSummary),
}

impl EnrichmentJob {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MemoryExtraction(_) => "memory_extraction",
            Self::SelfReflection(_) => "self_reflection",
        }
    }
}

/// Personal statements worth remembering.
const FACT_PATTERN: &str =
    r"\b(i am|i'm|my|i like|i love|i hate|i prefer|i work|i live|i have|i use)\b";

/// Pulls durable facts about the user out of their message.
pub struct MemoryExtractor {
    fact: Regex,
}

impl MemoryExtractor {
    pub fn new() -> Result<Self> {
        let fact = Regex::new(FACT_PATTERN)
            .map_err(|e| Error::Config(format!("extraction pattern: {e}")))?;
        Ok(Self { fact })
    }

    pub fn extract(&self, query: &str) -> Vec<String> {
        query
            .split(['.', '!', '?', '\n'])
            .map(str::trim)
            .filter(|s| s.split_whitespace().count() >= 3)
            .filter(|s| self.fact.is_match(&s.to_lowercase()))
            .map(str::to_string)
            .collect()
    }
}

struct JobContext {
    memory: Arc<dyn MemoryBackend>,
    extractor: MemoryExtractor,
}

async fn run_job(job: EnrichmentJob, ctx: Arc<JobContext>) -> Result<()> {
    match job {
        EnrichmentJob::MemoryExtraction(turn) => {
            let facts = ctx.extractor.extract(&turn.query);
            for fact in &facts {
                ctx.memory
                    .add(
                        fact,
                        &turn.user_id,
                        Sector::Semantic,
                        json!({ "source": "extraction" }),
                    )
                    .await?;
            }
            tracing::debug!(user_id = %turn.user_id, facts = facts.len(), "memory extraction done");
            Ok(())
        }
        EnrichmentJob::SelfReflection(turn) => {
            let r = reflect(&turn.query, &turn.response, turn.memory_used);
            TraceEvent::ReflectionScored {
                user_id: turn.user_id.clone(),
                satisfied: r.satisfied,
                reasoning: r.reasoning.clone(),
                retry_strategy: r.retry_strategy.map(|s| s.as_str().to_string()),
            }
            .emit();
            Ok(())
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pool
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct EnrichmentPool {
    tx: mpsc::Sender<EnrichmentJob>,
    extraction_min_tier: Tier,
    reflection_min_tier: Tier,
}

impl EnrichmentPool {
    /// Spawn `cfg.workers` workers. Must be called inside a tokio runtime.
    pub fn start(cfg: &EnrichmentConfig, memory: Arc<dyn MemoryBackend>) -> Result<Self> {
        let (tx, rx) = mpsc::channel(cfg.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let ctx = Arc::new(JobContext {
            memory,
            extractor: MemoryExtractor::new()?,
        });
        for worker_id in 0..cfg.workers {
            tokio::spawn(worker(worker_id, rx.clone(), ctx.clone()));
        }
        tracing::info!(
            workers = cfg.workers,
            queue_capacity = cfg.queue_capacity,
            "enrichment pool started"
        );
        Ok(Self {
            tx,
            extraction_min_tier: cfg.extraction_min_tier,
            reflection_min_tier: cfg.reflection_min_tier,
        })
    }

    /// Queue the jobs the user's tier is entitled to. Returns how many
    /// were accepted.
    pub fn dispatch(&self, turn: TurnSummary) -> usize {
        let mut jobs = Vec::with_capacity(2);
        if turn.tier >= self.extraction_min_tier {
            jobs.push(EnrichmentJob::MemoryExtraction(turn.clone()));
        }
        if turn.tier >= self.reflection_min_tier {
            jobs.push(EnrichmentJob::SelfReflection(turn));
        }
        jobs.into_iter().map(|job| self.enqueue(job)).filter(|queued| *queued).count()
    }

    /// Jobs queued but not yet picked up by a worker.
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    fn enqueue(&self, job: EnrichmentJob) -> bool {
        let name = job.name();
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(e) => {
                let reason = match e {
                    mpsc::error::TrySendError::Full(_) => "queue_full",
                    mpsc::error::TrySendError::Closed(_) => "closed",
                };
                tracing::warn!(job = name, reason, "enrichment job dropped");
                TraceEvent::EnrichmentDropped {
                    job: name.to_string(),
                    reason: reason.to_string(),
                }
                .emit();
                false
            }
        }
    }
}

async fn worker(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<EnrichmentJob>>>,
    ctx: Arc<JobContext>,
) {
    loop {
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else {
            tracing::debug!(worker_id, "enrichment queue closed; worker exiting");
            return;
        };
        let name = job.name();
        match tokio::spawn(run_job(job, ctx.clone())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(worker_id, job = name, error = %e, "enrichment job failed"),
            Err(e) if e.is_panic() => {
                tracing::error!(worker_id, job = name, "enrichment job panicked")
            }
            Err(e) => tracing::warn!(worker_id, job = name, error = %e, "enrichment job cancelled"),
        }
    }
}
