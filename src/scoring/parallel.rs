use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info};

use super::ScoringBackend;
use crate::error::BackendError;
use crate::llm::{RateLimiter, RetryPolicy};
use crate::models::{RubricStep, ScoreTable};
use crate::stages::top_steps;

/// Configuration for batch scoring
#[derive(Debug, Clone)]
pub struct ScorerConfig {
    /// Scoring tasks allowed to run at once
    pub max_workers: usize,
    /// Minimum spacing between any two backend calls in a batch
    pub min_interval: Duration,
    /// Delay between consecutive task submissions
    pub submit_stagger: Duration,
    /// Timeout for each individual backend call
    pub call_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            max_workers: 24,
            min_interval: Duration::from_millis(125), // 8 calls per second
            submit_stagger: Duration::from_millis(50),
            call_timeout: Duration::from_secs(20),
            retry: RetryPolicy::default(),
        }
    }
}

impl ScorerConfig {
    pub fn with_calls_per_sec(mut self, calls_per_sec: f64) -> Self {
        self.min_interval = RateLimiter::per_second(calls_per_sec).interval();
        self
    }
}

/// Scores every (chunk, step) pair concurrently against a backend
pub struct ParallelScorer {
    backend: Arc<dyn ScoringBackend>,
    config: ScorerConfig,
}

impl ParallelScorer {
    pub fn new(backend: Arc<dyn ScoringBackend>, config: ScorerConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Score each text against every rubric step
    pub async fn score_all_steps(&self, texts: &[String]) -> Result<Vec<ScoreTable>, BackendError> {
        self.score_batch(texts, &RubricStep::ALL).await
    }

    /// Highest-scoring step of each text, order-aligned with `texts`
    pub async fn top_step_per_chunk(&self, texts: &[String]) -> Result<Vec<RubricStep>, BackendError> {
        let tables = self.score_all_steps(texts).await?;
        Ok(top_steps(&tables))
    }

    /// Score `texts` x `steps` and return one table per text, in input order.
    ///
    /// The worker pool, the rate limiter and the result slots live only for
    /// this call. The batch is all-or-nothing: the first task to exhaust its
    /// retries fails the batch, and dropping the task set aborts the rest.
    pub async fn score_batch(
        &self,
        texts: &[String],
        steps: &[RubricStep],
    ) -> Result<Vec<ScoreTable>, BackendError> {
        let steps: Vec<RubricStep> = steps.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let total = texts.len() * steps.len();
        if total == 0 {
            return Ok(vec![ScoreTable::new(); texts.len()]);
        }

        info!(
            "Scoring {} chunks x {} steps ({} calls, {} workers)",
            texts.len(),
            steps.len(),
            total,
            self.config.max_workers
        );
        let started = Instant::now();

        let limiter = Arc::new(RateLimiter::new(self.config.min_interval));
        let workers = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut slots: Vec<Vec<Option<f64>>> = vec![vec![None; steps.len()]; texts.len()];
        let mut tasks = JoinSet::new();

        for (chunk_index, text) in texts.iter().enumerate() {
            let text: Arc<str> = Arc::from(text.as_str());
            for (step_index, &step) in steps.iter().enumerate() {
                if chunk_index + step_index > 0 {
                    sleep(self.config.submit_stagger).await;
                }

                // Stop submitting as soon as any finished task has failed
                while let Some(joined) = tasks.try_join_next() {
                    let (c, s, score) = flatten(joined)?;
                    slots[c][s] = Some(score);
                }

                let job = ScoreJob {
                    backend: Arc::clone(&self.backend),
                    limiter: Arc::clone(&limiter),
                    workers: Arc::clone(&workers),
                    text: Arc::clone(&text),
                    step,
                    chunk_index,
                    step_index,
                    call_timeout: self.config.call_timeout,
                    retry: self.config.retry,
                };
                tasks.spawn(job.run());
            }
        }

        while let Some(joined) = tasks.join_next().await {
            let (c, s, score) = flatten(joined)?;
            slots[c][s] = Some(score);
        }

        let tables = slots
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(&steps)
                    .map(|(score, &step)| {
                        score
                            .map(|score| (step, score))
                            .ok_or_else(|| BackendError::Aborted(format!("no score recorded for step {}", step.id())))
                    })
                    .collect::<Result<ScoreTable, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "Scored {} calls in {:.1}s",
            total,
            started.elapsed().as_secs_f64()
        );
        Ok(tables)
    }
}

fn flatten(
    joined: Result<Result<(usize, usize, f64), BackendError>, JoinError>,
) -> Result<(usize, usize, f64), BackendError> {
    joined.map_err(|e| BackendError::Aborted(e.to_string()))?
}

/// One (chunk, step) scoring task; owns everything it touches
struct ScoreJob {
    backend: Arc<dyn ScoringBackend>,
    limiter: Arc<RateLimiter>,
    workers: Arc<Semaphore>,
    text: Arc<str>,
    step: RubricStep,
    chunk_index: usize,
    step_index: usize,
    call_timeout: Duration,
    retry: RetryPolicy,
}

impl ScoreJob {
    async fn run(self) -> Result<(usize, usize, f64), BackendError> {
        let _permit = self
            .workers
            .acquire()
            .await
            .map_err(|_| BackendError::Aborted("worker pool closed".to_string()))?;

        let label = format!("chunk {} step {}", self.chunk_index, self.step.id());
        let backend = self.backend.as_ref();
        let limiter = self.limiter.as_ref();
        let text = self.text.as_ref();
        let step = self.step;
        let call_timeout = self.call_timeout;

        let score = self
            .retry
            .run(&label, || async move {
                limiter.acquire().await;
                match timeout(call_timeout, backend.score(text, step)).await {
                    Ok(result) => result,
                    Err(_) => Err(BackendError::Timeout(call_timeout)),
                }
            })
            .await?;

        debug!(chunk = self.chunk_index, step = step.id(), score, "scored");
        Ok((self.chunk_index, self.step_index, score))
    }
}
