use crate::artifact::{append_artifact, write_artifact, OutputLayout};
use crate::budget::BudgetGuard;
use crate::collector::{FragmentObserver, ResponseCollector};
use crate::config::RankerConfig;
use crate::errlog::ErrorLog;
use crate::error::{RankerError, Result};
use crate::extract::extract_answer;
use crate::model::ChatModel;
use crate::prompt::PromptBuilder;
use crate::session::SessionRegistry;
use crate::stats::RunStats;
use faultrank_chunker::{load_chunk, ChunkSequencer, TestChunks};
use faultrank_protocol::{SessionKey, StudyLayout, TurnArtifact};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// One bug to rank: where its chunks live and where its artifacts go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BugTarget {
    pub project: String,
    pub technique: String,
    pub bug_id: String,
    pub chunks_dir: PathBuf,
    pub outputs: OutputLayout,
}

impl BugTarget {
    pub fn from_layout(
        layout: &StudyLayout,
        project: impl Into<String>,
        technique: impl Into<String>,
        bug_id: impl Into<String>,
    ) -> Self {
        let project = project.into();
        let technique = technique.into();
        let bug_id = bug_id.into();
        Self {
            chunks_dir: layout.chunks_dir(&project, &technique, &bug_id),
            outputs: OutputLayout::new(
                layout.raw_output_dir(&project, &technique, &bug_id),
                layout.final_output_dir(&project, &technique, &bug_id),
            ),
            project,
            technique,
            bug_id,
        }
    }

    #[must_use]
    pub fn session_key(&self, test_id: u32) -> SessionKey {
        SessionKey::new(&self.project, &self.bug_id, test_id)
    }
}

/// Drives the chunked conversation for each test of a bug.
///
/// Cloning is cheap; every clone shares the model and the error log.
#[derive(Clone)]
pub struct Ranker {
    collector: ResponseCollector,
    guard: Arc<BudgetGuard>,
    prompts: Arc<PromptBuilder>,
    errors: ErrorLog,
    combined_artifact: Option<PathBuf>,
}

impl Ranker {
    pub fn new(model: Arc<dyn ChatModel>, config: &RankerConfig, errors: ErrorLog) -> Self {
        Self {
            collector: ResponseCollector::new(model),
            guard: Arc::new(BudgetGuard::new(config.encoding, config.input_ceiling)),
            prompts: Arc::new(PromptBuilder::new()),
            errors,
            combined_artifact: config.combined_artifact.clone(),
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: FragmentObserver) -> Self {
        self.collector = self.collector.with_observer(observer);
        self
    }

    /// Rank every test of one bug. Failures are isolated per test.
    pub async fn rank_bug(&self, target: &BugTarget) -> RunStats {
        let start = Instant::now();
        let mut stats = RunStats::new();
        stats.bugs = 1;

        let plan = match ChunkSequencer::new(&target.chunks_dir).scan() {
            Ok(plan) => plan,
            Err(err) => {
                log::error!(
                    "Cannot scan chunks for {} bug {}: {err}",
                    target.project,
                    target.bug_id
                );
                stats.add_error(format!("{}/{}: {err}", target.project, target.bug_id));
                return stats;
            }
        };
        if plan.is_empty() {
            log::warn!(
                "No chunk files under {}",
                target.chunks_dir.display()
            );
        }

        let mut registry = SessionRegistry::new();
        for test in &plan {
            let key = target.session_key(test.test_id);
            match self.rank_test(&mut registry, target, &key, test, &mut stats).await {
                Ok(()) => stats.tests_completed += 1,
                Err(err) => {
                    stats.tests_aborted += 1;
                    log::error!(
                        "Error for project: {}, bug_id: {}, test_id: {} - {err}",
                        key.project,
                        key.bug_id,
                        key.test_id
                    );
                    stats.add_error(format!("{key}: {err}"));
                    if let Err(log_err) = self.errors.record(&key, &err.to_string()).await {
                        log::warn!(
                            "Failed to write error log {}: {log_err}",
                            self.errors.path().display()
                        );
                    }
                }
            }
            registry.close(&key);
        }

        stats.time_ms = start.elapsed().as_millis() as u64;
        log::info!(
            "{} bug {}: {} test(s) completed, {} aborted, {} turn(s)",
            target.project,
            target.bug_id,
            stats.tests_completed,
            stats.tests_aborted,
            stats.chunks_processed
        );
        stats
    }

    async fn rank_test(
        &self,
        registry: &mut SessionRegistry,
        target: &BugTarget,
        key: &SessionKey,
        test: &TestChunks,
        stats: &mut RunStats,
    ) -> Result<()> {
        let mut last_written: Option<TurnArtifact> = None;
        for chunk in &test.chunks {
            let evidence = match load_chunk(&chunk.path).map_err(RankerError::from) {
                Ok(evidence) => evidence,
                Err(err) => {
                    log::warn!("{key}: skipping chunk {}: {err}", chunk.chunk_index);
                    stats.chunks_skipped += 1;
                    continue;
                }
            };

            let prompt = self.prompts.build(&evidence, chunk.chunk_index);
            let tokens = self.guard.check(&prompt.text)?;
            log::debug!(
                "{key}: chunk {} ({:?}) is {tokens} tokens",
                chunk.chunk_index,
                prompt.framing
            );

            let reply = self.collector.run_turn(registry, key, &prompt.text).await?;
            let extraction = extract_answer(&reply);
            stats.add_turn(extraction.records.len(), extraction.rejected());

            let artifact = TurnArtifact::new(key, extraction.records, reply);
            write_artifact(
                &target
                    .outputs
                    .chunk_artifact_path(key.test_id, chunk.chunk_index),
                &artifact,
            )
            .await?;
            if let Some(combined) = &self.combined_artifact {
                append_artifact(combined, &artifact).await?;
            }
            last_written = Some(artifact);
        }

        // The final artifact is the last turn that actually completed, even
        // when trailing chunks were skipped.
        let artifact = last_written.ok_or_else(|| {
            RankerError::Other(format!(
                "no chunk of test {} produced an artifact",
                key.test_id
            ))
        })?;
        write_artifact(&target.outputs.final_artifact_path(key.test_id), &artifact).await?;
        Ok(())
    }

    /// Rank several bugs with at most `jobs` in flight. Each worker owns its
    /// own session registry.
    pub async fn rank_bugs(&self, targets: Vec<BugTarget>, jobs: usize) -> RunStats {
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(jobs.max(1)));
        let mut workers = JoinSet::new();

        for target in targets {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let ranker = self.clone();
            workers.spawn(async move {
                let _permit = permit;
                ranker.rank_bug(&target).await
            });
        }

        let mut total = RunStats::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(stats) => total.merge(stats),
                Err(err) => {
                    log::error!("Ranking worker failed: {err}");
                    total.add_error(format!("worker: {err}"));
                }
            }
        }
        total.time_ms = start.elapsed().as_millis() as u64;
        total
    }
}
