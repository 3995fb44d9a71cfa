//! Ingestion run lifecycle.
//!
//! A run moves through a fixed sequence of phases and never re-enters one:
//!
//! `Disconnected → Connected → Cleaned → ConstraintsDeclared → RootCreated
//! → Extracting → Resolving → Closed`
//!
//! Only configuration and connectivity failures end a run early. Parse
//! failures skip their file, unresolved calls are dropped, and deferred
//! relationships that never land are counted in the [`RunReport`].

mod discover;

pub use discover::{discover, SourcePath};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{Config, ConfigError, ENV_LANGUAGE};
use crate::deferred::{DeferredResolver, FlushReport};
use crate::error::IngestError;
use crate::extract::emit::{file_facts, root_node, root_properties};
use crate::extract::{ExtractError, ExtractSettings, Extractor, ExtractorRegistry, FileDeclarations, Language, SourceFile, SymbolIndex};
use crate::facts::FileFacts;
use crate::graph::{BatchOutcome, Connector, GraphClient, GraphError, Label, KEY_PROPERTY, PROJECT_PROPERTY};
use crate::retry::{CancelToken, RetryPolicy};

/// Phase of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    #[default]
    Disconnected,
    Connected,
    Cleaned,
    ConstraintsDeclared,
    RootCreated,
    Extracting,
    Resolving,
    Closed,
}

impl RunPhase {
    /// The phase that follows this one. `None` once closed.
    pub fn next(&self) -> Option<RunPhase> {
        match self {
            RunPhase::Disconnected => Some(RunPhase::Connected),
            RunPhase::Connected => Some(RunPhase::Cleaned),
            RunPhase::Cleaned => Some(RunPhase::ConstraintsDeclared),
            RunPhase::ConstraintsDeclared => Some(RunPhase::RootCreated),
            RunPhase::RootCreated => Some(RunPhase::Extracting),
            RunPhase::Extracting => Some(RunPhase::Resolving),
            RunPhase::Resolving => Some(RunPhase::Closed),
            RunPhase::Closed => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            RunPhase::Disconnected => "Disconnected",
            RunPhase::Connected => "Connected",
            RunPhase::Cleaned => "Cleaned",
            RunPhase::ConstraintsDeclared => "ConstraintsDeclared",
            RunPhase::RootCreated => "RootCreated",
            RunPhase::Extracting => "Extracting",
            RunPhase::Resolving => "Resolving",
            RunPhase::Closed => "Closed",
        }
    }
}

/// A file that was skipped, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub message: String,
}

/// What a run did.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub project: String,
    pub language: Option<Language>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Phase the run ended in.
    pub phase: RunPhase,
    pub files_discovered: usize,
    pub files_extracted: usize,
    /// Files that could not be read or parsed, each listed once.
    pub parse_failures: Vec<FileFailure>,
    /// Files whose batch the store rejected.
    pub write_failures: Vec<FileFailure>,
    /// Nodes removed by the wipe of the previous run.
    pub nodes_wiped: u64,
    /// Shared service and resource nodes left without any edge by the wipe.
    pub orphans_removed: u64,
    pub nodes_written: usize,
    pub edges_written: usize,
    pub unresolved_calls: usize,
    pub deferred: FlushReport,
    pub cancelled: bool,
}

impl RunReport {
    fn start(project: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            project: project.to_string(),
            language: None,
            started_at: Utc::now(),
            finished_at: None,
            phase: RunPhase::Disconnected,
            files_discovered: 0,
            files_extracted: 0,
            parse_failures: Vec::new(),
            write_failures: Vec::new(),
            nodes_wiped: 0,
            orphans_removed: 0,
            nodes_written: 0,
            edges_written: 0,
            unresolved_calls: 0,
            deferred: FlushReport::default(),
            cancelled: false,
        }
    }
}

/// Receives progress notifications from a run. Every method defaults to a
/// no-op.
pub trait RunObserver: Send + Sync {
    fn phase_entered(&self, _phase: RunPhase) {}

    /// Files about to be extracted.
    fn files_discovered(&self, _count: usize) {}

    /// One file is done with both passes, or was skipped.
    fn file_finished(&self, _path: &str) {}
}

struct Silent;

impl RunObserver for Silent {}

/// One parsed file and its declarations.
struct Parsed {
    file: SourceFile,
    decls: FileDeclarations,
}

/// Drives one ingestion run.
pub struct RunCoordinator {
    config: Config,
    registry: ExtractorRegistry,
    observer: Arc<dyn RunObserver>,
    phase: RunPhase,
}

impl RunCoordinator {
    /// The configuration must already be validated.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry: ExtractorRegistry::new(),
            observer: Arc::new(Silent),
            phase: RunPhase::Disconnected,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    fn enter(&mut self, phase: RunPhase, report: &mut RunReport) {
        if self.phase.next() != Some(phase) {
            // Phases are entered in a fixed order by `run` alone.
            error!(from = self.phase.display_name(), to = phase.display_name(), "Invalid run phase transition");
        }
        info!(phase = phase.display_name(), "Run phase entered");
        self.phase = phase;
        report.phase = phase;
        self.observer.phase_entered(phase);
    }

    fn settings(&self) -> ExtractSettings {
        ExtractSettings {
            project: self.config.project.name.trim().to_string(),
            source_url_base: self.config.project.source_url_base.clone(),
            resource_store: self.config.extraction.resource_store.clone(),
            resource_database: self.config.extraction.resource_database.clone(),
        }
    }

    /// Pick the extractor and list the files it will see. Runs before
    /// connecting, since the language decides which constraints are declared.
    fn plan(&self) -> Result<(Arc<dyn Extractor>, Vec<SourcePath>), ConfigError> {
        let project = &self.config.project;
        let language = match project.language {
            Some(language) => language,
            None => {
                let all = discover(&project.source_root, &project.exclude_dirs, |path| {
                    self.registry.for_path(path).is_some()
                })?;
                let detected = self
                    .registry
                    .detect(all.iter().map(|f| std::path::Path::new(f.relative.as_str())));
                let language = detected.ok_or_else(|| ConfigError::Invalid {
                    key: ENV_LANGUAGE,
                    message: format!("no supported source files under {}", project.source_root.display()),
                })?;
                info!(language = %language, "Detected source language");
                language
            }
        };
        let extractor = self.registry.get(language).ok_or_else(|| ConfigError::Invalid {
            key: ENV_LANGUAGE,
            message: format!("no extractor for {}", language),
        })?;
        let files = discover(&project.source_root, &project.exclude_dirs, |path| extractor.accepts(path))?;
        Ok((extractor, files))
    }

    /// Run to completion. Fails only on configuration or connectivity
    /// errors; everything else is in the report.
    pub async fn run(mut self, connector: &dyn Connector, cancel: &CancelToken) -> Result<RunReport, IngestError> {
        let settings = self.settings();
        let mut report = RunReport::start(&settings.project);
        info!(run_id = %report.run_id, project = %settings.project, root = %self.config.project.source_root.display(), "Starting ingestion run");

        let (extractor, files) = self.plan()?;
        report.language = Some(extractor.language());
        report.files_discovered = files.len();

        let client = GraphClient::connect(
            connector,
            &self.config.retry.connect_policy(),
            self.config.palette.clone(),
            cancel,
        )
        .await
        .map_err(|e| {
            error!(error = %e, "Giving up on the graph store");
            IngestError::Connectivity(e)
        })?;
        self.enter(RunPhase::Connected, &mut report);

        report.nodes_wiped = client.delete_subgraph(PROJECT_PROPERTY, &settings.project).await?;
        report.orphans_removed = client.prune_unreferenced(&Label::SHARED).await?;
        info!(removed = report.nodes_wiped, orphans = report.orphans_removed, "Previous run wiped");
        self.enter(RunPhase::Cleaned, &mut report);

        for label in extractor.labels().all() {
            client.declare_uniqueness(label, KEY_PROPERTY).await?;
        }
        self.enter(RunPhase::ConstraintsDeclared, &mut report);

        client
            .upsert_node(&root_node(&settings.project), root_properties(&settings.project))
            .await?;
        self.enter(RunPhase::RootCreated, &mut report);

        self.enter(RunPhase::Extracting, &mut report);
        let resolver = DeferredResolver::new(self.config.retry.flush_policy());
        self.extract(&extractor, files, &settings, &client, &resolver, cancel, &mut report)
            .await;
        report.cancelled = cancel.is_cancelled();

        self.enter(RunPhase::Resolving, &mut report);
        report.deferred = resolver.flush(&client, cancel).await;
        if report.deferred.pending > 0 {
            let failure = IngestError::DeferredWrite {
                pending: report.deferred.pending,
                received: report.deferred.received,
            };
            warn!(error = %failure, "Deferred relationships left unwritten");
        }

        client.close().await;
        self.enter(RunPhase::Closed, &mut report);
        report.cancelled = cancel.is_cancelled();
        report.finished_at = Some(Utc::now());

        info!(
            run_id = %report.run_id,
            files = report.files_extracted,
            parse_failures = report.parse_failures.len(),
            nodes = report.nodes_written,
            edges = report.edges_written,
            deferred_written = report.deferred.written,
            deferred_pending = report.deferred.pending,
            "Ingestion run finished"
        );
        Ok(report)
    }

    /// Both extraction passes, writing each file's facts as soon as they
    /// are known.
    #[allow(clippy::too_many_arguments)]
    async fn extract(
        &self,
        extractor: &Arc<dyn Extractor>,
        files: Vec<SourcePath>,
        settings: &ExtractSettings,
        client: &GraphClient,
        resolver: &DeferredResolver,
        cancel: &CancelToken,
        report: &mut RunReport,
    ) {
        let width = self.config.extraction.concurrency().max(1);
        self.observer.files_discovered(files.len());

        // Pass 1: parse and collect declarations.
        let results: Vec<Option<Result<Parsed, ExtractError>>> = stream::iter(files)
            .map(|source| {
                let extractor = Arc::clone(extractor);
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    let path = source.relative.clone();
                    let parsed = tokio::task::spawn_blocking(move || declare(extractor.as_ref(), &source))
                        .await
                        .unwrap_or_else(|e| {
                            Err(ExtractError::Parse {
                                path,
                                message: format!("extraction worker failed: {}", e),
                            })
                        });
                    Some(parsed)
                }
            })
            .buffer_unordered(width)
            .collect()
            .await;

        let mut parsed = Vec::new();
        for result in results.into_iter().flatten() {
            match result {
                Ok(file) => parsed.push(file),
                Err(e) => {
                    let path = e.path().to_string();
                    let failure = IngestError::from(e);
                    warn!(path = %path, error = %failure, "Skipping file");
                    report.parse_failures.push(FileFailure {
                        path: path.clone(),
                        message: failure.to_string(),
                    });
                    self.observer.file_finished(&path);
                }
            }
        }
        parsed.sort_by(|a, b| a.decls.path.cmp(&b.decls.path));

        // Symbol index over every file, in path order.
        let (sources, decls): (Vec<SourceFile>, Vec<FileDeclarations>) =
            parsed.into_iter().map(|p| (p.file, p.decls)).unzip();
        let index = SymbolIndex::build(extractor.as_ref(), &decls, settings);
        debug!(files = decls.len(), "Symbol index built");

        let shared = Arc::new(Shared {
            extractor: Arc::clone(extractor),
            index,
            decls,
            settings: settings.clone(),
        });

        // Pass 2: facts per file, written one batch per file.
        let queue = resolver.queue();
        let policy = self.config.retry.write_policy();
        let outcomes: Vec<Option<FileOutcome>> = stream::iter(sources.into_iter().enumerate())
            .map(|(i, source)| {
                let shared = Arc::clone(&shared);
                let queue = queue.clone();
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    let path = source.path().to_string();
                    let facts = match tokio::task::spawn_blocking(move || shared.facts(i, &source)).await {
                        Ok(facts) => facts,
                        Err(e) => {
                            return Some(FileOutcome::Failed(FileFailure {
                                path,
                                message: format!("extraction worker failed: {}", e),
                            }))
                        }
                    };
                    for unresolved in &facts.unresolved {
                        let error = IngestError::Resolution {
                            path: facts.path.clone(),
                            line: unresolved.line,
                            detail: unresolved.detail.clone(),
                        };
                        debug!(error = %error, "Call left unbound");
                    }
                    match apply_batch(client, &facts, &policy, &cancel).await {
                        Ok(outcome) => {
                            // Deferred sources are this file's nodes, so they
                            // only make sense once the batch landed.
                            queue.extend(facts.deferred);
                            Some(FileOutcome::Written {
                                path,
                                nodes: outcome.nodes,
                                edges: outcome.edges,
                                unresolved: facts.unresolved.len(),
                            })
                        }
                        Err(e) => {
                            warn!(path = %path, error = %e, "Store rejected file batch");
                            Some(FileOutcome::Failed(FileFailure {
                                path,
                                message: e.to_string(),
                            }))
                        }
                    }
                }
            })
            .buffer_unordered(width)
            .collect()
            .await;

        for outcome in outcomes.into_iter().flatten() {
            match outcome {
                FileOutcome::Written {
                    path,
                    nodes,
                    edges,
                    unresolved,
                } => {
                    report.files_extracted += 1;
                    report.nodes_written += nodes;
                    report.edges_written += edges;
                    report.unresolved_calls += unresolved;
                    self.observer.file_finished(&path);
                }
                FileOutcome::Failed(failure) => {
                    self.observer.file_finished(&failure.path);
                    report.write_failures.push(failure);
                }
            }
        }
        if cancel.is_cancelled() {
            warn!("Extraction cancelled, remaining files skipped");
        }
    }
}

/// Read-only state shared by pass-two workers.
struct Shared {
    extractor: Arc<dyn Extractor>,
    index: SymbolIndex,
    decls: Vec<FileDeclarations>,
    settings: ExtractSettings,
}

impl Shared {
    fn facts(&self, i: usize, source: &SourceFile) -> FileFacts {
        file_facts(self.extractor.as_ref(), source, &self.decls[i], &self.index, &self.settings)
    }
}

enum FileOutcome {
    Written {
        path: String,
        nodes: usize,
        edges: usize,
        unresolved: usize,
    },
    Failed(FileFailure),
}

/// Write one file's batch, retrying transient rejections with backoff.
/// Concurrent batches merging the same shared nodes can be aborted by the
/// store as deadlock victims.
async fn apply_batch(
    client: &GraphClient,
    facts: &FileFacts,
    policy: &RetryPolicy,
    cancel: &CancelToken,
) -> Result<BatchOutcome, GraphError> {
    let mut attempt = 1;
    loop {
        match client.apply(&facts.nodes, &facts.edges).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                debug!(path = %facts.path, attempt, delay_ms = delay.as_millis() as u64, error = %e, "File batch rejected, retrying");
                if !cancel.sleep(delay).await {
                    return Err(e);
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn declare(extractor: &dyn Extractor, source: &SourcePath) -> Result<Parsed, ExtractError> {
    let content = std::fs::read_to_string(&source.absolute).map_err(|e| ExtractError::Read {
        path: source.relative.clone(),
        source: e,
    })?;
    let file = extractor.parse(&source.relative, content)?;
    let decls = extractor.declarations(&file);
    Ok(Parsed { file, decls })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phases_advance_in_order() {
        let mut phase = RunPhase::default();
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            phase = next;
            seen.push(phase);
        }
        let names: Vec<&str> = seen.iter().map(|p| p.display_name()).collect();
        assert_eq!(
            names,
            vec![
                "Disconnected",
                "Connected",
                "Cleaned",
                "ConstraintsDeclared",
                "RootCreated",
                "Extracting",
                "Resolving",
                "Closed"
            ]
        );
    }
}
