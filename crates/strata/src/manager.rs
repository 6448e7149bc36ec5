//! Memory Manager
//!
//! Single entry point over the four tiers. Writes go to the archive first
//! (authoritative), then best-effort to search, graph and cache. Reads fan out
//! to cache, search and graph concurrently, pull referenced conversations from
//! the archive and hand everything to the [`ContextAssembler`].
//!
//! Every tier call is bounded by `tiers.call_timeout_ms`. A tier that fails or
//! times out degrades the result for that tier only.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::config::Config;
use crate::context::{AssembledContext, ContextAssembler, ContextSources};
use crate::error::{Result, StrataError};
use crate::memory::text::keywords;
use crate::memory::types::{
    CacheEntry, ConversationRecord, Metadata, SearchHit, SummaryRecord, TopicWeight,
};
use crate::summarize::{KeywordSummarizer, Summarizer};
use crate::tiers::{
    ArchiveTier, CacheTier, GraphTier, InMemoryArchive, InMemoryCache, InMemoryGraph,
    InMemorySearch, SearchTier, TierKind,
};

/// Prefix of ids issued when the archive could not take the write
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Run one tier call under a timeout.
async fn call_tier<T, F>(tier: TierKind, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(StrataError::Timeout {
            tier,
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Per-tier result of a write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "lowercase")]
pub enum TierOutcome {
    Stored,
    Failed(String),
    /// The tier is not configured
    Skipped,
}

impl TierOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, TierOutcome::Stored)
    }

    fn from_result(tier: TierKind, conversation_id: &str, result: Result<()>) -> Self {
        match result {
            Ok(()) => TierOutcome::Stored,
            Err(e) => {
                tracing::warn!(
                    tier = %tier,
                    conversation_id,
                    error = %e,
                    "Derived write failed"
                );
                TierOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Options for [`MemoryManager::store_with_options`]
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreOptions {
    /// Raise archive failures instead of issuing a local fallback id
    pub require_archive: bool,
}

/// What happened to one stored turn across the tiers
#[derive(Debug, Clone, Serialize)]
pub struct StoreReceipt {
    pub conversation_id: String,
    /// False when `conversation_id` is a local fallback id
    pub archived: bool,
    pub outcomes: HashMap<TierKind, TierOutcome>,
}

impl StoreReceipt {
    pub fn outcome(&self, tier: TierKind) -> Option<&TierOutcome> {
        self.outcomes.get(&tier)
    }

    /// Tiers whose write was attempted and failed
    pub fn failed_tiers(&self) -> Vec<TierKind> {
        TierKind::ALL
            .into_iter()
            .filter(|t| matches!(self.outcomes.get(t), Some(TierOutcome::Failed(_))))
            .collect()
    }

    /// `PartialWrite` if any tier write failed
    pub fn ensure_complete(&self) -> Result<()> {
        let failed = self.failed_tiers();
        if failed.is_empty() {
            Ok(())
        } else {
            Err(StrataError::PartialWrite {
                conversation_id: self.conversation_id.clone(),
                failed,
            })
        }
    }
}

/// Per-tier result of a delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    Failed(String),
    Skipped,
}

/// Result of [`MemoryManager::delete_derived`]
#[derive(Debug, Clone, Serialize)]
pub struct DeleteReport {
    pub conversation_id: String,
    pub outcomes: HashMap<TierKind, DeleteOutcome>,
}

impl DeleteReport {
    pub fn outcome(&self, tier: TierKind) -> Option<&DeleteOutcome> {
        self.outcomes.get(&tier)
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes
            .values()
            .any(|o| matches!(o, DeleteOutcome::Failed(_)))
    }
}

/// Reachability of each tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub cache: bool,
    pub archive: bool,
    pub search: bool,
    pub graph: bool,
    /// Number of reachable tiers
    pub healthy: usize,
    /// True when at least `health.min_healthy_tiers` tiers are reachable
    pub overall: bool,
}

impl HealthReport {
    pub fn tier(&self, tier: TierKind) -> bool {
        match tier {
            TierKind::Cache => self.cache,
            TierKind::Archive => self.archive,
            TierKind::Search => self.search,
            TierKind::Graph => self.graph,
        }
    }
}

/// Builder for [`MemoryManager`]
pub struct MemoryManagerBuilder {
    config: Config,
    cache: Option<Arc<dyn CacheTier>>,
    archive: Option<Arc<dyn ArchiveTier>>,
    search: Option<Arc<dyn SearchTier>>,
    graph: Option<Arc<dyn GraphTier>>,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl MemoryManagerBuilder {
    pub fn cache(mut self, cache: Arc<dyn CacheTier>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn archive(mut self, archive: Arc<dyn ArchiveTier>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn search(mut self, search: Arc<dyn SearchTier>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn graph(mut self, graph: Arc<dyn GraphTier>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn build(self) -> MemoryManager {
        let summarizer = self
            .summarizer
            .unwrap_or_else(|| {
                Arc::new(KeywordSummarizer::new(&self.config.summarizer)) as Arc<dyn Summarizer>
            });
        let assembler = ContextAssembler::new(self.config.context.clone());

        tracing::debug!(
            cache = self.cache.as_ref().map(|t| t.name()),
            archive = self.archive.as_ref().map(|t| t.name()),
            search = self.search.as_ref().map(|t| t.name()),
            graph = self.graph.as_ref().map(|t| t.name()),
            summarizer = summarizer.name(),
            "Built memory manager"
        );

        MemoryManager {
            config: Arc::new(self.config),
            cache: self.cache,
            archive: self.archive,
            search: self.search,
            graph: self.graph,
            summarizer,
            assembler: Arc::new(assembler),
        }
    }
}

/// Orchestrator over the four memory tiers
///
/// Cheap to clone; clones share the same tiers.
#[derive(Clone)]
pub struct MemoryManager {
    config: Arc<Config>,
    cache: Option<Arc<dyn CacheTier>>,
    archive: Option<Arc<dyn ArchiveTier>>,
    search: Option<Arc<dyn SearchTier>>,
    graph: Option<Arc<dyn GraphTier>>,
    summarizer: Arc<dyn Summarizer>,
    assembler: Arc<ContextAssembler>,
}

impl std::fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryManager")
            .field("cache", &self.cache.as_ref().map(|t| t.name()))
            .field("archive", &self.archive.as_ref().map(|t| t.name()))
            .field("search", &self.search.as_ref().map(|t| t.name()))
            .field("graph", &self.graph.as_ref().map(|t| t.name()))
            .field("summarizer", &self.summarizer.name())
            .finish()
    }
}

impl MemoryManager {
    pub fn builder(config: Config) -> MemoryManagerBuilder {
        MemoryManagerBuilder {
            config,
            cache: None,
            archive: None,
            search: None,
            graph: None,
            summarizer: None,
        }
    }

    /// Manager over the in-memory reference tiers
    pub fn in_memory(config: Config) -> Self {
        let cache = Arc::new(InMemoryCache::new(&config.cache));
        Self::builder(config)
            .cache(cache)
            .archive(Arc::new(InMemoryArchive::new()))
            .search(Arc::new(InMemorySearch::new()))
            .graph(Arc::new(InMemoryGraph::new()))
            .build()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn has_tier(&self, tier: TierKind) -> bool {
        match tier {
            TierKind::Cache => self.cache.is_some(),
            TierKind::Archive => self.archive.is_some(),
            TierKind::Search => self.search.is_some(),
            TierKind::Graph => self.graph.is_some(),
        }
    }

    fn call_timeout(&self) -> Duration {
        self.config.tiers.call_timeout()
    }

    // ========================================================================
    // Write path
    // ========================================================================

    /// Store one turn and return its conversation id.
    ///
    /// Never fails because a tier is down: if the archive is unreachable the
    /// returned id is a local fallback id (`local-<uuid>`).
    pub async fn store(
        &self,
        user_id: &str,
        user_message: &str,
        bot_response: &str,
        metadata: Option<Metadata>,
    ) -> Result<String> {
        self.store_with_options(
            user_id,
            user_message,
            bot_response,
            metadata,
            StoreOptions::default(),
        )
        .await
        .map(|receipt| receipt.conversation_id)
    }

    /// Store one turn and report the outcome per tier.
    pub async fn store_with_options(
        &self,
        user_id: &str,
        user_message: &str,
        bot_response: &str,
        metadata: Option<Metadata>,
        options: StoreOptions,
    ) -> Result<StoreReceipt> {
        if user_id.trim().is_empty() {
            return Err(StrataError::InvalidInput("user_id must not be empty".into()));
        }
        let metadata = metadata.unwrap_or_default();
        let mut outcomes = HashMap::new();

        // Phase 1: archive, authoritative
        let archive_result = match &self.archive {
            Some(archive) => {
                call_tier(
                    TierKind::Archive,
                    self.call_timeout(),
                    archive.store(user_id, user_message, bot_response, metadata.clone()),
                )
                .await
            }
            None => Err(StrataError::unavailable(
                TierKind::Archive,
                "no archive tier configured",
            )),
        };

        let (conversation_id, archived) = match archive_result {
            Ok(id) => {
                outcomes.insert(TierKind::Archive, TierOutcome::Stored);
                (id, true)
            }
            Err(e) if options.require_archive => return Err(e),
            Err(e) => {
                let local_id = format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4());
                if e.is_degradable() {
                    tracing::warn!(user_id, local_id = %local_id, error = %e, "Archive write failed, using local id");
                } else {
                    tracing::error!(user_id, local_id = %local_id, error = %e, "Archive rejected write, using local id");
                }
                let outcome = if self.archive.is_some() {
                    TierOutcome::Failed(e.to_string())
                } else {
                    TierOutcome::Skipped
                };
                outcomes.insert(TierKind::Archive, outcome);
                (local_id, false)
            }
        };

        // Phase 2: derived tiers, best effort
        let derived = self
            .write_derived(&conversation_id, user_id, user_message, bot_response, &metadata)
            .await;

        match derived {
            Ok(derived_outcomes) => {
                outcomes.extend(derived_outcomes);
                let receipt = StoreReceipt {
                    conversation_id,
                    archived,
                    outcomes,
                };
                tracing::debug!(
                    user_id,
                    conversation_id = %receipt.conversation_id,
                    archived,
                    failed = ?receipt.failed_tiers(),
                    "Stored conversation"
                );
                Ok(receipt)
            }
            Err((stored, reason)) => {
                let mut to_undo = stored;
                if archived {
                    to_undo.push(TierKind::Archive);
                }
                tracing::error!(
                    conversation_id = %conversation_id,
                    reason = %reason,
                    compensating = ?to_undo,
                    "Derived write aborted unexpectedly, compensating"
                );
                self.compensate(&conversation_id, &to_undo).await;
                Err(StrataError::Systemic(format!(
                    "write of {conversation_id} aborted: {reason}"
                )))
            }
        }
    }

    /// Fan out the derived writes. `Err` carries the tiers already written and
    /// the reason when a write task panicked or was cancelled.
    async fn write_derived(
        &self,
        conversation_id: &str,
        user_id: &str,
        user_message: &str,
        bot_response: &str,
        metadata: &Metadata,
    ) -> std::result::Result<HashMap<TierKind, TierOutcome>, (Vec<TierKind>, String)> {
        let timeout = self.call_timeout();
        let mut outcomes = HashMap::new();

        // The cache append does not need the summary
        let cache_task = self.cache.as_ref().map(|cache| {
            let cache = Arc::clone(cache);
            let entry = CacheEntry::new(
                conversation_id,
                user_id,
                user_message,
                bot_response,
                metadata.clone(),
            );
            tokio::spawn(async move { call_tier(TierKind::Cache, timeout, cache.append(entry)).await })
        });

        let summary = {
            let summarizer = Arc::clone(&self.summarizer);
            let user_message = user_message.to_string();
            let bot_response = bot_response.to_string();
            let handle = tokio::spawn(async move {
                match tokio::time::timeout(
                    timeout,
                    summarizer.summarize(&user_message, &bot_response),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(StrataError::Summarizer(format!(
                        "timed out after {}ms",
                        timeout.as_millis()
                    ))),
                }
            });
            match handle.await {
                Ok(Ok(summary)) => Some(summary),
                Ok(Err(e)) => {
                    tracing::warn!(conversation_id, error = %e, "Summarizer failed");
                    outcomes.insert(TierKind::Search, TierOutcome::Failed(e.to_string()));
                    outcomes.insert(TierKind::Graph, TierOutcome::Failed(e.to_string()));
                    None
                }
                Err(e) => {
                    let mut stored = Vec::new();
                    if let Some(task) = cache_task {
                        if let Ok(Ok(())) = task.await {
                            stored.push(TierKind::Cache);
                        }
                    }
                    return Err((stored, format!("summarizer task: {e}")));
                }
            }
        };

        let search_task = match (&self.search, &summary) {
            (Some(search), Some(summary)) => {
                let search = Arc::clone(search);
                let record = SummaryRecord {
                    conversation_id: conversation_id.to_string(),
                    user_id: user_id.to_string(),
                    summary_text: summary.text.clone(),
                    topics: summary.topics.clone(),
                    intent: summary.intent.clone(),
                    emotional_tags: summary.emotional_tags.clone(),
                    created_at: Utc::now(),
                    metadata: metadata.clone(),
                };
                Some(tokio::spawn(async move {
                    call_tier(TierKind::Search, timeout, search.index(record)).await
                }))
            }
            _ => None,
        };

        let graph_task = match (&self.graph, &summary) {
            (Some(graph), Some(summary)) => {
                let graph = Arc::clone(graph);
                let conversation_id = conversation_id.to_string();
                let user_id = user_id.to_string();
                let topics = summary.topics.clone();
                let metadata = metadata.clone();
                Some(tokio::spawn(async move {
                    call_tier(
                        TierKind::Graph,
                        timeout,
                        graph.record_edges(&conversation_id, &user_id, &topics, metadata),
                    )
                    .await
                }))
            }
            _ => None,
        };

        let await_task = |task: Option<tokio::task::JoinHandle<Result<()>>>| async move {
            match task {
                Some(handle) => Some(handle.await),
                None => None,
            }
        };
        let (search_res, graph_res, cache_res) = tokio::join!(
            await_task(search_task),
            await_task(graph_task),
            await_task(cache_task)
        );

        let mut aborted: Option<String> = None;
        for (tier, result) in [
            (TierKind::Search, search_res),
            (TierKind::Graph, graph_res),
            (TierKind::Cache, cache_res),
        ] {
            match result {
                Some(Ok(result)) => {
                    outcomes.insert(tier, TierOutcome::from_result(tier, conversation_id, result));
                }
                Some(Err(join_err)) => {
                    aborted.get_or_insert_with(|| format!("{tier} write task: {join_err}"));
                }
                None => {
                    outcomes.entry(tier).or_insert(TierOutcome::Skipped);
                }
            }
        }

        match aborted {
            None => Ok(outcomes),
            Some(reason) => {
                let stored = outcomes
                    .iter()
                    .filter(|(_, o)| o.is_stored())
                    .map(|(t, _)| *t)
                    .collect();
                Err((stored, reason))
            }
        }
    }

    /// Best-effort removal of a partially written conversation.
    async fn compensate(&self, conversation_id: &str, tiers: &[TierKind]) {
        for tier in tiers {
            let outcome = self.delete_from(*tier, conversation_id).await;
            if let DeleteOutcome::Failed(e) = outcome {
                tracing::warn!(tier = %tier, conversation_id, error = %e, "Compensating delete failed");
            }
        }
    }

    async fn delete_from(&self, tier: TierKind, conversation_id: &str) -> DeleteOutcome {
        let timeout = self.call_timeout();
        let result = match tier {
            TierKind::Cache => match &self.cache {
                Some(t) => Some(call_tier(tier, timeout, t.remove(conversation_id)).await),
                None => None,
            },
            TierKind::Archive => match &self.archive {
                Some(t) => Some(call_tier(tier, timeout, t.delete(conversation_id)).await),
                None => None,
            },
            TierKind::Search => match &self.search {
                Some(t) => Some(call_tier(tier, timeout, t.delete(conversation_id)).await),
                None => None,
            },
            TierKind::Graph => match &self.graph {
                Some(t) => Some(call_tier(tier, timeout, t.delete(conversation_id)).await),
                None => None,
            },
        };

        match result {
            None => DeleteOutcome::Skipped,
            Some(Ok(true)) => DeleteOutcome::Deleted,
            Some(Ok(false)) => DeleteOutcome::NotFound,
            Some(Err(e)) => DeleteOutcome::Failed(e.to_string()),
        }
    }

    /// Remove a conversation from the derived tiers, and from the archive too
    /// when `include_archive` is set.
    pub async fn delete_derived(&self, conversation_id: &str, include_archive: bool) -> DeleteReport {
        let (search, graph, cache) = tokio::join!(
            self.delete_from(TierKind::Search, conversation_id),
            self.delete_from(TierKind::Graph, conversation_id),
            self.delete_from(TierKind::Cache, conversation_id),
        );

        let mut outcomes = HashMap::from([
            (TierKind::Search, search),
            (TierKind::Graph, graph),
            (TierKind::Cache, cache),
        ]);
        if include_archive {
            outcomes.insert(
                TierKind::Archive,
                self.delete_from(TierKind::Archive, conversation_id).await,
            );
        }

        DeleteReport {
            conversation_id: conversation_id.to_string(),
            outcomes,
        }
    }

    /// Read full records back from the archive.
    pub async fn fetch_conversations(&self, ids: &[String]) -> Result<Vec<ConversationRecord>> {
        let archive = self
            .archive
            .as_ref()
            .ok_or_else(|| StrataError::unavailable(TierKind::Archive, "no archive tier configured"))?;
        call_tier(TierKind::Archive, self.call_timeout(), archive.fetch(ids)).await
    }

    // ========================================================================
    // Read path
    // ========================================================================

    /// Assemble context for a query. Never fails; on any pipeline failure the
    /// result is a fallback context echoing the query.
    pub async fn get_context(
        &self,
        user_id: &str,
        query: &str,
        max_length: Option<usize>,
    ) -> AssembledContext {
        let max_length = max_length.unwrap_or(self.config.context.max_context_length);

        if query.trim().is_empty() {
            return AssembledContext::fallback(query, "no query given", max_length);
        }
        if user_id.trim().is_empty() {
            return AssembledContext::fallback(query, "no user given", max_length);
        }

        let deadline = self.config.context.deadline();
        let this = self.clone();
        let user = user_id.to_string();
        let q = query.to_string();
        let mut handle =
            tokio::spawn(async move { this.build_context(&user, &q, max_length).await });

        match tokio::time::timeout(deadline, &mut handle).await {
            Ok(Ok(context)) => context,
            Ok(Err(e)) => {
                tracing::warn!(user_id, error = %e, "Context pipeline failed, using fallback");
                AssembledContext::fallback(query, "conversation memory is temporarily unavailable", max_length)
            }
            Err(_) => {
                handle.abort();
                tracing::warn!(
                    user_id,
                    deadline_ms = deadline.as_millis() as u64,
                    "Context pipeline exceeded deadline, using fallback"
                );
                AssembledContext::fallback(query, "conversation memory took too long to respond", max_length)
            }
        }
    }

    async fn build_context(&self, user_id: &str, query: &str, max_length: usize) -> AssembledContext {
        let cfg = &self.config.context;
        let seeds = keywords(query, cfg.query_topics);

        let (recent, hits, topics) = tokio::join!(
            self.read_recent(user_id, cfg.recent_limit),
            self.read_search(user_id, query, cfg.search_limit),
            self.read_graph(user_id, &seeds, cfg.graph_limit),
        );

        let archive = self
            .read_archive(user_id, query, &recent, &hits, &topics)
            .await;

        tracing::debug!(
            user_id,
            recent = recent.len(),
            search = hits.len(),
            graph = topics.len(),
            archive = archive.len(),
            "Gathered context sources"
        );

        self.assembler.assemble(
            query,
            ContextSources {
                recent,
                search: hits,
                graph: topics,
                archive,
            },
            max_length,
        )
    }

    async fn read_recent(&self, user_id: &str, limit: usize) -> Vec<CacheEntry> {
        let Some(cache) = &self.cache else {
            return Vec::new();
        };
        call_tier(TierKind::Cache, self.call_timeout(), cache.recent(user_id, limit))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(tier = "cache", user_id, error = %e, "Tier read failed");
                Vec::new()
            })
    }

    async fn read_search(&self, user_id: &str, query: &str, limit: usize) -> Vec<SearchHit> {
        let Some(search) = &self.search else {
            return Vec::new();
        };
        // Recency is applied once, by the assembler
        call_tier(
            TierKind::Search,
            self.call_timeout(),
            search.query(user_id, query, limit, false),
        )
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(tier = "search", user_id, error = %e, "Tier read failed");
            Vec::new()
        })
    }

    async fn read_graph(&self, user_id: &str, seeds: &[String], limit: usize) -> Vec<TopicWeight> {
        let Some(graph) = &self.graph else {
            return Vec::new();
        };
        if seeds.is_empty() {
            return Vec::new();
        }
        call_tier(
            TierKind::Graph,
            self.call_timeout(),
            graph.related_topics(user_id, seeds, limit),
        )
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(tier = "graph", user_id, error = %e, "Tier read failed");
            Vec::new()
        })
    }

    /// Full records for the conversations the other tiers point at, or a
    /// windowed text search when nothing is referenced.
    async fn read_archive(
        &self,
        user_id: &str,
        query: &str,
        recent: &[CacheEntry],
        hits: &[SearchHit],
        topics: &[TopicWeight],
    ) -> Vec<ConversationRecord> {
        let Some(archive) = &self.archive else {
            return Vec::new();
        };
        let cfg = &self.config.context;
        let limit = cfg.archive_fetch_limit;
        if limit == 0 {
            return Vec::new();
        }

        let cached: HashSet<&str> = recent.iter().map(|e| e.conversation_id.as_str()).collect();
        let mut seen: HashSet<&str> = HashSet::new();
        let ids: Vec<String> = hits
            .iter()
            .map(|h| h.conversation_id.as_str())
            .chain(topics.iter().flat_map(|t| t.conversation_ids.iter().map(String::as_str)))
            .filter(|id| !id.starts_with(LOCAL_ID_PREFIX) && !cached.contains(id))
            .filter(|id| seen.insert(*id))
            .take(limit)
            .map(str::to_string)
            .collect();

        let result = if ids.is_empty() {
            let since = Utc::now() - chrono::Duration::days(cfg.history_window_days);
            call_tier(
                TierKind::Archive,
                self.call_timeout(),
                archive.search_text(user_id, query, Some(since), limit),
            )
            .await
            .map(|records| {
                records
                    .into_iter()
                    .filter(|r| !cached.contains(r.id.as_str()))
                    .collect::<Vec<_>>()
            })
        } else {
            call_tier(TierKind::Archive, self.call_timeout(), archive.fetch(&ids)).await
        };

        result.unwrap_or_else(|e| {
            tracing::warn!(tier = "archive", user_id, error = %e, "Tier read failed");
            Vec::new()
        })
    }

    // ========================================================================
    // Health
    // ========================================================================

    /// Ping all tiers concurrently.
    pub async fn health_check(&self) -> HealthReport {
        let timeout = self.config.tiers.health_timeout();

        async fn ping<F: Future<Output = bool>>(timeout: Duration, fut: Option<F>) -> bool {
            match fut {
                Some(fut) => tokio::time::timeout(timeout, fut).await.unwrap_or(false),
                None => false,
            }
        }

        let (cache, archive, search, graph) = tokio::join!(
            ping(timeout, self.cache.as_ref().map(|t| t.ping())),
            ping(timeout, self.archive.as_ref().map(|t| t.ping())),
            ping(timeout, self.search.as_ref().map(|t| t.ping())),
            ping(timeout, self.graph.as_ref().map(|t| t.ping())),
        );

        let healthy = [cache, archive, search, graph].iter().filter(|h| **h).count();
        let overall = healthy >= self.config.health.min_healthy_tiers;
        if !overall {
            tracing::warn!(
                healthy,
                required = self.config.health.min_healthy_tiers,
                "Memory tiers unhealthy"
            );
        }

        HealthReport {
            cache,
            archive,
            search,
            graph,
            healthy,
            overall,
        }
    }
}
