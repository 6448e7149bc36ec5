//! Test utilities for strata - misbehaving tiers and legacy fixtures
//!
//! This module provides tier implementations that fail in controlled ways so
//! degradation, compensation and abort paths can be exercised without real
//! backing stores:
//! - [`FailingTier`]: every call errors, every ping reports down
//! - [`SlowTier`]: every call sleeps before answering
//! - [`PanickingTier`]: writes panic inside the spawned task
//! - [`FlakyArchive`]: an in-memory archive that rejects chosen stores
//! - [`FailingLegacySource`]: a legacy source whose reads can be made to fail

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::error::{Result, StrataError};
use crate::manager::MemoryManager;
use crate::memory::types::{
    CacheEntry, ConversationRecord, Metadata, SearchHit, SummaryRecord, TopicWeight,
};
use crate::migration::legacy::{InMemoryLegacySource, LegacyDocument, LegacyPage, LegacySource};
use crate::tiers::{
    ArchiveTier, CacheTier, GraphTier, InMemoryArchive, InMemoryCache, InMemoryGraph,
    InMemorySearch, SearchTier, TierKind,
};

/// Handles to the reference tiers behind a manager, for inspecting state
#[derive(Clone)]
pub struct ReferenceTiers {
    pub cache: Arc<InMemoryCache>,
    pub archive: Arc<InMemoryArchive>,
    pub search: Arc<InMemorySearch>,
    pub graph: Arc<InMemoryGraph>,
}

impl ReferenceTiers {
    pub fn new(config: &Config) -> Self {
        Self {
            cache: Arc::new(InMemoryCache::new(&config.cache)),
            archive: Arc::new(InMemoryArchive::new()),
            search: Arc::new(InMemorySearch::new()),
            graph: Arc::new(InMemoryGraph::new()),
        }
    }

    /// Manager wired to these tiers
    pub fn manager(&self, config: Config) -> MemoryManager {
        MemoryManager::builder(config)
            .cache(self.cache.clone())
            .archive(self.archive.clone())
            .search(self.search.clone())
            .graph(self.graph.clone())
            .build()
    }
}

/// Tier whose every call fails as unavailable
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingTier;

impl FailingTier {
    fn err<T>(tier: TierKind) -> Result<T> {
        Err(StrataError::unavailable(tier, "simulated outage"))
    }
}

#[async_trait]
impl CacheTier for FailingTier {
    async fn append(&self, _entry: CacheEntry) -> Result<()> {
        Self::err(TierKind::Cache)
    }
    async fn recent(&self, _user_id: &str, _limit: usize) -> Result<Vec<CacheEntry>> {
        Self::err(TierKind::Cache)
    }
    async fn count(&self, _user_id: &str) -> Result<usize> {
        Self::err(TierKind::Cache)
    }
    async fn clear(&self, _user_id: &str) -> Result<()> {
        Self::err(TierKind::Cache)
    }
    async fn remove(&self, _conversation_id: &str) -> Result<bool> {
        Self::err(TierKind::Cache)
    }
    async fn ping(&self) -> bool {
        false
    }
    fn name(&self) -> &'static str {
        "failing"
    }
}

#[async_trait]
impl ArchiveTier for FailingTier {
    async fn store(&self, _u: &str, _m: &str, _r: &str, _md: Metadata) -> Result<String> {
        Self::err(TierKind::Archive)
    }
    async fn fetch(&self, _ids: &[String]) -> Result<Vec<ConversationRecord>> {
        Self::err(TierKind::Archive)
    }
    async fn search_text(
        &self,
        _user_id: &str,
        _query: &str,
        _since: Option<DateTime<Utc>>,
        _limit: usize,
    ) -> Result<Vec<ConversationRecord>> {
        Self::err(TierKind::Archive)
    }
    async fn delete(&self, _id: &str) -> Result<bool> {
        Self::err(TierKind::Archive)
    }
    async fn ping(&self) -> bool {
        false
    }
    fn name(&self) -> &'static str {
        "failing"
    }
}

#[async_trait]
impl SearchTier for FailingTier {
    async fn index(&self, _summary: SummaryRecord) -> Result<()> {
        Self::err(TierKind::Search)
    }
    async fn query(&self, _u: &str, _t: &str, _l: usize, _d: bool) -> Result<Vec<SearchHit>> {
        Self::err(TierKind::Search)
    }
    async fn query_by_topics(&self, _u: &str, _t: &[String], _l: usize) -> Result<Vec<SearchHit>> {
        Self::err(TierKind::Search)
    }
    async fn delete(&self, _id: &str) -> Result<bool> {
        Self::err(TierKind::Search)
    }
    async fn ping(&self) -> bool {
        false
    }
    fn name(&self) -> &'static str {
        "failing"
    }
}

#[async_trait]
impl GraphTier for FailingTier {
    async fn record_edges(&self, _c: &str, _u: &str, _t: &[String], _m: Metadata) -> Result<()> {
        Self::err(TierKind::Graph)
    }
    async fn related_topics(&self, _u: &str, _s: &[String], _l: usize) -> Result<Vec<TopicWeight>> {
        Self::err(TierKind::Graph)
    }
    async fn delete(&self, _id: &str) -> Result<bool> {
        Self::err(TierKind::Graph)
    }
    async fn ping(&self) -> bool {
        false
    }
    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Tier that answers every call with empty success after `delay`
#[derive(Debug, Clone, Copy)]
pub struct SlowTier {
    pub delay: Duration,
}

impl SlowTier {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl CacheTier for SlowTier {
    async fn append(&self, _entry: CacheEntry) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
    async fn recent(&self, _user_id: &str, _limit: usize) -> Result<Vec<CacheEntry>> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }
    async fn count(&self, _user_id: &str) -> Result<usize> {
        tokio::time::sleep(self.delay).await;
        Ok(0)
    }
    async fn clear(&self, _user_id: &str) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
    async fn remove(&self, _conversation_id: &str) -> Result<bool> {
        tokio::time::sleep(self.delay).await;
        Ok(false)
    }
    async fn ping(&self) -> bool {
        tokio::time::sleep(self.delay).await;
        true
    }
    fn name(&self) -> &'static str {
        "slow"
    }
}

#[async_trait]
impl SearchTier for SlowTier {
    async fn index(&self, _summary: SummaryRecord) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
    async fn query(&self, _u: &str, _t: &str, _l: usize, _d: bool) -> Result<Vec<SearchHit>> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }
    async fn query_by_topics(&self, _u: &str, _t: &[String], _l: usize) -> Result<Vec<SearchHit>> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }
    async fn delete(&self, _id: &str) -> Result<bool> {
        tokio::time::sleep(self.delay).await;
        Ok(false)
    }
    async fn ping(&self) -> bool {
        tokio::time::sleep(self.delay).await;
        true
    }
    fn name(&self) -> &'static str {
        "slow"
    }
}

/// Tier whose writes panic
#[derive(Debug, Clone, Copy, Default)]
pub struct PanickingTier;

#[async_trait]
impl SearchTier for PanickingTier {
    async fn index(&self, _summary: SummaryRecord) -> Result<()> {
        panic!("simulated search adapter bug");
    }
    async fn query(&self, _u: &str, _t: &str, _l: usize, _d: bool) -> Result<Vec<SearchHit>> {
        panic!("simulated search adapter bug");
    }
    async fn query_by_topics(&self, _u: &str, _t: &[String], _l: usize) -> Result<Vec<SearchHit>> {
        Ok(Vec::new())
    }
    async fn delete(&self, _id: &str) -> Result<bool> {
        Ok(false)
    }
    async fn ping(&self) -> bool {
        true
    }
    fn name(&self) -> &'static str {
        "panicking"
    }
}

/// In-memory archive that fails selected stores
///
/// A store fails when the user message contains the configured marker, or
/// while the archive is switched down.
#[derive(Debug, Default)]
pub struct FlakyArchive {
    inner: InMemoryArchive,
    fail_marker: Option<String>,
    down: AtomicBool,
    failures: AtomicUsize,
}

impl FlakyArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every store whose user message contains `marker`
    pub fn failing_on(marker: impl Into<String>) -> Self {
        Self {
            fail_marker: Some(marker.into()),
            ..Self::default()
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Number of stores rejected so far
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &InMemoryArchive {
        &self.inner
    }
}

#[async_trait]
impl ArchiveTier for FlakyArchive {
    async fn store(
        &self,
        user_id: &str,
        user_message: &str,
        bot_response: &str,
        metadata: Metadata,
    ) -> Result<String> {
        let marked = self
            .fail_marker
            .as_deref()
            .is_some_and(|m| user_message.contains(m));
        if marked || self.down.load(Ordering::SeqCst) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(StrataError::unavailable(TierKind::Archive, "connection refused"));
        }
        self.inner.store(user_id, user_message, bot_response, metadata).await
    }

    async fn fetch(&self, ids: &[String]) -> Result<Vec<ConversationRecord>> {
        self.inner.fetch(ids).await
    }

    async fn search_text(
        &self,
        user_id: &str,
        query: &str,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ConversationRecord>> {
        self.inner.search_text(user_id, query, since, limit).await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.inner.delete(id).await
    }

    async fn ping(&self) -> bool {
        !self.down.load(Ordering::SeqCst)
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

/// Legacy source that can fail its count or a page read
#[derive(Debug, Default)]
pub struct FailingLegacySource {
    inner: InMemoryLegacySource,
    fail_count: bool,
    fail_from_offset: Option<usize>,
}

impl FailingLegacySource {
    /// Source that cannot even be counted
    pub fn unopenable() -> Self {
        Self {
            fail_count: true,
            ..Self::default()
        }
    }

    /// Source that serves `documents` but fails any page at or past `offset`
    pub fn failing_from(documents: Vec<LegacyDocument>, offset: usize) -> Self {
        Self {
            inner: InMemoryLegacySource::new(documents),
            fail_count: false,
            fail_from_offset: Some(offset),
        }
    }
}

#[async_trait]
impl LegacySource for FailingLegacySource {
    async fn count(&self) -> Result<usize> {
        if self.fail_count {
            return Err(StrataError::Systemic("legacy collection not found".into()));
        }
        self.inner.count().await
    }

    async fn get(&self, limit: usize, offset: usize) -> Result<LegacyPage> {
        if self.fail_from_offset.is_some_and(|from| offset >= from) {
            return Err(StrataError::Systemic("legacy store connection reset".into()));
        }
        self.inner.get(limit, offset).await
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// `n` well-formed legacy turns for `user_id`, ids `L0..L{n-1}`
pub fn legacy_turns(user_id: &str, n: usize) -> Vec<LegacyDocument> {
    (0..n)
        .map(|i| {
            LegacyDocument::turn(
                format!("L{i}"),
                user_id,
                &format!("question number {i} about pizza"),
                &format!("answer number {i} about dough"),
            )
        })
        .collect()
}

/// A legacy record with no user id
pub fn malformed_legacy(id: &str) -> LegacyDocument {
    LegacyDocument::new(id, "no speaker labels here", Metadata::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_flaky_archive_fails_marked_stores() {
        let archive = FlakyArchive::failing_on("[fail]");
        assert!(archive.store("u1", "ok", "ok", Metadata::new()).await.is_ok());
        assert!(archive.store("u1", "[fail] x", "ok", Metadata::new()).await.is_err());
        assert_eq!(archive.failures(), 1);
        assert_eq!(archive.inner().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_legacy_source() {
        assert!(FailingLegacySource::unopenable().count().await.is_err());

        let source = FailingLegacySource::failing_from(legacy_turns("u1", 10), 5);
        assert_eq!(source.get(5, 0).await.unwrap().len(), 5);
        assert!(source.get(5, 5).await.is_err());
    }
}
