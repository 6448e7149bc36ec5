//! Context assembly
//!
//! Turns raw tier results into one bounded, relevance-ranked text block:
//! normalise → score → filter → rank → greedy select under budget → render.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::candidate::{ContextCandidate, source_order};
use super::scoring::{cache_recency_score, overlap_boost, relevance, time_decay};
use crate::config::ContextConfig;
use crate::memory::text::token_set;
use crate::memory::types::{
    CacheEntry, ConversationRecord, SearchHit, TopicWeight, effective_created_at, original_created_at,
};
use crate::tiers::TierKind;

/// Appended when the rendered context had to be cut
pub const TRUNCATION_MARKER: &str = "\n[context truncated]";

/// Raw results gathered from the tiers for one read
#[derive(Debug, Clone, Default)]
pub struct ContextSources {
    /// Cached turns, most recent first
    pub recent: Vec<CacheEntry>,
    pub search: Vec<SearchHit>,
    pub graph: Vec<TopicWeight>,
    pub archive: Vec<ConversationRecord>,
}

impl ContextSources {
    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
            && self.search.is_empty()
            && self.graph.is_empty()
            && self.archive.is_empty()
    }
}

/// The assembled context handed to the response generator
#[derive(Debug, Clone, Serialize)]
pub struct AssembledContext {
    pub text: String,
    /// Selected candidates in rank order
    pub selected: Vec<ContextCandidate>,
    pub source_counts: HashMap<TierKind, usize>,
    pub candidates_considered: usize,
    /// Length of `text` in characters
    pub total_chars: usize,
    pub assembly_duration: Duration,
    pub truncated: bool,
    /// True when the pipeline failed and only the query could be echoed
    pub fallback: bool,
}

impl AssembledContext {
    /// Minimal context carrying only the query and a note on why
    pub fn fallback(query: &str, note: &str, max_length: usize) -> Self {
        let text = format!("Current query: {query}\n({note})");
        let (text, truncated) = fit_to_budget(text, max_length);
        Self {
            total_chars: text.chars().count(),
            text,
            selected: Vec::new(),
            source_counts: HashMap::new(),
            candidates_considered: 0,
            assembly_duration: Duration::ZERO,
            truncated,
            fallback: true,
        }
    }

    pub fn count_for(&self, source: TierKind) -> usize {
        self.source_counts.get(&source).copied().unwrap_or(0)
    }
}

fn section_header(source: TierKind) -> &'static str {
    match source {
        TierKind::Cache => "## Recent conversation",
        TierKind::Search => "## Relevant past conversations",
        TierKind::Graph => "## Related topics",
        TierKind::Archive => "## Earlier history",
    }
}

/// Cut `text` to `max_length` characters, marker included.
fn fit_to_budget(text: String, max_length: usize) -> (String, bool) {
    if text.chars().count() <= max_length {
        return (text, false);
    }
    let marker_len = TRUNCATION_MARKER.chars().count();
    if max_length <= marker_len {
        return (text.chars().take(max_length).collect(), true);
    }
    let mut cut: String = text.chars().take(max_length - marker_len).collect();
    cut.push_str(TRUNCATION_MARKER);
    (cut, true)
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn turn_text(user_message: &str, bot_response: &str) -> String {
    format!(
        "User: {} / Assistant: {}",
        single_line(user_message),
        single_line(bot_response)
    )
}

/// Scores, ranks and renders context candidates
#[derive(Debug, Clone, Default)]
pub struct ContextAssembler {
    config: ContextConfig,
}

impl ContextAssembler {
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Assemble a context for `query` from the gathered tier results.
    pub fn assemble(&self, query: &str, sources: ContextSources, max_length: usize) -> AssembledContext {
        self.assemble_at(query, sources, max_length, Utc::now())
    }

    /// Same as [`assemble`](Self::assemble) with an explicit clock.
    pub fn assemble_at(
        &self,
        query: &str,
        sources: ContextSources,
        max_length: usize,
        now: DateTime<Utc>,
    ) -> AssembledContext {
        let started = Instant::now();

        let mut candidates = self.normalize(sources);
        let candidates_considered = candidates.len();
        if candidates.is_empty() {
            let text = format!("No relevant conversation history found for \"{query}\".");
            return self.finish(text, Vec::new(), 0, started, max_length);
        }

        let query_tokens = token_set(query);
        let scoring = &self.config.scoring;
        for candidate in &mut candidates {
            let boost = overlap_boost(&query_tokens, &candidate.text, scoring);
            let decay = time_decay(candidate.timestamp, now, scoring);
            candidate.relevance_score = relevance(candidate.native_score, boost, decay);
        }

        candidates.retain(|c| c.relevance_score >= self.config.min_relevance);
        Self::rank(&mut candidates);

        let selected = self.select(candidates, max_length);
        tracing::debug!(
            considered = candidates_considered,
            selected = selected.len(),
            max_length,
            "Assembled context"
        );

        let text = if selected.is_empty() {
            format!("No relevant conversation history found for \"{query}\".")
        } else {
            Self::render(&selected)
        };
        self.finish(text, selected, candidates_considered, started, max_length)
    }

    fn finish(
        &self,
        text: String,
        selected: Vec<ContextCandidate>,
        candidates_considered: usize,
        started: Instant,
        max_length: usize,
    ) -> AssembledContext {
        let (text, truncated) = fit_to_budget(text, max_length);
        if truncated {
            tracing::debug!(max_length, "Truncated assembled context");
        }

        let mut source_counts = HashMap::new();
        for candidate in &selected {
            *source_counts.entry(candidate.source).or_insert(0) += 1;
        }

        AssembledContext {
            total_chars: text.chars().count(),
            text,
            selected,
            source_counts,
            candidates_considered,
            assembly_duration: started.elapsed(),
            truncated,
            fallback: false,
        }
    }

    fn normalize(&self, sources: ContextSources) -> Vec<ContextCandidate> {
        let mut candidates = Vec::with_capacity(
            sources.recent.len() + sources.search.len() + sources.graph.len() + sources.archive.len(),
        );

        for (position, entry) in sources.recent.into_iter().enumerate() {
            candidates.push(
                ContextCandidate::new(
                    TierKind::Cache,
                    turn_text(&entry.user_message, &entry.bot_response),
                    cache_recency_score(position),
                )
                .with_timestamp(Some(effective_created_at(&entry.metadata, entry.created_at)))
                .with_conversation_id(entry.conversation_id)
                .with_metadata(entry.metadata),
            );
        }

        for hit in sources.search {
            candidates.push(
                ContextCandidate::new(
                    TierKind::Search,
                    single_line(&hit.summary_text),
                    hit.similarity.clamp(0.0, 1.0),
                )
                .with_timestamp(original_created_at(&hit.metadata).or(hit.created_at))
                .with_conversation_id(hit.conversation_id)
                .with_metadata(hit.metadata),
            );
        }

        let max_weight = sources
            .graph
            .iter()
            .map(|t| t.weight)
            .fold(0.0f32, f32::max);
        for topic in sources.graph {
            let native = if max_weight > 1.0 {
                topic.weight / max_weight
            } else {
                topic.weight
            };
            let text = if topic.co_occurrence_count > 1 {
                format!("{} (mentioned {} times)", topic.topic, topic.co_occurrence_count)
            } else {
                topic.topic.clone()
            };
            candidates.push(
                ContextCandidate::new(TierKind::Graph, text, native.clamp(0.0, 1.0))
                    .with_timestamp(topic.last_seen),
            );
        }

        let archive_base = self.config.scoring.archive_base_score;
        for record in sources.archive {
            candidates.push(
                ContextCandidate::new(
                    TierKind::Archive,
                    turn_text(&record.user_message, &record.bot_response),
                    archive_base,
                )
                .with_timestamp(Some(effective_created_at(&record.metadata, record.created_at)))
                .with_conversation_id(record.id)
                .with_metadata(record.metadata),
            );
        }

        candidates
    }

    /// Highest rank score first; ties go to newer, then source order, then text.
    fn rank(candidates: &mut [ContextCandidate]) {
        candidates.sort_by(|a, b| {
            b.rank_score()
                .total_cmp(&a.rank_score())
                .then_with(|| b.timestamp.cmp(&a.timestamp))
                .then_with(|| source_order(a.source).cmp(&source_order(b.source)))
                .then_with(|| a.text.cmp(&b.text))
        });
    }

    fn cap_for(&self, source: TierKind) -> usize {
        let caps = &self.config.caps;
        match source {
            TierKind::Cache => caps.cache,
            TierKind::Search => caps.search,
            TierKind::Graph => caps.graph,
            TierKind::Archive => caps.archive,
        }
    }

    /// Greedy pick in rank order. The rendering cost estimate never
    /// undercounts, so whatever is picked renders within `max_length`; only
    /// a top candidate larger than the whole budget gets truncated later.
    fn select(&self, ranked: Vec<ContextCandidate>, max_length: usize) -> Vec<ContextCandidate> {
        let mut selected: Vec<ContextCandidate> = Vec::new();
        let mut per_source: HashMap<TierKind, usize> = HashMap::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut used = 0usize;

        for candidate in ranked {
            let taken = per_source.get(&candidate.source).copied().unwrap_or(0);
            if taken >= self.cap_for(candidate.source) {
                continue;
            }
            if let Some(id) = &candidate.conversation_id {
                if seen_ids.contains(id) {
                    continue;
                }
            }

            let mut cost = candidate.text.chars().count() + 3;
            if taken == 0 {
                cost += section_header(candidate.source).chars().count() + 2;
            }
            if used + cost > max_length && !selected.is_empty() {
                continue;
            }

            used += cost;
            *per_source.entry(candidate.source).or_insert(0) += 1;
            if let Some(id) = &candidate.conversation_id {
                seen_ids.insert(id.clone());
            }
            selected.push(candidate);
        }

        selected
    }

    fn render(selected: &[ContextCandidate]) -> String {
        let mut sources: Vec<TierKind> = selected.iter().map(|c| c.source).collect();
        sources.sort_by_key(|s| source_order(*s));
        sources.dedup();

        let sections: Vec<String> = sources
            .into_iter()
            .map(|source| {
                let mut section = String::from(section_header(source));
                for candidate in selected.iter().filter(|c| c.source == source) {
                    section.push_str("\n- ");
                    section.push_str(&candidate.text);
                }
                section
            })
            .collect();

        sections.join("\n\n")
    }
}
