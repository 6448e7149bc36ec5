//! Integration tests for context assembly
//!
//! Tests scoring, filtering, ranking, per-source caps, the character budget
//! and rendering of the assembled context.

use chrono::{DateTime, Duration, Utc};
use strata::config::{ContextConfig, SourceCaps};
use strata::context::{ContextAssembler, ContextSources, TRUNCATION_MARKER};
use strata::memory::types::{CacheEntry, ConversationRecord, Metadata, SearchHit, TopicWeight};
use strata::tiers::TierKind;

fn now() -> DateTime<Utc> {
    Utc::now()
}

fn cache_entry(id: &str, msg: &str, resp: &str) -> CacheEntry {
    CacheEntry::new(id, "U", msg, resp, Metadata::new())
}

fn search_hit(id: &str, text: &str, similarity: f32, created_at: Option<DateTime<Utc>>) -> SearchHit {
    SearchHit {
        conversation_id: id.to_string(),
        user_id: "U".to_string(),
        summary_text: text.to_string(),
        topics: vec![],
        similarity,
        created_at,
        metadata: Metadata::new(),
    }
}

fn topic(name: &str, weight: f32, count: u32) -> TopicWeight {
    TopicWeight {
        topic: name.to_string(),
        weight,
        co_occurrence_count: count,
        last_seen: Some(Utc::now()),
        conversation_ids: vec![],
    }
}

fn archived(id: &str, msg: &str, resp: &str, age_days: i64) -> ConversationRecord {
    ConversationRecord {
        id: id.to_string(),
        user_id: "U".to_string(),
        user_message: msg.to_string(),
        bot_response: resp.to_string(),
        created_at: Utc::now() - Duration::days(age_days),
        metadata: Metadata::new(),
    }
}

fn big_sources(n: usize) -> ContextSources {
    ContextSources {
        recent: (0..n)
            .map(|i| cache_entry(&format!("c{i}"), &format!("pizza {i} {}", "a".repeat(i * 7)), "ok"))
            .collect(),
        search: (0..n)
            .map(|i| search_hit(&format!("s{i}"), &"pizza dough ".repeat(i + 1), 0.95, Some(now())))
            .collect(),
        graph: (0..n).map(|i| topic(&format!("topic{i}"), 1.0, 3)).collect(),
        archive: (0..n)
            .map(|i| archived(&format!("a{i}"), &"old pizza ".repeat(i + 1), "sure", 3))
            .collect(),
    }
}

// =============================================================================
// Budget
// =============================================================================

mod budget_tests {
    use super::*;

    #[test]
    fn test_length_never_exceeds_max() {
        let assembler = ContextAssembler::default();
        for max in [0usize, 1, 5, 19, 20, 21, 50, 100, 333, 1000, 4000, 10_000] {
            for n in [0usize, 1, 3, 12, 40] {
                let ctx = assembler.assemble("pizza dough", big_sources(n), max);
                assert!(
                    ctx.text.chars().count() <= max,
                    "max = {max}, n = {n}, len = {}",
                    ctx.text.chars().count()
                );
                assert_eq!(ctx.total_chars, ctx.text.chars().count());
            }
        }
    }

    #[test]
    fn test_greedy_selection_fits_without_truncation() {
        let assembler = ContextAssembler::default();
        let ctx = assembler.assemble("pizza dough", big_sources(12), 600);
        assert!(!ctx.selected.is_empty());
        assert!(!ctx.truncated);
        assert!(ctx.total_chars <= 600);
    }

    #[test]
    fn test_multibyte_text_truncates_on_char_boundary() {
        let assembler = ContextAssembler::default();
        let sources = ContextSources {
            recent: vec![cache_entry("c1", &"ピザ🍕".repeat(200), "はい")],
            ..Default::default()
        };
        let ctx = assembler.assemble("ピザ", sources, 100);
        assert!(ctx.truncated);
        assert_eq!(ctx.text.chars().count(), 100);
        assert!(ctx.text.ends_with(TRUNCATION_MARKER));
    }
}

// =============================================================================
// Scoring and filtering
// =============================================================================

mod scoring_tests {
    use super::*;

    #[test]
    fn test_search_hit_two_days_old() {
        let assembler = ContextAssembler::default();
        let sources = ContextSources {
            search: vec![search_hit(
                "s1",
                "Dinner plans with friends",
                0.9,
                Some(now() - Duration::days(2)),
            )],
            ..Default::default()
        };
        let ctx = assembler.assemble("pizza", sources, 4000);
        assert_eq!(ctx.selected.len(), 1);
        assert!((ctx.selected[0].relevance_score - 0.81).abs() < 1e-4);
        assert!((ctx.selected[0].rank_score() - 0.648).abs() < 1e-4);
    }

    #[test]
    fn test_overlap_boost_applies() {
        let assembler = ContextAssembler::default();
        let sources = ContextSources {
            search: vec![search_hit("s1", "pizza dough recipe", 0.5, Some(now()))],
            ..Default::default()
        };
        let ctx = assembler.assemble("pizza dough", sources, 4000);
        assert!((ctx.selected[0].relevance_score - 0.7).abs() < 1e-4);
    }

    #[test]
    fn test_missing_timestamp_is_oldest_bucket_not_excluded() {
        let assembler = ContextAssembler::default();
        let sources = ContextSources {
            search: vec![search_hit("s1", "Dinner plans with friends", 0.9, None)],
            ..Default::default()
        };
        let ctx = assembler.assemble("pizza", sources, 4000);
        assert_eq!(ctx.selected.len(), 1);
        assert!((ctx.selected[0].relevance_score - 0.36).abs() < 1e-4);
    }

    #[test]
    fn test_low_relevance_dropped() {
        let assembler = ContextAssembler::default();
        let sources = ContextSources {
            search: vec![
                search_hit("s1", "weather", 0.2, Some(now())),
                search_hit("s2", "travel", 0.6, Some(now() - Duration::days(200))),
            ],
            ..Default::default()
        };
        let ctx = assembler.assemble("pizza", sources, 4000);
        assert_eq!(ctx.candidates_considered, 2);
        assert!(ctx.selected.is_empty());
        assert!(ctx.text.contains("No relevant conversation history"));
        assert!(ctx.text.contains("pizza"));
    }

    #[test]
    fn test_min_relevance_is_configurable() {
        let config = ContextConfig {
            min_relevance: 0.0,
            ..ContextConfig::default()
        };
        let assembler = ContextAssembler::new(config);
        let sources = ContextSources {
            search: vec![search_hit("s1", "weather", 0.2, Some(now()))],
            ..Default::default()
        };
        let ctx = assembler.assemble("pizza", sources, 4000);
        assert_eq!(ctx.selected.len(), 1);
    }

    #[test]
    fn test_cache_recency_by_position() {
        let assembler = ContextAssembler::default();
        let sources = ContextSources {
            recent: (0..12)
                .map(|i| cache_entry(&format!("c{i}"), &format!("m{i}"), "r"))
                .collect(),
            ..Default::default()
        };
        let ctx = assembler.assemble("unrelated", sources, 4000);
        let natives: Vec<f32> = ctx.selected.iter().map(|c| c.native_score).collect();
        assert_eq!(natives, vec![1.0, 1.0, 0.9, 0.9, 0.9]);
    }

    #[test]
    fn test_graph_weights_normalised() {
        let assembler = ContextAssembler::default();
        let sources = ContextSources {
            graph: vec![topic("pizza", 4.0, 4), topic("italy", 2.0, 2)],
            ..Default::default()
        };
        let ctx = assembler.assemble("pizza", sources, 4000);
        assert_eq!(ctx.selected.len(), 2);
        assert!(ctx.selected.iter().all(|c| c.native_score <= 1.0));
        assert_eq!(ctx.selected[0].native_score, 1.0);
        assert_eq!(ctx.selected[1].native_score, 0.5);
    }
}

// =============================================================================
// Ranking, caps and rendering
// =============================================================================

mod selection_tests {
    use super::*;

    #[test]
    fn test_per_source_caps() {
        let assembler = ContextAssembler::default();
        let ctx = assembler.assemble("pizza dough", big_sources(10), 100_000);
        assert_eq!(ctx.count_for(TierKind::Cache), 5);
        assert_eq!(ctx.count_for(TierKind::Search), 4);
        assert_eq!(ctx.count_for(TierKind::Graph), 3);
        assert_eq!(ctx.count_for(TierKind::Archive), 2);
        assert_eq!(ctx.candidates_considered, 40);
    }

    #[test]
    fn test_caps_are_configurable() {
        let config = ContextConfig {
            caps: SourceCaps {
                cache: 1,
                search: 0,
                graph: 0,
                archive: 0,
            },
            ..ContextConfig::default()
        };
        let assembler = ContextAssembler::new(config);
        let ctx = assembler.assemble("pizza dough", big_sources(5), 100_000);
        assert_eq!(ctx.selected.len(), 1);
        assert_eq!(ctx.selected[0].source, TierKind::Cache);
    }

    #[test]
    fn test_priority_orders_equal_relevance() {
        let assembler = ContextAssembler::default();
        let sources = ContextSources {
            recent: vec![cache_entry("c1", "alpha", "beta")],
            search: vec![search_hit("s1", "gamma", 1.0, Some(now()))],
            ..Default::default()
        };
        let ctx = assembler.assemble("unrelated", sources, 4000);
        assert_eq!(ctx.selected[0].source, TierKind::Cache);
        assert_eq!(ctx.selected[1].source, TierKind::Search);
    }

    #[test]
    fn test_ties_prefer_newer_then_text() {
        let assembler = ContextAssembler::default();
        let older = Some(now() - Duration::hours(5));
        let newer = Some(now() - Duration::hours(1));
        let sources = ContextSources {
            search: vec![
                search_hit("s1", "bravo", 0.8, older),
                search_hit("s2", "charlie", 0.8, newer),
                search_hit("s3", "alpha", 0.8, older),
            ],
            ..Default::default()
        };
        let ctx = assembler.assemble("unrelated", sources, 4000);
        let texts: Vec<&str> = ctx.selected.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["charlie", "alpha", "bravo"]);
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let assembler = ContextAssembler::default();
        let at = now();
        let sources = big_sources(8);
        let a = assembler.assemble_at("pizza dough", sources.clone(), 1500, at);
        let b = assembler.assemble_at("pizza dough", sources, 1500, at);
        assert_eq!(a.text, b.text);
    }

    #[test]
    fn test_render_sections_in_order() {
        let assembler = ContextAssembler::default();
        let sources = ContextSources {
            recent: vec![cache_entry("c1", "pizza tonight?", "sure")],
            search: vec![search_hit("s1", "pizza dough recipe", 0.9, Some(now()))],
            graph: vec![topic("pizza", 1.0, 3)],
            archive: vec![archived("a1", "first pizza ever", "nice", 1)],
        };
        let ctx = assembler.assemble("pizza", sources, 4000);

        let headers = [
            "## Recent conversation",
            "## Relevant past conversations",
            "## Related topics",
            "## Earlier history",
        ];
        let positions: Vec<usize> = headers
            .iter()
            .map(|h| ctx.text.find(h).unwrap_or_else(|| panic!("missing {h}")))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(ctx.text.contains("- pizza (mentioned 3 times)"));
        assert!(ctx.text.contains("- User: first pizza ever / Assistant: nice"));
    }

    #[test]
    fn test_no_history_names_query() {
        let assembler = ContextAssembler::default();
        let ctx = assembler.assemble("best pizza in town", ContextSources::default(), 4000);
        assert!(ctx.text.contains("\"best pizza in town\""));
        assert!(ctx.selected.is_empty());
        assert!(!ctx.truncated);
    }
}
