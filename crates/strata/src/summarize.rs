//! Summarization and topic extraction for derived tiers
//!
//! The manager feeds every stored turn through a [`Summarizer`] to produce the
//! short text indexed by the search tier and the topics recorded in the graph.
//! [`KeywordSummarizer`] is the built-in, model-free implementation.

use async_trait::async_trait;

use crate::config::SummarizerConfig;
use crate::error::Result;
use crate::memory::text::{emotional_tags, keywords, truncate_chars};

/// Derived view of one conversation turn
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Summary {
    /// Short summary text, bounded by the summarizer's character limit
    pub text: String,
    pub topics: Vec<String>,
    /// Coarse intent label: question, greeting, request or statement
    pub intent: String,
    pub emotional_tags: Vec<String>,
}

/// Trait for summarizers (keyword heuristics, local model, remote API)
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize one user/bot exchange
    async fn summarize(&self, user_message: &str, bot_response: &str) -> Result<Summary>;

    /// Summarizer name for logging
    fn name(&self) -> &'static str;
}

const GREETINGS: &[&str] = &[
    "hi", "hello", "hey", "hiya", "howdy", "greetings", "morning", "evening",
];

const REQUEST_LEADS: &[&str] = &[
    "please", "can", "could", "would", "help", "show", "tell", "give", "make", "write",
    "explain", "find", "recommend", "suggest",
];

const MODAL_LEADS: &[&str] = &["can", "could", "would"];

const QUESTION_LEADS: &[&str] = &[
    "what", "why", "how", "when", "where", "who", "which", "is", "are", "do", "does",
];

/// Heuristic summarizer built on keyword frequency
#[derive(Debug, Clone)]
pub struct KeywordSummarizer {
    max_summary_chars: usize,
    max_topics: usize,
}

impl KeywordSummarizer {
    pub fn new(config: &SummarizerConfig) -> Self {
        Self {
            max_summary_chars: config.max_summary_chars,
            max_topics: config.max_topics,
        }
    }

    fn first_sentence(text: &str) -> &str {
        let text = text.trim();
        match text.find(['.', '!', '?', '\n']) {
            Some(end) => {
                // keep the terminator itself, which is always one byte
                let end = (end + 1).min(text.len());
                text[..end].trim()
            }
            None => text,
        }
    }

    fn classify(user_message: &str) -> &'static str {
        let trimmed = user_message.trim();
        let lowered = trimmed.to_lowercase();
        let first = lowered
            .split(|c: char| !c.is_alphanumeric())
            .find(|w| !w.is_empty())
            .unwrap_or("");

        if GREETINGS.contains(&first) && trimmed.split_whitespace().count() <= 4 {
            "greeting"
        } else if trimmed.ends_with('?') {
            if MODAL_LEADS.contains(&first) {
                "request"
            } else {
                "question"
            }
        } else if REQUEST_LEADS.contains(&first) {
            "request"
        } else if QUESTION_LEADS.contains(&first) {
            "question"
        } else {
            "statement"
        }
    }
}

impl Default for KeywordSummarizer {
    fn default() -> Self {
        Self::new(&SummarizerConfig::default())
    }
}

#[async_trait]
impl Summarizer for KeywordSummarizer {
    async fn summarize(&self, user_message: &str, bot_response: &str) -> Result<Summary> {
        let user_part = Self::first_sentence(user_message);
        let bot_part = Self::first_sentence(bot_response);
        let joined = match (user_part.is_empty(), bot_part.is_empty()) {
            (false, false) => format!("{user_part} / {bot_part}"),
            (false, true) => user_part.to_string(),
            (true, _) => bot_part.to_string(),
        };

        let combined = format!("{user_message}\n{bot_response}");
        Ok(Summary {
            text: truncate_chars(&joined, self.max_summary_chars),
            topics: keywords(&combined, self.max_topics),
            intent: Self::classify(user_message).to_string(),
            emotional_tags: emotional_tags(&combined),
        })
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}
