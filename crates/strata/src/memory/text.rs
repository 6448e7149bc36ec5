//! Keyword helpers shared by summarization, the reference tiers and scoring

use std::collections::{HashMap, HashSet};

/// Words too common to say anything about relevance
const STOPWORDS: &[&str] = &[
    "a", "about", "after", "again", "all", "also", "am", "an", "and", "any", "are", "as", "at",
    "be", "been", "before", "being", "but", "by", "can", "could", "did", "do", "does", "doing",
    "for", "from", "get", "got", "had", "has", "have", "having", "he", "her", "here", "him",
    "his", "how", "i", "if", "in", "into", "is", "it", "its", "just", "like", "me", "more",
    "most", "my", "no", "not", "now", "of", "on", "one", "only", "or", "other", "our", "out",
    "over", "really", "so", "some", "such", "than", "that", "the", "their", "them", "then",
    "there", "these", "they", "this", "those", "to", "too", "up", "us", "very", "was", "we",
    "well", "were", "what", "when", "where", "which", "while", "who", "why", "will", "with", "would",
    "you", "your", "yours", "yes", "ok", "okay", "im", "dont", "thats",
];

/// Words that mark a turn as emotionally charged
const EMOTIONAL_WORDS: &[(&str, &str)] = &[
    ("love", "joy"),
    ("happy", "joy"),
    ("amazing", "joy"),
    ("wonderful", "joy"),
    ("great", "joy"),
    ("excited", "joy"),
    ("thanks", "gratitude"),
    ("thank", "gratitude"),
    ("grateful", "gratitude"),
    ("sad", "sadness"),
    ("miss", "sadness"),
    ("lonely", "sadness"),
    ("hate", "anger"),
    ("angry", "anger"),
    ("annoyed", "anger"),
    ("terrible", "anger"),
    ("awful", "anger"),
    ("worried", "fear"),
    ("afraid", "fear"),
    ("scared", "fear"),
    ("anxious", "fear"),
];

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Lowercased alphanumeric tokens with stopwords and one-letter tokens removed.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .filter(|t| t.chars().count() > 1 && !is_stopword(t))
        .collect()
}

/// Distinct tokens of `text`
pub fn token_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// Number of distinct tokens shared by the two texts
pub fn shared_token_count(query: &HashSet<String>, text: &str) -> usize {
    if query.is_empty() {
        return 0;
    }
    token_set(text)
        .iter()
        .filter(|t| query.contains(*t))
        .count()
}

/// Most frequent keywords of `text`, ties broken by first appearance.
pub fn keywords(text: &str, limit: usize) -> Vec<String> {
    let tokens: Vec<String> = tokenize(text)
        .into_iter()
        .filter(|t| t.chars().count() >= 3 && !t.chars().all(|c| c.is_ascii_digit()))
        .collect();

    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, token) in tokens.iter().enumerate() {
        counts
            .entry(token.as_str())
            .and_modify(|(count, _)| *count += 1)
            .or_insert((1, position));
    }

    let mut ranked: Vec<(&str, usize, usize)> = counts
        .into_iter()
        .map(|(token, (count, first))| (token, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.2.cmp(&b.2)));

    ranked
        .into_iter()
        .take(limit)
        .map(|(token, _, _)| token.to_string())
        .collect()
}

/// Emotion labels present in `text`, deduplicated, in lexicon order.
pub fn emotional_tags(text: &str) -> Vec<String> {
    let tokens = token_set(text);
    let mut tags: Vec<String> = Vec::new();
    for (word, tag) in EMOTIONAL_WORDS {
        if tokens.contains(*word) && !tags.iter().any(|t| t == tag) {
            tags.push((*tag).to_string());
        }
    }
    tags
}

/// Cut `text` to at most `max_chars` characters, ending with "..." when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= 3 {
        return text.chars().take(max_chars).collect();
    }
    let mut out: String = text.chars().take(max_chars - 3).collect();
    out.push_str("...");
    out
}
