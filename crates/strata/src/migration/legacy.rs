//! Legacy single-tier store access and record parsing
//!
//! A legacy record is a document plus a flat metadata map. The user id must
//! be in `metadata.user_id`. The exchange comes from `metadata.user_message`
//! and `metadata.bot_response` when both are present, otherwise from a
//! document of the form:
//!
//! ```text
//! User: what goes on a margherita?
//! Bot: tomato, mozzarella and basil
//! ```
//!
//! `Assistant:` is accepted in place of `Bot:`; unprefixed lines continue the
//! previous speaker.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StrataError};
use crate::memory::types::{Metadata, ORIGINAL_CREATED_AT_KEY};

/// Metadata keys consumed by parsing and not replayed
const CONSUMED_KEYS: &[&str] = &["user_id", "user_message", "bot_response"];

/// One page of legacy records, as parallel arrays
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyPage {
    pub documents: Vec<String>,
    pub metadatas: Vec<Metadata>,
    pub ids: Vec<String>,
}

impl LegacyPage {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// (id, document, metadata) triples. A metadata or document missing from
    /// a ragged page reads as empty.
    pub fn records(&self) -> impl Iterator<Item = (&str, &str, Option<&Metadata>)> {
        self.ids.iter().enumerate().map(|(i, id)| {
            (
                id.as_str(),
                self.documents.get(i).map(String::as_str).unwrap_or(""),
                self.metadatas.get(i),
            )
        })
    }
}

/// Paged read access to the legacy store
#[async_trait]
pub trait LegacySource: Send + Sync {
    /// Total number of records in the collection
    async fn count(&self) -> Result<usize>;

    /// Up to `limit` records starting at `offset`, in stable order
    async fn get(&self, limit: usize, offset: usize) -> Result<LegacyPage>;

    /// Source name for logging and reports
    fn name(&self) -> &'static str;
}

/// One legacy record as stored on disk (one JSON object per line)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyDocument {
    pub id: String,
    #[serde(default)]
    pub document: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl LegacyDocument {
    pub fn new(id: impl Into<String>, document: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            document: document.into(),
            metadata,
        }
    }

    /// A well-formed record for `user_id` carrying the exchange in metadata
    pub fn turn(id: impl Into<String>, user_id: &str, user_message: &str, bot_response: &str) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("user_id".into(), Value::String(user_id.to_string()));
        metadata.insert("user_message".into(), Value::String(user_message.to_string()));
        metadata.insert("bot_response".into(), Value::String(bot_response.to_string()));
        Self::new(id, String::new(), metadata)
    }
}

fn page_of(documents: &[LegacyDocument], limit: usize, offset: usize) -> LegacyPage {
    let mut page = LegacyPage::default();
    for doc in documents.iter().skip(offset).take(limit) {
        page.ids.push(doc.id.clone());
        page.documents.push(doc.document.clone());
        page.metadatas.push(doc.metadata.clone());
    }
    page
}

/// Legacy source over records held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryLegacySource {
    documents: Vec<LegacyDocument>,
}

impl InMemoryLegacySource {
    pub fn new(documents: Vec<LegacyDocument>) -> Self {
        Self { documents }
    }

    pub fn push(&mut self, document: LegacyDocument) {
        self.documents.push(document);
    }
}

#[async_trait]
impl LegacySource for InMemoryLegacySource {
    async fn count(&self) -> Result<usize> {
        Ok(self.documents.len())
    }

    async fn get(&self, limit: usize, offset: usize) -> Result<LegacyPage> {
        Ok(page_of(&self.documents, limit, offset))
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}

/// Legacy source read from a JSON-lines export
///
/// Lines that are not valid JSON are kept as empty records under a
/// `line-<n>` id so the run reports them as skipped instead of failing.
#[derive(Debug, Clone)]
pub struct JsonlLegacySource {
    path: PathBuf,
    documents: Vec<LegacyDocument>,
}

impl JsonlLegacySource {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            StrataError::Systemic(format!("cannot open legacy export {}: {e}", path.display()))
        })?;

        let mut documents = Vec::new();
        for (n, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<LegacyDocument>(line) {
                Ok(doc) => documents.push(doc),
                Err(e) => {
                    tracing::warn!(line = n + 1, error = %e, "Unreadable legacy line");
                    documents.push(LegacyDocument::new(
                        format!("line-{}", n + 1),
                        String::new(),
                        Metadata::new(),
                    ));
                }
            }
        }

        tracing::info!(path = %path.display(), records = documents.len(), "Opened legacy export");
        Ok(Self { path, documents })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LegacySource for JsonlLegacySource {
    async fn count(&self) -> Result<usize> {
        Ok(self.documents.len())
    }

    async fn get(&self, limit: usize, offset: usize) -> Result<LegacyPage> {
        Ok(page_of(&self.documents, limit, offset))
    }

    fn name(&self) -> &'static str {
        "jsonl"
    }
}

/// A legacy record ready for replay
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLegacy {
    pub legacy_id: String,
    pub user_id: String,
    pub user_message: String,
    pub bot_response: String,
    pub timestamp: Option<DateTime<Utc>>,
    /// Legacy metadata minus the keys consumed by parsing
    pub metadata: Metadata,
}

impl ParsedLegacy {
    /// Metadata written with the replayed turn, marked with its origin
    pub fn replay_metadata(&self, migrated_at: DateTime<Utc>) -> Metadata {
        let mut metadata = self.metadata.clone();
        metadata.insert("legacy_id".into(), Value::String(self.legacy_id.clone()));
        metadata.insert("migrated_at".into(), Value::String(migrated_at.to_rfc3339()));
        if let Some(ts) = self.timestamp {
            metadata.insert(ORIGINAL_CREATED_AT_KEY.into(), Value::String(ts.to_rfc3339()));
        }
        metadata
    }
}

fn non_empty_str<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a str> {
    metadata
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Like `non_empty_str` but keeps surrounding whitespace, for message bodies
fn non_blank_str<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a str> {
    metadata
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// The record's user id, if it has a usable one
pub fn legacy_user_id(metadata: Option<&Metadata>) -> Option<&str> {
    metadata.and_then(|m| non_empty_str(m, "user_id"))
}

enum Speaker {
    User,
    Bot,
}

fn parse_document(document: &str) -> Option<(String, String)> {
    let mut user: Vec<&str> = Vec::new();
    let mut bot: Vec<&str> = Vec::new();
    let mut current: Option<Speaker> = None;

    for line in document.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("User:") {
            current = Some(Speaker::User);
            user.push(rest.trim());
        } else if let Some(rest) = trimmed
            .strip_prefix("Bot:")
            .or_else(|| trimmed.strip_prefix("Assistant:"))
        {
            current = Some(Speaker::Bot);
            bot.push(rest.trim());
        } else if !trimmed.is_empty() {
            match current {
                Some(Speaker::User) => user.push(trimmed),
                Some(Speaker::Bot) => bot.push(trimmed),
                None => {}
            }
        }
    }

    let user = user.join("\n").trim().to_string();
    let bot = bot.join("\n").trim().to_string();
    (!user.is_empty() && !bot.is_empty()).then_some((user, bot))
}

/// Parse one legacy record, or explain why it cannot be replayed.
pub fn parse_legacy(id: &str, document: &str, metadata: Option<&Metadata>) -> Result<ParsedLegacy> {
    let empty = Metadata::new();
    let metadata = metadata.unwrap_or(&empty);

    let user_id = non_empty_str(metadata, "user_id")
        .ok_or_else(|| StrataError::malformed(id, "missing metadata.user_id"))?;

    let (user_message, bot_response) = match (
        non_blank_str(metadata, "user_message"),
        non_blank_str(metadata, "bot_response"),
    ) {
        (Some(u), Some(b)) => (u.to_string(), b.to_string()),
        _ => parse_document(document)
            .ok_or_else(|| StrataError::malformed(id, "no user/bot exchange found"))?,
    };

    let timestamp = match metadata.get("timestamp").and_then(Value::as_str) {
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(e) => {
                tracing::debug!(id, raw, error = %e, "Ignoring unparseable legacy timestamp");
                None
            }
        },
        None => None,
    };

    let mut rest = metadata.clone();
    for key in CONSUMED_KEYS {
        rest.remove(*key);
    }

    Ok(ParsedLegacy {
        legacy_id: id.to_string(),
        user_id: user_id.to_string(),
        user_message,
        bot_response,
        timestamp,
        metadata: rest,
    })
}
