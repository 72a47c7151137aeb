//! Run identifiers, chunk tokens and the object-key layout
//!
//! Workers and the reassembler never talk to each other; they agree on
//! where results live purely through the keys built here. All key
//! formatting and parsing goes through this module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

const TOKEN_PREFIX: &str = "chunk-";
const JSON_SUFFIX: &str = ".json";

/// Identifier of one fan-out/fan-in run
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Time-derived id with millisecond resolution, e.g. `20250501093000123`.
    pub fn generate() -> Self {
        Self::from_time(Utc::now())
    }

    pub fn from_time(at: DateTime<Utc>) -> Self {
        Self(at.format("%Y%m%d%H%M%S%3f").to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TokenParseError {
    #[error("chunk token must start with 'chunk-': {0}")]
    MissingPrefix(String),
    #[error("chunk token has no nonce: {0}")]
    MissingNonce(String),
    #[error("invalid chunk index in token: {0}")]
    InvalidIndex(String),
    #[error("invalid chunk nonce in token: {0}")]
    InvalidNonce(String),
}

/// Unique name of one chunk within a run.
///
/// Carries the one-based chunk index used to restore item order and a
/// random nonce so two dispatches can never write to the same key.
/// Canonical text form: `chunk-{index}-{nonce}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChunkToken {
    index: u32,
    nonce: Uuid,
}

impl ChunkToken {
    /// Fresh token for the chunk at `index` (one-based)
    pub fn new(index: u32) -> Self {
        Self {
            index,
            nonce: Uuid::new_v4(),
        }
    }

    pub fn with_nonce(index: u32, nonce: Uuid) -> Self {
        Self { index, nonce }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn nonce(&self) -> Uuid {
        self.nonce
    }
}

impl fmt::Display for ChunkToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}-{}", TOKEN_PREFIX, self.index, self.nonce)
    }
}

impl FromStr for ChunkToken {
    type Err = TokenParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(TOKEN_PREFIX)
            .ok_or_else(|| TokenParseError::MissingPrefix(s.to_string()))?;
        let (index, nonce) = rest
            .split_once('-')
            .ok_or_else(|| TokenParseError::MissingNonce(s.to_string()))?;
        let index = index
            .parse::<u32>()
            .map_err(|_| TokenParseError::InvalidIndex(s.to_string()))?;
        let nonce = Uuid::parse_str(nonce).map_err(|_| TokenParseError::InvalidNonce(s.to_string()))?;
        Ok(Self { index, nonce })
    }
}

impl TryFrom<String> for ChunkToken {
    type Error = TokenParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChunkToken> for String {
    fn from(token: ChunkToken) -> Self {
        token.to_string()
    }
}

/// Key layout of the result namespace.
///
/// ```text
/// {prefix}summarized_{run_id}_{chunk_token}.json    chunk artifact
/// {prefix}final_summarized_{run_id}.json            consolidated artifact
/// {prefix}archive/final_summarized_{run_id}.json    archived consolidated artifact
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultLayout {
    prefix: String,
}

impl ResultLayout {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Listing prefix covering every chunk artifact of a run
    pub fn chunk_prefix(&self, run_id: &RunId) -> String {
        format!("{}summarized_{}_", self.prefix, run_id)
    }

    pub fn chunk_key(&self, run_id: &RunId, token: &ChunkToken) -> String {
        format!("{}{}{}", self.chunk_prefix(run_id), token, JSON_SUFFIX)
    }

    /// Recover the chunk token from a chunk artifact key of `run_id`.
    ///
    /// Returns `None` for keys of other runs or keys that are not
    /// well-formed chunk artifacts.
    pub fn parse_chunk_key(&self, run_id: &RunId, key: &str) -> Option<ChunkToken> {
        key.strip_prefix(&self.chunk_prefix(run_id))?
            .strip_suffix(JSON_SUFFIX)?
            .parse()
            .ok()
    }

    /// Listing prefix covering every consolidated artifact
    pub fn final_prefix(&self) -> String {
        format!("{}final_summarized_", self.prefix)
    }

    pub fn final_key(&self, run_id: &RunId) -> String {
        format!("{}{}{}", self.final_prefix(), run_id, JSON_SUFFIX)
    }

    /// Recover the run id from a consolidated artifact key
    pub fn parse_final_key(&self, key: &str) -> Option<RunId> {
        let run = key.strip_prefix(&self.final_prefix())?.strip_suffix(JSON_SUFFIX)?;
        if run.is_empty() || run.contains('/') {
            return None;
        }
        Some(RunId::new(run))
    }

    pub fn archive_key(&self, run_id: &RunId) -> String {
        format!("{}archive/final_summarized_{}{}", self.prefix, run_id, JSON_SUFFIX)
    }
}

/// Key of a raw scrape snapshot, e.g. `scraper/scraped_articles_20250501_093000.json`
pub fn scrape_snapshot_key(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}scraped_articles_{}{}", prefix, at.format("%Y%m%d_%H%M%S"), JSON_SUFFIX)
}
