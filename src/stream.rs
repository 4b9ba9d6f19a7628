//! Stream chunks delivered to callers of a workflow run.

use std::pin::Pin;

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of a stream chunk.
///
/// Unknown kinds deserialize to [`ChunkType::Unknown`] so consumers can skip
/// them instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Text,
    Result,
    ToolCall,
    Summary,
    Complete,
    #[serde(other)]
    Unknown,
}

/// Chunk payload: a progress message or a structured record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkContent {
    Text(String),
    Structured(Value),
}

impl ChunkContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ChunkContent::Text(text) => Some(text),
            ChunkContent::Structured(_) => None,
        }
    }

    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            ChunkContent::Structured(value) => Some(value),
            ChunkContent::Text(_) => None,
        }
    }

    /// Look up a field of a structured payload.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.as_structured().and_then(|value| value.get(key))
    }
}

/// One unit of the ordered progress/result/completion sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub chunk_type: ChunkType,
    pub content: ChunkContent,
    pub timestamp: DateTime<Utc>,
    pub chunk_id: Option<String>,
}

impl StreamChunk {
    pub fn new(chunk_type: ChunkType, content: ChunkContent) -> Self {
        Self {
            chunk_type,
            content,
            timestamp: Utc::now(),
            chunk_id: None,
        }
    }

    pub fn text(message: impl Into<String>) -> Self {
        Self::new(ChunkType::Text, ChunkContent::Text(message.into()))
    }

    pub fn result(content: Value) -> Self {
        Self::new(ChunkType::Result, ChunkContent::Structured(content))
    }

    pub fn complete(content: Value) -> Self {
        Self::new(ChunkType::Complete, ChunkContent::Structured(content))
    }

    pub fn with_id(mut self, chunk_id: impl Into<String>) -> Self {
        self.chunk_id = Some(chunk_id.into());
        self
    }

    pub fn is_complete(&self) -> bool {
        self.chunk_type == ChunkType::Complete
    }

    /// True for a terminal chunk carrying an `error` field.
    pub fn is_error(&self) -> bool {
        self.is_complete() && self.content.field("error").is_some()
    }
}

/// Lazy, ordered, terminating sequence of chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;
