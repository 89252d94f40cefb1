use std::fmt;

use serde::{Deserialize, Serialize};

use crate::annotator::GenerationParams;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: bool,
}

/// One line of the batch request file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub custom_id: String,
    pub method: String,
    pub url: String,
    pub body: RequestBody,
}

/// Identifier as it appears in persisted annotation records: either a bare
/// integer or a composite string such as `tuple-7`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CustomId {
    Number(i64),
    Text(String),
}

impl fmt::Display for CustomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for CustomId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub custom_id: CustomId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnnotationRecord {
    pub fn response(custom_id: CustomId, response: impl Into<String>) -> Self {
        Self {
            custom_id,
            response: Some(response.into()),
            error: None,
        }
    }

    pub fn error(custom_id: CustomId, error: impl Into<String>) -> Self {
        Self {
            custom_id,
            response: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InputFile {
    pub path: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrepareRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub tuples: InputFile,
    pub requests_path: String,
    pub model: String,
    pub api_url: String,
    pub tuple_count: usize,
    pub request_count: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnnotateRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub started_at: String,
    pub completed_at: String,
    pub requests: InputFile,
    pub annotations_path: String,
    pub api_url: String,
    pub generation: GenerationParams,
    pub request_count: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_ms: u128,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ScoreCounts {
    pub records_loaded: usize,
    pub invalid_records: usize,
    pub judgments_folded: usize,
    pub transport_errors: usize,
    pub missing_responses: usize,
    pub malformed_json: usize,
    pub missing_keys: usize,
    pub invalid_positions: usize,
    pub unresolvable_ids: usize,
    pub unknown_tuples: usize,
    pub degenerate_judgments: usize,
    pub out_of_range_judgments: usize,
    pub distinct_texts: usize,
    pub distinct_scores: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub tuples: InputFile,
    pub annotations: InputFile,
    pub scores_path: String,
    pub counts: ScoreCounts,
    pub distinct_score_values: Vec<f64>,
    pub warnings: Vec<String>,
}
