use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::model::{AnnotationRecord, CustomId};

pub const BEST_KEY: &str = "Best";
pub const WORST_KEY: &str = "Worst";

/// Annotator answers may carry a position as `2` or as `[2]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PositionValue {
    Index(i64),
    Sequence(Vec<i64>),
}

impl PositionValue {
    pub fn index(&self) -> Option<i64> {
        match self {
            Self::Index(value) => Some(*value),
            Self::Sequence(values) => values.first().copied(),
        }
    }
}

/// Best/worst choice for one tuple, as 0-based slot positions.
///
/// Positions are carried as given by the annotator and may point outside the
/// tuple (`0` becomes `-1`); such a position matches no slot when folded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Judgment {
    pub custom_id: u64,
    pub best_position: i64,
    pub worst_position: i64,
}

impl Judgment {
    pub fn is_degenerate(&self) -> bool {
        self.best_position == self.worst_position
    }

    pub fn has_position_outside(&self, len: usize) -> bool {
        let slots = 0..len as i64;
        !slots.contains(&self.best_position) || !slots.contains(&self.worst_position)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JudgmentError {
    #[error("annotation entry {entry} is not a valid record: {message}")]
    InvalidRecord { entry: usize, message: String },

    #[error("unresolvable custom_id `{raw}`")]
    UnresolvableId { raw: String },

    #[error("annotation failed for custom_id {custom_id}: {detail}")]
    Transport { custom_id: u64, detail: String },

    #[error("no response found for custom_id {custom_id}")]
    MissingResponse { custom_id: u64 },

    #[error("invalid JSON for custom_id {custom_id}: {message}")]
    MalformedJson {
        custom_id: u64,
        raw: String,
        message: String,
    },

    #[error("response for custom_id {custom_id} has no `{key}` entry")]
    MissingKey {
        custom_id: u64,
        key: &'static str,
        raw: String,
    },

    #[error("response for custom_id {custom_id} has an invalid `{key}` position")]
    InvalidPosition {
        custom_id: u64,
        key: &'static str,
        raw: String,
    },

    #[error("custom_id {custom_id} does not match any tuple")]
    UnknownTuple { custom_id: u64 },
}

impl JudgmentError {
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Self::MalformedJson { raw, .. }
            | Self::MissingKey { raw, .. }
            | Self::InvalidPosition { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

/// Resolves bare integers and `<prefix>-<integer>` identifiers to tuple ids.
#[derive(Debug, Clone)]
pub struct CustomIdResolver {
    pattern: Regex,
}

impl CustomIdResolver {
    pub fn new() -> Result<Self> {
        let pattern =
            Regex::new(r"^(?:.*-)?(\d+)$").context("failed to compile custom_id regex")?;
        Ok(Self { pattern })
    }

    pub fn resolve(&self, custom_id: &CustomId) -> Result<u64, JudgmentError> {
        let unresolvable = || JudgmentError::UnresolvableId {
            raw: custom_id.to_string(),
        };

        match custom_id {
            CustomId::Number(value) => u64::try_from(*value).map_err(|_| unresolvable()),
            CustomId::Text(value) => self
                .pattern
                .captures(value.trim())
                .and_then(|captures| captures.get(1))
                .and_then(|digits| digits.as_str().parse::<u64>().ok())
                .ok_or_else(unresolvable),
        }
    }
}

pub fn parse_response(custom_id: u64, raw: &str) -> Result<Judgment, JudgmentError> {
    let value = serde_json::from_str::<Value>(raw).map_err(|err| JudgmentError::MalformedJson {
        custom_id,
        raw: raw.to_string(),
        message: err.to_string(),
    })?;

    let best_position = extract_position(custom_id, &value, BEST_KEY, raw)?;
    let worst_position = extract_position(custom_id, &value, WORST_KEY, raw)?;

    Ok(Judgment {
        custom_id,
        best_position,
        worst_position,
    })
}

fn extract_position(
    custom_id: u64,
    value: &Value,
    key: &'static str,
    raw: &str,
) -> Result<i64, JudgmentError> {
    let entry = value.get(key).ok_or_else(|| JudgmentError::MissingKey {
        custom_id,
        key,
        raw: raw.to_string(),
    })?;

    serde_json::from_value::<PositionValue>(entry.clone())
        .ok()
        .and_then(|position| position.index())
        .map(|index| index.saturating_sub(1))
        .ok_or_else(|| JudgmentError::InvalidPosition {
            custom_id,
            key,
            raw: raw.to_string(),
        })
}

pub fn parse_record(
    record: &AnnotationRecord,
    resolver: &CustomIdResolver,
) -> Result<Judgment, JudgmentError> {
    let custom_id = resolver.resolve(&record.custom_id)?;

    match record.response.as_deref().filter(|value| !value.is_empty()) {
        Some(raw) => parse_response(custom_id, raw),
        None => match &record.error {
            Some(detail) => Err(JudgmentError::Transport {
                custom_id,
                detail: detail.clone(),
            }),
            None => Err(JudgmentError::MissingResponse { custom_id }),
        },
    }
}

#[derive(Debug, Default)]
pub struct ParsedRecords {
    pub judgments: Vec<Judgment>,
    pub failures: Vec<JudgmentError>,
}

pub fn parse_records(records: &[AnnotationRecord], resolver: &CustomIdResolver) -> ParsedRecords {
    let mut parsed = ParsedRecords::default();

    for record in records {
        match parse_record(record, resolver) {
            Ok(judgment) => parsed.judgments.push(judgment),
            Err(err) => {
                match err.raw_response() {
                    Some(raw) => warn!(error = %err, raw_response = %raw, "malformed annotator response"),
                    None => warn!(error = %err, "annotation record skipped"),
                }
                parsed.failures.push(err);
            }
        }
    }

    parsed
}
