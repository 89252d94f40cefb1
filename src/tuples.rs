use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::warn;

pub const MAX_TUPLE_TEXTS: usize = 4;
pub const DEFAULT_DELIMITER: char = '@';

/// A set of 1..=4 texts judged together, addressed by its 1-based row id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    pub custom_id: u64,
    pub texts: Vec<String>,
}

impl Tuple {
    pub fn new(custom_id: u64, texts: Vec<String>) -> Result<Self> {
        if texts.is_empty() || texts.len() > MAX_TUPLE_TEXTS {
            bail!(
                "tuple {custom_id} must hold between 1 and {MAX_TUPLE_TEXTS} texts, got {}",
                texts.len()
            );
        }
        if let Some(slot) = texts.iter().position(|text| text.trim().is_empty()) {
            bail!("tuple {custom_id} has an empty text in slot {}", slot + 1);
        }

        Ok(Self { custom_id, texts })
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }
}

#[derive(Debug, Default)]
pub struct TupleSet {
    tuples: Vec<Tuple>,
    index: HashMap<u64, usize>,
    pub warnings: Vec<String>,
}

impl TupleSet {
    pub fn from_tuples(tuples: Vec<Tuple>) -> Result<Self> {
        let mut index = HashMap::<u64, usize>::with_capacity(tuples.len());
        for (position, tuple) in tuples.iter().enumerate() {
            if index.insert(tuple.custom_id, position).is_some() {
                bail!("duplicate tuple id {}", tuple.custom_id);
            }
        }

        Ok(Self {
            tuples,
            index,
            warnings: Vec::new(),
        })
    }

    pub fn get(&self, custom_id: u64) -> Option<&Tuple> {
        self.index
            .get(&custom_id)
            .and_then(|position| self.tuples.get(*position))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tuple> {
        self.tuples.iter()
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }
}

pub fn load_tuples(path: &Path, delimiter: char) -> Result<TupleSet> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_tuples(&content, delimiter)
        .with_context(|| format!("failed to parse tuple file {}", path.display()))
}

pub fn parse_tuples(content: &str, delimiter: char) -> Result<TupleSet> {
    if matches!(delimiter, '"' | '\n' | '\r') {
        bail!("unsupported delimiter {delimiter:?}");
    }

    let mut records = split_records(content, delimiter)?.into_iter();
    let header = records.next().context("tuple file has no header row")?;
    let columns = header
        .iter()
        .map(|name| name.trim_start_matches('\u{feff}').trim().to_string())
        .collect::<Vec<String>>();

    let text_columns = (1..=MAX_TUPLE_TEXTS)
        .map_while(|slot| {
            let name = format!("Text {slot}");
            columns.iter().position(|column| *column == name)
        })
        .collect::<Vec<usize>>();
    if text_columns.is_empty() {
        bail!("tuple file has no `Text 1` column (columns: {})", columns.join(", "));
    }

    let mut tuples = Vec::<Tuple>::new();
    let mut warnings = Vec::<String>::new();

    for (row_index, record) in records.enumerate() {
        let custom_id = row_index as u64 + 1;

        let mut texts = Vec::<String>::with_capacity(text_columns.len());
        let mut gap = false;
        let mut dropped = 0usize;
        for column in &text_columns {
            let cell = record.get(*column).map(|value| value.trim()).unwrap_or("");
            if cell.is_empty() {
                gap = true;
            } else if gap {
                dropped += 1;
            } else {
                texts.push(cell.to_string());
            }
        }

        if dropped > 0 {
            let warning =
                format!("tuple {custom_id}: dropped {dropped} text(s) after an empty slot");
            warn!(custom_id, dropped, "text after empty slot ignored");
            warnings.push(warning);
        }

        if texts.is_empty() {
            warn!(custom_id, "row without texts skipped");
            warnings.push(format!("tuple {custom_id}: row has no texts"));
            continue;
        }

        tuples.push(Tuple::new(custom_id, texts)?);
    }

    let mut set = TupleSet::from_tuples(tuples)?;
    set.warnings = warnings;
    Ok(set)
}

fn split_records(content: &str, delimiter: char) -> Result<Vec<Vec<String>>> {
    let mut records = Vec::<Vec<String>>::new();
    let mut record = Vec::<String>::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut record_quoted = false;
    let mut line = 1usize;
    let mut quote_line = 0usize;
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                if ch == '\n' {
                    line += 1;
                }
                field.push(ch);
            }
            continue;
        }

        match ch {
            '"' if field.is_empty() => {
                in_quotes = true;
                record_quoted = true;
                quote_line = line;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                push_record(&mut records, std::mem::take(&mut record), record_quoted);
                record_quoted = false;
                line += 1;
            }
            value if value == delimiter => record.push(std::mem::take(&mut field)),
            value => field.push(value),
        }
    }

    if in_quotes {
        bail!("unterminated quoted field starting on line {quote_line}");
    }

    if !field.is_empty() || !record.is_empty() || record_quoted {
        record.push(field);
        push_record(&mut records, record, record_quoted);
    }

    Ok(records)
}

fn push_record(records: &mut Vec<Vec<String>>, record: Vec<String>, quoted: bool) {
    let blank = !quoted && record.iter().all(|value| value.trim().is_empty()) && record.len() <= 1;
    if !blank {
        records.push(record);
    }
}
