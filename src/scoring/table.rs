use std::collections::BTreeSet;

use super::{TextCounts, hundredths_to_score};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredText {
    pub text: String,
    pub counts: TextCounts,
    pub hundredths: u32,
}

impl ScoredText {
    #[cfg(test)]
    pub fn score(&self) -> f64 {
        hundredths_to_score(self.hundredths)
    }
}

/// Final scores, ordered by score descending then text ascending.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScoreTable {
    entries: Vec<ScoredText>,
}

impl ScoreTable {
    pub fn new(mut entries: Vec<ScoredText>) -> Self {
        entries.sort_by(|a, b| b.hundredths.cmp(&a.hundredths).then(a.text.cmp(&b.text)));
        Self { entries }
    }

    pub fn entries(&self) -> &[ScoredText] {
        &self.entries
    }

    #[cfg(test)]
    pub fn get(&self, text: &str) -> Option<&ScoredText> {
        self.entries.iter().find(|entry| entry.text == text)
    }

    #[cfg(test)]
    pub fn score(&self, text: &str) -> Option<f64> {
        self.get(text).map(ScoredText::score)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted distinct score values; a table collapsing towards 0.5 signals a
    /// weakly discriminating annotator.
    pub fn distinct_scores(&self) -> Vec<f64> {
        self.entries
            .iter()
            .map(|entry| entry.hundredths)
            .collect::<BTreeSet<u32>>()
            .into_iter()
            .map(hundredths_to_score)
            .collect()
    }

    pub fn to_delimited(&self, delimiter: char, with_counts: bool) -> String {
        let mut header = vec!["Text", "Score"];
        if with_counts {
            header.extend(["Best", "Worst", "Middle"]);
        }

        let separator = delimiter.to_string();
        let mut out = header.join(separator.as_str());
        out.push('\n');

        for entry in &self.entries {
            let mut fields = vec![
                quote_field(&entry.text, delimiter),
                format_hundredths(entry.hundredths),
            ];
            if with_counts {
                fields.push(entry.counts.best.to_string());
                fields.push(entry.counts.worst.to_string());
                fields.push(entry.counts.middle.to_string());
            }
            out.push_str(&fields.join(separator.as_str()));
            out.push('\n');
        }

        out
    }
}

pub fn format_hundredths(hundredths: u32) -> String {
    let whole = hundredths / 100;
    let fraction = hundredths % 100;
    if fraction == 0 {
        format!("{whole}.0")
    } else if fraction % 10 == 0 {
        format!("{whole}.{}", fraction / 10)
    } else {
        format!("{whole}.{fraction:02}")
    }
}

fn quote_field(value: &str, delimiter: char) -> String {
    if value.contains(delimiter) || value.contains(['"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
