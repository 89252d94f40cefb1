use std::collections::HashMap;

use tracing::warn;

use super::TextCounts;
use super::table::{ScoreTable, ScoredText};
use crate::judgment::{Judgment, JudgmentError};
use crate::tuples::{Tuple, TupleSet};

/// Per-text counters folded from judgments. Identical strings in different
/// tuples share one entry.
#[derive(Debug, Default)]
pub struct ScoreAggregator {
    counts: HashMap<String, TextCounts>,
    folded: usize,
    degenerate: usize,
    out_of_range: usize,
}

impl ScoreAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fold(&mut self, judgment: &Judgment, tuples: &TupleSet) -> Result<(), JudgmentError> {
        let tuple = tuples
            .get(judgment.custom_id)
            .ok_or(JudgmentError::UnknownTuple {
                custom_id: judgment.custom_id,
            })?;
        self.fold_tuple(judgment, tuple);
        Ok(())
    }

    pub fn fold_tuple(&mut self, judgment: &Judgment, tuple: &Tuple) {
        for (slot, text) in tuple.texts.iter().enumerate() {
            let slot = slot as i64;
            let entry = self.counts.entry(text.clone()).or_default();
            // best is checked first, so a degenerate judgment only counts as best
            if slot == judgment.best_position {
                entry.best += 1;
            } else if slot == judgment.worst_position {
                entry.worst += 1;
            } else {
                entry.middle += 1;
            }
        }

        self.folded += 1;
        if judgment.is_degenerate() {
            self.degenerate += 1;
            warn!(
                custom_id = judgment.custom_id,
                position = judgment.best_position + 1,
                "best equals worst; counted as best"
            );
        }
        if judgment.has_position_outside(tuple.len()) {
            self.out_of_range += 1;
            warn!(
                custom_id = judgment.custom_id,
                best = judgment.best_position + 1,
                worst = judgment.worst_position + 1,
                len = tuple.len(),
                "position outside the tuple matches no text"
            );
        }
    }

    /// Folds every judgment, collecting per-item failures instead of stopping.
    pub fn fold_all<'a, I>(&mut self, judgments: I, tuples: &TupleSet) -> Vec<JudgmentError>
    where
        I: IntoIterator<Item = &'a Judgment>,
    {
        let mut failures = Vec::<JudgmentError>::new();

        for judgment in judgments {
            if let Err(err) = self.fold(judgment, tuples) {
                warn!(error = %err, "judgment skipped");
                failures.push(err);
            }
        }

        failures
    }

    #[cfg(test)]
    pub fn counts(&self, text: &str) -> Option<TextCounts> {
        self.counts.get(text).copied()
    }

    pub fn distinct_texts(&self) -> usize {
        self.counts.len()
    }

    pub fn folded(&self) -> usize {
        self.folded
    }

    pub fn degenerate(&self) -> usize {
        self.degenerate
    }

    pub fn out_of_range(&self) -> usize {
        self.out_of_range
    }

    pub fn into_table(self) -> ScoreTable {
        let entries = self
            .counts
            .into_iter()
            .map(|(text, counts)| ScoredText {
                hundredths: counts.adjusted_hundredths(),
                text,
                counts,
            })
            .collect::<Vec<ScoredText>>();

        ScoreTable::new(entries)
    }
}
