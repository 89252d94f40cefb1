mod aggregator;
mod table;

pub use aggregator::ScoreAggregator;
pub use table::ScoreTable;

/// Best/worst/middle tallies for one distinct text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextCounts {
    pub best: u64,
    pub worst: u64,
    pub middle: u64,
}

impl TextCounts {
    pub fn total(&self) -> u64 {
        self.best + self.worst + self.middle
    }

    /// `((B - W) / total + 1) / 2` rounded to two decimals, expressed in
    /// hundredths; 0 when the text was never seen.
    pub fn adjusted_hundredths(&self) -> u32 {
        let total = self.total();
        if total == 0 {
            return 0;
        }

        let raw = (self.best as f64 - self.worst as f64) / total as f64;
        round_hundredths((raw + 1.0) / 2.0)
    }

    #[cfg(test)]
    pub fn adjusted_score(&self) -> f64 {
        hundredths_to_score(self.adjusted_hundredths())
    }
}

/// Rounds on the exact binary value with ties to even, as decimal formatting
/// does, so `0.025000000000000022` becomes 3 and `0.625` becomes 62.
fn round_hundredths(value: f64) -> u32 {
    format!("{value:.2}")
        .chars()
        .filter_map(|digit| digit.to_digit(10))
        .fold(0, |acc, digit| acc * 10 + digit)
}

pub fn hundredths_to_score(hundredths: u32) -> f64 {
    f64::from(hundredths) / 100.0
}
