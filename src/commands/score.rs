use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use crate::cli::ScoreArgs;
use crate::commands::{ANNOTATIONS_FILE, MANIFEST_DIR, SCORES_FILE, input_file};
use crate::judgment::{CustomIdResolver, JudgmentError, parse_records};
use crate::model::{AnnotationRecord, ScoreCounts, ScoreRunManifest};
use crate::scoring::{ScoreAggregator, ScoreTable};
use crate::tuples::{TupleSet, load_tuples};
use crate::util::{
    ensure_directory, now_utc_string, read_json, utc_compact_string, write_json_pretty, write_text,
};

/// Share of texts at 0.5 above which the annotation signal is reported as weak.
const NEUTRAL_SHARE_WARNING: f64 = 0.9;

#[derive(Debug)]
pub struct ScoreOutcome {
    pub table: ScoreTable,
    pub counts: ScoreCounts,
    pub failures: Vec<JudgmentError>,
}

pub fn run(args: ScoreArgs) -> Result<()> {
    let started_ts = Utc::now();
    let run_id = format!("score-{}", utc_compact_string(started_ts));

    let manifest_dir = args.work_dir.join(MANIFEST_DIR);
    ensure_directory(&manifest_dir)?;
    let annotations_path = args
        .annotations_path
        .clone()
        .unwrap_or_else(|| args.work_dir.join(ANNOTATIONS_FILE));
    let scores_path = args
        .scores_path
        .clone()
        .unwrap_or_else(|| args.work_dir.join(SCORES_FILE));

    let entries = read_json::<Vec<Value>>(&annotations_path)?;
    info!(
        path = %annotations_path.display(),
        records = entries.len(),
        run_id = %run_id,
        "loaded annotations"
    );

    let tuples = load_tuples(&args.tuples_path, args.delimiter)?;
    info!(
        path = %args.tuples_path.display(),
        tuples = tuples.len(),
        "loaded tuples"
    );

    let outcome = score_entries(entries, &tuples)?;
    write_text(
        &scores_path,
        &outcome.table.to_delimited(args.delimiter, args.with_counts),
    )?;

    let distinct_score_values = outcome.table.distinct_scores();
    info!(
        scores = ?distinct_score_values,
        count = distinct_score_values.len(),
        "unique adjusted scores"
    );
    report_neutral_share(&outcome.table);
    info!(
        path = %scores_path.display(),
        texts = outcome.table.len(),
        folded = outcome.counts.judgments_folded,
        skipped = outcome.failures.len(),
        "scores saved"
    );

    let mut warnings = tuples.warnings.clone();
    warnings.extend(outcome.failures.iter().map(ToString::to_string));

    let manifest = ScoreRunManifest {
        manifest_version: 1,
        run_id,
        generated_at: now_utc_string(),
        tuples: input_file(&args.tuples_path)?,
        annotations: input_file(&annotations_path)?,
        scores_path: scores_path.display().to_string(),
        counts: outcome.counts,
        distinct_score_values,
        warnings,
    };

    let manifest_path = manifest_dir.join(format!(
        "score_run_{}.json",
        utc_compact_string(started_ts)
    ));
    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "score completed");

    Ok(())
}

/// Decodes each entry of an annotation file on its own; an entry that is not
/// a record is reported and left out.
pub fn decode_records(entries: Vec<Value>) -> (Vec<AnnotationRecord>, Vec<JudgmentError>) {
    let mut records = Vec::<AnnotationRecord>::with_capacity(entries.len());
    let mut rejected = Vec::<JudgmentError>::new();

    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<AnnotationRecord>(entry) {
            Ok(record) => records.push(record),
            Err(err) => {
                let failure = JudgmentError::InvalidRecord {
                    entry: index + 1,
                    message: err.to_string(),
                };
                warn!(error = %failure, "annotation entry skipped");
                rejected.push(failure);
            }
        }
    }

    (records, rejected)
}

pub fn score_entries(entries: Vec<Value>, tuples: &TupleSet) -> Result<ScoreOutcome> {
    let loaded = entries.len();
    let (records, rejected) = decode_records(entries);

    let mut outcome = score_records(&records, tuples)?;
    outcome.counts.records_loaded = loaded;
    for failure in &rejected {
        tally_failure(&mut outcome.counts, failure);
    }
    let mut failures = rejected;
    failures.append(&mut outcome.failures);
    outcome.failures = failures;

    Ok(outcome)
}

pub fn score_records(records: &[AnnotationRecord], tuples: &TupleSet) -> Result<ScoreOutcome> {
    let resolver = CustomIdResolver::new()?;
    let parsed = parse_records(records, &resolver);

    let mut aggregator = ScoreAggregator::new();
    let fold_failures = aggregator.fold_all(&parsed.judgments, tuples);

    let mut counts = ScoreCounts {
        records_loaded: records.len(),
        judgments_folded: aggregator.folded(),
        degenerate_judgments: aggregator.degenerate(),
        out_of_range_judgments: aggregator.out_of_range(),
        distinct_texts: aggregator.distinct_texts(),
        ..ScoreCounts::default()
    };

    let failures = parsed
        .failures
        .into_iter()
        .chain(fold_failures)
        .collect::<Vec<JudgmentError>>();
    for failure in &failures {
        tally_failure(&mut counts, failure);
    }

    let table = aggregator.into_table();
    counts.distinct_scores = table.distinct_scores().len();

    Ok(ScoreOutcome {
        table,
        counts,
        failures,
    })
}

fn tally_failure(counts: &mut ScoreCounts, failure: &JudgmentError) {
    let slot = match failure {
        JudgmentError::InvalidRecord { .. } => &mut counts.invalid_records,
        JudgmentError::UnresolvableId { .. } => &mut counts.unresolvable_ids,
        JudgmentError::Transport { .. } => &mut counts.transport_errors,
        JudgmentError::MissingResponse { .. } => &mut counts.missing_responses,
        JudgmentError::MalformedJson { .. } => &mut counts.malformed_json,
        JudgmentError::MissingKey { .. } => &mut counts.missing_keys,
        JudgmentError::InvalidPosition { .. } => &mut counts.invalid_positions,
        JudgmentError::UnknownTuple { .. } => &mut counts.unknown_tuples,
    };
    *slot += 1;
}

fn report_neutral_share(table: &ScoreTable) {
    if table.is_empty() {
        warn!("no texts were scored");
        return;
    }

    let neutral = table
        .entries()
        .iter()
        .filter(|entry| entry.hundredths == 50)
        .count();
    let share = neutral as f64 / table.len() as f64;
    if share >= NEUTRAL_SHARE_WARNING {
        warn!(neutral, texts = table.len(), "most texts score 0.5; annotation signal is weak");
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    use crate::model::CustomId;
    use crate::tuples::parse_tuples;

    fn tuples() -> TupleSet {
        parse_tuples("Text 1@Text 2@Text 3\nA@B@C\nB@A@C\n", '@').expect("tuples")
    }

    #[test]
    fn score_records_reproduces_worked_example() {
        let records = vec![
            AnnotationRecord::response(CustomId::from("tuple-1"), r#"{"Best": 1, "Worst": 2}"#),
            AnnotationRecord::response(CustomId::Number(2), r#"{"Best": [2], "Worst": [1]}"#),
        ];

        let outcome = score_records(&records, &tuples()).expect("score");
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.table.score("A"), Some(1.0));
        assert_eq!(outcome.table.score("B"), Some(0.0));
        assert_eq!(outcome.table.score("C"), Some(0.5));
        assert_eq!(outcome.counts.judgments_folded, 2);
        assert_eq!(outcome.counts.distinct_texts, 3);
        assert_eq!(outcome.counts.distinct_scores, 3);
    }

    #[test]
    fn score_records_isolates_every_failure_kind() {
        let records = vec![
            AnnotationRecord::response(CustomId::from("tuple-1"), r#"{"Best": 1, "Worst": 2}"#),
            AnnotationRecord::response(CustomId::from("tuple-2"), "Text 2 is best"),
            AnnotationRecord::response(CustomId::from("tuple-2"), r#"{"Worst": 1}"#),
            AnnotationRecord::response(CustomId::from("tuple-2"), r#"{"Best": "2", "Worst": 1}"#),
            AnnotationRecord::response(CustomId::from("tuple-2"), r#"{"Best": 4, "Worst": 1}"#),
            AnnotationRecord::error(CustomId::from("tuple-2"), "500 Internal Server Error"),
            AnnotationRecord::response(CustomId::from("tuple-"), r#"{"Best": 1, "Worst": 2}"#),
            AnnotationRecord::response(CustomId::from("tuple-99"), r#"{"Best": 1, "Worst": 2}"#),
            AnnotationRecord::response(CustomId::from("tuple-2"), r#"{"Best": 3, "Worst": 3}"#),
        ];

        let outcome = score_records(&records, &tuples()).expect("score");
        let counts = &outcome.counts;
        assert_eq!(counts.records_loaded, 9);
        assert_eq!(counts.judgments_folded, 3);
        assert_eq!(counts.malformed_json, 1);
        assert_eq!(counts.missing_keys, 1);
        assert_eq!(counts.invalid_positions, 1);
        assert_eq!(counts.transport_errors, 1);
        assert_eq!(counts.unresolvable_ids, 1);
        assert_eq!(counts.unknown_tuples, 1);
        assert_eq!(counts.degenerate_judgments, 1);
        assert_eq!(counts.out_of_range_judgments, 1);
        assert_eq!(outcome.failures.len(), 6);

        // tuple-1 (A, B, C): A best, B worst, C middle
        // tuple-2 (B, A, C) with Best 4: B worst, A and C middle
        // tuple-2 with Best 3 == Worst 3: C best, A and B middle
        let a = outcome.table.get("A").expect("A");
        assert_eq!((a.counts.best, a.counts.worst, a.counts.middle), (1, 0, 2));
        let b = outcome.table.get("B").expect("B");
        assert_eq!((b.counts.best, b.counts.worst, b.counts.middle), (0, 2, 1));
        let c = outcome.table.get("C").expect("C");
        assert_eq!((c.counts.best, c.counts.worst, c.counts.middle), (1, 0, 2));
        assert_eq!(c.score(), 0.67);
    }

    #[test]
    fn score_entries_skips_entries_that_are_not_records() {
        let entries = vec![
            serde_json::json!({"custom_id": "tuple-1", "response": "{\"Best\": 1, \"Worst\": 2}"}),
            serde_json::json!({"custom_id": null, "response": "{\"Best\": 1, \"Worst\": 2}"}),
            serde_json::json!({"custom_id": 1.5, "response": "{\"Best\": 1, \"Worst\": 2}"}),
            serde_json::json!({"response": "{\"Best\": 2, \"Worst\": 1}"}),
            serde_json::json!("tuple-2"),
            serde_json::json!({"custom_id": 2, "response": "{\"Best\": 2, \"Worst\": 1}"}),
        ];

        let outcome = score_entries(entries, &tuples()).expect("score");
        assert_eq!(outcome.counts.records_loaded, 6);
        assert_eq!(outcome.counts.invalid_records, 4);
        assert_eq!(outcome.counts.judgments_folded, 2);
        assert_eq!(outcome.failures.len(), 4);
        assert_eq!(
            outcome
                .failures
                .iter()
                .map(|failure| match failure {
                    JudgmentError::InvalidRecord { entry, .. } => *entry,
                    other => panic!("unexpected failure {other:?}"),
                })
                .collect::<Vec<usize>>(),
            vec![2, 3, 4, 5]
        );
        assert_eq!(outcome.table.score("A"), Some(1.0));
        assert_eq!(outcome.table.score("B"), Some(0.0));
    }

    #[test]
    fn run_writes_scores_and_manifest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tuples_path = dir.path().join("tuples.csv");
        fs::write(&tuples_path, "Text 1@Text 2@Text 3\nA@B@C\nB@A@C\n").expect("tuples");
        let work_dir = dir.path().join("work");
        let annotations_path = work_dir.join(ANNOTATIONS_FILE);
        write_json_pretty(
            &annotations_path,
            &vec![
                AnnotationRecord::response(CustomId::from("tuple-1"), r#"{"Best": 1, "Worst": 2}"#),
                AnnotationRecord::response(CustomId::from("tuple-2"), r#"{"Best": 2, "Worst": 1}"#),
                AnnotationRecord::error(CustomId::from("tuple-3"), "timeout"),
            ],
        )
        .expect("annotations");

        run(ScoreArgs {
            work_dir: work_dir.clone(),
            tuples_path,
            delimiter: '@',
            annotations_path: None,
            scores_path: None,
            with_counts: false,
        })
        .expect("score run");

        let scores = fs::read_to_string(work_dir.join(SCORES_FILE)).expect("scores");
        assert_eq!(scores, "Text@Score\nA@1.0\nC@0.5\nB@0.0\n");

        let manifest_path = fs::read_dir(work_dir.join(MANIFEST_DIR))
            .expect("manifest dir")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .find(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with("score_run_"))
            })
            .expect("score manifest");
        let manifest: serde_json::Value =
            serde_json::from_slice(&fs::read(manifest_path).expect("read manifest"))
                .expect("parse manifest");
        assert_eq!(manifest["counts"]["judgments_folded"], 2);
        assert_eq!(manifest["counts"]["transport_errors"], 1);
        assert_eq!(manifest["distinct_score_values"], serde_json::json!([0.0, 0.5, 1.0]));
    }
}
