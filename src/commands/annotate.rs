use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use crate::annotator::{Annotator, GenerationParams, HttpAnnotator};
use crate::cli::AnnotateArgs;
use crate::commands::{ANNOTATIONS_FILE, MANIFEST_DIR, REQUESTS_FILE, input_file};
use crate::model::{AnnotateRunManifest, AnnotationRecord, BatchRequest, CustomId};
use crate::util::{ensure_directory, now_utc_string, read_jsonl, utc_compact_string, write_json_pretty};

pub fn run(args: AnnotateArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("annotate-{}", utc_compact_string(started_ts));

    let manifest_dir = args.work_dir.join(MANIFEST_DIR);
    ensure_directory(&manifest_dir)?;
    let requests_path = args
        .requests_path
        .clone()
        .unwrap_or_else(|| args.work_dir.join(REQUESTS_FILE));
    let annotations_path = args
        .annotations_path
        .clone()
        .unwrap_or_else(|| args.work_dir.join(ANNOTATIONS_FILE));

    if args.api_key.trim().is_empty() {
        bail!("an API key is required (--api-key or BWS_API_KEY)");
    }

    let mut requests = read_jsonl::<BatchRequest>(&requests_path)?;
    if let Some(limit) = args.limit {
        requests.truncate(limit);
    }
    info!(
        path = %requests_path.display(),
        requests = requests.len(),
        run_id = %run_id,
        "starting annotation run"
    );

    let params = GenerationParams {
        default_max_tokens: args.default_max_tokens,
        temperature: args.temperature,
        top_p: args.top_p,
        top_k: args.top_k,
        presence_penalty: args.presence_penalty,
        frequency_penalty: args.frequency_penalty,
    };
    let annotator = HttpAnnotator::new(
        args.api_url.clone(),
        args.api_key.clone(),
        params.clone(),
        Duration::from_secs(args.timeout_secs.max(1)),
    )?;

    let started = Instant::now();
    let records = annotate_batch(&annotator, &requests);
    let duration_ms = started.elapsed().as_millis();

    write_json_pretty(&annotations_path, &records)?;

    let failed = records.iter().filter(|record| record.error.is_some()).count();
    let succeeded = records.len() - failed;
    info!(
        path = %annotations_path.display(),
        succeeded,
        failed,
        "wrote annotations"
    );

    let manifest = AnnotateRunManifest {
        manifest_version: 1,
        run_id,
        started_at,
        completed_at: now_utc_string(),
        requests: input_file(&requests_path)?,
        annotations_path: annotations_path.display().to_string(),
        api_url: annotator.api_url().to_string(),
        generation: params,
        request_count: requests.len(),
        succeeded,
        failed,
        duration_ms,
        status: if failed == 0 {
            "completed"
        } else {
            "completed_with_failures"
        }
        .to_string(),
    };

    let manifest_path = manifest_dir.join(format!(
        "annotate_run_{}.json",
        utc_compact_string(started_ts)
    ));
    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "annotate completed");

    Ok(())
}

/// Sends each request in order; a failure is recorded against its id and the
/// batch moves on.
pub fn annotate_batch(annotator: &dyn Annotator, requests: &[BatchRequest]) -> Vec<AnnotationRecord> {
    let mut records = Vec::<AnnotationRecord>::with_capacity(requests.len());

    for request in requests {
        let custom_id = CustomId::from(request.custom_id.as_str());
        match annotator.annotate(request) {
            Ok(content) => {
                info!(custom_id = %request.custom_id, "processed");
                records.push(AnnotationRecord::response(custom_id, content));
            }
            Err(err) => {
                warn!(custom_id = %request.custom_id, error = %err, "annotation failed");
                records.push(AnnotationRecord::error(custom_id, err.to_string()));
            }
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::*;

    use crate::annotator::AnnotatorError;
    use crate::model::{ChatMessage, RequestBody};

    enum Scripted {
        Answer(&'static str),
        Status(u16, &'static str),
        Timeout,
    }

    struct ScriptedAnnotator {
        script: HashMap<String, Scripted>,
        seen: RefCell<Vec<String>>,
    }

    impl Annotator for ScriptedAnnotator {
        fn annotate(&self, request: &BatchRequest) -> Result<String, AnnotatorError> {
            self.seen.borrow_mut().push(request.custom_id.clone());
            match self.script.get(&request.custom_id) {
                Some(Scripted::Answer(text)) => Ok(text.to_string()),
                Some(Scripted::Status(status, body)) => Err(AnnotatorError::Status {
                    status: *status,
                    reason: "Service Unavailable".to_string(),
                    body: body.to_string(),
                }),
                Some(Scripted::Timeout) | None => {
                    Err(AnnotatorError::Transport("operation timed out".to_string()))
                }
            }
        }
    }

    fn request(custom_id: &str) -> BatchRequest {
        BatchRequest {
            custom_id: custom_id.to_string(),
            method: "POST".to_string(),
            url: "https://api.example.test/v1/chat/completions".to_string(),
            body: RequestBody {
                model: "test-model".to_string(),
                messages: vec![ChatMessage::user("1. A\n2. B\n")],
                max_tokens: Some(150),
                stream: false,
            },
        }
    }

    #[test]
    fn annotate_batch_records_failures_and_continues() {
        let annotator = ScriptedAnnotator {
            script: HashMap::from([
                (
                    "tuple-1".to_string(),
                    Scripted::Answer("{\"Best\": [1], \"Worst\": [2]}"),
                ),
                ("tuple-2".to_string(), Scripted::Status(503, "overloaded")),
                ("tuple-3".to_string(), Scripted::Timeout),
                ("tuple-4".to_string(), Scripted::Answer("not json")),
            ]),
            seen: RefCell::new(Vec::new()),
        };
        let requests = ["tuple-1", "tuple-2", "tuple-3", "tuple-4"]
            .into_iter()
            .map(request)
            .collect::<Vec<BatchRequest>>();

        let records = annotate_batch(&annotator, &requests);

        assert_eq!(
            *annotator.seen.borrow(),
            vec!["tuple-1", "tuple-2", "tuple-3", "tuple-4"]
        );
        assert_eq!(records.len(), 4);
        assert_eq!(
            records[0].response.as_deref(),
            Some("{\"Best\": [1], \"Worst\": [2]}")
        );
        assert_eq!(
            records[1].error.as_deref(),
            Some("503 Service Unavailable: overloaded")
        );
        assert!(records[1].response.is_none());
        assert!(records[2]
            .error
            .as_deref()
            .is_some_and(|error| error.contains("timed out")));
        assert_eq!(records[3].response.as_deref(), Some("not json"));
        assert_eq!(records[3].custom_id, CustomId::from("tuple-4"));
    }

    #[test]
    fn annotation_records_serialize_without_empty_fields() {
        let records = vec![
            AnnotationRecord::response(CustomId::from("tuple-1"), "{\"Best\": 1, \"Worst\": 2}"),
            AnnotationRecord::error(CustomId::from("tuple-2"), "Größe unbekannt"),
        ];

        let raw = serde_json::to_string(&records).expect("serialize");
        assert_eq!(
            raw,
            r#"[{"custom_id":"tuple-1","response":"{\"Best\": 1, \"Worst\": 2}"},{"custom_id":"tuple-2","error":"Größe unbekannt"}]"#
        );
    }
}
