use anyhow::{Result, bail};
use chrono::Utc;
use tracing::info;

use crate::cli::PrepareArgs;
use crate::commands::{MANIFEST_DIR, REQUESTS_FILE, input_file};
use crate::model::{BatchRequest, PrepareRunManifest};
use crate::prompt::{PromptTemplate, RequestSettings, build_request};
use crate::tuples::{TupleSet, load_tuples};
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty, write_jsonl};

pub fn run(args: PrepareArgs) -> Result<()> {
    let started_ts = Utc::now();
    let run_id = format!("prepare-{}", utc_compact_string(started_ts));

    let manifest_dir = args.work_dir.join(MANIFEST_DIR);
    ensure_directory(&manifest_dir)?;
    let requests_path = args
        .requests_path
        .clone()
        .unwrap_or_else(|| args.work_dir.join(REQUESTS_FILE));

    info!(
        tuples_path = %args.tuples_path.display(),
        run_id = %run_id,
        "preparing annotation requests"
    );

    let tuples = load_tuples(&args.tuples_path, args.delimiter)?;
    if tuples.is_empty() {
        bail!("no tuples found in {}", args.tuples_path.display());
    }

    let settings = request_settings(&args);
    let requests = build_requests(&tuples, &settings);
    write_jsonl(&requests_path, &requests)?;
    info!(
        path = %requests_path.display(),
        requests = requests.len(),
        "wrote batch request file"
    );

    let manifest = PrepareRunManifest {
        manifest_version: 1,
        run_id,
        generated_at: now_utc_string(),
        tuples: input_file(&args.tuples_path)?,
        requests_path: requests_path.display().to_string(),
        model: settings.model,
        api_url: settings.api_url,
        tuple_count: tuples.len(),
        request_count: requests.len(),
        warnings: tuples.warnings.clone(),
    };

    let manifest_path = manifest_dir.join(format!(
        "prepare_run_{}.json",
        utc_compact_string(started_ts)
    ));
    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "prepare completed");

    Ok(())
}

fn request_settings(args: &PrepareArgs) -> RequestSettings {
    let mut template = PromptTemplate::default();
    if let Some(value) = &args.system_instruction {
        template.system_instruction = value.clone();
    }
    if let Some(value) = &args.task_instruction {
        template.task_instruction = value.clone();
    }

    RequestSettings {
        model: args.model.clone(),
        api_url: args.api_url.clone(),
        max_tokens: args.max_tokens,
        template,
    }
}

pub fn build_requests(tuples: &TupleSet, settings: &RequestSettings) -> Vec<BatchRequest> {
    tuples
        .iter()
        .map(|tuple| build_request(tuple, settings))
        .collect()
}
