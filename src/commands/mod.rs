use std::path::Path;

use anyhow::Result;

use crate::model::InputFile;
use crate::util::sha256_file;

pub mod annotate;
pub mod prepare;
pub mod score;

pub const MANIFEST_DIR: &str = "manifests";
pub const REQUESTS_FILE: &str = "requests.jsonl";
pub const ANNOTATIONS_FILE: &str = "annotations.json";
pub const SCORES_FILE: &str = "scores.csv";

fn input_file(path: &Path) -> Result<InputFile> {
    Ok(InputFile {
        path: path.display().to_string(),
        sha256: sha256_file(path)?,
    })
}
