use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::{error::TransferError, record::ParamTuple};

const FIELD_DELIMITER: char = '\t';

/// Looks for the parameter file as given, then relative to `base_dir`.
pub fn resolve(configured_path: &Path, base_dir: Option<&Path>) -> Result<PathBuf, TransferError> {
    let mut candidates = vec![configured_path.to_path_buf()];
    if let Some(base_dir) = base_dir {
        candidates.push(base_dir.join(configured_path));
    }

    if let Some(found) = candidates.iter().find(|candidate| candidate.is_file()) {
        return Ok(found.clone());
    }
    Err(TransferError::FileNotFound(candidates))
}

pub fn read(path: &Path) -> Result<Vec<ParamTuple>, TransferError> {
    let content = fs::read_to_string(path).map_err(|error| TransferError::FileRead {
        path: path.to_path_buf(),
        message: error.to_string(),
    })?;

    Ok(parse_lines(&content))
}

fn parse_lines(content: &str) -> Vec<ParamTuple> {
    content
        .lines()
        .map(|line| line.split(FIELD_DELIMITER).map(str::to_string).collect())
        .collect()
}
