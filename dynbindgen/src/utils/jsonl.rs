//! Reading and writing declaration models in JSON-lines format.
//!
//! Each line holds one [`Declaration`] tagged by its `kind`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::model::{Declaration, Declarations};

#[derive(Debug, thiserror::Error)]
pub enum JsonlError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}:{line}: {source}", path.display())]
    Record {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Write a declaration model to a file, one record per line
pub fn write_jsonl_file<P: AsRef<Path>>(
    file_path: P,
    declarations: &Declarations,
) -> Result<(), JsonlError> {
    let path = file_path.as_ref();
    let io = |source| JsonlError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = fs::File::create(path).map_err(io)?;
    for (line, record) in declarations.to_records().iter().enumerate() {
        let json_line = serde_json::to_string(record).map_err(|source| JsonlError::Record {
            path: path.to_path_buf(),
            line: line + 1,
            source,
        })?;
        writeln!(file, "{json_line}").map_err(io)?;
    }
    file.flush().map_err(io)?;
    Ok(())
}

/// Read a declaration model from a JSON-lines file. Blank lines are skipped.
pub fn read_jsonl_file<P: AsRef<Path>>(file_path: P) -> Result<Declarations, JsonlError> {
    let path = file_path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| JsonlError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_jsonl(&content).map_err(|(line, source)| JsonlError::Record {
        path: path.to_path_buf(),
        line,
        source,
    })
}

fn parse_jsonl(content: &str) -> Result<Declarations, (usize, serde_json::Error)> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(line_num, line)| {
            serde_json::from_str::<Declaration>(line.trim()).map_err(|e| (line_num + 1, e))
        })
        .collect()
}
