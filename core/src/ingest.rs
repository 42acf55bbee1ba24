//! JSON-lines ingestion.
//!
//! RULE: One bad line never fails a file. Unparsable records, including
//! lines that are not valid UTF-8, are logged with their line number and
//! counted; I/O errors still propagate.

use crate::error::AciResult;
use serde::de::DeserializeOwned;
use std::{
    fs::File,
    io::{BufRead, BufReader},
};

/// Records parsed from one source, plus how many lines were rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct Ingested<T> {
    pub records: Vec<T>,
    pub skipped: usize,
}

pub fn read_jsonl<T, R>(mut reader: R, source: &str) -> AciResult<Ingested<T>>
where
    T: DeserializeOwned,
    R: BufRead,
{
    let mut records = Vec::new();
    let mut skipped = 0;
    let mut buf = Vec::new();
    let mut line_no = 0usize;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_no += 1;

        let line = buf.trim_ascii();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_slice::<T>(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                skipped += 1;
                log::warn!("{source}:{line_no}: skipping record: {e}");
            }
        }
    }

    log::info!("{source}: {} record(s) read, {skipped} skipped", records.len());
    Ok(Ingested { records, skipped })
}

pub fn read_jsonl_file<T: DeserializeOwned>(path: &str) -> AciResult<Ingested<T>> {
    let file = File::open(path).map_err(|e| anyhow::anyhow!("Cannot open {path}: {e}"))?;
    read_jsonl(BufReader::new(file), path)
}
