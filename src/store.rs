//! The persisted CSV store and the incremental merge into it.
//!
//! The store is append-only: a run either creates it (header + rows) or appends
//! the rows whose location is not yet in it. Existing rows are never rewritten.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::normalize::collapse_whitespace;
use crate::schema::{self, Record, URL_COLUMN};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// The store did not exist (or was unusable and moved aside) and was written from scratch.
    pub created: bool,
    pub appended: usize,
    /// Records dropped because their location was already stored or repeated in the batch.
    pub skipped: usize,
}

/// Merges `records` into the store at `path`, keyed by source location.
///
/// Leaves the file untouched when nothing is new. A store that exists but can't be
/// used is moved aside to a `.bak` file before a new one is created.
pub fn merge(records: &[Record], path: &Path) -> Result<MergeReport> {
    let known = match load_known_urls(path) {
        Ok(known) => known,
        Err(e) => {
            let backup = set_aside(path)?;
            warn!(
                path = %path.display(),
                backup = %backup.display(),
                "Couldn't read the existing store, moved it aside and starting a new one: {e}"
            );
            None
        }
    };

    let mut seen = known.clone().unwrap_or_default();
    let fresh: Vec<&Record> = records
        .iter()
        .filter(|r| seen.insert(r.url.as_str().to_owned()))
        .collect();
    let skipped = records.len() - fresh.len();

    if known.is_none() {
        create(&fresh, path)?;
        info!(path = %path.display(), rows = fresh.len(), "Created store");
        return Ok(MergeReport {
            created: true,
            appended: fresh.len(),
            skipped,
        });
    }

    if fresh.is_empty() {
        info!(path = %path.display(), skipped, "Nothing new to store");
        return Ok(MergeReport {
            created: false,
            appended: 0,
            skipped,
        });
    }

    append(&fresh, path)?;
    info!(path = %path.display(), rows = fresh.len(), skipped, "Appended to store");
    Ok(MergeReport {
        created: false,
        appended: fresh.len(),
        skipped,
    })
}

/// Reads only the identity column of the store.
///
/// `Ok(None)` if there is no store yet: no file or an empty one. A store without
/// the identity column, or one the CSV reader rejects, is an error. Cells are read
/// as bytes, so text in other columns never has to be valid UTF-8.
pub fn load_known_urls(path: &Path) -> Result<Option<HashSet<String>>> {
    if !path.exists() {
        return Ok(None);
    }

    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.byte_headers()?;
    if headers.is_empty() {
        return Ok(None);
    }
    let url_col = headers
        .iter()
        .position(|h| collapse_whitespace(&String::from_utf8_lossy(h)) == URL_COLUMN)
        .ok_or_else(|| Error::UnusableStore(format!("no '{URL_COLUMN}' column")))?;

    let mut known = HashSet::new();
    for row in reader.byte_records() {
        if let Some(url) = row?.get(url_col) {
            known.insert(String::from_utf8_lossy(url).into_owned());
        }
    }
    Ok(Some(known))
}

/// Renames the store at `path` to the first free `<path>.bak`, `<path>.bak.1`, ...
fn set_aside(path: &Path) -> Result<PathBuf> {
    let mut backup = path.as_os_str().to_owned();
    backup.push(".bak");
    let mut candidate = PathBuf::from(&backup);
    let mut n = 0;
    while candidate.exists() {
        n += 1;
        candidate = PathBuf::from(format!("{}.{n}", backup.to_string_lossy()));
    }
    fs::rename(path, &candidate)?;
    Ok(candidate)
}

fn create(records: &[&Record], path: &Path) -> Result<()> {
    // Ensure parent directories exist
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(schema::header())?;
    for record in records {
        writer.write_record(record.to_row())?;
    }
    writer.flush()?;
    Ok(())
}

fn append(records: &[&Record], path: &Path) -> Result<()> {
    let mut file = OpenOptions::new().read(true).append(true).open(path)?;
    if !ends_with_newline(&mut file)? {
        file.write_all(b"\n")?;
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    for record in records {
        writer.write_record(record.to_row())?;
    }
    writer.flush()?;
    Ok(())
}

fn ends_with_newline(file: &mut File) -> Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
