//! Crash-safe file helpers shared by the on-disk stores.
//!
//! Whole-file rewrites go through a `.part` sibling that is synced and then
//! renamed over the target, so readers see either the old or the new
//! contents. Line-oriented logs are appended one JSON document per line.

use std::fs;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Replaces `path` with `bytes`, durably.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let temp_path = part_path(path);
    let result = write_then_rename(path, &temp_path, bytes);
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn write_then_rename(path: &Path, temp_path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(temp_path, path)
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

/// Appends one JSON document as a line and syncs it to disk.
pub fn append_json_line<T: Serialize>(file: &mut fs::File, value: &T) -> io::Result<()> {
    let mut line = serde_json::to_vec(value).map_err(io::Error::other)?;
    line.push(b'\n');
    file.write_all(&line)?;
    file.flush()?;
    file.sync_data()
}

/// Result of reading a JSON-lines file.
#[derive(Debug)]
pub struct JsonLines<T> {
    pub entries: Vec<T>,
    /// The last line had no terminating newline: an append was cut short.
    /// The file must be rewritten before anything else is appended to it.
    /// An unterminated line that still parses is kept in `entries`.
    pub torn_tail: bool,
}

/// Error for a JSON-lines file that is damaged somewhere other than its tail.
#[derive(Debug, thiserror::Error)]
pub enum JsonLinesError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path} line {line}: {source}")]
    Malformed {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads every line of a JSON-lines file. Blank lines are ignored.
///
/// An absent file yields no entries.
pub fn read_json_lines<T: DeserializeOwned>(path: &Path) -> Result<JsonLines<T>, JsonLinesError> {
    let io_err = |source| JsonLinesError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(JsonLines {
                entries: Vec::new(),
                torn_tail: false,
            })
        }
        Err(e) => return Err(io_err(e)),
    };

    let mut reader = BufReader::new(file);
    let mut entries = Vec::new();
    let mut buf = String::new();
    let mut line_no = 0;
    let mut torn_tail = false;

    loop {
        buf.clear();
        let n = reader.read_line(&mut buf).map_err(io_err)?;
        if n == 0 {
            break;
        }
        line_no += 1;
        let terminated = buf.ends_with('\n');
        let text = buf.trim();
        if text.is_empty() {
            continue;
        }
        match serde_json::from_str(text) {
            Ok(entry) => {
                entries.push(entry);
                torn_tail = !terminated;
            }
            Err(_) if !terminated => {
                return Ok(JsonLines {
                    entries,
                    torn_tail: true,
                })
            }
            Err(source) => {
                return Err(JsonLinesError::Malformed {
                    path: path.to_path_buf(),
                    line: line_no,
                    source,
                })
            }
        }
    }

    Ok(JsonLines { entries, torn_tail })
}

/// Rewrites a JSON-lines file atomically with the given entries.
pub fn write_json_lines<'a, T, I>(path: &Path, entries: I) -> io::Result<()>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut bytes = Vec::new();
    for entry in entries {
        serde_json::to_writer(&mut bytes, entry).map_err(io::Error::other)?;
        bytes.push(b'\n');
    }
    write_atomically(path, &bytes)
}

/// Opens `path` for appending, creating it if needed.
pub fn open_append(path: &Path) -> io::Result<fs::File> {
    fs::OpenOptions::new().create(true).append(true).open(path)
}

/// Whether appending to `path` would start a fresh line.
///
/// False when the file ends in a partial line left by a failed append. An
/// absent or empty file ends cleanly.
pub fn ends_cleanly(path: &Path) -> io::Result<bool> {
    let mut file = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e),
    };
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
