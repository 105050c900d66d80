use std::fs;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use crate::storage::domain::file_store::{FileStore, Transfer};

/// Upper bound on `_N` suffixes tried for one file name.
const MAX_NAME_SUFFIX: u32 = 10_000;

/// [`FileStore`] on the local filesystem.
///
/// An existing destination with the same bytes as the source counts as
/// already placed. A different file with the same name is kept, and the new
/// one gets a `_1`, `_2`, ... suffix. Copies land in a `.part` file first so
/// an interrupted copy never looks placed.
pub struct LocalFileStore;

impl LocalFileStore {
    pub fn new() -> Self {
        Self
    }

    /// First destination that either already holds `source` or is free.
    fn destination_for(&self, source: &Path, dest_dir: &Path) -> io::Result<(PathBuf, bool)> {
        let file_name = source.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no file name", source.display()),
            )
        })?;
        let source_len = fs::metadata(source)?.len();

        let name = Path::new(file_name);
        let stem = name.file_stem().unwrap_or(file_name).to_string_lossy();
        let extension = name.extension().map(|e| e.to_string_lossy());

        for n in 0..=MAX_NAME_SUFFIX {
            let candidate = if n == 0 {
                dest_dir.join(file_name)
            } else {
                match &extension {
                    Some(ext) => dest_dir.join(format!("{stem}_{n}.{ext}")),
                    None => dest_dir.join(format!("{stem}_{n}")),
                }
            };
            match fs::metadata(&candidate) {
                Ok(meta)
                    if meta.is_file()
                        && meta.len() == source_len
                        && same_contents(source, &candidate)? =>
                {
                    return Ok((candidate, true));
                }
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((candidate, false)),
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free name for {} in {}", source.display(), dest_dir.display()),
        ))
    }
}

impl Default for LocalFileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FileStore for LocalFileStore {
    fn ensure_directory(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)
    }

    fn copy_or_move(
        &self,
        source: &Path,
        dest_dir: &Path,
        transfer: Transfer,
    ) -> io::Result<PathBuf> {
        self.ensure_directory(dest_dir)?;
        let (dest, already_placed) = self.destination_for(source, dest_dir)?;

        if already_placed {
            log::debug!("{} already at {}", source.display(), dest.display());
            if transfer == Transfer::Move {
                fs::remove_file(source)?;
            }
            return Ok(dest);
        }

        match transfer {
            Transfer::Copy => copy_via_part(source, &dest)?,
            Transfer::Move => {
                if let Err(e) = fs::rename(source, &dest) {
                    log::debug!("rename failed ({e}), copying {} instead", source.display());
                    copy_via_part(source, &dest)?;
                    fs::remove_file(source)?;
                }
            }
        }
        Ok(dest)
    }
}

/// Byte-for-byte comparison of two files of equal length.
fn same_contents(a: &Path, b: &Path) -> io::Result<bool> {
    const CHUNK: usize = 64 * 1024;
    let mut a = BufReader::new(fs::File::open(a)?);
    let mut b = BufReader::new(fs::File::open(b)?);
    let mut buf_a = vec![0u8; CHUNK];
    let mut buf_b = vec![0u8; CHUNK];
    loop {
        let n = read_full(&mut a, &mut buf_a)?;
        let m = read_full(&mut b, &mut buf_b)?;
        if n != m || buf_a[..n] != buf_b[..m] {
            return Ok(false);
        }
        if n == 0 {
            return Ok(true);
        }
    }
}

/// Fills `buf` unless the reader ends first. Returns the bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn copy_via_part(source: &Path, dest: &Path) -> io::Result<()> {
    let mut part = dest.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    let result = fs::copy(source, &part).and_then(|_| fs::rename(&part, dest));
    if result.is_err() {
        let _ = fs::remove_file(&part);
    }
    result
}
