use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Error that occurs when opening a file fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to open file `{path}`: {source}")]
pub struct FileOpenError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Errors of the capped file reads.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    FileOpen(#[from] FileOpenError),
    #[error("failed to read file `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Opens a file at the given path and wraps it in a [`BufReader`].
///
/// # Errors
///
/// Returns a [`FileOpenError`] if the file cannot be opened.
///
/// # Example
/// ```no_run
/// # use process_containers::fsutil;
/// let reader = fsutil::open_file_reader("/var/lib/lxc/web/config")?;
/// # Ok::<(), fsutil::FileOpenError>(())
/// ```
pub fn open_file_reader(path: impl AsRef<Path>) -> Result<BufReader<File>, FileOpenError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| FileOpenError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Reads at most the first `cap` bytes of a file as text.
///
/// A character cut in half at `cap` is dropped, so the result is a prefix of
/// the file and never longer than `cap` bytes.
///
/// # Errors
///
/// Returns an [`Error`] if the file cannot be opened or read.
pub fn read_head(path: impl AsRef<Path>, cap: u64) -> Result<String, Error> {
    let path = path.as_ref();
    let reader = open_file_reader(path)?;
    let mut buf = read_bytes(reader.take(cap), path)?;
    if buf.len() as u64 == cap {
        buf.truncate(buf.len() - split_char_suffix_len(&buf));
    }
    Ok(decode(&buf))
}

/// Reads at most the last `cap` bytes of a file as text.
///
/// Files larger than `cap` are read from offset `size - cap`, so the most
/// recent content wins. A character cut in half at that offset is dropped, so
/// the result is a suffix of the file and never longer than `cap` bytes.
///
/// # Errors
///
/// Returns an [`Error`] if the file cannot be opened, measured, or read.
pub fn read_tail(path: impl AsRef<Path>, cap: u64) -> Result<String, Error> {
    let path = path.as_ref();
    let mut reader = open_file_reader(path)?;
    let read_error = |source| Error::Read {
        path: path.to_path_buf(),
        source,
    };

    let size = reader.get_ref().metadata().map_err(read_error)?.len();
    let offset = size.saturating_sub(cap);
    reader.seek(SeekFrom::Start(offset)).map_err(read_error)?;

    let buf = read_bytes(reader.take(cap), path)?;
    let skip = if offset > 0 {
        split_char_prefix_len(&buf)
    } else {
        0
    };
    Ok(decode(&buf[skip..]))
}

fn read_bytes(mut reader: impl Read, path: &Path) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(buf)
}

fn decode(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf).into_owned()
}

fn is_continuation(b: u8) -> bool {
    b & 0xC0 == 0x80
}

/// Number of leading continuation bytes left over from a character that
/// started before `buf`.
fn split_char_prefix_len(buf: &[u8]) -> usize {
    buf.iter().take(3).take_while(|b| is_continuation(**b)).count()
}

/// Number of trailing bytes of a character that continues after `buf`.
fn split_char_suffix_len(buf: &[u8]) -> usize {
    for (back, &b) in buf.iter().rev().take(4).enumerate() {
        if is_continuation(b) {
            continue;
        }
        let width = match b {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if width > back + 1 { back + 1 } else { 0 };
    }
    0
}
