use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use rust_htslib::faidx;
use tracing::debug;

use crate::genomics::Base;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Open a text file for line-oriented reading, transparently decompressing
/// gzip (and bgzip) input.
pub fn open_text_reader(path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 2];
    let read = file.read(&mut magic)?;
    let file = File::open(path)?;
    if read == GZIP_MAGIC.len() && magic == GZIP_MAGIC {
        debug!(path = %path.display(), "reading gzip-compressed input");
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Write `contents` to `path` through a sibling temporary file and a rename,
/// so readers never see a partially written file.
pub fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let mut temp_name = std::ffi::OsString::from(".");
    temp_name.push(file_name);
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    {
        let mut file = File::create(&temp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, path)
}

/// Panel reference base that disagrees with the reference FASTA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceMismatch {
    /// Site name.
    pub site: String,
    /// Position (1-based).
    pub position: u32,
    /// Base declared by the panel.
    pub expected: Base,
    /// Base found in the FASTA, uppercased.
    pub found: String,
}

/// Compare expected reference bases against an indexed FASTA.
///
/// `sites` yields `(name, 1-based position, expected base)`.
pub fn validate_reference_bases<'a, I>(
    fasta: &Path,
    contig: &str,
    sites: I,
) -> Result<Vec<ReferenceMismatch>, rust_htslib::errors::Error>
where
    I: IntoIterator<Item = (&'a str, u32, Base)>,
{
    let reader = faidx::Reader::from_path(fasta)?;
    let mut mismatches = Vec::new();
    for (name, position, expected) in sites {
        let offset = position.saturating_sub(1) as usize;
        let found = reader.fetch_seq_string(contig, offset, offset)?.to_ascii_uppercase();
        let matches = found
            .as_bytes()
            .first()
            .and_then(|&byte| Base::from_ascii(byte))
            .map_or(false, |base| base == expected);
        if !matches {
            mismatches.push(ReferenceMismatch {
                site: name.to_string(),
                position,
                expected,
                found,
            });
        }
    }
    Ok(mismatches)
}
