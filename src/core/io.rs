use anyhow::{Context, Result, anyhow};
use flate2::read::MultiGzDecoder;
use gzp::deflate::{Bgzf, Mgzip};
use gzp::par::decompress::ParDecompressBuilder;
use memchr::memchr;
use memmap2::Mmap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

const GZIP_READ_BUF: usize = 8 * 1024 * 1024;

/// Read-only mapping of a whole file. Empty files are not mapped.
pub struct MmapSource {
    mmap: Option<Mmap>,
}

impl MmapSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let len = file
            .metadata()
            .with_context(|| format!("failed to stat {}", path.display()))?
            .len();
        if len == 0 {
            return Ok(Self { mmap: None });
        }
        // SAFETY: read-only file mapping.
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("mmap failed for {}", path.display()))?;
        Ok(Self { mmap: Some(mmap) })
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.mmap {
            Some(m) => m,
            None => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InputKind {
    Plain,
    Gzip,
}

pub fn file_size(path: &Path) -> Result<u64> {
    let meta = fs::metadata(path).with_context(|| format!("failed to stat {}", path.display()))?;
    if !meta.is_file() {
        return Err(anyhow!("{} is not a regular file", path.display()));
    }
    Ok(meta.len())
}

/// Strips one trailing `\n` and an optional `\r` before it.
#[inline]
fn trim_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Sequence lines (line 2 of every 4-line record) of an in-memory FASTQ.
pub struct SequenceLines<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> SequenceLines<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn next_line(&mut self) -> Option<&'a [u8]> {
        if self.pos >= self.bytes.len() {
            return None;
        }
        let rest = &self.bytes[self.pos..];
        let end = memchr(b'\n', rest).map(|i| i + 1).unwrap_or(rest.len());
        self.pos += end;
        Some(trim_eol(&rest[..end]))
    }
}

impl<'a> Iterator for SequenceLines<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        self.next_line()?;
        let seq = self.next_line()?;
        self.next_line();
        self.next_line();
        Some(seq)
    }
}

/// Same record walk as [`SequenceLines`] over a streaming reader.
pub fn for_each_sequence_in<R, F>(mut reader: R, mut f: F) -> Result<u64>
where
    R: BufRead,
    F: FnMut(&[u8]) -> Result<()>,
{
    let mut skip = Vec::new();
    let mut seq = Vec::new();
    let mut records = 0u64;
    loop {
        skip.clear();
        if reader
            .read_until(b'\n', &mut skip)
            .context("failed to read FASTQ header line")?
            == 0
        {
            break;
        }
        seq.clear();
        if reader
            .read_until(b'\n', &mut seq)
            .context("failed to read FASTQ sequence line")?
            == 0
        {
            break;
        }
        records += 1;
        f(trim_eol(&seq))?;
        for _ in 0..2 {
            skip.clear();
            reader
                .read_until(b'\n', &mut skip)
                .context("failed to read FASTQ record")?;
        }
    }
    Ok(records)
}

/// Input reads, reopened for each pass over the file.
pub enum ReadSource {
    Mapped(MmapSource),
    Gzip { path: PathBuf, threads: usize },
}

impl ReadSource {
    pub fn open(path: &Path, threads: usize) -> Result<Self> {
        match detect_input_kind(path)? {
            InputKind::Plain => Ok(ReadSource::Mapped(MmapSource::open(path)?)),
            InputKind::Gzip => Ok(ReadSource::Gzip {
                path: path.to_path_buf(),
                threads,
            }),
        }
    }

    /// Calls `f` with the sequence line of every record, in file order, and
    /// returns the number of records seen. Stops at the first error from `f`.
    pub fn for_each_sequence<F>(&self, mut f: F) -> Result<u64>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        match self {
            ReadSource::Mapped(source) => {
                let mut records = 0u64;
                for seq in SequenceLines::new(source.bytes()) {
                    records += 1;
                    f(seq)?;
                }
                Ok(records)
            }
            ReadSource::Gzip { path, threads } => {
                let reader = open_gzip_reader(path, *threads)?;
                let reader = BufReader::with_capacity(GZIP_READ_BUF, reader);
                for_each_sequence_in(reader, f)
                    .with_context(|| format!("failed to read {}", path.display()))
            }
        }
    }
}

pub fn detect_input_kind(path: &Path) -> Result<InputKind> {
    if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
        let ext = ext.to_ascii_lowercase();
        if ext == "gz" {
            return Ok(InputKind::Gzip);
        }
    }
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut magic = [0u8; 2];
    let n = file
        .read(&mut magic)
        .with_context(|| "failed to read magic bytes")?;
    if n == 2 && magic == [0x1f, 0x8b] {
        Ok(InputKind::Gzip)
    } else {
        Ok(InputKind::Plain)
    }
}

#[derive(Clone, Copy, Debug)]
enum GzipVariant {
    Standard,
    Mgzip,
    Bgzf,
}

fn detect_gzip_variant(path: &Path) -> Result<GzipVariant> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut header = [0u8; 20];
    let n = file
        .read(&mut header)
        .with_context(|| "failed to read gzip header")?;
    if n < 14 || header[0] != 0x1f || header[1] != 0x8b || header[3] & 4 == 0 {
        return Ok(GzipVariant::Standard);
    }
    match (header[12], header[13]) {
        (b'B', b'C') => Ok(GzipVariant::Bgzf),
        (b'I', b'G') => Ok(GzipVariant::Mgzip),
        _ => Ok(GzipVariant::Standard),
    }
}

pub fn open_gzip_reader(path: &Path, threads: usize) -> Result<Box<dyn Read + Send>> {
    let variant = detect_gzip_variant(path)?;
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let reader = BufReader::new(file);
    let reader: Box<dyn Read + Send> = match variant {
        GzipVariant::Bgzf if threads > 1 => Box::new(
            ParDecompressBuilder::<Bgzf>::new()
                .num_threads(threads)
                .map_err(|e| anyhow!("failed to configure BGZF decoder: {e}"))?
                .from_reader(reader),
        ),
        GzipVariant::Mgzip if threads > 1 => Box::new(
            ParDecompressBuilder::<Mgzip>::new()
                .num_threads(threads)
                .map_err(|e| anyhow!("failed to configure Mgzip decoder: {e}"))?
                .from_reader(reader),
        ),
        _ => Box::new(MultiGzDecoder::new(reader)),
    };
    Ok(reader)
}
