use std::{
    fs::{self, File},
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use tempfile::NamedTempFile;

use crate::error::ArtifactError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Opens an artifact for reading. Gzip files are decompressed on the fly so
/// callers see the same bytes whether they read the compressed file or a mirror.
pub fn open_artifact(path: &Path) -> Result<Box<dyn BufRead + Send>, ArtifactError> {
    let mut file = BufReader::new(File::open(path)?);
    let compressed = file.fill_buf()?.starts_with(&GZIP_MAGIC);

    if compressed {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(file))
    }
}

enum Sink {
    Plain(BufWriter<NamedTempFile>),
    Gzip(GzEncoder<BufWriter<NamedTempFile>>),
}

/// Writes into a temporary file next to `dest` and renames it into place on
/// `commit`. Dropping the writer without committing removes the temporary file.
pub struct AtomicWriter {
    sink: Sink,
    dest: PathBuf,
}

impl AtomicWriter {
    pub fn create(dest: &Path, compress: bool) -> Result<Self, ArtifactError> {
        let dir = match dest.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let tmp = tempfile::Builder::new().prefix(".").suffix(".partial").tempfile_in(dir)?;
        let out = BufWriter::new(tmp);
        let sink = if compress {
            Sink::Gzip(GzEncoder::new(out, Compression::default()))
        } else {
            Sink::Plain(out)
        };

        Ok(Self { sink, dest: dest.to_path_buf() })
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    pub fn commit(self) -> Result<PathBuf, ArtifactError> {
        let out = match self.sink {
            Sink::Plain(out) => out,
            Sink::Gzip(gz) => gz.finish()?,
        };
        let tmp = out.into_inner().map_err(|e| e.into_error())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.dest).map_err(|e| e.error)?;
        log::debug!("Wrote {}", self.dest.display());

        Ok(self.dest)
    }
}

impl Write for AtomicWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.sink {
            Sink::Plain(out) => out.write(buf),
            Sink::Gzip(out) => out.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.sink {
            Sink::Plain(out) => out.flush(),
            Sink::Gzip(out) => out.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    fn read_all(path: &Path) -> Vec<u8> {
        let mut buf = Vec::new();
        open_artifact(path).unwrap().read_to_end(&mut buf).unwrap();
        buf
    }

    #[test]
    fn compressed_and_plain_read_the_same() {
        let dir = tempfile::tempdir().unwrap();
        let payload: Vec<u8> = (0..10_000u32).map(|v| (v % 251) as u8).collect();

        for (name, compress) in [("a.bin", true), ("b.bin", false)] {
            let mut w = AtomicWriter::create(&dir.path().join(name), compress).unwrap();
            w.write_all(&payload).unwrap();
            w.commit().unwrap();
        }

        let raw = fs::read(dir.path().join("a.bin")).unwrap();
        assert!(raw.starts_with(&GZIP_MAGIC));
        assert_eq!(read_all(&dir.path().join("a.bin")), payload);
        assert_eq!(read_all(&dir.path().join("b.bin")), payload);
    }

    #[test]
    fn dropped_writer_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested").join("out.ds");
        {
            let mut w = AtomicWriter::create(&dest, true).unwrap();
            w.write_all(b"partial").unwrap();
        }

        assert!(!dest.exists());
        assert_eq!(fs::read_dir(dest.parent().unwrap()).unwrap().count(), 0);
    }

    #[test]
    fn compressed_output_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str| {
            let mut w = AtomicWriter::create(&dir.path().join(name), true).unwrap();
            w.write_all(b"same content every time").unwrap();
            w.commit().unwrap()
        };

        assert_eq!(fs::read(write("one")).unwrap(), fs::read(write("two")).unwrap());
    }
}
