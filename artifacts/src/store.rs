use std::{
    collections::BTreeMap,
    fmt, fs,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

use crate::{
    container::{open_artifact, AtomicWriter},
    error::ArtifactError,
    naming::video_name,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArtifactKind {
    Cine,
    Gray,
    Binarized,
    Roi,
    Contours,
    Filled,
    Tracks,
}

impl ArtifactKind {
    pub fn dir(self) -> &'static str {
        match self {
            ArtifactKind::Cine => "cines",
            ArtifactKind::Gray => "large_sources",
            ArtifactKind::Binarized => "sources",
            ArtifactKind::Roi => "rois",
            ArtifactKind::Contours => "contours",
            ArtifactKind::Filled => "filled",
            ArtifactKind::Tracks => "tracks",
        }
    }

    pub fn ext(self) -> &'static str {
        match self {
            ArtifactKind::Cine => "cine",
            ArtifactKind::Contours | ArtifactKind::Tracks => "tbl",
            _ => "ds",
        }
    }

    /// Directory of the uncompressed copy kept for fast re-reads, if any.
    pub fn mirror_dir(self) -> Option<&'static str> {
        match self {
            ArtifactKind::Binarized => Some("uncompressed_sources"),
            ArtifactKind::Filled => Some("uncompressed_filled"),
            ArtifactKind::Contours => Some("uncompressed_contours"),
            _ => None,
        }
    }

    pub fn compressed(self) -> bool {
        self != ArtifactKind::Cine
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactKind::Cine => "cine",
            ArtifactKind::Gray => "gray video",
            ArtifactKind::Binarized => "binarized video",
            ArtifactKind::Roi => "roi",
            ArtifactKind::Contours => "contours",
            ArtifactKind::Filled => "filled video",
            ArtifactKind::Tracks => "tracks",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePaths {
    pub compressed: PathBuf,
    pub mirror: Option<PathBuf>,
}

impl StagePaths {
    /// The mirror when it is present, the compressed artifact otherwise.
    pub fn read_path(&self) -> &Path {
        match &self.mirror {
            Some(mirror) if mirror.is_file() => mirror,
            _ => &self.compressed,
        }
    }

    pub fn exists(&self) -> bool {
        self.compressed.is_file()
    }
}

/// Name keyed artifact layout below one data root.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, kind: ArtifactKind) -> PathBuf {
        self.root.join(kind.dir())
    }

    pub fn stage_path(&self, name: &str, kind: ArtifactKind) -> StagePaths {
        let file = format!("{name}.{}", kind.ext());
        StagePaths {
            compressed: self.dir(kind).join(&file),
            mirror: kind.mirror_dir().map(|dir| self.root.join(dir).join(&file)),
        }
    }

    /// Sorted stems of all `kind` artifacts.
    pub fn list(&self, kind: ArtifactKind) -> Result<Vec<String>, ArtifactError> {
        Ok(self.scan(kind)?.into_keys().collect())
    }

    /// Videos for which an ingested gray source exists, in lexical order.
    pub fn list_videos(&self) -> Result<Vec<String>, ArtifactError> {
        self.list(ArtifactKind::Gray)
    }

    /// Raw recordings keyed by the video name derived from their stem.
    pub fn list_cines(&self) -> Result<BTreeMap<String, PathBuf>, ArtifactError> {
        let mut cines = BTreeMap::new();
        for (stem, path) in self.scan(ArtifactKind::Cine)? {
            let name = video_name(&stem);
            if let Some(previous) = cines.insert(name.clone(), path) {
                log::warn!("{} and {stem} both map to video {name}", previous.display());
            }
        }
        Ok(cines)
    }

    fn scan(&self, kind: ArtifactKind) -> Result<BTreeMap<String, PathBuf>, ArtifactError> {
        let dir = self.dir(kind);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };

        let mut found = BTreeMap::new();
        for entry in entries {
            let path = entry?.path();
            let matches_ext = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(kind.ext()));
            if !matches_ext || !path.is_file() {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.starts_with('.') {
                    found.insert(stem.to_string(), path);
                }
            }
        }
        Ok(found)
    }

    /// Names lacking a `kind` artifact, mapped to where it is expected.
    pub fn unprocessed<I, S>(&self, names: I, kind: ArtifactKind) -> BTreeMap<String, PathBuf>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .filter_map(|name| {
                let paths = self.stage_path(name.as_ref(), kind);
                (!paths.exists()).then(|| (name.as_ref().to_string(), paths.compressed))
            })
            .collect()
    }

    pub fn exists(&self, name: &str, kind: ArtifactKind) -> bool {
        self.stage_path(name, kind).exists()
    }

    /// Opens a committed artifact. A mirror without its compressed artifact
    /// counts as missing.
    pub fn open(&self, name: &str, kind: ArtifactKind) -> Result<Box<dyn BufRead + Send>, ArtifactError> {
        let paths = self.stage_path(name, kind);
        if !paths.exists() {
            return Err(ArtifactError::MissingInput { name: name.to_string(), kind });
        }
        open_artifact(paths.read_path())
    }

    /// Starts writing `name`'s `kind` artifact (plus its mirror). Nothing is
    /// visible at the destination until [`StageWriter::commit`].
    pub fn create(&self, name: &str, kind: ArtifactKind) -> Result<StageWriter, ArtifactError> {
        let paths = self.stage_path(name, kind);
        let primary = AtomicWriter::create(&paths.compressed, kind.compressed())?;
        let mirror = match &paths.mirror {
            Some(path) => Some(AtomicWriter::create(path, false)?),
            None => None,
        };
        Ok(StageWriter { primary, mirror })
    }
}

/// Tees writes into the compressed artifact and its uncompressed mirror.
pub struct StageWriter {
    primary: AtomicWriter,
    mirror: Option<AtomicWriter>,
}

impl StageWriter {
    pub fn dest(&self) -> &Path {
        self.primary.dest()
    }

    /// Mirror first, so an interrupted commit never leaves a primary without it.
    pub fn commit(self) -> Result<PathBuf, ArtifactError> {
        if let Some(mirror) = self.mirror {
            mirror.commit()?;
        }
        self.primary.commit()
    }
}

impl Write for StageWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.primary.write_all(buf)?;
        if let Some(mirror) = &mut self.mirror {
            mirror.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.primary.flush()?;
        if let Some(mirror) = &mut self.mirror {
            mirror.flush()?;
        }
        Ok(())
    }
}
