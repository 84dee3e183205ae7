//! Lookup of media streams by (language, path, kind).

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Video,
    Audio,
    Subtitle,
}

impl ResourceKind {
    /// File extensions tried by [`DirectoryLocator`], in order.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            ResourceKind::Video => &["ani.gz", "ani"],
            ResourceKind::Audio => &["wav"],
            ResourceKind::Subtitle => &["sub", "srt"],
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Video => "video",
            ResourceKind::Audio => "audio",
            ResourceKind::Subtitle => "subtitle",
        })
    }
}

/// Logical media key: language (or audio track) plus extension-less path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaRef {
    pub language: String,
    pub path: String,
}

impl MediaRef {
    pub fn new(language: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.language, self.path)
    }
}

pub type MediaStream = Box<dyn Read + Send>;

/// Maps logical keys to byte streams.
pub trait ResourceLocator: Send + Sync {
    /// `Ok(None)` when no such resource exists.
    fn open(&self, language: &str, path: &str, kind: ResourceKind) -> io::Result<Option<MediaStream>>;
}

/// Resources laid out as `<root>/<language>/<path>.<ext>`.
#[derive(Debug, Clone)]
pub struct DirectoryLocator {
    root: PathBuf,
}

impl DirectoryLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// First existing file for the key, if any.
    pub fn resolve(&self, language: &str, path: &str, kind: ResourceKind) -> Option<PathBuf> {
        let base = self.root.join(language);
        kind.extensions()
            .iter()
            .map(|ext| base.join(format!("{path}.{ext}")))
            .find(|candidate| candidate.is_file())
    }
}

impl ResourceLocator for DirectoryLocator {
    fn open(&self, language: &str, path: &str, kind: ResourceKind) -> io::Result<Option<MediaStream>> {
        let Some(file_path) = self.resolve(language, path, kind) else {
            log::debug!("No {kind} resource for {language}/{path} under {}", self.root.display());
            return Ok(None);
        };
        match File::open(&file_path) {
            Ok(file) => {
                log::debug!("Opened {kind} resource {}", file_path.display());
                Ok(Some(Box::new(file)))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Resources held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLocator {
    entries: HashMap<(String, String, ResourceKind), Arc<[u8]>>,
}

impl MemoryLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        language: impl Into<String>,
        path: impl Into<String>,
        kind: ResourceKind,
        bytes: impl Into<Arc<[u8]>>,
    ) {
        self.entries
            .insert((language.into(), path.into(), kind), bytes.into());
    }

    pub fn with(
        mut self,
        language: impl Into<String>,
        path: impl Into<String>,
        kind: ResourceKind,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        self.insert(language, path, kind, bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ResourceLocator for MemoryLocator {
    fn open(&self, language: &str, path: &str, kind: ResourceKind) -> io::Result<Option<MediaStream>> {
        let key = (language.to_string(), path.to_string(), kind);
        Ok(self
            .entries
            .get(&key)
            .map(|bytes| Box::new(Cursor::new(Arc::clone(bytes))) as MediaStream))
    }
}
