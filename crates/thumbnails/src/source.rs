use std::fmt::Display;
use std::path::{Path, PathBuf};

/// Resolves a key to the encoded file that backs it.
pub trait ThumbnailSource<K>: Send + Sync {
    fn path_for(&self, key: &K) -> PathBuf;

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// `<root>/<key>.<extension>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySource {
    root: PathBuf,
    extension: String,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }
}

impl<K: Display> ThumbnailSource<K> for DirectorySource {
    fn path_for(&self, key: &K) -> PathBuf {
        self.root.join(format!("{key}.{}", self.extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_joins_key_and_extension_under_root() {
        let source = DirectorySource::new("/cache/thumbnails", "png");
        let path = ThumbnailSource::<&str>::path_for(&source, &"2c8e1f");
        assert_eq!(path, PathBuf::from("/cache/thumbnails/2c8e1f.png"));
    }

    #[test]
    fn directories_are_not_thumbnails() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let source = DirectorySource::new(dir.path(), "png");
        std::fs::create_dir(dir.path().join("nested.png")).expect("create dir");
        let path = ThumbnailSource::<&str>::path_for(&source, &"nested");
        assert!(!ThumbnailSource::<&str>::exists(&source, &path));

        std::fs::write(dir.path().join("present.png"), b"").expect("write file");
        let path = ThumbnailSource::<&str>::path_for(&source, &"present");
        assert!(ThumbnailSource::<&str>::exists(&source, &path));
    }
}
