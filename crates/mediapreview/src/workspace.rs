use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("path escapes workspace root: {0}")]
    PathTraversal(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WorkspaceError>;

/// What kind of media a file holds, as far as previews are concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaType {
    Image,
    Video,
    /// Anything else, carrying a short kind name ("text", "audio", "directory", "blob", ...).
    Other(String),
}

impl MediaType {
    pub fn as_str(&self) -> &str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Other(kind) => kind,
        }
    }

    fn detect(path: &Path, is_dir: bool) -> Self {
        if is_dir {
            return MediaType::Other("directory".into());
        }
        match mime_guess::from_path(path).first() {
            Some(mime) if mime.type_() == mime_guess::mime::IMAGE => MediaType::Image,
            Some(mime) if mime.type_() == mime_guess::mime::VIDEO => MediaType::Video,
            Some(mime) => MediaType::Other(mime.type_().as_str().to_string()),
            None => MediaType::Other("blob".into()),
        }
    }
}

/// Snapshot of a file taken when a request is handled.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    /// Path as the client named it, always starting with `/`.
    pub path: String,
    /// Canonical location on disk.
    pub real_path: PathBuf,
    pub name: String,
    pub modified: SystemTime,
    pub media_type: MediaType,
    /// Lowercase extension including the leading dot, empty when there is none.
    pub extension: String,
    pub size: u64,
}

impl FileDescriptor {
    /// Modification time as whole seconds since the Unix epoch (negative before 1970).
    pub fn mod_time_unix(&self) -> i64 {
        match self.modified.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(e) => -(e.duration().as_secs() as i64),
        }
    }
}

#[derive(Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().canonicalize()?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path to an absolute path within the workspace.
    /// Returns an error if the resolved path escapes the workspace root.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> Result<PathBuf> {
        let relative = relative.as_ref();

        // Join with root; an absolute request path has its leading / stripped
        let joined = if relative.is_absolute() {
            self.root
                .join(relative.strip_prefix("/").unwrap_or(relative))
        } else {
            self.root.join(relative)
        };

        // Canonicalize if the path exists, otherwise canonicalize the parent
        let resolved = if joined.exists() {
            joined.canonicalize()?
        } else {
            let parent = joined
                .parent()
                .ok_or_else(|| WorkspaceError::PathTraversal(relative.display().to_string()))?;
            let file_name = joined
                .file_name()
                .ok_or_else(|| WorkspaceError::PathTraversal(relative.display().to_string()))?;
            parent.canonicalize()?.join(file_name)
        };

        if !resolved.starts_with(&self.root) {
            return Err(WorkspaceError::PathTraversal(
                relative.display().to_string(),
            ));
        }

        Ok(resolved)
    }

    /// Look up a file and take its [`FileDescriptor`].
    pub async fn describe(&self, path: &str) -> Result<FileDescriptor> {
        let request_path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        let real_path = self.resolve(&request_path)?;
        let meta = tokio::fs::metadata(&real_path).await?;

        let name = real_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = if meta.is_dir() {
            String::new()
        } else {
            real_path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
                .unwrap_or_default()
        };

        Ok(FileDescriptor {
            media_type: MediaType::detect(&real_path, meta.is_dir()),
            modified: meta.modified()?,
            size: meta.len(),
            path: request_path,
            real_path,
            name,
            extension,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn resolve_normal_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hello.txt"), "hi").unwrap();
        let ws = Workspace::new(dir.path()).unwrap();
        let resolved = ws.resolve("hello.txt").unwrap();
        assert!(resolved.starts_with(ws.root()));
        assert!(resolved.ends_with("hello.txt"));
    }

    #[test]
    fn reject_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path()).unwrap();
        let result = ws.resolve("../../../etc/passwd");
        assert!(result.is_err());
    }

    #[test]
    fn resolve_absolute_path_stripped() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/file.txt"), "data").unwrap();
        let ws = Workspace::new(dir.path()).unwrap();
        let resolved = ws.resolve("/sub/file.txt").unwrap();
        assert!(resolved.starts_with(ws.root()));
    }

    #[tokio::test]
    async fn describe_detects_media_types() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Photo.PNG"), "x").unwrap();
        fs::write(dir.path().join("clip.mkv"), "x").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::create_dir(dir.path().join("album")).unwrap();
        let ws = Workspace::new(dir.path()).unwrap();

        let photo = ws.describe("Photo.PNG").await.unwrap();
        assert_eq!(photo.media_type, MediaType::Image);
        assert_eq!(photo.extension, ".png");
        assert_eq!(photo.path, "/Photo.PNG");
        assert_eq!(photo.name, "Photo.PNG");

        let clip = ws.describe("/clip.mkv").await.unwrap();
        assert_eq!(clip.media_type, MediaType::Video);

        let notes = ws.describe("notes.txt").await.unwrap();
        assert_eq!(notes.media_type.as_str(), "text");

        let album = ws.describe("album").await.unwrap();
        assert_eq!(album.media_type.as_str(), "directory");
        assert!(album.extension.is_empty());
    }

    #[tokio::test]
    async fn describe_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path()).unwrap();
        match ws.describe("nope.png").await {
            Err(WorkspaceError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn describe_reports_real_path_and_mod_time() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.jpg"), "abc").unwrap();
        let ws = Workspace::new(dir.path()).unwrap();
        let file = ws.describe("a.jpg").await.unwrap();
        assert_eq!(file.real_path, ws.root().join("a.jpg"));
        assert_eq!(file.size, 3);
        assert!(file.mod_time_unix() > 0);
    }
}
