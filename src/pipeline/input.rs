//! Job input and output: load a JSON document, write its updated copy.
//!
//! A [`MigrationJob`] never touches its source file after reading it. The
//! updated document goes to a sibling file named `<output_prefix><basename>`,
//! written to a temporary sibling first and renamed into place so a crash
//! never leaves a half-written file behind.
//!
//! Downloads and transformed images are staged in a [`JobWorkspace`], a
//! `TempDir` that is removed when the job's workspace is dropped, on every
//! exit path.

use crate::error::MigrateError;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// One JSON file to migrate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationJob {
    source: PathBuf,
}

impl MigrationJob {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// File name of the source, used in status lines.
    pub fn basename(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string())
    }

    /// `<dir of source>/<prefix><basename>`.
    pub fn output_path(&self, prefix: &str) -> PathBuf {
        let name = format!("{prefix}{}", self.basename());
        match self.source.parent() {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    /// Read and parse the source document.
    ///
    /// # Errors
    /// [`MigrateError::FileNotFound`], [`MigrateError::PermissionDenied`],
    /// [`MigrateError::ReadFailed`] or [`MigrateError::InvalidJson`].
    pub async fn load(&self) -> Result<Value, MigrateError> {
        let path = &self.source;
        let text = tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MigrateError::FileNotFound { path: path.clone() },
            std::io::ErrorKind::PermissionDenied => {
                MigrateError::PermissionDenied { path: path.clone() }
            }
            _ => MigrateError::ReadFailed {
                path: path.clone(),
                source: e,
            },
        })?;

        let document = serde_json::from_str(&text).map_err(|e| MigrateError::InvalidJson {
            path: path.clone(),
            source: e,
        })?;
        debug!("Loaded {} ({} bytes)", path.display(), text.len());
        Ok(document)
    }
}

/// Serialise `document` as UTF-8 JSON with 2-space indentation and write it
/// atomically to `path`. Non-ASCII characters are written unescaped.
pub fn write_document(document: &Value, path: &Path) -> Result<(), MigrateError> {
    let write_err = |source: std::io::Error| MigrateError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let text = serde_json::to_string_pretty(document)
        .map_err(|e| write_err(std::io::Error::other(e)))?;

    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(text.as_bytes()).map_err(write_err)?;
    set_output_permissions(tmp.as_file(), path).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    debug!("Wrote {}", path.display());
    Ok(())
}

/// Temp files are created owner-only; give the output the mode of the file it
/// replaces, or `0644` for a new one.
#[cfg(unix)]
fn set_output_permissions(file: &std::fs::File, path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)
        .map(|m| m.permissions().mode())
        .unwrap_or(DEFAULT_OUTPUT_MODE);
    file.set_permissions(std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_output_permissions(_file: &std::fs::File, _path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
const DEFAULT_OUTPUT_MODE: u32 = 0o644;

/// Scratch directory for one job's staged and transformed images.
#[derive(Debug)]
pub struct JobWorkspace {
    dir: TempDir,
}

impl JobWorkspace {
    pub fn create() -> Result<Self, MigrateError> {
        let dir = tempfile::Builder::new()
            .prefix("img-migrate-")
            .tempdir()
            .map_err(|e| MigrateError::WorkspaceFailed(e.to_string()))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path for a file called `name` inside the workspace.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_path_sits_beside_source() {
        let job = MigrationJob::new("/data/batch/questions.json");
        assert_eq!(
            job.output_path("updated_"),
            PathBuf::from("/data/batch/updated_questions.json")
        );
        assert_eq!(job.basename(), "questions.json");

        let bare = MigrationJob::new("q.json");
        assert_eq!(bare.output_path("updated_"), PathBuf::from("updated_q.json"));
    }

    #[tokio::test]
    async fn load_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = MigrationJob::new(dir.path().join("missing.json"))
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn load_invalid_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "[\"<img src='a.png'>\",").unwrap();
        let err = MigrationJob::new(&path).load().await.unwrap_err();
        assert!(matches!(err, MigrateError::InvalidJson { .. }));
    }

    #[tokio::test]
    async fn load_preserves_object_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.json");
        std::fs::write(&path, r#"[{"zeta": 1, "alpha": 2}]"#).unwrap();
        let doc = MigrationJob::new(&path).load().await.unwrap();
        let keys: Vec<&String> = doc[0].as_object().unwrap().keys().collect();
        assert_eq!(keys, ["zeta", "alpha"]);
    }

    #[test]
    fn written_document_is_indented_and_unescaped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("updated_q.json");
        write_document(&json!(["प्रश्न <img src='x'>", 1]), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "[\n  \"प्रश्न <img src='x'>\",\n  1\n]");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1, "no temp file left behind");
    }

    #[cfg(unix)]
    #[test]
    fn written_document_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("updated_q.json");
        write_document(&json!([]), &path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[cfg(unix)]
    #[test]
    fn rewrite_keeps_existing_output_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("updated_q.json");
        std::fs::write(&path, "[]").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o664)).unwrap();
        write_document(&json!([1]), &path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o664);
    }

    #[test]
    fn write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope/updated_q.json");
        let err = write_document(&json!([]), &path).unwrap_err();
        assert!(matches!(err, MigrateError::OutputWriteFailed { .. }));
    }

    #[test]
    fn workspace_is_removed_on_drop() {
        let ws = JobWorkspace::create().unwrap();
        let root = ws.path().to_path_buf();
        std::fs::write(ws.file("a.png"), b"x").unwrap();
        assert!(root.exists());
        drop(ws);
        assert!(!root.exists());
    }
}
