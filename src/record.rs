use crate::error::{Error, Result};
use serde_json::Value;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

/// File the command line tools append their responses to
pub const DEFAULT_LOG_FILE: &str = "tests.json";

/// A JSON array on disk, one redacted request or response per entry.
#[derive(Debug, Clone)]
pub struct RequestLog {
    path: PathBuf,
}

impl RequestLog {
    #[inline]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        return Self { path: path.into() };
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every entry. A missing file counts as empty.
    pub async fn entries(&self) -> Result<Vec<Value>> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(x) => x,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::from(e)),
        };

        return Ok(serde_json::from_slice::<Vec<Value>>(&contents)?);
    }

    /// Appends `entry`, rewriting the file pretty-printed with a trailing newline.
    pub async fn append(&self, entry: Value) -> Result<()> {
        let mut entries = self.entries().await?;
        entries.push(entry);

        let mut contents = serde_json::to_string_pretty(&entries)?;
        contents.push('\n');
        tokio::fs::write(&self.path, contents).await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(path = %self.path.display(), len = entries.len(), "Appended log entry");

        return Ok(());
    }
}

impl Default for RequestLog {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_LOG_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn appends_entries() {
        let dir = tempfile::tempdir().unwrap();
        let log = RequestLog::new(dir.path().join("tests.json"));

        log.append(json!({"id": "a"})).await.unwrap();
        log.append(json!({"id": "b", "status": "COMPLETED"})).await.unwrap();

        assert_eq!(
            log.entries().await.unwrap(),
            vec![json!({"id": "a"}), json!({"id": "b", "status": "COMPLETED"})]
        );

        let raw = std::fs::read_to_string(log.path()).unwrap();
        assert!(raw.starts_with("[\n  {"));
        assert!(raw.ends_with("]\n"));
    }

    #[tokio::test]
    async fn keeps_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        std::fs::write(&path, r#"[{"old": true}]"#).unwrap();

        let log = RequestLog::new(&path);
        log.append(json!({"new": true})).await.unwrap();
        assert_eq!(log.entries().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rejects_non_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        std::fs::write(&path, "{}").unwrap();

        let err = RequestLog::new(&path).append(json!(1)).await.unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }
}
