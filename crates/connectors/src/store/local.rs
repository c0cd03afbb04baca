use crate::store::{ObjectStore, ObjectWriter, error::StoreError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::{
    fs::{self, File},
    io::{AsyncWriteExt, BufWriter},
};
use uuid::Uuid;

/// Object store over the local filesystem. Paths may carry a `file://` prefix.
#[derive(Debug, Default, Clone)]
pub struct LocalObjectStore;

impl LocalObjectStore {
    pub fn new() -> Self {
        LocalObjectStore
    }
}

fn to_path(path: &str) -> PathBuf {
    PathBuf::from(path.strip_prefix("file://").unwrap_or(path))
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn read(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        fs::read(to_path(path))
            .await
            .map_err(|e| StoreError::io(path, e))
    }

    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        match fs::metadata(to_path(path)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    async fn create(&self, path: &str) -> Result<Box<dyn ObjectWriter>, StoreError> {
        let target = to_path(path);
        if let Some(parent) = target.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(path, e))?;
        }

        let temp = temp_sibling(&target);
        let file = File::create(&temp)
            .await
            .map_err(|e| StoreError::io(path, e))?;

        Ok(Box::new(LocalObjectWriter {
            path: path.to_string(),
            target,
            temp,
            writer: Some(BufWriter::new(file)),
        }))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

fn temp_sibling(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4().simple()))
}

struct LocalObjectWriter {
    path: String,
    target: PathBuf,
    temp: PathBuf,
    writer: Option<BufWriter<File>>,
}

#[async_trait]
impl ObjectWriter for LocalObjectWriter {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), StoreError> {
        match self.writer.as_mut() {
            Some(writer) => writer
                .write_all(bytes)
                .await
                .map_err(|e| StoreError::io(&self.path, e)),
            None => Err(StoreError::InvalidPath(format!(
                "{} was already finished",
                self.path
            ))),
        }
    }

    async fn finish(mut self: Box<Self>) -> Result<(), StoreError> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .await
                .map_err(|e| StoreError::io(&self.path, e))?;
            writer
                .get_mut()
                .sync_all()
                .await
                .map_err(|e| StoreError::io(&self.path, e))?;
        }
        fs::rename(&self.temp, &self.target)
            .await
            .map_err(|e| StoreError::io(&self.path, e))
    }
}

impl Drop for LocalObjectWriter {
    fn drop(&mut self) {
        // Unfinished writes leave nothing behind; after a successful rename
        // the temp path is gone and this is a no-op.
        let _ = std::fs::remove_file(&self.temp);
    }
}
