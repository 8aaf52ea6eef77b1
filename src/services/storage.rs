use base64::Engine;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Writes generated images under `{root}/{subdir}/{job_id}/`.
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Decode and save one image plus a JSON sidecar. Returns the image path,
    /// which becomes the result's `image_ref`.
    pub async fn save(
        &self,
        subdir: &str,
        job_id: Uuid,
        index: usize,
        image_base64: &str,
        sidecar: &serde_json::Value,
    ) -> Result<String, StorageError> {
        // Some servers prefix the payload with a data URL header.
        let payload = image_base64
            .split_once(',')
            .map_or(image_base64, |(_, data)| data);
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(StorageError::Decode)?;

        let dir = self.root.join(subdir).join(job_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;

        let image_path = dir.join(format!("{index:04}.png"));
        tokio::fs::write(&image_path, &bytes).await?;

        let sidecar_path = dir.join(format!("{index:04}.json"));
        tokio::fs::write(&sidecar_path, serde_json::to_vec_pretty(sidecar)?).await?;

        Ok(image_path.to_string_lossy().into_owned())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Image payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Failed to write image: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode image metadata: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_writes_image_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        let job_id = Uuid::new_v4();

        let path = store
            .save("portrait", job_id, 3, "aGVsbG8=", &serde_json::json!({"seed": 7}))
            .await
            .unwrap();

        assert!(path.ends_with("0003.png"));
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
        let sidecar = dir
            .path()
            .join("portrait")
            .join(job_id.to_string())
            .join("0003.json");
        let meta: serde_json::Value = serde_json::from_slice(&std::fs::read(sidecar).unwrap()).unwrap();
        assert_eq!(meta["seed"], 7);
    }

    #[tokio::test]
    async fn test_data_url_prefix_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        let path = store
            .save("x", Uuid::new_v4(), 0, "data:image/png;base64,aGVsbG8=", &serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_invalid_base64() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        let err = store
            .save("x", Uuid::new_v4(), 0, "!!not base64!!", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Decode(_)));
    }
}
