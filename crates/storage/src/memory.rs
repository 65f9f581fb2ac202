use crate::{decode_text, non_empty, StorageError, StorageProvider, StorageType};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// In-process object store. Keys are kept sorted so listings are stable.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: RwLock<BTreeMap<String, Bytes>>,
    writes: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_objects<I, K, V>(objects: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Bytes>,
    {
        let storage = Self::new();
        {
            let mut map = storage.objects.write().await;
            for (k, v) in objects {
                map.insert(k.into(), v.into());
            }
        }
        storage
    }

    /// Number of successful writes since creation.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, content: Bytes) {
        self.objects.write().await.insert(key.to_string(), content);
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl StorageProvider for MemoryStorage {
    fn storage_type(&self) -> StorageType {
        StorageType::Local
    }

    async fn read_text(&self, key: &str) -> Result<String, StorageError> {
        let data = self.get(key).await?;
        decode_text(key, data)
    }

    async fn read_binary(&self, key: &str) -> Result<Bytes, StorageError> {
        self.get(key).await
    }

    async fn write_text(&self, key: &str, content: &str) -> Result<(), StorageError> {
        self.put(key, Bytes::copy_from_slice(content.as_bytes()))
            .await;
        Ok(())
    }

    async fn write_binary(&self, key: &str, content: Bytes) -> Result<(), StorageError> {
        self.put(key, content).await;
        Ok(())
    }

    async fn delete_file(&self, key: &str) -> Result<(), StorageError> {
        self.objects
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn list_files(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        let prefix = non_empty(prefix);
        Ok(self
            .objects
            .read()
            .await
            .keys()
            .filter(|k| prefix.map(|p| k.starts_with(p)).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn is_file_exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn get_url(&self, key: &str) -> Result<String, StorageError> {
        Ok(format!("file:{}", key))
    }
}
