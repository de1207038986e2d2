use super::CookieStore;
use crate::errors::Result;
use crate::models::CookieSet;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

/// Cookie cache kept as a JSON file.
pub struct FileCookieStore {
    path: PathBuf,
}

impl FileCookieStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the cache file if present.
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("Removed cookie cache {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CookieStore for FileCookieStore {
    async fn load(&self) -> Result<Option<CookieSet>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No cookie cache at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<CookieSet>(&content) {
            Ok(cookies) => Ok(Some(cookies)),
            Err(e) => {
                warn!("Ignoring corrupt cookie cache {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    async fn save(&self, cookies: &CookieSet) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(cookies)?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!("Saved {} cookies to {}", cookies.len(), self.path.display());
        Ok(())
    }
}

/// In-process cookie cache.
#[derive(Default)]
pub struct MemoryCookieStore {
    cookies: RwLock<Option<CookieSet>>,
    saves: AtomicUsize,
}

impl MemoryCookieStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cookies(cookies: CookieSet) -> Self {
        Self {
            cookies: RwLock::new(Some(cookies)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CookieStore for MemoryCookieStore {
    async fn load(&self) -> Result<Option<CookieSet>> {
        let guard = self.cookies.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(guard.clone())
    }

    async fn save(&self, cookies: &CookieSet) -> Result<()> {
        let mut guard = self.cookies.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(cookies.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn sample() -> CookieSet {
        let mut cookies = BTreeMap::new();
        cookies.insert("_abck".to_string(), "9F1E~-1~YAAQ==~0~-1".to_string());
        cookies.insert("nsit".to_string(), "a b;c".to_string());
        cookies.insert("RT".to_string(), "\"z=1&dm=nseindia.com\"".to_string());
        let acquired = Utc.with_ymd_and_hms(2025, 7, 10, 4, 0, 0).unwrap();
        CookieSet::new(cookies, acquired, Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCookieStore::new(dir.path().join("cache").join("nse_cookies.json"));

        store.save(&sample()).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, sample());
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn file_store_layout_has_expiry_seconds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nse_cookies.json");
        FileCookieStore::new(&path).save(&sample()).await.unwrap();

        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["expires_at"], sample().expires_at());
        assert_eq!(raw["cookies"]["nsit"], "a b;c");
    }

    #[tokio::test]
    async fn missing_and_corrupt_files_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nse_cookies.json");
        let store = FileCookieStore::new(&path);
        assert!(store.load().await.unwrap().is_none());

        std::fs::write(&path, "{not json").unwrap();
        assert!(store.load().await.unwrap().is_none());

        store.clear().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn save_overwrites_instead_of_merging() {
        let store = MemoryCookieStore::with_cookies(sample());
        let mut cookies = BTreeMap::new();
        cookies.insert("bm_sv".to_string(), "1".to_string());
        let replacement = CookieSet::new(cookies, Utc::now(), Duration::from_secs(60));

        store.save(&replacement).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, replacement);
        assert!(loaded.get("nsit").is_none());
    }
}
