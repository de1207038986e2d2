pub mod browser;
pub mod store;
pub mod validator;

pub use browser::ChromeCookieAcquirer;
pub use store::{FileCookieStore, MemoryCookieStore};
pub use validator::HttpCookieValidator;

use crate::errors::{DataHubError, Result};
use crate::models::CookieSet;
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Durable cache holding at most one cookie set.
#[async_trait]
pub trait CookieStore: Send + Sync {
    /// `Ok(None)` when nothing usable is cached.
    async fn load(&self) -> Result<Option<CookieSet>>;

    /// Overwrite the cached set as one unit.
    async fn save(&self, cookies: &CookieSet) -> Result<()>;
}

/// Mints a fresh cookie set, typically by solving the origin's bot challenge in a browser.
#[async_trait]
pub trait CookieAcquirer: Send + Sync {
    async fn acquire(&self) -> Result<CookieSet>;
}

/// Checks that the origin still accepts a cookie set. Never fails; problems read as `false`.
#[async_trait]
pub trait CookieValidator: Send + Sync {
    async fn validate(&self, cookies: &CookieSet) -> bool;
}

/// Hands out validated session cookies, refreshing them through the acquirer when needed.
///
/// Acquisitions on one manager are serialized; callers that queued behind a
/// running acquisition reuse its result instead of launching another browser.
pub struct SessionManager {
    store: Arc<dyn CookieStore>,
    acquirer: Arc<dyn CookieAcquirer>,
    validator: Arc<dyn CookieValidator>,
    refresh_lock: Mutex<()>,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn CookieStore>,
        acquirer: Arc<dyn CookieAcquirer>,
        validator: Arc<dyn CookieValidator>,
    ) -> Self {
        Self {
            store,
            acquirer,
            validator,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Cached cookies if they are unexpired and pass the probe, otherwise a fresh set.
    pub async fn get_valid_cookies(&self) -> Result<Arc<CookieSet>> {
        let mut rejected = None;

        if let Some(cached) = self.load_unexpired().await {
            if self.validator.validate(&cached).await {
                debug!("Using cached cookies acquired at {}", cached.acquired_at());
                return Ok(Arc::new(cached));
            }
            info!("Cached cookies failed validation, refreshing");
            rejected = Some(cached);
        }

        self.refresh(rejected.as_ref()).await
    }

    /// Replace a cookie set the origin just refused.
    pub async fn refresh_after_rejection(&self, rejected: &CookieSet) -> Result<Arc<CookieSet>> {
        warn!("Origin rejected the current session, refreshing cookies");
        self.refresh(Some(rejected)).await
    }

    async fn refresh(&self, rejected: Option<&CookieSet>) -> Result<Arc<CookieSet>> {
        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited for the lock
        if let Some(current) = self.load_unexpired().await {
            let is_new = rejected.map_or(true, |old| old != &current);
            if is_new && self.validator.validate(&current).await {
                debug!("Reusing cookies refreshed by a concurrent caller");
                return Ok(Arc::new(current));
            }
        }

        info!("Acquiring fresh session cookies");
        let fresh = self.acquirer.acquire().await?;
        info!("Acquired {} cookies", fresh.len());

        if let Err(e) = self.store.save(&fresh).await {
            error!("Failed to persist cookies: {}", e);
        }

        if self.validator.validate(&fresh).await {
            Ok(Arc::new(fresh))
        } else {
            Err(DataHubError::CookieAcquisition(
                "freshly acquired cookies were rejected by the validation probe".to_string(),
            ))
        }
    }

    async fn load_unexpired(&self) -> Option<CookieSet> {
        match self.store.load().await {
            Ok(Some(cookies)) if cookies.is_expired_at(Utc::now()) => {
                debug!("Cached cookies expired at {}", cookies.expires_at());
                None
            }
            Ok(found) => found,
            Err(e) => {
                warn!("Failed to read cookie cache, treating as empty: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn cookie_set(token: &str, ttl: Duration) -> CookieSet {
        let mut cookies = BTreeMap::new();
        cookies.insert("nsit".to_string(), token.to_string());
        CookieSet::new(cookies, Utc::now(), ttl)
    }

    struct CountingAcquirer {
        calls: AtomicUsize,
        token: String,
    }

    #[async_trait]
    impl CookieAcquirer for CountingAcquirer {
        async fn acquire(&self) -> Result<CookieSet> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(cookie_set(&self.token, Duration::from_secs(3600)))
        }
    }

    /// Accepts only sets whose `nsit` cookie equals the given token.
    struct TokenValidator(String);

    #[async_trait]
    impl CookieValidator for TokenValidator {
        async fn validate(&self, cookies: &CookieSet) -> bool {
            cookies.get("nsit") == Some(self.0.as_str())
        }
    }

    fn manager(store: Arc<MemoryCookieStore>, acquirer: Arc<CountingAcquirer>, accepted: &str) -> SessionManager {
        SessionManager::new(store, acquirer, Arc::new(TokenValidator(accepted.to_string())))
    }

    #[tokio::test]
    async fn fresh_cache_skips_acquisition() {
        let store = Arc::new(MemoryCookieStore::with_cookies(cookie_set("good", Duration::from_secs(3600))));
        let acquirer = Arc::new(CountingAcquirer { calls: AtomicUsize::new(0), token: "new".into() });

        let cookies = manager(store, acquirer.clone(), "good").get_valid_cookies().await.unwrap();
        assert_eq!(cookies.get("nsit"), Some("good"));
        assert_eq!(acquirer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expired_cache_is_never_returned() {
        let store = Arc::new(MemoryCookieStore::with_cookies(cookie_set("good", Duration::ZERO)));
        let acquirer = Arc::new(CountingAcquirer { calls: AtomicUsize::new(0), token: "good".into() });

        let cookies = manager(store.clone(), acquirer.clone(), "good").get_valid_cookies().await.unwrap();
        assert_eq!(acquirer.calls.load(Ordering::SeqCst), 1);
        assert!(!cookies.is_expired());
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn rejected_cache_is_replaced_and_persisted() {
        let store = Arc::new(MemoryCookieStore::with_cookies(cookie_set("stale", Duration::from_secs(3600))));
        let acquirer = Arc::new(CountingAcquirer { calls: AtomicUsize::new(0), token: "fresh".into() });

        let cookies = manager(store.clone(), acquirer.clone(), "fresh").get_valid_cookies().await.unwrap();
        assert_eq!(acquirer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cookies.get("nsit"), Some("fresh"));

        let persisted = store.load().await.unwrap().unwrap();
        assert_eq!(&persisted, cookies.as_ref());
    }

    #[tokio::test]
    async fn failed_post_acquisition_probe_is_session_unavailable() {
        let store = Arc::new(MemoryCookieStore::new());
        let acquirer = Arc::new(CountingAcquirer { calls: AtomicUsize::new(0), token: "bad".into() });

        let err = manager(store, acquirer.clone(), "good").get_valid_cookies().await.unwrap_err();
        assert!(matches!(err, DataHubError::CookieAcquisition(_)));
        assert!(err.is_session_unavailable());
        assert_eq!(acquirer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_after_rejection_acquires_a_new_set() {
        let current = cookie_set("old", Duration::from_secs(3600));
        let store = Arc::new(MemoryCookieStore::with_cookies(current.clone()));
        let acquirer = Arc::new(CountingAcquirer { calls: AtomicUsize::new(0), token: "new".into() });

        let refreshed = manager(store.clone(), acquirer.clone(), "new")
            .refresh_after_rejection(&current)
            .await
            .unwrap();
        assert_eq!(acquirer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(refreshed.get("nsit"), Some("new"));
        assert_eq!(store.save_count(), 1);
    }
}
