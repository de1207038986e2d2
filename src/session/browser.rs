//! Browser-driven cookie acquisition.
//!
//! The exchange fronts its API with a bot-detection layer that only hands out
//! session cookies to clients that execute its JavaScript challenge. We drive
//! a real Chrome over CDP to the trigger page, let the challenge settle, and
//! harvest the resulting cookie jar.

use super::CookieAcquirer;
use crate::config::{Config, MAX_BROWSER_SETTLE};
use crate::errors::{DataHubError, Result};
use crate::models::CookieSet;
use async_trait::async_trait;
use log::{info, warn};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::network::{GetCookiesParams, SetUserAgentOverrideParams};
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::page::{AddScriptToEvaluateOnNewDocumentParams, NavigateParams};
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Page};
#[cfg(feature = "browser")]
use chrono::Utc;
#[cfg(feature = "browser")]
use futures::StreamExt;
#[cfg(feature = "browser")]
use log::debug;

/// Scripts registered before any page script runs, hiding automation markers.
#[cfg(feature = "browser")]
const STEALTH_SCRIPTS: &[&str] = &[
    r#"
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined,
        configurable: true
    });
    "#,
    r#"
    window.chrome = window.chrome || { runtime: {}, loadTimes: function() {}, csi: function() {}, app: {} };
    "#,
    r#"
    Object.defineProperty(navigator, 'languages', {
        get: () => ['en-GB', 'en-US', 'en'],
        configurable: true
    });
    "#,
    r#"
    Object.defineProperty(navigator, 'plugins', {
        get: () => [1, 2, 3, 4, 5],
        configurable: true
    });
    "#,
];

#[cfg(feature = "browser")]
const CHROME_PATHS: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/opt/google/chrome/google-chrome",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

/// Settings for one acquisition run.
#[derive(Debug, Clone)]
pub struct AcquirerSettings {
    pub trigger_url: String,
    pub required_cookies: Vec<String>,
    pub cookie_ttl: Duration,
    pub settle: Duration,
    pub navigation_timeout: Duration,
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    pub user_agent: String,
}

impl AcquirerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            trigger_url: config.cookie_trigger_url.clone(),
            required_cookies: config.required_cookies.clone(),
            cookie_ttl: config.cookie_ttl,
            settle: config.browser_settle.min(MAX_BROWSER_SETTLE),
            navigation_timeout: config.navigation_timeout,
            headless: config.headless,
            chrome_executable: config.chrome_executable.clone(),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Keep only the required cookie names from a harvested jar.
///
/// Fails when none of them were set; a partial set is returned with a warning.
pub fn select_required_cookies<I>(harvested: I, required: &[String]) -> Result<BTreeMap<String, String>>
where
    I: IntoIterator<Item = (String, String)>,
{
    let selected: BTreeMap<String, String> = harvested
        .into_iter()
        .filter(|(name, _)| required.iter().any(|r| r == name))
        .collect();

    if selected.is_empty() {
        return Err(DataHubError::BrowserError(
            "the trigger page set none of the required cookies".to_string(),
        ));
    }

    let missing: Vec<&str> = required
        .iter()
        .filter(|name| !selected.contains_key(name.as_str()))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        warn!("Missing required cookies: {}", missing.join(", "));
    }

    Ok(selected)
}

/// Launches a fresh, isolated Chrome for every acquisition.
pub struct ChromeCookieAcquirer {
    settings: AcquirerSettings,
}

impl ChromeCookieAcquirer {
    pub fn new(settings: AcquirerSettings) -> Self {
        Self { settings }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(AcquirerSettings::from_config(config))
    }
}

/// How long a closed browser gets to exit before it is killed.
#[cfg(feature = "browser")]
const BROWSER_EXIT_GRACE: Duration = Duration::from_secs(5);

/// The process-level handle teardown needs.
#[cfg(feature = "browser")]
#[async_trait]
trait BrowserProcess: Send {
    async fn close(&mut self) -> std::result::Result<(), String>;
    async fn wait(&mut self) -> std::result::Result<(), String>;
    async fn kill(&mut self) -> std::result::Result<(), String>;
}

#[cfg(feature = "browser")]
#[async_trait]
impl BrowserProcess for Browser {
    async fn close(&mut self) -> std::result::Result<(), String> {
        Browser::close(self).await.map(|_| ()).map_err(|e| e.to_string())
    }

    async fn wait(&mut self) -> std::result::Result<(), String> {
        Browser::wait(self).await.map(|_| ()).map_err(|e| e.to_string())
    }

    async fn kill(&mut self) -> std::result::Result<(), String> {
        match Browser::kill(self).await {
            Some(Err(e)) => Err(e.to_string()),
            _ => Ok(()),
        }
    }
}

#[cfg(feature = "browser")]
#[derive(Debug, PartialEq, Eq)]
enum Teardown {
    Exited,
    Killed,
}

/// Close the browser and reap it within `grace`; kill it when either step fails.
#[cfg(feature = "browser")]
async fn shut_down(browser: &mut dyn BrowserProcess, grace: Duration) -> Teardown {
    let exited = match browser.close().await {
        Ok(()) => match tokio::time::timeout(grace, browser.wait()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("Failed to reap browser process: {}", e);
                false
            }
            Err(_) => {
                warn!("Browser still running {:?} after close", grace);
                false
            }
        },
        Err(e) => {
            warn!("Failed to close browser: {}", e);
            false
        }
    };
    if exited {
        return Teardown::Exited;
    }

    match tokio::time::timeout(grace, browser.kill()).await {
        Ok(Ok(())) => debug!("Browser process killed"),
        Ok(Err(e)) => warn!("Failed to kill browser process: {}", e),
        Err(_) => warn!("Browser kill did not complete within {:?}", grace),
    }
    Teardown::Killed
}

#[cfg(feature = "browser")]
fn browser_error(context: &str, e: impl std::fmt::Display) -> DataHubError {
    DataHubError::BrowserError(format!("{}: {}", context, e))
}

#[cfg(feature = "browser")]
fn find_chrome(configured: Option<&std::path::Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(DataHubError::BrowserError(format!(
            "configured Chrome executable not found: {}",
            path.display()
        )));
    }

    for path in CHROME_PATHS {
        let p = std::path::Path::new(path);
        if p.exists() {
            debug!("Found Chrome at: {}", path);
            return Ok(p.to_path_buf());
        }
    }

    for cmd in &["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    debug!("Found Chrome in PATH: {}", path);
                    return Ok(PathBuf::from(path));
                }
            }
        }
    }

    Err(DataHubError::BrowserError(
        "Chrome/Chromium not found; install it or set browser.chrome_executable".to_string(),
    ))
}

#[cfg(feature = "browser")]
impl ChromeCookieAcquirer {
    async fn harvest(&self, browser: &Browser) -> Result<Vec<(String, String)>> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| browser_error("failed to open page", e))?;

        let result = self.drive(&page).await;

        if let Err(e) = page.close().await {
            debug!("Failed to close page: {}", e);
        }
        result
    }

    async fn drive(&self, page: &Page) -> Result<Vec<(String, String)>> {
        let settings = &self.settings;

        page.execute(SetUserAgentOverrideParams::new(settings.user_agent.clone()))
            .await
            .map_err(|e| browser_error("failed to set user agent", e))?;

        for script in STEALTH_SCRIPTS {
            page.execute(AddScriptToEvaluateOnNewDocumentParams::new(script.to_string()))
                .await
                .map_err(|e| browser_error("failed to register init script", e))?;
        }

        info!("Navigating to {}", settings.trigger_url);
        let nav_params = NavigateParams::builder()
            .url(settings.trigger_url.clone())
            .build()
            .map_err(|e| browser_error("invalid trigger URL", e))?;

        match tokio::time::timeout(settings.navigation_timeout, page.execute(nav_params)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(browser_error("failed to load trigger page", e)),
            Err(_) => {
                return Err(DataHubError::BrowserError(format!(
                    "timed out after {:?} loading {}",
                    settings.navigation_timeout, settings.trigger_url
                )))
            }
        }

        debug!("Waiting {:?} for the challenge to settle", settings.settle);
        tokio::time::sleep(settings.settle).await;

        let cookie_params = GetCookiesParams::builder()
            .urls(vec![settings.trigger_url.clone()])
            .build();
        let cookies = page
            .execute(cookie_params)
            .await
            .map_err(|e| browser_error("failed to read cookies", e))?
            .result
            .cookies;
        debug!("Browser holds {} cookies for the origin", cookies.len());

        Ok(cookies.into_iter().map(|c| (c.name, c.value)).collect())
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl CookieAcquirer for ChromeCookieAcquirer {
    async fn acquire(&self) -> Result<CookieSet> {
        let settings = &self.settings;
        let chrome_path = find_chrome(settings.chrome_executable.as_deref())?;
        let profile = tempfile::tempdir()?;

        info!("Launching browser (headless={})", settings.headless);
        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .user_data_dir(profile.path());

        // with_head means NOT headless
        if !settings.headless {
            builder = builder.with_head();
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--disable-gpu");

        let config = builder
            .build()
            .map_err(|e| browser_error("failed to build browser config", e))?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| browser_error("failed to launch browser", e))?;

        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        let harvested = self.harvest(&browser).await;

        shut_down(&mut browser, BROWSER_EXIT_GRACE).await;
        handler_task.abort();
        drop(profile);

        let cookies = select_required_cookies(harvested?, &settings.required_cookies)?;
        info!("Harvested {} of {} required cookies", cookies.len(), settings.required_cookies.len());
        Ok(CookieSet::new(cookies, Utc::now(), settings.cookie_ttl))
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl CookieAcquirer for ChromeCookieAcquirer {
    async fn acquire(&self) -> Result<CookieSet> {
        warn!("Cookie acquisition requested for {} without browser support", self.settings.trigger_url);
        Err(DataHubError::BrowserError(
            "browser support not compiled; rebuild with --features browser".to_string(),
        ))
    }
}
