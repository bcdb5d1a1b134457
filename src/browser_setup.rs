//! Locating, downloading and launching Chrome/Chromium
//!
//! Executable resolution order: `CHROMIUM_PATH`, well-known install locations,
//! `which` lookup, then a managed build fetched into the user cache directory.

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use chromiumoxide::handler::Handler;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::utils::constants::CHROME_USER_AGENT;

/// CDP command timeout applied to every request the driver sends
const CDP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for one browser process
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub disable_security: bool,
    /// Profile directory, created before launch; must not be shared between
    /// processes that run at the same time
    pub user_data_dir: PathBuf,
}

/// Removes a freshly created profile directory unless the launch succeeded
struct ProfileDirGuard {
    path: PathBuf,
    committed: bool,
}

impl ProfileDirGuard {
    fn create(path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create profile directory {}", path.display()))?;
        Ok(Self {
            path,
            committed: false,
        })
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for ProfileDirGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), "Failed to remove profile after launch failure: {}", e);
        }
    }
}

#[cfg(target_os = "windows")]
const INSTALL_LOCATIONS: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files\Chromium\Application\chrome.exe",
];

#[cfg(target_os = "macos")]
const INSTALL_LOCATIONS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/opt/homebrew/bin/chromium",
];

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const INSTALL_LOCATIONS: &[&str] = &[
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/snap/bin/chromium",
    "/opt/google/chrome/chrome",
];

const PATH_COMMANDS: &[&str] = &["chromium", "chromium-browser", "google-chrome", "chrome"];

fn executable_from_env() -> Option<PathBuf> {
    let path = PathBuf::from(std::env::var_os("CHROMIUM_PATH")?);
    if path.exists() {
        return Some(path);
    }
    warn!(path = %path.display(), "CHROMIUM_PATH does not exist, ignoring");
    None
}

fn executable_on_path() -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        return None;
    }
    PATH_COMMANDS.iter().find_map(|cmd| {
        let output = Command::new("which").arg(cmd).output().ok()?;
        if !output.status.success() {
            return None;
        }
        let found = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!found.is_empty()).then(|| PathBuf::from(found))
    })
}

/// Find an installed Chrome/Chromium executable
pub fn find_browser_executable() -> Option<PathBuf> {
    let found = executable_from_env()
        .or_else(|| {
            INSTALL_LOCATIONS
                .iter()
                .map(PathBuf::from)
                .find(|path| path.exists())
        })
        .or_else(executable_on_path);

    if let Some(path) = &found {
        debug!(path = %path.display(), "Found browser executable");
    }
    found
}

/// Download a managed Chromium build into the user cache directory and return
/// its executable
pub async fn download_managed_browser() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(|| std::env::temp_dir().join(".cache"))
        .join("kodegen/page-scraper/chromium");
    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("Failed to create {}", cache_dir.display()))?;

    info!(cache_dir = %cache_dir.display(), "No local browser, downloading Chromium");
    let options = BrowserFetcherOptions::builder()
        .with_path(&cache_dir)
        .build()
        .context("Failed to build fetcher options")?;
    let revision = BrowserFetcher::new(options)
        .fetch()
        .await
        .context("Failed to download Chromium")?;

    info!(path = %revision.executable_path.display(), "Chromium ready");
    Ok(revision.executable_path)
}

/// Detect containers (Docker, Kubernetes) where the setuid sandbox cannot work
fn running_in_container() -> bool {
    Path::new("/.dockerenv").exists()
        || std::env::var_os("container").is_some()
        || std::env::var_os("KUBERNETES_SERVICE_HOST").is_some()
}

/// Command-line flags for one browser process
fn chrome_flags(options: &LaunchOptions, in_container: bool) -> Vec<String> {
    let mut flags: Vec<String> = vec![
        format!("--user-agent={CHROME_USER_AGENT}"),
        "--disable-extensions".into(),
        "--disable-notifications".into(),
        "--disable-background-networking".into(),
        "--disable-breakpad".into(),
        "--no-first-run".into(),
        "--no-default-browser-check".into(),
        "--mute-audio".into(),
    ];

    if options.disable_security {
        flags.push("--disable-web-security".into());
        flags.push("--ignore-certificate-errors".into());
    }
    if in_container || options.disable_security {
        flags.push("--no-sandbox".into());
        flags.push("--disable-setuid-sandbox".into());
    }
    flags
}

/// Chrome emits CDP events chromiumoxide cannot deserialize
/// (https://github.com/mattsse/chromiumoxide/issues/167)
fn is_benign_cdp_error(message: &str) -> bool {
    message.contains("data did not match any variant of untagged enum Message")
        || message.contains("Failed to deserialize WS response")
}

fn drive_handler(mut handler: Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            match event {
                Err(e) if is_benign_cdp_error(&e.to_string()) => {
                    trace!("Ignoring undecodable CDP message: {}", e);
                }
                Err(e) => error!("Browser handler error: {:?}", e),
                Ok(()) => {}
            }
        }
        debug!("Browser handler finished");
    })
}

/// Find or download Chrome/Chromium and launch it
///
/// The returned task drives the CDP connection and must be aborted once the
/// browser is closed.
pub async fn launch_browser(options: LaunchOptions) -> Result<(Browser, JoinHandle<()>)> {
    let executable = match find_browser_executable() {
        Some(path) => path,
        None => download_managed_browser().await?,
    };

    let profile = ProfileDirGuard::create(options.user_data_dir.clone())?;
    let in_container = running_in_container();
    if options.disable_security {
        warn!("Browser security features disabled");
    }

    let mut builder = BrowserConfigBuilder::default()
        .request_timeout(CDP_REQUEST_TIMEOUT)
        .window_size(1920, 1080)
        .user_data_dir(&options.user_data_dir)
        .chrome_executable(executable)
        .args(chrome_flags(&options, in_container));
    builder = if options.headless {
        builder.headless_mode(HeadlessMode::default())
    } else {
        builder.with_head()
    };

    let config = builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))?;
    let (browser, handler) = Browser::launch(config)
        .await
        .context("Failed to launch browser")?;

    profile.commit();
    Ok((browser, drive_handler(handler)))
}
