use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf};
use which::which;

/// Launch settings for the Chromium driver.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CdpConfig {
    /// Empty means "detect at launch".
    pub executable: PathBuf,
    pub user_data_dir: Option<PathBuf>,
    pub headless: bool,
    pub window_size: (u32, u32),
    pub no_sandbox: bool,
    /// Upper bound for a single CDP round trip (lookups, clicks, captures).
    pub command_timeout_ms: u64,
}

impl Default for CdpConfig {
    fn default() -> Self {
        Self {
            executable: detect_chrome_executable().unwrap_or_default(),
            user_data_dir: env::var("TASKPILOT_CHROME_PROFILE").ok().map(PathBuf::from),
            headless: resolve_headless_default(),
            window_size: (1280, 900),
            no_sandbox: false,
            command_timeout_ms: 10_000,
        }
    }
}

impl CdpConfig {
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Configured executable when it exists, otherwise whatever detection finds.
    pub fn resolve_executable(&self) -> Option<PathBuf> {
        if !self.executable.as_os_str().is_empty() && self.executable.exists() {
            return Some(self.executable.clone());
        }
        detect_chrome_executable()
    }
}

fn resolve_headless_default() -> bool {
    match env::var("TASKPILOT_HEADLESS") {
        Ok(value) => {
            let lower = value.to_ascii_lowercase();
            !matches!(lower.as_str(), "0" | "false" | "no" | "off")
        }
        Err(_) => true,
    }
}

pub fn detect_chrome_executable() -> Option<PathBuf> {
    if let Ok(raw) = env::var("TASKPILOT_CHROME") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            let candidate = PathBuf::from(trimmed);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    for name in chrome_executable_names() {
        if let Ok(path) = which(name) {
            return Some(path);
        }
    }

    let skip_defaults = env::var("TASKPILOT_SKIP_OS_PATHS")
        .map(|value| !value.trim().is_empty())
        .unwrap_or(false);

    if !skip_defaults {
        for candidate in os_specific_chrome_paths() {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}

pub(crate) fn chrome_executable_names() -> &'static [&'static str] {
    #[cfg(target_os = "windows")]
    {
        &["chrome.exe", "chromium.exe", "msedge.exe"]
    }

    #[cfg(not(target_os = "windows"))]
    {
        &[
            "google-chrome-stable",
            "google-chrome",
            "chromium",
            "chromium-browser",
        ]
    }
}

fn os_specific_chrome_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let mut paths = Vec::new();
        for key in ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"] {
            if let Ok(value) = env::var(key) {
                let root = PathBuf::from(value.trim());
                paths.push(root.join("Google/Chrome/Application/chrome.exe"));
                paths.push(root.join("Microsoft/Edge/Application/msedge.exe"));
            }
        }
        paths
    }

    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
        ]
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        vec![
            PathBuf::from("/usr/bin/google-chrome-stable"),
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/chromium-browser"),
            PathBuf::from("/usr/bin/chromium"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    // Both cases mutate process env, so they run as one test.
    #[test]
    fn detection_prefers_env_then_path() {
        let dir = tempdir().unwrap();
        let exe_path = dir.path().join("my-chrome");
        fs::write(&exe_path, b"").unwrap();

        let original_env = env::var("TASKPILOT_CHROME").ok();
        let original_path = env::var("PATH").ok();
        let original_skip = env::var("TASKPILOT_SKIP_OS_PATHS").ok();

        env::set_var("TASKPILOT_CHROME", exe_path.to_string_lossy().to_string());
        let from_env = detect_chrome_executable();

        let path_dir = tempdir().unwrap();
        let name = chrome_executable_names()[0];
        let on_path = path_dir.path().join(name);
        fs::write(&on_path, b"").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&on_path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        env::set_var("TASKPILOT_CHROME", "");
        env::set_var("TASKPILOT_SKIP_OS_PATHS", "1");
        env::set_var("PATH", path_dir.path());
        let from_path = detect_chrome_executable();

        match original_env {
            Some(value) => env::set_var("TASKPILOT_CHROME", value),
            None => env::remove_var("TASKPILOT_CHROME"),
        }
        if let Some(value) = original_path {
            env::set_var("PATH", value);
        }
        match original_skip {
            Some(value) => env::set_var("TASKPILOT_SKIP_OS_PATHS", value),
            None => env::remove_var("TASKPILOT_SKIP_OS_PATHS"),
        }

        assert_eq!(from_env, Some(exe_path));
        assert_eq!(from_path, Some(on_path));
    }
}
