use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use super::runner::{CommandRunner, Invocation};
use super::{Result, TrustStoreError};

pub const CERTUTIL: &str = "certutil";

/// Homebrew keeps `nss` keg-only, so its binaries are usually not on PATH.
const HOMEBREW_CERTUTIL_CANDIDATES: &[&str] = &[
    "/usr/local/opt/nss/bin/certutil",
    "/opt/homebrew/opt/nss/bin/certutil",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Linux,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Other
        }
    }
}

/// Locates `certutil` and explains how to install it when it is missing.
#[derive(Debug, Clone)]
pub struct ToolResolver {
    platform: Platform,
    search_path: Option<OsString>,
}

impl ToolResolver {
    pub fn new(platform: Platform, search_path: Option<OsString>) -> Self {
        Self {
            platform,
            search_path,
        }
    }

    /// Resolver for this machine, searching the process `PATH`.
    pub fn detect() -> Self {
        Self::new(Platform::current(), std::env::var_os("PATH"))
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn find(&self, name: &str) -> Option<PathBuf> {
        find_in(self.search_path.as_deref(), name)
    }

    /// Find `certutil`, falling back to Homebrew locations on macOS.
    pub fn resolve_certutil(&self, runner: &impl CommandRunner) -> Result<PathBuf> {
        if let Some(path) = self.find(CERTUTIL) {
            return Ok(path);
        }

        if self.platform == Platform::MacOs {
            if let Some(path) = HOMEBREW_CERTUTIL_CANDIDATES
                .iter()
                .map(PathBuf::from)
                .find(|p| is_executable(p))
            {
                return Ok(path);
            }
            if let Some(path) = self.brew_certutil(runner) {
                return Ok(path);
            }
        }

        Err(TrustStoreError::ToolNotFound {
            hint: install_hint(self.platform, |tool| self.find(tool).is_some()),
        })
    }

    fn brew_certutil(&self, runner: &impl CommandRunner) -> Option<PathBuf> {
        let brew = self.find("brew")?;
        let output = runner
            .run(&Invocation::new(brew).args(["--prefix", "nss"]))
            .ok()?;
        let prefix = output.stdout.trim();
        if !output.success || prefix.is_empty() {
            return None;
        }
        let candidate = Path::new(prefix).join("bin").join(CERTUTIL);
        is_executable(&candidate).then_some(candidate)
    }
}

/// Installation instructions for the platform's package manager.
pub fn install_hint(platform: Platform, has_tool: impl Fn(&str) -> bool) -> String {
    match platform {
        Platform::MacOs => "Install it with `brew install nss`.".to_string(),
        Platform::Linux if has_tool("apt") => {
            "Install it with `sudo apt install libnss3-tools`.".to_string()
        }
        Platform::Linux if has_tool("yum") => {
            "Install it with `sudo yum install nss-tools`.".to_string()
        }
        Platform::Linux if has_tool("zypper") => {
            "Install it with `sudo zypper install mozilla-nss-tools`.".to_string()
        }
        _ => "Install the NSS tools package for your system so that `certutil` is on PATH."
            .to_string(),
    }
}

/// Search the process `PATH` for an executable.
pub(crate) fn find_in_path(name: &str) -> Option<PathBuf> {
    find_in(std::env::var_os("PATH").as_deref(), name)
}

fn find_in(search_path: Option<&OsStr>, name: &str) -> Option<PathBuf> {
    let search_path = search_path?;
    std::env::split_paths(search_path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
