use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

/// On-disk NSS database format of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileFormat {
    /// `cert9.db`, addressed as `sql:<dir>`
    Sql,
    /// Legacy `cert8.db`, addressed as `dbm:<dir>`
    Dbm,
}

impl ProfileFormat {
    fn db_file(self) -> &'static str {
        match self {
            ProfileFormat::Sql => "cert9.db",
            ProfileFormat::Dbm => "cert8.db",
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            ProfileFormat::Sql => "sql:",
            ProfileFormat::Dbm => "dbm:",
        }
    }
}

/// One NSS database directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustStoreProfile {
    pub path: PathBuf,
    pub format: ProfileFormat,
}

impl TrustStoreProfile {
    pub fn new(path: impl Into<PathBuf>, format: ProfileFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    /// Classify `dir` by the database file it holds; `None` if it holds neither.
    ///
    /// The newer format wins when both files are present.
    pub fn detect(dir: &Path) -> Option<Self> {
        [ProfileFormat::Sql, ProfileFormat::Dbm]
            .into_iter()
            .find(|format| dir.join(format.db_file()).is_file())
            .map(|format| Self::new(dir, format))
    }

    /// Database address as passed to `certutil -d`.
    pub fn address(&self) -> String {
        format!("{}{}", self.format.prefix(), self.path.display())
    }
}

impl fmt::Display for TrustStoreProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Produces the trust stores an operation should touch.
pub trait ProfileSource {
    fn profiles(&self) -> Vec<TrustStoreProfile>;
}

impl ProfileSource for Vec<TrustStoreProfile> {
    fn profiles(&self) -> Vec<TrustStoreProfile> {
        self.clone()
    }
}

/// Finds NSS databases of Firefox, Chromium and the system.
#[derive(Debug, Clone)]
pub struct NssProfileLocator {
    fixed_dirs: Vec<PathBuf>,
    globs: Vec<String>,
}

impl NssProfileLocator {
    pub fn new(fixed_dirs: Vec<PathBuf>, globs: Vec<String>) -> Self {
        Self { fixed_dirs, globs }
    }

    /// Default locations below `home`.
    pub fn for_home(home: &Path) -> Self {
        let escaped = glob::Pattern::escape(&home.to_string_lossy());

        let mut fixed_dirs = vec![
            home.join(".pki/nssdb"),
            home.join("snap/chromium/current/.pki/nssdb"),
        ];
        if cfg!(target_os = "linux") {
            fixed_dirs.push(PathBuf::from("/etc/pki/nssdb"));
        }

        let mut globs = vec![
            format!("{}/.mozilla/firefox/*", escaped),
            format!("{}/snap/firefox/common/.mozilla/firefox/*", escaped),
        ];
        if cfg!(target_os = "macos") {
            globs.push(format!(
                "{}/Library/Application Support/Firefox/Profiles/*",
                escaped
            ));
        }

        Self::new(fixed_dirs, globs)
    }

    /// Default locations below the current user's home directory.
    pub fn detect() -> Self {
        match dirs::home_dir() {
            Some(home) => Self::for_home(&home),
            None => Self::new(vec![PathBuf::from("/etc/pki/nssdb")], Vec::new()),
        }
    }

    fn candidates(&self) -> Vec<PathBuf> {
        let mut out = self.fixed_dirs.clone();
        for pattern in &self.globs {
            match glob::glob(pattern) {
                Ok(paths) => out.extend(paths.flatten().filter(|p| p.is_dir())),
                Err(e) => debug!(pattern = %pattern, error = %e, "Skipping invalid profile pattern"),
            }
        }
        out
    }
}

impl ProfileSource for NssProfileLocator {
    fn profiles(&self) -> Vec<TrustStoreProfile> {
        let mut found: Vec<TrustStoreProfile> = Vec::new();
        for dir in self.candidates() {
            if let Some(profile) = TrustStoreProfile::detect(&dir)
                && !found.iter().any(|p| p.path == profile.path)
            {
                debug!(profile = %profile.address(), "Found NSS database");
                found.push(profile);
            }
        }
        found
    }
}
