use std::path::PathBuf;

const HOME_ENV: &str = "DEVTLS_HOME";
const CAROOT_ENV: &str = "DEVTLS_CAROOT";

/// Get devtls's global home directory.
///
/// `DEVTLS_HOME` wins when set and non-blank, otherwise `~/.devtls`.
pub fn devtls_home_dir() -> Result<PathBuf, std::io::Error> {
    if let Some(dir) = non_blank_env(HOME_ENV) {
        return Ok(dir);
    }

    let home = dirs::home_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine home directory",
        )
    })?;

    Ok(home.join(".devtls"))
}

/// Directory holding `rootCA.pem`, `rootCA-key.pem` and one subdirectory per project.
pub fn ca_root_dir() -> Result<PathBuf, std::io::Error> {
    if let Some(dir) = non_blank_env(CAROOT_ENV) {
        return Ok(dir);
    }
    Ok(devtls_home_dir()?.join("ca"))
}

fn non_blank_env(name: &str) -> Option<PathBuf> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(PathBuf::from(v)),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) fn test_env_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
