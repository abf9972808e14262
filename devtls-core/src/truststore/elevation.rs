use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use super::runner::Invocation;
use super::tool::find_in_path;

const SUDO_PROMPT: &str = "--prompt=Sudo password:";

/// Decides how a write to a read-only trust store is retried.
#[derive(Debug)]
pub struct Elevation {
    privileged: bool,
    sudo: Option<PathBuf>,
    warned: AtomicBool,
}

impl Elevation {
    pub fn new(privileged: bool, sudo: Option<PathBuf>) -> Self {
        Self {
            privileged,
            sudo,
            warned: AtomicBool::new(false),
        }
    }

    /// Current process privileges and the `sudo` on PATH.
    pub fn detect() -> Self {
        Self::new(is_root(), find_in_path("sudo"))
    }

    /// Whether a retry after `SEC_ERROR_READ_ONLY` can change anything.
    pub fn can_retry(&self) -> bool {
        !self.privileged
    }

    /// Wrap `invocation` in `sudo` when running unprivileged.
    ///
    /// Without `sudo` the command is returned unchanged and a warning is logged,
    /// once per `Elevation`.
    pub fn wrap(&self, invocation: Invocation) -> Invocation {
        if self.privileged {
            return invocation;
        }
        match &self.sudo {
            Some(sudo) => {
                invocation.wrapped_in(Invocation::new(sudo).args([SUDO_PROMPT, "--"]))
            }
            None => {
                if !self.warned.swap(true, Ordering::Relaxed) {
                    warn!("sudo is not available; running certutil without elevated privileges");
                }
                invocation
            }
        }
    }

    pub fn has_warned(&self) -> bool {
        self.warned.load(Ordering::Relaxed)
    }
}

#[cfg(unix)]
fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn is_root() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn certutil() -> Invocation {
        Invocation::new("/usr/bin/certutil").args(["-A", "-d", "sql:/etc/pki/nssdb"])
    }

    #[test]
    fn privileged_process_is_not_wrapped() {
        let elevation = Elevation::new(true, Some(PathBuf::from("/usr/bin/sudo")));
        assert!(!elevation.can_retry());
        assert_eq!(elevation.wrap(certutil()), certutil());
    }

    #[test]
    fn unprivileged_process_is_wrapped_in_sudo() {
        let elevation = Elevation::new(false, Some(PathBuf::from("/usr/bin/sudo")));
        let wrapped = elevation.wrap(certutil());
        assert_eq!(wrapped.program, PathBuf::from("/usr/bin/sudo"));
        assert_eq!(
            wrapped.args,
            vec![
                "--prompt=Sudo password:",
                "--",
                "/usr/bin/certutil",
                "-A",
                "-d",
                "sql:/etc/pki/nssdb"
            ]
        );
        assert!(!elevation.has_warned());
    }

    #[test]
    fn missing_sudo_runs_unwrapped_and_warns_once() {
        let elevation = Elevation::new(false, None);
        assert!(!elevation.has_warned());
        assert_eq!(elevation.wrap(certutil()), certutil());
        assert!(elevation.has_warned());
        assert_eq!(elevation.wrap(certutil()), certutil());
        assert!(elevation.has_warned());
    }
}
