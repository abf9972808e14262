use std::path::PathBuf;

use tracing::{debug, info, warn};

use super::elevation::Elevation;
use super::locator::{ProfileSource, TrustStoreProfile};
use super::runner::{CommandOutput, CommandRunner, Invocation};
use super::{Result, TrustStoreError};
use crate::ca::TrustEntry;

/// certutil reports this when the database needs root to be modified.
const READ_ONLY_MARKER: &str = "SEC_ERROR_READ_ONLY";

/// Trusted CA for TLS servers; no e-mail or code-signing trust.
const TRUST_FLAGS: &str = "C,,";

/// Outcome of adding the CA to every discovered profile.
#[derive(Debug, Default)]
pub struct InstallReport {
    pub installed: Vec<TrustStoreProfile>,
    pub failed: Vec<(TrustStoreProfile, String)>,
}

/// Outcome of removing the CA from every discovered profile.
#[derive(Debug, Default)]
pub struct UninstallReport {
    pub removed: Vec<TrustStoreProfile>,
    pub not_present: Vec<TrustStoreProfile>,
    pub failed: Vec<(TrustStoreProfile, String)>,
}

impl UninstallReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn into_result(self) -> Result<Self> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(TrustStoreError::Uninstall {
                count: self.failed.len(),
            })
        }
    }
}

/// Checks, adds and removes the CA in NSS databases through `certutil`.
///
/// Profiles are rediscovered on every call and processed in order.
pub struct TrustStoreManager<R, P> {
    runner: R,
    profiles: P,
    certutil: PathBuf,
    elevation: Elevation,
}

impl<R: CommandRunner, P: ProfileSource> TrustStoreManager<R, P> {
    pub fn new(runner: R, profiles: P, certutil: PathBuf, elevation: Elevation) -> Self {
        Self {
            runner,
            profiles,
            certutil,
            elevation,
        }
    }

    pub fn elevation(&self) -> &Elevation {
        &self.elevation
    }

    pub fn profiles(&self) -> Vec<TrustStoreProfile> {
        self.profiles.profiles()
    }

    /// True only if every profile trusts the CA. Zero profiles count as trusted.
    pub fn check(&self, entry: TrustEntry<'_>) -> Result<bool> {
        let mut all_trusted = true;
        for profile in self.profiles.profiles() {
            let trusted = self.is_trusted_in(&profile, entry)?;
            debug!(profile = %profile.address(), trusted, "Checked NSS database");
            all_trusted &= trusted;
        }
        Ok(all_trusted)
    }

    /// Add the CA to every profile, then confirm with [`Self::check`].
    pub fn install(&self, entry: TrustEntry<'_>) -> Result<InstallReport> {
        let profiles = self.profiles.profiles();
        if profiles.is_empty() {
            return Err(TrustStoreError::NoBrowsersFound);
        }

        let mut report = InstallReport::default();
        for profile in profiles {
            let add = self
                .certutil("-A", &profile)
                .args(["-t", TRUST_FLAGS, "-n", entry.name, "-i"])
                .arg(entry.cert_path.to_string_lossy());
            match self.run_write(&profile, add) {
                Ok(()) => {
                    info!(profile = %profile, "Added CA to NSS database");
                    report.installed.push(profile);
                }
                Err(e) => {
                    warn!(profile = %profile, error = %e, "Failed to add CA to NSS database");
                    report.failed.push((profile, e.to_string()));
                }
            }
        }

        if !self.check(entry)? {
            return Err(TrustStoreError::NotTrusted);
        }
        Ok(report)
    }

    /// Remove the CA from every profile that has it.
    ///
    /// Profiles without the CA are skipped. A failing profile does not stop the
    /// remaining ones; failures are returned in the report.
    pub fn uninstall(&self, entry: TrustEntry<'_>) -> Result<UninstallReport> {
        let mut report = UninstallReport::default();
        for profile in self.profiles.profiles() {
            match self.is_trusted_in(&profile, entry) {
                Ok(false) => {
                    debug!(profile = %profile, "CA not present, skipping");
                    report.not_present.push(profile);
                    continue;
                }
                Ok(true) => {}
                Err(e) => {
                    warn!(profile = %profile, error = %e, "Failed to query NSS database");
                    report.failed.push((profile, e.to_string()));
                    continue;
                }
            }

            let delete = self.certutil("-D", &profile).args(["-n", entry.name]);
            match self.run_write(&profile, delete) {
                Ok(()) => {
                    info!(profile = %profile, "Removed CA from NSS database");
                    report.removed.push(profile);
                }
                Err(e) => {
                    warn!(profile = %profile, error = %e, "Failed to remove CA from NSS database");
                    report.failed.push((profile, e.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// `certutil <op> -d <address>`; certutil wants the operation flag first.
    fn certutil(&self, op: &str, profile: &TrustStoreProfile) -> Invocation {
        Invocation::new(&self.certutil).args([op.to_string(), "-d".to_string(), profile.address()])
    }

    fn is_trusted_in(&self, profile: &TrustStoreProfile, entry: TrustEntry<'_>) -> Result<bool> {
        let verify = self
            .certutil("-V", profile)
            .args(["-u", "L", "-n", entry.name]);
        Ok(self.runner.run(&verify)?.success)
    }

    /// Run a modifying certutil command, retrying once with elevation when the
    /// database is read-only.
    fn run_write(&self, profile: &TrustStoreProfile, invocation: Invocation) -> Result<()> {
        let output = self.runner.run(&invocation)?;
        if output.success {
            return Ok(());
        }

        let output = if is_read_only(&output) && self.elevation.can_retry() {
            debug!(profile = %profile, "NSS database is read-only, retrying with sudo");
            let retried = self.runner.run(&self.elevation.wrap(invocation))?;
            if retried.success {
                return Ok(());
            }
            retried
        } else {
            output
        };

        Err(TrustStoreError::Write {
            profile: profile.to_string(),
            output: output.combined().trim().to_string(),
        })
    }
}

fn is_read_only(output: &CommandOutput) -> bool {
    output.stdout.contains(READ_ONLY_MARKER) || output.stderr.contains(READ_ONLY_MARKER)
}
