//! Local CA lifecycle
//!
//! Creates the CA on first install and keeps the NSS trust stores and the
//! `ca_installed` flag in `config.toml` in step with it.

use clap::Subcommand;
use devtls_core::ca::{CaError, CertificateAuthority, LocalCaStore};
use devtls_core::truststore::{
    Elevation, NssProfileLocator, SystemRunner, ToolResolver, TrustStoreManager,
};

use crate::config::GlobalConfig;
use crate::output;

type Manager = TrustStoreManager<SystemRunner, NssProfileLocator>;

#[derive(Subcommand)]
pub enum CaCommands {
    /// Create the local CA if needed and trust it in every browser profile
    Install {
        /// Throw away the current CA and every project certificate, then start over
        #[arg(long)]
        force: bool,
    },

    /// Remove the local CA from every browser profile
    Uninstall {
        /// Keep the CA and project certificates on disk
        #[arg(long)]
        keep_files: bool,
    },

    /// Check whether every browser profile trusts the local CA
    Check,

    /// Print the CA root directory
    Path,
}

pub fn run(cmd: CaCommands) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        CaCommands::Install { force } => install(force),
        CaCommands::Uninstall { keep_files } => uninstall(keep_files),
        CaCommands::Check => check(),
        CaCommands::Path => {
            let store = LocalCaStore::from_env()?;
            println!("{}", store.root().display());
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaSource {
    Existing,
    Generated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InstallPlan {
    /// Untrust the old CA before it is deleted
    untrust_previous: bool,
    wipe: bool,
    source: CaSource,
}

fn plan_install(ca_exists: bool, force: bool) -> InstallPlan {
    InstallPlan {
        untrust_previous: force && ca_exists,
        wipe: force,
        source: if ca_exists && !force {
            CaSource::Existing
        } else {
            CaSource::Generated
        },
    }
}

fn trust_store_manager() -> Result<Manager, Box<dyn std::error::Error>> {
    let certutil = ToolResolver::detect().resolve_certutil(&SystemRunner)?;
    tracing::debug!(certutil = %certutil.display(), "Resolved certutil");
    Ok(TrustStoreManager::new(
        SystemRunner,
        NssProfileLocator::detect(),
        certutil,
        Elevation::detect(),
    ))
}

fn load_existing(store: &LocalCaStore) -> Result<CertificateAuthority, CaError> {
    store.load()?.ok_or_else(|| {
        CaError::Validation(format!(
            "No CA certificate found in {}",
            store.root().display()
        ))
    })
}

/// Best effort: an unreadable CA is about to be replaced, so it only warns.
fn untrust_previous(
    store: &LocalCaStore,
    manager: &Manager,
) -> Result<(), Box<dyn std::error::Error>> {
    let previous = match load_existing(store) {
        Ok(previous) => previous,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load the previous CA");
            output::warning(
                "Could not read the previous CA, so it was not removed from browser trust stores.",
            );
            output::detail(&e.to_string());
            return Ok(());
        }
    };

    output::step("Removing the previous CA from browser trust stores...");
    let report = manager.uninstall(previous.trust_entry())?;
    for (profile, reason) in &report.failed {
        output::warning(&format!("Could not remove the previous CA from {}", profile));
        output::detail(reason);
    }
    Ok(())
}

fn install(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let store = LocalCaStore::from_env()?;
    let manager = trust_store_manager()?;
    let plan = plan_install(store.ca_exists(), force);

    if plan.untrust_previous {
        untrust_previous(&store, &manager)?;
    }
    if plan.wipe {
        store.wipe()?;
        output::muted("Removed the previous CA and all project certificates.");
    }

    let ca = match plan.source {
        CaSource::Existing => load_existing(&store)?,
        CaSource::Generated => {
            let ca = output::with_spinner("Generating local CA...", || store.create())?;
            output::success(&format!("Created {}", ca.unique_name()));
            ca
        }
    };
    if !ca.can_sign() {
        output::warning(
            "The CA has no private key. It can be trusted, but `devtls cert issue` will fail.",
        );
    }

    output::step("Adding the CA to browser trust stores...");
    let report = manager.install(ca.trust_entry())?;
    for profile in &report.installed {
        output::detail(&format!("  {}", profile));
    }

    let mut config = GlobalConfig::load()?;
    config.ca_installed = true;
    config.save()?;

    output::success(&format!(
        "The local CA is trusted by {} browser profile(s).",
        report.installed.len()
    ));
    Ok(())
}

fn uninstall(keep_files: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = GlobalConfig::load()?;
    if !config.ca_installed {
        output::muted("The local CA is not installed. Nothing to do.");
        return Ok(());
    }

    let store = LocalCaStore::from_env()?;
    if let Some(ca) = store.load()? {
        let manager = trust_store_manager()?;
        output::step("Removing the CA from browser trust stores...");
        let report = manager.uninstall(ca.trust_entry())?;
        for profile in &report.removed {
            output::detail(&format!("  removed from {}", profile));
        }
        for (profile, reason) in &report.failed {
            output::error(&format!("Could not remove the CA from {}", profile));
            output::muted(&format!("  {}", reason));
        }
        report.into_result()?;
    } else {
        output::warning("No CA certificate on disk; only clearing the installed flag.");
    }

    if !keep_files {
        store.wipe()?;
        output::muted(&format!("Removed {}", store.root().display()));
    }

    config.ca_installed = false;
    config.save()?;
    output::success("The local CA is no longer trusted.");
    Ok(())
}

fn check() -> Result<(), Box<dyn std::error::Error>> {
    let store = LocalCaStore::from_env()?;
    let Some(ca) = store.load()? else {
        return Err("No local CA found. Run `devtls ca install` first.".into());
    };

    let manager = trust_store_manager()?;
    let profiles = manager.profiles();
    output::section(ca.unique_name());
    for profile in &profiles {
        output::detail(&format!("  {}", profile.address()));
    }

    if manager.check(ca.trust_entry())? {
        output::success(&format!(
            "Trusted by all {} browser profile(s).",
            profiles.len()
        ));
        Ok(())
    } else {
        Err("The local CA is not trusted by every browser profile. Run `devtls ca install`.".into())
    }
}
