//! NSS browser trust stores
//!
//! Firefox profiles and the shared Chromium/system NSS databases keep their own
//! list of trusted roots. Everything here goes through the external `certutil`
//! tool; databases are never edited directly.
//!
//! Some system databases are only writable by root. Writes that fail with
//! `SEC_ERROR_READ_ONLY` are retried once through `sudo`.

mod elevation;
mod locator;
mod manager;
mod runner;
mod tool;

use std::path::PathBuf;
use thiserror::Error;

pub use elevation::Elevation;
pub use locator::{NssProfileLocator, ProfileFormat, ProfileSource, TrustStoreProfile};
pub use manager::{InstallReport, TrustStoreManager, UninstallReport};
pub use runner::{CommandOutput, CommandRunner, Invocation, SystemRunner};
pub use tool::{CERTUTIL, Platform, ToolResolver};

#[derive(Debug, Error)]
pub enum TrustStoreError {
    #[error("certutil is not available. {hint}")]
    ToolNotFound { hint: String },

    #[error(
        "No NSS databases found. Start Firefox or Chrome once so it creates its profile, then retry."
    )]
    NoBrowsersFound,

    #[error("Failed to run {program}: {source}")]
    Command {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("certutil failed on {profile}: {output}")]
    Write { profile: String, output: String },

    #[error(
        "The CA was added but some browsers still do not trust it. Start each browser once and retry, or report the issue with the output of `devtls ca check -v`."
    )]
    NotTrusted,

    #[error("Failed to remove the CA from {count} trust store(s)")]
    Uninstall { count: usize },
}

pub type Result<T> = std::result::Result<T, TrustStoreError>;
