use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, Issuer, KeyIdMethod,
    KeyPair, KeyUsagePurpose,
};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use time::{Date, Month, OffsetDateTime};
use tracing::{debug, info};

use super::keys::{KeyStrength, RsaKey, SerialNumberSource};
use super::{CaError, Result};

pub const ROOT_CERT_FILENAME: &str = "rootCA.pem";
pub const ROOT_KEY_FILENAME: &str = "rootCA-key.pem";

/// Root CA organization, also the prefix of the trust-store nickname
const CA_ORGANIZATION: &str = "devtls development CA";

/// Root CA certificate validity period
const CA_VALIDITY_YEARS: i32 = 10;

const CERT_FILE_MODE: u32 = 0o644;
const CA_KEY_FILE_MODE: u32 = 0o400;

/// What a trust store needs to know about the CA: its nickname and certificate file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustEntry<'a> {
    pub name: &'a str,
    pub cert_path: &'a Path,
}

/// The machine-local root CA.
///
/// Holds the parsed root certificate and, unless the CA is certificate-only,
/// the signing key.
pub struct CertificateAuthority {
    cert_pem: String,
    cert_der: Vec<u8>,
    serial: String,
    unique_name: String,
    key: Option<KeyPair>,
    cert_path: PathBuf,
    key_path: PathBuf,
}

impl CertificateAuthority {
    fn from_parts(
        cert_pem: String,
        key: Option<KeyPair>,
        cert_path: PathBuf,
        key_path: PathBuf,
    ) -> Result<Self> {
        let block = pem::parse(&cert_pem).map_err(|e| {
            CaError::Parse(format!("{}: invalid PEM: {}", cert_path.display(), e))
        })?;
        if block.tag() != "CERTIFICATE" {
            return Err(CaError::Parse(format!(
                "{}: expected a CERTIFICATE block, found {}",
                cert_path.display(),
                block.tag()
            )));
        }

        let cert_der = block.contents().to_vec();
        let (_, cert) = x509_parser::parse_x509_certificate(&cert_der).map_err(|e| {
            CaError::Parse(format!("{}: invalid certificate: {}", cert_path.display(), e))
        })?;
        let serial = cert.tbs_certificate.serial.to_string();
        let unique_name = format!("{} {}", CA_ORGANIZATION, serial);

        Ok(Self {
            cert_pem,
            cert_der,
            serial,
            unique_name,
            key,
            cert_path,
            key_path,
        })
    }

    /// Root certificate (PEM)
    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    /// Root certificate (DER)
    pub fn cert_der(&self) -> &[u8] {
        &self.cert_der
    }

    /// Decimal serial number of the root certificate
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Nickname under which trust stores record this CA.
    ///
    /// Stable for the lifetime of the certificate; a recreated CA gets a new
    /// serial and therefore a new name.
    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Whether the private key was loaded and leaf certificates can be signed.
    pub fn can_sign(&self) -> bool {
        self.key.is_some()
    }

    pub fn trust_entry(&self) -> TrustEntry<'_> {
        TrustEntry {
            name: &self.unique_name,
            cert_path: &self.cert_path,
        }
    }

    /// Sign `params` for `public_key` with the root key.
    pub(crate) fn sign(
        &self,
        params: &CertificateParams,
        public_key: &KeyPair,
    ) -> Result<rcgen::Certificate> {
        let key = self.key.as_ref().ok_or(CaError::NoSigningKey)?;
        let issuer = Issuer::from_ca_cert_pem(&self.cert_pem, key)
            .map_err(|e| CaError::Parse(format!("Failed to parse CA certificate: {}", e)))?;
        params.signed_by(public_key, &issuer).map_err(|e| {
            CaError::CertificateGeneration(format!("Failed to sign leaf certificate: {}", e))
        })
    }
}

/// On-disk home of the root CA and the per-project leaf certificates.
#[derive(Debug, Clone)]
pub struct LocalCaStore {
    root: PathBuf,
}

impl LocalCaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted at the default CA directory (see [`crate::paths::ca_root_dir`]).
    pub fn from_env() -> Result<Self> {
        let root = crate::paths::ca_root_dir().map_err(|e| {
            CaError::Validation(format!("Could not determine CA root directory: {}", e))
        })?;
        Ok(Self::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cert_path(&self) -> PathBuf {
        self.root.join(ROOT_CERT_FILENAME)
    }

    pub fn key_path(&self) -> PathBuf {
        self.root.join(ROOT_KEY_FILENAME)
    }

    /// Directory holding the leaf certificates of one project.
    pub fn project_dir(&self, project: &str) -> Result<PathBuf> {
        let trimmed = project.trim();
        let valid = !trimmed.is_empty()
            && trimmed != "."
            && trimmed != ".."
            && !trimmed.contains(['/', '\\']);
        if !valid {
            return Err(CaError::Validation(format!(
                "Invalid project name '{}'",
                project
            )));
        }
        Ok(self.root.join(trimmed))
    }

    pub fn ca_exists(&self) -> bool {
        self.cert_path().exists()
    }

    /// Load the CA if it was created before.
    ///
    /// Returns `Ok(None)` when there is no certificate yet. A certificate without
    /// a key file loads as certificate-only.
    pub fn load(&self) -> Result<Option<CertificateAuthority>> {
        let cert_path = self.cert_path();
        if !cert_path.exists() {
            return Ok(None);
        }
        let cert_pem =
            fs::read_to_string(&cert_path).map_err(|e| CaError::FileRead(cert_path.clone(), e))?;

        let key_path = self.key_path();
        let key = if key_path.exists() {
            let key_pem = fs::read_to_string(&key_path)
                .map_err(|e| CaError::FileRead(key_path.clone(), e))?;
            Some(parse_key_pem(&key_path, &key_pem)?)
        } else {
            debug!(path = %key_path.display(), "CA key missing, loading certificate-only CA");
            None
        };

        CertificateAuthority::from_parts(cert_pem, key, cert_path, key_path).map(Some)
    }

    /// Generate and persist a new root CA.
    pub fn create(&self) -> Result<CertificateAuthority> {
        let cert_path = self.cert_path();
        let key_path = self.key_path();
        if key_path.exists() && !cert_path.exists() {
            return Err(CaError::KeyWithoutCertificate(key_path));
        }

        fs::create_dir_all(&self.root).map_err(|e| CaError::FileWrite(self.root.clone(), e))?;

        let key = RsaKey::generate(KeyStrength::Ca)?;
        let identity = user_and_hostname();

        let mut params = CertificateParams::default();
        params.serial_number = Some(SerialNumberSource.next_serial()?);

        let mut dn = DistinguishedName::new();
        dn.push(DnType::OrganizationName, CA_ORGANIZATION);
        dn.push(DnType::OrganizationalUnitName, identity.as_str());
        dn.push(DnType::CommonName, format!("devtls {}", identity));
        params.distinguished_name = dn;

        // No intermediates below this root.
        params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign];
        params.key_identifier_method = KeyIdMethod::PreSpecified(key.subject_key_identifier());

        let now = OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = add_years_months(now, CA_VALIDITY_YEARS, 0);

        let cert = params
            .self_signed(key.key_pair())
            .map_err(|e| CaError::CertificateGeneration(e.to_string()))?;

        // Key first: a crash must never leave a certificate whose key is gone.
        write_file(&key_path, key.serialize_pem().as_bytes(), CA_KEY_FILE_MODE)?;
        let cert_pem = cert.pem();
        write_file(&cert_path, cert_pem.as_bytes(), CERT_FILE_MODE)?;

        let ca = CertificateAuthority::from_parts(
            cert_pem,
            Some(key.into_key_pair()),
            cert_path,
            key_path,
        )?;
        info!(name = %ca.unique_name(), root = %self.root.display(), "Created local CA");
        Ok(ca)
    }

    pub fn load_or_create(&self) -> Result<CertificateAuthority> {
        match self.load()? {
            Some(ca) => Ok(ca),
            None => self.create(),
        }
    }

    /// Remove the CA and every project certificate derived from it.
    pub fn wipe(&self) -> Result<()> {
        if !self.root.exists() {
            return Ok(());
        }
        // The key is read-only; directory removal does not care on unix, but
        // Windows refuses to delete read-only files.
        let key_path = self.key_path();
        if key_path.exists() {
            set_mode(&key_path, 0o600)?;
        }
        fs::remove_dir_all(&self.root).map_err(|e| CaError::FileWrite(self.root.clone(), e))?;
        info!(root = %self.root.display(), "Removed local CA and project certificates");
        Ok(())
    }
}

fn parse_key_pem(path: &Path, key_pem: &str) -> Result<KeyPair> {
    let block = pem::parse(key_pem)
        .map_err(|e| CaError::Parse(format!("{}: invalid PEM: {}", path.display(), e)))?;
    if block.tag() != "PRIVATE KEY" {
        return Err(CaError::Parse(format!(
            "{}: expected a PRIVATE KEY block, found {}",
            path.display(),
            block.tag()
        )));
    }
    KeyPair::from_pem(key_pem).map_err(|e| {
        CaError::Parse(format!("{}: invalid private key: {}", path.display(), e))
    })
}

/// `user@hostname`, used in subject fields to tell CAs of different machines apart.
pub(crate) fn user_and_hostname() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default();
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_default();
    match (user.trim(), host.trim()) {
        ("", "") => "unknown".to_string(),
        (user, "") => user.to_string(),
        ("", host) => host.to_string(),
        (user, host) => format!("{}@{}", user, host),
    }
}

/// Calendar addition; days past the end of the target month are clamped.
pub(crate) fn add_years_months(start: OffsetDateTime, years: i32, months: u32) -> OffsetDateTime {
    let month0 = i64::from(u8::from(start.month())) - 1;
    let total = i64::from(start.year()) * 12 + month0 + i64::from(years) * 12 + i64::from(months);
    let year = total.div_euclid(12) as i32;
    let Ok(month) = Month::try_from(total.rem_euclid(12) as u8 + 1) else {
        return start;
    };
    let day = start.day().min(month.length(year));
    match Date::from_calendar_date(year, month, day) {
        Ok(date) => start.replace_date(date),
        Err(_) => start,
    }
}

/// Write `contents` to `path`, which ends up with permissions `mode`.
///
/// New files are created with `mode` already applied, so a key is never
/// readable by others while it is being written.
pub(crate) fn write_file(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    if path.exists() {
        // Replacing a read-only file needs write permission first.
        set_mode(path, 0o600)?;
    }
    let mut file = create_with_mode(path, mode)?;
    file.write_all(contents)
        .map_err(|e| CaError::FileWrite(path.to_path_buf(), e))?;
    drop(file);
    // An existing file keeps its old mode and the umask may narrow a new one.
    set_mode(path, mode)
}

#[cfg(unix)]
fn create_with_mode(path: &Path, mode: u32) -> Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
        .map_err(|e| CaError::FileWrite(path.to_path_buf(), e))
}

#[cfg(not(unix))]
fn create_with_mode(path: &Path, _mode: u32) -> Result<fs::File> {
    fs::File::create(path).map_err(|e| CaError::FileWrite(path.to_path_buf(), e))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| CaError::FileWrite(path.to_path_buf(), e))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    let mut permissions = fs::metadata(path)
        .map_err(|e| CaError::FileWrite(path.to_path_buf(), e))?
        .permissions();
    permissions.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, permissions).map_err(|e| CaError::FileWrite(path.to_path_buf(), e))
}
