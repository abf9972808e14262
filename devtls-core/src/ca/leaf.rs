use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa, KeyUsagePurpose,
    SanType,
};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::info;

use super::authority::{CertificateAuthority, add_years_months, user_and_hostname, write_file};
use super::keys::{KeyStrength, RsaKey, SerialNumberSource};
use super::{CaError, Result};

const LEAF_ORGANIZATION: &str = "devtls development certificate";

/// Leaf certificate validity period: 2 years and 3 months
const LEAF_VALIDITY_YEARS: i32 = 2;
const LEAF_VALIDITY_MONTHS: u32 = 3;

pub const LEAF_CERT_FILENAME: &str = "cert.pem";
pub const LEAF_KEY_FILENAME: &str = "key.pem";
pub const LEAF_COMBINED_FILENAME: &str = "combined.pem";

const LEAF_CERT_MODE: u32 = 0o644;
const LEAF_KEY_MODE: u32 = 0o600;

/// How a host string ends up in the Subject Alternative Name extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostName {
    Ip(IpAddr),
    Uri(String),
    Dns(String),
}

/// Classify a host: IP literal first, then a URI with both scheme and host,
/// otherwise a DNS name.
pub fn classify_host(host: &str) -> HostName {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return HostName::Ip(ip);
    }
    if let Ok(uri) = url::Url::parse(host)
        && uri.host_str().is_some_and(|h| !h.is_empty())
    {
        return HostName::Uri(host.to_string());
    }
    HostName::Dns(host.to_string())
}

impl HostName {
    fn to_san(&self) -> Result<SanType> {
        match self {
            HostName::Ip(ip) => Ok(SanType::IpAddress(*ip)),
            HostName::Uri(uri) => {
                let value = uri.as_str().try_into().map_err(|e| {
                    CaError::CertificateGeneration(format!("Invalid URI '{}': {:?}", uri, e))
                })?;
                Ok(SanType::URI(value))
            }
            HostName::Dns(name) => {
                let ascii = dns_to_ascii(name)?;
                let value = ascii.as_str().try_into().map_err(|e| {
                    CaError::CertificateGeneration(format!("Invalid DNS name '{}': {:?}", name, e))
                })?;
                Ok(SanType::DnsName(value))
            }
        }
    }
}

/// IA5String only holds ASCII, so internationalized names go in as punycode.
fn dns_to_ascii(name: &str) -> Result<String> {
    if name.is_ascii() {
        return Ok(name.to_string());
    }
    match url::Host::parse(name) {
        Ok(url::Host::Domain(ascii)) => Ok(ascii),
        Ok(other) => Err(CaError::CertificateGeneration(format!(
            "Invalid DNS name '{}': parsed as address {}",
            name, other
        ))),
        Err(e) => Err(CaError::CertificateGeneration(format!(
            "Invalid DNS name '{}': {}",
            name, e
        ))),
    }
}

/// Naming policy for the files a leaf certificate is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertFileLayout {
    /// `cert.pem` and `key.pem`
    Split,
    /// Certificate followed by key in `combined.pem`
    Combined,
}

impl CertFileLayout {
    pub fn cert_path(self, dir: &Path) -> PathBuf {
        match self {
            CertFileLayout::Split => dir.join(LEAF_CERT_FILENAME),
            CertFileLayout::Combined => dir.join(LEAF_COMBINED_FILENAME),
        }
    }

    pub fn key_path(self, dir: &Path) -> PathBuf {
        match self {
            CertFileLayout::Split => dir.join(LEAF_KEY_FILENAME),
            CertFileLayout::Combined => dir.join(LEAF_COMBINED_FILENAME),
        }
    }
}

/// A signed leaf certificate that has not been written anywhere yet.
#[derive(Clone)]
pub struct IssuedCertificate {
    pub cert_pem: String,
    pub key_pem: String,
    pub names: Vec<HostName>,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

/// A leaf certificate persisted to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafCertificate {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub names: Vec<HostName>,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl LeafCertificate {
    pub fn is_combined(&self) -> bool {
        self.cert_path == self.key_path
    }
}

/// Issues host certificates signed by a loaded CA.
pub struct LeafIssuer<'a> {
    ca: &'a CertificateAuthority,
}

impl<'a> LeafIssuer<'a> {
    pub fn new(ca: &'a CertificateAuthority) -> Self {
        Self { ca }
    }

    /// Build and sign a certificate for `hosts` without touching the filesystem.
    pub fn build<S: AsRef<str>>(&self, hosts: &[S]) -> Result<IssuedCertificate> {
        if !self.ca.can_sign() {
            return Err(CaError::NoSigningKey);
        }

        let names: Vec<HostName> = hosts.iter().map(|h| classify_host(h.as_ref())).collect();
        let sans = names
            .iter()
            .map(HostName::to_san)
            .collect::<Result<Vec<_>>>()?;

        let mut params = CertificateParams::default();
        params.serial_number = Some(SerialNumberSource.next_serial()?);

        let mut dn = DistinguishedName::new();
        dn.push(DnType::OrganizationName, LEAF_ORGANIZATION);
        dn.push(DnType::OrganizationalUnitName, user_and_hostname());
        params.distinguished_name = dn;

        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::KeyEncipherment,
            KeyUsagePurpose::DigitalSignature,
        ];
        // Pure CA-style certificates without names get no EKU at all.
        if !sans.is_empty() {
            params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        }
        params.subject_alt_names = sans;

        let now = OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = add_years_months(now, LEAF_VALIDITY_YEARS, LEAF_VALIDITY_MONTHS);

        let leaf_key = RsaKey::generate(KeyStrength::Leaf)?;
        let cert = self.ca.sign(&params, leaf_key.key_pair())?;

        Ok(IssuedCertificate {
            cert_pem: cert.pem(),
            key_pem: leaf_key.serialize_pem(),
            names,
            not_before: params.not_before,
            not_after: params.not_after,
        })
    }

    /// Issue a certificate for `hosts` and write it into `dest_dir`.
    pub fn issue<S: AsRef<str>>(
        &self,
        hosts: &[S],
        dest_dir: &Path,
        layout: CertFileLayout,
    ) -> Result<LeafCertificate> {
        let issued = self.build(hosts)?;

        fs::create_dir_all(dest_dir).map_err(|e| CaError::FileWrite(dest_dir.to_path_buf(), e))?;

        let cert_path = layout.cert_path(dest_dir);
        let key_path = layout.key_path(dest_dir);
        match layout {
            CertFileLayout::Split => {
                write_file(&cert_path, issued.cert_pem.as_bytes(), LEAF_CERT_MODE)?;
                write_file(&key_path, issued.key_pem.as_bytes(), LEAF_KEY_MODE)?;
            }
            CertFileLayout::Combined => {
                let combined = format!("{}{}", issued.cert_pem, issued.key_pem);
                write_file(&cert_path, combined.as_bytes(), LEAF_KEY_MODE)?;
            }
        }

        info!(
            dir = %dest_dir.display(),
            names = hosts.len(),
            expires = %issued.not_after.date(),
            "Issued leaf certificate"
        );

        Ok(LeafCertificate {
            cert_path,
            key_path,
            names: issued.names,
            not_before: issued.not_before,
            not_after: issued.not_after,
        })
    }
}
