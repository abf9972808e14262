//! Per-project routing snippets
//!
//! The reverse proxy in front of project containers picks up TLS material from
//! a YAML file per project. Paths in the snippet are container paths: the CA
//! root is mounted read-only into the router at [`DEFAULT_CONTAINER_CERT_ROOT`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ca::{CaError, CertFileLayout, LeafCertificate, Result};

pub const DEFAULT_CONTAINER_CERT_ROOT: &str = "/mnt/devtls/certs";
pub const ROUTING_SNIPPET_FILENAME: &str = "routing.yaml";

const SNIPPET_MODE: u32 = 0o644;

/// Which component serves a project's HTTPS endpoint.
///
/// Each variant picks its own file layout and decides whether a routing
/// snippet is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertConsumer {
    /// The shared reverse proxy terminates TLS
    Router,
    /// The project's own web server terminates TLS
    WebServer,
}

impl CertConsumer {
    pub fn default_layout(self) -> CertFileLayout {
        match self {
            CertConsumer::Router => CertFileLayout::Split,
            CertConsumer::WebServer => CertFileLayout::Combined,
        }
    }

    pub fn needs_routing_snippet(self) -> bool {
        match self {
            CertConsumer::Router => true,
            CertConsumer::WebServer => false,
        }
    }
}

/// Router dynamic configuration holding the TLS material of one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingSnippet {
    pub tls: TlsSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsSection {
    pub certificates: Vec<CertificateEntry>,
}

/// One certificate/key pair, in container paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateEntry {
    #[serde(rename = "certFile")]
    pub cert_file: String,
    #[serde(rename = "keyFile")]
    pub key_file: String,
}

impl RoutingSnippet {
    /// Map a leaf stored under `<ca_root>/<project>/` to `<container_root>/<project>/`.
    pub fn for_leaf(project: &str, leaf: &LeafCertificate, container_root: &str) -> Self {
        let root = container_root.trim_end_matches('/');
        let in_container = |path: &Path| {
            let file = path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default();
            format!("{}/{}/{}", root, project, file)
        };
        Self {
            tls: TlsSection {
                certificates: vec![CertificateEntry {
                    cert_file: in_container(&leaf.cert_path),
                    key_file: in_container(&leaf.key_path),
                }],
            },
        }
    }

    pub fn render(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn parse(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| CaError::Parse(e.to_string()))
    }

    /// Write the snippet next to the project's certificates.
    pub fn write_to(&self, project_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(project_dir)
            .map_err(|e| CaError::FileWrite(project_dir.to_path_buf(), e))?;
        let path = project_dir.join(ROUTING_SNIPPET_FILENAME);
        crate::ca::write_file(&path, self.render()?.as_bytes(), SNIPPET_MODE)?;
        tracing::debug!(path = %path.display(), "Wrote routing snippet");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn leaf(dir: &str, layout: CertFileLayout) -> LeafCertificate {
        let dir = Path::new(dir);
        let now = OffsetDateTime::now_utc();
        LeafCertificate {
            cert_path: layout.cert_path(dir),
            key_path: layout.key_path(dir),
            names: Vec::new(),
            not_before: now,
            not_after: now,
        }
    }

    fn only_entry(snippet: &RoutingSnippet) -> &CertificateEntry {
        assert_eq!(snippet.tls.certificates.len(), 1);
        &snippet.tls.certificates[0]
    }

    #[test]
    fn consumer_picks_layout() {
        assert_eq!(CertConsumer::Router.default_layout(), CertFileLayout::Split);
        assert_eq!(
            CertConsumer::WebServer.default_layout(),
            CertFileLayout::Combined
        );
        assert!(CertConsumer::Router.needs_routing_snippet());
        assert!(!CertConsumer::WebServer.needs_routing_snippet());
    }

    #[test]
    fn snippet_uses_container_paths() {
        let leaf = leaf("/home/dev/.devtls/ca/shop", CertFileLayout::Split);
        let snippet = RoutingSnippet::for_leaf("shop", &leaf, "/mnt/devtls/certs/");
        let entry = only_entry(&snippet);
        assert_eq!(entry.cert_file, "/mnt/devtls/certs/shop/cert.pem");
        assert_eq!(entry.key_file, "/mnt/devtls/certs/shop/key.pem");
    }

    #[test]
    fn rendered_yaml_uses_router_field_names() {
        let leaf = leaf("/ca/shop", CertFileLayout::Split);
        let snippet = RoutingSnippet::for_leaf("shop", &leaf, DEFAULT_CONTAINER_CERT_ROOT);
        let rendered = snippet.render().unwrap();

        let value: serde_yaml::Value = serde_yaml::from_str(&rendered).unwrap();
        let entry = &value["tls"]["certificates"][0];
        assert_eq!(
            entry["certFile"].as_str(),
            Some("/mnt/devtls/certs/shop/cert.pem")
        );
        assert_eq!(
            entry["keyFile"].as_str(),
            Some("/mnt/devtls/certs/shop/key.pem")
        );
        assert_eq!(RoutingSnippet::parse(&rendered).unwrap(), snippet);
    }

    #[test]
    fn combined_layout_points_both_entries_at_one_file() {
        let leaf = leaf("/ca/shop", CertFileLayout::Combined);
        let snippet = RoutingSnippet::for_leaf("shop", &leaf, DEFAULT_CONTAINER_CERT_ROOT);
        let entry = only_entry(&snippet);
        assert_eq!(entry.cert_file, entry.key_file);
    }

    #[test]
    fn special_characters_survive_rendering() {
        let snippet = RoutingSnippet {
            tls: TlsSection {
                certificates: vec![CertificateEntry {
                    cert_file: "/certs/a: \"b\"/cert.pem".to_string(),
                    key_file: "/certs/#x\\y/key.pem".to_string(),
                }],
            },
        };
        let rendered = snippet.render().unwrap();
        assert_eq!(RoutingSnippet::parse(&rendered).unwrap(), snippet);
    }

    #[test]
    fn write_to_creates_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let leaf = leaf("/ca/shop", CertFileLayout::Split);
        let snippet = RoutingSnippet::for_leaf("shop", &leaf, DEFAULT_CONTAINER_CERT_ROOT);

        let path = snippet.write_to(&temp.path().join("shop")).unwrap();

        assert_eq!(path, temp.path().join("shop").join("routing.yaml"));
        let written = std::fs::read_to_string(path).unwrap();
        assert_eq!(RoutingSnippet::parse(&written).unwrap(), snippet);
    }
}
