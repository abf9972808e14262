use clap::{Subcommand, ValueEnum};
use devtls_core::ca::{CertFileLayout, LeafIssuer, LocalCaStore};
use devtls_core::router::{CertConsumer, RoutingSnippet};

use crate::config::GlobalConfig;
use crate::output;

#[derive(Subcommand)]
pub enum CertCommands {
    /// Issue a certificate for a project, replacing any previous one
    Issue {
        /// Project name; certificates go to `<ca root>/<project>/`
        project: String,

        /// Hostnames, IP addresses or URIs the certificate is valid for
        hosts: Vec<String>,

        /// Write certificate and key into a single file
        #[arg(long)]
        combined: bool,

        /// Component that serves HTTPS for the project
        #[arg(long, value_enum, default_value_t = ConsumerArg::Router)]
        consumer: ConsumerArg,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConsumerArg {
    /// The shared development router
    Router,
    /// The project's own web server
    WebServer,
}

impl From<ConsumerArg> for CertConsumer {
    fn from(arg: ConsumerArg) -> Self {
        match arg {
            ConsumerArg::Router => CertConsumer::Router,
            ConsumerArg::WebServer => CertConsumer::WebServer,
        }
    }
}

pub fn run(cmd: CertCommands) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        CertCommands::Issue {
            project,
            hosts,
            combined,
            consumer,
        } => issue(&project, &hosts, combined, consumer.into()),
    }
}

fn layout_for(consumer: CertConsumer, combined: bool) -> CertFileLayout {
    if combined {
        CertFileLayout::Combined
    } else {
        consumer.default_layout()
    }
}

fn issue(
    project: &str,
    hosts: &[String],
    combined: bool,
    consumer: CertConsumer,
) -> Result<(), Box<dyn std::error::Error>> {
    let project = project.trim();
    let store = LocalCaStore::from_env()?;
    let Some(ca) = store.load()? else {
        return Err("No local CA found. Run `devtls ca install` first.".into());
    };

    let dir = store.project_dir(project)?;
    let layout = layout_for(consumer, combined);
    let leaf = output::with_spinner("Generating certificate...", || {
        LeafIssuer::new(&ca).issue(hosts, &dir, layout)
    })?;

    if hosts.is_empty() {
        output::warning("The certificate has no names, so browsers will not accept it for any site.");
    }
    output::success(&format!(
        "Issued certificate for {}",
        output::emphasized(project)
    ));
    if leaf.is_combined() {
        output::muted(&format!("  cert + key: {}", leaf.cert_path.display()));
    } else {
        output::muted(&format!("  cert: {}", leaf.cert_path.display()));
        output::muted(&format!("  key:  {}", leaf.key_path.display()));
    }
    output::muted(&format!("  expires: {}", leaf.not_after.date()));

    if consumer.needs_routing_snippet() {
        let config = GlobalConfig::load()?;
        let snippet = RoutingSnippet::for_leaf(project, &leaf, config.router_cert_root());
        let path = snippet.write_to(&dir)?;
        output::muted(&format!("  routing: {}", path.display()));
    }

    Ok(())
}
