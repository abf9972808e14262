use clap::{CommandFactory, Parser, Subcommand};

use crate::commands::{ca, cert};

/// devtls - trusted HTTPS for local development
#[derive(Parser)]
#[command(name = "devtls")]
#[command(version)]
#[command(about = "devtls - trusted HTTPS for local development")]
pub struct Cli {
    /// Show verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage the local certificate authority
    #[command(subcommand)]
    Ca(ca::CaCommands),

    /// Issue project certificates
    #[command(subcommand)]
    Cert(cert::CertCommands),
}

impl Cli {
    pub fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let Some(command) = self.command else {
            Cli::command().print_help()?;
            println!();
            return Ok(());
        };

        match command {
            Commands::Ca(cmd) => ca::run(cmd),
            Commands::Cert(cmd) => cert::run(cmd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::cert::ConsumerArg;

    #[test]
    fn ca_install_parses_force() {
        let cli = Cli::try_parse_from(["devtls", "ca", "install", "--force"]).unwrap();
        let Some(Commands::Ca(ca::CaCommands::Install { force })) = cli.command else {
            panic!("expected Ca::Install");
        };
        assert!(force);
    }

    #[test]
    fn ca_uninstall_defaults_to_removing_files() {
        let cli = Cli::try_parse_from(["devtls", "ca", "uninstall"]).unwrap();
        let Some(Commands::Ca(ca::CaCommands::Uninstall { keep_files })) = cli.command else {
            panic!("expected Ca::Uninstall");
        };
        assert!(!keep_files);
    }

    #[test]
    fn verbose_is_global() {
        let cli = Cli::try_parse_from(["devtls", "ca", "check", "-v"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn cert_issue_defaults_to_router_consumer() {
        let cli = Cli::try_parse_from([
            "devtls",
            "cert",
            "issue",
            "shop",
            "shop.localhost",
            "127.0.0.1",
        ])
        .unwrap();
        let Some(Commands::Cert(cert::CertCommands::Issue {
            project,
            hosts,
            combined,
            consumer,
        })) = cli.command
        else {
            panic!("expected Cert::Issue");
        };
        assert_eq!(project, "shop");
        assert_eq!(hosts, vec!["shop.localhost", "127.0.0.1"]);
        assert!(!combined);
        assert_eq!(consumer, ConsumerArg::Router);
    }

    #[test]
    fn cert_issue_accepts_web_server_consumer() {
        let cli = Cli::try_parse_from([
            "devtls",
            "cert",
            "issue",
            "blog",
            "blog.localhost",
            "--consumer",
            "web-server",
        ])
        .unwrap();
        let Some(Commands::Cert(cert::CertCommands::Issue { consumer, .. })) = cli.command else {
            panic!("expected Cert::Issue");
        };
        assert_eq!(consumer, ConsumerArg::WebServer);
    }

    #[test]
    fn cert_issue_allows_no_hosts() {
        let cli = Cli::try_parse_from(["devtls", "cert", "issue", "bare"]).unwrap();
        let Some(Commands::Cert(cert::CertCommands::Issue { hosts, .. })) = cli.command else {
            panic!("expected Cert::Issue");
        };
        assert!(hosts.is_empty());
    }

    #[test]
    fn cert_issue_rejects_unknown_consumer() {
        let res = Cli::try_parse_from([
            "devtls",
            "cert",
            "issue",
            "shop",
            "--consumer",
            "apache",
        ]);
        assert!(res.is_err());
    }
}
