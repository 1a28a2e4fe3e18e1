pub mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgGroup, Parser};
use commands::EntityCommand;
use internal::{config::CommonConfig, manager::Directory, Bind, DirectoryServer};

/// Manage people, users, groups and organizational units stored in 389ds
#[derive(Parser, Debug)]
#[clap(group(ArgGroup::new("bind").requires_all(["binddn", "bindpass"]).multiple(true)))]
pub struct Cli {
    #[command(subcommand)]
    pub command: EntityCommand,

    /// Path to the TOML configuration file
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Directory servers as host:port, replaces the configured ones
    #[clap(short = 'H', long)]
    host: Vec<DirectoryServer>,

    /// Connect with ldaps://
    #[clap(short = 'S', long, default_value_t = false)]
    tls: bool,

    /// Disable TLS cert verification
    #[clap(short = 'C', long, default_value_t = false)]
    skip_cert_verification: bool,

    #[clap(short = 'D', long)]
    #[clap(group = "bind")]
    binddn: Option<String>,

    #[clap(short = 'w', long)]
    #[clap(group = "bind")]
    bindpass: Option<String>,

    #[clap(short = 'b', long)]
    basedn: Option<String>,

    /// LDAP paging setting
    #[clap(short = 'P', long)]
    page_size: Option<i32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt::init();

    let mut config: CommonConfig = if let Some(conf) = &args.config {
        let file = String::from_utf8(std::fs::read(conf)?)?;
        toml::from_str(&file)?
    } else {
        Default::default()
    };
    let ldap_config = &mut config.ldap_config;

    if !args.host.is_empty() {
        ldap_config.servers = args.host.clone();
    }

    if args.tls {
        ldap_config.tls = true;
    }

    if args.skip_cert_verification {
        ldap_config.verify_certs = false;
    }

    if let (Some(dn), Some(pass)) = (&args.binddn, &args.bindpass) {
        ldap_config.bind = Some(Bind {
            dn: dn.clone(),
            pass: pass.clone(),
        });
    }

    if let Some(basedn) = &args.basedn {
        ldap_config.default_base = basedn.clone();
    }

    if let Some(page_size) = args.page_size {
        ldap_config.page_size = page_size;
    }

    ldap_config.validate()?;

    if ldap_config.default_base.is_empty() {
        ldap_config.detect_base().await?;
        tracing::info!("Set base to the {}", ldap_config.default_base);
    }

    let directory = Directory::new(ldap_config)?;
    commands::run(&directory, &config.bases, args.command).await
}
