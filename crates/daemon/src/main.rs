/// Onion Transport CLI
///
/// Operator helper for the onion transport:
/// - Shows the tor start options derived from a configuration file
/// - Resolves host names through tor's DNS port

use anyhow::{bail, Context, Result};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use tracing::{info, warn, Level};

use onion_transport_common::TransportConfig;
use onion_transport_core::ProxyResolver;

const DEFAULT_CONFIG_PATH: &str = "onion-transport.toml";
const DEFAULT_DNS_PORT: u16 = 9053;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("help" | "--help" | "-h") | None => print_help(),
        Some("version" | "--version" | "-v") => {
            println!("Onion Transport v{}", env!("CARGO_PKG_VERSION"));
        }
        Some("config") => {
            let path = args
                .get(2)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
            show_config(path)?;
        }
        Some("resolve") => {
            let Some(host) = args.get(2) else {
                bail!("Usage: onion-transport resolve <host> [dns-port]");
            };
            let port = match args.get(3) {
                Some(port) => port
                    .parse::<u16>()
                    .with_context(|| format!("Invalid DNS port: {}", port))?,
                None => DEFAULT_DNS_PORT,
            };
            resolve(host, port).await?;
        }
        Some(other) => {
            eprintln!("Unknown command: {}", other);
            eprintln!("Run with 'help' to see available commands");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Load the configuration, creating a default file when there is none
fn show_config(path: PathBuf) -> Result<()> {
    let config = if path.exists() {
        info!("Loading configuration from {:?}", path);
        TransportConfig::from_file(&path)?
    } else {
        info!("No configuration file found, using defaults");
        let config = TransportConfig::default();

        if let Err(e) = config.to_file(&path) {
            warn!("Failed to save default config: {}", e);
        } else {
            info!("Saved default configuration to {:?}", path);
        }

        config
    };

    print_config(&config);
    Ok(())
}

fn print_config(config: &TransportConfig) {
    let tor = &config.tor;
    let path_or = |path: &Option<PathBuf>, default: &str| {
        path.as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| default.to_string())
    };

    println!("\n========================================");
    println!("       Onion Transport Configuration");
    println!("========================================");
    println!("TCP dial:         {}", if config.allow_tcp_dial { "allowed" } else { "disabled" });
    println!("Setup timeout:    {:?}", config.setup_timeout());
    println!("Start network:    {}", if tor.enable_network { "immediately" } else { "on first use" });
    println!("Tor binary:       {}", path_or(&tor.exe_path, "embedded"));
    println!("Data directory:   {}", path_or(&tor.data_dir, "temporary"));
    println!("torrc:            {}", path_or(&tor.torrc_file, "none"));
    println!("Debug log:        {}", path_or(&tor.debug_log, "none"));
    match config.dns_proxy_addr() {
        Some(addr) => println!("DNS proxy:        {}", addr),
        None => println!("DNS proxy:        disabled"),
    }
    println!("Tor arguments:    {}", config.tor_args().join(" "));
    println!("========================================\n");
}

async fn resolve(host: &str, port: u16) -> Result<()> {
    let proxy = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let resolver = ProxyResolver::new(proxy);

    info!("Resolving {} via {}", host, proxy);
    let addrs = resolver.lookup_ip(host).await?;

    if addrs.is_empty() {
        println!("{}: no addresses", host);
    }
    for addr in addrs {
        println!("{}", addr);
    }
    Ok(())
}

/// Print help message
fn print_help() {
    println!("Onion Transport - onion service listener tooling");
    println!();
    println!("USAGE:");
    println!("    onion-transport [COMMAND]");
    println!();
    println!("COMMANDS:");
    println!("    config [path]             Show the tor start options of a config file");
    println!("                              (default: {})", DEFAULT_CONFIG_PATH);
    println!("    resolve <host> [port]     Resolve a host through tor's DNS port");
    println!("                              (default port: {})", DEFAULT_DNS_PORT);
    println!("    help                      Show this help message");
    println!("    version                   Show version information");
    println!();
    println!("EXAMPLES:");
    println!("    # Enable DNS over tor in the config file:");
    println!("    dns_port = 9053");
    println!();
    println!("    # Resolve through the running node:");
    println!("    onion-transport resolve example.com 9053");
}
