use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, ValueEnum};
use wg_gateway::{
    dependencies::{check_external_dependencies, ensure_root, COMMANDS},
    Gateway, GatewayConfig, GatewayError, IpAddrMask, KeyPairProvider, NetworkInfo, Outcome,
    TerminalPrompt, WgQuickService, WgTool, X25519,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Keygen {
    /// `wg genkey` / `wg pubkey`
    Wg,
    /// in-process Curve25519
    X25519,
}

#[derive(Parser)]
#[command(name = "wg-gateway")]
#[command(version, about = "Provision a WireGuard NAT gateway and reconcile its clients")]
struct Cli {
    /// Directory holding the WireGuard configuration.
    #[arg(long, env = "WG_GATEWAY_DIR", default_value = "/etc/wireguard")]
    wg_dir: PathBuf,
    /// Declared client list (YAML with a `users` sequence).
    #[arg(long, env = "WG_GATEWAY_CLIENTS", default_value = "clients.yaml")]
    clients: PathBuf,
    /// WireGuard interface name.
    #[arg(long, default_value = "wg0")]
    interface: String,
    /// Server address inside the VPN.
    #[arg(long, default_value = "10.0.0.1/32")]
    address: IpAddrMask,
    /// Route only the VPN and the LAN through client tunnels.
    #[arg(long)]
    split_tunnel: bool,
    #[arg(long, value_enum, default_value_t = Keygen::Wg)]
    keygen: Keygen,
}

fn run(cli: Cli) -> Result<(), GatewayError> {
    ensure_root()?;
    let commands: Vec<_> = COMMANDS
        .iter()
        .copied()
        .filter(|(cmd, _)| !matches!(cli.keygen, Keygen::X25519) || *cmd != "wg")
        .collect();
    check_external_dependencies(&commands)?;

    let config = GatewayConfig {
        wg_dir: cli.wg_dir,
        clients_file: cli.clients,
        ifname: cli.interface,
        server_address: cli.address,
        split_tunnel: cli.split_tunnel,
    };
    let keys: Box<dyn KeyPairProvider> = match cli.keygen {
        Keygen::Wg => Box::new(WgTool::default()),
        Keygen::X25519 => Box::new(X25519),
    };

    let network = NetworkInfo::detect()?;
    println!("{network}");

    let mut service = WgQuickService::new(config.ifname.clone());
    let mut prompt = TerminalPrompt::new();
    let mut gateway = Gateway::new(&config, keys.as_ref(), &mut service, &mut prompt);
    match gateway.run(&network)? {
        Outcome::Aborted => println!("Nothing changed."),
        Outcome::Reconciled(report) => {
            if report.is_noop() {
                println!("Peers already match {}.", config.clients_file.display());
            }
            for name in &report.added {
                println!("Added client {name}");
            }
            for name in &report.reissued {
                println!("Reissued client {name}");
            }
            for name in &report.removed {
                println!("Removed client {name}");
            }
            for address in &report.pruned_peers {
                println!("Removed undeclared peer {address}");
            }
            for name in &report.pruned_files {
                println!("Removed stale client file {name}.conf");
            }
            println!("WireGuard interface {} restarted.", config.ifname);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(GatewayError::Privilege) => {
            eprintln!("Please run this tool as root!");
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
