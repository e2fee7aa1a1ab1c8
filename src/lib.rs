//! Turn a Linux host into a WireGuard NAT gateway and keep its peers in line with a
//! declared client list.
//!
//! The aggregate `wg0.conf` is owned by [`PeerStore`]; [`Reconciler`] diffs the declared
//! [`ClientList`] against it and applies the changes; [`Gateway`] wraps that in the
//! interactive first-run / reconfigure flow. Key generation, service control and operator
//! prompts are injected through the [`KeyPairProvider`], [`ServiceControl`] and [`Prompt`]
//! traits.

pub mod bootstrap;
pub mod client;
mod command;
mod conf;
pub mod dependencies;
pub mod error;
pub mod key;
pub mod keygen;
pub mod net;
#[cfg(target_os = "linux")]
mod netlink;
pub mod network;
pub mod peer;
pub mod prompt;
pub mod reconcile;
pub mod server;
pub mod service;
pub mod store;

#[macro_use]
extern crate log;

pub use {
    bootstrap::{Gateway, GatewayConfig, Outcome},
    client::{ClientConfigFile, ClientList, ClientRecord},
    error::GatewayError,
    key::{Key, KeyPair},
    keygen::{KeyPairProvider, WgTool, X25519},
    net::{IpAddrMask, IpAddrParseError},
    network::NetworkInfo,
    peer::PeerEntry,
    prompt::{Answer, Prompt, ScriptedPrompt, TerminalPrompt},
    reconcile::{ReconcilePlan, ReconcileReport, Reconciler},
    server::ServerConfig,
    service::{ServiceControl, WgQuickService},
    store::{PeerContext, PeerStore, StoreState},
};
