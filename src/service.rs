//! Control of the running VPN through the init system.

use crate::{command::run, GatewayError};

/// Service-control capability for one WireGuard interface.
pub trait ServiceControl {
    /// Enable the service at boot and bring the interface up.
    fn start(&mut self) -> Result<(), GatewayError>;

    /// Disable the service and bring the interface down.
    ///
    /// Failures are logged and swallowed: the service may simply not be running.
    fn stop(&mut self);

    /// Full stop/start cycle; the VPN is briefly unavailable.
    fn restart(&mut self) -> Result<(), GatewayError> {
        self.stop();
        self.start()
    }
}

/// `wg-quick@<ifname>` systemd unit.
#[derive(Clone, Debug)]
pub struct WgQuickService {
    ifname: String,
}

impl WgQuickService {
    #[must_use]
    pub fn new(ifname: impl Into<String>) -> Self {
        Self {
            ifname: ifname.into(),
        }
    }

    #[must_use]
    pub fn unit(&self) -> String {
        format!("wg-quick@{}", self.ifname)
    }
}

impl ServiceControl for WgQuickService {
    fn start(&mut self) -> Result<(), GatewayError> {
        info!("Starting WireGuard interface {}", self.ifname);
        run("systemctl", &["enable", &self.unit()])?;
        run("wg-quick", &["up", &self.ifname])?;
        Ok(())
    }

    fn stop(&mut self) {
        info!("Stopping WireGuard interface {}", self.ifname);
        if let Err(err) = run("systemctl", &["disable", &self.unit()]) {
            warn!("Failed to disable {}: {err}", self.unit());
        }
        if let Err(err) = run("wg-quick", &["down", &self.ifname]) {
            warn!("Failed to bring {} down: {err}", self.ifname);
        }
    }
}
