//! Ethernet link handed to the bootstrap sequence

use defmt::{info, warn};
use embassy_futures::select::{select, Either};
use embassy_net::Stack;
use embassy_time::{Duration, Timer};
use hal_abstractions::{LinkError, MacAddress, NetworkInterface};

use super::error::NetworkError;

/// W5500 + embassy-net stack, up once DHCP has configured it
pub struct EthernetLink {
    stack: Stack<'static>,
    mac: MacAddress,
    dhcp_timeout: Duration,
}

impl EthernetLink {
    pub fn new(stack: Stack<'static>, mac_addr: [u8; 6], dhcp_timeout_ms: u64) -> Self {
        Self {
            stack,
            mac: MacAddress(mac_addr),
            dhcp_timeout: Duration::from_millis(dhcp_timeout_ms),
        }
    }

    pub fn stack(&self) -> Stack<'static> {
        self.stack
    }
}

impl NetworkInterface for EthernetLink {
    async fn connect(&mut self) -> Result<(), LinkError> {
        info!("Waiting for DHCP...");
        match select(self.stack.wait_config_up(), Timer::after(self.dhcp_timeout)).await {
            Either::First(()) => {}
            Either::Second(()) => {
                warn!("No DHCP lease after {} ms", self.dhcp_timeout.as_millis());
                return Err(LinkError::new(NetworkError::DhcpTimeout.code()));
            }
        }
        info!("Network is UP!");

        if let Some(config) = self.stack.config_v4() {
            let octets = config.address.address().octets();
            info!(
                "IP: {}.{}.{}.{}",
                octets[0], octets[1], octets[2], octets[3]
            );
            if let Some(gateway) = config.gateway {
                let gw = gateway.octets();
                info!("Gateway: {}.{}.{}.{}", gw[0], gw[1], gw[2], gw[3]);
            }
        }
        Ok(())
    }

    fn mac_address(&self) -> MacAddress {
        self.mac
    }
}
