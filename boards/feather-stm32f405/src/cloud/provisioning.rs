//! Pre-assigned provisioning authority
//!
//! Stands in for a device provisioning service: the hub is fixed at build
//! time and the registration walks through the usual status updates before
//! completing with it.

use bootstrap_core::{
    Assignment, ClientOption, Failure, ProvisioningClient, ProvisioningFactory,
    ProvisioningResult, RegistrationEvent, RegistrationStatus, TransportProtocol,
};
use defmt::{debug, info, warn};
use heapless::String;

/// `register` was not called before polling
const NOT_REGISTERED: i32 = -30;

pub struct PreassignedAuthority {
    hub: Option<&'static str>,
    registration_id: &'static str,
}

impl PreassignedAuthority {
    /// `registration_id` is used unless the client is given an override
    pub const fn new(hub: Option<&'static str>, registration_id: &'static str) -> Self {
        Self {
            hub,
            registration_id,
        }
    }
}

impl ProvisioningFactory for PreassignedAuthority {
    type Client = PreassignedRegistration;

    fn create(
        &mut self,
        endpoint: &str,
        id_scope: &str,
        transport: TransportProtocol,
    ) -> Option<PreassignedRegistration> {
        if transport != TransportProtocol::Mqtt {
            warn!("Transport {} not available on this board", transport);
            return None;
        }
        info!("Provisioning via {} (scope {})", endpoint, id_scope);
        Some(PreassignedRegistration {
            hub: self.hub,
            default_id: self.registration_id,
            registration_id: String::new(),
            registered: false,
            step: 0,
        })
    }

    fn version(&self) -> &str {
        concat!("preassigned/", env!("CARGO_PKG_VERSION"))
    }
}

pub struct PreassignedRegistration {
    hub: Option<&'static str>,
    default_id: &'static str,
    registration_id: String<128>,
    registered: bool,
    step: u8,
}

impl ProvisioningClient for PreassignedRegistration {
    fn set_option(&mut self, option: ClientOption<'_>) -> Result<(), Failure> {
        match option {
            ClientOption::RegistrationId(id) => {
                self.registration_id.clear();
                self.registration_id
                    .push_str(id)
                    .map_err(|_| Failure::Transient(-1))
            }
            ClientOption::LogTrace(_) | ClientOption::TrustedCerts(_) => Ok(()),
        }
    }

    fn register(&mut self) -> Result<(), Failure> {
        if self.registration_id.is_empty() {
            self.registration_id
                .push_str(self.default_id)
                .map_err(|_| Failure::Fatal(-1))?;
        }
        self.registered = true;
        debug!("Registering {}", self.registration_id.as_str());
        Ok(())
    }

    async fn do_work(
        &mut self,
        events: &mut dyn FnMut(RegistrationEvent<'_>),
    ) -> Result<(), Failure> {
        if !self.registered {
            return Err(Failure::Fatal(NOT_REGISTERED));
        }
        match self.step {
            0 => events(RegistrationEvent::Status(RegistrationStatus::Connected)),
            1 => events(RegistrationEvent::Status(RegistrationStatus::Assigning)),
            2 => {
                let result = match self.hub {
                    Some(hub_uri) => Ok(Assignment {
                        hub_uri,
                        device_id: self.registration_id.as_str(),
                    }),
                    None => Err(ProvisioningResult::HubNotSpecified),
                };
                events(RegistrationEvent::Complete(result));
            }
            _ => {}
        }
        self.step = self.step.saturating_add(1);
        Ok(())
    }

    fn destroy(self) {
        debug!("Provisioning client released");
    }
}
