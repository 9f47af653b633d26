//! Build-time configuration
//!
//! Every knob of the sequence lives here as a plain struct with a `Default`
//! that matches the reference device. Boards override fields from
//! `option_env!` or constants; nothing is read at runtime.

/// Secure-storage abstraction backing the device identity
///
/// Exactly one is selected per build.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum SecurityKind {
    /// Hardware TPM holding an endorsement key
    Tpm,
    /// X.509 certificate and private key
    X509,
    /// Identity served by an edge HTTP workload API
    HttpEdge,
    /// Symmetric key enrollment; the key is installed after init
    SymmetricKey {
        registration_id: &'static str,
        key: &'static str,
    },
}

impl SecurityKind {
    /// Tag without the key material, as handed to `SecurityModule::init`
    pub const fn device_type(&self) -> SecurityDeviceType {
        match self {
            Self::Tpm => SecurityDeviceType::Tpm,
            Self::X509 => SecurityDeviceType::X509,
            Self::HttpEdge => SecurityDeviceType::HttpEdge,
            Self::SymmetricKey { .. } => SecurityDeviceType::SymmetricKey,
        }
    }
}

// Key material never reaches a log line
impl core::fmt::Debug for SecurityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::SymmetricKey {
                registration_id, ..
            } => f
                .debug_struct("SymmetricKey")
                .field("registration_id", registration_id)
                .finish_non_exhaustive(),
            other => core::fmt::Debug::fmt(&other.device_type(), f),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SecurityKind {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::SymmetricKey {
                registration_id, ..
            } => defmt::write!(f, "SymmetricKey {{ registration_id: {} }}", registration_id),
            other => defmt::write!(f, "{}", other.device_type()),
        }
    }
}

/// Key-material-free tag of [`SecurityKind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SecurityDeviceType {
    Tpm,
    X509,
    HttpEdge,
    SymmetricKey,
}

/// Transport used by the provisioning and device clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportProtocol {
    #[default]
    Mqtt,
    MqttWebSockets,
    Amqp,
    AmqpWebSockets,
    Http,
}

/// What to do when the security subsystem fails to initialize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SecurityInitPolicy {
    /// Treat as fatal, like every other stage
    #[default]
    Abort,
    /// Log and carry on to provisioning, which will then likely fail
    Continue,
}

/// Time source configuration
#[derive(Debug, Clone, Copy)]
pub struct TimeConfig {
    pub server: &'static str,
    pub port: u16,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            server: "time.google.com",
            port: 123,
        }
    }
}

/// Provisioning service configuration
#[derive(Debug, Clone, Copy)]
pub struct ProvisioningConfig {
    /// Global device-provisioning endpoint host
    pub endpoint: &'static str,
    /// Enrollment scope the registration belongs to
    pub id_scope: &'static str,
    pub transport: TransportProtocol,
    /// PEM bundle of trusted roots
    pub trusted_certs: Option<&'static str>,
    /// Enable protocol tracing in the client
    pub trace: bool,
    /// Overrides the registration id held by the security module
    pub registration_id_override: Option<&'static str>,
    /// Sleep between provisioning polls
    pub poll_interval_ms: u32,
    /// Give up after this many polls; `None` waits for the completion forever
    pub max_polls: Option<u32>,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            endpoint: "global.azure-devices-provisioning.net",
            id_scope: "",
            transport: TransportProtocol::Mqtt,
            trusted_certs: None,
            trace: true,
            registration_id_override: None,
            poll_interval_ms: 10,
            max_polls: None,
        }
    }
}

/// Device (message hub) client configuration
#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    pub transport: TransportProtocol,
    pub trusted_certs: Option<&'static str>,
    pub trace: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            transport: TransportProtocol::Mqtt,
            trusted_certs: None,
            trace: true,
        }
    }
}

/// Steady-state telemetry loop configuration
#[derive(Debug, Clone, Copy)]
pub struct TelemetryConfig {
    /// Stop after this many send attempts
    pub max_messages: u32,
    /// Minimum time between accepted sends
    pub interval_ms: u64,
    /// Sleep after each service call
    pub service_sleep_ms: u32,
    /// Extra service calls after the loop ends, to flush in-flight sends
    pub drain_iterations: u32,
    /// Leave the loop after this long even if neither stop condition hit
    pub deadline_ms: Option<u64>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            max_messages: 2,
            interval_ms: 2_000,
            service_sleep_ms: 1,
            drain_iterations: 10,
            deadline_ms: None,
        }
    }
}

/// Complete bootstrap configuration
#[derive(Debug, Clone, Copy)]
pub struct BootstrapConfig {
    pub time: TimeConfig,
    pub security: SecurityKind,
    pub security_init: SecurityInitPolicy,
    pub provisioning: ProvisioningConfig,
    pub hub: HubConfig,
    pub telemetry: TelemetryConfig,
}

impl BootstrapConfig {
    pub fn new(security: SecurityKind, id_scope: &'static str) -> Self {
        Self {
            time: TimeConfig::default(),
            security,
            security_init: SecurityInitPolicy::default(),
            provisioning: ProvisioningConfig {
                id_scope,
                ..ProvisioningConfig::default()
            },
            hub: HubConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}
