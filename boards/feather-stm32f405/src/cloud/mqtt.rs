//! Cloud-link task: MQTT v5.0 over TLS 1.3 to the message hub
//!
//! Waits for an `Open` on the uplink, connects to the hub with a shared access
//! signature as the password and then publishes queued events until `Close`.
//! After a `Subscribe` it also reports cloud-to-device messages. Connection
//! status, per-event results and inbound messages go back on the downlink.
//!
//! # Memory
//!
//! - MQTT packet buffer: 2KB, bump-allocated per session
//! - TLS buffers: 34KB, taken once from [`tls_buffers`]
//! - TCP buffers: 8KB per session

#![allow(unsafe_code)] // TopicName/TopicFilter::new_unchecked

use bootstrap_core::{ConnectionReason, ConnectionStatus, HubEvent, SendResult};
use defmt::{debug, error, info, warn, Debug2Format};
use embassy_futures::select::{select, Either};
use embassy_net::{dns::DnsQueryType, IpEndpoint, Stack};
use embedded_tls::{
    Aes128GcmSha256, CryptoProvider, NoVerify, TlsConfig, TlsConnection, TlsContext, TlsVerifier,
};
use hal_abstractions::RealTimeClock;
use heapless::String;
use rust_mqtt::{
    buffer::BumpBuffer,
    client::{
        event::Event,
        options::{
            ConnectOptions, PublicationOptions, RetainHandling, SubscriptionOptions,
            TopicReference,
        },
        Client,
    },
    config::{KeepAlive, SessionExpiryInterval},
    types::{MqttBinary, MqttString, QoS, TopicFilter, TopicName},
    Bytes,
};

use super::hub::{report, Uplink, UPLINK};
use super::{keystore, sas};
use crate::config::MqttConfig;
use crate::network::{AsyncTcpSocket, NetworkError};
use crate::time::InternalRtc;
use crate::tls_buffers::{self, TlsBuffers};

const MQTT_BUFFER_SIZE: usize = 2048;

/// `devices/` + 128-byte device id + `/messages/events/`
const MAX_TOPIC_LEN: usize = 160;

/// Hub host, device id and the API version suffix
const MAX_USER_NAME_LEN: usize = 288;

const API_VERSION: &str = "2021-04-12";

/// Crypto provider wrapping the hardware RNG
struct SimpleCryptoProvider<'a, RNG> {
    rng: &'a mut RNG,
    verifier: NoVerify,
}

impl<'a, RNG> SimpleCryptoProvider<'a, RNG> {
    fn new(rng: &'a mut RNG) -> Self {
        Self {
            rng,
            verifier: NoVerify,
        }
    }
}

impl<RNG> CryptoProvider for SimpleCryptoProvider<'_, RNG>
where
    RNG: rand_core::CryptoRngCore,
{
    type CipherSuite = Aes128GcmSha256;
    type Signature = &'static [u8];

    fn rng(&mut self) -> impl rand_core::CryptoRngCore {
        &mut *self.rng
    }

    fn verifier(
        &mut self,
    ) -> Result<&mut impl TlsVerifier<Self::CipherSuite>, embedded_tls::TlsError> {
        Ok(&mut self.verifier)
    }
}

fn has_wildcards(s: &str) -> bool {
    s.contains('+') || s.contains('#') || s.contains('\0')
}

/// Device-to-cloud topic: `devices/{device_id}/messages/events/`
fn format_event_topic(device_id: &str) -> Result<String<MAX_TOPIC_LEN>, NetworkError> {
    if device_id.is_empty() || device_id.contains('/') || has_wildcards(device_id) {
        return Err(NetworkError::MqttProtocolError);
    }
    let mut topic = String::new();
    for part in ["devices/", device_id, "/messages/events/"] {
        topic
            .push_str(part)
            .map_err(|_| NetworkError::MqttProtocolError)?;
    }
    Ok(topic)
}

/// Cloud-to-device filter: `devices/{device_id}/messages/devicebound/#`
fn format_inbound_filter(device_id: &str) -> Result<String<MAX_TOPIC_LEN>, NetworkError> {
    if device_id.is_empty() || device_id.contains('/') || has_wildcards(device_id) {
        return Err(NetworkError::MqttProtocolError);
    }
    let mut filter = String::new();
    for part in ["devices/", device_id, "/messages/devicebound/#"] {
        filter
            .push_str(part)
            .map_err(|_| NetworkError::MqttProtocolError)?;
    }
    Ok(filter)
}

/// MQTT user name: `{hub_uri}/{device_id}/?api-version=...`
fn format_user_name(
    hub_uri: &str,
    device_id: &str,
) -> Result<String<MAX_USER_NAME_LEN>, NetworkError> {
    let mut user = String::new();
    for part in [hub_uri, "/", device_id, "/?api-version=", API_VERSION] {
        user.push_str(part)
            .map_err(|_| NetworkError::MqttProtocolError)?;
    }
    Ok(user)
}

fn mqtt_string(s: &str) -> Result<MqttString<'_>, NetworkError> {
    MqttString::new(s.into()).map_err(|e| {
        error!("Invalid MQTT string: {:?}", Debug2Format(&e));
        NetworkError::MqttProtocolError
    })
}

/// Serve hub sessions for the lifetime of the firmware
pub async fn run_cloud_link<RNG>(stack: Stack<'static>, rng: &mut RNG, config: MqttConfig) -> !
where
    RNG: rand_core::RngCore + rand_core::CryptoRng,
{
    let mut buffers = tls_buffers::take();
    if buffers.is_none() {
        error!("TLS buffers already taken, cloud link disabled");
    }

    loop {
        let (hub_uri, device_id) = match UPLINK.receive().await {
            Uplink::Open { hub_uri, device_id } => (hub_uri, device_id),
            Uplink::Event(_) => {
                warn!("Event dropped: no hub session");
                report(HubEvent::SendConfirmation(SendResult::Error));
                continue;
            }
            Uplink::Subscribe | Uplink::Close => continue,
        };

        let result = match buffers.as_mut() {
            Some(buffers) => serve_session(stack, rng, &config, buffers, &hub_uri, &device_id).await,
            None => Err(NetworkError::TlsHandshakeFailed),
        };
        match result {
            Ok(()) => info!("Hub session closed"),
            Err(e) => {
                error!("Hub session failed: {}", e);
                report(HubEvent::ConnectionStatus(
                    ConnectionStatus::Unauthenticated,
                    ConnectionReason::CommunicationError,
                ));
            }
        }
    }
}

/// Connect, then publish uplink events until the client closes the session
async fn serve_session<RNG>(
    stack: Stack<'static>,
    rng: &mut RNG,
    config: &MqttConfig,
    buffers: &mut TlsBuffers,
    hub_uri: &str,
    device_id: &str,
) -> Result<(), NetworkError>
where
    RNG: rand_core::RngCore + rand_core::CryptoRng,
{
    info!("Connecting to hub at {}:{}", hub_uri, config.port);
    let topic = format_event_topic(device_id)?;
    let inbound_filter = format_inbound_filter(device_id)?;
    let user_name = format_user_name(hub_uri, device_id)?;

    let now = InternalRtc::new().read().map_err(|e| {
        error!("No wall-clock time for the access token: {}", e);
        NetworkError::AuthTokenFailed
    })?;
    let expiry = now.unix_secs + u64::from(config.token_lifetime_secs);
    let password = sas::build_token(hub_uri, device_id, expiry, keystore::sign)?;

    let server_ip = stack
        .dns_query(hub_uri, DnsQueryType::A)
        .await
        .map_err(|e| {
            error!("DNS query failed: {:?}", Debug2Format(&e));
            NetworkError::DnsError
        })?
        .first()
        .copied()
        .ok_or_else(|| {
            error!("DNS returned no results for {}", hub_uri);
            NetworkError::DnsError
        })?;
    let endpoint = IpEndpoint::new(server_ip, config.port);
    info!("Resolved {} to {}", hub_uri, Debug2Format(&endpoint));

    let mut rx_buffer = [0u8; 4096];
    let mut tx_buffer = [0u8; 4096];
    let mut socket = AsyncTcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
    socket.connect(endpoint).await?;
    debug!("TCP connection established");

    let tls_config = TlsConfig::new().with_server_name(hub_uri);
    let mut tls_connection = TlsConnection::<AsyncTcpSocket, Aes128GcmSha256>::new(
        socket,
        &mut buffers.read[..],
        &mut buffers.write[..],
    );
    let provider = SimpleCryptoProvider::new(rng);
    tls_connection
        .open(TlsContext::new(&tls_config, provider))
        .await
        .map_err(|e| {
            error!("TLS handshake failed: {:?}", Debug2Format(&e));
            NetworkError::TlsHandshakeFailed
        })?;
    info!("TLS 1.3 handshake completed");

    let mut mqtt_buffer = [0u8; MQTT_BUFFER_SIZE];
    let mut buffer = BumpBuffer::new(&mut mqtt_buffer);
    let mut mqtt_client = Client::<'_, _, _, 1, 1, 1, 0>::new(&mut buffer);

    let connect_opts = ConnectOptions {
        session_expiry_interval: SessionExpiryInterval::EndOnDisconnect,
        clean_start: config.clean_start,
        keep_alive: if config.keep_alive_secs == 0 {
            KeepAlive::Infinite
        } else {
            KeepAlive::Seconds(config.keep_alive_secs)
        },
        will: None,
        user_name: Some(mqtt_string(user_name.as_str())?),
        password: Some(MqttBinary::new(Bytes::from(password.as_bytes())).map_err(|e| {
            error!("Access token too large: {:?}", Debug2Format(&e));
            NetworkError::MqttProtocolError
        })?),
    };
    mqtt_client
        .connect(tls_connection, &connect_opts, Some(mqtt_string(device_id)?))
        .await
        .map_err(|e| {
            error!("MQTT connect failed: {:?}", Debug2Format(&e));
            NetworkError::MqttConnectionFailed
        })?;
    info!("Connected to hub as {}", device_id);
    report(HubEvent::ConnectionStatus(
        ConnectionStatus::Authenticated,
        ConnectionReason::Ok,
    ));

    loop {
        // Waiting on the client as well keeps inbound publishes flowing
        let request = match select(UPLINK.receive(), mqtt_client.poll()).await {
            Either::First(request) => request,
            Either::Second(Ok(Event::Publish(_))) => {
                info!("Cloud-to-device message received");
                report(HubEvent::Inbound);
                continue;
            }
            Either::Second(Ok(_)) => continue,
            Either::Second(Err(e)) => {
                error!("Hub connection lost: {:?}", Debug2Format(&e));
                return Err(NetworkError::MqttConnectionFailed);
            }
        };

        let payload = match request {
            Uplink::Event(payload) => payload,
            Uplink::Subscribe => {
                // SAFETY: format_inbound_filter() rejects wildcards, null
                // characters and separators in the device id, so the only
                // wildcard is the trailing multi-level one
                let filter =
                    unsafe { TopicFilter::new_unchecked(mqtt_string(inbound_filter.as_str())?) };
                let options = SubscriptionOptions {
                    retain_handling: RetainHandling::AlwaysSend,
                    retain_as_published: false,
                    no_local: false,
                    qos: QoS::AtMostOnce,
                };
                mqtt_client.subscribe(filter, options).await.map_err(|e| {
                    error!("Subscribe failed: {:?}", Debug2Format(&e));
                    NetworkError::MqttConnectionFailed
                })?;
                info!("Subscribed to {}", inbound_filter.as_str());
                continue;
            }
            Uplink::Close => return Ok(()),
            Uplink::Open { .. } => {
                warn!("Hub session already open");
                continue;
            }
        };

        // SAFETY: format_event_topic() rejects wildcards, null characters and
        // separators in the device id, so the topic is a valid topic name
        let topic_name = unsafe { TopicName::new_unchecked(mqtt_string(topic.as_str())?) };
        let pub_options = PublicationOptions {
            retain: false,
            message_expiry_interval: None,
            topic: TopicReference::Name(topic_name),
            qos: QoS::AtMostOnce,
        };

        let result = match mqtt_client
            .publish(&pub_options, Bytes::from(payload.as_slice()))
            .await
        {
            Ok(_) => {
                debug!("Published {} bytes to {}", payload.len(), topic.as_str());
                SendResult::Ok
            }
            Err(e) => {
                error!("Publish failed: {:?}", Debug2Format(&e));
                SendResult::Error
            }
        };
        report(HubEvent::SendConfirmation(result));
    }
}
