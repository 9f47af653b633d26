//! Telemetry session and the steady-state send loop

use core::fmt::Write;

use embedded_hal_async::delay::DelayNs;
use hal_abstractions::TickCounter;
use heapless::String;

use crate::config::TelemetryConfig;
use crate::hub::{ConnectionStatus, DeviceClient, HubEvent};

/// Payload buffer size; the index is at most 10 digits
const PAYLOAD_MAX_LEN: usize = 64;

/// Why the steady-state loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoopExit {
    /// Inbound stop message or terminal connection loss
    StopRequested,
    /// Sequence counter reached the configured maximum
    MessageLimit,
    /// Configured deadline elapsed
    Deadline,
}

/// Format the telemetry payload for one sequence number
pub fn format_payload(index: u32) -> Result<String<PAYLOAD_MAX_LEN>, core::fmt::Error> {
    let mut payload = String::new();
    write!(payload, "{{ \"message_index\" : \"{}\" }}", index)?;
    Ok(payload)
}

/// Live connection to the message hub
///
/// Owns the device client until [`release`](TelemetrySession::release).
pub struct TelemetrySession<C: DeviceClient> {
    client: C,
    sequence: u32,
    accepted: u32,
    connected: bool,
    stop_requested: bool,
    last_send_ms: Option<u64>,
}

impl<C: DeviceClient> TelemetrySession<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            sequence: 0,
            accepted: 0,
            connected: false,
            stop_requested: false,
            last_send_ms: None,
        }
    }

    /// Next sequence number; equals the number of send attempts so far
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Sends the client accepted for transmission
    pub fn accepted(&self) -> u32 {
        self.accepted
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    /// Apply one client event to the session flags
    ///
    /// Any state other than authenticated is terminal: the session stops
    /// rather than waiting for a reconnect.
    pub fn on_event(&mut self, event: HubEvent) {
        SessionFlags {
            connected: &mut self.connected,
            stop_requested: &mut self.stop_requested,
        }
        .apply(event);
    }

    async fn service(&mut self) {
        // Split borrows: the client reports into the session flags
        let Self {
            client,
            connected,
            stop_requested,
            ..
        } = self;
        let mut flags = SessionFlags {
            connected,
            stop_requested,
        };
        client
            .do_work(&mut |event: HubEvent| flags.apply(event))
            .await;
    }

    fn send_due(&self, now_ms: u64, config: &TelemetryConfig) -> bool {
        if !self.connected || self.stop_requested || self.sequence >= config.max_messages {
            return false;
        }
        match self.last_send_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= config.interval_ms,
        }
    }

    fn send_next(&mut self, now_ms: u64) {
        let index = self.sequence;
        // The counter advances on every attempt, accepted or not
        self.sequence += 1;

        let payload = match format_payload(index) {
            Ok(payload) => payload,
            Err(_) => {
                warn!("Failed to build payload for message [{}]", index);
                return;
            }
        };

        match self.client.send_event_async(payload.as_bytes()) {
            Ok(()) => {
                self.last_send_ms = Some(now_ms);
                self.accepted += 1;
                info!("Accepted message [{}] for transmission to hub", index);
            }
            Err(e) => warn!("send_event_async failed for message [{}]: {:?}", index, e),
        }
    }

    /// Run the steady-state loop until a stop request, the message limit, or
    /// the optional deadline
    ///
    /// Every iteration services the client once and sleeps
    /// `service_sleep_ms`, whether or not a message went out.
    pub async fn run_until_done<T, D>(
        &mut self,
        ticks: &T,
        delay: &mut D,
        config: &TelemetryConfig,
    ) -> LoopExit
    where
        T: TickCounter,
        D: DelayNs,
    {
        info!(
            "Sending 1 message every {} ms for {} messages (send any message to stop)",
            config.interval_ms, config.max_messages
        );
        let started_ms = ticks.now_ms();

        loop {
            let now_ms = ticks.now_ms();
            if self.send_due(now_ms, config) {
                self.send_next(now_ms);
            }

            self.service().await;
            delay.delay_ms(config.service_sleep_ms).await;

            if self.stop_requested {
                return LoopExit::StopRequested;
            }
            if self.sequence >= config.max_messages {
                return LoopExit::MessageLimit;
            }
            if let Some(deadline) = config.deadline_ms {
                if ticks.now_ms().saturating_sub(started_ms) >= deadline {
                    warn!("Telemetry deadline of {} ms reached", deadline);
                    return LoopExit::Deadline;
                }
            }
        }
    }

    /// Service the client a fixed number of extra times so in-flight sends
    /// can complete before the handle is released
    pub async fn drain<D: DelayNs>(&mut self, delay: &mut D, config: &TelemetryConfig) {
        debug!("Draining device client ({} iterations)", config.drain_iterations);
        for _ in 0..config.drain_iterations {
            self.service().await;
            delay.delay_ms(config.service_sleep_ms).await;
        }
    }

    /// Destroy the device client
    pub fn release(self) {
        self.client.destroy();
    }
}

/// Borrowed view of the session flags handed to the client callback
struct SessionFlags<'a> {
    connected: &'a mut bool,
    stop_requested: &'a mut bool,
}

impl SessionFlags<'_> {
    fn apply(&mut self, event: HubEvent) {
        match event {
            HubEvent::ConnectionStatus(ConnectionStatus::Authenticated, _) => {
                if !*self.connected {
                    info!("Device client authenticated");
                }
                *self.connected = true;
            }
            HubEvent::ConnectionStatus(status, reason) => {
                warn!("Device client connection lost: {:?} ({:?})", status, reason);
                *self.connected = false;
                *self.stop_requested = true;
            }
            HubEvent::Inbound => {
                info!("Stop message received from hub");
                *self.stop_requested = true;
            }
            HubEvent::SendConfirmation(result) => {
                debug!("Send confirmation: {:?}", result);
            }
        }
    }
}
