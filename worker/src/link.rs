//! Broker session for the wake handshake.
//!
//! One `OtaLink` is exclusive to one attempt: its client id carries the
//! device name and it touches only that device's two topics. The event loop
//! is driven inline, so acknowledgements and incoming READY publishes are
//! observed while waiting, never in a background task.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use otawake_shared::settings::MqttSettings;
use otawake_shared::topics::{Topics, READY};

use crate::errors::WorkerError;

/// Bound on the broker connect window and on every acknowledgement wait.
const ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Granularity of the wake-wait poll.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// What the wake wait ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeWait {
    /// The device reported READY
    Ready,

    /// The deadline passed without a READY
    TimedOut,

    /// The broker connection failed during the wait
    ConnectionLost,
}

pub struct OtaLink {
    client: AsyncClient,
    eventloop: EventLoop,
    request_topic: String,
    ready_topic: String,
    ready_seen: bool,
}

impl OtaLink {
    /// Connect to the broker and subscribe to the device's answer topic.
    pub async fn connect(
        mqtt: &MqttSettings,
        prefix: &str,
        device: &str,
    ) -> Result<Self, WorkerError> {
        let client_id = format!("otawake-{}", device);
        let mut options = MqttOptions::new(client_id, mqtt.host.clone(), mqtt.port);
        options.set_keep_alive(Duration::from_secs(60));

        if let Some(ref username) = mqtt.username {
            options.set_credentials(username, mqtt.password.as_deref().unwrap_or(""));
        }

        if mqtt.tls {
            use rumqttc::{TlsConfiguration, Transport};
            use rustls::ClientConfig;
            use std::sync::Arc;

            let mut root_cert_store = rustls::RootCertStore::empty();

            if let Some(ref ca_path) = mqtt.ca_cert_path {
                let ca_pem = std::fs::read(ca_path).map_err(|e| {
                    WorkerError::Mqtt(format!("Failed to read CA cert {ca_path}: {e}"))
                })?;
                let mut cursor = std::io::Cursor::new(ca_pem);
                for cert in rustls_pemfile::certs(&mut cursor).flatten() {
                    let _ = root_cert_store.add(cert);
                }
            } else {
                for cert in rustls_native_certs::load_native_certs().unwrap_or_default() {
                    let _ = root_cert_store.add(cert);
                }
            }

            let client_config = ClientConfig::builder()
                .with_root_certificates(root_cert_store)
                .with_no_client_auth();

            options.set_transport(Transport::tls_with_config(TlsConfiguration::Rustls(
                Arc::new(client_config),
            )));
        }

        let (client, eventloop) = AsyncClient::new(options, 10);
        let mut link = Self {
            client,
            eventloop,
            request_topic: Topics::request(prefix, device),
            ready_topic: Topics::ready(prefix, device),
            ready_seen: false,
        };

        link.await_incoming(|packet| matches!(packet, Packet::ConnAck(_)))
            .await
            .map_err(|e| {
                WorkerError::Mqtt(format!(
                    "Unable to connect to {}:{}: {}",
                    mqtt.host, mqtt.port, e
                ))
            })?;
        info!("Connected to MQTT broker");

        link.client
            .subscribe(link.ready_topic.as_str(), QoS::AtMostOnce)
            .await
            .map_err(|e| WorkerError::Mqtt(e.to_string()))?;
        link.await_incoming(|packet| matches!(packet, Packet::SubAck(_)))
            .await?;
        info!("Subscribed to: {}", link.ready_topic);

        Ok(link)
    }

    /// Publish a retained payload on the request topic and wait for the
    /// broker's acknowledgement. An empty payload clears the topic.
    pub async fn publish_request(&mut self, payload: &str) -> Result<(), WorkerError> {
        if payload.is_empty() {
            info!("Clearing topic {}", self.request_topic);
        } else {
            info!("Sending {}: {}", self.request_topic, payload);
        }

        self.client
            .publish(self.request_topic.as_str(), QoS::AtLeastOnce, true, payload)
            .await
            .map_err(|e| WorkerError::Mqtt(e.to_string()))?;

        self.await_incoming(|packet| matches!(packet, Packet::PubAck(_)))
            .await
            .map_err(|_| {
                WorkerError::Mqtt(format!("Publish to {} not acknowledged", self.request_topic))
            })
    }

    /// Clear the retained request topic.
    pub async fn clear_request(&mut self) -> Result<(), WorkerError> {
        self.publish_request("").await
    }

    /// Wait until the device reports READY, polling the event loop at
    /// one-second granularity, up to `deadline`.
    pub async fn await_ready(&mut self, deadline: Instant) -> WakeWait {
        loop {
            if self.ready_seen {
                return WakeWait::Ready;
            }
            if Instant::now() >= deadline {
                return WakeWait::TimedOut;
            }
            match timeout(POLL_INTERVAL, self.eventloop.poll()).await {
                Ok(Ok(Event::Incoming(packet))) => self.note_ready(&packet),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    warn!("MQTT connection lost while waiting: {}", e);
                    return WakeWait::ConnectionLost;
                }
                Err(_) => {}
            }
        }
    }

    /// Disconnect and drain the event loop briefly so the DISCONNECT
    /// actually reaches the broker.
    pub async fn disconnect(mut self) {
        if self.client.disconnect().await.is_ok() {
            let _ = timeout(ACK_TIMEOUT, async {
                while self.eventloop.poll().await.is_ok() {}
            })
            .await;
        }
    }

    /// Drive the event loop until a wanted packet arrives or the
    /// acknowledgement window closes.
    async fn await_incoming<F>(&mut self, wanted: F) -> Result<(), WorkerError>
    where
        F: Fn(&Packet) -> bool,
    {
        let deadline = Instant::now() + ACK_TIMEOUT;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(WorkerError::Mqtt(
                    "Timed out waiting for broker acknowledgement".to_string(),
                ));
            }
            match timeout(deadline - now, self.eventloop.poll()).await {
                Ok(Ok(Event::Incoming(packet))) => {
                    self.note_ready(&packet);
                    if wanted(&packet) {
                        return Ok(());
                    }
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    warn!("MQTT poll error: {}", e);
                    sleep(POLL_INTERVAL).await;
                }
                Err(_) => {
                    return Err(WorkerError::Mqtt(
                        "Timed out waiting for broker acknowledgement".to_string(),
                    ));
                }
            }
        }
    }

    /// Record a READY answer seen on the subscribed topic, whichever wait
    /// the event loop was being driven by.
    fn note_ready(&mut self, packet: &Packet) {
        if let Packet::Publish(publish) = packet {
            let payload = String::from_utf8_lossy(&publish.payload);
            let payload = payload.trim();
            debug!("Received message on {}: {}", publish.topic, payload);
            if publish.topic == self.ready_topic && payload == READY {
                self.ready_seen = true;
            }
        }
    }
}
