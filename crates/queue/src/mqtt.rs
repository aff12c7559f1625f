//! MQTT subscriber bridging the broker event loop to a [`MessageHandler`].
//!
//! Each publish is handed to its own task so a slow webhook never stalls
//! polling. The first connection failure is fatal; once connected, event
//! loop errors are logged and polling resumes (rumqttc reconnects on the
//! next poll) after a short delay. Subscriptions are re-issued on every
//! ConnAck because sessions are clean.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::OsRng;
use rand::RngCore;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use relay_core::{RawMessage, RelayConfig};

use crate::consumer::MessageHandler;
use crate::error::QueueError;

const CHANNEL_CAPACITY: usize = 100;
const RECONNECT_DELAY: Duration = Duration::from_secs(3);
const CLIENT_ID_BYTES: usize = 10;

/// Random per-process client identifier (hex of 10 random bytes).
pub fn random_client_id() -> String {
    let mut bytes = [0u8; CLIENT_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Connection parameters derived from [`RelayConfig`].
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    pub qos: QoS,
    pub topics: Vec<String>,
    /// Packet size cap in both directions.
    pub max_packet_size: usize,
    /// How long in-flight messages may run after shutdown is requested.
    pub drain_timeout: Duration,
}

impl MqttSettings {
    pub fn from_config(config: &RelayConfig) -> Result<Self, QueueError> {
        let (host, port) = parse_broker_url(&config.broker)?;
        Ok(Self {
            host: host.to_string(),
            port,
            client_id: random_client_id(),
            keep_alive: config.keep_alive(),
            qos: qos_from_level(config.qos)?,
            topics: config.bindings().into_iter().map(|b| b.topic).collect(),
            max_packet_size: config.max_packet_bytes,
            drain_timeout: config.request_timeout(),
        })
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        options.set_max_packet_size(self.max_packet_size, self.max_packet_size);
        options
    }
}

pub struct MqttSubscriber {
    settings: MqttSettings,
}

impl MqttSubscriber {
    pub fn new(settings: MqttSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &MqttSettings {
        &self.settings
    }

    /// Run until `shutdown` is notified.
    pub async fn run(
        &self,
        handler: Arc<dyn MessageHandler>,
        shutdown: Arc<Notify>,
    ) -> Result<(), QueueError> {
        let (client, mut eventloop) = AsyncClient::new(self.settings.options(), CHANNEL_CAPACITY);
        info!(
            broker = %format!("{}:{}", self.settings.host, self.settings.port),
            client_id = %self.settings.client_id,
            "connecting to MQTT broker"
        );

        let mut in_flight = JoinSet::new();
        let result = self
            .event_loop(&client, &mut eventloop, &handler, &mut in_flight, &shutdown)
            .await;

        let _ = client.try_disconnect();
        self.drain(&mut in_flight).await;
        result
    }

    async fn event_loop(
        &self,
        client: &AsyncClient,
        eventloop: &mut EventLoop,
        handler: &Arc<dyn MessageHandler>,
        in_flight: &mut JoinSet<()>,
        shutdown: &Notify,
    ) -> Result<(), QueueError> {
        let shutdown_signal = shutdown.notified();
        tokio::pin!(shutdown_signal);
        let mut connected_once = false;

        loop {
            while in_flight.try_join_next().is_some() {}

            tokio::select! {
                _ = &mut shutdown_signal => {
                    debug!("shutdown signal received");
                    return Ok(());
                }
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let message = RawMessage::new(publish.topic.clone(), publish.payload.to_vec());
                        let handler = Arc::clone(handler);
                        in_flight.spawn(deliver(handler, message));
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        connected_once = true;
                        info!("connected to MQTT broker");
                        self.subscribe_all(client)?;
                    }
                    Ok(Event::Incoming(Packet::SubAck(ack))) => {
                        debug!(pkid = ack.pkid, "subscription acknowledged");
                    }
                    Ok(_) => {}
                    Err(e) if !connected_once => {
                        error!(error = %e, "failed to connect to MQTT broker");
                        return Err(e.into());
                    }
                    Err(e) => {
                        warn!(error = %e, "MQTT connection lost, reconnecting");
                        tokio::select! {
                            _ = &mut shutdown_signal => return Ok(()),
                            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                        }
                    }
                }
            }
        }
    }

    fn subscribe_all(&self, client: &AsyncClient) -> Result<(), QueueError> {
        for topic in &self.settings.topics {
            client.try_subscribe(topic.as_str(), self.settings.qos)?;
            info!(topic = %topic, qos = ?self.settings.qos, "subscribed to topic");
        }
        Ok(())
    }

    async fn drain(&self, in_flight: &mut JoinSet<()>) {
        if in_flight.is_empty() {
            return;
        }
        let pending = in_flight.len();
        let drained = tokio::time::timeout(self.settings.drain_timeout, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(pending, "in-flight messages abandoned at shutdown");
            in_flight.abort_all();
        }
    }
}

/// Hand one message to the handler inside its own root span.
async fn deliver(handler: Arc<dyn MessageHandler>, message: RawMessage) {
    let span = info_span!(
        parent: Span::none(),
        "relay_message",
        topic = %message.topic,
        payload_size = message.payload.len(),
    );
    handler.handle(message).instrument(span).await
}

fn qos_from_level(level: u8) -> Result<QoS, QueueError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(QueueError::Config(format!("invalid qos level {other}"))),
    }
}

/// Parse broker URL in format tcp://host:port, mqtt://host:port, host:port or host.
pub fn parse_broker_url(url: &str) -> Result<(&str, u16), QueueError> {
    let addr = url
        .trim()
        .trim_start_matches("tcp://")
        .trim_start_matches("mqtt://")
        .trim_end_matches('/');

    match addr.rsplit_once(':') {
        None if !addr.is_empty() => Ok((addr, 1883)),
        Some((host, port)) if !host.is_empty() && !host.contains(':') => {
            let port = port
                .parse::<u16>()
                .map_err(|_| QueueError::BrokerAddress(format!("invalid port in '{url}'")))?;
            Ok((host, port))
        }
        _ => Err(QueueError::BrokerAddress(format!("cannot parse '{url}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    #[test]
    fn client_id_is_twenty_hex_chars_and_random() {
        let a = random_client_id();
        let b = random_client_id();
        assert_eq!(a.len(), 20);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_broker_url_with_port() {
        assert_eq!(parse_broker_url("tcp://localhost:1883").unwrap(), ("localhost", 1883));
        assert_eq!(parse_broker_url("mqtt://broker.local:8883").unwrap(), ("broker.local", 8883));
    }

    #[test]
    fn test_parse_broker_url_without_scheme() {
        assert_eq!(parse_broker_url("emqx.example.com:1884").unwrap(), ("emqx.example.com", 1884));
    }

    #[test]
    fn test_parse_broker_url_default_port() {
        assert_eq!(parse_broker_url("tcp://broker.local").unwrap(), ("broker.local", 1883));
        assert_eq!(parse_broker_url("broker.local").unwrap(), ("broker.local", 1883));
    }

    #[test]
    fn test_parse_broker_url_invalid() {
        assert!(parse_broker_url("tcp://host:notaport").is_err());
        assert!(parse_broker_url("tcp://").is_err());
        assert!(parse_broker_url("a:b:1883").is_err());
    }

    #[test]
    fn qos_levels() {
        assert_eq!(qos_from_level(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(qos_from_level(1).unwrap(), QoS::AtLeastOnce);
        assert_eq!(qos_from_level(2).unwrap(), QoS::ExactlyOnce);
        assert!(qos_from_level(3).is_err());
    }

    #[test]
    fn settings_from_config() {
        let config = test_config();
        let settings = MqttSettings::from_config(&config).unwrap();
        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.port, 1884);
        assert_eq!(settings.qos, QoS::AtLeastOnce);
        assert_eq!(settings.topics, vec!["phone/sms".to_string(), "phone/call".to_string()]);
        assert_eq!(settings.keep_alive, Duration::from_secs(30));
        assert_eq!(settings.max_packet_size, 1024 * 1024);
    }

    #[test]
    fn options_carry_packet_size_limit() {
        let mut config = test_config();
        config.max_packet_bytes = 512 * 1024;
        let options = MqttSettings::from_config(&config).unwrap().options();
        assert_eq!(options.max_packet_size(), 512 * 1024);
        assert!(options.clean_session());
    }

    fn test_config() -> RelayConfig {
        RelayConfig {
            broker: "tcp://127.0.0.1:1884".into(),
            topic_sms: Some("phone/sms".into()),
            topic_call: Some("phone/call".into()),
            topics: Vec::new(),
            webhook_url: "http://127.0.0.1:3001".into(),
            recipient: "alice".into(),
            request_timeout_secs: 5,
            keep_alive_secs: 30,
            qos: 1,
            max_packet_bytes: 1024 * 1024,
            log_file: None,
        }
    }

    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn handle(&self, message: RawMessage) {
            self.0.lock().unwrap().push(message.topic);
        }
    }

    #[tokio::test]
    async fn deliver_forwards_to_handler() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        deliver(recorder.clone(), RawMessage::new("phone/sms", b"{}".to_vec())).await;
        assert_eq!(*recorder.0.lock().unwrap(), vec!["phone/sms".to_string()]);
    }

    #[tokio::test]
    async fn unreachable_broker_is_fatal_before_first_connect() {
        let mut settings = MqttSettings::from_config(&test_config()).unwrap();
        // Port 1 on loopback refuses connections.
        settings.port = 1;
        let subscriber = MqttSubscriber::new(settings);
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            subscriber.run(recorder, Arc::new(Notify::new())),
        )
        .await
        .expect("subscriber should fail fast");
        assert!(matches!(result, Err(QueueError::Connection(_))));
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let mut settings = MqttSettings::from_config(&test_config()).unwrap();
        settings.port = 1;
        let subscriber = MqttSubscriber::new(settings);
        let shutdown = Arc::new(Notify::new());
        shutdown.notify_one();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let result = tokio::time::timeout(Duration::from_secs(10), subscriber.run(recorder, shutdown))
            .await
            .expect("subscriber should stop");
        // Either the stored permit or the refused connection ends the loop first.
        assert!(result.is_ok() || matches!(result, Err(QueueError::Connection(_))));
    }

    // ── In-process MQTT 3.1.1 broker stand-in ───────────────────────

    use relay_core::MessageKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use crate::classify::Classifier;

    /// Records the kind of every message that classifies, counts the rest.
    #[derive(Default)]
    struct Classifying {
        kinds: Mutex<Vec<(MessageKind, usize)>>,
        dropped: Mutex<usize>,
    }

    #[async_trait]
    impl MessageHandler for Classifying {
        async fn handle(&self, message: RawMessage) {
            match Classifier::new().classify(&message.topic, &message.payload) {
                Ok(kind) => self.kinds.lock().unwrap().push((kind, message.payload.len())),
                Err(_) => *self.dropped.lock().unwrap() += 1,
            }
        }
    }

    fn remaining_length(mut len: usize, out: &mut Vec<u8>) {
        loop {
            let mut byte = (len % 128) as u8;
            len /= 128;
            if len > 0 {
                byte |= 0x80;
            }
            out.push(byte);
            if len == 0 {
                break;
            }
        }
    }

    fn publish_packet(topic: &str, payload: &[u8]) -> Vec<u8> {
        let mut packet = vec![0x30];
        remaining_length(2 + topic.len() + payload.len(), &mut packet);
        packet.extend_from_slice(&(topic.len() as u16).to_be_bytes());
        packet.extend_from_slice(topic.as_bytes());
        packet.extend_from_slice(payload);
        packet
    }

    /// Read one packet, returning its first header byte and body.
    async fn read_packet(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
        let header = stream.read_u8().await.ok()?;
        let mut len = 0usize;
        let mut shift = 0;
        loop {
            let byte = stream.read_u8().await.ok()?;
            len |= usize::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let mut body = vec![0; len];
        stream.read_exact(&mut body).await.ok()?;
        Some((header, body))
    }

    /// Accept one client, ack its subscriptions, then publish `messages`.
    async fn serve_once(listener: TcpListener, subscriptions: usize, messages: Vec<Vec<u8>>) {
        let (mut stream, _) = listener.accept().await.unwrap();
        let (connect, _) = read_packet(&mut stream).await.unwrap();
        assert_eq!(connect, 0x10);
        stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();

        let mut acked = 0;
        while acked < subscriptions {
            let (header, body) = read_packet(&mut stream).await.unwrap();
            if header == 0x82 {
                stream
                    .write_all(&[0x90, 0x03, body[0], body[1], 0x00])
                    .await
                    .unwrap();
                acked += 1;
            }
        }

        for message in messages {
            stream.write_all(&message).await.unwrap();
        }

        while let Some((header, _)) = read_packet(&mut stream).await {
            match header {
                0xc0 => stream.write_all(&[0xd0, 0x00]).await.unwrap(),
                0xe0 => break,
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn publishes_reach_handler_past_bad_and_oversized_payloads() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Larger than rumqttc's 10 KiB default packet limit.
        let long_sms = format!(
            r#"{{"type":"sms","phoneNumber":"+1555","smsMsg":"{}"}}"#,
            "x".repeat(20 * 1024)
        );
        let messages = vec![
            publish_packet("phone/sms", b"{not json"),
            publish_packet("phone/sms", long_sms.as_bytes()),
            publish_packet("phone/call", br#"{"type":"call","incomingPhoneNumber":"+1"}"#),
        ];
        let broker = tokio::spawn(serve_once(listener, 2, messages));

        let mut settings = MqttSettings::from_config(&test_config()).unwrap();
        settings.port = port;
        let subscriber = Arc::new(MqttSubscriber::new(settings));
        let handler = Arc::new(Classifying::default());
        let shutdown = Arc::new(Notify::new());

        let run = tokio::spawn({
            let subscriber = Arc::clone(&subscriber);
            let handler: Arc<dyn MessageHandler> = handler.clone();
            let shutdown = Arc::clone(&shutdown);
            async move { subscriber.run(handler, shutdown).await }
        });

        tokio::time::timeout(Duration::from_secs(10), async {
            while handler.kinds.lock().unwrap().len() < 2 || *handler.dropped.lock().unwrap() < 1 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("both valid publishes should be delivered");

        let mut kinds = handler.kinds.lock().unwrap().clone();
        kinds.sort_by_key(|(_, len)| *len);
        assert_eq!(kinds[0].0, MessageKind::Call);
        assert_eq!(kinds[1], (MessageKind::Sms, long_sms.len()));
        assert_eq!(*handler.dropped.lock().unwrap(), 1);
        assert!(!run.is_finished());

        shutdown.notify_one();
        let result = tokio::time::timeout(Duration::from_secs(10), run)
            .await
            .expect("subscriber should stop")
            .unwrap();
        assert!(result.is_ok());
        broker.abort();
    }
}
