//! Broker links: the transport underneath the [`Publisher`](crate::Publisher).

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS, Transport,
};

use crate::MqttConfig;
use crate::error::{BridgeError, Result};

/// Capacity of the request channel between client and event loop.
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// A connection to a message broker.
///
/// Implementations perform a single attempt per call and never retry on
/// their own; deadlines and reconnect policy belong to the caller.
#[allow(async_fn_in_trait)]
pub trait BrokerLink {
    /// Open a fresh connection, resolving once the broker accepted it.
    async fn connect(&mut self) -> Result<()>;

    /// Publish `payload` and wait for the broker acknowledgement.
    async fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<()>;

    /// Service keep-alive traffic until the connection is lost.
    ///
    /// Never resolves while the connection is healthy.
    async fn run_until_lost(&mut self) -> BridgeError;

    /// Close the connection gracefully.
    async fn disconnect(&mut self) -> Result<()>;

    /// Drop the current connection without any handshake.
    fn abort(&mut self);
}

/// [`BrokerLink`] over MQTT 3.1.1 using `rumqttc`.
///
/// Publishes use QoS 1 so every message is acknowledged by a PUBACK. The
/// event loop is driven only from within these calls; nothing runs in the
/// background.
pub struct MqttLink {
    options: MqttOptions,
    session: Option<(AsyncClient, EventLoop)>,
}

impl std::fmt::Debug for MqttLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (host, port) = self.options.broker_address();
        f.debug_struct("MqttLink")
            .field("broker", &format!("{}:{}", host, port))
            .field("connected", &self.session.is_some())
            .finish()
    }
}

impl MqttLink {
    /// Create a link from already-built client options.
    pub fn new(options: MqttOptions) -> Self {
        Self {
            options,
            session: None,
        }
    }

    /// Build client options from configuration, reading the password file
    /// and CA certificate if configured.
    pub fn from_config(config: &MqttConfig) -> Result<Self> {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port());
        options.set_keep_alive(config.keep_alive());
        options.set_clean_session(true);

        if let Some(username) = &config.username {
            let password = config.resolve_password()?.unwrap_or_default();
            options.set_credentials(username, password);
        }

        options.set_transport(build_transport(config)?);

        Ok(Self::new(options))
    }

    /// Poll a fresh event loop until the broker answers the CONNECT.
    async fn handshake(eventloop: &mut EventLoop) -> Result<()> {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    return match ack.code {
                        ConnectReturnCode::Success => Ok(()),
                        code => Err(refusal(code)),
                    };
                }
                Ok(_) => {}
                Err(ConnectionError::ConnectionRefused(code)) => return Err(refusal(code)),
                Err(e) => return Err(BridgeError::Connect(e.to_string())),
            }
        }
    }
}

impl BrokerLink for MqttLink {
    async fn connect(&mut self) -> Result<()> {
        self.abort();

        let (client, mut eventloop) =
            AsyncClient::new(self.options.clone(), REQUEST_CHANNEL_CAPACITY);
        Self::handshake(&mut eventloop).await?;

        let (host, port) = self.options.broker_address();
        tracing::debug!("connected to MQTT broker {}:{}", host, port);

        self.session = Some((client, eventloop));
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<()> {
        let Some((client, eventloop)) = self.session.as_mut() else {
            return Err(BridgeError::NotConnected);
        };

        client
            .publish(topic, QoS::AtLeastOnce, retain, payload.to_vec())
            .await
            .map_err(|e| BridgeError::publish(topic, e))?;

        let mut pkid = None;
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Publish(id))) if pkid.is_none() => pkid = Some(id),
                Ok(Event::Incoming(Packet::PubAck(ack))) if Some(ack.pkid) == pkid => {
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => {
                    self.session = None;
                    return Err(BridgeError::ConnectionLost(e.to_string()));
                }
            }
        }
    }

    async fn run_until_lost(&mut self) -> BridgeError {
        let Some((_, eventloop)) = self.session.as_mut() else {
            return std::future::pending().await;
        };

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    self.session = None;
                    return BridgeError::ConnectionLost("broker sent DISCONNECT".to_string());
                }
                Ok(event) => tracing::trace!(?event, "MQTT event"),
                Err(e) => {
                    self.session = None;
                    return BridgeError::ConnectionLost(e.to_string());
                }
            }
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        let Some((client, mut eventloop)) = self.session.take() else {
            return Ok(());
        };

        client
            .disconnect()
            .await
            .map_err(|e| BridgeError::Connect(e.to_string()))?;

        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => return Ok(()),
                Ok(_) => {}
                Err(e) => return Err(BridgeError::ConnectionLost(e.to_string())),
            }
        }
    }

    fn abort(&mut self) {
        self.session = None;
    }
}

fn refusal(code: ConnectReturnCode) -> BridgeError {
    match code {
        ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized => {
            BridgeError::Rejected(format!("{:?}", code))
        }
        code => BridgeError::Connect(format!("connection refused: {:?}", code)),
    }
}

fn build_transport(config: &MqttConfig) -> Result<Transport> {
    if config.disable_tls {
        return Ok(Transport::tcp());
    }

    match &config.ca_file {
        Some(path) => {
            let ca = std::fs::read(path).map_err(|e| {
                BridgeError::with_context(format!("Failed to read CA file {}", path.display()), e)
            })?;
            Ok(Transport::tls(ca, None, None))
        }
        None => Ok(Transport::tls_with_default_config()),
    }
}
