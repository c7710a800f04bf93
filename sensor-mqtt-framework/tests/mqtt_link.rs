//! Tests of the rumqttc-backed link against a minimal in-process broker
//! speaking raw MQTT 3.1.1.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::Instant;

use sensor_mqtt_framework::{BridgeError, ConnectionState, MqttConfig, MqttLink, Publisher};

const CONNECT: u8 = 1;
const PUBLISH: u8 = 3;
const PINGREQ: u8 = 12;
const DISCONNECT: u8 = 14;

/// How the broker answers after reading the CONNECT packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Accept,
    /// Accept the connection but never send a PUBACK.
    WithholdAcks,
    /// Answer CONNACK with this return code and close.
    Refuse(u8),
    /// Send CONNACK, then close the socket.
    HangUp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Received {
    Publish {
        topic: String,
        payload: Vec<u8>,
        retain: bool,
    },
    Disconnect,
}

struct FakeBroker {
    config: MqttConfig,
    received: mpsc::UnboundedReceiver<Received>,
}

impl FakeBroker {
    async fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, received) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let _ = serve(&mut stream, behavior, tx).await;
            }
        });

        let mut config = MqttConfig::new("127.0.0.1");
        config.port = Some(port);
        config.disable_tls = true;
        config.connect_timeout_secs = 2;
        config.publish_timeout_secs = 1;

        Self { config, received }
    }

    fn publisher(&self) -> Publisher<MqttLink> {
        let link = MqttLink::from_config(&self.config).unwrap();
        Publisher::with_config(link, &self.config)
    }

    async fn next(&mut self) -> Option<Received> {
        tokio::time::timeout(Duration::from_secs(5), self.received.recv())
            .await
            .ok()
            .flatten()
    }
}

/// Read one control packet: the fixed header byte and the body.
async fn read_packet(stream: &mut TcpStream) -> std::io::Result<(u8, Vec<u8>)> {
    let header = stream.read_u8().await?;

    let mut length = 0usize;
    let mut shift = 0;
    loop {
        let byte = stream.read_u8().await?;
        length |= usize::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }

    let mut body = vec![0; length];
    stream.read_exact(&mut body).await?;
    Ok((header, body))
}

async fn serve(
    stream: &mut TcpStream,
    behavior: Behavior,
    tx: mpsc::UnboundedSender<Received>,
) -> std::io::Result<()> {
    let (header, _) = read_packet(stream).await?;
    if header >> 4 != CONNECT {
        return Ok(());
    }

    let code = match behavior {
        Behavior::Refuse(code) => code,
        _ => 0,
    };
    stream.write_all(&[0x20, 0x02, 0x00, code]).await?;
    if matches!(behavior, Behavior::Refuse(_) | Behavior::HangUp) {
        return Ok(());
    }

    loop {
        let (header, body) = read_packet(stream).await?;
        match header >> 4 {
            PUBLISH => {
                let qos = (header >> 1) & 0x03;
                let topic_len = usize::from(u16::from_be_bytes([body[0], body[1]]));
                let topic = String::from_utf8_lossy(&body[2..2 + topic_len]).into_owned();
                let mut rest = &body[2 + topic_len..];

                if qos > 0 {
                    let pkid = [rest[0], rest[1]];
                    rest = &rest[2..];
                    if behavior == Behavior::Accept {
                        stream.write_all(&[0x40, 0x02, pkid[0], pkid[1]]).await?;
                    }
                }

                let _ = tx.send(Received::Publish {
                    topic,
                    payload: rest.to_vec(),
                    retain: header & 0x01 != 0,
                });
            }
            PINGREQ => stream.write_all(&[0xd0, 0x00]).await?,
            DISCONNECT => {
                let _ = tx.send(Received::Disconnect);
                return Ok(());
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn test_publish_is_acknowledged() {
    let mut broker = FakeBroker::start(Behavior::Accept).await;
    let mut publisher = broker.publisher();

    publisher.connect().await.unwrap();
    assert_eq!(publisher.state(), ConnectionState::Connected);

    publisher
        .publish("wireless-sensor/FT017TH/temperature-degrees-celsius", b"21.5", false)
        .await
        .unwrap();
    publisher
        .publish("homeassistant/sensor/FT017TH/x/config", b"{}", true)
        .await
        .unwrap();
    publisher.disconnect().await;

    assert_eq!(
        broker.next().await,
        Some(Received::Publish {
            topic: "wireless-sensor/FT017TH/temperature-degrees-celsius".to_string(),
            payload: b"21.5".to_vec(),
            retain: false,
        })
    );
    assert_eq!(
        broker.next().await,
        Some(Received::Publish {
            topic: "homeassistant/sensor/FT017TH/x/config".to_string(),
            payload: b"{}".to_vec(),
            retain: true,
        })
    );
    assert_eq!(broker.next().await, Some(Received::Disconnect));
    assert_eq!(publisher.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_missing_ack_times_out() {
    let mut broker = FakeBroker::start(Behavior::WithholdAcks).await;
    let mut publisher = broker.publisher();
    publisher.connect().await.unwrap();

    let started = Instant::now();
    let result = publisher
        .publish("wireless-sensor/FT017TH/relative-humidity-percent", b"45.2", false)
        .await;

    assert!(matches!(result, Err(BridgeError::PublishTimeout { .. })));
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(publisher.state(), ConnectionState::Reconnecting);

    // the broker saw the message even though it never acknowledged it
    assert!(matches!(broker.next().await, Some(Received::Publish { .. })));
}

#[tokio::test]
async fn test_not_authorized_is_fatal() {
    let broker = FakeBroker::start(Behavior::Refuse(5)).await;
    let mut publisher = broker.publisher();

    let err = publisher.connect().await.unwrap_err();
    assert!(matches!(err, BridgeError::Rejected(_)));
    assert!(err.is_fatal());
    assert_eq!(publisher.state(), ConnectionState::Reconnecting);
}

#[tokio::test]
async fn test_server_unavailable_is_retryable() {
    let broker = FakeBroker::start(Behavior::Refuse(3)).await;
    let mut publisher = broker.publisher();

    let err = publisher.connect().await.unwrap_err();
    assert!(matches!(err, BridgeError::Connect(_)));
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn test_connection_refused_is_retryable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut config = MqttConfig::new("127.0.0.1");
    config.port = Some(port);
    config.disable_tls = true;
    let mut publisher = Publisher::with_config(MqttLink::from_config(&config).unwrap(), &config);

    let err = publisher.connect().await.unwrap_err();
    assert!(!err.is_fatal());
    assert_eq!(publisher.state(), ConnectionState::Reconnecting);
}

#[tokio::test]
async fn test_closed_socket_is_noticed() {
    let broker = FakeBroker::start(Behavior::HangUp).await;
    let mut publisher = broker.publisher();
    publisher.connect().await.unwrap();

    let err = tokio::time::timeout(Duration::from_secs(5), publisher.wait_for_disconnect())
        .await
        .unwrap();

    assert!(matches!(err, BridgeError::ConnectionLost(_)));
    assert_eq!(publisher.state(), ConnectionState::Reconnecting);
}
