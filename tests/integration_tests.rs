//! Integration tests for Ghostwire
//!
//! Relay scenarios run a real server on an ephemeral port with real TCP
//! clients. Image scenarios go through PNG files on disk.

use std::time::Duration;

use image::{DynamicImage, ImageBuffer, Rgb};

use ghostwire::crypto::{self, Secret};
use ghostwire::relay::{
    request_roster, send_once, HandshakePolicy, RelayClient, RelayConfig, RelayHandle,
    RelayServer,
};
use ghostwire::stego::{HiddenMessage, ImageStego, StegoError};
use ghostwire::store::RosterStore;

fn room_secret() -> Secret {
    Secret::from_fragments("k1", "k2", "k3")
}

struct TestRelay {
    config: RelayConfig,
    handle: RelayHandle,
    task: tokio::task::JoinHandle<()>,
}

impl TestRelay {
    async fn start(config: RelayConfig) -> Self {
        let server = RelayServer::bind(config.clone().with_port(0), room_secret())
            .await
            .unwrap();
        let port = server.local_addr().unwrap().port();
        let handle = server.handle();
        let task = tokio::spawn(async move { server.run().await.unwrap() });

        Self {
            config: config.with_port(port),
            handle,
            task,
        }
    }

    async fn join(&self, name: &str) -> RelayClient {
        let before = self.handle.connected().await.len();
        let client = RelayClient::connect(&self.config, room_secret(), name)
            .await
            .unwrap();
        self.wait_connected(before + 1).await;
        client
    }

    async fn wait_connected(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.handle.connected().await.len() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    async fn stop(self) {
        self.handle.shutdown();
        self.task.await.unwrap();
    }
}

async fn next(client: &mut RelayClient) -> String {
    tokio::time::timeout(Duration::from_secs(5), client.recv())
        .await
        .expect("timed out waiting for a message")
        .unwrap()
        .expect("connection closed")
}

/// Nothing arrives within a short window.
async fn assert_silent(client: &mut RelayClient) {
    let result = tokio::time::timeout(Duration::from_millis(200), client.recv()).await;
    assert!(result.is_err(), "unexpected message: {:?}", result);
}

fn create_test_image(width: u32, height: u32) -> DynamicImage {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([
            ((x * 13) % 256) as u8,
            ((y * 7) % 256) as u8,
            (((x ^ y) * 5) % 256) as u8,
        ])
    });
    DynamicImage::ImageRgb8(img)
}

/// Alice's broadcast reaches Bob and never echoes back to Alice
#[tokio::test]
async fn test_broadcast_reaches_others_only() {
    let relay = TestRelay::start(RelayConfig::default()).await;

    let mut alice = relay.join("alice").await;
    let mut bob = relay.join("bob").await;
    assert_eq!(next(&mut alice).await, "[SYSTEM] bob joined the room");

    alice.send("hi").await.unwrap();
    assert_eq!(next(&mut bob).await, "[alice]: hi");
    assert_silent(&mut alice).await;

    relay.stop().await;
}

/// Directed messages reach only the named user, with acks to the sender
#[tokio::test]
async fn test_directed_delivery() {
    let relay = TestRelay::start(RelayConfig::default()).await;

    let mut alice = relay.join("alice").await;
    let mut bob = relay.join("bob").await;
    let mut carol = relay.join("carol").await;
    assert_eq!(next(&mut alice).await, "[SYSTEM] bob joined the room");
    assert_eq!(next(&mut alice).await, "[SYSTEM] carol joined the room");
    assert_eq!(next(&mut bob).await, "[SYSTEM] carol joined the room");

    alice.send_to("bob", "the key is under the mat").await.unwrap();
    assert_eq!(next(&mut bob).await, "[PRIVATE from alice]: the key is under the mat");
    assert_eq!(next(&mut alice).await, "[SYSTEM] Private message sent to bob");
    assert_silent(&mut carol).await;

    alice.send_to("mallory", "hello?").await.unwrap();
    assert_eq!(alice.recv_ack().await.unwrap(), "[SYSTEM] User mallory not found");
    assert_silent(&mut bob).await;
    assert_silent(&mut carol).await;

    relay.stop().await;
}

/// Duplicate usernames all receive a directed message
#[tokio::test]
async fn test_directed_delivery_to_duplicate_names() {
    let relay = TestRelay::start(RelayConfig::default()).await;

    let mut alice = relay.join("alice").await;
    let mut bob1 = relay.join("bob").await;
    let mut bob2 = relay.join("bob").await;
    assert_eq!(next(&mut bob1).await, "[SYSTEM] bob joined the room");

    alice.send_to("bob", "both of you").await.unwrap();
    assert_eq!(next(&mut bob1).await, "[PRIVATE from alice]: both of you");
    assert_eq!(next(&mut bob2).await, "[PRIVATE from alice]: both of you");
    assert_eq!(alice.recv_ack().await.unwrap(), "[SYSTEM] Private message sent to bob");

    relay.stop().await;
}

/// A vanished client is announced exactly once
#[tokio::test]
async fn test_left_notice_sent_once() {
    let relay = TestRelay::start(RelayConfig::default()).await;

    let mut alice = relay.join("alice").await;
    let bob = relay.join("bob").await;
    let mut carol = relay.join("carol").await;
    assert_eq!(next(&mut alice).await, "[SYSTEM] bob joined the room");
    assert_eq!(next(&mut alice).await, "[SYSTEM] carol joined the room");

    drop(bob);
    assert_eq!(next(&mut alice).await, "[SYSTEM] bob left the room");
    assert_eq!(next(&mut carol).await, "[SYSTEM] bob left the room");

    alice.send("still here?").await.unwrap();
    assert_eq!(next(&mut carol).await, "[alice]: still here?");
    assert_silent(&mut alice).await;
    assert_eq!(relay.handle.connected().await, vec!["alice", "carol"]);

    relay.stop().await;
}

/// Frames sealed with another secret are dropped; the session survives
#[tokio::test]
async fn test_wrong_key_frames_are_skipped() {
    let relay = TestRelay::start(RelayConfig::default()).await;

    let mut alice = relay.join("alice").await;
    let mut eve = RelayClient::connect(
        &relay.config,
        Secret::from_fragments("not", "the", "key"),
        "eve",
    )
    .await
    .unwrap();
    relay.wait_connected(2).await;
    assert_eq!(next(&mut alice).await, "[SYSTEM] eve joined the room");

    eve.send("can you read this").await.unwrap();
    let mut bob = relay.join("bob").await;
    assert_eq!(next(&mut alice).await, "[SYSTEM] bob joined the room");
    bob.send("hello").await.unwrap();
    assert_eq!(next(&mut alice).await, "[bob]: hello");
    assert_eq!(relay.handle.connected().await.len(), 3);

    relay.stop().await;
}

/// The roster probe reports connected and known users without joining
#[tokio::test]
async fn test_roster_request() {
    let relay = TestRelay::start(RelayConfig::default()).await;
    relay.handle.create_user("dave").await;

    let _alice = relay.join("alice").await;
    let _bob = relay.join("bob").await;

    let roster = request_roster(&relay.config, &room_secret()).await.unwrap();
    assert_eq!(roster, "Connected: alice, bob | Created: dave, alice, bob");
    assert_eq!(relay.handle.connected().await.len(), 2);

    relay.stop().await;
}

/// Custom sentinels replace the defaults
#[tokio::test]
async fn test_custom_roster_sentinel() {
    let config = RelayConfig {
        roster_sentinels: vec!["WHO".to_string()],
        ..RelayConfig::default()
    };
    let relay = TestRelay::start(config).await;

    let roster = request_roster(&relay.config, &room_secret()).await.unwrap();
    assert_eq!(roster, "Connected:  | Created: ");

    // LIST_CMD is an ordinary name on this relay.
    let _lister = relay.join("LIST_CMD").await;
    assert_eq!(relay.handle.known_users().await, vec!["LIST_CMD"]);

    relay.stop().await;
}

/// Shutdown announces termination to every member, with no left notices
#[tokio::test]
async fn test_shutdown_notice() {
    let relay = TestRelay::start(RelayConfig::default()).await;
    let port = relay.config.port;

    let mut alice = relay.join("alice").await;
    let mut bob = relay.join("bob").await;
    assert_eq!(next(&mut alice).await, "[SYSTEM] bob joined the room");

    relay.stop().await;

    let notice = format!("[SYSTEM]: The room port {} has been terminated", port);
    assert_eq!(next(&mut alice).await, notice);
    assert_eq!(next(&mut bob).await, notice);
    assert!(alice.recv().await.unwrap().is_none());
    assert!(bob.recv().await.unwrap().is_none());
}

/// Lenient relays register clients that skip the handshake
#[tokio::test]
async fn test_lenient_handshake() {
    let config = RelayConfig::default().with_handshake_policy(HandshakePolicy::Lenient);
    let relay = TestRelay::start(config).await;
    let mut alice = relay.join("alice").await;

    let mut raw = ghostwire::relay::transport::Connection::connect(relay.config.address(), 1024)
        .await
        .unwrap();
    let envelope = crypto::encrypt(&room_secret(), b"first message is lost").to_string();
    raw.write_frame(envelope.as_bytes()).await.unwrap();

    let joined = next(&mut alice).await;
    assert!(joined.starts_with("[SYSTEM] user_"));

    let envelope = crypto::encrypt(&room_secret(), b"second gets through").to_string();
    raw.write_frame(envelope.as_bytes()).await.unwrap();
    let line = next(&mut alice).await;
    assert!(line.starts_with("[user_"));
    assert!(line.ends_with("]: second gets through"));

    relay.stop().await;
}

/// One-shot send as used by the `send` command
#[tokio::test]
async fn test_one_shot_send() {
    let relay = TestRelay::start(RelayConfig::default()).await;
    let mut bob = relay.join("bob").await;

    let ack = send_once(&relay.config, room_secret(), "alice", "@bob ping", None)
        .await
        .unwrap();
    assert!(ack.is_none());

    assert_eq!(next(&mut bob).await, "[SYSTEM] alice joined the room");
    assert_eq!(next(&mut bob).await, "[PRIVATE from alice]: ping");
    assert_eq!(next(&mut bob).await, "[SYSTEM] alice left the room");

    relay.stop().await;
}

/// The roster survives a restart through the store
#[tokio::test]
async fn test_roster_persists_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = RosterStore::new(dir.path().join("roster.toml"));

    let server = RelayServer::bind(RelayConfig::default().with_port(0), room_secret())
        .await
        .unwrap()
        .with_roster_store(store.clone())
        .await
        .unwrap();
    let config = RelayConfig::default().with_port(server.local_addr().unwrap().port());
    let handle = server.handle();
    let task = tokio::spawn(server.run());

    send_once(&config, room_secret(), "alice", "hello", None)
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while handle.known_users().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    handle.shutdown();
    task.await.unwrap().unwrap();

    let server = RelayServer::bind(RelayConfig::default().with_port(0), room_secret())
        .await
        .unwrap()
        .with_roster_store(store)
        .await
        .unwrap();
    assert_eq!(server.handle().known_users().await, vec!["alice"]);
}

/// "secret" fits in a 10x10 image but not in 3x3
#[test]
fn test_stego_capacity_scenario() {
    let small = ImageStego::from_image(create_test_image(3, 3));
    assert!(matches!(
        small.embed(b"secret", None),
        Err(StegoError::Capacity { .. })
    ));

    let fits = ImageStego::from_image(create_test_image(10, 10));
    let hidden = ImageStego::from_image(fits.embed(b"secret", None).unwrap());
    assert_eq!(hidden.extract(None).unwrap().as_bytes(), b"secret");
}

/// Encrypted message through a PNG file on disk
#[test]
fn test_stego_encrypted_png_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cover.png");
    let secret = room_secret();

    let cover = ImageStego::from_image(create_test_image(120, 80));
    let hidden = ImageStego::from_image(cover.embed("héllo wörld".as_bytes(), Some(&secret)).unwrap());
    hidden.save(&path).unwrap();

    let reloaded = ImageStego::from_file(&path).unwrap();
    assert_eq!(
        reloaded.extract(Some(&secret)).unwrap(),
        HiddenMessage::Decrypted("héllo wörld".as_bytes().to_vec())
    );

    let sealed = reloaded.extract(None).unwrap();
    assert!(sealed.is_sealed());
    assert!(sealed.to_string_lossy().starts_with("ENCRYPTED:"));
}

/// Relay frames and image payloads share one envelope format
#[test]
fn test_relay_envelope_opens_image_payload() {
    let secret = room_secret();
    let envelope = crypto::encrypt(&secret, b"same secret").to_string();

    let cover = ImageStego::from_image(create_test_image(100, 100));
    let hidden = ImageStego::from_image(cover.embed(envelope.as_bytes(), None).unwrap());
    let recovered = hidden.extract(None).unwrap().to_string_lossy();

    assert_eq!(crypto::decrypt(&secret, &recovered).unwrap(), b"same secret");
}
