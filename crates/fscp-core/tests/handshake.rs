//! End-to-end handshake and data-plane tests.
//!
//! Most scenarios run over the in-memory transport for determinism; the
//! certificate scenario exercises real UDP loopback sockets.

use fscp_core::{diagnostics, resolve_addr, Addr, ClientSecurity, Endpoint, Error, NETWORK};
use fscp_transport::MemoryNetwork;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn memory_addr(port: u16) -> SocketAddr {
    format!("10.0.0.1:{port}").parse().unwrap()
}

fn preshared_security(passphrase: &str) -> ClientSecurity {
    let mut security = ClientSecurity::default();
    security.set_preshared_key_from_passphrase(passphrase, b"freelan", 2000);

    security
}

fn memory_endpoint(network: &MemoryNetwork, port: u16, passphrase: &str) -> Endpoint {
    let transport = network.endpoint(memory_addr(port));

    Endpoint::with_transport(Arc::new(transport), preshared_security(passphrase)).unwrap()
}

#[tokio::test]
async fn test_handshake_and_echo_over_memory_network() {
    diagnostics::init_from_env();

    let network = MemoryNetwork::new();
    let alice = memory_endpoint(&network, 5000, "test passphrase");
    let bob = memory_endpoint(&network, 5001, "test passphrase");

    let connection = timeout(
        Duration::from_secs(2),
        alice.connect(Addr::from(memory_addr(5001))),
    )
    .await
    .expect("handshake timed out")
    .unwrap();

    let accepted = timeout(Duration::from_secs(2), bob.accept())
        .await
        .expect("accept timed out")
        .unwrap();

    assert_eq!(accepted.remote_addr().socket_addr(), memory_addr(5000));

    connection.write(b"hello through the tunnel").await.unwrap();
    let received = timeout(Duration::from_secs(2), accepted.read())
        .await
        .expect("read timed out")
        .unwrap();
    assert_eq!(received, b"hello through the tunnel");

    accepted.write(b"and back again").await.unwrap();
    let echoed = timeout(Duration::from_secs(2), connection.read())
        .await
        .expect("read timed out")
        .unwrap();
    assert_eq!(echoed, b"and back again");

    alice.close();
    bob.close();
}

#[tokio::test]
async fn test_first_session_is_number_zero() {
    let network = MemoryNetwork::new();
    let alice = memory_endpoint(&network, 5000, "numbers");
    let bob = memory_endpoint(&network, 5001, "numbers");

    let connection = timeout(
        Duration::from_secs(2),
        alice.connect(Addr::from(memory_addr(5001))),
    )
    .await
    .expect("handshake timed out")
    .unwrap();

    assert_eq!(connection.active_session_number(), Some(0));

    alice.close();
    bob.close();
}

#[tokio::test]
async fn test_rekey_swaps_sessions_on_both_sides() {
    let network = MemoryNetwork::new();
    let alice = memory_endpoint(&network, 5000, "rekey");
    let bob = memory_endpoint(&network, 5001, "rekey");

    let connection = timeout(
        Duration::from_secs(2),
        alice.connect(Addr::from(memory_addr(5001))),
    )
    .await
    .expect("handshake timed out")
    .unwrap();
    let accepted = timeout(Duration::from_secs(2), bob.accept())
        .await
        .expect("accept timed out")
        .unwrap();

    // Data flows on session 0 first.
    connection.write(b"before rekey").await.unwrap();
    assert_eq!(
        timeout(Duration::from_secs(2), accepted.read())
            .await
            .expect("read timed out")
            .unwrap(),
        b"before rekey"
    );

    connection.rekey().await.unwrap();

    // Both sides must atomically swap active <- pending.
    timeout(Duration::from_secs(2), async {
        loop {
            if connection.active_session_number() == Some(1)
                && accepted.active_session_number() == Some(1)
            {
                break;
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("rekey did not complete");

    // The new session moves data in both directions.
    connection.write(b"after rekey").await.unwrap();
    assert_eq!(
        timeout(Duration::from_secs(2), accepted.read())
            .await
            .expect("read timed out")
            .unwrap(),
        b"after rekey"
    );

    accepted.write(b"reverse direction").await.unwrap();
    assert_eq!(
        timeout(Duration::from_secs(2), connection.read())
            .await
            .expect("read timed out")
            .unwrap(),
        b"reverse direction"
    );

    alice.close();
    bob.close();
}

// The full certificate handshake over real loopback UDP sockets. Each
// endpoint auto-generates a self-signed RSA certificate; the peers must
// reach READY within two seconds of the connect call.
#[tokio::test(flavor = "multi_thread")]
async fn test_full_handshake_with_certificates_over_udp() {
    diagnostics::init_from_env();

    let alice_addr = resolve_addr(NETWORK, "127.0.0.1:0").unwrap();
    let bob_addr = resolve_addr(NETWORK, "127.0.0.1:0").unwrap();

    let alice = Endpoint::listen(alice_addr, ClientSecurity::default())
        .await
        .unwrap();
    let bob = Endpoint::listen(bob_addr, ClientSecurity::default())
        .await
        .unwrap();

    let connection = timeout(Duration::from_secs(2), alice.connect(bob.local_addr()))
        .await
        .expect("handshake exceeded two seconds")
        .unwrap();

    let accepted = timeout(Duration::from_secs(2), bob.accept())
        .await
        .expect("accept timed out")
        .unwrap();

    connection.write(b"certified bytes").await.unwrap();
    let received = timeout(Duration::from_secs(2), accepted.read())
        .await
        .expect("read timed out")
        .unwrap();
    assert_eq!(received, b"certified bytes");

    alice.close();
    bob.close();
}

#[tokio::test]
async fn test_connect_to_silent_peer_times_out() {
    let network = MemoryNetwork::new();
    let alice = memory_endpoint(&network, 5000, "alone");

    let result = alice
        .connect_timeout(Addr::from(memory_addr(5009)), Duration::from_millis(300))
        .await;

    assert!(matches!(result, Err(Error::Timeout)));

    alice.close();
}

#[tokio::test]
async fn test_mismatched_passphrases_never_connect() {
    let network = MemoryNetwork::new();
    let alice = memory_endpoint(&network, 5000, "one passphrase");
    let bob = memory_endpoint(&network, 5001, "another passphrase");

    // HELLO and PRESENTATION succeed, but every SESSION_REQUEST fails
    // signature verification and is dropped.
    let result = alice
        .connect_timeout(Addr::from(memory_addr(5001)), Duration::from_millis(500))
        .await;

    assert!(matches!(result, Err(Error::Timeout)));

    alice.close();
    bob.close();
}

#[tokio::test]
async fn test_double_close_is_idempotent() {
    let network = MemoryNetwork::new();
    let alice = memory_endpoint(&network, 5000, "closing");
    let bob = memory_endpoint(&network, 5001, "closing");

    let connection = timeout(
        Duration::from_secs(2),
        alice.connect(Addr::from(memory_addr(5001))),
    )
    .await
    .expect("handshake timed out")
    .unwrap();

    connection.close();
    connection.close();

    timeout(Duration::from_secs(1), connection.closed())
        .await
        .expect("closed signal did not fire");

    assert!(connection.is_closed());
    assert!(matches!(connection.write(b"late").await, Err(Error::Closed)));
    assert!(matches!(connection.read().await, Err(Error::Closed)));

    alice.close();
    bob.close();
}

#[tokio::test]
async fn test_endpoint_close_closes_connections_and_accept() {
    let network = MemoryNetwork::new();
    let alice = memory_endpoint(&network, 5000, "shutdown");
    let bob = memory_endpoint(&network, 5001, "shutdown");

    let connection = timeout(
        Duration::from_secs(2),
        alice.connect(Addr::from(memory_addr(5001))),
    )
    .await
    .expect("handshake timed out")
    .unwrap();

    alice.close();

    timeout(Duration::from_secs(1), connection.closed())
        .await
        .expect("connection did not observe endpoint close");

    assert!(matches!(alice.accept().await, Err(Error::Closed)));

    bob.close();
}

#[tokio::test]
async fn test_reconnect_returns_same_connection() {
    let network = MemoryNetwork::new();
    let alice = memory_endpoint(&network, 5000, "dedup");
    let bob = memory_endpoint(&network, 5001, "dedup");

    let first = timeout(
        Duration::from_secs(2),
        alice.connect(Addr::from(memory_addr(5001))),
    )
    .await
    .expect("handshake timed out")
    .unwrap();

    let second = alice.connect(Addr::from(memory_addr(5001))).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));

    alice.close();
    bob.close();
}
