//! Integration tests for lobby advertisement and discovery.
//!
//! A real [`PresenceAdvertiser`] sends to a real [`LobbyScanner`] over
//! loopback.  The tests verify:
//!
//! - A lobby is discovered within two advertisement intervals, with the
//!   advertiser's address and a measured latency.
//! - Repeated advertisements from one host collapse into one catalog entry.
//! - Two lobbies from two hosts are listed separately.
//! - Advertising stops for good once a guest attaches.

mod common;

use std::time::Duration;

use lanlobby_core::LobbyName;
use lanlobby_peer::application::{ChatOrchestrator, LobbyBrowser};
use lanlobby_peer::infrastructure::network::{connect_to, LobbyScanner, PresenceAdvertiser};
use tokio::net::UdpSocket;

use common::{advertiser_to, scanner_config, session_config, within, INTERVAL};

fn name(s: &str) -> LobbyName {
    LobbyName::new(s).unwrap()
}

#[tokio::test]
async fn test_lobby_is_discovered_within_two_intervals() {
    // Arrange
    let mut scan = LobbyScanner::new(scanner_config()).start().await.unwrap();
    let mut advertiser =
        PresenceAdvertiser::new(name("Alibaba-Lobby"), advertiser_to(scan.local_addr()));

    // Act
    advertiser.start().await.unwrap();
    let discovered = tokio::time::timeout(INTERVAL * 2, scan.next())
        .await
        .expect("lobby not discovered within two intervals")
        .unwrap();

    // Assert
    assert_eq!(discovered.name, "Alibaba-Lobby");
    assert_eq!(discovered.address.ip(), common::loopback());

    // The probe is answered by the advertiser's own socket.
    let measured = within(scan.next()).await.unwrap();
    assert_eq!(measured.name, "Alibaba-Lobby");
    assert!(measured.latency.is_some());

    advertiser.stop().await;
    let catalog = scan.stop().await;
    assert_eq!(catalog.len(), 1);
}

#[tokio::test]
async fn test_repeated_advertisements_yield_one_entry() {
    // Arrange
    let scan = LobbyScanner::new(scanner_config()).start().await.unwrap();
    let mut advertiser = PresenceAdvertiser::new(name("den"), advertiser_to(scan.local_addr()));

    // Act: let roughly five advertisements arrive
    advertiser.start().await.unwrap();
    tokio::time::sleep(INTERVAL * 5).await;
    advertiser.stop().await;
    let catalog = scan.stop().await;

    // Assert
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog[0].name, "den");
}

#[tokio::test]
async fn test_two_hosts_are_listed_in_first_seen_order() {
    // Arrange
    let mut browser = LobbyBrowser::new(scanner_config());
    browser.start_scan().await.unwrap();
    let target = browser.scan_addr().unwrap();
    let mut first = PresenceAdvertiser::new(name("den"), advertiser_to(target));
    let mut second = PresenceAdvertiser::new(name("attic"), advertiser_to(target));

    // Act
    first.start().await.unwrap();
    within(browser.next_update()).await.unwrap();
    second.start().await.unwrap();
    while browser.state().lobbies.len() < 2 {
        within(browser.next_update()).await.unwrap();
    }
    first.stop().await;
    second.stop().await;
    browser.stop_scan().await;

    // Assert
    let lobbies = &browser.state().lobbies;
    let names: Vec<_> = lobbies.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["den", "attic"]);
    assert_ne!(lobbies[0].address, lobbies[1].address);
    assert!(!browser.state().is_scanning);
}

#[tokio::test]
async fn test_selection_survives_refresh_and_is_handed_out() {
    // Arrange
    let mut browser = LobbyBrowser::new(scanner_config());
    browser.start_scan().await.unwrap();
    let mut advertiser =
        PresenceAdvertiser::new(name("Alibaba-Lobby"), advertiser_to(browser.scan_addr().unwrap()));
    advertiser.start().await.unwrap();
    within(browser.next_update()).await.unwrap();

    // Act: select, then let the latency measurement refresh the list
    let chosen = browser.select_by_name("Alibaba-Lobby").cloned().unwrap();
    within(browser.next_update()).await.unwrap();
    advertiser.stop().await;
    let selected = browser.finish().await.unwrap();

    // Assert
    assert_eq!(selected.name, chosen.name);
    assert_eq!(selected.address, chosen.address);
    assert!(selected.latency.is_some());
}

#[tokio::test]
async fn test_advertising_stops_after_guest_attaches() {
    // Arrange: a raw socket stands in for the scanner so every datagram is visible
    let watcher = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let host = ChatOrchestrator::host(
        name("Alibaba-Lobby"),
        &advertiser_to(watcher.local_addr().unwrap()),
        &session_config(0),
    )
    .await
    .unwrap();
    let mut buf = [0u8; 512];
    let (len, _) = within(watcher.recv_from(&mut buf)).await.unwrap();
    assert_eq!(&buf[..len], b"Alibaba-Lobby");

    // Act
    let guest = connect_to(host.session_addr().unwrap(), Duration::from_secs(2))
        .await
        .unwrap();
    within(host.wait_for(|s| s.is_attached)).await.unwrap();
    // Drain anything sent before the attach became visible.
    while watcher.try_recv_from(&mut buf).is_ok() {}

    // Assert: silence for several intervals
    let late = tokio::time::timeout(INTERVAL * 4, watcher.recv_from(&mut buf)).await;
    assert!(late.is_err(), "advertisement received after a guest attached");
    assert!(!host.state().is_looking_for_client);

    drop(guest);
    host.shutdown().await;
}
