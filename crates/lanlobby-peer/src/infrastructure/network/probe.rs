//! Latency probes between a scanning guest and an advertising host.
//!
//! The guest sends a 16-byte probe request to the source address of an
//! advertisement, which is the host's advertisement socket.  The host's
//! advertiser loop echoes the token back on that same socket.  The
//! round-trip time of that exchange is the lobby's latency.
//!
//! Using the advertisement socket (rather than the TCP session port) keeps a
//! probe from ever being mistaken for a guest attaching to the lobby.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lanlobby_core::protocol::{decode_probe, encode_probe, ProbeKind, ProbePacket, PROBE_PACKET_SIZE};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::advertiser::AdvertisementSocket;

/// Errors from a single latency measurement.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe socket error: {0}")]
    Io(#[from] io::Error),
    #[error("no probe reply within {0:?}")]
    TimedOut(Duration),
}

/// Token counter for outbound probe requests.
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

fn next_token() -> u64 {
    NEXT_TOKEN.fetch_add(1, Ordering::Relaxed)
}

/// Answers `datagram` if it is a probe request.  Returns `true` when a reply
/// was sent.
///
/// Anything else arriving on the advertisement socket is ignored.
pub async fn answer_probe(
    socket: &dyn AdvertisementSocket,
    datagram: &[u8],
    from: SocketAddr,
) -> bool {
    let request = match decode_probe(datagram) {
        Ok(packet) if packet.kind == ProbeKind::Request => packet,
        Ok(_) => return false,
        Err(e) => {
            debug!("ignoring datagram from {from} on advertisement socket: {e}");
            return false;
        }
    };

    match socket.send_to(&encode_probe(&request.reply_to()), from).await {
        Ok(_) => {
            debug!("answered probe {} from {from}", request.token);
            true
        }
        Err(e) => {
            warn!("failed to answer probe from {from}: {e}");
            false
        }
    }
}

/// Measures the round-trip time to the advertiser at `target`.
///
/// Sends one request from an ephemeral socket on `bind_address` and waits at
/// most `timeout` for the matching reply.  Stray datagrams are discarded.
pub async fn measure_latency(
    target: SocketAddr,
    bind_address: IpAddr,
    timeout: Duration,
) -> Result<Duration, ProbeError> {
    let socket = UdpSocket::bind(SocketAddr::new(bind_address, 0)).await?;
    let token = next_token();
    let started = Instant::now();
    socket
        .send_to(&encode_probe(&ProbePacket::request(token)), target)
        .await?;

    tokio::time::timeout(timeout, await_reply(&socket, target, token, started))
        .await
        .map_err(|_| ProbeError::TimedOut(timeout))?
}

async fn await_reply(
    socket: &UdpSocket,
    target: SocketAddr,
    token: u64,
    started: Instant,
) -> Result<Duration, ProbeError> {
    let mut buf = [0u8; PROBE_PACKET_SIZE * 2];
    loop {
        let (len, from) = socket.recv_from(&mut buf).await?;
        match decode_probe(&buf[..len]) {
            Ok(reply)
                if reply.kind == ProbeKind::Reply
                    && reply.token == token
                    && from.ip() == target.ip() =>
            {
                return Ok(started.elapsed());
            }
            _ => debug!("discarding stray datagram from {from} while probing {target}"),
        }
    }
}
