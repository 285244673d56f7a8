//! Client address resolution behind reverse proxies.

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;
use ipnet::IpNet;

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";

/// Resolves the originating client address for a request.
///
/// Forwarding headers are honoured only when the direct peer is a trusted
/// proxy. `X-Forwarded-For` is walked from the right, skipping trusted hops,
/// so a client cannot spoof its address by prepending entries.
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trusted: &[IpNet]) -> Option<String> {
    let peer_ip = peer.map(|address| address.ip());
    let peer_is_trusted = peer_ip.is_some_and(|ip| is_trusted(ip, trusted));

    if peer_is_trusted {
        if let Some(forwarded) = forwarded_client(headers, trusted) {
            return Some(forwarded.to_string());
        }

        if let Some(real_ip) = header_ip(headers, REAL_IP) {
            return Some(real_ip.to_string());
        }
    }

    peer_ip.map(|ip| ip.to_string())
}

fn forwarded_client(headers: &HeaderMap, trusted: &[IpNet]) -> Option<IpAddr> {
    let hops: Vec<IpAddr> = headers
        .get_all(FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .map(|hop| hop.parse::<IpAddr>().ok())
        .collect::<Option<Vec<_>>>()?;

    hops.iter()
        .rev()
        .find(|hop| !is_trusted(**hop, trusted))
        .or_else(|| hops.first())
        .copied()
}

fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<IpAddr>().ok())
}

fn is_trusted(ip: IpAddr, trusted: &[IpNet]) -> bool {
    trusted.iter().any(|network| network.contains(&ip))
}
