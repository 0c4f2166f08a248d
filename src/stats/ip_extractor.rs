//! Client address extraction for hit recording
//!
//! Proxy headers are only honoured in `standard` mode. When a list of
//! trusted proxy networks is configured, the `X-Forwarded-For` chain is
//! walked right to left and the first hop outside those networks wins.

use axum::http::HeaderMap;
use std::net::IpAddr;

use crate::config::{ClientIpConfig, TrustedProxyMode};

/// Resolve the address a hit is attributed to
pub fn extract_client_ip(
    headers: &HeaderMap,
    socket_addr: IpAddr,
    config: &ClientIpConfig,
) -> IpAddr {
    match config.trusted_proxy_mode {
        TrustedProxyMode::Standard => {
            if !is_trusted(socket_addr, config) {
                return socket_addr;
            }
            extract_from_forwarded(headers)
                .or_else(|| extract_from_x_forwarded_for(headers, config))
                .unwrap_or(socket_addr)
        }
        TrustedProxyMode::None => socket_addr,
    }
}

/// Peers outside the trusted networks cannot vouch for anyone else.
/// An empty list trusts every peer.
fn is_trusted(addr: IpAddr, config: &ClientIpConfig) -> bool {
    config.trusted_proxies.is_empty()
        || config.trusted_proxies.iter().any(|net| net.contains(&addr))
}

/// `Forwarded: for=192.0.2.60;proto=http, for="[2001:db8::1]:4711"`
fn extract_from_forwarded(headers: &HeaderMap) -> Option<IpAddr> {
    let forwarded = headers.get("forwarded")?.to_str().ok()?;

    forwarded
        .split(',')
        .flat_map(|element| element.split(';'))
        .filter_map(|param| {
            let (key, value) = param.trim().split_once('=')?;
            key.eq_ignore_ascii_case("for").then_some(value)
        })
        .find_map(parse_forwarded_node)
}

fn parse_forwarded_node(value: &str) -> Option<IpAddr> {
    let value = value.trim().trim_matches('"');
    if let Some(rest) = value.strip_prefix('[') {
        return rest.split(']').next()?.parse().ok();
    }
    if let Ok(ip) = value.parse::<IpAddr>() {
        return Some(ip);
    }
    // IPv4 with port
    value.rsplit_once(':')?.0.parse().ok()
}

fn extract_from_x_forwarded_for(headers: &HeaderMap, config: &ClientIpConfig) -> Option<IpAddr> {
    let xff = headers.get("x-forwarded-for")?.to_str().ok()?;

    let ips: Vec<IpAddr> = xff
        .split(',')
        .filter_map(|s| s.trim().parse::<IpAddr>().ok())
        .collect();

    if ips.is_empty() {
        return None;
    }

    if let Some(num_trusted) = config.num_trusted_proxies {
        if ips.len() > num_trusted {
            return Some(ips[ips.len() - num_trusted - 1]);
        }
        return ips.first().copied();
    }

    if !config.trusted_proxies.is_empty() {
        return ips
            .iter()
            .rev()
            .find(|ip| !config.trusted_proxies.iter().any(|net| net.contains(*ip)))
            .or_else(|| ips.first())
            .copied();
    }

    ips.last().copied()
}
