//! Host string → bindable socket address.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::net::lookup_host;
use tracing::debug;

use crate::domain::error::ResolutionError;

/// Address used when a server names no host.
pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Resolves `address` to the socket address a server binds.
///
/// - `None` binds the loopback address.
/// - An IP literal (`0.0.0.0`, `::1`) is used as-is without a lookup.
/// - Anything else is looked up by name and the first result is used.
///
/// # Errors
///
/// Returns [`ResolutionError::Lookup`] when the name cannot be resolved and
/// [`ResolutionError::NoAddress`] when it resolves to nothing.
pub async fn resolve(address: Option<&str>, port: u16) -> Result<SocketAddr, ResolutionError> {
    let Some(host) = address else {
        return Ok(SocketAddr::new(DEFAULT_HOST, port));
    };
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    // `lookup_host` runs the system resolver on tokio's blocking pool, so a
    // slow DNS answer does not stall other tasks.
    let mut addrs = lookup_host((host, port))
        .await
        .map_err(|source| ResolutionError::Lookup {
            host: host.to_string(),
            source,
        })?;
    let addr = addrs
        .next()
        .ok_or_else(|| ResolutionError::NoAddress(host.to_string()))?;
    debug!(host, %addr, "resolved server address");
    Ok(addr)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_absent_address_is_loopback() {
        let addr = resolve(None, 5555).await.unwrap();
        assert_eq!(addr, "127.0.0.1:5555".parse::<SocketAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_ip_literals_are_used_verbatim() {
        assert_eq!(
            resolve(Some("0.0.0.0"), 1).await.unwrap(),
            "0.0.0.0:1".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            resolve(Some("::1"), 2).await.unwrap(),
            "[::1]:2".parse::<SocketAddr>().unwrap()
        );
    }

    #[tokio::test]
    async fn test_localhost_resolves_to_loopback() {
        let addr = resolve(Some("localhost"), 7).await.unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 7);
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_an_error() {
        // `.invalid` is reserved and never resolves.
        let err = resolve(Some("no-such-host.invalid"), 1).await.unwrap_err();
        assert!(matches!(
            err,
            ResolutionError::Lookup { .. } | ResolutionError::NoAddress(_)
        ));
    }
}
