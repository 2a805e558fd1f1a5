//! Client identity extraction from request metadata.

use std::net::SocketAddr;

use axum::http::HeaderMap;
use tracing::trace;

/// Identity used when no header or peer address yields one.
///
/// Every unidentifiable client shares this bucket key. That is a known,
/// accepted limitation rather than an error.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Derive a stable string identity for the caller.
///
/// Precedence, first match wins:
/// 1. `x-forwarded-for` — first entry of the comma-separated list, trimmed.
/// 2. `x-real-ip`.
/// 3. The transport-level peer address.
/// 4. The literal [`UNKNOWN_IDENTITY`].
///
/// The header values are not validated as IP addresses; the raw string is
/// used as-is. This trusts the reverse proxy in front of the service to
/// strip or overwrite client-supplied values for these headers.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                trace!(identity = %first, "Identity from x-forwarded-for");
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            trace!(identity = %real_ip, "Identity from x-real-ip");
            return real_ip.to_string();
        }
    }

    if let Some(addr) = peer {
        return addr.ip().to_string();
    }

    UNKNOWN_IDENTITY.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                axum::http::HeaderName::try_from(*name).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    fn peer() -> Option<SocketAddr> {
        Some("192.168.1.5:43210".parse().unwrap())
    }

    #[test]
    fn test_forwarded_for_takes_precedence() {
        let headers = headers(&[("x-forwarded-for", "203.0.113.1"), ("x-real-ip", "10.0.0.9")]);
        assert_eq!(client_identity(&headers, peer()), "203.0.113.1");
    }

    #[test]
    fn test_forwarded_for_list_uses_first_entry() {
        let headers = headers(&[("x-forwarded-for", " 203.0.113.1 , 10.0.0.2, 10.0.0.3")]);
        assert_eq!(client_identity(&headers, peer()), "203.0.113.1");
    }

    #[test]
    fn test_real_ip_when_forwarded_for_absent() {
        let headers = headers(&[("x-real-ip", "10.0.0.9")]);
        assert_eq!(client_identity(&headers, peer()), "10.0.0.9");
    }

    #[test]
    fn test_empty_forwarded_for_falls_through() {
        let headers = headers(&[("x-forwarded-for", ""), ("x-real-ip", "10.0.0.9")]);
        assert_eq!(client_identity(&headers, peer()), "10.0.0.9");
    }

    #[test]
    fn test_peer_address_fallback_strips_port() {
        let headers = HeaderMap::new();
        assert_eq!(client_identity(&headers, peer()), "192.168.1.5");
    }

    #[test]
    fn test_unknown_when_nothing_available() {
        let headers = HeaderMap::new();
        assert_eq!(client_identity(&headers, None), UNKNOWN_IDENTITY);
    }

    #[test]
    fn test_header_value_is_not_validated() {
        // Not an IP at all; used verbatim by design.
        let headers = headers(&[("x-forwarded-for", "not-an-ip")]);
        assert_eq!(client_identity(&headers, None), "not-an-ip");
    }
}
