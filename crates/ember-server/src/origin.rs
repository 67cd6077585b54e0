//! Raw identity inputs of a request. Never persisted; the service hashes them.

use hyper::HeaderMap;
use hyper::header::USER_AGENT;
use std::net::SocketAddr;

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin {
    pub origin: String,
    pub signature: String,
}

impl RequestOrigin {
    /// First `X-Forwarded-For` entry, else `X-Real-IP`, else the peer address.
    pub fn from_headers(headers: &HeaderMap, peer: SocketAddr) -> Self {
        let origin = header_str(headers, FORWARDED_FOR)
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .or_else(|| {
                header_str(headers, REAL_IP)
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
            })
            .map_or_else(|| peer.ip().to_string(), str::to_string);

        let signature = headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        Self { origin, signature }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    fn peer() -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 7], 50_000))
    }

    #[test]
    fn forwarded_for_wins_and_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static(" 203.0.113.9 , 10.1.1.1"));
        headers.insert(REAL_IP, HeaderValue::from_static("198.51.100.2"));
        headers.insert(USER_AGENT, HeaderValue::from_static("agent/1"));

        let origin = RequestOrigin::from_headers(&headers, peer());
        assert_eq!(origin.origin, "203.0.113.9");
        assert_eq!(origin.signature, "agent/1");
    }

    #[test]
    fn real_ip_then_peer() {
        let mut headers = HeaderMap::new();
        headers.insert(REAL_IP, HeaderValue::from_static("198.51.100.2"));
        assert_eq!(RequestOrigin::from_headers(&headers, peer()).origin, "198.51.100.2");

        let bare = RequestOrigin::from_headers(&HeaderMap::new(), peer());
        assert_eq!(bare.origin, "10.0.0.7");
        assert_eq!(bare.signature, "");
    }

    #[test]
    fn empty_forwarded_for_falls_through() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static(""));
        assert_eq!(RequestOrigin::from_headers(&headers, peer()).origin, "10.0.0.7");
    }
}
