use axum::http::Request;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tower_governor::{GovernorError, key_extractor::KeyExtractor};

/// Client IP for rate limiting behind a proxy.
///
/// Tries X-Forwarded-For, X-Real-IP, then the peer address. Requests with no
/// identifiable address share one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackIpKeyExtractor;

impl KeyExtractor for FallbackIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let header_ip = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .and_then(|v| v.trim().parse::<IpAddr>().ok())
        };

        if let Some(ip) = header_ip("x-forwarded-for").or_else(|| header_ip("x-real-ip")) {
            return Ok(ip);
        }

        if let Some(connect_info) = req
            .extensions()
            .get::<axum::extract::ConnectInfo<SocketAddr>>()
        {
            return Ok(connect_info.0.ip());
        }

        Ok(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(headers: &[(&str, &str)]) -> IpAddr {
        let mut builder = Request::builder();
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        FallbackIpKeyExtractor
            .extract(&builder.body(()).unwrap())
            .unwrap()
    }

    #[test]
    fn prefers_first_forwarded_address() {
        assert_eq!(
            key(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1"), ("x-real-ip", "10.0.0.2")]),
            "203.0.113.7".parse::<IpAddr>().unwrap()
        );
        assert_eq!(
            key(&[("x-real-ip", "10.0.0.2")]),
            "10.0.0.2".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn unidentified_clients_share_localhost() {
        assert_eq!(key(&[]), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(key(&[("x-forwarded-for", "garbage")]), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
}
