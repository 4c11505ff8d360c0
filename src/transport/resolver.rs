//! System DNS resolver
//!
//! Resolves through the operating system via `tokio::net::lookup_host`.

use super::Resolver;
use async_trait::async_trait;
use std::io;
use std::net::IpAddr;

/// Resolver backed by the system's `getaddrinfo`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        let addrs: Vec<IpAddr> = tokio::net::lookup_host((host, 0))
            .await?
            .map(|addr| addr.ip())
            .collect();

        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("No addresses found for: {}", host),
            ));
        }

        tracing::trace!("Resolved {} to {:?}", host, addrs);
        Ok(addrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_resolve_ip_literal() {
        let addrs = SystemResolver.resolve("127.0.0.1").await.unwrap();
        assert_eq!(addrs, vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]);
    }

    #[tokio::test]
    async fn test_resolve_localhost() {
        let addrs = SystemResolver.resolve("localhost").await.unwrap();
        assert!(addrs.iter().all(|ip| ip.is_loopback()));
    }

    #[tokio::test]
    async fn test_resolve_invalid_domain() {
        let result = SystemResolver
            .resolve("this-domain-does-not-exist-12345.invalid")
            .await;
        assert!(result.is_err());
    }
}
