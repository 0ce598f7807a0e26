//! Tracer configuration
//!
//! ```text
//! GPU_BREADCRUMBS=$IP:$PORT,break=$BREAKPOINT:$BREAKPOINT_HITS
//! ```
//!
//! - `$BREAKPOINT` - the breadcrumb from which an explicit ack is required,
//!   `-1` for a discovery run without gating
//! - `$BREAKPOINT_HITS` - how many times the breakpoint has to be reached
//!   before the break takes effect

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

use crate::breakpoint::Breakpoint;
use crate::domain::ConfigError;

/// Environment variable holding the tracer configuration
pub const CONFIG_ENV: &str = "GPU_BREADCRUMBS";

/// Longest accepted host string
const MAX_HOST_LEN: usize = 63;

const BREAK_SEPARATOR: &str = ",break=";

/// Parsed tracer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreadcrumbsConfig {
    /// Where breadcrumb datagrams are sent
    pub remote: SocketAddrV4,
    pub breakpoint: Breakpoint,
}

impl BreadcrumbsConfig {
    /// Read [`CONFIG_ENV`]; `None` when the variable is unset
    pub fn from_env() -> Option<Result<Self, ConfigError>> {
        let value = std::env::var(CONFIG_ENV).ok()?;
        Some(value.parse())
    }
}

impl FromStr for BreadcrumbsConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let malformed = || ConfigError::Malformed(s.to_string());

        let (endpoint, breakpoint) = s.split_once(BREAK_SEPARATOR).ok_or_else(malformed)?;
        let (host, port) = endpoint.split_once(':').ok_or_else(malformed)?;
        let (index, hits) = breakpoint.split_once(':').ok_or_else(malformed)?;

        if host.len() > MAX_HOST_LEN {
            return Err(ConfigError::HostTooLong(host.to_string()));
        }
        let host: Ipv4Addr =
            host.parse().map_err(|_| ConfigError::InvalidHost(host.to_string()))?;

        let port = match port.parse::<u16>() {
            Ok(port) if port != 0 => port,
            _ => return Err(ConfigError::InvalidPort(port.to_string())),
        };

        let index = parse_index(index)?;
        let hits: u32 = hits.parse().map_err(|_| ConfigError::InvalidHits(hits.to_string()))?;

        Ok(Self {
            remote: SocketAddrV4::new(host, port),
            breakpoint: Breakpoint::from_parts(index, hits),
        })
    }
}

/// `-1` is accepted as shorthand for the all-ones "no gate" value
fn parse_index(index: &str) -> Result<u32, ConfigError> {
    if index == "-1" {
        return Ok(u32::MAX);
    }
    index.parse().map_err(|_| ConfigError::InvalidBreakpoint(index.to_string()))
}

impl fmt::Display for BreadcrumbsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.remote, self.breakpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_discovery_run() {
        let config: BreadcrumbsConfig = "127.0.0.1:9999,break=-1:0".parse().unwrap();
        assert_eq!(config.remote, SocketAddrV4::new(Ipv4Addr::LOCALHOST, 9999));
        assert_eq!(config.breakpoint, Breakpoint::Disabled);
    }

    #[test]
    fn test_parse_all_ones_is_sentinel() {
        let config: BreadcrumbsConfig = "10.0.0.2:7000,break=4294967295:3".parse().unwrap();
        assert_eq!(config.breakpoint, Breakpoint::Disabled);
    }

    #[test]
    fn test_parse_breakpoint() {
        let config: BreadcrumbsConfig = " 192.168.1.20:4242,break=50:2\n".parse().unwrap();
        assert_eq!(config.breakpoint, Breakpoint::At { index: 50, hits: 2 });
        assert_eq!(config.to_string(), "192.168.1.20:4242,break=50:2");
    }

    #[test]
    fn test_missing_break_is_malformed() {
        let err = "127.0.0.1:9999".parse::<BreadcrumbsConfig>().unwrap_err();
        assert!(matches!(err, ConfigError::Malformed(_)));
    }

    #[test]
    fn test_rejects_bad_fields() {
        assert!(matches!(
            "localhost:9999,break=1:0".parse::<BreadcrumbsConfig>(),
            Err(ConfigError::InvalidHost(_))
        ));
        assert!(matches!(
            "127.0.0.1:0,break=1:0".parse::<BreadcrumbsConfig>(),
            Err(ConfigError::InvalidPort(_))
        ));
        assert!(matches!(
            "127.0.0.1:65536,break=1:0".parse::<BreadcrumbsConfig>(),
            Err(ConfigError::InvalidPort(_))
        ));
        assert!(matches!(
            "127.0.0.1:9999,break=-2:0".parse::<BreadcrumbsConfig>(),
            Err(ConfigError::InvalidBreakpoint(_))
        ));
        assert!(matches!(
            "127.0.0.1:9999,break=5:x".parse::<BreadcrumbsConfig>(),
            Err(ConfigError::InvalidHits(_))
        ));
        assert!(matches!(
            "127.0.0.1:9999,break=5:1,extra".parse::<BreadcrumbsConfig>(),
            Err(ConfigError::InvalidHits(_))
        ));
    }

    #[test]
    fn test_host_too_long() {
        let host = "1".repeat(64);
        let err = format!("{host}:1,break=1:1").parse::<BreadcrumbsConfig>().unwrap_err();
        assert!(matches!(err, ConfigError::HostTooLong(_)));
    }
}
