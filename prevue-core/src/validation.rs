//! Request-field validation helpers

use std::net::IpAddr;

use crate::{Error, Result};

/// Validate an Upstream base URL.
///
/// Requires an http/https scheme and, unless `allow_private` is set,
/// rejects literal loopback/private/link-local hosts.
pub fn validate_upstream_url(raw: &str, allow_private: bool) -> Result<url::Url> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| Error::InvalidInput(format!("Invalid server URL: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::InvalidInput(format!(
            "Server URL must be http or https, got {}",
            parsed.scheme()
        )));
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| Error::InvalidInput("Server URL has no host".to_string()))?;

    if !allow_private && is_private_host(host) {
        return Err(Error::InvalidInput(
            "Server URL resolves to a private address (set PREVUE_ALLOW_PRIVATE_URLS to allow)"
                .to_string(),
        ));
    }

    Ok(parsed)
}

/// True for literal addresses in loopback/private/link-local ranges and for
/// the conventional localhost names. Hostnames that merely *resolve* to
/// private space are not caught here; redirects are disabled client-side.
fn is_private_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") || host.ends_with(".local") {
        return true;
    }
    let literal = host.trim_start_matches('[').trim_end_matches(']');
    match literal.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        Ok(IpAddr::V6(v6)) => {
            v6.is_loopback() || v6.is_unspecified() || (v6.segments()[0] & 0xfe00) == 0xfc00
        }
        Err(_) => false,
    }
}

/// Validate a channel number path parameter.
pub fn parse_channel_number(raw: &str) -> Result<i64> {
    raw.parse::<i64>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| Error::InvalidInput(format!("Invalid channel number: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_public_urls() {
        assert!(validate_upstream_url("https://media.example.com:8920", false).is_ok());
        assert!(validate_upstream_url("http://8.8.8.8", false).is_ok());
    }

    #[test]
    fn rejects_private_when_disallowed() {
        for url in [
            "http://localhost:8096",
            "http://127.0.0.1:8096",
            "http://10.0.0.5",
            "http://192.168.1.10:8096",
            "http://172.16.0.1",
            "http://media.local",
            "http://[::1]:8096",
        ] {
            assert!(validate_upstream_url(url, false).is_err(), "{url} should be rejected");
        }
    }

    #[test]
    fn allows_private_by_default_flag() {
        assert!(validate_upstream_url("http://192.168.1.10:8096", true).is_ok());
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(validate_upstream_url("ftp://media.example.com", true).is_err());
        assert!(validate_upstream_url("not a url", true).is_err());
    }

    #[test]
    fn channel_number_parsing() {
        assert_eq!(parse_channel_number("7").unwrap(), 7);
        assert!(parse_channel_number("0").is_err());
        assert!(parse_channel_number("-3").is_err());
        assert!(parse_channel_number("abc").is_err());
    }
}
