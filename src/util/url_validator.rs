use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur while validating an image or product URL.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    /// The URL points to localhost.
    #[error("Localhost not allowed")]
    Localhost,
}

/// Validates a URL that will be published in the feed.
///
/// Merchant Center fetches image links from the public internet, so a URL
/// is only accepted if it:
/// - uses `http` or `https`
/// - has a host
/// - does not point at localhost or a private/link-local address
///
/// A missing scheme is tolerated (`shop.example.com/a.jpg`) and resolved as
/// `https`, matching what merchants tend to paste into the admin form.
///
/// # Examples
///
/// ```
/// use gfeed::util::validate_public_url;
///
/// let url = validate_public_url("https://cdn.example.com/a.jpg").unwrap();
/// assert_eq!(url.host_str(), Some("cdn.example.com"));
///
/// assert!(validate_public_url("http://localhost/a.jpg").is_err());
/// assert!(validate_public_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_public_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let trimmed = url_str.trim();
    let url = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(&format!("https://{trimmed}"))?,
        Err(e) => return Err(e.into()),
    };

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    let host = url.host_str().ok_or(UrlValidationError::MissingHost)?;
    if host.is_empty() {
        return Err(UrlValidationError::MissingHost);
    }
    if host == "localhost" {
        return Err(UrlValidationError::Localhost);
    }

    let host_for_parse = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    if let Ok(ip) = host_for_parse.parse::<IpAddr>() {
        if ip.is_loopback() {
            return Err(UrlValidationError::Localhost);
        }
        if is_private_ip(&ip) {
            return Err(UrlValidationError::PrivateIp(ip.to_string()));
        }
    }

    Ok(url)
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private() || ipv4.is_link_local() || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            if ipv6.is_unspecified() {
                return true;
            }
            let segments = ipv6.segments();
            // fc00::/7
            let is_unique_local = (segments[0] & 0xfe00) == 0xfc00;
            // fe80::/10
            let is_link_local = (segments[0] & 0xffc0) == 0xfe80;
            is_unique_local || is_link_local
        }
    }
}
