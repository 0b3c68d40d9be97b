//! Device and location derivation for new sessions

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use serde::Deserialize;
use std::net::IpAddr;
use tonotes_db::{DeviceInfo, DeviceType};
use tracing::warn;

use crate::config::GeoConfig;

pub const LOCAL_NETWORK: &str = "Local Network";
pub const UNKNOWN_LOCATION: &str = "Unknown Location";

/// Loopback, private, link-local and unique-local ranges
const LOCAL_RANGES: &[&str] = &[
    "127.0.0.0/8",
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "169.254.0.0/16",
    "::1/128",
    "fc00::/7",
    "fe80::/10",
];

/// Parse user agent to extract device information
pub fn parse_user_agent(user_agent: &str) -> DeviceInfo {
    let device_type = if user_agent.trim().is_empty() {
        DeviceType::Unknown
    } else if user_agent.contains("iPad")
        || user_agent.contains("Tablet")
        || (user_agent.contains("Android") && !user_agent.contains("Mobile"))
    {
        DeviceType::Tablet
    } else if user_agent.contains("Mobile") || user_agent.contains("iPhone") {
        DeviceType::Mobile
    } else if is_api_client(user_agent) {
        DeviceType::Api
    } else {
        DeviceType::Desktop
    };

    DeviceInfo {
        browser: extract_browser(user_agent),
        os: extract_os(user_agent),
        device_type,
        user_agent: user_agent.to_string(),
    }
}

fn is_api_client(ua: &str) -> bool {
    let lower = ua.to_ascii_lowercase();
    ["curl", "wget", "python", "postman", "okhttp", "go-http-client", "httpie", "insomnia"]
        .iter()
        .any(|client| lower.contains(client))
}

fn extract_os(ua: &str) -> Option<String> {
    // Check Android before Linux because Android UAs contain "Linux"
    let os = if ua.contains("Android") {
        "Android"
    } else if ua.contains("iPhone") || ua.contains("iPad") || ua.contains("iOS") {
        "iOS"
    } else if ua.contains("Windows") {
        "Windows"
    } else if ua.contains("Mac OS") {
        "macOS"
    } else if ua.contains("CrOS") {
        "ChromeOS"
    } else if ua.contains("Linux") {
        "Linux"
    } else {
        return None;
    };
    Some(os.to_string())
}

fn extract_browser(ua: &str) -> Option<String> {
    // Edge and Opera also advertise Chrome, so they go first
    let browser = if ua.contains("Edg") {
        "Edge"
    } else if ua.contains("OPR") || ua.contains("Opera") {
        "Opera"
    } else if ua.contains("Firefox") {
        "Firefox"
    } else if ua.contains("Chrome") && !ua.contains("Chromium") {
        "Chrome"
    } else if ua.contains("Safari") {
        "Safari"
    } else {
        return None;
    };
    Some(browser.to_string())
}

/// True for addresses that never leave the local network
pub fn is_local_address(ip: IpAddr) -> bool {
    ip.is_unspecified()
        || LOCAL_RANGES
            .iter()
            .filter_map(|range| range.parse::<IpNetwork>().ok())
            .any(|net| net.contains(ip))
}

/// Resolves a public IP address to a coarse location
#[async_trait]
pub trait GeoLocator: Send + Sync {
    /// `"City, Country"` or `None` when the lookup fails
    async fn locate(&self, ip: IpAddr) -> Option<String>;
}

/// Label a client address, never failing
pub async fn resolve_location(geo: &dyn GeoLocator, ip: Option<&str>) -> String {
    let Some(ip) = ip.and_then(|raw| raw.trim().parse::<IpAddr>().ok()) else {
        return UNKNOWN_LOCATION.to_string();
    };
    if is_local_address(ip) {
        return LOCAL_NETWORK.to_string();
    }
    geo.locate(ip)
        .await
        .unwrap_or_else(|| UNKNOWN_LOCATION.to_string())
}

/// Locator that never resolves anything
pub struct NoopGeoLocator;

#[async_trait]
impl GeoLocator for NoopGeoLocator {
    async fn locate(&self, _ip: IpAddr) -> Option<String> {
        None
    }
}

/// HTTP lookup against an ip-api compatible endpoint
pub struct HttpGeoLocator {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct GeoResponse {
    status: Option<String>,
    city: Option<String>,
    country: Option<String>,
}

impl HttpGeoLocator {
    pub fn new(config: &GeoConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    async fn lookup(&self, ip: IpAddr) -> Result<GeoResponse, reqwest::Error> {
        self.client
            .get(format!("{}/{}", self.endpoint, ip))
            .send()
            .await?
            .error_for_status()?
            .json::<GeoResponse>()
            .await
    }
}

#[async_trait]
impl GeoLocator for HttpGeoLocator {
    async fn locate(&self, ip: IpAddr) -> Option<String> {
        let body = match self.lookup(ip).await {
            Ok(body) => body,
            Err(e) => {
                warn!(%ip, error = %e, "Geolocation lookup failed");
                return None;
            }
        };
        if body.status.as_deref().is_some_and(|s| s != "success") {
            return None;
        }
        match (body.city, body.country) {
            (Some(city), Some(country)) if !city.is_empty() => Some(format!("{}, {}", city, country)),
            (_, Some(country)) if !country.is_empty() => Some(country),
            _ => None,
        }
    }
}
