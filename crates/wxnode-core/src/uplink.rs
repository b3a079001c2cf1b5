//! Uplink submission
//!
//! Wi-Fi association with a bounded status poll, then a single HTTP GET to
//! the primary collector with one retry against the fallback collector.
//! The radio driver and the TCP client live in the firmware; this module
//! only sequences them through [`WifiLink`] and [`HttpTransport`].

use core::fmt::Write;

use embedded_hal_async::delay::DelayNs;
use heapless::String;
use log::{info, warn};
use thiserror_no_std::Error;

use crate::config::{AssociationConfig, CollectorConfig, Credentials};
use crate::cycle::Reading;
use crate::sensors::SensorFault;

/// Longest request URL (base plus query) that can be built.
pub const MAX_URL_LEN: usize = 256;

/// Longest HTTP/1.1 request head the firmware client sends.
pub const MAX_REQUEST_LEN: usize = 384;

/// Status code the collector answers with on acceptance.
pub const STATUS_OK: u16 = 200;

/// Wire value of a reading that could not be obtained.
pub const MISSING_VALUE: &str = "-1";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UplinkError {
    #[error("no networks configured")]
    NoNetworks,
    #[error("association could not be started")]
    AssociationFailed,
    #[error("not associated after {polls} status polls")]
    AssociationTimeout { polls: u8 },
    #[error("request URL too long")]
    UrlTooLong,
    #[error("neither collector accepted the reading")]
    CollectorsUnavailable,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlError {
    #[error("only http:// URLs are supported")]
    UnsupportedScheme,
    #[error("URL has no host")]
    MissingHost,
    #[error("URL port is not a number")]
    InvalidPort,
    #[error("request head too long")]
    RequestTooLong,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid URL: {0}")]
    Url(UrlError),
    #[error("host lookup failed")]
    Dns,
    #[error("connection failed")]
    Connect,
    #[error("socket write failed")]
    Write,
    #[error("socket read failed")]
    Read,
    #[error("malformed HTTP response")]
    MalformedResponse,
}

impl From<UrlError> for TransportError {
    fn from(e: UrlError) -> Self {
        Self::Url(e)
    }
}

/// Wireless link contract.
pub trait WifiLink {
    /// Start associating with the first reachable network of `networks`.
    fn begin(
        &mut self,
        networks: &[Credentials<'_>],
    ) -> impl Future<Output = Result<(), UplinkError>>;

    fn is_connected(&mut self) -> impl Future<Output = bool>;

    /// SSID of the network currently associated with, if any.
    fn network_name(&self) -> Option<&str>;
}

/// HTTP client contract: one GET, answered with the response status code.
pub trait HttpTransport {
    fn get(&mut self, url: &str) -> impl Future<Output = Result<u16, TransportError>>;
}

/// A link that failed to come up never associates.
impl<W: WifiLink> WifiLink for Option<W> {
    async fn begin(&mut self, networks: &[Credentials<'_>]) -> Result<(), UplinkError> {
        match self {
            Some(wifi) => wifi.begin(networks).await,
            None => Err(UplinkError::AssociationFailed),
        }
    }

    async fn is_connected(&mut self) -> bool {
        match self {
            Some(wifi) => wifi.is_connected().await,
            None => false,
        }
    }

    fn network_name(&self) -> Option<&str> {
        self.as_ref().and_then(|wifi| wifi.network_name())
    }
}

impl<H: HttpTransport> HttpTransport for Option<H> {
    async fn get(&mut self, url: &str) -> Result<u16, TransportError> {
        match self {
            Some(http) => http.get(url).await,
            None => Err(TransportError::Connect),
        }
    }
}

/// Which collector accepted the reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Primary,
    Fallback,
}

/// Start association, wait the settle period, then poll the link status.
///
/// Polls up to `max_polls` times with `poll_interval_ms` between polls.
pub async fn associate<W: WifiLink, D: DelayNs>(
    wifi: &mut W,
    delay: &mut D,
    networks: &[Credentials<'_>],
    config: &AssociationConfig,
) -> Result<(), UplinkError> {
    if networks.is_empty() {
        warn!("No Wi-Fi networks configured");
        return Err(UplinkError::NoNetworks);
    }

    info!("Associating with one of {} networks", networks.len());
    wifi.begin(networks).await?;
    delay.delay_ms(config.settle_ms).await;

    for poll in 1..=config.max_polls {
        if wifi.is_connected().await {
            info!(
                "Wi-Fi associated with {} after {} polls",
                wifi.network_name().unwrap_or("<unknown>"),
                poll
            );
            return Ok(());
        }
        if poll < config.max_polls {
            delay.delay_ms(config.poll_interval_ms).await;
        }
    }

    warn!("Wi-Fi not associated after {} polls", config.max_polls);
    Err(UplinkError::AssociationTimeout {
        polls: config.max_polls,
    })
}

/// Submit `reading` to the primary collector, falling back once on failure.
pub async fn submit<H: HttpTransport>(
    http: &mut H,
    collector: &CollectorConfig<'_>,
    reading: &Reading<'_>,
) -> Result<Delivery, UplinkError> {
    if attempt(http, collector.primary_url, reading).await {
        return Ok(Delivery::Primary);
    }

    if collector.fallback_url.is_empty() {
        warn!("Primary collector failed and no fallback is configured");
        return Err(UplinkError::CollectorsUnavailable);
    }

    if attempt(http, collector.fallback_url, reading).await {
        return Ok(Delivery::Fallback);
    }

    Err(UplinkError::CollectorsUnavailable)
}

/// A request URL that cannot be built counts as a failed attempt.
async fn attempt<H: HttpTransport>(http: &mut H, base: &str, reading: &Reading<'_>) -> bool {
    let url = match build_request_url(base, reading) {
        Ok(url) => url,
        Err(e) => {
            warn!("Skipping collector {}: {}", base, e);
            return false;
        }
    };

    info!("GET {}", url);
    match http.get(&url).await {
        Ok(STATUS_OK) => {
            info!("Collector accepted reading");
            true
        }
        Ok(status) => {
            warn!("Collector answered {}", status);
            false
        }
        Err(e) => {
            warn!("Collector request failed: {}", e);
            false
        }
    }
}

/// Build `<base>?<channel>=<battery>&serialNo=..&temp=..&pres=..&hum=..&error=..`.
pub fn build_request_url(
    base: &str,
    reading: &Reading<'_>,
) -> Result<String<MAX_URL_LEN>, UplinkError> {
    let mut url = String::new();
    write_query(&mut url, base, reading).map_err(|_| UplinkError::UrlTooLong)?;
    Ok(url)
}

fn write_query<W: Write>(out: &mut W, base: &str, reading: &Reading<'_>) -> core::fmt::Result {
    write!(
        out,
        "{}?{}={}&serialNo={}",
        base, reading.channel, reading.battery_raw, reading.run_count
    )?;
    out.write_str("&temp=")?;
    write_value(out, reading.measurement.temperature)?;
    out.write_str("&pres=")?;
    write_value(out, reading.measurement.pressure)?;
    out.write_str("&hum=")?;
    write_value(out, reading.measurement.humidity)?;
    write!(out, "&error={}", reading.previous_error)
}

fn write_value<W: Write>(out: &mut W, value: Result<f32, SensorFault>) -> core::fmt::Result {
    match value {
        Ok(v) => write!(out, "{:.2}", v),
        Err(_) => out.write_str(MISSING_VALUE),
    }
}

/// Pieces of an `http://host[:port]/path` URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpUrl<'a> {
    pub host: &'a str,
    pub port: u16,
    /// Path and query; starts with `?` when the URL has no path
    pub path: &'a str,
}

pub fn parse_http_url(url: &str) -> Result<HttpUrl<'_>, UrlError> {
    let rest = url.strip_prefix("http://").ok_or(UrlError::UnsupportedScheme)?;

    let (authority, path) = match rest.find(['/', '?']) {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().map_err(|_| UrlError::InvalidPort)?),
        None => (authority, 80),
    };

    if host.is_empty() {
        return Err(UrlError::MissingHost);
    }

    Ok(HttpUrl { host, port, path })
}

/// HTTP/1.1 GET request head for `url`.
pub fn format_get_request(url: &HttpUrl<'_>) -> Result<String<MAX_REQUEST_LEN>, UrlError> {
    let mut request = String::new();
    let path_prefix = if url.path.starts_with('/') { "" } else { "/" };
    write!(
        request,
        "GET {}{} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path_prefix, url.path, url.host
    )
    .map_err(|_| UrlError::RequestTooLong)?;
    Ok(request)
}

/// Status code from the first line of a response (`HTTP/1.1 200 OK`).
pub fn parse_status_line(response: &[u8]) -> Result<u16, TransportError> {
    let end = response
        .windows(2)
        .position(|w| w == b"\r\n")
        .ok_or(TransportError::MalformedResponse)?;
    let line =
        core::str::from_utf8(&response[..end]).map_err(|_| TransportError::MalformedResponse)?;

    let mut parts = line.split(' ');
    match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/") && code.len() == 3 => {
            code.parse().map_err(|_| TransportError::MalformedResponse)
        }
        _ => Err(TransportError::MalformedResponse),
    }
}
