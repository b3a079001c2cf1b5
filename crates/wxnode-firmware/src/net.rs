//! Radio and TCP client behind the core uplink traits

use core::net::Ipv4Addr;

use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::TcpSocket;
use embassy_net::{IpAddress, Runner, Stack, StackResources};
use embassy_time::Duration;
use esp_hal::peripherals::WIFI;
use esp_hal::rng::Rng;
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController, WifiDevice, WifiError};
use log::{debug, info, warn};
use static_cell::StaticCell;
use wxnode_core::config::Credentials;
use wxnode_core::uplink::{
    HttpTransport, TransportError, UplinkError, WifiLink, format_get_request, parse_http_url,
    parse_status_line,
};

const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);
const SOCKET_BUFFER_LEN: usize = 1024;
/// Only the status line is needed from the response.
const RESPONSE_HEAD_LEN: usize = 128;

static NET_RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();

/// Radio pieces handed to the cycle, plus the stack runner that must be
/// polled while they are in use.
pub struct Network {
    pub wifi: EspWifi<'static>,
    pub http: TcpHttp<'static>,
    pub runner: Runner<'static, WifiDevice<'static>>,
}

/// Bring up the Wi-Fi driver and a DHCP network stack on top of it.
pub fn start(
    radio: &'static esp_radio::Controller<'static>,
    wifi: WIFI<'static>,
) -> Result<Network, WifiError> {
    let (controller, interfaces) = esp_radio::wifi::new(radio, wifi, Default::default())?;

    let rng = Rng::new();
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;

    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        NET_RESOURCES.init(StackResources::new()),
        seed,
    );

    Ok(Network {
        wifi: EspWifi {
            controller,
            stack,
            network: None,
        },
        http: TcpHttp { stack },
        runner,
    })
}

/// Station-mode Wi-Fi. Connected means associated and holding a DHCP lease.
pub struct EspWifi<'d> {
    controller: WifiController<'d>,
    stack: Stack<'d>,
    network: Option<heapless::String<32>>,
}

impl WifiLink for EspWifi<'_> {
    async fn begin(&mut self, networks: &[Credentials<'_>]) -> Result<(), UplinkError> {
        for network in networks {
            info!("Connecting to {}", network.ssid);
            let client = ClientConfig::default()
                .with_ssid(network.ssid.into())
                .with_password(network.password.into());

            if let Err(e) = self.controller.set_config(&ModeConfig::Client(client)) {
                warn!("Wi-Fi config for {} rejected: {:?}", network.ssid, e);
                continue;
            }

            if !self.controller.is_started().unwrap_or(false) {
                if let Err(e) = self.controller.start_async().await {
                    warn!("Wi-Fi start failed: {:?}", e);
                    continue;
                }
            }

            match self.controller.connect_async().await {
                Ok(()) => {
                    self.network = heapless::String::try_from(network.ssid).ok();
                    return Ok(());
                }
                Err(e) => {
                    warn!("Wi-Fi connect to {} failed: {:?}", network.ssid, e);
                    let _ = self.controller.disconnect_async().await;
                }
            }
        }

        Err(UplinkError::AssociationFailed)
    }

    async fn is_connected(&mut self) -> bool {
        let associated = matches!(self.controller.is_connected(), Ok(true));
        let leased = self.stack.config_v4();
        if let Some(config) = &leased {
            debug!("DHCP address {}", config.address);
        }
        associated && leased.is_some()
    }

    fn network_name(&self) -> Option<&str> {
        self.network.as_deref()
    }
}

/// One-shot HTTP/1.1 GET over a fresh TCP connection.
pub struct TcpHttp<'d> {
    stack: Stack<'d>,
}

impl TcpHttp<'_> {
    async fn resolve(&self, host: &str) -> Result<IpAddress, TransportError> {
        if let Ok(ip) = host.parse::<Ipv4Addr>() {
            return Ok(IpAddress::Ipv4(ip));
        }

        let addresses = self
            .stack
            .dns_query(host, DnsQueryType::A)
            .await
            .map_err(|e| {
                warn!("DNS lookup of {} failed: {:?}", host, e);
                TransportError::Dns
            })?;
        addresses.first().copied().ok_or(TransportError::Dns)
    }
}

impl HttpTransport for TcpHttp<'_> {
    async fn get(&mut self, url: &str) -> Result<u16, TransportError> {
        let url = parse_http_url(url)?;
        let request = format_get_request(&url)?;
        let address = self.resolve(url.host).await?;

        let mut rx_buffer = [0u8; SOCKET_BUFFER_LEN];
        let mut tx_buffer = [0u8; SOCKET_BUFFER_LEN];
        let mut socket = TcpSocket::new(self.stack, &mut rx_buffer, &mut tx_buffer);
        socket.set_timeout(Some(SOCKET_TIMEOUT));

        socket.connect((address, url.port)).await.map_err(|e| {
            warn!("Connect to {}:{} failed: {:?}", url.host, url.port, e);
            TransportError::Connect
        })?;

        let status = exchange(&mut socket, request.as_bytes()).await;
        socket.close();
        status
    }
}

async fn exchange(socket: &mut TcpSocket<'_>, request: &[u8]) -> Result<u16, TransportError> {
    let mut sent = 0;
    while sent < request.len() {
        match socket.write(&request[sent..]).await {
            Ok(0) | Err(_) => return Err(TransportError::Write),
            Ok(n) => sent += n,
        }
    }
    socket.flush().await.map_err(|_| TransportError::Write)?;

    let mut head = [0u8; RESPONSE_HEAD_LEN];
    let mut len = 0;
    while len < head.len() {
        let n = socket
            .read(&mut head[len..])
            .await
            .map_err(|_| TransportError::Read)?;
        if n == 0 {
            break;
        }
        len += n;
        if head[..len].windows(2).any(|w| w == b"\r\n") {
            break;
        }
    }

    parse_status_line(&head[..len])
}
