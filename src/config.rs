use crate::base::ConfigurationError;
use crate::cmds::StartRequest;
use crate::internals::*;
use crate::types::{ScanRange, TenthOfDegree};
use log::debug;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

/// Immutable scanner settings, created with `ScannerConfigurationBuilder`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerConfiguration {
    scanner_ip: Ipv4Addr,
    host_ip: Option<Ipv4Addr>,
    host_data_port: u16,
    host_control_port: u16,
    scanner_data_port: u16,
    scanner_control_port: u16,
    scan_range: ScanRange,
    resolution: TenthOfDegree,
    fragmented_scan: bool,
    diagnostics_enabled: bool,
    rotation_period: Duration,
    ack_timeout: Duration,
    round_timeout: Duration,
    read_timeout: Duration,
}

impl ScannerConfiguration {
    pub fn scanner_ip(&self) -> Ipv4Addr {
        self.scanner_ip
    }

    /// Host address the device streams to, `None` if unspecified.
    pub fn host_ip(&self) -> Option<Ipv4Addr> {
        self.host_ip
    }

    pub fn host_data_port(&self) -> u16 {
        self.host_data_port
    }

    pub fn host_control_port(&self) -> u16 {
        self.host_control_port
    }

    pub fn scanner_data_port(&self) -> u16 {
        self.scanner_data_port
    }

    pub fn scanner_control_port(&self) -> u16 {
        self.scanner_control_port
    }

    pub fn scan_range(&self) -> ScanRange {
        self.scan_range
    }

    pub fn resolution(&self) -> TenthOfDegree {
        self.resolution
    }

    pub fn fragmented_scan(&self) -> bool {
        self.fragmented_scan
    }

    pub fn diagnostics_enabled(&self) -> bool {
        self.diagnostics_enabled
    }

    pub fn rotation_period(&self) -> Duration {
        self.rotation_period
    }

    pub fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }

    pub fn round_timeout(&self) -> Duration {
        self.round_timeout
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    fn bind_ip(&self) -> Ipv4Addr {
        self.host_ip.unwrap_or(Ipv4Addr::UNSPECIFIED)
    }

    pub fn host_data_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.bind_ip(), self.host_data_port))
    }

    pub fn host_control_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.bind_ip(), self.host_control_port))
    }

    pub fn scanner_data_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.scanner_ip, self.scanner_data_port))
    }

    pub fn scanner_control_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.scanner_ip, self.scanner_control_port))
    }

    /// Parameters of the start request derived from this configuration.
    pub fn start_request(&self) -> StartRequest {
        StartRequest {
            host_ip: self.bind_ip(),
            host_data_port: self.host_data_port,
            diagnostics_enabled: self.diagnostics_enabled,
            fragmented_scan: self.fragmented_scan,
            scan_range: self.scan_range,
            resolution: self.resolution,
        }
    }
}

/// Builder for `ScannerConfiguration`. Every setting but the scanner ip has
/// a default; all validation happens in `build()`.
///
/// # Example
/// ```
/// # use psenscan::{ScannerConfigurationBuilder, TenthOfDegree};
/// let config = ScannerConfigurationBuilder::new()
///     .scanner_ip("192.168.0.10")
///     .host_ip("192.168.0.20")
///     .scan_range(TenthOfDegree::from_deg(0.0), TenthOfDegree::from_deg(90.0))
///     .fragmented_scan(true)
///     .build()
///     .unwrap();
/// assert_eq!(config.scan_range().end(), TenthOfDegree::new(900));
/// ```
#[derive(Debug, Clone)]
pub struct ScannerConfigurationBuilder {
    scanner_ip: Option<String>,
    host_ip: Option<String>,
    host_data_port: u16,
    host_control_port: u16,
    scanner_data_port: u16,
    scanner_control_port: u16,
    scan_range_start: TenthOfDegree,
    scan_range_end: TenthOfDegree,
    resolution: TenthOfDegree,
    fragmented_scan: bool,
    diagnostics_enabled: bool,
    rotation_period: Duration,
    ack_timeout: Duration,
    round_timeout: Option<Duration>,
    read_timeout: Duration,
}

impl Default for ScannerConfigurationBuilder {
    fn default() -> Self {
        ScannerConfigurationBuilder {
            scanner_ip: None,
            host_ip: None,
            host_data_port: PSENSCAN_DEFAULT_HOST_DATA_PORT,
            host_control_port: PSENSCAN_DEFAULT_HOST_CONTROL_PORT,
            scanner_data_port: PSENSCAN_DEFAULT_SCANNER_DATA_PORT,
            scanner_control_port: PSENSCAN_DEFAULT_SCANNER_CONTROL_PORT,
            scan_range_start: PSENSCAN_DEFAULT_SCAN_RANGE_START,
            scan_range_end: PSENSCAN_DEFAULT_SCAN_RANGE_END,
            resolution: PSENSCAN_DEFAULT_RESOLUTION,
            fragmented_scan: PSENSCAN_DEFAULT_FRAGMENTED_SCAN,
            diagnostics_enabled: PSENSCAN_DEFAULT_DIAGNOSTICS_ENABLED,
            rotation_period: PSENSCAN_DEFAULT_ROTATION_PERIOD,
            ack_timeout: PSENSCAN_DEFAULT_ACK_TIMEOUT,
            round_timeout: None,
            read_timeout: PSENSCAN_DEFAULT_READ_TIMEOUT,
        }
    }
}

impl ScannerConfigurationBuilder {
    pub fn new() -> ScannerConfigurationBuilder {
        ScannerConfigurationBuilder::default()
    }

    /// Dotted-quad IPv4 address of the scanner. Required.
    pub fn scanner_ip(mut self, ip: &str) -> Self {
        self.scanner_ip = Some(ip.to_owned());
        self
    }

    /// Dotted-quad IPv4 address of this host. Unset means all interfaces.
    pub fn host_ip(mut self, ip: &str) -> Self {
        self.host_ip = Some(ip.to_owned());
        self
    }

    pub fn host_data_port(mut self, port: u16) -> Self {
        self.host_data_port = port;
        self
    }

    pub fn host_control_port(mut self, port: u16) -> Self {
        self.host_control_port = port;
        self
    }

    pub fn scanner_data_port(mut self, port: u16) -> Self {
        self.scanner_data_port = port;
        self
    }

    pub fn scanner_control_port(mut self, port: u16) -> Self {
        self.scanner_control_port = port;
        self
    }

    pub fn scan_range(mut self, start: TenthOfDegree, end: TenthOfDegree) -> Self {
        self.scan_range_start = start;
        self.scan_range_end = end;
        self
    }

    pub fn resolution(mut self, resolution: TenthOfDegree) -> Self {
        self.resolution = resolution;
        self
    }

    /// Whether the device may split one scan round into several frames.
    pub fn fragmented_scan(mut self, enabled: bool) -> Self {
        self.fragmented_scan = enabled;
        self
    }

    pub fn diagnostics_enabled(mut self, enabled: bool) -> Self {
        self.diagnostics_enabled = enabled;
        self
    }

    pub fn rotation_period(mut self, period: Duration) -> Self {
        self.rotation_period = period;
        self
    }

    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Defaults to two rotation periods.
    pub fn round_timeout(mut self, timeout: Duration) -> Self {
        self.round_timeout = Some(timeout);
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Validates the settings and produces the configuration.
    pub fn build(self) -> Result<ScannerConfiguration, ConfigurationError> {
        let scanner_ip = match &self.scanner_ip {
            Some(ip) => parse_ip(ip)?,
            None => return Err(ConfigurationError::MissingScannerIp),
        };
        let host_ip = self.host_ip.as_deref().map(parse_ip).transpose()?;

        let scan_range = ScanRange::new(self.scan_range_start, self.scan_range_end)?;
        if scan_range.end() > PSENSCAN_DEFAULT_SCAN_RANGE_END {
            return Err(ConfigurationError::InvalidScanRange {
                start: scan_range.start().value(),
                end: scan_range.end().value(),
                description: "end beyond 275.0 degrees",
            });
        }
        if self.resolution.value() < 1 || self.resolution > PSENSCAN_MAX_RESOLUTION {
            return Err(ConfigurationError::InvalidResolution(self.resolution.value()));
        }

        if self.host_data_port == self.host_control_port {
            return Err(ConfigurationError::PortConflict(self.host_data_port));
        }
        if self.scanner_data_port == self.scanner_control_port {
            return Err(ConfigurationError::PortConflict(self.scanner_data_port));
        }

        let round_timeout = self.round_timeout.unwrap_or(self.rotation_period * 2);
        for (name, timeout) in [
            ("rotation period", self.rotation_period),
            ("ack", self.ack_timeout),
            ("round", round_timeout),
            ("read", self.read_timeout),
        ] {
            if timeout.is_zero() {
                return Err(ConfigurationError::InvalidTimeout(name));
            }
        }

        let config = ScannerConfiguration {
            scanner_ip,
            host_ip,
            host_data_port: self.host_data_port,
            host_control_port: self.host_control_port,
            scanner_data_port: self.scanner_data_port,
            scanner_control_port: self.scanner_control_port,
            scan_range,
            resolution: self.resolution,
            fragmented_scan: self.fragmented_scan,
            diagnostics_enabled: self.diagnostics_enabled,
            rotation_period: self.rotation_period,
            ack_timeout: self.ack_timeout,
            round_timeout,
            read_timeout: self.read_timeout,
        };
        debug!("Built scanner configuration: {:?}", config);
        Ok(config)
    }
}

fn parse_ip(ip: &str) -> Result<Ipv4Addr, ConfigurationError> {
    ip.parse()
        .map_err(|_| ConfigurationError::InvalidIp(ip.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ScannerConfigurationBuilder {
        ScannerConfigurationBuilder::new().scanner_ip("192.168.0.10")
    }

    #[test]
    fn defaults_are_applied() {
        let config = builder().build().unwrap();
        assert_eq!(config.scanner_ip(), Ipv4Addr::new(192, 168, 0, 10));
        assert_eq!(config.host_ip(), None);
        assert_eq!(config.host_data_port(), PSENSCAN_DEFAULT_HOST_DATA_PORT);
        assert_eq!(config.scan_range().end(), TenthOfDegree::new(2750));
        assert!(!config.fragmented_scan());
        assert_eq!(config.round_timeout(), Duration::from_millis(60));
        assert_eq!(config.host_data_addr(), "0.0.0.0:55115".parse().unwrap());
        assert_eq!(config.scanner_control_addr(), "192.168.0.10:3000".parse().unwrap());
        assert_eq!(config.start_request().host_ip, Ipv4Addr::UNSPECIFIED);
    }

    #[test]
    fn scanner_ip_is_required() {
        assert_eq!(
            ScannerConfigurationBuilder::new().build(),
            Err(ConfigurationError::MissingScannerIp)
        );
    }

    #[test]
    fn malformed_ips_are_rejected() {
        assert_eq!(
            ScannerConfigurationBuilder::new().scanner_ip("192.168.0").build(),
            Err(ConfigurationError::InvalidIp("192.168.0".to_owned()))
        );
        assert_eq!(
            builder().host_ip("localhost").build(),
            Err(ConfigurationError::InvalidIp("localhost".to_owned()))
        );
    }

    #[test]
    fn inverted_or_oversized_range_is_rejected() {
        let inverted = builder()
            .scan_range(TenthOfDegree::new(100), TenthOfDegree::new(100))
            .build();
        assert!(matches!(inverted, Err(ConfigurationError::InvalidScanRange { .. })));

        let oversized = builder()
            .scan_range(TenthOfDegree::new(0), TenthOfDegree::new(2751))
            .build();
        assert!(matches!(oversized, Err(ConfigurationError::InvalidScanRange { .. })));
    }

    #[test]
    fn resolution_bounds() {
        assert_eq!(
            builder().resolution(TenthOfDegree::new(0)).build(),
            Err(ConfigurationError::InvalidResolution(0))
        );
        assert_eq!(
            builder().resolution(TenthOfDegree::new(101)).build(),
            Err(ConfigurationError::InvalidResolution(101))
        );
        assert!(builder().resolution(TenthOfDegree::new(100)).build().is_ok());
    }

    #[test]
    fn conflicting_ports_and_zero_timeouts_are_rejected() {
        assert_eq!(
            builder().host_control_port(55115).build(),
            Err(ConfigurationError::PortConflict(55115))
        );
        assert_eq!(
            builder().ack_timeout(Duration::ZERO).build(),
            Err(ConfigurationError::InvalidTimeout("ack"))
        );
    }
}
