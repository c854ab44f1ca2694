use crate::types::TenthOfDegree;
use std::time::Duration;

/// Port the scanner listens on for start/stop requests.
pub const PSENSCAN_DEFAULT_SCANNER_CONTROL_PORT: u16 = 3000;

/// Port the scanner sends monitoring frames from.
pub const PSENSCAN_DEFAULT_SCANNER_DATA_PORT: u16 = 2000;

/// Host port monitoring frames are sent to.
pub const PSENSCAN_DEFAULT_HOST_DATA_PORT: u16 = 55115;

/// Host port control replies are received on.
pub const PSENSCAN_DEFAULT_HOST_CONTROL_PORT: u16 = 55116;

/// Default start of the scan range, 0.0°.
pub const PSENSCAN_DEFAULT_SCAN_RANGE_START: TenthOfDegree = TenthOfDegree::new(0);

/// Default end of the scan range, 275.0°, also the widest range the device supports.
pub const PSENSCAN_DEFAULT_SCAN_RANGE_END: TenthOfDegree = TenthOfDegree::new(2750);

/// Default angular resolution, 0.1°.
pub const PSENSCAN_DEFAULT_RESOLUTION: TenthOfDegree = TenthOfDegree::new(1);

/// Coarsest angular resolution the device supports, 10.0°.
pub const PSENSCAN_MAX_RESOLUTION: TenthOfDegree = TenthOfDegree::new(100);

pub const PSENSCAN_DEFAULT_FRAGMENTED_SCAN: bool = false;

pub const PSENSCAN_DEFAULT_DIAGNOSTICS_ENABLED: bool = true;

/// Time of one mirror revolution.
pub const PSENSCAN_DEFAULT_ROTATION_PERIOD: Duration = Duration::from_millis(30);

/// Default time to wait for a start/stop acknowledgement.
pub const PSENSCAN_DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(1);

/// Default time a scan round may take from its first frame.
pub const PSENSCAN_DEFAULT_ROUND_TIMEOUT: Duration = Duration::from_millis(60);

/// Read timeout of the UDP sockets, bounds shutdown latency of the receive threads.
pub const PSENSCAN_DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Number of start attempts `ScannerNode` makes before giving up.
pub const PSENSCAN_DEFAULT_START_RETRIES: usize = 3;
