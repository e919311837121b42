//! Plain configuration structs the two engines are constructed from (§10.4).
//!
//! Parsing these from a file or CLI is explicitly a host concern (§1); none
//! of these types derive `serde` traits. A host that wants file-based
//! configuration brings its own loader and builds these structs from it.

/// One occupied-station device inside a [`GroupConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    /// This device's own slave-ID (its IPv4 address as seen by the master).
    pub slave_id: u32,
    /// Number of contiguous stations this device occupies (1..=16).
    pub occupied: u16,
    /// Whether the application currently wants this device scanned.
    /// Mirrors the "application-enabled" flag of §3.
    pub application_enabled: bool,
    /// Forces the transmission bit on regardless of `application_enabled`
    /// (used by hosts that want a device kept "hot" through brief application
    /// pauses).
    pub force_transmission_bit: bool,
}

impl DeviceConfig {
    pub fn new(slave_id: u32, occupied: u16) -> Self {
        DeviceConfig {
            slave_id,
            occupied,
            application_enabled: true,
            force_transmission_bit: false,
        }
    }
}

/// One link-scan group inside a [`MasterConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupConfig {
    /// 1-based group number (1..=64).
    pub group_no: u8,
    pub protocol_ver: u16,
    /// Per-scan response timeout, in milliseconds. `0` means "use the
    /// protocol default" (§6, 500 ms).
    pub timeout_ms: u16,
    /// Consecutive timeouts tolerated before a device is dropped. `0` means
    /// "use the protocol default" (§6, 3).
    pub parallel_off_timeout_count: u16,
    /// If `Some`, link-scans repeat on a fixed period instead of
    /// back-to-back; clamped to the 2000 ms protocol maximum (§6).
    pub constant_link_scan_ms: Option<u16>,
    pub devices: Vec<DeviceConfig>,
}

impl GroupConfig {
    pub fn new(group_no: u8) -> Self {
        GroupConfig {
            group_no,
            protocol_ver: 2,
            timeout_ms: 0,
            parallel_off_timeout_count: 0,
            constant_link_scan_ms: None,
            devices: Vec::new(),
        }
    }

    /// Effective timeout in milliseconds, applying the §6 default.
    pub fn effective_timeout_ms(&self) -> u16 {
        if self.timeout_ms == 0 {
            crate::DEFAULT_TIMEOUT_MS
        } else {
            self.timeout_ms
        }
    }

    /// Effective timeout-count, applying the §6 default.
    pub fn effective_parallel_off_timeout_count(&self) -> u16 {
        if self.parallel_off_timeout_count == 0 {
            crate::DEFAULT_PARALLEL_OFF_TIMEOUT_COUNT
        } else {
            self.parallel_off_timeout_count
        }
    }

    /// Total occupied stations across all devices in this group.
    pub fn total_occupied(&self) -> u32 {
        self.devices.iter().map(|d| d.occupied as u32).sum()
    }
}

/// Top-level master configuration: the master's own identity plus its groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterConfig {
    /// The master's own IPv4 address, embedded as `master_id` in every
    /// request this master sends.
    pub master_id: u32,
    pub master_mac: [u8; 6],
    /// Running/stopped-by-user flag reflected in `master_local_unit_info`
    /// (bit 1, protocol v2 only).
    pub stopped_by_user: bool,
    pub groups: Vec<GroupConfig>,
}

impl MasterConfig {
    pub fn new(master_id: u32, master_mac: [u8; 6]) -> Self {
        MasterConfig {
            master_id,
            master_mac,
            stopped_by_user: false,
            groups: Vec::new(),
        }
    }
}

/// Configuration a single slave stack is constructed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlaveConfig {
    /// This slave's own slave-ID (its IPv4 address as seen by masters).
    pub my_slave_id: u32,
    pub occupied: u16,
    pub protocol_ver: u16,
    pub vendor_code: u16,
    pub model_code: u32,
    pub equipment_ver: u16,
}
