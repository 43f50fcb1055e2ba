//! Serial port enumeration and lookup.
//!
//! Discovery is a read-only view of the ports the operating system reports.
//! The registry uses it to turn a serial number into a device path and to
//! capture a [`PortInfo`] snapshot when a handle is created.

mod filter;

pub use filter::{filter_ports, AttrValue, Criterion, PortFilter};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors raised while enumerating or filtering ports.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The operating system refused to list ports.
    #[error("Port enumeration failed: {0}")]
    Enumeration(#[from] serialport::Error),

    /// A filter expression could not be understood.
    #[error("Invalid port filter: {0}")]
    InvalidFilter(String),

    /// A filter pattern is not a valid regular expression.
    #[error("Invalid filter pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Bus a port is attached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    Usb,
    Pci,
    Bluetooth,
    #[default]
    Unknown,
}

impl PortKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usb => "usb",
            Self::Pci => "pci",
            Self::Bluetooth => "bluetooth",
            Self::Unknown => "unknown",
        }
    }
}

/// Snapshot of one enumerated port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    /// Full device path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub device: String,
    /// Last path component of `device`.
    pub name: String,
    pub description: Option<String>,
    /// Hardware id string in `USB VID:PID=xxxx:xxxx SER=...` form.
    pub hwid: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub kind: PortKind,
}

impl PortInfo {
    /// A port with nothing known about it beyond its device path.
    pub fn new(device: impl Into<String>) -> Self {
        let device = device.into();
        Self {
            name: base_name(&device).to_string(),
            device,
            description: None,
            hwid: None,
            vid: None,
            pid: None,
            serial_number: None,
            manufacturer: None,
            product: None,
            kind: PortKind::Unknown,
        }
    }

    /// Mark the port as USB with the given ids.
    pub fn with_usb(mut self, vid: u16, pid: u16) -> Self {
        self.kind = PortKind::Usb;
        self.vid = Some(vid);
        self.pid = Some(pid);
        self.hwid = Some(usb_hwid(vid, pid, self.serial_number.as_deref()));
        self
    }

    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        if let (Some(vid), Some(pid)) = (self.vid, self.pid) {
            self.hwid = Some(usb_hwid(vid, pid, self.serial_number.as_deref()));
        }
        self
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Look up an attribute by name.
    ///
    /// Returns `None` for names that are not port attributes at all, and
    /// `Some(AttrValue::Absent)` for known attributes the port lacks.
    pub fn attribute(&self, name: &str) -> Option<AttrValue> {
        let text = |v: &Option<String>| v.clone().map_or(AttrValue::Absent, AttrValue::Text);
        let int = |v: Option<u16>| v.map_or(AttrValue::Absent, |v| AttrValue::Integer(v.into()));
        let value = match name {
            "device" => AttrValue::Text(self.device.clone()),
            "name" => AttrValue::Text(self.name.clone()),
            "description" => text(&self.description),
            "hwid" => text(&self.hwid),
            "vid" => int(self.vid),
            "pid" => int(self.pid),
            "serial_number" => text(&self.serial_number),
            "manufacturer" => text(&self.manufacturer),
            "product" => text(&self.product),
            "kind" => AttrValue::Text(self.kind.as_str().to_string()),
            _ => return None,
        };
        Some(value)
    }
}

impl From<serialport::SerialPortInfo> for PortInfo {
    fn from(info: serialport::SerialPortInfo) -> Self {
        let mut port = PortInfo::new(info.port_name);
        match info.port_type {
            serialport::SerialPortType::UsbPort(usb) => {
                port.kind = PortKind::Usb;
                port.vid = Some(usb.vid);
                port.pid = Some(usb.pid);
                port.hwid = Some(usb_hwid(usb.vid, usb.pid, usb.serial_number.as_deref()));
                port.description = usb.product.clone();
                port.serial_number = usb.serial_number;
                port.manufacturer = usb.manufacturer;
                port.product = usb.product;
            }
            serialport::SerialPortType::PciPort => port.kind = PortKind::Pci,
            serialport::SerialPortType::BluetoothPort => port.kind = PortKind::Bluetooth,
            serialport::SerialPortType::Unknown => {}
        }
        port
    }
}

fn base_name(device: &str) -> &str {
    device.rsplit(['/', '\\']).next().unwrap_or(device)
}

fn usb_hwid(vid: u16, pid: u16, serial_number: Option<&str>) -> String {
    match serial_number {
        Some(sn) => format!("USB VID:PID={vid:04X}:{pid:04X} SER={sn}"),
        None => format!("USB VID:PID={vid:04X}:{pid:04X}"),
    }
}

/// Source of the current port list.
#[cfg_attr(test, mockall::automock)]
pub trait PortDiscovery: Send + Sync {
    /// Enumerate the ports present right now.
    fn list_ports(&self) -> Result<Vec<PortInfo>, DiscoveryError>;
}

/// Enumerates the ports the operating system reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDiscovery;

impl PortDiscovery for SystemDiscovery {
    fn list_ports(&self) -> Result<Vec<PortInfo>, DiscoveryError> {
        let ports: Vec<PortInfo> = serialport::available_ports()?
            .into_iter()
            .map(PortInfo::from)
            .collect();
        debug!("Enumerated {} serial ports", ports.len());
        Ok(ports)
    }
}

/// A fixed port list, for tests and for machines without real hardware.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    ports: Vec<PortInfo>,
}

impl StaticDiscovery {
    pub fn new(ports: impl IntoIterator<Item = PortInfo>) -> Self {
        Self {
            ports: ports.into_iter().collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl PortDiscovery for StaticDiscovery {
    fn list_ports(&self) -> Result<Vec<PortInfo>, DiscoveryError> {
        Ok(self.ports.clone())
    }
}

/// Device path of the first port reporting `serial_number`.
pub fn resolve_port_from_serial(
    discovery: &dyn PortDiscovery,
    serial_number: &str,
) -> Result<Option<String>, DiscoveryError> {
    Ok(discovery
        .list_ports()?
        .into_iter()
        .find(|p| p.serial_number.as_deref() == Some(serial_number))
        .map(|p| p.device))
}

/// Serial number of the port whose device path is `port`.
pub fn resolve_serial_from_port(
    discovery: &dyn PortDiscovery,
    port: &str,
) -> Result<Option<String>, DiscoveryError> {
    Ok(find_port(discovery, port)?.and_then(|p| p.serial_number))
}

/// Full info for the port whose device path is `port`.
pub fn find_port(
    discovery: &dyn PortDiscovery,
    port: &str,
) -> Result<Option<PortInfo>, DiscoveryError> {
    Ok(discovery.list_ports()?.into_iter().find(|p| p.device == port))
}
