//! Local network interface lookup by kernel index.

use pnet::datalink::{self, NetworkInterface};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    /// Interface name (e.g., "eth0", "wlan0")
    pub name: String,
    pub index: u32,
    pub is_up: bool,
    pub is_loopback: bool,
}

impl From<&NetworkInterface> for InterfaceInfo {
    fn from(iface: &NetworkInterface) -> Self {
        InterfaceInfo {
            name: iface.name.clone(),
            index: iface.index,
            is_up: iface.is_up(),
            is_loopback: iface.is_loopback(),
        }
    }
}

pub trait InterfaceLookup {
    /// `None` when no interface carries `index`.
    fn by_index(&self, index: u32) -> Option<InterfaceInfo>;
}

/// Interface table as enumerated by the OS at lookup time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemInterfaces;

impl InterfaceLookup for SystemInterfaces {
    fn by_index(&self, index: u32) -> Option<InterfaceInfo> {
        datalink::interfaces()
            .iter()
            .find(|iface| iface.index == index)
            .map(InterfaceInfo::from)
    }
}
