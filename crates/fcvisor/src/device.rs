use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A network endpoint prepared by the network layer. The controller only
/// attaches it; TAP creation and netns plumbing happen elsewhere.
#[derive(Debug, Clone)]
pub struct NetworkEndpoint {
    /// Guest-side interface id, e.g. `eth0`.
    pub name: String,
    pub guest_mac: String,
    /// Host TAP device backing the interface.
    pub tap_dev_name: String,
}

/// A block device to expose to the guest.
#[derive(Debug, Clone)]
pub struct BlockDrive {
    pub id: String,
    /// Backing file on the host.
    pub file: PathBuf,
    /// Index into the placeholder drive pool; authoritative for hotplug.
    pub index: usize,
}

/// Hybrid vsock endpoint: a UNIX socket on the host, a CID/port pair in the
/// guest.
#[derive(Debug, Clone)]
pub struct HybridVSock {
    pub uds_path: PathBuf,
    pub port: u32,
}

/// Devices the controller can attach to a VM.
#[derive(Debug, Clone)]
pub enum Device {
    Network(NetworkEndpoint),
    Block(BlockDrive),
    HybridVsock(HybridVSock),
}

impl Device {
    pub fn kind(&self) -> &'static str {
        match self {
            Device::Network(_) => "network-endpoint",
            Device::Block(_) => "block-drive",
            Device::HybridVsock(_) => "hybrid-vsock",
        }
    }
}

/// What this hypervisor implementation can do.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    pub block_device_hotplug: bool,
}

/// The slice of hypervisor state worth persisting across runtime restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypervisorState {
    pub pid: i32,
    pub hypervisor_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_kind_names() {
        let net = Device::Network(NetworkEndpoint {
            name: "eth0".to_string(),
            guest_mac: "AA:BB:CC:00:00:01".to_string(),
            tap_dev_name: "tap0".to_string(),
        });
        let block = Device::Block(BlockDrive {
            id: "data".to_string(),
            file: PathBuf::from("/data.img"),
            index: 0,
        });
        let vsock = Device::HybridVsock(HybridVSock {
            uds_path: PathBuf::from("/kata.hvsock"),
            port: 1024,
        });

        assert_eq!(net.kind(), "network-endpoint");
        assert_eq!(block.kind(), "block-drive");
        assert_eq!(vsock.kind(), "hybrid-vsock");
    }

    #[test]
    fn hypervisor_state_round_trips_through_json() {
        let state = HypervisorState {
            pid: 4242,
            hypervisor_type: "firecracker".to_string(),
        };
        let json = serde_json::to_string(&state).unwrap();
        let back: HypervisorState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.pid, 4242);
        assert_eq!(back.hypervisor_type, "firecracker");
    }
}
