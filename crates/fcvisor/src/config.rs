use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Result, VmmError};

/// A single kernel command-line parameter.
///
/// A parameter with an empty value serializes as the bare key
/// (e.g. `ro`); one with an empty key serializes as the bare value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub key: String,
    pub value: String,
}

impl Param {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Kernel parameters every boot gets, independent of caller-supplied ones.
///
/// The boot source is the first partition of the first block device added,
/// hence the virtio-blk root entries. ACPI is off because the VMM does not
/// implement it.
const BASE_KERNEL_PARAMS: &[(&str, &str)] = &[
    ("root", "/dev/vda1"),
    ("rootflags", "data=ordered,errors=remount-ro"),
    ("ro", ""),
    ("rootfstype", "ext4"),
    ("pci", "off"),
    ("reboot", "k"),
    ("panic", "1"),
    ("iommu", "off"),
    ("net.ifnames", "0"),
    ("random.trust_cpu", "on"),
    ("acpi", "off"),
];

/// Render parameters as `key<delim>value` strings, skipping empty entries.
pub fn serialize_params(params: &[Param], delim: char) -> Vec<String> {
    let mut out = Vec::with_capacity(params.len());
    for p in params {
        if p.key.is_empty() && p.value.is_empty() {
            continue;
        } else if p.key.is_empty() {
            out.push(p.value.clone());
        } else if p.value.is_empty() {
            out.push(p.key.clone());
        } else {
            out.push(format!("{}{}{}", p.key, delim, p.value));
        }
    }
    out
}

/// Derive the full boot-args string for one VM start.
///
/// Caller parameters come first, then the fixed base set, then the console
/// selection: an interactive debug boot gets `console=ttyS0`, every other
/// boot silences the UART and points the guest agent's log stream at the
/// given vsock port. A fresh list is derived for every start; the base set
/// is constant.
pub fn assemble_boot_args(
    caller_params: &[Param],
    debug: bool,
    stateful: bool,
    log_vport: u32,
) -> String {
    let mut params: Vec<Param> = caller_params.to_vec();
    params.extend(
        BASE_KERNEL_PARAMS
            .iter()
            .map(|(k, v)| Param::new(*k, *v)),
    );

    if debug && stateful {
        params.push(Param::new("console", "ttyS0"));
    } else {
        params.push(Param::new("8250.nr_uarts", "0"));
        params.push(Param::new("agent.log_vport", log_vport.to_string()));
    }

    serialize_params(&params, '=').join(" ")
}

/// Static parameters describing how to run the VMM for one sandbox.
#[derive(Debug, Clone, Default)]
pub struct HypervisorConfig {
    /// Path to the VMM binary.
    pub hypervisor_path: PathBuf,
    /// Path to the jailer binary; `None` disables jailing.
    pub jailer_path: Option<PathBuf>,
    /// Uncompressed kernel image on the host.
    pub kernel_path: PathBuf,
    /// Rootfs block image on the host.
    pub image_path: PathBuf,
    /// Initrd image; takes precedence over `image_path` when set.
    pub initrd_path: Option<PathBuf>,
    /// Caller-supplied kernel parameters, prepended to the base set.
    pub kernel_params: Vec<Param>,
    /// Guest memory in MiB.
    pub mem_size_mib: u32,
    /// Guest vCPU count.
    pub vcpu_count: u32,
    /// Debug mode: verbose VMM logging, optionally an interactive console.
    pub debug: bool,
}

impl HypervisorConfig {
    /// The image backing the boot drive: the initrd when configured,
    /// otherwise the rootfs image.
    pub fn boot_image(&self) -> Result<&Path> {
        if let Some(initrd) = &self.initrd_path {
            return Ok(initrd);
        }
        if self.image_path.as_os_str().is_empty() {
            return Err(VmmError::InvalidArgument(
                "no rootfs image or initrd configured".to_string(),
            ));
        }
        Ok(&self.image_path)
    }
}

/// The VMM boot configuration, serialized to `fcConfig.json` and handed to
/// the process via `--config-file`. Every path in here is the path the VMM
/// sees, never the host path.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FcConfig {
    #[serde(rename = "boot-source", skip_serializing_if = "Option::is_none")]
    pub boot_source: Option<BootSource>,
    pub drives: Vec<Drive>,
    #[serde(rename = "machine-config", skip_serializing_if = "Option::is_none")]
    pub machine_config: Option<MachineConfig>,
    #[serde(
        rename = "network-interfaces",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub network_interfaces: Vec<NetworkInterface>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vsock: Option<Vsock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<LoggerConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BootSource {
    pub kernel_image_path: String,
    pub boot_args: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Drive {
    pub drive_id: String,
    pub path_on_host: String,
    pub is_read_only: bool,
    pub is_root_device: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MachineConfig {
    pub vcpu_count: u32,
    pub mem_size_mib: u32,
    pub ht_enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkInterface {
    pub iface_id: String,
    pub host_dev_name: String,
    pub guest_mac: String,
    pub allow_mmds_requests: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Vsock {
    pub vsock_id: String,
    pub guest_cid: u32,
    pub uds_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggerConfig {
    pub level: String,
    pub log_fifo: String,
    pub metrics_fifo: String,
}
