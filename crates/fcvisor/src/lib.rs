//! Lifecycle controller for a Firecracker-style VMM.
//!
//! The controller drives the VMM from the outside: it prepares a jailed
//! filesystem root, composes the boot configuration, launches the process
//! (optionally under a jailer that handles chroot/uid/gid/cgroup/netns
//! isolation), polls the control API over its UNIX socket until the VM is
//! running, hot-patches block-device backings after boot and tears
//! everything down again.
//!
//! The pieces:
//!
//! - [`jail`] bind-mounts host resources into the chroot and translates
//!   host paths into what the VMM sees.
//! - [`fifo`] pumps the VMM's log and metrics pipes into tracing events.
//! - [`api`] is the HTTP-over-UNIX-socket control client.
//! - [`process`] gates the VMM version, supervises shutdown, discovers
//!   vCPU threads and watches the debug console.
//! - [`firecracker`] ties it together behind [`Firecracker`], the
//!   per-sandbox facade with its three-state machine and pending-device
//!   queue.
//!
//! Network endpoints, persistent sandbox state and the guest-agent
//! protocol belong to the embedding runtime; the controller only attaches
//! prepared endpoints and provisions the hybrid-vsock socket.

pub mod api;
pub mod config;
pub mod device;
pub mod error;
pub mod fifo;
pub mod firecracker;
pub mod jail;
pub mod process;

pub use crate::config::{HypervisorConfig, Param};
pub use crate::device::{
    BlockDrive, Capabilities, Device, HybridVSock, HypervisorState, NetworkEndpoint,
};
pub use crate::error::VmmError;
pub use crate::firecracker::{Firecracker, FirecrackerInfo, VmmState, DEFAULT_START_TIMEOUT};
