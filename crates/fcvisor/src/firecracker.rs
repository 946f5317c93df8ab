use std::fs;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::api::{FirecrackerClient, InstanceState};
use crate::config::{self, Drive, FcConfig, HypervisorConfig, LoggerConfig, MachineConfig};
use crate::config::{BootSource, NetworkInterface, Vsock};
use crate::device::{BlockDrive, Capabilities, Device, HybridVSock, HypervisorState, NetworkEndpoint};
use crate::error::{Result, VmmError};
use crate::fifo;
use crate::jail::PathJail;
use crate::process::{self, VcpuThreadIds};

/// Default deadline for the VMM to report `Running`.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(10);

/// The VMM's control socket, created under `<jailerRoot>/run` by the
/// process itself.
const FC_API_SOCKET: &str = "firecracker.socket";

// Names of the files within the jailer root. Predefined names keep
// cleanup enumerable.
const FC_KERNEL: &str = "vmlinux";
const FC_ROOTFS: &str = "rootfs";
const FC_LOG_FIFO: &str = "logs.fifo";
const FC_METRICS_FIFO: &str = "metrics.fifo";
const FC_CONFIG_JSON: &str = "fcConfig.json";

/// Placeholder drives attached at boot so block storage can be hotplugged
/// later; the VMM cannot grow its device tree after it starts.
const DISK_POOL_SIZE: usize = 8;

const HYBRID_VSOCK_NAME: &str = "kata.hvsock";
const HYBRID_VSOCK_SCHEME: &str = "hybrid-vsock";

/// First usable vsock context id. Every VM can use the same one since it
/// only has meaning inside its own guest.
const GUEST_VSOCK_CID: u32 = 3;

/// Guest agent port on the hybrid vsock.
pub const VSOCK_PORT: u32 = 1024;
/// Guest log stream port on the hybrid vsock.
pub const VSOCK_LOGS_PORT: u32 = 1025;

/// Chroot base for the jailer. Must live on an exec-capable mount and stay
/// short: the API socket path has to fit in sun_path (108 bytes).
const CHROOT_BASE_DIR: &str = "/run/vc";

/// Ids are cut to UUID size so the socket path stays under the limit.
const MAX_ID_LEN: usize = 32;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Lifecycle states of the managed VMM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmmState {
    /// Created in memory; devices queue up until configuration starts.
    NotReady,
    /// Boot configuration assembled; pending devices have been drained.
    ConfigReady,
    /// The instance reported `Running`.
    VmReady,
}

impl std::fmt::Display for VmmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VmmState::NotReady => write!(f, "not ready"),
            VmmState::ConfigReady => write!(f, "configure ready"),
            VmmState::VmReady => write!(f, "vm ready"),
        }
    }
}

/// Process-level facts about the running VMM.
#[derive(Debug, Clone, Default)]
pub struct FirecrackerInfo {
    pub pid: i32,
    pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HotplugOp {
    Add,
    Remove,
}

/// Drives one Firecracker-style VMM from the outside: jailed filesystem
/// setup, boot configuration, process supervision, block hotplug and
/// teardown. One controller per sandbox, discarded after `cleanup`.
pub struct Firecracker {
    id: String,
    vm_path: PathBuf,
    chroot_base_dir: PathBuf,
    jail: PathJail,
    socket_path: PathBuf,
    netns_path: Option<String>,
    uid: u32,
    gid: u32,
    stateful: bool,

    config: HypervisorConfig,
    info: FirecrackerInfo,
    client: Option<FirecrackerClient>,

    state: RwLock<VmmState>,
    pending_devices: Vec<Device>,

    fc_config: FcConfig,
    fc_config_path: PathBuf,
}

fn drive_index_to_id(index: usize) -> String {
    format!("drive_{}", index)
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Overlong sandbox ids would push the API socket path past the sun_path
/// limit; cut them down to UUID size.
fn truncate_id(id: &str) -> String {
    if id.len() <= MAX_ID_LEN {
        return id.to_string();
    }
    let mut end = MAX_ID_LEN;
    while !id.is_char_boundary(end) {
        end -= 1;
    }
    id[..end].to_string()
}

fn write_file_with_mode(path: &Path, data: &[u8], mode: u32) -> Result<()> {
    use std::io::Write;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
        .map_err(|err| VmmError::Io(format!("opening {} failed: {}", path.display(), err)))?;
    file.write_all(data)
        .map_err(|err| VmmError::Io(format!("writing {} failed: {}", path.display(), err)))
}

impl Firecracker {
    /// Set up the controller in memory. The VM itself is created and
    /// started by `start_sandbox`.
    ///
    /// All jailed assets live under `<chroot_base>/<vmm_name>/<id>`; the
    /// jailer derives its cgroup paths from the same two components.
    pub fn create_sandbox(
        id: &str,
        netns_path: Option<String>,
        config: HypervisorConfig,
        stateful: bool,
    ) -> Result<Self> {
        if config.hypervisor_path.as_os_str().is_empty() {
            return Err(VmmError::InvalidArgument(
                "empty hypervisor path".to_string(),
            ));
        }
        if config.kernel_path.as_os_str().is_empty() {
            return Err(VmmError::InvalidArgument("empty kernel path".to_string()));
        }

        let id = truncate_id(id);
        let hypervisor_name = config
            .hypervisor_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                VmmError::InvalidArgument(format!(
                    "hypervisor path {} has no file name",
                    config.hypervisor_path.display()
                ))
            })?;

        let chroot_base_dir = PathBuf::from(CHROOT_BASE_DIR);
        let vm_path = chroot_base_dir.join(&hypervisor_name).join(&id);
        // Auto-created by the jailer when jailing is on.
        let jailer_root = vm_path.join("root");
        let socket_path = jailer_root.join("run").join(FC_API_SOCKET);
        let fc_config_path = vm_path.join(FC_CONFIG_JSON);

        Ok(Self {
            id,
            vm_path,
            chroot_base_dir,
            jail: PathJail::new(jailer_root),
            socket_path,
            netns_path,
            // Until a lower-privileged user exists, the VMM runs as root.
            uid: 0,
            gid: 0,
            stateful,
            config,
            info: FirecrackerInfo::default(),
            client: None,
            state: RwLock::new(VmmState::NotReady),
            pending_devices: Vec::new(),
            fc_config: FcConfig::default(),
            fc_config_path,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn vm_path(&self) -> &Path {
        &self.vm_path
    }

    pub fn jailer_root(&self) -> &Path {
        self.jail.root()
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn info(&self) -> &FirecrackerInfo {
        &self.info
    }

    pub fn hypervisor_config(&self) -> &HypervisorConfig {
        &self.config
    }

    /// The assembled boot configuration (complete once configuration ran).
    pub fn boot_config(&self) -> &FcConfig {
        &self.fc_config
    }

    pub async fn state(&self) -> VmmState {
        *self.state.read().await
    }

    async fn set_state(&self, state: VmmState) {
        let mut guard = self.state.write().await;
        let previous = *guard;
        debug!(from = %previous, to = %state, "vmm state transition");
        *guard = state;
    }

    // --- Boot configuration builders ---

    fn fc_set_vm_base_config(&mut self, mem_size_mib: u32, vcpu_count: u32, ht_enabled: bool) {
        debug!(mem_size_mib, vcpu_count, ht_enabled, "setting machine config");
        self.fc_config.machine_config = Some(MachineConfig {
            vcpu_count,
            mem_size_mib,
            ht_enabled,
        });
    }

    fn fc_set_boot_source(&mut self, kernel_path: &Path, boot_args: String) -> Result<()> {
        debug!(kernel = %kernel_path.display(), args = %boot_args, "setting boot source");

        let jailed_kernel = self.jail.jail_resource(kernel_path, FC_KERNEL)?;
        self.fc_config.boot_source = Some(BootSource {
            kernel_image_path: path_str(&jailed_kernel),
            boot_args,
        });

        Ok(())
    }

    fn fc_set_vm_rootfs(&mut self, image_path: &Path) -> Result<()> {
        let jailed_rootfs = self.jail.jail_resource(image_path, FC_ROOTFS)?;

        // A regular block device, not a root device: the kernel args point
        // at the first partition of the first drive, which allows a
        // partitioned root image.
        self.fc_config.drives.push(Drive {
            drive_id: "rootfs".to_string(),
            path_on_host: path_str(&jailed_rootfs),
            is_read_only: true,
            is_root_device: false,
        });

        Ok(())
    }

    /// Attach the fixed pool of zero-byte placeholder drives that hotplug
    /// later repoints at real backing files.
    fn create_disk_pool(&mut self) -> Result<()> {
        for index in 0..DISK_POOL_SIZE {
            let drive_id = drive_index_to_id(index);
            let jailed_drive = self.jail.create_jailed_drive(&drive_id)?;

            self.fc_config.drives.push(Drive {
                drive_id,
                path_on_host: path_str(&jailed_drive),
                is_read_only: false,
                is_root_device: false,
            });
        }

        Ok(())
    }

    fn fc_set_logger(&mut self) -> Result<()> {
        let level = if self.config.debug { "Debug" } else { "Error" };

        let jailed_log_fifo = self.listen_to_fifo(FC_LOG_FIFO)?;
        let jailed_metrics_fifo = self.listen_to_fifo(FC_METRICS_FIFO)?;

        self.fc_config.logger = Some(LoggerConfig {
            level: level.to_string(),
            log_fifo: path_str(&jailed_log_fifo),
            metrics_fifo: path_str(&jailed_metrics_fifo),
        });

        Ok(())
    }

    /// Create a named pipe for one VMM output stream, jail it and start
    /// draining it in the background. Returns the guest-visible path.
    fn listen_to_fifo(&self, fifo_name: &str) -> Result<PathBuf> {
        let fifo_path = self.vm_path.join(fifo_name);
        let receiver = fifo::open_fifo(&fifo_path)?;
        let jailed_path = self.jail.jail_resource(&fifo_path, fifo_name)?;
        fifo::spawn_drainer(receiver, fifo_name.to_string());
        Ok(jailed_path)
    }

    fn fc_add_vsock(&mut self, hvs: &HybridVSock) {
        // Inside the jail the socket always sits at the chroot root under
        // its well-known name, whatever path the caller supplied.
        let uds_path = if self.jail.jailed() {
            Path::new("/").join(HYBRID_VSOCK_NAME)
        } else {
            hvs.uds_path.clone()
        };

        self.fc_config.vsock = Some(Vsock {
            vsock_id: "root".to_string(),
            guest_cid: GUEST_VSOCK_CID,
            uds_path: path_str(&uds_path),
        });
    }

    fn fc_add_net_device(&mut self, endpoint: &NetworkEndpoint) {
        self.fc_config.network_interfaces.push(NetworkInterface {
            iface_id: endpoint.name.clone(),
            host_dev_name: endpoint.tap_dev_name.clone(),
            guest_mac: endpoint.guest_mac.clone(),
            allow_mmds_requests: false,
        });
    }

    fn fc_add_block_drive(&mut self, drive: &BlockDrive) -> Result<()> {
        let jailed_drive = self.jail.jail_resource(&drive.file, &drive.id)?;

        self.fc_config.drives.push(Drive {
            drive_id: drive.id.clone(),
            path_on_host: path_str(&jailed_drive),
            is_read_only: false,
            is_root_device: false,
        });

        Ok(())
    }

    // --- Device handling ---

    /// Attach a device. Until configuration starts the device is queued
    /// and replayed in insertion order when the VM becomes configurable.
    pub async fn add_device(&mut self, device: Device) -> Result<()> {
        let state = *self.state.read().await;
        if state == VmmState::NotReady {
            info!(kind = device.kind(), "vmm not ready, queueing device");
            self.pending_devices.push(device);
            return Ok(());
        }

        self.route_device(&device)
    }

    fn route_device(&mut self, device: &Device) -> Result<()> {
        info!(kind = device.kind(), "adding device");
        match device {
            Device::Network(endpoint) => {
                self.fc_add_net_device(endpoint);
                Ok(())
            }
            Device::Block(drive) => self.fc_add_block_drive(drive),
            Device::HybridVsock(hvs) => {
                self.fc_add_vsock(hvs);
                Ok(())
            }
        }
    }

    // --- Lifecycle ---

    /// Assemble the whole boot configuration: machine, boot source,
    /// rootfs, disk pool and logger, then drain the pending devices.
    async fn fc_init_configuration(&mut self) -> Result<()> {
        // The VMM creates its API socket under `run` inside the jail root.
        fs::create_dir_all(self.jail.root().join("run"))?;

        if self.config.jailer_path.is_some() {
            self.jail.set_jailed(true);
            self.jail.remount_root_with_exec()?;
        }

        self.fc_set_vm_base_config(self.config.mem_size_mib, self.config.vcpu_count, false);

        let boot_args = config::assemble_boot_args(
            &self.config.kernel_params,
            self.config.debug,
            self.stateful,
            VSOCK_LOGS_PORT,
        );
        let kernel_path = self.config.kernel_path.clone();
        self.fc_set_boot_source(&kernel_path, boot_args)?;

        let image = self.config.boot_image()?.to_path_buf();
        self.fc_set_vm_rootfs(&image)?;

        self.create_disk_pool()?;
        self.fc_set_logger()?;

        self.set_state(VmmState::ConfigReady).await;

        let pending = std::mem::take(&mut self.pending_devices);
        for device in &pending {
            self.route_device(device)?;
        }

        Ok(())
    }

    fn build_launch_args(&self) -> Result<(PathBuf, Vec<String>)> {
        let mut args: Vec<String> = Vec::new();

        if !self.config.debug && self.stateful {
            args.push("--daemonize".to_string());
        }

        if self.jail.jailed() {
            let jailer_path = self.config.jailer_path.clone().ok_or_else(|| {
                VmmError::InvalidArgument("jailed without a jailer path".to_string())
            })?;

            args.extend([
                "--id".to_string(),
                self.id.clone(),
                // NUMA topology is not modeled; everything pins to node 0.
                "--node".to_string(),
                "0".to_string(),
                "--exec-file".to_string(),
                path_str(&self.config.hypervisor_path),
                "--uid".to_string(),
                self.uid.to_string(),
                "--gid".to_string(),
                self.gid.to_string(),
                "--chroot-base-dir".to_string(),
                path_str(&self.chroot_base_dir),
            ]);
            if let Some(netns) = self.netns_path.as_deref().filter(|path| !path.is_empty()) {
                args.push("--netns".to_string());
                args.push(netns.to_string());
            }
            args.push("--".to_string());
            args.push("--config-file".to_string());
            args.push(path_str(&self.fc_config_path));

            Ok((jailer_path, args))
        } else {
            args.extend([
                "--api-sock".to_string(),
                path_str(&self.socket_path),
                "--config-file".to_string(),
                path_str(&self.fc_config_path),
            ]);

            Ok((self.config.hypervisor_path.clone(), args))
        }
    }

    /// Version-gate the VMM, launch it (under the jailer when configured)
    /// and wait until the instance reports `Running`.
    async fn fc_init(&mut self, timeout: Duration) -> Result<()> {
        self.info.version = process::detect_version(&self.config.hypervisor_path).await?;
        process::check_version(&self.info.version)?;

        // The VMM reads its config from inside the chroot, so the file
        // written under vm_path gets bind-mounted into the jail root.
        let host_config_path = self.fc_config_path.clone();
        self.fc_config_path = self.jail.jail_resource(&host_config_path, FC_CONFIG_JSON)?;

        let (exe, args) = self.build_launch_args()?;
        debug!(exe = %exe.display(), args = ?args, "launching vmm");

        let mut command = Command::new(&exe);
        command.args(&args).stdin(Stdio::null()).kill_on_drop(true);

        if self.config.debug && self.stateful {
            let (stdout, stderr) = process::watch_console(&self.id)?;
            command.stdout(stdout).stderr(stderr);
        } else {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }

        info!(sandbox = %self.id, "starting vmm");
        let mut child = command.spawn().map_err(|err| {
            VmmError::Spawn(format!("starting {} failed: {}", exe.display(), err))
        })?;

        self.info.pid = child.id().map(|pid| pid as i32).unwrap_or_default();

        // Reap in the background so the signal-0 probes in shutdown and
        // check observe the real process state, not a zombie.
        let sandbox = self.id.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!(sandbox = %sandbox, %status, "vmm process exited"),
                Err(err) => warn!(sandbox = %sandbox, error = %err, "waiting on vmm failed"),
            }
        });

        self.client = Some(FirecrackerClient::new(&self.socket_path));

        self.wait_vmm_running(timeout).await
    }

    async fn vm_running(&self) -> bool {
        let client = match &self.client {
            Some(client) => client,
            None => return false,
        };

        match client.describe_instance().await {
            Ok(instance) => match instance.state {
                InstanceState::Running => true,
                InstanceState::Starting => {
                    debug!(state = ?instance.state, "unexpected instance state");
                    false
                }
                _ => false,
            },
            Err(err) => {
                debug!(error = %err, "querying instance state failed");
                false
            }
        }
    }

    /// Poll the control API every few milliseconds until the instance is
    /// `Running` or the deadline passes.
    async fn wait_vmm_running(&self, timeout: Duration) -> Result<()> {
        let start = tokio::time::Instant::now();
        loop {
            if self.vm_running().await {
                return Ok(());
            }
            if start.elapsed() > timeout {
                return Err(VmmError::Timeout(format!(
                    "vmm not running after {:?}",
                    timeout
                )));
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Bring the VM all the way up. On any failure the VMM is stopped and
    /// every jail artifact created so far is released.
    pub async fn start_sandbox(&mut self, timeout: Duration) -> Result<()> {
        if let Err(err) = self.start_sandbox_inner(timeout).await {
            if let Err(end_err) = self.fc_end().await {
                warn!(error = %end_err, "stopping vmm after failed start");
            }
            self.cleanup();
            return Err(err);
        }
        Ok(())
    }

    async fn start_sandbox_inner(&mut self, timeout: Duration) -> Result<()> {
        self.fc_init_configuration().await?;

        let data = serde_json::to_vec_pretty(&self.fc_config)?;
        write_file_with_mode(&self.fc_config_path, &data, 0o640)?;

        self.fc_init(timeout).await?;

        // Others must not reach the guest-agent socket.
        let hvsock_path = self.jail.root().join(HYBRID_VSOCK_NAME);
        fs::set_permissions(&hvsock_path, fs::Permissions::from_mode(0o640)).map_err(|err| {
            VmmError::Io(format!(
                "changing permissions on {} failed: {}",
                hvsock_path.display(),
                err
            ))
        })?;

        self.set_state(VmmState::VmReady).await;
        Ok(())
    }

    /// Stop the VMM process. Harmless when it never started or already
    /// exited.
    pub async fn fc_end(&mut self) -> Result<()> {
        info!(sandbox = %self.id, "stopping vmm");
        match process::shutdown(self.info.pid).await {
            Ok(()) => {
                info!(sandbox = %self.id, "vmm stopped");
                Ok(())
            }
            Err(err) => {
                warn!(sandbox = %self.id, error = %err, "stopping vmm failed");
                Err(err)
            }
        }
    }

    pub async fn stop_sandbox(&mut self) -> Result<()> {
        self.fc_end().await
    }

    /// Release every jail artifact: detach the per-resource binds, the
    /// jail root itself when jailing was on, then remove the vm directory.
    /// Individual failures are logged and skipped so partial state is
    /// always freed.
    pub fn cleanup(&self) {
        self.jail.umount_resource(FC_KERNEL);
        self.jail.umount_resource(FC_ROOTFS);
        self.jail.umount_resource(FC_LOG_FIFO);
        self.jail.umount_resource(FC_METRICS_FIFO);
        self.jail.umount_resource(FC_CONFIG_JSON);

        if self.config.jailer_path.is_some() {
            self.jail.umount_root();
        }

        info!(path = %self.vm_path.display(), "removing vm directory");
        if let Err(err) = fs::remove_dir_all(&self.vm_path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                error!(path = %self.vm_path.display(), error = %err, "removing vm directory failed");
            }
        }
    }

    /// Drop the connection state. The next start begins from scratch.
    pub async fn disconnect(&mut self) {
        self.set_state(VmmState::NotReady).await;
    }

    // --- Hotplug ---

    /// Repoint a pool drive at a real backing file after boot. Only block
    /// drives can be hotplugged.
    pub async fn hotplug_add_device(&mut self, device: &Device) -> Result<()> {
        match device {
            Device::Block(drive) => self.hotplug_block_device(drive, HotplugOp::Add).await,
            _ => {
                warn!(kind = device.kind(), "hotplug add: unsupported device");
                Err(VmmError::Unsupported(format!(
                    "cannot hot add device kind {}",
                    device.kind()
                )))
            }
        }
    }

    /// Point a pool drive back at its zero-byte placeholder and release
    /// the backing file on the host.
    pub async fn hotplug_remove_device(&mut self, device: &Device) -> Result<()> {
        match device {
            Device::Block(drive) => self.hotplug_block_device(drive, HotplugOp::Remove).await,
            _ => {
                warn!(kind = device.kind(), "hotplug remove: unsupported device");
                Err(VmmError::Unsupported(format!(
                    "cannot hot remove device kind {}",
                    device.kind()
                )))
            }
        }
    }

    async fn hotplug_block_device(&mut self, drive: &BlockDrive, op: HotplugOp) -> Result<()> {
        // The caller's drive index picks the pool slot; the placeholder
        // for that id has existed since boot.
        let drive_id = drive_index_to_id(drive.index);

        let path = match op {
            HotplugOp::Add => self.jail.jail_resource(&drive.file, &drive_id)?,
            HotplugOp::Remove => {
                // Detach the bind so the host can destroy the backing
                // file; the guest sees the empty placeholder again.
                self.jail.umount_resource(&drive_id);
                self.jail.placeholder_path(&drive_id)
            }
        };

        self.fc_update_block_drive(&path, &drive_id).await
    }

    async fn fc_update_block_drive(&self, path: &Path, drive_id: &str) -> Result<()> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| VmmError::Api("vmm api client not connected".to_string()))?;

        client.patch_guest_drive(drive_id, path).await
    }

    // --- Queries and no-ops ---

    /// Signal-0 probe of the recorded VMM process.
    pub fn check(&self) -> Result<()> {
        process::ping(self.info.pid)
    }

    /// Discover the `fc_vcpu` threads for host-side cgroup pinning.
    pub fn get_thread_ids(&self) -> Result<VcpuThreadIds> {
        process::vcpu_thread_ids(self.info.pid)
    }

    pub fn get_pids(&self) -> Vec<i32> {
        vec![self.info.pid]
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            block_device_hotplug: true,
        }
    }

    /// Not supported by this VMM; succeeds without doing anything.
    pub async fn pause_sandbox(&mut self) -> Result<()> {
        Ok(())
    }

    /// Not supported by this VMM; succeeds without doing anything.
    pub async fn save_sandbox(&mut self) -> Result<()> {
        Ok(())
    }

    /// Not supported by this VMM; succeeds without doing anything.
    pub async fn resume_sandbox(&mut self) -> Result<()> {
        Ok(())
    }

    /// The VMM cannot grow guest memory after boot.
    pub fn resize_memory(&self, _requested_mib: u32) -> Result<u32> {
        Ok(0)
    }

    /// The VMM cannot change the vCPU count after boot.
    pub fn resize_vcpus(&self, _requested: u32) -> Result<(u32, u32)> {
        Ok((0, 0))
    }

    /// URI of the console stream carried over the hybrid vsock.
    pub fn get_sandbox_console(&self, _id: &str) -> Result<String> {
        Ok(format!(
            "{}://{}:{}",
            HYBRID_VSOCK_SCHEME,
            self.jail.root().join(HYBRID_VSOCK_NAME).display(),
            VSOCK_LOGS_PORT
        ))
    }

    /// The guest-agent endpoint for this VM. Only hybrid vsock transport
    /// is available.
    pub fn generate_socket(&self, _id: &str, use_vsock: bool) -> Result<HybridVSock> {
        if !use_vsock {
            return Err(VmmError::Unsupported(
                "the vmm requires hybrid vsock".to_string(),
            ));
        }

        debug!("using hybrid vsock endpoint");
        Ok(HybridVSock {
            uds_path: self.jail.root().join(HYBRID_VSOCK_NAME),
            port: VSOCK_PORT,
        })
    }

    pub fn save(&self) -> HypervisorState {
        HypervisorState {
            pid: self.info.pid,
            hypervisor_type: "firecracker".to_string(),
        }
    }

    pub fn load(&mut self, state: &HypervisorState) {
        self.info.pid = state.pid;
    }

    pub fn from_grpc(&mut self, _config: &HypervisorConfig, _data: &[u8]) -> Result<()> {
        Err(VmmError::Unsupported(
            "firecracker is not supported by the vm cache".to_string(),
        ))
    }

    pub fn to_grpc(&self) -> Result<Vec<u8>> {
        Err(VmmError::Unsupported(
            "firecracker is not supported by the vm cache".to_string(),
        ))
    }
}
