use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use nix::errno::Errno;
use nix::pty::{openpty, OpenptyResult};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use semver::Version;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Result, VmmError};

/// How long to wait between SIGTERM and SIGKILL.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(15);

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

fn min_supported_version() -> Version {
    Version::new(0, 21, 1)
}

/// Run `<vmm> --version` and return the reported version string.
pub async fn detect_version(hypervisor_path: &Path) -> Result<String> {
    let output = Command::new(hypervisor_path)
        .arg("--version")
        .output()
        .await
        .map_err(|err| {
            VmmError::Spawn(format!(
                "running {} --version failed: {}",
                hypervisor_path.display(),
                err
            ))
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_version_output(&stdout)
}

/// Extract the version token from `--version` output.
///
/// The usual form is `Firecracker vX.Y.Z`; a bare `vX.Y.Z` is accepted as
/// well. The leading `v` is stripped.
pub fn parse_version_output(output: &str) -> Result<String> {
    let mut fields = output.split_whitespace();
    let first = fields.next().ok_or_else(|| {
        VmmError::IncompatibleVersion("empty --version output".to_string())
    })?;
    let token = fields.next().unwrap_or(first);
    Ok(token.trim_start_matches('v').to_string())
}

/// Gate on the minimum supported VMM version.
pub fn check_version(version: &str) -> Result<()> {
    let parsed = Version::parse(version).map_err(|err| {
        VmmError::IncompatibleVersion(format!("malformed version {:?}: {}", version, err))
    })?;

    let min = min_supported_version();
    if parsed < min {
        return Err(VmmError::IncompatibleVersion(format!(
            "version {} is not supported, minimum is {}",
            parsed, min
        )));
    }

    Ok(())
}

/// Stop a VMM process: SIGTERM, poll for exit, SIGKILL as a last resort.
///
/// A process that is already gone, including one that never started
/// (pid 0), counts as stopped, so repeated calls are harmless.
pub async fn shutdown(pid: i32) -> Result<()> {
    if pid <= 0 {
        return Ok(());
    }
    let target = Pid::from_raw(pid);

    match kill(target, Signal::SIGTERM) {
        Ok(()) => {}
        Err(Errno::ESRCH) => return Ok(()),
        Err(err) => {
            return Err(VmmError::Io(format!(
                "sending SIGTERM to {} failed: {}",
                pid, err
            )))
        }
    }

    let start = tokio::time::Instant::now();
    while start.elapsed() < STOP_TIMEOUT {
        if kill(target, None::<Signal>).is_err() {
            return Ok(());
        }
        tokio::time::sleep(STOP_POLL_INTERVAL).await;
    }

    warn!(pid, "vmm still running after {:?}, sending SIGKILL", STOP_TIMEOUT);
    match kill(target, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => Err(VmmError::Io(format!(
            "sending SIGKILL to {} failed: {}",
            pid, err
        ))),
    }
}

/// Signal-0 liveness probe.
pub fn ping(pid: i32) -> Result<()> {
    if pid <= 0 {
        return Err(VmmError::NotRunning("vmm process never started".to_string()));
    }
    kill(Pid::from_raw(pid), None::<Signal>).map_err(|err| {
        VmmError::NotRunning(format!("pinging vmm process {} failed: {}", pid, err))
    })
}

/// vCPU index → thread id, discovered from the VMM's task list.
#[derive(Debug, Default)]
pub struct VcpuThreadIds {
    pub vcpus: HashMap<u32, i32>,
}

/// Walk `/proc/<pid>/task` and collect the `fc_vcpu<N>` threads so the
/// caller can pin them into cgroups. Threads with other names are skipped.
pub fn vcpu_thread_ids(pid: i32) -> Result<VcpuThreadIds> {
    let mut thread_ids = VcpuThreadIds::default();
    let task_dir = format!("/proc/{}/task", pid);

    for entry in std::fs::read_dir(&task_dir)? {
        let entry = entry?;
        let tid: i32 = match entry.file_name().to_string_lossy().parse() {
            Ok(tid) => tid,
            Err(_) => continue,
        };

        let comm = std::fs::read_to_string(entry.path().join("comm"))?;
        if let Some(vcpu_index) = parse_vcpu_index(comm.trim())? {
            thread_ids.vcpus.insert(vcpu_index, tid);
        }
    }

    Ok(thread_ids)
}

/// `Ok(None)` for non-vCPU threads; an `fc_vcpu` prefix with a bad suffix
/// is an error.
fn parse_vcpu_index(comm: &str) -> Result<Option<u32>> {
    match comm.strip_prefix("fc_vcpu") {
        None => Ok(None),
        Some(suffix) => suffix
            .parse()
            .map(Some)
            .map_err(|_| VmmError::MalformedThreadName(format!("thread comm: {:?}", comm))),
    }
}

/// Allocate a pty for the guest console: the slave side becomes the
/// child's stdout/stderr, the master is drained line-by-line from a
/// detached task that logs every line and stops on read failure.
pub fn watch_console(sandbox_id: &str) -> Result<(Stdio, Stdio)> {
    let OpenptyResult { master, slave } = openpty(None, None)
        .map_err(|err| VmmError::Io(format!("allocating console pty failed: {}", err)))?;

    let reader = std::fs::File::from(master);
    let sandbox = sandbox_id.to_string();
    tokio::task::spawn_blocking(move || {
        let lines = std::io::BufReader::new(reader).lines();
        for line in lines {
            match line {
                Ok(text) => {
                    info!(sandbox = %sandbox, vmconsole = %text, "reading guest console")
                }
                Err(err) => {
                    // EIO when the slave side closes; anything else is a
                    // genuine read failure. Either way the watcher is done.
                    debug!(sandbox = %sandbox, error = %err, "guest console closed");
                    break;
                }
            }
        }
        info!(sandbox = %sandbox, "console watcher finished");
    });

    let stdout = slave
        .try_clone()
        .map_err(|err| VmmError::Io(format!("duplicating console pty failed: {}", err)))?;
    Ok((Stdio::from(stdout), Stdio::from(slave)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_version_output_standard_form() {
        assert_eq!(
            parse_version_output("Firecracker v0.21.1\n").unwrap(),
            "0.21.1"
        );
    }

    #[test]
    fn parse_version_output_bare_tag() {
        assert_eq!(parse_version_output("v0.21.1").unwrap(), "0.21.1");
    }

    #[test]
    fn parse_version_output_empty_is_rejected() {
        assert!(matches!(
            parse_version_output("  \n"),
            Err(VmmError::IncompatibleVersion(_))
        ));
    }

    #[test]
    fn check_version_minimum_is_accepted() {
        assert!(check_version("0.21.1").is_ok());
    }

    #[test]
    fn check_version_newer_is_accepted() {
        assert!(check_version("0.23.0").is_ok());
        assert!(check_version("1.0.0").is_ok());
    }

    #[test]
    fn check_version_older_is_rejected() {
        assert!(matches!(
            check_version("0.21.0"),
            Err(VmmError::IncompatibleVersion(_))
        ));
        assert!(matches!(
            check_version("0.20.0"),
            Err(VmmError::IncompatibleVersion(_))
        ));
    }

    #[test]
    fn check_version_garbage_is_rejected() {
        assert!(matches!(
            check_version("garbage"),
            Err(VmmError::IncompatibleVersion(_))
        ));
    }

    #[test]
    fn version_gate_end_to_end_strings() {
        // The three boundary shapes of `--version` output.
        let old = parse_version_output("Firecracker v0.21.0").unwrap();
        assert!(check_version(&old).is_err());

        let ok = parse_version_output("v0.21.1").unwrap();
        assert!(check_version(&ok).is_ok());

        let garbage = parse_version_output("garbage").unwrap();
        assert!(check_version(&garbage).is_err());
    }

    #[tokio::test]
    async fn detect_version_runs_a_real_binary() {
        let dir = std::env::temp_dir().join("fcvisor-version-test");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let fake_vmm = dir.join("firecracker");
        std::fs::write(&fake_vmm, "#!/bin/sh\necho \"Firecracker v0.24.2\"\n").unwrap();
        let mut perms = std::fs::metadata(&fake_vmm).unwrap().permissions();
        use std::os::unix::fs::PermissionsExt;
        perms.set_mode(0o755);
        std::fs::set_permissions(&fake_vmm, perms).unwrap();

        let version = detect_version(&fake_vmm).await.unwrap();
        assert_eq!(version, "0.24.2");
        assert!(check_version(&version).is_ok());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn detect_version_missing_binary_is_spawn_error() {
        let result = detect_version(Path::new("/nonexistent/firecracker")).await;
        assert!(matches!(result, Err(VmmError::Spawn(_))));
    }

    #[test]
    fn parse_vcpu_index_extracts_suffix() {
        assert_eq!(parse_vcpu_index("fc_vcpu0").unwrap(), Some(0));
        assert_eq!(parse_vcpu_index("fc_vcpu12").unwrap(), Some(12));
    }

    #[test]
    fn parse_vcpu_index_skips_other_threads() {
        assert_eq!(parse_vcpu_index("fc_api").unwrap(), None);
        assert_eq!(parse_vcpu_index("firecracker").unwrap(), None);
    }

    #[test]
    fn parse_vcpu_index_rejects_bad_suffix() {
        assert!(matches!(
            parse_vcpu_index("fc_vcpu"),
            Err(VmmError::MalformedThreadName(_))
        ));
        assert!(matches!(
            parse_vcpu_index("fc_vcpuX"),
            Err(VmmError::MalformedThreadName(_))
        ));
    }

    #[test]
    fn vcpu_thread_ids_on_missing_pid_fails() {
        assert!(vcpu_thread_ids(-1).is_err());
    }

    #[test]
    fn ping_live_process_succeeds() {
        let pid = std::process::id() as i32;
        assert!(ping(pid).is_ok());
    }

    #[test]
    fn ping_never_started_is_not_running() {
        assert!(matches!(ping(0), Err(VmmError::NotRunning(_))));
        assert!(matches!(ping(-5), Err(VmmError::NotRunning(_))));
    }

    #[tokio::test]
    async fn shutdown_never_started_is_ok() {
        assert!(shutdown(0).await.is_ok());
        assert!(shutdown(-1).await.is_ok());
    }

    #[tokio::test]
    async fn shutdown_already_dead_child_is_ok() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id().unwrap() as i32;
        child.wait().await.unwrap();

        // Reaped child: SIGTERM gets ESRCH, which counts as stopped.
        assert!(shutdown(pid).await.is_ok());
        // And again, to confirm idempotence.
        assert!(shutdown(pid).await.is_ok());
    }

    #[tokio::test]
    async fn shutdown_terminates_a_live_child() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id().unwrap() as i32;

        let wait = tokio::spawn(async move { child.wait().await });
        shutdown(pid).await.unwrap();

        let status = wait.await.unwrap().unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn watch_console_hands_out_both_stdio_ends() {
        let (stdout, stderr) = watch_console("sb_console").unwrap();
        // Wire them into a child to prove the fds are usable.
        let mut child = Command::new("echo")
            .arg("hello from the guest")
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .unwrap();
        child.wait().await.unwrap();
    }
}
