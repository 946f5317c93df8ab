use std::fs::File;
use std::path::{Path, PathBuf};

use nix::mount::{mount, umount2, MntFlags, MsFlags};
use tracing::{debug, error};

use crate::error::{Result, VmmError};

/// Bind-mounts host resources into the jailer chroot and translates host
/// paths into the paths the VMM will see.
///
/// When jailing is disabled the same helper still owns resource placement
/// (everything lives under the would-be chroot root) but returns host-side
/// paths instead of chroot-relative ones.
#[derive(Debug, Clone)]
pub struct PathJail {
    root: PathBuf,
    jailed: bool,
}

impl PathJail {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            jailed: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn jailed(&self) -> bool {
        self.jailed
    }

    pub fn set_jailed(&mut self, jailed: bool) {
        self.jailed = jailed;
    }

    /// Bind-mount `src` at `<root>/<dst>` (slave propagation, read-write)
    /// and return the path the VMM will see: `/<dst>` when jailed, the
    /// host-side bind target otherwise.
    pub fn jail_resource(&self, src: &Path, dst: &str) -> Result<PathBuf> {
        if src.as_os_str().is_empty() || dst.is_empty() {
            return Err(VmmError::InvalidArgument(format!(
                "invalid jail locations: src: {:?}, dst: {:?}",
                src, dst
            )));
        }

        let target = self.root.join(dst);
        bind_mount(src, &target, MsFlags::MS_SLAVE)?;

        if !self.jailed {
            return Ok(target);
        }
        Ok(Path::new("/").join(dst))
    }

    /// Create an empty regular file at `<root>/<name>` to back a placeholder
    /// drive. Nothing is mounted; the file is a stand-in until hotplug
    /// bind-mounts real backing storage over it.
    pub fn create_jailed_drive(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() {
            return Err(VmmError::InvalidArgument(
                "empty placeholder drive name".to_string(),
            ));
        }

        let host_path = self.root.join(name);
        File::create(&host_path).map_err(|err| {
            VmmError::Io(format!(
                "creating placeholder drive {} failed: {}",
                host_path.display(),
                err
            ))
        })?;

        Ok(self.placeholder_path(name))
    }

    /// The placeholder backing path for `name`, as the VMM sees it.
    pub fn placeholder_path(&self, name: &str) -> PathBuf {
        if self.jailed {
            Path::new("/").join(name)
        } else {
            self.root.join(name)
        }
    }

    /// Re-mount the jail root so binaries inside it may be executed.
    ///
    /// `/run` is normally mounted rw,nosuid,relatime,noexec; the jailer
    /// copies the VMM binary into the chroot and executes it there, so the
    /// re-mount deliberately leaves out MS_NOEXEC.
    pub fn remount_root_with_exec(&self) -> Result<()> {
        bind_mount(&self.root, &self.root, MsFlags::MS_SHARED).map_err(|err| {
            error!(root = %self.root.display(), error = %err, "bind mount of jail root failed");
            err
        })?;

        remount(&self.root, MsFlags::MS_NOSUID | MsFlags::MS_RELATIME).map_err(|err| {
            error!(root = %self.root.display(), error = %err, "re-mount of jail root failed");
            err
        })
    }

    /// Detach a mounted resource under the jail root. Failures are logged
    /// and swallowed so the rest of a cleanup pass still runs.
    pub fn umount_resource(&self, name: &str) {
        let host_path = self.root.join(name);
        debug!(resource = %host_path.display(), "unmounting jailed resource");
        if let Err(err) = umount2(&host_path, MntFlags::MNT_DETACH) {
            error!(resource = %host_path.display(), error = %err, "umount failed");
        }
    }

    /// Detach the jail root bind itself (the counterpart of
    /// `remount_root_with_exec`).
    pub fn umount_root(&self) {
        if let Err(err) = umount2(&self.root, MntFlags::MNT_DETACH) {
            error!(root = %self.root.display(), error = %err, "umount of jail root failed");
        }
    }
}

/// Bind `src` onto `dst`, then switch the mount's propagation mode.
/// Propagation cannot ride along with MS_BIND; it takes a second call.
fn bind_mount(src: &Path, dst: &Path, propagation: MsFlags) -> Result<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // The bind target must exist with the right type before mount(2).
    if !dst.exists() {
        if src.is_dir() {
            std::fs::create_dir_all(dst)?;
        } else {
            File::create(dst)?;
        }
    }

    mount(
        Some(src),
        dst,
        None::<&str>,
        MsFlags::MS_BIND,
        None::<&str>,
    )
    .map_err(|err| {
        VmmError::Io(format!(
            "bind mount {} -> {} failed: {}",
            src.display(),
            dst.display(),
            err
        ))
    })?;

    mount(None::<&str>, dst, None::<&str>, propagation, None::<&str>).map_err(|err| {
        VmmError::Io(format!(
            "setting propagation on {} failed: {}",
            dst.display(),
            err
        ))
    })
}

fn remount(dst: &Path, flags: MsFlags) -> Result<()> {
    mount(
        None::<&str>,
        dst,
        None::<&str>,
        MsFlags::MS_REMOUNT | flags,
        None::<&str>,
    )
    .map_err(|err| VmmError::Io(format!("re-mount of {} failed: {}", dst.display(), err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_jail(name: &str) -> PathJail {
        let root = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&root);
        std::fs::create_dir_all(&root).unwrap();
        PathJail::new(root)
    }

    #[test]
    fn jail_resource_rejects_empty_src() {
        let jail = PathJail::new("/tmp/fcvisor-jail-test");
        let result = jail.jail_resource(Path::new(""), "vmlinux");
        assert!(matches!(result, Err(VmmError::InvalidArgument(_))));
    }

    #[test]
    fn jail_resource_rejects_empty_dst() {
        let jail = PathJail::new("/tmp/fcvisor-jail-test");
        let result = jail.jail_resource(Path::new("/boot/vmlinux"), "");
        assert!(matches!(result, Err(VmmError::InvalidArgument(_))));
    }

    #[test]
    fn create_jailed_drive_rejects_empty_name() {
        let jail = PathJail::new("/tmp/fcvisor-jail-test");
        assert!(matches!(
            jail.create_jailed_drive(""),
            Err(VmmError::InvalidArgument(_))
        ));
    }

    #[test]
    fn create_jailed_drive_makes_empty_file() {
        let jail = temp_jail("fcvisor-jail-drive-test");
        let path = jail.create_jailed_drive("drive_0").unwrap();

        // Not jailed: the returned path is the host path.
        assert_eq!(path, jail.root().join("drive_0"));
        let meta = std::fs::metadata(&path).unwrap();
        assert!(meta.is_file());
        assert_eq!(meta.len(), 0);

        let _ = std::fs::remove_dir_all(jail.root());
    }

    #[test]
    fn create_jailed_drive_returns_guest_path_when_jailed() {
        let mut jail = temp_jail("fcvisor-jail-drive-jailed-test");
        jail.set_jailed(true);

        let path = jail.create_jailed_drive("drive_3").unwrap();
        assert_eq!(path, PathBuf::from("/drive_3"));
        // The backing file still lands on the host side.
        assert!(jail.root().join("drive_3").exists());

        let _ = std::fs::remove_dir_all(jail.root());
    }

    #[test]
    fn placeholder_path_follows_jailed_flag() {
        let mut jail = PathJail::new("/run/vc/firecracker/sb/root");
        assert_eq!(
            jail.placeholder_path("drive_5"),
            PathBuf::from("/run/vc/firecracker/sb/root/drive_5")
        );
        jail.set_jailed(true);
        assert_eq!(jail.placeholder_path("drive_5"), PathBuf::from("/drive_5"));
    }

    #[test]
    fn umount_resource_on_unmounted_path_does_not_panic() {
        let jail = temp_jail("fcvisor-jail-umount-test");
        // Nothing is mounted there; the failure is logged and swallowed.
        jail.umount_resource("vmlinux");
        let _ = std::fs::remove_dir_all(jail.root());
    }

    #[test]
    fn jailed_flag_round_trip() {
        let mut jail = PathJail::new("/tmp/x");
        assert!(!jail.jailed());
        jail.set_jailed(true);
        assert!(jail.jailed());
    }
}
