/// Errors surfaced by the microVM lifecycle controller.
#[derive(Debug)]
pub enum VmmError {
    /// Empty jail paths, missing configuration, vsock disabled, etc.
    InvalidArgument(String),
    /// The VMM binary reports a version below the minimum supported one,
    /// or its `--version` output could not be parsed.
    IncompatibleVersion(String),
    /// Mount, unmount, open/create, chmod, mkdir, write or remove failure.
    Io(String),
    /// The VMM or jailer process could not be started.
    Spawn(String),
    /// Transport or decode failure against the VMM control socket.
    Api(String),
    /// The VMM did not reach the running state within the deadline.
    Timeout(String),
    /// Operation not supported by this VMM.
    Unsupported(String),
    /// Liveness probe of the VMM process failed.
    NotRunning(String),
    /// A vCPU thread had an `fc_vcpu` name with an unparseable index.
    MalformedThreadName(String),
}

pub type Result<T> = std::result::Result<T, VmmError>;

impl std::fmt::Display for VmmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VmmError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            VmmError::IncompatibleVersion(msg) => {
                write!(f, "incompatible vmm version: {}", msg)
            }
            VmmError::Io(msg) => write!(f, "i/o failed: {}", msg),
            VmmError::Spawn(msg) => write!(f, "spawn failed: {}", msg),
            VmmError::Api(msg) => write!(f, "vmm api failed: {}", msg),
            VmmError::Timeout(msg) => write!(f, "timeout: {}", msg),
            VmmError::Unsupported(msg) => write!(f, "unsupported: {}", msg),
            VmmError::NotRunning(msg) => write!(f, "vmm not running: {}", msg),
            VmmError::MalformedThreadName(msg) => {
                write!(f, "malformed vcpu thread name: {}", msg)
            }
        }
    }
}

impl std::error::Error for VmmError {}

impl From<std::io::Error> for VmmError {
    fn from(err: std::io::Error) -> Self {
        VmmError::Io(err.to_string())
    }
}

impl From<nix::Error> for VmmError {
    fn from(err: nix::Error) -> Self {
        VmmError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for VmmError {
    fn from(err: serde_json::Error) -> Self {
        VmmError::Io(format!("json serialization failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_argument_display() {
        let err = VmmError::InvalidArgument("empty jail path".to_string());
        assert_eq!(err.to_string(), "invalid argument: empty jail path");
    }

    #[test]
    fn incompatible_version_display() {
        let err = VmmError::IncompatibleVersion("0.20.0 < 0.21.1".to_string());
        assert_eq!(err.to_string(), "incompatible vmm version: 0.20.0 < 0.21.1");
    }

    #[test]
    fn timeout_display() {
        let err = VmmError::Timeout("not running after 10s".to_string());
        assert_eq!(err.to_string(), "timeout: not running after 10s");
    }

    #[test]
    fn not_running_display() {
        let err = VmmError::NotRunning("ESRCH".to_string());
        assert_eq!(err.to_string(), "vmm not running: ESRCH");
    }

    #[test]
    fn from_io_error_maps_to_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: VmmError = io.into();
        assert!(matches!(err, VmmError::Io(_)));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn from_nix_error_maps_to_io() {
        let err: VmmError = nix::errno::Errno::EPERM.into();
        assert!(matches!(err, VmmError::Io(_)));
    }

    #[test]
    fn is_std_error() {
        let err = VmmError::Unsupported("vm cache".to_string());
        let _: &dyn std::error::Error = &err;
    }

    #[test]
    fn debug_format_names_variant() {
        let err = VmmError::Spawn("no such file".to_string());
        let debug = format!("{:?}", err);
        assert!(debug.contains("Spawn"));
        assert!(debug.contains("no such file"));
    }
}
