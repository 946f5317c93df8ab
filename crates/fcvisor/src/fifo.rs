use std::path::Path;

use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use tokio::io::AsyncBufReadExt;
use tokio::net::unix::pipe;
use tracing::{debug, error, warn};

use crate::error::{Result, VmmError};

/// Create (if needed) a named pipe at `path` and open it for reading
/// without blocking on a writer showing up.
pub fn open_fifo(path: &Path) -> Result<pipe::Receiver> {
    match mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR) {
        Ok(()) => {}
        Err(nix::errno::Errno::EEXIST) => {}
        Err(err) => {
            return Err(VmmError::Io(format!(
                "creating fifo {} failed: {}",
                path.display(),
                err
            )))
        }
    }

    pipe::OpenOptions::new().open_receiver(path).map_err(|err| {
        VmmError::Io(format!("opening fifo {} failed: {}", path.display(), err))
    })
}

/// Drain a VMM fifo line by line from a detached task, emitting each line
/// as a log event tagged with the fifo name. The VMM only writes failure
/// output here, so lines surface at error level. The task ends on EOF or
/// read error and the pipe closes when the receiver drops.
pub fn spawn_drainer(rx: pipe::Receiver, fifo_name: String) {
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(rx).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(contents)) => {
                    error!(fifo = %fifo_name, contents = %contents, "vmm failure output");
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(fifo = %fifo_name, error = %err, "reading vmm fifo failed");
                    break;
                }
            }
        }
        debug!(fifo = %fifo_name, "fifo drainer finished");
    });
}
