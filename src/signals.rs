/// Signal delivery to the crawler's process group.
///
/// The crawler is spawned as the leader of its own group, so its pid doubles
/// as the group id. SIGINT lets Scrapy shut down gracefully and still print
/// its stats dump; nothing here escalates to SIGKILL.
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::sync::mpsc;

/// Ctrl-C presses, one `()` per press.
pub type Interrupts = mpsc::UnboundedReceiver<()>;

/// Listen for Ctrl-C for the rest of the process.
///
/// Listening replaces the default SIGINT disposition, so whoever holds the
/// receiver decides what an interrupt means.
pub fn ctrl_c_events() -> Interrupts {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

/// Send SIGINT to every process in the group.
pub fn interrupt_group(pgid: u32) -> nix::Result<()> {
    killpg(to_pid(pgid)?, Signal::SIGINT)
}

/// Whether any process in the group is still alive (null-signal probe).
pub fn group_alive(pgid: u32) -> bool {
    let Ok(pid) = to_pid(pgid) else {
        return false;
    };
    match killpg(pid, None) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(e) => {
            tracing::debug!(pgid, error = %e, "process group probe failed");
            false
        }
    }
}

fn to_pid(pgid: u32) -> nix::Result<Pid> {
    // Zero would address our own group.
    match i32::try_from(pgid) {
        Ok(raw) if raw > 0 => Ok(Pid::from_raw(raw)),
        _ => Err(Errno::EINVAL),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::CommandExt;
    use std::process::{Command, Stdio};

    #[test]
    fn test_zero_pgid_is_rejected() {
        assert_eq!(interrupt_group(0), Err(Errno::EINVAL));
        assert!(!group_alive(0));
    }

    #[test]
    fn test_interrupt_running_group() {
        let mut child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .process_group(0)
            .spawn()
            .unwrap();
        let pgid = child.id();

        assert!(group_alive(pgid));
        interrupt_group(pgid).unwrap();
        let status = child.wait().unwrap();
        assert!(!status.success());
        assert!(!group_alive(pgid));
    }
}
