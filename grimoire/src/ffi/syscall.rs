use std::io::{Error, Result};

/// Sends `SIGKILL` to `host_pid` in the host PID namespace. The sole
/// enforcement primitive this core uses.
pub fn kill(host_pid: u32) -> Result<()> {
    let result = unsafe { libc::kill(host_pid as libc::pid_t, libc::SIGKILL) };
    if result == 0 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}
