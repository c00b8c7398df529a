//! Detached process launcher
//!
//! Commands run through `/bin/sh -c` in a grandchild process that is
//! re-parented to init, so the manager never waits on it and never leaves
//! zombies behind.

use std::ffi::{CStr, CString};
use std::os::fd::RawFd;
use std::ptr;

use nix::errno::Errno;
use nix::sys::signal::{SigHandler, Signal, signal};
use nix::sys::wait::waitpid;
use nix::unistd::{ForkResult, fork};
use tracing::debug;

use crate::wm::error::WmError;

const SHELL: &CStr = c"/bin/sh";

/// Status of a grandchild whose exec failed
const EXEC_FAILED: libc::c_int = 127;

/// Let the kernel reap terminated children
pub fn ignore_child_signals() -> Result<(), WmError> {
    // SAFETY: SigIgn installs no handler code.
    unsafe { signal(Signal::SIGCHLD, SigHandler::SigIgn) }.map_err(WmError::Signal)?;
    Ok(())
}

/// Run `command` fully detached from the manager.
///
/// `inherited_fd` (the X connection) is closed in the launched process.
/// Returns once the intermediate child has exited; a failing exec only ends
/// the grandchild.
pub fn spawn_detached(command: &str, inherited_fd: Option<RawFd>) -> Result<(), WmError> {
    let script =
        CString::new(command).map_err(|_| WmError::InvalidCommand(command.to_string()))?;
    let args: [&CStr; 3] = [c"sh", c"-c", script.as_c_str()];

    // Built before forking: nothing is allocated between fork and exec.
    let argv: Vec<*const libc::c_char> = args
        .iter()
        .map(|arg| arg.as_ptr())
        .chain(std::iter::once(ptr::null()))
        .collect();

    // SAFETY: the child only makes async-signal-safe calls before exec/_exit.
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => {
            match waitpid(child, None) {
                // ECHILD: already reaped because SIGCHLD is ignored.
                Ok(_) | Err(Errno::ECHILD) => {}
                Err(source) => {
                    return Err(WmError::Spawn {
                        command: command.to_string(),
                        source,
                    });
                }
            }
            debug!("Launched {:?}", command);
            Ok(())
        }
        Ok(ForkResult::Child) => {
            // SAFETY: see above.
            unsafe {
                match fork() {
                    Ok(ForkResult::Child) => exec_session(&argv, inherited_fd),
                    Ok(ForkResult::Parent { .. }) => libc::_exit(0),
                    Err(_) => libc::_exit(1),
                }
            }
        }
        Err(source) => Err(WmError::Spawn {
            command: command.to_string(),
            source,
        }),
    }
}

/// Become a session leader without the X socket and exec the shell.
///
/// # Safety
/// Must only be called in a freshly forked child; `argv` must be a
/// NULL-terminated array of valid C strings.
unsafe fn exec_session(argv: &[*const libc::c_char], inherited_fd: Option<RawFd>) -> ! {
    unsafe {
        if let Some(fd) = inherited_fd {
            libc::close(fd);
        }
        libc::setsid();
        libc::execv(SHELL.as_ptr(), argv.as_ptr());
        libc::_exit(EXEC_FAILED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::{Duration, Instant};

    fn scratch_file(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("chip-wm-{}-{}", std::process::id(), name));
        let _ = fs::remove_file(&path);
        path
    }

    /// Poll until `path` holds a full line
    fn wait_for_line(path: &Path) -> Option<String> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Ok(content) = fs::read_to_string(path) {
                if content.ends_with('\n') {
                    return Some(content.trim().to_string());
                }
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        None
    }

    #[test]
    fn test_launch_returns_before_command_finishes() {
        let start = Instant::now();
        spawn_detached("sleep 3", None).unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_launched_command_runs() {
        let path = scratch_file("runs");
        spawn_detached(&format!("echo ok > '{}'", path.display()), None).unwrap();

        assert_eq!(wait_for_line(&path).as_deref(), Some("ok"));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_launched_process_is_not_our_child() {
        let path = scratch_file("ppid");
        spawn_detached(&format!("echo $$ > '{}'; sleep 2", path.display()), None).unwrap();

        let pid = wait_for_line(&path).expect("command never ran");
        let stat = fs::read_to_string(format!("/proc/{}/stat", pid)).unwrap();
        // Fields after the parenthesised command name: state, ppid, pgrp, session
        let fields: Vec<&str> = stat.rsplit_once(')').unwrap().1.split_whitespace().collect();
        let ppid: u32 = fields[1].parse().unwrap();
        let session: i32 = fields[3].parse().unwrap();

        assert_ne!(ppid, std::process::id());
        assert_eq!(session.to_string(), pid);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_failing_command_does_not_affect_caller() {
        spawn_detached("exec /nonexistent/chip-wm-test-binary", None).unwrap();
    }

    #[test]
    fn test_nul_byte_rejected() {
        let result = spawn_detached("echo \0oops", None);
        assert!(matches!(result, Err(WmError::InvalidCommand(_))));
    }
}
