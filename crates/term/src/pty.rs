// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PTY (pseudo-terminal) support for Unix systems.
//!
//! Spawns an argv inside a fresh PTY with its own session and controlling
//! terminal. The master side is non-blocking; readers drive it with
//! [`Pty::poll_readable`] + [`Pty::read`].

use crate::error::TermError;
use parking_lot::Mutex;
use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::Path;

/// Result of one non-blocking read from the master side.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes were available.
    Data(Vec<u8>),
    /// Nothing buffered right now.
    WouldBlock,
    /// The slave side is closed; the child is gone or exiting.
    Eof,
}

/// A spawned child process attached to a PTY master.
///
/// Shared between the session reader and the manager (signal/stdin paths),
/// so reaping state uses interior mutability.
pub struct Pty {
    master: OwnedFd,
    pid: libc::pid_t,
    /// Set once waitpid has reaped the child.
    exit_code: Mutex<Option<i32>>,
}

impl Pty {
    /// Spawn `argv` in a new PTY.
    ///
    /// The child gets its own session, the PTY slave as controlling terminal
    /// and stdio, `cwd` as working directory, and the parent environment
    /// with `env` overrides applied.
    pub fn spawn(
        argv: &[String],
        cwd: &Path,
        env: &[(String, String)],
        rows: u16,
        cols: u16,
    ) -> Result<Self, TermError> {
        if argv.is_empty() {
            return Err(TermError::EmptyArgv);
        }

        // Everything the child needs is allocated before fork: only
        // async-signal-safe calls are legal between fork and exec.
        // PATH resolution happens here too, so the child can use execve
        // with the merged environment.
        let program = resolve_binary(&argv[0])
            .ok_or_else(|| TermError::Spawn(format!("binary not found: {}", argv[0])))?;
        let mut resolved_argv = argv.to_vec();
        resolved_argv[0] = program;
        let arg_strs: Vec<CString> = resolved_argv
            .iter()
            .map(|a| CString::new(a.as_str()))
            .collect::<Result<_, _>>()
            .map_err(|e| TermError::Spawn(format!("argv contains NUL: {e}")))?;
        let mut arg_ptrs: Vec<*const libc::c_char> =
            arg_strs.iter().map(|c| c.as_ptr()).collect();
        arg_ptrs.push(std::ptr::null());

        let mut merged: Vec<(String, String)> = std::env::vars().collect();
        for (key, val) in env {
            merged.retain(|(k, _)| k != key);
            merged.push((key.clone(), val.clone()));
        }
        let env_strs: Vec<CString> = merged
            .iter()
            .filter_map(|(k, v)| CString::new(format!("{k}={v}")).ok())
            .collect();
        let mut env_ptrs: Vec<*const libc::c_char> =
            env_strs.iter().map(|c| c.as_ptr()).collect();
        env_ptrs.push(std::ptr::null());

        let cwd_c = CString::new(cwd.to_string_lossy().into_owned())
            .map_err(|e| TermError::Spawn(format!("cwd contains NUL: {e}")))?;

        let mut master_fd: RawFd = -1;
        let mut slave_fd: RawFd = -1;

        unsafe {
            if libc::openpty(
                &mut master_fd,
                &mut slave_fd,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            ) != 0
            {
                return Err(TermError::Open(io::Error::last_os_error()));
            }

            let winsize =
                libc::winsize { ws_row: rows, ws_col: cols, ws_xpixel: 0, ws_ypixel: 0 };
            libc::ioctl(master_fd, libc::TIOCSWINSZ, &winsize);

            let pid = libc::fork();
            if pid < 0 {
                libc::close(master_fd);
                libc::close(slave_fd);
                return Err(TermError::Fork(io::Error::last_os_error()));
            }

            if pid == 0 {
                // Child process
                libc::close(master_fd);

                if libc::setsid() < 0 {
                    libc::_exit(127);
                }
                if libc::ioctl(slave_fd, libc::TIOCSCTTY as libc::c_ulong, 0) < 0 {
                    libc::_exit(127);
                }

                // Turn off echo so injected prompts do not re-appear in the
                // captured output stream (they carry JSON-shaped text).
                let mut termios: libc::termios = std::mem::zeroed();
                if libc::tcgetattr(slave_fd, &mut termios) == 0 {
                    termios.c_lflag &= !(libc::ECHO | libc::ECHONL);
                    libc::tcsetattr(slave_fd, libc::TCSANOW, &termios);
                }

                libc::dup2(slave_fd, libc::STDIN_FILENO);
                libc::dup2(slave_fd, libc::STDOUT_FILENO);
                libc::dup2(slave_fd, libc::STDERR_FILENO);
                if slave_fd > libc::STDERR_FILENO {
                    libc::close(slave_fd);
                }

                if libc::chdir(cwd_c.as_ptr()) < 0 {
                    libc::_exit(127);
                }

                libc::execve(
                    arg_ptrs[0],
                    arg_ptrs.as_ptr(),
                    env_ptrs.as_ptr() as *const *const libc::c_char,
                );
                libc::_exit(127);
            }

            // Parent process
            libc::close(slave_fd);

            let flags = libc::fcntl(master_fd, libc::F_GETFL);
            libc::fcntl(master_fd, libc::F_SETFL, flags | libc::O_NONBLOCK);

            Ok(Pty {
                master: OwnedFd::from_raw_fd(master_fd),
                pid,
                exit_code: Mutex::new(None),
            })
        }
    }

    /// Read available output from the master side.
    pub fn read(&self) -> Result<ReadOutcome, TermError> {
        let mut buf = vec![0u8; 4096];
        let fd = self.master.as_raw_fd();

        let result = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, buf.len()) };

        if result < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => {
                    Ok(ReadOutcome::WouldBlock)
                }
                // EIO from a PTY master means the slave side closed
                _ if err.raw_os_error() == Some(libc::EIO) => Ok(ReadOutcome::Eof),
                _ => Err(TermError::Io(err)),
            };
        }
        if result == 0 {
            return Ok(ReadOutcome::Eof);
        }

        buf.truncate(result as usize);
        Ok(ReadOutcome::Data(buf))
    }

    /// Block up to `timeout_ms` waiting for the master to become readable.
    pub fn poll_readable(&self, timeout_ms: i32) -> bool {
        let mut pfd = libc::pollfd {
            fd: self.master.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let n = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        n > 0 && (pfd.revents & (libc::POLLIN | libc::POLLHUP)) != 0
    }

    /// Write all of `data` to the child's stdin, waiting out short buffers.
    pub fn write_all(&self, data: &[u8]) -> Result<(), TermError> {
        let fd = self.master.as_raw_fd();
        let mut written = 0;

        while written < data.len() {
            let result = unsafe {
                libc::write(fd, data[written..].as_ptr() as *const _, data.len() - written)
            };

            if result < 0 {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::Interrupted => continue,
                    io::ErrorKind::WouldBlock => {
                        let mut pfd = libc::pollfd {
                            fd,
                            events: libc::POLLOUT,
                            revents: 0,
                        };
                        unsafe { libc::poll(&mut pfd, 1, 100) };
                        continue;
                    }
                    _ => return Err(TermError::Io(err)),
                }
            }
            written += result as usize;
        }

        Ok(())
    }

    /// Deliver a signal to the child.
    pub fn signal(&self, sig: i32) -> Result<(), TermError> {
        let result = unsafe { libc::kill(self.pid, sig) };
        if result < 0 {
            let err = io::Error::last_os_error();
            // ESRCH means the child is already gone; that's not a failure
            if err.raw_os_error() == Some(libc::ESRCH) {
                return Ok(());
            }
            return Err(TermError::Io(err));
        }
        Ok(())
    }

    /// Non-blocking reap. Returns the exit code once the child has exited.
    ///
    /// Signal deaths map to `128 + signo`, the shell convention.
    pub fn try_wait(&self) -> Option<i32> {
        let mut slot = self.exit_code.lock();
        if let Some(code) = *slot {
            return Some(code);
        }
        let mut status: libc::c_int = 0;
        let result = unsafe { libc::waitpid(self.pid, &mut status, libc::WNOHANG) };
        if result == self.pid {
            let code = decode_status(status);
            *slot = Some(code);
            return Some(code);
        }
        None
    }

    /// Blocking reap; used after EOF when the child is known to be exiting.
    pub fn wait(&self) -> i32 {
        {
            let slot = self.exit_code.lock();
            if let Some(code) = *slot {
                return code;
            }
        }
        let mut status: libc::c_int = 0;
        let result = unsafe { libc::waitpid(self.pid, &mut status, 0) };
        let mut slot = self.exit_code.lock();
        if let Some(code) = *slot {
            // Another caller reaped first
            return code;
        }
        let code = if result == self.pid { decode_status(status) } else { 127 };
        *slot = Some(code);
        code
    }

    pub fn is_running(&self) -> bool {
        self.try_wait().is_none()
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }
}

/// Resolve a binary name to an executable path, searching `PATH` for bare
/// names the way the shell would.
fn resolve_binary(name: &str) -> Option<String> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| name.to_string());
    }
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let full = dir.join(name);
        if full.is_file() {
            return Some(full.to_string_lossy().into_owned());
        }
    }
    None
}

fn decode_status(status: libc::c_int) -> i32 {
    if libc::WIFEXITED(status) {
        libc::WEXITSTATUS(status)
    } else if libc::WIFSIGNALED(status) {
        128 + libc::WTERMSIG(status)
    } else {
        127
    }
}

impl Drop for Pty {
    fn drop(&mut self) {
        // Hang up the child if it is still attached
        if self.try_wait().is_none() {
            unsafe {
                libc::kill(self.pid, libc::SIGHUP);
            }
        }
    }
}

#[cfg(test)]
#[path = "pty_tests.rs"]
mod tests;
