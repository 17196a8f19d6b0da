use std::os::unix::io::{AsRawFd, RawFd};

use nix::unistd::{fork, ForkResult};
use tracing::debug;

use crate::error::{Error, Result};
use crate::tracer::Pid;

/// Fork a child that will request tracing and exec the executable open at `exe`.
///
/// The child will stop with a `SIGTRAP` on return from its exec. The caller must
/// synchronize on that stop, e.g. with [`Tracer::attach()`](crate::Tracer::attach()).
pub fn spawn(exe: &impl AsRawFd) -> Result<Pid> {
    let fd = exe.as_raw_fd();

    // SAFETY: the child only makes async-signal-safe calls before it execs or exits.
    match unsafe { fork() }.map_err(Error::Fork)? {
        ForkResult::Child => entrypoint(fd),
        ForkResult::Parent { child } => {
            debug!(pid = child.as_raw(), fd, "forked tracee");
            Ok(child)
        },
    }
}

/// Request `PTRACE_TRACEME`, then replace the process image with the executable open at
/// `exe`, passing empty argument and environment vectors.
///
/// Only call this in a freshly-forked child. It never returns: if either step fails, it
/// reports the failure on stderr and exits with `EXIT_FAILURE`, so the pre-fork image can
/// never run on.
pub fn entrypoint(exe: RawFd) -> ! {
    // Built on the stack: the `nix` wrappers heap-allocate, which is not async-signal-safe.
    let argv: [*const libc::c_char; 1] = [std::ptr::null()];
    let envp: [*const libc::c_char; 1] = [std::ptr::null()];

    unsafe {
        let null = std::ptr::null_mut::<libc::c_void>();

        if libc::ptrace(libc::PTRACE_TRACEME, 0, null, null) == -1 {
            die(b"ptrace(PTRACE_TRACEME): unable to request tracing\n");
        }

        libc::fexecve(exe, argv.as_ptr(), envp.as_ptr());

        die(b"fexecve: unable to exec tracee\n")
    }
}

unsafe fn die(msg: &[u8]) -> ! {
    libc::write(libc::STDERR_FILENO, msg.as_ptr() as *const libc::c_void, msg.len());
    libc::_exit(libc::EXIT_FAILURE)
}
