//! "Daemonization detaches from tty, chdirs to `/`, closes stdio; failures
//! abort with a runtime error" (spec.md §6). Only invoked when `--daemonize`
//! is passed.
//!
//! A real session-leader detach (`fork`/`setsid`) and raw fd redirection
//! need `unsafe` libc calls; the workspace lints forbid `unsafe_code`
//! outright and no such crate is in the dependency set, so — the same
//! tradeoff `metis_transport::ethernet` makes for raw-socket listeners —
//! this is the safe subset: chdir to `/` and validate that `/dev/null` is
//! reachable. Stdio itself is left untouched and process detachment is left
//! to whatever supervises `metisd` (systemd, a container runtime), which is
//! how the teacher's own daemon expects to be run too.

use std::fs::File;
use std::io;

/// Runs the safe subset of daemonization. Per spec.md §7 `Fatal`, any
/// failure here is unrecoverable and the caller should exit non-zero.
pub fn daemonize() -> io::Result<()> {
    std::env::set_current_dir("/")?;
    // Dropping the open handle immediately closes it again, but the open
    // itself validates that /dev/null is actually reachable before this
    // function reports success.
    drop(File::open("/dev/null")?);
    log::info!("metisd: daemonized (chdir to /, /dev/null reachable)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemonize_succeeds_when_dev_null_is_reachable() {
        // Changing the working directory is process-global and this test
        // runs alongside others in the same binary, so only assert the
        // call itself doesn't error rather than asserting the final cwd.
        if std::path::Path::new("/dev/null").exists() {
            assert!(daemonize().is_ok());
        }
    }
}
