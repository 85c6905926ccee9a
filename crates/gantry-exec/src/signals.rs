//! Forwarding of host interrupts to the process groups of running children
//!
//! While at least one command runs, SIGINT and SIGTERM are caught and sent on
//! to every registered child process group. When the last command finishes
//! the host's previous dispositions are restored, so a signal arriving
//! between commands acts on the host as it would without Gantry.

use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::process::Child;
use tracing::{debug, warn};

/// Most child process groups a signal is relayed to at once
const MAX_RELAYED: usize = 64;

#[allow(clippy::declare_interior_mutable_const)]
const NO_TARGET: AtomicI32 = AtomicI32::new(0);

/// Process group ids to relay to, 0 for a free slot
static TARGETS: [AtomicI32; MAX_RELAYED] = [NO_TARGET; MAX_RELAYED];

/// Signals caught while a relay was installed
static CAUGHT: AtomicU64 = AtomicU64::new(0);

static INSTALLED: Mutex<Installed> = Mutex::new(Installed {
    users: 0,
    previous: Vec::new(),
});

struct Installed {
    users: usize,
    previous: Vec<sys::Saved>,
}

fn lock_installed() -> MutexGuard<'static, Installed> {
    INSTALLED.lock().unwrap_or_else(|e| e.into_inner())
}

/// Number of SIGINT/SIGTERM deliveries caught so far
pub(crate) fn caught() -> u64 {
    CAUGHT.load(Ordering::Acquire)
}

/// Catches SIGINT and SIGTERM for as long as it lives.
///
/// Install before spawning the child, then hand over its process group with
/// [`SignalRelay::forward_to`].
pub(crate) struct SignalRelay {
    slot: Option<usize>,
}

impl SignalRelay {
    pub(crate) fn install() -> Self {
        let mut installed = lock_installed();
        if installed.users == 0 {
            sys::install(&mut installed.previous);
        }
        installed.users += 1;
        Self { slot: None }
    }

    /// Relay caught signals to process group `pgid`
    pub(crate) fn forward_to(&mut self, pgid: u32) {
        let Ok(pgid) = i32::try_from(pgid) else {
            return;
        };
        for (i, target) in TARGETS.iter().enumerate() {
            if target
                .compare_exchange(0, pgid, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                self.slot = Some(i);
                return;
            }
        }
        warn!(pgid, "too many running commands to relay signals");
    }
}

impl Drop for SignalRelay {
    fn drop(&mut self) {
        if let Some(i) = self.slot.take() {
            TARGETS[i].store(0, Ordering::Release);
        }

        let mut installed = lock_installed();
        installed.users = installed.users.saturating_sub(1);
        if installed.users == 0 {
            sys::restore(&mut installed.previous);
        }
    }
}

#[cfg(unix)]
mod sys {
    use std::io;
    use std::sync::atomic::Ordering;

    use tracing::{debug, warn};

    use super::{CAUGHT, TARGETS};

    pub(super) type Saved = (libc::c_int, libc::sigaction);

    const RELAYED: [libc::c_int; 2] = [libc::SIGINT, libc::SIGTERM];

    // Runs in signal context: atomics and killpg only.
    extern "C" fn relay_signal(sig: libc::c_int) {
        CAUGHT.fetch_add(1, Ordering::AcqRel);
        for target in &TARGETS {
            let pgid = target.load(Ordering::Acquire);
            if pgid > 0 {
                // SAFETY: killpg is async-signal-safe
                unsafe { libc::killpg(pgid, sig) };
            }
        }
    }

    pub(super) fn install(previous: &mut Vec<Saved>) {
        let handler = relay_signal as extern "C" fn(libc::c_int);
        for sig in RELAYED {
            // SAFETY: both sigaction values are fully initialised before use
            let rc = unsafe {
                let mut action: libc::sigaction = std::mem::zeroed();
                action.sa_sigaction = handler as libc::sighandler_t;
                action.sa_flags = libc::SA_RESTART;
                libc::sigemptyset(&mut action.sa_mask);

                let mut old: libc::sigaction = std::mem::zeroed();
                let rc = libc::sigaction(sig, &action, &mut old);
                if rc == 0 {
                    previous.push((sig, old));
                }
                rc
            };
            if rc != 0 {
                let error = io::Error::last_os_error();
                warn!(signal = sig, error = %error, "failed to install signal relay");
            }
        }
    }

    pub(super) fn restore(previous: &mut Vec<Saved>) {
        for (sig, old) in previous.drain(..) {
            // SAFETY: `old` was filled in by sigaction when the relay was installed
            let rc = unsafe { libc::sigaction(sig, &old, std::ptr::null_mut()) };
            if rc != 0 {
                let error = io::Error::last_os_error();
                warn!(signal = sig, error = %error, "failed to restore signal disposition");
            }
        }
    }

    pub(crate) fn signal_group(pgid: u32, sig: libc::c_int) {
        debug!(pgid, signal = sig, "signalling child process group");
        // SAFETY: killpg only reads its integer arguments
        let rc = unsafe { libc::killpg(pgid as libc::pid_t, sig) };
        if rc != 0 {
            let error = io::Error::last_os_error();
            debug!(error = %error, "child process group gone");
        }
    }
}

#[cfg(not(unix))]
mod sys {
    pub(super) type Saved = ();

    pub(super) fn install(_previous: &mut Vec<Saved>) {}

    pub(super) fn restore(previous: &mut Vec<Saved>) {
        previous.clear();
    }
}

/// Forcefully stop `child` and everything in its process group
pub(crate) fn kill_tree(child: &mut Child, pgid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pgid) = pgid {
        sys::signal_group(pgid, libc::SIGKILL);
        return;
    }

    if let Err(e) = child.start_kill() {
        debug!(error = %e, "failed to kill child");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_forward_to_claims_and_releases_slot() {
        let pgid = 4_000_000;
        {
            let mut relay = SignalRelay::install();
            relay.forward_to(pgid);
            let slot = relay.slot.unwrap();
            assert_eq!(TARGETS[slot].load(Ordering::Acquire), pgid as i32);
        }
        assert!(TARGETS
            .iter()
            .all(|t| t.load(Ordering::Acquire) != pgid as i32));
    }

    #[test]
    fn test_forward_to_ignores_out_of_range_pgid() {
        let mut relay = SignalRelay::install();
        relay.forward_to(u32::MAX);
        assert_eq!(relay.slot, None);
    }
}
