use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};

/// Set by SIGINT/SIGTERM; the event loop forwards it to the worker.
static STOP_RECEIVED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_stop_signal(_: libc::c_int) {
    STOP_RECEIVED.store(true, Ordering::SeqCst);
}

pub(crate) fn install_stop_handlers() -> Result<()> {
    for signal in [libc::SIGINT, libc::SIGTERM] {
        unsafe {
            // SAFETY: handle_stop_signal only stores to an atomic flag, which is
            // async-signal-safe.
            let handler = handle_stop_signal as *const () as libc::sighandler_t;
            if libc::signal(signal, handler) == libc::SIG_ERR {
                tracing::warn!(signal, "failed to install stop handler");
                return Err(anyhow!("failed to install handler for signal {signal}"));
            }
        }
    }
    Ok(())
}

pub(crate) fn stop_requested() -> bool {
    STOP_RECEIVED.load(Ordering::SeqCst)
}
