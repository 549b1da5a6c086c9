use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::error::TlsError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const PROBE_LEN: usize = 32;

/// Set once the OS source has yielded; it stays seeded for the process.
static READY: AtomicBool = AtomicBool::new(false);

/// Wait until the OS entropy source yields, or give up after `budget`.
///
/// The handshake must never proceed on a source that is not yet seeded.
/// `getrandom` blocks on an unseeded Linux pool, so the probe runs on a
/// helper thread and the caller waits at most `budget` for it.
pub fn wait_ready(budget: Duration) -> Result<(), TlsError> {
    if READY.load(Ordering::Acquire) {
        return Ok(());
    }
    wait_on(budget, || {
        let mut probe = [0u8; PROBE_LEN];
        getrandom::getrandom(&mut probe)
    })?;
    READY.store(true, Ordering::Release);
    Ok(())
}

/// Poll `probe` until it succeeds, bounded by `budget` whether the probe
/// fails fast or blocks.
fn wait_on<F>(budget: Duration, mut probe: F) -> Result<(), TlsError>
where
    F: FnMut() -> Result<(), getrandom::Error> + Send + 'static,
{
    let start = Instant::now();
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("entropy-probe".into())
        .spawn(move || {
            loop {
                match probe() {
                    Ok(()) => {
                        let _ = tx.send(());
                        return;
                    }
                    Err(e) if start.elapsed() < budget => {
                        warn!(error = %e, "entropy source not ready, polling");
                        thread::sleep(POLL_INTERVAL);
                    }
                    Err(e) => {
                        warn!(error = %e, "entropy probe gave up");
                        return;
                    }
                }
            }
        })
        .map_err(|e| TlsError::ContextInitFailed(format!("entropy probe thread: {e}")))?;

    // a probe that gave up drops `tx`, which ends the wait early
    match rx.recv_timeout(budget) {
        Ok(()) => {
            trace!(waited_ms = start.elapsed().as_millis() as u64, "entropy ready");
            Ok(())
        }
        Err(_) => Err(TlsError::ContextInitFailed(format!(
            "entropy source not ready after {:?}",
            budget
        ))),
    }
}
