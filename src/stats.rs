use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone)]
pub struct PollStats {
    pub ok: u64,
    pub failed: u64,
    pub actuations: u64,
    pub suppressed: u64,
    pub unknown: u64,
    pub bytes: u64,
    t0: Instant,
    last: Instant,
}

impl PollStats {
    pub fn new() -> Self {
        Self {
            ok: 0,
            failed: 0,
            actuations: 0,
            suppressed: 0,
            unknown: 0,
            bytes: 0,
            t0: Instant::now(),
            last: Instant::now(),
        }
    }
    pub fn add_bytes(&mut self, n: usize) {
        self.bytes += n as u64;
    }
    pub fn inc_ok(&mut self) {
        self.ok += 1;
    }
    pub fn inc_failed(&mut self) {
        self.failed += 1;
    }
    pub fn inc_actuations(&mut self) {
        self.actuations += 1;
    }
    pub fn inc_suppressed(&mut self) {
        self.suppressed += 1;
    }
    pub fn inc_unknown(&mut self) {
        self.unknown += 1;
    }
    pub fn cycles(&self) -> u64 {
        self.ok + self.failed
    }

    pub fn maybe_log(&mut self, stats_int: f64) {
        if self.last.elapsed().as_secs_f64() >= stats_int {
            self.log();
            self.last = Instant::now();
        }
    }

    pub fn log(&self) {
        let dur = self.t0.elapsed().as_secs_f64().max(1e-3);
        info!(
            ok = self.ok,
            failed = self.failed,
            actuations = self.actuations,
            suppressed = self.suppressed,
            unknown = self.unknown,
            bytes = self.bytes,
            "poll stats over {:.1}s ({:.1} cycles/s)",
            dur,
            self.cycles() as f64 / dur
        );
    }
}
