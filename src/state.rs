use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::OnceLock;

use crate::types::{ProbeResult, Progress, ScanPhase};

/// Scan-scoped result aggregator.
///
/// One write-once slot per position in the resolved port list plus running
/// counters. Shared between workers behind an `Arc`; slots need no lock because
/// each is claimed exactly once.
#[derive(Debug)]
pub struct ScanState {
    slots: Box<[OnceLock<ProbeResult>]>,
    scanned: AtomicU64,
    open: AtomicU64,
    phase: AtomicU8,
}

impl ScanState {
    pub fn new(total: usize) -> Self {
        Self {
            slots: (0..total).map(|_| OnceLock::new()).collect(),
            scanned: AtomicU64::new(0),
            open: AtomicU64::new(0),
            phase: AtomicU8::new(ScanPhase::Idle.as_u8()),
        }
    }

    /// Store the result for port-list position `index`.
    ///
    /// Returns `false` (and leaves the counters untouched) if the slot was already
    /// filled or the index is out of range.
    pub fn record(&self, index: usize, result: ProbeResult) -> bool {
        let Some(slot) = self.slots.get(index) else {
            return false;
        };
        let open = result.open;
        if slot.set(result).is_err() {
            return false;
        }
        if open {
            self.open.fetch_add(1, Ordering::Relaxed);
        }
        self.scanned.fetch_add(1, Ordering::Release);
        true
    }

    pub fn progress(&self) -> Progress {
        Progress {
            total: self.slots.len() as u64,
            scanned: self.scanned.load(Ordering::Acquire),
            open: self.open.load(Ordering::Relaxed),
        }
    }

    pub fn total(&self) -> usize {
        self.slots.len()
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(|s| s.get().is_some())
    }

    /// Filled slots in port-list order. Complete once the pool has drained.
    pub fn results(&self) -> Vec<ProbeResult> {
        self.slots.iter().filter_map(|s| s.get().cloned()).collect()
    }

    /// Consume the state, moving results out without cloning.
    pub fn into_results(self) -> Vec<ProbeResult> {
        self.slots
            .into_vec()
            .into_iter()
            .filter_map(OnceLock::into_inner)
            .collect()
    }

    pub fn phase(&self) -> ScanPhase {
        ScanPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn set_phase(&self, phase: ScanPhase) {
        self.phase.store(phase.as_u8(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn result(port: u16, open: bool) -> ProbeResult {
        ProbeResult {
            port,
            open,
            latency: Duration::from_millis(1),
            service: "unknown".into(),
            banner: String::new(),
        }
    }

    #[test]
    fn slot_written_once() {
        let state = ScanState::new(2);
        assert!(state.record(0, result(22, true)));
        assert!(!state.record(0, result(22, false)));
        assert!(!state.record(5, result(99, true)));

        let p = state.progress();
        assert_eq!((p.total, p.scanned, p.open), (2, 1, 1));
        assert!(!state.is_complete());
        assert!(state.results()[0].open);
    }

    #[test]
    fn concurrent_writers_keep_counts_and_order() {
        let n = 2000usize;
        let state = Arc::new(ScanState::new(n));

        std::thread::scope(|s| {
            for t in 0..8 {
                let state = &state;
                s.spawn(move || {
                    for i in (t..n).step_by(8) {
                        state.record(i, result(i as u16 + 1, i % 3 == 0));
                    }
                });
            }
        });

        let p = state.progress();
        assert_eq!(p.scanned, n as u64);
        assert_eq!(p.open, (0..n).filter(|i| i % 3 == 0).count() as u64);
        assert!(state.is_complete());

        let state = Arc::try_unwrap(state).unwrap();
        let ports: Vec<u16> = state.into_results().iter().map(|r| r.port).collect();
        assert_eq!(ports, (1..=n as u16).collect::<Vec<_>>());
    }

    #[test]
    fn phase_starts_idle() {
        let state = ScanState::new(0);
        assert_eq!(state.phase(), ScanPhase::Idle);
        state.set_phase(ScanPhase::Scanning);
        assert_eq!(state.phase(), ScanPhase::Scanning);
    }
}
