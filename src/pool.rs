use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Number of workers a pool will run for `ports` units at `concurrency`.
pub fn worker_count(concurrency: usize, ports: usize) -> usize {
    concurrency.max(1).min(ports)
}

/// Run `unit` once for every port using a fixed set of worker tasks.
///
/// Workers pull the next `(index, port)` pair from a shared cursor, so ports are
/// handed out in list order and each one exactly once. Cancellation is checked
/// before each pull; a unit already running is allowed to finish. Returns after
/// every worker has stopped, with the number of workers used.
pub async fn run_pool<F, Fut>(
    ports: Arc<[u16]>,
    concurrency: usize,
    cancel: CancellationToken,
    unit: F,
) -> usize
where
    F: Fn(usize, u16) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let workers = worker_count(concurrency, ports.len());
    let cursor = Arc::new(AtomicUsize::new(0));
    let unit = Arc::new(unit);
    let mut set = JoinSet::new();

    for id in 0..workers {
        let ports = ports.clone();
        let cursor = cursor.clone();
        let unit = unit.clone();
        let cancel = cancel.clone();

        set.spawn(async move {
            let mut done = 0usize;
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let idx = cursor.fetch_add(1, Ordering::Relaxed);
                let Some(&port) = ports.get(idx) else {
                    break;
                };
                (*unit)(idx, port).await;
                done += 1;
            }
            debug!(worker = id, units = done, "worker stopped");
        });
    }

    while let Some(res) = set.join_next().await {
        if let Err(e) = res {
            warn!(error = %e, "worker task failed");
        }
    }
    workers
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn worker_count_is_bounded_by_ports() {
        assert_eq!(worker_count(100, 3), 3);
        assert_eq!(worker_count(4, 1000), 4);
        assert_eq!(worker_count(0, 10), 1);
        assert_eq!(worker_count(10, 0), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_port_runs_exactly_once_within_limit() {
        let ports: Arc<[u16]> = (1..=200u16).collect();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (s, a, p) = (seen.clone(), active.clone(), peak.clone());
        let workers = run_pool(ports.clone(), 7, CancellationToken::new(), move |idx, port| {
            let (s, a, p) = (s.clone(), a.clone(), p.clone());
            async move {
                let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1)).await;
                s.lock().unwrap().push((idx, port));
                a.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

        assert_eq!(workers, 7);
        assert!(peak.load(Ordering::SeqCst) <= 7);

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        let expected: Vec<(usize, u16)> = ports.iter().enumerate().map(|(i, &p)| (i, p)).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn cancelled_pool_stops_pulling_work() {
        let ports: Arc<[u16]> = (1..=50u16).collect();
        let cancel = CancellationToken::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let (c, r) = (cancel.clone(), ran.clone());
        run_pool(ports, 1, cancel, move |idx, _| {
            let (c, r) = (c.clone(), r.clone());
            async move {
                r.fetch_add(1, Ordering::SeqCst);
                if idx == 4 {
                    c.cancel();
                }
            }
        })
        .await;

        assert_eq!(ran.load(Ordering::SeqCst), 5);
    }
}
