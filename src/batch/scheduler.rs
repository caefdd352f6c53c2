//! # Phase Scheduler
//!
//! Esecuzione di una fase del batch (validazione, probe, transcode) su un
//! insieme di elementi con un limite di concorrenza.
//!
//! ## Responsabilità:
//! - Al massimo `concurrency` worker attivi contemporaneamente (semaforo,
//!   permesso acquisito prima dello spawn)
//! - Esattamente un risultato per ogni elemento distinto
//! - Isolamento dei fallimenti: un worker che fallisce o va in panic produce
//!   un `Err` per il suo elemento, gli altri proseguono
//!
//! L'ordine di completamento non è garantito; il chiamante indicizza i
//! risultati per elemento.

use anyhow::{anyhow, Result};
use futures::FutureExt;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Results of one phase, keyed by item
pub type PhaseResults<T, R> = HashMap<T, Result<R>>;

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run `worker` over every distinct item with at most `concurrency` in flight.
///
/// Duplicate items are processed once.
pub async fn run_phase<T, R, F, Fut>(phase: &str, items: Vec<T>, concurrency: usize, worker: F) -> PhaseResults<T, R>
where
    T: Eq + Hash + Clone + Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    let concurrency = concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut seen = HashSet::with_capacity(items.len());
    let mut pending = Vec::with_capacity(items.len());
    let mut results = HashMap::with_capacity(items.len());
    let mut tasks = JoinSet::new();

    for item in items {
        if seen.insert(item.clone()) {
            pending.push(item);
        }
    }
    let total = pending.len();
    debug!("[{phase}] starting {total} items with concurrency {concurrency}");

    for item in &pending {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                results.insert(item.clone(), Err(anyhow!("scheduler closed: {e}")));
                continue;
            }
        };

        let future = worker(item.clone());
        let item = item.clone();
        tasks.spawn(async move {
            let _permit = permit;
            let result = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(anyhow!("worker panicked: {}", panic_message(payload.as_ref()))),
            };
            (item, result)
        });
    }

    let mut done = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((item, result)) => {
                done += 1;
                debug!("[{phase}] {done}/{total} finished");
                results.insert(item, result);
            }
            Err(e) => error!("[{phase}] worker task failed: {e}"),
        }
    }

    // Cancelled tasks lose their item; give it an entry anyway
    for item in pending {
        results
            .entry(item)
            .or_insert_with(|| Err(anyhow!("worker task was cancelled")));
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_one_result_per_distinct_item() {
        let items = vec![1, 2, 3, 2, 4, 1];
        let results = run_phase("test", items, 3, |n: i32| async move { Ok(n * 10) }).await;

        assert_eq!(results.len(), 4);
        for n in [1, 2, 3, 4] {
            assert_eq!(*results[&n].as_ref().unwrap(), n * 10);
        }
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_limit() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = run_phase("test", (0..12).collect(), 3, {
            let running = running.clone();
            let peak = peak.clone();
            move |n: u32| {
                let running = running.clone();
                let peak = peak.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(results.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_failures_and_panics_are_isolated() {
        let results = run_phase("test", vec![1, 2, 3], 2, |n: u32| async move {
            match n {
                2 => Err(anyhow!("bad item")),
                3 => panic!("worker blew up"),
                _ => Ok(n),
            }
        })
        .await;

        assert_eq!(results.len(), 3);
        tokio_test::assert_ok!(&results[&1]);
        assert_eq!(results[&2].as_ref().unwrap_err().to_string(), "bad item");
        let panicked = results[&3].as_ref().unwrap_err().to_string();
        assert!(panicked.contains("worker blew up"));
    }

    #[tokio::test]
    async fn test_zero_concurrency_still_progresses() {
        let results = run_phase("test", vec!["a", "b"], 0, |s: &'static str| async move { Ok(s.len()) }).await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_phase() {
        let results = run_phase("test", Vec::<u8>::new(), 4, |n: u8| async move { Ok(n) }).await;
        assert!(results.is_empty());
    }
}
