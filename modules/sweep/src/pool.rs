//! Bounded queue feeding a fixed number of concurrent workers.

use anyhow::Result;
use ftpscan_core::ratelimiter::RateLimiter;
use std::future::Future;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    pub concurrency: usize,
    pub queue_capacity: usize,
    pub qps: Option<u32>,
}

/// Feed every address from `source` to `handler`, at most `concurrency` at a time.
///
/// The source is drained on a blocking thread into a queue of `queue_capacity`
/// slots; once the queue is full the producer waits. Returns after the source
/// is exhausted and every dispatched handler has finished. The result is the
/// number of addresses dispatched.
pub async fn run_pool<I, F, Fut>(source: I, opts: PoolOptions, handler: F) -> Result<u64>
where
    I: IntoIterator<Item = Ipv4Addr>,
    I::IntoIter: Send + 'static,
    F: Fn(Ipv4Addr) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let workers = opts.concurrency.clamp(1, u32::MAX as usize);
    let (tx, mut rx) = mpsc::channel::<Ipv4Addr>(opts.queue_capacity.max(1));
    let source = source.into_iter();
    let producer = tokio::task::spawn_blocking(move || {
        for ip in source {
            if tx.blocking_send(ip).is_err() {
                break;
            }
        }
    });

    let slots = Arc::new(Semaphore::new(workers));
    let pacer = opts.qps.map(RateLimiter::new);
    let mut dispatched = 0u64;
    while let Some(ip) = rx.recv().await {
        let permit = slots.clone().acquire_owned().await?;
        if let Some(p) = &pacer {
            p.acquire().await;
        }
        let work = handler(ip);
        tokio::spawn(async move {
            work.await;
            drop(permit);
        });
        dispatched += 1;
    }
    producer.await?;

    // every worker returns its permit when its last probe is done
    let _drained = slots.acquire_many(workers as u32).await?;
    debug!(dispatched, "pool drained");
    Ok(dispatched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    fn addrs(n: u32) -> Vec<Ipv4Addr> {
        (1..=n).map(|i| Ipv4Addr::from(0x0B00_0000 + i)).collect()
    }

    fn opts(concurrency: usize, queue_capacity: usize) -> PoolOptions {
        PoolOptions { concurrency, queue_capacity, qps: None }
    }

    #[tokio::test]
    async fn dispatches_each_address_once_within_limit() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (s, a, p) = (seen.clone(), active.clone(), peak.clone());
        let n = run_pool(addrs(300), opts(8, 16), move |ip| {
            let (s, a, p) = (s.clone(), a.clone(), p.clone());
            async move {
                let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                s.lock().unwrap().push(ip);
                a.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await
        .unwrap();

        assert_eq!(n, 300);
        let seen = seen.lock().unwrap();
        // all handlers finished before run_pool returned
        assert_eq!(seen.len(), 300);
        let unique: HashSet<_> = seen.iter().collect();
        assert_eq!(unique.len(), 300);
        assert!(peak.load(Ordering::SeqCst) <= 8);
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn producer_blocks_when_queue_is_full() {
        let produced = Arc::new(AtomicUsize::new(0));
        let handled = Arc::new(AtomicUsize::new(0));
        let lag = Arc::new(AtomicUsize::new(0));
        let pr = produced.clone();
        let source = addrs(40).into_iter().inspect(move |_| {
            pr.fetch_add(1, Ordering::SeqCst);
        });
        let (p, h, l) = (produced.clone(), handled.clone(), lag.clone());
        run_pool(source, opts(1, 2), move |_| {
            let (p, h, l) = (p.clone(), h.clone(), l.clone());
            async move {
                tokio::time::sleep(Duration::from_millis(3)).await;
                let done = h.fetch_add(1, Ordering::SeqCst);
                l.fetch_max(p.load(Ordering::SeqCst) - done, Ordering::SeqCst);
            }
        })
        .await
        .unwrap();
        assert_eq!(handled.load(Ordering::SeqCst), 40);
        // queue slots + one waiting for a worker + one in flight + one held by the producer
        assert!(lag.load(Ordering::SeqCst) <= 2 + 1 + 1 + 1);
    }

    #[tokio::test]
    async fn empty_source_finishes() {
        let n = run_pool(Vec::new(), opts(25_000, 30_000), |_| async {}).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn qps_paces_launches() {
        let started = Instant::now();
        let mut o = opts(4, 4);
        o.qps = Some(50);
        run_pool(addrs(5), o, |_| async {}).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(60));
    }
}
