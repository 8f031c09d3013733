//! Stress tests for PeopleCount.
//!
//! These runs hammer shared keys from several threads; callers check
//! [`Database::verify`] afterwards.

use crate::fixtures::{admin, camera_url, scenarios, store_name, user_email};
use peoplecount_core::{Database, ErrorKind};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Number of seeded stores, users and cameras.
    pub entity_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 1_000,
            threads: 4,
            entity_count: 16,
        }
    }
}

/// Seeds `config.entity_count` of each entity into `db`.
pub fn seed_for(db: &Database, config: &StressConfig) {
    scenarios::seed(db, config.entity_count, config.entity_count, config.entity_count);
}

/// Tallies per-thread outcomes.
#[derive(Debug, Default)]
struct Counters {
    successful: AtomicUsize,
    failed: AtomicUsize,
}

impl Counters {
    fn record<T, E>(&self, result: &Result<T, E>) {
        let counter = if result.is_ok() {
            &self.successful
        } else {
            &self.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn finish(&self, start: Instant) -> StressTestResult {
        StressTestResult::new(
            self.successful.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            start.elapsed(),
        )
    }
}

/// Run a sequential link/unlink stress test on a seeded database.
pub fn stress_sequential_links(db: &Database, config: &StressConfig) -> StressTestResult {
    let session = admin(db);
    let n = config.entity_count;
    let counters = Counters::default();

    let start = Instant::now();
    for i in 0..config.operations {
        let body = json!({"store_name": store_name(i % n), "user_email": user_email((i / n) % n)});
        if i % 3 == 2 {
            counters.record(&session.remove_users_from_store(&body));
        } else {
            counters.record(&session.add_users_to_store(&body));
        }
    }

    counters.finish(start)
}

/// Run concurrent link/unlink and attach/detach from `config.threads`
/// threads over the same seeded keys.
pub fn stress_concurrent_links(db: Arc<Database>, config: &StressConfig) -> StressTestResult {
    let counters = Arc::new(Counters::default());
    let n = config.entity_count;

    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let db = Arc::clone(&db);
            let counters = Arc::clone(&counters);
            let operations = config.operations;

            thread::spawn(move || {
                let session = admin(&db);
                for i in 0..operations {
                    let store = store_name((i + t) % n);
                    let other = (i * 7 + t) % n;
                    match i % 4 {
                        0 => counters.record(&session.add_users_to_store(
                            &json!({"store_name": store, "user_email": user_email(other)}),
                        )),
                        1 => counters.record(&session.add_store_to_camera(
                            &json!({"url": camera_url(other), "store": store}),
                        )),
                        2 => counters.record(&session.remove_users_from_store(
                            &json!({"store_name": store, "user_email": user_email(other)}),
                        )),
                        _ => counters.record(&session.remove_store_from_camera(
                            &json!({"url": camera_url(other), "store": store}),
                        )),
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    counters.finish(start)
}

/// Run concurrent links while one thread deletes and recreates stores.
///
/// Only link operations are counted. A link may miss a store that is
/// momentarily deleted; those `NotFound` results count as failures.
pub fn stress_delete_churn(db: Arc<Database>, config: &StressConfig) -> StressTestResult {
    let counters = Arc::new(Counters::default());
    let unexpected = Arc::new(AtomicUsize::new(0));
    let n = config.entity_count;

    let start = Instant::now();
    let churn = {
        let db = Arc::clone(&db);
        let unexpected = Arc::clone(&unexpected);
        let rounds = config.operations / 4;
        thread::spawn(move || {
            let session = admin(&db);
            for i in 0..rounds {
                let name = store_name(i % n);
                let deleted = session.delete_stores(&json!({"name": name, "force": true}));
                let created = session.create_store(&json!({"name": name}));
                if deleted.is_err() || created.is_err() {
                    unexpected.fetch_add(1, Ordering::Relaxed);
                }
            }
        })
    };

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let db = Arc::clone(&db);
            let counters = Arc::clone(&counters);
            let unexpected = Arc::clone(&unexpected);
            let operations = config.operations;

            thread::spawn(move || {
                let session = admin(&db);
                for i in 0..operations {
                    let result = session.add_users_to_store(&json!({
                        "store_name": store_name((i + t) % n),
                        "user_email": user_email(t % n)
                    }));
                    if let Err(err) = &result {
                        if err.kind() != ErrorKind::NotFound {
                            unexpected.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    counters.record(&result);
                }
            })
        })
        .collect();

    churn.join().expect("Churn thread panicked");
    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    assert_eq!(
        unexpected.load(Ordering::Relaxed),
        0,
        "delete churn produced errors other than NotFound"
    );
    counters.finish(start)
}
