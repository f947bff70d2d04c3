// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Bounded worker pool
//!
//! [`run`] maps a function over items on up to `workers` threads. Results are
//! handed to a callback on the calling thread one at a time, in completion
//! order, so terminal output never interleaves.

use crossbeam_channel::unbounded;
use std::thread;

/// Map `work` over `items` with bounded concurrency.
///
/// `on_result(completed, total, &result)` runs on the calling thread after
/// each item finishes; `completed` counts up from 1 to `items.len()`. The
/// returned results are in completion order. With a single worker the items
/// are processed in input order on the calling thread.
pub fn run<T, R, W, C>(items: Vec<T>, workers: usize, work: W, mut on_result: C) -> Vec<R>
where
    T: Send,
    R: Send,
    W: Fn(T) -> R + Sync,
    C: FnMut(usize, usize, &R),
{
    let total = items.len();
    if total == 0 {
        return Vec::new();
    }
    let workers = workers.clamp(1, total);
    let mut results = Vec::with_capacity(total);

    if workers == 1 {
        for (i, item) in items.into_iter().enumerate() {
            let result = work(item);
            on_result(i + 1, total, &result);
            results.push(result);
        }
        return results;
    }

    let (job_tx, job_rx) = unbounded::<T>();
    for item in items {
        let _ = job_tx.send(item);
    }
    drop(job_tx);

    let (result_tx, result_rx) = unbounded::<R>();
    thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let work = &work;
            scope.spawn(move || {
                for item in job_rx {
                    if result_tx.send(work(item)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        for (completed, result) in (1..).zip(result_rx.iter()) {
            on_result(completed, total, &result);
            results.push(result);
        }
    });

    results
}
