//! Collective synchronization for data-parallel training.
//!
//! Each worker holds an independent replica of the policy and runs the
//! same training loop; a collective primitive synchronizes them after
//! every optimization step and at epoch boundaries (where the primary
//! worker checkpoints while the others hold). `ThreadGroup` implements
//! the discipline for same-process workers; a cross-machine transport
//! would implement the same trait.

use std::sync::{Arc, Barrier};

use parking_lot::Mutex;

/// Collective operations shared by all workers of one training run.
pub trait Collective: Send {
    /// This worker's rank in `[0, world_size)`.
    fn rank(&self) -> usize;

    /// Number of workers.
    fn world_size(&self) -> usize;

    /// Whether this worker checkpoints and evaluates.
    fn is_primary(&self) -> bool {
        self.rank() == 0
    }

    /// Block until every worker arrives.
    fn barrier(&self);

    /// Synchronization point after each optimization step.
    fn sync_step(&self);

    /// Replace `values` with the element-wise mean across all workers.
    fn all_reduce(&self, values: &mut [f32]);
}

/// Single-process collective: every operation is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl Collective for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn world_size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn sync_step(&self) {}

    fn all_reduce(&self, _values: &mut [f32]) {}
}

struct GroupShared {
    barrier: Barrier,
    accumulator: Mutex<Vec<f32>>,
}

/// Collective over same-process worker threads.
///
/// Built once per run with [`ThreadGroup::split`]; each worker thread owns
/// one handle.
pub struct ThreadGroup {
    rank: usize,
    world_size: usize,
    shared: Arc<GroupShared>,
}

impl ThreadGroup {
    /// Create one handle per worker.
    pub fn split(world_size: usize) -> Vec<ThreadGroup> {
        assert!(world_size > 0, "world_size must be > 0");
        let shared = Arc::new(GroupShared {
            barrier: Barrier::new(world_size),
            accumulator: Mutex::new(Vec::new()),
        });
        (0..world_size)
            .map(|rank| ThreadGroup {
                rank,
                world_size,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

impl Collective for ThreadGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }

    fn sync_step(&self) {
        self.shared.barrier.wait();
    }

    fn all_reduce(&self, values: &mut [f32]) {
        {
            let mut accumulator = self.shared.accumulator.lock();
            if accumulator.len() != values.len() {
                accumulator.clear();
                accumulator.resize(values.len(), 0.0);
            }
            for (sum, value) in accumulator.iter_mut().zip(values.iter()) {
                *sum += *value;
            }
        }

        // Everyone has contributed; read back the mean.
        self.shared.barrier.wait();
        {
            let accumulator = self.shared.accumulator.lock();
            for (value, sum) in values.iter_mut().zip(accumulator.iter()) {
                *value = *sum / self.world_size as f32;
            }
        }

        // Reset for the next reduction only after every reader is done.
        let result = self.shared.barrier.wait();
        if result.is_leader() {
            self.shared.accumulator.lock().clear();
        }
        self.shared.barrier.wait();
    }
}

/// Run `worker` once per rank on its own thread and collect the results
/// in rank order.
pub fn run_data_parallel<T, F>(world_size: usize, worker: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(usize, ThreadGroup) -> T + Send + Sync + 'static,
{
    let worker = Arc::new(worker);
    let (sender, receiver) = crossbeam_channel::unbounded();

    let mut handles = Vec::with_capacity(world_size);
    for (rank, group) in ThreadGroup::split(world_size).into_iter().enumerate() {
        let worker = Arc::clone(&worker);
        let sender = sender.clone();
        handles.push(std::thread::spawn(move || {
            let result = worker(rank, group);
            let _ = sender.send((rank, result));
        }));
    }
    drop(sender);

    let mut results: Vec<(usize, T)> = receiver.iter().collect();
    for handle in handles {
        let _ = handle.join();
    }
    results.sort_by_key(|(rank, _)| *rank);
    results.into_iter().map(|(_, result)| result).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_process_is_trivial() {
        let collective = SingleProcess;
        assert_eq!(collective.rank(), 0);
        assert_eq!(collective.world_size(), 1);
        assert!(collective.is_primary());

        let mut values = [1.0, 2.0];
        collective.all_reduce(&mut values);
        assert_eq!(values, [1.0, 2.0]);
    }

    #[test]
    fn test_thread_group_all_reduce_means() {
        let results = run_data_parallel(3, |rank, group| {
            let mut values = [(rank + 1) as f32, 10.0 * (rank + 1) as f32];
            group.all_reduce(&mut values);
            values
        });

        // Contributions 1,2,3 and 10,20,30: every worker reads the mean.
        for values in results {
            assert!((values[0] - 2.0).abs() < 1e-6);
            assert!((values[1] - 20.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_thread_group_repeated_reductions() {
        let results = run_data_parallel(2, |rank, group| {
            let mut first = [rank as f32];
            group.all_reduce(&mut first);
            let mut second = [(rank * 10) as f32];
            group.all_reduce(&mut second);
            (first[0], second[0])
        });

        for (first, second) in results {
            assert!((first - 0.5).abs() < 1e-6);
            assert!((second - 5.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_only_rank_zero_is_primary() {
        let results = run_data_parallel(4, |_, group| (group.rank(), group.is_primary()));
        for (rank, primary) in results {
            assert_eq!(primary, rank == 0);
        }
    }

    #[test]
    fn test_results_in_rank_order() {
        let results = run_data_parallel(4, |rank, _| rank);
        assert_eq!(results, vec![0, 1, 2, 3]);
    }
}
