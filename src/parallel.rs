use std::cell::RefCell;

use rayon::prelude::*;

use crate::random::Rng;

thread_local! {
    // worker stream tagged with the run seed it was created from, so a
    // persistent pool re-seeds between renders
    static WORKER_RNG: RefCell<Option<(u64, Rng)>> = RefCell::new(None);
}

/// Partition the index space `[0, count)` across a pool of workers and run
/// `op(index, rng)` for every index. Each worker owns a lazily created
/// random stream seeded from `(seed, worker_id)`.
///
/// `num_threads` of -1 runs on rayon's shared global pool (all hardware
/// threads); an explicit positive count builds a dedicated pool; 1 runs a
/// plain sequential loop, which makes runs with the same seed
/// bit-reproducible.
pub fn foreach<F>(count: u64, num_threads: i32, seed: u64, op: F) -> anyhow::Result<()>
where
    F: Fn(u64, &mut Rng) + Sync,
{
    if count == 0 {
        return Ok(());
    }

    let progress = indicatif::ProgressBar::new(count);

    if num_threads == 1 {
        let mut rng = Rng::for_worker(seed, 0);
        for index in 0..count {
            op(index, &mut rng);
            progress.inc(1);
        }
    } else {
        let body = |index: u64| {
            WORKER_RNG.with(|cell| {
                let slot = &mut *cell.borrow_mut();
                match slot {
                    Some((run_seed, rng)) if *run_seed == seed => op(index, rng),
                    _ => {
                        let worker = rayon::current_thread_index().unwrap_or(0) as u64;
                        let (_, rng) = slot.insert((seed, Rng::for_worker(seed, worker)));
                        op(index, rng);
                    }
                }
            });
            progress.inc(1);
        };

        if num_threads < 0 {
            (0..count).into_par_iter().for_each(body);
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(num_threads as usize)
                .build()?;
            pool.install(|| (0..count).into_par_iter().for_each(body));
        }
    }

    progress.finish_and_clear();
    Ok(())
}
