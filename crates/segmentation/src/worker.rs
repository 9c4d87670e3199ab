//! Row-partitioned execution of per-row kernels.
//!
//! A [`Worker`] owns a rayon thread pool. Kernels hand it a target frame and a
//! per-row callback; the target is split into disjoint bands of whole rows so
//! every callback writes only its own rows while reading shared inputs.
//! Without a worker (or for small frames) the callback runs sequentially.

use rayon::prelude::*;

use crate::frame::Frame;

/// Smallest band of rows worth handing to a separate thread.
pub const MIN_ROWS_PER_PARTITION: u32 = 32;

pub struct Worker {
    pool: rayon::ThreadPool,
}

impl Worker {
    /// Creates a worker with `threads` threads (0 lets rayon decide).
    pub fn new(threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs `f(y, row)` for every row of `target`, splitting the rows into
    /// bands of at least `min_rows` rows.
    pub fn process_rows<F>(&self, target: &mut Frame, min_rows: u32, f: F)
    where
        F: Fn(u32, &mut [u8]) + Sync + Send,
    {
        let height = target.height();
        let stride = target.stride_elements();
        let min_rows = min_rows.max(1);
        if height < 2 * min_rows || stride == 0 || self.threads() <= 1 {
            process_rows_sequential(target, f);
            return;
        }

        let bands = (self.threads() as u32).min(height / min_rows).max(1);
        let rows_per_band = height.div_ceil(bands) as usize;

        self.pool.install(|| {
            target
                .data_mut()
                .par_chunks_mut(rows_per_band * stride)
                .enumerate()
                .for_each(|(band, chunk)| {
                    let first_row = (band * rows_per_band) as u32;
                    for (offset, row) in chunk.chunks_exact_mut(stride).enumerate() {
                        f(first_row + offset as u32, row);
                    }
                });
        });
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker").field("threads", &self.threads()).finish()
    }
}

/// Dispatches to `worker` when present, otherwise runs every row in order.
pub fn process_rows<F>(worker: Option<&Worker>, target: &mut Frame, min_rows: u32, f: F)
where
    F: Fn(u32, &mut [u8]) + Sync + Send,
{
    match worker {
        Some(worker) => worker.process_rows(target, min_rows, f),
        None => process_rows_sequential(target, f),
    }
}

fn process_rows_sequential<F>(target: &mut Frame, f: F)
where
    F: Fn(u32, &mut [u8]),
{
    for (y, row) in target.rows_mut().enumerate() {
        f(y as u32, row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_rows(worker: Option<&Worker>, height: u32) -> Frame {
        let mut frame = Frame::new(7, height, 2, 3, 0).expect("valid frame");
        process_rows(worker, &mut frame, 4, |y, row| {
            for (x, value) in row[..14].iter_mut().enumerate() {
                *value = ((y as usize * 31 + x) % 251) as u8;
            }
        });
        frame
    }

    #[test]
    fn parallel_rows_match_sequential_rows() {
        let worker = Worker::new(4).expect("thread pool");
        let sequential = fill_rows(None, 203);
        let parallel = fill_rows(Some(&worker), 203);
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn small_frames_run_sequentially_with_worker() {
        let worker = Worker::new(3).expect("thread pool");
        let frame = fill_rows(Some(&worker), 5);
        assert_eq!(frame, fill_rows(None, 5));
    }

    #[test]
    fn padding_is_never_written() {
        let frame = fill_rows(None, 9);
        for y in 0..9 {
            assert_eq!(&frame.row(y)[14..], &[0, 0, 0]);
        }
    }
}
