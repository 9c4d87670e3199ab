//! Box mean filter used to suppress sensor noise before fingerprinting.

use tracing::trace;

use crate::{
    border::mirror_index,
    error::{Result, SegmentationError},
    frame::Frame,
    worker::{MIN_ROWS_PER_PARTITION, Worker, process_rows},
};

/// Smooths every channel with a `size x size` box filter.
///
/// `size` must be odd. Neighbors outside the frame are mirrored back inside.
/// The result has the same layout as `source`; its padding is zeroed.
pub fn mean_filter(source: &Frame, size: u32, worker: Option<&Worker>) -> Result<Frame> {
    if size == 0 || size % 2 == 0 {
        return Err(SegmentationError::invalid(format!(
            "mean filter size must be odd, got {size}"
        )));
    }
    if source.is_empty() {
        return Err(SegmentationError::invalid("cannot filter an empty frame"));
    }
    if size == 1 {
        return source.try_clone();
    }

    let mut target = source.new_like(0)?;
    let radius = (size / 2) as isize;
    let width = source.width() as usize;
    let height = source.height() as usize;
    let channels = source.channels() as usize;
    let row_len = width * channels;
    let count = size * size;

    trace!(size, width, height, channels, "mean filter");

    process_rows(worker, &mut target, MIN_ROWS_PER_PARTITION, |y, output| {
        // vertical sums first, then a horizontal window over them
        let mut columns = vec![0u32; row_len];
        for dy in -radius..=radius {
            let source_row = &source.row(mirror_index(y as isize + dy, height) as u32)[..row_len];
            for (sum, &value) in columns.iter_mut().zip(source_row) {
                *sum += value as u32;
            }
        }

        for x in 0..width {
            for c in 0..channels {
                let mut sum = 0u32;
                for dx in -radius..=radius {
                    sum += columns[mirror_index(x as isize + dx, width) * channels + c];
                }
                output[x * channels + c] = ((sum + count / 2) / count) as u8;
            }
        }
    });

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_frames_are_unchanged() {
        let frame = Frame::new(9, 7, 3, 2, 77).expect("frame");
        let filtered = mean_filter(&frame, 5, None).expect("filter");
        for y in 0..7 {
            for x in 0..9 {
                assert_eq!(filtered.pixel(x, y), Some(&[77u8, 77, 77][..]));
            }
        }
    }

    #[test]
    fn single_peak_spreads_over_the_window() {
        let mut frame = Frame::new_mask(5, 5, 0).expect("frame");
        frame.set_value(2, 2, 90);
        let filtered = mean_filter(&frame, 3, None).expect("filter");

        for y in 1..=3 {
            for x in 1..=3 {
                assert_eq!(filtered.value(x, y), 10);
            }
        }
        assert_eq!(filtered.value(0, 0), 0);
        assert_eq!(filtered.value(4, 2), 0);
    }

    #[test]
    fn corner_pixels_are_mirrored() {
        let mut frame = Frame::new_mask(5, 5, 0).expect("frame");
        frame.set_value(0, 0, 90);
        let filtered = mean_filter(&frame, 3, None).expect("filter");
        // the corner is seen four times through the mirrored border
        assert_eq!(filtered.value(0, 0), 40);
        assert_eq!(filtered.value(1, 0), 20);
        assert_eq!(filtered.value(1, 1), 10);
    }

    #[test]
    fn even_sizes_are_rejected() {
        let frame = Frame::new_mask(4, 4, 0).expect("frame");
        assert!(matches!(mean_filter(&frame, 4, None), Err(SegmentationError::InvalidArgument(_))));
        assert!(mean_filter(&frame, 0, None).is_err());
    }

    #[test]
    fn worker_matches_sequential_result() {
        let mut frame = Frame::new(40, 130, 2, 1, 0).expect("frame");
        for y in 0..130 {
            for x in 0..40 {
                let pixel = frame.pixel_mut(x, y).expect("in bounds");
                pixel[0] = ((x * 7 + y * 13) % 251) as u8;
                pixel[1] = ((x * y) % 256) as u8;
            }
        }

        let worker = Worker::new(4).expect("pool");
        let sequential = mean_filter(&frame, 5, None).expect("filter");
        let parallel = mean_filter(&frame, 5, Some(&worker)).expect("filter");
        assert_eq!(sequential, parallel);
    }
}
