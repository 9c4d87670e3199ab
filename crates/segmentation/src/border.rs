/// Maps a possibly out-of-range index onto `[0, len)` by mirroring at the
/// frame edge: `-1 -> 0`, `-2 -> 1`, `len -> len - 1`, `len + 1 -> len - 2`.
///
/// For a reach of one pixel this is identical to clamp-to-edge. Indices more
/// than `len` elements outside the range are clamped after mirroring.
#[inline]
pub fn mirror_index(index: isize, len: usize) -> usize {
    debug_assert!(len > 0);
    let len = len as isize;

    let mirrored = if index < 0 {
        -index - 1
    } else if index >= len {
        2 * len - index - 1
    } else {
        index
    };

    mirrored.clamp(0, len - 1) as usize
}

/// Offsets of the 8-neighborhood together with their inpainting weights:
/// axis-adjacent neighbors count twice as much as diagonal ones.
pub(crate) const WEIGHTED_NEIGHBORS_8: [(isize, isize, u32); 8] = [
    (-1, -1, 1),
    (0, -1, 2),
    (1, -1, 1),
    (-1, 0, 2),
    (1, 0, 2),
    (-1, 1, 1),
    (0, 1, 2),
    (1, 1, 1),
];

/// Offsets of the 4-neighborhood, all with unit weight.
pub(crate) const WEIGHTED_NEIGHBORS_4: [(isize, isize, u32); 4] =
    [(0, -1, 1), (-1, 0, 1), (1, 0, 1), (0, 1, 1)];

/// Returns the in-frame neighbor at `(x + dx, y + dy)`, or `None` when the
/// offset leaves the frame.
#[inline]
pub(crate) fn offset_within(
    x: u32,
    y: u32,
    dx: isize,
    dy: isize,
    width: u32,
    height: u32,
) -> Option<(u32, u32)> {
    let nx = x as isize + dx;
    let ny = y as isize + dy;
    if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
        return None;
    }
    Some((nx as u32, ny as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_maps_one_pixel_reach_like_clamp() {
        assert_eq!(mirror_index(-1, 5), 0);
        assert_eq!(mirror_index(0, 5), 0);
        assert_eq!(mirror_index(4, 5), 4);
        assert_eq!(mirror_index(5, 5), 4);
    }

    #[test]
    fn mirror_reflects_two_pixel_reach() {
        assert_eq!(mirror_index(-2, 5), 1);
        assert_eq!(mirror_index(6, 5), 3);
        assert_eq!(mirror_index(-2, 4), 1);
        assert_eq!(mirror_index(5, 4), 2);
    }

    #[test]
    fn mirror_clamps_far_indices() {
        assert_eq!(mirror_index(-9, 2), 1);
        assert_eq!(mirror_index(9, 2), 0);
        assert_eq!(mirror_index(-1, 1), 0);
    }

    #[test]
    fn offset_within_rejects_outside_positions() {
        assert_eq!(offset_within(0, 0, -1, 0, 4, 4), None);
        assert_eq!(offset_within(3, 3, 1, 1, 4, 4), None);
        assert_eq!(offset_within(1, 2, 1, -1, 4, 4), Some((2, 1)));
    }
}
