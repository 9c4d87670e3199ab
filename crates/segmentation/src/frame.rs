use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};

use crate::error::{Result, SegmentationError};

/// An owned 8-bit image buffer with interleaved channels and optional
/// per-row padding.
///
/// Rows are `stride_elements()` elements apart, where
/// `stride = width * channels + padding_elements`. Algorithms must go through
/// [`Frame::row`] / [`Frame::pixel`] and never assume that consecutive rows are
/// contiguous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    channels: u32,
    padding_elements: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Allocates a frame with every element (padding included) set to `value`.
    pub fn new(width: u32, height: u32, channels: u32, padding_elements: u32, value: u8) -> Result<Self> {
        if channels == 0 {
            return Err(SegmentationError::invalid("frame needs at least one channel"));
        }

        let stride = (width as usize)
            .checked_mul(channels as usize)
            .and_then(|v| v.checked_add(padding_elements as usize))
            .ok_or_else(|| SegmentationError::invalid("frame stride overflows"))?;
        let len = stride
            .checked_mul(height as usize)
            .ok_or_else(|| SegmentationError::invalid("frame size overflows"))?;

        let mut data = Vec::new();
        data.try_reserve_exact(len)?;
        data.resize(len, value);

        Ok(Self {
            width,
            height,
            channels,
            padding_elements,
            data,
        })
    }

    /// Allocates a single-channel mask without padding.
    pub fn new_mask(width: u32, height: u32, value: u8) -> Result<Self> {
        Self::new(width, height, 1, 0, value)
    }

    /// Allocates a frame with the same layout as `self`, filled with `value`.
    pub fn new_like(&self, value: u8) -> Result<Self> {
        Self::new(self.width, self.height, self.channels, self.padding_elements, value)
    }

    /// Copies the frame, padding included, reporting allocation failure
    /// instead of aborting.
    pub fn try_clone(&self) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(self.data.len())?;
        data.extend_from_slice(&self.data);
        Ok(Self { data, ..*self })
    }

    /// Wraps an existing buffer; `data` must hold exactly `stride * height` elements.
    pub fn from_vec(
        width: u32,
        height: u32,
        channels: u32,
        padding_elements: u32,
        data: Vec<u8>,
    ) -> Result<Self> {
        if channels == 0 {
            return Err(SegmentationError::invalid("frame needs at least one channel"));
        }
        let expected = (width as usize * channels as usize + padding_elements as usize) * height as usize;
        if data.len() != expected {
            return Err(SegmentationError::invalid(format!(
                "frame buffer holds {} elements, expected {expected}",
                data.len()
            )));
        }

        Ok(Self {
            width,
            height,
            channels,
            padding_elements,
            data,
        })
    }

    pub fn from_gray_image(image: &GrayImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            channels: 1,
            padding_elements: 0,
            data: image.as_raw().clone(),
        }
    }

    pub fn from_rgb_image(image: &RgbImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            channels: 3,
            padding_elements: 0,
            data: image.as_raw().clone(),
        }
    }

    /// Converts any decoded image to an RGB frame, or to a mask when the
    /// source is single-channel.
    pub fn from_dynamic_image(image: &DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(gray) => Self::from_gray_image(gray),
            other => Self::from_rgb_image(&other.to_rgb8()),
        }
    }

    /// Copies the first channel into a `GrayImage`, dropping padding.
    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([self.row(y)[(x * self.channels) as usize]])
        })
    }

    /// Copies the frame into an `RgbImage`; single-channel frames are replicated.
    pub fn to_rgb_image(&self) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let pixel = self.pixel_unchecked(x, y);
            match pixel.len() {
                1 | 2 => Rgb([pixel[0], pixel[0], pixel[0]]),
                _ => Rgb([pixel[0], pixel[1], pixel[2]]),
            }
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn padding_elements(&self) -> u32 {
        self.padding_elements
    }

    pub fn stride_elements(&self) -> usize {
        self.width as usize * self.channels as usize + self.padding_elements as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn has_same_size(&self, other: &Frame) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Returns `DimensionMismatch` unless `other` covers the same pixel grid.
    pub fn ensure_same_size(&self, other: &Frame) -> Result<()> {
        if self.has_same_size(other) {
            return Ok(());
        }
        Err(SegmentationError::DimensionMismatch {
            expected_width: self.width,
            expected_height: self.height,
            actual_width: other.width,
            actual_height: other.height,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The full row including trailing padding.
    ///
    /// Panics if `y >= height`.
    pub fn row(&self, y: u32) -> &[u8] {
        assert!(y < self.height, "row index out of bounds");
        let stride = self.stride_elements();
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        assert!(y < self.height, "row index out of bounds");
        let stride = self.stride_elements();
        let start = y as usize * stride;
        &mut self.data[start..start + stride]
    }

    /// Rows as mutable slices of `stride` elements, for row-partitioned writes.
    pub(crate) fn rows_mut(&mut self) -> std::slice::ChunksExactMut<'_, u8> {
        let stride = self.stride_elements().max(1);
        self.data.chunks_exact_mut(stride)
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixel_unchecked(x, y))
    }

    pub fn pixel_mut(&mut self, x: u32, y: u32) -> Option<&mut [u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let channels = self.channels as usize;
        let start = y as usize * self.stride_elements() + x as usize * channels;
        Some(&mut self.data[start..start + channels])
    }

    /// Pixel access without the coordinate check; still panics on a slice
    /// overrun rather than reading foreign memory.
    #[inline]
    pub(crate) fn pixel_unchecked(&self, x: u32, y: u32) -> &[u8] {
        let channels = self.channels as usize;
        let start = y as usize * self.stride_elements() + x as usize * channels;
        &self.data[start..start + channels]
    }

    /// First-channel value, meant for masks.
    #[inline]
    pub fn value(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.stride_elements() + (x * self.channels) as usize]
    }

    #[inline]
    pub fn set_value(&mut self, x: u32, y: u32, value: u8) {
        let index = y as usize * self.stride_elements() + (x * self.channels) as usize;
        self.data[index] = value;
    }

    /// Sets every pixel element (not the padding) to `value`.
    pub fn fill(&mut self, value: u8) {
        let row_len = (self.width * self.channels) as usize;
        for row in self.rows_mut() {
            row[..row_len].fill(value);
        }
    }

    /// Number of first-channel elements equal to `value`.
    pub fn count_value(&self, value: u8) -> usize {
        (0..self.height)
            .map(|y| {
                self.row(y)
                    .iter()
                    .step_by(self.channels as usize)
                    .take(self.width as usize)
                    .filter(|&&v| v == value)
                    .count()
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_includes_padding() {
        let frame = Frame::new(5, 3, 3, 2, 0).expect("valid frame");
        assert_eq!(frame.stride_elements(), 17);
        assert_eq!(frame.data().len(), 51);
        assert_eq!(frame.row(2).len(), 17);
    }

    #[test]
    fn pixel_access_respects_padding() {
        let mut frame = Frame::new(4, 4, 2, 3, 9).expect("valid frame");
        frame.pixel_mut(3, 1).expect("in bounds").copy_from_slice(&[1, 2]);

        assert_eq!(frame.pixel(3, 1), Some(&[1u8, 2][..]));
        assert_eq!(frame.pixel(4, 1), None);
        // padding of row 1 is untouched
        assert_eq!(&frame.row(1)[8..], &[9, 9, 9]);
    }

    #[test]
    fn fill_leaves_padding_alone() {
        let mut mask = Frame::new(3, 2, 1, 1, 7).expect("valid frame");
        mask.fill(0);
        assert_eq!(mask.count_value(0), 6);
        assert_eq!(mask.row(0)[3], 7);
    }

    #[test]
    fn from_vec_rejects_wrong_length() {
        let result = Frame::from_vec(4, 4, 1, 0, vec![0; 15]);
        assert!(matches!(result, Err(SegmentationError::InvalidArgument(_))));
    }

    #[test]
    fn zero_channels_is_invalid() {
        assert!(Frame::new(2, 2, 0, 0, 0).is_err());
    }

    #[test]
    fn gray_image_round_trip_drops_padding() {
        let mut frame = Frame::new(3, 2, 1, 4, 0).expect("valid frame");
        frame.set_value(2, 1, 200);
        let gray = frame.to_gray_image();
        assert_eq!(gray.get_pixel(2, 1)[0], 200);

        let back = Frame::from_gray_image(&gray);
        assert_eq!(back.stride_elements(), 3);
        assert_eq!(back.value(2, 1), 200);
    }

    #[test]
    fn size_mismatch_is_reported() {
        let a = Frame::new_mask(4, 4, 0).expect("valid frame");
        let b = Frame::new_mask(4, 5, 0).expect("valid frame");
        assert!(matches!(
            a.ensure_same_size(&b),
            Err(SegmentationError::DimensionMismatch { actual_height: 5, .. })
        ));
    }
}
