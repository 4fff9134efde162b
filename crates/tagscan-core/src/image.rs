/// Row alignment (in bytes) used for freshly allocated images.
///
/// Matches the allocator of the reference AprilTag engine, so a row stride is
/// usually larger than the image width.
pub const STRIDE_ALIGNMENT: usize = 96;

/// Canonical single-channel 8-bit image consumed by a detection engine.
///
/// Pixels are stored row-major with `stride >= width` bytes per row; the
/// bytes between `width` and `stride` are padding and always zero.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LumaImage {
    width: usize,
    height: usize,
    stride: usize,
    data: Vec<u8>,
}

impl LumaImage {
    /// Allocate a black image with the stride rounded up to [`STRIDE_ALIGNMENT`].
    pub fn new(width: usize, height: usize) -> Self {
        let stride = width.div_ceil(STRIDE_ALIGNMENT) * STRIDE_ALIGNMENT;
        Self::with_stride(width, height, stride)
    }

    /// Allocate a black image with an explicit stride.
    ///
    /// A stride smaller than `width` is raised to `width`.
    pub fn with_stride(width: usize, height: usize, stride: usize) -> Self {
        let stride = stride.max(width);
        Self {
            width,
            height,
            stride,
            data: vec![0; stride * height],
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Raw strided buffer, `stride * height` bytes.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Visible pixels of row `y` (`width` bytes, padding excluded).
    #[inline]
    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let start = y * self.stride;
        &mut self.data[start..start + self.width]
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.data[y * self.stride + x])
    }

    /// Copy the visible pixels into a tightly packed `width * height` buffer.
    pub fn to_packed(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width * self.height);
        for y in 0..self.height {
            out.extend_from_slice(self.row(y));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_is_aligned_and_never_below_width() {
        let img = LumaImage::new(100, 3);
        assert_eq!(img.stride(), 192);
        assert_eq!(img.data().len(), 192 * 3);

        let img = LumaImage::new(96, 1);
        assert_eq!(img.stride(), 96);

        let img = LumaImage::with_stride(10, 2, 4);
        assert_eq!(img.stride(), 10);
    }

    #[test]
    fn rows_exclude_padding() {
        let mut img = LumaImage::new(3, 2);
        img.row_mut(1).copy_from_slice(&[7, 8, 9]);
        assert_eq!(img.row(1), &[7, 8, 9]);
        assert_eq!(img.get(2, 1), Some(9));
        assert_eq!(img.get(3, 1), None);
        assert_eq!(img.to_packed(), vec![0, 0, 0, 7, 8, 9]);
    }
}
