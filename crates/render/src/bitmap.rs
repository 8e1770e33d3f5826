use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use image::imageops::{self, FilterType};
use image::{ImageEncoder, ImageFormat, RgbaImage};
use std::sync::Arc;

const CHANNELS: usize = 4;

/// An RGBA8 image.
///
/// Pixels sit behind an [`Arc`], so clones are cheap and every waiter on a
/// thumbnail shares one buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Arc<[u8]>,
}

impl Bitmap {
    /// Wrap a row-major RGBA8 buffer.
    ///
    /// # Errors
    ///
    /// [`InvalidBitmap`](ErrorKind::InvalidBitmap) when `pixels` is not
    /// exactly `width * height * 4` bytes or either side is zero.
    pub fn new(width: u32, height: u32, pixels: impl Into<Arc<[u8]>>) -> Result<Self> {
        let pixels = pixels.into();
        let expected = (width as usize).checked_mul(height as usize).and_then(|n| n.checked_mul(CHANNELS));
        if width == 0 || height == 0 || expected != Some(pixels.len()) {
            exn::bail!(ErrorKind::InvalidBitmap(width, height));
        }
        Ok(Self { width, height, pixels })
    }

    /// A bitmap filled with one colour.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self> {
        let count = (width as usize) * (height as usize);
        Self::new(width, height, rgba.repeat(count))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    /// Whether both bitmaps share the same pixel buffer.
    pub fn ptr_eq(&self, other: &Bitmap) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }

    /// Shrink so the longest edge is at most `max_dimension`, keeping the
    /// aspect ratio. Bitmaps that already fit are returned as-is.
    pub fn downscale(&self, max_dimension: u32) -> Result<Self> {
        let longest = self.width.max(self.height);
        if longest <= max_dimension || max_dimension == 0 {
            return Ok(self.clone());
        }
        let scale = |side: u32| ((u64::from(side) * u64::from(max_dimension)) / u64::from(longest)).max(1);
        // Infallible: scaled sides never exceed max_dimension.
        let width = u32::try_from(scale(self.width)).unwrap_or(max_dimension);
        let height = u32::try_from(scale(self.height)).unwrap_or(max_dimension);
        tracing::trace!(from.width = self.width, from.height = self.height, width, height, "downscaling bitmap");
        let source = self.to_image()?;
        let resized = imageops::resize(&source, width, height, FilterType::Triangle);
        Self::new(width, height, resized.into_raw())
    }

    /// Encode as PNG.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut png = Vec::new();
        image::codecs::png::PngEncoder::new(&mut png)
            .write_image(&self.pixels, self.width, self.height, image::ExtendedColorType::Rgba8)
            .or_raise(|| ErrorKind::Codec)?;
        Ok(png)
    }

    /// Decode a PNG written by [`to_png()`](Self::to_png).
    pub fn from_png(bytes: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Png).or_raise(|| ErrorKind::Codec)?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::new(width, height, rgba.into_raw())
    }

    fn to_image(&self) -> Result<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.pixels.to_vec())
            .ok_or_else(|| exn::Exn::from(ErrorKind::InvalidBitmap(self.width, self.height)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_new_validates_length() {
        assert!(Bitmap::new(2, 2, vec![0u8; 16]).is_ok());
        assert!(Bitmap::new(2, 2, vec![0u8; 15]).is_err());
        assert!(Bitmap::new(0, 2, Vec::<u8>::new()).is_err());
    }

    #[rstest]
    #[case((1200, 1800), 240, (160, 240))]
    #[case((1800, 1200), 240, (240, 160))]
    #[case((100, 150), 240, (100, 150))]
    #[case((1000, 1), 240, (240, 1))]
    fn test_downscale(#[case] size: (u32, u32), #[case] max: u32, #[case] expected: (u32, u32)) {
        let bitmap = Bitmap::solid(size.0, size.1, [10, 20, 30, 255]).unwrap();
        let thumb = bitmap.downscale(max).unwrap();
        assert_eq!((thumb.width(), thumb.height()), expected);
        // Filtering a flat colour may round by one step.
        assert!(thumb.pixels()[..3].iter().zip([10u8, 20, 30]).all(|(got, want)| got.abs_diff(want) <= 1));
    }

    #[test]
    fn test_downscale_noop_shares_buffer() {
        let bitmap = Bitmap::solid(10, 10, [0, 0, 0, 255]).unwrap();
        assert!(bitmap.downscale(240).unwrap().ptr_eq(&bitmap));
    }

    #[test]
    fn test_png_roundtrip_preserves_pixels() {
        let bitmap = Bitmap::new(2, 1, vec![255, 0, 0, 255, 0, 0, 255, 128]).unwrap();
        let png = bitmap.to_png().unwrap();
        assert_eq!(&png[1..4], b"PNG");
        assert_eq!(Bitmap::from_png(&png).unwrap(), bitmap);
    }

    #[test]
    fn test_from_png_rejects_garbage() {
        let err = Bitmap::from_png(b"definitely not a png").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Codec));
    }
}
