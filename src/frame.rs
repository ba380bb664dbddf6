use glam::Vec3;

/// Converts a float channel in `[0, 1]` to an 8-bit level.
pub fn channel_to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Displayable image shaped `(height, width, 3)`: row-major 8-bit RGB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl FrameImage {
    /// Creates an all-black image.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 3],
        }
    }

    /// Builds an image from one float color per pixel, in row-major order.
    ///
    /// Returns `None` when `colors` does not hold exactly `width * height` entries.
    pub fn from_colors<I>(width: u32, height: u32, colors: I) -> Option<Self>
    where
        I: IntoIterator<Item = Vec3>,
    {
        let expected = width as usize * height as usize;
        let mut data = Vec::with_capacity(expected * 3);
        for color in colors {
            data.extend(color.to_array().map(channel_to_u8));
        }
        (data.len() == expected * 3).then_some(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw `(height, width, 3)` bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        Some([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ])
    }

    /// Number of pixels that are not background black.
    pub fn lit_pixels(&self) -> usize {
        self.data
            .chunks_exact(3)
            .filter(|rgb| rgb.iter().any(|&level| level != 0))
            .count()
    }

    /// Expands to RGBA with an opaque alpha channel, the layout textures accept.
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut rgba = Vec::with_capacity(self.data.len() / 3 * 4);
        for rgb in self.data.chunks_exact(3) {
            rgba.extend_from_slice(rgb);
            rgba.push(u8::MAX);
        }
        rgba
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_conversion_rounds_and_clamps() {
        assert_eq!(channel_to_u8(0.0), 0);
        assert_eq!(channel_to_u8(1.0), 255);
        assert_eq!(channel_to_u8(0.5), 128);
        assert_eq!(channel_to_u8(-0.3), 0);
        assert_eq!(channel_to_u8(7.0), 255);
        assert_eq!(channel_to_u8(f32::NAN), 0);
    }

    #[test]
    fn from_colors_is_row_major() {
        let colors = [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::ZERO,
        ];
        let image = FrameImage::from_colors(2, 2, colors).unwrap();
        assert_eq!(image.pixel(1, 0), Some([0, 255, 0]));
        assert_eq!(image.pixel(0, 1), Some([0, 0, 255]));
        assert_eq!(image.pixel(2, 0), None);
        assert_eq!(image.lit_pixels(), 3);
    }

    #[test]
    fn from_colors_rejects_wrong_length() {
        assert!(FrameImage::from_colors(2, 2, [Vec3::ONE; 3]).is_none());
    }

    #[test]
    fn rgba_expansion_adds_opaque_alpha() {
        let image = FrameImage::from_colors(1, 1, [Vec3::new(1.0, 0.5, 0.0)]).unwrap();
        assert_eq!(image.to_rgba(), vec![255, 128, 0, 255]);
        assert_eq!(FrameImage::new(3, 2).as_bytes().len(), 18);
    }
}
