use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_WIDTH: u32 = 800;
pub const DEFAULT_HEIGHT: u32 = 600;
pub const DEFAULT_TITLE: &str = "ESGI Spheres";
pub const DEFAULT_SPHERE_COUNT: u32 = 6;
pub const DEFAULT_PIXEL_SIZE: u32 = 4;
pub const DEFAULT_TARGET_FPS: u32 = 60;

/// Window and scene settings fixed for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_sphere_count")]
    pub sphere_count: u32,
    /// Edge length, in window pixels, of one kernel invocation.
    #[serde(default = "default_pixel_size")]
    pub pixel_size: u32,
    /// Frames per second the window loop paces itself to. Zero is unlimited.
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            title: default_title(),
            sphere_count: default_sphere_count(),
            pixel_size: default_pixel_size(),
            target_fps: default_target_fps(),
        }
    }
}

impl RenderConfig {
    /// Resolution the kernel runs at once pixels are magnified.
    pub fn logical_resolution(&self) -> (u32, u32) {
        let size = self.pixel_size.max(1);
        (self.width / size, self.height / size)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::ZeroArea {
                width: self.width,
                height: self.height,
            });
        }
        if self.pixel_size == 0 {
            return Err(ConfigError::ZeroPixelSize);
        }
        let (width, height) = self.logical_resolution();
        if width == 0 || height == 0 {
            return Err(ConfigError::PixelSizeTooLarge {
                pixel_size: self.pixel_size,
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

fn default_width() -> u32 {
    DEFAULT_WIDTH
}

fn default_height() -> u32 {
    DEFAULT_HEIGHT
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

fn default_sphere_count() -> u32 {
    DEFAULT_SPHERE_COUNT
}

fn default_pixel_size() -> u32 {
    DEFAULT_PIXEL_SIZE
}

fn default_target_fps() -> u32 {
    DEFAULT_TARGET_FPS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RenderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.logical_resolution(), (200, 150));
    }

    #[test]
    fn zero_pixel_size_is_rejected() {
        let config = RenderConfig {
            pixel_size: 0,
            ..RenderConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroPixelSize));
    }

    #[test]
    fn oversized_pixels_are_rejected() {
        let config = RenderConfig {
            width: 8,
            height: 8,
            pixel_size: 16,
            ..RenderConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PixelSizeTooLarge { pixel_size: 16, .. })
        ));
    }

    #[test]
    fn zero_area_is_rejected() {
        let config = RenderConfig {
            height: 0,
            ..RenderConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroArea { .. })));
    }
}
