use glam::Vec3;
use serde::{Deserialize, Serialize};

// Phase offsets per center component; only their mutual incommensurability matters.
const PHASE_X: f64 = 1274.0;
const PHASE_Y: f64 = 127_478.0;
const PHASE_Z: f64 = 8899.0;
const PHASE_RADIUS: f64 = 855.0;

const PALETTE_STEPS: [u64; 3] = [1337, 133_712, 13_371_234];

/// Sphere drawn by the kernel for a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
    pub color: Vec3,
}

impl Sphere {
    pub const fn new(center: Vec3, radius: f32, color: Vec3) -> Self {
        Self {
            center,
            radius,
            color,
        }
    }
}

/// Pinhole camera looking down `+z`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub position: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, -5.0),
        }
    }
}

/// Single directional light. The direction always has unit length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionalLight {
    direction: Vec3,
}

impl DirectionalLight {
    /// Normalizes `direction`; returns `None` for a zero or non-finite vector.
    pub fn new(direction: Vec3) -> Option<Self> {
        direction
            .try_normalize()
            .map(|direction| Self { direction })
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(1.0, -1.0, -1.0).normalize(),
        }
    }
}

/// Builds the scene for time `time` (seconds). Pure in `(time, count)`.
pub fn generate(time: f32, count: u32) -> Vec<Sphere> {
    (0..count).map(|index| sphere_at(index, time)).collect()
}

fn sphere_at(index: u32, time: f32) -> Sphere {
    let i = f64::from(index);
    let t = f64::from(time);

    let center = Vec3::new(
        (i * PHASE_X + 0.2 * t).sin() as f32,
        (i * PHASE_Y + (0.3 + i * 0.1) * t).sin() as f32,
        (i * PHASE_Z + 0.5 * t).sin() as f32,
    );
    let radius = (0.375 + 0.25 * (i * PHASE_RADIUS).sin() + 0.1 * t.sin()) as f32;

    Sphere {
        center,
        radius,
        color: palette(index),
    }
}

fn palette(index: u32) -> Vec3 {
    let [r, g, b] = PALETTE_STEPS.map(|step| {
        let level = (u64::from(index) * step + 127) % 256;
        level as f32 / 255.0
    });
    Vec3::new(r, g, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_returns_requested_count() {
        assert_eq!(generate(1.5, 6).len(), 6);
        assert!(generate(1.5, 0).is_empty());
    }

    #[test]
    fn generate_is_deterministic() {
        for time in [0.0, 0.016, 3.7, 1234.5] {
            assert_eq!(generate(time, 16), generate(time, 16));
        }
    }

    #[test]
    fn radius_stays_in_bounds() {
        let mut time = 0.0_f32;
        while time < 20.0 {
            for sphere in generate(time, 32) {
                assert!(
                    sphere.radius > 0.025 && sphere.radius < 0.725,
                    "radius {} out of bounds at t={time}",
                    sphere.radius
                );
            }
            time += 0.05;
        }
    }

    #[test]
    fn palette_is_fixed_per_index() {
        let early = generate(0.0, 4);
        let late = generate(42.0, 4);
        for (a, b) in early.iter().zip(&late) {
            assert_eq!(a.color, b.color);
        }
        assert_eq!(early[0].color, Vec3::splat(127.0 / 255.0));
    }

    #[test]
    fn colors_are_normalized() {
        for sphere in generate(0.0, 64) {
            for channel in sphere.color.to_array() {
                assert!((0.0..=1.0).contains(&channel));
            }
        }
    }

    #[test]
    fn centers_animate_over_time() {
        let a = generate(0.0, 3);
        let b = generate(1.0, 3);
        assert!(a.iter().zip(&b).all(|(a, b)| a.center != b.center));
    }

    #[test]
    fn light_direction_is_unit_length() {
        let light = DirectionalLight::new(Vec3::new(0.0, 0.0, -3.0)).unwrap();
        assert_eq!(light.direction(), Vec3::new(0.0, 0.0, -1.0));
        assert!((DirectionalLight::default().direction().length() - 1.0).abs() < 1e-6);
        assert!(DirectionalLight::new(Vec3::ZERO).is_none());
    }
}
