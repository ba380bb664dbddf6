//! Per-pixel ray/sphere kernel.
//!
//! [`KERNEL_SOURCE`] is the WGSL program dispatched on the device. The free
//! functions below replay the same arithmetic on the host; tests use them as
//! the reference the device output is checked against.

use glam::{Vec2, Vec3};

use crate::error::PipelineError;
use crate::frame::FrameImage;
use crate::scene::{Camera, DirectionalLight, Sphere};

/// Name of the compute entry point in [`KERNEL_SOURCE`].
pub const ENTRY_POINT: &str = "cs_main";

/// Edge length of the square workgroup declared by the kernel.
pub const WORKGROUP_SIZE: u32 = 8;

/// Lower bound on diffuse intensity so faces turned away from the light stay visible.
pub const AMBIENT_FLOOR: f32 = 0.2;

/// Hits farther than this are ignored.
pub const MAX_DISTANCE: f32 = 1.0e6;

pub const KERNEL_SOURCE: &str = r#"
struct Params {
    camera_position: vec4<f32>,
    light_dir: vec4<f32>,
    resolution: vec2<f32>,
    sphere_count: u32,
    _padding: u32,
}

struct Sphere {
    center: array<f32, 3>,
    radius: f32,
    color: array<f32, 3>,
}

struct Pixel {
    coord: array<i32, 2>,
    color: array<f32, 3>,
}

@group(0) @binding(0)
var<storage, read_write> pixels: array<Pixel>;

@group(0) @binding(1)
var<storage, read> spheres: array<Sphere>;

@group(0) @binding(2)
var<uniform> params: Params;

const NO_HIT: f32 = -1.0;
const AMBIENT_FLOOR: f32 = 0.2;
const MAX_DISTANCE: f32 = 1.0e6;

fn sphere_intersection(ray_origin: vec3<f32>, ray_dir: vec3<f32>, center: vec3<f32>, radius: f32) -> f32 {
    let oc = ray_origin - center;
    let b = dot(oc, ray_dir);
    let c = dot(oc, oc) - radius * radius;
    let h = b * b - c;
    if (h <= 0.0) {
        return NO_HIT;
    }
    return -b - sqrt(h);
}

@compute @workgroup_size(8, 8, 1)
fn cs_main(@builtin(global_invocation_id) id: vec3<u32>) {
    let width = u32(params.resolution.x);
    let height = u32(params.resolution.y);
    if (id.x >= width || id.y >= height) {
        return;
    }
    let index = id.y * width + id.x;

    var uv = vec2<f32>(f32(id.x), f32(id.y)) / params.resolution * 2.0 - 1.0;
    uv.x *= params.resolution.x / params.resolution.y;

    let ray_origin = params.camera_position.xyz;
    let ray_dir = normalize(vec3<f32>(uv, 1.0));
    let light_dir = params.light_dir.xyz;

    var nearest_t = MAX_DISTANCE;
    var pixel_color = vec3<f32>(0.0, 0.0, 0.0);

    for (var i = 0u; i < params.sphere_count; i++) {
        let sphere = spheres[i];
        let center = vec3<f32>(sphere.center[0], sphere.center[1], sphere.center[2]);
        let t = sphere_intersection(ray_origin, ray_dir, center, sphere.radius);
        if (t > 0.0 && t < nearest_t) {
            nearest_t = t;
            let hit_point = ray_origin + t * ray_dir;
            let normal = normalize(hit_point - center);
            let intensity = max(dot(normal, light_dir), AMBIENT_FLOOR);
            let color = vec3<f32>(sphere.color[0], sphere.color[1], sphere.color[2]);
            pixel_color = color * intensity;
        }
    }

    pixels[index].coord = array<i32, 2>(i32(id.x), i32(id.y));
    pixels[index].color = array<f32, 3>(pixel_color.x, pixel_color.y, pixel_color.z);
}
"#;

/// Parses and validates WGSL, rendering compiler diagnostics on failure.
pub fn compile(source: &str) -> Result<naga::Module, PipelineError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|err| {
        PipelineError::ShaderCompile {
            diagnostics: err.emit_to_string(source),
        }
    })?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::empty(),
    )
    .validate(&module)
    .map_err(|err| PipelineError::ShaderCompile {
        diagnostics: err.emit_to_string(source),
    })?;
    Ok(module)
}

/// Workgroups needed along each axis to cover `resolution`.
pub fn workgroup_count(resolution: (u32, u32)) -> (u32, u32) {
    (
        resolution.0.div_ceil(WORKGROUP_SIZE),
        resolution.1.div_ceil(WORKGROUP_SIZE),
    )
}

/// Maps a pixel to `[-1, 1]^2`, stretching x by the aspect ratio.
pub fn pixel_uv(x: u32, y: u32, resolution: (u32, u32)) -> Vec2 {
    let size = Vec2::new(resolution.0 as f32, resolution.1 as f32);
    let mut uv = Vec2::new(x as f32, y as f32) / size * 2.0 - 1.0;
    uv.x *= size.x / size.y;
    uv
}

pub fn ray_direction(uv: Vec2) -> Vec3 {
    uv.extend(1.0).normalize()
}

/// Nearest root of the ray/sphere quadratic, or `None` when the ray misses or grazes.
///
/// The root may be negative when the sphere is behind or around the origin.
pub fn intersect_sphere(origin: Vec3, direction: Vec3, sphere: &Sphere) -> Option<f32> {
    let oc = origin - sphere.center;
    let b = oc.dot(direction);
    let c = oc.dot(oc) - sphere.radius * sphere.radius;
    let h = b * b - c;
    if h <= 0.0 {
        return None;
    }
    Some(-b - h.sqrt())
}

pub fn lambert(normal: Vec3, light_dir: Vec3) -> f32 {
    normal.dot(light_dir).max(AMBIENT_FLOOR)
}

/// Shaded color of the nearest sphere along the ray, black on a miss.
pub fn trace(origin: Vec3, direction: Vec3, spheres: &[Sphere], light: &DirectionalLight) -> Vec3 {
    let mut nearest = MAX_DISTANCE;
    let mut color = Vec3::ZERO;
    for sphere in spheres {
        let Some(t) = intersect_sphere(origin, direction, sphere) else {
            continue;
        };
        if t > 0.0 && t < nearest {
            nearest = t;
            let hit_point = origin + t * direction;
            let normal = (hit_point - sphere.center).normalize();
            color = sphere.color * lambert(normal, light.direction());
        }
    }
    color
}

/// Renders a full frame on the host.
pub fn render_reference(
    resolution: (u32, u32),
    camera: &Camera,
    light: &DirectionalLight,
    spheres: &[Sphere],
) -> FrameImage {
    let (width, height) = resolution;
    let colors = (0..height).flat_map(|y| {
        (0..width).map(move |x| {
            let direction = ray_direction(pixel_uv(x, y, resolution));
            trace(camera.position, direction, spheres, light)
        })
    });
    FrameImage::from_colors(width, height, colors).unwrap_or_else(|| FrameImage::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_sphere() -> Sphere {
        Sphere::new(Vec3::ZERO, 1.0, Vec3::ONE)
    }

    #[test]
    fn head_on_ray_hits_at_expected_distance() {
        let t = intersect_sphere(Vec3::new(0.0, 0.0, -5.0), Vec3::Z, &unit_sphere()).unwrap();
        assert!((t - 4.0).abs() < 1e-5);
    }

    #[test]
    fn tangent_ray_misses() {
        let hit = intersect_sphere(Vec3::new(1.0, 0.0, -5.0), Vec3::Z, &unit_sphere());
        assert!(hit.is_none());
    }

    #[test]
    fn ray_beyond_silhouette_misses() {
        let hit = intersect_sphere(Vec3::new(1.5, 0.0, -5.0), Vec3::Z, &unit_sphere());
        assert!(hit.is_none());
        let away = intersect_sphere(Vec3::new(0.0, 0.0, -5.0), Vec3::Y, &unit_sphere());
        assert!(away.is_none());
    }

    #[test]
    fn sphere_behind_camera_is_ignored() {
        let light = DirectionalLight::default();
        let behind = Sphere::new(Vec3::new(0.0, 0.0, -10.0), 1.0, Vec3::ONE);
        assert_eq!(trace(Vec3::ZERO, Vec3::Z, &[behind], &light), Vec3::ZERO);
    }

    #[test]
    fn intensity_never_drops_below_floor() {
        let directions = [
            Vec3::X,
            Vec3::NEG_X,
            Vec3::Y,
            Vec3::NEG_Y,
            Vec3::Z,
            Vec3::NEG_Z,
            Vec3::new(1.0, -1.0, -1.0).normalize(),
            Vec3::new(-0.3, 0.8, 0.2).normalize(),
        ];
        for normal in directions {
            for light in directions {
                assert!(lambert(normal, light) >= AMBIENT_FLOOR);
            }
        }
        assert_eq!(lambert(Vec3::Z, Vec3::NEG_Z), AMBIENT_FLOOR);
        assert!((lambert(Vec3::Z, Vec3::Z) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn nearest_sphere_wins() {
        let light = DirectionalLight::new(Vec3::NEG_Z).unwrap();
        let near = Sphere::new(Vec3::new(0.0, 0.0, 0.0), 1.0, Vec3::new(1.0, 0.0, 0.0));
        let far = Sphere::new(Vec3::new(0.0, 0.0, 1.5), 1.5, Vec3::new(0.0, 1.0, 0.0));
        let origin = Vec3::new(0.0, 0.0, -5.0);

        let expected = Vec3::new(1.0, 0.0, 0.0);
        let color = trace(origin, Vec3::Z, &[far, near], &light);
        assert!((color - expected).length() < 1e-5);
        let color = trace(origin, Vec3::Z, &[near, far], &light);
        assert!((color - expected).length() < 1e-5);
    }

    #[test]
    fn empty_scene_is_black() {
        let image = render_reference(
            (16, 9),
            &Camera::default(),
            &DirectionalLight::default(),
            &[],
        );
        assert_eq!(image.lit_pixels(), 0);
    }

    #[test]
    fn small_frame_lights_center_and_leaves_corners_black() {
        let camera = Camera {
            position: Vec3::ZERO,
        };
        let light = DirectionalLight::new(Vec3::NEG_Z).unwrap();
        let color = Vec3::new(0.8, 0.4, 0.2);
        let sphere = Sphere::new(Vec3::new(0.0, 0.0, 1.0), 0.5, color);

        let image = render_reference((8, 8), &camera, &light, &[sphere]);

        assert_eq!(image.pixel(4, 4), Some([204, 102, 51]));
        for (x, y) in [(0, 0), (7, 0), (0, 7), (7, 7)] {
            assert_eq!(image.pixel(x, y), Some([0, 0, 0]), "corner ({x}, {y})");
        }
    }

    #[test]
    fn uv_covers_unit_square_with_aspect() {
        assert_eq!(pixel_uv(0, 0, (8, 8)), Vec2::new(-1.0, -1.0));
        assert_eq!(pixel_uv(4, 4, (8, 8)), Vec2::ZERO);
        let wide = pixel_uv(0, 0, (16, 8));
        assert_eq!(wide, Vec2::new(-2.0, -1.0));
    }

    #[test]
    fn workgroups_cover_partial_tiles() {
        assert_eq!(workgroup_count((8, 8)), (1, 1));
        assert_eq!(workgroup_count((9, 17)), (2, 3));
        assert_eq!(workgroup_count((200, 150)), (25, 19));
    }

    #[test]
    fn kernel_source_compiles() {
        assert!(compile(KERNEL_SOURCE).is_ok());
    }

    #[test]
    fn broken_source_reports_diagnostics() {
        let broken = KERNEL_SOURCE.replace("let b = dot(oc, ray_dir);", "let b = dot(oc);");
        match compile(&broken) {
            Err(PipelineError::ShaderCompile { diagnostics }) => assert!(!diagnostics.is_empty()),
            other => panic!("expected a compile error, got {other:?}"),
        }
    }
}
