use std::borrow::Cow;
use std::mem::size_of;
use std::num::NonZeroU64;
use std::sync::mpsc;

use glam::Vec3;
use log::{debug, info};
use pollster::block_on;

use crate::error::PipelineError;
use crate::frame::FrameImage;
use crate::orchestrator::FrameRenderer;
use crate::render::context::GpuContext;
use crate::render::kernel::{self, ENTRY_POINT, KERNEL_SOURCE};
use crate::render::layout::{
    self, GpuPixel, GpuSphere, KernelParams, PARAMS_BINDING, PIXEL_BINDING, SPHERE_BINDING,
};
use crate::scene::{Camera, DirectionalLight, Sphere};

/// Device-resident scene and pixel buffers plus the kernel that connects them.
///
/// Buffers are allocated once for a fixed resolution and sphere count; each
/// frame only rewrites their contents. One frame is in flight at a time.
pub struct BufferExchange {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    params_buffer: wgpu::Buffer,
    sphere_buffer: wgpu::Buffer,
    pixel_buffer: wgpu::Buffer,
    staging_buffer: wgpu::Buffer,
    unwritten: Vec<GpuPixel>,
    resolution: (u32, u32),
    sphere_capacity: usize,
}

impl BufferExchange {
    /// Compiles the kernel, checks its layout against the host structs and
    /// allocates buffers for `resolution` pixels and `sphere_capacity` spheres.
    pub fn new(
        gpu: &GpuContext,
        resolution: (u32, u32),
        sphere_capacity: usize,
    ) -> Result<Self, PipelineError> {
        let module = kernel::compile(KERNEL_SOURCE)?;
        layout::verify(&module)?;

        let device = gpu.device.clone();
        let queue = gpu.queue.clone();

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sphere-kernel"),
            source: wgpu::ShaderSource::Naga(Cow::Owned(module)),
        });

        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sphere-kernel-bind-layout"),
            entries: &[
                storage_entry(PIXEL_BINDING, false, size_of::<GpuPixel>()),
                storage_entry(SPHERE_BINDING, true, size_of::<GpuSphere>()),
                wgpu::BindGroupLayoutEntry {
                    binding: PARAMS_BINDING,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(size_of::<KernelParams>() as u64),
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sphere-kernel-pipeline-layout"),
            bind_group_layouts: &[&bind_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("sphere-kernel-pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some(ENTRY_POINT),
            compilation_options: Default::default(),
            cache: None,
        });
        if let Some(err) = block_on(device.pop_error_scope()) {
            return Err(PipelineError::ShaderCompile {
                diagnostics: err.to_string(),
            });
        }

        let pixel_bytes = pixel_buffer_size(resolution);
        // A zero-sized binding is invalid, so an empty scene still gets one slot.
        let sphere_bytes = sphere_capacity.max(1) as u64 * size_of::<GpuSphere>() as u64;
        let limits = device.limits();
        check_buffer_size("sphere", sphere_bytes, &limits)?;
        check_buffer_size("pixel", pixel_bytes, &limits)?;

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("kernel-params"),
            size: size_of::<KernelParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let sphere_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scene-spheres"),
            size: sphere_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let pixel_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame-pixels"),
            size: pixel_bytes,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame-pixels-readback"),
            size: pixel_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sphere-kernel-bind-group"),
            layout: &bind_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: PIXEL_BINDING,
                    resource: pixel_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: SPHERE_BINDING,
                    resource: sphere_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: PARAMS_BINDING,
                    resource: params_buffer.as_entire_binding(),
                },
            ],
        });

        let validation = block_on(device.pop_error_scope());
        let out_of_memory = block_on(device.pop_error_scope());
        if let Some(err) = validation.or(out_of_memory) {
            return Err(PipelineError::Allocation(err.to_string()));
        }

        info!(
            "Allocated kernel buffers for {}x{} pixels and {} spheres ({} bytes of pixels)",
            resolution.0, resolution.1, sphere_capacity, pixel_bytes
        );

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group,
            params_buffer,
            sphere_buffer,
            pixel_buffer,
            staging_buffer,
            unwritten: vec![GpuPixel::UNWRITTEN; resolution.0 as usize * resolution.1 as usize],
            resolution,
            sphere_capacity,
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    pub fn sphere_capacity(&self) -> usize {
        self.sphere_capacity
    }

    /// Writes the scene and per-frame constants into device memory.
    pub fn upload(
        &mut self,
        spheres: &[Sphere],
        camera: &Camera,
        light: &DirectionalLight,
    ) -> Result<(), PipelineError> {
        if spheres.len() != self.sphere_capacity {
            return Err(PipelineError::SceneSize {
                expected: self.sphere_capacity,
                actual: spheres.len(),
            });
        }

        let packed: Vec<GpuSphere> = spheres.iter().map(GpuSphere::from).collect();
        if !packed.is_empty() {
            self.queue
                .write_buffer(&self.sphere_buffer, 0, bytemuck::cast_slice(&packed));
        }

        let params = KernelParams::new(camera, light, self.resolution, packed.len() as u32);
        self.queue
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));
        Ok(())
    }

    /// Runs the kernel over every pixel and queues the copy to the read-back buffer.
    pub fn dispatch(&mut self) -> Result<(), PipelineError> {
        let (groups_x, groups_y) = kernel::workgroup_count(self.resolution);

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        // Pixels the kernel skips keep the sentinel and fail the coordinate check on read-back.
        self.queue
            .write_buffer(&self.pixel_buffer, 0, bytemuck::cast_slice(&self.unwritten));
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("sphere-kernel-encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("sphere-kernel-pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        encoder.copy_buffer_to_buffer(
            &self.pixel_buffer,
            0,
            &self.staging_buffer,
            0,
            pixel_buffer_size(self.resolution),
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        if let Some(err) = block_on(self.device.pop_error_scope()) {
            return Err(PipelineError::Dispatch(err.to_string()));
        }
        debug!("Dispatched {groups_x}x{groups_y} workgroups");
        Ok(())
    }

    /// Blocks until the last dispatch finishes and returns its pixels as an image.
    pub fn read_back(&mut self) -> Result<FrameImage, PipelineError> {
        let slice = self.staging_buffer.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| PipelineError::Readback(err.to_string()))?;
        receiver
            .recv()
            .map_err(|err| PipelineError::Readback(err.to_string()))?
            .map_err(|err| PipelineError::Readback(err.to_string()))?;

        let image = {
            let data = slice.get_mapped_range();
            bytemuck::try_cast_slice::<u8, GpuPixel>(&data)
                .map_err(|err| PipelineError::Readback(err.to_string()))
                .and_then(|pixels| assemble_frame(pixels, self.resolution))
        };
        self.staging_buffer.unmap();
        image
    }
}

impl FrameRenderer for BufferExchange {
    fn render(
        &mut self,
        spheres: &[Sphere],
        camera: &Camera,
        light: &DirectionalLight,
    ) -> Result<FrameImage, PipelineError> {
        self.upload(spheres, camera, light)?;
        self.dispatch()?;
        self.read_back()
    }
}

fn storage_entry(binding: u32, read_only: bool, element_size: usize) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(element_size as u64),
        },
        count: None,
    }
}

/// Rejects buffers the device could not bind as storage.
fn check_buffer_size(
    buffer: &'static str,
    size: u64,
    limits: &wgpu::Limits,
) -> Result<(), PipelineError> {
    let limit = u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size);
    if size > limit {
        return Err(PipelineError::BufferTooLarge {
            buffer,
            size,
            limit,
        });
    }
    Ok(())
}

fn pixel_buffer_size(resolution: (u32, u32)) -> u64 {
    u64::from(resolution.0) * u64::from(resolution.1) * size_of::<GpuPixel>() as u64
}

/// Reshapes read-back pixels into an image, rejecting any slot whose
/// coordinate does not match its position in the buffer.
pub fn assemble_frame(pixels: &[GpuPixel], resolution: (u32, u32)) -> Result<FrameImage, PipelineError> {
    let (width, height) = resolution;
    let expected = width as usize * height as usize;
    if pixels.len() != expected {
        return Err(PipelineError::Readback(format!(
            "expected {expected} pixels, read {}",
            pixels.len()
        )));
    }

    if let Some(index) = pixels.iter().enumerate().position(|(index, pixel)| {
        let x = (index % width as usize) as i32;
        let y = (index / width as usize) as i32;
        pixel.coord != [x, y]
    }) {
        return Err(PipelineError::IncompleteFrame { index });
    }

    let colors = pixels.iter().map(|pixel| Vec3::from_array(pixel.color));
    FrameImage::from_colors(width, height, colors).ok_or_else(|| {
        PipelineError::Readback("pixel count does not match the resolution".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(width: u32, height: u32) -> Vec<GpuPixel> {
        (0..height)
            .flat_map(|y| {
                (0..width).map(move |x| GpuPixel {
                    coord: [x as i32, y as i32],
                    color: [x as f32 / width as f32, 0.0, 1.0],
                })
            })
            .collect()
    }

    #[test]
    fn assembles_row_major_image() {
        let image = assemble_frame(&written(4, 3), (4, 3)).unwrap();
        assert_eq!(image.width(), 4);
        assert_eq!(image.height(), 3);
        assert_eq!(image.pixel(2, 1), Some([128, 0, 255]));
    }

    #[test]
    fn unwritten_pixel_is_reported() {
        let mut pixels = written(5, 5);
        pixels[17] = GpuPixel::UNWRITTEN;
        assert!(matches!(
            assemble_frame(&pixels, (5, 5)),
            Err(PipelineError::IncompleteFrame { index: 17 })
        ));
    }

    #[test]
    fn unwritten_first_pixel_is_reported() {
        let mut pixels = written(3, 2);
        pixels[0] = GpuPixel::UNWRITTEN;
        assert!(matches!(
            assemble_frame(&pixels, (3, 2)),
            Err(PipelineError::IncompleteFrame { index: 0 })
        ));
    }

    #[test]
    fn oversized_sphere_buffer_is_rejected_before_allocation() {
        let limits = wgpu::Limits::downlevel_defaults();
        let bytes = 5_000_000 * size_of::<GpuSphere>() as u64;
        match check_buffer_size("sphere", bytes, &limits) {
            Err(PipelineError::BufferTooLarge {
                buffer,
                size,
                limit,
            }) => {
                assert_eq!(buffer, "sphere");
                assert_eq!(size, 140_000_000);
                assert_eq!(limit, u64::from(limits.max_storage_buffer_binding_size));
            }
            other => panic!("expected an oversized buffer error, got {other:?}"),
        }
        assert!(check_buffer_size("pixel", pixel_buffer_size((800, 600)), &limits).is_ok());
    }

    #[test]
    fn short_buffer_is_rejected() {
        let pixels = written(4, 4);
        assert!(matches!(
            assemble_frame(&pixels[..15], (4, 4)),
            Err(PipelineError::Readback(_))
        ));
    }

    #[test]
    fn buffer_size_follows_resolution() {
        assert_eq!(pixel_buffer_size((200, 150)), 200 * 150 * 20);
    }
}
