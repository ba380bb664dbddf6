//! Host mirrors of the kernel's buffer structs and the startup check that
//! both sides agree on their byte layout.

use std::mem::size_of;

use bytemuck::{Pod, Zeroable};
use naga::{ArraySize, Module, TypeInner};

use crate::error::PipelineError;
use crate::render::kernel::{ENTRY_POINT, WORKGROUP_SIZE};
use crate::scene::{Camera, DirectionalLight, Sphere};

pub const PIXEL_BINDING: u32 = 0;
pub const SPHERE_BINDING: u32 = 1;
pub const PARAMS_BINDING: u32 = 2;

/// Seven tightly packed floats: center, radius, color.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuSphere {
    pub center: [f32; 3],
    pub radius: f32,
    pub color: [f32; 3],
}

impl From<&Sphere> for GpuSphere {
    fn from(sphere: &Sphere) -> Self {
        Self {
            center: sphere.center.to_array(),
            radius: sphere.radius,
            color: sphere.color.to_array(),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuPixel {
    pub coord: [i32; 2],
    pub color: [f32; 3],
}

impl GpuPixel {
    /// Written into every slot before a dispatch. No invocation has a negative
    /// coordinate, so a slot still holding it was skipped by the kernel.
    pub const UNWRITTEN: Self = Self {
        coord: [-1, -1],
        color: [0.0; 3],
    };
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct KernelParams {
    pub camera_position: [f32; 4],
    pub light_dir: [f32; 4],
    pub resolution: [f32; 2],
    pub sphere_count: u32,
    pub _padding: u32,
}

impl KernelParams {
    pub fn new(
        camera: &Camera,
        light: &DirectionalLight,
        resolution: (u32, u32),
        sphere_count: u32,
    ) -> Self {
        Self {
            camera_position: camera.position.extend(1.0).into(),
            light_dir: light.direction().extend(0.0).into(),
            resolution: [resolution.0 as f32, resolution.1 as f32],
            sphere_count,
            _padding: 0,
        }
    }
}

/// Fails unless the compiled kernel lays out its structs, bindings and
/// workgroup exactly as the host mirrors expect.
pub fn verify(module: &Module) -> Result<(), PipelineError> {
    check_struct(module, "Sphere", size_of::<GpuSphere>())?;
    check_struct(module, "Pixel", size_of::<GpuPixel>())?;
    check_struct(module, "Params", size_of::<KernelParams>())?;
    check_array_stride(module, "Sphere", size_of::<GpuSphere>())?;
    check_array_stride(module, "Pixel", size_of::<GpuPixel>())?;
    check_binding(module, PIXEL_BINDING, "Pixel")?;
    check_binding(module, SPHERE_BINDING, "Sphere")?;
    check_workgroup(module)
}

fn check_struct(module: &Module, name: &'static str, host: usize) -> Result<(), PipelineError> {
    let device = module
        .types
        .iter()
        .find_map(|(_, ty)| match &ty.inner {
            TypeInner::Struct { span, .. } if ty.name.as_deref() == Some(name) => Some(*span),
            _ => None,
        })
        .unwrap_or(0);
    mismatch(name, host, device)
}

fn check_array_stride(
    module: &Module,
    element: &'static str,
    host: usize,
) -> Result<(), PipelineError> {
    let device = module
        .types
        .iter()
        .find_map(|(_, ty)| match ty.inner {
            TypeInner::Array {
                base,
                size: ArraySize::Dynamic,
                stride,
            } if module.types[base].name.as_deref() == Some(element) => Some(stride),
            _ => None,
        })
        .unwrap_or(0);
    mismatch(element, host, device)
}

fn mismatch(item: &'static str, host: usize, device: u32) -> Result<(), PipelineError> {
    if host as u64 == u64::from(device) {
        Ok(())
    } else {
        Err(PipelineError::LayoutMismatch {
            item,
            host: host as u64,
            device: u64::from(device),
        })
    }
}

fn check_binding(module: &Module, binding: u32, element: &'static str) -> Result<(), PipelineError> {
    let bound = module.global_variables.iter().any(|(_, global)| {
        let Some(resource) = &global.binding else {
            return false;
        };
        if resource.group != 0 || resource.binding != binding {
            return false;
        }
        match module.types[global.ty].inner {
            TypeInner::Array { base, .. } => module.types[base].name.as_deref() == Some(element),
            _ => false,
        }
    });
    if bound {
        Ok(())
    } else {
        Err(PipelineError::BindingMismatch {
            binding,
            expected: element,
        })
    }
}

fn check_workgroup(module: &Module) -> Result<(), PipelineError> {
    let host = [WORKGROUP_SIZE, WORKGROUP_SIZE, 1];
    let device = module
        .entry_points
        .iter()
        .find(|entry| entry.name == ENTRY_POINT)
        .map(|entry| entry.workgroup_size)
        .unwrap_or([0; 3]);
    if device == host {
        Ok(())
    } else {
        Err(PipelineError::WorkgroupMismatch { host, device })
    }
}
