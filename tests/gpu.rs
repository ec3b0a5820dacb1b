//! wgpu backend end to end. Each test returns early when no adapter is available.

#![cfg(feature = "gpu")]

use glam::{Mat4, Vec3};
use progressive_tracer::camera::{wgpu_projection, CameraPose};
use progressive_tracer::prelude::*;

const UNIFORMS_WGSL: &str = r#"
struct Uniforms {
    camera_to_world: mat4x4<f32>,
    inverse_projection: mat4x4<f32>,
    pixel_offset: vec2<f32>,
    sphere_count: u32,
    sample_index: u32,
}
@group(0) @binding(0) var<uniform> uniforms: Uniforms;
@group(0) @binding(1) var skybox: texture_2d<f32>;
@group(0) @binding(2) var skybox_sampler: sampler;
@group(0) @binding(3) var<storage, read> spheres: array<f32>;
@group(0) @binding(4) var result: texture_storage_2d<rgba32float, write>;
"#;

/// Kernel body writing `value` (an f32 expression) to every pixel.
fn kernel(value: &str) -> String {
    format!(
        r#"{UNIFORMS_WGSL}
@compute @workgroup_size(8, 8, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {{
    let size = textureDimensions(result);
    if (id.x >= size.x || id.y >= size.y) {{
        return;
    }}
    let v = {value};
    textureStore(result, vec2<i32>(id.xy), vec4<f32>(v, v, v, 1.0));
}}
"#
    )
}

fn gpu() -> Option<GpuBackend> {
    match GpuBackend::headless() {
        Ok(gpu) => Some(gpu),
        Err(e) => {
            eprintln!("skipping, no adapter: {e}");
            None
        }
    }
}

fn pose_at(eye: Vec3) -> CameraPose {
    let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
    CameraPose::from_view_projection(view, wgpu_projection(1.0, 1.0, 0.1, 100.0))
}

fn driver(gpu: &GpuBackend, value: &str) -> FrameDriver<GpuBackend> {
    let settings = Settings { seed: Some(17), ..Default::default() };
    let mut driver = FrameDriver::new(settings).unwrap();
    driver.set_program(gpu.create_program(&kernel(value), "main").unwrap());
    driver.set_skybox(gpu.solid_skybox([0.25, 0.25, 0.25, 1.0]).unwrap());
    driver
}

fn assert_all(pixels: &[[f32; 4]], expected: f32, tol: f32) {
    for p in pixels {
        assert!((p[0] - expected).abs() < tol, "pixel {} != {expected}", p[0]);
    }
}

#[test]
fn test_gpu_running_mean_stays_exact() {
    let Some(mut gpu) = gpu() else { return };
    let mut driver = driver(&gpu, "uniforms.pixel_offset.x");
    let camera = pose_at(Vec3::new(0.0, 2.0, 6.0));
    // Not a multiple of the group size
    let mut target = gpu.create_target(37, 23).unwrap();

    let mut sum = 0.0f64;
    for n in 1..=300u32 {
        let report = driver.render_frame(&mut gpu, &camera, &mut target).unwrap();
        assert_eq!(report.sample_count, n);
        sum += report.pixel_offset.x as f64;

        if n == 1 || n == 10 || n == 300 {
            let pixels = gpu.read_target(&target).unwrap();
            assert_eq!(pixels.len(), 37 * 23);
            assert_all(&pixels, (sum / n as f64) as f32, 2e-3);
        }
    }
}

#[test]
fn test_gpu_reset_on_camera_change() {
    let Some(mut gpu) = gpu() else { return };
    let mut driver = driver(&gpu, "uniforms.camera_to_world[3].x + uniforms.pixel_offset.y");
    let mut target = gpu.create_target(16, 16).unwrap();

    let a = pose_at(Vec3::new(0.25, 2.0, 6.0));
    for _ in 0..5 {
        driver.render_frame(&mut gpu, &a, &mut target).unwrap();
    }

    let b = pose_at(Vec3::new(0.75, 2.0, 6.0));
    let report = driver.render_frame(&mut gpu, &b, &mut target).unwrap();
    assert!(report.camera_reset);
    assert_eq!(report.sample_count, 1);

    let expected = b.camera_to_world.w_axis.x + report.pixel_offset.y;
    assert_all(&gpu.read_target(&target).unwrap(), expected, 2e-3);
}

#[test]
fn test_gpu_scene_and_skybox_bindings() {
    let Some(mut gpu) = gpu() else { return };
    // Radius of the first sphere, or the skybox when nothing is bound
    let value = "select(textureSampleLevel(skybox, skybox_sampler, vec2<f32>(0.5, 0.5), 0.0).x, \
                 spheres[3], uniforms.sphere_count > 0u)";
    let mut driver = driver(&gpu, value);
    let camera = pose_at(Vec3::new(0.0, 1.0, 5.0));
    let mut target = gpu.create_target(8, 8).unwrap();

    let report = driver.render_frame(&mut gpu, &camera, &mut target).unwrap();
    assert!(!report.scene_bound);
    assert_eq!(report.warning, Some(Warning::EmptyScene));
    assert_all(&gpu.read_target(&target).unwrap(), 0.25, 1e-3);

    let sphere = Sphere::new([0.0, 0.75, 0.0], 0.75, [0.5; 3], [0.04; 3]);
    driver.set_scene(&mut gpu, vec![sphere]).unwrap();
    let report = driver.render_frame(&mut gpu, &camera, &mut target).unwrap();
    assert!(report.scene_bound);
    assert_eq!(report.sample_count, 1);
    assert_all(&gpu.read_target(&target).unwrap(), 0.75, 1e-3);

    driver.shutdown(&mut gpu);
}

#[test]
fn test_gpu_resize_reallocates() {
    let Some(mut gpu) = gpu() else { return };
    let mut driver = driver(&gpu, "0.5");
    let camera = pose_at(Vec3::new(0.0, 1.0, 5.0));

    let mut small = gpu.create_target(8, 8).unwrap();
    driver.render_frame(&mut gpu, &camera, &mut small).unwrap();
    driver.render_frame(&mut gpu, &camera, &mut small).unwrap();

    let mut large = gpu.create_target(20, 12).unwrap();
    let report = driver.render_frame(&mut gpu, &camera, &mut large).unwrap();
    assert!(report.surface_reallocated);
    assert_eq!(report.sample_count, 1);
    assert_all(&gpu.read_target(&large).unwrap(), 0.5, 1e-3);
}

#[test]
fn test_gpu_invalid_kernel_is_configuration_error() {
    let Some(gpu) = gpu() else { return };
    let err = gpu.create_program("fn main( {", "main").unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(!err.is_recoverable());
}
