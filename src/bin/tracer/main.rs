//! Tracer CLI - render progressive frames with a WGSL kernel, headless.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use glam::Vec3;
use progressive_tracer::backend::gpu::{GpuBackend, GpuTexture};
use progressive_tracer::camera::OrbitCamera;
use progressive_tracer::prelude::*;
use tracing_subscriber::EnvFilter;

/// Options for `render`
struct RenderArgs {
    kernel: PathBuf,
    entry: String,
    skybox: Option<PathBuf>,
    settings: Option<PathBuf>,
    output: PathBuf,
    frames: u32,
    width: u32,
    height: u32,
    spheres: Option<usize>,
    seed: Option<u64>,
    yaw: f32,
    pitch: f32,
    distance: f32,
}

impl Default for RenderArgs {
    fn default() -> Self {
        Self {
            kernel: PathBuf::new(),
            entry: "main".into(),
            skybox: None,
            settings: None,
            output: PathBuf::from("render.png"),
            frames: 64,
            width: 1280,
            height: 720,
            spheres: None,
            seed: None,
            yaw: 45.0,
            pitch: -20.0,
            distance: 40.0,
        }
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut level = "info";
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => level = "debug",
            "-vv" | "--trace" => level = "trace",
            "-q" | "--quiet" => level = "warn",
            _ => filtered_args.push(arg),
        }
    }
    init_logging(level);

    if filtered_args.is_empty() {
        print_usage(&args[0]);
        return;
    }

    let result = match filtered_args[0] {
        "render" | "r" => parse_render(&filtered_args[1..]).and_then(cmd_render),
        "scene" | "s" => cmd_scene(&filtered_args[1..]),
        "info" | "i" => cmd_info(),
        "help" | "h" | "-h" | "--help" => {
            print_usage(&args[0]);
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage(&args[0]);
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,progressive_tracer={default_level},tracer_cli={default_level}")));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn print_usage(prog: &str) {
    println!("Tracer CLI - progressive GPU ray tracing driver");
    println!();
    println!("Usage: {} [options] <command> [args]", prog);
    println!();
    println!("Commands:");
    println!("  r, render <kernel.wgsl>  Render progressive frames and save the result");
    println!("  s, scene                 Print a generated scene");
    println!("  i, info                  Show adapter and build info");
    println!("  h, help                  Show this help");
    println!();
    println!("Render options:");
    println!("  --entry NAME        Kernel entry point (default: main)");
    println!("  --skybox FILE       HDR/EXR environment map");
    println!("  --settings FILE     Settings JSON (default: user config dir)");
    println!("  --frames N          Frames to accumulate (default: 64)");
    println!("  --size WxH          Output size (default: 1280x720)");
    println!("  --spheres N         Sphere count (overrides settings)");
    println!("  --seed N            RNG seed (overrides settings)");
    println!("  --yaw D --pitch D   Camera angles in degrees");
    println!("  --distance D        Camera distance from origin");
    println!("  -o, --output FILE   Output image, .png or .exr (default: render.png)");
    println!();
    println!("Options:");
    println!("  -v, --verbose  Debug output");
    println!("  -vv, --trace   Trace output (very verbose)");
    println!("  -q, --quiet    Warnings only");
}

fn value<'a>(args: &[&'a str], i: &mut usize, flag: &str) -> Result<&'a str> {
    *i += 1;
    args.get(*i).copied().with_context(|| format!("{flag} needs a value"))
}

fn parse_size(s: &str) -> Result<(u32, u32)> {
    let (w, h) = s.split_once('x').with_context(|| format!("size must look like 1280x720, got {s}"))?;
    Ok((w.parse()?, h.parse()?))
}

fn parse_render(args: &[&str]) -> Result<RenderArgs> {
    let mut out = RenderArgs::default();
    let mut kernel = None;
    let mut i = 0;
    while i < args.len() {
        match args[i] {
            "--entry" => out.entry = value(args, &mut i, "--entry")?.to_string(),
            "--skybox" => out.skybox = Some(value(args, &mut i, "--skybox")?.into()),
            "--settings" => out.settings = Some(value(args, &mut i, "--settings")?.into()),
            "--frames" => out.frames = value(args, &mut i, "--frames")?.parse()?,
            "--size" => (out.width, out.height) = parse_size(value(args, &mut i, "--size")?)?,
            "--spheres" => out.spheres = Some(value(args, &mut i, "--spheres")?.parse()?),
            "--seed" => out.seed = Some(value(args, &mut i, "--seed")?.parse()?),
            "--yaw" => out.yaw = value(args, &mut i, "--yaw")?.parse()?,
            "--pitch" => out.pitch = value(args, &mut i, "--pitch")?.parse()?,
            "--distance" => out.distance = value(args, &mut i, "--distance")?.parse()?,
            "-o" | "--output" => out.output = value(args, &mut i, "--output")?.into(),
            flag if flag.starts_with('-') => bail!("unknown option {flag}"),
            path => kernel = Some(PathBuf::from(path)),
        }
        i += 1;
    }
    out.kernel = kernel.context("render needs a kernel .wgsl file")?;
    Ok(out)
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(p) => Settings::load_from(p).with_context(|| format!("loading {}", p.display())),
        None => Ok(Settings::load()),
    }
}

fn cmd_render(args: RenderArgs) -> Result<()> {
    let mut settings = load_settings(args.settings.as_deref())?;
    if args.seed.is_some() {
        settings.seed = args.seed;
    }
    let sphere_count = args.spheres.unwrap_or(settings.scene.sphere_count);

    let source = std::fs::read_to_string(&args.kernel)
        .with_context(|| format!("reading kernel {}", args.kernel.display()))?;

    let mut gpu = GpuBackend::headless()?;
    let program = gpu.create_program(&source, &args.entry)?;
    let skybox: GpuTexture = match &args.skybox {
        Some(path) => gpu.load_skybox(path)?,
        None => gpu.solid_skybox([0.6, 0.7, 0.9, 1.0])?,
    };
    let mut target = gpu.create_target(args.width, args.height)?;

    let mut driver = FrameDriver::new(settings)?;
    driver.set_program(program);
    driver.set_skybox(skybox);
    if let Some(warning) = driver.rebuild_scene(&mut gpu, sphere_count)? {
        tracing::warn!("{warning}");
    }

    let mut camera = OrbitCamera::new(Vec3::ZERO, args.distance);
    camera.aspect = args.width as f32 / args.height as f32;
    camera.set_angles(args.yaw, args.pitch);
    camera.update(1.0);

    let start = Instant::now();
    for frame in 0..args.frames {
        let report = driver.render_frame(&mut gpu, &camera, &mut target)?;
        tracing::debug!(frame, samples = report.sample_count, weight = ?report.weight, "frame done");
        if report.outcome == FrameOutcome::Converged {
            tracing::info!("converged after {} samples", report.sample_count);
            break;
        }
    }
    let pixels = gpu.read_target(&target)?;
    tracing::info!(
        "{} samples in {:.2}s",
        driver.sample_count(),
        start.elapsed().as_secs_f32()
    );
    driver.shutdown(&mut gpu);

    save_image(&args.output, args.width, args.height, &pixels)?;
    println!("Wrote {}", args.output.display());
    Ok(())
}

fn linear_to_srgb(c: f32) -> f32 {
    let c = c.clamp(0.0, 1.0);
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn save_image(path: &Path, width: u32, height: u32, pixels: &[[f32; 4]]) -> Result<()> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
    if ext == "exr" {
        let flat: Vec<f32> = pixels.iter().flatten().copied().collect();
        let img = image::Rgba32FImage::from_raw(width, height, flat).context("pixel count mismatch")?;
        img.save(path)?;
    } else {
        let img = image::RgbaImage::from_fn(width, height, |x, y| {
            let p = pixels[(y * width + x) as usize];
            image::Rgba([
                (linear_to_srgb(p[0]) * 255.0).round() as u8,
                (linear_to_srgb(p[1]) * 255.0).round() as u8,
                (linear_to_srgb(p[2]) * 255.0).round() as u8,
                255,
            ])
        });
        img.save(path)?;
    }
    Ok(())
}

fn cmd_scene(args: &[&str]) -> Result<()> {
    let mut settings = Settings::load();
    let mut i = 0;
    while i < args.len() {
        match args[i] {
            "--spheres" => settings.scene.sphere_count = value(args, &mut i, "--spheres")?.parse()?,
            "--seed" => settings.seed = Some(value(args, &mut i, "--seed")?.parse()?),
            other => bail!("unknown option {other}"),
        }
        i += 1;
    }

    let mut backend = SoftwareBackend::new();
    let count = settings.scene.sphere_count;
    let mut driver: FrameDriver<SoftwareBackend> = FrameDriver::new(settings)?;
    if let Some(warning) = driver.rebuild_scene(&mut backend, count)? {
        println!("{warning}");
        return Ok(());
    }

    println!("{:>4}  {:>26}  {:>6}  {:>20}  {:>20}", "#", "center", "radius", "diffuse", "specular");
    for (i, s) in driver.scene().spheres().iter().enumerate() {
        println!(
            "{:>4}  ({:>7.2}, {:>6.2}, {:>7.2})  {:>6.2}  ({:.2}, {:.2}, {:.2})  ({:.2}, {:.2}, {:.2}){}",
            i,
            s.center[0], s.center[1], s.center[2],
            s.radius,
            s.diffuse[0], s.diffuse[1], s.diffuse[2],
            s.specular[0], s.specular[1], s.specular[2],
            if s.is_metal() { "  metal" } else { "" },
        );
    }
    Ok(())
}

fn cmd_info() -> Result<()> {
    println!(
        "tracer-cli {} (built {} {})",
        env!("CARGO_PKG_VERSION"),
        env!("TRACER_BUILD_DATE"),
        env!("TRACER_BUILD_TIME")
    );
    let gpu = GpuBackend::headless()?;
    if let Some(info) = gpu.adapter_info() {
        println!("Adapter: {}", info.name);
        println!("Backend: {:?}", info.backend);
        println!("Type:    {:?}", info.device_type);
        println!("Driver:  {} {}", info.driver, info.driver_info);
    }
    let limits = gpu.device().limits();
    println!("Max workgroup size: {}x{}", limits.max_compute_workgroup_size_x, limits.max_compute_workgroup_size_y);
    println!("Max 2D texture:     {}", limits.max_texture_dimension_2d);
    Ok(())
}
