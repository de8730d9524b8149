mod scene;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use aperture_render::{
    AttachmentPoint, Camera, DebugOption, GatherAlgorithm, ImageFormat, RenderDevice, SoftwareDevice, TextureDesc,
    UniversalBlur,
};
use aperture_wgpu::WgpuDevice;
use clap::{Parser, ValueEnum};
use glam::IVec2;

#[derive(Parser)]
#[command(name = "aperture", about = "Motion blur and depth of field compositor demo", version)]
struct Cli {
    /// Output PNG path
    #[arg(short, long, default_value = "aperture.png")]
    output: PathBuf,
    /// Camera settings in RON; defaults enable both effects
    #[arg(short, long)]
    camera: Option<PathBuf>,
    #[arg(long, default_value_t = 320)]
    width: u32,
    #[arg(long, default_value_t = 180)]
    height: u32,
    /// Guard band around the rendered buffers, in pixels
    #[arg(long, default_value_t = 0)]
    trim: u32,
    /// Foreground motion in pixels per frame
    #[arg(long, default_value_t = 24.0)]
    speed: f32,
    #[arg(long, default_value = "software", value_enum)]
    backend: Backend,
    /// Overrides the camera's gather algorithm
    #[arg(long, value_enum)]
    algorithm: Option<Algorithm>,
    #[arg(long, default_value = "none", value_enum)]
    debug: Debug,
    /// Seed of the jitter pattern
    #[arg(long)]
    seed: Option<u64>,
    /// Write the camera used to this RON file
    #[arg(long)]
    dump_camera: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    Software,
    Gpu,
}

#[derive(Clone, Copy, ValueEnum)]
enum Algorithm {
    Independent,
    Combined,
}

#[derive(Clone, Copy, ValueEnum)]
enum Debug {
    None,
    Coc,
    Region,
    Near,
    Blurry,
    Input,
    MidAndFar,
    SignedCoc,
}

impl From<Debug> for DebugOption {
    fn from(debug: Debug) -> Self {
        match debug {
            Debug::None => DebugOption::None,
            Debug::Coc => DebugOption::ShowCoc,
            Debug::Region => DebugOption::ShowRegion,
            Debug::Near => DebugOption::ShowNear,
            Debug::Blurry => DebugOption::ShowBlurry,
            Debug::Input => DebugOption::ShowInput,
            Debug::MidAndFar => DebugOption::ShowMidAndFar,
            Debug::SignedCoc => DebugOption::ShowSignedCoc,
        }
    }
}

fn default_camera() -> Camera {
    let mut camera = Camera::new("demo");
    camera.universal_blur_settings_mut().set_enabled(true);
    camera.motion_blur_settings_mut().set_enabled(true);
    let dof = camera.depth_of_field_settings_mut();
    dof.set_enabled(true);
    dof.set_focus_plane_z(scene::WALL_Z);
    dof.set_lens_radius(0.05);
    camera
}

fn load_camera(path: Option<&Path>) -> Result<Camera> {
    let Some(path) = path else {
        return Ok(default_camera());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let camera: Camera = ron::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    log::info!("Loaded camera '{}' from {}", camera.name(), path.display());
    Ok(camera)
}

/// Uploads the scene, runs the compositor and reads the trimmed result back
/// as RGBA8.
fn render(rd: &mut dyn RenderDevice, cli: &Cli, camera: &Camera) -> image::RgbaImage {
    let scene = scene::build(camera, cli.width, cli.height, cli.trim, cli.speed);

    let color = rd.create_texture(&TextureDesc::new("color", scene.width, scene.height, ImageFormat::RGBA16F));
    rd.write_texture(color, &scene.color);
    let depth = rd.create_texture(&TextureDesc::new("depth", scene.width, scene.height, ImageFormat::R32F));
    rd.write_texture(depth, &scene.depth);
    let velocity = rd.create_texture(&TextureDesc::new("velocity", scene.width, scene.height, ImageFormat::RG16F));
    rd.write_texture(velocity, &scene.velocity);

    let output = rd.create_texture(&TextureDesc::new("output", scene.width, scene.height, ImageFormat::RGBA16F));
    let fb = rd.create_framebuffer("output");
    rd.set_attachment(fb, AttachmentPoint::Color0, Some(output));
    rd.set_framebuffer(Some(fb));

    let mut blur = match cli.seed {
        Some(seed) => UniversalBlur::with_seed(seed),
        None => UniversalBlur::new(),
    };
    log::info!("Compositing as {:?}", UniversalBlur::state_for(camera));
    let trim = IVec2::splat(cli.trim as i32);
    blur.apply(rd, color, Some(depth), velocity, camera, trim, cli.debug.into());

    let mut out = image::RgbaImage::new(cli.width, cli.height);
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let v = rd.read_pixel(output, x + cli.trim, y + cli.trim);
        let to_byte = |c: f32| (c.clamp(0.0, 1.0).powf(1.0 / 2.2) * 255.0).round() as u8;
        *pixel = image::Rgba([to_byte(v.x), to_byte(v.y), to_byte(v.z), 255]);
    }
    out
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    if cli.width == 0 || cli.height == 0 {
        bail!("image size must be non-zero, got {}x{}", cli.width, cli.height);
    }

    let mut camera = load_camera(cli.camera.as_deref())?;
    if let Some(algorithm) = cli.algorithm {
        camera.universal_blur_settings_mut().set_gather_algorithm(match algorithm {
            Algorithm::Independent => GatherAlgorithm::Independent,
            Algorithm::Combined => GatherAlgorithm::Combined,
        });
    }
    if let Some(path) = &cli.dump_camera {
        let text = ron::ser::to_string_pretty(&camera, ron::ser::PrettyConfig::default())?;
        std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    }

    let image = match cli.backend {
        Backend::Software => render(&mut SoftwareDevice::new(), &cli, &camera),
        Backend::Gpu => {
            let mut device = WgpuDevice::new_headless().map_err(anyhow::Error::msg)?;
            render(&mut device, &cli, &camera)
        }
    };
    image
        .save(&cli.output)
        .with_context(|| format!("writing {}", cli.output.display()))?;
    println!("Wrote {}", cli.output.display());
    Ok(())
}
