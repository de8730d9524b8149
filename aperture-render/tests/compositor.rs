//! End-to-end compositor scenarios on the software device.

use aperture_render::{
    AttachmentPoint, Camera, DebugOption, DepthOfFieldModel, FramebufferId, GatherAlgorithm, ImageFormat,
    Kernel, RenderDevice, SoftwareDevice, TextureDesc, TextureId, UniversalBlur,
};
use glam::{IVec2, Vec4};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Frame {
    color: TextureId,
    depth: TextureId,
    velocity: TextureId,
    output: TextureId,
    output_fb: FramebufferId,
    width: u32,
    height: u32,
}

fn make_frame(rd: &mut SoftwareDevice, width: u32, height: u32, velocity: impl Fn(u32, u32) -> [f32; 2]) -> Frame {
    let color = rd.create_texture(&TextureDesc::new("color", width, height, ImageFormat::RGB8));
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            pixels.extend_from_slice(&[(x % 17) as f32 / 16.0, (y % 5) as f32 / 4.0, ((x + y) % 2) as f32]);
        }
    }
    rd.write_texture(color, &pixels);

    let depth = rd.create_texture(&TextureDesc::new("depth", width, height, ImageFormat::R32F));
    rd.write_texture(depth, &vec![0.9; (width * height) as usize]);

    let velocity_tex = rd.create_texture(&TextureDesc::new("velocity", width, height, ImageFormat::RG16F));
    let mut vel = Vec::with_capacity((width * height * 2) as usize);
    for y in 0..height {
        for x in 0..width {
            vel.extend_from_slice(&velocity(x, y));
        }
    }
    rd.write_texture(velocity_tex, &vel);

    let output = rd.create_texture(&TextureDesc::new("output", width, height, ImageFormat::RGB8));
    let output_fb = rd.create_framebuffer("output");
    rd.set_attachment(output_fb, AttachmentPoint::Color0, Some(output));
    rd.set_framebuffer(Some(output_fb));

    Frame {
        color,
        depth,
        velocity: velocity_tex,
        output,
        output_fb,
        width,
        height,
    }
}

fn motion_camera() -> Camera {
    let mut camera = Camera::new("camera");
    camera.universal_blur_settings_mut().set_enabled(true);
    camera.motion_blur_settings_mut().set_enabled(true);
    camera.motion_blur_settings_mut().set_max_blur_diameter_fraction(0.1);
    camera
}

fn assert_same_image(rd: &SoftwareDevice, a: TextureId, b: TextureId, width: u32, height: u32) {
    for y in 0..height {
        for x in 0..width {
            assert_eq!(rd.read_pixel(a, x, y), rd.read_pixel(b, x, y), "pixel ({x}, {y})");
        }
    }
}

#[test]
fn test_zero_velocity_leaves_frame_unchanged() {
    init_logger();
    let mut rd = SoftwareDevice::new();
    let frame = make_frame(&mut rd, 256, 256, |_, _| [0.0, 0.0]);
    let camera = motion_camera();

    let mut blur = UniversalBlur::with_seed(7);
    blur.apply(&mut rd, frame.color, Some(frame.depth), frame.velocity, &camera, IVec2::ZERO, DebugOption::None);

    assert_eq!(blur.tiles().max_blur_radius(), 13);
    let tiles = rd.texture_info(blur.tiles().neighbor_min_max().unwrap());
    assert_eq!((tiles.width, tiles.height), (20, 20));
    assert_same_image(&rd, frame.output, frame.color, frame.width, frame.height);
    assert_eq!(
        rd.stats().launches,
        vec![Kernel::TileMinMax, Kernel::TileMinMax, Kernel::NeighborMinMax, Kernel::MotionGather]
    );
}

#[test]
fn test_disabled_only_copies() {
    init_logger();
    let mut rd = SoftwareDevice::new();
    let frame = make_frame(&mut rd, 32, 24, |_, _| [5.0, 0.0]);
    let mut camera = motion_camera();
    camera.universal_blur_settings_mut().set_enabled(false);
    rd.reset_stats();

    let mut blur = UniversalBlur::new();
    blur.apply(&mut rd, frame.color, None, frame.velocity, &camera, IVec2::ZERO, DebugOption::None);

    assert!(rd.stats().launches.is_empty());
    assert_eq!(rd.stats().copies, 1);
    assert_eq!(rd.stats().textures_created, 0);
    assert_same_image(&rd, frame.output, frame.color, frame.width, frame.height);

    // Already rendering into the input: nothing to do.
    rd.set_attachment(frame.output_fb, AttachmentPoint::Color0, Some(frame.color));
    blur.apply(&mut rd, frame.color, None, frame.velocity, &camera, IVec2::ZERO, DebugOption::None);
    assert_eq!(rd.stats().copies, 1);
}

#[test]
fn test_bound_input_is_copied_before_gather() {
    init_logger();
    let mut rd = SoftwareDevice::new();
    let frame = make_frame(&mut rd, 40, 30, |_, _| [0.0, 0.0]);
    let camera = motion_camera();
    let reference = rd.create_texture(&TextureDesc::new("reference", 40, 30, ImageFormat::RGB8));
    rd.copy_texture(frame.color, reference, IVec2::ZERO);
    rd.set_attachment(frame.output_fb, AttachmentPoint::Color0, Some(frame.color));
    rd.reset_stats();

    let mut blur = UniversalBlur::new();
    blur.apply(&mut rd, frame.color, None, frame.velocity, &camera, IVec2::ZERO, DebugOption::None);

    assert_eq!(rd.stats().copies, 1);
    let cached = blur.cached_source().unwrap();
    assert_eq!(rd.texture_info(cached).size(), IVec2::new(40, 30));
    assert_same_image(&rd, frame.color, reference, 40, 30);
}

#[test]
fn test_trim_band_is_stripped_and_cleared() {
    init_logger();
    let mut rd = SoftwareDevice::new();
    let frame = make_frame(&mut rd, 48, 36, |_, _| [0.0, 0.0]);
    let camera = motion_camera();
    let trim = IVec2::new(3, 2);

    let mut blur = UniversalBlur::new();
    blur.apply(&mut rd, frame.color, None, frame.velocity, &camera, trim, DebugOption::None);

    let cached = blur.cached_source().unwrap();
    assert_eq!(rd.texture_info(cached).size(), IVec2::new(42, 32));
    for y in 0..36 {
        for x in 0..48 {
            let out = rd.read_pixel(frame.output, x, y);
            let inside = x >= 3 && x < 45 && y >= 2 && y < 34;
            if inside {
                assert_eq!(out, rd.read_pixel(frame.color, x, y), "pixel ({x}, {y})");
            } else {
                assert_eq!(out, Vec4::new(0.0, 0.0, 0.0, 1.0), "guard pixel ({x}, {y})");
            }
        }
    }
}

#[test]
fn test_motion_smears_a_stripe() {
    init_logger();
    let mut rd = SoftwareDevice::new();
    let frame = make_frame(&mut rd, 64, 8, |_, _| [12.0, 0.0]);
    let stripe: Vec<f32> = (0..64 * 8).flat_map(|i| if i % 64 == 32 { [1.0; 3] } else { [0.0; 3] }).collect();
    rd.write_texture(frame.color, &stripe);
    let camera = motion_camera();

    let mut blur = UniversalBlur::new();
    blur.apply(&mut rd, frame.color, None, frame.velocity, &camera, IVec2::ZERO, DebugOption::None);

    let on = rd.read_pixel(frame.output, 32, 4).x;
    let beside = rd.read_pixel(frame.output, 30, 4).x;
    assert!(on < 1.0, "stripe keeps full intensity: {on}");
    assert!(beside > 0.0, "no energy spread beside the stripe");
    assert_eq!(rd.read_pixel(frame.output, 5, 4).x, 0.0);
}

#[test]
fn test_buffers_are_reused_across_frames() {
    init_logger();
    let mut rd = SoftwareDevice::new();
    let frame = make_frame(&mut rd, 64, 64, |_, _| [1.0, 1.0]);
    let mut camera = motion_camera();
    camera.depth_of_field_settings_mut().set_enabled(true);
    camera.universal_blur_settings_mut().set_gather_algorithm(GatherAlgorithm::Combined);

    let mut blur = UniversalBlur::new();
    blur.apply(&mut rd, frame.color, Some(frame.depth), frame.velocity, &camera, IVec2::ZERO, DebugOption::None);
    let created = rd.stats().textures_created;
    blur.apply(&mut rd, frame.color, Some(frame.depth), frame.velocity, &camera, IVec2::ZERO, DebugOption::None);
    assert_eq!(rd.stats().textures_created, created);

    let small = make_frame(&mut rd, 32, 32, |_, _| [1.0, 1.0]);
    let created = rd.stats().textures_created;
    let resized = rd.stats().textures_resized;
    blur.apply(&mut rd, small.color, Some(small.depth), small.velocity, &camera, IVec2::ZERO, DebugOption::None);
    assert_eq!(rd.stats().textures_created, created);
    assert!(rd.stats().textures_resized > resized);
}

#[test]
fn test_combined_pass_order() {
    init_logger();
    let mut rd = SoftwareDevice::new();
    let frame = make_frame(&mut rd, 32, 32, |_, _| [0.0, 0.0]);
    let mut camera = motion_camera();
    camera.depth_of_field_settings_mut().set_enabled(true);
    camera.universal_blur_settings_mut().set_gather_algorithm(GatherAlgorithm::Combined);

    let mut blur = UniversalBlur::new();
    blur.apply(&mut rd, frame.color, Some(frame.depth), frame.velocity, &camera, IVec2::ZERO, DebugOption::None);
    assert_eq!(
        rd.stats().launches,
        vec![
            Kernel::CircleOfConfusion,
            Kernel::TileMinMax,
            Kernel::TileMinMax,
            Kernel::NeighborMinMax,
            Kernel::UniversalGather,
        ]
    );
}

#[test]
fn test_combined_in_focus_leaves_frame_unchanged() {
    init_logger();
    let mut rd = SoftwareDevice::new();
    let frame = make_frame(&mut rd, 48, 40, |_, _| [0.0, 0.0]);
    let mut camera = motion_camera();
    camera.depth_of_field_settings_mut().set_enabled(true);
    camera.depth_of_field_settings_mut().set_lens_radius(0.0);
    camera.universal_blur_settings_mut().set_gather_algorithm(GatherAlgorithm::Combined);

    let mut blur = UniversalBlur::new();
    blur.apply(&mut rd, frame.color, Some(frame.depth), frame.velocity, &camera, IVec2::ZERO, DebugOption::None);
    assert_same_image(&rd, frame.output, frame.color, frame.width, frame.height);
}

fn channel_variance(rd: &SoftwareDevice, texture: TextureId, width: u32, height: u32) -> f32 {
    let pixels: Vec<Vec4> = (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .map(|(x, y)| rd.read_pixel(texture, x, y))
        .collect();
    let mean = pixels.iter().copied().sum::<Vec4>() / pixels.len() as f32;
    let variance = pixels.iter().map(|p| (*p - mean).truncate().length_squared()).sum::<f32>();
    variance / pixels.len() as f32
}

/// Runs a static frame whose every pixel sits far in front of the focus
/// plane and returns the input and output variance.
fn defocused_variance(algorithm: GatherAlgorithm) -> (f32, f32) {
    init_logger();
    let mut rd = SoftwareDevice::new();
    let frame = make_frame(&mut rd, 64, 48, |_, _| [0.0, 0.0]);
    rd.write_texture(frame.depth, &vec![0.5; 64 * 48]);
    let mut camera = motion_camera();
    camera.universal_blur_settings_mut().set_gather_algorithm(algorithm);
    let dof = camera.depth_of_field_settings_mut();
    dof.set_enabled(true);
    dof.set_model(DepthOfFieldModel::Physical);
    dof.set_focus_plane_z(-10.0);
    dof.set_lens_radius(0.2);

    let mut blur = UniversalBlur::with_seed(3);
    blur.apply(&mut rd, frame.color, Some(frame.depth), frame.velocity, &camera, IVec2::ZERO, DebugOption::None);
    (
        channel_variance(&rd, frame.color, frame.width, frame.height),
        channel_variance(&rd, frame.output, frame.width, frame.height),
    )
}

#[test]
fn test_combined_defocus_smooths_the_frame() {
    let (input, output) = defocused_variance(GatherAlgorithm::Combined);
    assert!(output < 0.8 * input, "variance {input} -> {output}");
}

#[test]
fn test_independent_defocus_smooths_the_frame() {
    let (input, output) = defocused_variance(GatherAlgorithm::Independent);
    assert!(output < 0.8 * input, "variance {input} -> {output}");
}

#[test]
fn test_legacy_depth_of_field_follows_motion_gather() {
    init_logger();
    let mut rd = SoftwareDevice::new();
    let frame = make_frame(&mut rd, 32, 32, |_, _| [0.0, 0.0]);
    let mut camera = motion_camera();
    camera.depth_of_field_settings_mut().set_enabled(true);
    camera.depth_of_field_settings_mut().set_model(DepthOfFieldModel::Artist);

    let mut blur = UniversalBlur::new();
    blur.apply(&mut rd, frame.color, Some(frame.depth), frame.velocity, &camera, IVec2::ZERO, DebugOption::None);
    assert_eq!(
        rd.stats().launches,
        vec![
            Kernel::TileMinMax,
            Kernel::TileMinMax,
            Kernel::NeighborMinMax,
            Kernel::MotionGather,
            Kernel::CircleOfConfusion,
            Kernel::DofBlur,
            Kernel::DofBlur,
            Kernel::DofComposite,
        ]
    );
    // The composite, not the gather, wrote the bound framebuffer.
    assert_eq!(rd.framebuffer(), Some(frame.output_fb));
}

#[test]
#[should_panic(expected = "depth buffer is required")]
fn test_missing_depth_with_depth_of_field_panics() {
    let mut rd = SoftwareDevice::new();
    let frame = make_frame(&mut rd, 16, 16, |_, _| [0.0, 0.0]);
    let mut camera = motion_camera();
    camera.depth_of_field_settings_mut().set_enabled(true);
    UniversalBlur::new().apply(&mut rd, frame.color, None, frame.velocity, &camera, IVec2::ZERO, DebugOption::None);
}

#[test]
#[should_panic(expected = "far normalization")]
fn test_inverted_far_planes_panic() {
    let mut rd = SoftwareDevice::new();
    let frame = make_frame(&mut rd, 16, 16, |_, _| [0.0, 0.0]);
    let mut camera = motion_camera();
    let dof = camera.depth_of_field_settings_mut();
    dof.set_enabled(true);
    dof.set_model(DepthOfFieldModel::Artist);
    dof.set_far_blurry_plane_z(-20.0);
    UniversalBlur::new().apply(
        &mut rd,
        frame.color,
        Some(frame.depth),
        frame.velocity,
        &camera,
        IVec2::ZERO,
        DebugOption::None,
    );
}

#[test]
#[should_panic(expected = "leaves nothing")]
fn test_trim_wider_than_frame_panics() {
    let mut rd = SoftwareDevice::new();
    let frame = make_frame(&mut rd, 16, 12, |_, _| [0.0, 0.0]);
    let camera = motion_camera();
    UniversalBlur::new().apply(
        &mut rd,
        frame.color,
        None,
        frame.velocity,
        &camera,
        IVec2::new(2, 7),
        DebugOption::None,
    );
}

#[test]
fn test_debug_tiles_overlay() {
    init_logger();
    let mut rd = SoftwareDevice::new();
    let frame = make_frame(&mut rd, 64, 64, |_, _| [3.0, -1.0]);
    let camera = motion_camera();
    let mut blur = UniversalBlur::new();
    blur.set_debug_show_tiles(true);
    blur.apply(&mut rd, frame.color, None, frame.velocity, &camera, IVec2::ZERO, DebugOption::None);
    // 64 / 4 = 16 tiles per axis: 16 + 16 grid lines and 256 vectors.
    assert_eq!(blur.tile_overlay().len(), 16 + 16 + 256);

    blur.set_debug_show_tiles(false);
    blur.apply(&mut rd, frame.color, None, frame.velocity, &camera, IVec2::ZERO, DebugOption::None);
    assert!(blur.tile_overlay().is_empty());
}

#[test]
fn test_random_buffer_is_seeded() {
    let mut rd = SoftwareDevice::new();
    let frame = make_frame(&mut rd, 16, 16, |_, _| [0.0, 0.0]);
    let camera = motion_camera();

    let mut a = UniversalBlur::with_seed(1);
    let mut b = UniversalBlur::with_seed(1);
    a.apply(&mut rd, frame.color, None, frame.velocity, &camera, IVec2::ZERO, DebugOption::None);
    b.apply(&mut rd, frame.color, None, frame.velocity, &camera, IVec2::ZERO, DebugOption::None);
    let (ra, rb) = (a.random_buffer().unwrap(), b.random_buffer().unwrap());
    assert_ne!(ra, rb);
    assert_same_image(&rd, ra, rb, 32, 32);
}
