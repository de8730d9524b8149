//! Parameter bags for the camera's optical effects. Read-only to the
//! compositor; mutated through the accessor pairs.

#[cfg(feature = "serialize")]
use serde::{Deserialize, Deserializer, Serialize};

/// Rejects counts and factors below one when loading.
#[cfg(feature = "serialize")]
fn at_least_one<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
    let n = i32::deserialize(deserializer)?;
    if n < 1 {
        return Err(serde::de::Error::custom(format!("expected at least 1, got {n}")));
    }
    Ok(n)
}

/// How circle-of-confusion radii are derived from depth.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum DepthOfFieldModel {
    /// No lens blur.
    None,
    /// Four authored depth markers with linear ramps between them.
    Artist,
    /// Thin lens with a radius and a focus plane.
    #[default]
    Physical,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize), serde(default))]
pub struct DepthOfFieldSettings {
    enabled: bool,
    model: DepthOfFieldModel,
    lens_radius: f32,
    focus_plane_z: f32,
    near_blurry_plane_z: f32,
    near_sharp_plane_z: f32,
    far_sharp_plane_z: f32,
    far_blurry_plane_z: f32,
    near_blur_radius_fraction: f32,
    far_blur_radius_fraction: f32,
    #[cfg_attr(feature = "serialize", serde(deserialize_with = "at_least_one"))]
    reduced_resolution_factor: i32,
}

impl Default for DepthOfFieldSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            model: DepthOfFieldModel::Physical,
            lens_radius: 0.01,
            focus_plane_z: -10.0,
            near_blurry_plane_z: -0.25,
            near_sharp_plane_z: -1.0,
            far_sharp_plane_z: -40.0,
            far_blurry_plane_z: -100.0,
            near_blur_radius_fraction: 0.015,
            far_blur_radius_fraction: 0.005,
            reduced_resolution_factor: 1,
        }
    }
}

impl DepthOfFieldSettings {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn model(&self) -> DepthOfFieldModel {
        self.model
    }

    pub fn set_model(&mut self, model: DepthOfFieldModel) {
        self.model = model;
    }

    /// The model in effect: `None` whenever the effect is disabled.
    pub fn effective_model(&self) -> DepthOfFieldModel {
        if self.enabled {
            self.model
        } else {
            DepthOfFieldModel::None
        }
    }

    pub fn is_active(&self) -> bool {
        self.effective_model() != DepthOfFieldModel::None
    }

    /// Radius of the thin lens, in meters (physical model).
    pub fn lens_radius(&self) -> f32 {
        self.lens_radius
    }

    pub fn set_lens_radius(&mut self, r: f32) {
        self.lens_radius = r;
    }

    /// Camera-space z of the plane in perfect focus (physical model). Negative.
    pub fn focus_plane_z(&self) -> f32 {
        self.focus_plane_z
    }

    pub fn set_focus_plane_z(&mut self, z: f32) {
        self.focus_plane_z = z;
    }

    pub fn near_blurry_plane_z(&self) -> f32 {
        self.near_blurry_plane_z
    }

    pub fn set_near_blurry_plane_z(&mut self, z: f32) {
        self.near_blurry_plane_z = z;
    }

    pub fn near_sharp_plane_z(&self) -> f32 {
        self.near_sharp_plane_z
    }

    pub fn set_near_sharp_plane_z(&mut self, z: f32) {
        self.near_sharp_plane_z = z;
    }

    pub fn far_sharp_plane_z(&self) -> f32 {
        self.far_sharp_plane_z
    }

    pub fn set_far_sharp_plane_z(&mut self, z: f32) {
        self.far_sharp_plane_z = z;
    }

    pub fn far_blurry_plane_z(&self) -> f32 {
        self.far_blurry_plane_z
    }

    pub fn set_far_blurry_plane_z(&mut self, z: f32) {
        self.far_blurry_plane_z = z;
    }

    /// Near-field blur radius at the near blurry plane, as a fraction of the
    /// viewport's field-of-view axis (artist model).
    pub fn near_blur_radius_fraction(&self) -> f32 {
        self.near_blur_radius_fraction
    }

    pub fn set_near_blur_radius_fraction(&mut self, f: f32) {
        self.near_blur_radius_fraction = f;
    }

    pub fn far_blur_radius_fraction(&self) -> f32 {
        self.far_blur_radius_fraction
    }

    pub fn set_far_blur_radius_fraction(&mut self, f: f32) {
        self.far_blur_radius_fraction = f;
    }

    /// Downsampling factor of the blur buffers. At least 1.
    pub fn reduced_resolution_factor(&self) -> i32 {
        self.reduced_resolution_factor
    }

    pub fn set_reduced_resolution_factor(&mut self, k: i32) {
        assert!(k >= 1, "reduced resolution factor must be at least 1, got {k}");
        self.reduced_resolution_factor = k;
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize), serde(default))]
pub struct MotionBlurSettings {
    enabled: bool,
    exposure_fraction: f32,
    max_blur_diameter_fraction: f32,
    #[cfg_attr(feature = "serialize", serde(deserialize_with = "at_least_one"))]
    num_samples: i32,
}

impl Default for MotionBlurSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            exposure_fraction: 0.75,
            max_blur_diameter_fraction: 0.10,
            num_samples: 15,
        }
    }
}

impl MotionBlurSettings {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Fraction of the frame interval the shutter is open.
    pub fn exposure_fraction(&self) -> f32 {
        self.exposure_fraction
    }

    pub fn set_exposure_fraction(&mut self, f: f32) {
        self.exposure_fraction = f;
    }

    /// Largest blur diameter as a fraction of the field-of-view axis.
    pub fn max_blur_diameter_fraction(&self) -> f32 {
        self.max_blur_diameter_fraction
    }

    pub fn set_max_blur_diameter_fraction(&mut self, f: f32) {
        self.max_blur_diameter_fraction = f;
    }

    pub fn num_samples(&self) -> i32 {
        self.num_samples
    }

    pub fn set_num_samples(&mut self, n: i32) {
        assert!(n >= 1, "motion blur needs at least one sample");
        self.num_samples = n;
    }
}

/// The subset of film settings the camera consults when jittering.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize), serde(default))]
pub struct FilmSettings {
    effects_enabled: bool,
    temporal_antialiasing_enabled: bool,
}

impl Default for FilmSettings {
    fn default() -> Self {
        Self {
            effects_enabled: true,
            temporal_antialiasing_enabled: false,
        }
    }
}

impl FilmSettings {
    pub fn effects_enabled(&self) -> bool {
        self.effects_enabled
    }

    pub fn set_effects_enabled(&mut self, enabled: bool) {
        self.effects_enabled = enabled;
    }

    pub fn temporal_antialiasing_enabled(&self) -> bool {
        self.temporal_antialiasing_enabled
    }

    pub fn set_temporal_antialiasing_enabled(&mut self, enabled: bool) {
        self.temporal_antialiasing_enabled = enabled;
    }
}

/// Which gather the compositor runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum GatherAlgorithm {
    /// Motion gather, then the separate depth-of-field blur and composite.
    #[default]
    Independent,
    /// One gather consuming both the velocity tiles and the packed CoC buffer.
    Combined,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize), serde(default))]
pub struct UniversalBlurSettings {
    enabled: bool,
    gather_algorithm: GatherAlgorithm,
}

impl UniversalBlurSettings {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn gather_algorithm(&self) -> GatherAlgorithm {
        self.gather_algorithm
    }

    pub fn set_gather_algorithm(&mut self, algorithm: GatherAlgorithm) {
        self.gather_algorithm = algorithm;
    }
}
