use glam::Vec2;

use crate::error::ConfigError;

/// Parameters for the spectral ocean simulation
#[derive(Debug, Clone, PartialEq)]
pub struct OceanConfig {
    pub resolution: usize,        // Grid resolution N (N x N), power of two
    pub patch_length: f32,        // World-space size of the patch in meters
    pub wind_speed: f32,          // Wind speed in m/s
    pub wind_direction: Vec2,     // Wind direction, normalized on validation
    pub amplitude: f32,           // Phillips spectrum amplitude
    pub choppiness: f32,          // Horizontal displacement scale
    pub max_choppiness: f32,      // Upper bound choppiness is clamped to
    pub gravity: f32,             // Gravity acceleration
    pub depth: Option<f32>,       // Water depth, `None` for deep water
    pub seed: u64,                // Random seed for the initial spectrum
    pub against_wind_factor: f32, // Cosine used for waves travelling against the wind
    pub small_wave_cutoff: f32,   // Wavelength below which ripples are suppressed, 0 disables
}

impl Default for OceanConfig {
    fn default() -> Self {
        Self {
            resolution: 256,
            patch_length: 100.0,
            wind_speed: 5.0,
            wind_direction: Vec2::new(1.0, 0.0),
            amplitude: 1.0,
            choppiness: 0.5,
            max_choppiness: 2.5,
            gravity: 9.81,
            depth: None,
            seed: 42,
            against_wind_factor: 0.07,
            small_wave_cutoff: 0.0,
        }
    }
}

impl OceanConfig {
    pub fn with_resolution(mut self, resolution: usize) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_patch_length(mut self, patch_length: f32) -> Self {
        self.patch_length = patch_length;
        self
    }

    pub fn with_wind(mut self, speed: f32, direction: Vec2) -> Self {
        self.wind_speed = speed;
        self.wind_direction = direction;
        self
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    pub fn with_choppiness(mut self, choppiness: f32) -> Self {
        self.choppiness = choppiness;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Number of radix-2 stages per axis.
    pub fn stages(&self) -> u32 {
        self.resolution.trailing_zeros()
    }

    /// Wavenumber spacing `2π / L`.
    pub fn delta_k(&self) -> f32 {
        2.0 * std::f32::consts::PI / self.patch_length
    }

    /// Choppiness after clamping to `[0, max_choppiness]`.
    pub fn effective_choppiness(&self) -> f32 {
        self.choppiness.clamp(0.0, self.max_choppiness.max(0.0))
    }

    /// Check every parameter and return a copy with the wind direction normalized.
    pub fn validate(&self) -> Result<OceanConfig, ConfigError> {
        if self.resolution < 2 || !self.resolution.is_power_of_two() {
            return Err(ConfigError::ResolutionNotPowerOfTwo(self.resolution));
        }

        let finite = [
            ("patch_length", self.patch_length),
            ("wind_speed", self.wind_speed),
            ("amplitude", self.amplitude),
            ("choppiness", self.choppiness),
            ("max_choppiness", self.max_choppiness),
            ("gravity", self.gravity),
            ("against_wind_factor", self.against_wind_factor),
            ("small_wave_cutoff", self.small_wave_cutoff),
        ];
        if let Some((name, _)) = finite.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ConfigError::NonFiniteParameter { name: *name });
        }
        if matches!(self.depth, Some(d) if !d.is_finite()) {
            return Err(ConfigError::NonFiniteParameter { name: "depth" });
        }

        if self.patch_length <= 0.0 {
            return Err(ConfigError::NonPositivePatchLength(self.patch_length));
        }
        if self.choppiness < 0.0 {
            return Err(ConfigError::NegativeChoppiness(self.choppiness));
        }

        // sqrt(P) and sqrt(g·k·tanh(k·d)) need these signs
        let non_negative = [("wind_speed", self.wind_speed), ("amplitude", self.amplitude)];
        if let Some(&(name, value)) = non_negative.iter().find(|(_, v)| *v < 0.0) {
            return Err(ConfigError::NegativeParameter { name, value });
        }
        if self.gravity <= 0.0 {
            return Err(ConfigError::NonPositiveParameter {
                name: "gravity",
                value: self.gravity,
            });
        }
        if let Some(depth) = self.depth.filter(|d| *d <= 0.0) {
            return Err(ConfigError::NonPositiveParameter {
                name: "depth",
                value: depth,
            });
        }

        let wind_direction = self.wind_direction.try_normalize().ok_or(
            ConfigError::InvalidWindDirection(self.wind_direction.x, self.wind_direction.y),
        )?;

        Ok(OceanConfig {
            wind_direction,
            ..self.clone()
        })
    }
}
