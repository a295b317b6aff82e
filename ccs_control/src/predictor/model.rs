//! Opaque prediction-model artefact format.
//!
//! The artefact is the predictor's private concern: the core validates
//! only that the loader accepts it. Layout (little-endian):
//!
//! ```text
//! magic "CCSM" (4) | version u16 (2) |
//! 3 channels × 3 horizons × 4 coefficients f32 (144) |
//! base confidence f32 (4)
//! ```
//!
//! Per channel/horizon the affine coefficients apply to the feature vector
//! (1, current, recent slope [°C/min], window mean).

pub const MODEL_MAGIC: [u8; 4] = *b"CCSM";
pub const MODEL_VERSION: u16 = 1;

const CHANNELS: usize = 3; // T4, T5, T6
const HORIZONS: usize = 3; // +5, +10, +15 min
const COEFFS: usize = 4;
const ARTEFACT_LEN: usize = 4 + 2 + CHANNELS * HORIZONS * COEFFS * 4 + 4;

/// Affine coefficients for one channel at one horizon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coeffs {
    pub bias: f64,
    pub w_current: f64,
    pub w_slope_per_min: f64,
    pub w_mean: f64,
}

/// Parsed prediction model.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    /// `[channel][horizon]` with channels in T4, T5, T6 order.
    coeffs: [[Coeffs; HORIZONS]; CHANNELS],
    base_confidence: f64,
}

impl Model {
    /// Parse an artefact blob.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() != ARTEFACT_LEN {
            return Err(format!(
                "artefact length {} (expected {ARTEFACT_LEN})",
                bytes.len()
            ));
        }
        if bytes[0..4] != MODEL_MAGIC {
            return Err("bad artefact magic".into());
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != MODEL_VERSION {
            return Err(format!("unsupported artefact version {version}"));
        }

        let mut offset = 6;
        let mut read_f32 = |o: &mut usize| -> f64 {
            let v = f32::from_le_bytes([bytes[*o], bytes[*o + 1], bytes[*o + 2], bytes[*o + 3]]);
            *o += 4;
            f64::from(v)
        };

        let mut coeffs = [[Coeffs {
            bias: 0.0,
            w_current: 0.0,
            w_slope_per_min: 0.0,
            w_mean: 0.0,
        }; HORIZONS]; CHANNELS];
        for row in coeffs.iter_mut() {
            for c in row.iter_mut() {
                *c = Coeffs {
                    bias: read_f32(&mut offset),
                    w_current: read_f32(&mut offset),
                    w_slope_per_min: read_f32(&mut offset),
                    w_mean: read_f32(&mut offset),
                };
                for v in [c.bias, c.w_current, c.w_slope_per_min, c.w_mean] {
                    if !v.is_finite() {
                        return Err("non-finite coefficient in artefact".into());
                    }
                }
            }
        }
        let base_confidence = read_f32(&mut offset);
        if !(0.0..=1.0).contains(&base_confidence) {
            return Err(format!("confidence {base_confidence} outside [0, 1]"));
        }

        Ok(Self {
            coeffs,
            base_confidence,
        })
    }

    /// Serialize back to the artefact layout (tooling and fixtures).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ARTEFACT_LEN);
        out.extend_from_slice(&MODEL_MAGIC);
        out.extend_from_slice(&MODEL_VERSION.to_le_bytes());
        for row in &self.coeffs {
            for c in row {
                for v in [c.bias, c.w_current, c.w_slope_per_min, c.w_mean] {
                    out.extend_from_slice(&(v as f32).to_le_bytes());
                }
            }
        }
        out.extend_from_slice(&(self.base_confidence as f32).to_le_bytes());
        out
    }

    /// Persistence-plus-trend baseline: prediction = current + slope × horizon.
    pub fn trend(confidence: f64) -> Self {
        let horizon_min = [5.0, 10.0, 15.0];
        let mut coeffs = [[Coeffs {
            bias: 0.0,
            w_current: 1.0,
            w_slope_per_min: 0.0,
            w_mean: 0.0,
        }; HORIZONS]; CHANNELS];
        for row in coeffs.iter_mut() {
            for (h, c) in row.iter_mut().enumerate() {
                c.w_slope_per_min = horizon_min[h];
            }
        }
        Self {
            coeffs,
            base_confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Evaluate one channel/horizon on (current, slope, mean).
    #[inline]
    pub fn evaluate(
        &self,
        channel_idx: usize,
        horizon_idx: usize,
        current: f64,
        slope_per_min: f64,
        mean: f64,
    ) -> f64 {
        let c = &self.coeffs[channel_idx][horizon_idx];
        c.bias + c.w_current * current + c.w_slope_per_min * slope_per_min + c.w_mean * mean
    }

    #[inline]
    pub fn base_confidence(&self) -> f64 {
        self.base_confidence
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
