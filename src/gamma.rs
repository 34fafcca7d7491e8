//! Brightness correction lookup table.

/// Exponents outside this open range fall back to identity.
const MIN_EXPONENT: f32 = 0.01;
const MAX_EXPONENT: f32 = 50.0;

/// 256-entry gamma curve, built once per output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GammaTable {
    curve: [u8; 256],
}

impl GammaTable {
    /// Build `round(255 * (v / 255) ^ exponent)` for every byte value.
    ///
    /// Out-of-range (or non-finite) exponents are replaced by `1.0`.
    pub fn new(exponent: f32) -> Self {
        let exponent = if exponent.is_finite() && (MIN_EXPONENT..=MAX_EXPONENT).contains(&exponent)
        {
            exponent
        } else {
            tracing::debug!("gamma {} out of range, using 1.0", exponent);
            1.0
        };

        let mut curve = [0u8; 256];
        for (v, slot) in curve.iter_mut().enumerate() {
            let f = 255.0 * (v as f32 / 255.0).powf(exponent);
            *slot = f.clamp(0.0, 255.0).round() as u8;
        }

        Self { curve }
    }

    pub fn identity() -> Self {
        Self::new(1.0)
    }

    #[inline]
    pub fn apply(&self, value: u8) -> u8 {
        self.curve[value as usize]
    }

    pub fn as_slice(&self) -> &[u8; 256] {
        &self.curve
    }
}

impl Default for GammaTable {
    fn default() -> Self {
        Self::identity()
    }
}
