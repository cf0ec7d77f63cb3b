// src/analysis/ratio.rs
//! Guarded ratio derivation over aggregated counts.

/// Upper bound used when a ratio is shown to a reader.
pub const MAX_DISPLAY_RATIO: f64 = 10.0;

/// Hidden (UV-only) to visible finding ratio. The divisor is `max(1, visible)`.
pub fn hidden_to_visible_ratio(hidden: u32, visible: u32) -> f64 {
    f64::from(hidden) / f64::from(visible.max(1))
}

/// Clamp a ratio into the presentation range `0..=MAX_DISPLAY_RATIO`.
pub fn display_ratio(ratio: f64) -> f64 {
    if ratio.is_nan() {
        return 0.0;
    }
    ratio.clamp(0.0, MAX_DISPLAY_RATIO)
}
