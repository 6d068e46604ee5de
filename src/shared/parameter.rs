// This is free and unencumbered software released into the public domain.

use derive_more::Display;

/// Number of intervals on the focus grid: 51 positions, 0.02 apart.
pub const FOCUS_STEPS: f64 = 50.0;

/// Lens position applied when a session enters manual mode.
pub const INITIAL_FOCUS: f64 = 0.5;

/// Exposure duration applied when a session enters manual mode, in seconds.
pub const DEFAULT_EXPOSURE_SECONDS: f64 = 0.002;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    #[display("ISO")]
    Iso,
    #[display("Exposure")]
    ExposureDuration,
    #[display("Focus")]
    FocusPosition,
}

impl ParameterKind {
    pub const ALL: [ParameterKind; 3] = [
        ParameterKind::Iso,
        ParameterKind::ExposureDuration,
        ParameterKind::FocusPosition,
    ];

    /// Stable identifier used on the C ABI and in JSONL output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterKind::Iso => "iso",
            ParameterKind::ExposureDuration => "exposure",
            ParameterKind::FocusPosition => "focus",
        }
    }

    pub fn format_value(&self, value: f64) -> String {
        match self {
            ParameterKind::Iso => format!("{value:.0}"),
            ParameterKind::ExposureDuration => format!("{:.2} ms", value * 1000.0),
            ParameterKind::FocusPosition => format!("{value:.2}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParameterSetting {
    pub kind: ParameterKind,
    pub value: f64,
}

impl ParameterSetting {
    pub fn new(kind: ParameterKind, value: f64) -> Self {
        Self { kind, value }
    }

    /// Text for the parameter's value label.
    pub fn label(&self) -> String {
        self.kind.format_value(self.value)
    }
}

/// Snaps a normalized focus position onto the 1/50 grid.
///
/// Ties round away from zero, which on `[0, 1]` means upwards.
pub fn snap_focus(raw: f64) -> f64 {
    let raw = if raw.is_nan() { INITIAL_FOCUS } else { raw.clamp(0.0, 1.0) };
    (raw * FOCUS_STEPS).round() / FOCUS_STEPS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snaps_to_the_nearest_grid_step() {
        for i in 0..=1000 {
            let raw = i as f64 / 1000.0;
            let snapped = snap_focus(raw);
            let steps = snapped * FOCUS_STEPS;
            assert!((steps - steps.round()).abs() < 1e-9, "{raw} -> {snapped}");
            assert!((snapped - raw).abs() <= 0.01 + 1e-9, "{raw} -> {snapped}");
        }
    }

    #[test]
    fn breaks_ties_upwards() {
        assert!((snap_focus(0.53) - 0.54).abs() < 1e-12);
        assert!((snap_focus(0.01) - 0.02).abs() < 1e-12);
        assert!((snap_focus(0.529) - 0.52).abs() < 1e-12);
    }

    #[test]
    fn keeps_out_of_range_input_on_the_grid() {
        assert_eq!(snap_focus(-0.3), 0.0);
        assert_eq!(snap_focus(1.7), 1.0);
        assert_eq!(snap_focus(f64::NAN), INITIAL_FOCUS);
    }

    #[test]
    fn formats_labels() {
        assert_eq!(ParameterSetting::new(ParameterKind::FocusPosition, 0.5).label(), "0.50");
        assert_eq!(ParameterSetting::new(ParameterKind::Iso, 3200.0).label(), "3200");
        assert_eq!(
            ParameterSetting::new(ParameterKind::ExposureDuration, 0.002).label(),
            "2.00 ms"
        );
    }

    #[test]
    fn display_names() {
        assert_eq!(ParameterKind::Iso.to_string(), "ISO");
        assert_eq!(ParameterKind::ExposureDuration.to_string(), "Exposure");
        assert_eq!(ParameterKind::FocusPosition.as_str(), "focus");
    }
}
