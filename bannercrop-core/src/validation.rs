//! Crop Validation - Rule/Policy Separation
//!
//! Rules produce structured violations.
//! Policy maps violations to actions.

use serde::{Deserialize, Serialize};

use crate::config::EditorConfig;
use crate::geometry::{Dimensions, NaturalRect};
use crate::presets::PresetKey;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Error,
    Warning,
    Info,
}

/// What an out-of-tolerance ratio does to a save.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RatioPolicy {
    Block,
    #[default]
    Warn,
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationViolation {
    pub rule: String,
    pub severity: ViolationSeverity,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub remediation: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationResult {
    /// False means the crop must not be saved.
    pub valid: bool,
    pub violations: Vec<ValidationViolation>,
    pub preset: PresetKey,
    pub ratio: f64,
    pub deviation: f64,
    pub out_of_tolerance: bool,
}

impl ValidationResult {
    pub fn has_errors(&self) -> bool {
        self.violations.iter().any(|v| v.severity == ViolationSeverity::Error)
    }
}

/// Input for validation
#[derive(Debug, Clone, Copy)]
pub struct CropInput {
    pub preset: PresetKey,
    pub natural: Dimensions,
    pub rect: NaturalRect,
    /// Ratio of the stage box, before rounding to natural pixels.
    pub ratio: f64,
}

/// Validation rule trait - produces violations
pub trait ValidationRule {
    fn name(&self) -> &'static str;
    fn validate(&self, input: &CropInput, config: &EditorConfig) -> Vec<ValidationViolation>;
}

pub fn ratio_deviation(ratio: f64, target_ratio: f64) -> f64 {
    (ratio - target_ratio).abs() / target_ratio
}

/// Boundary is inclusive: a deviation equal to the tolerance passes.
pub fn within_tolerance(deviation: f64, tolerance: f64) -> bool {
    deviation <= tolerance + f64::EPSILON
}

// --- Concrete Rules ---

pub struct AspectRatioRule;

impl ValidationRule for AspectRatioRule {
    fn name(&self) -> &'static str { "aspect_ratio" }

    fn validate(&self, input: &CropInput, config: &EditorConfig) -> Vec<ValidationViolation> {
        let deviation = ratio_deviation(input.ratio, config.target_ratio);
        if within_tolerance(deviation, config.ratio_tolerance) {
            return vec![];
        }

        let (lo, hi) = config.ratio_range();
        let severity = match config.ratio_policy {
            RatioPolicy::Block => ViolationSeverity::Error,
            RatioPolicy::Warn => ViolationSeverity::Warning,
            RatioPolicy::Log => ViolationSeverity::Info,
        };

        vec![ValidationViolation {
            rule: self.name().to_string(),
            severity,
            message: format!("Crop ratio is {:.1}% off target", deviation * 100.0),
            expected: Some(format!("{:.3} to {:.3}", lo, hi)),
            actual: Some(format!("{:.3}", input.ratio)),
            remediation: vec!["Resize the crop box toward the preset ratio".to_string()],
        }]
    }
}

pub struct BoundsRule;

impl ValidationRule for BoundsRule {
    fn name(&self) -> &'static str { "bounds" }

    fn validate(&self, input: &CropInput, _config: &EditorConfig) -> Vec<ValidationViolation> {
        let mut violations = vec![];
        let r = input.rect;

        if r.is_degenerate() {
            violations.push(ValidationViolation {
                rule: self.name().to_string(),
                severity: ViolationSeverity::Error,
                message: "Crop box has zero area".to_string(),
                expected: Some("width and height above zero".to_string()),
                actual: Some(format!("{}x{}", r.width, r.height)),
                remediation: vec!["Enlarge the crop box".to_string()],
            });
        }

        if !r.fits_within(input.natural) {
            violations.push(ValidationViolation {
                rule: self.name().to_string(),
                severity: ViolationSeverity::Error,
                message: "Crop box extends past the image".to_string(),
                expected: Some(format!("within {}x{}", input.natural.width, input.natural.height)),
                actual: Some(format!("{}+{}x{}+{}", r.left, r.width, r.top, r.height)),
                remediation: vec!["Move the crop box inside the image".to_string()],
            });
        }

        violations
    }
}

/// Validator orchestrates rules and applies policy
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule + Send + Sync>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: vec![Box::new(BoundsRule), Box::new(AspectRatioRule)],
        }
    }

    pub fn validate(&self, input: &CropInput, config: &EditorConfig) -> ValidationResult {
        let mut all_violations = vec![];

        for rule in &self.rules {
            let violations = rule.validate(input, config);
            all_violations.extend(violations);
        }

        let deviation = ratio_deviation(input.ratio, config.target_ratio);
        let has_errors = all_violations.iter()
            .any(|v| v.severity == ViolationSeverity::Error);

        for v in &all_violations {
            match v.severity {
                ViolationSeverity::Error | ViolationSeverity::Warning => tracing::warn!(
                    preset = %input.preset,
                    rule = %v.rule,
                    actual = ?v.actual,
                    "{}", v.message
                ),
                ViolationSeverity::Info => tracing::info!(
                    preset = %input.preset,
                    rule = %v.rule,
                    actual = ?v.actual,
                    "{}", v.message
                ),
            }
        }

        // Logged violations are not surfaced to the caller
        if config.ratio_policy == RatioPolicy::Log {
            all_violations.retain(|v| v.severity != ViolationSeverity::Info);
        }

        ValidationResult {
            valid: !has_errors,
            violations: all_violations,
            preset: input.preset,
            ratio: input.ratio,
            deviation,
            out_of_tolerance: !within_tolerance(deviation, config.ratio_tolerance),
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(ratio: f64) -> CropInput {
        CropInput {
            preset: PresetKey::Wide1920,
            natural: Dimensions::new(2000, 800),
            rect: NaturalRect { left: 0, top: 0, width: 2000, height: 800 },
            ratio,
        }
    }

    fn config(policy: RatioPolicy) -> EditorConfig {
        EditorConfig { ratio_policy: policy, ..EditorConfig::default() }
    }

    #[test]
    fn test_boundary_is_within_tolerance() {
        assert_eq!(ratio_deviation(2.875, 2.5), 0.15);
        assert!(within_tolerance(ratio_deviation(2.875, 2.5), 0.15));

        let result = Validator::new().validate(&input(2.875), &config(RatioPolicy::Block));
        assert!(result.valid);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn test_low_boundary_is_within_tolerance() {
        let result = Validator::new().validate(&input(2.125), &config(RatioPolicy::Block));
        assert!(result.valid);
    }

    #[test]
    fn test_warn_policy_does_not_block() {
        let result = Validator::new().validate(&input(1.78), &config(RatioPolicy::Warn));
        assert!(result.valid);
        assert!(result.out_of_tolerance);
        assert_eq!(result.violations[0].severity, ViolationSeverity::Warning);
    }

    #[test]
    fn test_block_policy_blocks() {
        let result = Validator::new().validate(&input(3.0), &config(RatioPolicy::Block));
        assert!(!result.valid);
        assert!(result.has_errors());
    }

    #[test]
    fn test_log_policy_hides_violation() {
        let result = Validator::new().validate(&input(3.0), &config(RatioPolicy::Log));
        assert!(result.valid);
        assert!(result.violations.is_empty());
        assert!(result.out_of_tolerance);
        assert!((result.deviation - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_rect_always_blocks() {
        let mut i = input(2.5);
        i.rect.height = 0;
        let result = Validator::new().validate(&i, &config(RatioPolicy::Log));
        assert!(!result.valid);
    }
}
