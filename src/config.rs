//! Typing thresholds.
//!
//! Values come from three layers, each overriding the previous one: the
//! defaults below, the `[thresholds]` table of the panel file, and flags on
//! the command line.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Thresholds used by quantification and genotype calling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingConfig {
    /// Minimum mean depth over the region before any genotype is called.
    pub min_mean_depth: f64,
    /// Minimum breadth of coverage (percent of region positions covered).
    pub min_breadth: f64,
    /// Sites with less evidence than this are left uncalled.
    pub min_site_depth: u32,
    /// Variant fraction at which an allele counts as present.
    pub present_cutoff: f64,
    /// Variant fraction at which an allele counts as dominant.
    pub dominant_cutoff: f64,
    /// Polymorphism log noise floor.
    pub noise_threshold: f64,
    /// Relative reported-vs-recomputed depth difference that gets flagged.
    pub depth_divergence_tolerance: f64,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            min_mean_depth: 20.0,
            min_breadth: 80.0,
            min_site_depth: 10,
            present_cutoff: 0.20,
            dominant_cutoff: 0.50,
            noise_threshold: 0.10,
            depth_divergence_tolerance: 0.10,
        }
    }
}

/// Partial thresholds, as written in a panel file or collected from flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdOverrides {
    pub min_mean_depth: Option<f64>,
    pub min_breadth: Option<f64>,
    pub min_site_depth: Option<u32>,
    pub present_cutoff: Option<f64>,
    pub dominant_cutoff: Option<f64>,
    pub noise_threshold: Option<f64>,
    pub depth_divergence_tolerance: Option<f64>,
}

/// Invalid threshold combinations.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A fraction outside `[0, 1]`.
    #[error("{name} must be within [0, 1], got {value}")]
    FractionOutOfRange {
        /// Threshold name.
        name: &'static str,
        /// Offending value.
        value: f64,
    },
    /// A negative or non-finite quantity.
    #[error("{name} must be a finite non-negative number, got {value}")]
    Negative {
        /// Threshold name.
        name: &'static str,
        /// Offending value.
        value: f64,
    },
    /// `present_cutoff` must sit strictly below `dominant_cutoff`.
    #[error("present cutoff {present} must be below dominant cutoff {dominant}")]
    CutoffOrder {
        /// Present cutoff.
        present: f64,
        /// Dominant cutoff.
        dominant: f64,
    },
}

impl TypingConfig {
    /// Apply every value set in `overrides`.
    pub fn with_overrides(mut self, overrides: &ThresholdOverrides) -> Self {
        if let Some(value) = overrides.min_mean_depth {
            self.min_mean_depth = value;
        }
        if let Some(value) = overrides.min_breadth {
            self.min_breadth = value;
        }
        if let Some(value) = overrides.min_site_depth {
            self.min_site_depth = value;
        }
        if let Some(value) = overrides.present_cutoff {
            self.present_cutoff = value;
        }
        if let Some(value) = overrides.dominant_cutoff {
            self.dominant_cutoff = value;
        }
        if let Some(value) = overrides.noise_threshold {
            self.noise_threshold = value;
        }
        if let Some(value) = overrides.depth_divergence_tolerance {
            self.depth_divergence_tolerance = value;
        }
        self
    }

    /// Check ranges and cutoff ordering.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("present_cutoff", self.present_cutoff),
            ("dominant_cutoff", self.dominant_cutoff),
            ("noise_threshold", self.noise_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::FractionOutOfRange { name, value });
            }
        }
        for (name, value) in [
            ("min_mean_depth", self.min_mean_depth),
            ("min_breadth", self.min_breadth),
            ("depth_divergence_tolerance", self.depth_divergence_tolerance),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Negative { name, value });
            }
        }
        if self.present_cutoff >= self.dominant_cutoff {
            return Err(ConfigError::CutoffOrder {
                present: self.present_cutoff,
                dominant: self.dominant_cutoff,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(TypingConfig::default().validate(), Ok(()));
    }

    #[test]
    fn overrides_replace_only_set_values() {
        let overrides = ThresholdOverrides {
            present_cutoff: Some(0.1),
            min_site_depth: Some(5),
            ..ThresholdOverrides::default()
        };
        let config = TypingConfig::default().with_overrides(&overrides);
        assert_eq!(config.present_cutoff, 0.1);
        assert_eq!(config.min_site_depth, 5);
        assert_eq!(config.dominant_cutoff, TypingConfig::default().dominant_cutoff);
    }

    #[test]
    fn rejects_inverted_cutoffs() {
        let config = TypingConfig {
            present_cutoff: 0.6,
            dominant_cutoff: 0.5,
            ..TypingConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::CutoffOrder { .. })));
    }
}
