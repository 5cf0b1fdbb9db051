//! Settings for trees and guides, with validating builders.
//!
//! Both settings structs use the `bon` builder with a custom finishing
//! function so invalid combinations are rejected at `build()` time. All
//! fields are plain data and serde-serializable, so hosts can load them from
//! configuration files.
//!
//! # Example
//!
//! ```
//! use densitree::{GuideSettings, TreeSettings};
//!
//! // All defaults.
//! let settings = GuideSettings::builder().build().unwrap();
//! assert_eq!(settings.uniform_prob, 0.5);
//!
//! // Customized tree behavior.
//! let settings = GuideSettings::builder()
//!     .uniform_prob(0.25)
//!     .tree(
//!         TreeSettings::builder()
//!             .split_threshold(0.01)
//!             .second_moment(true)
//!             .build()
//!             .unwrap(),
//!     )
//!     .build()
//!     .unwrap();
//! assert!(settings.tree.second_moment);
//! ```

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::Float;

// =============================================================================
// ConfigError
// =============================================================================

/// Errors that can occur during settings validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Split threshold must be positive and finite.
    InvalidSplitThreshold(Float),
    /// Starvation threshold must be non-negative and finite.
    InvalidStarvationThreshold(Float),
    /// Uniform mixture probability must lie in [0, 1].
    InvalidUniformProb(Float),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSplitThreshold(v) => {
                write!(f, "split_threshold must be positive and finite, got {}", v)
            }
            Self::InvalidStarvationThreshold(v) => {
                write!(
                    f,
                    "starvation_threshold must be non-negative and finite, got {}",
                    v
                )
            }
            Self::InvalidUniformProb(v) => {
                write!(f, "uniform_prob must be in [0, 1], got {}", v)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// =============================================================================
// Verbosity
// =============================================================================

/// How much a guide reports about its rebuilds (on stderr).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Verbosity {
    /// No output.
    #[default]
    Silent,
    /// One line per rebuild.
    Info,
    /// Rebuild lines plus timing.
    Debug,
}

// =============================================================================
// TreeSettings
// =============================================================================

/// Tuning flags fixed per tree instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Builder)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
pub struct TreeSettings {
    /// Density-per-area level above which a leaf splits during refinement.
    /// Default: 0.002. Lower values grow deeper trees.
    #[builder(default = 0.002)]
    pub split_threshold: Float,

    /// Divide each leaf's accumulators by its own collected weight when
    /// building (and prune starved leaves). When off, a depth-dependent area
    /// scale is used instead. Default: true.
    #[builder(default = true)]
    pub leaf_reweighting: bool,

    /// Spread each splatted sample over nearby leaves with a box filter
    /// sized to the leaf containing it. Default: true.
    #[builder(default = true)]
    pub filtering: bool,

    /// Accumulate the squared target instead of the target, learning a
    /// density proportional to the square root of the second moment.
    /// Default: false.
    #[builder(default = false)]
    pub second_moment: bool,

    /// Minimum epoch weight below which a leaf counts as starved and is
    /// pruned during building (only with `leaf_reweighting`).
    /// Default: 1e-3.
    #[builder(default = 1e-3)]
    pub starvation_threshold: Float,
}

impl<S: tree_settings_builder::IsComplete> TreeSettingsBuilder<S> {
    /// Build and validate the settings.
    pub fn build(self) -> Result<TreeSettings, ConfigError> {
        let settings = self.__build_internal();
        settings.validate()?;
        Ok(settings)
    }
}

impl TreeSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.split_threshold > 0.0) || !self.split_threshold.is_finite() {
            return Err(ConfigError::InvalidSplitThreshold(self.split_threshold));
        }
        if !(self.starvation_threshold >= 0.0) || !self.starvation_threshold.is_finite() {
            return Err(ConfigError::InvalidStarvationThreshold(
                self.starvation_threshold,
            ));
        }
        Ok(())
    }
}

impl Default for TreeSettings {
    fn default() -> Self {
        Self::builder().build().expect("default settings are valid")
    }
}

// =============================================================================
// GuideSettings
// =============================================================================

/// Configuration for a [`Guide`](crate::Guide).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Builder)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
pub struct GuideSettings {
    /// Probability mass of the uniform fallback in the sampling mixture.
    /// Default: 0.5. At 1.0 the guide degenerates to plain uniform sampling.
    #[builder(default = 0.5)]
    pub uniform_prob: Float,

    /// Rebuild reporting level. Default: silent.
    #[builder(default)]
    pub verbosity: Verbosity,

    /// Settings for the owned training/sampling distributions.
    #[builder(default)]
    pub tree: TreeSettings,
}

impl<S: guide_settings_builder::IsComplete> GuideSettingsBuilder<S> {
    /// Build and validate the settings.
    pub fn build(self) -> Result<GuideSettings, ConfigError> {
        let settings = self.__build_internal();
        settings.validate()?;
        Ok(settings)
    }
}

impl GuideSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.uniform_prob) {
            return Err(ConfigError::InvalidUniformProb(self.uniform_prob));
        }
        self.tree.validate()
    }
}

impl Default for GuideSettings {
    fn default() -> Self {
        Self::builder().build().expect("default settings are valid")
    }
}

// =============================================================================
// Tests
// =============================================================================
