//! Training configuration for the semantic map trainer.

use crate::error::{Result, SmapError};
use crate::topology::{GlobalTopology, LocalTopology};
use crate::{CellIndex, Float, TermIndex};
use serde::{Deserialize, Serialize};

/// Hyperparameters of one semantic map training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Map width in cells.
    pub width: CellIndex,

    /// Map height in cells.
    pub height: CellIndex,

    /// Number of training epochs.
    /// Must be at least 2; the final epoch switches to the full vocabulary.
    pub num_epochs: u32,

    /// Initial neighborhood radius for every cell.
    /// Default: (width + height) / 2.
    pub initial_radius: CellIndex,

    /// Per-epoch radius shrink exponent in (0, 1].
    /// Default: chosen so the minimum radius reaches 1.5 at the final epoch.
    pub update_exponent: Float,

    /// Global wrap rule of the grid.
    pub global_topology: GlobalTopology,

    /// Local neighbor shape of the grid.
    pub local_topology: LocalTopology,

    /// If non-zero, ignore vocabulary indices at or above this value during
    /// best-matching-unit search and all but the final batch update.
    pub train_vocab_cutoff: TermIndex,

    /// If non-zero, reassign dead cells to the worst-matching snippets every
    /// nth epoch.
    pub dead_cell_update_strides: u32,

    /// Keep per-cell radii above the topographic-discontinuity lower bound.
    pub respect_lower_bound: bool,

    /// Random seed for codebook initialization.
    /// Default: None (seeded from the clock).
    pub seed: Option<u64>,

    /// Offset the init seed by worker index so each worker draws a disjoint
    /// stream. Results then depend on the worker count; disable for
    /// cross-hardware determinism.
    pub per_worker_seed_offset: bool,

    /// Save a neighborhood snapshot before every epoch.
    pub verbose: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        let width = 32;
        let height = 32;
        let num_epochs = 2;
        let initial_radius = (width + height) / 2;
        Self {
            width,
            height,
            num_epochs,
            initial_radius,
            update_exponent: derived_update_exponent(initial_radius, num_epochs),
            global_topology: GlobalTopology::Torus,
            local_topology: LocalTopology::Circ,
            train_vocab_cutoff: 0,
            dead_cell_update_strides: 0,
            respect_lower_bound: true,
            seed: None,
            per_worker_seed_offset: true,
            verbose: false,
        }
    }
}

impl TrainConfig {
    /// Returns the total number of cells in the map.
    #[inline]
    pub fn num_cells(&self) -> usize {
        self.height as usize * self.width as usize
    }

    /// Checks the parameter combination.
    pub fn validate(&self) -> Result<()> {
        if self.width < 1 || self.height < 1 {
            return Err(SmapError::Validation(
                "the map width and height must be at least 1".to_string(),
            ));
        }
        if self.num_epochs < 2 {
            return Err(SmapError::Validation(
                "the number of epochs must be at least 2".to_string(),
            ));
        }
        if self.initial_radius < 1 {
            return Err(SmapError::Validation(
                "the initial radius must be at least 1".to_string(),
            ));
        }
        if self.update_exponent <= 0.0 || self.update_exponent > 1.0 {
            return Err(SmapError::Validation(
                "the update exponent must be a real number between 0 and 1".to_string(),
            ));
        }
        if self.local_topology == LocalTopology::Hexa && self.height & 1 == 1 {
            return Err(SmapError::Validation(
                "for a hexagonal grid the number of rows has to be even".to_string(),
            ));
        }
        Ok(())
    }
}

/// The update exponent for which the minimal radius reaches 1.5 at the final
/// epoch when shrinking from `initial_radius`.
pub fn derived_update_exponent(initial_radius: CellIndex, num_epochs: u32) -> Float {
    let epochs = num_epochs as f64;
    let exponent =
        (1.5f64.ln()).powf(1.0 / epochs) / ((initial_radius as f64).ln()).powf(1.0 / epochs);
    exponent as Float
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TrainConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.num_cells(), 1024);
    }

    #[test]
    fn test_derived_update_exponent_reaches_target_radius() {
        let initial_radius = 16;
        let num_epochs = 10;
        let exponent = derived_update_exponent(initial_radius, num_epochs) as f64;
        assert!(exponent > 0.0 && exponent <= 1.0);

        // radius -> radius^exponent per epoch converges to 1.5 at the end.
        let mut radius = initial_radius as f64;
        for _ in 0..num_epochs {
            radius = radius.powf(exponent);
        }
        assert!((radius - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_validate_rejects_bad_epochs() {
        let config = TrainConfig {
            num_epochs: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_hexa_with_odd_height() {
        let config = TrainConfig {
            height: 5,
            local_topology: LocalTopology::Hexa,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_exponent() {
        let config = TrainConfig {
            update_exponent: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
