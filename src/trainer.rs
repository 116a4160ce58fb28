//! The epoch loop driving codebook and neighborhood updates.
//!
//! Each epoch finds every snippet's two best matching cells, optionally
//! rescues dead cells, applies the batch SOM update, shrinks the adaptive
//! radii, and appends one row to the convergence log. After the loop a final
//! search recomputes the post-training metrics without updating the codebook.

use crate::codebook::Codebook;
use crate::config::TrainConfig;
use crate::corpus::SparseCorpus;
use crate::error::{Result, SmapError};
use crate::neighborhood::Neighborhood;
use crate::{CellIndex, Float, TermIndex};
use log::info;
use std::io::Write;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Per-epoch error metrics recorded during training.
///
/// Every vector holds one entry per epoch plus a final entry from the
/// post-training evaluation pass.
#[derive(Debug, Clone, Default)]
pub struct TrainingMetrics {
    /// Quantization error per epoch.
    pub quantization_errors: Vec<Float>,
    /// Topographic error per epoch.
    pub topographic_errors: Vec<Float>,
    /// Gap error per epoch.
    pub gap_errors: Vec<Float>,
    /// Diffusion error per epoch (0 for the first epoch).
    pub diffusion_errors: Vec<Float>,
    /// (min, max) neighborhood radius per epoch.
    pub radius_ranges: Vec<(Float, Float)>,
}

impl TrainingMetrics {
    fn record(
        &mut self,
        quantization: Float,
        topographic: Float,
        gap: Float,
        diffusion: Float,
        radius_range: (Float, Float),
    ) {
        self.quantization_errors.push(quantization);
        self.topographic_errors.push(topographic);
        self.gap_errors.push(gap);
        self.diffusion_errors.push(diffusion);
        self.radius_ranges.push(radius_range);
    }
}

/// Coordinates one training run over a fixed corpus.
#[derive(Debug, Clone)]
pub struct Trainer {
    num_epochs: u32,
    respect_lower_bound: bool,
    train_vocab_cutoff: TermIndex,
    dead_cell_update_strides: u32,
    snapshot_dir: Option<PathBuf>,
}

impl Trainer {
    /// Creates a trainer from the run configuration.
    pub fn new(config: &TrainConfig) -> Self {
        Self {
            num_epochs: config.num_epochs,
            respect_lower_bound: config.respect_lower_bound,
            train_vocab_cutoff: config.train_vocab_cutoff,
            dead_cell_update_strides: config.dead_cell_update_strides,
            snapshot_dir: None,
        }
    }

    /// Saves a neighborhood snapshot into `dir` before every epoch.
    pub fn with_snapshot_dir(mut self, dir: PathBuf) -> Self {
        self.snapshot_dir = Some(dir);
        self
    }

    /// Runs the full training loop.
    ///
    /// The codebook and neighborhood are mutated in place; the corpus is
    /// read-only and must have its squared norms initialized. One TSV row per
    /// epoch (plus a final row) goes to `convergence_log`, and `on_epoch`
    /// fires after each completed epoch.
    pub fn train<W: Write, F: FnMut(u32, &TrainingMetrics)>(
        &self,
        codebook: &mut Codebook,
        neighborhood: &mut Neighborhood,
        data: &SparseCorpus,
        convergence_log: &mut W,
        mut on_epoch: F,
    ) -> Result<TrainingMetrics> {
        if self.num_epochs < 2 {
            return Err(SmapError::Validation(
                "the number of epochs must be at least 2".to_string(),
            ));
        }
        if codebook.input_dim() != data.num_cols() {
            return Err(SmapError::Validation(format!(
                "codebook dimension {} does not match vocabulary size {}",
                codebook.input_dim(),
                data.num_cols()
            )));
        }

        info!("training adaptive self-organizing map");
        writeln!(
            convergence_log,
            "Epoch\tUnixTime\tRadiusMin\tRadiusMax\tQuantizationError\tTopographicError\tGapError\tDiffusionError"
        )?;

        let mut metrics = TrainingMetrics::default();
        let mut previous_cells: Vec<CellIndex> = Vec::new();
        let mut diffusion_error: Float = 0.0;

        for epoch in 1..=self.num_epochs {
            info!("epoch {} of {}", epoch, self.num_epochs);

            let mut units =
                codebook.find_best_and_next_best_matching_units(data, self.train_vocab_cutoff)?;

            let gap_error = if self.dead_cell_update_strides > 0
                && epoch % self.dead_cell_update_strides == 0
            {
                codebook.assign_dead_cells(&mut units.cells, &units.distances)
            } else {
                codebook.gap_error(&units.cells)
            };

            if epoch > 1 {
                diffusion_error = codebook.diffusion_error(&units.cells, &previous_cells);
            }
            previous_cells.clone_from(&units.cells);

            if let Some(dir) = &self.snapshot_dir {
                let path = dir.join(format!("prelim-{}.neighbourhood.bin", epoch - 1));
                neighborhood.save(path)?;
            }

            // The final epoch updates over the full vocabulary.
            let update_cutoff = if epoch < self.num_epochs {
                self.train_vocab_cutoff
            } else {
                0
            };
            codebook.apply_batch_som_update(data, neighborhood, &units.cells, update_cutoff);

            let topographic_error =
                neighborhood.update(&units.cells, &units.next_cells, self.respect_lower_bound);
            let quantization_error = codebook.quantization_error(&units.distances);

            self.log_epoch(
                convergence_log,
                epoch - 1,
                neighborhood,
                quantization_error,
                topographic_error,
                gap_error,
                diffusion_error,
            )?;
            metrics.record(
                quantization_error,
                topographic_error,
                gap_error,
                diffusion_error,
                (neighborhood.radius_min(), neighborhood.radius_max()),
            );
            on_epoch(epoch, &metrics);
        }

        // Post-training evaluation: search again, but leave the codebook as is.
        let units =
            codebook.find_best_and_next_best_matching_units(data, self.train_vocab_cutoff)?;
        let gap_error = codebook.gap_error(&units.cells);
        let topographic_error =
            neighborhood.update(&units.cells, &units.next_cells, self.respect_lower_bound);
        diffusion_error = codebook.diffusion_error(&units.cells, &previous_cells);
        let quantization_error = codebook.quantization_error(&units.distances);

        self.log_epoch(
            convergence_log,
            self.num_epochs,
            neighborhood,
            quantization_error,
            topographic_error,
            gap_error,
            diffusion_error,
        )?;
        metrics.record(
            quantization_error,
            topographic_error,
            gap_error,
            diffusion_error,
            (neighborhood.radius_min(), neighborhood.radius_max()),
        );

        Ok(metrics)
    }

    #[allow(clippy::too_many_arguments)]
    fn log_epoch<W: Write>(
        &self,
        convergence_log: &mut W,
        epoch: u32,
        neighborhood: &Neighborhood,
        quantization_error: Float,
        topographic_error: Float,
        gap_error: Float,
        diffusion_error: Float,
    ) -> Result<()> {
        writeln!(
            convergence_log,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            epoch,
            unix_time(),
            neighborhood.radius_min(),
            neighborhood.radius_max(),
            quantization_error,
            topographic_error,
            gap_error,
            diffusion_error,
        )?;
        Ok(())
    }
}

/// Seconds since the Unix epoch.
fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
