//! The dense codebook of cell prototype vectors.
//!
//! A codebook holds one prototype vector per map cell, flat in cell-major
//! order. All heavy kernels live here: the best-matching-unit searches, the
//! batch SOM update, the convergence error metrics, and the dead-cell rescue
//! heuristic. Prototypes stay in [0, 1]: they start as uniform samples and
//! every batch update replaces them by convex combinations of binary inputs.

use crate::corpus::SparseCorpus;
use crate::error::{Result, SmapError};
use crate::io;
use crate::neighborhood::Neighborhood;
use crate::topology::{GlobalTopology, LocalTopology, Topology};
use crate::{CellIndex, Float, TermIndex};
use log::info;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Best and second-best matching units for every snippet of a corpus.
#[derive(Debug, Clone)]
pub struct MatchingUnits {
    /// Best matching cell per snippet.
    pub cells: Vec<CellIndex>,
    /// Distance to the best matching cell, clamped at 0.
    pub distances: Vec<Float>,
    /// Second-best matching cell per snippet.
    pub next_cells: Vec<CellIndex>,
    /// Distance to the second-best matching cell.
    pub next_distances: Vec<Float>,
}

/// The map's prototype vectors.
#[derive(Debug, Clone)]
pub struct Codebook {
    height: CellIndex,
    width: CellIndex,
    input_dim: TermIndex,
    num_cells: usize,
    topology: Topology,
    values: Vec<Float>,
}

impl Codebook {
    /// Creates a zero-filled codebook for a `height` x `width` map over
    /// `input_dim` vocabulary dimensions.
    pub fn new(
        height: CellIndex,
        width: CellIndex,
        input_dim: TermIndex,
        global_topology: GlobalTopology,
        local_topology: LocalTopology,
    ) -> Result<Self> {
        let topology = Topology::new(global_topology, local_topology, height, width)?;
        let num_cells = height as usize * width as usize;
        let size = num_cells * input_dim as usize;

        let mut values = Vec::new();
        values.try_reserve_exact(size).map_err(|_| {
            SmapError::ResourceExhausted(format!(
                "failed to allocate {} bytes of memory for codebook",
                size * std::mem::size_of::<Float>()
            ))
        })?;
        values.resize(size, 0.0);

        Ok(Self {
            height,
            width,
            input_dim,
            num_cells,
            topology,
            values,
        })
    }

    /// Creates a codebook from existing prototype values.
    pub fn from_values(
        height: CellIndex,
        width: CellIndex,
        input_dim: TermIndex,
        global_topology: GlobalTopology,
        local_topology: LocalTopology,
        values: Vec<Float>,
    ) -> Result<Self> {
        let num_cells = height as usize * width as usize;
        if values.len() != num_cells * input_dim as usize {
            return Err(SmapError::Validation(format!(
                "codebook values have length {} but the map needs {}",
                values.len(),
                num_cells * input_dim as usize
            )));
        }
        let topology = Topology::new(global_topology, local_topology, height, width)?;
        Ok(Self {
            height,
            width,
            input_dim,
            num_cells,
            topology,
            values,
        })
    }

    /// Fills the codebook with i.i.d. uniform samples from [0, 1).
    ///
    /// With `per_worker_seed_offset` the value array is split into one
    /// contiguous block per rayon worker and each block draws from its own
    /// stream seeded `seed + block index`. Results are then repeatable only
    /// for the same worker count; without the offset a single stream fills
    /// the whole array deterministically.
    pub fn init(&mut self, seed: u64, per_worker_seed_offset: bool) {
        info!("initializing codebook");
        if per_worker_seed_offset {
            let workers = rayon::current_num_threads().max(1);
            let chunk_len = self.values.len().div_ceil(workers).max(1);
            self.values
                .par_chunks_mut(chunk_len)
                .enumerate()
                .for_each(|(block, values)| {
                    let mut rng = ChaCha8Rng::seed_from_u64(seed + block as u64);
                    for value in values {
                        *value = rng.gen_range(0.0..1.0);
                    }
                });
        } else {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            for value in &mut self.values {
                *value = rng.gen_range(0.0..1.0);
            }
        }
    }

    /// Map height in cells.
    #[inline]
    pub fn height(&self) -> CellIndex {
        self.height
    }

    /// Map width in cells.
    #[inline]
    pub fn width(&self) -> CellIndex {
        self.width
    }

    /// Vocabulary dimension of the prototypes.
    #[inline]
    pub fn input_dim(&self) -> TermIndex {
        self.input_dim
    }

    /// Total number of cells.
    #[inline]
    pub fn num_cells(&self) -> usize {
        self.num_cells
    }

    /// The flat prototype array, cell-major.
    #[inline]
    pub fn values(&self) -> &[Float] {
        &self.values
    }

    /// The prototype vector of one cell.
    #[inline]
    pub fn cell(&self, cell: CellIndex) -> &[Float] {
        let dim = self.input_dim as usize;
        let start = cell as usize * dim;
        &self.values[start..start + dim]
    }

    fn effective_input_dim(&self, train_vocab_cutoff: TermIndex) -> usize {
        if train_vocab_cutoff > 0 {
            (train_vocab_cutoff as usize).min(self.input_dim as usize)
        } else {
            self.input_dim as usize
        }
    }

    /// Squared norms of the first `effective` components of every prototype.
    fn cell_norms(&self, effective: usize) -> Vec<Float> {
        let dim = self.input_dim as usize;
        self.values
            .par_chunks_exact(dim)
            .map(|w| w[..effective].iter().map(|v| v * v).sum())
            .collect()
    }

    /// Finds every snippet's best matching cell.
    ///
    /// Returns per-snippet `(cell, distance)` arrays. Distances omit the
    /// snippet's own squared norm unless `need_correct_distances` is set, in
    /// which case they are corrected and clamped at 0. Rows that are empty
    /// under the cutoff keep cell 0 and an infinite distance.
    pub fn find_best_matching_units(
        &self,
        data: &SparseCorpus,
        train_vocab_cutoff: TermIndex,
        need_correct_distances: bool,
    ) -> Result<(Vec<CellIndex>, Vec<Float>)> {
        if need_correct_distances && data.sum_of_squares().is_none() {
            return Err(SmapError::Validation(
                "sum of squares must be initialized before correcting distances".to_string(),
            ));
        }

        let effective = self.effective_input_dim(train_vocab_cutoff);
        let dim = self.input_dim as usize;
        let norms = self.cell_norms(effective);

        let (cells, mut distances): (Vec<CellIndex>, Vec<Float>) = (0..data.num_rows() as usize)
            .into_par_iter()
            .map(|row| {
                let indices = data.indices_in_row(row);
                if indices.is_empty() || indices[0] as usize >= effective {
                    return (0, Float::MAX);
                }
                let weights = data.weights_in_row(row);

                let mut best_cell: CellIndex = 0;
                let mut best_distance = Float::MAX;
                for (cell, w) in self.values.chunks_exact(dim).enumerate() {
                    let product = if data.has_weights() {
                        dot_weighted(w, indices, weights, effective)
                    } else {
                        dot_binary(w, indices, effective)
                    };
                    let distance = norms[cell] - 2.0 * product;
                    if distance < best_distance {
                        best_cell = cell as CellIndex;
                        best_distance = distance;
                    }
                }
                (best_cell, best_distance)
            })
            .unzip();

        if need_correct_distances {
            let sums = data
                .sum_of_squares()
                .ok_or_else(|| SmapError::Validation("sum of squares missing".to_string()))?;
            distances
                .par_iter_mut()
                .zip(sums.par_iter())
                .for_each(|(distance, &sum)| {
                    *distance = (*distance + sum as Float).max(0.0);
                });
        }

        Ok((cells, distances))
    }

    /// Finds every snippet's best and second-best matching cells.
    ///
    /// Distances include the snippet's squared norm and the best distance is
    /// clamped at 0 (floating-point rounding of the expanded Euclidean
    /// identity can go slightly negative).
    pub fn find_best_and_next_best_matching_units(
        &self,
        data: &SparseCorpus,
        train_vocab_cutoff: TermIndex,
    ) -> Result<MatchingUnits> {
        let sums = data.sum_of_squares().ok_or_else(|| {
            SmapError::Validation(
                "sum of squares must be initialized before the two-best search".to_string(),
            )
        })?;

        let effective = self.effective_input_dim(train_vocab_cutoff);
        let dim = self.input_dim as usize;
        let norms = self.cell_norms(effective);

        let per_row: Vec<(CellIndex, Float, CellIndex, Float)> = (0..data.num_rows() as usize)
            .into_par_iter()
            .map(|row| {
                let indices = data.indices_in_row(row);
                if indices.is_empty() || indices[0] as usize >= effective {
                    return (0, Float::MAX, 0, Float::MAX);
                }
                let weights = data.weights_in_row(row);
                let sum_of_squares = sums[row] as Float;

                let mut best_cell: CellIndex = 0;
                let mut best_distance = Float::MAX;
                let mut next_cell: CellIndex = 0;
                let mut next_distance = Float::MAX;
                for (cell, w) in self.values.chunks_exact(dim).enumerate() {
                    // Weights bias the search so that heavier terms dominate
                    // the match; the batch update itself stays binary so the
                    // prototypes remain in [0, 1].
                    let product = if data.has_weights() {
                        dot_weighted(w, indices, weights, effective)
                    } else {
                        dot_binary(w, indices, effective)
                    };
                    let distance = norms[cell] - 2.0 * product + sum_of_squares;
                    if distance < best_distance {
                        next_cell = best_cell;
                        next_distance = best_distance;
                        best_cell = cell as CellIndex;
                        best_distance = distance.max(0.0);
                    }
                }
                (best_cell, best_distance, next_cell, next_distance)
            })
            .collect();

        let num_rows = per_row.len();
        let mut units = MatchingUnits {
            cells: Vec::with_capacity(num_rows),
            distances: Vec::with_capacity(num_rows),
            next_cells: Vec::with_capacity(num_rows),
            next_distances: Vec::with_capacity(num_rows),
        };
        for (cell, distance, next_cell, next_distance) in per_row {
            units.cells.push(cell);
            units.distances.push(distance);
            units.next_cells.push(next_cell);
            units.next_distances.push(next_distance);
        }
        Ok(units)
    }

    /// Applies one batch SOM update.
    ///
    /// Every cell's prototype becomes the influence-weighted mean of the
    /// snippets that pull on it; cells that received no influence keep their
    /// previous prototype. Only vocabulary indices below the cutoff
    /// accumulate, but the division rewrites the full prototype, so
    /// dimensions at or above the cutoff are zeroed.
    pub fn apply_batch_som_update(
        &mut self,
        data: &SparseCorpus,
        neighborhood: &Neighborhood,
        best_matching_units: &[CellIndex],
        train_vocab_cutoff: TermIndex,
    ) {
        let effective = self.effective_input_dim(train_vocab_cutoff);
        let dim = self.input_dim as usize;
        let num_rows = data.num_rows() as usize;

        self.values
            .par_chunks_exact_mut(dim)
            .enumerate()
            .for_each_init(
                || vec![0.0 as Float; dim],
                |numerator, (cell, w)| {
                    numerator.fill(0.0);
                    let mut denominator: Float = 0.0;

                    for row in 0..num_rows {
                        let learning_rate =
                            neighborhood.influence(best_matching_units[row], cell as CellIndex);
                        if learning_rate <= 0.0 {
                            continue;
                        }
                        denominator += learning_rate;
                        for &index in data.indices_in_row(row) {
                            let index = index as usize;
                            if index >= effective {
                                break;
                            }
                            // The input is binary, so each present term just
                            // accumulates the learning rate.
                            numerator[index] += learning_rate;
                        }
                    }

                    if denominator != 0.0 {
                        for (value, &sum) in w.iter_mut().zip(numerator.iter()) {
                            *value = sum / denominator;
                        }
                    }
                },
            );
    }

    /// The quantization error over per-snippet distances.
    ///
    /// The distances are already squared Euclidean values, so this is
    /// `sqrt(sum of squares) / num_rows` of those.
    pub fn quantization_error(&self, distances: &[Float]) -> Float {
        let mut error: Float = 0.0;
        for &distance in distances {
            error += distance * distance;
        }
        error.sqrt() / distances.len() as Float
    }

    /// Fraction of cells never chosen as any snippet's best matching unit.
    pub fn gap_error(&self, best_matching_units: &[CellIndex]) -> Float {
        let used = self.count_used_cells(best_matching_units).1;
        (self.num_cells - used) as Float / self.num_cells as Float
    }

    fn count_used_cells(&self, best_matching_units: &[CellIndex]) -> (Vec<bool>, usize) {
        let mut cell_in_use = vec![false; self.num_cells];
        let mut num_used = 0;
        for &cell in best_matching_units {
            if !cell_in_use[cell as usize] {
                cell_in_use[cell as usize] = true;
                num_used += 1;
                if num_used == self.num_cells {
                    break;
                }
            }
        }
        (cell_in_use, num_used)
    }

    /// Redirects dead cells to the worst-matching snippets.
    ///
    /// Mutates only the BMU array; the next batch update then pulls the dead
    /// cells toward those snippets. Returns the pre-rescue gap error, or 0
    /// when there is nothing to rescue (no dead cells, or more dead cells
    /// than snippets).
    pub fn assign_dead_cells(
        &self,
        best_matching_units: &mut [CellIndex],
        distances: &[Float],
    ) -> Float {
        let (cell_in_use, num_used) = self.count_used_cells(best_matching_units);
        let num_unused = self.num_cells - num_used;
        if num_unused == 0 || num_unused > best_matching_units.len() {
            return 0.0;
        }
        info!("found {} dead cells", num_unused);

        // The num_unused-th largest distance separates the rescue candidates.
        let mut sorted = distances.to_vec();
        sorted.sort_unstable_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        let distance_threshold = sorted[num_unused - 1];

        let mut worst_matching_rows = Vec::with_capacity(num_unused);
        for (row, &distance) in distances.iter().enumerate() {
            if distance >= distance_threshold {
                worst_matching_rows.push(row);
                if worst_matching_rows.len() == num_unused {
                    break;
                }
            }
        }

        let mut rows = worst_matching_rows.into_iter();
        for (cell, &in_use) in cell_in_use.iter().enumerate() {
            if in_use {
                continue;
            }
            match rows.next() {
                Some(row) => best_matching_units[row] = cell as CellIndex,
                None => break,
            }
        }

        num_unused as Float / self.num_cells as Float
    }

    /// Mean grid distance between this epoch's and the previous epoch's BMUs.
    pub fn diffusion_error(
        &self,
        best_matching_units: &[CellIndex],
        previous_best_matching_units: &[CellIndex],
    ) -> Float {
        let mut total_distance: u64 = 0;
        for (&current, &previous) in best_matching_units
            .iter()
            .zip(previous_best_matching_units.iter())
        {
            if current != previous {
                total_distance += self.topology.cell_distance(previous, current) as u64;
            }
        }
        total_distance as Float / best_matching_units.len() as Float
    }

    /// Saves the codebook to its framed binary file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        info!("saving codebook to {}", path.as_ref().display());
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        io::write_u8(&mut writer, 0)?;
        io::write_u64(&mut writer, self.height as u64)?;
        io::write_u64(&mut writer, self.width as u64)?;
        io::write_u64(&mut writer, self.input_dim as u64)?;
        io::write_f32_slice(&mut writer, &self.values)?;
        Ok(())
    }

    /// Loads a codebook saved by [`Self::save`].
    ///
    /// The file does not record the topology, so the caller supplies it.
    pub fn load<P: AsRef<Path>>(
        path: P,
        global_topology: GlobalTopology,
        local_topology: LocalTopology,
    ) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let format = io::read_u8(&mut reader)?;
        if format != 0 {
            return Err(SmapError::Format(format!(
                "stored codebook has unknown format {}",
                format
            )));
        }
        let height = io::read_u64(&mut reader)? as CellIndex;
        let width = io::read_u64(&mut reader)? as CellIndex;
        let input_dim = io::read_u64(&mut reader)? as TermIndex;
        let num_cells = height as usize * width as usize;
        let values = io::read_f32_vec(&mut reader, num_cells * input_dim as usize)?;

        Self::from_values(height, width, input_dim, global_topology, local_topology, values)
    }
}

/// Inner product of a prototype with a weighted sparse row, below the cutoff.
#[inline]
fn dot_weighted(
    w: &[Float],
    indices: &[TermIndex],
    weights: &[crate::Weight],
    effective_input_dim: usize,
) -> Float {
    let mut result: Float = 0.0;
    for (&index, &weight) in indices.iter().zip(weights.iter()) {
        let index = index as usize;
        if index >= effective_input_dim {
            // Indices are sorted, so all further indices are even larger.
            break;
        }
        result += w[index] * weight as Float;
    }
    result
}

/// Inner product of a prototype with a binary sparse row, below the cutoff.
#[inline]
fn dot_binary(w: &[Float], indices: &[TermIndex], effective_input_dim: usize) -> Float {
    let mut result: Float = 0.0;
    for &index in indices {
        let index = index as usize;
        if index >= effective_input_dim {
            break;
        }
        result += w[index];
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::SparseCorpus;
    use tempfile::tempdir;

    fn one_hot_corpus(num_terms: u32) -> SparseCorpus {
        let indices: Vec<u32> = (0..num_terms).collect();
        let index_pointers: Vec<u32> = (0..=num_terms).collect();
        let mut corpus =
            SparseCorpus::from_parts(num_terms, indices, index_pointers, vec![]).unwrap();
        corpus.init_sum_of_squares();
        corpus
    }

    fn plane_codebook(values: Vec<Float>, height: u16, width: u16, dim: u32) -> Codebook {
        Codebook::from_values(
            height,
            width,
            dim,
            GlobalTopology::Plane,
            LocalTopology::Rect,
            values,
        )
        .unwrap()
    }

    #[test]
    fn test_init_values_in_unit_interval() {
        let mut codebook =
            Codebook::new(4, 3, 5, GlobalTopology::Plane, LocalTopology::Circ).unwrap();
        codebook.init(42, true);
        assert_eq!(codebook.values().len(), 60);
        for &value in codebook.values() {
            assert!((0.0..1.0).contains(&value));
        }
    }

    #[test]
    fn test_single_stream_init_is_deterministic() {
        let mut first =
            Codebook::new(2, 2, 8, GlobalTopology::Plane, LocalTopology::Rect).unwrap();
        let mut second =
            Codebook::new(2, 2, 8, GlobalTopology::Plane, LocalTopology::Rect).unwrap();
        first.init(7, false);
        second.init(7, false);
        assert_eq!(first.values(), second.values());
    }

    #[test]
    fn test_bmu_tie_break_prefers_lowest_cell() {
        // All prototypes identical and all row weights zero: every distance
        // ties, so the strict `<` update keeps cell 0 everywhere.
        let mut corpus = SparseCorpus::from_parts(
            4,
            vec![0, 1, 2, 3],
            vec![0, 1, 2, 3, 4],
            vec![0, 0, 0, 0],
        )
        .unwrap();
        corpus.init_sum_of_squares();

        let codebook = plane_codebook(vec![0.5; 4 * 4], 2, 2, 4);
        let units = codebook
            .find_best_and_next_best_matching_units(&corpus, 0)
            .unwrap();
        assert_eq!(units.cells, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_bmu_finds_matching_prototype() {
        // Prototype c is the indicator of term c.
        let mut values = vec![0.0; 4 * 4];
        for cell in 0..4 {
            values[cell * 4 + cell] = 1.0;
        }
        let codebook = plane_codebook(values, 2, 2, 4);
        let corpus = one_hot_corpus(4);

        let units = codebook
            .find_best_and_next_best_matching_units(&corpus, 0)
            .unwrap();
        assert_eq!(units.cells, vec![0, 1, 2, 3]);
        for &distance in &units.distances {
            assert!(distance.abs() < 1e-6);
        }
        // The runner-up ties at distance 2 and the first encountered wins.
        assert_eq!(units.next_cells[3], 0);
    }

    #[test]
    fn test_bmu_search_respects_cutoff() {
        // Term 3 lies beyond the cutoff, so row 3 is skipped entirely.
        let mut values = vec![0.0; 4 * 4];
        for cell in 0..4 {
            values[cell * 4 + cell] = 1.0;
        }
        let codebook = plane_codebook(values, 2, 2, 4);
        let corpus = one_hot_corpus(4);

        let (cells, distances) = codebook
            .find_best_matching_units(&corpus, 3, false)
            .unwrap();
        assert_eq!(cells[0..3], [0, 1, 2]);
        assert_eq!(cells[3], 0);
        assert_eq!(distances[3], Float::MAX);
    }

    #[test]
    fn test_batch_update_keeps_values_in_unit_interval() {
        let mut codebook =
            Codebook::new(2, 2, 4, GlobalTopology::Plane, LocalTopology::Rect).unwrap();
        codebook.init(3, false);
        let corpus = one_hot_corpus(4);
        let neighborhood = Neighborhood::new(
            2,
            2,
            GlobalTopology::Plane,
            LocalTopology::Rect,
            0.95,
            2,
        )
        .unwrap();

        codebook.apply_batch_som_update(&corpus, &neighborhood, &[0, 1, 2, 3], 0);
        for &value in codebook.values() {
            assert!((0.0..=1.0).contains(&value));
        }
    }

    #[test]
    fn test_batch_update_skips_uninfluenced_cells() {
        let mut codebook =
            Codebook::new(2, 2, 4, GlobalTopology::Plane, LocalTopology::Rect).unwrap();
        codebook.init(11, false);
        let before = codebook.values().to_vec();
        let corpus = one_hot_corpus(4);
        // Radius 1: influence reaches only distance 0, i.e. the BMU itself.
        let neighborhood = Neighborhood::new(
            2,
            2,
            GlobalTopology::Plane,
            LocalTopology::Rect,
            0.95,
            1,
        )
        .unwrap();

        codebook.apply_batch_som_update(&corpus, &neighborhood, &[0, 0, 0, 0], 0);
        // Cell 0 absorbed all rows; the others kept their prototypes.
        assert_eq!(&codebook.values()[4..], &before[4..]);
        assert_ne!(&codebook.values()[..4], &before[..4]);
    }

    #[test]
    fn test_quantization_error_formula() {
        let codebook =
            Codebook::new(2, 2, 4, GlobalTopology::Plane, LocalTopology::Rect).unwrap();
        let error = codebook.quantization_error(&[3.0, 4.0]);
        assert!((error - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_gap_error_counts_unused_cells() {
        let codebook =
            Codebook::new(2, 2, 4, GlobalTopology::Plane, LocalTopology::Rect).unwrap();
        assert_eq!(codebook.gap_error(&[0, 0, 1, 1]), 0.5);
        assert_eq!(codebook.gap_error(&[0, 1, 2, 3]), 0.0);
    }

    #[test]
    fn test_diffusion_error_measures_bmu_drift() {
        let codebook =
            Codebook::new(2, 2, 4, GlobalTopology::Plane, LocalTopology::Rect).unwrap();
        // Row 0 moved from cell 0 to cell 3 (distance 1 on a 2x2 grid),
        // row 1 stayed.
        let error = codebook.diffusion_error(&[3, 1], &[0, 1]);
        assert!((error - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_assign_dead_cells_redirects_worst_row() {
        let codebook =
            Codebook::new(2, 2, 4, GlobalTopology::Plane, LocalTopology::Rect).unwrap();

        // 100 rows over cells 0, 1, 2; cell 3 is dead. Row 42 matches worst.
        let mut bmus: Vec<CellIndex> = (0..100).map(|row| (row % 3) as CellIndex).collect();
        let mut distances = vec![1.0 as Float; 100];
        distances[42] = 9.0;

        let gap = codebook.assign_dead_cells(&mut bmus, &distances);
        assert!((gap - 0.25).abs() < 1e-6);
        assert_eq!(bmus[42], 3);
        // Everything else is untouched.
        for (row, &cell) in bmus.iter().enumerate() {
            if row != 42 {
                assert_eq!(cell, (row % 3) as CellIndex);
            }
        }
    }

    #[test]
    fn test_assign_dead_cells_no_op_cases() {
        let codebook =
            Codebook::new(2, 2, 4, GlobalTopology::Plane, LocalTopology::Rect).unwrap();

        // No dead cells.
        let mut bmus = vec![0, 1, 2, 3];
        assert_eq!(codebook.assign_dead_cells(&mut bmus, &[1.0; 4]), 0.0);
        assert_eq!(bmus, vec![0, 1, 2, 3]);

        // More dead cells than rows.
        let mut bmus = vec![0];
        assert_eq!(codebook.assign_dead_cells(&mut bmus, &[1.0]), 0.0);
        assert_eq!(bmus, vec![0]);
    }

    #[test]
    fn test_save_load_roundtrip_is_bit_exact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("codebook.bin");

        let mut codebook =
            Codebook::new(2, 3, 4, GlobalTopology::Plane, LocalTopology::Circ).unwrap();
        codebook.init(42, false);
        codebook.save(&path).unwrap();

        let recovered =
            Codebook::load(&path, GlobalTopology::Plane, LocalTopology::Circ).unwrap();
        assert_eq!(recovered.height(), 2);
        assert_eq!(recovered.width(), 3);
        assert_eq!(recovered.input_dim(), 4);
        for (a, b) in codebook.values().iter().zip(recovered.values()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_weighted_rows_bias_the_search() {
        // Two cells: cell 0 matches term 0, cell 1 matches term 1. The row
        // contains both terms but weights term 1 heavier.
        let values = vec![1.0, 0.0, 0.0, 1.0];
        let codebook = Codebook::from_values(
            1,
            2,
            2,
            GlobalTopology::Plane,
            LocalTopology::Rect,
            values,
        )
        .unwrap();
        let mut corpus =
            SparseCorpus::from_parts(2, vec![0, 1], vec![0, 2], vec![1, 3]).unwrap();
        corpus.init_sum_of_squares();

        let units = codebook
            .find_best_and_next_best_matching_units(&corpus, 0)
            .unwrap();
        assert_eq!(units.cells, vec![1]);
        assert_eq!(units.next_cells, vec![0]);
    }
}
