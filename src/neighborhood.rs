//! Per-cell adaptive neighborhood radii.
//!
//! Every cell carries its own effective radius. Radii shrink each epoch by a
//! power law, but cells near an observed topographic discontinuity keep their
//! radius above the discontinuity length so the map can still fold smoothly
//! over regions that have not converged. Kernel and lower-bound rule follow
//! Kiviluoto (DOI 10.1109/ICNN.1996.548907), equations (3) and (5).

use crate::error::Result;
use crate::io;
use crate::topology::{GlobalTopology, LocalTopology, Topology};
use crate::{CellIndex, Float};
use log::info;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// sqrt(e), the kernel normalization constant.
const SQRT_E: f64 = 1.6487212707001282;

/// A snippet whose two best matching cells are more than one step apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopographicDiscontinuity {
    /// The best matching cell.
    pub cell1: CellIndex,
    /// The second-best matching cell.
    pub cell2: CellIndex,
    /// Grid distance between the two.
    pub distance: CellIndex,
}

/// The per-cell radius field of the map.
#[derive(Debug, Clone)]
pub struct Neighborhood {
    height: CellIndex,
    width: CellIndex,
    topology: Topology,
    update_exponent: Float,
    initial_radius: CellIndex,
    radius_min: Float,
    radius_max: Float,
    values: Vec<Float>,
}

impl Neighborhood {
    /// Creates a neighborhood with every cell at `initial_radius`.
    pub fn new(
        height: CellIndex,
        width: CellIndex,
        global_topology: GlobalTopology,
        local_topology: LocalTopology,
        update_exponent: Float,
        initial_radius: CellIndex,
    ) -> Result<Self> {
        let topology = Topology::new(global_topology, local_topology, height, width)?;
        let num_cells = height as usize * width as usize;
        Ok(Self {
            height,
            width,
            topology,
            update_exponent,
            initial_radius,
            radius_min: initial_radius as Float,
            radius_max: initial_radius as Float,
            values: vec![initial_radius as Float; num_cells],
        })
    }

    /// Influence of a source cell (a snippet's BMU) on a target cell.
    ///
    /// The kernel is governed by the *target's* current radius `r`: it is
    /// `1/r` at distance 0, falls to 0 at distance `r`, and is clipped to 0
    /// beyond, so neighbors outside the radius see no pull.
    pub fn influence(&self, source_cell: CellIndex, target_cell: CellIndex) -> Float {
        let d = self.topology.cell_distance(source_cell, target_cell) as f64;
        let r = self.values[target_cell as usize] as f64;
        if d < r {
            ((1.0 - SQRT_E * (-0.5 * d * d / (r * r)).exp()) / (r * (1.0 - SQRT_E))) as Float
        } else {
            0.0
        }
    }

    /// Shrinks all radii by one epoch, respecting discontinuity lower bounds.
    ///
    /// Returns the topographic error `(|discontinuities| + 1) / num_rows`.
    pub fn update(
        &mut self,
        best_matching_units: &[CellIndex],
        next_best_matching_units: &[CellIndex],
        respect_lower_bound: bool,
    ) -> Float {
        let discontinuities =
            self.topographic_discontinuities(best_matching_units, next_best_matching_units);

        let topology = self.topology;
        let update_exponent = self.update_exponent;
        self.values.par_iter_mut().enumerate().for_each(|(cell, value)| {
            let cell = cell as CellIndex;
            let mut radius_lower_bound: Float = 1.0;
            for discontinuity in &discontinuities {
                radius_lower_bound = radius_lower_bound
                    .max(radius_from_discontinuity(&topology, cell, discontinuity) as Float);
            }

            let shrunk = value.powf(update_exponent);
            *value = if respect_lower_bound {
                radius_lower_bound.max(shrunk)
            } else {
                shrunk
            };
        });

        self.radius_min = self.values.iter().copied().fold(Float::MAX, Float::min);
        self.radius_max = self.values.iter().copied().fold(0.0, Float::max);

        (discontinuities.len() as Float + 1.0) / best_matching_units.len() as Float
    }

    /// Collects the snippets whose two best cells are at least 2 apart.
    fn topographic_discontinuities(
        &self,
        best_matching_units: &[CellIndex],
        next_best_matching_units: &[CellIndex],
    ) -> Vec<TopographicDiscontinuity> {
        let mut discontinuities = Vec::new();
        for (&cell1, &cell2) in best_matching_units
            .iter()
            .zip(next_best_matching_units.iter())
        {
            let distance = self.topology.cell_distance(cell1, cell2);
            if distance > 1 {
                discontinuities.push(TopographicDiscontinuity {
                    cell1,
                    cell2,
                    distance,
                });
            }
        }
        discontinuities
    }

    /// Smallest radius across all cells.
    #[inline]
    pub fn radius_min(&self) -> Float {
        self.radius_min
    }

    /// Largest radius across all cells.
    #[inline]
    pub fn radius_max(&self) -> Float {
        self.radius_max
    }

    /// The per-cell radii.
    #[inline]
    pub fn values(&self) -> &[Float] {
        &self.values
    }

    /// The radius every cell started from.
    #[inline]
    pub fn initial_radius(&self) -> CellIndex {
        self.initial_radius
    }

    /// Saves the radius field to its framed binary file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        info!("saving neighborhood to {}", path.as_ref().display());
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        io::write_u8(&mut writer, 0)?;
        io::write_u64(&mut writer, self.height as u64)?;
        io::write_u64(&mut writer, self.width as u64)?;
        io::write_f32_slice(&mut writer, &self.values)?;
        Ok(())
    }

    /// Loads a radius field saved by [`Self::save`].
    ///
    /// Topology and update exponent are not part of the file and must be
    /// supplied again by the caller.
    pub fn load<P: AsRef<Path>>(
        path: P,
        global_topology: GlobalTopology,
        local_topology: LocalTopology,
        update_exponent: Float,
    ) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let format = io::read_u8(&mut reader)?;
        if format != 0 {
            return Err(crate::SmapError::Format(format!(
                "stored neighborhood has unknown format {}",
                format
            )));
        }
        let height = io::read_u64(&mut reader)? as CellIndex;
        let width = io::read_u64(&mut reader)? as CellIndex;
        let num_cells = height as usize * width as usize;
        let values = io::read_f32_vec(&mut reader, num_cells)?;

        let topology = Topology::new(global_topology, local_topology, height, width)?;
        let radius_min = values.iter().copied().fold(Float::MAX, Float::min);
        let radius_max = values.iter().copied().fold(0.0, Float::max);
        Ok(Self {
            height,
            width,
            topology,
            update_exponent,
            initial_radius: radius_max.ceil() as CellIndex,
            radius_min,
            radius_max,
            values,
        })
    }
}

/// The radius lower bound one discontinuity imposes on a cell.
fn radius_from_discontinuity(
    topology: &Topology,
    cell: CellIndex,
    discontinuity: &TopographicDiscontinuity,
) -> CellIndex {
    let d1 = topology.cell_distance(cell, discontinuity.cell1);
    let d2 = topology.cell_distance(cell, discontinuity.cell2);
    if d1.max(d2) <= discontinuity.distance {
        discontinuity.distance
    } else if d1.min(d2) < discontinuity.distance {
        discontinuity.distance - d1.min(d2)
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect_plane(height: CellIndex, width: CellIndex, radius: CellIndex) -> Neighborhood {
        Neighborhood::new(
            height,
            width,
            GlobalTopology::Plane,
            LocalTopology::Rect,
            0.95,
            radius,
        )
        .unwrap()
    }

    #[test]
    fn test_influence_at_zero_distance_is_one_over_radius() {
        let neighborhood = rect_plane(4, 4, 2);
        let influence = neighborhood.influence(5, 5);
        assert!((influence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_influence_clipped_outside_radius() {
        let neighborhood = rect_plane(4, 4, 2);
        // Cells 0 and 2 are 2 apart, equal to the radius.
        assert_eq!(neighborhood.influence(0, 2), 0.0);
        assert_eq!(neighborhood.influence(0, 3), 0.0);
    }

    #[test]
    fn test_influence_decreases_with_distance() {
        let neighborhood = rect_plane(8, 8, 4);
        let at_zero = neighborhood.influence(0, 0);
        let at_one = neighborhood.influence(0, 1);
        let at_two = neighborhood.influence(0, 2);
        let at_three = neighborhood.influence(0, 3);
        assert!(at_zero > at_one);
        assert!(at_one > at_two);
        assert!(at_two > at_three);
        assert!(at_three > 0.0);
    }

    #[test]
    fn test_update_keeps_radii_above_discontinuity() {
        let mut neighborhood = rect_plane(4, 4, 2);
        // Two snippets tear between cell 0 = (0,0) and cell 3 = (0,3), 3 apart.
        let bmus = vec![0, 0];
        let next_bmus = vec![3, 3];

        let topographic_error = neighborhood.update(&bmus, &next_bmus, true);
        assert!((topographic_error - 1.5).abs() < 1e-6);

        assert!(neighborhood.values()[0] >= 3.0);
        assert!(neighborhood.values()[3] >= 3.0);
        for &value in neighborhood.values() {
            assert!(value >= 1.0);
        }
    }

    #[test]
    fn test_update_without_lower_bound_is_pure_shrink() {
        let mut neighborhood = rect_plane(4, 4, 2);
        let bmus = vec![0, 0];
        let next_bmus = vec![3, 3];

        neighborhood.update(&bmus, &next_bmus, false);
        let expected = 2.0f32.powf(0.95);
        for &value in neighborhood.values() {
            assert!((value - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_update_recomputes_radius_bounds() {
        let mut neighborhood = rect_plane(4, 4, 2);
        neighborhood.update(&[0, 0], &[3, 1], true);
        // One discontinuity of length 3; on a 4x4 plane every cell is within
        // reach of the tear, so the lower bound lifts all radii to 3.
        assert!((neighborhood.radius_max() - 3.0).abs() < 1e-6);
        assert!(neighborhood.radius_min() >= 1.0);
        assert!(neighborhood.radius_min() <= neighborhood.radius_max());
    }

    #[test]
    fn test_adjacent_next_bmu_is_not_a_discontinuity() {
        let mut neighborhood = rect_plane(4, 4, 2);
        // All BMU pairs are direct neighbors: no discontinuities.
        let topographic_error = neighborhood.update(&[0, 5, 10], &[1, 6, 11], true);
        assert!((topographic_error - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("neighborhood.bin");

        let mut neighborhood = rect_plane(3, 4, 5);
        neighborhood.update(&[0, 1], &[11, 2], true);
        neighborhood.save(&path).unwrap();

        let recovered = Neighborhood::load(
            &path,
            GlobalTopology::Plane,
            LocalTopology::Rect,
            0.95,
        )
        .unwrap();
        assert_eq!(recovered.values().len(), 12);
        for (a, b) in neighborhood.values().iter().zip(recovered.values()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        assert_eq!(recovered.radius_min(), neighborhood.radius_min());
        assert_eq!(recovered.radius_max(), neighborhood.radius_max());
    }
}
