//! Grid topologies and integer cell-to-cell distance functions.
//!
//! A map topology is the combination of a global wrap rule (plane, torus) and
//! a local neighbor shape (circular, hexagonal, rectangular). The distance
//! between two cells is always a small non-negative integer and satisfies the
//! usual metric axioms, so it can drive both the neighborhood kernel and the
//! topographic error metrics.

use crate::error::{Result, SmapError};
use crate::CellIndex;
use serde::{Deserialize, Serialize};

/// Global wrap rule of the rectangular grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlobalTopology {
    /// East/west and north/south edges connected.
    Torus,
    /// East/west edges connected with one twist.
    Moebius,
    /// East/west edges connected.
    Tube,
    /// No wrapping.
    Plane,
}

impl GlobalTopology {
    /// Parses the numeric code used on the command line and in run logs.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Torus),
            1 => Some(Self::Moebius),
            2 => Some(Self::Tube),
            4 => Some(Self::Plane),
            _ => None,
        }
    }

    /// The numeric code of this topology.
    pub fn code(self) -> u8 {
        match self {
            Self::Torus => 0,
            Self::Moebius => 1,
            Self::Tube => 2,
            Self::Plane => 4,
        }
    }

    /// Human-readable description for run summaries.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Torus => "torus (connecting east/west and north/south)",
            Self::Moebius => "moebius (connecting east/west with one twist)",
            Self::Tube => "tube (connecting east/west)",
            Self::Plane => "plane",
        }
    }
}

/// Local neighbor shape determining the distance metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalTopology {
    /// Ceil-Euclidean distance, 4 direct neighbors.
    Circ,
    /// Hexagonal lattice distance, 6 neighbors.
    Hexa,
    /// Chebyshev distance, 8 neighbors.
    Rect,
}

impl LocalTopology {
    /// Parses the numeric code (the number of neighbors) used on the command line.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            4 => Some(Self::Circ),
            6 => Some(Self::Hexa),
            8 => Some(Self::Rect),
            _ => None,
        }
    }

    /// The numeric code of this topology.
    pub fn code(self) -> u8 {
        match self {
            Self::Circ => 4,
            Self::Hexa => 6,
            Self::Rect => 8,
        }
    }

    /// Human-readable description for run summaries.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Circ => "circular (4 neighbours)",
            Self::Hexa => "hexagonal (6 neighbours)",
            Self::Rect => "rectangular (8 neighbours)",
        }
    }
}

/// One of the six supported (global x local) distance functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceKind {
    /// Ceil-Euclidean on the plane.
    CircPlane,
    /// Ceil-Euclidean with coordinate wrapping.
    CircTorus,
    /// Pointy-top hexagonal lattice on the plane.
    HexaPlane,
    /// Hexagonal lattice under the nearest-image rule.
    HexaTorus,
    /// Chebyshev on the plane.
    RectPlane,
    /// Chebyshev with coordinate wrapping.
    RectTorus,
}

impl DistanceKind {
    /// Resolves a (global, local) pair to its distance function.
    ///
    /// Moebius and tube grids have no distance function yet and are rejected.
    pub fn resolve(global: GlobalTopology, local: LocalTopology) -> Result<Self> {
        match (global, local) {
            (GlobalTopology::Plane, LocalTopology::Circ) => Ok(Self::CircPlane),
            (GlobalTopology::Plane, LocalTopology::Hexa) => Ok(Self::HexaPlane),
            (GlobalTopology::Plane, LocalTopology::Rect) => Ok(Self::RectPlane),
            (GlobalTopology::Torus, LocalTopology::Circ) => Ok(Self::CircTorus),
            (GlobalTopology::Torus, LocalTopology::Hexa) => Ok(Self::HexaTorus),
            (GlobalTopology::Torus, LocalTopology::Rect) => Ok(Self::RectTorus),
            _ => Err(SmapError::Validation(
                "invalid topology specification".to_string(),
            )),
        }
    }
}

/// Integer distance between cells `(y1, x1)` and `(y2, x2)` on a
/// `height` x `width` grid under the given distance function.
///
/// Plane variants ignore `height` and `width`; coordinates outside the grid
/// are allowed there and measured as-is.
pub fn grid_distance(
    kind: DistanceKind,
    y1: i32,
    x1: i32,
    y2: i32,
    x2: i32,
    height: i32,
    width: i32,
) -> CellIndex {
    match kind {
        DistanceKind::CircPlane => dist_circ_plane(y1, x1, y2, x2),
        DistanceKind::CircTorus => dist_circ_torus(y1, x1, y2, x2, height, width),
        DistanceKind::HexaPlane => dist_hexa_plane(y1, x1, y2, x2),
        DistanceKind::HexaTorus => dist_hexa_torus(y1, x1, y2, x2, height, width),
        DistanceKind::RectPlane => dist_rect_plane(y1, x1, y2, x2),
        DistanceKind::RectTorus => dist_rect_torus(y1, x1, y2, x2, height, width),
    }
}

#[inline]
fn dist_circ_plane(y1: i32, x1: i32, y2: i32, x2: i32) -> CellIndex {
    let dy = (y2 - y1).abs() as f64;
    let dx = (x2 - x1).abs() as f64;
    (dy * dy + dx * dx).sqrt().ceil() as CellIndex
}

#[inline]
fn dist_circ_torus(y1: i32, x1: i32, y2: i32, x2: i32, height: i32, width: i32) -> CellIndex {
    let dy = (y2 - y1).abs();
    let dx = (x2 - x1).abs();
    let dy = dy.min(height - dy) as f64;
    let dx = dx.min(width - dx) as f64;
    (dy * dy + dx * dx).sqrt().ceil() as CellIndex
}

// Pointy-top hexagonal lattice with odd rows shifted right by half a cell.
// Axial-coordinate distance per https://www.redblobgames.com/grids/hexagons/
#[inline]
fn dist_hexa_plane(row1: i32, col1: i32, row2: i32, col2: i32) -> CellIndex {
    let offset1 = (row1 - (row1 & 1)) / 2;
    let offset2 = (row2 - (row2 & 1)) / 2;
    let a = (row1 - row2).abs();
    let b = (col1 - col2 - offset1 + offset2).abs();
    let c = (col1 - col2 + row1 - row2 - offset1 + offset2).abs();
    a.max(b).max(c) as CellIndex
}

// Nearest-image principle: the planar hex distance against shifted replicas.
#[inline]
fn dist_hexa_torus(row1: i32, col1: i32, row2: i32, col2: i32, height: i32, width: i32) -> CellIndex {
    let candidates = [
        dist_hexa_plane(row1, col1, row2, col2),
        dist_hexa_plane(row1, col1, row2 + height, col2),
        dist_hexa_plane(row1, col1, row2, col2 + width),
        dist_hexa_plane(row1, col1, row2 + height, col2 + width),
        dist_hexa_plane(row1 + height, col1, row2, col2),
        dist_hexa_plane(row1, col1 + width, row2, col2),
        dist_hexa_plane(row1 + height, col1 + width, row2, col2),
    ];
    let mut best = candidates[0];
    for &candidate in &candidates[1..] {
        best = best.min(candidate);
    }
    best
}

#[inline]
fn dist_rect_plane(y1: i32, x1: i32, y2: i32, x2: i32) -> CellIndex {
    (y2 - y1).abs().max((x2 - x1).abs()) as CellIndex
}

#[inline]
fn dist_rect_torus(y1: i32, x1: i32, y2: i32, x2: i32, height: i32, width: i32) -> CellIndex {
    let dy = (y2 - y1).abs();
    let dx = (x2 - x1).abs();
    dy.min(height - dy).max(dx.min(width - dx)) as CellIndex
}

/// A validated map topology bound to concrete grid dimensions.
#[derive(Debug, Clone, Copy)]
pub struct Topology {
    kind: DistanceKind,
    height: CellIndex,
    width: CellIndex,
}

impl Topology {
    /// Creates a topology for a `height` x `width` grid.
    ///
    /// Fails for unsupported wrap rules and for hexagonal grids with an odd
    /// number of rows (the half-cell shift would break the wrap seam).
    pub fn new(
        global: GlobalTopology,
        local: LocalTopology,
        height: CellIndex,
        width: CellIndex,
    ) -> Result<Self> {
        let kind = DistanceKind::resolve(global, local)?;
        if local == LocalTopology::Hexa && height & 1 == 1 {
            return Err(SmapError::Validation(
                "for a hexagonal grid the number of rows has to be even".to_string(),
            ));
        }
        if height as usize * width as usize > CellIndex::MAX as usize {
            return Err(SmapError::Validation(format!(
                "a {} x {} map exceeds the {}-cell limit",
                height,
                width,
                CellIndex::MAX
            )));
        }
        Ok(Self {
            kind,
            height,
            width,
        })
    }

    /// Distance between two cells addressed by (row, column).
    #[inline]
    pub fn distance(&self, y1: CellIndex, x1: CellIndex, y2: CellIndex, x2: CellIndex) -> CellIndex {
        grid_distance(
            self.kind,
            y1 as i32,
            x1 as i32,
            y2 as i32,
            x2 as i32,
            self.height as i32,
            self.width as i32,
        )
    }

    /// Distance between two cells addressed by flat index.
    #[inline]
    pub fn cell_distance(&self, cell1: CellIndex, cell2: CellIndex) -> CellIndex {
        let width = self.width;
        self.distance(cell1 / width, cell1 % width, cell2 / width, cell2 % width)
    }

    /// Map height in cells.
    pub fn height(&self) -> CellIndex {
        self.height
    }

    /// Map width in cells.
    pub fn width(&self) -> CellIndex {
        self.width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_KINDS: [DistanceKind; 6] = [
        DistanceKind::CircPlane,
        DistanceKind::CircTorus,
        DistanceKind::HexaPlane,
        DistanceKind::HexaTorus,
        DistanceKind::RectPlane,
        DistanceKind::RectTorus,
    ];

    #[test]
    fn test_identity_of_indiscernibles() {
        for kind in ALL_KINDS {
            for y in [0, 2, 4] {
                for x in [0, 2, 4] {
                    assert_eq!(grid_distance(kind, y, x, y, x, 5, 4), 0);
                }
            }
        }
    }

    #[test]
    fn test_symmetry() {
        let points = [0, 2, 4];
        for kind in ALL_KINDS {
            for y1 in points {
                for x1 in points {
                    for y2 in points {
                        for x2 in points {
                            assert_eq!(
                                grid_distance(kind, y1, x1, y2, x2, 5, 5),
                                grid_distance(kind, y2, x2, y1, x1, 5, 5),
                                "asymmetric for {:?}",
                                kind
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_triangle_inequality() {
        let points: Vec<(i32, i32)> = [0, 2, 3]
            .iter()
            .flat_map(|&y| [0, 2, 3].iter().map(move |&x| (y, x)))
            .collect();
        for kind in ALL_KINDS {
            for &(y1, x1) in &points {
                for &(y2, x2) in &points {
                    for &(y3, x3) in &points {
                        let direct = grid_distance(kind, y1, x1, y3, x3, 4, 4);
                        let via = grid_distance(kind, y1, x1, y2, x2, 4, 4)
                            + grid_distance(kind, y2, x2, y3, x3, 4, 4);
                        assert!(direct <= via, "triangle violated for {:?}", kind);
                    }
                }
            }
        }
    }

    #[test]
    fn test_hexa_adjacency_even_row() {
        for kind in [DistanceKind::HexaPlane, DistanceKind::HexaTorus] {
            // The six neighbors of (2, 2), an even row.
            for (y, x) in [(1, 1), (1, 2), (2, 1), (2, 3), (3, 1), (3, 2)] {
                assert_eq!(grid_distance(kind, 2, 2, y, x, 10, 10), 1);
            }
        }
    }

    #[test]
    fn test_hexa_adjacency_odd_row() {
        for kind in [DistanceKind::HexaPlane, DistanceKind::HexaTorus] {
            // The six neighbors of (3, 2), an odd row shifted half a cell.
            for (y, x) in [(2, 2), (2, 3), (3, 1), (3, 3), (4, 2), (4, 3)] {
                assert_eq!(grid_distance(kind, 3, 2, y, x, 10, 10), 1);
            }
        }
    }

    #[test]
    fn test_hexa_plane_calibration() {
        let kind = DistanceKind::HexaPlane;
        assert_eq!(grid_distance(kind, 0, 0, 10, 0, 0, 0), 10);
        assert_eq!(grid_distance(kind, 0, 0, 0, 10, 0, 0), 10);
        assert_eq!(grid_distance(kind, 0, 0, 10, 10, 0, 0), 15);
    }

    #[test]
    fn test_hexa_torus_wraps_to_one() {
        let kind = DistanceKind::HexaTorus;
        assert_eq!(grid_distance(kind, 0, 0, 9, 0, 10, 10), 1);
        assert_eq!(grid_distance(kind, 0, 0, 0, 9, 10, 10), 1);
        assert_eq!(grid_distance(kind, 0, 0, 9, 9, 10, 10), 1);
    }

    #[test]
    fn test_rect_torus_wraps() {
        let kind = DistanceKind::RectTorus;
        assert_eq!(grid_distance(kind, 0, 0, 9, 9, 10, 10), 1);
        assert_eq!(grid_distance(kind, 0, 0, 5, 5, 10, 10), 5);
    }

    #[test]
    fn test_circ_plane_is_ceil_euclidean() {
        let kind = DistanceKind::CircPlane;
        assert_eq!(grid_distance(kind, 0, 0, 3, 4, 10, 10), 5);
        assert_eq!(grid_distance(kind, 0, 0, 1, 1, 10, 10), 2);
    }

    #[test]
    fn test_hexa_rejects_odd_height() {
        let result = Topology::new(GlobalTopology::Plane, LocalTopology::Hexa, 5, 4);
        assert!(matches!(result, Err(crate::SmapError::Validation(_))));
    }

    #[test]
    fn test_moebius_and_tube_are_rejected() {
        for global in [GlobalTopology::Moebius, GlobalTopology::Tube] {
            let result = Topology::new(global, LocalTopology::Rect, 4, 4);
            assert!(matches!(result, Err(crate::SmapError::Validation(_))));
        }
    }

    #[test]
    fn test_topology_codes_roundtrip() {
        for global in [
            GlobalTopology::Torus,
            GlobalTopology::Moebius,
            GlobalTopology::Tube,
            GlobalTopology::Plane,
        ] {
            assert_eq!(GlobalTopology::from_code(global.code()), Some(global));
        }
        for local in [LocalTopology::Circ, LocalTopology::Hexa, LocalTopology::Rect] {
            assert_eq!(LocalTopology::from_code(local.code()), Some(local));
        }
        assert_eq!(GlobalTopology::from_code(3), None);
        assert_eq!(LocalTopology::from_code(5), None);
    }

    #[test]
    fn test_cell_distance_uses_row_major_layout() {
        let topology = Topology::new(GlobalTopology::Plane, LocalTopology::Rect, 4, 4).unwrap();
        // Cell 0 is (0, 0) and cell 15 is (3, 3).
        assert_eq!(topology.cell_distance(0, 15), 3);
        assert_eq!(topology.cell_distance(0, 3), 3);
        assert_eq!(topology.cell_distance(5, 5), 0);
    }
}
