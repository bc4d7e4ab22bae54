//! Regular cell grid over the box plus one halo layer.

use crate::error::GeometryError;
use nalgebra::Vector3;
use tracing::trace;

#[derive(Clone, Debug)]
pub struct CellBlock {
    box_min: Vector3<f64>,
    box_max: Vector3<f64>,
    halo_min: Vector3<f64>,
    halo_max: Vector3<f64>,
    interaction_length: f64,
    cell_size_factor: f64,
    /// Including the two halo layers.
    cells_per_dim: [usize; 3],
    cell_length: Vector3<f64>,
}

impl CellBlock {
    pub fn new(
        box_min: Vector3<f64>,
        box_max: Vector3<f64>,
        interaction_length: f64,
        cell_size_factor: f64,
    ) -> Result<Self, GeometryError> {
        if (0..3).any(|d| !(box_max[d] > box_min[d]) || !box_min[d].is_finite() || !box_max[d].is_finite()) {
            return Err(GeometryError::InvalidBox {
                min: box_min.into(),
                max: box_max.into(),
            });
        }
        if !(interaction_length > 0.0) || !interaction_length.is_finite() {
            return Err(GeometryError::InvalidInteractionLength(interaction_length));
        }
        if !(cell_size_factor > 0.0) || !cell_size_factor.is_finite() {
            return Err(GeometryError::InvalidCellSizeFactor(cell_size_factor));
        }

        let target = interaction_length * cell_size_factor;
        let mut cells_per_dim = [0usize; 3];
        let mut cell_length = Vector3::zeros();
        for d in 0..3 {
            let len = box_max[d] - box_min[d];
            let interior = ((len / target).floor() as usize).max(1);
            cells_per_dim[d] = interior + 2;
            cell_length[d] = len / interior as f64;
        }

        Ok(Self {
            box_min,
            box_max,
            halo_min: box_min - cell_length,
            halo_max: box_max + cell_length,
            interaction_length,
            cell_size_factor,
            cells_per_dim,
            cell_length,
        })
    }

    pub fn box_min(&self) -> &Vector3<f64> {
        &self.box_min
    }

    pub fn box_max(&self) -> &Vector3<f64> {
        &self.box_max
    }

    pub fn halo_min(&self) -> &Vector3<f64> {
        &self.halo_min
    }

    pub fn halo_max(&self) -> &Vector3<f64> {
        &self.halo_max
    }

    pub fn interaction_length(&self) -> f64 {
        self.interaction_length
    }

    pub fn cell_size_factor(&self) -> f64 {
        self.cell_size_factor
    }

    pub fn cells_per_dim(&self) -> [usize; 3] {
        self.cells_per_dim
    }

    pub fn cell_length(&self) -> &Vector3<f64> {
        &self.cell_length
    }

    pub fn num_cells(&self) -> usize {
        self.cells_per_dim.iter().product()
    }

    /// Grid coordinates of `pos`, clamped into the extended box.
    pub fn cell_coords_of(&self, pos: &Vector3<f64>) -> [usize; 3] {
        let mut coords = [0usize; 3];
        for d in 0..3 {
            let raw = ((pos[d] - self.halo_min[d]) / self.cell_length[d]).floor();
            let max = (self.cells_per_dim[d] - 1) as f64;
            // NaN fails both comparisons and lands in cell 0.
            let clamped = if raw >= 0.0 { raw.min(max) } else { 0.0 };
            if clamped != raw {
                trace!(dim = d, position = pos[d], "position clamped to boundary cell");
            }
            coords[d] = clamped as usize;
        }
        coords
    }

    pub fn cell_index_of(&self, pos: &Vector3<f64>) -> usize {
        self.three_to_one(self.cell_coords_of(pos))
    }

    #[inline]
    pub fn three_to_one(&self, c: [usize; 3]) -> usize {
        three_to_one(c, self.cells_per_dim)
    }

    #[inline]
    pub fn one_to_three(&self, idx: usize) -> [usize; 3] {
        one_to_three(idx, self.cells_per_dim)
    }

    pub fn is_halo_cell(&self, idx: usize) -> bool {
        let c = self.one_to_three(idx);
        (0..3).any(|d| c[d] == 0 || c[d] == self.cells_per_dim[d] - 1)
    }
}

/// x fastest, then y, then z.
#[inline]
pub fn three_to_one(c: [usize; 3], dims: [usize; 3]) -> usize {
    c[0] + dims[0] * (c[1] + dims[1] * c[2])
}

#[inline]
pub fn one_to_three(idx: usize, dims: [usize; 3]) -> [usize; 3] {
    let x = idx % dims[0];
    let y = (idx / dims[0]) % dims[1];
    let z = idx / (dims[0] * dims[1]);
    [x, y, z]
}
