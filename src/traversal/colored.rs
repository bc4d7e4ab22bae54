//! Lock-free colored schedules: C08 (8 colors) and C18 (18 colors).

use super::offsets::{c08_pair_offsets, c18_forward_offsets, shifted};
use super::{CellFunctor, for_each_base, strided_bases};
use crate::cell::ParticleCell;
use crate::cell_block::{one_to_three, three_to_one};
use crate::functor::PairwiseFunctor;
use crate::shared::SharedSlice;
use tracing::debug_span;

/// Processes the 2x2x2 block whose lowest corner is `base`.
///
/// # Safety
/// No other worker may touch any cell of that block meanwhile.
pub(crate) unsafe fn process_c08_base<F: PairwiseFunctor>(
    cells: SharedSlice<'_, ParticleCell>,
    base: usize,
    offsets: &[(usize, usize); 14],
    cf: &CellFunctor<'_, F>,
) {
    for &(o1, o2) in offsets {
        let (c1, c2) = (base + o1, base + o2);
        if c1 == c2 {
            cf.process_cell(unsafe { cells.get_mut(c1) });
        } else {
            let (a, b) = unsafe { (cells.get_mut(c1), cells.get_mut(c2)) };
            cf.process_cell_pair(a, b);
        }
    }
}

pub fn traverse_c08<F: PairwiseFunctor>(
    cells: &mut [ParticleCell],
    dims: [usize; 3],
    cf: &CellFunctor<'_, F>,
    parallel: bool,
) {
    let _span = debug_span!("traverse_c08", n_cells = cells.len()).entered();
    let offsets = c08_pair_offsets(dims);
    let end = [dims[0] - 1, dims[1] - 1, dims[2] - 1];
    let shared = SharedSlice::new(cells);

    for color in 0..8 {
        let start = [color & 1, (color >> 1) & 1, (color >> 2) & 1];
        let bases = strided_bases(start, end, [2, 2, 2], dims);
        // Same-colored blocks are two cells apart in every dimension.
        for_each_base(&bases, parallel, |base| unsafe {
            process_c08_base(shared, base, &offsets, cf)
        });
    }
}

/// # Safety
/// No other worker may touch cells within x±1, y±1, z..=z+1 of `base`.
unsafe fn process_c18_base<F: PairwiseFunctor>(
    cells: SharedSlice<'_, ParticleCell>,
    base: usize,
    offsets: &[[i64; 3]],
    dims: [usize; 3],
    cf: &CellFunctor<'_, F>,
) {
    let c = one_to_three(base, dims);
    for off in offsets {
        let Some(n) = shifted(c, *off, dims) else {
            continue;
        };
        let other = three_to_one(n, dims);
        if other == base {
            cf.process_cell(unsafe { cells.get_mut(base) });
        } else {
            let (a, b) = unsafe { (cells.get_mut(base), cells.get_mut(other)) };
            cf.process_cell_pair(a, b);
        }
    }
}

pub fn traverse_c18<F: PairwiseFunctor>(
    cells: &mut [ParticleCell],
    dims: [usize; 3],
    cf: &CellFunctor<'_, F>,
    parallel: bool,
) {
    let _span = debug_span!("traverse_c18", n_cells = cells.len()).entered();
    let offsets = c18_forward_offsets();
    let shared = SharedSlice::new(cells);

    for color in 0..18 {
        let start = [color % 3, (color / 3) % 3, color / 9];
        let bases = strided_bases(start, dims, [3, 3, 2], dims);
        for_each_base(&bases, parallel, |base| unsafe {
            process_c18_base(shared, base, &offsets, dims, cf)
        });
    }
}
