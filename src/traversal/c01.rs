use super::CellFunctor;
use super::offsets::{c01_offsets, shifted};
use crate::cell::ParticleCell;
use crate::cell_block::{one_to_three, three_to_one};
use crate::functor::PairwiseFunctor;
use crate::soa::ForceScratch;
use rayon::prelude::*;
use tracing::debug_span;

/// Every interior cell against all 27 neighbours, writing only to itself.
///
/// Neighbour data is read from a snapshot taken before the parallel region,
/// so cells are independent. Requires newton3 to be disabled.
pub fn traverse_c01<F: PairwiseFunctor>(
    cells: &mut [ParticleCell],
    dims: [usize; 3],
    cf: &CellFunctor<'_, F>,
    parallel: bool,
) {
    let _span = debug_span!("traverse_c01", n_cells = cells.len()).entered();
    debug_assert!(!cf.newton3(), "C01 cannot apply newton3");

    let snapshot: Vec<ParticleCell> = cells.to_vec();
    let offsets = c01_offsets();

    let work = |(idx, cell): (usize, &mut ParticleCell)| {
        let c = one_to_three(idx, dims);
        if (0..3).any(|d| c[d] == 0 || c[d] == dims[d] - 1) {
            return;
        }
        let mut scratch = ForceScratch::default();
        for off in &offsets {
            let Some(n) = shifted(c, *off, dims) else {
                continue;
            };
            let other = three_to_one(n, dims);
            if other == idx {
                cf.process_cell(cell);
            } else {
                cf.process_cell_pair_one_way(cell, &snapshot[other], &mut scratch);
            }
        }
    };

    if parallel {
        cells.par_iter_mut().enumerate().for_each(work);
    } else {
        cells.iter_mut().enumerate().for_each(work);
    }
}
