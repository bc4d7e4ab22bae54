//! Schedules that walk a cell grid and hand cell pairs to a [`CellFunctor`].

pub mod c01;
pub mod cell_functor;
pub mod colored;
pub mod offsets;
pub mod sliced;

pub use cell_functor::CellFunctor;

use crate::cell::ParticleCell;
use crate::cell_block::three_to_one;
use crate::functor::PairwiseFunctor;
use crate::options::TraversalOption;
use rayon::prelude::*;

/// Runs one of the cell-grid traversals over `cells`.
///
/// `traversal` must be one of C01, C08, C18 or Sliced; callers validate the
/// configuration beforehand.
pub fn traverse_cell_grid<F: PairwiseFunctor>(
    traversal: TraversalOption,
    cells: &mut [ParticleCell],
    dims: [usize; 3],
    cf: &CellFunctor<'_, F>,
    parallel: bool,
) {
    debug_assert_eq!(cells.len(), dims.iter().product::<usize>());
    match traversal {
        TraversalOption::C01 => c01::traverse_c01(cells, dims, cf, parallel),
        TraversalOption::C18 => colored::traverse_c18(cells, dims, cf, parallel),
        TraversalOption::Sliced => {
            sliced::traverse_sliced(cells, dims, cf, parallel, crate::config::get_slice_count())
        }
        _ => colored::traverse_c08(cells, dims, cf, parallel),
    }
}

/// Linear indices of the base cells `start + k * stride` below `end`.
pub(crate) fn strided_bases(
    start: [usize; 3],
    end: [usize; 3],
    stride: [usize; 3],
    dims: [usize; 3],
) -> Vec<usize> {
    let mut bases = Vec::new();
    for z in (start[2]..end[2]).step_by(stride[2]) {
        for y in (start[1]..end[1]).step_by(stride[1]) {
            for x in (start[0]..end[0]).step_by(stride[0]) {
                bases.push(three_to_one([x, y, z], dims));
            }
        }
    }
    bases
}

pub(crate) fn for_each_base<G>(bases: &[usize], parallel: bool, g: G)
where
    G: Fn(usize) + Sync + Send,
{
    if parallel {
        bases.par_iter().for_each(|&b| g(b));
    } else {
        bases.iter().for_each(|&b| g(b));
    }
}
