//! Slab schedules along one axis of a grid.
//!
//! `traverse_sliced` runs C08 base steps over locked slabs of the longest
//! dimension. `for_each_layer_colored` is the two-colored variant used by the
//! list-based containers, whose base steps may write further ahead.

use super::colored::process_c08_base;
use super::offsets::c08_pair_offsets;
use super::{CellFunctor, strided_bases};
use crate::cell::ParticleCell;
use crate::functor::PairwiseFunctor;
use crate::shared::SharedSlice;
use rayon::prelude::*;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, debug_span};

/// Slab thicknesses for `layers` base layers split `num_slices` ways.
/// The last slab absorbs the remainder.
pub fn slice_thicknesses(layers: usize, num_slices: usize) -> Vec<usize> {
    let mut thickness = vec![layers / num_slices; num_slices];
    if let Some(last) = thickness.last_mut() {
        *last += layers % num_slices;
    }
    thickness
}

/// Slab thicknesses when at least two slabs of `min_thickness` layers fit,
/// using at most `requested` slabs. `None` means a serial sweep.
pub fn slab_plan(layers: usize, min_thickness: usize, requested: usize) -> Option<Vec<usize>> {
    let num_slices = requested.min(layers / min_thickness.max(1));
    (num_slices >= 2).then(|| slice_thicknesses(layers, num_slices))
}

fn slab_starts(thickness: &[usize]) -> Vec<usize> {
    thickness
        .iter()
        .scan(0, |acc, &t| {
            let s = *acc;
            *acc += t;
            Some(s)
        })
        .collect()
}

/// Index of the longest grid dimension, x on ties.
pub fn longest_dim(dims: [usize; 3]) -> usize {
    (0..3).fold(0, |best, d| if dims[d] > dims[best] { d } else { best })
}

/// Base cells of one C08 layer perpendicular to `axis`.
pub(crate) fn c08_layer_bases(dims: [usize; 3], axis: usize, layer: usize) -> Vec<usize> {
    let mut start = [0; 3];
    let mut end = [dims[0] - 1, dims[1] - 1, dims[2] - 1];
    start[axis] = layer;
    end[axis] = layer + 1;
    strided_bases(start, end, [1, 1, 1], dims)
}

fn lock(m: &Mutex<()>) -> MutexGuard<'_, ()> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Slabs share one boundary layer with their successor; the lock of that
/// boundary is held while a slab works on its first or last layer. Slabs
/// thinner than two layers are merged until a serial scan remains.
pub fn traverse_sliced<F: PairwiseFunctor>(
    cells: &mut [ParticleCell],
    dims: [usize; 3],
    cf: &CellFunctor<'_, F>,
    parallel: bool,
    requested_slices: usize,
) {
    let _span = debug_span!("traverse_sliced", n_cells = cells.len()).entered();
    let offsets = c08_pair_offsets(dims);
    let longest = longest_dim(dims);
    let layers = dims[longest] - 1;
    let shared = SharedSlice::new(cells);
    let step = |layer: usize| {
        for base in c08_layer_bases(dims, longest, layer) {
            unsafe { process_c08_base(shared, base, &offsets, cf) };
        }
    };

    let plan = if parallel { slab_plan(layers, 2, requested_slices) } else { None };
    let Some(thickness) = plan else {
        debug!(layers, requested_slices, "domain too thin to slice, scanning serially");
        (0..layers).for_each(step);
        return;
    };

    let num_slices = thickness.len();
    let starts = slab_starts(&thickness);
    let locks: Vec<Mutex<()>> = (0..num_slices - 1).map(|_| Mutex::new(())).collect();

    (0..num_slices).into_par_iter().for_each(|slice| {
        let t = thickness[slice];
        for local in 0..t {
            let _prev = (slice > 0 && local == 0).then(|| lock(&locks[slice - 1]));
            let _next = (slice + 1 < num_slices && local == t - 1).then(|| lock(&locks[slice]));
            // Interior layers of a slab are private to it; the two boundary
            // layers are serialised by the locks above.
            step(starts[slice] + local);
        }
    });
}

/// Runs `step` for every layer in `0..layers`, slab by slab: even slabs
/// concurrently, then odd slabs.
///
/// `step(l)` may touch layers `l..=l + reach`, so slabs are at least `reach`
/// layers thick and same-colored slabs never meet.
pub(crate) fn for_each_layer_colored<G>(
    layers: usize,
    reach: usize,
    parallel: bool,
    requested_slices: usize,
    step: G,
) where
    G: Fn(usize) + Sync,
{
    let plan = if parallel { slab_plan(layers, reach, requested_slices) } else { None };
    let Some(thickness) = plan else {
        debug!(layers, reach, "domain too thin to slice, scanning serially");
        (0..layers).for_each(step);
        return;
    };
    let starts = slab_starts(&thickness);
    for color in 0..2 {
        let slabs: Vec<usize> = (color..thickness.len()).step_by(2).collect();
        slabs.into_par_iter().for_each(|slice| {
            (starts[slice]..starts[slice] + thickness[slice]).for_each(&step);
        });
    }
}
