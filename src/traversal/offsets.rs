//! Cell-pair offset tables, computed once per grid shape.

use crate::cell_block::three_to_one;

/// The 14 cell pairs of a 2x2x2 block relative to its lowest corner.
///
/// Covers the self pair plus one representative of each of the 13
/// half-space directions, so every neighbouring cell pair is visited once
/// when the base cell runs over all but the last layer.
pub fn c08_pair_offsets(dims: [usize; 3]) -> [(usize, usize); 14] {
    let o = 0;
    let x = three_to_one([1, 0, 0], dims);
    let y = three_to_one([0, 1, 0], dims);
    let z = three_to_one([0, 0, 1], dims);
    let xy = three_to_one([1, 1, 0], dims);
    let yz = three_to_one([0, 1, 1], dims);
    let xz = three_to_one([1, 0, 1], dims);
    let xyz = three_to_one([1, 1, 1], dims);
    [
        (o, o),
        (o, y),
        (y, z),
        (o, z),
        (o, yz),
        (x, yz),
        (x, y),
        (x, z),
        (o, x),
        (o, xy),
        (xy, z),
        (y, xz),
        (o, xz),
        (o, xyz),
    ]
}

/// The 14 forward offsets (self included) of the C18 base step.
pub fn c18_forward_offsets() -> Vec<[i64; 3]> {
    let mut offsets = Vec::with_capacity(14);
    for dz in 0..=1i64 {
        for dy in -1..=1i64 {
            for dx in -1..=1i64 {
                let forward = dz > 0 || (dz == 0 && dy > 0) || (dz == 0 && dy == 0 && dx >= 0);
                if forward {
                    offsets.push([dx, dy, dz]);
                }
            }
        }
    }
    offsets
}

/// All 27 neighbour offsets (self included) of the C01 base step.
pub fn c01_offsets() -> Vec<[i64; 3]> {
    let mut offsets = Vec::with_capacity(27);
    for dz in -1..=1i64 {
        for dy in -1..=1i64 {
            for dx in -1..=1i64 {
                offsets.push([dx, dy, dz]);
            }
        }
    }
    offsets
}

/// Neighbour of `c` shifted by `off`, if it stays on the grid.
#[inline]
pub fn shifted(c: [usize; 3], off: [i64; 3], dims: [usize; 3]) -> Option<[usize; 3]> {
    let mut out = [0usize; 3];
    for d in 0..3 {
        let v = c[d] as i64 + off[d];
        if v < 0 || v >= dims[d] as i64 {
            return None;
        }
        out[d] = v as usize;
    }
    Some(out)
}
