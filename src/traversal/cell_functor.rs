use crate::cell::ParticleCell;
use crate::functor::PairwiseFunctor;
use crate::options::DataLayoutOption;
use crate::soa::ForceScratch;

/// Applies a pairwise functor to whole cells in the selected layout.
pub struct CellFunctor<'f, F: PairwiseFunctor> {
    functor: &'f F,
    layout: DataLayoutOption,
    newton3: bool,
    /// Without newton3, also evaluate b -> a for cell pairs.
    bidirectional: bool,
}

impl<'f, F: PairwiseFunctor> CellFunctor<'f, F> {
    pub fn new(functor: &'f F, layout: DataLayoutOption, newton3: bool, bidirectional: bool) -> Self {
        Self {
            functor,
            layout,
            newton3,
            bidirectional,
        }
    }

    pub fn functor(&self) -> &'f F {
        self.functor
    }

    pub fn layout(&self) -> DataLayoutOption {
        self.layout
    }

    pub fn newton3(&self) -> bool {
        self.newton3
    }

    pub fn process_cell(&self, cell: &mut ParticleCell) {
        match self.layout {
            DataLayoutOption::Aos => {
                let ps = &mut cell.particles;
                for j in 1..ps.len() {
                    let (head, tail) = ps.split_at_mut(j);
                    let pj = &mut tail[0];
                    for pi in head.iter_mut() {
                        if self.newton3 {
                            self.functor.aos_pair(pi, pj, true);
                        } else {
                            self.functor.aos_pair(pi, pj, false);
                            self.functor.aos_pair(pj, pi, false);
                        }
                    }
                }
            }
            DataLayoutOption::Soa => self.functor.soa_single(cell.soa.view(), self.newton3),
        }
    }

    pub fn process_cell_pair(&self, a: &mut ParticleCell, b: &mut ParticleCell) {
        match self.layout {
            DataLayoutOption::Aos => {
                for pi in a.particles.iter_mut() {
                    for pj in b.particles.iter_mut() {
                        if self.newton3 {
                            self.functor.aos_pair(pi, pj, true);
                        } else {
                            self.functor.aos_pair(pi, pj, false);
                            if self.bidirectional {
                                self.functor.aos_pair(pj, pi, false);
                            }
                        }
                    }
                }
            }
            DataLayoutOption::Soa => {
                if self.newton3 {
                    self.functor.soa_pair(a.soa.view(), b.soa.view(), true);
                } else {
                    self.functor.soa_pair(a.soa.view(), b.soa.view(), false);
                    if self.bidirectional {
                        self.functor.soa_pair(b.soa.view(), a.soa.view(), false);
                    }
                }
            }
        }
    }

    /// Updates `a` only; `b` is read-only neighbour data.
    pub fn process_cell_pair_one_way(
        &self,
        a: &mut ParticleCell,
        b: &ParticleCell,
        scratch: &mut ForceScratch,
    ) {
        match self.layout {
            DataLayoutOption::Aos => {
                for pi in a.particles.iter_mut() {
                    for pj in b.particles.iter() {
                        let mut pj = *pj;
                        self.functor.aos_pair(pi, &mut pj, false);
                    }
                }
            }
            DataLayoutOption::Soa => {
                let other = b.soa.view_with_scratch(0..b.soa.len(), scratch);
                self.functor.soa_pair(a.soa.view(), other, false);
            }
        }
    }
}
