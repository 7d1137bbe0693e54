//! Execution strategy for per-cell passes.
//!
//! Every pass over the grid is written as a kernel `f(I)` that only reads
//! its stencil neighbourhood from other buffers and writes its own slot.
//! The backend decides whether the kernel runs sequentially or fanned out
//! over the rayon pool; the kernel body is the same either way.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::grid::{Grid, Index, Region};
use crate::Real;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Serial,
    Threaded,
}

impl Backend {
    /// Runs `f(I, &mut out[I])` for every `I` in `region`. `out` is laid out on `grid`.
    pub fn for_each<const D: usize, T, F>(self, grid: &Grid<D>, region: &Region<D>, out: &mut [T], f: F)
    where
        T: Send,
        F: Fn(Index<D>, &mut T) + Sync + Send,
    {
        let kernel = |(k, v): (usize, &mut T)| {
            let index = grid.index_of(k);
            if region.contains(&index) {
                f(index, v);
            }
        };
        match self {
            Backend::Serial => region.iter().for_each(|index| f(index, &mut out[grid.offset(&index)])),
            Backend::Threaded => out.par_iter_mut().enumerate().for_each(kernel),
        }
    }

    /// Reduces `f(I)` over `region` with `+`.
    pub fn sum<const D: usize, T, F>(self, grid: &Grid<D>, region: &Region<D>, f: F) -> T
    where
        T: Real,
        F: Fn(Index<D>) -> T + Sync + Send,
    {
        match self {
            Backend::Serial => region.iter().fold(T::zero(), |s, index| s + f(index)),
            Backend::Threaded => (0..grid.len())
                .into_par_iter()
                .map(|k| grid.index_of(k))
                .filter(|index| region.contains(index))
                .map(&f)
                .reduce(T::zero, |a, b| a + b),
        }
    }

    /// Largest `f(I)` over `region`, or `floor` if every value is below it.
    pub fn max<const D: usize, T, F>(self, grid: &Grid<D>, region: &Region<D>, floor: T, f: F) -> T
    where
        T: Real,
        F: Fn(Index<D>) -> T + Sync + Send,
    {
        match self {
            Backend::Serial => region.iter().fold(floor, |m, index| m.max(f(index))),
            Backend::Threaded => (0..grid.len())
                .into_par_iter()
                .map(|k| grid.index_of(k))
                .filter(|index| region.contains(index))
                .map(&f)
                .reduce(|| floor, |a, b| a.max(b)),
        }
    }

    /// Evaluates `f(I)` over `region` and gathers the results in region order.
    pub fn map<const D: usize, R, F>(self, region: &Region<D>, f: F) -> Vec<(Index<D>, R)>
    where
        R: Send,
        F: Fn(Index<D>) -> R + Sync + Send,
    {
        let indices: Vec<Index<D>> = region.iter().collect();
        match self {
            Backend::Serial => indices.into_iter().map(|index| (index, f(index))).collect(),
            Backend::Threaded => indices.into_par_iter().map(|index| (index, f(index))).collect(),
        }
    }
}
