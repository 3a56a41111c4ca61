//! Helpers for dense arrays in the two common axis orders.
//!
//! MPAs order the axes of the arrays they represent *locally*, site by site:
//! `[i(0,0), i(0,1), i(1,0), i(1,1), ...]` for two legs per site. Kronecker
//! products and the usual matrix view of an operator instead use the *global*
//! order, all first legs before all second legs:
//! `[i(0,0), i(1,0), ..., i(0,1), i(1,1), ...]`.

use ndarray as nd;
use crate::{
    Entry,
    tensor::{ self, TensorError, TensorResult },
};

/// Kronecker product of arrays that all have the same number of axes.
///
/// Axis `k` of the result has dimension `Π_j arrays[j].shape()[k]`.
pub fn mkron<A>(arrays: &[nd::ArrayD<A>]) -> TensorResult<nd::ArrayD<A>>
where A: Entry
{
    let (first, rest) = arrays.split_first().ok_or(TensorError::IncompatibleAxes)?;
    let mut acc = first.clone();
    for a in rest {
        let ndim = acc.ndim();
        if a.ndim() != ndim { return Err(TensorError::IncompatibleAxes); }
        let outer = tensor::tensordot(&acc, a, &[], &[])?;
        let perm: Vec<usize> = (0..ndim).flat_map(|k| [k, k + ndim]).collect();
        let shape: Vec<usize>
            = acc.shape().iter().zip(a.shape()).map(|(m, n)| m * n).collect();
        acc = tensor::reshape(&outer.permuted_axes(perm), shape)?;
    }
    Ok(acc)
}

fn check_sites(ndim: usize, sites: usize) -> TensorResult<usize> {
    if sites == 0 || ndim % sites != 0 {
        Err(TensorError::IndivisibleAxes { ndim, sites })
    } else {
        Ok(ndim / sites)
    }
}

/// Reorder the axes of `array` from global to local order.
pub fn global_to_local<A>(array: &nd::ArrayD<A>, sites: usize)
    -> TensorResult<nd::ArrayD<A>>
where A: Clone
{
    let plegs = check_sites(array.ndim(), sites)?;
    let perm: Vec<usize>
        = (0..sites)
        .flat_map(|site| (0..plegs).map(move |leg| leg * sites + site))
        .collect();
    Ok(array.view().permuted_axes(perm).as_standard_layout().into_owned())
}

/// Reorder the axes of `array` from local to global order.
pub fn local_to_global<A>(array: &nd::ArrayD<A>, sites: usize)
    -> TensorResult<nd::ArrayD<A>>
where A: Clone
{
    let plegs = check_sites(array.ndim(), sites)?;
    let perm: Vec<usize>
        = (0..plegs)
        .flat_map(|leg| (0..sites).map(move |site| site * plegs + leg))
        .collect();
    Ok(array.view().permuted_axes(perm).as_standard_layout().into_owned())
}

/// Trace out the sites `traceout` of a dense operator in global order
/// (`[rows..., cols...]`), returning the reduced operator in global order.
pub fn partial_trace<A>(op: &nd::ArrayD<A>, traceout: &[usize])
    -> TensorResult<nd::ArrayD<A>>
where A: Entry
{
    let sites = check_sites(op.ndim(), 2)?;
    let mut targets: Vec<usize> = traceout.to_vec();
    targets.sort_unstable();
    targets.dedup();
    if targets.last().is_some_and(|&s| s >= sites) {
        return Err(TensorError::IncompatibleAxes);
    }
    let mut reduced = op.clone();
    let mut remaining = sites;
    for &site in targets.iter().rev() {
        reduced = tensor::trace_axes(&reduced, site, site + remaining)?;
        remaining -= 1;
    }
    Ok(reduced)
}
