#![allow(dead_code)]

use ndarray as nd;
use rand::{ SeedableRng, rngs::StdRng };
use mparray::{ Entry, MPArray, tensor, tools };

pub const TOL: f64 = 1e-10;

/// (sites, local dimension, bond dimension)
pub const GRID: [(usize, usize, usize); 3] = [(6, 2, 4), (4, 3, 5), (5, 2, 1)];

pub fn rng() -> StdRng { StdRng::seed_from_u64(10546) }

fn is_identity<A: Entry>(m: &nd::Array2<A>) -> bool {
    let eye = nd::Array2::<A>::eye(m.nrows());
    m.nrows() == m.ncols()
        && m.iter().zip(eye.iter()).all(|(x, y)| (*x - *y).abs() < 1e-8)
}

pub fn is_left_normalized<A: Entry>(t: &nd::ArrayD<A>) -> bool {
    let m = tensor::left_matrix(t).unwrap();
    is_identity(&m.t().mapv(|x| x.conj()).dot(&m))
}

pub fn is_right_normalized<A: Entry>(t: &nd::ArrayD<A>) -> bool {
    let m = tensor::right_matrix(t).unwrap();
    is_identity(&m.dot(&m.t().mapv(|x| x.conj())))
}

/// Assert that every site recorded as canonical actually is.
pub fn check_normal_form<A: Entry>(mpa: &MPArray<A>) {
    let (lnormal, rnormal) = mpa.normal_form();
    for k in 0..lnormal {
        assert!(is_left_normalized(&mpa[k]), "site {k} not left-normalized");
    }
    for k in rnormal..mpa.len() {
        assert!(is_right_normalized(&mpa[k]), "site {k} not right-normalized");
    }
}

/// Dense matrix of an operator MPA: all row legs, then all column legs.
pub fn to_matrix<A: Entry>(mpo: &MPArray<A>) -> nd::Array2<A> {
    let arr = mpo.to_array().unwrap();
    let glob = tools::local_to_global(&arr, mpo.len()).unwrap();
    let dim: usize = mpo.pdims().iter().map(|legs| legs[0]).product();
    tensor::reshape(&glob, (dim, dim)).unwrap()
}

/// Contract leg `ax_a` of every site of dense `a` (in local order, `pa` legs
/// per site) with leg `ax_b` of dense `b`, returning the result in local
/// order.
pub fn dense_dot<A: Entry>(
    a: &nd::ArrayD<A>,
    b: &nd::ArrayD<A>,
    sites: usize,
    (pa, pb): (usize, usize),
    (ax_a, ax_b): (usize, usize),
) -> nd::ArrayD<A>
{
    let axes_a: Vec<usize> = (0..sites).map(|s| s * pa + ax_a).collect();
    let axes_b: Vec<usize> = (0..sites).map(|s| s * pb + ax_b).collect();
    let c = tensor::tensordot(a, b, &axes_a, &axes_b).unwrap();
    let (fa, fb) = (pa - 1, pb - 1);
    let na = sites * fa;
    let perm: Vec<usize>
        = (0..sites)
        .flat_map(|s| {
            (0..fa).map(move |j| s * fa + j)
                .chain((0..fb).map(move |j| na + s * fb + j))
        })
        .collect();
    c.permuted_axes(perm).as_standard_layout().into_owned()
}

pub fn frobenius<A: Entry>(a: &nd::ArrayD<A>) -> f64 {
    a.iter().map(|x| x.square()).sum::<f64>().sqrt()
}

// Same expansion as `ndarray_linalg::assert_close_l2!`, whose `$crate::$close`
// form is rejected by current rustc.
macro_rules! assert_close_l2 {
    ($test: expr, $truth: expr, $tol: expr) => {
        ::ndarray_linalg::close_l2($test, $truth, $tol);
    };
    ($test: expr, $truth: expr, $tol: expr; $comment: expr) => {
        eprintln!($comment);
        ::ndarray_linalg::close_l2($test, $truth, $tol);
    };
}
pub(crate) use assert_close_l2;
