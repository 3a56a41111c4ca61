mod common;

use std::iter::repeat;
use ndarray as nd;
use num_complex::Complex64 as C64;
use ::mparray::*;
use common::*;

#[test]
fn from_array_round_trip() {
    let mut rng = rng();
    for (sites, ldim, _) in GRID {
        let op: nd::ArrayD<f64> = factory::random_op(sites, ldim, &mut rng);
        let mpo = MPArray::from_array(&op, 2).unwrap();
        assert_eq!(mpo.len(), sites);
        assert_eq!(mpo.plegs(), 2);
        assert_eq!(mpo.normal_form(), (sites - 1, sites));
        check_normal_form(&mpo);
        assert_close_l2!(&mpo.to_array().unwrap(), &op, TOL);

        let psi: nd::ArrayD<C64> = factory::random_vec(sites, ldim, &mut rng);
        let mps = MPArray::from_array(&psi, 1).unwrap();
        assert_eq!(mps.pdims(), vec![vec![ldim]; sites]);
        check_normal_form(&mps);
        assert_close_l2!(&mps.to_array().unwrap(), &psi, TOL);
    }
}

#[test]
fn from_array_rejects_bad_shapes() {
    let arr: nd::ArrayD<f64> = nd::ArrayD::zeros(vec![2, 2, 2]);
    assert!(matches!(
        MPArray::from_array(&arr, 2), Err(MPAError::IncompatibleShape)));
    let scalar: nd::ArrayD<f64> = nd::ArrayD::zeros(vec![]);
    assert!(matches!(
        MPArray::from_array(&scalar, 1), Err(MPAError::EmptySystem)));
}

#[test]
fn from_kron_is_outer_product() {
    let factors: Vec<nd::ArrayD<f64>>
        = (0..3)
        .map(|k| nd::Array1::range(1.0, 3.0 + k as f64, 1.0).into_dyn())
        .collect();
    let mpa = MPArray::from_kron(factors.clone()).unwrap();
    assert_eq!(mpa.bdims(), vec![1, 1]);
    assert_eq!(mpa.normal_form(), (0, 3));
    let flat = tensor::reshape(&mpa.to_array().unwrap(), vec![2 * 3 * 4]).unwrap();
    assert_close_l2!(&flat, &tools::mkron(&factors).unwrap(), TOL);
}

#[test]
fn dot_matches_dense() {
    let mut rng = rng();
    for (sites, ldim, bdim) in GRID {
        let a: MPArray<C64>
            = factory::random_mpa(sites, &[ldim, ldim], bdim, &mut rng).unwrap();
        let b: MPArray<C64>
            = factory::random_mpa(sites, &[ldim, ldim], bdim, &mut rng).unwrap();
        let (da, db) = (a.to_array().unwrap(), b.to_array().unwrap());

        let ab = dot(&a, &b, None).unwrap();
        assert_eq!(ab.bdims(), vec![bdim * bdim; sites - 1]);
        assert_eq!(ab.normal_form(), (0, sites));
        let truth = dense_dot(&da, &db, sites, (2, 2), (1, 0));
        assert_close_l2!(&ab.to_array().unwrap(), &truth, TOL);

        let ba = dot(&a, &b, Some((0, -1))).unwrap();
        let truth = dense_dot(&da, &db, sites, (2, 2), (0, 1));
        assert_close_l2!(&ba.to_array().unwrap(), &truth, TOL);
    }
}

#[test]
fn dot_operator_on_vector() {
    let mut rng = rng();
    let mpo: MPArray<f64> = factory::random_mpa(4, &[3, 2], 3, &mut rng).unwrap();
    let mps: MPArray<f64> = factory::random_mpa(4, &[2], 2, &mut rng).unwrap();
    let res = dot(&mpo, &mps, None).unwrap();
    assert_eq!(res.pdims(), vec![vec![3]; 4]);
    let truth = dense_dot(
        &mpo.to_array().unwrap(), &mps.to_array().unwrap(), 4, (2, 1), (1, 0));
    assert_close_l2!(&res.to_array().unwrap(), &truth, TOL);

    assert!(matches!(
        dot(&mpo, &mps, Some((0, 0))), Err(MPAError::LegMismatch { site: 0 })));
    assert!(matches!(
        dot(&mpo, &mps, Some((2, 0))), Err(MPAError::InvalidAxis(2))));
}

#[test]
fn partialdot_pads_with_identity() {
    let mut rng = rng();
    let long: MPArray<f64> = factory::random_mpa(4, &[2, 2], 3, &mut rng).unwrap();
    let short: MPArray<f64> = factory::random_mpa(2, &[2, 2], 2, &mut rng).unwrap();
    let eye2 = nd::Array2::<f64>::eye(2).into_dyn();
    let pad = tools::mkron(&[eye2.clone(), to_matrix(&short).into_dyn(), eye2])
        .unwrap()
        .into_dimensionality::<nd::Ix2>()
        .unwrap();
    let m_long = to_matrix(&long);

    let res = partialdot(&long, &short, 1, None).unwrap();
    assert_eq!(res.len(), 4);
    assert_close_l2!(&to_matrix(&res), &m_long.dot(&pad), TOL);

    let res = partialdot(&short, &long, 1, None).unwrap();
    assert_close_l2!(&to_matrix(&res), &pad.dot(&m_long), TOL);

    assert!(matches!(
        partialdot(&long, &short, 3, None),
        Err(MPAError::InvalidPosition { pos: 3, len: 4 })
    ));
}

#[test]
fn inner_matches_dense() {
    let mut rng = rng();
    for (sites, ldim, bdim) in GRID {
        for legs in [vec![ldim], vec![ldim, ldim]] {
            let a: MPArray<C64>
                = factory::random_mpa(sites, &legs, bdim, &mut rng).unwrap();
            let b: MPArray<C64>
                = factory::random_mpa(sites, &legs, bdim, &mut rng).unwrap();
            let (da, db) = (a.to_array().unwrap(), b.to_array().unwrap());
            let truth: C64
                = da.iter().zip(db.iter()).map(|(x, y)| x.conj() * y).sum();
            let res = inner(&a, &b).unwrap();
            let scale = frobenius(&da) * frobenius(&db);
            assert!((res - truth).norm() <= 1e-10 * scale);
        }
    }
}

#[test]
fn norm_and_normdist() {
    let mut rng = rng();
    for (sites, ldim, bdim) in GRID {
        let a: MPArray<f64>
            = factory::random_mpa(sites, &[ldim, ldim], bdim, &mut rng).unwrap();
        let b: MPArray<f64>
            = factory::random_mpa(sites, &[ldim, ldim], bdim, &mut rng).unwrap();
        let (da, db) = (a.to_array().unwrap(), b.to_array().unwrap());
        let na = frobenius(&da);
        assert!((norm(&a).unwrap() - na).abs() <= 1e-10 * na);

        // canonical center shortcut
        let canon = MPArray::from_array(&da, 2).unwrap();
        assert!((norm(&canon).unwrap() - na).abs() <= 1e-10 * na);

        let dist = frobenius(&(&da - &db));
        assert!((normdist(&a, &b).unwrap() - dist).abs() <= 1e-10 * dist);
    }
}

#[test]
fn trace_matches_dense() {
    let mut rng = rng();
    for (sites, ldim, bdim) in GRID {
        let mpo: MPArray<C64>
            = factory::random_mpa(sites, &[ldim, ldim], bdim, &mut rng).unwrap();
        let m = to_matrix(&mpo);
        let truth: C64 = m.diag().sum();
        let res = trace(&mpo).unwrap();
        assert!((res - truth).norm() <= 1e-10 * frobenius(&m.into_dyn()));
    }
    let mps: MPArray<f64> = factory::random_mpa(3, &[2], 2, &mut rng).unwrap();
    assert!(matches!(trace(&mps), Err(MPAError::NotOperator(1))));
}

#[test]
fn partialtrace_matches_dense() {
    let mut rng = rng();
    let mpo: MPArray<f64> = factory::random_mpa(4, &[2, 2], 3, &mut rng).unwrap();
    let glob = tools::local_to_global(&mpo.to_array().unwrap(), 4).unwrap();

    let axes = [None, Some((0, 1)), Some((0, 1)), None];
    let red = partialtrace(&mpo, &axes).unwrap();
    assert_eq!(red.len(), 2);
    let truth = tools::global_to_local(
        &tools::partial_trace(&glob, &[1, 2]).unwrap(), 2).unwrap();
    assert_close_l2!(&red.to_array().unwrap(), &truth, TOL);

    let axes = [None, None, Some((1, 0)), Some((0, 1))];
    let red = partialtrace(&mpo, &axes).unwrap();
    assert_eq!(red.len(), 2);
    let truth = tools::global_to_local(
        &tools::partial_trace(&glob, &[2, 3]).unwrap(), 2).unwrap();
    assert_close_l2!(&red.to_array().unwrap(), &truth, TOL);

    let axes = [Some((0, 1)), None, None, None];
    assert!(matches!(
        partialtrace(&mpo, &axes[..3]), Err(MPAError::LengthMismatch(4, 3))));
    let axes = [None, Some((0, 0)), None, None];
    assert!(matches!(
        partialtrace(&mpo, &axes), Err(MPAError::InvalidTraceAxes { site: 1 })));
}

#[test]
fn addition_and_subtraction() {
    let mut rng = rng();
    for (sites, ldim, bdim) in GRID {
        let a: MPArray<C64>
            = factory::random_mpa(sites, &[ldim, ldim], bdim, &mut rng).unwrap();
        let b: MPArray<C64>
            = factory::random_mpa(sites, &[ldim, ldim], bdim, &mut rng).unwrap();
        let (da, db) = (a.to_array().unwrap(), b.to_array().unwrap());

        let sum = &a + &b;
        assert_eq!(sum.bdims(), vec![2 * bdim; sites - 1]);
        assert_eq!(sum.normal_form(), (0, sites));
        assert_close_l2!(&sum.to_array().unwrap(), &(&da + &db), TOL);

        let diff = &a - &b;
        assert_close_l2!(&diff.to_array().unwrap(), &(&da - &db), TOL);

        let mut acc = a.clone();
        acc += &b;
        acc -= &a;
        assert_close_l2!(&acc.to_array().unwrap(), &db, TOL);
    }
}

#[test]
#[should_panic]
fn addition_of_mismatched_lengths_panics() {
    let mut rng = rng();
    let a: MPArray<f64> = factory::random_mpa(3, &[2], 2, &mut rng).unwrap();
    let b: MPArray<f64> = factory::random_mpa(4, &[2], 2, &mut rng).unwrap();
    let _ = &a + &b;
}

#[test]
fn scalar_multiplication_keeps_normal_form() {
    let mut rng = rng();
    let op: nd::ArrayD<f64> = factory::random_op(4, 2, &mut rng);
    let mpo = MPArray::from_array(&op, 2).unwrap();

    let scaled = &mpo * 2.5;
    assert_eq!(scaled.normal_form(), (3, 4));
    check_normal_form(&scaled);
    assert_close_l2!(&scaled.to_array().unwrap(), &op.mapv(|x| 2.5 * x), TOL);

    let scaled = 2.5 * &mpo;
    assert_close_l2!(&scaled.to_array().unwrap(), &op.mapv(|x| 2.5 * x), TOL);

    let mut divided = mpo.clone();
    divided /= 4.0;
    assert_eq!(divided.normal_form(), (3, 4));
    assert_close_l2!(&divided.to_array().unwrap(), &op.mapv(|x| x / 4.0), TOL);

    let cmpo = mpo.to_complex();
    let rotated = C64::i() * cmpo;
    let truth = op.mapv(|x| C64::new(0.0, x));
    assert_close_l2!(&rotated.to_array().unwrap(), &truth, TOL);
}

#[test]
fn transpose_and_conj() {
    let mut rng = rng();
    let mpo: MPArray<C64> = factory::random_mpa(3, &[2, 3], 2, &mut rng).unwrap();
    let arr = mpo.to_array().unwrap();

    let t = mpo.T();
    assert_eq!(t.pdims(), vec![vec![3, 2]; 3]);
    let truth = arr.view().permuted_axes(vec![1, 0, 3, 2, 5, 4]).to_owned();
    assert_close_l2!(&t.to_array().unwrap(), &truth, TOL);

    let c = mpo.conj();
    assert_close_l2!(&c.to_array().unwrap(), &arr.mapv(|x| x.conj()), TOL);

    let op: nd::ArrayD<C64> = factory::random_op(3, 2, &mut rng);
    let canon = MPArray::from_array(&op, 2).unwrap();
    assert_eq!(canon.adjoint().normal_form(), (2, 3));
    check_normal_form(&canon.adjoint());
}

#[test]
fn outer_concatenates() {
    let mut rng = rng();
    let a: MPArray<f64> = factory::random_mpa(3, &[2], 2, &mut rng).unwrap();
    let b: MPArray<f64> = factory::random_mpa(2, &[3], 4, &mut rng).unwrap();
    let ab = outer([&a, &b]).unwrap();
    assert_eq!(ab.len(), 5);
    assert_eq!(ab.bdims(), vec![2, 2, 1, 4]);
    let truth = tensor::tensordot(
        &a.to_array().unwrap(), &b.to_array().unwrap(), &[], &[]).unwrap();
    assert_close_l2!(&ab.to_array().unwrap(), &truth, TOL);

    let mpo: MPArray<f64> = factory::random_mpa(2, &[2, 2], 2, &mut rng).unwrap();
    assert!(matches!(outer([&a, &mpo]), Err(MPAError::NonUniformLegs)));
}

#[test]
fn inject_tensor() {
    let mut rng = rng();
    let mps: MPArray<f64> = factory::random_mpa(3, &[2], 2, &mut rng).unwrap();
    let v = nd::array![1.0, -2.0, 0.5].into_dyn();
    let res = inject(&mps, 1, 2, Some(&v)).unwrap();
    assert_eq!(res.len(), 5);
    assert_eq!(res.pdims(), vec![vec![2], vec![3], vec![3], vec![2], vec![2]]);
    let vv = tensor::tensordot(&v, &v, &[], &[]).unwrap();
    let truth = tensor::tensordot(&mps.to_array().unwrap(), &vv, &[], &[])
        .unwrap()
        .permuted_axes(vec![0, 3, 4, 1, 2]);
    assert_close_l2!(&res.to_array().unwrap(), &truth, TOL);

    let at_end = inject(&mps, 3, 1, Some(&v)).unwrap();
    assert_eq!(at_end.pdims()[3], vec![3]);
    assert!(matches!(
        inject(&mps, 4, 1, Some(&v)),
        Err(MPAError::InvalidPosition { pos: 4, len: 3 })
    ));
    assert!(matches!(
        inject(&mps, 1, 1, None), Err(MPAError::IdentityNeedsTwoLegs)));
}

#[test]
fn inject_identity() {
    let mut rng = rng();
    let mpo: MPArray<C64> = factory::random_mpa(2, &[3, 3], 2, &mut rng).unwrap();
    let res = inject(&mpo, 1, 2, None).unwrap();
    assert_eq!(res.len(), 4);
    assert_eq!(res.bdims(), vec![2, 2, 2]);
    let eye3 = nd::Array2::<C64>::eye(3).into_dyn();
    let eyes = tensor::tensordot(&eye3, &eye3, &[], &[]).unwrap();
    let truth = tensor::tensordot(&mpo.to_array().unwrap(), &eyes, &[], &[])
        .unwrap()
        .permuted_axes(vec![0, 1, 4, 5, 6, 7, 2, 3]);
    assert_close_l2!(&res.to_array().unwrap(), &truth, TOL);

    let at_start = inject(&mpo, 0, 1, None).unwrap();
    assert_eq!(at_start.bdims(), vec![1, 2]);
    let tr = trace(&res).unwrap();
    let truth = trace(&mpo).unwrap() * 9.0;
    assert!((tr - truth).norm() <= 1e-10 * truth.norm().max(1.0));
}

fn naive_local_sum(terms: &[MPArray<f64>], ldim: usize) -> MPArray<f64> {
    let width = terms[0].len();
    let nsites = terms.len() + width - 1;
    let eye1: MPArray<f64> = factory::eye(1, ldim).unwrap();
    let mut acc: Option<MPArray<f64>> = None;
    for (i, term) in terms.iter().enumerate() {
        let parts: Vec<&MPArray<f64>>
            = repeat(&eye1).take(i)
            .chain([term])
            .chain(repeat(&eye1).take(nsites - i - width))
            .collect();
        let embedded = outer(parts).unwrap();
        acc = Some(match acc {
            None => embedded,
            Some(sum) => &sum + &embedded,
        });
    }
    acc.unwrap()
}

#[test]
fn local_sum_matches_naive_sum() {
    let mut rng = rng();
    for (nterms, width, bdim) in [(3, 2, 3), (4, 1, 1), (2, 3, 2)] {
        let terms: Vec<MPArray<f64>>
            = (0..nterms)
            .map(|_| factory::random_mpa(width, &[2, 2], bdim, &mut rng).unwrap())
            .collect();
        let sum = local_sum(&terms).unwrap();
        let naive = naive_local_sum(&terms, 2);
        assert_eq!(sum.len(), nterms + width - 1);
        assert_close_l2!(&sum.to_array().unwrap(), &naive.to_array().unwrap(), TOL);
        for (fast, slow) in sum.bdims().into_iter().zip(naive.bdims()) {
            assert!(fast <= slow);
        }
    }
}

#[test]
fn local_sum_rejects_bad_terms() {
    let mut rng = rng();
    let a: MPArray<f64> = factory::random_mpa(2, &[2, 2], 2, &mut rng).unwrap();
    let b: MPArray<f64> = factory::random_mpa(3, &[2, 2], 2, &mut rng).unwrap();
    assert!(matches!(
        local_sum(&[a.clone(), b]), Err(MPAError::LengthMismatch(2, 3))));
    let c: MPArray<f64> = factory::random_mpa(2, &[3, 3], 2, &mut rng).unwrap();
    assert!(matches!(
        local_sum(&[a, c]), Err(MPAError::LegMismatch { site: 1 })));
    assert!(matches!(
        local_sum::<f64>(&[]), Err(MPAError::EmptySystem)));
}

#[test]
fn group_and_split_sites() {
    let mut rng = rng();
    for (sites, ldim, bdim, k) in [(6, 2, 4, 3), (6, 2, 4, 2), (4, 3, 5, 2)] {
        let mpo: MPArray<f64>
            = factory::random_mpa(sites, &[ldim, ldim], bdim, &mut rng).unwrap();
        let arr = mpo.to_array().unwrap();

        let grouped = mpo.group_sites(k).unwrap();
        assert_eq!(grouped.len(), sites / k);
        assert_eq!(grouped.plegs(), 2 * k);
        assert_eq!(grouped.bdims(), vec![bdim; sites / k - 1]);
        assert_close_l2!(&grouped.to_array().unwrap(), &arr, TOL);

        let split = grouped.split_sites(k).unwrap();
        assert_eq!(split.len(), sites);
        assert_eq!(split.plegs(), 2);
        assert_close_l2!(&split.to_array().unwrap(), &arr, TOL);
    }
    let mpo: MPArray<f64> = factory::random_mpa(6, &[2, 2], 2, &mut rng).unwrap();
    assert!(matches!(
        mpo.group_sites(4), Err(MPAError::IndivisibleSites { len: 6, k: 4 })));
    assert!(matches!(
        mpo.split_sites(3), Err(MPAError::IndivisibleLegs { plegs: 2, k: 3 })));
}

#[test]
fn ravel_merges_legs() {
    let mut rng = rng();
    let mpo: MPArray<f64> = factory::random_mpa(3, &[2, 3], 2, &mut rng).unwrap();
    let flat = mpo.ravel().unwrap();
    assert_eq!(flat.pdims(), vec![vec![6]; 3]);
    let truth = tensor::reshape(&mpo.to_array().unwrap(), vec![6, 6, 6]).unwrap();
    assert_close_l2!(&flat.to_array().unwrap(), &truth, TOL);
}

#[test]
fn local_tensor_access() {
    let mut rng = rng();
    let mpa: MPArray<f64> = factory::random_mpa(3, &[2], 2, &mut rng).unwrap();
    let lt = mpa.lt();
    assert_eq!(lt.len(), 3);
    assert_eq!(lt.get(1), Some(&mpa[1]));
    assert!(lt.get(3).is_none());
    assert_eq!(lt.normal_form(), mpa.normal_form());
    assert_eq!(lt.clone().into_vec(), lt.as_slice().to_vec());

    let ltens = mpa.clone().into_ltens();
    assert_eq!(ltens[0].shape(), &[1, 2, 2]);
    assert_eq!(MPArray::new(ltens).unwrap(), mpa);
}
