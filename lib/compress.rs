//! Bond dimension reduction.
//!
//! Two schemes are provided:
//!
//! - **SVD compression** ([`MPArray::compress_svd`]): after bringing the array
//!   into a fully canonical form, sweep once across it, replacing each site by
//!   the kept left (or right) singular vectors of its matricization and
//!   pushing the remainder into the next site. With the canonical form in
//!   place, each truncation is locally optimal with respect to the Frobenius
//!   norm.
//! - **Variational compression** ([`MPArray::compress_var`]): starting from an
//!   initial guess with the target bond dimensions, repeatedly sweep across
//!   the guess, replacing one or two sites at a time by the optimal local
//!   tensors given all the others (alternating least squares). Partial
//!   contractions of the target with the guess ("environments") are cached
//!   on both sides of the current position.
//!
//! Both schemes report the *overlap* `⟨B|A⟩ = ‖B‖²` of the compressed array
//! `B` with the original `A`, so that `‖A - B‖² = ‖A‖² - overlap`.

use std::str::FromStr;
use ndarray as nd;
use rand::{ SeedableRng, rngs::StdRng };
use tracing::{ debug, trace };
use crate::{
    Entry,
    factory,
    ltens::Normalization,
    mparray::{ MPAError, MPAResult, MPArray, norm },
    tensor::{ self, Schmidt },
};

/// Direction of a compression sweep.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Sweep from the first site to the last; the result is left-normalized
    /// on all sites but the last.
    #[default]
    Right,
    /// Sweep from the last site to the first; the result is right-normalized
    /// on all sites but the first.
    Left,
}

impl FromStr for Direction {
    type Err = MPAError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "right" | "r" => Ok(Self::Right),
            "left" | "l" => Ok(Self::Left),
            _ => Err(MPAError::InvalidDirection(s.to_string())),
        }
    }
}

/// Parameters for [`MPArray::compress_svd`].
///
/// At least one of `bdim` and `relerr` must be given.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct SvdConfig {
    /// Maximum bond dimension.
    pub bdim: Option<usize>,
    /// At each bond, discard the smallest singular values whose squares sum
    /// to at most `relerr²` times the total.
    pub relerr: Option<f64>,
    /// Sweep direction.
    pub direction: Direction,
}

/// Parameters for [`MPArray::compress_var`].
#[derive(Clone, Debug, PartialEq)]
pub struct VarConfig<A> {
    /// Target bond dimension. Required if `initmpa` is `None`; otherwise used
    /// only to truncate two-site updates (defaulting to the largest bond
    /// dimension of `initmpa`).
    pub bdim: Option<usize>,
    /// Initial guess, which must have the same leg dimensions as the target.
    /// If `None`, a random array with bond dimension `bdim` is used.
    pub initmpa: Option<MPArray<A>>,
    /// Number of full back-and-forth sweeps.
    pub num_sweeps: usize,
    /// Number of sites (1 or 2) optimized at once.
    pub sweep_sites: usize,
    /// Seed for the random initial guess; drawn from system entropy if `None`.
    pub seed: Option<u64>,
}

impl<A> Default for VarConfig<A> {
    fn default() -> Self {
        Self {
            bdim: None,
            initmpa: None,
            num_sweeps: 5,
            sweep_sites: 1,
            seed: None,
        }
    }
}

/// Compression method and its parameters.
#[derive(Clone, Debug, PartialEq)]
pub enum Compression<A> {
    Svd(SvdConfig),
    Var(VarConfig<A>),
}

impl<A> From<SvdConfig> for Compression<A> {
    fn from(config: SvdConfig) -> Self { Self::Svd(config) }
}

impl<A> From<VarConfig<A>> for Compression<A> {
    fn from(config: VarConfig<A>) -> Self { Self::Var(config) }
}

fn frobenius_sq<A>(t: &nd::ArrayD<A>) -> f64
where A: Entry
{
    t.iter().map(|x| x.square()).sum()
}

impl<A> MPArray<A>
where A: Entry
{
    /// Compress in place with the given method, returning the overlap of the
    /// compressed array with the original.
    pub fn compress(&mut self, method: &Compression<A>) -> MPAResult<f64> {
        match method {
            Compression::Svd(config) => self.compress_svd(config),
            Compression::Var(config) => {
                let (compressed, overlaps) = self.compress_var_history(config)?;
                *self = compressed;
                Ok(overlaps.last().copied().unwrap_or(0.0))
            },
        }
    }

    /// Like [`compress`][Self::compress], but return a compressed copy along
    /// with the overlap.
    pub fn compression(&self, method: &Compression<A>)
        -> MPAResult<(Self, f64)>
    {
        let mut compressed = self.clone();
        let overlap = compressed.compress(method)?;
        Ok((compressed, overlap))
    }

    /// Compress in place by a single truncated-SVD sweep, returning the
    /// overlap `⟨B|A⟩ = ‖B‖²` of the result `B` with the original `A`.
    ///
    /// Sweeping right leaves normal form `(L - 1, L)`, sweeping left leaves
    /// `(0, 1)`. If no singular values are discarded, the array is unchanged
    /// and the overlap equals `‖A‖²`.
    pub fn compress_svd(&mut self, config: &SvdConfig) -> MPAResult<f64> {
        let SvdConfig { bdim, relerr, direction } = *config;
        if bdim.is_none() && relerr.is_none() {
            return Err(MPAError::InvalidCompression(
                "one of bdim or relerr is required".to_string()));
        }
        if bdim == Some(0) {
            return Err(MPAError::InvalidCompression(
                "bdim must be positive".to_string()));
        }
        if relerr.is_some_and(|eps| !(eps >= 0.0)) {
            return Err(MPAError::InvalidCompression(
                "relerr must be non-negative".to_string()));
        }
        let bdim = bdim.unwrap_or(usize::MAX);
        debug!(?direction, bdim, ?relerr, "svd compression");
        match direction {
            Direction::Right => self.compress_svd_r(bdim, relerr),
            Direction::Left => self.compress_svd_l(bdim, relerr),
        }
    }

    fn compress_svd_r(&mut self, bdim: usize, relerr: Option<f64>)
        -> MPAResult<f64>
    {
        let n = self.len();
        if n > 1 { self.normalize(None, Some(1))?; }
        for site in 0..n - 1 {
            let t = &self.lt[site];
            let mut shape = t.shape().to_vec();
            let schmidt = tensor::truncated_svd(tensor::left_matrix(t)?, bdim, relerr)?;
            trace!(site, rank = schmidt.rank, discarded = schmidt.discarded);
            let sv = schmidt.sv();
            let Schmidt { u, rank, .. } = schmidt;
            let last = shape.len() - 1;
            shape[last] = rank;
            let u = tensor::reshape(&u, shape)?;
            let next
                = tensor::tensordot(&sv.into_dyn(), &self.lt[site + 1], &[1], &[0])?;
            self.lt.update(site, u, Some(Normalization::Left));
            self.lt.update(site + 1, next, None);
        }
        let overlap = frobenius_sq(&self.lt[n - 1]);
        debug!(bdims = ?self.bdims(), overlap, "svd compression done");
        Ok(overlap)
    }

    fn compress_svd_l(&mut self, bdim: usize, relerr: Option<f64>)
        -> MPAResult<f64>
    {
        let n = self.len();
        self.normalize(Some(n - 1), None)?;
        for site in (1..n).rev() {
            let t = &self.lt[site];
            let mut shape = t.shape().to_vec();
            let schmidt = tensor::truncated_svd(tensor::right_matrix(t)?, bdim, relerr)?;
            trace!(site, rank = schmidt.rank, discarded = schmidt.discarded);
            let us = schmidt.us();
            let Schmidt { v, rank, .. } = schmidt;
            shape[0] = rank;
            let v = tensor::reshape(&v, shape)?;
            let prev = &self.lt[site - 1];
            let last = prev.ndim() - 1;
            let prev = tensor::tensordot(prev, &us.into_dyn(), &[last], &[0])?;
            self.lt.update(site, v, Some(Normalization::Right));
            self.lt.update(site - 1, prev, None);
        }
        let overlap = frobenius_sq(&self.lt[0]);
        debug!(bdims = ?self.bdims(), overlap, "svd compression done");
        Ok(overlap)
    }

    /// Return a compressed copy computed by variational (alternating least
    /// squares) sweeps.
    ///
    /// The result has normal form `(0, 1)`. See
    /// [`compress_var_history`][Self::compress_var_history] to also retrieve
    /// the overlap after each sweep.
    pub fn compress_var(&self, config: &VarConfig<A>) -> MPAResult<Self> {
        Ok(self.compress_var_history(config)?.0)
    }

    /// Like [`compress_var`][Self::compress_var], but also return the overlap
    /// `⟨B|A⟩ = ‖B‖²` recorded after each sweep.
    ///
    /// With single-site updates the overlaps never decrease, since each local
    /// update is an exact minimization of `‖A - B‖` over one site.
    pub fn compress_var_history(&self, config: &VarConfig<A>)
        -> MPAResult<(Self, Vec<f64>)>
    {
        if !(1..=2).contains(&config.sweep_sites) {
            return Err(MPAError::InvalidCompression(format!(
                "sweep_sites must be 1 or 2, got {}", config.sweep_sites)));
        }
        if config.num_sweeps == 0 {
            return Err(MPAError::InvalidCompression(
                "num_sweeps must be positive".to_string()));
        }
        if config.bdim == Some(0) {
            return Err(MPAError::InvalidCompression(
                "bdim must be positive".to_string()));
        }
        let init = match (&config.initmpa, config.bdim) {
            (Some(init), _) => {
                self.check_same_shape(init)?;
                init.clone()
            },
            (None, Some(bdim)) => {
                let mut rng = match config.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                let mut init
                    = factory::random_mpa_with(&self.pdims(), bdim, &mut rng)?;
                let init_norm = norm(&init)?;
                if init_norm > 0.0 {
                    init *= A::from_real(norm(self)? / init_norm);
                }
                init
            },
            (None, None) => {
                return Err(MPAError::InvalidCompression(
                    "one of bdim or initmpa is required".to_string()));
            },
        };
        let bdim = config.bdim.unwrap_or_else(|| init.bdim());
        let two_site = config.sweep_sites == 2 && self.len() > 1;

        let mut sweeper = VarSweep::new(self, init)?;
        let mut overlaps: Vec<f64> = Vec::with_capacity(config.num_sweeps);
        for sweep in 0..config.num_sweeps {
            if two_site {
                sweeper.sweep_double(bdim)?;
            } else {
                sweeper.sweep_single()?;
            }
            let overlap = frobenius_sq(&sweeper.approx.lt[0]);
            debug!(sweep, overlap, "variational compression");
            overlaps.push(overlap);
        }
        Ok((sweeper.approx, overlaps))
    }
}

// State of an alternating least-squares fit of `approx` to `target`.
//
// lenv[k] has shape [approx bond k, target bond k] and holds the contraction of
// conj(approx) with target over sites 0..k; renv[k] has shape
// [target bond k, approx bond k] and covers sites k..L. Only the environments
// on the far side of the sites currently being optimized are kept current.
struct VarSweep<'a, A> {
    target: &'a MPArray<A>,
    approx: MPArray<A>,
    lenv: Vec<nd::ArrayD<A>>,
    renv: Vec<nd::ArrayD<A>>,
}

fn left_env<A>(env: &nd::ArrayD<A>, ta: &nd::ArrayD<A>, tb: &nd::ArrayD<A>)
    -> MPAResult<nd::ArrayD<A>>
where A: Entry
{
    let tmp = tensor::tensordot(env, ta, &[1], &[0])?;
    let axes: Vec<usize> = (0..tb.ndim() - 1).collect();
    Ok(tensor::tensordot(&tb.mapv(|x| x.conj()), &tmp, &axes, &axes)?)
}

fn right_env<A>(env: &nd::ArrayD<A>, ta: &nd::ArrayD<A>, tb: &nd::ArrayD<A>)
    -> MPAResult<nd::ArrayD<A>>
where A: Entry
{
    let last = ta.ndim() - 1;
    let tmp = tensor::tensordot(ta, env, &[last], &[0])?;
    let axes: Vec<usize> = (1..tb.ndim()).collect();
    Ok(tensor::tensordot(&tmp, &tb.mapv(|x| x.conj()), &axes, &axes)?)
}

impl<'a, A> VarSweep<'a, A>
where A: Entry
{
    fn new(target: &'a MPArray<A>, mut approx: MPArray<A>) -> MPAResult<Self> {
        let n = target.len();
        if n > 1 { approx.normalize(None, Some(1))?; }
        let unit: nd::ArrayD<A> = nd::ArrayD::from_elem(vec![1, 1], A::one());
        let lenv = vec![unit.clone(); n + 1];
        let mut renv = vec![unit; n + 1];
        for k in (1..n).rev() {
            renv[k] = right_env(&renv[k + 1], &target.lt[k], &approx.lt[k])?;
        }
        Ok(Self { target, approx, lenv, renv })
    }

    // optimal tensor for site `pos` given all other sites
    fn local_target(&self, pos: usize) -> MPAResult<nd::ArrayD<A>> {
        let tmp = tensor::tensordot(&self.lenv[pos], &self.target.lt[pos], &[1], &[0])?;
        let last = tmp.ndim() - 1;
        Ok(tensor::tensordot(&tmp, &self.renv[pos + 1], &[last], &[0])?)
    }

    // optimal two-site tensor for sites `pos`, `pos + 1`
    fn local_target2(&self, pos: usize) -> MPAResult<nd::ArrayD<A>> {
        let tmp = tensor::tensordot(&self.lenv[pos], &self.target.lt[pos], &[1], &[0])?;
        let last = tmp.ndim() - 1;
        let tmp = tensor::tensordot(&tmp, &self.target.lt[pos + 1], &[last], &[0])?;
        let last = tmp.ndim() - 1;
        Ok(tensor::tensordot(&tmp, &self.renv[pos + 2], &[last], &[0])?)
    }

    fn sweep_single(&mut self) -> MPAResult<()> {
        let n = self.target.len();
        for pos in 0..n - 1 {
            let opt = self.local_target(pos)?;
            let mut shape = opt.shape().to_vec();
            let (q, r) = tensor::qr(tensor::left_matrix(&opt)?)?;
            let last = shape.len() - 1;
            shape[last] = q.ncols();
            let q = tensor::reshape(&q, shape)?;
            let next
                = tensor::tensordot(&r.into_dyn(), &self.approx.lt[pos + 1], &[1], &[0])?;
            self.approx.lt.update(pos, q, Some(Normalization::Left));
            self.approx.lt.update(pos + 1, next, None);
            self.lenv[pos + 1] = left_env(
                &self.lenv[pos], &self.target.lt[pos], &self.approx.lt[pos])?;
        }
        for pos in (1..n).rev() {
            let opt = self.local_target(pos)?;
            let mut shape = opt.shape().to_vec();
            let (l, q) = tensor::lq(tensor::right_matrix(&opt)?)?;
            shape[0] = q.nrows();
            let q = tensor::reshape(&q, shape)?;
            let prev = &self.approx.lt[pos - 1];
            let last = prev.ndim() - 1;
            let prev = tensor::tensordot(prev, &l.into_dyn(), &[last], &[0])?;
            self.approx.lt.update(pos, q, Some(Normalization::Right));
            self.approx.lt.update(pos - 1, prev, None);
            self.renv[pos] = right_env(
                &self.renv[pos + 1], &self.target.lt[pos], &self.approx.lt[pos])?;
        }
        let opt = self.local_target(0)?;
        self.approx.lt.update(0, opt, None);
        Ok(())
    }

    // split a two-site tensor [bl, legs1..., legs2..., br] after the legs of
    // the left site
    fn split_pair(&self, pair: &nd::ArrayD<A>, pos: usize, bdim: usize)
        -> MPAResult<(Schmidt<A>, Vec<usize>, Vec<usize>)>
    {
        let plegs = self.target.plegs();
        let shape = pair.shape();
        let lshape: Vec<usize> = shape[..plegs + 1].to_vec();
        let rshape: Vec<usize> = shape[plegs + 1..].to_vec();
        let rows: usize = lshape.iter().product();
        let cols: usize = rshape.iter().product();
        let schmidt
            = tensor::truncated_svd(tensor::reshape(pair, (rows, cols))?, bdim, None)?;
        trace!(pos, rank = schmidt.rank, discarded = schmidt.discarded);
        Ok((schmidt, lshape, rshape))
    }

    fn sweep_double(&mut self, bdim: usize) -> MPAResult<()> {
        let n = self.target.len();
        for pos in 0..n - 1 {
            let pair = self.local_target2(pos)?;
            let (schmidt, lshape, rshape) = self.split_pair(&pair, pos, bdim)?;
            let rank = schmidt.rank;
            let sv = schmidt.sv();
            let u = tensor::reshape(
                &schmidt.u, [lshape, vec![rank]].concat())?;
            let sv = tensor::reshape(&sv, [vec![rank], rshape].concat())?;
            self.approx.lt.update(pos, u, Some(Normalization::Left));
            self.approx.lt.update(pos + 1, sv, None);
            self.lenv[pos + 1] = left_env(
                &self.lenv[pos], &self.target.lt[pos], &self.approx.lt[pos])?;
        }
        for pos in (0..n - 1).rev() {
            let pair = self.local_target2(pos)?;
            let (schmidt, lshape, rshape) = self.split_pair(&pair, pos, bdim)?;
            let rank = schmidt.rank;
            let us = schmidt.us();
            let us = tensor::reshape(&us, [lshape, vec![rank]].concat())?;
            let v = tensor::reshape(
                &schmidt.v, [vec![rank], rshape].concat())?;
            self.approx.lt.update(pos + 1, v, Some(Normalization::Right));
            self.approx.lt.update(pos, us, None);
            self.renv[pos + 1] = right_env(
                &self.renv[pos + 2], &self.target.lt[pos + 1], &self.approx.lt[pos + 1])?;
        }
        Ok(())
    }
}
