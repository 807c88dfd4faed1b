//! Random-intercept linear mixed model fitted by REML.
//!
//! `y = Xβ + Zu + ε`, `u ~ N(0, τ²I)`, `ε ~ N(0, σ²I)`, one intercept per
//! group. Writing `V = σ² H` with `H = I + λ ZZᵀ` and `λ = τ²/σ²`, both β
//! and σ² have closed forms for a fixed λ, leaving a one-dimensional
//! search:
//!
//! ```text
//! A   = Xᵀ H⁻¹ X          β̂ = A⁻¹ Xᵀ H⁻¹ y       Q = (y - Xβ̂)ᵀ H⁻¹ (y - Xβ̂)
//! σ̂²  = Q / (n - p)
//! ℓ_R = -½ [ (n - p)(ln 2π σ̂² + 1) + ln|H| + ln|A| ]
//! ```
//!
//! `H` is block diagonal; per group `H_i⁻¹ = I - c_i 11ᵀ` with
//! `c_i = λ / (1 + n_i λ)` and `ln|H_i| = ln(1 + n_i λ)`, so an evaluation
//! costs `O(G p²)` once per-group cross-products are cached.
//!
//! λ is located by a coarse grid on `ln λ`, refined by golden-section
//! search, and compared against the `λ = 0` boundary.
use nalgebra::{DMatrix, DVector};
use serde::Serialize;

use crate::error::{AnalysisError, Result};

const LN_LAMBDA_MIN: f64 = -15.0;
const LN_LAMBDA_MAX: f64 = 10.0;
const GOLDEN_TOL: f64 = 1e-7;
const GOLDEN_MAX_ITER: usize = 200;

/// Fit summary of one mixed model.
#[derive(Debug, Clone, Serialize)]
pub struct MixedModelFit {
    pub beta: Vec<f64>,
    pub se: Vec<f64>,
    /// Random-intercept variance τ².
    pub group_var: f64,
    /// Residual variance σ² (statsmodels' "Scale").
    pub scale: f64,
    pub log_reml: f64,
    pub n_obs: usize,
    /// Observations per group, in group index order.
    pub group_sizes: Vec<usize>,
    pub converged: bool,
}

impl MixedModelFit {
    pub fn n_groups(&self) -> usize {
        self.group_sizes.len()
    }
}

/// Cached cross-products of one group.
struct Block {
    n: f64,
    xtx: DMatrix<f64>,
    xt1: DVector<f64>,
    xty: DVector<f64>,
    yty: f64,
    sum_y: f64,
}

struct Evaluation {
    log_reml: f64,
    beta: DVector<f64>,
    a_inv: DMatrix<f64>,
    sigma2: f64,
}

struct Profile {
    blocks: Vec<Block>,
    n: usize,
    p: usize,
}

impl Profile {
    fn new(x: &DMatrix<f64>, y: &DVector<f64>, groups: &[usize], n_groups: usize) -> Self {
        let p = x.ncols();
        let mut blocks: Vec<Block> = (0..n_groups)
            .map(|_| Block {
                n: 0.0,
                xtx: DMatrix::zeros(p, p),
                xt1: DVector::zeros(p),
                xty: DVector::zeros(p),
                yty: 0.0,
                sum_y: 0.0,
            })
            .collect();
        for (i, &g) in groups.iter().enumerate() {
            let row = x.row(i).transpose();
            let b = &mut blocks[g];
            b.n += 1.0;
            b.xtx += &row * row.transpose();
            b.xt1 += &row;
            b.xty += &row * y[i];
            b.yty += y[i] * y[i];
            b.sum_y += y[i];
        }
        Self { blocks, n: x.nrows(), p }
    }

    fn eval(&self, lambda: f64) -> Option<Evaluation> {
        let p = self.p;
        let mut a = DMatrix::<f64>::zeros(p, p);
        let mut b = DVector::<f64>::zeros(p);
        let mut yhy = 0.0;
        let mut log_det_h = 0.0;
        for blk in &self.blocks {
            let c = lambda / (1.0 + blk.n * lambda);
            a += &blk.xtx - &blk.xt1 * blk.xt1.transpose() * c;
            b += &blk.xty - &blk.xt1 * (c * blk.sum_y);
            yhy += blk.yty - c * blk.sum_y * blk.sum_y;
            log_det_h += (1.0 + blk.n * lambda).ln();
        }

        let chol = a.cholesky()?;
        let beta = chol.solve(&b);
        let q = yhy - b.dot(&beta);
        let dof = (self.n - p) as f64;
        if q.is_nan() || q <= 0.0 {
            return None;
        }
        let sigma2 = q / dof;
        let log_det_a = 2.0 * chol.l().diagonal().iter().map(|d| d.ln()).sum::<f64>();
        let log_reml = -0.5
            * (dof * ((2.0 * std::f64::consts::PI * sigma2).ln() + 1.0) + log_det_h + log_det_a);
        Some(Evaluation { log_reml, beta, a_inv: chol.inverse(), sigma2 })
    }

    fn objective(&self, ln_lambda: f64) -> f64 {
        self.eval(ln_lambda.exp()).map_or(f64::NEG_INFINITY, |e| e.log_reml)
    }

    /// Maximise over `ln λ`; returns `(ln λ, converged)`.
    fn search(&self) -> (f64, bool) {
        let grid: Vec<f64> = (0..=(LN_LAMBDA_MAX - LN_LAMBDA_MIN) as usize)
            .map(|k| LN_LAMBDA_MIN + k as f64)
            .collect();
        let best = grid
            .iter()
            .copied()
            .max_by(|a, b| self.objective(*a).total_cmp(&self.objective(*b)))
            .unwrap_or(0.0);

        let gr = (5f64.sqrt() - 1.0) / 2.0;
        let (mut lo, mut hi) = ((best - 1.0).max(LN_LAMBDA_MIN), (best + 1.0).min(LN_LAMBDA_MAX));
        let mut c = hi - gr * (hi - lo);
        let mut d = lo + gr * (hi - lo);
        let (mut fc, mut fd) = (self.objective(c), self.objective(d));
        for _ in 0..GOLDEN_MAX_ITER {
            if hi - lo < GOLDEN_TOL {
                return ((lo + hi) / 2.0, true);
            }
            if fc > fd {
                hi = d;
                d = c;
                fd = fc;
                c = hi - gr * (hi - lo);
                fc = self.objective(c);
            } else {
                lo = c;
                c = d;
                fc = fd;
                d = lo + gr * (hi - lo);
                fd = self.objective(d);
            }
        }
        ((lo + hi) / 2.0, false)
    }
}

/// Fit `y ~ X` with a random intercept per group.
///
/// `groups[i]` is the group index (`0..n_groups`) of observation `i`.
///
/// # Errors
///
/// [`AnalysisError::NumericalFailure`] when there are no residual degrees
/// of freedom or `XᵀH⁻¹X` is singular for every λ.
pub fn fit_random_intercept(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    groups: &[usize],
) -> Result<MixedModelFit> {
    let (n, p) = x.shape();
    if y.len() != n || groups.len() != n {
        return Err(AnalysisError::numerical("observation count mismatch in mixed model"));
    }
    if n <= p {
        return Err(AnalysisError::numerical(format!(
            "{n} observations for {p} fixed effects"
        )));
    }
    let n_groups = groups.iter().copied().max().map_or(0, |g| g + 1);
    let profile = Profile::new(x, y, groups, n_groups);

    let (ln_lambda, converged) = profile.search();
    let interior = profile.eval(ln_lambda.exp());
    let boundary = profile.eval(0.0);
    let (lambda, ev) = match (interior, boundary) {
        (Some(i), Some(b)) if b.log_reml >= i.log_reml => (0.0, b),
        (Some(i), _) => (ln_lambda.exp(), i),
        (None, Some(b)) => (0.0, b),
        (None, None) => {
            return Err(AnalysisError::numerical("mixed model: singular fixed-effects design"));
        }
    };

    let se = (0..p).map(|j| (ev.sigma2 * ev.a_inv[(j, j)]).sqrt()).collect();
    let mut group_sizes = vec![0; n_groups];
    groups.iter().for_each(|&g| group_sizes[g] += 1);

    Ok(MixedModelFit {
        beta: ev.beta.iter().copied().collect(),
        se,
        group_var: lambda * ev.sigma2,
        scale: ev.sigma2,
        log_reml: ev.log_reml,
        n_obs: n,
        group_sizes,
        converged,
    })
}
