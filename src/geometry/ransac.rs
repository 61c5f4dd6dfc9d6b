//! Model-agnostic RANSAC.
//!
//! Implement [`Estimator`] for a model and call [`ransac`]. The loop is
//! seeded, so a fixed input and [`RansacOptions`] always give the same
//! result. Failure to reach consensus is reported through
//! [`RansacResult::model`] being `None`, never by panicking.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

#[derive(Debug, Clone)]
pub struct RansacOptions {
    pub max_iters: usize,
    /// Inlier residual threshold, in the units of [`Estimator::residual`].
    pub thresh: f64,
    pub min_inliers: usize,
    /// Probability in `[0, 1)` of drawing at least one all-inlier sample.
    pub confidence: f64,
    pub seed: u64,
    pub refit_on_inliers: bool,
}

impl Default for RansacOptions {
    fn default() -> Self {
        Self {
            max_iters: 2000,
            thresh: 1.0,
            min_inliers: 8,
            confidence: 0.99,
            seed: 0,
            refit_on_inliers: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RansacResult<M> {
    pub model: Option<M>,
    /// Sorted indices of inlier data.
    pub inliers: Vec<usize>,
    pub inlier_rms: f64,
    pub iters: usize,
}

impl<M> Default for RansacResult<M> {
    fn default() -> Self {
        Self {
            model: None,
            inliers: Vec::new(),
            inlier_rms: f64::INFINITY,
            iters: 0,
        }
    }
}

impl<M> RansacResult<M> {
    pub fn success(&self) -> bool {
        self.model.is_some()
    }

    pub fn inlier_mask(&self, len: usize) -> Vec<bool> {
        let mut mask = vec![false; len];
        for &i in &self.inliers {
            mask[i] = true;
        }
        mask
    }
}

pub trait Estimator {
    type Datum;
    type Model;

    const MIN_SAMPLES: usize;

    /// Fits a model to the sampled subset, `None` when the subset is degenerate.
    fn fit(&self, data: &[Self::Datum], sample: &[usize]) -> Option<Self::Model>;

    /// Non-negative error of one datum under `model`.
    fn residual(&self, model: &Self::Model, datum: &Self::Datum) -> f64;

    fn refit(&self, _data: &[Self::Datum], _inliers: &[usize]) -> Option<Self::Model> {
        None
    }
}

fn rms(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        return f64::INFINITY;
    }
    let ss: f64 = vals.iter().map(|v| v * v).sum();
    (ss / vals.len() as f64).sqrt()
}

/// Iterations needed to hit `confidence` given the current inlier ratio.
pub(crate) fn adaptive_iterations(
    confidence: f64,
    inlier_ratio: f64,
    min_samples: usize,
    iters_so_far: usize,
    max_iters: usize,
) -> usize {
    if confidence <= 0.0 || inlier_ratio <= 0.0 {
        return max_iters;
    }
    let denom = (1.0 - inlier_ratio.powi(min_samples as i32)).max(1e-12).ln();
    if denom >= 0.0 {
        return max_iters;
    }
    let num = (1.0 - confidence.min(1.0 - 1e-12)).ln();
    let n_iter = (num / denom).ceil() as usize;
    n_iter.clamp(iters_so_far, max_iters)
}

fn collect_inliers<E: Estimator>(
    estimator: &E,
    model: &E::Model,
    data: &[E::Datum],
    thresh: f64,
    inliers: &mut Vec<usize>,
    residuals: &mut Vec<f64>,
) {
    inliers.clear();
    residuals.clear();
    for (i, datum) in data.iter().enumerate() {
        let r = estimator.residual(model, datum);
        if r <= thresh {
            inliers.push(i);
            residuals.push(r);
        }
    }
}

pub fn ransac<E: Estimator>(
    estimator: &E,
    data: &[E::Datum],
    opts: &RansacOptions,
) -> RansacResult<E::Model> {
    let mut best = RansacResult::default();
    if data.len() < E::MIN_SAMPLES {
        return best;
    }

    let mut rng = ChaCha8Rng::seed_from_u64(opts.seed);
    let mut dynamic_max_iters = opts.max_iters;
    let mut inliers = Vec::with_capacity(data.len());
    let mut residuals = Vec::with_capacity(data.len());

    let mut num_iters = 0;
    while num_iters < dynamic_max_iters {
        num_iters += 1;
        let sample = rand::seq::index::sample(&mut rng, data.len(), E::MIN_SAMPLES).into_vec();
        let Some(mut model) = estimator.fit(data, &sample) else {
            continue;
        };
        collect_inliers(estimator, &model, data, opts.thresh, &mut inliers, &mut residuals);
        if inliers.len() < opts.min_inliers {
            continue;
        }
        if opts.refit_on_inliers {
            if let Some(refined) = estimator.refit(data, &inliers) {
                let mut refined_inliers = Vec::with_capacity(data.len());
                let mut refined_residuals = Vec::with_capacity(data.len());
                collect_inliers(
                    estimator,
                    &refined,
                    data,
                    opts.thresh,
                    &mut refined_inliers,
                    &mut refined_residuals,
                );
                if refined_inliers.len() >= inliers.len() {
                    model = refined;
                    inliers = refined_inliers;
                    residuals = refined_residuals;
                }
            }
        }

        let inlier_rms = rms(&residuals);
        let better = best.model.is_none()
            || inliers.len() > best.inliers.len()
            || (inliers.len() == best.inliers.len() && inlier_rms < best.inlier_rms);
        if better {
            best.model = Some(model);
            best.inliers = inliers.clone();
            best.inlier_rms = inlier_rms;
            best.iters = num_iters;

            let inlier_ratio = best.inliers.len() as f64 / data.len() as f64;
            dynamic_max_iters = adaptive_iterations(
                opts.confidence,
                inlier_ratio,
                E::MIN_SAMPLES,
                num_iters,
                opts.max_iters,
            );
        }
    }
    best.iters = num_iters;
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LineEstimator;

    impl Estimator for LineEstimator {
        type Datum = (f64, f64);
        type Model = (f64, f64);

        const MIN_SAMPLES: usize = 2;

        fn fit(&self, data: &[(f64, f64)], sample: &[usize]) -> Option<(f64, f64)> {
            let (x0, y0) = data[sample[0]];
            let (x1, y1) = data[sample[1]];
            if (x1 - x0).abs() < 1e-9 {
                return None;
            }
            let slope = (y1 - y0) / (x1 - x0);
            Some((slope, y0 - slope * x0))
        }

        fn residual(&self, model: &(f64, f64), datum: &(f64, f64)) -> f64 {
            let (slope, intercept) = *model;
            (slope * datum.0 - datum.1 + intercept).abs() / (slope * slope + 1.0).sqrt()
        }
    }

    fn opts() -> RansacOptions {
        RansacOptions {
            max_iters: 500,
            thresh: 0.05,
            min_inliers: 6,
            confidence: 0.99,
            seed: 42,
            refit_on_inliers: false,
        }
    }

    #[test]
    fn too_little_data_yields_no_model() {
        let res = ransac(&LineEstimator, &[(0.0, 0.0)], &opts());
        assert!(!res.success());
        assert!(res.inliers.is_empty());
    }

    #[test]
    fn recovers_line_among_outliers() {
        let mut data: Vec<_> = (0..10)
            .map(|i| {
                let x = i as f64 * 0.5;
                (x, 2.0 * x + 1.0 + if i % 2 == 0 { 0.01 } else { -0.01 })
            })
            .collect();
        data.extend([(5.0, -3.0), (6.0, 10.0), (7.0, -8.0)]);

        let res = ransac(&LineEstimator, &data, &opts());
        let (slope, intercept) = res.model.expect("consensus");
        assert!((slope - 2.0).abs() < 0.1);
        assert!((intercept - 1.0).abs() < 0.1);
        assert!(res.inliers.len() >= 6);
        let mask = res.inlier_mask(data.len());
        assert!(!mask[10] && !mask[11] && !mask[12]);
    }

    #[test]
    fn same_seed_same_result() {
        let data: Vec<_> = (0..30).map(|i| (i as f64, (i % 7) as f64)).collect();
        let a = ransac(&LineEstimator, &data, &opts());
        let b = ransac(&LineEstimator, &data, &opts());
        assert_eq!(a.inliers, b.inliers);
        assert_eq!(a.model, b.model);
    }

    #[test]
    fn adaptive_bound_shrinks_with_clean_data() {
        assert_eq!(adaptive_iterations(0.99, 0.0, 8, 1, 1000), 1000);
        let n = adaptive_iterations(0.99, 1.0, 8, 1, 1000);
        assert_eq!(n, 1);
        let n_half = adaptive_iterations(0.99, 0.5, 8, 1, 5000);
        assert!(n_half > 100 && n_half < 5000);
    }
}
