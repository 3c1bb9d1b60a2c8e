//! RANSAC homography estimation
//!
//! Fits a 3x3 projective transform between two point sets with a
//! RANSAC-style estimator: minimal 4-point DLT hypotheses, inlier counting
//! under a reprojection threshold, and a final least-squares refit over the
//! best consensus set.

use nalgebra::{DMatrix, Matrix3, SymmetricEigen, Vector3};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample;

/// Minimum number of point correspondences for a homography fit.
pub const MIN_MATCHES: usize = 4;

/// Maximum RANSAC iterations.
const MAX_ITERATIONS: usize = 2000;

/// Confidence target used to shrink the iteration count adaptively.
const CONFIDENCE: f64 = 0.995;

/// A fitted homography together with its consensus set.
#[derive(Debug, Clone)]
pub struct Homography {
    /// The 3x3 transform, normalised so that `matrix[(2, 2)] == 1`.
    pub matrix: Matrix3<f64>,
    /// Inlier flags, one per input correspondence.
    pub inliers: Vec<bool>,
}

impl Homography {
    /// Number of correspondences in the consensus set.
    #[must_use]
    pub fn inlier_count(&self) -> usize {
        self.inliers.iter().filter(|&&flag| flag).count()
    }

    /// Fraction of correspondences explained by the transform.
    #[must_use]
    pub fn inlier_ratio(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        {
            self.inlier_count() as f64 / self.inliers.len() as f64
        }
    }

    /// Determinant of the full 3x3 matrix.
    #[must_use]
    pub fn determinant(&self) -> f64 {
        self.matrix.determinant()
    }

    /// 2-norm condition number of the top-left 2x2 block: the ratio of its
    /// largest to smallest singular value. Infinite for a singular block.
    #[must_use]
    pub fn top_left_condition(&self) -> f64 {
        let block = self.matrix.fixed_view::<2, 2>(0, 0).into_owned();
        let singular = block.svd(false, false).singular_values;
        let (max, min) = (
            singular[0].max(singular[1]),
            singular[0].min(singular[1]),
        );
        if min <= f64::EPSILON {
            f64::INFINITY
        } else {
            max / min
        }
    }
}

/// Fits a homography mapping `src` points onto `dst` points.
///
/// Returns `None` when fewer than four correspondences are given, or when
/// no non-degenerate hypothesis gathers at least four inliers under the
/// reprojection `threshold` (in pixels).
#[must_use]
pub fn fit_homography(src: &[[f64; 2]], dst: &[[f64; 2]], threshold: f64) -> Option<Homography> {
    assert_eq!(src.len(), dst.len(), "correspondence lists must align");
    let n = src.len();
    if n < MIN_MATCHES {
        return None;
    }

    // Deterministic sampling keeps results reproducible across workers.
    let mut rng = StdRng::seed_from_u64(0x1D10_5EED);

    let mut best_inliers: Vec<bool> = Vec::new();
    let mut best_count = 0usize;
    let mut iterations = MAX_ITERATIONS;
    let mut iteration = 0usize;

    while iteration < iterations {
        iteration += 1;

        let picks = sample(&mut rng, n, MIN_MATCHES);
        let sample_src: Vec<[f64; 2]> = picks.iter().map(|i| src[i]).collect();
        let sample_dst: Vec<[f64; 2]> = picks.iter().map(|i| dst[i]).collect();

        let Some(candidate) = dlt(&sample_src, &sample_dst) else {
            continue;
        };

        let inliers = classify(&candidate, src, dst, threshold);
        let count = inliers.iter().filter(|&&flag| flag).count();
        if count > best_count {
            best_count = count;
            best_inliers = inliers;

            // Standard adaptive bound: stop once enough iterations have run
            // for the observed inlier fraction.
            #[allow(clippy::cast_precision_loss)]
            let w = count as f64 / n as f64;
            let p_outlier_free = w.powi(4);
            if p_outlier_free > 0.0 && p_outlier_free < 1.0 {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let needed = ((1.0 - CONFIDENCE).ln() / (1.0 - p_outlier_free).ln()).ceil() as usize;
                iterations = iterations.min(needed.max(1));
            } else if p_outlier_free >= 1.0 {
                break;
            }
        }
    }

    if best_count < MIN_MATCHES {
        return None;
    }

    // Least-squares refit over the consensus set, then reclassify so the
    // reported mask matches the reported matrix.
    let consensus_src: Vec<[f64; 2]> = pick(src, &best_inliers);
    let consensus_dst: Vec<[f64; 2]> = pick(dst, &best_inliers);
    let matrix = dlt(&consensus_src, &consensus_dst)?;
    let inliers = classify(&matrix, src, dst, threshold);
    if inliers.iter().filter(|&&flag| flag).count() < MIN_MATCHES {
        return None;
    }

    Some(Homography { matrix, inliers })
}

fn pick(points: &[[f64; 2]], mask: &[bool]) -> Vec<[f64; 2]> {
    points
        .iter()
        .zip(mask)
        .filter_map(|(p, &keep)| keep.then_some(*p))
        .collect()
}

/// Direct linear transform over `n >= 4` correspondences.
///
/// Solves for the null vector of the 2n x 9 design matrix through the
/// eigen decomposition of its normal matrix, and normalises the result so
/// the bottom-right element is 1. Returns `None` for degenerate
/// configurations.
fn dlt(src: &[[f64; 2]], dst: &[[f64; 2]]) -> Option<Matrix3<f64>> {
    let n = src.len();
    let mut rows = Vec::with_capacity(2 * n * 9);
    for ([x, y], [u, v]) in src.iter().zip(dst) {
        rows.extend_from_slice(&[-x, -y, -1.0, 0.0, 0.0, 0.0, u * x, u * y, *u]);
        rows.extend_from_slice(&[0.0, 0.0, 0.0, -x, -y, -1.0, v * x, v * y, *v]);
    }
    let a = DMatrix::from_row_slice(2 * n, 9, &rows);
    let normal = a.transpose() * &a;
    let eigen = SymmetricEigen::new(normal);

    let mut min_index = 0;
    for i in 1..eigen.eigenvalues.len() {
        if eigen.eigenvalues[i] < eigen.eigenvalues[min_index] {
            min_index = i;
        }
    }
    let h = eigen.eigenvectors.column(min_index);

    let scale = h[8];
    if scale.abs() < 1e-12 {
        return None;
    }
    Some(Matrix3::new(
        h[0] / scale,
        h[1] / scale,
        h[2] / scale,
        h[3] / scale,
        h[4] / scale,
        h[5] / scale,
        h[6] / scale,
        h[7] / scale,
        1.0,
    ))
}

/// Flags the correspondences whose reprojection error is within `threshold`.
fn classify(matrix: &Matrix3<f64>, src: &[[f64; 2]], dst: &[[f64; 2]], threshold: f64) -> Vec<bool> {
    src.iter()
        .zip(dst)
        .map(|([x, y], [u, v])| {
            let projected = matrix * Vector3::new(*x, *y, 1.0);
            if projected[2].abs() < 1e-12 {
                return false;
            }
            let (px, py) = (projected[0] / projected[2], projected[1] / projected[2]);
            ((px - u).powi(2) + (py - v).powi(2)).sqrt() <= threshold
        })
        .collect()
}
