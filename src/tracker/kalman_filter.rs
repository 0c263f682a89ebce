//! Constant-velocity Kalman filter over `[x, y, vx, vy]` using ndarray, with
//! the 2x2 innovation inverse done by nalgebra.

use ndarray::{Array1, Array2, array};

use crate::config::TrackerConfig;

const STATE_DIM: usize = 4;
const MEASUREMENT_DIM: usize = 2;

/// Relative asymmetry tolerated before a covariance is considered corrupt.
const SYMMETRY_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct KalmanFilter {
    update_mat: Array2<f64>,
    process_noise_pos: f64,
    process_noise_vel: f64,
    measurement_noise: f64,
    initial_position_variance: f64,
    initial_velocity_variance: f64,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new(&TrackerConfig::default())
    }
}

impl KalmanFilter {
    pub fn new(config: &TrackerConfig) -> Self {
        let mut update_mat = Array2::zeros((MEASUREMENT_DIM, STATE_DIM));
        for i in 0..MEASUREMENT_DIM {
            update_mat[[i, i]] = 1.0;
        }

        Self {
            update_mat,
            process_noise_pos: config.process_noise_pos,
            process_noise_vel: config.process_noise_vel,
            measurement_noise: config.measurement_noise,
            initial_position_variance: config.initial_position_variance,
            initial_velocity_variance: config.initial_velocity_variance,
        }
    }

    fn motion_mat(dt: f64) -> Array2<f64> {
        let mut motion_mat = Array2::eye(STATE_DIM);
        motion_mat[[0, 2]] = dt;
        motion_mat[[1, 3]] = dt;
        motion_mat
    }

    fn motion_cov(&self, dt: f64) -> Array2<f64> {
        Array2::from_diag(&array![
            self.process_noise_pos * dt,
            self.process_noise_pos * dt,
            self.process_noise_vel * dt,
            self.process_noise_vel * dt,
        ])
    }

    fn initial_cov(&self) -> Array2<f64> {
        Array2::from_diag(&array![
            self.initial_position_variance,
            self.initial_position_variance,
            self.initial_velocity_variance,
            self.initial_velocity_variance,
        ])
    }

    /// Start a track at a measured position with unknown velocity.
    pub fn initiate(&self, measurement: [f64; 2]) -> (Array1<f64>, Array2<f64>) {
        let mean = array![measurement[0], measurement[1], 0.0, 0.0];
        (mean, self.initial_cov())
    }

    pub fn predict(
        &self,
        mean: &Array1<f64>,
        covariance: &Array2<f64>,
        dt: f64,
    ) -> (Array1<f64>, Array2<f64>) {
        let motion_mat = Self::motion_mat(dt);
        let new_mean = motion_mat.dot(mean);
        let new_covariance = motion_mat.dot(covariance).dot(&motion_mat.t()) + self.motion_cov(dt);

        (new_mean, new_covariance)
    }

    /// Fresh covariance for a track whose estimate became unusable: the initial
    /// uncertainty plus process noise scaled by `factor`.
    pub fn reinflated_covariance(&self, dt: f64, factor: f64) -> Array2<f64> {
        self.initial_cov() + self.motion_cov(dt) * factor
    }

    pub fn project(
        &self,
        mean: &Array1<f64>,
        covariance: &Array2<f64>,
    ) -> (Array1<f64>, Array2<f64>) {
        let innovation_cov = Array2::from_diag(&array![self.measurement_noise, self.measurement_noise]);

        let mean_proj = self.update_mat.dot(mean);
        let covariance_proj =
            self.update_mat.dot(covariance).dot(&self.update_mat.t()) + innovation_cov;

        (mean_proj, covariance_proj)
    }

    /// Squared Mahalanobis distance between the projected state and a
    /// measurement. `None` when the innovation covariance is singular.
    pub fn gating_distance(
        &self,
        mean: &Array1<f64>,
        covariance: &Array2<f64>,
        measurement: [f64; 2],
    ) -> Option<f64> {
        let (projected_mean, projected_cov) = self.project(mean, covariance);
        let s_inv = invert_2x2(&projected_cov)?;
        let d = array![
            measurement[0] - projected_mean[0],
            measurement[1] - projected_mean[1]
        ];
        let dist = d.dot(&s_inv.dot(&d));
        dist.is_finite().then_some(dist)
    }

    /// Correct the state with a measured centroid. `None` when the innovation
    /// covariance cannot be inverted; the caller keeps its previous estimate.
    pub fn update(
        &self,
        mean: &Array1<f64>,
        covariance: &Array2<f64>,
        measurement: [f64; 2],
    ) -> Option<(Array1<f64>, Array2<f64>)> {
        let (projected_mean, projected_cov) = self.project(mean, covariance);

        let measurement_arr = array![measurement[0], measurement[1]];
        let innovation = measurement_arr - projected_mean;

        // K = P * H^T * S^-1
        let s_inv = invert_2x2(&projected_cov)?;

        let pht = covariance.dot(&self.update_mat.t()); // 4x2
        let kalman_gain = pht.dot(&s_inv); // 4x2

        let new_mean = mean + &kalman_gain.dot(&innovation);
        let new_covariance = covariance - &kalman_gain.dot(&projected_cov).dot(&kalman_gain.t());
        let new_covariance = (&new_covariance + &new_covariance.t()) * 0.5;

        Some((new_mean, new_covariance))
    }
}

/// Invert a 2x2 matrix using nalgebra (pure Rust).
fn invert_2x2(m: &Array2<f64>) -> Option<Array2<f64>> {
    let nm = nalgebra::Matrix2::new(m[[0, 0]], m[[0, 1]], m[[1, 0]], m[[1, 1]]);
    let inv = nm.try_inverse()?;
    if inv.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(array![[inv[(0, 0)], inv[(0, 1)]], [inv[(1, 0)], inv[(1, 1)]]])
}

/// Finite, symmetric, with a positive diagonal.
pub fn is_well_conditioned(covariance: &Array2<f64>) -> bool {
    let (rows, cols) = covariance.dim();
    if rows != cols || covariance.iter().any(|v| !v.is_finite()) {
        return false;
    }
    for i in 0..rows {
        if covariance[[i, i]] <= 0.0 {
            return false;
        }
        for j in (i + 1)..cols {
            let a = covariance[[i, j]];
            let b = covariance[[j, i]];
            let scale = a.abs().max(b.abs()).max(1.0);
            if (a - b).abs() > SYMMETRY_TOLERANCE * scale {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_initiate() {
        let kf = KalmanFilter::default();
        let (mean, cov) = kf.initiate([100.0, 200.0]);
        assert_eq!(mean[0], 100.0);
        assert_eq!(mean[1], 200.0);
        assert_eq!(mean[2], 0.0);
        assert!(is_well_conditioned(&cov));
    }

    #[test]
    fn test_predict_moves_with_velocity() {
        let kf = KalmanFilter::default();
        let mean = array![0.0, 0.0, 10.0, -5.0];
        let (_, cov) = kf.initiate([0.0, 0.0]);
        let (pred, pred_cov) = kf.predict(&mean, &cov, 0.1);
        assert_relative_eq!(pred[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(pred[1], -0.5, epsilon = 1e-12);
        assert!(pred_cov[[0, 0]] > cov[[0, 0]]);
    }

    #[test]
    fn test_update_converges_on_velocity() {
        let kf = KalmanFilter::default();
        let (mut mean, mut cov) = kf.initiate([0.0, 0.0]);
        for k in 1..=10 {
            let (m, c) = kf.predict(&mean, &cov, 0.1);
            let (m, c) = kf.update(&m, &c, [k as f64, 0.0]).unwrap();
            mean = m;
            cov = c;
        }
        assert_relative_eq!(mean[2], 10.0, epsilon = 0.2);
        assert_relative_eq!(mean[3], 0.0, epsilon = 1e-9);
        assert!(is_well_conditioned(&cov));
    }

    #[test]
    fn test_gating_distance_grows_with_offset() {
        let kf = KalmanFilter::default();
        let (mean, cov) = kf.initiate([0.0, 0.0]);
        let near = kf.gating_distance(&mean, &cov, [0.1, 0.0]).unwrap();
        let far = kf.gating_distance(&mean, &cov, [3.0, 0.0]).unwrap();
        assert!(near < far);
        // S = 0.05 + 0.05 on the diagonal
        assert_relative_eq!(far, 9.0 / 0.1, epsilon = 1e-9);
    }

    #[test]
    fn test_singular_innovation_is_reported() {
        let kf = KalmanFilter::default();
        let mean = array![0.0, 0.0, 0.0, 0.0];
        let mut cov = Array2::zeros((4, 4));
        cov[[0, 0]] = -0.05;
        assert!(kf.update(&mean, &cov, [1.0, 1.0]).is_none());
        assert!(kf.gating_distance(&mean, &cov, [1.0, 1.0]).is_none());
        assert!(!is_well_conditioned(&cov));
    }

    #[test]
    fn test_reinflated_covariance_is_usable() {
        let kf = KalmanFilter::default();
        let cov = kf.reinflated_covariance(0.1, 10.0);
        assert!(is_well_conditioned(&cov));
        assert_relative_eq!(cov[[0, 0]], 0.05 + 0.1 * 0.1 * 10.0, epsilon = 1e-12);
    }
}
