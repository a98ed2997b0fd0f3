//! Periodic interpolating cubic spline.
//!
//! The curve passes through every control point and is C2 continuous across
//! the closing seam. Knots use chord-length parameterization; the second
//! derivatives at the knots come from a cyclic tridiagonal system per axis,
//! solved in `f64` by Gaussian elimination with partial pivoting.

use super::geometry::Vec2;
use super::track::GeometryError;

/// Closed cubic spline through a ring of control points.
#[derive(Debug, Clone)]
pub struct PeriodicSpline {
    /// Knot parameters, `knots[0] == 0`, strictly increasing.
    knots: Vec<f64>,
    /// Total parameter length (the closing knot).
    period: f64,
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Second derivatives at the knots.
    mx: Vec<f64>,
    my: Vec<f64>,
}

impl PeriodicSpline {
    /// Fit a closed spline. The first point must not be repeated at the end.
    pub fn fit(points: &[Vec2]) -> Result<Self, GeometryError> {
        let n = points.len();
        if n < 3 {
            return Err(GeometryError::TooFewControlPoints(n));
        }
        let xs: Vec<f64> = points.iter().map(|p| p.x as f64).collect();
        let ys: Vec<f64> = points.iter().map(|p| p.y as f64).collect();

        let mut h = Vec::with_capacity(n);
        for i in 0..n {
            let j = (i + 1) % n;
            let chord = (xs[j] - xs[i]).hypot(ys[j] - ys[i]);
            if !(chord > 1e-6) {
                return Err(GeometryError::CoincidentControlPoints(i, j));
            }
            h.push(chord);
        }

        let mut knots = Vec::with_capacity(n);
        let mut t = 0.0;
        for &hi in &h {
            knots.push(t);
            t += hi;
        }

        let mx = solve_second_derivatives(&h, &xs)?;
        let my = solve_second_derivatives(&h, &ys)?;

        Ok(Self {
            knots,
            period: t,
            xs,
            ys,
            mx,
            my,
        })
    }

    /// Total parameter length of one loop.
    pub fn period(&self) -> f64 {
        self.period
    }

    /// Evaluate the curve at parameter `t` (wrapped into one period).
    pub fn eval(&self, t: f64) -> Vec2 {
        let n = self.knots.len();
        let t = t.rem_euclid(self.period);
        // Last knot whose parameter is <= t.
        let i = match self
            .knots
            .binary_search_by(|k| k.total_cmp(&t))
        {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let j = (i + 1) % n;
        let t0 = self.knots[i];
        let t1 = if j == 0 { self.period } else { self.knots[j] };
        let hi = t1 - t0;
        let a = t1 - t;
        let b = t - t0;

        let segment = |y: &[f64], m: &[f64]| {
            m[i] * a * a * a / (6.0 * hi)
                + m[j] * b * b * b / (6.0 * hi)
                + (y[i] / hi - m[i] * hi / 6.0) * a
                + (y[j] / hi - m[j] * hi / 6.0) * b
        };

        Vec2::new(
            segment(&self.xs, &self.mx) as f32,
            segment(&self.ys, &self.my) as f32,
        )
    }

    /// `count` points at evenly spaced parameters on `[0, period)`.
    pub fn sample(&self, count: usize) -> Vec<Vec2> {
        (0..count)
            .map(|i| self.eval(self.period * i as f64 / count as f64))
            .collect()
    }
}

/// Solve the cyclic system
/// `h[i-1] M[i-1] + 2 (h[i-1] + h[i]) M[i] + h[i] M[i+1] = 6 (d[i] - d[i-1])`
/// with `d[i] = (y[i+1] - y[i]) / h[i]` and indices taken modulo `n`.
fn solve_second_derivatives(h: &[f64], y: &[f64]) -> Result<Vec<f64>, GeometryError> {
    let n = h.len();
    let slope = |i: usize| (y[(i + 1) % n] - y[i]) / h[i];

    let mut a = vec![vec![0.0f64; n]; n];
    let mut rhs = vec![0.0f64; n];
    for i in 0..n {
        let prev = (i + n - 1) % n;
        let next = (i + 1) % n;
        a[i][prev] += h[prev];
        a[i][i] += 2.0 * (h[prev] + h[i]);
        a[i][next] += h[i];
        rhs[i] = 6.0 * (slope(i) - slope(prev));
    }

    gaussian_solve(a, rhs)
}

/// Dense Gaussian elimination with partial pivoting.
fn gaussian_solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, GeometryError> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&r, &s| a[r][col].abs().total_cmp(&a[s][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-12 {
            return Err(GeometryError::SingularSystem);
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0f64; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn polygon(n: usize, radius: f32) -> Vec<Vec2> {
        (0..n)
            .map(|i| {
                let a = i as f32 / n as f32 * std::f32::consts::TAU;
                Vec2::new(500.0 + radius * a.cos(), 500.0 + radius * a.sin())
            })
            .collect()
    }

    #[test]
    fn test_interpolates_control_points() {
        let points = polygon(8, 200.0);
        let spline = PeriodicSpline::fit(&points).unwrap();
        let mut t = 0.0;
        for (i, p) in points.iter().enumerate() {
            let q = spline.eval(t);
            assert!(p.distance(q) < 1e-2, "knot {i}: {p:?} vs {q:?}");
            t += points[i].distance(points[(i + 1) % points.len()]) as f64;
        }
    }

    #[test]
    fn test_closed_at_seam() {
        let spline = PeriodicSpline::fit(&polygon(12, 300.0)).unwrap();
        let start = spline.eval(0.0);
        let end = spline.eval(spline.period() - 1e-6);
        assert!(start.distance(end) < 1e-2);
    }

    #[test]
    fn test_circle_stays_near_radius() {
        let spline = PeriodicSpline::fit(&polygon(20, 300.0)).unwrap();
        for p in spline.sample(400) {
            let r = p.distance(Vec2::new(500.0, 500.0));
            assert!((r - 300.0).abs() < 3.0, "radius {r}");
        }
    }

    #[test]
    fn test_sample_excludes_endpoint() {
        let points = polygon(6, 100.0);
        let spline = PeriodicSpline::fit(&points).unwrap();
        let samples = spline.sample(60);
        assert_eq!(samples.len(), 60);
        assert!(samples[0].distance(points[0]) < 1e-3);
        assert!(samples[59].distance(points[0]) > 1.0);
    }

    #[test]
    fn test_coincident_points_rejected() {
        let points = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(10.0, 0.0),
            Vec2::new(10.0, 0.0),
            Vec2::new(0.0, 10.0),
        ];
        assert!(matches!(
            PeriodicSpline::fit(&points),
            Err(GeometryError::CoincidentControlPoints(1, 2))
        ));
    }
}
