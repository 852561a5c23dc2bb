//! Small numerical toolkit for the predictive model: descriptive statistics,
//! least squares, Pearson correlation and a seeded normal sampler.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const PIVOT_EPSILON: f64 = 1e-12;

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Population standard deviation (divides by `n`).
pub fn std_dev(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let m = mean(xs);
    (xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64).sqrt()
}

/// Column scaler: zero mean, unit variance. A constant column is only centred.
#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl Standardizer {
    pub fn fit(columns: &[Vec<f64>]) -> Self {
        let means = columns.iter().map(|c| mean(c)).collect();
        let scales = columns
            .iter()
            .map(|c| {
                let sd = std_dev(c);
                if sd == 0.0 {
                    1.0
                } else {
                    sd
                }
            })
            .collect();
        Self { means, scales }
    }

    pub fn transform(&self, columns: &[Vec<f64>]) -> Vec<Vec<f64>> {
        columns
            .iter()
            .enumerate()
            .map(|(j, c)| c.iter().map(|x| (x - self.means[j]) / self.scales[j]).collect())
            .collect()
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .enumerate()
            .map(|(j, x)| (x - self.means[j]) / self.scales[j])
            .collect()
    }
}

/// Ordinary least squares with intercept.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearFit {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

impl LinearFit {
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(b, x)| b * x)
                .sum::<f64>()
    }

    /// `columns` is column-major: one vector per feature.
    pub fn predict(&self, columns: &[Vec<f64>], n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let row: Vec<f64> = columns.iter().map(|c| c[i]).collect();
                self.predict_row(&row)
            })
            .collect()
    }
}

/// Fits `y = b0 + Σ bj·xj` through the normal equations.
///
/// Returns `None` when the inputs are empty or the column lengths disagree.
pub fn ols_fit(columns: &[Vec<f64>], y: &[f64]) -> Option<LinearFit> {
    let n = y.len();
    if n == 0 || columns.iter().any(|c| c.len() != n) {
        return None;
    }
    let k = columns.len();
    let m = k + 1;

    // design column 0 is the intercept
    let design = |row: usize, col: usize| -> f64 {
        if col == 0 {
            1.0
        } else {
            columns[col - 1][row]
        }
    };

    let mut system = vec![vec![0.0; m + 1]; m];
    for (a, eq) in system.iter_mut().enumerate() {
        for b in 0..m {
            eq[b] = (0..n).map(|i| design(i, a) * design(i, b)).sum();
        }
        eq[m] = (0..n).map(|i| design(i, a) * y[i]).sum();
    }

    let beta = solve_linear_system(system);
    Some(LinearFit {
        intercept: beta[0],
        coefficients: beta[1..].to_vec(),
    })
}

/// Gaussian elimination with partial pivoting on an augmented `m × (m+1)`
/// matrix. Unknowns whose pivot vanishes are pinned to zero.
fn solve_linear_system(mut a: Vec<Vec<f64>>) -> Vec<f64> {
    let m = a.len();
    for col in 0..m {
        let pivot_row = (col..m)
            .max_by(|&r1, &r2| a[r1][col].abs().total_cmp(&a[r2][col].abs()))
            .unwrap_or(col);

        if a[pivot_row][col].abs() < PIVOT_EPSILON {
            for (j, cell) in a[col].iter_mut().enumerate() {
                *cell = if j == col { 1.0 } else { 0.0 };
            }
            for row in a.iter_mut().skip(col + 1) {
                row[col] = 0.0;
            }
            continue;
        }
        a.swap(col, pivot_row);

        for row in col + 1..m {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for j in col..=m {
                a[row][j] -= factor * a[col][j];
            }
        }
    }

    let mut x = vec![0.0; m];
    for i in (0..m).rev() {
        let tail: f64 = (i + 1..m).map(|j| a[i][j] * x[j]).sum();
        x[i] = (a[i][m] - tail) / a[i][i];
    }
    x
}

pub fn r_squared(y: &[f64], predicted: &[f64]) -> f64 {
    let m = mean(y);
    let ss_tot: f64 = y.iter().map(|v| (v - m).powi(2)).sum();
    if ss_tot == 0.0 {
        return 0.0;
    }
    let ss_res: f64 = y
        .iter()
        .zip(predicted)
        .map(|(v, p)| (v - p).powi(2))
        .sum();
    1.0 - ss_res / ss_tot
}

/// Pearson correlation with its two-sided p-value (Student t, `n - 2` dof).
pub fn pearson(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let n = x.len();
    if n < 3 || y.len() != n {
        return None;
    }
    let (mx, my) = (mean(x), mean(y));
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }

    let r = (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0);
    let df = (n - 2) as f64;
    let p = if 1.0 - r.abs() < 1e-15 {
        0.0
    } else {
        let t2 = r * r * df / (1.0 - r * r);
        regularized_incomplete_beta(df / (df + t2), df / 2.0, 0.5)
    };
    Some((r, p.clamp(0.0, 1.0)))
}

fn ln_gamma(x: f64) -> f64 {
    // Lanczos, g = 7
    const COEFFS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut acc = COEFFS[0];
    for (i, c) in COEFFS.iter().enumerate().skip(1) {
        acc += c / (x + i as f64);
    }
    let t = x + 7.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + acc.ln()
}

/// `I_x(a, b)` by Lentz's continued fraction.
pub fn regularized_incomplete_beta(x: f64, a: f64, b: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(x, a, b) / a
    } else {
        1.0 - front * beta_continued_fraction(1.0 - x, b, a) / b
    }
}

fn beta_continued_fraction(x: f64, a: f64, b: f64) -> f64 {
    const MAX_ITER: usize = 300;
    const EPS: f64 = 3e-16;
    const TINY: f64 = 1e-300;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// Seeded standard normal draws (Box–Muller).
pub struct NormalSampler {
    rng: StdRng,
    spare: Option<f64>,
}

impl NormalSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            spare: None,
        }
    }

    pub fn standard(&mut self) -> f64 {
        if let Some(z) = self.spare.take() {
            return z;
        }
        // (0, 1] keeps ln() finite
        let u1: f64 = 1.0 - self.rng.gen::<f64>();
        let u2: f64 = self.rng.gen::<f64>();
        let radius = (-2.0 * u1.ln()).sqrt();
        let angle = 2.0 * std::f64::consts::PI * u2;
        self.spare = Some(radius * angle.sin());
        radius * angle.cos()
    }

    pub fn normal(&mut self, mean: f64, sd: f64) -> f64 {
        mean + sd * self.standard()
    }

    pub fn sample(&mut self, mean: f64, sd: f64, n: usize) -> Vec<f64> {
        (0..n).map(|_| self.normal(mean, sd)).collect()
    }
}
