use anyhow::{Result, anyhow};

const JACOBI_MAX_SWEEPS: usize = 100;
const JACOBI_TOLERANCE: f64 = 1e-20;

/// Dense row-major matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.set(i, i, 1.0);
        }
        m
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(anyhow!("row {i} has {} values, expected {cols}", row.len()));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, r: usize, c: usize) -> f64 {
        self.data[r * self.cols + c]
    }

    pub fn set(&mut self, r: usize, c: usize, v: f64) {
        self.data[r * self.cols + c] = v;
    }

    pub fn row(&self, r: usize) -> &[f64] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn row_mut(&mut self, r: usize) -> &mut [f64] {
        &mut self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks(self.cols.max(1)).take(self.rows)
    }

    pub fn column(&self, c: usize) -> Vec<f64> {
        (0..self.rows).map(|r| self.get(r, c)).collect()
    }

    pub fn select_rows(&self, rows: &[usize]) -> Matrix {
        let mut data = Vec::with_capacity(rows.len() * self.cols);
        for &r in rows {
            data.extend_from_slice(self.row(r));
        }
        Matrix {
            rows: rows.len(),
            cols: self.cols,
            data,
        }
    }

    /// Sample covariance of the columns (n - 1 denominator); zero with fewer than two rows.
    pub fn covariance(&self) -> Matrix {
        let d = self.cols;
        let mut cov = Matrix::zeros(d, d);
        if self.rows < 2 {
            return cov;
        }
        let means = (0..d)
            .map(|c| self.column(c).iter().sum::<f64>() / self.rows as f64)
            .collect::<Vec<_>>();
        for row in self.iter_rows() {
            for i in 0..d {
                let di = row[i] - means[i];
                for j in i..d {
                    let v = cov.get(i, j) + di * (row[j] - means[j]);
                    cov.set(i, j, v);
                }
            }
        }
        let denom = (self.rows - 1) as f64;
        for i in 0..d {
            for j in i..d {
                let v = cov.get(i, j) / denom;
                cov.set(i, j, v);
                cov.set(j, i, v);
            }
        }
        cov
    }

    /// `self * basis^T`: every row of `self` dotted with every row of `basis`.
    pub fn project(&self, basis: &Matrix) -> Matrix {
        let mut out = Matrix::zeros(self.rows, basis.rows);
        for r in 0..self.rows {
            let x = self.row(r);
            for k in 0..basis.rows {
                out.set(r, k, dot(x, basis.row(k)));
            }
        }
        out
    }
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations.
/// Returns eigenvalues in descending order with matching unit eigenvectors as rows.
pub fn symmetric_eigen(m: &Matrix) -> Result<(Vec<f64>, Matrix)> {
    let n = m.rows();
    if n != m.cols() {
        return Err(anyhow!("eigen decomposition needs a square matrix, got {}x{}", n, m.cols()));
    }
    let mut a = m.clone();
    let mut v = Matrix::identity(n);

    for _ in 0..JACOBI_MAX_SWEEPS {
        let off = (0..n)
            .flat_map(|p| ((p + 1)..n).map(move |q| (p, q)))
            .map(|(p, q)| a.get(p, q).powi(2))
            .sum::<f64>();
        if off < JACOBI_TOLERANCE {
            break;
        }
        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a.get(p, q);
                if apq.abs() < f64::MIN_POSITIVE {
                    continue;
                }
                let theta = (a.get(q, q) - a.get(p, p)) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;
                for k in 0..n {
                    let (akp, akq) = (a.get(k, p), a.get(k, q));
                    a.set(k, p, c * akp - s * akq);
                    a.set(k, q, s * akp + c * akq);
                }
                for k in 0..n {
                    let (apk, aqk) = (a.get(p, k), a.get(q, k));
                    a.set(p, k, c * apk - s * aqk);
                    a.set(q, k, s * apk + c * aqk);
                }
                for k in 0..n {
                    let (vkp, vkq) = (v.get(k, p), v.get(k, q));
                    v.set(k, p, c * vkp - s * vkq);
                    v.set(k, q, s * vkp + c * vkq);
                }
            }
        }
    }

    let mut order = (0..n).collect::<Vec<_>>();
    order.sort_by(|&i, &j| a.get(j, j).total_cmp(&a.get(i, i)));
    let values = order.iter().map(|&i| a.get(i, i)).collect::<Vec<_>>();
    let mut vectors = Matrix::zeros(n, n);
    for (row, &i) in order.iter().enumerate() {
        let mut vec = v.column(i);
        // Deterministic sign: largest-magnitude component positive.
        let pivot = vec
            .iter()
            .copied()
            .max_by(|x, y| x.abs().total_cmp(&y.abs()))
            .unwrap_or(0.0);
        if pivot < 0.0 {
            vec.iter_mut().for_each(|x| *x = -*x);
        }
        vectors.row_mut(row).copy_from_slice(&vec);
    }
    Ok((values, vectors))
}

#[cfg(test)]
mod tests {
    use super::{Matrix, dot, euclidean, symmetric_eigen};

    #[test]
    fn eigen_of_known_matrix() {
        let m = Matrix::from_rows(&[vec![2.0, 1.0], vec![1.0, 2.0]]).expect("matrix");
        let (values, vectors) = symmetric_eigen(&m).expect("eigen");
        assert!((values[0] - 3.0).abs() < 1e-10);
        assert!((values[1] - 1.0).abs() < 1e-10);
        let v0 = vectors.row(0);
        assert!((v0[0] - v0[1]).abs() < 1e-10);
        assert!((dot(v0, v0) - 1.0).abs() < 1e-10);
        assert!(dot(v0, vectors.row(1)).abs() < 1e-10);
    }

    #[test]
    fn covariance_matches_hand_computation() {
        let m = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 6.0], vec![5.0, 10.0]])
            .expect("matrix");
        let cov = m.covariance();
        assert!((cov.get(0, 0) - 4.0).abs() < 1e-12);
        assert!((cov.get(0, 1) - 8.0).abs() < 1e-12);
        assert!((cov.get(1, 1) - 16.0).abs() < 1e-12);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        assert!(Matrix::from_rows(&[vec![1.0], vec![1.0, 2.0]]).is_err());
        assert_eq!(euclidean(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
    }
}
