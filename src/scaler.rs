use crate::linalg::Matrix;

/// Per-column standardisation with population std. Zero-variance columns map to 0.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(x: &Matrix) -> Self {
        let n = x.rows().max(1) as f64;
        let mut means = Vec::with_capacity(x.cols());
        let mut stds = Vec::with_capacity(x.cols());
        for c in 0..x.cols() {
            let col = x.column(c);
            let mean = col.iter().sum::<f64>() / n;
            let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            means.push(mean);
            stds.push(var.sqrt());
        }
        Self { means, stds }
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.stds))
            .map(|(v, (m, s))| if *s > 0.0 { (v - m) / s } else { 0.0 })
            .collect()
    }

    pub fn transform(&self, x: &Matrix) -> Matrix {
        let mut out = x.clone();
        for r in 0..x.rows() {
            let scaled = self.transform_row(x.row(r));
            out.row_mut(r).copy_from_slice(&scaled);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::StandardScaler;
    use crate::linalg::Matrix;

    #[test]
    fn constant_column_scales_to_zero() {
        let x = Matrix::from_rows(&[vec![1.0, 7.0], vec![3.0, 7.0], vec![5.0, 7.0]])
            .expect("matrix");
        let scaler = StandardScaler::fit(&x);
        let z = scaler.transform(&x);
        for r in 0..3 {
            assert_eq!(z.get(r, 1), 0.0);
        }
        let col = z.column(0);
        assert!(col.iter().sum::<f64>().abs() < 1e-12);
        let var = col.iter().map(|v| v * v).sum::<f64>() / 3.0;
        assert!((var - 1.0).abs() < 1e-12);
    }
}
