use anyhow::{Result, anyhow};
use tracing::info;

use crate::linalg::{Matrix, symmetric_eigen};

/// Principal components keeping the smallest count whose cumulative explained variance
/// exceeds the target ratio.
#[derive(Debug, Clone)]
pub struct Pca {
    means: Vec<f64>,
    components: Matrix,
    explained_ratio: Vec<f64>,
}

impl Pca {
    pub fn fit(x: &Matrix, target_ratio: f64) -> Result<Self> {
        if x.rows() == 0 || x.cols() == 0 {
            return Err(anyhow!("pca needs a non-empty matrix"));
        }
        let d = x.cols();
        let means = (0..d)
            .map(|c| x.column(c).iter().sum::<f64>() / x.rows() as f64)
            .collect::<Vec<_>>();
        let (values, vectors) = symmetric_eigen(&x.covariance())?;
        let values = values.into_iter().map(|v| v.max(0.0)).collect::<Vec<_>>();
        let total = values.iter().sum::<f64>();
        let ratios = values
            .iter()
            .map(|v| if total > 0.0 { v / total } else { 0.0 })
            .collect::<Vec<_>>();

        let target = target_ratio.clamp(0.0, 1.0);
        let mut k = d;
        let mut cumulative = 0.0;
        for (i, r) in ratios.iter().enumerate() {
            cumulative += r;
            if cumulative > target {
                k = i + 1;
                break;
            }
        }
        let k = k.clamp(1, d);
        let keep = (0..k).collect::<Vec<_>>();
        let components = vectors.select_rows(&keep);
        let explained_ratio = ratios[..k].to_vec();
        info!(
            "pca: {k} components explain {:.2}% of variance",
            explained_ratio.iter().sum::<f64>() * 100.0
        );
        Ok(Self {
            means,
            components,
            explained_ratio,
        })
    }

    pub fn n_components(&self) -> usize {
        self.components.rows()
    }

    pub fn explained_ratio(&self) -> &[f64] {
        &self.explained_ratio
    }

    pub fn total_explained(&self) -> f64 {
        self.explained_ratio.iter().sum()
    }

    pub fn transform(&self, x: &Matrix) -> Matrix {
        let mut centered = x.clone();
        for r in 0..x.rows() {
            for (v, m) in centered.row_mut(r).iter_mut().zip(&self.means) {
                *v -= m;
            }
        }
        centered.project(&self.components)
    }
}

#[cfg(test)]
mod tests {
    use super::Pca;
    use crate::linalg::Matrix;

    #[test]
    fn collinear_data_needs_one_component() {
        let rows = (0..20)
            .map(|i| {
                let t = i as f64;
                vec![t, 2.0 * t, -t]
            })
            .collect::<Vec<_>>();
        let x = Matrix::from_rows(&rows).expect("matrix");
        let pca = Pca::fit(&x, 0.95).expect("fit");
        assert_eq!(pca.n_components(), 1);
        assert!((pca.total_explained() - 1.0).abs() < 1e-9);
        let z = pca.transform(&x);
        assert_eq!(z.cols(), 1);
        assert!((z.column(0).iter().sum::<f64>()).abs() < 1e-9);
    }

    #[test]
    fn full_target_keeps_every_component() {
        let x = Matrix::from_rows(&[
            vec![1.0, 0.0, 2.0],
            vec![0.0, 1.0, 1.0],
            vec![2.0, 3.0, 0.0],
            vec![1.0, 1.0, 5.0],
        ])
        .expect("matrix");
        let pca = Pca::fit(&x, 1.0).expect("fit");
        assert_eq!(pca.n_components(), 3);
    }
}
