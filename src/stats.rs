use std::collections::HashMap;

/// Below this a standard deviation is treated as zero.
const STD_EPSILON: f64 = 1e-12;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1). `None` with fewer than two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

/// Z-scores `values` within each group. A group with fewer than two present values, or
/// zero spread, yields `None` for all of its rows; missing inputs stay missing.
pub fn zscore_by_group(values: &[Option<f64>], groups: &[Option<String>]) -> Vec<Option<f64>> {
    let mut members: HashMap<&str, Vec<f64>> = HashMap::new();
    for (v, g) in values.iter().zip(groups) {
        if let (Some(v), Some(g)) = (v, g)
            && v.is_finite()
        {
            members.entry(g.as_str()).or_default().push(*v);
        }
    }
    let params = members
        .into_iter()
        .filter_map(|(g, vals)| {
            let m = mean(&vals)?;
            let sd = sample_std(&vals)?;
            (sd > STD_EPSILON).then_some((g, (m, sd)))
        })
        .collect::<HashMap<_, _>>();

    values
        .iter()
        .zip(groups)
        .map(|(v, g)| {
            let v = (*v)?;
            let (m, sd) = params.get(g.as_deref()?)?;
            let z = (v - m) / sd;
            z.is_finite().then_some(z)
        })
        .collect()
}

pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

/// Linear-interpolated quantile over the finite values, `q` in [0, 1].
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect::<Vec<_>>();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

#[cfg(test)]
mod tests {
    use super::{median, quantile, sample_std, zscore_by_group};

    fn groups(labels: &[&str]) -> Vec<Option<String>> {
        labels.iter().map(|s| Some(s.to_string())).collect()
    }

    #[test]
    fn zscores_are_centered_per_group() {
        let values = vec![Some(1.0), Some(2.0), Some(3.0), Some(10.0), Some(30.0)];
        let g = groups(&["a", "a", "a", "b", "b"]);
        let z = zscore_by_group(&values, &g);
        let a = z[..3].iter().map(|v| v.expect("z")).collect::<Vec<_>>();
        assert!((a.iter().sum::<f64>()).abs() < 1e-12);
        assert!((sample_std(&a).expect("std") - 1.0).abs() < 1e-12);
        assert!((z[3].expect("z") + z[4].expect("z")).abs() < 1e-12);
    }

    #[test]
    fn degenerate_groups_have_no_value() {
        let values = vec![Some(5.0), Some(5.0), Some(7.0), None];
        let g = groups(&["flat", "flat", "single", "single"]);
        assert_eq!(zscore_by_group(&values, &g), vec![None, None, None, None]);
    }

    #[test]
    fn quantiles_interpolate() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(median(&v), Some(2.5));
        assert_eq!(quantile(&v, 0.0), Some(1.0));
        assert!((quantile(&v, 0.9).expect("q") - 3.7).abs() < 1e-12);
        assert_eq!(quantile(&[], 0.5), None);
    }
}
