//! Small dense-vector helpers shared by executors and the reference store.

/// Largest absolute element, 0.0 for an empty slice.
fn max_abs(v: &[f64]) -> f64 {
    v.iter().fold(0.0_f64, |m, x| m.max(x.abs()))
}

/// Euclidean norm, scaled so large elements do not overflow when squared.
pub fn norm(v: &[f64]) -> f64 {
    let scale = max_abs(v);
    if scale == 0.0 || !scale.is_finite() {
        return scale;
    }
    scale * v.iter().map(|x| (x / scale) * (x / scale)).sum::<f64>().sqrt()
}

/// Truncate or zero-pad to exactly `dim` elements.
pub fn resize(v: &[f64], dim: usize) -> Vec<f64> {
    let mut out = v.iter().take(dim).copied().collect::<Vec<_>>();
    out.resize(dim, 0.0);
    out
}

/// Scale to unit length. The exact zero vector is returned unchanged.
pub fn l2_normalize(mut v: Vec<f64>) -> Vec<f64> {
    let scale = max_abs(&v);
    if scale == 0.0 || !scale.is_finite() {
        return v;
    }
    for x in v.iter_mut() {
        *x /= scale;
    }
    let n = norm(&v);
    for x in v.iter_mut() {
        *x /= n;
    }
    v
}

/// True when every element is within `tolerance` of zero.
pub fn is_all_zero(v: &[f64], tolerance: f64) -> bool {
    v.iter().all(|x| x.abs() <= tolerance)
}

/// Elementwise mean of equal-length vectors. Returns `None` for an empty set.
pub fn elementwise_mean(vectors: &[Vec<f64>]) -> Option<Vec<f64>> {
    let first = vectors.first()?;
    let mut acc = vec![0.0; first.len()];
    for v in vectors {
        for (a, x) in acc.iter_mut().zip(v.iter()) {
            *a += x;
        }
    }
    let n = vectors.len() as f64;
    Some(acc.into_iter().map(|a| a / n).collect())
}

/// Cosine similarity over the common prefix of `a` and `b`.
///
/// Returns 0.0 when either side has zero norm.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let len = a.len().min(b.len());
    let (a, b) = (&a[..len], &b[..len]);
    let denom = norm(a) * norm(b);
    if denom == 0.0 {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum::<f64>() / denom
}

/// Mean squared error over the common prefix.
pub fn mean_squared_error(a: &[f64], b: &[f64]) -> f64 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }
    a.iter()
        .zip(b)
        .take(len)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        / len as f64
}
