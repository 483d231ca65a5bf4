/// Cosine similarity for f32 embedding vectors. Returns 0.0 for zero-norm or
/// mismatched-length inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// `1 - cosine_similarity`, the distance the topic registry reports.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    1.0 - cosine_similarity(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors() {
        let a = [0.3, 0.4, 0.5];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-9);
        assert!(cosine_distance(&a, &a).abs() < 1e-9);
    }

    #[test]
    fn orthogonal_vectors() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_and_mismatched_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn known_angle() {
        // cos = 0.85 by construction
        let b = [0.85f32, (1.0f32 - 0.85 * 0.85).sqrt()];
        assert!((cosine_similarity(&[1.0, 0.0], &b) - 0.85).abs() < 1e-6);
    }
}
