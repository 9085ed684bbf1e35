//! Cosine similarity and ranked nearest-neighbour selection.

use gitlore_core::types::Scored;

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a = l2_norm(a);
    let mag_b = l2_norm(b);

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    (dot / (mag_a * mag_b)).clamp(-1.0, 1.0)
}

pub fn l2_norm(v: &[f32]) -> f64 {
    v.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt()
}

/// Euclidean distance; 0.0 when the lengths differ.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| ((*x as f64) - (*y as f64)).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Element-wise mean of equal-length vectors. `None` for an empty input or
/// mixed lengths.
pub fn mean_vector(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let dim = first.len();
    if vectors.iter().any(|v| v.len() != dim) {
        return None;
    }
    let mut sum = vec![0.0f64; dim];
    for v in vectors {
        for (acc, x) in sum.iter_mut().zip(v) {
            *acc += *x as f64;
        }
    }
    let n = vectors.len() as f64;
    Some(sum.into_iter().map(|s| (s / n) as f32).collect())
}

/// Sort by descending similarity, keeping input order among ties.
pub fn sort_by_similarity<T>(scored: &mut [Scored<T>]) {
    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Candidates with similarity `>= threshold`, best first, at most `top_k`.
pub fn find_similar<T: Clone>(
    query: &[f32],
    candidates: &[(T, Vec<f32>)],
    top_k: usize,
    threshold: f64,
) -> Vec<Scored<T>> {
    let mut scored: Vec<Scored<T>> = candidates
        .iter()
        .filter_map(|(item, embedding)| {
            let similarity = cosine_similarity(query, embedding);
            (similarity >= threshold).then(|| Scored {
                item: item.clone(),
                similarity,
            })
        })
        .collect();
    sort_by_similarity(&mut scored);
    scored.truncate(top_k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors() {
        let v = vec![0.3f32, -1.2, 4.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_vector_similarity_is_zero() {
        let zero = vec![0.0f32; 3];
        assert_eq!(cosine_similarity(&zero, &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn test_length_mismatch_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_opposite_and_orthogonal() {
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
    }

    #[test]
    fn test_l2_helpers() {
        assert!((l2_norm(&[3.0, 4.0]) - 5.0).abs() < 1e-9);
        assert!((l2_distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-9);
        assert_eq!(mean_vector(&[vec![1.0, 3.0], vec![3.0, 5.0]]), Some(vec![2.0, 4.0]));
        assert_eq!(mean_vector(&[]), None);
        assert_eq!(mean_vector(&[vec![1.0], vec![1.0, 2.0]]), None);
    }

    #[test]
    fn test_find_similar_threshold_and_order() {
        let candidates = vec![
            ("far", vec![0.0f32, 1.0]),
            ("close", vec![1.0f32, 0.1]),
            ("exact", vec![1.0f32, 0.0]),
            ("mid", vec![1.0f32, 1.0]),
        ];
        let hits = find_similar(&[1.0, 0.0], &candidates, 10, 0.5);
        let ids: Vec<_> = hits.iter().map(|h| h.item).collect();
        assert_eq!(ids, vec!["exact", "close", "mid"]);
        assert!(hits.iter().all(|h| h.similarity >= 0.5));
        assert!(hits.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    #[test]
    fn test_find_similar_stable_ties_and_top_k() {
        let candidates = vec![
            ("a", vec![1.0f32, 0.0]),
            ("b", vec![2.0f32, 0.0]),
            ("c", vec![3.0f32, 0.0]),
        ];
        let hits = find_similar(&[1.0, 0.0], &candidates, 2, 0.0);
        let ids: Vec<_> = hits.iter().map(|h| h.item).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
