//! Clustering strategies over embedding vectors.
//!
//! The default strategy is seeded k-means (k-means++ initialisation, several
//! restarts, lowest inertia wins), so the same input always yields the same
//! assignment.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Assigns every embedding to a cluster id.
pub trait ClusteringStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// One cluster id per input, in input order. Ids are `0..m` with
    /// `m <= min(k, embeddings.len())`, numbered by first appearance.
    fn assign(&self, embeddings: &[Vec<f32>], k: usize) -> Vec<usize>;
}

/// Lloyd's k-means with k-means++ seeding from a fixed RNG seed.
#[derive(Debug, Clone)]
pub struct SeededKMeans {
    pub seed: u64,
    pub restarts: usize,
    pub max_iterations: usize,
}

impl Default for SeededKMeans {
    fn default() -> Self {
        Self {
            seed: 42,
            restarts: 10,
            max_iterations: 300,
        }
    }
}

impl SeededKMeans {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    fn run_once(&self, points: &[Vec<f64>], k: usize, rng: &mut StdRng) -> (Vec<usize>, f64) {
        let mut centers = init_plus_plus(points, k, rng);
        let mut assignments = vec![0usize; points.len()];

        for _ in 0..self.max_iterations {
            let mut changed = false;
            for (i, p) in points.iter().enumerate() {
                let best = nearest_center(p, &centers).0;
                if assignments[i] != best {
                    assignments[i] = best;
                    changed = true;
                }
            }

            if update_centers(points, &mut assignments, &mut centers) {
                changed = true;
            }

            if !changed {
                break;
            }
        }

        let inertia = points
            .iter()
            .zip(&assignments)
            .map(|(p, &c)| squared_distance(p, &centers[c]))
            .sum();
        (assignments, inertia)
    }
}

impl ClusteringStrategy for SeededKMeans {
    fn name(&self) -> &str {
        "seeded-kmeans"
    }

    fn assign(&self, embeddings: &[Vec<f32>], k: usize) -> Vec<usize> {
        let n = embeddings.len();
        if n == 0 || k == 0 {
            return Vec::new();
        }
        let k = k.min(n);
        if k == n {
            return (0..n).collect();
        }

        let points: Vec<Vec<f64>> = embeddings
            .iter()
            .map(|e| e.iter().map(|x| *x as f64).collect())
            .collect();

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<(Vec<usize>, f64)> = None;
        for _ in 0..self.restarts.max(1) {
            let (assignments, inertia) = self.run_once(&points, k, &mut rng);
            if best.as_ref().map_or(true, |(_, b)| inertia < *b) {
                best = Some((assignments, inertia));
            }
        }

        best.map(|(a, _)| relabel_by_first_appearance(&a))
            .unwrap_or_default()
    }
}

/// Cluster with the default seeded k-means.
pub fn cluster_embeddings(embeddings: &[Vec<f32>], k: usize) -> Vec<usize> {
    SeededKMeans::default().assign(embeddings, k)
}

fn init_plus_plus(points: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centers = Vec::with_capacity(k);
    centers.push(points[rng.random_range(0..points.len())].clone());

    while centers.len() < k {
        let weights: Vec<f64> = points
            .iter()
            .map(|p| nearest_center(p, &centers).1)
            .collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            // All remaining points coincide with a center.
            centers.push(points[rng.random_range(0..points.len())].clone());
            continue;
        }
        let mut target = rng.random::<f64>() * total;
        let mut chosen = points.len() - 1;
        for (i, w) in weights.iter().enumerate() {
            if target < *w {
                chosen = i;
                break;
            }
            target -= w;
        }
        centers.push(points[chosen].clone());
    }
    centers
}

fn nearest_center(point: &[f64], centers: &[Vec<f64>]) -> (usize, f64) {
    centers
        .iter()
        .enumerate()
        .map(|(i, c)| (i, squared_distance(point, c)))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
}

/// Move every cluster centre to the mean of its members.
///
/// An empty cluster is re-seeded with the point farthest from its current
/// centre, taken from a cluster that keeps at least one member. Both centres
/// are computed after the move. Returns true when a point changed cluster.
fn update_centers(points: &[Vec<f64>], assignments: &mut [usize], centers: &mut [Vec<f64>]) -> bool {
    let k = centers.len();
    let dim = points[0].len();
    let mut sums = vec![vec![0.0f64; dim]; k];
    let mut counts = vec![0usize; k];
    for (p, &c) in points.iter().zip(assignments.iter()) {
        counts[c] += 1;
        for (s, x) in sums[c].iter_mut().zip(p) {
            *s += x;
        }
    }

    let mut moved = false;
    for c in 0..k {
        if counts[c] > 0 {
            continue;
        }
        let Some(far) = farthest_point(points, centers, assignments, &counts) else {
            continue;
        };
        let from = assignments[far];
        counts[from] -= 1;
        for (s, x) in sums[from].iter_mut().zip(&points[far]) {
            *s -= x;
        }
        counts[c] = 1;
        sums[c] = points[far].clone();
        assignments[far] = c;
        moved = true;
    }

    for c in 0..k {
        if counts[c] > 0 {
            centers[c] = sums[c].iter().map(|s| s / counts[c] as f64).collect();
        }
    }
    moved
}

fn farthest_point(
    points: &[Vec<f64>],
    centers: &[Vec<f64>],
    assignments: &[usize],
    counts: &[usize],
) -> Option<usize> {
    points
        .iter()
        .zip(assignments)
        .map(|(p, &c)| (c, squared_distance(p, &centers[c])))
        .enumerate()
        .filter(|(_, (c, d))| *d > 0.0 && counts[*c] > 1)
        .map(|(i, (_, d))| (i, d))
        .fold(None, |best: Option<(usize, f64)>, cur| match best {
            Some(b) if b.1 >= cur.1 => Some(b),
            _ => Some(cur),
        })
        .map(|(i, _)| i)
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn relabel_by_first_appearance(assignments: &[usize]) -> Vec<usize> {
    let mut mapping: Vec<Option<usize>> = vec![None; assignments.iter().max().map_or(0, |m| m + 1)];
    let mut next = 0;
    assignments
        .iter()
        .map(|&a| {
            *mapping[a].get_or_insert_with(|| {
                next += 1;
                next - 1
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> Vec<Vec<f32>> {
        vec![
            vec![0.0, 0.1],
            vec![10.0, 10.0],
            vec![0.1, 0.0],
            vec![10.1, 9.9],
            vec![0.05, 0.05],
            vec![9.9, 10.1],
        ]
    }

    #[test]
    fn test_separates_obvious_blobs() {
        let assignments = cluster_embeddings(&two_blobs(), 2);
        assert_eq!(assignments, vec![0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_deterministic() {
        let data: Vec<Vec<f32>> = (0..40)
            .map(|i| vec![(i % 7) as f32, (i * 3 % 11) as f32, (i % 5) as f32])
            .collect();
        assert_eq!(cluster_embeddings(&data, 4), cluster_embeddings(&data, 4));
    }

    #[test]
    fn test_k_at_least_len_gives_singletons() {
        let data = vec![vec![1.0f32], vec![1.0], vec![2.0]];
        assert_eq!(cluster_embeddings(&data, 3), vec![0, 1, 2]);
        assert_eq!(cluster_embeddings(&data, 10), vec![0, 1, 2]);
    }

    #[test]
    fn test_empty_input_and_zero_k() {
        assert!(cluster_embeddings(&[], 3).is_empty());
        assert!(cluster_embeddings(&[vec![1.0]], 0).is_empty());
    }

    #[test]
    fn test_ids_are_contiguous_by_first_appearance() {
        let data: Vec<Vec<f32>> = (0..30).map(|i| vec![(i % 3) as f32 * 5.0]).collect();
        let assignments = cluster_embeddings(&data, 3);
        assert_eq!(&assignments[..3], &[0, 1, 2]);
        assert!(assignments.iter().all(|&a| a < 3));
    }

    #[test]
    fn test_reseeded_cluster_updates_both_centers() {
        let points = vec![vec![0.0], vec![1.0], vec![10.0]];
        let mut assignments = vec![0, 0, 0];
        let mut centers = vec![vec![0.0], vec![100.0]];

        assert!(update_centers(&points, &mut assignments, &mut centers));
        assert_eq!(assignments, vec![0, 0, 1]);
        assert_eq!(centers[0], vec![0.5]);
        assert_eq!(centers[1], vec![10.0]);
    }

    #[test]
    fn test_singleton_cluster_is_not_emptied_by_reseed() {
        let points = vec![vec![0.0], vec![50.0]];
        let mut assignments = vec![0, 1];
        let mut centers = vec![vec![0.0], vec![40.0], vec![-5.0]];

        assert!(!update_centers(&points, &mut assignments, &mut centers));
        assert_eq!(assignments, vec![0, 1]);
        assert_eq!(centers[1], vec![50.0]);
    }

    #[test]
    fn test_identical_points_do_not_panic() {
        let data = vec![vec![1.0f32, 1.0]; 8];
        let assignments = cluster_embeddings(&data, 3);
        assert_eq!(assignments.len(), 8);
    }

    #[test]
    fn test_relabel() {
        assert_eq!(relabel_by_first_appearance(&[2, 2, 0, 1, 0]), vec![0, 0, 1, 2, 1]);
    }
}
