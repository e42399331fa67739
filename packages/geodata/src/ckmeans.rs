//! Optimal one-dimensional k-means ("Ckmeans") clustering.
//!
//! Partitions sorted values into `k` contiguous groups minimizing the
//! total within-group sum of squared deviations, by dynamic programming
//! over prefix sums. Each row of the cost matrix is filled with a
//! divide-and-conquer pass that narrows the search window using the
//! split points already found, then the clusters are recovered by
//! walking the backtrack matrix from the right.

/// Errors returned by [`ckmeans`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CkmeansError {
    /// No values were supplied.
    #[error("cannot cluster an empty set of values")]
    Empty,

    /// `k` was zero.
    #[error("number of clusters must be at least 1")]
    ZeroClusters,

    /// `k` exceeds the number of distinct values.
    #[error("cannot form {k} clusters from {distinct} distinct values")]
    TooManyClusters {
        /// Requested cluster count.
        k: usize,
        /// Distinct values available.
        distinct: usize,
    },

    /// A value was NaN or infinite.
    #[error("values must be finite")]
    NonFinite,
}

/// Clusters `values` into `k` groups.
///
/// Returns the groups in ascending order, each sorted ascending and
/// non-empty.
///
/// # Errors
///
/// See [`CkmeansError`].
pub fn ckmeans(values: &[f64], k: usize) -> Result<Vec<Vec<f64>>, CkmeansError> {
    if values.is_empty() {
        return Err(CkmeansError::Empty);
    }
    if k == 0 {
        return Err(CkmeansError::ZeroClusters);
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(CkmeansError::NonFinite);
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let distinct = 1 + sorted.windows(2).filter(|w| w[0] < w[1]).count();
    if k > distinct {
        return Err(CkmeansError::TooManyClusters { k, distinct });
    }
    if distinct == 1 {
        return Ok(vec![sorted]);
    }

    let n = sorted.len();
    let mut matrix = Matrices::new(k, n);
    matrix.fill(&sorted);

    let mut clusters = vec![Vec::new(); k];
    let mut right = n - 1;
    for cluster in (0..k).rev() {
        let left = matrix.backtrack[cluster][right];
        clusters[cluster] = sorted[left..=right].to_vec();
        if cluster > 0 {
            right = left.saturating_sub(1);
        }
    }

    Ok(clusters)
}

/// Upper bound (largest value) of each of the `k` clusters, ascending.
///
/// # Errors
///
/// See [`CkmeansError`].
pub fn breaks(values: &[f64], k: usize) -> Result<Vec<f64>, CkmeansError> {
    Ok(ckmeans(values, k)?
        .iter()
        .filter_map(|cluster| cluster.last().copied())
        .collect())
}

/// `[min, max]` of `values` by linear scan, or `None` if empty.
#[must_use]
pub fn min_max(values: &[f64]) -> Option<[f64; 2]> {
    let first = *values.first()?;
    Some(values.iter().fold([first, first], |[lo, hi], &v| {
        [if v < lo { v } else { lo }, if v > hi { v } else { hi }]
    }))
}

struct Matrices {
    cost: Vec<Vec<f64>>,
    backtrack: Vec<Vec<usize>>,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl Matrices {
    fn new(k: usize, n: usize) -> Self {
        Self {
            cost: vec![vec![0.0; n]; k],
            backtrack: vec![vec![0; n]; k],
            sum: Vec::with_capacity(n),
            sum_sq: Vec::with_capacity(n),
        }
    }

    /// Within-group sum of squares of `sorted[j..=i]`, from prefix sums.
    #[allow(clippy::cast_precision_loss)]
    fn ssq(&self, j: usize, i: usize) -> f64 {
        let s = if j > 0 {
            let count = (i - j + 1) as f64;
            let mean = (self.sum[i] - self.sum[j - 1]) / count;
            (count * mean).mul_add(-mean, self.sum_sq[i] - self.sum_sq[j - 1])
        } else {
            self.sum_sq[i] - self.sum[i] * self.sum[i] / (i + 1) as f64
        };
        s.max(0.0)
    }

    fn fill(&mut self, sorted: &[f64]) {
        let n = sorted.len();
        let k = self.cost.len();
        // Shifting by the median keeps the prefix sums small.
        let shift = sorted[n / 2];

        for (i, value) in sorted.iter().enumerate() {
            let shifted = value - shift;
            if i == 0 {
                self.sum.push(shifted);
                self.sum_sq.push(shifted * shifted);
            } else {
                self.sum.push(self.sum[i - 1] + shifted);
                self.sum_sq.push(shifted.mul_add(shifted, self.sum_sq[i - 1]));
            }
            self.cost[0][i] = self.ssq(0, i);
            self.backtrack[0][i] = 0;
        }

        for cluster in 1..k {
            let i_min = if cluster < k - 1 { cluster } else { n - 1 };
            self.fill_column(i_min, n - 1, cluster);
        }
    }

    fn fill_column(&mut self, i_min: usize, i_max: usize, cluster: usize) {
        if i_min > i_max {
            return;
        }

        let n = self.cost[0].len();
        let i = i_min + (i_max - i_min) / 2;

        self.cost[cluster][i] = self.cost[cluster - 1][i - 1];
        self.backtrack[cluster][i] = i;

        let mut j_low = cluster;
        if i_min > cluster {
            j_low = j_low.max(self.backtrack[cluster][i_min - 1]);
        }
        j_low = j_low.max(self.backtrack[cluster - 1][i]);

        let mut j_high = i - 1;
        if i_max < n - 1 {
            j_high = j_high.min(self.backtrack[cluster][i_max + 1]);
        }

        let mut j = j_high;
        while j >= j_low {
            let s_ji = self.ssq(j, i);
            if s_ji + self.cost[cluster - 1][j_low - 1] >= self.cost[cluster][i] {
                break;
            }

            let s_low = self.ssq(j_low, i) + self.cost[cluster - 1][j_low - 1];
            if s_low < self.cost[cluster][i] {
                self.cost[cluster][i] = s_low;
                self.backtrack[cluster][i] = j_low;
            }
            j_low += 1;

            let s_j = s_ji + self.cost[cluster - 1][j - 1];
            if s_j < self.cost[cluster][i] {
                self.cost[cluster][i] = s_j;
                self.backtrack[cluster][i] = j;
            }

            j -= 1;
        }

        if i > i_min {
            self.fill_column(i_min, i - 1, cluster);
        }
        self.fill_column(i + 1, i_max, cluster);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_obvious_groups() {
        let clusters = ckmeans(&[1.0, 2.0, 4.0, 5.0, 12.0, 43.0, 52.0, 123.0, 234.0, 1244.0], 6)
            .unwrap();
        assert_eq!(
            clusters,
            vec![
                vec![1.0, 2.0, 4.0, 5.0],
                vec![12.0],
                vec![43.0, 52.0],
                vec![123.0],
                vec![234.0],
                vec![1244.0],
            ]
        );
    }

    #[test]
    fn input_order_does_not_matter() {
        let clusters = ckmeans(&[-1.0, 2.0, -1.0, 2.0, 4.0, 5.0, 6.0, -1.0, 2.0, -1.0], 3).unwrap();
        assert_eq!(
            clusters,
            vec![
                vec![-1.0, -1.0, -1.0, -1.0],
                vec![2.0, 2.0, 2.0],
                vec![4.0, 5.0, 6.0],
            ]
        );
    }

    #[test]
    fn one_cluster_is_everything() {
        let clusters = ckmeans(&[3.0, 1.0, 2.0], 1).unwrap();
        assert_eq!(clusters, vec![vec![1.0, 2.0, 3.0]]);
    }

    #[test]
    fn k_equal_to_distinct_isolates_each_value() {
        let clusters = ckmeans(&[1.0, 1.0, 2.0, 3.0, 3.0], 3).unwrap();
        assert_eq!(clusters, vec![vec![1.0, 1.0], vec![2.0], vec![3.0, 3.0]]);
    }

    #[test]
    fn single_distinct_value() {
        assert_eq!(ckmeans(&[7.0, 7.0], 1).unwrap(), vec![vec![7.0, 7.0]]);
        assert_eq!(
            ckmeans(&[7.0, 7.0], 2).unwrap_err(),
            CkmeansError::TooManyClusters { k: 2, distinct: 1 }
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(ckmeans(&[], 2).unwrap_err(), CkmeansError::Empty);
        assert_eq!(ckmeans(&[1.0], 0).unwrap_err(), CkmeansError::ZeroClusters);
        assert_eq!(
            ckmeans(&[1.0, 2.0], 3).unwrap_err(),
            CkmeansError::TooManyClusters { k: 3, distinct: 2 }
        );
        assert_eq!(
            ckmeans(&[1.0, f64::NAN], 1).unwrap_err(),
            CkmeansError::NonFinite
        );
    }

    #[test]
    fn breaks_are_strictly_ascending_cluster_maxima() {
        let values: Vec<f64> = (0_i32..200).map(|i| f64::from((i * 37) % 101)).collect();
        for k in 1..=10 {
            let b = breaks(&values, k).unwrap();
            assert_eq!(b.len(), k);
            assert!(b.windows(2).all(|w| w[0] < w[1]), "k={k}: {b:?}");
            assert!((b[k - 1] - 100.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn clusters_partition_the_input() {
        let values = [9.0, 1.0, 8.0, 2.0, 7.0, 3.0, 50.0, 51.0, 49.0];
        let clusters = ckmeans(&values, 3).unwrap();
        let flat: Vec<f64> = clusters.iter().flatten().copied().collect();
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        assert_eq!(flat, sorted);
        assert!(clusters.iter().all(|c| !c.is_empty()));
    }

    #[test]
    fn min_max_scans_all_values() {
        assert_eq!(min_max(&[3.0, -2.0, 8.5, 0.0]), Some([-2.0, 8.5]));
        assert_eq!(min_max(&[4.0]), Some([4.0, 4.0]));
        assert_eq!(min_max(&[]), None);
    }
}
