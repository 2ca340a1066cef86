//! Regression trees grown leaf-wise on gradient statistics

use serde::{Deserialize, Serialize};

use super::gbm::GbmParams;

/// One regression tree of the ensemble.
///
/// Internal nodes are stored in parallel arrays. A child reference `c >= 0`
/// points at internal node `c`; `c < 0` points at leaf `!c`. A tree with a
/// single leaf has no internal nodes. Samples with `x <= threshold` go left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub split_feature: Vec<usize>,
    pub split_gain: Vec<f64>,
    pub threshold: Vec<f64>,
    pub left_child: Vec<i32>,
    pub right_child: Vec<i32>,
    pub internal_count: Vec<usize>,
    pub leaf_value: Vec<f64>,
    pub leaf_count: Vec<usize>,
    /// Learning rate already applied to `leaf_value`
    pub shrinkage: f64,
}

impl Tree {
    /// Tree that predicts `value` everywhere
    pub fn constant(value: f64, count: usize, shrinkage: f64) -> Self {
        Self {
            split_feature: Vec::new(),
            split_gain: Vec::new(),
            threshold: Vec::new(),
            left_child: Vec::new(),
            right_child: Vec::new(),
            internal_count: Vec::new(),
            leaf_value: vec![value],
            leaf_count: vec![count],
            shrinkage,
        }
    }

    pub fn num_leaves(&self) -> usize {
        self.leaf_value.len()
    }

    pub fn num_internal(&self) -> usize {
        self.split_feature.len()
    }

    /// Index of the leaf reached by `features`
    pub fn leaf_index(&self, features: &[f32]) -> usize {
        if self.split_feature.is_empty() {
            return 0;
        }

        let mut node = 0i32;
        while node >= 0 {
            let n = node as usize;
            let value = features[self.split_feature[n]] as f64;
            node = if value <= self.threshold[n] {
                self.left_child[n]
            } else {
                self.right_child[n]
            };
        }
        !node as usize
    }

    /// Raw score contribution for one sample
    pub fn predict(&self, features: &[f32]) -> f64 {
        self.leaf_value[self.leaf_index(features)]
    }

    /// Shift every leaf by `bias`, keeping leaves at f32 precision
    pub fn add_bias(&mut self, bias: f64) {
        for value in &mut self.leaf_value {
            *value = round_to_f32(*value + bias);
        }
    }

    /// Largest feature index referenced by a split
    pub fn max_feature_index(&self) -> Option<usize> {
        self.split_feature.iter().copied().max()
    }

    /// Check that child references form a proper binary tree
    pub fn validate(&self) -> Result<(), String> {
        let internal = self.num_internal();
        let leaves = self.num_leaves();
        if leaves == 0 {
            return Err("tree has no leaves".to_string());
        }
        if leaves != internal + 1 {
            return Err(format!(
                "{} internal nodes require {} leaves, found {}",
                internal,
                internal + 1,
                leaves
            ));
        }
        for column in [
            self.split_gain.len(),
            self.threshold.len(),
            self.left_child.len(),
            self.right_child.len(),
            self.internal_count.len(),
        ] {
            if column != internal {
                return Err("internal node arrays have different lengths".to_string());
            }
        }
        if self.leaf_count.len() != leaves {
            return Err("leaf arrays have different lengths".to_string());
        }

        let mut seen_internal = vec![false; internal];
        let mut seen_leaf = vec![false; leaves];
        if internal > 0 {
            seen_internal[0] = true;
        }
        for child in self.left_child.iter().chain(self.right_child.iter()) {
            let slot = if *child >= 0 {
                seen_internal.get_mut(*child as usize)
            } else {
                seen_leaf.get_mut(!*child as usize)
            };
            match slot {
                Some(seen) if !*seen => *seen = true,
                Some(_) => return Err(format!("node {} referenced twice", child)),
                None => return Err(format!("child {} out of range", child)),
            }
        }
        if internal == 0 {
            seen_leaf[0] = true;
        }
        if seen_internal.iter().chain(seen_leaf.iter()).all(|s| *s) {
            Ok(())
        } else {
            Err("unreachable nodes in tree".to_string())
        }
    }
}

/// Leaf values are stored at the precision of the exported graph weights
fn round_to_f32(value: f64) -> f64 {
    value as f32 as f64
}

/// Candidate split of one leaf
#[derive(Debug, Clone, Copy)]
struct SplitInfo {
    feature: usize,
    threshold: f32,
    gain: f64,
}

/// Rows of one leaf, kept sorted per feature
struct LeafState {
    rows_by_feature: Vec<Vec<u32>>,
    sum_gradient: f64,
    sum_hessian: f64,
    best: Option<SplitInfo>,
}

impl LeafState {
    fn count(&self) -> usize {
        self.rows_by_feature.first().map_or(0, Vec::len)
    }
}

/// Grows one tree per boosting round on column-major `f32` features
pub(crate) struct TreeLearner<'a> {
    columns: &'a [Vec<f32>],
    sorted: &'a [Vec<u32>],
    params: &'a GbmParams,
}

impl<'a> TreeLearner<'a> {
    /// `sorted[f]` lists every row ordered by `columns[f]` ascending
    pub(crate) fn new(columns: &'a [Vec<f32>], sorted: &'a [Vec<u32>], params: &'a GbmParams) -> Self {
        Self {
            columns,
            sorted,
            params,
        }
    }

    /// Presort row indices for each feature column; NaN sorts last
    pub(crate) fn presort(columns: &[Vec<f32>]) -> Vec<Vec<u32>> {
        columns
            .iter()
            .map(|column| {
                let mut order: Vec<u32> = (0..column.len() as u32).collect();
                order.sort_by(|a, b| column[*a as usize].total_cmp(&column[*b as usize]));
                order
            })
            .collect()
    }

    /// Grow a tree leaf-wise and return it with each row's leaf index
    pub(crate) fn grow(&self, gradients: &[f64], hessians: &[f64]) -> (Tree, Vec<u32>) {
        let n_rows = gradients.len();
        let shrinkage = self.params.learning_rate;

        let root = self.make_leaf(self.sorted.to_vec(), gradients, hessians);
        let mut tree = Tree::constant(0.0, n_rows, shrinkage);
        let mut leaves = vec![root];
        // (internal node, is_left) owning each leaf
        let mut leaf_parent: Vec<Option<(usize, bool)>> = vec![None];

        while leaves.len() < self.params.num_leaves {
            let mut chosen: Option<(usize, SplitInfo)> = None;
            for (index, leaf) in leaves.iter().enumerate() {
                if let Some(split) = leaf.best {
                    if chosen.map_or(true, |(_, best)| split.gain > best.gain) {
                        chosen = Some((index, split));
                    }
                }
            }
            let Some((leaf_index, split)) = chosen else {
                break;
            };

            let node = tree.split_feature.len();
            let new_leaf = leaves.len();
            tree.split_feature.push(split.feature);
            tree.split_gain.push(split.gain);
            tree.threshold.push(split.threshold as f64);
            tree.left_child.push(!(leaf_index as i32));
            tree.right_child.push(!(new_leaf as i32));
            tree.internal_count.push(leaves[leaf_index].count());

            if let Some((parent, is_left)) = leaf_parent[leaf_index] {
                if is_left {
                    tree.left_child[parent] = node as i32;
                } else {
                    tree.right_child[parent] = node as i32;
                }
            }
            leaf_parent[leaf_index] = Some((node, true));
            leaf_parent.push(Some((node, false)));

            let parent_rows = std::mem::take(&mut leaves[leaf_index].rows_by_feature);
            let (left_rows, right_rows) = self.partition(parent_rows, split);
            leaves[leaf_index] = self.make_leaf(left_rows, gradients, hessians);
            leaves.push(self.make_leaf(right_rows, gradients, hessians));
        }

        let mut leaf_of_row = vec![0u32; n_rows];
        tree.leaf_value.clear();
        tree.leaf_count.clear();
        for (index, leaf) in leaves.iter().enumerate() {
            tree.leaf_value.push(round_to_f32(self.leaf_output(leaf) * shrinkage));
            tree.leaf_count.push(leaf.count());
            if let Some(rows) = leaf.rows_by_feature.first() {
                for row in rows {
                    leaf_of_row[*row as usize] = index as u32;
                }
            }
        }

        (tree, leaf_of_row)
    }

    fn make_leaf(&self, rows_by_feature: Vec<Vec<u32>>, gradients: &[f64], hessians: &[f64]) -> LeafState {
        let (sum_gradient, sum_hessian) = rows_by_feature
            .first()
            .map(|rows| {
                rows.iter().fold((0.0, 0.0), |(g, h), row| {
                    (g + gradients[*row as usize], h + hessians[*row as usize])
                })
            })
            .unwrap_or((0.0, 0.0));

        let mut leaf = LeafState {
            rows_by_feature,
            sum_gradient,
            sum_hessian,
            best: None,
        };
        leaf.best = self.find_best_split(&leaf, gradients, hessians);
        leaf
    }

    /// Newton step `-G / (H + lambda)` before shrinkage
    fn leaf_output(&self, leaf: &LeafState) -> f64 {
        let denominator = leaf.sum_hessian + self.params.lambda_l2;
        if denominator > 0.0 {
            -leaf.sum_gradient / denominator
        } else {
            0.0
        }
    }

    fn score(&self, gradient: f64, hessian: f64) -> f64 {
        gradient * gradient / (hessian + self.params.lambda_l2)
    }

    fn find_best_split(&self, leaf: &LeafState, gradients: &[f64], hessians: &[f64]) -> Option<SplitInfo> {
        let count = leaf.count();
        let min_data = self.params.min_data_in_leaf.max(1);
        if count < 2 * min_data {
            return None;
        }

        let parent_score = self.score(leaf.sum_gradient, leaf.sum_hessian);
        let mut best: Option<SplitInfo> = None;

        for (feature, rows) in leaf.rows_by_feature.iter().enumerate() {
            let column = &self.columns[feature];
            let (mut left_g, mut left_h) = (0.0, 0.0);

            for i in 0..count - 1 {
                let row = rows[i] as usize;
                left_g += gradients[row];
                left_h += hessians[row];
                let left_count = i + 1;
                let right_count = count - left_count;
                if right_count < min_data {
                    break;
                }

                let value = column[row];
                let next = column[rows[i + 1] as usize];
                if value.is_nan() {
                    break;
                }
                if left_count < min_data || value == next {
                    continue;
                }

                let right_g = leaf.sum_gradient - left_g;
                let right_h = leaf.sum_hessian - left_h;
                if left_h < self.params.min_sum_hessian_in_leaf
                    || right_h < self.params.min_sum_hessian_in_leaf
                {
                    continue;
                }

                let gain = self.score(left_g, left_h) + self.score(right_g, right_h) - parent_score;
                if gain > self.params.min_gain_to_split
                    && best.map_or(true, |b| gain > b.gain)
                {
                    best = Some(SplitInfo {
                        feature,
                        threshold: value,
                        gain,
                    });
                }
            }
        }

        best
    }

    /// Stable partition of every per-feature row list
    fn partition(&self, rows_by_feature: Vec<Vec<u32>>, split: SplitInfo) -> (Vec<Vec<u32>>, Vec<Vec<u32>>) {
        let column = &self.columns[split.feature];
        let goes_left = |row: u32| column[row as usize] <= split.threshold;

        rows_by_feature
            .into_iter()
            .map(|rows| rows.into_iter().partition::<Vec<u32>, _>(|row| goes_left(*row)))
            .unzip()
    }
}
