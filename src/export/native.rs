//! Native text dump of the tree ensemble
//!
//! The layout follows the familiar `key=value` model file used by
//! leaf-wise boosting libraries: a header block, one `Tree=<i>` block per
//! tree, then `end of trees` and the training parameters. Floats are
//! written with Rust's shortest round-trip formatting, so parsing the dump
//! restores every threshold and leaf value exactly.

use std::collections::HashMap;
use std::fmt::{Display, Write as _};
use std::path::Path;
use std::str::FromStr;

use super::{Artifact, ExportConfig, ExportError, ModelExporter};
use crate::models::{Metric, Objective, TrainedModel, Tree};

const FORMAT: &str = "native text";

/// Text serializer for [`TrainedModel`]
#[derive(Debug, Clone)]
pub struct NativeTextFormat {
    file_name: String,
}

impl Default for NativeTextFormat {
    fn default() -> Self {
        Self::new(&ExportConfig::default())
    }
}

impl NativeTextFormat {
    pub fn new(config: &ExportConfig) -> Self {
        Self {
            file_name: format!("{}.txt", config.model_name),
        }
    }

    /// Render the model as text
    pub fn dump(&self, model: &TrainedModel) -> String {
        let mut out = String::new();
        let objective = match model.objective {
            Objective::Binary => "binary sigmoid:1",
        };

        // Writing into a String cannot fail
        let _ = writeln!(out, "tree");
        let _ = writeln!(out, "version=v3");
        let _ = writeln!(out, "num_class=1");
        let _ = writeln!(out, "num_tree_per_iteration=1");
        let _ = writeln!(out, "label_index=0");
        let _ = writeln!(out, "max_feature_idx={}", model.num_features().saturating_sub(1));
        let _ = writeln!(out, "objective={}", objective);
        let _ = writeln!(out, "metric={}", model.metric);
        let _ = writeln!(out, "feature_names={}", model.feature_names.join(" "));
        let _ = writeln!(out, "init_score={}", model.init_score);
        let _ = writeln!(out, "valid_history={}", join(&model.valid_history));
        let _ = writeln!(out);

        for (index, tree) in model.trees.iter().enumerate() {
            let _ = writeln!(out, "Tree={}", index);
            let _ = writeln!(out, "num_leaves={}", tree.num_leaves());
            if tree.num_internal() > 0 {
                let _ = writeln!(out, "split_feature={}", join(&tree.split_feature));
                let _ = writeln!(out, "split_gain={}", join(&tree.split_gain));
                let _ = writeln!(out, "threshold={}", join(&tree.threshold));
                let _ = writeln!(out, "left_child={}", join(&tree.left_child));
                let _ = writeln!(out, "right_child={}", join(&tree.right_child));
            }
            let _ = writeln!(out, "leaf_value={}", join(&tree.leaf_value));
            let _ = writeln!(out, "leaf_count={}", join(&tree.leaf_count));
            if tree.num_internal() > 0 {
                let _ = writeln!(out, "internal_count={}", join(&tree.internal_count));
            }
            let _ = writeln!(out, "shrinkage={}", tree.shrinkage);
            let _ = writeln!(out);
        }

        let _ = writeln!(out, "end of trees");
        let _ = writeln!(out);
        let _ = writeln!(out, "parameters:");
        let _ = writeln!(out, "[objective: {}]", model.objective);
        let _ = writeln!(out, "[metric: {}]", model.metric);
        let _ = writeln!(out, "[learning_rate: {}]", model.learning_rate);
        let _ = writeln!(out, "[num_iterations: {}]", model.num_boost_round);
        let _ = writeln!(out, "end of parameters");
        out
    }

    /// Parse a text dump back into a model
    pub fn parse(text: &str) -> Result<TrainedModel, ExportError> {
        let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());
        if lines.next() != Some("tree") {
            return Err(malformed("missing `tree` header"));
        }

        let mut header: HashMap<&str, &str> = HashMap::new();
        let mut blocks: Vec<HashMap<&str, &str>> = Vec::new();
        let mut parameters: HashMap<&str, &str> = HashMap::new();
        let mut in_trees = true;

        for line in lines {
            if line == "end of trees" {
                in_trees = false;
                continue;
            }
            if !in_trees {
                // [key: value]
                if let Some(entry) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                    if let Some((key, value)) = entry.split_once(':') {
                        parameters.insert(key.trim(), value.trim());
                    }
                }
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| malformed(format!("expected key=value, got `{}`", line)))?;
            if key == "Tree" {
                let index: usize = parse_value(key, value)?;
                if index != blocks.len() {
                    return Err(malformed(format!("tree {} out of order", index)));
                }
                blocks.push(HashMap::new());
            } else if let Some(block) = blocks.last_mut() {
                block.insert(key, value);
            } else {
                header.insert(key, value);
            }
        }
        if in_trees {
            return Err(malformed("missing `end of trees`"));
        }

        let objective = match required(&header, "objective")?.split_whitespace().next() {
            Some("binary") => Objective::Binary,
            other => return Err(malformed(format!("unsupported objective {:?}", other))),
        };
        let metric = match required(&header, "metric")? {
            "binary_error" => Metric::BinaryError,
            "binary_logloss" => Metric::BinaryLogloss,
            other => return Err(malformed(format!("unsupported metric `{}`", other))),
        };
        let feature_names: Vec<String> = required(&header, "feature_names")?
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let max_feature_idx: usize = parse_value("max_feature_idx", required(&header, "max_feature_idx")?)?;
        if feature_names.len() != max_feature_idx + 1 {
            return Err(malformed(format!(
                "{} feature names but max_feature_idx={}",
                feature_names.len(),
                max_feature_idx
            )));
        }

        let trees = blocks
            .iter()
            .enumerate()
            .map(|(index, block)| {
                parse_tree(block).map_err(|err| match err {
                    ExportError::Malformed { reason, .. } => malformed(format!("tree {}: {}", index, reason)),
                    other => other,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let learning_rate = parameters
            .get("learning_rate")
            .map(|v| parse_value("learning_rate", v))
            .transpose()?
            .or_else(|| trees.first().map(|tree| tree.shrinkage))
            .unwrap_or_default();
        let num_boost_round = parameters
            .get("num_iterations")
            .map(|v| parse_value("num_iterations", v))
            .transpose()?
            .unwrap_or(trees.len());

        let model = TrainedModel {
            objective,
            metric,
            feature_names,
            trees,
            init_score: parse_value("init_score", required(&header, "init_score")?)?,
            learning_rate,
            num_boost_round,
            valid_history: parse_list(&header, "valid_history")?,
        };
        model
            .validate()
            .map_err(|err| malformed(err.to_string()))?;
        Ok(model)
    }

    /// Read and parse a dump from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<TrainedModel, ExportError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }
}

impl ModelExporter for NativeTextFormat {
    fn format_name(&self) -> &'static str {
        FORMAT
    }

    fn export(&self, model: &TrainedModel) -> Result<Artifact, ExportError> {
        model.validate()?;
        Ok(Artifact {
            file_name: self.file_name.clone(),
            bytes: self.dump(model).into_bytes(),
        })
    }
}

fn parse_tree(block: &HashMap<&str, &str>) -> Result<Tree, ExportError> {
    let num_leaves: usize = parse_value("num_leaves", required(block, "num_leaves")?)?;
    let tree = Tree {
        split_feature: parse_list(block, "split_feature")?,
        split_gain: parse_list(block, "split_gain")?,
        threshold: parse_list(block, "threshold")?,
        left_child: parse_list(block, "left_child")?,
        right_child: parse_list(block, "right_child")?,
        internal_count: parse_list(block, "internal_count")?,
        leaf_value: parse_list(block, "leaf_value")?,
        leaf_count: parse_list(block, "leaf_count")?,
        shrinkage: parse_value("shrinkage", required(block, "shrinkage")?)?,
    };
    if tree.num_leaves() != num_leaves {
        return Err(malformed(format!(
            "num_leaves={} but {} leaf values",
            num_leaves,
            tree.num_leaves()
        )));
    }
    tree.validate().map_err(malformed)?;
    Ok(tree)
}

fn join<T: Display>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn required<'a>(block: &HashMap<&str, &'a str>, key: &str) -> Result<&'a str, ExportError> {
    block
        .get(key)
        .copied()
        .ok_or_else(|| malformed(format!("missing `{}`", key)))
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ExportError> {
    value
        .trim()
        .parse()
        .map_err(|_| malformed(format!("invalid {} `{}`", key, value)))
}

fn parse_list<T: FromStr>(block: &HashMap<&str, &str>, key: &str) -> Result<Vec<T>, ExportError> {
    block
        .get(key)
        .map_or(Ok(Vec::new()), |value| {
            value
                .split_whitespace()
                .map(|item| parse_value(key, item))
                .collect()
        })
}

fn malformed(reason: impl Into<String>) -> ExportError {
    ExportError::Malformed {
        format: FORMAT,
        reason: reason.into(),
    }
}
