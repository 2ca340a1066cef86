//! ONNX inference graph for the tree ensemble
//!
//! The graph holds a single `TreeEnsembleClassifier` node from the
//! `ai.onnx.ml` domain:
//!
//! - input `float_input`: `FLOAT [None, 9]`
//! - output `label`: `INT64 [None]`
//! - output `probabilities`: `FLOAT [None, 2]`, column 1 is the up class
//!
//! Splits are `BRANCH_LEQ` with the true branch on the left, matching the
//! native trees. Every leaf contributes to one score column and the
//! `LOGISTIC` post transform yields `[1 - sigmoid(s), sigmoid(s)]`.
//!
//! Only the message subset the exporter writes is declared below, using the
//! field numbers of `onnx.proto`. Loaded graphs run on the tract runtime.

use ndarray::ArrayView2;
use prost::Message;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

use super::{Artifact, ExportConfig, ExportError, ModelExporter};
use crate::data::NUM_FEATURES;
use crate::models::TrainedModel;

use proto::tensor_shape_proto::{dimension, Dimension};
use proto::{
    type_proto, AttributeProto, AttributeType, GraphProto, ModelProto, NodeProto, OperatorSetIdProto,
    StringStringEntryProto, TensorShapeProto, TypeProto, ValueInfoProto,
};

pub const INPUT_NAME: &str = "float_input";
pub const LABEL_OUTPUT: &str = "label";
pub const PROBABILITY_OUTPUT: &str = "probabilities";
pub const ML_DOMAIN: &str = "ai.onnx.ml";
pub const TREE_ENSEMBLE_OP: &str = "TreeEnsembleClassifier";

const IR_VERSION: i64 = 8;
const FORMAT: &str = "onnx";

/// Largest summed per-tree leaf rounding accepted on the raw score.
/// The sigmoid slope is at most 1/4, so probabilities stay within 1e-5.
const ROUNDING_TOLERANCE: f64 = 4e-5;

/// `TensorProto.DataType` codes
pub mod elem_type {
    pub const FLOAT: i32 = 1;
    pub const INT64: i32 = 7;

    /// Symbolic name of a data type code
    pub fn name(code: i32) -> &'static str {
        match code {
            0 => "UNDEFINED",
            1 => "FLOAT",
            2 => "UINT8",
            3 => "INT8",
            4 => "UINT16",
            5 => "INT16",
            6 => "INT32",
            7 => "INT64",
            8 => "STRING",
            9 => "BOOL",
            10 => "FLOAT16",
            11 => "DOUBLE",
            12 => "UINT32",
            13 => "UINT64",
            14 => "COMPLEX64",
            15 => "COMPLEX128",
            16 => "BFLOAT16",
            _ => "UNKNOWN",
        }
    }
}

/// Protobuf messages of the ONNX IR
pub mod proto {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ModelProto {
        #[prost(int64, tag = "1")]
        pub ir_version: i64,
        #[prost(string, tag = "2")]
        pub producer_name: String,
        #[prost(string, tag = "3")]
        pub producer_version: String,
        #[prost(string, tag = "4")]
        pub domain: String,
        #[prost(int64, tag = "5")]
        pub model_version: i64,
        #[prost(string, tag = "6")]
        pub doc_string: String,
        #[prost(message, optional, tag = "7")]
        pub graph: Option<GraphProto>,
        #[prost(message, repeated, tag = "8")]
        pub opset_import: Vec<OperatorSetIdProto>,
        #[prost(message, repeated, tag = "14")]
        pub metadata_props: Vec<StringStringEntryProto>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct OperatorSetIdProto {
        #[prost(string, tag = "1")]
        pub domain: String,
        #[prost(int64, tag = "2")]
        pub version: i64,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct StringStringEntryProto {
        #[prost(string, tag = "1")]
        pub key: String,
        #[prost(string, tag = "2")]
        pub value: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GraphProto {
        #[prost(message, repeated, tag = "1")]
        pub node: Vec<NodeProto>,
        #[prost(string, tag = "2")]
        pub name: String,
        #[prost(string, tag = "10")]
        pub doc_string: String,
        #[prost(message, repeated, tag = "11")]
        pub input: Vec<ValueInfoProto>,
        #[prost(message, repeated, tag = "12")]
        pub output: Vec<ValueInfoProto>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NodeProto {
        #[prost(string, repeated, tag = "1")]
        pub input: Vec<String>,
        #[prost(string, repeated, tag = "2")]
        pub output: Vec<String>,
        #[prost(string, tag = "3")]
        pub name: String,
        #[prost(string, tag = "4")]
        pub op_type: String,
        #[prost(message, repeated, tag = "5")]
        pub attribute: Vec<AttributeProto>,
        #[prost(string, tag = "6")]
        pub doc_string: String,
        #[prost(string, tag = "7")]
        pub domain: String,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum AttributeType {
        Undefined = 0,
        Float = 1,
        Int = 2,
        String = 3,
        Tensor = 4,
        Graph = 5,
        Floats = 6,
        Ints = 7,
        Strings = 8,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct AttributeProto {
        #[prost(string, tag = "1")]
        pub name: String,
        #[prost(float, tag = "2")]
        pub f: f32,
        #[prost(int64, tag = "3")]
        pub i: i64,
        #[prost(bytes = "vec", tag = "4")]
        pub s: Vec<u8>,
        #[prost(float, repeated, packed = "false", tag = "7")]
        pub floats: Vec<f32>,
        #[prost(int64, repeated, packed = "false", tag = "8")]
        pub ints: Vec<i64>,
        #[prost(bytes = "vec", repeated, tag = "9")]
        pub strings: Vec<Vec<u8>>,
        #[prost(string, tag = "13")]
        pub doc_string: String,
        #[prost(enumeration = "AttributeType", tag = "20")]
        pub r#type: i32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ValueInfoProto {
        #[prost(string, tag = "1")]
        pub name: String,
        #[prost(message, optional, tag = "2")]
        pub r#type: Option<TypeProto>,
        #[prost(string, tag = "3")]
        pub doc_string: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TypeProto {
        #[prost(oneof = "type_proto::Value", tags = "1")]
        pub value: Option<type_proto::Value>,
        #[prost(string, tag = "6")]
        pub denotation: String,
    }

    pub mod type_proto {
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Tensor {
            #[prost(int32, tag = "1")]
            pub elem_type: i32,
            #[prost(message, optional, tag = "2")]
            pub shape: Option<super::TensorShapeProto>,
        }

        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Value {
            #[prost(message, tag = "1")]
            TensorType(Tensor),
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TensorShapeProto {
        #[prost(message, repeated, tag = "1")]
        pub dim: Vec<tensor_shape_proto::Dimension>,
    }

    pub mod tensor_shape_proto {
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Dimension {
            #[prost(oneof = "dimension::Value", tags = "1, 2")]
            pub value: Option<dimension::Value>,
            #[prost(string, tag = "3")]
            pub denotation: String,
        }

        pub mod dimension {
            #[derive(Clone, PartialEq, ::prost::Oneof)]
            pub enum Value {
                #[prost(int64, tag = "1")]
                DimValue(i64),
                #[prost(string, tag = "2")]
                DimParam(String),
            }
        }
    }
}

impl AttributeProto {
    fn ints(name: &str, ints: Vec<i64>) -> Self {
        Self {
            name: name.to_string(),
            r#type: AttributeType::Ints as i32,
            ints,
            ..Default::default()
        }
    }

    fn floats(name: &str, floats: Vec<f32>) -> Self {
        Self {
            name: name.to_string(),
            r#type: AttributeType::Floats as i32,
            floats,
            ..Default::default()
        }
    }

    fn strings(name: &str, strings: Vec<&str>) -> Self {
        Self {
            name: name.to_string(),
            r#type: AttributeType::Strings as i32,
            strings: strings.into_iter().map(|s| s.as_bytes().to_vec()).collect(),
            ..Default::default()
        }
    }

    fn string(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            r#type: AttributeType::String as i32,
            s: value.as_bytes().to_vec(),
            ..Default::default()
        }
    }
}

fn tensor_value_info(name: &str, elem_type: i32, shape: &[Option<i64>]) -> ValueInfoProto {
    let dim = shape
        .iter()
        .map(|d| Dimension {
            value: d.map(dimension::Value::DimValue),
            ..Default::default()
        })
        .collect();

    ValueInfoProto {
        name: name.to_string(),
        r#type: Some(TypeProto {
            value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                elem_type,
                shape: Some(TensorShapeProto { dim }),
            })),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Converts a [`TrainedModel`] into an ONNX graph
#[derive(Debug, Clone)]
pub struct OnnxExporter {
    config: ExportConfig,
    input_width: usize,
}

impl Default for OnnxExporter {
    fn default() -> Self {
        Self::new(&ExportConfig::default())
    }
}

impl OnnxExporter {
    /// Exporter declaring the `[None, 9]` feature input
    pub fn new(config: &ExportConfig) -> Self {
        Self {
            config: config.clone(),
            input_width: NUM_FEATURES,
        }
    }

    /// Declare a different input width
    pub fn with_input_width(mut self, input_width: usize) -> Self {
        self.input_width = input_width;
        self
    }

    /// Fail unless every split and leaf survives the f32 graph exactly
    pub fn check_lossless(&self, model: &TrainedModel) -> Result<(), ExportError> {
        model.validate()?;
        if model.num_features() != self.input_width {
            return Err(ExportError::FeatureWidth {
                declared: self.input_width,
                model: model.num_features(),
            });
        }

        let mut accumulated = 0.0;
        for (t, tree) in model.trees.iter().enumerate() {
            for (node, threshold) in tree.threshold.iter().enumerate() {
                if !threshold.is_finite() || (*threshold as f32) as f64 != *threshold {
                    return Err(ExportError::ThresholdNotRepresentable {
                        tree: t,
                        node,
                        threshold: *threshold,
                    });
                }
            }

            let mut worst: f64 = 0.0;
            for (leaf, value) in tree.leaf_value.iter().enumerate() {
                let narrowed = *value as f32;
                if !value.is_finite() || !narrowed.is_finite() {
                    return Err(ExportError::NonFiniteLeaf {
                        tree: t,
                        leaf,
                        value: *value,
                    });
                }
                worst = worst.max((value - narrowed as f64).abs());
            }
            accumulated += worst;
        }

        debug!("Worst-case raw score rounding: {:e}", accumulated);
        if accumulated > ROUNDING_TOLERANCE {
            return Err(ExportError::LeafRounding {
                error: accumulated,
                tolerance: ROUNDING_TOLERANCE,
            });
        }
        Ok(())
    }

    /// Build the graph without serializing it
    pub fn build(&self, model: &TrainedModel) -> Result<ModelProto, ExportError> {
        self.check_lossless(model)?;

        let mut treeids = Vec::new();
        let mut nodeids = Vec::new();
        let mut featureids = Vec::new();
        let mut values = Vec::new();
        let mut modes = Vec::new();
        let mut truenodeids = Vec::new();
        let mut falsenodeids = Vec::new();
        let mut missing_tracks_true = Vec::new();
        let mut class_treeids = Vec::new();
        let mut class_nodeids = Vec::new();
        let mut class_ids = Vec::new();
        let mut class_weights = Vec::new();

        for (tree_id, tree) in model.trees.iter().enumerate() {
            let tree_id = tree_id as i64;
            let internal = tree.num_internal() as i64;
            // Leaves are numbered after the internal nodes
            let node_id = |child: i32| {
                if child >= 0 {
                    child as i64
                } else {
                    internal + (!child) as i64
                }
            };

            for n in 0..tree.num_internal() {
                treeids.push(tree_id);
                nodeids.push(n as i64);
                featureids.push(tree.split_feature[n] as i64);
                values.push(tree.threshold[n] as f32);
                modes.push("BRANCH_LEQ");
                truenodeids.push(node_id(tree.left_child[n]));
                falsenodeids.push(node_id(tree.right_child[n]));
                missing_tracks_true.push(0);
            }
            for (leaf, value) in tree.leaf_value.iter().enumerate() {
                let id = internal + leaf as i64;
                treeids.push(tree_id);
                nodeids.push(id);
                featureids.push(0);
                values.push(0.0);
                modes.push("LEAF");
                truenodeids.push(0);
                falsenodeids.push(0);
                missing_tracks_true.push(0);

                class_treeids.push(tree_id);
                class_nodeids.push(id);
                class_ids.push(0);
                class_weights.push(*value as f32);
            }
        }

        let node = NodeProto {
            input: vec![INPUT_NAME.to_string()],
            output: vec![LABEL_OUTPUT.to_string(), PROBABILITY_OUTPUT.to_string()],
            name: TREE_ENSEMBLE_OP.to_string(),
            op_type: TREE_ENSEMBLE_OP.to_string(),
            domain: ML_DOMAIN.to_string(),
            attribute: vec![
                AttributeProto::ints("class_ids", class_ids),
                AttributeProto::ints("class_nodeids", class_nodeids),
                AttributeProto::ints("class_treeids", class_treeids),
                AttributeProto::floats("class_weights", class_weights),
                AttributeProto::ints("classlabels_int64s", vec![0, 1]),
                AttributeProto::ints("nodes_falsenodeids", falsenodeids),
                AttributeProto::ints("nodes_featureids", featureids),
                AttributeProto::ints("nodes_missing_value_tracks_true", missing_tracks_true),
                AttributeProto::strings("nodes_modes", modes),
                AttributeProto::ints("nodes_nodeids", nodeids),
                AttributeProto::ints("nodes_treeids", treeids),
                AttributeProto::ints("nodes_truenodeids", truenodeids),
                AttributeProto::floats("nodes_values", values),
                AttributeProto::string("post_transform", "LOGISTIC"),
            ],
            ..Default::default()
        };

        let graph = GraphProto {
            node: vec![node],
            name: self.config.graph_name.clone(),
            input: vec![tensor_value_info(
                INPUT_NAME,
                elem_type::FLOAT,
                &[None, Some(self.input_width as i64)],
            )],
            output: vec![
                tensor_value_info(LABEL_OUTPUT, elem_type::INT64, &[None]),
                tensor_value_info(PROBABILITY_OUTPUT, elem_type::FLOAT, &[None, Some(2)]),
            ],
            ..Default::default()
        };

        Ok(ModelProto {
            ir_version: IR_VERSION,
            producer_name: env!("CARGO_PKG_NAME").to_string(),
            producer_version: env!("CARGO_PKG_VERSION").to_string(),
            domain: String::new(),
            model_version: 0,
            doc_string: String::new(),
            graph: Some(graph),
            opset_import: vec![
                OperatorSetIdProto {
                    domain: String::new(),
                    version: self.config.target_opset,
                },
                OperatorSetIdProto {
                    domain: ML_DOMAIN.to_string(),
                    version: self.config.ml_opset,
                },
            ],
            metadata_props: vec![StringStringEntryProto {
                key: "feature_names".to_string(),
                value: model.feature_names.join(","),
            }],
        })
    }
}

impl ModelExporter for OnnxExporter {
    fn format_name(&self) -> &'static str {
        FORMAT
    }

    fn export(&self, model: &TrainedModel) -> Result<Artifact, ExportError> {
        let graph = self.build(model)?;
        info!(
            "Converted {} trees into a {} graph (opset {}, ml opset {})",
            model.num_iterations(),
            TREE_ENSEMBLE_OP,
            self.config.target_opset,
            self.config.ml_opset
        );
        Ok(Artifact {
            file_name: format!("{}.onnx", self.config.model_name),
            bytes: graph.encode_to_vec(),
        })
    }
}

/// Name, element type and shape of a graph input or output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TensorSignature {
    pub name: String,
    pub elem_type: i32,
    pub elem_type_name: &'static str,
    /// `None` for symbolic or unknown dimensions
    pub shape: Vec<Option<i64>>,
}

impl TensorSignature {
    fn from_value_info(info: &ValueInfoProto) -> Self {
        let tensor = info.r#type.as_ref().and_then(|t| match &t.value {
            Some(type_proto::Value::TensorType(tensor)) => Some(tensor),
            None => None,
        });
        let elem_type = tensor.map_or(0, |t| t.elem_type);
        let shape = tensor
            .and_then(|t| t.shape.as_ref())
            .map(|shape| {
                shape
                    .dim
                    .iter()
                    .map(|d| match &d.value {
                        Some(dimension::Value::DimValue(v)) => Some(*v),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: info.name.clone(),
            elem_type,
            elem_type_name: elem_type::name(elem_type),
            shape,
        }
    }

    /// Shape rendered as `[None, 9]`
    pub fn shape_string(&self) -> String {
        let dims: Vec<String> = self
            .shape
            .iter()
            .map(|d| d.map_or_else(|| "None".to_string(), |v| v.to_string()))
            .collect();
        format!("[{}]", dims.join(", "))
    }
}

/// Opset entry of a graph
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpsetSummary {
    pub domain: String,
    pub version: i64,
}

/// Everything `inspect_graph` reports about a graph
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphSummary {
    pub name: String,
    pub producer: String,
    pub ir_version: i64,
    pub opsets: Vec<OpsetSummary>,
    pub inputs: Vec<TensorSignature>,
    pub outputs: Vec<TensorSignature>,
    pub operators: Vec<String>,
}

fn malformed(reason: impl Into<String>) -> ExportError {
    ExportError::Malformed {
        format: FORMAT,
        reason: reason.into(),
    }
}

/// Graph execution on the tract ONNX runtime
mod runtime {
    use tract_onnx::prelude::*;

    /// Run the serialized graph on a row-major `rows x width` batch and
    /// return the `label` and `probabilities` outputs
    pub(super) fn run(bytes: &[u8], width: usize, data: Vec<f32>) -> TractResult<(Vec<i64>, Vec<f32>)> {
        let rows = data.len() / width;
        let plan = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(bytes))?
            .with_input_fact(0, f32::fact([rows, width]).into())?
            .into_optimized()?
            .into_runnable()?;

        let input: Tensor = tract_ndarray::Array2::from_shape_vec((rows, width), data)?.into();
        let outputs = plan.run(tvec!(input.into()))?;
        if outputs.len() != 2 {
            anyhow::bail!("expected 2 outputs, graph produced {}", outputs.len());
        }
        let labels = outputs[0].as_slice::<i64>()?.to_vec();
        let probabilities = outputs[1].as_slice::<f32>()?.to_vec();
        Ok((labels, probabilities))
    }
}

/// Output of the graph for one input row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphPrediction {
    pub label: i64,
    /// `[down, up]`
    pub probabilities: [f64; 2],
}

/// A decoded ONNX graph, executable through the tract runtime
#[derive(Debug, Clone)]
pub struct OnnxGraph {
    proto: ModelProto,
    bytes: Vec<u8>,
}

impl OnnxGraph {
    /// Decode serialized bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, ExportError> {
        let proto = ModelProto::decode(bytes)?;
        if proto.graph.is_none() {
            return Err(malformed("model has no graph"));
        }
        Ok(Self {
            proto,
            bytes: bytes.to_vec(),
        })
    }

    /// Read and decode a `.onnx` file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ExportError> {
        let bytes = std::fs::read(path)?;
        Self::decode(&bytes)
    }

    pub fn from_proto(proto: ModelProto) -> Result<Self, ExportError> {
        Self::decode(&proto.encode_to_vec())
    }

    pub fn proto(&self) -> &ModelProto {
        &self.proto
    }

    fn graph(&self) -> Option<&GraphProto> {
        self.proto.graph.as_ref()
    }

    pub fn name(&self) -> &str {
        self.graph().map_or("", |g| g.name.as_str())
    }

    pub fn inputs(&self) -> Vec<TensorSignature> {
        self.graph()
            .map(|g| g.input.iter().map(TensorSignature::from_value_info).collect())
            .unwrap_or_default()
    }

    pub fn outputs(&self) -> Vec<TensorSignature> {
        self.graph()
            .map(|g| g.output.iter().map(TensorSignature::from_value_info).collect())
            .unwrap_or_default()
    }

    /// Operator types in node order, prefixed with their domain when set
    pub fn operators(&self) -> Vec<String> {
        self.graph()
            .map(|g| {
                g.node
                    .iter()
                    .map(|node| {
                        if node.domain.is_empty() {
                            node.op_type.clone()
                        } else {
                            format!("{}.{}", node.domain, node.op_type)
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn summary(&self) -> GraphSummary {
        GraphSummary {
            name: self.name().to_string(),
            producer: format!("{} {}", self.proto.producer_name, self.proto.producer_version)
                .trim()
                .to_string(),
            ir_version: self.proto.ir_version,
            opsets: self
                .proto
                .opset_import
                .iter()
                .map(|o| OpsetSummary {
                    domain: if o.domain.is_empty() {
                        "ai.onnx".to_string()
                    } else {
                        o.domain.clone()
                    },
                    version: o.version,
                })
                .collect(),
            inputs: self.inputs(),
            outputs: self.outputs(),
            operators: self.operators(),
        }
    }

    /// Declared feature count of the first input, if fixed
    pub fn input_width(&self) -> Option<usize> {
        self.inputs()
            .first()
            .and_then(|input| input.shape.get(1).copied().flatten())
            .and_then(|width| usize::try_from(width).ok())
    }

    /// Run the graph on a batch of rows; features are narrowed to f32
    pub fn predict(&self, rows: ArrayView2<f64>) -> Result<Vec<GraphPrediction>, ExportError> {
        let width = self.input_width().unwrap_or(rows.ncols());
        if rows.ncols() != width {
            return Err(ExportError::FeatureWidth {
                declared: width,
                model: rows.ncols(),
            });
        }
        if rows.nrows() == 0 {
            return Ok(Vec::new());
        }

        let data: Vec<f32> = rows.iter().map(|v| *v as f32).collect();
        let (labels, probabilities) =
            runtime::run(&self.bytes, width, data).map_err(|e| ExportError::Runtime(format!("{e:#}")))?;
        if labels.len() != rows.nrows() || probabilities.len() != 2 * rows.nrows() {
            return Err(ExportError::Runtime(format!(
                "{} rows in, {} labels and {} probabilities out",
                rows.nrows(),
                labels.len(),
                probabilities.len()
            )));
        }
        debug!("Scored {} rows through {}", rows.nrows(), self.name());

        Ok(labels
            .into_iter()
            .zip(probabilities.chunks_exact(2))
            .map(|(label, p)| GraphPrediction {
                label,
                probabilities: [p[0] as f64, p[1] as f64],
            })
            .collect())
    }

    /// Run the graph on one row
    pub fn predict_row(&self, row: &[f64]) -> Result<GraphPrediction, ExportError> {
        let batch = ArrayView2::from_shape((1, row.len()), row).map_err(|e| malformed(e.to_string()))?;
        self.predict(batch)?
            .pop()
            .ok_or_else(|| ExportError::Runtime("graph returned no rows".to_string()))
    }

    /// Positive-class probability for one row
    pub fn predict_proba_row(&self, row: &[f64]) -> Result<f64, ExportError> {
        Ok(self.predict_row(row)?.probabilities[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoostingEngine, GbdtEngine, GbmParams, Tree};
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_matrix(rng: &mut ChaCha8Rng, rows: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, NUM_FEATURES), |(_, j)| match j {
            4 => rng.gen_range(1e5..5e6),
            7 => rng.gen_range(0.0..100.0),
            8 => rng.gen_range(-0.05..0.05),
            _ => rng.gen_range(90.0..110.0),
        })
    }

    fn nine_feature_model() -> TrainedModel {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let x = random_matrix(&mut rng, 200);
        let y: Array1<f64> = x
            .rows()
            .into_iter()
            .map(|row| if row[7] > 50.0 || row[8] > 0.02 { 1.0 } else { 0.0 })
            .collect();
        let params = GbmParams {
            num_boost_round: 40,
            min_data_in_leaf: 5,
            num_leaves: 8,
            learning_rate: 0.1,
            ..Default::default()
        };
        GbdtEngine.fit(x.view(), y.view(), None, &params).unwrap()
    }

    #[test]
    fn test_graph_signature() {
        let model = nine_feature_model();
        let artifact = OnnxExporter::default().export(&model).unwrap();
        assert_eq!(artifact.file_name, "lgb_stock_model.onnx");

        let graph = OnnxGraph::decode(&artifact.bytes).unwrap();
        let inputs = graph.inputs();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].name, "float_input");
        assert_eq!(inputs[0].elem_type, elem_type::FLOAT);
        assert_eq!(inputs[0].shape, vec![None, Some(9)]);
        assert_eq!(inputs[0].shape_string(), "[None, 9]");

        let outputs = graph.outputs();
        let names: Vec<&str> = outputs.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["label", "probabilities"]);
        assert_eq!(outputs[0].elem_type_name, "INT64");
        assert_eq!(outputs[1].shape, vec![None, Some(2)]);

        assert_eq!(graph.name(), "LGBMClassifier");
        assert_eq!(graph.operators(), vec!["ai.onnx.ml.TreeEnsembleClassifier"]);
        let summary = graph.summary();
        assert_eq!(summary.ir_version, 8);
        assert_eq!(summary.opsets[0].domain, "ai.onnx");
        assert_eq!(summary.opsets[0].version, 15);
        assert_eq!(summary.opsets[1].version, 2);
    }

    #[test]
    fn test_graph_matches_native_model() {
        let model = nine_feature_model();
        let graph = OnnxGraph::from_proto(OnnxExporter::default().build(&model).unwrap()).unwrap();

        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let rows = random_matrix(&mut rng, 500);
        let predictions = graph.predict(rows.view()).unwrap();
        assert_eq!(predictions.len(), 500);

        for (row, prediction) in rows.rows().into_iter().zip(&predictions) {
            let native = model.predict_proba_row(&row.to_vec());
            assert_abs_diff_eq!(native, prediction.probabilities[1], epsilon = 1e-5);
            assert_abs_diff_eq!(prediction.probabilities[0] + prediction.probabilities[1], 1.0, epsilon = 1e-6);
            if (native - 0.5).abs() > 1e-4 {
                assert_eq!(prediction.label, i64::from(native > 0.5));
            }
        }
    }

    #[test]
    fn test_single_row_matches_batch() {
        let model = nine_feature_model();
        let graph = OnnxGraph::from_proto(OnnxExporter::default().build(&model).unwrap()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let rows = random_matrix(&mut rng, 3);

        let batch = graph.predict(rows.view()).unwrap();
        let single = graph.predict_proba_row(&rows.row(2).to_vec()).unwrap();
        assert_abs_diff_eq!(single, batch[2].probabilities[1], epsilon = 1e-7);
    }

    #[test]
    fn test_missing_values_follow_false_branch() {
        let model = nine_feature_model();
        let graph = OnnxGraph::from_proto(OnnxExporter::default().build(&model).unwrap()).unwrap();
        let row = vec![f64::NAN; NUM_FEATURES];

        assert_abs_diff_eq!(
            model.predict_proba_row(&row),
            graph.predict_proba_row(&row).unwrap(),
            epsilon = 1e-5
        );
    }

    fn stump(threshold: f64, leaves: [f64; 2]) -> TrainedModel {
        let mut tree = Tree::constant(0.0, 2, 0.1);
        tree.split_feature = vec![0];
        tree.split_gain = vec![1.0];
        tree.threshold = vec![threshold];
        tree.left_child = vec![!0];
        tree.right_child = vec![!1];
        tree.internal_count = vec![2];
        tree.leaf_value = leaves.to_vec();
        tree.leaf_count = vec![1, 1];

        let mut model = nine_feature_model();
        model.trees = vec![tree];
        model
    }

    #[test]
    fn test_rejects_unrepresentable_threshold() {
        let err = OnnxExporter::default().build(&stump(0.1, [0.5, -0.5])).unwrap_err();
        assert!(matches!(err, ExportError::ThresholdNotRepresentable { tree: 0, node: 0, .. }));

        assert!(OnnxExporter::default().build(&stump(0.5, [0.5, -0.5])).is_ok());
    }

    #[test]
    fn test_rejects_non_finite_leaf() {
        let err = OnnxExporter::default().build(&stump(0.5, [f64::INFINITY, 0.0])).unwrap_err();
        assert!(matches!(err, ExportError::NonFiniteLeaf { leaf: 0, .. }));

        let err = OnnxExporter::default().build(&stump(0.5, [1e300, 0.0])).unwrap_err();
        assert!(matches!(err, ExportError::NonFiniteLeaf { .. }));
    }

    #[test]
    fn test_rejects_accumulated_rounding() {
        // f32 spacing near 3000 is 2^-12, so the 1e-4 offset is lost
        let err = OnnxExporter::default()
            .build(&stump(0.5, [3000.0001, 0.0]))
            .unwrap_err();
        assert!(matches!(err, ExportError::LeafRounding { .. }));
    }

    #[test]
    fn test_rejects_width_mismatch() {
        let err = OnnxExporter::default()
            .with_input_width(5)
            .build(&nine_feature_model())
            .unwrap_err();
        assert!(matches!(err, ExportError::FeatureWidth { declared: 5, model: 9 }));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(OnnxGraph::decode(&[0xff, 0xff, 0xff]).is_err());
        // Valid protobuf with no graph
        assert!(OnnxGraph::decode(&[]).is_err());
    }

    #[test]
    fn test_predict_rejects_short_row() {
        let graph = OnnxGraph::from_proto(OnnxExporter::default().build(&nine_feature_model()).unwrap()).unwrap();
        assert!(matches!(
            graph.predict_row(&[1.0, 2.0]),
            Err(ExportError::FeatureWidth { declared: 9, model: 2 })
        ));
        assert!(graph.predict(Array2::<f64>::zeros((0, 9)).view()).unwrap().is_empty());
    }
}
