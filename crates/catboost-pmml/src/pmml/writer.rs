//! PMML 4.4 document writer.
//!
//! # Document Structure
//!
//! ```text
//! PMML
//! ├── Header / Application
//! ├── DataDictionary          features (continuous float) + target
//! └── MiningModel
//!     regression:      Segmentation sum → TreeModel*
//!     classification:  Segmentation modelChain
//!                      ├── MiningModel (sum → TreeModel*) per dimension, output cbValue[(k)]
//!                      └── RegressionModel logit | softmax, output probability(k)
//! ```

use std::collections::HashSet;
use std::io::Write;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use tracing::debug;

use super::fields::FieldNames;
use super::{PMML_NAMESPACE, PMML_VERSION};
use crate::config::EncoderConfig;
use crate::error::EncodeError;
use crate::repr::{DimensionModel, Ensemble, NodeId, NodeKind, OutputKind, Predicate, PredicateTree};

const APPLICATION_NAME: &str = env!("CARGO_PKG_NAME");
const APPLICATION_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Streams an [`Ensemble`] as a PMML document.
///
/// ```ignore
/// let writer = PmmlWriter::new(File::create("model.pmml")?, EncoderConfig::default())?;
/// let file = writer.write_ensemble(&ensemble)?;
/// ```
pub struct PmmlWriter<W: Write> {
    xml: Writer<W>,
    config: EncoderConfig,
}

/// Which side of a classification chain a sub-model sits on.
#[derive(Clone, Copy, PartialEq, Eq)]
enum SubModelRole {
    /// Top-level regression model predicting the target.
    Target,
    /// Chain member exporting one raw value.
    RawValue,
}

impl<W: Write> PmmlWriter<W> {
    /// Create a writer after validating `config`.
    pub fn new(inner: W, config: EncoderConfig) -> Result<Self, EncodeError> {
        config.validate()?;
        let xml = if config.indent > 0 {
            Writer::new_with_indent(inner, b' ', config.indent)
        } else {
            Writer::new(inner)
        };
        Ok(Self { xml, config })
    }

    /// Write the full document and return the underlying writer.
    ///
    /// # Errors
    ///
    /// - [`EncodeError::FieldCollision`] if two declared fields share a name
    /// - [`EncodeError::Model`] if the dimensions do not fit the output kind
    /// - [`EncodeError::Io`] on write failure
    pub fn write_ensemble(mut self, ensemble: &Ensemble) -> Result<W, EncodeError> {
        check_dimensions(ensemble)?;
        let names = FieldNames::new(ensemble, &self.config)?;

        self.xml
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.start("PMML", &[("xmlns", PMML_NAMESPACE), ("version", PMML_VERSION)])?;
        self.write_header(ensemble)?;
        self.write_data_dictionary(ensemble, &names)?;

        match ensemble.kind {
            OutputKind::Regression => {
                self.write_sub_model(ensemble, &ensemble.dimensions[0], &names, 0, SubModelRole::Target)?;
            }
            OutputKind::BinaryClassification | OutputKind::MulticlassClassification { .. } => {
                self.write_classification(ensemble, &names)?;
            }
        }

        self.end("PMML")?;
        debug!(
            trees = ensemble.n_trees(),
            dimensions = ensemble.n_dimensions(),
            "wrote PMML document"
        );

        let trailing_newline = self.config.indent > 0;
        let mut inner = self.xml.into_inner();
        if trailing_newline {
            inner.write_all(b"\n")?;
        }
        inner.flush()?;
        Ok(inner)
    }

    // =========================================================================
    // Document sections
    // =========================================================================

    fn write_header(&mut self, ensemble: &Ensemble) -> Result<(), EncodeError> {
        let description = format!("CatBoost {} model", ensemble.loss);
        self.start("Header", &[("description", description.as_str())])?;
        self.empty(
            "Application",
            &[("name", APPLICATION_NAME), ("version", APPLICATION_VERSION)],
        )?;
        self.end("Header")
    }

    fn write_data_dictionary(&mut self, ensemble: &Ensemble, names: &FieldNames) -> Result<(), EncodeError> {
        let n_fields = (ensemble.features.len() + 1).to_string();
        self.start("DataDictionary", &[("numberOfFields", n_fields.as_str())])?;

        for feature in &ensemble.features {
            self.empty(
                "DataField",
                &[("name", feature.name.as_str()), ("optype", "continuous"), ("dataType", "float")],
            )?;
        }

        match ensemble.kind.n_classes() {
            None => self.empty(
                "DataField",
                &[("name", names.target.as_str()), ("optype", "continuous"), ("dataType", "double")],
            )?,
            Some(n_classes) => {
                self.start(
                    "DataField",
                    &[("name", names.target.as_str()), ("optype", "categorical"), ("dataType", "integer")],
                )?;
                for class in 0..n_classes {
                    self.empty("Value", &[("value", class.to_string().as_str())])?;
                }
                self.end("DataField")?;
            }
        }

        self.end("DataDictionary")
    }

    /// `MiningSchema` with the target (if any) followed by every feature.
    fn write_mining_schema(&mut self, ensemble: &Ensemble, target: Option<&str>) -> Result<(), EncodeError> {
        self.start("MiningSchema", &[])?;
        if let Some(target) = target {
            self.empty("MiningField", &[("name", target), ("usageType", "target")])?;
        }
        for feature in &ensemble.features {
            self.empty("MiningField", &[("name", feature.name.as_str())])?;
        }
        self.end("MiningSchema")
    }

    /// Sum of trees for dimension `k`.
    fn write_sub_model(
        &mut self,
        ensemble: &Ensemble,
        dimension: &DimensionModel,
        names: &FieldNames,
        k: usize,
        role: SubModelRole,
    ) -> Result<(), EncodeError> {
        self.start("MiningModel", &[("functionName", "regression")])?;

        match role {
            SubModelRole::Target => self.write_mining_schema(ensemble, Some(names.target.as_str()))?,
            SubModelRole::RawValue => {
                self.write_mining_schema(ensemble, None)?;
                self.start("Output", &[])?;
                self.empty(
                    "OutputField",
                    &[
                        ("name", names.values[k].as_str()),
                        ("optype", "continuous"),
                        ("dataType", "double"),
                        ("feature", "predictedValue"),
                        ("isFinalResult", "false"),
                    ],
                )?;
                self.end("Output")?;
            }
        }

        if dimension.has_rescale() {
            let factor = number(dimension.scale);
            let constant = number(dimension.bias);
            self.start("Targets", &[])?;
            match role {
                SubModelRole::Target => self.empty(
                    "Target",
                    &[
                        ("field", names.target.as_str()),
                        ("rescaleFactor", factor.as_str()),
                        ("rescaleConstant", constant.as_str()),
                    ],
                )?,
                SubModelRole::RawValue => self.empty(
                    "Target",
                    &[("rescaleFactor", factor.as_str()), ("rescaleConstant", constant.as_str())],
                )?,
            }
            self.end("Targets")?;
        }

        self.start("Segmentation", &[("multipleModelMethod", "sum")])?;
        if dimension.trees.is_empty() {
            // A segmentation needs at least one segment; a constant zero tree
            // keeps the sum unchanged.
            self.start("Segment", &[("id", "1")])?;
            self.empty("True", &[])?;
            self.start_tree_model(ensemble, &[])?;
            self.start("Node", &[("id", "1"), ("score", "0")])?;
            self.empty("True", &[])?;
            self.end("Node")?;
            self.end("TreeModel")?;
            self.end("Segment")?;
        }
        for (i, tree) in dimension.trees.iter().enumerate() {
            self.start("Segment", &[("id", (i + 1).to_string().as_str())])?;
            self.empty("True", &[])?;
            self.write_tree(ensemble, tree)?;
            self.end("Segment")?;
        }
        self.end("Segmentation")?;

        self.end("MiningModel")
    }

    /// Model chain: raw-value sub-models, then a logit or softmax regression.
    fn write_classification(&mut self, ensemble: &Ensemble, names: &FieldNames) -> Result<(), EncodeError> {
        self.start("MiningModel", &[("functionName", "classification")])?;
        self.write_mining_schema(ensemble, Some(names.target.as_str()))?;
        self.start("Segmentation", &[("multipleModelMethod", "modelChain")])?;

        for (k, dimension) in ensemble.dimensions.iter().enumerate() {
            self.start("Segment", &[("id", (k + 1).to_string().as_str())])?;
            self.empty("True", &[])?;
            self.write_sub_model(ensemble, dimension, names, k, SubModelRole::RawValue)?;
            self.end("Segment")?;
        }

        let segment_id = (ensemble.dimensions.len() + 1).to_string();
        self.start("Segment", &[("id", segment_id.as_str())])?;
        self.empty("True", &[])?;

        let normalization = match ensemble.kind {
            OutputKind::BinaryClassification => "logit",
            _ => "softmax",
        };
        self.start(
            "RegressionModel",
            &[("functionName", "classification"), ("normalizationMethod", normalization)],
        )?;

        self.start("MiningSchema", &[])?;
        self.empty("MiningField", &[("name", names.target.as_str()), ("usageType", "target")])?;
        for value in &names.values {
            self.empty("MiningField", &[("name", value.as_str())])?;
        }
        self.end("MiningSchema")?;

        self.start("Output", &[])?;
        for (class, name) in names.probabilities.iter().enumerate() {
            self.empty(
                "OutputField",
                &[
                    ("name", name.as_str()),
                    ("optype", "continuous"),
                    ("dataType", "double"),
                    ("feature", "probability"),
                    ("value", class.to_string().as_str()),
                ],
            )?;
        }
        self.end("Output")?;

        match ensemble.kind {
            OutputKind::BinaryClassification => {
                // P(1) = logit⁻¹(cbValue); category 0 is the complement.
                self.write_regression_table("1", Some(names.values[0].as_str()))?;
                self.write_regression_table("0", None)?;
            }
            _ => {
                for (class, value) in names.values.iter().enumerate() {
                    self.write_regression_table(&class.to_string(), Some(value.as_str()))?;
                }
            }
        }

        self.end("RegressionModel")?;
        self.end("Segment")?;
        self.end("Segmentation")?;
        self.end("MiningModel")
    }

    fn write_regression_table(&mut self, category: &str, predictor: Option<&str>) -> Result<(), EncodeError> {
        let attrs = [("intercept", "0"), ("targetCategory", category)];
        match predictor {
            None => self.empty("RegressionTable", &attrs),
            Some(field) => {
                self.start("RegressionTable", &attrs)?;
                self.empty("NumericPredictor", &[("name", field), ("coefficient", "1")])?;
                self.end("RegressionTable")
            }
        }
    }

    // =========================================================================
    // Trees
    // =========================================================================

    /// Opens a `TreeModel`. A tree without splits lists every feature, since a
    /// `MiningSchema` needs at least one field.
    fn start_tree_model(&mut self, ensemble: &Ensemble, used_fields: &[&str]) -> Result<(), EncodeError> {
        self.start(
            "TreeModel",
            &[
                ("functionName", "regression"),
                ("missingValueStrategy", "defaultChild"),
                ("splitCharacteristic", "binarySplit"),
            ],
        )?;
        self.start("MiningSchema", &[])?;
        if used_fields.is_empty() {
            for feature in &ensemble.features {
                self.empty("MiningField", &[("name", feature.name.as_str())])?;
            }
        }
        for &field in used_fields {
            self.empty("MiningField", &[("name", field)])?;
        }
        self.end("MiningSchema")
    }

    fn write_tree(&mut self, ensemble: &Ensemble, tree: &PredicateTree) -> Result<(), EncodeError> {
        let mut seen = HashSet::new();
        let used_fields: Vec<&str> = tree
            .nodes()
            .iter()
            .filter_map(|node| match &node.predicate {
                Predicate::LessOrEqual(split) | Predicate::GreaterThan(split) => Some(&*split.name),
                Predicate::True => None,
            })
            .filter(|name| seen.insert(*name))
            .collect();

        self.start_tree_model(ensemble, &used_fields)?;
        self.write_node(tree, tree.root())?;
        self.end("TreeModel")
    }

    fn write_node(&mut self, tree: &PredicateTree, id: NodeId) -> Result<(), EncodeError> {
        let node = tree.node(id);

        let mut attrs = vec![("id", node_label(id))];
        match node.kind {
            NodeKind::Leaf { value, weight, .. } => {
                attrs.push(("score", number(value)));
                if let Some(weight) = weight.filter(|_| self.config.write_record_counts) {
                    attrs.push(("recordCount", number(weight)));
                }
            }
            NodeKind::Branch { .. } => {
                if let Some(child) = tree.missing_child(id) {
                    attrs.push(("defaultChild", node_label(child)));
                }
            }
        }
        let attrs: Vec<(&str, &str)> = attrs.iter().map(|(k, v)| (*k, v.as_str())).collect();

        self.start("Node", &attrs)?;
        self.write_predicate(&node.predicate)?;
        if let NodeKind::Branch { left, right } = node.kind {
            self.write_node(tree, left)?;
            self.write_node(tree, right)?;
        }
        self.end("Node")
    }

    fn write_predicate(&mut self, predicate: &Predicate) -> Result<(), EncodeError> {
        let (split, operator) = match predicate {
            Predicate::True => return self.empty("True", &[]),
            Predicate::LessOrEqual(split) => (split, "lessOrEqual"),
            Predicate::GreaterThan(split) => (split, "greaterThan"),
        };
        let value = border(split.border);
        self.empty(
            "SimplePredicate",
            &[("field", &*split.name), ("operator", operator), ("value", value.as_str())],
        )
    }

    // =========================================================================
    // Events
    // =========================================================================

    fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), EncodeError> {
        let element = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.xml.write_event(Event::Start(element))?;
        Ok(())
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), EncodeError> {
        let element = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.xml.write_event(Event::Empty(element))?;
        Ok(())
    }

    fn end(&mut self, name: &str) -> Result<(), EncodeError> {
        self.xml.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }
}

fn check_dimensions(ensemble: &Ensemble) -> Result<(), EncodeError> {
    let n = ensemble.n_dimensions();
    let ok = match ensemble.kind {
        OutputKind::Regression | OutputKind::BinaryClassification => n == 1,
        OutputKind::MulticlassClassification { n_classes } => n >= 2 && n == n_classes,
    };
    if ok {
        Ok(())
    } else {
        Err(EncodeError::Model(format!(
            "{:?} output with {n} dimension(s)",
            ensemble.kind
        )))
    }
}

/// Pre-order node number, starting at 1.
fn node_label(id: NodeId) -> String {
    (u64::from(id) + 1).to_string()
}

/// `xs:double` lexical form.
fn number(value: f64) -> String {
    if value == f64::INFINITY {
        "INF".to_string()
    } else if value == f64::NEG_INFINITY {
        "-INF".to_string()
    } else {
        value.to_string()
    }
}

/// Shortest decimal that reads back as the same `f32`.
fn border(value: f32) -> String {
    if value == f32::INFINITY {
        "INF".to_string()
    } else if value == f32::NEG_INFINITY {
        "-INF".to_string()
    } else {
        value.to_string()
    }
}
