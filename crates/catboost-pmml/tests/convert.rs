//! End-to-end conversion tests on synthetic `.cbm` models.

use std::collections::BTreeMap;

use approx::assert_abs_diff_eq;
use quick_xml::events::Event;
use quick_xml::Reader;

use catboost_pmml::cbm::NanTreatment;
use catboost_pmml::testing::CbmBuilder;
use catboost_pmml::{
    convert, read_ensemble, ConvertError, EncoderConfig, Error, FeatureKind, OutputKind,
};

// =============================================================================
// Helpers
// =============================================================================

fn convert_to_string(bytes: &[u8]) -> Result<String, Error> {
    let mut out = Vec::new();
    convert(bytes, &EncoderConfig::default(), &mut out)?;
    Ok(String::from_utf8(out).expect("utf-8 document"))
}

/// Parse the whole document and count elements by name.
fn element_counts(xml: &str) -> BTreeMap<String, usize> {
    let mut reader = Reader::from_str(xml);
    let mut counts = BTreeMap::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                *counts.entry(name).or_insert(0) += 1;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => panic!("malformed document at {}: {e}", reader.buffer_position()),
        }
    }
    counts
}

fn regression_model() -> Vec<u8> {
    CbmBuilder::new()
        .float_feature(0, "feature", &[0.5])
        .tree(&[0], &[1.0, 3.0], &[10.0, 5.0])
        .loss("RMSE")
        .build()
}

/// Converting must fail and leave the output untouched.
fn assert_rejected(bytes: &[u8]) -> Error {
    let mut out = Vec::new();
    let err = convert(bytes, &EncoderConfig::default(), &mut out).unwrap_err();
    assert!(out.is_empty(), "partial output written: {} bytes", out.len());
    err
}

// =============================================================================
// Accepted models
// =============================================================================

#[test]
fn regression_scenario() {
    let bytes = regression_model();

    let ensemble = read_ensemble(bytes.as_slice()).unwrap();
    assert_eq!(ensemble.kind, OutputKind::Regression);
    assert_eq!(ensemble.raw_scores(&[0.2]), vec![1.0]);
    assert_eq!(ensemble.raw_scores(&[0.9]), vec![3.0]);

    let xml = convert_to_string(&bytes).unwrap();
    let counts = element_counts(&xml);
    assert_eq!(counts["TreeModel"], 1);
    assert_eq!(counts["Node"], 3);
    assert_eq!(counts["SimplePredicate"], 2);
    assert_eq!(counts["DataField"], 2);
    assert!(xml.contains(r#"score="1" recordCount="10""#));
    assert!(xml.contains(r#"score="3" recordCount="5""#));
}

#[test]
fn binary_scenario() {
    let bytes = CbmBuilder::new()
        .float_feature(0, "x", &[0.5])
        .tree(&[0], &[0.0, 2.0], &[4.0, 4.0])
        .loss("Logloss")
        .build();

    let ensemble = read_ensemble(bytes.as_slice()).unwrap();
    let prediction = ensemble.predict(&[0.0]);
    assert_eq!(prediction.raw, vec![0.0]);
    let p = prediction.probabilities.unwrap();
    assert_abs_diff_eq!(p[1], 0.5, epsilon = 1e-12);

    let xml = convert_to_string(&bytes).unwrap();
    let counts = element_counts(&xml);
    assert_eq!(counts["RegressionModel"], 1);
    assert_eq!(counts["RegressionTable"], 2);
    assert_eq!(counts["MiningModel"], 2);
    assert!(xml.contains(r#"normalizationMethod="logit""#));
}

#[test]
fn multiclass_scenario() {
    let bytes = CbmBuilder::new()
        .float_feature(0, "x", &[0.5])
        .float_feature(1, "y", &[-1.0, 1.0])
        .dimensions(3)
        .tree(&[0], &[1.0, 1.0, 1.0, 0.0, 0.0, 3.0], &[5.0, 5.0])
        .tree(&[2, 1], &[0.0; 12], &[1.0, 2.0, 3.0, 4.0])
        .loss("MultiClass")
        .build();

    let ensemble = read_ensemble(bytes.as_slice()).unwrap();
    assert_eq!(ensemble.kind, OutputKind::MulticlassClassification { n_classes: 3 });

    let p = ensemble.predict(&[0.0, 0.0]).probabilities.unwrap();
    for v in &p {
        assert_abs_diff_eq!(*v, 1.0 / 3.0, epsilon = 1e-12);
    }
    assert_eq!(ensemble.raw_scores(&[1.0, 0.0]), vec![0.0, 0.0, 3.0]);

    let xml = convert_to_string(&bytes).unwrap();
    let counts = element_counts(&xml);
    // Two trees per dimension.
    assert_eq!(counts["TreeModel"], 6);
    assert_eq!(counts["RegressionTable"], 3);
    assert_eq!(counts["Value"], 3);
    assert!(xml.contains(r#"normalizationMethod="softmax""#));
}

#[test]
fn missing_value_takes_nan_branch() {
    let default_mode = CbmBuilder::new()
        .float_feature(0, "x", &[0.5])
        .nan_treatment(NanTreatment::AsFalse)
        .tree(&[0], &[1.0, 3.0], &[10.0, 5.0])
        .loss("RMSE")
        .build();
    let ensemble = read_ensemble(default_mode.as_slice()).unwrap();
    assert_eq!(ensemble.raw_scores(&[f64::NAN]), vec![1.0]);
    let xml = convert_to_string(&default_mode).unwrap();
    assert!(xml.contains(r#"<Node id="1" defaultChild="2">"#));

    let max_mode = CbmBuilder::new()
        .float_feature(0, "x", &[0.5])
        .nan_treatment(NanTreatment::AsTrue)
        .tree(&[0], &[1.0, 3.0], &[10.0, 5.0])
        .loss("RMSE")
        .build();
    let ensemble = read_ensemble(max_mode.as_slice()).unwrap();
    assert_eq!(ensemble.raw_scores(&[f64::NAN]), vec![3.0]);
    let xml = convert_to_string(&max_mode).unwrap();
    assert!(xml.contains(r#"<Node id="1" defaultChild="3">"#));
}

#[test]
fn scores_compare_at_float_precision() {
    let ensemble = read_ensemble(regression_model().as_slice()).unwrap();
    // 0.500000001 is 0.5 as a float, so it is not above the border.
    assert_eq!(ensemble.raw_scores(&[0.500000001]), vec![1.0]);
    assert_eq!(ensemble.raw_scores(&[0.5001]), vec![3.0]);
}

#[test]
fn damaged_trailing_segment_still_converts() {
    let mut bytes = CbmBuilder::new()
        .float_feature(0, "feature", &[0.5])
        .tree(&[0], &[1.0, 3.0], &[10.0, 5.0])
        .loss("RMSE")
        .trailing_segment(&[0u8; 32])
        .build();
    bytes.truncate(bytes.len() - 8);
    assert!(convert_to_string(&bytes).is_ok());
}

#[test]
fn trees_share_one_split_table() {
    // Feature slots are filled by descriptor index, not declaration order.
    let bytes = CbmBuilder::new()
        .float_feature(1, "b", &[10.0])
        .float_feature(0, "a", &[1.0, 2.0])
        .tree(&[2], &[0.0, 1.0], &[1.0, 1.0])
        .loss("RMSE")
        .build();

    let xml = convert_to_string(&bytes).unwrap();
    assert!(xml.contains(r#"<SimplePredicate field="b" operator="lessOrEqual" value="10"/>"#));

    let ensemble = read_ensemble(bytes.as_slice()).unwrap();
    assert_eq!(ensemble.raw_scores(&[0.0, 11.0]), vec![1.0]);
}

#[test]
fn crossentropy_is_binary() {
    let bytes = CbmBuilder::new()
        .float_feature(0, "x", &[0.5])
        .tree(&[0], &[0.0, 1.0], &[1.0, 1.0])
        .loss("CrossEntropy")
        .build();
    let ensemble = read_ensemble(bytes.as_slice()).unwrap();
    assert_eq!(ensemble.kind, OutputKind::BinaryClassification);
}

#[test]
fn custom_target_name() {
    let config = EncoderConfig::builder().target_name("price").build().unwrap();
    let mut out = Vec::new();
    convert(regression_model().as_slice(), &config, &mut out).unwrap();
    let xml = String::from_utf8(out).unwrap();
    assert!(xml.contains(r#"<MiningField name="price" usageType="target"/>"#));
    assert!(!xml.contains("_target"));
}

// =============================================================================
// Rejected models
// =============================================================================

#[test]
fn bad_magic() {
    let mut bytes = regression_model();
    bytes[..4].copy_from_slice(b"CBM0");
    let err = assert_rejected(&bytes);
    assert!(matches!(err, Error::Convert(ConvertError::Format { .. })), "got {err}");
}

#[test]
fn truncated_payload() {
    let bytes = regression_model();
    let err = assert_rejected(&bytes[..bytes.len() - 3]);
    assert!(matches!(err, Error::Convert(ConvertError::Truncated { .. })), "got {err}");
}

#[test]
fn categorical_features() {
    let bytes = CbmBuilder::new()
        .float_feature(0, "x", &[0.5])
        .categorical_features(1)
        .tree(&[0], &[1.0, 3.0], &[1.0, 1.0])
        .loss("RMSE")
        .build();
    let err = assert_rejected(&bytes);
    assert!(matches!(
        err,
        Error::Convert(ConvertError::UnsupportedFeature {
            kind: FeatureKind::Categorical,
            count: 1
        })
    ));
}

#[test]
fn unsupported_loss() {
    let bytes = CbmBuilder::new()
        .float_feature(0, "x", &[0.5])
        .tree(&[0], &[1.0, 3.0], &[1.0, 1.0])
        .loss("Poisson")
        .build();
    let err = assert_rejected(&bytes);
    assert!(matches!(err, Error::Convert(ConvertError::UnsupportedLossFunction(name)) if name == "Poisson"));
}

#[test]
fn missing_params() {
    let bytes = CbmBuilder::new()
        .float_feature(0, "x", &[0.5])
        .tree(&[0], &[1.0, 3.0], &[1.0, 1.0])
        .build();
    let err = assert_rejected(&bytes);
    assert!(matches!(err, Error::Convert(ConvertError::InvalidParams(_))));
}

#[test]
fn split_index_out_of_range() {
    let bytes = CbmBuilder::new()
        .float_feature(0, "x", &[0.5])
        .tree(&[7], &[1.0, 3.0], &[1.0, 1.0])
        .loss("RMSE")
        .build();
    let err = assert_rejected(&bytes);
    assert!(matches!(err, Error::Convert(ConvertError::InternalDecode(_))));
}

#[test]
fn field_collision() {
    let bytes = CbmBuilder::new()
        .float_feature(0, "cbValue", &[0.5])
        .tree(&[0], &[1.0, 3.0], &[1.0, 1.0])
        .loss("Logloss")
        .build();
    let err = assert_rejected(&bytes);
    assert!(err.to_string().contains("cbValue"));
}
