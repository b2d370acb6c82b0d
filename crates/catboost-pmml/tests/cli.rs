//! Command-line conversion tests.

#![cfg(feature = "cli")]

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use catboost_pmml::testing::CbmBuilder;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("cbm2pmml-{}-{name}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn run(input: &PathBuf, output: &PathBuf, extra: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_cbm2pmml"))
        .arg("--cbm-input")
        .arg(input)
        .arg("--pmml-output")
        .arg(output)
        .args(extra)
        .output()
        .unwrap()
}

#[test]
fn converts_model_file() {
    let dir = scratch_dir("ok");
    let input = dir.join("model.cbm");
    let output = dir.join("model.pmml");
    let bytes = CbmBuilder::new()
        .float_feature(0, "x", &[0.5])
        .tree(&[0], &[1.0, 3.0], &[10.0, 5.0])
        .loss("RMSE")
        .build();
    fs::write(&input, bytes).unwrap();

    let result = run(&input, &output, &["--compact", "--target-name", "y"]);
    assert!(result.status.success(), "{}", String::from_utf8_lossy(&result.stderr));

    let xml = fs::read_to_string(&output).unwrap();
    assert!(xml.contains(r#"<MiningField name="y" usageType="target"/>"#));
    assert!(!xml.contains('\n'));

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn failure_writes_nothing() {
    let dir = scratch_dir("fail");
    let input = dir.join("model.cbm");
    let output = dir.join("model.pmml");
    let bytes = CbmBuilder::new()
        .float_feature(0, "x", &[0.5])
        .one_hot_features(2)
        .loss("RMSE")
        .build();
    fs::write(&input, bytes).unwrap();

    let result = run(&input, &output, &[]);
    assert_eq!(result.status.code(), Some(1));
    assert!(!output.exists());
    assert!(String::from_utf8_lossy(&result.stderr).contains("one-hot"));

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn missing_arguments_exit_with_usage_error() {
    let result = Command::new(env!("CARGO_BIN_EXE_cbm2pmml")).output().unwrap();
    assert_eq!(result.status.code(), Some(2));
}
