//! Tests for error types

use boutmix::Error;

#[test]
fn test_invalid_size_error() {
    let error = Error::InvalidSize {
        context: "training split of condition 1".to_string(),
        requested: 100,
        available: 60,
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid size"));
    assert!(error_str.contains("condition 1"));
    assert!(error_str.contains("requested 100"));
    assert!(error_str.contains("available 60"));
}

#[test]
fn test_model_fit_error() {
    let error = Error::ModelFit("EM did not converge".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Model fit failed"));
    assert!(error_str.contains("did not converge"));
}

#[test]
fn test_dimension_mismatch_error() {
    let error = Error::DimensionMismatch("condition 1 has 3 features".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Dimension mismatch"));
    assert!(error_str.contains("3 features"));
}

#[test]
fn test_invalid_config_error() {
    let error = Error::InvalidConfig("repetitions must be positive".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid configuration"));
    assert!(error_str.contains("repetitions"));
}

#[test]
fn test_storage_error() {
    let error = Error::StorageError("file not found".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Storage error"));
    assert!(error_str.contains("file not found"));
}

#[test]
fn test_invalid_input_error() {
    let error = Error::InvalidInput("condition 5 out of range".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid input"));
    assert!(error_str.contains("condition 5"));
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.json");
    let error: Error = io_error.into();
    let error_str = format!("{error}");
    assert!(error_str.contains("IO error"));
    assert!(error_str.contains("missing.json"));
}

#[test]
fn test_json_error_conversion() {
    let json_error = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let error: Error = json_error.into();
    assert!(format!("{error}").contains("JSON error"));
}

#[test]
fn test_other_error() {
    let error = Error::Other("custom error".to_string());
    assert_eq!(format!("{error}"), "custom error");
}

#[test]
fn test_error_debug() {
    let error = Error::ModelFit("singular covariance".to_string());
    let debug_str = format!("{error:?}");
    assert!(debug_str.contains("ModelFit"));
}
