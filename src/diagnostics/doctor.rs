//! Pre-training environment validation
//!
//! Checks devices, the training config, model files, training data, and the
//! output directory before a long training run is started. Every check
//! prints what it found; the summary counts passes.

use std::path::Path;

use crate::training::device::{
    is_cuda_available, is_cuda_compiled, is_metal_available, is_metal_compiled,
};
use crate::training::TrainingConfig;

/// Validate that everything a training run needs is in place
///
/// Returns true when all checks passed.
pub fn validate_setup(config_path: &str) -> bool {
    println!("EMERGENCY RELIEF AI - TRAINING SETUP VALIDATION");
    println!("{}", "=".repeat(60));

    let device_ok = run_check("Device", check_device);

    print_check_header("Configuration");
    let config = check_configuration(config_path);
    let config_ok = config.is_some();
    print_check_result("Configuration", config_ok);

    let (model_ok, data_ok, output_ok) = match &config {
        Some(config) => (
            run_check("Model Files", || check_model_files(&config.model_path)),
            run_check("Training Data", || {
                check_training_data(Path::new(&config.data_path))
            }),
            run_check("Output Directory", || {
                check_output_directory(Path::new(&config.output_dir))
            }),
        ),
        None => {
            println!("\nSkipping file checks: configuration not loaded");
            (false, false, false)
        }
    };

    let checks = [device_ok, config_ok, model_ok, data_ok, output_ok];
    let passed = checks.iter().filter(|ok| **ok).count();
    let total = checks.len();

    println!("\n{}", "=".repeat(60));
    println!("VALIDATION SUMMARY");
    println!("{}", "=".repeat(60));
    println!("Passed: {}/{}", passed, total);
    println!("Failed: {}/{}", total - passed, total);

    if passed == total {
        println!("\nALL CHECKS PASSED!");
        println!("Ready to start training.");
        println!("\nNext steps:");
        println!("  1. era train --config {}", config_path);
        println!("  2. era eval --adapter <output_dir>/adapter");
        println!("  3. era serve --adapter <output_dir>/adapter");
        true
    } else {
        println!("\n{} check(s) failed", total - passed);
        println!("Fix the issues above before training.");
        false
    }
}

fn print_check_header(name: &str) {
    println!("\n{} {} {}", "=".repeat(20), name, "=".repeat(20));
}

fn print_check_result(name: &str, ok: bool) {
    println!("{}: {}", name, if ok { "PASSED" } else { "FAILED" });
}

fn run_check(name: &str, check: impl FnOnce() -> bool) -> bool {
    print_check_header(name);
    let ok = check();
    print_check_result(name, ok);
    ok
}

fn check_device() -> bool {
    println!("  ✓ CPU: available");
    for (name, compiled, available) in [
        ("CUDA", is_cuda_compiled(), is_cuda_available()),
        ("Metal", is_metal_compiled(), is_metal_available()),
    ] {
        if available {
            println!("  ✓ {}: available", name);
        } else if compiled {
            println!("  ! {}: compiled in, but no device found", name);
        } else {
            println!("  - {}: not compiled in", name);
        }
    }
    if !is_cuda_available() && !is_metal_available() {
        println!("  ! Training will run on CPU; expect long epochs");
    }
    true
}

/// Parse and validate the training config, reporting each key parameter
///
/// A present-but-wrong-typed value is only a warning here; the typed parse
/// below rejects anything the trainer cannot actually use.
fn check_configuration(config_path: &str) -> Option<TrainingConfig> {
    let path = Path::new(config_path);
    if !path.exists() {
        println!("  ✗ Config file not found: {}", config_path);
        return None;
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            println!("  ✗ Cannot read config file: {}", e);
            return None;
        }
    };
    let raw: serde_json::Value = match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            println!("  ✗ Configuration is not valid JSON: {}", e);
            return None;
        }
    };

    let mut all_present = true;
    for (key, expected) in [
        ("model_path", "string"),
        ("data_path", "string"),
        ("output_dir", "string"),
        ("num_epochs", "integer"),
        ("batch_size", "integer"),
        ("learning_rate", "number"),
    ] {
        match raw.get(key) {
            Some(value) => {
                let type_ok = match expected {
                    "string" => value.is_string(),
                    "integer" => value.is_u64(),
                    _ => value.is_number(),
                };
                if type_ok {
                    println!("  ✓ {}: {}", key, value);
                } else {
                    println!("  ! {}: {} (expected {})", key, value, expected);
                }
            }
            None => {
                println!("  ✗ Missing parameter: {}", key);
                all_present = false;
            }
        }
    }
    if !all_present {
        return None;
    }

    let config = match TrainingConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            println!("  ✗ {:#}", e);
            return None;
        }
    };
    if let Err(e) = config.validate() {
        println!("  ✗ Invalid configuration: {:#}", e);
        return None;
    }
    println!("  ✓ Configuration loaded");
    Some(config)
}

fn check_model_files(model_path: &str) -> bool {
    let dir = Path::new(model_path);
    if !dir.exists() {
        if model_path.starts_with('.') || model_path.starts_with('/') {
            println!("  ✗ Model directory not found: {}", model_path);
            return false;
        }
        println!("  ✓ Remote model ID: {}", model_path);
        println!("    Files will be downloaded from the HuggingFace Hub on first use");
        return true;
    }

    let weight_count = count_weight_files(dir);
    if weight_count == 0 {
        println!("  ✗ No .safetensors weight files found in {}", model_path);
        return false;
    }
    println!("  ✓ Found {} weight file(s)", weight_count);

    let mut all_present = true;
    for name in ["config.json", "tokenizer.json", "tokenizer_config.json"] {
        if dir.join(name).exists() {
            println!("  ✓ {}", name);
        } else {
            println!("  ✗ Missing: {}", name);
            all_present = false;
        }
    }

    let total_gb = dir_size_bytes(dir) as f64 / 1e9;
    println!("  Total model size: {:.1}GB", total_gb);
    if total_gb < 0.1 {
        println!("  ! Model seems unusually small");
    }

    all_present
}

fn count_weight_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .filter(|entry| {
            entry
                .path()
                .extension()
                .map_or(false, |ext| ext == "safetensors")
        })
        .count()
}

fn dir_size_bytes(dir: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .filter_map(|entry| entry.metadata().ok())
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
        .sum()
}

fn check_training_data(path: &Path) -> bool {
    if !path.exists() {
        println!("  ✗ Training data not found: {:?}", path);
        return false;
    }
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            println!("  ✗ Cannot read training data: {}", e);
            return false;
        }
    };
    let data: serde_json::Value = match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(_) => {
            println!("  ✗ Training data is not valid JSON");
            return false;
        }
    };

    let Some(examples) = data.get("training_data").and_then(|v| v.as_array()) else {
        println!("  ✗ Missing 'training_data' array");
        return false;
    };
    if examples.is_empty() {
        println!("  ✗ 'training_data' is empty");
        return false;
    }
    println!("  ✓ Examples: {}", examples.len());

    if let Some(categories) = data
        .pointer("/metadata/categories")
        .and_then(|v| v.as_array())
    {
        println!("  ✓ Categories: {}", categories.len());
    }

    for key in ["instruction", "response"] {
        if examples[0].get(key).and_then(|v| v.as_str()).is_some() {
            println!("  ✓ Example structure: {}", key);
        } else {
            println!("  ✗ Missing key in examples: {}", key);
            return false;
        }
    }

    let sample = &examples[..examples.len().min(10)];
    let avg_len = |key: &str| {
        let total: usize = sample
            .iter()
            .map(|ex| ex.get(key).and_then(|v| v.as_str()).map_or(0, str::len))
            .sum();
        total as f64 / sample.len() as f64
    };
    let avg_instruction = avg_len("instruction");
    let avg_response = avg_len("response");
    println!("  Avg instruction length: {:.0} chars", avg_instruction);
    println!("  Avg response length: {:.0} chars", avg_response);
    if avg_instruction < 20.0 || avg_response < 50.0 {
        println!("  ! Training examples seem short");
    }

    true
}

fn check_output_directory(dir: &Path) -> bool {
    if dir.exists() {
        println!("  ✓ {:?}", dir);
        return true;
    }
    match std::fs::create_dir_all(dir) {
        Ok(()) => {
            println!("  ✓ Created: {:?}", dir);
            true
        }
        Err(e) => {
            println!("  ✗ Cannot create {:?}: {}", dir, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_model_dir(dir: &Path) {
        fs::write(dir.join("config.json"), "{}").unwrap();
        fs::write(dir.join("tokenizer.json"), "{}").unwrap();
        fs::write(dir.join("tokenizer_config.json"), "{}").unwrap();
        fs::write(dir.join("model.safetensors"), vec![0u8; 256]).unwrap();
    }

    #[test]
    fn test_model_files_complete() {
        let dir = tempfile::tempdir().unwrap();
        write_model_dir(dir.path());
        assert!(check_model_files(dir.path().to_str().unwrap()));
    }

    #[test]
    fn test_model_files_missing_tokenizer() {
        let dir = tempfile::tempdir().unwrap();
        write_model_dir(dir.path());
        fs::remove_file(dir.path().join("tokenizer.json")).unwrap();
        assert!(!check_model_files(dir.path().to_str().unwrap()));
    }

    #[test]
    fn test_model_files_no_weights() {
        let dir = tempfile::tempdir().unwrap();
        write_model_dir(dir.path());
        fs::remove_file(dir.path().join("model.safetensors")).unwrap();
        assert!(!check_model_files(dir.path().to_str().unwrap()));
    }

    #[test]
    fn test_remote_model_id_passes() {
        assert!(check_model_files("Qwen/Qwen2.5-0.5B-Instruct"));
    }

    #[test]
    fn test_missing_local_model_dir_fails() {
        assert!(!check_model_files("./no/such/model/dir"));
    }

    #[test]
    fn test_training_data_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(
            &path,
            r#"{
                "metadata": {"categories": ["wildfire", "flood"]},
                "training_data": [
                    {"instruction": "Coordinate a wildfire evacuation for a small town",
                     "response": "1. Activate the emergency operations center and confirm evacuation routes with fire command."}
                ]
            }"#,
        )
        .unwrap();
        assert!(check_training_data(&path));
    }

    #[test]
    fn test_training_data_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, "not json").unwrap();
        assert!(!check_training_data(&path));
    }

    #[test]
    fn test_training_data_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, r#"{"training_data": []}"#).unwrap();
        assert!(!check_training_data(&path));
    }

    #[test]
    fn test_training_data_missing_response_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(
            &path,
            r#"{"training_data": [{"instruction": "Help with a flood"}]}"#,
        )
        .unwrap();
        assert!(!check_training_data(&path));
    }

    #[test]
    fn test_configuration_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "model_path": "Qwen/Qwen2.5-0.5B-Instruct",
                "data_path": "data/train.json",
                "output_dir": "output",
                "num_epochs": 3,
                "batch_size": 2,
                "learning_rate": 0.0002
            }"#,
        )
        .unwrap();
        let config = check_configuration(path.to_str().unwrap()).unwrap();
        assert_eq!(config.num_epochs, 3);
        assert_eq!(config.output_dir, "output");
    }

    #[test]
    fn test_configuration_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"model_path": "m", "data_path": "d", "output_dir": "o"}"#,
        )
        .unwrap();
        assert!(check_configuration(path.to_str().unwrap()).is_none());
    }

    #[test]
    fn test_configuration_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{broken").unwrap();
        assert!(check_configuration(path.to_str().unwrap()).is_none());
    }

    #[test]
    fn test_output_directory_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("models").join("fine_tuned");
        assert!(check_output_directory(&nested));
        assert!(nested.exists());
    }
}
