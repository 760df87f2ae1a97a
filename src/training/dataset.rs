//! Dataset loading and batching for fine-tuning
//!
//! Training data is instruction/response pairs describing emergency
//! scenarios and coordinator guidance:
//!
//! ```json
//! {"training_data": [{"instruction": "...", "response": "...", "metadata": {}}]}
//! ```
//!
//! A bare JSON array of the same records, or JSONL with one record per
//! line, loads too.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A single instruction/response training example
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingExample {
    /// Emergency scenario or question
    pub instruction: String,
    /// Coordinator guidance to learn
    pub response: String,
    /// Optional metadata
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct TrainingFile {
    training_data: Vec<TrainingExample>,
}

/// Dataset configuration
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Whether to shuffle the dataset on load
    pub shuffle: bool,
    /// Random seed for shuffling
    pub seed: Option<u64>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            shuffle: true,
            seed: Some(42),
        }
    }
}

/// Training dataset
#[derive(Debug)]
pub struct TrainingDataset {
    examples: Vec<TrainingExample>,
    config: DatasetConfig,
}

impl TrainingDataset {
    /// Create a new dataset from examples
    pub fn new(examples: Vec<TrainingExample>, config: DatasetConfig) -> Self {
        Self { examples, config }
    }

    /// Load dataset from a JSON file
    ///
    /// Accepts either an object with a `training_data` key or a bare array
    /// of records.
    pub fn from_json(path: impl AsRef<Path>, config: DatasetConfig) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dataset file: {:?}", path))?;

        let examples = if let Ok(file) = serde_json::from_str::<TrainingFile>(&content) {
            file.training_data
        } else {
            serde_json::from_str::<Vec<TrainingExample>>(&content).with_context(|| {
                format!(
                    "Failed to parse {:?}: expected a training_data object or an array of records",
                    path
                )
            })?
        };

        Self::finish_load(examples, config, path)
    }

    /// Load dataset from a JSONL file, one record per line
    pub fn from_jsonl(path: impl AsRef<Path>, config: DatasetConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open dataset file: {:?}", path))?;
        let reader = BufReader::new(file);

        let mut examples = Vec::new();
        for (line_num, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read line {}", line_num + 1))?;

            if line.trim().is_empty() {
                continue;
            }

            let example: TrainingExample = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse JSON at line {}", line_num + 1))?;
            examples.push(example);
        }

        Self::finish_load(examples, config, path)
    }

    /// Load dataset from file, auto-detecting format
    pub fn load(path: impl AsRef<Path>, config: DatasetConfig) -> Result<Self> {
        let path = path.as_ref();
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match extension.to_lowercase().as_str() {
            "jsonl" => Self::from_jsonl(path, config),
            "json" => Self::from_json(path, config),
            _ => Self::from_json(path, config.clone()).or_else(|_| Self::from_jsonl(path, config)),
        }
    }

    fn finish_load(
        examples: Vec<TrainingExample>,
        config: DatasetConfig,
        path: &Path,
    ) -> Result<Self> {
        let before = examples.len();
        let examples: Vec<TrainingExample> = examples
            .into_iter()
            .filter(|e| !e.instruction.trim().is_empty() && !e.response.trim().is_empty())
            .collect();

        let dropped = before - examples.len();
        if dropped > 0 {
            tracing::warn!("Dropped {} examples with empty instruction or response", dropped);
        }

        if examples.is_empty() {
            anyhow::bail!("Dataset {:?} contains no usable examples", path);
        }

        tracing::info!("Loaded {} training examples from {:?}", examples.len(), path);

        let mut dataset = Self { examples, config };
        if dataset.config.shuffle {
            dataset.shuffle();
        }

        Ok(dataset)
    }

    /// Get the number of examples
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Get an example by index
    pub fn get(&self, index: usize) -> Option<&TrainingExample> {
        self.examples.get(index)
    }

    /// Iterate over examples
    pub fn iter(&self) -> impl Iterator<Item = &TrainingExample> {
        self.examples.iter()
    }

    /// Shuffle the dataset
    pub fn shuffle(&mut self) {
        use rand::seq::SliceRandom;
        use rand::SeedableRng;

        let mut rng = if let Some(seed) = self.config.seed {
            rand::rngs::StdRng::seed_from_u64(seed)
        } else {
            rand::rngs::StdRng::from_entropy()
        };

        self.examples.shuffle(&mut rng);
    }

    /// Split into train/validation example sets
    pub fn split(&self, train_ratio: f64) -> (Vec<TrainingExample>, Vec<TrainingExample>) {
        let split_idx = (self.examples.len() as f64 * train_ratio) as usize;
        let train = self.examples[..split_idx].to_vec();
        let val = self.examples[split_idx..].to_vec();
        (train, val)
    }

    /// Get statistics about the dataset
    pub fn stats(&self) -> DatasetStats {
        let total = self.examples.len();
        let avg = |f: fn(&TrainingExample) -> usize| -> f64 {
            if total > 0 {
                self.examples.iter().map(f).sum::<usize>() as f64 / total as f64
            } else {
                0.0
            }
        };

        DatasetStats {
            total_examples: total,
            avg_instruction_length: avg(|e| e.instruction.len()),
            avg_response_length: avg(|e| e.response.len()),
        }
    }
}

/// Dataset statistics
#[derive(Debug, Clone)]
pub struct DatasetStats {
    pub total_examples: usize,
    /// Average instruction length in characters
    pub avg_instruction_length: f64,
    /// Average response length in characters
    pub avg_response_length: f64,
}

impl std::fmt::Display for DatasetStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Dataset: {} examples, {:.1} avg instruction chars, {:.1} avg response chars",
            self.total_examples, self.avg_instruction_length, self.avg_response_length
        )
    }
}

/// Batch iterator for training
pub struct BatchIterator<'a> {
    dataset: &'a TrainingDataset,
    batch_size: usize,
    current_idx: usize,
}

impl<'a> BatchIterator<'a> {
    pub fn new(dataset: &'a TrainingDataset, batch_size: usize) -> Self {
        Self {
            dataset,
            batch_size,
            current_idx: 0,
        }
    }
}

impl<'a> Iterator for BatchIterator<'a> {
    type Item = Vec<&'a TrainingExample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_idx >= self.dataset.len() {
            return None;
        }

        let end_idx = (self.current_idx + self.batch_size).min(self.dataset.len());
        let batch: Vec<_> = (self.current_idx..end_idx)
            .filter_map(|i| self.dataset.get(i))
            .collect();

        self.current_idx = end_idx;

        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    }
}

/// Extension trait for creating batches
pub trait Batched {
    fn batches(&self, batch_size: usize) -> BatchIterator<'_>;
}

impl Batched for TrainingDataset {
    fn batches(&self, batch_size: usize) -> BatchIterator<'_> {
        BatchIterator::new(self, batch_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_shuffle() -> DatasetConfig {
        DatasetConfig {
            shuffle: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_load_training_data_object() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"training_data": [
                {{"instruction": "Wildfire approaching town", "response": "1. Activate evacuation routes"}},
                {{"instruction": "Flood in downtown area", "response": "Deploy rescue boats", "metadata": {{"category": "flood"}}}}
            ]}}"#
        )
        .unwrap();

        let dataset = TrainingDataset::from_json(file.path(), no_shuffle()).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.get(0).unwrap().instruction, "Wildfire approaching town");
        assert!(dataset.get(1).unwrap().metadata.is_some());
    }

    #[test]
    fn test_load_bare_array() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"instruction": "Earthquake response", "response": "Begin search and rescue"}}]"#
        )
        .unwrap();

        let dataset = TrainingDataset::from_json(file.path(), no_shuffle()).unwrap();
        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn test_load_jsonl() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"instruction": "Chemical spill", "response": "Establish perimeter"}}"#)
            .unwrap();
        writeln!(file, r#"{{"instruction": "Hurricane prep", "response": "Open shelters"}}"#)
            .unwrap();

        let dataset = TrainingDataset::from_jsonl(file.path(), no_shuffle()).unwrap();
        assert_eq!(dataset.len(), 2);
    }

    #[test]
    fn test_empty_examples_dropped() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"training_data": [
                {{"instruction": "Real scenario", "response": "Real guidance"}},
                {{"instruction": "", "response": "orphaned"}},
                {{"instruction": "orphaned", "response": "  "}}
            ]}}"#
        )
        .unwrap();

        let dataset = TrainingDataset::from_json(file.path(), no_shuffle()).unwrap();
        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn test_all_empty_is_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"training_data": []}}"#).unwrap();
        assert!(TrainingDataset::from_json(file.path(), no_shuffle()).is_err());
    }

    #[test]
    fn test_split() {
        let examples: Vec<_> = (0..10)
            .map(|i| TrainingExample {
                instruction: format!("scenario {}", i),
                response: format!("guidance {}", i),
                metadata: None,
            })
            .collect();

        let dataset = TrainingDataset::new(examples, no_shuffle());
        let (train, val) = dataset.split(0.9);
        assert_eq!(train.len(), 9);
        assert_eq!(val.len(), 1);
    }

    #[test]
    fn test_shuffle_deterministic_with_seed() {
        let examples: Vec<_> = (0..20)
            .map(|i| TrainingExample {
                instruction: format!("scenario {}", i),
                response: "guidance".to_string(),
                metadata: None,
            })
            .collect();

        let mut a = TrainingDataset::new(examples.clone(), DatasetConfig::default());
        let mut b = TrainingDataset::new(examples, DatasetConfig::default());
        a.shuffle();
        b.shuffle();

        let order_a: Vec<_> = a.iter().map(|e| e.instruction.clone()).collect();
        let order_b: Vec<_> = b.iter().map(|e| e.instruction.clone()).collect();
        assert_eq!(order_a, order_b);
    }

    #[test]
    fn test_batch_iterator() {
        let examples: Vec<_> = (0..10)
            .map(|i| TrainingExample {
                instruction: format!("scenario {}", i),
                response: format!("guidance {}", i),
                metadata: None,
            })
            .collect();

        let dataset = TrainingDataset::new(examples, no_shuffle());
        let batches: Vec<_> = dataset.batches(3).collect();

        assert_eq!(batches.len(), 4); // 10 / 3 = 3 full + 1 partial
        assert_eq!(batches[0].len(), 3);
        assert_eq!(batches[3].len(), 1);
    }

    #[test]
    fn test_dataset_stats() {
        let examples = vec![TrainingExample {
            instruction: "ten chars!".to_string(),
            response: "20 characters here!!".to_string(),
            metadata: None,
        }];

        let dataset = TrainingDataset::new(examples, no_shuffle());
        let stats = dataset.stats();

        assert_eq!(stats.total_examples, 1);
        assert!((stats.avg_instruction_length - 10.0).abs() < 0.01);
        assert!((stats.avg_response_length - 20.0).abs() < 0.01);
    }
}
