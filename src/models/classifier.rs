//! Toxicity classifier abstraction and its ONNX Runtime implementation

use crate::config::ModelConfig;
use anyhow::{Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session, SessionInputValue};
use ort::value::Tensor;
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

/// A pretrained multi-label toxicity classifier.
///
/// `predict` is blocking and may be slow; callers run it on the inference
/// worker pool, never on the request path.
pub trait ToxicityClassifier: Send + Sync {
    /// Label -> probability for one text
    fn predict(&self, text: &str) -> Result<HashMap<String, f64>>;

    /// Human-readable model name
    fn name(&self) -> &str;
}

/// Multi-label classifier exported to ONNX, with a HuggingFace tokenizer
pub struct OnnxToxicityClassifier {
    name: String,
    /// `Session::run` needs exclusive access
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    labels: Vec<String>,
    output_name: String,
    needs_token_type_ids: bool,
}

impl OnnxToxicityClassifier {
    /// Load the model and tokenizer described by `config`. Blocking.
    pub fn load(config: &ModelConfig) -> Result<Self> {
        let model_path = Path::new(&config.model_path);
        info!(
            path = %model_path.display(),
            threads = config.onnx_threads,
            "Loading ONNX toxicity model"
        );

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.onnx_threads)?
            .commit_from_file(model_path)
            .context(format!("Failed to load model from {:?}", model_path))?;

        let tokenizer = Tokenizer::from_file(&config.tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer {}: {}", config.tokenizer_path, e))?;
        let tokenizer = truncating(tokenizer, config.max_tokens)?;

        let needs_token_type_ids = session.inputs.iter().any(|i| i.name == "token_type_ids");
        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("logits") || o.name.contains("output"))
            .or_else(|| session.outputs.first())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "logits".to_string());

        let name = model_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "toxicity".to_string());

        info!(
            model = %name,
            output = %output_name,
            labels = config.labels.len(),
            max_tokens = config.max_tokens,
            "Toxicity model loaded"
        );

        Ok(Self {
            name,
            session: Mutex::new(session),
            tokenizer,
            labels: config.labels.clone(),
            output_name,
            needs_token_type_ids,
        })
    }

    fn run(&self, text: &str) -> Result<Vec<f32>> {
        let EncodedText { ids, mask } = encode(&self.tokenizer, text)?;

        let len = ids.len();
        let shape = vec![1_i64, len as i64];

        let mut inputs: Vec<(Cow<'_, str>, SessionInputValue<'_>)> = vec![
            (
                "input_ids".into(),
                Tensor::from_array((shape.clone(), ids))
                    .context("Failed to create input_ids tensor")?
                    .into(),
            ),
            (
                "attention_mask".into(),
                Tensor::from_array((shape.clone(), mask))
                    .context("Failed to create attention_mask tensor")?
                    .into(),
            ),
        ];
        if self.needs_token_type_ids {
            inputs.push((
                "token_type_ids".into(),
                Tensor::from_array((shape, vec![0_i64; len]))
                    .context("Failed to create token_type_ids tensor")?
                    .into(),
            ));
        }

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let outputs = session.run(inputs)?;

        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| anyhow::anyhow!("Model produced no '{}' output", self.output_name))?;
        let (_, logits) = output.try_extract_tensor::<f32>()?;

        Ok(logits.to_vec())
    }
}

impl ToxicityClassifier for OnnxToxicityClassifier {
    fn predict(&self, text: &str) -> Result<HashMap<String, f64>> {
        let logits = self.run(text)?;

        let scores: HashMap<String, f64> = self
            .labels
            .iter()
            .zip(logits.iter())
            .map(|(label, &logit)| (label.clone(), sigmoid(logit as f64)))
            .collect();

        debug!(model = %self.name, scores = ?scores, "Toxicity prediction complete");
        Ok(scores)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Token ids and attention mask for one text
#[derive(Debug)]
struct EncodedText {
    ids: Vec<i64>,
    mask: Vec<i64>,
}

/// Cap every encoding at `max_tokens`, special tokens included
fn truncating(mut tokenizer: Tokenizer, max_tokens: usize) -> Result<Tokenizer> {
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: max_tokens.max(1),
            ..Default::default()
        }))
        .map_err(|e| anyhow::anyhow!("Invalid truncation settings: {}", e))?;
    Ok(tokenizer)
}

fn encode(tokenizer: &Tokenizer, text: &str) -> Result<EncodedText> {
    let encoding = tokenizer
        .encode(text, true)
        .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

    Ok(EncodedText {
        ids: encoding.get_ids().iter().map(|&v| v as i64).collect(),
        mask: encoding
            .get_attention_mask()
            .iter()
            .map(|&v| v as i64)
            .collect(),
    })
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Classifier doubles shared by the crate's tests
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns the same scores for every text and remembers the last input
    pub struct FixedClassifier {
        scores: HashMap<String, f64>,
        pub last_input: Mutex<Option<String>>,
        pub calls: AtomicUsize,
    }

    impl FixedClassifier {
        pub fn new(scores: &[(&str, f64)]) -> Self {
            Self {
                scores: scores.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                last_input: Mutex::new(None),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ToxicityClassifier for FixedClassifier {
        fn predict(&self, text: &str) -> Result<HashMap<String, f64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_input.lock().unwrap() = Some(text.to_string());
            Ok(self.scores.clone())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    /// Fails every prediction
    pub struct FailingClassifier;

    impl ToxicityClassifier for FailingClassifier {
        fn predict(&self, _text: &str) -> Result<HashMap<String, f64>> {
            anyhow::bail!("model exploded")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    /// Panics inside `predict`
    pub struct PanickingClassifier;

    impl ToxicityClassifier for PanickingClassifier {
        fn predict(&self, _text: &str) -> Result<HashMap<String, f64>> {
            panic!("classifier panicked")
        }

        fn name(&self) -> &str {
            "panicking"
        }
    }
}
