//! DistilBERT encoder with a per-token classification head
//!
//! Variables live in one `VarMap` so the whole model round-trips through a
//! single safetensors file: encoder weights under `distilbert.`, the head
//! under `classifier.`.

use crate::config::Config;
use crate::error::{HubError, Result};
use crate::models::{Model, ModelMode};
use crate::preprocessors::Tokenizer;
use candle_core::{D, DType, Device, Tensor};
use candle_nn::{Dropout, Linear, Module, VarBuilder, VarMap};
use candle_transformers::models::distilbert::{Config as EncoderConfig, DistilBertModel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const DISTILBERT_SEQUENCE_LABELING: &str = "distilbert_sequence_labeling";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistilBertSequenceLabelingConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pretrained_path: Option<String>,

    pub vocab_size: usize,
    pub dim: usize,
    pub n_layers: usize,
    pub n_heads: usize,
    pub hidden_dim: usize,
    /// `gelu` or `relu`
    pub activation: String,
    pub max_position_embeddings: usize,
    pub initializer_range: f64,
    pub pad_token_id: usize,
    pub dropout: f64,
    /// Falls back to `dropout` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifier_dropout: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_labels: Option<usize>,
    /// Label names keyed by class index
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id2label: Option<BTreeMap<String, String>>,
}

impl Default for DistilBertSequenceLabelingConfig {
    fn default() -> Self {
        Self {
            name: DISTILBERT_SEQUENCE_LABELING.to_string(),
            pretrained_path: None,
            vocab_size: 30522,
            dim: 768,
            n_layers: 6,
            n_heads: 12,
            hidden_dim: 3072,
            activation: "gelu".to_string(),
            max_position_embeddings: 512,
            initializer_range: 0.02,
            pad_token_id: 0,
            dropout: 0.1,
            classifier_dropout: None,
            num_labels: None,
            id2label: None,
        }
    }
}

impl Config for DistilBertSequenceLabelingConfig {
    fn name(&self) -> &str {
        &self.name
    }

    fn pretrained_path(&self) -> Option<&str> {
        self.pretrained_path.as_deref()
    }

    fn set_pretrained_path(&mut self, path: Option<String>) {
        self.pretrained_path = path;
    }

    /// Fill whichever of `num_labels` / `id2label` is missing from the other
    fn resolve(&mut self) -> Result<()> {
        match (self.num_labels, &self.id2label) {
            (None, None) => {
                return Err(HubError::MissingConfig(
                    "one of `num_labels` or `id2label` must be set".to_string(),
                ));
            }
            (Some(n), None) => {
                self.id2label = Some((0..n).map(|i| (i.to_string(), format!("LABEL_{}", i))).collect());
            }
            (num_labels, Some(id2label)) => {
                if let Some(n) = num_labels
                    && n != id2label.len()
                {
                    return Err(HubError::InvalidConfig(format!(
                        "num_labels is {} but id2label has {} entries",
                        n,
                        id2label.len()
                    )));
                }
                self.num_labels = Some(id2label.len());
            }
        }

        if self.num_labels == Some(0) {
            return Err(HubError::InvalidConfig("num_labels must be positive".to_string()));
        }
        if !matches!(self.activation.as_str(), "gelu" | "relu") {
            return Err(HubError::InvalidConfig(format!(
                "unsupported activation '{}'",
                self.activation
            )));
        }
        if self.n_heads == 0 || self.dim % self.n_heads != 0 {
            return Err(HubError::InvalidConfig(format!(
                "dim ({}) must be divisible by n_heads ({})",
                self.dim, self.n_heads
            )));
        }

        self.labels().map(|_| ())
    }
}

impl DistilBertSequenceLabelingConfig {
    /// Label names ordered by class index
    pub fn labels(&self) -> Result<Vec<String>> {
        let id2label = self
            .id2label
            .as_ref()
            .ok_or_else(|| HubError::MissingConfig("`id2label` is not resolved".to_string()))?;

        let mut labels = vec![None; id2label.len()];
        for (key, label) in id2label {
            let index: usize = key
                .parse()
                .map_err(|_| HubError::InvalidConfig(format!("id2label key '{}' is not an index", key)))?;
            let slot = labels.get_mut(index).ok_or_else(|| {
                HubError::InvalidConfig(format!("id2label index {} out of range", index))
            })?;
            *slot = Some(label.clone());
        }

        labels
            .into_iter()
            .enumerate()
            .map(|(i, l)| l.ok_or_else(|| HubError::InvalidConfig(format!("id2label is missing index {}", i))))
            .collect()
    }

    fn encoder_config(&self) -> Result<EncoderConfig> {
        Ok(serde_json::from_value(serde_json::json!({
            "vocab_size": self.vocab_size,
            "dim": self.dim,
            "n_layers": self.n_layers,
            "n_heads": self.n_heads,
            "hidden_dim": self.hidden_dim,
            "activation": self.activation,
            "max_position_embeddings": self.max_position_embeddings,
            "initializer_range": self.initializer_range,
            "pad_token_id": self.pad_token_id,
            "model_type": "distilbert",
        }))?)
    }
}

/// Padded token ids for one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBatch {
    pub token_ids: Vec<Vec<u32>>,
    /// 1 for real tokens, 0 for padding
    pub attention_mask: Vec<Vec<u32>>,
    /// Token strings, carried through to predictions when present
    pub tokens: Option<Vec<Vec<String>>>,
}

impl TokenBatch {
    pub fn new(token_ids: Vec<Vec<u32>>, attention_mask: Vec<Vec<u32>>) -> Self {
        Self {
            token_ids,
            attention_mask,
            tokens: None,
        }
    }

    /// Batch from tokenizer output; encodings must already be padded to one length
    pub fn from_encodings(encodings: &[tokenizers::Encoding]) -> Self {
        Self {
            token_ids: encodings.iter().map(|e| e.get_ids().to_vec()).collect(),
            attention_mask: encodings
                .iter()
                .map(|e| e.get_attention_mask().to_vec())
                .collect(),
            tokens: Some(encodings.iter().map(|e| e.get_tokens().to_vec()).collect()),
        }
    }

    fn shape(&self) -> Result<(usize, usize)> {
        let batch = self.token_ids.len();
        let seq_len = self.token_ids.first().map(Vec::len).unwrap_or(0);
        if batch == 0 || seq_len == 0 {
            return Err(HubError::InvalidInput("empty batch".to_string()));
        }
        if self.attention_mask.len() != batch {
            return Err(HubError::InvalidInput(format!(
                "{} sequences but {} attention masks",
                batch,
                self.attention_mask.len()
            )));
        }
        let ragged = self
            .token_ids
            .iter()
            .chain(self.attention_mask.iter())
            .any(|row| row.len() != seq_len);
        if ragged {
            return Err(HubError::InvalidInput(
                "sequences must be padded to the same length".to_string(),
            ));
        }
        if let Some(tokens) = &self.tokens
            && (tokens.len() != batch || tokens.iter().any(|row| row.len() != seq_len))
        {
            return Err(HubError::InvalidInput(format!(
                "token strings must match the ({}, {}) id layout",
                batch, seq_len
            )));
        }
        Ok((batch, seq_len))
    }

    fn to_tensors(&self, device: &Device) -> Result<(Tensor, Tensor)> {
        let shape = self.shape()?;
        let ids = Tensor::from_vec(self.token_ids.concat(), shape, device)?;
        let mask = Tensor::from_vec(self.attention_mask.concat(), shape, device)?;
        Ok((ids, mask))
    }
}

/// Raw head output
#[derive(Debug, Clone)]
pub struct SequenceLabelingOutput {
    /// `(batch, seq_len, num_labels)`
    pub logits: Tensor,
    pub attention_mask: Vec<Vec<u32>>,
    pub token_ids: Vec<Vec<u32>>,
    pub tokens: Option<Vec<Vec<String>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenLabel {
    pub token: String,
    pub label: String,
    pub score: f32,
}

pub struct DistilBertSequenceLabeling {
    varmap: VarMap,
    encoder: DistilBertModel,
    dropout: Dropout,
    classifier: Linear,
    labels: Vec<String>,
    mode: ModelMode,
    device: Device,
}

impl DistilBertSequenceLabeling {
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn mode(&self) -> ModelMode {
        self.mode
    }

    /// Tokenize `texts` and label every real token
    ///
    /// Texts that produce no tokens get an empty label list.
    pub fn predict_texts<T: Tokenizer>(
        &mut self,
        tokenizer: &T,
        texts: &[&str],
    ) -> Result<Vec<Vec<TokenLabel>>> {
        let encodings = tokenizer.encode(texts, true)?;
        if encodings.iter().all(|e| e.is_empty()) {
            return Ok(vec![Vec::new(); texts.len()]);
        }
        self.predict(TokenBatch::from_encodings(&encodings))
    }
}

impl Model for DistilBertSequenceLabeling {
    type Config = DistilBertSequenceLabelingConfig;
    type Inputs = TokenBatch;
    type Outputs = SequenceLabelingOutput;
    type Prediction = Vec<Vec<TokenLabel>>;

    fn build_model(config: &Self::Config, mode: ModelMode) -> Result<Self> {
        let labels = config.labels()?;
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let encoder = DistilBertModel::load(vb.pp("distilbert"), &config.encoder_config()?)?;
        let classifier = candle_nn::linear(config.dim, labels.len(), vb.pp("classifier"))?;
        let dropout = Dropout::new(config.classifier_dropout.unwrap_or(config.dropout) as f32);

        tracing::debug!(
            layers = config.n_layers,
            dim = config.dim,
            num_labels = labels.len(),
            mode = %mode,
            "Built DistilBERT sequence labeling model"
        );

        Ok(Self {
            varmap,
            encoder,
            dropout,
            classifier,
            labels,
            mode,
            device,
        })
    }

    fn forward(&mut self, inputs: TokenBatch) -> Result<SequenceLabelingOutput> {
        let (ids, mask) = inputs.to_tensors(&self.device)?;

        // encoder expects 1 where attention is blocked, shaped (batch, 1, 1, seq)
        let blocked = mask.eq(&mask.zeros_like()?)?.unsqueeze(1)?.unsqueeze(1)?;
        let hidden = self.encoder.forward(&ids, &blocked)?;
        let hidden = self.dropout.forward(&hidden, self.mode.is_training())?;
        let logits = self.classifier.forward(&hidden)?;

        Ok(SequenceLabelingOutput {
            logits,
            attention_mask: inputs.attention_mask,
            token_ids: inputs.token_ids,
            tokens: inputs.tokens,
        })
    }

    fn predict(&mut self, inputs: TokenBatch) -> Result<Vec<Vec<TokenLabel>>> {
        let outputs = self.forward(inputs)?;
        self.postprocess(outputs)
    }

    fn postprocess(&self, outputs: SequenceLabelingOutput) -> Result<Vec<Vec<TokenLabel>>> {
        let probs = candle_nn::ops::softmax_last_dim(&outputs.logits)?;
        let scores = probs.max(D::Minus1)?.to_vec2::<f32>()?;
        let classes = probs.argmax(D::Minus1)?.to_vec2::<u32>()?;

        let out_of_range = |field: &str, row: usize, pos: usize| {
            HubError::InvalidInput(format!("{} has no entry at ({}, {})", field, row, pos))
        };

        let mut predictions = Vec::with_capacity(classes.len());
        for (row, (row_classes, row_scores)) in classes.iter().zip(&scores).enumerate() {
            let mut labels = Vec::new();
            for (pos, (&class, &score)) in row_classes.iter().zip(row_scores).enumerate() {
                let mask = outputs
                    .attention_mask
                    .get(row)
                    .and_then(|r| r.get(pos))
                    .ok_or_else(|| out_of_range("attention_mask", row, pos))?;
                if *mask == 0 {
                    continue;
                }
                let token = match &outputs.tokens {
                    Some(tokens) => tokens
                        .get(row)
                        .and_then(|r| r.get(pos))
                        .cloned()
                        .ok_or_else(|| out_of_range("tokens", row, pos))?,
                    None => outputs
                        .token_ids
                        .get(row)
                        .and_then(|r| r.get(pos))
                        .ok_or_else(|| out_of_range("token_ids", row, pos))?
                        .to_string(),
                };
                let label = self
                    .labels
                    .get(class as usize)
                    .cloned()
                    .ok_or_else(|| HubError::InvalidInput(format!("class {} has no label", class)))?;
                labels.push(TokenLabel {
                    token,
                    label,
                    score,
                });
            }
            predictions.push(labels);
        }

        Ok(predictions)
    }

    fn load_weights(&mut self, path: &Path) -> Result<()> {
        self.varmap.load(path)?;
        tracing::debug!(path = ?path, "Loaded weights");
        Ok(())
    }

    fn save_weights(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.varmap.save(path)?;
        Ok(())
    }
}
