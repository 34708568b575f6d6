//! WordPiece tokenizer
//!
//! Greedy longest-match-first subword splitting over a BERT-style
//! pre-tokenization. Without a pretrained path the tokenizer starts with an
//! empty vocabulary holding only the special tokens and is expected to be
//! trained before use.

use crate::config::Config;
use crate::error::{HubError, Result};
use crate::hub::{HubApi, resolve_pretrained_path};
use crate::preprocessors::Tokenizer;
use crate::repo::{PREPROCESSOR_SUBFOLDER, TOKENIZER_FILE};
use ::tokenizers::decoders::wordpiece::WordPiece as WordPieceDecoder;
use ::tokenizers::models::wordpiece::{WordPiece, WordPieceTrainer};
use ::tokenizers::models::TrainerWrapper;
use ::tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use ::tokenizers::{
    AddedToken, PaddingDirection, PaddingParams, TruncationDirection, TruncationParams,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const WORDPIECE_TOKENIZER: &str = "wordpiece_tokenizer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationStrategy {
    LongestFirst,
    OnlyFirst,
    OnlySecond,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaddingStrategy {
    /// Pad to the longest sequence in the batch
    Longest,
    /// Pad to `max_length`
    MaxLength,
    DoNotPad,
}

/// Which end of a sequence padding or truncation applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WordPieceTrainConfig {
    pub vocab_size: usize,
    pub min_frequency: u64,
    pub limit_alphabet: usize,
    pub initial_alphabet: Vec<char>,
    pub show_progress: bool,
}

impl Default for WordPieceTrainConfig {
    fn default() -> Self {
        Self {
            vocab_size: 30000,
            min_frequency: 2,
            limit_alphabet: 1000,
            initial_alphabet: Vec::new(),
            show_progress: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WordPieceConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pretrained_path: Option<String>,

    /// 0 disables truncation
    pub max_length: usize,
    pub truncation_strategy: TruncationStrategy,
    pub truncation_direction: Side,
    pub stride: usize,

    pub padding_strategy: PaddingStrategy,
    pub padding_direction: Side,
    /// 0 disables rounding up
    pub pad_to_multiple_of: usize,
    /// Used when `pad_token` is not in the vocabulary
    pub pad_token_id: u32,
    pub pad_token: String,
    pub pad_token_type_id: u32,

    pub special_tokens: Vec<String>,
    pub unk_token: String,
    pub wordpieces_prefix: String,

    pub train_config: WordPieceTrainConfig,
}

impl Default for WordPieceConfig {
    fn default() -> Self {
        Self {
            name: WORDPIECE_TOKENIZER.to_string(),
            pretrained_path: None,
            max_length: 512,
            truncation_strategy: TruncationStrategy::LongestFirst,
            truncation_direction: Side::Right,
            stride: 0,
            padding_strategy: PaddingStrategy::Longest,
            padding_direction: Side::Right,
            pad_to_multiple_of: 0,
            pad_token_id: 0,
            pad_token: "[PAD]".to_string(),
            pad_token_type_id: 0,
            special_tokens: ["[UNK]", "[SEP]", "[CLS]", "[PAD]", "[MASK]"]
                .into_iter()
                .map(String::from)
                .collect(),
            unk_token: "[UNK]".to_string(),
            wordpieces_prefix: "##".to_string(),
            train_config: WordPieceTrainConfig::default(),
        }
    }
}

impl Config for WordPieceConfig {
    fn name(&self) -> &str {
        &self.name
    }

    fn pretrained_path(&self) -> Option<&str> {
        self.pretrained_path.as_deref()
    }

    fn set_pretrained_path(&mut self, path: Option<String>) {
        self.pretrained_path = path;
    }

    fn resolve(&mut self) -> Result<()> {
        if self.unk_token.is_empty() {
            return Err(HubError::MissingConfig("`unk_token` must be set".to_string()));
        }
        if !self.special_tokens.contains(&self.unk_token) {
            self.special_tokens.insert(0, self.unk_token.clone());
        }
        if self.stride > 0 && self.max_length > 0 && self.stride >= self.max_length {
            return Err(HubError::InvalidConfig(format!(
                "stride ({}) must be smaller than max_length ({})",
                self.stride, self.max_length
            )));
        }
        Ok(())
    }
}

impl WordPieceConfig {
    fn truncation(&self) -> Option<TruncationParams> {
        if self.max_length == 0 {
            return None;
        }
        Some(TruncationParams {
            direction: match self.truncation_direction {
                Side::Left => TruncationDirection::Left,
                Side::Right => TruncationDirection::Right,
            },
            max_length: self.max_length,
            strategy: match self.truncation_strategy {
                TruncationStrategy::LongestFirst => ::tokenizers::TruncationStrategy::LongestFirst,
                TruncationStrategy::OnlyFirst => ::tokenizers::TruncationStrategy::OnlyFirst,
                TruncationStrategy::OnlySecond => ::tokenizers::TruncationStrategy::OnlySecond,
            },
            stride: self.stride,
        })
    }

    fn padding(&self, pad_id: u32) -> Option<PaddingParams> {
        let strategy = match self.padding_strategy {
            PaddingStrategy::Longest => ::tokenizers::PaddingStrategy::BatchLongest,
            PaddingStrategy::MaxLength => ::tokenizers::PaddingStrategy::Fixed(self.max_length),
            PaddingStrategy::DoNotPad => return None,
        };
        Some(PaddingParams {
            strategy,
            direction: match self.padding_direction {
                Side::Left => PaddingDirection::Left,
                Side::Right => PaddingDirection::Right,
            },
            pad_to_multiple_of: (self.pad_to_multiple_of > 0).then_some(self.pad_to_multiple_of),
            pad_id,
            pad_type_id: self.pad_token_type_id,
            pad_token: self.pad_token.clone(),
        })
    }

    fn added_special_tokens(&self) -> Vec<AddedToken> {
        self.special_tokens
            .iter()
            .map(|t| AddedToken::from(t.clone(), true))
            .collect()
    }
}

/// Vocabulary-free WordPiece pipeline with the configured special tokens
fn fresh_tokenizer(config: &WordPieceConfig) -> Result<::tokenizers::Tokenizer> {
    let model = WordPiece::builder()
        .unk_token(config.unk_token.clone())
        .continuing_subword_prefix(config.wordpieces_prefix.clone())
        .build()
        .map_err(HubError::tokenizer)?;

    let mut tokenizer = ::tokenizers::Tokenizer::new(model);
    tokenizer.with_pre_tokenizer(Some(BertPreTokenizer));
    tokenizer.with_decoder(Some(WordPieceDecoder::new(
        config.wordpieces_prefix.clone(),
        true,
    )));
    tokenizer.add_special_tokens(&config.added_special_tokens());
    Ok(tokenizer)
}

/// Local path of the pretrained `tokenizer.json`, downloading it if needed
async fn pretrained_file(path: &str, hub: &dyn HubApi) -> Result<PathBuf> {
    let relative = format!("{}/{}", PREPROCESSOR_SUBFOLDER, TOKENIZER_FILE);
    if Path::new(path).is_dir() {
        let local = Path::new(path).join(relative);
        return if local.is_file() {
            Ok(local)
        } else {
            Err(HubError::MissingFile(local))
        };
    }

    let repo_id = resolve_pretrained_path(path, hub.organization());
    hub.download_file(&repo_id, &relative).await
}

pub struct WordPieceTokenizer {
    tokenizer: ::tokenizers::Tokenizer,
    config: WordPieceConfig,
}

impl std::fmt::Debug for WordPieceTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordPieceTokenizer")
            .field("config", &self.config)
            .field("vocab_size", &self.tokenizer.get_vocab_size(true))
            .finish()
    }
}

impl WordPieceTokenizer {
    fn trainer(&self, config: &WordPieceTrainConfig) -> TrainerWrapper {
        WordPieceTrainer::builder()
            .vocab_size(config.vocab_size)
            .min_frequency(config.min_frequency)
            .limit_alphabet(config.limit_alphabet)
            .initial_alphabet(config.initial_alphabet.iter().copied().collect::<HashSet<char>>())
            .special_tokens(self.config.added_special_tokens())
            .show_progress(config.show_progress)
            .continuing_subword_prefix(self.config.wordpieces_prefix.clone())
            .build()
            .into()
    }

    /// Re-apply padding now that the pad token may have a vocabulary id
    fn refresh_padding(&mut self) {
        let pad_id = self
            .tokenizer
            .token_to_id(&self.config.pad_token)
            .unwrap_or(self.config.pad_token_id);
        self.tokenizer.with_padding(self.config.padding(pad_id));
    }
}

#[async_trait]
impl Tokenizer for WordPieceTokenizer {
    type Config = WordPieceConfig;
    type TrainConfig = WordPieceTrainConfig;

    fn from_parts(tokenizer: ::tokenizers::Tokenizer, config: WordPieceConfig) -> Self {
        Self { tokenizer, config }
    }

    fn config(&self) -> &WordPieceConfig {
        &self.config
    }

    fn inner(&self) -> &::tokenizers::Tokenizer {
        &self.tokenizer
    }

    fn inner_mut(&mut self) -> &mut ::tokenizers::Tokenizer {
        &mut self.tokenizer
    }

    async fn build(config: &WordPieceConfig, hub: &dyn HubApi) -> Result<::tokenizers::Tokenizer> {
        let mut tokenizer = match config.pretrained_path() {
            Some(path) => {
                let file = pretrained_file(path, hub).await?;
                tracing::debug!(path = ?file, "Loading pretrained tokenizer");
                ::tokenizers::Tokenizer::from_file(&file).map_err(HubError::tokenizer)?
            }
            None => fresh_tokenizer(config)?,
        };

        tokenizer
            .with_truncation(config.truncation())
            .map_err(HubError::tokenizer)?;
        let pad_id = tokenizer
            .token_to_id(&config.pad_token)
            .unwrap_or(config.pad_token_id);
        tokenizer.with_padding(config.padding(pad_id));

        tracing::debug!(
            vocab_size = tokenizer.get_vocab_size(true),
            pretrained = config.pretrained_path().is_some(),
            "Built WordPiece tokenizer"
        );
        Ok(tokenizer)
    }

    fn train(&mut self, files: &[PathBuf], config: &WordPieceTrainConfig) -> Result<()> {
        if let Some(missing) = files.iter().find(|f| !f.is_file()) {
            return Err(HubError::MissingFile(missing.clone()));
        }

        let mut trainer = self.trainer(config);
        let files = files
            .iter()
            .map(|f| f.to_string_lossy().to_string())
            .collect();
        self.tokenizer
            .train_from_files(&mut trainer, files)
            .map_err(HubError::tokenizer)?;
        self.refresh_padding();

        tracing::info!(vocab_size = self.vocab_size(), "Trained tokenizer from files");
        Ok(())
    }

    fn train_from_iterator<I, S>(&mut self, dataset: I, config: &WordPieceTrainConfig) -> Result<()>
    where
        I: Iterator<Item = S> + Send,
        S: AsRef<str> + Send,
    {
        let mut trainer = self.trainer(config);
        self.tokenizer
            .train(&mut trainer, dataset)
            .map_err(HubError::tokenizer)?;
        self.refresh_padding();

        tracing::info!(vocab_size = self.vocab_size(), "Trained tokenizer from iterator");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigOverrides;
    use crate::hub::HfHubClient;
    use crate::config::HubSettings;

    fn offline_hub() -> HfHubClient {
        let settings = HubSettings {
            cache_dir: std::env::temp_dir().join("modelhub-wordpiece-tests"),
            ..Default::default()
        };
        HfHubClient::new(settings).unwrap()
    }

    fn quiet_train_config() -> WordPieceTrainConfig {
        WordPieceTrainConfig {
            vocab_size: 200,
            min_frequency: 1,
            show_progress: false,
            ..Default::default()
        }
    }

    const CORPUS: &[&str] = &[
        "the quick brown fox jumps over the lazy dog",
        "the lazy dog sleeps",
        "a quick brown dog jumps",
        "foxes and dogs are friends",
    ];

    #[tokio::test]
    async fn test_fresh_vocab_is_special_tokens() {
        let hub = offline_hub();
        let tokenizer =
            WordPieceTokenizer::from_config(WordPieceConfig::default(), &ConfigOverrides::new(), &hub)
                .await
                .unwrap();

        let mut vocab: Vec<String> = tokenizer.vocab().into_keys().collect();
        vocab.sort();
        let mut expected = WordPieceConfig::default().special_tokens;
        expected.sort();
        assert_eq!(vocab, expected);
        assert_eq!(tokenizer.vocab_size(), 5);
    }

    #[tokio::test]
    async fn test_train_from_iterator_grows_vocab() {
        let hub = offline_hub();
        let mut tokenizer =
            WordPieceTokenizer::from_config(WordPieceConfig::default(), &ConfigOverrides::new(), &hub)
                .await
                .unwrap();

        tokenizer
            .train_from_iterator(CORPUS.iter(), &quiet_train_config())
            .unwrap();

        assert!(tokenizer.vocab_size() > 5);
        for special in &tokenizer.config().special_tokens {
            assert!(tokenizer.token_to_id(special).is_some(), "{} missing", special);
        }
        assert!(tokenizer.token_to_id("the").is_some());
    }

    #[tokio::test]
    async fn test_encode_pads_batch() {
        let hub = offline_hub();
        let mut tokenizer =
            WordPieceTokenizer::from_config(WordPieceConfig::default(), &ConfigOverrides::new(), &hub)
                .await
                .unwrap();
        tokenizer
            .train_from_iterator(CORPUS.iter(), &quiet_train_config())
            .unwrap();

        let encodings = tokenizer.encode(&["the dog", "the quick brown fox"], false).unwrap();
        assert_eq!(encodings[0].len(), encodings[1].len());

        let pad_id = tokenizer.token_to_id("[PAD]").unwrap();
        assert_eq!(encodings[0].get_ids().last(), Some(&pad_id));
        assert_eq!(encodings[0].get_attention_mask().last(), Some(&0));
    }

    #[tokio::test]
    async fn test_truncation_from_overrides() {
        let hub = offline_hub();
        let overrides = ConfigOverrides::new()
            .set("max_length", 3)
            .set("padding_strategy", "do_not_pad");
        let mut tokenizer = WordPieceTokenizer::from_config(WordPieceConfig::default(), &overrides, &hub)
            .await
            .unwrap();
        tokenizer
            .train_from_iterator(CORPUS.iter(), &quiet_train_config())
            .unwrap();

        let encodings = tokenizer
            .encode(&["the quick brown fox jumps over the lazy dog"], false)
            .unwrap();
        assert_eq!(encodings[0].len(), 3);
    }

    #[tokio::test]
    async fn test_decode_joins_wordpieces() {
        let hub = offline_hub();
        let mut tokenizer =
            WordPieceTokenizer::from_config(WordPieceConfig::default(), &ConfigOverrides::new(), &hub)
                .await
                .unwrap();
        tokenizer
            .train_from_iterator(CORPUS.iter(), &quiet_train_config())
            .unwrap();

        let encodings = tokenizer.encode(&["the lazy dog"], false).unwrap();
        let decoded = tokenizer.decode(encodings[0].get_ids(), true).unwrap();
        assert_eq!(decoded, "the lazy dog");
    }

    #[test]
    fn test_train_missing_file() {
        let mut tokenizer = WordPieceTokenizer::from_parts(
            fresh_tokenizer(&WordPieceConfig::default()).unwrap(),
            WordPieceConfig::default(),
        );
        let result = tokenizer.train(&[PathBuf::from("/nonexistent/corpus.txt")], &quiet_train_config());
        assert!(matches!(result, Err(HubError::MissingFile(_))));
    }

    #[test]
    fn test_resolve_adds_unk_to_special_tokens() {
        let mut config = WordPieceConfig {
            special_tokens: vec!["[PAD]".to_string()],
            ..Default::default()
        };
        config.resolve().unwrap();
        assert_eq!(config.special_tokens, vec!["[UNK]", "[PAD]"]);
    }

    #[test]
    fn test_resolve_rejects_large_stride() {
        let mut config = WordPieceConfig {
            max_length: 8,
            stride: 8,
            ..Default::default()
        };
        assert!(matches!(config.resolve(), Err(HubError::InvalidConfig(_))));
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer_config.toml");
        let config = WordPieceConfig {
            padding_strategy: PaddingStrategy::MaxLength,
            ..Default::default()
        };
        config.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("padding_strategy = \"max_length\""));
        assert!(content.contains("[train_config]"));
        assert_eq!(WordPieceConfig::load(&path).unwrap(), config);
    }
}
