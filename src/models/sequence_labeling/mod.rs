//! Token-level classification models

mod distilbert;

pub use distilbert::{
    DISTILBERT_SEQUENCE_LABELING, DistilBertSequenceLabeling, DistilBertSequenceLabelingConfig,
    SequenceLabelingOutput, TokenBatch, TokenLabel,
};
