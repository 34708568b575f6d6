mod wordpiece;

pub use wordpiece::{
    PaddingStrategy, Side, TruncationStrategy, WORDPIECE_TOKENIZER, WordPieceConfig,
    WordPieceTokenizer, WordPieceTrainConfig,
};
