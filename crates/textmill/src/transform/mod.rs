//! Letter-scrambling transforms applied to words and lines of text.

pub mod line;
pub mod word;

pub use line::{transform_line, TransformedLines};
pub use word::{
    shuffle_inner_letters, RandomShuffler, ReverseShuffler, SeededShuffler, Shuffler,
};
