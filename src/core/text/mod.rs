pub mod error;
pub mod extractor;
pub mod similarity;
pub mod tesseract;

pub use error::TextError;
pub use extractor::{MockTextExtractor, TextExtractor};
pub use similarity::{partial_ratio, ratio, SimilarityScore};
pub use tesseract::TesseractExtractor;
