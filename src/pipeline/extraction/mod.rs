pub mod ocr;
pub mod preprocess;
pub mod types;
pub mod vision_ocr;

pub use ocr::*;
pub use preprocess::*;
pub use types::*;
pub use vision_ocr::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Invalid image format")]
    InvalidImage,

    #[error("Image too large: {0}")]
    ImageTooLarge(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),
}
