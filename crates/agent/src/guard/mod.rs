//! Guards on both sides of the model: arguments going out to the tool
//! service and text coming back to the user.

pub mod corrector;
pub mod sanitizer;

pub use corrector::{ArgumentCorrector, Correction};
pub use sanitizer::Sanitizer;
