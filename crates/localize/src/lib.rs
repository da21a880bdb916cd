//! German-locale text handling: Unicode normalization with conservative OCR
//! restoration, locale-aware amount parsing, and field validators.

mod amounts;
mod lexicon;
mod preprocess;
mod validate;

pub use amounts::{
    extract_amount, extract_case_reference, parse_amount, AmountParseError, ExtractedAmount,
};
pub use preprocess::{preprocess, restore_name_digits, Preprocessed};
pub use validate::{validate_name, validate_postal_code, validate_street_address};
