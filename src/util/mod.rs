//! Utility functions shared by the feed builder and the admin write path.
//!
//! - **Text processing**: byte-budget truncation, capitalisation, and the
//!   form sanitisers used before metadata is stored
//! - **URL validation**: checks that image links are publicly fetchable

mod text;
mod url_validator;

pub use text::{
    sanitize_text_field, sanitize_textarea_field, strip_attribute_prefix, strip_control_chars,
    truncate_bytes, ucfirst,
};
pub use url_validator::{validate_public_url, UrlValidationError};
