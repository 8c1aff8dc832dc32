use crate::error::ValidationError;
use std::fmt;

/// A search tag accepted from a caller: non-empty and alphanumeric.
///
/// Alphanumeric follows [`char::is_alphanumeric`], so Unicode letters such as
/// Cyrillic are accepted alongside ASCII letters and digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(String);

impl Tag {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.is_empty() || !raw.chars().all(char::is_alphanumeric) {
            return Err(ValidationError::InvalidTag(raw.to_string()));
        }
        Ok(Tag(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Tag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Validates a batch of raw tags, failing on the first offending one.
pub fn validate_tags<S: AsRef<str>>(raw: &[S]) -> Result<Vec<Tag>, ValidationError> {
    if raw.is_empty() {
        return Err(ValidationError::EmptyTagList);
    }

    raw.iter().map(|tag| Tag::parse(tag.as_ref())).collect()
}
