//! Validated text types shared by the Oncobloom crates.
//!
//! Each type checks its invariant once, at construction, so code holding one never has to
//! re-validate it.

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The input is not a plausible email address
    #[error("Invalid email address")]
    InvalidEmail,
    /// The input is not an acceptable username
    #[error("Username must be {min}-{max} characters of letters, digits, '.', '-' or '_'")]
    InvalidUsername { min: usize, max: usize },
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the trimmed
    /// result is empty, an error is returned.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// An email address in canonical (trimmed, lower-case) form.
///
/// Validation is deliberately shallow: one `@`, a non-empty local part, and a domain
/// containing a dot that neither starts nor ends the domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmailAddress(String);

impl EmailAddress {
    const MAX_LEN: usize = 254;

    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        let canonical = input.as_ref().trim().to_lowercase();
        if canonical.is_empty() {
            return Err(TextError::Empty);
        }
        if canonical.len() > Self::MAX_LEN || canonical.chars().any(char::is_whitespace) {
            return Err(TextError::InvalidEmail);
        }

        let (local, domain) = canonical
            .split_once('@')
            .ok_or(TextError::InvalidEmail)?;
        let domain_ok = domain.contains('.')
            && !domain.contains('@')
            && !domain.starts_with('.')
            && !domain.ends_with('.');
        if local.is_empty() || !domain_ok {
            return Err(TextError::InvalidEmail);
        }

        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A login name: 3 to 80 ASCII letters, digits, `.`, `-` or `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Username(String);

impl Username {
    pub const MIN_LEN: usize = 3;
    pub const MAX_LEN: usize = 80;

    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }

        let ok_len = (Self::MIN_LEN..=Self::MAX_LEN).contains(&trimmed.len());
        let ok_chars = trimmed
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_'));
        if !ok_len || !ok_chars {
            return Err(TextError::InvalidUsername {
                min: Self::MIN_LEN,
                max: Self::MAX_LEN,
            });
        }

        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! text_impls {
    ($ty:ident, $ctor:path) => {
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl serde::Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                $ctor(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

text_impls!(NonEmptyText, NonEmptyText::new);
text_impls!(EmailAddress, EmailAddress::parse);
text_impls!(Username, Username::parse);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_text_trims() {
        let text = NonEmptyText::new("  Lung Cancer ").unwrap();
        assert_eq!(text.as_str(), "Lung Cancer");
    }

    #[test]
    fn test_non_empty_text_rejects_whitespace() {
        assert_eq!(NonEmptyText::new("   ").unwrap_err(), TextError::Empty);
    }

    #[test]
    fn test_email_is_lowercased() {
        let email = EmailAddress::parse(" Alice@Example.COM ").unwrap();
        assert_eq!(email.as_str(), "alice@example.com");
    }

    #[test]
    fn test_email_rejects_malformed() {
        for bad in ["alice", "@example.com", "alice@", "alice@example", "a b@example.com", "a@.com"] {
            assert_eq!(
                EmailAddress::parse(bad).unwrap_err(),
                TextError::InvalidEmail,
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_username_bounds() {
        assert!(Username::parse("bob").is_ok());
        assert!(Username::parse("dr.smith_01").is_ok());
        assert!(matches!(
            Username::parse("ab"),
            Err(TextError::InvalidUsername { .. })
        ));
        assert!(matches!(
            Username::parse("bob smith"),
            Err(TextError::InvalidUsername { .. })
        ));
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Result<EmailAddress, _> = serde_json::from_str("\"nurse@clinic.org\"");
        assert!(ok.is_ok());

        let bad: Result<NonEmptyText, _> = serde_json::from_str("\"  \"");
        assert!(bad.is_err());
    }
}
