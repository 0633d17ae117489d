//! Error types for the POF codec.

/// Errors that can occur while encoding or decoding POF streams.
#[derive(Debug, thiserror::Error)]
pub enum PofError {
    #[error("stream corrupted: {0}")]
    Corrupted(String),

    #[error("unexpected end of stream: need {needed} bytes but only {remaining} remaining")]
    Eof { needed: usize, remaining: usize },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("unable to convert type {found} to {target}")]
    UnsupportedConversion { target: &'static str, found: String },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("unknown user type: {0}")]
    UnknownUserType(String),

    #[error("duplicate identity: {0}")]
    DuplicateIdentity(i32),

    #[error("missing identity: {0}")]
    MissingIdentity(i32),

    #[error("expected to write {expected} objects but actually wrote {actual}")]
    ElementCountMismatch { expected: usize, actual: usize },

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("serializer error: {0}")]
    Serializer(String),
}

impl PofError {
    /// Wraps any displayable error as a serializer error.
    pub fn serializer(e: impl std::fmt::Display) -> Self {
        Self::Serializer(e.to_string())
    }

    pub(crate) fn conversion(target: &'static str, found: i32) -> Self {
        Self::UnsupportedConversion {
            target,
            found: crate::wire::marker::type_name(found).to_string(),
        }
    }

    /// True when the stream position can no longer be trusted.
    ///
    /// Callers reading from a connection should drop it rather than retry.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::Corrupted(_)
                | Self::Eof { .. }
                | Self::DuplicateIdentity(_)
                | Self::MissingIdentity(_)
        )
    }

    /// True for programmer or schema errors: out-of-order properties, count
    /// mismatches, unregistered types and invalid values.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            Self::Protocol(_)
                | Self::ElementCountMismatch { .. }
                | Self::UnknownUserType(_)
                | Self::InvalidValue(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(PofError::Eof { needed: 1, remaining: 0 }.is_corruption());
        assert!(PofError::MissingIdentity(3).is_corruption());
        assert!(!PofError::Protocol("x".into()).is_corruption());
        assert!(PofError::Protocol("x".into()).is_misuse());
        assert!(
            PofError::ElementCountMismatch {
                expected: 2,
                actual: 1
            }
            .is_misuse()
        );
        assert!(!PofError::conversion("i32", -13).is_misuse());
    }

    #[test]
    fn messages() {
        let e = PofError::ElementCountMismatch {
            expected: 3,
            actual: 2,
        };
        assert_eq!(
            e.to_string(),
            "expected to write 3 objects but actually wrote 2"
        );
        let e = PofError::conversion("i32", -13);
        assert_eq!(e.to_string(), "unable to convert type octet-string to i32");
        assert_eq!(PofError::MissingIdentity(7).to_string(), "missing identity: 7");
    }
}
