use thiserror::Error;

/// Domain errors raised by the tag-management surface. Sync jobs never
/// produce these; they belong to the administrative operations.
#[derive(Debug, Error)]
pub enum TagError {
    #[error("tag {tagid} not found")]
    TagNotFound { tagid: i64 },

    #[error("tag named '{name}' already exists")]
    TagNameExists { name: String },

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection error: {0}")]
    Connection(String),
}

impl TagError {
    /// True for caller mistakes (as opposed to infrastructure failures),
    /// which the API maps to 4xx responses.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            TagError::TagNotFound { .. } | TagError::TagNameExists { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_are_distinguished() {
        assert!(TagError::TagNotFound { tagid: 7 }.is_domain());
        assert!(TagError::TagNameExists { name: "VIP".into() }.is_domain());
        assert!(!TagError::Connection("pool exhausted".into()).is_domain());
    }

    #[test]
    fn messages_name_the_offending_tag() {
        assert_eq!(
            TagError::TagNotFound { tagid: 42 }.to_string(),
            "tag 42 not found"
        );
        assert_eq!(
            TagError::TagNameExists { name: "VIP".into() }.to_string(),
            "tag named 'VIP' already exists"
        );
    }
}
