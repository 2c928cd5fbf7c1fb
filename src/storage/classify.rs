//! Uniqueness-violation detection for `sqlx` errors.

/// PostgreSQL SQLSTATE for `unique_violation`.
pub const UNIQUE_VIOLATION_CODE: &str = "23505";

const UNIQUE_VIOLATION_TEXT: &str = "duplicate key value violates unique constraint";

/// Returns `true` if `err` reports a uniqueness-constraint violation.
///
/// The structured database error is consulted first (SQLSTATE or sqlx's
/// error kind). When that is unavailable, for instance because the error
/// was re-wrapped as a protocol or configuration error, the rendered
/// message is matched instead.
#[must_use]
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let Some(db_err) = err.as_database_error()
        && (db_err.code().as_deref() == Some(UNIQUE_VIOLATION_CODE)
            || db_err.is_unique_violation())
    {
        return true;
    }
    message_indicates_unique_violation(&err.to_string())
}

fn message_indicates_unique_violation(message: &str) -> bool {
    message.contains(UNIQUE_VIOLATION_TEXT) || message.contains(UNIQUE_VIOLATION_CODE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_are_not_violations() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
        assert!(!is_unique_violation(&sqlx::Error::PoolTimedOut));
    }

    #[test]
    fn falls_back_to_message_text() {
        let err = sqlx::Error::Protocol(
            "duplicate key value violates unique constraint \"payment_events_pkey\"".to_string(),
        );
        assert!(is_unique_violation(&err));
    }

    #[test]
    fn falls_back_to_sqlstate_in_message() {
        let err = sqlx::Error::Protocol("error returned from database: 23505".to_string());
        assert!(is_unique_violation(&err));
    }

    #[test]
    fn unrelated_messages_do_not_match() {
        let err = sqlx::Error::Protocol("relation \"payment_events\" does not exist".to_string());
        assert!(!is_unique_violation(&err));
    }
}
