use std::collections::HashSet;
use std::io;
use std::sync::LazyLock;

use crate::error::PgSteadyError;

/// Error codes presumed recoverable by retry: PostgreSQL SQLSTATEs for
/// connection, transaction-state, rollback, resource and operator-intervention
/// classes, plus OS-level network and DNS failures.
static TRANSIENT_CODES: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // Class 08: connection exceptions
        "08000", "08001", "08003", "08004", "08006", "08007", "08P01",
        // Class 25: invalid transaction state
        "25000", "25001", "25P01", "25P02",
        // Class 40: transaction rollback
        "40000", "40001", "40002", "40003", "40P01",
        // Class 53: insufficient resources
        "53000", "53100", "53200", "53300", "53400",
        // Class 55: object not in prerequisite state (lock not available)
        "55P03",
        // Class 57: operator intervention
        "57000", "57014", "57P01", "57P02", "57P03", "57P04", "57P05",
        // OS / network
        "ECONNRESET", "ECONNREFUSED", "ECONNABORTED", "ETIMEDOUT", "EPIPE",
        "EHOSTUNREACH", "ENETUNREACH", "EAI_AGAIN",
    ]
    .into_iter()
    .collect()
});

/// True iff `code`, upper-cased, is in the closed transient set.
#[must_use]
pub fn is_retriable_code(code: &str) -> bool {
    TRANSIENT_CODES.contains(code.to_ascii_uppercase().as_str())
}

/// Classify an error as transient. Pure: depends only on the code the error
/// carries, and errors without a code are never retriable.
#[must_use]
pub fn is_retriable(error: &PgSteadyError) -> bool {
    error_code(error).is_some_and(|code| is_retriable_code(&code))
}

fn error_code(error: &PgSteadyError) -> Option<String> {
    match error {
        PgSteadyError::PostgresError(e) => postgres_code(e),
        PgSteadyError::PoolError(bb8::RunError::User(e)) => postgres_code(e),
        PgSteadyError::SqlState { code, .. } => Some(code.clone()),
        _ => None,
    }
}

fn postgres_code(error: &tokio_postgres::Error) -> Option<String> {
    if let Some(state) = error.code() {
        return Some(state.code().to_string());
    }
    io_code(error).map(str::to_string)
}

/// Walk the source chain looking for an `io::Error` and translate its kind to
/// the OS code name used by the transient set.
fn io_code(error: &(dyn std::error::Error + 'static)) -> Option<&'static str> {
    let mut source = error.source();
    while let Some(current) = source {
        if let Some(io_error) = current.downcast_ref::<io::Error>() {
            return os_code(io_error.kind());
        }
        source = current.source();
    }
    None
}

fn os_code(kind: io::ErrorKind) -> Option<&'static str> {
    match kind {
        io::ErrorKind::ConnectionReset => Some("ECONNRESET"),
        io::ErrorKind::ConnectionRefused => Some("ECONNREFUSED"),
        io::ErrorKind::ConnectionAborted => Some("ECONNABORTED"),
        io::ErrorKind::TimedOut => Some("ETIMEDOUT"),
        io::ErrorKind::BrokenPipe => Some("EPIPE"),
        io::ErrorKind::HostUnreachable => Some("EHOSTUNREACH"),
        io::ErrorKind::NetworkUnreachable => Some("ENETUNREACH"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coded(code: &str) -> PgSteadyError {
        PgSteadyError::SqlState {
            code: code.to_string(),
            message: "test".to_string(),
        }
    }

    #[test]
    fn serialization_failure_is_retriable() {
        assert!(is_retriable(&coded("40001")));
    }

    #[test]
    fn admin_shutdown_is_retriable() {
        assert!(is_retriable(&coded("57P01")));
    }

    #[test]
    fn unique_violation_is_not_retriable() {
        assert!(!is_retriable(&coded("23505")));
    }

    #[test]
    fn network_codes_are_retriable_case_insensitively() {
        assert!(is_retriable_code("econnreset"));
        assert!(is_retriable_code("ECONNRESET"));
        assert!(is_retriable_code("eai_again"));
        assert!(is_retriable(&coded("epipe")));
    }

    #[test]
    fn errors_without_code_are_not_retriable() {
        assert!(!is_retriable(&PgSteadyError::ConnectionError("x".into())));
        assert!(!is_retriable(&PgSteadyError::Shutdown));
        assert!(!is_retriable(&PgSteadyError::ProbeFailed));
    }

    #[test]
    fn unknown_codes_are_not_retriable() {
        assert!(!is_retriable_code(""));
        assert!(!is_retriable_code("99999"));
        assert!(!is_retriable_code("40001 ")); // exact match only
    }
}
