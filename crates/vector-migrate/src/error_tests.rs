//! Tests for `error` module

use super::*;

fn all_errors() -> Vec<Error> {
    vec![
        Error::SourceNotFound("c".into()),
        Error::TransientNetwork("reset".into()),
        Error::RateLimit(60),
        Error::RetriesExhausted {
            operation: "scan".into(),
            attempts: 3,
            last: Box::new(Error::TransientNetwork("timeout".into())),
        },
        Error::SchemaMismatch("dim".into()),
        Error::PartialBatchWrite {
            written: 1,
            expected: 2,
        },
        Error::LockHeld {
            destination: "c".into(),
            release: "delete it".into(),
        },
        Error::Cancelled,
        Error::Config("bad".into()),
        Error::Authentication("401".into()),
        Error::Http("400".into()),
        Error::InvalidRecord("no vector".into()),
        Error::Io(std::io::Error::other("x")),
        Error::Json(serde_json::from_str::<serde_json::Value>("{").unwrap_err()),
        Error::Yaml(serde_yaml::from_str::<serde_yaml::Value>("a: [").unwrap_err()),
        Error::TaskJoin("panicked".into()),
    ]
}

#[test]
fn test_error_codes_are_unique() {
    let errors = all_errors();
    let mut codes: Vec<&str> = errors.iter().map(Error::code).collect();
    let total = codes.len();
    codes.sort_unstable();
    codes.dedup();

    assert_eq!(codes.len(), total);
    assert!(codes.iter().all(|c| c.starts_with("MIG-")));
}

#[test]
fn test_display_includes_code() {
    for err in all_errors() {
        let msg = err.to_string();
        assert!(msg.contains(err.code()), "{msg} should contain {}", err.code());
    }
}

#[test]
fn test_retryable_variants() {
    assert!(Error::TransientNetwork("timeout".into()).is_retryable());
    assert!(Error::RateLimit(5).is_retryable());
    assert!(Error::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset)).is_retryable());

    assert!(!Error::SourceNotFound("c".into()).is_retryable());
    assert!(!Error::SchemaMismatch("dim".into()).is_retryable());
    assert!(!Error::PartialBatchWrite {
        written: 0,
        expected: 1
    }
    .is_retryable());
    assert!(!Error::Authentication("HTTP 401".into()).is_retryable());
    assert!(!Error::Io(std::io::Error::from(std::io::ErrorKind::NotFound)).is_retryable());
}

#[test]
fn test_message_text_does_not_drive_retry() {
    // A config error mentioning "timeout" is still fatal.
    assert!(!Error::Config("timeout must be positive".into()).is_retryable());
}

#[test]
fn test_retries_exhausted_reports_underlying_kind() {
    let err = Error::RetriesExhausted {
        operation: "upsert".into(),
        attempts: 4,
        last: Box::new(Error::RateLimit(1)),
    };

    assert_eq!(err.kind(), ErrorKind::TransientNetwork);
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("4 attempts"));
}

#[test]
fn test_kind_display_names() {
    assert_eq!(ErrorKind::SourceNotFound.to_string(), "SourceNotFound");
    assert_eq!(
        ErrorKind::TransientNetwork.to_string(),
        "TransientNetworkError"
    );
    assert_eq!(ErrorKind::PartialBatchWrite.to_string(), "PartialBatchWrite");
}
