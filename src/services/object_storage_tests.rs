//! Tests for S3 configuration loading and failure classification
//!
//! Environment variables are set through temp-env, which serializes access
//! so tests stay safe under the 2024 edition's `unsafe` `set_var`.

use super::{
    ConfigError, ObjectList, RetryClass, S3Config, StorageError, classify_failure,
    validate_bucket_name,
};

const S3_VARS: [&str; 9] = [
    "S3_ENDPOINT",
    "S3_BUCKET",
    "S3_REGION",
    "S3_ACCESS_KEY_ID",
    "S3_SECRET_ACCESS_KEY",
    "S3_USE_PATH_STYLE",
    "S3_MAX_RETRIES",
    "S3_RETRY_MAX_BACKOFF",
    "S3_LIST_PAGE_SIZE",
];

/// Every S3 variable unset except the given overrides
fn vars_with<'a>(overrides: &[(&'a str, &'a str)]) -> Vec<(&'a str, Option<&'a str>)> {
    S3_VARS
        .iter()
        .map(|name| {
            let value = overrides
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| *value);
            (*name, value)
        })
        .collect()
}

#[test]
fn test_default_config() {
    let config = S3Config::default();
    assert!(config.endpoint.is_none());
    assert!(config.bucket.is_none());
    assert_eq!(config.region, "us-east-1");
    assert!(!config.use_path_style);
    assert_eq!(config.max_retries, 3);
    assert_eq!(config.retry_max_backoff_secs, 30);
    assert_eq!(config.list_page_size, 1000);
}

#[test]
fn test_from_env_without_bucket_is_allowed() {
    temp_env::with_vars_unset(S3_VARS.to_vec(), || {
        let config = S3Config::from_env().expect("bucket is optional");
        assert!(config.bucket.is_none());
        assert_eq!(config.region, "us-east-1");
    });
}

#[test]
fn test_from_env_full_config() {
    temp_env::with_vars(
        vars_with(&[
            ("S3_ENDPOINT", "http://localhost:9000"),
            ("S3_BUCKET", "media-assets"),
            ("S3_REGION", "eu-west-1"),
            ("S3_ACCESS_KEY_ID", "minioadmin"),
            ("S3_SECRET_ACCESS_KEY", "minioadmin123"),
            ("S3_USE_PATH_STYLE", "yes"),
            ("S3_MAX_RETRIES", "5"),
            ("S3_RETRY_MAX_BACKOFF", "60"),
            ("S3_LIST_PAGE_SIZE", "250"),
        ]),
        || {
            let config = S3Config::from_env().expect("Should parse full config");
            assert_eq!(config.endpoint.as_deref(), Some("http://localhost:9000"));
            assert_eq!(config.bucket.as_deref(), Some("media-assets"));
            assert_eq!(config.region, "eu-west-1");
            assert!(config.has_static_credentials());
            assert!(config.use_path_style);
            assert_eq!(config.max_retries, 5);
            assert_eq!(config.retry_max_backoff_secs, 60);
            assert_eq!(config.list_page_size, 250);
        },
    );
}

#[test]
fn test_from_env_empty_values_treated_as_none() {
    temp_env::with_vars(
        vars_with(&[("S3_BUCKET", ""), ("S3_ENDPOINT", ""), ("S3_REGION", "")]),
        || {
            let config = S3Config::from_env().expect("empty values fall back to defaults");
            assert!(config.bucket.is_none());
            assert!(config.endpoint.is_none());
            assert_eq!(config.region, "us-east-1");
        },
    );
}

#[test]
fn test_from_env_keeps_malformed_bucket_for_later() {
    temp_env::with_vars(vars_with(&[("S3_BUCKET", "ab")]), || {
        let config = S3Config::from_env().expect("bucket is checked after resolution");
        assert_eq!(config.bucket.as_deref(), Some("ab"));
    });
}

#[test]
fn test_from_env_invalid_bool() {
    temp_env::with_vars(vars_with(&[("S3_USE_PATH_STYLE", "maybe")]), || {
        let err = S3Config::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref variable, .. } if variable == "S3_USE_PATH_STYLE"
        ));
    });
}

#[test]
fn test_from_env_invalid_max_retries() {
    temp_env::with_vars(vars_with(&[("S3_MAX_RETRIES", "lots")]), || {
        let err = S3Config::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref variable, .. } if variable == "S3_MAX_RETRIES"
        ));
    });
}

#[test]
fn test_from_env_page_size_out_of_range() {
    temp_env::with_vars(vars_with(&[("S3_LIST_PAGE_SIZE", "5000")]), || {
        let err = S3Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationFailed(_)));
    });
}

#[test]
fn test_validate_bucket_rules() {
    assert!(validate_bucket_name("").is_err());
    assert!(validate_bucket_name("ab").is_err());
    assert!(validate_bucket_name(&"a".repeat(64)).is_err());
    assert!(validate_bucket_name("abc").is_ok());
    assert!(validate_bucket_name(&"a".repeat(63)).is_ok());
}

#[test]
fn test_validate_partial_credentials() {
    let config = S3Config {
        access_key_id: Some("key".to_string()),
        ..S3Config::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::ValidationFailed(msg)) if msg.contains("S3_SECRET_ACCESS_KEY")
    ));

    let config = S3Config {
        secret_access_key: Some("secret".to_string()),
        ..S3Config::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::ValidationFailed(msg)) if msg.contains("S3_ACCESS_KEY_ID")
    ));
}

#[test]
fn test_validate_endpoint_requires_scheme() {
    let config = S3Config {
        endpoint: Some("localhost:9000".to_string()),
        ..S3Config::default()
    };
    assert!(config.validate().is_err());
    assert!(!S3Config::default().has_custom_endpoint());
}

#[test]
fn test_validate_limits() {
    let too_many_retries = S3Config {
        max_retries: 11,
        ..S3Config::default()
    };
    assert!(too_many_retries.validate().is_err());

    let too_much_backoff = S3Config {
        retry_max_backoff_secs: 301,
        ..S3Config::default()
    };
    assert!(too_much_backoff.validate().is_err());

    let zero_page = S3Config {
        list_page_size: 0,
        ..S3Config::default()
    };
    assert!(zero_page.validate().is_err());
}

// ============================================================================
// Listing Pages
// ============================================================================

#[test]
fn test_object_list_has_more_needs_token() {
    let truncated_without_token = ObjectList {
        keys: vec!["a".to_string()],
        continuation_token: None,
        is_truncated: true,
    };
    assert!(!truncated_without_token.has_more());

    let next_page = ObjectList {
        keys: vec![],
        continuation_token: Some("t1".to_string()),
        is_truncated: true,
    };
    assert!(next_page.has_more());
    assert!(!ObjectList::default().has_more());
}

// ============================================================================
// Failure Classification
// ============================================================================

#[test]
fn test_classify_failure_variants() {
    assert!(matches!(
        classify_failure("copy_object", "SlowDown: reduce your request rate".into(), StorageError::CopyFailed),
        StorageError::RateLimited(_)
    ));
    assert!(matches!(
        classify_failure("list_objects", "NoSuchBucket: gone".into(), StorageError::ListFailed),
        StorageError::BucketNotFound(_)
    ));
    assert!(matches!(
        classify_failure("delete_object", "AccessDenied".into(), StorageError::DeleteFailed),
        StorageError::AccessDenied(_)
    ));
    assert!(matches!(
        classify_failure("copy_object", "InternalError: oops".into(), StorageError::CopyFailed),
        StorageError::CopyFailed(detail) if detail == "InternalError: oops"
    ));
}

#[test]
fn test_retry_classes() {
    let cases = [
        (StorageError::RateLimited("503 SlowDown".into()), RetryClass::Throttled),
        (StorageError::ConnectionError("refused".into()), RetryClass::Transient),
        (StorageError::CopyFailed("503 Service Unavailable".into()), RetryClass::Throttled),
        (StorageError::CopyFailed("InternalError: try again".into()), RetryClass::Transient),
        (StorageError::DeleteFailed("connection timeout".into()), RetryClass::Transient),
        (StorageError::ListFailed("InvalidArgument: bad token".into()), RetryClass::Permanent),
        (StorageError::Internal("request Timeout".into()), RetryClass::Transient),
        (StorageError::NotFound("gone".into()), RetryClass::Permanent),
        (StorageError::AccessDenied("nope".into()), RetryClass::Permanent),
        (StorageError::BucketNotFound("media".into()), RetryClass::Permanent),
        (
            StorageError::Config(ConfigError::ValidationFailed("bad".into())),
            RetryClass::Permanent,
        ),
    ];

    for (error, expected) in cases {
        assert_eq!(error.retry_class(), expected, "{error}");
    }
}
