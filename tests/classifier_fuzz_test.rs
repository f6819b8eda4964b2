//! Randomized tests for SQLSTATE classification and template rendering.
//!
//! Feeds random and edge-case codes, messages and parameter values through
//! the classifier and the named template to catch panics and lost
//! information.

use pgconn::db::classifier::{
    CODE_DUPLICATE_ENTRY, CODE_DUPLICATE_TABLE, CODE_DUPLICATE_TYPE, CODE_UNDEFINED_TABLE,
};
use pgconn::db::{NamedTemplate, QueryTemplate, classify};
use pgconn::error::DbError;
use pgconn::models::{QueryParam, QueryParams};
use rand::Rng;
use rand::distributions::Alphanumeric;

const KNOWN_CODES: [&str; 4] = [
    CODE_DUPLICATE_ENTRY,
    CODE_UNDEFINED_TABLE,
    CODE_DUPLICATE_TABLE,
    CODE_DUPLICATE_TYPE,
];

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Five characters from the SQLSTATE alphabet.
fn random_sql_state() -> String {
    const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut rng = rand::thread_rng();
    (0..5)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

fn edge_case_strings() -> Vec<String> {
    vec![
        String::new(),
        " ".to_string(),
        "\n\r\t".to_string(),
        "\0".to_string(),
        "🚀".repeat(100),
        "'OR 1=1--".to_string(),
        "'; DROP TABLE users--".to_string(),
        "\\'".to_string(),
        "$$".to_string(),
        ":name".to_string(),
        "a".repeat(100_000),
        random_string(1000),
    ]
}

#[test]
fn fuzz_classify_random_codes() {
    for _ in 0..2000 {
        let code = random_sql_state();
        let message = random_string(32);
        let err = classify(&code, &message);

        // Every classified error still reports the code it came from.
        assert_eq!(err.sql_state(), Some(code.as_str()));
        if !KNOWN_CODES.contains(&code.as_str()) {
            assert_eq!(err, DbError::query(&code, &message));
        }
    }
}

#[test]
fn fuzz_classify_edge_case_inputs() {
    for code in edge_case_strings() {
        for message in edge_case_strings() {
            let err = classify(&code, &message);
            assert!(err.to_string().len() >= message.len());
            assert_eq!(err.sql_state(), Some(code.as_str()));
        }
    }
}

#[test]
fn fuzz_known_codes_keep_message() {
    for code in KNOWN_CODES {
        for message in edge_case_strings() {
            let err = classify(code, &message);
            assert!(!matches!(err, DbError::Query { .. }));
            assert!(err.to_string().contains(&message));
            assert!(err.suggestion().is_some());
            assert!(!err.is_retryable());
        }
    }
}

#[test]
fn fuzz_with_query_only_touches_generic_errors() {
    for _ in 0..500 {
        let query = random_string(rand::thread_rng().gen_range(0..64));
        let code = random_sql_state();
        match classify(&code, "boom").with_query(&query) {
            DbError::Query { query: attached, .. } => assert_eq!(attached, Some(query)),
            other => assert!(KNOWN_CODES.contains(&code.as_str()), "{:?}", other),
        }
    }
}

#[test]
fn fuzz_template_string_values() {
    let template = NamedTemplate;
    for value in edge_case_strings() {
        let params = QueryParams::new().with("v", value.as_str());
        let result = template.render("SELECT :v", &params);

        if value.contains('\0') {
            assert!(matches!(result, Err(DbError::Template { .. })));
            continue;
        }
        let sql = result.unwrap();
        assert!(sql.starts_with("SELECT "));
        // The literal must be one balanced quoted token.
        let literal = sql["SELECT ".len()..].trim_start_matches('E');
        assert!(literal.starts_with('\'') && literal.ends_with('\''));
        assert_eq!(literal.matches('\'').count() % 2, 0);
    }
}

#[test]
fn fuzz_template_random_numbers() {
    let mut rng = rand::thread_rng();
    let template = NamedTemplate;
    for _ in 0..1000 {
        let int: i64 = rng.gen_range(i64::MIN..=i64::MAX);
        let float: f64 = rng.gen_range(-1e300..1e300);
        let params = QueryParams::new().with("i", int).with("f", float);

        let sql = template.render("SELECT :i, :f", &params).unwrap();

        assert_eq!(sql, format!("SELECT {}, {:?}", int, float));
    }
}

#[test]
fn fuzz_template_special_floats() {
    let template = NamedTemplate;
    let cases = [
        (f64::NAN, "'NaN'::float8"),
        (f64::INFINITY, "'Infinity'::float8"),
        (f64::NEG_INFINITY, "'-Infinity'::float8"),
    ];
    for (value, expected) in cases {
        let params: QueryParams = [("f", QueryParam::Float(value))].into_iter().collect();
        assert_eq!(
            template.render("SELECT :f", &params).unwrap(),
            format!("SELECT {}", expected)
        );
    }
}
