use scoop::config::{ClientOptions, DEFAULT_POLL_INTERVAL_MS};
use scoop::{Client, DbError};
use std::io::Write;
use std::time::Duration;

fn write_config(text: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(text.as_bytes()).unwrap();
    f
}

#[test]
fn file_options_reach_the_builder() {
    let f = write_config(
        r#"
address = "db.internal"
port = 27019
database = "shop"
operation_timeout_ms = 750
poll_interval_ms = 50
"#,
    );
    let opts = ClientOptions::load(Some(f.path())).unwrap();
    assert_eq!(opts.uri(), "mongodb://db.internal:27019/shop");
    assert_eq!(opts.poll_interval(), Duration::from_millis(50));

    let client = Client::memory().with_options(opts);
    let mut q = client.collection("orders");
    assert_eq!(q.find_options().timeout_ms, Some(750));
    q.timeout_ms(20);
    assert_eq!(q.find_options().timeout_ms, Some(20));
}

#[test]
fn unknown_keys_and_missing_fields_fall_back() {
    let f = write_config("port = 1\nflavour = \"vanilla\"\n");
    let opts = ClientOptions::from_file(f.path()).unwrap();
    assert_eq!(opts.port, Some(1));
    assert_eq!(opts.address, None);
    assert_eq!(opts.poll_interval(), Duration::from_millis(DEFAULT_POLL_INTERVAL_MS));
}

#[test]
fn broken_explicit_file_is_an_error() {
    let f = write_config("port = \"not a number\"");
    assert!(matches!(ClientOptions::load(Some(f.path())), Err(DbError::Config(_))));

    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    assert!(matches!(ClientOptions::from_file(&missing), Err(DbError::Io(_))));
}

#[test]
fn credentials_stay_out_of_debug_output() {
    let f = write_config("username = \"app\"\npassword = \"s3cret\"\n");
    let opts = ClientOptions::from_file(f.path()).unwrap();
    assert!(opts.uri().starts_with("mongodb://app:s3cret@"));
    let client = Client::memory().with_options(opts);
    assert!(!format!("{client:?}").contains("s3cret"));
}
