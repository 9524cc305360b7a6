use std::collections::HashMap;
use std::time::Duration;

use assert_matches::assert_matches;

use part_sourcing::config::{Config, ConfigLoader};
use part_sourcing::domain::Provider;
use part_sourcing::error::SourcingError;

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

#[test]
fn env_overrides_file() {
    let config: Config = serde_json::from_str(
        r#"{
            "provider": "getchips",
            "chunk_size": 20,
            "upload_folder": "/srv/out",
            "ftp": {"host": "ftp.example.com", "user": "bot", "remote_dir": "incoming"},
            "watch": {"extensions": [".XLSX"], "interval_ms": 250}
        }"#,
    )
    .unwrap();
    let vars = env(&[
        ("CHUNK_SIZE", "5"),
        ("FTP_PASSWORD", "hunter2"),
        ("SSH_HOST", "10.0.0.5"),
        ("OCTOPART_URL", "http://erp.local/ws/exchange?wsdl"),
        ("OCTOPART_NAMESPACE", "http://www.1c.ru/exchange"),
        ("OCTOPART_FIELD", "Payload"),
    ]);
    let settings = ConfigLoader::resolve_config(config, &vars).unwrap();

    assert_eq!(settings.provider, Provider::Getchips);
    assert_eq!(settings.chunk_size, 5);
    assert_eq!(settings.upload_folder.as_str(), "/srv/out");

    let ftp = settings.ftp.unwrap();
    assert_eq!(ftp.host, "ftp.example.com");
    assert_eq!(ftp.port, 21);
    assert_eq!(ftp.user, "bot");
    assert_eq!(ftp.password, "hunter2");
    assert_eq!(ftp.remote_dir.as_deref(), Some("incoming"));

    let ssh = settings.ssh.unwrap();
    assert_eq!(ssh.port, 22);
    assert_eq!(ssh.remote_dir, "uploads");

    let enterprise = settings.enterprise.unwrap();
    assert_eq!(enterprise.namespace, "http://www.1c.ru/exchange");
    assert_eq!(enterprise.operation, "ExchangeOctopart");
    assert_eq!(enterprise.field, "Payload");

    assert_eq!(settings.watch.extensions, vec!["xlsx"]);
    assert_eq!(settings.watch.interval, Duration::from_millis(250));
}

#[test]
fn zero_chunk_size_is_rejected() {
    let err = ConfigLoader::resolve_config(Config::default(), &env(&[("CHUNK_SIZE", "0")]))
        .unwrap_err();
    assert_matches!(err, SourcingError::Config(_));
}

#[test]
fn unparsable_number_is_parse_error() {
    let err = ConfigLoader::resolve_config(Config::default(), &env(&[("FTP_PORT", "twenty-one")]))
        .unwrap_err();
    assert_matches!(err, SourcingError::ConfigParse(_));
}

#[test]
fn port_typo_without_host_is_still_reported() {
    let err = ConfigLoader::resolve_config(Config::default(), &env(&[("SSH_PORT", "22a")]))
        .unwrap_err();
    assert_matches!(err, SourcingError::ConfigParse(message) if message.starts_with("SSH_PORT"));
}

#[test]
fn enterprise_endpoint_needs_namespace() {
    let err = ConfigLoader::resolve_config(
        Config::default(),
        &env(&[("OCTOPART_URL", "http://erp.local/ws/exchange")]),
    )
    .unwrap_err();
    assert_matches!(err, SourcingError::Config(message) if message.contains("OCTOPART_NAMESPACE"));
}

#[test]
fn input_archiving_is_opt_in() {
    let vars = env(&[("SSH_HOST", "10.0.0.5")]);
    let settings = ConfigLoader::resolve_config(Config::default(), &vars).unwrap();
    assert!(!settings.ssh.unwrap().archive_input);

    let vars = env(&[("SSH_HOST", "10.0.0.5"), ("SSH_ARCHIVE_INPUT", "Yes")]);
    let settings = ConfigLoader::resolve_config(Config::default(), &vars).unwrap();
    assert!(settings.ssh.unwrap().archive_input);

    let err = ConfigLoader::resolve_config(Config::default(), &env(&[("SSH_ARCHIVE_INPUT", "1")]))
        .unwrap_err();
    assert_matches!(err, SourcingError::Config(_));

    let err = ConfigLoader::resolve_config(
        Config::default(),
        &env(&[("SSH_HOST", "10.0.0.5"), ("SSH_ARCHIVE_INPUT", "maybe")]),
    )
    .unwrap_err();
    assert_matches!(err, SourcingError::ConfigParse(_));
}

#[test]
fn unknown_provider_is_rejected() {
    let err = ConfigLoader::resolve_config(Config::default(), &env(&[("PART_PROVIDER", "octopart")]))
        .unwrap_err();
    assert_matches!(err, SourcingError::Config(_));
}

#[test]
fn explicit_missing_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("nope.json");
    let err = ConfigLoader::load(Some(path.to_str().unwrap())).unwrap_err();
    assert_matches!(err, SourcingError::Config(_));
}

#[test]
fn malformed_file_is_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("settings.json");
    std::fs::write(&path, "{ provider: nexar").unwrap();
    let err = ConfigLoader::load(Some(path.to_str().unwrap())).unwrap_err();
    assert_matches!(err, SourcingError::ConfigParse(_));
}
