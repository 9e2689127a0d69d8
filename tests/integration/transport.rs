use dmlink_client::{Channel, Client, ClientError};
use dmlink_core::config::DmlinkConfig;
use dmlink_core::FunctionCode;
use dmlink_sim::SimOptions;

use crate::*;

#[test]
fn test_reconnect_opens_a_new_session() {
    let host = sim(SimOptions::default());
    let mut client = connect(&host);

    assert_eq!(client.dm_version().unwrap(), 40300);
    client.reconnect().unwrap();
    assert_eq!(client.dm_version().unwrap(), 40300);

    client.disconnect();
    client.disconnect();
    assert!(!client.is_connected());
    assert!(matches!(client.plugin_version(), Err(ClientError::NotConnected)));

    client.reconnect().unwrap();
    assert_eq!(client.plugin_version().unwrap(), 107);
    assert_eq!(host.stats().connections, 3);
}

#[test]
fn test_connect_refused() {
    let port = {
        let host = sim(SimOptions::default());
        host.port()
    };
    let mut channel = Channel::new("127.0.0.1", port, Default::default());
    let err = channel.connect().unwrap_err();
    assert!(matches!(err, ClientError::Io(_)), "unexpected error: {err}");
    assert!(err.is_transport());
    assert!(!channel.is_connected());
}

/// A client built from config writes its traffic to the configured log file.
#[test]
fn test_config_connection_with_file_log() {
    let host = sim(SimOptions::default());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("traffic.log");

    let mut config = DmlinkConfig::default();
    config.connection.host = "127.0.0.1".into();
    config.connection.port = host.port();
    config.debug.log_path = Some(path.clone());

    let mut client = Client::connect(&config).unwrap();
    client.dm_version().unwrap();
    drop(client);

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert!(lines.len() >= 2, "{text}");
    // Size 8, code 14.
    assert!(lines[0].ends_with("\tsend\t080000000e000000"), "{}", lines[0]);
    assert!(lines.iter().skip(1).all(|l| l.contains("\trecv\t")));
    assert_eq!(host.stats().count(FunctionCode::GetDMVersion), 1);
}
