use std::io::Write;

use dmlink_client::filter::{FilterOp, FILTER_UNSUPPORTED, OFFSET_UNSUPPORTED};
use dmlink_client::notes::BACKGROUND_PREFIX;
use dmlink_client::{
    ClientError, EnergyFilter, ReturnKind, ScriptValue, UNSUPPORTED_DOUBLE, UNSUPPORTED_LONG,
};
use dmlink_core::FunctionCode;
use dmlink_sim::script::Note;
use dmlink_sim::SimOptions;

use crate::*;

#[test]
fn test_capability_check() {
    let host = sim(SimOptions::default());
    let mut client = connect(&host);

    assert!(client.supports_script_function("IFGetSlitIn").unwrap());
    assert!(!client.supports_script_function("AFGetSlitState").unwrap());
    assert_eq!(host.stats().count(FunctionCode::ExecuteScript), 2);
}

/// Names that are not identifiers are never spliced into a script.
#[test]
fn test_capability_check_refuses_non_identifiers() {
    let host = sim(SimOptions::default());
    let mut client = connect(&host);

    assert!(!client.supports_script_function("Exit(1.0); //").unwrap());
    assert!(!client.supports_script_function("").unwrap());
    assert_eq!(host.stats().count(FunctionCode::ExecuteScript), 0);
}

#[test]
fn test_execute_for_long_truncates() {
    let host = sim(SimOptions::default());
    let mut client = connect(&host);

    assert_eq!(client.execute_for_long("Exit(3.9)").unwrap(), 3);
    assert_eq!(client.execute_for_long("Exit(-3.9)").unwrap(), -3);
    assert_eq!(client.execute_for_status("Exit(3.9)").unwrap(), 0);
}

#[test]
fn test_camera_object_function_sentinels() {
    let host = sim(SimOptions::default());
    let mut client = connect(&host);

    let double = client
        .execute_camera_object_function("AFGetSlitState", 0, ReturnKind::Double)
        .unwrap();
    assert_eq!(double, ScriptValue::Double(UNSUPPORTED_DOUBLE));
    let long = client
        .execute_camera_object_function("AFGetSlitState", 0, ReturnKind::Long)
        .unwrap();
    assert_eq!(long, ScriptValue::Long(UNSUPPORTED_LONG));

    // Only the two capability checks were sent.
    assert_eq!(host.stats().count(FunctionCode::ExecuteScript), 2);
}

/// A non-zero script status is an error for value helpers and raw for the rest.
#[test]
fn test_failing_script_is_an_error() {
    let host = sim(SimOptions::default().with_script_status(5));
    let mut client = connect(&host);

    let err = client.execute_for_double("Exit(2.0)").unwrap_err();
    assert!(
        matches!(err, ClientError::Status { function: FunctionCode::ExecuteScript, status: 5 }),
        "got {err:?}"
    );
    assert!(!err.is_transport());

    let err = client.execute_for_long("Exit(2.0)").unwrap_err();
    assert!(matches!(err, ClientError::Status { status: 5, .. }), "got {err:?}");

    assert_eq!(client.execute_for_status("Exit(2.0)").unwrap(), 5);
    let reply = client.execute_script("Exit(2.0)").unwrap();
    assert_eq!((reply.status, reply.value), (5, 2.0));

    // A failing capability script reads as unsupported.
    assert!(!client.supports_script_function("IFGetSlitIn").unwrap());
    assert!(client.is_connected());
}

#[test]
fn test_camera_object_function_selects_camera() {
    let host = sim(SimOptions::default().with_script_functions(["CM_GetReadMode"]));
    let mut client = connect(&host);

    let value = client
        .execute_camera_object_function("CM_GetReadMode", 1, ReturnKind::Long)
        .unwrap();
    assert_eq!(value, ScriptValue::Long(0));

    let stats = host.stats();
    let request = stats.last_request.unwrap();
    assert_eq!(request.bool(0), Some(true), "non-zero camera asks the host to select it");
    let script = stats.scripts.last().unwrap();
    assert!(script.contains("ObjectAt(cameraList,1)"), "{script}");
    assert!(script.contains("CM_GetReadMode(camera);"), "{script}");

    client
        .execute_camera_object_function("CM_GetReadMode", 0, ReturnKind::Double)
        .unwrap();
    assert_eq!(host.stats().last_request.unwrap().bool(0), Some(false));
}

#[test]
fn test_persistent_notes() {
    let host = sim(SimOptions::default());
    let mut client = connect(&host);

    client.set_note("dmlink:frames", 42.0).unwrap();
    assert_eq!(client.get_note("dmlink:frames").unwrap(), 42.0);
    assert_eq!(client.take_note("dmlink:frames").unwrap(), 42.0);
    assert_eq!(client.get_note("dmlink:frames").unwrap(), 0.0);
    assert!(host.engine().note("dmlink:frames").is_none());

    let path = r#"C:\data\run "7""#;
    client.set_note("dmlink:path", path).unwrap();
    assert_eq!(
        host.engine().note("dmlink:path"),
        Some(&Note::Text(path.to_string()))
    );
}

#[test]
fn test_run_script_file() {
    let host = sim(SimOptions::default());
    let mut client = connect(&host);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "number x = 3\nExit(3)").unwrap();

    let reply = client.run_script_file(file.path(), false).unwrap();
    assert_eq!(reply.value, 3.0);
    assert_eq!(host.stats().scripts.last().unwrap(), "number x = 3\nExit(3)");

    client.run_script_file(file.path(), true).unwrap();
    let script = host.stats().scripts.last().unwrap().clone();
    assert!(script.starts_with("// $BACKGROUND$\n\n"));
    assert_eq!(&script[BACKGROUND_PREFIX.len()..], "number x = 3\nExit(3)");
}

#[test]
fn test_missing_script_file() {
    let host = sim(SimOptions::default());
    let mut client = connect(&host);

    let dir = tempfile::tempdir().unwrap();
    assert!(client.run_script_file(&dir.path().join("absent.s"), false).is_err());
    assert!(client.is_connected());
    assert_eq!(host.stats().count(FunctionCode::ExecuteScript), 0);
}

#[test]
fn test_energy_filter_round_trip() {
    let host = sim(SimOptions::default());
    let mut client = connect(&host);

    let filter = EnergyFilter::detect(&mut client).unwrap();
    assert!(filter.is_available());
    assert_eq!(filter.function(FilterOp::SetSlitIn), Some("IFSetSlitIn"));
    assert_eq!(filter.function(FilterOp::AlignZeroLoss), None);

    assert_eq!(filter.filter_enabled(&mut client).unwrap(), -1.0);
    assert_eq!(filter.set_filter_enabled(&mut client, true).unwrap(), 0);
    assert!(host.engine().slit_in());
    assert!(host.stats().scripts.last().unwrap().contains("IFWaitForFilter();"));
    assert_eq!(filter.filter_enabled(&mut client).unwrap(), 1.0);

    assert_eq!(filter.set_slit_width(&mut client, 15.0).unwrap(), 0);
    assert_eq!(host.engine().slit_width(), 15.0);
    assert_eq!(filter.slit_width(&mut client).unwrap(), 15.0);

    assert_eq!(filter.set_energy_offset(&mut client, 5.5).unwrap(), 0);
    assert_eq!(filter.energy_offset(&mut client).unwrap(), 5.5);

    assert_eq!(filter.align_zero_loss(&mut client).unwrap(), FILTER_UNSUPPORTED);
}

#[test]
fn test_energy_filter_oldest_generation() {
    let host = sim(SimOptions::default().with_script_functions([
        "AFGetSlitState",
        "AFSetSlitState",
        "AFDoAlignZeroLoss",
    ]));
    let mut client = connect(&host);

    let filter = EnergyFilter::detect(&mut client).unwrap();
    assert_eq!(filter.function(FilterOp::GetSlitIn), Some("AFGetSlitState"));

    filter.set_filter_enabled(&mut client, true).unwrap();
    assert!(!host.stats().scripts.last().unwrap().contains("IFWaitForFilter"));
    assert_eq!(filter.filter_enabled(&mut client).unwrap(), 1.0);
    assert_eq!(filter.align_zero_loss(&mut client).unwrap(), 1.0);
    assert_eq!(filter.energy_offset(&mut client).unwrap(), OFFSET_UNSUPPORTED);
}

/// With no filter API every operation answers its sentinel without a round trip.
#[test]
fn test_energy_filter_absent() {
    let host = sim(SimOptions::default().with_script_functions(Vec::<String>::new()));
    let mut client = connect(&host);

    let filter = EnergyFilter::detect(&mut client).unwrap();
    assert!(!filter.is_available());
    let probes = host.stats().count(FunctionCode::ExecuteScript);

    assert_eq!(filter.filter_enabled(&mut client).unwrap(), FILTER_UNSUPPORTED);
    assert_eq!(filter.set_filter_enabled(&mut client, true).unwrap(), -1);
    assert_eq!(filter.slit_width(&mut client).unwrap(), FILTER_UNSUPPORTED);
    assert_eq!(filter.set_slit_width(&mut client, 10.0).unwrap(), -1);
    assert_eq!(filter.energy_offset(&mut client).unwrap(), OFFSET_UNSUPPORTED);
    assert_eq!(filter.set_energy_offset(&mut client, 1.0).unwrap(), -1);
    assert_eq!(filter.align_zero_loss(&mut client).unwrap(), FILTER_UNSUPPORTED);
    assert_eq!(host.stats().count(FunctionCode::ExecuteScript), probes);
}
