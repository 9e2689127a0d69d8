use dmlink_client::functions::{FileSaving, K2Parameters};
use dmlink_client::ClientError;
use dmlink_core::wire::unpack_str;
use dmlink_core::{code_for, FunctionCode, Message, MessageShape};
use dmlink_sim::SimOptions;

use crate::*;

#[test]
fn test_versions_and_camera_count() {
    let host = sim(SimOptions {
        cameras: 3,
        ..SimOptions::default()
    });
    let mut client = connect(&host);

    assert_eq!(client.dm_version().unwrap(), 40300);
    assert_eq!(client.plugin_version().unwrap(), 107);
    assert_eq!(client.number_of_cameras().unwrap(), 3);
}

#[test]
fn test_camera_insertion() {
    let host = sim(SimOptions::default());
    let mut client = connect(&host);

    assert!(client.is_camera_inserted(0).unwrap());
    client.insert_camera(0, false).unwrap();
    assert!(!client.is_camera_inserted(0).unwrap());
    client.insert_camera(0, true).unwrap();
    assert!(client.is_camera_inserted(0).unwrap());

    let request = host.stats().last_request.unwrap();
    assert_eq!(request.head(), FunctionCode::IsCameraInserted.code());
    assert_eq!(request.long(1), Some(0));
}

/// A non-zero status is reported with the function that produced it, and
/// the connection stays in step.
#[test]
fn test_select_missing_camera() {
    let host = sim(SimOptions::default());
    let mut client = connect(&host);

    client.select_camera(0).unwrap();
    let err = client.select_camera(5).unwrap_err();
    assert!(
        matches!(
            err,
            ClientError::Status {
                function: FunctionCode::SelectCamera,
                status: -1
            }
        ),
        "unexpected error: {err}"
    );
    assert!(!err.is_transport());
    assert_eq!(client.dm_version().unwrap(), 40300);
}

#[test]
fn test_read_mode_and_shutter() {
    let host = sim(SimOptions::default());
    let mut client = connect(&host);

    client.set_read_mode(2, 1.5).unwrap();
    let request = host.stats().last_request.unwrap();
    assert_eq!(request.long_args, vec![FunctionCode::SetReadMode.code(), 2]);
    assert_eq!(request.double_args, vec![1.5]);

    client.set_shutter_normally_closed(0, 1).unwrap();
    let request = host.stats().last_request.unwrap();
    assert_eq!(
        request.long_args,
        vec![FunctionCode::SetShutterNormallyClosed.code(), 0, 1]
    );
}

#[test]
fn test_k2_parameters_request() {
    let host = sim(SimOptions::default());
    let mut client = connect(&host);

    let params = K2Parameters {
        read_mode: 2,
        hardware_processing: 6,
        dose_fractionation: true,
        save_frames: true,
        frame_time: 0.05,
        filter: "ccorr".into(),
        ..K2Parameters::default()
    };
    client.set_k2_parameters(&params).unwrap();

    let request = host.stats().last_request.unwrap();
    assert_eq!(request.head(), FunctionCode::SetK2Parameters.code());
    assert_eq!(request.long(1), Some(2));
    assert_eq!(request.long(2), Some(6));
    assert_eq!(request.bool_args, vec![true, false, true]);
    assert_eq!(request.double_args, vec![1.0, 0.05]);
    assert_eq!(unpack_str(&request.trailing, client.layout()), "ccorr");
}

#[test]
fn test_basic_file_saving() {
    let host = sim(SimOptions::default());
    let mut client = connect(&host);

    let saving = FileSaving {
        early_return: true,
        ..FileSaving::new("/data/session", "frames")
    };
    // Frames are not being saved, so the basic request is used.
    assert_eq!(client.setup_file_saving(&saving).unwrap(), 0);

    let request = host.stats().last_request.unwrap();
    assert_eq!(request.head(), FunctionCode::SetupFileSaving.code());
    assert_eq!(request.double_args, vec![1.0]);
    assert_eq!(unpack_str(&request.trailing, client.layout()), "/data/session");
}

#[test]
fn test_extended_file_saving() {
    let host = sim(SimOptions::default());
    let mut client = connect(&host);

    client
        .set_k2_parameters(&K2Parameters {
            save_frames: true,
            ..K2Parameters::default()
        })
        .unwrap();
    let saving = FileSaving {
        early_return: true,
        lzw: true,
        early_return_frame_count: 10,
        early_return_ram_grabs: 2,
        ..FileSaving::new("/data/session", "frames")
    };
    client.setup_file_saving(&saving).unwrap();

    let request = host.stats().last_request.unwrap();
    assert_eq!(request.head(), FunctionCode::SetupFileSaving2.code());
    assert_eq!(request.long(2), Some(128 + 8));
    assert_eq!(request.double_args, vec![1.0, 131_082.0, 0.0, 0.0, 0.0]);
}

/// `call` hands back whatever status the host sends.
#[test]
fn test_generic_call_by_name() {
    let host = sim(SimOptions::default());
    let mut client = connect(&host);

    let function = code_for("GetDMVersion").unwrap();
    let response = client
        .call(&Message::call(function), MessageShape::new(2, 0, 0))
        .unwrap();
    assert_eq!(response.long_args, vec![0, 40300]);

    let unsupported = client
        .call(&Message::call(FunctionCode::GetGainReference), MessageShape::new(1, 0, 0))
        .unwrap();
    assert_eq!(unsupported.head(), -1);
    assert!(code_for("GetCoffee").is_err());
}
