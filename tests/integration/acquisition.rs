use dmlink_client::{AcquisitionFailure, ClientError};
use dmlink_core::wire::{ByteOrder, LongWidth};
use dmlink_core::{CameraGeometry, FunctionCode, ProcessingMode, WireLayout};
use dmlink_sim::{pattern, SimOptions};

use crate::*;

/// A 2048x2048 sensor binned by 2, sent in four chunks: four chunk reads,
/// three handshakes, and the host's pattern in row-major order.
#[test]
fn test_full_frame_in_four_chunks() {
    let host = sim(SimOptions::default().with_chunks(4).with_fragment(10_007));
    let (mut client, recorder) = connect_recorded(&host);

    let geometry = CameraGeometry::full_frame(2048, 2048, 2)
        .with_processing(ProcessingMode::GainNormalized)
        .with_exposure(0.5);
    let acquisition = client.acquire_detailed(&geometry).unwrap();

    assert_eq!(acquisition.function, FunctionCode::GetAcquiredImage);
    assert_eq!(acquisition.image.shape(), (1024, 1024));
    assert_eq!(acquisition.stats.chunks, 4);
    assert_eq!(acquisition.stats.handshakes, 3);
    assert_eq!(acquisition.stats.bytes, 1024 * 1024 * 2);
    assert!(acquisition.image.pixels() == pattern(1024 * 1024).as_slice());
    assert_eq!(acquisition.image.get(1, 0), Some(dmlink_sim::pattern_pixel(1024)));

    let stats = host.stats();
    assert_eq!(stats.handshakes, 3);
    assert_eq!(stats.chunks_sent, 4);
    let request = stats.last_request.unwrap();
    assert_eq!(request.long_args.len(), 14);
    assert_eq!(request.long(2), Some(1024));
    assert_eq!(request.long(3), Some(1024));
    assert_eq!(request.long(4), Some(2), "gain normalized flag");
    assert_eq!(request.double_args, vec![0.5, 0.0]);

    assert_eq!(
        recorder.codes(),
        vec![
            FunctionCode::GetAcquiredImage.code(),
            FunctionCode::ChunkHandshake.code(),
            FunctionCode::ChunkHandshake.code(),
            FunctionCode::ChunkHandshake.code(),
        ]
    );
    assert_eq!(recorder.count(FunctionCode::ChunkHandshake), 3);
    assert!(client.is_connected());
}

/// Chunk counts that do and do not divide the payload evenly.
#[test]
fn test_chunk_counts_reassemble_identically() {
    let geometry = CameraGeometry::full_frame(100, 60, 1);
    for chunks in [1, 2, 7] {
        let host = sim(SimOptions::default().with_chunks(chunks).with_fragment(7));
        let mut client = connect(&host);

        let acquisition = client.acquire_detailed(&geometry).unwrap();
        assert_eq!(acquisition.image.shape(), (60, 100), "chunks = {chunks}");
        let expected = pattern(6000);
        assert_eq!(acquisition.image.pixels(), expected.as_slice(), "chunks = {chunks}");
        for (r, row) in acquisition.image.rows().enumerate() {
            assert_eq!(row, &expected[r * 100..(r + 1) * 100]);
        }
        assert_eq!(acquisition.stats.chunks, chunks);
        assert_eq!(acquisition.stats.handshakes, chunks - 1);
        assert_eq!(host.stats().handshakes, chunks - 1);
    }
}

/// Back-to-back acquisitions on one connection stay in step.
#[test]
fn test_consecutive_acquisitions() {
    let host = sim(SimOptions::default().with_chunks(3));
    let mut client = connect(&host);
    let geometry = CameraGeometry::full_frame(64, 32, 1);

    for _ in 0..3 {
        let image = client.acquire(&geometry).unwrap();
        assert_eq!(image.shape(), (32, 64));
    }
    assert_eq!(client.dm_version().unwrap(), 40300);
    assert_eq!(host.stats().count(FunctionCode::GetAcquiredImage), 3);
    assert_eq!(host.stats().handshakes, 6);
}

/// The host announces 256x256 for a 512x512 request.
#[test]
fn test_dimension_mismatch_drops_connection() {
    let host = sim(SimOptions::default().with_reported_size(256, 256));
    let mut client = connect(&host);
    let geometry = CameraGeometry::full_frame(512, 512, 1);

    let err = client.acquire(&geometry).unwrap_err();
    match err {
        ClientError::AcquisitionFailed {
            function,
            geometry: g,
            reason,
        } => {
            assert_eq!(function, FunctionCode::GetAcquiredImage);
            assert_eq!(g, geometry);
            assert_eq!(reason, AcquisitionFailure::Dimensions { width: 256, height: 256 });
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!client.is_connected());
    assert!(matches!(client.dm_version(), Err(ClientError::NotConnected)));

    client.reconnect().unwrap();
    assert_eq!(client.dm_version().unwrap(), 40300);
}

/// A refused acquisition sends no pixels; the connection stays usable.
#[test]
fn test_negative_status_keeps_connection() {
    let host = sim(SimOptions::default().with_image_status(-3));
    let mut client = connect(&host);

    let err = client.acquire(&CameraGeometry::full_frame(128, 128, 1)).unwrap_err();
    assert!(
        matches!(
            err,
            ClientError::AcquisitionFailed {
                reason: AcquisitionFailure::Status(-3),
                ..
            }
        ),
        "unexpected error: {err}"
    );
    assert!(!err.is_transport());
    assert!(client.is_connected());
    assert_eq!(client.dm_version().unwrap(), 40300);
}

/// The host closes the stream partway through the pixels.
#[test]
fn test_truncated_image() {
    let host = sim(SimOptions::default().with_truncation(50_000));
    let mut client = connect(&host);

    let err = client.acquire(&CameraGeometry::full_frame(256, 256, 1)).unwrap_err();
    match err {
        ClientError::IncompleteImage { expected, received } => {
            assert_eq!(expected, 256 * 256 * 2);
            assert_eq!(received, 50_000);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!client.is_connected());
}

#[test]
fn test_dark_reference_request() {
    let host = sim(SimOptions::default().with_chunks(2));
    let mut client = connect(&host);
    let geometry = CameraGeometry::full_frame(200, 100, 1).with_shutter_delay_ms(25);

    let image = client.dark_reference(&geometry).unwrap();
    assert_eq!(image.shape(), (100, 200));

    let request = host.stats().last_request.unwrap();
    assert_eq!(request.head(), FunctionCode::GetDarkReference.code());
    // Neither the processing flag nor the shutter delay is sent.
    assert_eq!(request.long_args.len(), 12);
    assert_eq!(request.long(4), Some(1), "binning follows the dimensions");
    assert!(!request.long_args.contains(&25));
}

#[test]
fn test_acquisition_with_wide_longs() {
    let layout = WireLayout::new(ByteOrder::Little, LongWidth::Eight);
    let host = sim(SimOptions::default().with_layout(layout).with_chunks(3));
    let mut client = connect(&host);

    let acquisition = client
        .acquire_detailed(&CameraGeometry::full_frame(300, 200, 1))
        .unwrap();
    assert_eq!(acquisition.image.shape(), (200, 300));
    assert_eq!(acquisition.image.pixels(), pattern(60_000).as_slice());
    assert_eq!(acquisition.stats.handshakes, 2);
}

/// Invalid geometry never reaches the host.
#[test]
fn test_invalid_geometry_is_not_sent() {
    let host = sim(SimOptions::default());
    let mut client = connect(&host);

    let mut geometry = CameraGeometry::full_frame(64, 64, 1);
    geometry.binning = 0;
    assert!(matches!(client.acquire(&geometry), Err(ClientError::Geometry(_))));
    assert!(client.is_connected());
    assert_eq!(client.dm_version().unwrap(), 40300);
    assert_eq!(host.stats().count(FunctionCode::GetAcquiredImage), 0);
}
