use dmlink_client::ClientError;
use dmlink_core::wire::{
    decode, encode, pack_str, unpack_str, ByteOrder, LongWidth, WireError, MAX_MESSAGE_SIZE,
};
use dmlink_core::{FunctionCode, Message, WireLayout};
use dmlink_sim::SimOptions;

use crate::*;

/// A script request reaches the host byte for byte.
#[test]
fn test_script_text_survives_the_wire() {
    let host = sim(SimOptions::default());
    let mut client = connect(&host);

    let reply = client.execute_script("Exit(1.0)").unwrap();
    assert_eq!(reply.status, 0);
    assert_eq!(reply.value, 1.0);

    let stats = host.stats();
    assert_eq!(stats.scripts, vec!["Exit(1.0)".to_string()]);
    let request = stats.last_request.expect("host should record the request");
    assert_eq!(request.head(), FunctionCode::ExecuteScript.code());
    // "Exit(1.0)" plus its terminator pads to 12 bytes, three 4-byte longs.
    assert_eq!(request.long(1), Some(3));
    assert_eq!(request.bool(0), Some(false));
}

#[test]
fn test_wide_longs_layout() {
    let layout = WireLayout::new(ByteOrder::Little, LongWidth::Eight);
    let host = sim(SimOptions::default().with_layout(layout));
    let mut client = connect(&host);

    assert_eq!(client.dm_version().unwrap(), 40300);
    assert_eq!(client.execute_for_double("Exit(2.5)").unwrap(), 2.5);
    let request = host.stats().last_request.unwrap();
    // 10 bytes pad to 16, two 8-byte longs.
    assert_eq!(request.long(1), Some(2));
}

/// An oversized request fails before anything is written, and the
/// connection stays usable.
#[test]
fn test_oversized_script_is_refused_locally() {
    let host = sim(SimOptions::default());
    let mut client = connect(&host);

    let script = format!("Exit({})", "1".repeat(MAX_MESSAGE_SIZE));
    let err = client.execute_script(&script).unwrap_err();
    assert!(
        matches!(err, ClientError::Wire(WireError::MessageTooLarge { .. })),
        "unexpected error: {err}"
    );
    assert!(client.is_connected());

    assert_eq!(client.plugin_version().unwrap(), 107);
    assert_eq!(host.stats().count(FunctionCode::ExecuteScript), 0);
}

/// The largest script that fits one record is accepted.
#[test]
fn test_script_at_size_limit() {
    let host = sim(SimOptions::default());
    let mut client = connect(&host);

    // Header, code, length and the select flag take 16 bytes; the terminator one more.
    let room = MAX_MESSAGE_SIZE - 16 - 1;
    let script = format!("Exit(7){}", " ".repeat(room - "Exit(7)".len()));
    assert_eq!(client.execute_for_long(&script).unwrap(), 7);
    assert_eq!(host.stats().scripts[0].len(), room);
}

#[test]
fn test_round_trip_in_every_layout() {
    let messages = [
        Message::call(FunctionCode::GetDMVersion),
        Message::call(FunctionCode::SetReadMode).longs([3]).doubles([0.25]),
        Message::call(FunctionCode::InsertCamera).longs([1]).bools([true]),
        Message::call(FunctionCode::SetK2Parameters)
            .longs([-2, 6])
            .bools([true, false, true])
            .doubles([1.0, f64::MIN_POSITIVE])
            .trailing(vec![0x6f63_6363, 0x7272]),
    ];
    for byte_order in [ByteOrder::Little, ByteOrder::Native] {
        for long_width in [LongWidth::Four, LongWidth::Eight] {
            let layout = WireLayout::new(byte_order, long_width);
            for m in &messages {
                let bytes = encode(m, layout).unwrap();
                assert_eq!(bytes.len(), m.shape().byte_len(layout));
                assert_eq!(&decode(&bytes, m.shape(), layout).unwrap(), m, "{layout:?}");
            }
        }
    }
}

#[test]
fn test_script_string_packing() {
    let layout = WireLayout::default();
    let packed = pack_str("Exit(1.0)", layout);
    assert_eq!(packed.len(), 3);
    let bytes = encode(&Message::default().trailing(packed.clone()), layout).unwrap();
    assert_eq!(&bytes[bytes.len() - 12..], b"Exit(1.0)\0\0\0");
    assert_eq!(unpack_str(&packed, layout), "Exit(1.0)");
}
