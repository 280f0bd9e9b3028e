//! End-to-end wire flow tests: build, encode, reassemble, and decode
//! payloads the way the engine does at runtime.

use taglink_core::{Epc, constants::STATUS_OK};
use taglink_protocol::{
    EventCode, Frame, FrameAssembler, FrameBuilder, InventoryParser, ReportMode,
    encode_compact_record, encode_normal_record, status_response,
};

fn tag_report(seq: u8, payload: Vec<u8>) -> Frame {
    FrameBuilder::notification(EventCode::TagReport)
        .sequence(seq)
        .payload(payload)
        .build()
        .unwrap()
}

#[test]
fn command_response_exchange_round_trips() {
    let mut assembler = FrameAssembler::new();

    // Host side: command goes out
    let command = FrameBuilder::command(EventCode::StartInventory)
        .sequence(17)
        .build()
        .unwrap();

    // Reader side: decode the command, answer with a matching response
    let received = assembler
        .ingest(&command.encode())
        .pop()
        .unwrap()
        .unwrap();
    assert!(received.is_command());
    assert_eq!(received.reserve, 17);

    let response = status_response(EventCode::StartInventory, received.reserve, STATUS_OK);
    let answered = assembler
        .ingest(&response.encode())
        .pop()
        .unwrap()
        .unwrap();

    assert!(answered.is_response());
    assert_eq!(answered.reserve, 17);
    assert_eq!(answered.status(), Some(STATUS_OK));
}

#[test]
fn fragmented_tag_report_decodes_all_records() {
    let mut assembler = FrameAssembler::new();
    let mut parser = InventoryParser::new();

    let first = Epc::new("E28011700000020F1A2B3C4D").unwrap();
    let second = Epc::new("300833B2DDD9014000000000").unwrap();

    let mut payload = vec![0x01]; // compact discriminator
    payload.extend_from_slice(&encode_compact_record(&first, -51));
    payload.extend_from_slice(&encode_compact_record(&second, -74));

    let wire = tag_report(8, payload).encode();

    // Deliver in MTU-sized fragments, as a wireless transport would
    let mut completed = Vec::new();
    for chunk in wire.chunks(7) {
        for result in assembler.ingest(chunk) {
            completed.push(result.unwrap());
        }
    }
    assert_eq!(completed.len(), 1);

    let frame = &completed[0];
    assert_eq!(frame.event_code, EventCode::TagReport.to_u16());

    let records = parser.parse(frame.payload(), frame.reserve).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].epc, first);
    assert_eq!(records[0].rssi_dbm, -51);
    assert_eq!(records[1].epc, second);
    assert_eq!(records[1].rssi_dbm, -74);
    assert!(records.iter().all(|r| r.sequence == 8));
    assert!(records.iter().all(|r| r.mode == ReportMode::Compact));
}

#[test]
fn normal_mode_report_carries_extended_fields() {
    let mut parser = InventoryParser::new();
    let epc = Epc::new("AD001122334455").unwrap();

    let mut payload = vec![0x02]; // normal discriminator
    payload.extend_from_slice(&encode_normal_record(&epc, -39, 1, 0x0200, -415));

    let frame = tag_report(3, payload);
    let records = parser.parse(frame.payload(), frame.reserve).unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].mode, ReportMode::Normal);
    assert_eq!(records[0].antenna, Some(1));
    assert_eq!(records[0].phase, Some(0x0200));
    assert_eq!(records[0].wideband_rssi, Some(-415));
}

#[test]
fn corrupted_frame_between_valid_ones_is_isolated() {
    let mut assembler = FrameAssembler::new();

    let before = FrameBuilder::notification(EventCode::KeepAlive)
        .sequence(1)
        .build()
        .unwrap();
    let after = FrameBuilder::notification(EventCode::KeepAlive)
        .sequence(2)
        .build()
        .unwrap();

    let mut wire = before.encode().to_vec();
    let mut corrupt = after.encode().to_vec();
    // Flip the direction byte: length stays intact, CRC no longer matches
    corrupt[5] ^= 0xFF;
    wire.extend_from_slice(&corrupt);
    wire.extend_from_slice(&after.encode());

    let results = assembler.ingest(&wire);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().reserve, 1);
    assert!(results[1].is_err());
    assert_eq!(results[2].as_ref().unwrap().reserve, 2);
}
