//! Demo driver: runs the engine against a simulated reader and logs the
//! event stream.
//!
//! Useful for watching the protocol flow without hardware:
//!
//! ```text
//! RUST_LOG=taglink=debug cargo run -p taglink-cli
//! ```

use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use tracing::info;
use tracing_subscriber::EnvFilter;

use taglink_core::{Epc, ReaderMode, constants::STATUS_OK};
use taglink_engine::{EngineConfig, EngineEvent, EngineHandle};
use taglink_protocol::{
    EventCode, Frame, FrameAssembler, FrameBuilder, encode_compact_record, status_response,
};
use taglink_transport::{MockTransport, MockTransportHandle};

/// Simulated reader: acknowledge every command, and stream tag reports
/// while inventory scanning is running.
async fn simulate_reader(mut link: MockTransportHandle) {
    let mut assembler = FrameAssembler::new();
    let mut scanning = false;
    let mut report_seq: u8 = 0;

    let tags = [
        (Epc::new("E28011700000020F1A2B3C4D").unwrap(), -47i8),
        (Epc::new("300833B2DDD9014000000000").unwrap(), -63i8),
    ];

    loop {
        if scanning {
            report_seq = report_seq.wrapping_add(1);
            let mut payload = vec![0x01];
            for (epc, rssi) in &tags {
                payload.extend_from_slice(&encode_compact_record(epc, *rssi));
            }
            let report = FrameBuilder::notification(EventCode::TagReport)
                .sequence(report_seq)
                .payload(payload)
                .build()
                .expect("report payload fits a frame");
            link.inject(&report.encode()).await;
            sleep(Duration::from_millis(120)).await;
        }

        let sent = if scanning {
            match tokio::time::timeout(Duration::from_millis(10), link.next_sent()).await {
                Ok(sent) => sent,
                Err(_) => continue,
            }
        } else {
            link.next_sent().await
        };

        let Some(bytes) = sent else { return };
        for result in assembler.ingest(&bytes) {
            let Ok(frame) = result else { continue };
            let Ok(code) = EventCode::from_u16(frame.event_code) else {
                continue;
            };
            match code {
                EventCode::StartInventory => scanning = true,
                EventCode::StopInventory | EventCode::SetIdle => scanning = false,
                _ => {}
            }
            let response: Frame = status_response(code, frame.reserve, STATUS_OK);
            link.inject(&response.encode()).await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let (transport, inbound, link) = MockTransport::new();
    tokio::spawn(simulate_reader(link));

    let (handle, mut events) = EngineHandle::spawn(transport, inbound, EngineConfig::default());

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                EngineEvent::TagRead { tags, .. } => {
                    for tag in tags {
                        info!(epc = %tag.epc, rssi = tag.rssi_dbm, "tag read");
                    }
                }
                EngineEvent::BatteryLevel { percent } => info!(percent, "battery"),
                other => info!(?other, "event"),
            }
        }
    });

    info!("connecting to simulated reader");
    handle.connect().await?;
    handle.set_mode(ReaderMode::Inventory, None).await?;
    handle.start_scanning().await?;

    info!("scanning for two seconds");
    sleep(Duration::from_secs(2)).await;

    handle.stop_scanning().await?;
    handle.disconnect().await?;
    handle.shutdown().await;
    printer.abort();

    info!("done");
    Ok(())
}
