pub mod builder;
pub mod codec;
pub mod events;
pub mod frame;
pub mod framer;
pub mod inventory;

pub use builder::{FrameBuilder, status_response};
pub use codec::ReaderCodec;
pub use events::{EVENT_REGISTRY, EventCode, EventDescriptor, PayloadKind};
pub use frame::{Frame, crc16};
pub use framer::FrameAssembler;
pub use inventory::{
    BufferHealth, InventoryParser, ReportMode, TagRecord, encode_compact_record,
    encode_normal_record,
};
