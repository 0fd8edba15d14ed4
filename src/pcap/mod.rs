pub mod dump;
pub mod header;
pub mod reader;

pub use dump::PcapDump;
pub use reader::PcapReader;
