pub mod checksum;
pub mod timestamp;

pub use checksum::*;
pub use timestamp::*;
