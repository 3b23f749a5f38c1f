pub mod consolidate;
pub mod fuse;
pub mod memory;
pub mod search;
pub mod status;

pub use consolidate::ConsolidateCommand;
pub use fuse::FuseCommand;
pub use memory::MemoryCommand;
pub use search::SearchCommand;
pub use status::StatusCommand;
