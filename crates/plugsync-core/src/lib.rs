pub mod error;
pub mod extension;
pub mod frontmatter;
pub mod graph;
pub mod hooks;
pub mod io;
pub mod manifest;
pub mod name_map;
pub mod paths;
pub mod queue;
pub mod retro;
pub mod roadmap;
pub mod sync;
pub mod usage;

pub use error::{Result, SyncError};
