pub mod graph;
pub mod hook;
pub mod queue;
pub mod retro;
pub mod roadmap;
pub mod sync;
pub mod unsync;
pub mod usage;
