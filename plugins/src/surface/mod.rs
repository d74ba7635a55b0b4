pub mod channel;
pub mod jsonl;

pub use channel::ChannelSurface;
pub use jsonl::{event_line, start_jsonl_writer, JsonlSurface, JsonlWriter};
