pub mod dto;
pub mod session;
pub mod stream;

pub use session::{ChatReply, ChatSession, ReplyOutcome, EMPTY_REPLY, FAILED_REPLY};
pub use stream::StreamEvent;
