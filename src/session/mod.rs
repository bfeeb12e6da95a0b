//! # Session Module
//!
//! Everything that happens between a device frame arriving and a reply
//! leaving:
//! - **events**: Wire format of device and relay messages
//! - **state**: Per-connection state machine with single-flight admission
//! - **pipeline**: Transcribe, infer and synthesize one turn

pub mod events;
pub mod pipeline;
pub mod state;

pub use events::{InboundEvent, OutboundEvent};
pub use pipeline::Pipeline;
pub use state::{Dispatch, Session};
