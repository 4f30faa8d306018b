// src/lib.rs
//
// Library entry point for Rust, FFI (iOS/Swift) and WebAssembly consumers.

pub mod address;
pub mod automation;
pub mod clock;
pub mod config;
pub mod distributor;
pub mod event;
pub mod event_buffer;
pub mod location;
pub mod meter;
pub mod node_factory;
pub mod nodes;
pub mod parameter;
pub mod parse;
pub mod playable;
pub mod polyphonic;
pub mod scheduler;
pub mod timer;
pub mod transport;
pub mod voice;
pub mod voice_allocator;

#[cfg(feature = "ios")]
pub mod ffi;

#[cfg(feature = "web")]
pub mod wasm;

#[cfg(test)]
mod test;

// Re-export key types for Rust consumers
pub use address::{Address, AddressError, CurveType, Name};
pub use automation::{AutomatedParam, AutomationList, Automations, ParamId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use distributor::{Distributor, EventSink, LocalTarget};
pub use event::Event;
pub use event_buffer::{BufferError, EventBuffer};
pub use node_factory::{NodeRegistry, RegistryError, Settings};
pub use nodes::register_standard_nodes;
pub use parse::{ParseError, parse_event, parse_events};
pub use playable::{Playable, PlayableError, PlaybackStatus};
pub use scheduler::Scheduler;
pub use transport::Transport;
