//! Synchronization primitives for fiber coordination

mod event;

pub use event::Event;
