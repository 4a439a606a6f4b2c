//! # Event Bus Module
//!
//! Publish/subscribe channel between the motion controller and its consumers
//! (the editor, the CLI, tests).
//!
//! ## Usage
//!
//! ```rust,ignore
//! use microcut_core::event_bus::{event_bus, AppEvent, EventCategory, EventFilter, JobEvent};
//!
//! let subscription = event_bus().subscribe(
//!     EventFilter::Categories(vec![EventCategory::Job]),
//!     |event| {
//!         if let AppEvent::Job(JobEvent::Aborted { reason }) = event {
//!             eprintln!("job aborted: {}", reason);
//!         }
//!     },
//! );
//!
//! event_bus().unsubscribe(subscription);
//! ```

mod bus;
mod events;

pub use bus::*;
pub use events::*;
