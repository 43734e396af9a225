//! ad_insertion: session controller for inserting ads into linear playback.
//!
//! The controller sequences three timelines: engine events from a
//! `PlaybackBridge`, directives from the ad-decision session, and its own
//! ad-timeout and progress-sampler timers. Hosts usually drive it through the
//! session runtime, which serialises all of that onto one thread.

pub mod bridge;
pub mod config;
pub mod controller;
pub mod error;
pub mod mock;
pub mod protocol;
pub mod rendition;
pub mod report;
pub mod rodio_bridge;
pub mod runtime;
pub mod scripted;
pub mod timer;
pub mod video_item;

pub use controller::{AdInsertionSessionController, PlaybackPhase};
pub use error::ControllerError;
