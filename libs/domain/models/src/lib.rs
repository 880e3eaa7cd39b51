//! Shared DTOs and domain entities for the SNEWS coincidence engine:
//! inbound/outbound wire types, cache entities, and the detector registry.

pub mod alert;
pub mod cache;
pub mod config;
pub mod message;
pub mod registry;

pub use alert::{Alert, AlertMember, AlertType, OutboundAlert};
pub use cache::{CacheEntry, CacheSnapshot, SubGroup, SubGroupStateTag};
pub use config::{ConfigError, EngineConfig};
pub use message::{
    AdminCommand, DetectorStatus, HeartbeatMessage, InboundMessage, MessageKind, Observation,
    RetractionMessage,
};
