//! # portalis-shared
//!
//! Identifier types and constants shared by every portalis crate.

pub mod constants;
pub mod error;
pub mod types;

pub use error::IdError;
pub use types::{MatrixEventId, MatrixRoomId, MatrixUserId, WhatsAppId, WhatsAppMessageId};
