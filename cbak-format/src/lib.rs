//! cbak Format - Core primitives for contact backups
//!
//! This crate provides the building blocks shared by the streaming writer and
//! reader with no I/O dependencies. It includes:
//!
//! - Field names and array grammar tokens
//! - Text-safe blob encoding for photos
//! - Error types
//! - Size limits
//! - The hierarchical contact record model

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod constants;
pub mod error;
pub mod lenient;
pub mod limits;
pub mod record;

// Re-export commonly used types
pub use codec::{decode_blob, encode_blob};
pub use error::{CbakError, Result};
pub use limits::Limits;
pub use record::{ContactMethod, Organization, PhoneNumber, Photo, Record};
