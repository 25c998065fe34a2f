//! Text-to-image generation against a hosted inference endpoint.
//!
//! [`GenerationClient`] owns the request lifecycle: it posts the prompt and
//! parameters, streams the binary response while reporting progress, and
//! resolves to a [`GenerationOutcome`]. At most one generation is tracked at a
//! time; [`GenerationClient::cancel`] aborts it cooperatively.

mod client;
pub mod config;
pub mod error;
pub mod image;
pub mod progress;
mod search;
pub mod transport;

pub use client::{CancelHandle, GenerationClient, GenerationOutcome, GenerationTicket, ProgressFn};
pub use config::{ConcurrencyPolicy, EngineConfig};
pub use error::{GenerationError, TransportError};
pub use image::ImageHandle;
