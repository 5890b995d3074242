//! # cascade-core
//!
//! Engine for detecting structure that survives encryption: a packed bit
//! field, a parallel SIMD-dispatched cellular-automaton transform, and the
//! numerics (`erf`, `erfc`, regularized incomplete gamma) that back the
//! statistical battery in `cascade-nist`.
//!
//! ## Pipeline
//!
//! ```text
//! raw bytes → BitField → CaProcessor (N iterations of the CA kernel)
//!           → BitField → statistical battery (cascade-nist)
//! ```
//!
//! ## Quick start
//!
//! ```
//! use cascade_core::{BitField, CaConfig, CaProcessor, CancelToken, NullSink};
//!
//! let field = BitField::from_bytes(&[0xA5; 128]);
//! let processor = CaProcessor::new(field, CaConfig::default());
//! let transformed = processor
//!     .process(4, &CancelToken::new(), &NullSink)
//!     .unwrap();
//! assert_eq!(transformed.len(), 128 * 8);
//! ```
//!
//! The vector tier is an opaque token supplied by the front end; the engine
//! verifies it and downgrades to a compiled path when needed, so results are
//! identical on every machine (tier equivalence is part of the kernel
//! contract, not an accident).

pub mod bitfield;
pub mod ca;
pub mod cancel;
pub mod error;
pub mod processor;
pub mod progress;
pub mod simd;
pub mod special;

pub use bitfield::BitField;
pub use ca::{CaNeighborhood, CaRule, GridGeometry};
pub use cancel::CancelToken;
pub use error::{CaError, ConfigError};
pub use processor::{CA_TASK, CaConfig, CaProcessor};
pub use progress::{ConsoleSink, NullSink, ProgressSink};
pub use simd::{KernelDispatch, StepParams, VectorTier};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
