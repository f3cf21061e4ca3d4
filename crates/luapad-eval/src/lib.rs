//! Buffer-resident Lua evaluator.
//!
//! A host owns one [`Scratchpad`] and feeds it text surfaces. Evaluating a
//! region compiles its text against the surface's own [`Environment`] (reads
//! fall through to the shared globals, writes stay local), captures `print`
//! output, and writes the outcome back into the surface as comment lines
//! directly after the region. Re-evaluating the same region replaces the
//! previous annotation instead of stacking a new one under it.

mod block;
mod capture;
mod config;
mod environment;
mod error;
mod evaluator;
mod render;
mod scratchpad;
mod surface;
mod transform;
mod value;

pub use block::{find_block, find_code_block, is_blank};
pub use config::{Config, DEFAULT_MAX_DEPTH};
pub use environment::{Environment, EnvironmentRegistry, SurfaceId};
pub use error::Error;
pub use evaluator::{Evaluator, FailureKind, Outcome};
pub use render::{LineRole, RenderedBlock, RenderedLine, Renderer};
pub use scratchpad::Scratchpad;
pub use surface::{LineBuffer, TextSurface};
pub use transform::{classify, rewrite, Shape};
pub use value::Value;

/// Result type for scratchpad operations.
pub type Result<T> = std::result::Result<T, Error>;
