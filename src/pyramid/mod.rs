//! Per-level pyramid construction from a [`crate::slide::SlideSource`].

mod assembler;

pub use assembler::{PyramidAssembler, Pyramids};
