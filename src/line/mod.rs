//! The columnar streaming primitive (C1/C2) every other component builds
//! on: [`LineBuffer`] is a time-relative-indexed sequence of `f64`,
//! [`Lines`] is a named, shared-by-reference collection of them.

pub mod buffer;
pub mod lines;

pub use buffer::{Discipline, LineBuffer};
pub use lines::{LineHandle, Lines};
