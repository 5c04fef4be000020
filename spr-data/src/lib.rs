//! The experimental data to fit: one SPR response curve per antibody
//! concentration, all measured on the same chip.
pub mod aligned;

pub use aligned::{AlignedData, Series};
