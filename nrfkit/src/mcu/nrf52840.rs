//! nRF52840 backends.

mod timer;

pub use timer::{Frequency, Instance, NrfTimer};
