pub mod desk;
pub mod sample;

pub use desk::{Desk, Zone};
pub use sample::Sample;
