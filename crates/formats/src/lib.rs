pub mod feature;
pub mod manifest;

pub use feature::*;
pub use manifest::*;
