pub mod geodesy;
pub mod krovak;
pub mod local;
pub mod precision;
pub mod vec;

pub use geodesy::*;
pub use krovak::*;
pub use local::*;
pub use precision::*;
pub use vec::*;
