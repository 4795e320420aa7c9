pub mod decoder;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod gps;
pub mod header;
pub mod main;
pub mod stream;

pub use decoder::*;
pub use gps::*;
pub use header::*;
pub use main::*;
pub use stream::*;
