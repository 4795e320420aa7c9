pub mod format;
pub mod header;
pub mod position;
pub mod record;

pub use format::*;
pub use header::*;
pub use position::*;
pub use record::*;
