//! ULG to KML converter library
//!
//! Converts PX4 ULog (`.ulg`) flight logs into KML tracks. Conversion first
//! tries an external converter (pyulog's `ulog2kml`) and falls back to the
//! in-process pipeline when that fails, times out, or writes nothing.
//!
//! # Features
//!
//! - **`cli`** (default): Build the `ulg2kml` command-line binary (implies `json`)
//! - **`json`**: [`LauncherConfig`], the launcher's remembered folders
//! - **`serde`**: Serialize/Deserialize for the data types
//!
//! # Quick Start
//!
//! Convert a log, falling back to the built-in converter:
//! ```rust,no_run
//! use ulg2kml::{ConvertOptions, Converter};
//! use std::path::Path;
//!
//! let converter = Converter::from_options(&ConvertOptions::default());
//! match converter.convert(Path::new("flight.ulg"), Path::new("flight.kml")) {
//!     Ok(report) => println!("KML created with {} fixes", report.fix_count),
//!     Err(failure) => eprintln!("Conversion error: {}", failure),
//! }
//! ```
//!
//! Stream records and extract the track yourself:
//! ```rust,no_run
//! use ulg2kml::{export_to_kml, extract_positions, open_ulog_file, ExtractOptions, TrackStyle};
//! use std::path::Path;
//!
//! let reader = open_ulog_file(Path::new("flight.ulg")).unwrap();
//! let fixes = extract_positions(reader, &ExtractOptions::default()).unwrap();
//! export_to_kml(&fixes, Path::new("flight.kml"), &TrackStyle::named("flight")).unwrap();
//! ```
//!
//! # Public API
//!
//! ## Reading
//! - [`UlogReader`] - Lazy iterator of [`LogRecord`]s over any `Read`
//! - [`open_ulog_file`] - Open a `.ulg` file for streaming
//!
//! ## Extraction
//! - [`extract_positions`] - Build the ordered [`PositionFix`] track
//! - [`ExtractOptions`] - Topics and downsampling
//!
//! ## Export
//! - [`export_to_kml`] - Atomically write a KML document
//! - [`read_kml_coordinates`] - Read the coordinate list of a KML file
//! - [`unique_output_path`] - Pick a free `stem-N.kml` name
//!
//! ## Conversion
//! - [`Converter`] - Strategy chain with fallback
//! - [`ExternalConverter`] / [`InProcessConverter`] - Built-in strategies
//! - [`ConvertOptions`] / [`LauncherConfig`] - Configuration values

// Module declarations
pub mod config;
pub mod conversion;
pub mod error;
pub mod export;
pub mod external;
pub mod fallback;
pub mod filters;
pub mod parser;
pub mod types;

// Re-export everything from modules for convenience
pub use config::*;
pub use conversion::*;
pub use error::{ConvertError, Result};
pub use export::*;
pub use external::*;
pub use fallback::*;
pub use filters::*;
#[allow(ambiguous_glob_reexports)]
pub use parser::*;
#[allow(ambiguous_glob_reexports)]
pub use types::*;
