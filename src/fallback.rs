//! Conversion with fallback
//!
//! A [`Converter`] holds an ordered chain of [`ConversionStrategy`] objects.
//! The first one is the primary attempt; later ones are fallbacks that run
//! only when everything before them failed. Every strategy writes its
//! destination atomically, so a failed conversion leaves no output behind.

use crate::config::ConvertOptions;
use crate::error::{ConvertError, Result};
use crate::export::{export_to_kml, read_kml_coordinates, TrackStyle};
use crate::external::ExternalConverter;
use crate::parser::{extract_positions, open_ulog_file, ExtractOptions};
use log::{debug, info, warn};
use std::fmt;
use std::path::{Path, PathBuf};

/// One way of turning a log into a KML file
pub trait ConversionStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Convert `source` into `dest`, returning the number of fixes written
    fn attempt(&self, source: &Path, dest: &Path) -> Result<usize>;
}

/// Reader → extractor → encoder, all in this process
#[derive(Debug, Clone, Default)]
pub struct InProcessConverter {
    pub extract: ExtractOptions,
}

impl InProcessConverter {
    pub fn new(extract: ExtractOptions) -> Self {
        Self { extract }
    }
}

impl ConversionStrategy for InProcessConverter {
    fn name(&self) -> &str {
        "in-process"
    }

    fn attempt(&self, source: &Path, dest: &Path) -> Result<usize> {
        let reader = open_ulog_file(source)?;
        let fixes = extract_positions(reader, &self.extract)?;
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Flight track".to_string());
        export_to_kml(&fixes, dest, &TrackStyle::named(name))
    }
}

impl ConversionStrategy for ExternalConverter {
    fn name(&self) -> &str {
        &self.program
    }

    fn attempt(&self, source: &Path, dest: &Path) -> Result<usize> {
        // The tool writes into a scratch file that only replaces `dest`
        // once it is known to be usable.
        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let scratch = tempfile::Builder::new()
            .prefix(".ulg2kml-ext-")
            .suffix(".kml")
            .tempfile_in(parent)
            .map_err(|e| ConvertError::write(dest, e))?;

        let output = self.run(source, scratch.path())?;
        let diagnostic = output.diagnostic();
        let detail = if diagnostic.is_empty() {
            String::new()
        } else {
            format!(": {}", diagnostic)
        };

        if !output.status.success() {
            return Err(ConvertError::ExternalTool(format!(
                "'{}' exited with {}{}",
                self.program, output.status, detail
            )));
        }

        let written = std::fs::metadata(scratch.path())
            .map(|m| m.len())
            .unwrap_or(0);
        if written == 0 {
            return Err(ConvertError::ExternalTool(format!(
                "'{}' reported success but wrote no output{}",
                self.program, detail
            )));
        }

        let fix_count = match read_kml_coordinates(scratch.path()) {
            Ok(coordinates) if !coordinates.is_empty() => coordinates.len(),
            Ok(_) => {
                return Err(ConvertError::ExternalTool(format!(
                    "'{}' wrote a document without coordinates",
                    self.program
                )))
            }
            Err(e) => {
                return Err(ConvertError::ExternalTool(format!(
                    "'{}' wrote unreadable output: {}",
                    self.program, e
                )))
            }
        };

        scratch
            .persist(dest)
            .map_err(|e| ConvertError::write(dest, e.error))?;
        Ok(fix_count)
    }
}

/// Position of a strategy in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Primary,
    Fallback,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Primary => write!(f, "primary"),
            Stage::Fallback => write!(f, "fallback"),
        }
    }
}

/// Why a strategy did not produce output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub strategy: String,
    pub stage: Stage,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.strategy, self.stage, self.message)
    }
}

/// Successful conversion
#[derive(Debug)]
pub struct ConversionReport {
    pub output: PathBuf,
    pub fix_count: usize,
    /// Name of the strategy that produced the output
    pub strategy: String,
    pub stage: Stage,
    /// Failures of earlier strategies, kept for observability
    pub diagnostics: Vec<Diagnostic>,
}

impl ConversionReport {
    pub fn used_fallback(&self) -> bool {
        self.stage == Stage::Fallback
    }
}

/// Failed conversion: the last error plus every attempt's diagnostic
#[derive(Debug)]
pub struct ConversionFailure {
    pub error: ConvertError,
    pub diagnostics: Vec<Diagnostic>,
}

impl fmt::Display for ConversionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.diagnostics.is_empty() {
            return write!(f, "{}", self.error);
        }
        let parts: Vec<String> = self.diagnostics.iter().map(|d| d.to_string()).collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ConversionFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

pub type ConversionResult = std::result::Result<ConversionReport, ConversionFailure>;

/// Ordered chain of conversion strategies
pub struct Converter {
    strategies: Vec<Box<dyn ConversionStrategy>>,
}

impl Converter {
    pub fn new(strategies: Vec<Box<dyn ConversionStrategy>>) -> Self {
        Self { strategies }
    }

    /// External tool, then `python -m pyulog.ulog2kml` (unless disabled),
    /// then the in-process pipeline
    pub fn from_options(options: &ConvertOptions) -> Self {
        let mut strategies: Vec<Box<dyn ConversionStrategy>> = Vec::new();
        if options.use_external {
            strategies.push(Box::new(
                ExternalConverter::new(&options.converter_program, options.converter_args.clone())
                    .with_timeout(options.timeout),
            ));
            if let Some(python) = &options.python_program {
                strategies.push(Box::new(
                    ExternalConverter::new(python, options.module_args.clone())
                        .with_timeout(options.timeout),
                ));
            }
        }
        strategies.push(Box::new(InProcessConverter::new(ExtractOptions {
            downsample: options.downsample,
            ..ExtractOptions::default()
        })));
        Self::new(strategies)
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Convert `source` into a KML document at `dest`
    pub fn convert(&self, source: &Path, dest: &Path) -> ConversionResult {
        if let Err(error) = check_source(source) {
            return Err(ConversionFailure {
                error,
                diagnostics: Vec::new(),
            });
        }

        let mut diagnostics = Vec::new();
        let mut last_error = None;

        for (index, strategy) in self.strategies.iter().enumerate() {
            let stage = if index == 0 {
                Stage::Primary
            } else {
                Stage::Fallback
            };
            debug!("{} stage: trying {} on {:?}", stage, strategy.name(), source);

            match strategy.attempt(source, dest) {
                Ok(fix_count) => {
                    info!(
                        "Converted {:?} -> {:?} with {} ({} fixes)",
                        source,
                        dest,
                        strategy.name(),
                        fix_count
                    );
                    return Ok(ConversionReport {
                        output: dest.to_path_buf(),
                        fix_count,
                        strategy: strategy.name().to_string(),
                        stage,
                        diagnostics,
                    });
                }
                Err(error) => {
                    match self.strategies.get(index + 1) {
                        Some(next) => warn!(
                            "{} failed ({}), falling back to {}",
                            strategy.name(),
                            error,
                            next.name()
                        ),
                        None => warn!("{} failed: {}", strategy.name(), error),
                    }
                    diagnostics.push(Diagnostic {
                        strategy: strategy.name().to_string(),
                        stage,
                        message: error.to_string(),
                    });
                    last_error = Some(error);
                }
            }
        }

        Err(ConversionFailure {
            error: last_error.unwrap_or_else(|| {
                ConvertError::ExternalTool("no conversion strategy configured".into())
            }),
            diagnostics,
        })
    }
}

impl Default for Converter {
    fn default() -> Self {
        Self::from_options(&ConvertOptions::default())
    }
}

fn check_source(source: &Path) -> Result<()> {
    let metadata = std::fs::metadata(source).map_err(|e| ConvertError::Read {
        path: source.to_path_buf(),
        source: e,
    })?;
    if !metadata.is_file() {
        return Err(ConvertError::Read {
            path: source.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
        });
    }
    Ok(())
}
