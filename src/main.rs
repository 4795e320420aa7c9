//! CLI binary for the ULG to KML converter

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use glob::glob;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;
use ulg2kml::{unique_output_path, ConvertOptions, Converter, LauncherConfig};

fn build_command() -> Command {
    Command::new("ulg2kml")
        .version(long_version())
        .about("Convert PX4 ULog (.ulg) flight logs to KML tracks. Tries ulog2kml, then python -m pyulog.ulog2kml, then the built-in converter.")
        .arg(
            Arg::new("files")
                .help("ULog files to convert (.ulg, case-insensitive, supports globbing)")
                .required(true)
                .num_args(1..)
                .index(1),
        )
        .arg(
            Arg::new("output-dir")
                .long("output-dir")
                .help("Directory for KML output files (default: same as input file)")
                .value_name("DIR"),
        )
        .arg(
            Arg::new("overwrite")
                .long("overwrite")
                .help("Overwrite existing .kml files instead of picking a new name (name-1.kml, ...)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("downsample")
                .long("downsample")
                .help("Keep every N-th position fix in the built-in converter")
                .value_name("N")
                .value_parser(value_parser!(usize))
                .default_value("1"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .help("Seconds to wait for the external converter before falling back")
                .value_name("SECS")
                .value_parser(value_parser!(u64))
                .default_value("30"),
        )
        .arg(
            Arg::new("converter")
                .long("converter")
                .help("External converter program, called as: PROGRAM <input> -o <output>")
                .value_name("PROGRAM")
                .default_value("ulog2kml"),
        )
        .arg(
            Arg::new("converter-arg")
                .long("converter-arg")
                .help("Argument for the external converter, repeatable; replaces '{input} -o {output}'")
                .value_name("ARG")
                .action(ArgAction::Append)
                .allow_hyphen_values(true),
        )
        .arg(
            Arg::new("python")
                .long("python")
                .help("Interpreter for 'python -m pyulog.ulog2kml', tried when the converter fails")
                .value_name("PROGRAM")
                .default_value("python3"),
        )
        .arg(
            Arg::new("no-python")
                .long("no-python")
                .help("Do not try 'python -m pyulog.ulog2kml'")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-external")
                .long("no-external")
                .help("Skip the external converter and use the built-in one directly")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("Launcher config file remembering the last used folders (default: ~/.px4_sim_launcher.json)")
                .value_name("FILE"),
        )
        .arg(
            Arg::new("no-save-config")
                .long("no-save-config")
                .help("Do not remember the folders used in this run")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .help("Enable debug output and detailed parsing information")
                .action(ArgAction::SetTrue),
        )
}

fn long_version() -> String {
    match option_env!("VERGEN_GIT_SHA") {
        Some(sha) if !sha.starts_with("VERGEN") => {
            format!("{} ({})", env!("CARGO_PKG_VERSION"), sha)
        }
        _ => env!("CARGO_PKG_VERSION").to_string(),
    }
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn has_ulg_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("ulg"))
        .unwrap_or(false)
}

/// Expand patterns into existing `.ulg` files
fn collect_input_paths(patterns: &[&String]) -> Vec<PathBuf> {
    let mut valid_paths = Vec::new();

    for pattern in patterns {
        let paths: Vec<PathBuf> = if pattern.contains('*') || pattern.contains('?') {
            match glob(pattern) {
                Ok(entries) => match entries.collect::<Result<Vec<_>, _>>() {
                    Ok(paths) => {
                        debug!("Glob pattern '{pattern}' matched {} files", paths.len());
                        paths
                    }
                    Err(e) => {
                        eprintln!("Error expanding glob pattern '{pattern}': {e}");
                        continue;
                    }
                },
                Err(e) => {
                    eprintln!("Invalid glob pattern '{pattern}': {e}");
                    continue;
                }
            }
        } else {
            vec![PathBuf::from(pattern.as_str())]
        };

        for path in paths {
            if !path.is_file() {
                eprintln!("Warning: File does not exist: {path:?}");
                continue;
            }
            if !has_ulg_extension(&path) {
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("none");
                eprintln!("Warning: Skipping file with unsupported extension '{ext}': {path:?}");
                continue;
            }
            valid_paths.push(path);
        }
    }

    valid_paths
}

fn convert_options(matches: &ArgMatches) -> ConvertOptions {
    let defaults = ConvertOptions::default();
    ConvertOptions {
        use_external: !matches.get_flag("no-external"),
        converter_program: matches
            .get_one::<String>("converter")
            .cloned()
            .unwrap_or(defaults.converter_program),
        converter_args: matches
            .get_many::<String>("converter-arg")
            .map(|args| args.cloned().collect())
            .unwrap_or(defaults.converter_args),
        python_program: if matches.get_flag("no-python") {
            None
        } else {
            matches.get_one::<String>("python").cloned()
        },
        timeout: matches
            .get_one::<u64>("timeout")
            .map(|secs| Duration::from_secs(*secs))
            .unwrap_or(defaults.timeout),
        downsample: *matches.get_one::<usize>("downsample").unwrap_or(&1),
        module_args: defaults.module_args,
    }
}

fn output_path_for(input: &Path, output_dir: &Path, overwrite: bool) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("track");
    if overwrite {
        output_dir.join(format!("{stem}.kml"))
    } else {
        unique_output_path(output_dir, stem)
    }
}

fn main() -> Result<()> {
    let matches = build_command().get_matches();

    init_logging(matches.get_flag("debug"));

    let options = convert_options(&matches);
    let output_dir = matches.get_one::<String>("output-dir").map(PathBuf::from);
    let overwrite = matches.get_flag("overwrite");
    let patterns: Vec<&String> = matches
        .get_many::<String>("files")
        .map(|files| files.collect())
        .unwrap_or_default();

    let config_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .or_else(LauncherConfig::default_path);
    let mut config = match &config_path {
        Some(path) => LauncherConfig::load(path)?,
        None => LauncherConfig::default(),
    };

    let inputs = collect_input_paths(&patterns);
    if inputs.is_empty() {
        eprintln!("Error: No valid files found to process.");
        eprintln!("Supported extension: .ulg (case-insensitive)");
        eprintln!("Input patterns were: {patterns:?}");
        std::process::exit(1);
    }

    if let Some(dir) = &output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {:?}", dir))?;
    }

    let converter = Converter::from_options(&options);
    debug!("Strategies: {:?}", converter.strategy_names());

    let mut converted = 0;
    for (index, input) in inputs.iter().enumerate() {
        if index > 0 {
            println!();
        }
        let filename = input
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown");
        println!("Processing: {filename}");

        let target_dir = match &output_dir {
            Some(dir) => dir.clone(),
            None => match input.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            },
        };
        let dest = output_path_for(input, &target_dir, overwrite);

        match converter.convert(input, &dest) {
            Ok(report) => {
                let name = dest.file_name().and_then(|n| n.to_str()).unwrap_or("?");
                if report.used_fallback() {
                    for diagnostic in &report.diagnostics {
                        warn!("{diagnostic}");
                    }
                    println!("KML created (fallback): {name} ({} fixes)", report.fix_count);
                } else {
                    println!("KML created: {name} ({} fixes)", report.fix_count);
                }
                config.remember_log(input);
                config.remember_output_dir(&target_dir);
                converted += 1;
            }
            Err(failure) => {
                eprintln!("Conversion error: {failure}");
            }
        }
    }

    if converted > 0 && !matches.get_flag("no-save-config") {
        if let Some(path) = &config_path {
            if let Err(e) = config.save(path) {
                warn!("Could not remember folders: {e:#}");
            }
        }
    }

    if converted == 0 {
        eprintln!(
            "Error: No files were converted out of {} files found.",
            inputs.len()
        );
        eprintln!("Use --debug flag for more detailed error information.");
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_command_definition_is_valid() {
        build_command().debug_assert();
    }

    #[test]
    fn test_converter_options_from_flags() {
        let matches = build_command().get_matches_from([
            "ulg2kml",
            "--converter",
            "px4-ulog2kml",
            "--converter-arg",
            "--in={input}",
            "--converter-arg",
            "{output}",
            "--no-python",
            "--timeout",
            "5",
            "log.ulg",
        ]);
        let options = convert_options(&matches);
        assert_eq!(options.converter_program, "px4-ulog2kml");
        assert_eq!(options.converter_args, vec!["--in={input}", "{output}"]);
        assert_eq!(options.python_program, None);
        assert_eq!(options.timeout, Duration::from_secs(5));

        let defaults = convert_options(&build_command().get_matches_from(["ulg2kml", "log.ulg"]));
        assert_eq!(defaults, ConvertOptions::default());
    }

    #[test]
    fn test_file_extension_validation() {
        for name in ["a.ulg", "b.ULG", "c.Ulg"] {
            assert!(has_ulg_extension(Path::new(name)), "{name} should be valid");
        }
        for name in ["a.bbl", "b.kml", "c"] {
            assert!(!has_ulg_extension(Path::new(name)), "{name} should be invalid");
        }
    }

    #[test]
    fn test_output_path_respects_overwrite() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("log_7.kml"), "x").unwrap();

        let input = Path::new("/flights/log_7.ulg");
        assert_eq!(
            output_path_for(input, dir.path(), true),
            dir.path().join("log_7.kml")
        );
        assert_eq!(
            output_path_for(input, dir.path(), false),
            dir.path().join("log_7-1.kml")
        );
    }
}
