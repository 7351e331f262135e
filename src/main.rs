// SPDX-License-Identifier: GPL-3.0-only

//! Command-line interface for chat2eml.
//!
//! This binary provides the `chat2eml` command for converting Adium chat
//! logs (both the legacy HTML format and the XML format) into `.eml`
//! files.

use chat2eml::config::Config;
use chat2eml::renderer::{self, RenderOptions};
use chat2eml::{html_log, xml_log};
use chrono::FixedOffset;
use lexopt::prelude::*;
use snafu::{OptionExt, ensure, prelude::*};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Where to write the rendered output.
#[derive(Clone)]
enum OutputTarget {
    /// Write each file to the specified directory.
    Directory(PathBuf),
    /// Write to stdout.
    Stdout,
}

/// Log format, detected from the file extension.
#[derive(Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Html,
    Xml,
}

struct Cli {
    input: Vec<PathBuf>,
    output: OutputTarget,
    timezone: FixedOffset,
    domain: Option<String>,
    no_background: bool,
    quiet: bool,
    dry_run: bool,
    force: bool,
}

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to parse arguments: {source}"))]
    ParseArgs { source: lexopt::Error },

    #[snafu(display("at least one input file or directory is required"))]
    NoInputFiles,

    #[snafu(display("cannot output multiple files to stdout"))]
    MultipleFilesToStdout,

    #[snafu(display("failed to create output directory: {source}"))]
    CreateOutputDir { source: std::io::Error },

    #[snafu(display("failed to read {}: {source}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("{} has no recognized log extension", path.display()))]
    UnknownFormat { path: PathBuf },

    #[snafu(display("failed to parse {}: {source}", path.display()))]
    ParseFile {
        path: PathBuf,
        source: xml_log::ParseError,
    },

    #[snafu(display("failed to render {}: {source}", path.display()))]
    RenderFile {
        path: PathBuf,
        source: renderer::RenderError,
    },

    #[snafu(display("invalid input filename: no file stem"))]
    InvalidFilename,

    #[snafu(display("failed to write {}: {source}", path.display()))]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("{failed} of {total} files failed"))]
    PartialFailure { failed: usize, total: usize },
}

fn print_help() {
    println!(
        "\
{name} {version}
Convert Adium chat logs to .eml email messages

Usage: {name} [OPTIONS] -o <OUTPUT> <INPUT>...

Arguments:
  <INPUT>...  Input log files or directories to search for logs
              (.AdiumHTMLLog, .chatlog, .xml)

Options:
  -o, --output <OUTPUT>     Output directory (or - for stdout)
      --timezone <OFFSET>   Fixed offset for logs without one, e.g. -0500
      --domain <DOMAIN>     Fallback domain for synthetic addresses
      --no-background       Strip background colors from message markup

Other options:
  -q, --quiet               Suppress progress messages
  -n, --dry-run             Show what would be processed without writing
  -f, --force               Overwrite existing output files
  -h, --help                Print help
  -V, --version             Print version",
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
    );
}

/// Parses a `±HHMM` or `±HH:MM` UTC offset.
fn parse_offset(value: &str) -> Option<FixedOffset> {
    let (sign, digits) = match value.split_at_checked(1)? {
        ("+", rest) => (1, rest),
        ("-", rest) => (-1, rest),
        _ => (1, value),
    };
    let digits = digits.replace(':', "");
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn parse_args() -> Result<Cli, lexopt::Error> {
    // Show help if no arguments provided
    if std::env::args().len() == 1 {
        print_help();
        std::process::exit(0);
    }

    let mut input = Vec::new();
    let mut output: Option<OutputTarget> = None;
    let mut timezone = Config::default().timezone;
    let mut domain = None;
    let mut no_background = false;
    let mut quiet = false;
    let mut dry_run = false;
    let mut force = false;

    let mut parser = lexopt::Parser::from_env();
    while let Some(arg) = parser.next()? {
        match arg {
            Short('o') | Long("output") => {
                let val: PathBuf = parser.value()?.parse()?;
                output = Some(if val == Path::new("-") {
                    OutputTarget::Stdout
                } else {
                    OutputTarget::Directory(val)
                });
            }
            Long("timezone") => {
                let val = parser.value()?.string()?;
                timezone = parse_offset(&val)
                    .ok_or("timezone must be a UTC offset like -0500 or +01:00")?;
            }
            Long("domain") => domain = Some(parser.value()?.string()?),
            Long("no-background") => no_background = true,
            Short('q') | Long("quiet") => quiet = true,
            Short('n') | Long("dry-run") => dry_run = true,
            Short('f') | Long("force") => force = true,
            Short('h') | Long("help") => {
                print_help();
                std::process::exit(0);
            }
            Short('V') | Long("version") => {
                println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            Value(val) => input.push(val.parse()?),
            _ => return Err(arg.unexpected()),
        }
    }

    Ok(Cli {
        input,
        output: output.ok_or("missing required option: --output")?,
        timezone,
        domain,
        no_background,
        quiet,
        dry_run,
        force,
    })
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = parse_args().context(ParseArgsSnafu)?;

    ensure!(!cli.input.is_empty(), NoInputFilesSnafu);

    // Collect all input files first
    let files = collect_input_files(&cli.input);

    match &cli.output {
        OutputTarget::Stdout => {
            ensure!(files.len() == 1, MultipleFilesToStdoutSnafu);
            process_to_stdout(&files[0], &cli)?;
        }
        OutputTarget::Directory(dir) => {
            if !cli.dry_run {
                std::fs::create_dir_all(dir).context(CreateOutputDirSnafu)?;
            }
            // One bad log must not abort the rest of the batch.
            let mut failed: usize = 0;
            for file in &files {
                if let Err(e) = process_file(file, dir, &cli) {
                    eprintln!("Error: {e}");
                    failed += 1;
                }
            }
            ensure!(
                failed == 0,
                PartialFailureSnafu {
                    failed,
                    total: files.len(),
                }
            );
        }
    }

    Ok(())
}

/// Collects all log files from the given inputs (files and directories).
///
/// A `.chatlog` input may itself be a directory bundle with the actual XML
/// document inside; the directory walk descends into it like any other.
fn collect_input_files(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            for entry in WalkDir::new(input)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .filter(|e| detect_format(e.path()).is_some())
            {
                files.push(entry.path().to_path_buf());
            }
        } else {
            files.push(input.clone());
        }
    }
    files
}

/// Maps a file extension to its log format.
fn detect_format(path: &Path) -> Option<LogFormat> {
    let ext = path.extension()?.to_str()?;
    if ext.eq_ignore_ascii_case("AdiumHTMLLog") {
        Some(LogFormat::Html)
    } else if ext.eq_ignore_ascii_case("chatlog") || ext.eq_ignore_ascii_case("xml") {
        Some(LogFormat::Xml)
    } else {
        None
    }
}

fn make_config(cli: &Cli) -> Config {
    let mut config = Config {
        timezone: cli.timezone,
        ..Config::default()
    };
    if let Some(domain) = &cli.domain {
        config.fallback_domain.clone_from(domain);
    }
    config
}

/// Parses and renders one log file into serialized message bytes.
fn convert(input: &Path, cli: &Cli) -> Result<Vec<u8>, Error> {
    let format = detect_format(input).context(UnknownFormatSnafu { path: input })?;
    let raw = std::fs::read_to_string(input).context(ReadFileSnafu { path: input })?;
    let config = make_config(cli);

    let conv = match format {
        LogFormat::Html => html_log::parse_html_log(&raw, input, &config),
        LogFormat::Xml => {
            xml_log::parse_xml_log(&raw, input, &config).context(ParseFileSnafu { path: input })?
        }
    };

    let opts = RenderOptions {
        no_background: cli.no_background,
    };
    let mut eml =
        renderer::render_eml(&conv, &opts, &config).context(RenderFileSnafu { path: input })?;
    eml.push_header(
        "X-Converted-By",
        format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
    );
    Ok(eml.to_bytes())
}

/// Processes a single file and outputs to stdout.
fn process_to_stdout(input: &Path, cli: &Cli) -> Result<(), Error> {
    if cli.dry_run {
        eprintln!("Would output {}", input.display());
        return Ok(());
    }

    let bytes = convert(input, cli)?;
    use std::io::Write;
    std::io::stdout()
        .write_all(&bytes)
        .context(WriteFileSnafu { path: "-" })?;
    Ok(())
}

/// Processes a single file and writes to the output directory.
fn process_file(input: &Path, out_dir: &Path, cli: &Cli) -> Result<(), Error> {
    let out_name = input.file_stem().context(InvalidFilenameSnafu)?;
    let out_path = out_dir.join(format!("{}.eml", out_name.to_string_lossy()));

    // Handle dry-run mode
    if cli.dry_run {
        eprintln!("Would write {}", out_path.display());
        return Ok(());
    }

    // Check if output exists and handle overwrite
    if out_path.exists() && !cli.force {
        eprintln!(
            "Skipping {} (already exists, use --force to overwrite)",
            out_path.display()
        );
        return Ok(());
    }

    let bytes = convert(input, cli)?;
    std::fs::write(&out_path, &bytes).context(WriteFileSnafu { path: &out_path })?;

    if !cli.quiet {
        eprintln!("Wrote {}", out_path.display());
    }
    Ok(())
}
