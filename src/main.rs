use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gcodesend::{
    init_logging, preprocess_file, Config, GcodeParser, GcodeStreamReader, ParseErrorPolicy,
    ProcessorRegistry,
};

/// Flow-controlled G-code streaming for CNC controllers
#[derive(Parser, Debug)]
#[command(name = "gcodesend")]
#[command(about = "Preprocess and inspect G-code stream files", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a G-code program through the processor pipeline into a stream file
    Preprocess {
        /// G-code program to read
        input: PathBuf,
        /// Stream file to write
        output: PathBuf,
        /// Resume the program at this source line
        #[arg(long, value_name = "LINE")]
        run_from: Option<u32>,
        /// Configuration file (JSON or TOML)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Stop at the first malformed line
        #[arg(long)]
        abort_on_error: bool,
    },

    /// Print the header and records of a stream file
    Inspect {
        /// Stream file to read
        stream: PathBuf,
        /// Print at most this many records
        #[arg(short = 'n', long)]
        limit: Option<u64>,
    },

    /// Show configuration
    Config {
        /// Print the built-in defaults instead of the effective configuration
        #[arg(long)]
        print_default: bool,
        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Toml)]
        format: Format,
        /// Configuration file (JSON or TOML)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Json,
    Toml,
}

impl Format {
    fn name(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Toml => "toml",
        }
    }
}

fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Preprocess {
            input,
            output,
            run_from,
            config,
            abort_on_error,
        } => preprocess(&input, &output, run_from, config.as_deref(), abort_on_error),
        Commands::Inspect { stream, limit } => inspect(&stream, limit),
        Commands::Config {
            print_default,
            format,
            config,
        } => {
            let config = if print_default {
                Config::default()
            } else {
                load_config(config.as_deref())?
            };
            print!("{}", config.to_string_in(format.name())?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Config::load_or_default().context("Failed to load default config"),
    }
}

fn preprocess(
    input: &Path,
    output: &Path,
    run_from: Option<u32>,
    config: Option<&Path>,
    abort_on_error: bool,
) -> Result<()> {
    let config = load_config(config)?;
    let processors = config
        .processor_list(&ProcessorRegistry::with_builtins(), run_from)
        .context("Failed to build processor pipeline")?;

    let policy = if abort_on_error {
        ParseErrorPolicy::Abort
    } else {
        config.file_processing.parse_error_policy
    };

    let mut parser = GcodeParser::with_processors(processors);
    let stats = preprocess_file(input, output, &mut parser, policy)
        .with_context(|| format!("Failed to preprocess {}", input.display()))?;

    for error in &stats.errors {
        eprintln!("warning: {}", error);
    }
    println!(
        "{}: {} lines, {} commands, {} bytes, {} errors ({} ms)",
        output.display(),
        stats.lines_read,
        stats.commands_written,
        stats.total_command_bytes,
        stats.errors.len(),
        stats.elapsed_ms
    );
    Ok(())
}

fn inspect(stream: &Path, limit: Option<u64>) -> Result<()> {
    let reader = GcodeStreamReader::open(stream)
        .with_context(|| format!("Failed to open stream {}", stream.display()))?;

    let header = *reader.header();
    println!("format version: {}", header.format_version);
    println!("records:        {}", header.record_count);
    println!("command bytes:  {}", header.total_command_bytes);

    let limit = limit.unwrap_or(u64::MAX);
    for (index, record) in reader.enumerate() {
        if index as u64 >= limit {
            break;
        }
        let meta = record.with_context(|| format!("Corrupt record {}", index))?;
        let mut flags = Vec::new();
        if meta.is_fast_traverse {
            flags.push("rapid");
        }
        if meta.is_arc {
            flags.push("arc");
        }
        if meta.is_z_movement {
            flags.push("z");
        }
        if meta.is_rotation {
            flags.push("rotary");
        }
        if !meta.is_motion {
            flags.push("static");
        }
        println!(
            "{:>8} L{:<6} {:<32} -> {} [{}]",
            index,
            meta.line_number,
            meta.command,
            meta.end,
            flags.join(",")
        );
    }
    Ok(())
}
