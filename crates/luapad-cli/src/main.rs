/// Luapad CLI: evaluate a Lua scratch file and annotate it with the results

use std::fs;
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context};
use clap::{ArgGroup, Parser};
use luapad_eval::{Config, LineBuffer, Scratchpad, SurfaceId, TextSurface};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "luapad")]
#[command(about = "Evaluate Lua scratch files and write the results back as comments")]
#[command(version)]
#[command(group(ArgGroup::new("selector").args(["line", "block", "range"])))]
struct Args {
    /// Lua scratch file
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Evaluate a single line (zero-based)
    #[arg(long, value_name = "N")]
    line: Option<usize>,

    /// Evaluate the paragraph of code around a line (zero-based)
    #[arg(long, value_name = "N")]
    block: Option<usize>,

    /// Evaluate an inclusive line range, e.g. 3:7 (zero-based)
    #[arg(long, value_name = "START:END", value_parser = parse_range)]
    range: Option<(usize, usize)>,

    /// Write the annotated text back to FILE instead of stdout
    #[arg(short, long)]
    in_place: bool,

    /// JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_range(value: &str) -> Result<(usize, usize), String> {
    let (start, end) = value
        .split_once(':')
        .ok_or_else(|| format!("expected START:END, got '{}'", value))?;
    let start = start.trim().parse::<usize>().map_err(|e| e.to_string())?;
    let end = end.trim().parse::<usize>().map_err(|e| e.to_string())?;
    if end < start {
        return Err(format!("range end {} is before start {}", end, start));
    }
    Ok((start, end))
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };

    let source = fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let mut text = LineBuffer::from_text(&source);
    let surface = SurfaceId::new(args.input.display().to_string());

    let mut pad = Scratchpad::new(config)?;
    let inserted = if let Some(line) = args.line {
        pad.evaluate_line(&surface, &mut text, line)?
    } else if let Some(line) = args.block {
        pad.evaluate_block(&surface, &mut text, line)?
    } else if let Some((start, end)) = args.range {
        if start >= text.line_count() {
            bail!("range start {} is past the end of {}", start, args.input.display());
        }
        pad.evaluate_region(&surface, &mut text, start, end)?
    } else {
        pad.evaluate_all(&surface, &mut text)?
    };
    tracing::debug!(inserted, "evaluation finished");

    if args.in_place {
        fs::write(&args.input, text.to_text())
            .with_context(|| format!("writing {}", args.input.display()))?;
    } else {
        print!("{}", text);
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args) {
        eprintln!("luapad: {:#}", e);
        process::exit(1);
    }
}
