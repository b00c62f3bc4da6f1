//! ironsplit: read text or sequence files as key/value tuples across parallel
//! channels and print them.
//!
//! Every channel prints its own tuples as it reads them, so lines of different
//! channels interleave. Use `--channels 1` for file order.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ironsplit::{
    Error, FileType, FnSink, MetricsCollector, OperatorContext, OutputPort, ParallelRegion,
    ReaderParams, StreamItem, StreamSchema, Tuple,
};
use std::io::{BufWriter, Stdout, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Output line format.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum OutputFormat {
    /// One JSON object per tuple.
    #[default]
    Jsonl,
    /// `key<TAB>value`, omitting attributes the schema lacks.
    Tsv,
}

/// Split-partitioned text and sequence file reader.
#[derive(Parser, Debug)]
#[command(name = "ironsplit")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input file, directory, or glob pattern (repeatable).
    #[arg(short, long = "file", required = true)]
    files: Vec<String>,

    /// Input format: text or sequence.
    #[arg(short = 't', long, default_value = "text")]
    file_type: FileType,

    /// Configuration resource file (repeatable).
    #[arg(short = 'c', long)]
    config_resource: Vec<String>,

    /// Directory relative configuration resources are resolved against.
    #[arg(long)]
    app_dir: Option<PathBuf>,

    /// Set a configuration property, `name=value` (repeatable).
    #[arg(short = 'D', long = "define", value_parser = parse_define)]
    defines: Vec<(String, String)>,

    /// Number of parallel channels [default: number of CPUs].
    #[arg(short = 'n', long)]
    channels: Option<usize>,

    /// Output schema, e.g. "int64 key, rstring value".
    #[arg(short, long, default_value = "int64 key, rstring value")]
    schema: String,

    /// Output line format.
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,

    /// Print a line for every window and final marker.
    #[arg(long)]
    show_punctuation: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Print run metrics to stderr when done.
    #[arg(long)]
    metrics: bool,

    /// Also save run metrics as JSON to this path.
    #[arg(long)]
    metrics_file: Option<String>,
}

fn parse_define(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected name=value, got `{s}`"))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let schema = StreamSchema::parse(&args.schema).context("invalid --schema")?;
    let region = match args.channels {
        Some(n) => ParallelRegion::new(n)?,
        None => ParallelRegion::with_default_width(),
    };
    info!(channels = region.width(), %schema, file_type = %args.file_type, "ironsplit starting");

    let mut params = ReaderParams::new(args.files.iter().cloned()).file_type(args.file_type);
    for resource in &args.config_resource {
        params = params.config_resource(resource.clone());
    }

    let collector = MetricsCollector::new();
    let mut ctx = OperatorContext::new("ironsplit");
    if let Some(dir) = &args.app_dir {
        ctx = ctx.application_dir(dir);
    }
    for (k, v) in &args.defines {
        ctx = ctx.set_config(k.clone(), v.clone());
    }
    if args.metrics || args.metrics_file.is_some() {
        ctx = ctx.metrics(collector.clone());
    }

    let out = Arc::new(Mutex::new(BufWriter::new(std::io::stdout())));
    let format = args.format;
    let show_punctuation = args.show_punctuation;
    region.context(ctx).run(&params, |channel| {
        let out = Arc::clone(&out);
        OutputPort::new(
            schema.clone(),
            FnSink::new(move |item| print_item(&out, channel, &item, format, show_punctuation)),
        )
    })?;

    out.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .flush()
        .context("flush stdout")?;
    debug!("all channels finished");

    if args.metrics {
        collector.print();
    }
    if let Some(path) = &args.metrics_file {
        collector.save_to_file(path)?;
    }
    Ok(())
}

fn print_item(
    out: &Mutex<BufWriter<Stdout>>,
    channel: usize,
    item: &StreamItem,
    format: OutputFormat,
    show_punctuation: bool,
) -> ironsplit::Result<()> {
    let line = match item {
        StreamItem::Tuple(t) => tuple_line(t, format),
        StreamItem::Punctuation(p) if show_punctuation => format!("# channel {channel}: {p:?}"),
        StreamItem::Punctuation(_) => return Ok(()),
    };
    let mut out = out.lock().unwrap_or_else(PoisonError::into_inner);
    writeln!(out, "{line}").map_err(|e| Error::Sink(format!("write to stdout: {e}")))
}

fn tuple_line(tuple: &Tuple, format: OutputFormat) -> String {
    match format {
        OutputFormat::Jsonl => tuple.to_json().to_string(),
        OutputFormat::Tsv => {
            let key = tuple.get_i64("key").map(|k| k.to_string());
            let value = tuple.get_str("value").map(str::to_string);
            [key, value].into_iter().flatten().collect::<Vec<_>>().join("\t")
        }
    }
}
