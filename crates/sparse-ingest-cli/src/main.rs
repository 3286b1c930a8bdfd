#![doc = include_str!("../README.md")]

mod config;
mod lexicon;
mod telemetry;

use anyhow::Context;
use clap::Parser;
use config::{CliArgs, IngestConfig};
use lexicon::LexicalFactory;
use sparse_ingest::Pipeline;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use telemetry::init_telemetry;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = IngestConfig::try_from(args)?;

    init_telemetry()?;
    log_startup_info(&config);

    match &config.query {
        Some(query) => run_query(&config, query),
        None => run_ingest(&config),
    }
}

fn log_startup_info(config: &IngestConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting sparse-ingest with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting sparse-ingest with batch size {} and {} workers",
            config.encoding.batch_size,
            config.encoding.workers()
        );
    }
}

fn read_documents(input: Option<&Path>) -> anyhow::Result<Vec<String>> {
    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };

    let mut documents = Vec::new();
    for line in reader.lines() {
        let line = line.context("reading documents")?;
        if !line.trim().is_empty() {
            documents.push(line);
        }
    }
    Ok(documents)
}

fn factory(config: &IngestConfig, documents: &[String]) -> LexicalFactory {
    match &config.vocabulary {
        Some(path) => LexicalFactory::from_file(path.clone()),
        None => LexicalFactory::from_corpus(documents),
    }
}

fn open_output(output: Option<&Path>) -> anyhow::Result<Box<dyn Write>> {
    Ok(match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

fn run_ingest(config: &IngestConfig) -> anyhow::Result<()> {
    let documents = read_documents(config.input.as_deref())?;
    tracing::info!("Read {} documents", documents.len());

    let pipeline = Pipeline::new(factory(config, &documents), config.encoding.clone());
    let mut stream = pipeline.encode_streamed(documents)?;
    let mut out = open_output(config.output.as_deref())?;

    for batch in stream.by_ref() {
        let batch = batch?;
        for record in &batch.records {
            serde_json::to_writer(&mut out, record)?;
            out.write_all(b"\n")?;
        }
    }
    out.flush()?;

    if stream.fell_back() {
        tracing::warn!("Parallel encoding failed part way, finished sequentially");
    }
    tracing::info!(
        "Wrote {} records; the next run should use --id-offset {}",
        stream.emitted(),
        stream.ids().next_offset()
    );
    Ok(())
}

fn run_query(config: &IngestConfig, query: &str) -> anyhow::Result<()> {
    let documents = match (&config.vocabulary, &config.input) {
        (None, Some(_)) => read_documents(config.input.as_deref())?,
        (None, None) => anyhow::bail!("--query needs --vocabulary or an input corpus"),
        (Some(_), _) => Vec::new(),
    };

    let pipeline = Pipeline::new(factory(config, &documents), config.encoding.clone());
    let vector = pipeline.encode_query(query)?;

    let mut out = open_output(config.output.as_deref())?;
    serde_json::to_writer(&mut out, &vector)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}
