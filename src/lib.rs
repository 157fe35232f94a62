pub mod access;
pub mod blockgroup;
pub mod blocks;
pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod generator;
pub mod model;
pub mod network;
pub mod project;
pub mod variables;

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

pub use error::GenerateError;

use config::load_config;
use generator::{place_all_with_progress, synthesize_all, BlockArtifact};
use project::{DirectoryLibrary, DirectoryProject};

const DEFAULT_LIBRARY_DIR: &str = "libraries";

pub fn run_cli(args: &cli::Args) -> Result<()> {
    let total_stages = 3
        + usize::from(args.emit_xml.is_some())
        + usize::from(args.output.is_some());
    let progress = CliProgress::new("Generate", total_stages);
    let mut stage = 0usize;

    stage += 1;
    progress.emit(stage, "Resolving input path");
    let input = canonicalize_file(&args.input)?;

    stage += 1;
    progress.emit(stage, "Loading configuration");
    let config = load_config(&input)?;
    let blocks = config.select(&args.blocks)?;

    stage += 1;
    progress.emit(stage, "Synthesizing block documents");
    let mut artifacts = Vec::with_capacity(blocks.len());
    for (block, artifact) in blocks.iter().zip(synthesize_all(&blocks)) {
        artifacts.push(artifact.with_context(|| format!("Failed to generate '{}'.", block.name))?);
    }

    if let Some(dir) = &args.emit_xml {
        stage += 1;
        progress.emit(stage, "Writing block documents");
        let documents = artifacts.iter().filter_map(|artifact| match artifact {
            BlockArtifact::Document(document) => Some(document),
            _ => None,
        });
        for document in documents {
            let path = dir.join(format!("{}.xml", document::sanitize_file_stem(document.name())));
            if !config.overwrite && path.exists() {
                bail!("Refusing to overwrite '{}'.", path.display());
            }
            document
                .write_to(&path, args.pretty)
                .with_context(|| format!("Failed to write '{}'.", path.display()))?;
        }
    }

    if let Some(output) = &args.output {
        stage += 1;
        progress.emit(stage, "Placing blocks");
        let mut session = DirectoryProject::open(output)?;
        let library_root = args
            .library_root
            .clone()
            .unwrap_or_else(|| default_library_root(&input));
        let catalog = DirectoryLibrary::new(library_root);
        let mut place_cb = |step: usize, total: usize, label: &str| {
            progress.emit_with_total(step, total, label);
        };
        let placed = place_all_with_progress(
            &mut session,
            &catalog,
            &blocks,
            &artifacts,
            Some(&mut place_cb),
        )?;
        info!(count = placed.len(), project = %output.display(), "placed blocks");
    }

    Ok(())
}

fn default_library_root(input: &Path) -> PathBuf {
    input
        .parent()
        .unwrap_or(input)
        .join(DEFAULT_LIBRARY_DIR)
}

pub fn canonicalize_file(path: &Path) -> Result<PathBuf> {
    if !path.exists() || !path.is_file() {
        return Err(anyhow::anyhow!("Input file not found: '{}'.", path.display()));
    }
    Ok(path.canonicalize()?)
}

struct CliProgress {
    prefix: &'static str,
    total: usize,
}

impl CliProgress {
    fn new(prefix: &'static str, total: usize) -> Self {
        Self {
            prefix,
            total: total.max(1),
        }
    }

    fn emit(&self, step: usize, label: &str) {
        self.emit_with_total(step, self.total, label);
    }

    fn emit_with_total(&self, step: usize, total: usize, label: &str) {
        let total = total.max(1);
        let step = step.clamp(1, total);
        let bar = render_progress_bar(step, total, 14);
        eprintln!(
            "[{}] {}... ({}/{}) {}",
            self.prefix, label, step, total, bar
        );
    }
}

fn render_progress_bar(step: usize, total: usize, width: usize) -> String {
    let width = width.max(1);
    let filled = ((step * width) + (total / 2)) / total;
    let mut bar = String::with_capacity(width + 2);
    bar.push('[');
    for i in 0..width {
        bar.push(if i < filled { '=' } else { '-' });
    }
    bar.push(']');
    bar
}
