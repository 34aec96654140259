//! msixzip - Command-line tool for MSIX/APPX packages.
//!
//! This is the main entry point for the msixzip command-line application.

mod logging;

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use glob::{MatchOptions, Pattern};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};
use walkdir::WalkDir;

use msix::prelude::*;

/// msixzip - MSIX/APPX package tool
#[derive(Parser)]
#[command(name = "msixzip")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the entries of a package
    List {
        /// Path to the package
        #[arg(short, long, env = "MSIX_PACKAGE")]
        package: PathBuf,

        /// Filter pattern (glob-style)
        #[arg(short, long)]
        filter: Option<String>,

        /// Show method, sizes and CRC
        #[arg(short, long)]
        detailed: bool,
    },

    /// Extract entries from a package
    Extract {
        /// Path to the package
        #[arg(short, long, env = "MSIX_PACKAGE")]
        package: PathBuf,

        /// Output directory
        #[arg(short, long, env = "OUTPUT_FOLDER")]
        output: PathBuf,

        /// Filter pattern (glob-style)
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Pack a directory into a package
    Pack {
        /// Directory to pack
        #[arg(short, long)]
        input: PathBuf,

        /// Package to create
        #[arg(short, long)]
        output: PathBuf,

        /// Store files matching this pattern uncompressed (repeatable)
        #[arg(short, long)]
        store: Vec<String>,

        /// Write a data descriptor after every entry
        #[arg(long)]
        force_descriptor: bool,
    },

    /// Print SHA-256 digests of the package sections and entries
    Digest {
        /// Path to the package
        #[arg(short, long, env = "MSIX_PACKAGE")]
        package: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Commands::List {
            package,
            filter,
            detailed,
        } => {
            cmd_list(&package, filter.as_deref(), detailed)?;
        }
        Commands::Extract {
            package,
            output,
            filter,
        } => {
            cmd_extract(&package, &output, filter.as_deref())?;
        }
        Commands::Pack {
            input,
            output,
            store,
            force_descriptor,
        } => {
            cmd_pack(&input, &output, &store, force_descriptor)?;
        }
        Commands::Digest { package } => {
            cmd_digest(&package, &mut io::stdout().lock())?;
        }
    }

    Ok(())
}

fn open_package(path: &Path) -> Result<ArchiveReader<File>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    ArchiveReader::open(file).with_context(|| format!("Failed to read package {}", path.display()))
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

fn compile_pattern(pattern: &str) -> Result<Pattern> {
    Pattern::new(&pattern.replace('\\', "/")).with_context(|| format!("Invalid pattern: {pattern}"))
}

/// Case-insensitive match with `\` and `/` treated alike.
fn pattern_matches(pattern: &Pattern, name: &str) -> bool {
    pattern.matches_with(&name.replace('\\', "/"), MATCH_OPTIONS)
}

fn cmd_list(package: &Path, filter: Option<&str>, detailed: bool) -> Result<()> {
    let reader = open_package(package)?;
    let filter = filter.map(compile_pattern).transpose()?;

    let mut out = io::stdout().lock();
    let mut count = 0;
    for entry in reader.entries() {
        if let Some(pattern) = &filter {
            if !pattern_matches(pattern, entry.name()) {
                continue;
            }
        }

        if detailed {
            let method = match entry.compression_method() {
                CompressionMethod::Store => "stored",
                CompressionMethod::Deflate => "deflated",
            };
            writeln!(
                out,
                "{:>12} {:>12} {:>8} {:08x} {}",
                entry.compressed_size(),
                entry.uncompressed_size(),
                method,
                entry.crc32(),
                entry.name()
            )?;
        } else {
            writeln!(out, "{}", entry.name())?;
        }
        count += 1;
    }

    info!("Total: {} entries", count);

    Ok(())
}

fn cmd_extract(package: &Path, output: &Path, filter: Option<&str>) -> Result<()> {
    info!("Opening package: {}", package.display());

    let start = Instant::now();
    let reader = open_package(package)?;
    let filter = filter.map(compile_pattern).transpose()?;

    info!("Loaded {} entries in {:?}", reader.entry_count(), start.elapsed());

    // Resolve every target first so nothing is written for a hostile package.
    let mut targets = Vec::new();
    for entry in reader.entries() {
        if let Some(pattern) = &filter {
            if !pattern_matches(pattern, entry.name()) {
                continue;
            }
        }
        let Some(relative) = entry.output_path() else {
            bail!("Refusing to extract {}: path escapes the output directory", entry.name());
        };
        targets.push((entry, output.join(relative)));
    }

    info!("Extracting {} entries...", targets.len());

    fs::create_dir_all(output)?;

    let pb = progress_bar(targets.len())?;
    let start = Instant::now();
    for (entry, path) in &targets {
        if entry.is_dir() {
            fs::create_dir_all(path)?;
            pb.inc(1);
            continue;
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut handle = reader
            .get(entry.name())?
            .with_context(|| format!("Entry vanished: {}", entry.name()))?;
        let mut file = BufWriter::new(File::create(path)?);
        io::copy(&mut handle, &mut file)
            .map_err(msix::zip::Error::from)
            .with_context(|| format!("Failed to extract {}", entry.name()))?;
        file.flush()?;

        debug!(name = entry.name(), path = %path.display(), "extracted");
        pb.inc(1);
    }

    pb.finish_with_message("Done");
    info!("Extraction completed in {:?}", start.elapsed());

    Ok(())
}

/// Package name for `path` under `root`, with `/` separators.
fn entry_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        let part = component
            .as_os_str()
            .to_str()
            .with_context(|| format!("Non UTF-8 file name: {}", path.display()))?;
        parts.push(part);
    }
    Ok(parts.join("/"))
}

fn cmd_pack(input: &Path, output: &Path, store: &[String], force_descriptor: bool) -> Result<()> {
    let store = store.iter().map(|p| compile_pattern(p)).collect::<Result<Vec<_>>>()?;

    let output_file = File::create(output).with_context(|| format!("Failed to create {}", output.display()))?;
    let output_abs = fs::canonicalize(output)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(input).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if fs::canonicalize(entry.path())? == output_abs {
            continue;
        }
        files.push((entry_name(input, entry.path())?, entry.into_path()));
    }

    info!("Packing {} files into {}", files.len(), output.display());

    let mut writer = ArchiveWriter::new(BufWriter::new(output_file));
    let pb = progress_bar(files.len())?;
    let start = Instant::now();

    for (name, path) in &files {
        let compressed = !store.iter().any(|pattern| pattern_matches(pattern, name));
        let source = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let summary = writer
            .add_entry(name, source, compressed, force_descriptor)
            .with_context(|| format!("Failed to add {name}"))?;

        debug!(
            name,
            compressed_size = summary.compressed_size,
            uncompressed_size = summary.uncompressed_size,
            "packed"
        );
        pb.inc(1);
    }

    writer.close().context("Failed to finish package")?;
    writer.into_inner()?.flush()?;

    pb.finish_with_message("Done");
    info!("Packing completed in {:?}", start.elapsed());

    Ok(())
}

fn cmd_digest(package: &Path, out: &mut impl Write) -> Result<()> {
    let reader = open_package(package)?;
    let ranges = reader.package_ranges();

    for (label, range) in [
        ("[content]", ranges.content),
        ("[central-directory]", ranges.central_directory),
        ("[terminal]", ranges.terminal),
    ] {
        let digest = reader.digest_range(range, Sha256Hasher::new())?;
        writeln!(out, "{}  {}", hex::encode(digest), label)?;
    }

    for entry in reader.entries() {
        let Some(range) = reader.entry_range(entry.name()) else {
            continue;
        };
        let digest = reader.digest_range(range, Sha256Hasher::new())?;
        writeln!(out, "{}  {}", hex::encode(digest), entry.name())?;
    }

    Ok(())
}
