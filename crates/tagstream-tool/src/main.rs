//! Command-line access to tagstream files.
//!
//! `pack` turns stdin lines into a compressed grouped stream and reports
//! where each group landed; `dump`, `stats` and `seek` read streams back.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;
use tagstream::stream::{BlockOptions, BlockedZstdReader};
use tagstream::{
    FlushedGroup, GroupReader, GroupWriter, KnownTags, TagRegistry, WriterOptions,
    limits::{DEFAULT_COMPRESSION_LEVEL, DEFAULT_MAX_GROUP_SIZE},
};

#[derive(Parser)]
#[command(name = "tagstream", version, about = "Grouped message stream tooling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write stdin lines as messages of a new stream.
    Pack {
        out: PathBuf,
        #[arg(long = "tag")]
        tag: Option<String>,
        #[arg(long = "group-size", default_value_t = DEFAULT_MAX_GROUP_SIZE)]
        group_size: usize,
        #[arg(long = "level", default_value_t = DEFAULT_COMPRESSION_LEVEL)]
        level: i32,
        /// Where to write the JSON-lines group index; stderr if absent.
        #[arg(long = "index")]
        index: Option<PathBuf>,
    },
    /// Print every tagged message.
    Dump {
        file: PathBuf,
        #[arg(long = "tags", value_delimiter = ',')]
        tags: Vec<String>,
    },
    /// Count groups, messages and tags.
    Stats {
        file: PathBuf,
        #[arg(long = "tags", value_delimiter = ',')]
        tags: Vec<String>,
    },
    /// Jump to a group by virtual offset and print its first message.
    Seek {
        file: PathBuf,
        #[arg(long = "offset", allow_hyphen_values = true)]
        offset: i64,
        #[arg(long = "tags", value_delimiter = ',')]
        tags: Vec<String>,
    },
}

/// One line of the group index written by `pack`.
#[derive(Debug, Serialize)]
struct IndexRow {
    group: u64,
    tag: String,
    count: usize,
    start: Option<u64>,
    end: Option<u64>,
}

impl IndexRow {
    fn new(group: u64, flushed: &FlushedGroup<'_>) -> Self {
        Self {
            group,
            tag: flushed.tag.to_string(),
            count: flushed.messages.len(),
            start: flushed.start.map(u64::from),
            end: flushed.end.map(u64::from),
        }
    }
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut out = BufWriter::new(io::stdout());
    match cli.command {
        Commands::Pack {
            out: path,
            tag,
            group_size,
            level,
            index,
        } => cmd_pack(&path, tag, group_size, level, index.as_deref())?,
        Commands::Dump { file, tags } => cmd_dump(&file, registry(tags), &mut out)?,
        Commands::Stats { file, tags } => cmd_stats(&file, registry(tags), &mut out)?,
        Commands::Seek { file, offset, tags } => {
            cmd_seek(&file, offset, registry(tags), &mut out)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn registry(tags: Vec<String>) -> KnownTags {
    tags.into_iter().collect()
}

fn open_reader<G: TagRegistry>(
    path: &Path,
    registry: G,
) -> Result<GroupReader<BlockedZstdReader<BufReader<File>>, G>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = GroupReader::compressed(BufReader::new(file), registry)
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(reader)
}

fn cmd_pack(
    path: &Path,
    tag: Option<String>,
    group_size: usize,
    level: i32,
    index: Option<&Path>,
) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut options = WriterOptions::new().max_group_size(group_size);
    if let Some(tag) = tag {
        options = options.tag(tag);
    }
    let mut writer =
        GroupWriter::compressed(BufWriter::new(file), options, BlockOptions::new().level(level))?;

    let mut index_out: Box<dyn Write> = match index {
        Some(index) => Box::new(BufWriter::new(
            File::create(index).with_context(|| format!("creating {}", index.display()))?,
        )),
        None => Box::new(io::stderr()),
    };
    let mut group = 0u64;
    writer.register_listener(move |flushed| {
        serde_json::to_writer(&mut index_out, &IndexRow::new(group, flushed))?;
        index_out.write_all(b"\n")?;
        index_out.flush()?;
        group += 1;
        Ok(())
    });

    let mut messages = 0u64;
    for line in io::stdin().lock().lines() {
        writer.write(line?.into_bytes())?;
        messages += 1;
    }
    let groups = writer.groups_written();
    writer.finish()?.into_inner().flush()?;

    info!("packed {} messages into {} groups", messages, groups);
    Ok(())
}

fn cmd_dump<G: TagRegistry>(path: &Path, registry: G, out: &mut dyn Write) -> Result<()> {
    let mut reader = open_reader(path, registry)?;
    loop {
        let group = reader
            .tell_group()
            .map_or_else(|| "-".to_string(), |offset| offset.raw().to_string());
        let Some(tagged) = GroupReader::take(&mut reader)? else {
            break;
        };
        match tagged.message() {
            Some(message) => writeln!(out, "{}\t{}\t{}", group, tagged.tag, message.len())?,
            None => writeln!(out, "{}\t{}\t-", group, tagged.tag)?,
        }
    }
    Ok(())
}

fn cmd_stats<G: TagRegistry>(path: &Path, registry: G, out: &mut dyn Write) -> Result<()> {
    let mut reader = open_reader(path, registry)?;
    let mut groups = 0u64;
    let mut messages = 0u64;
    let mut tag_only = 0u64;
    let mut untagged = 0u64;
    let mut last_group = None;

    loop {
        let ordinal = reader.group_ordinal();
        let Some(tagged) = GroupReader::take(&mut reader)? else {
            break;
        };
        if ordinal != last_group {
            groups += 1;
            last_group = ordinal;
        }
        if tagged.is_tag_only() {
            tag_only += 1;
        } else {
            messages += 1;
            if tagged.is_untagged() {
                untagged += 1;
            }
        }
    }

    writeln!(out, "groups:     {}", groups)?;
    writeln!(out, "messages:   {}", messages)?;
    writeln!(out, "untagged:   {}", untagged)?;
    writeln!(out, "tag-only:   {}", tag_only)?;
    Ok(())
}

fn cmd_seek<G: TagRegistry>(path: &Path, offset: i64, registry: G, out: &mut dyn Write) -> Result<()> {
    let mut reader = open_reader(path, registry)?;
    if !reader.seek_group_raw(offset)? {
        bail!("cannot seek to offset {}", offset);
    }
    match reader.current() {
        Some(tagged) => match tagged.message() {
            Some(message) => {
                writeln!(out, "tag:    {}", tagged.tag)?;
                writeln!(out, "length: {}", message.len())?;
                writeln!(out, "data:   {}", String::from_utf8_lossy(message))?;
            }
            None => writeln!(out, "tag:    {} (no messages)", tagged.tag)?,
        },
        None => writeln!(out, "no group at offset {}", offset)?,
    }
    Ok(())
}
