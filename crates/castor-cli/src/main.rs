//! Castor CLI - query and load Castor stores.
//!
//! The query API is for building applications; the CLI is for loading
//! data files, inspecting stores, and running ad-hoc queries.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use castor_core::store::builder::StoreBuilder;
use castor_core::{Store, StoreOptions};
use castor_engine::Query;

/// Castor SPARQL engine command-line tool.
#[derive(Parser)]
#[command(name = "castor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run a SPARQL query against a store
    Query {
        /// Path to the store
        store: PathBuf,
        /// The SPARQL query text, or @file to read it from a file
        query: String,
        /// Triple cache capacity in pages
        #[arg(long, default_value_t = 100)]
        cache: usize,
    },
    /// Build a store from an N-Triples file
    Load {
        /// Input N-Triples file
        input: PathBuf,
        /// Output store path
        store: PathBuf,
    },
    /// Show store counters
    Info {
        /// Path to the store
        store: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .init();

    match cli.command {
        Commands::Query {
            store,
            query,
            cache,
        } => run_query(&store, &query, cache),
        Commands::Load { input, store } => load(&input, &store),
        Commands::Info { store } => info(&store),
    }
}

fn run_query(path: &PathBuf, query: &str, cache: usize) -> anyhow::Result<()> {
    let options = StoreOptions {
        cache_capacity: cache,
    };
    let store = Store::open_with(path, &options).context("opening store")?;
    let text = match query.strip_prefix('@') {
        Some(file) => std::fs::read_to_string(file).context("reading query file")?,
        None => query.to_string(),
    };
    let mut q = Query::new(&store, &text).context("preparing query")?;

    let mut rows = 0u64;
    while q.next() {
        rows += 1;
        if q.requested() == 0 {
            continue;
        }
        let mut line = String::new();
        for i in 0..q.requested() {
            if i > 0 {
                line.push('\t');
            }
            match q.value(i) {
                Some(v) => line.push_str(&v.to_string()),
                None => line.push_str("(unbound)"),
            }
        }
        println!("{line}");
    }
    if q.requested() == 0 {
        // ASK form
        println!("{}", rows > 0);
    }
    eprintln!("{rows} solution(s)");
    Ok(())
}

fn load(input: &PathBuf, store: &PathBuf) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(input).context("reading input")?;
    let mut builder = StoreBuilder::new();
    let mut count = 0u64;
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let triple = ntriples::parse_line(line)
            .with_context(|| format!("line {}: malformed triple", lineno + 1))?;
        builder.add(triple.0, triple.1, triple.2);
        count += 1;
    }
    builder.write(store).context("writing store")?;
    println!("loaded {count} triple(s) into {}", store.display());
    Ok(())
}

fn info(path: &PathBuf) -> anyhow::Result<()> {
    let store = Store::open(path).context("opening store")?;
    println!("triples: {}", store.triples_total());
    println!("values:  {}", store.values_count());
    println!("strings: {}", store.strings_count());
    Ok(())
}

/// Minimal N-Triples reader for `castor load`.
mod ntriples {
    use anyhow::bail;
    use castor_common::Value;

    /// Parse one `<s> <p> <o> .` line.
    pub fn parse_line(line: &str) -> anyhow::Result<(Value, Value, Value)> {
        let mut rest = line;
        let subject = parse_term(&mut rest)?;
        let predicate = parse_term(&mut rest)?;
        let object = parse_term(&mut rest)?;
        let rest = rest.trim();
        if rest != "." {
            bail!("expected terminating '.'");
        }
        Ok((subject, predicate, object))
    }

    fn parse_term(input: &mut &str) -> anyhow::Result<Value> {
        let s = input.trim_start();
        if let Some(rest) = s.strip_prefix('<') {
            let Some(end) = rest.find('>') else {
                bail!("unterminated IRI");
            };
            *input = &rest[end + 1..];
            return Ok(Value::uri(rest[..end].to_string()));
        }
        if let Some(rest) = s.strip_prefix("_:") {
            let end = rest
                .find(|c: char| c.is_whitespace())
                .unwrap_or(rest.len());
            *input = &rest[end..];
            return Ok(Value::blank(rest[..end].to_string()));
        }
        if let Some(rest) = s.strip_prefix('"') {
            let mut lexical = String::new();
            let mut chars = rest.char_indices();
            let mut end = None;
            while let Some((i, c)) = chars.next() {
                match c {
                    '"' => {
                        end = Some(i);
                        break;
                    }
                    '\\' => match chars.next() {
                        Some((_, 'n')) => lexical.push('\n'),
                        Some((_, 't')) => lexical.push('\t'),
                        Some((_, '"')) => lexical.push('"'),
                        Some((_, '\\')) => lexical.push('\\'),
                        Some((_, other)) => lexical.push(other),
                        None => bail!("unterminated escape"),
                    },
                    _ => lexical.push(c),
                }
            }
            let Some(end) = end else {
                bail!("unterminated literal");
            };
            let mut tail = &rest[end + 1..];
            let value = if let Some(t) = tail.strip_prefix("^^<") {
                let Some(close) = t.find('>') else {
                    bail!("unterminated datatype IRI");
                };
                let dt = &t[..close];
                tail = &t[close + 1..];
                Value::typed(lexical, dt.to_string())
            } else if let Some(t) = tail.strip_prefix('@') {
                let end = t
                    .find(|c: char| c.is_whitespace())
                    .unwrap_or(t.len());
                let lang = &t[..end];
                tail = &t[end..];
                Value::plain_lang(lexical, lang.to_string())
            } else {
                Value::simple_literal(lexical)
            };
            *input = tail;
            return Ok(value);
        }
        bail!("unrecognized term");
    }
}
