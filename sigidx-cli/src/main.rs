//! Command-line front end for building and querying a signature-indexed
//! relation: create a relation, insert tuples into it, run partial-match
//! queries against it, and inspect its raw contents.

use std::io::BufRead;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use sigidx_core::{BitString, Query, Relation, SigType, Strategy, Tuple};

#[derive(Parser)]
#[command(
    name = "sigidx",
    version,
    about = "Superimposed-coding signature index over a paged heap file"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new relation on disk (five files: name.info/.data/.tsig/.psig/.bsig).
    Create {
        /// Relation name; files are created as `<name>.info` etc.
        name: String,
        /// Number of attributes per tuple.
        #[arg(long)]
        nattrs: u32,
        /// Target data-pages-per-page-signature; informational only, not
        /// consulted when sizing the relation's signature files.
        #[arg(long, default_value_t = 1.0)]
        pf: f32,
        /// Fixed width, in bytes, of one packed tuple record.
        #[arg(long, default_value_t = 64)]
        tupsize: u32,
        /// Signature coding scheme.
        #[arg(long, value_enum, default_value_t = CliSigType::Simc)]
        sigtype: CliSigType,
        /// Bits set per attribute codeword (simc only).
        #[arg(long, default_value_t = 4)]
        tk: u32,
        /// Tuple signature length, in bits.
        #[arg(long)]
        tm: u32,
        /// Page signature length, in bits.
        #[arg(long)]
        pm: u32,
        /// Bit-slice signature length, in bits.
        #[arg(long)]
        bm: u32,
    },
    /// Insert tuples, given as comma-separated attribute values. With no
    /// `tuple` argument, reads one tuple per line from stdin until EOF.
    Insert {
        name: String,
        /// e.g. "waterloo,1234"
        tuple: Option<String>,
    },
    /// Run a partial-match query, given as comma-separated values with
    /// `?` for wildcard attributes.
    Select {
        name: String,
        /// e.g. "waterloo,?"
        tuple: String,
        /// Which pruning strategy selects candidate pages.
        #[arg(long, value_enum, default_value_t = CliStrategy::All)]
        strategy: CliStrategy,
        /// Print scan statistics after the matching tuples.
        #[arg(long)]
        stats: bool,
    },
    /// Print a relation's static parameters and dynamic counters.
    Stats { name: String },
    /// Dump stored tuples alongside their signatures, for debugging.
    Showsigs { name: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliSigType {
    Simc,
    Catc,
}

impl From<CliSigType> for SigType {
    fn from(value: CliSigType) -> Self {
        match value {
            CliSigType::Simc => SigType::Simc,
            CliSigType::Catc => SigType::Catc,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliStrategy {
    All,
    Tuple,
    Page,
    Bit,
}

impl From<CliStrategy> for Strategy {
    fn from(value: CliStrategy) -> Self {
        match value {
            CliStrategy::All => Strategy::All,
            CliStrategy::Tuple => Strategy::TupleSig,
            CliStrategy::Page => Strategy::PageSig,
            CliStrategy::Bit => Strategy::BitSlice,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Create {
            name,
            nattrs,
            pf,
            tupsize,
            sigtype,
            tk,
            tm,
            pm,
            bm,
        } => cmd_create(&name, nattrs, pf, tupsize, sigtype.into(), tk, tm, pm, bm),
        Command::Insert { name, tuple } => cmd_insert(&name, tuple.as_deref()),
        Command::Select {
            name,
            tuple,
            strategy,
            stats,
        } => cmd_select(&name, &tuple, strategy.into(), stats),
        Command::Stats { name } => cmd_stats(&name),
        Command::Showsigs { name } => cmd_showsigs(&name),
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_create(
    name: &str,
    nattrs: u32,
    pf: f32,
    tupsize: u32,
    sigtype: SigType,
    tk: u32,
    tm: u32,
    pm: u32,
    bm: u32,
) -> Result<()> {
    Relation::create(name, nattrs, pf, tupsize, sigtype, tk, tm, pm, bm)
        .with_context(|| format!("creating relation {name:?}"))?;
    log::info!("created relation {name:?}");
    Ok(())
}

fn cmd_insert(name: &str, tuple: Option<&str>) -> Result<()> {
    let mut relation = Relation::open(name).with_context(|| format!("opening relation {name:?}"))?;
    let nattrs = relation.params().nattrs as usize;

    match tuple {
        Some(tuple) => {
            let t = Tuple::parse(tuple, nattrs).with_context(|| format!("parsing tuple {tuple:?}"))?;
            let pid = relation.insert(&t)?;
            log::debug!("inserted into page {pid}");
        }
        None => {
            let mut ninserted = 0;
            for line in std::io::stdin().lines() {
                let line = line.context("reading tuple from stdin")?;
                if line.trim().is_empty() {
                    continue;
                }
                let t = Tuple::parse(&line, nattrs).with_context(|| format!("parsing tuple {line:?}"))?;
                relation.insert(&t)?;
                ninserted += 1;
            }
            log::info!("inserted {ninserted} tuples from stdin");
        }
    }
    Ok(())
}

fn cmd_select(name: &str, tuple: &str, strategy: Strategy, show_stats: bool) -> Result<()> {
    let mut relation = Relation::open(name).with_context(|| format!("opening relation {name:?}"))?;
    let nattrs = relation.params().nattrs as usize;
    let query = Tuple::parse(tuple, nattrs).with_context(|| format!("parsing query {tuple:?}"))?;
    let result = Query::run(&mut relation, &query, strategy)?;
    for t in &result.matches {
        println!("{}", t.attrs().join(","));
    }
    if show_stats {
        println!("{}", result.stats);
    }
    Ok(())
}

fn cmd_stats(name: &str) -> Result<()> {
    let relation = Relation::open(name).with_context(|| format!("opening relation {name:?}"))?;
    println!("{}", relation.params());
    Ok(())
}

fn cmd_showsigs(name: &str) -> Result<()> {
    let mut relation = Relation::open(name).with_context(|| format!("opening relation {name:?}"))?;

    for pid in 0..relation.npages() {
        let page = relation.get_data_page(pid)?;
        for slot in 0..page.item_count() {
            let tuple = relation.tuple_from_page(&page, slot)?;
            let tsig = relation.tuple_sig(&tuple);
            println!("{}\t{}", tuple.attrs().join(","), tsig.to_hex());
        }
    }

    println!("tsigs in file:");
    let tm = relation.params().tm as usize;
    let tsig_size = relation.params().tsig_size as usize;
    for tpid in 0..relation.params().tsig_npages {
        let page = relation.get_tsig_page(tpid)?;
        for i in 0..page.item_count() {
            let tsig = BitString::from_bytes(tm, page.get_item(i, tsig_size)?)?;
            println!("{}", tsig.to_hex());
        }
    }

    Ok(())
}
