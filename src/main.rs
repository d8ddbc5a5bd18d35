//! # mtdata
//!
//! Downloads, caches and normalizes parallel corpora for machine translation.
//!
//! ```sh
//! mtdata 0.4.0
//! Machine translation data acquisition.
//!
//! USAGE:
//!     mtdata [FLAGS] [OPTIONS] <SUBCOMMAND>
//!
//! SUBCOMMANDS:
//!     get     Get datasets and prepare them as train/dev/test files
//!     help    Prints this message or the help of the given subcommand(s)
//!     list    List catalog entries
//! ```
use structopt::StructOpt;

#[macro_use]
extern crate log;

mod cli;

use mtdata::cache::Cache;
use mtdata::catalog::{Catalog, DatasetId};
use mtdata::config::Config;
use mtdata::error::Error;
use mtdata::lang::{parse_pair, LanguageTag};
use mtdata::processing::{AssembleOptions, Assembler, Request};

fn parse_langs(s: &str) -> Result<Vec<LanguageTag>, Error> {
    if s.contains('-') {
        let (l1, l2) = parse_pair(s)?;
        Ok(vec![l1, l2])
    } else {
        Ok(vec![LanguageTag::parse(s)?])
    }
}

fn parse_ids(ids: &[String]) -> Result<Vec<DatasetId>, Error> {
    ids.iter().map(|id| DatasetId::parse(id)).collect()
}

fn list(catalog: &Catalog, l: cli::List) -> Result<(), Error> {
    let langs = l.langs.as_deref().map(parse_langs).transpose()?;
    let found = catalog.find(langs.as_deref(), &l.names, &l.groups, l.fuzzy);
    for entry in &found {
        println!("{}", entry.format("\t"));
    }
    info!("{} entries", found.len());
    Ok(())
}

fn get(catalog: &Catalog, config: &Config, g: cli::Get) -> Result<(), Error> {
    let request = Request {
        langs: parse_langs(&g.langs)?,
        train: parse_ids(&g.train)?,
        dev: parse_ids(&g.dev)?,
        tests: parse_ids(&g.tests)?,
    };
    let opts = AssembleOptions {
        merge: g.merge,
        compress: g.compress,
        drop_dupes: g.drop_dupes,
        drop_tests: g.drop_tests,
        fail_fast: g.fail_fast,
        n_jobs: g.n_jobs.unwrap_or(config.n_jobs),
        extra_meta: g.extra_meta,
    };
    let cache = Cache::from_config(config)?;
    let report = Assembler::new(catalog, &cache, &g.out, opts).assemble(&request)?;
    if let Some(stats) = &report.merge {
        info!("merged {} train segments", stats.total);
    }
    report.check()
}

fn main() -> Result<(), Error> {
    let opt = cli::Mtdata::from_args();
    if opt.verbose && std::env::var_os("RUST_LOG").is_none() {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }
    debug!("cli args\n{:#?}", opt);

    let config = Config::from_env();
    debug!("{:?}", config);
    let catalog = Catalog::load(&opt.catalog)?;

    let res = match opt.cmd {
        cli::Command::List(l) => list(&catalog, l),
        cli::Command::Get(g) => get(&catalog, &config, g),
    };
    if let Err(e) = &res {
        if e.is_fatal_upfront() {
            error!("nothing was fetched: {}", e);
        }
    }
    res
}
