//! Command line arguments and parameters management/parsing.
use std::path::PathBuf;

use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "mtdata", about = "Machine translation data acquisition.")]
pub struct Mtdata {
    #[structopt(short = "v", long = "verbose", help = "debug logging")]
    pub verbose: bool,
    #[structopt(
        long = "catalog",
        parse(from_os_str),
        help = "catalog snapshot (JSON)",
        default_value = "mtdata.catalog.json"
    )]
    pub catalog: PathBuf,
    #[structopt(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, StructOpt)]
pub enum Command {
    #[structopt(about = "List catalog entries")]
    List(List),
    #[structopt(about = "Get datasets and prepare them as train/dev/test files")]
    Get(Get),
}

#[derive(Debug, StructOpt)]
pub struct List {
    #[structopt(short = "l", long = "langs", help = "language pair (e.g. deu-eng) or language")]
    pub langs: Option<String>,
    #[structopt(short = "n", long = "names", help = "dataset names")]
    pub names: Vec<String>,
    #[structopt(short = "g", long = "groups", help = "dataset groups")]
    pub groups: Vec<String>,
    #[structopt(long = "fuzzy", help = "match compatible languages, not only identical ones")]
    pub fuzzy: bool,
}

#[derive(Debug, StructOpt)]
pub struct Get {
    #[structopt(short = "l", long = "langs", help = "language pair (e.g. deu-eng) or language")]
    pub langs: String,
    #[structopt(long = "train", help = "train dataset ids")]
    pub train: Vec<String>,
    #[structopt(long = "dev", help = "dev dataset ids")]
    pub dev: Vec<String>,
    #[structopt(long = "test", help = "test dataset ids")]
    pub tests: Vec<String>,
    #[structopt(short = "o", long = "out", parse(from_os_str), help = "output directory")]
    pub out: PathBuf,
    #[structopt(long = "merge", help = "merge train parts into train.<lang>")]
    pub merge: bool,
    #[structopt(long = "compress", help = "gzip train files")]
    pub compress: bool,
    #[structopt(long = "dedupe", help = "drop duplicate train pairs when merging")]
    pub drop_dupes: bool,
    #[structopt(long = "drop-tests", help = "drop train pairs found in dev/test sets")]
    pub drop_tests: bool,
    #[structopt(long = "fail-fast", help = "stop on the first failing entry")]
    pub fail_fast: bool,
    #[structopt(long = "meta", help = "keep record metadata in sidecar files")]
    pub extra_meta: bool,
    #[structopt(short = "j", long = "jobs", help = "parallel workers (default: $MTDATA_JOBS or 1)")]
    pub n_jobs: Option<usize>,
}
