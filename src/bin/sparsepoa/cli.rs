use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use sparsepoa::aligner::config::AlignMode;

/// An enum indicating what kind of alignment to perform
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum AlignmentSpan {
    /// Align the full read to a full path through the graph
    Global,

    /// Align the full read, but allow free gaps in the graph at the beginning and end
    SemiGlobal,

    /// Best scoring alignment of any part of the read to any part of the graph
    Local,
}

impl From<AlignmentSpan> for AlignMode {
    fn from(value: AlignmentSpan) -> Self {
        match value {
            AlignmentSpan::Global => AlignMode::Global,
            AlignmentSpan::SemiGlobal => AlignMode::SemiGlobal,
            AlignmentSpan::Local => AlignMode::Local,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliArgs {
    /// Set verbosity level. Use multiple times to increase the verbosity level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<CliSubcommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliSubcommand {
    /// Build a POA graph from noisy reads and output their consensus
    Consensus(ConsensusArgs),
}

#[derive(Args, Debug)]
pub struct ConsensusArgs {
    /// Reads in FASTA format, optionally gzipped.
    #[clap(help_heading = "Inputs")]
    pub sequences: PathBuf,

    /// Add reads in the given orientation instead of trying both strands
    #[arg(long)]
    #[clap(help_heading = "Inputs")]
    pub no_orient: bool,

    /// Output filename for the consensus FASTA. If not given, defaults to stdout
    #[arg(short, long)]
    #[clap(help_heading = "Outputs")]
    pub output: Option<PathBuf>,

    /// Write per-read alignment summaries as JSON to the given file
    #[arg(long)]
    #[clap(help_heading = "Outputs")]
    pub summaries: Option<PathBuf>,

    /// Write the final graph in DOT format to the given file
    #[arg(long)]
    #[clap(help_heading = "Outputs")]
    pub dot: Option<PathBuf>,

    /// Write the final graph as CSV to the given file
    #[arg(long)]
    #[clap(help_heading = "Outputs")]
    pub csv: Option<PathBuf>,

    /// Alignment span, either global, semi-global or local alignment.
    #[arg(value_enum, short = 'm', long, default_value = "local")]
    #[clap(help_heading = "Alignment configuration")]
    pub mode: AlignmentSpan,

    /// Score for matching bases
    #[arg(short = 'a', long = "match", default_value = "3")]
    #[clap(help_heading = "Alignment configuration")]
    pub score_match: i32,

    /// Score for mismatching bases
    #[arg(short = 'b', long, default_value = "-5", allow_hyphen_values = true)]
    #[clap(help_heading = "Alignment configuration")]
    pub mismatch: i32,

    /// Score for opening a gap
    #[arg(short = 'g', long, default_value = "0", allow_hyphen_values = true)]
    #[clap(help_heading = "Alignment configuration")]
    pub gap_open: i32,

    /// Score for each gap position
    #[arg(short = 'e', long, default_value = "-4", allow_hyphen_values = true)]
    #[clap(help_heading = "Alignment configuration")]
    pub gap_extend: i32,

    /// Reads with a lower alignment score are not added to the graph
    #[arg(long, allow_hyphen_values = true)]
    #[clap(help_heading = "Alignment configuration")]
    pub min_score: Option<i32>,

    /// Minimum vertex coverage for consensus and pruning
    #[arg(short = 'c', long, default_value = "0")]
    #[clap(help_heading = "Consensus")]
    pub min_coverage: usize,

    /// Prune vertices below the minimum coverage after every N reads
    #[arg(long)]
    #[clap(help_heading = "Consensus")]
    pub prune_every: Option<usize>,
}
