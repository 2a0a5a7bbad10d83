use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::store::MatchStatus;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum MatchesAction {
    /// List stored matches
    List {
        /// Only matches with this status (pending, confirmed, rejected)
        #[clap(short, long)]
        status: Option<MatchStatus>,

        /// Print json
        #[clap(long, default_value = "false")]
        json: bool,
    },
    /// Confirm a pending match
    Confirm { id: String },
    /// Reject a pending match
    Reject { id: String },
    /// Delete a confirmed or rejected match record
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Find candidate matches between lost and found reports
    Match {
        /// File with both lost and found reports (json or csv)
        #[clap(short, long, conflicts_with_all = ["lost", "found"])]
        reports: Option<PathBuf>,

        /// File with lost reports
        #[clap(long, requires = "found")]
        lost: Option<PathBuf>,

        /// File with found reports
        #[clap(long, requires = "lost")]
        found: Option<PathBuf>,

        /// Minimum score (exclusive). Defaults to matching.threshold from config.
        #[clap(short, long)]
        threshold: Option<f32>,

        /// Ignore report images and compare text only
        #[clap(long, default_value = "false")]
        no_images: bool,

        /// Don't store the candidates
        #[clap(long, default_value = "false")]
        no_save: bool,

        /// Print json
        #[clap(long, default_value = "false")]
        json: bool,
    },
    /// Score a single lost/found pair
    Compare {
        /// File with both lost and found reports (json or csv)
        #[clap(short, long)]
        reports: PathBuf,

        #[clap(long)]
        lost_id: u64,

        #[clap(long)]
        found_id: u64,

        /// Ignore report images and compare text only
        #[clap(long, default_value = "false")]
        no_images: bool,
    },
    /// Show the text similarity of two descriptions
    Text {
        #[clap(allow_hyphen_values = true)]
        text1: String,

        #[clap(allow_hyphen_values = true)]
        text2: String,
    },
    /// Classify an image with the configured classifier
    Classify {
        /// Image url or path
        image: String,
    },
    /// Review stored matches
    Matches {
        #[clap(subcommand)]
        action: MatchesAction,
    },
}
