use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the local proxy in front of the remote catalog.
    Serve(ServeArgs),
    /// Fetch a catalog page through the proxy and print it.
    Browse(BrowseArgs),
    /// Print the proxy path for each href.
    Normalize(NormalizeArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:4000")]
    pub addr: SocketAddr,

    /// Remote catalog origin (default: OPDSNAV_ORIGIN or http://flibusta.is).
    #[arg(long)]
    pub origin: Option<String>,

    /// Static web assets directory (served with index.html fallback if it exists).
    #[arg(long, default_value = "dist")]
    pub web_dir: PathBuf,
}

#[derive(Debug, Args)]
pub struct BrowseArgs {
    /// Base URL of the running proxy.
    #[arg(long, default_value = "http://127.0.0.1:4000")]
    pub proxy: String,

    /// Catalog location or href to open (normalized first).
    #[arg(long, default_value = "/opds")]
    pub location: String,

    /// Search by author instead of opening `--location`.
    #[arg(long)]
    pub search: Option<String>,

    /// Number of pages to load (follows the feed's `next` relation).
    #[arg(long, default_value_t = 1)]
    pub pages: usize,

    /// Activate a format link of the N-th visible entry (1-based).
    #[arg(long)]
    pub download: Option<usize>,

    /// Format to activate with `--download` (epub, fb2, mobi; default: first listed).
    #[arg(long)]
    pub format: Option<String>,

    /// User agent used for platform detection.
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Treat the client as an installed (standalone) web app.
    #[arg(long, default_value_t = false)]
    pub standalone: bool,

    /// Print the page as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct NormalizeArgs {
    /// Hrefs as they appear in a feed.
    #[arg(required = true)]
    pub hrefs: Vec<String>,

    /// Remote catalog origin stripped from absolute hrefs.
    #[arg(long)]
    pub origin: Option<String>,
}
