//! The `hondana` command line.
//!
//! Exercises the parts of the shelf that need no window: scanning, listing
//! titles, and managing favorites, bookmarks and library roots.

use crate::Shelf;
use crate::error::{ErrorKind, Result};
use clap::{Parser, Subcommand};
use exn::ResultExt;
use hondana_config::Config;
use hondana_library::{VolumeId, identify};
use hondana_render::error::ErrorKind as RenderErrorKind;
use hondana_render::{Decoder, Document};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directives.
pub const LOG_ENV: &str = "HONDANA_LOG";

#[derive(Debug, Parser)]
#[command(name = "hondana", version, about = "Personal bookshelf for paginated document volumes")]
pub struct Cli {
    /// Config file to use instead of the one in the platform config directory
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log more; repeat for even more
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan the library roots and summarize what was found
    Scan,
    /// List titles and their volumes with reading state
    Titles,
    /// Manage favorite volumes
    #[command(subcommand)]
    Favorites(FavoritesCommand),
    /// Manage reading positions
    #[command(subcommand)]
    Bookmarks(BookmarksCommand),
    /// Manage library root folders
    #[command(subcommand)]
    Roots(RootsCommand),
}

#[derive(Debug, Subcommand)]
pub enum FavoritesCommand {
    /// Mark a volume, given by id or file path
    Add { volume: String },
    /// Unmark a volume, given by id or file path
    Remove { volume: String },
    List,
}

#[derive(Debug, Subcommand)]
pub enum BookmarksCommand {
    List,
    /// Forget the position in one volume, given by id or file path
    Clear { volume: String },
    /// Forget every reading position
    ClearAll,
}

#[derive(Debug, Subcommand)]
pub enum RootsCommand {
    Add { path: PathBuf },
    Remove { path: PathBuf },
    List,
}

/// Install the global subscriber. `HONDANA_LOG` sets the filter (default
/// `info`); each `-v` raises the floor by one level.
pub fn init_tracing(verbose: u8) {
    let mut filter = EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).with_env_var(LOG_ENV).from_env_lossy();
    match verbose {
        0 => {},
        1 => filter = filter.add_directive(LevelFilter::DEBUG.into()),
        _ => filter = filter.add_directive(LevelFilter::TRACE.into()),
    }
    // A subscriber installed by an embedding program wins.
    _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

/// Accept either a volume id or the path of a volume file.
pub fn parse_volume(arg: &str) -> Result<VolumeId> {
    if let Ok(id) = arg.parse::<VolumeId>() {
        return Ok(id);
    }
    let path = std::path::absolute(arg).or_raise(|| ErrorKind::InvalidArgument(arg.to_string()))?;
    identify(path).or_raise(|| ErrorKind::InvalidArgument(arg.to_string()))
}

/// Stands in for the page-decoding engine, which the command line never
/// needs. Every volume is reported unreadable.
struct NoDecoder;

impl Decoder for NoDecoder {
    fn open(&self, path: &Path) -> hondana_render::error::Result<Box<dyn Document>> {
        exn::bail!(RenderErrorKind::Unreadable(path.to_path_buf()))
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let mut shelf = Shelf::open(config, Arc::new(NoDecoder)).await?;
    let outcome = execute(&mut shelf, cli.command).await;
    let closed = shelf.shutdown().await;
    outcome.and(closed)
}

async fn execute(shelf: &mut Shelf, command: Command) -> Result<()> {
    match command {
        Command::Scan => {
            let report = shelf.scan().await;
            println!("{} titles, {} volumes", report.titles, report.volumes);
            for failure in &report.errors {
                println!("skipped {}: {}", failure.path.display(), failure.error);
            }
        },
        Command::Titles => {
            shelf.scan().await;
            for title in shelf.titles() {
                println!("{}", title.name);
                for volume in &title.volumes {
                    let star = if volume.favorite { "*" } else { " " };
                    let page = volume.bookmark.as_ref().map(|b| format!("  p.{}", b.last_page + 1)).unwrap_or_default();
                    println!("  {star} {}  {}{page}", volume.id, volume.file_name);
                }
            }
        },
        Command::Favorites(FavoritesCommand::Add { volume }) => {
            let id = parse_volume(&volume)?;
            let added = shelf.add_favorite(&id).await?;
            println!("{}", if added { "added" } else { "already a favorite" });
        },
        Command::Favorites(FavoritesCommand::Remove { volume }) => {
            let id = parse_volume(&volume)?;
            let removed = shelf.remove_favorite(&id).await?;
            println!("{}", if removed { "removed" } else { "not a favorite" });
        },
        Command::Favorites(FavoritesCommand::List) => {
            shelf.scan().await;
            for id in shelf.favorites() {
                match shelf.volume(&id) {
                    Some(volume) => {
                        let stale = if volume.stale { " (missing)" } else { "" };
                        println!("{id}  {} / {}{stale}", volume.title, volume.file_name);
                    },
                    None => println!("{id}  (not in library)"),
                }
            }
        },
        Command::Bookmarks(BookmarksCommand::List) => {
            shelf.scan().await;
            for (id, bookmark) in shelf.bookmarks() {
                let name = shelf.volume(&id).map_or_else(|| "(not in library)".to_string(), |v| v.file_name);
                let when = bookmark.updated_at.format(&Rfc3339).unwrap_or_default();
                println!("{id}  {name}  p.{}  {when}", bookmark.last_page + 1);
            }
        },
        Command::Bookmarks(BookmarksCommand::Clear { volume }) => {
            let id = parse_volume(&volume)?;
            let cleared = shelf.clear_bookmark(&id).await?;
            println!("{}", if cleared { "cleared" } else { "no bookmark" });
        },
        Command::Bookmarks(BookmarksCommand::ClearAll) => {
            let cleared = shelf.clear_history().await?;
            println!("cleared {cleared} bookmarks");
        },
        Command::Roots(RootsCommand::Add { path }) => {
            let path = std::path::absolute(&path).or_raise(|| ErrorKind::InvalidArgument(path.display().to_string()))?;
            let added = shelf.add_root(&path).await?;
            println!("{}", if added { "added" } else { "already a root" });
        },
        Command::Roots(RootsCommand::Remove { path }) => {
            let path = std::path::absolute(&path).or_raise(|| ErrorKind::InvalidArgument(path.display().to_string()))?;
            let removed = shelf.remove_root(&path).await?;
            println!("{}", if removed { "removed" } else { "not a root" });
        },
        Command::Roots(RootsCommand::List) => {
            for root in shelf.library_roots() {
                println!("{}", root.display());
            }
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case(&["hondana", "scan"])]
    #[case(&["hondana", "-vv", "titles"])]
    #[case(&["hondana", "favorites", "add", "/library/Series-A/vol1.pdf"])]
    #[case(&["hondana", "bookmarks", "clear-all", "--config", "/etc/hondana.toml"])]
    #[case(&["hondana", "roots", "list"])]
    fn test_accepted_invocations(#[case] args: &[&str]) {
        assert!(Cli::try_parse_from(args).is_ok());
    }

    #[rstest]
    #[case(&["hondana"])]
    #[case(&["hondana", "favorites"])]
    #[case(&["hondana", "roots", "add"])]
    fn test_rejected_invocations(#[case] args: &[&str]) {
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from(["hondana", "roots", "list", "-vv", "--config", "/tmp/c.toml"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(cli.command, Command::Roots(RootsCommand::List)));
    }

    #[test]
    fn test_parse_volume_accepts_id_or_path() {
        let by_path = parse_volume("/library/Series-A/vol1.pdf").unwrap();
        assert_eq!(by_path, identify("/library/Series-A/vol1.pdf").unwrap());
        assert_eq!(parse_volume(by_path.as_str()).unwrap(), by_path);
    }

    #[test]
    fn test_no_decoder_reports_unreadable() {
        let err = NoDecoder.open(Path::new("/library/a.pdf")).err().unwrap();
        assert!(matches!(&*err, RenderErrorKind::Unreadable(_)));
    }
}
