use chrono::Utc;
use clap::{Parser, Subcommand};
use reqwest::blocking::Client;
use rusqlite::Connection;
use smart_mirror_core::compression::Compression;
use smart_mirror_core::config::{Config, IndexSource};
use smart_mirror_core::packages::PackageIndexReader;
use smart_mirror_core::popcon::PopconReader;
use smart_mirror_index::catalog::{
    built_at, built_mirror, ingest_packages, ingest_popcon, init_db, open_db, record_build,
    table_counts,
};
use smart_mirror_index::select::select_mirror_urls;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(
    name = "smart-mirror",
    version,
    about = "Select popular packages from an Ubuntu archive for a local mirror"
)]
struct Cli {
    #[arg(
        short = 'c',
        long = "config",
        value_name = "PATH",
        help = "Config file (defaults to ~/.smart-mirror/config.toml)"
    )]
    config: Option<PathBuf>,
    #[arg(
        long = "db",
        value_name = "PATH",
        help = "Catalog database (defaults to ~/.smart-mirror/lists.sqlite)"
    )]
    db: Option<PathBuf>,
    #[arg(
        long = "download-dir",
        value_name = "PATH",
        help = "Where downloaded index files are kept"
    )]
    download_dir: Option<PathBuf>,
    #[arg(long = "offline", help = "Reuse previously downloaded files")]
    offline: bool,
    #[arg(
        short = 'v',
        long = "verbose",
        help = "Increase verbosity",
        conflicts_with = "quiet"
    )]
    verbose: bool,
    #[arg(short = 'q', long = "quiet", help = "Suppress non-error output")]
    quiet: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Rebuild the catalog and print selected URLs")]
    Run {
        #[arg(long, help = "Print results as JSON")]
        json: bool,
    },
    #[command(about = "Rebuild the catalog without selecting")]
    Build,
    #[command(about = "Print selected URLs from an existing catalog")]
    Select {
        #[arg(long, help = "Print results as JSON")]
        json: bool,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("missing home directory in environment")]
    MissingHome,
    #[error("config error: {0}")]
    Config(#[from] smart_mirror_core::config::ConfigError),
    #[error("index error: {0}")]
    Index(#[from] smart_mirror_index::catalog::IndexError),
    #[error("missing catalog at {}", .0.display())]
    MissingCatalog(PathBuf),
    #[error("missing download at {} (run without --offline to fetch it)", .0.display())]
    MissingDownload(PathBuf),
    #[error("fetch failed ({0}): {1}")]
    FetchFailed(reqwest::StatusCode, String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to read {}: {}", .0.display(), .1)]
    ReadFile(PathBuf, std::io::Error),
    #[error("failed to write {}: {}", .0.display(), .1)]
    WriteFile(PathBuf, std::io::Error),
    #[error("failed to encode json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy)]
struct Output {
    quiet: bool,
    verbose: bool,
}

impl Output {
    // Stdout carries only results, so -q does not silence it.
    fn info(&self, message: impl AsRef<str>) {
        println!("{}", message.as_ref());
    }

    fn status(&self, message: impl AsRef<str>) {
        if !self.quiet {
            eprintln!("{}", message.as_ref());
        }
    }

    fn warn(&self, message: impl AsRef<str>) {
        if !self.quiet {
            eprintln!("warning: {}", message.as_ref());
        }
    }

    fn verbose(&self, message: impl AsRef<str>) {
        if self.verbose && !self.quiet {
            eprintln!("{}", message.as_ref());
        }
    }
}

struct Downloader {
    client: Option<Client>,
    dir: PathBuf,
}

impl Downloader {
    fn new(config: &Config, dir: PathBuf, offline: bool) -> Result<Self, CliError> {
        let client = if offline {
            None
        } else {
            Some(
                Client::builder()
                    .timeout(Duration::from_secs(config.http.timeout_secs))
                    .build()?,
            )
        };
        std::fs::create_dir_all(&dir).map_err(|err| CliError::WriteFile(dir.clone(), err))?;
        Ok(Downloader { client, dir })
    }

    fn retrieve(&self, output: &Output, url: &str, file_name: &str) -> Result<PathBuf, CliError> {
        let path = self.dir.join(file_name);
        match &self.client {
            Some(client) => {
                output.verbose(format!("fetching {}", url));
                fetch_url(client, url, &path)?;
            }
            None => {
                if !path.is_file() {
                    return Err(CliError::MissingDownload(path));
                }
                output.verbose(format!("using cached {}", path.display()));
            }
        }
        Ok(path)
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Run { json: false });
    let output = Output {
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    let config = load_config(cli.config.as_deref(), &output)?;
    config.validate()?;
    warn_unfetched_thresholds(&output, &config);

    let db_path = match cli.db {
        Some(path) => path,
        None => db_path()?,
    };
    let download_dir = cli.download_dir.unwrap_or_else(default_download_dir);

    match command {
        Command::Run { json } => {
            let downloader = Downloader::new(&config, download_dir, cli.offline)?;
            let conn = build_catalog(&output, &config, &downloader, &db_path)?;
            print_selection(&output, &conn, &config.mirror_base(), &config, json)
        }
        Command::Build => {
            let downloader = Downloader::new(&config, download_dir, cli.offline)?;
            build_catalog(&output, &config, &downloader, &db_path)?;
            Ok(())
        }
        Command::Select { json } => {
            if !db_path.is_file() {
                return Err(CliError::MissingCatalog(db_path));
            }
            let conn = open_db(&db_path)?;
            if let Some(built) = built_at(&conn)? {
                output.verbose(format!("catalog built at {}", built.to_rfc3339()));
            }
            let base_url = selection_base(&output, built_mirror(&conn)?, &config);
            print_selection(&output, &conn, &base_url, &config, json)
        }
    }
}

fn load_config(explicit: Option<&Path>, output: &Output) -> Result<Config, CliError> {
    if let Some(path) = explicit {
        output.verbose(format!("loading config from {}", path.display()));
        return Ok(Config::load_from_path(path)?);
    }
    let path = config_path()?;
    if path.is_file() {
        output.verbose(format!("loading config from {}", path.display()));
        Ok(Config::load_from_path(&path)?)
    } else {
        output.verbose("no config file found, using defaults");
        Ok(Config::default())
    }
}

fn warn_unfetched_thresholds(output: &Output, config: &Config) {
    for category in config.popcon.thresholds.keys() {
        if !config.archive.categories.contains(category) {
            output.warn(format!(
                "threshold for {} has no effect, category is not fetched",
                category
            ));
        }
    }
}

fn build_catalog(
    output: &Output,
    config: &Config,
    downloader: &Downloader,
    db_path: &Path,
) -> Result<Connection, CliError> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|err| CliError::WriteFile(parent.to_path_buf(), err))?;
    }
    let mut conn = init_db(db_path)?;

    for source in config.index_sources() {
        let url = config.packages_url(&source.release, &source.category, &source.architecture);
        let path = downloader.retrieve(output, &url, &packages_file_name(&source))?;
        let reader = open_decompressed(&path, Compression::Bzip2)?;
        let stats = ingest_packages(&mut conn, &source.release, PackageIndexReader::new(reader))?;
        output.verbose(format!(
            "{}/{}/{}: {} packages, {} duplicates",
            source.release, source.category, source.architecture, stats.inserted, stats.duplicates
        ));
    }

    for category in &config.archive.categories {
        let url = config.popcon_url(category);
        let path = downloader.retrieve(output, &url, &popcon_file_name(category))?;
        let reader = open_decompressed(&path, Compression::Gzip)?;
        let stats = ingest_popcon(&mut conn, PopconReader::new(reader, category.as_str()))?;
        output.verbose(format!(
            "popcon {}: {} entries, {} duplicates",
            category, stats.inserted, stats.duplicates
        ));
    }

    record_build(&conn, &config.mirror_base(), Utc::now())?;
    let (packages, _, popcon) = table_counts(&conn)?;
    output.status(format!(
        "catalog built: {} packages, {} popcon entries",
        packages, popcon
    ));
    Ok(conn)
}

// Filenames in a catalog are only valid on the mirror it was built from.
fn selection_base(output: &Output, stored: Option<String>, config: &Config) -> String {
    let configured = config.mirror_base();
    match stored {
        Some(mirror) => {
            if mirror != configured {
                output.warn(format!(
                    "catalog was built from {}, ignoring configured mirror {}",
                    mirror, configured
                ));
            }
            mirror
        }
        None => configured,
    }
}

fn print_selection(
    output: &Output,
    conn: &Connection,
    base_url: &str,
    config: &Config,
    json: bool,
) -> Result<(), CliError> {
    let urls = select_mirror_urls(conn, base_url, &config.popcon.thresholds)?;
    if json {
        output.info(serde_json::to_string_pretty(&urls)?);
    } else {
        for entry in &urls {
            output.info(&entry.url);
        }
    }
    Ok(())
}

fn open_decompressed(
    path: &Path,
    compression: Compression,
) -> Result<BufReader<Box<dyn std::io::Read>>, CliError> {
    let file = File::open(path).map_err(|err| CliError::ReadFile(path.to_path_buf(), err))?;
    Ok(BufReader::new(compression.decoder(BufReader::new(file))))
}

fn fetch_url(client: &Client, url: &str, output_path: &Path) -> Result<(), CliError> {
    let response = client.get(url).send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(CliError::FetchFailed(status, url.to_string()));
    }
    let bytes = response.bytes()?;
    let tmp_path = output_path.with_extension("tmp");
    std::fs::write(&tmp_path, &bytes)
        .map_err(|err| CliError::WriteFile(tmp_path.clone(), err))?;
    std::fs::rename(&tmp_path, output_path)
        .map_err(|err| CliError::WriteFile(output_path.to_path_buf(), err))?;
    Ok(())
}

fn packages_file_name(source: &IndexSource) -> String {
    format!(
        "packages-{}-{}-{}{}",
        source.release,
        source.category,
        source.architecture,
        Compression::Bzip2.extension()
    )
}

fn popcon_file_name(category: &str) -> String {
    format!("popcon-{}{}", category, Compression::Gzip.extension())
}

fn settings_dir() -> Result<PathBuf, CliError> {
    home_dir().map(|home| home.join(".smart-mirror"))
}

fn config_path() -> Result<PathBuf, CliError> {
    Ok(settings_dir()?.join("config.toml"))
}

fn db_path() -> Result<PathBuf, CliError> {
    Ok(settings_dir()?.join("lists.sqlite"))
}

fn default_download_dir() -> PathBuf {
    std::env::temp_dir().join("smart-mirror")
}

fn home_dir() -> Result<PathBuf, CliError> {
    std::env::var("HOME")
        .map(PathBuf::from)
        .map_err(|_| CliError::MissingHome)
}
