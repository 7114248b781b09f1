use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use ol_catalog::config::Config;
use ol_catalog::ingest::{IngestOutcome, IngestReport, Ingestor};
use ol_catalog::openlibrary::OpenLibraryClient;
use ol_catalog::models::BookRecord;
use ol_catalog::{AppError, Isbn, Repository};

#[derive(Debug, Parser)]
#[command(name = "ol-catalog", version, about = "Catalog books by ISBN using OpenLibrary")]
struct Cli {
    /// Database file, overriding the config file and OL_CATALOG_DB
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the catalog database
    Init,
    /// Fetch books from OpenLibrary and save them
    Fetch {
        #[arg(required = true)]
        isbns: Vec<String>,
    },
    /// Print a cataloged book
    Show { isbn: String },
    /// Scan text for ISBNs and catalog every book found
    Scan {
        /// Text file to read; stdin when omitted
        file: Option<PathBuf>,
    },
    /// List cataloged books
    List,
    /// Show row counts
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = Config::load(cli.db.as_deref()).context("loading configuration")?;

    let repository = Repository::new(&config.db_path)
        .await
        .with_context(|| format!("opening catalog at {}", config.db_path))?;

    let result = run(cli.command, &config, &repository).await;
    repository.close().await?;
    result
}

async fn run(command: Command, config: &Config, repository: &Repository) -> anyhow::Result<()> {
    match command {
        Command::Init => {
            println!("Catalog ready at {}", config.db_path);
        }

        Command::Fetch { isbns } => {
            let isbns = isbns
                .iter()
                .map(|s| Isbn::parse(s))
                .collect::<Result<Vec<_>, _>>()?;
            let mut ingestor = new_ingestor(config, repository)?;
            let reports = ingestor.ingest_all(isbns).await;
            print_reports(&reports);
            if reports.iter().any(|r| r.error().is_some()) {
                anyhow::bail!("some books could not be cataloged");
            }
        }

        Command::Show { isbn } => {
            let isbn = Isbn::parse(&isbn)?;
            let record = load_any_form(repository, &isbn).await?;
            println!("{}", record);
            if let Some(cover) = &record.book.cover_url {
                println!("\tcover: {}", cover);
            }
            println!("\turl: {}", record.book.url);
            if !record.subjects.is_empty() {
                let subjects: Vec<_> = record.subjects.iter().map(String::as_str).collect();
                println!("\tsubjects: {}", subjects.join(", "));
            }
        }

        Command::Scan { file } => {
            let mut ingestor = new_ingestor(config, repository)?;
            match file {
                Some(path) => {
                    let file = tokio::fs::File::open(&path)
                        .await
                        .with_context(|| format!("opening {}", path.display()))?;
                    scan_lines(&mut ingestor, BufReader::new(file)).await?;
                }
                None => scan_lines(&mut ingestor, BufReader::new(tokio::io::stdin())).await?,
            }
        }

        Command::List => {
            for book in repository.get_all_books().await? {
                match &book.subtitle {
                    Some(subtitle) => println!("{}\t{}: {}", book.isbn, book.title, subtitle),
                    None => println!("{}\t{}", book.isbn, book.title),
                }
            }
        }

        Command::Stats => {
            let stats = repository.stats().await?;
            println!("books:         {}", stats.books);
            println!("authors:       {}", stats.authors);
            println!("subjects:      {}", stats.subjects);
            println!("book_author:   {}", stats.book_authors);
            println!("book_subject:  {}", stats.book_subjects);
        }
    }

    Ok(())
}

/// A book may be stored under either notation of its ISBN.
async fn load_any_form(repository: &Repository, isbn: &Isbn) -> ol_catalog::Result<BookRecord> {
    let mut last = None;
    for form in isbn.forms() {
        match repository.load_record(form.canonical()).await {
            Ok(record) => return Ok(record),
            Err(e) if e.is_not_found() => last = Some(e),
            Err(e) => return Err(e),
        }
    }
    Err(last.unwrap_or_else(|| AppError::NotFound(format!("book with isbn {}", isbn))))
}

fn new_ingestor<'a>(
    config: &Config,
    repository: &'a Repository,
) -> anyhow::Result<Ingestor<'a, OpenLibraryClient>> {
    let client = OpenLibraryClient::new(&config.openlibrary_url, config.request_timeout())?;
    Ok(Ingestor::new(repository, client, config.max_concurrent_fetches))
}

/// Each line is scanned as it arrives, so piping live OCR output works.
async fn scan_lines<R>(ingestor: &mut Ingestor<'_, OpenLibraryClient>, reader: R) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let reports = ingestor.scan_text(&line).await;
        print_reports(&reports);
    }
    Ok(())
}

fn print_reports(reports: &[IngestReport]) {
    for report in reports {
        match &report.outcome {
            Ok(IngestOutcome::Saved { record, .. }) => println!("fetched book: {}\n", record),
            Ok(IngestOutcome::AlreadyCataloged) => println!("{} already cataloged", report.isbn),
            Ok(IngestOutcome::AlreadySeen) => {}
            Err(e) => eprintln!("{}: {}", report.isbn, e),
        }
    }
}
