//! Mailsig - command-line front end for the signature engine.
//!
//! Stands in for the editor UI: every command maps onto one repository
//! operation. Directory choosers are replaced by `mailsig grant <dir>`.

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use mailsig_core::config::AppConfig;
use mailsig_core::{
    platform, AppStateStore, BookmarkStore, DirectoryChoice, DirectoryLocator, Session,
    Signature, SignatureContent, SignatureError, SignatureRepository,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "mailsig")]
#[command(about = "Edit mail client signatures without the mail client reverting them")]
struct Args {
    /// Signatures directory (skips location and grants)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Application state file (defaults to the platform config directory)
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show which signatures directory would be used
    Locate,
    /// Grant access to a signatures directory and remember it
    Grant { dir: PathBuf },
    /// List all signatures and any files that were skipped
    List,
    /// Print one signature's HTML
    Show { id: String },
    /// Create a signature in the directory's format
    Create {
        #[arg(long, default_value = "")]
        name: String,
        #[command(flatten)]
        content: ContentSource,
    },
    /// Replace a signature's content and save it
    Edit {
        id: String,
        #[command(flatten)]
        content: ContentSource,
    },
    /// Rename a catalog-listed signature and save it
    Rename { id: String, name: String },
    /// Delete a signature's file
    Delete { id: String },
    /// Cross-check the signature catalog against the payload files
    Analyze,
}

#[derive(ClapArgs, Debug)]
#[group(required = true, multiple = false)]
struct ContentSource {
    /// HTML content
    #[arg(long)]
    html: Option<String>,

    /// Read HTML content from a file
    #[arg(long)]
    file: Option<PathBuf>,
}

impl ContentSource {
    fn load(&self) -> Result<SignatureContent> {
        match (&self.html, &self.file) {
            (Some(html), _) => Ok(SignatureContent::Html(html.clone())),
            (None, Some(path)) => {
                let html = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                Ok(SignatureContent::Html(html))
            }
            (None, None) => bail!("Either --html or --file is required"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let result = run(&args).await;
    if let Err(e) = &result {
        if e
            .downcast_ref::<SignatureError>()
            .is_some_and(SignatureError::requires_directory_grant)
        {
            eprintln!("Run `{} grant <dir>` to choose the signatures directory.", AppConfig::APP_NAME);
        }
    }
    result
}

async fn run(args: &Args) -> Result<()> {
    match &args.command {
        Command::Locate => {
            let session = open_session(args)?;
            emit(args.json, session.directory(), || {
                format!(
                    "{} ({:?})",
                    session.root().display(),
                    session.directory().source
                )
            })
        }
        Command::Grant { dir } => {
            let locator = locator(args)?;
            let session = Session::grant(&locator, DirectoryChoice::Selected(dir.clone()))?;
            emit(args.json, session.directory(), || {
                format!("Granted {}", session.root().display())
            })
        }
        Command::List => {
            let repo = repository(args)?;
            let listed = repo.list().await?;
            emit(args.json, &listed, || {
                let mut lines: Vec<String> = listed.signatures.iter().map(summary).collect();
                lines.extend(listed.diagnostics.iter().map(|d| format!("  ! {}", d)));
                lines.join("\n")
            })
        }
        Command::Show { id } => {
            let repo = repository(args)?;
            let signature = load(&repo, id).await?;
            emit(args.json, &signature, || signature.canonical_html().to_string())
        }
        Command::Create { name, content } => {
            let repo = repository(args)?;
            let signature = repo.create(name, content.load()?).await?;
            emit(args.json, &signature, || summary(&signature))
        }
        Command::Edit { id, content } => {
            let repo = repository(args)?;
            load(&repo, id).await?;
            repo.update(id, content.load()?).await?;
            let report = repo.save(id).await?;
            emit(args.json, &report, || {
                format!("Saved {} ({} bytes)", report.path.display(), report.bytes_written)
            })
        }
        Command::Rename { id, name } => {
            let repo = repository(args)?;
            load(&repo, id).await?;
            let signature = repo.rename(id, name).await?;
            let report = repo.save(id).await?;
            if report.catalog_entries_renamed == 0 {
                bail!(
                    "{} is not listed in the signature catalog; its name comes from its content, edit that instead",
                    id
                );
            }
            emit(args.json, &signature, || summary(&signature))
        }
        Command::Delete { id } => {
            let repo = repository(args)?;
            load(&repo, id).await?;
            repo.delete(id).await?;
            emit(args.json, id, || format!("Deleted {}", id))
        }
        Command::Analyze => {
            let repo = repository(args)?;
            let report = repo.analyze_manifest().await?;
            emit(args.json, &report, || {
                let mut lines = vec![format!(
                    "{} (present: {}, layout: {:?})",
                    report.manifest_path.display(),
                    report.present,
                    report.layout
                )];
                lines.extend(
                    report
                        .accounts
                        .iter()
                        .map(|a| format!("  {}: {} entries", a.account_id, a.entry_count)),
                );
                lines.push(format!("  {} entries resolved", report.resolved.len()));
                lines.extend(report.diagnostics.iter().map(|d| format!("  ! {}", d)));
                lines.join("\n")
            })
        }
    }
}

fn locator(args: &Args) -> Result<DirectoryLocator> {
    let state = match &args.state {
        Some(path) => AppStateStore::new(path),
        None => AppStateStore::open_default()?,
    };
    if state.take_first_launch()? {
        info!(
            "First launch on {}: state is kept in {}",
            platform::current_platform(),
            state.path().display()
        );
    }
    Ok(DirectoryLocator::new(BookmarkStore::new(Arc::new(state))))
}

fn open_session(args: &Args) -> Result<Session> {
    match &args.dir {
        Some(dir) => Ok(Session::for_directory(dir)),
        None => Ok(Session::locate(&locator(args)?)?),
    }
}

fn repository(args: &Args) -> Result<SignatureRepository> {
    Ok(SignatureRepository::new(open_session(args)?)?)
}

/// List the directory and return `id`'s record.
async fn load(repo: &SignatureRepository, id: &str) -> Result<Signature> {
    let listed = repo.list().await?;
    for diagnostic in &listed.diagnostics {
        warn!("{}", diagnostic);
    }
    match listed.signatures.into_iter().find(|s| s.signature_id() == id) {
        Some(signature) => Ok(signature),
        None => Err(SignatureError::SignatureNotFound {
            signature_id: id.to_string(),
        }
        .into()),
    }
}

fn summary(signature: &Signature) -> String {
    format!(
        "{}  {}  [{}]",
        signature.signature_id(),
        signature.display_name(),
        signature.format()
    )
}

/// Print `value` as JSON, or the human-readable text otherwise.
fn emit<T: Serialize + ?Sized>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_edit_with_html() {
        let args = Args::try_parse_from(["mailsig", "--dir", "/sigs", "edit", "A1", "--html", "<p>x</p>"])
            .unwrap();
        assert_eq!(args.dir.as_deref(), Some(std::path::Path::new("/sigs")));
        match args.command {
            Command::Edit { id, content } => {
                assert_eq!(id, "A1");
                assert_eq!(
                    content.load().unwrap(),
                    SignatureContent::Html("<p>x</p>".into())
                );
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_content_requires_exactly_one_source() {
        assert!(Args::try_parse_from(["mailsig", "create", "--name", "x"]).is_err());
        assert!(Args::try_parse_from([
            "mailsig", "create", "--html", "<p>x</p>", "--file", "sig.html"
        ])
        .is_err());
    }

    #[test]
    fn test_content_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sig.html");
        std::fs::write(&path, "<p>From file</p>").unwrap();

        let source = ContentSource {
            html: None,
            file: Some(path),
        };
        assert_eq!(
            source.load().unwrap(),
            SignatureContent::Html("<p>From file</p>".into())
        );

        let missing = ContentSource {
            html: None,
            file: Some(tmp.path().join("missing.html")),
        };
        assert!(missing.load().is_err());
    }

    #[tokio::test]
    async fn test_rename_without_catalog_entry_fails() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("A1.mailsignature"), "<p>Jane</p>").unwrap();
        let dir = tmp.path().to_str().unwrap();

        let args = Args::try_parse_from(["mailsig", "--dir", dir, "rename", "A1", "Work"]).unwrap();
        let err = run(&args).await.unwrap_err();
        assert!(err.to_string().contains("not listed in the signature catalog"));
    }
}
