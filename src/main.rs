mod dom;
mod error;
mod loader;
mod logging;
mod markdown;
mod namespace;
mod paths;
mod readout;
mod serve;
mod tree;

use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use loader::{FsLoader, HttpLoader, Loader, Origin, DEFAULT_TIMEOUT};
use markdown::RenderOptions;
use namespace::Namespace;
use readout::Readout;

#[derive(Subcommand)]
enum Commands {
    /// Resolve the includes of one HTML page and print the result
    Render(RenderArgs),
    /// Serve a directory over HTTP, resolving includes in HTML pages
    Serve {
        /// Site root directory
        root: PathBuf,
        /// Interface address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Starting port number for the HTTP server
        #[arg(long, default_value = "3333")]
        port: u16,
    },
}

#[derive(Args)]
struct RenderArgs {
    /// Path to the HTML page
    page: PathBuf,
    /// Directory or http(s) base URL that fetch paths are relative to
    /// [default: the page's directory]
    #[arg(long)]
    base: Option<String>,
    /// Confine local fetches to this directory; `/` paths resolve from it
    /// [default: unconfined]
    #[arg(long)]
    root: Option<PathBuf>,
    /// Write the page here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// HTTP request timeout in seconds [default: 30]
    #[arg(long)]
    timeout: Option<u64>,
    /// Exit with status 1 when any include could not be resolved
    #[arg(long)]
    strict: bool,
}

#[derive(Parser)]
#[command(
    name = "readout",
    version,
    about = "Fetch markdown fragments named by data attributes and inject them into HTML"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Attribute that carries path fragments
    #[arg(long, global = true, env = "READOUT_ATTRIBUTE")]
    attribute: Option<String>,
    /// Replace raw HTML in fetched markdown with a comment
    #[arg(long, global = true)]
    strip_raw_html: bool,
    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init_logging(cli.quiet);

    let namespace = Namespace::from_override(cli.attribute.as_deref())?;
    let render = RenderOptions {
        raw_html: !cli.strip_raw_html,
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;

    match cli.command {
        Commands::Render(args) => run_render(&rt, args, namespace, render),
        Commands::Serve { root, bind, port } => {
            rt.block_on(serve::run_serve(root, bind, port, namespace, render))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_render(
    rt: &tokio::runtime::Runtime,
    args: RenderArgs,
    namespace: Namespace,
    render: RenderOptions,
) -> Result<ExitCode> {
    let html = fs::read_to_string(&args.page)
        .with_context(|| format!("read {}", args.page.display()))?;

    let origin = match &args.base {
        Some(base) => Origin::parse(base)?,
        None => Origin::Dir(page_dir(&args.page)),
    };
    let loader = build_loader(
        origin,
        args.root.as_deref(),
        args.timeout.map(Duration::from_secs),
    )?;

    let readout = Readout::new(namespace, loader, render);
    let (out, report) = rt.block_on(readout.process(&html))?;

    match &args.output {
        Some(path) => {
            fs::write(path, &out).with_context(|| format!("write {}", path.display()))?
        }
        None => print!("{out}"),
    }

    info!(
        page = %args.page.display(),
        resolved = report.resolved,
        failed = report.failures.len(),
        "render complete"
    );
    if args.strict && !report.is_clean() {
        for failure in &report.failures {
            warn!(path = %failure.path, error = %failure.error, "unresolved include");
        }
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Directory containing `page`; `.` for a bare file name.
fn page_dir(page: &Path) -> PathBuf {
    match page.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn build_loader(
    origin: Origin,
    root: Option<&Path>,
    timeout: Option<Duration>,
) -> Result<Arc<dyn Loader>> {
    match origin {
        Origin::Dir(dir) => {
            let base = fs::canonicalize(&dir)
                .with_context(|| format!("base directory {}", dir.display()))?;
            let loader = match root {
                Some(r) => {
                    let root = fs::canonicalize(r)
                        .with_context(|| format!("root directory {}", r.display()))?;
                    FsLoader::new(root, &base)?
                }
                None => FsLoader::unconfined(&base)?,
            };
            Ok(Arc::new(loader))
        }
        Origin::Url(url) => Ok(Arc::new(HttpLoader::new(
            url,
            timeout.unwrap_or(DEFAULT_TIMEOUT),
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_dir_of_bare_name_is_cwd() {
        assert_eq!(page_dir(Path::new("index.html")), PathBuf::from("."));
        assert_eq!(page_dir(Path::new("site/index.html")), PathBuf::from("site"));
    }

    #[test]
    fn cli_parses_render_flags() {
        let cli = Cli::try_parse_from([
            "readout",
            "render",
            "page.html",
            "--attribute",
            "data-doc",
            "--base",
            "https://example.com/docs",
            "--strict",
        ])
        .unwrap();
        assert_eq!(cli.attribute.as_deref(), Some("data-doc"));
        match cli.command {
            Commands::Render(args) => {
                assert_eq!(args.page, PathBuf::from("page.html"));
                assert_eq!(args.base.as_deref(), Some("https://example.com/docs"));
                assert!(args.strict);
                assert_eq!(args.timeout, None);
            }
            Commands::Serve { .. } => panic!("expected render"),
        }
    }

    #[test]
    fn cli_serve_defaults() {
        let cli = Cli::try_parse_from(["readout", "serve", "site"]).unwrap();
        match cli.command {
            Commands::Serve { root, bind, port } => {
                assert_eq!(root, PathBuf::from("site"));
                assert_eq!(bind, "127.0.0.1");
                assert_eq!(port, 3333);
            }
            Commands::Render(_) => panic!("expected serve"),
        }
    }

    #[tokio::test]
    async fn local_fetches_are_unconfined_without_root() {
        let tmp = tempfile::tempdir().unwrap();
        let docs = tmp.path().join("docs");
        fs::create_dir_all(&docs).unwrap();
        fs::write(tmp.path().join("shared.md"), "shared\n").unwrap();

        let loader = build_loader(Origin::Dir(docs.clone()), None, None).unwrap();
        assert_eq!(loader.load("../shared.md").await.unwrap(), "shared\n");

        let confined = build_loader(Origin::Dir(docs.clone()), Some(&docs), None).unwrap();
        assert!(confined.load("../shared.md").await.is_err());
    }

    #[test]
    fn root_outside_base_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let site = tmp.path().join("site");
        let other = tmp.path().join("other");
        fs::create_dir_all(&site).unwrap();
        fs::create_dir_all(&other).unwrap();

        let err = build_loader(Origin::Dir(site), Some(&other), None).err().unwrap();
        assert!(err.to_string().contains("escapes root"), "got: {err}");
    }
}
