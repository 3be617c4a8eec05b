use bsw::build::{self, BuildOptions, BuildReport};
use bsw::config::{self, SiteConfig};
use bsw::output;
use bsw::serve::DevServer;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Shared flags for commands that build the site.
#[derive(clap::Args, Clone)]
struct BuildArgs {
    /// Remove the output directory before building
    #[arg(short = 'C', long)]
    clean: bool,
}

#[derive(Parser)]
#[command(name = "bsw")]
#[command(about = "Minimal static site generator")]
#[command(long_about = "\
Minimal static site generator

Pages are HTML fragments rendered into templates. Variables and includes are
plain HTML comments:

  <!-- title = \"About\" -->            defines $title for the page
  <!-- template = \"post.html\" -->     uses templates/post.html instead of base.html
  <!-- include(\"nav.html\") -->        pastes templates/includes/nav.html

Project structure:

  my-site/
  ├── bsw.toml                 # Optional config
  ├── pages/                   # Page sources → build/ (same relative paths)
  ├── templates/
  │   ├── base.html            # Required; must contain $page_content
  │   ├── includes/            # Include fragments
  │   └── static/              # Template assets → build/static/
  └── static/                  # Site assets → build/static/

Run 'bsw gen-config' to generate a documented bsw.toml.")]
#[command(version)]
struct Cli {
    /// Project root directory
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Output directory (overrides output_dir from bsw.toml)
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render every page into the output directory
    Build {
        #[command(flatten)]
        args: BuildArgs,
        /// Serve the output directory after building
        #[arg(short = 's', long)]
        http_server: bool,
    },
    /// Build, then serve the output directory over HTTP
    Serve {
        #[command(flatten)]
        args: BuildArgs,
        /// Port to listen on (overrides serve.port from bsw.toml)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Verify that every template and include referenced by a page exists
    Check,
    /// Print a stock bsw.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Build { args, http_server } => {
            let site_config = load_site_config(&cli.root, cli.output.as_deref())?;
            let report = run_build(&cli.root, &site_config, &args)?;
            if http_server {
                run_server(&report.output, &site_config)?;
            }
            finish(&report)?;
        }
        Command::Serve { args, port } => {
            let mut site_config = load_site_config(&cli.root, cli.output.as_deref())?;
            if let Some(port) = port {
                site_config.serve.port = port;
                site_config.validate()?;
            }
            let report = run_build(&cli.root, &site_config, &args)?;
            run_server(&report.output, &site_config)?;
            finish(&report)?;
        }
        Command::Check => {
            let site_config = load_site_config(&cli.root, cli.output.as_deref())?;
            println!("==> Checking {}", cli.root.display());
            let report = build::check(&cli.root, &site_config)?;
            output::print_check_report(&report);
            if !report.is_success() {
                return Err(format!("{} problem(s) found", report.failures.len()).into());
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Load `bsw.toml` from the root, apply CLI overrides, and size the thread pool.
fn load_site_config(
    root: &Path,
    output: Option<&Path>,
) -> Result<SiteConfig, Box<dyn std::error::Error>> {
    let mut site_config = config::load_config(root)?;
    if let Some(output) = output {
        site_config.output_dir = output.to_string_lossy().into_owned();
        site_config.validate()?;
    }
    init_thread_pool(&site_config.processing);
    Ok(site_config)
}

fn run_build(
    root: &Path,
    site_config: &SiteConfig,
    args: &BuildArgs,
) -> Result<BuildReport, Box<dyn std::error::Error>> {
    let options = BuildOptions { clean: args.clean };
    println!("==> Building {}", root.display());

    let (tx, rx) = std::sync::mpsc::channel();
    let display_root = root.to_path_buf();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_build_event(&event, Some(&display_root)) {
                println!("{}", line);
            }
        }
    });
    let result = build::build(root, site_config, &options, Some(tx));
    printer.join().ok();

    let report = result?;
    output::print_build_report(&report);
    Ok(report)
}

fn run_server(out_dir: &Path, site_config: &SiteConfig) -> Result<(), Box<dyn std::error::Error>> {
    let server = DevServer::bind(&site_config.serve)?;
    if let Some(requested) = server.requested_port() {
        println!(
            "Port {} in use, using {} instead",
            requested,
            server.addr().port()
        );
    }
    println!("==> Serving {} at http://{}", out_dir.display(), server.addr());
    println!("Press Ctrl+C to stop");
    server.run(out_dir)?;
    Ok(())
}

/// Turn page failures into a non-zero exit after everything else has run.
fn finish(report: &BuildReport) -> Result<(), Box<dyn std::error::Error>> {
    if report.is_success() {
        println!("==> Build complete: {}", report.output.display());
        Ok(())
    } else {
        Err(format!("{} page(s) failed to build", report.failures.len()).into())
    }
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
