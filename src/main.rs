use std::env;
use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use wasmdist::config::{self, BuildConfig, Overrides, Project};
use wasmdist::server::{DevServer, DevServerConfig};
use wasmdist::{clean, debug, log, logger, watch, Pipeline};

#[derive(Parser)]
#[command(name = "wasmdist", version)]
#[command(about = "wasmdist: bundle a WebAssembly web app into a deployable directory")]
struct Cli {
    /// Path to wasmdist.toml (default: search upward from the working directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean the output directory, bundle, copy assets and write the page
    Build {
        #[command(flatten)]
        target: TargetArgs,

        /// Print the build report as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Remove the output directory
    Clean {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Serve the output directory and the asset tree
    Serve {
        #[command(flatten)]
        target: TargetArgs,

        /// Port to listen on (default: [serve] port)
        #[arg(long)]
        port: Option<u16>,

        /// Build once before serving
        #[arg(long)]
        build: bool,

        /// Rebuild on changes while serving
        #[arg(long)]
        watch: bool,
    },

    /// Rebuild whenever an input changes
    Watch {
        #[command(flatten)]
        target: TargetArgs,

        /// Quiet period in milliseconds before rebuilding
        #[arg(long, default_value_t = 200)]
        debounce: u64,
    },
}

/// Profile selection and per-field overrides shared by every command.
#[derive(Args)]
struct TargetArgs {
    /// Profile declared as [profile.<name>] in wasmdist.toml
    #[arg(long, short)]
    profile: Option<String>,

    /// Entry module (the wasm-bindgen glue script)
    #[arg(long)]
    entry: Option<PathBuf>,

    /// Output directory
    #[arg(long, short)]
    out_dir: Option<PathBuf>,

    /// Bundle file name inside the output directory
    #[arg(long)]
    filename: Option<String>,

    /// Static asset directory
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Where assets land inside the output directory ("." for the root)
    #[arg(long)]
    asset_dest: Option<PathBuf>,

    /// HTML template
    #[arg(long)]
    template: Option<PathBuf>,
}

impl TargetArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            entry: self.entry.clone(),
            output_dir: self.out_dir.clone(),
            output_filename: self.filename.clone(),
            asset_source_dir: self.assets.clone(),
            asset_dest_subpath: self.asset_dest.clone(),
            html_template: self.template.clone(),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    logger::set_verbose(cli.verbose);

    if let Err(e) = run(cli) {
        log!("error"; "{e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let project = config::load_project(cli.config.as_deref()).context("cannot load configuration")?;
    match &project.source {
        Some(path) => debug!("config"; "{}", path.display()),
        None => debug!("config"; "no {} found, using defaults", config::CONFIG_FILE),
    }

    match cli.command {
        Commands::Build { target, json } => {
            let config = resolve(&project, &target)?;
            let result = Pipeline::new(config).run().context("build failed")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
        }

        Commands::Clean { target } => {
            let config = resolve(&project, &target)?;
            config.validate()?;
            if clean::clean(&config.output_dir)? {
                log!("clean"; "removed {}", config.output_dir.display());
            } else {
                log!("clean"; "{} already absent", config.output_dir.display());
            }
        }

        Commands::Serve {
            target,
            port,
            build,
            watch: rebuild_on_change,
        } => {
            let config = resolve(&project, &target)?;
            let mut serve = DevServerConfig::from_build(&config, &project.file.serve);
            if let Some(port) = port {
                serve.port = port;
            }

            if rebuild_on_change {
                thread::spawn(move || {
                    if let Err(e) = watch::watch_and_rebuild(config, watch::DEBOUNCE) {
                        log!("watch"; "stopped: {e}");
                    }
                });
            } else if build {
                Pipeline::new(config).run().context("build failed")?;
            }

            DevServer::bind(serve)?.run()?;
        }

        Commands::Watch { target, debounce } => {
            let config = resolve(&project, &target)?;
            watch::watch_and_rebuild(config, Duration::from_millis(debounce))?;
        }
    }

    Ok(())
}

/// The `BuildConfig` for the selected profile with command-line overrides.
fn resolve(project: &Project, target: &TargetArgs) -> Result<BuildConfig> {
    let config = project
        .file
        .build_config(target.profile.as_deref(), &project.base_dir)
        .with_context(|| match &target.profile {
            Some(name) => format!("cannot resolve profile '{name}'"),
            None => "cannot resolve [build]".to_string(),
        })?;
    let cwd = env::current_dir().context("cannot read working directory")?;
    Ok(config.apply_overrides(&target.overrides(), &cwd))
}
