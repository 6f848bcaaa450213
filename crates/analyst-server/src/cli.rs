//! Command-line interface

use crate::app::build_controller;
use crate::config::AppConfig;
use crate::http::{routes, QUESTION_FILE};
use analyst_core::{Artifact, Request};
use analyst_sandbox::Backend;
use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub fn command() -> Command {
    Command::new("analyst")
        .version(analyst_core::VERSION)
        .about("Deadline-bounded data analysis agent")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .arg(
            Arg::new("sandbox")
                .long("sandbox")
                .global(true)
                .value_parser(["docker", "process"])
                .help("Override the sandbox backend"),
        )
        .subcommand(
            Command::new("serve")
                .about("Serve POST /api/ over HTTP")
                .arg(
                    Arg::new("bind")
                        .long("bind")
                        .value_parser(value_parser!(SocketAddr))
                        .help("Listen address, overriding [server] bind"),
                ),
        )
        .subcommand(
            Command::new("run")
                .about("Answer one question from local files and print the response")
                .arg(
                    Arg::new("question")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help(format!("File holding the question, like {QUESTION_FILE}")),
                )
                .arg(
                    Arg::new("files")
                        .num_args(0..)
                        .value_parser(value_parser!(PathBuf))
                        .help("Data files to attach"),
                ),
        )
        .subcommand(Command::new("check").about("Validate configuration and print it"))
}

/// Load and validate configuration, applying command-line overrides
///
/// # Errors
/// Invalid configuration
pub fn load_config(matches: &ArgMatches) -> Result<AppConfig> {
    let path = matches.get_one::<PathBuf>("config").map(PathBuf::as_path);
    let mut config = AppConfig::load(path).context("invalid configuration")?;
    match matches.get_one::<String>("sandbox").map(String::as_str) {
        Some("process") => config.sandbox.backend = Backend::Process,
        Some("docker") => config.sandbox.backend = Backend::Docker,
        _ => {}
    }
    Ok(config)
}

/// Run the selected subcommand
///
/// # Errors
/// Startup failures and I/O errors; pipeline failures never surface here
pub async fn dispatch(matches: ArgMatches, config: AppConfig) -> Result<()> {
    match matches.subcommand() {
        Some(("serve", args)) => {
            let bind = args
                .get_one::<SocketAddr>("bind")
                .copied()
                .unwrap_or(config.server.bind);
            serve(config, bind).await
        }
        Some(("run", args)) => {
            let question = args
                .get_one::<PathBuf>("question")
                .context("question file is required")?;
            let files: Vec<&PathBuf> = args.get_many::<PathBuf>("files").into_iter().flatten().collect();
            run_once(&config, question, &files).await
        }
        Some(("check", _)) => {
            println!("{config:#?}");
            Ok(())
        }
        _ => Ok(()),
    }
}

async fn serve(config: AppConfig, bind: SocketAddr) -> Result<()> {
    let controller = Arc::new(build_controller(&config)?);
    let (addr, server) = warp::serve(routes(controller, config.max_upload_bytes()))
        .try_bind_with_graceful_shutdown(bind, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(%addr, "listening");
    server.await;
    info!("shut down");
    Ok(())
}

async fn run_once(config: &AppConfig, question: &Path, files: &[&PathBuf]) -> Result<()> {
    let text = tokio::fs::read_to_string(question)
        .await
        .with_context(|| format!("failed to read {}", question.display()))?;

    let mut builder = Request::builder(text);
    for path in files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("{} has no file name", path.display()))?;
        builder = builder.artifact(Artifact::inferred(name, bytes)?);
    }
    let request = builder.build()?;

    let controller = build_controller(config)?;
    let response = controller.run(request).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
