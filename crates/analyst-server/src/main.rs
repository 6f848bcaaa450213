use analyst_server::{cli, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let matches = cli::command().get_matches();
    init_tracing(matches.get_flag("log-json")).map_err(|e| anyhow::anyhow!(e))?;

    let config = cli::load_config(&matches)?;
    cli::dispatch(matches, config).await
}
