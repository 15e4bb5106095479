use clap::Parser;
use seating_solver::config::ServerConfig;
use seating_solver::server;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = ServerConfig::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_filter))
        .init();

    server::run_server(config).await
}
