use chessrelay_server::Config;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_target(false).init();

    ctrlc::set_handler(|| {
        tracing::info!("received shutdown signal, exiting");
        std::process::exit(0);
    })
    .expect("failed to install ctrl-c handler");

    if let Err(e) = chessrelay_server::run(Config::default()) {
        tracing::error!(error = %e, "server exited");
        std::process::exit(1);
    }
}
