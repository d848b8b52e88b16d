use clap::Parser;

mod app;
mod args;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let args = args::Args::parse();

    // the frontend owns stdout, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(?args, "starting adapter");

    let options = app::Options {
        port: args.port,
        debugger: args.debugger,
    };
    app::run(tokio::io::stdin(), tokio::io::stdout(), options).await
}
