use anyhow::Context;
use callpad::args::CommandLineArgs;
use callpad::config::{get_state_dir, LOG_LEVEL_ENV_VAR};
use callpad::http::HttpClient;
use callpad::repl::Repl;
use callpad::session::Session;
use tracing_subscriber::{fmt::time::ChronoLocal, EnvFilter};

fn init_tracing_subscriber() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_env(LOG_LEVEL_ENV_VAR)
                .add_directive("reqwest=warn".parse()?)
                .add_directive("hyper=warn".parse()?)
                .add_directive("hyper_util=warn".parse()?)
                .add_directive("rustls=warn".parse()?)
                .add_directive("rustyline=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_timer(ChronoLocal::rfc_3339())
        .init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_tracing_subscriber()?;
    let args = CommandLineArgs::get();

    let state_dir = args.state_dir().cloned().unwrap_or_else(get_state_dir);
    tracing::debug!("state directory: {}", state_dir.display());

    let client = if args.no_proxy() {
        HttpClient::without_proxy()?
    } else {
        HttpClient::new()?
    };
    let (mut session, errors) = Session::with_client(&state_dir, client)
        .with_context(|| format!("failed to open {}", state_dir.display()))?;
    for e in &errors {
        tracing::warn!("{}", e);
        eprintln!("warning: {e}");
    }

    if let Some(path) = args.env_file() {
        session
            .load_home_file(path)
            .with_context(|| format!("failed to load {path}"))?;
    }

    let mut repl = Repl::new(session, args.verbose());
    repl.run()
}
