use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::time::Duration;
use tokio_graceful_shutdown::{SubsystemBuilder, Toplevel};

use lapgate_server::{config, timing::Timing, Cli, Session, VERSION};
use web::Web;

mod web;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();

    log::info!("Lapgate server {} starting", VERSION);

    let reader_config = config::load_reader_config(&args.config, args.reader.as_deref())?;
    let data_dir = config::data_dir(&args);
    let timing = Timing::open(&data_dir, reader_config, args.cooldown).into_diagnostic()?;

    Toplevel::new(move |s| async move {
        let session = Session::new(&s, args, timing);
        let web = Web::new(session);

        s.start(SubsystemBuilder::new("Webserver", |a| web.run(a)));
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_millis(5000))
    .await
    .map_err(Into::into)
}
