use std::{process::ExitCode, sync::Arc};

use graphsync::{
    application::{
        error::AppError,
        session::{EditorSession, SessionConfig},
    },
    config,
    infra::{replay, sim::InMemoryServer, telemetry},
};
use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report_application_error(&error);
            error.exit_code()
        }
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report();
    let emit = || {
        error!(
            error = %error,
            chain = ?report.messages,
            hint = error.presentation_message(),
            "application error"
        );
    };

    if dispatcher::has_been_set() {
        emit();
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, emit);
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match cli_args.command.unwrap_or(config::Command::Catalog) {
        config::Command::Replay(args) => run_replay(&settings, args).await,
        config::Command::Catalog => run_catalog(),
    }
}

async fn run_replay(settings: &config::Settings, args: config::ReplayArgs) -> Result<(), AppError> {
    let script = replay::load(&args.script).await?;
    info!(
        script = %args.script.display(),
        actions = script.actions.len(),
        "Replay script loaded"
    );

    let server = Arc::new(InMemoryServer::new());
    let mut session = EditorSession::attach(server.clone(), SessionConfig::from(settings));
    let report = replay::run(&script, &mut session).await;
    info!(requests = server.request_count(), "Server requests issued");

    print_json(&report)
}

fn run_catalog() -> Result<(), AppError> {
    print_json(&InMemoryServer::new().catalog())
}

fn print_json(value: &impl Serialize) -> Result<(), AppError> {
    let encoded = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to encode output: {err}")))?;
    println!("{encoded}");
    Ok(())
}

