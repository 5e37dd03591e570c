//! Worker process for mathpdf document enhancement.
//!
//! Reads `WorkerCommand`s from stdin and answers with `WorkerResponse`s on
//! stdout. Each process handles one document at a time; the coordinator
//! kills it to cancel work in progress. Logs go to stderr.

use std::io::{self, BufReader, BufWriter};

use anyhow::{Context, Result};
use mathpdf_core::ipc::{WorkerCommand, WorkerResponse, read_message, write_message};
use mathpdf_core::{Error, transform};

/// Environment variable holding the worker's log filter.
const LOG_ENV: &str = "MATHPDF_WORKER_LOG";

fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let mut input = BufReader::new(io::stdin().lock());
    let mut output = BufWriter::new(io::stdout().lock());

    write_message(&mut output, &WorkerResponse::Ready).context("failed to signal readiness")?;
    tracing::debug!("worker {} ready", std::process::id());

    loop {
        let command = match read_message::<_, WorkerCommand>(&mut input) {
            Ok(command) => command,
            // Coordinator closed our stdin
            Err(Error::ChannelClosed) => break,
            Err(e) => return Err(e).context("failed to read command"),
        };

        match command {
            WorkerCommand::Process { data, config } => {
                tracing::debug!("processing {} bytes", data.len());
                let response = match transform::guarded(|| {
                    transform::enhance(&data, &config).map_err(|e| e.to_string())
                }) {
                    Ok(data) => WorkerResponse::Complete { data },
                    Err(message) => {
                        tracing::warn!("{}", message);
                        WorkerResponse::Error { message }
                    }
                };
                write_message(&mut output, &response).context("failed to send response")?;
            }
            WorkerCommand::Shutdown => {
                write_message(&mut output, &WorkerResponse::ShuttingDown)
                    .context("failed to acknowledge shutdown")?;
                break;
            }
        }
    }

    Ok(())
}
