//! callbridge CLI: fetch one URL through the call adapter layer.
//!
//! ```text
//! args -> HttpConfig -> HttpClient::new_call -> CallAdapterFactory::get
//!      -> {Body,Response}CallAdapter::adapt -> CallFuture (.await or Ctrl-C cancel)
//! ```

mod args;

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use callbridge_core::{CallAdapter, CallAdapterFactory, CallFuture, Response, TypeDescriptor};
use callbridge_http::{HttpClient, HttpConfig, StringConverter};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::args::Args;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // stdout carries the response; logs go to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    fetch(args).await
}

async fn fetch(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => HttpConfig::load(path)?,
        None => HttpConfig::default().with_env_overrides(),
    };
    let client = HttpClient::new(config).context("failed to set up HTTP client")?;

    let declared: TypeDescriptor = if args.envelope {
        "CallFuture<Response<String>>"
    } else {
        "CallFuture<String>"
    }
    .parse()?;
    let adapter = CallAdapterFactory::new()
        .get(&declared)?
        .ok_or_else(|| anyhow!("no call adapter for {declared}"))?;

    let call = Arc::new(client.new_call(client.get(&args.url), StringConverter));
    tracing::debug!(url = %args.url, %declared, "Starting call");

    match adapter {
        CallAdapter::Body(adapter) => {
            let body = await_or_cancel(adapter.adapt(call)).await?;
            let mut stdout = io::stdout().lock();
            write!(stdout, "{body}")?;
            stdout.flush()?;
        }
        CallAdapter::Response(adapter) => {
            let response = await_or_cancel(adapter.adapt(call)).await?;
            let mut stdout = io::stdout().lock();
            print_envelope(&mut stdout, &response)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

/// Await `future`, canceling the call on Ctrl-C.
async fn await_or_cancel<T>(mut future: CallFuture<T>) -> Result<T> {
    tokio::select! {
        result = &mut future => Ok(result?),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, canceling call");
            future.cancel();
            Ok(future.await?)
        }
    }
}

fn print_envelope(out: &mut impl Write, response: &Response<String>) -> io::Result<()> {
    writeln!(out, "{} {}", response.status(), response.reason())?;
    for (name, value) in response.headers().iter() {
        writeln!(out, "{name}: {value}")?;
    }
    writeln!(out)?;
    match (response.body(), response.error_body()) {
        (Some(body), _) => write!(out, "{body}"),
        (None, Some(error)) => write!(out, "{}", error.text()),
        (None, None) => Ok(()),
    }
}
