//! selcast - X11 selection manager
//!
//! Entry point for the binary: flags, logging, payload capture, then hand
//! off to the protocol engine.

use std::io::{IsTerminal, Write};
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use selcast::cli::Args;
use selcast::selection::acquire::Acquired;
use selcast::selection::{acquire, dispatch, ServeEngine};
use selcast::x11::{DisplayConn, ProtocolAtoms, SelectionTokens, XDisplay};
use selcast::{daemon, payload};

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(err) = init_logging(&args) {
        eprintln!("selcast: {err:#}");
        return ExitCode::FAILURE;
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("selcast: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let mut dpy = XDisplay::open(args.display.as_deref())?;

    let tokens = SelectionTokens {
        selection: dpy.resolve(args.selection_name())?,
        target: dpy.resolve(&args.target)?,
        stage: dpy.atoms().SELCAST_STAGE,
    };
    let proto = ProtocolAtoms::from(dpy.atoms());
    debug!(
        selection = args.selection_name(),
        target_name = %args.target,
        "tokens resolved"
    );

    let captured = if std::io::stdin().is_terminal() {
        acquire::acquire(&mut dpy, tokens, proto, args.peer_wait())?
    } else {
        let payload = payload::from_reader(std::io::stdin().lock())?;
        let time = dpy.server_time()?;
        Acquired { payload, time }
    };

    // The payload is always echoed once before any serving happens.
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&captured.payload)?;
    stdout.flush()?;
    drop(stdout);

    if args.out_only {
        dpy.close();
        return Ok(());
    }

    let mut engine = ServeEngine::new(tokens, proto, captured.payload, captured.time);
    engine.claim(&mut dpy)?;

    // Detach only now: the payload is out and ownership is confirmed, so
    // backgrounding cannot leave the selection unowned.
    if !args.foreground {
        daemon::detach()?;
    }

    dispatch::run(&mut dpy, &mut engine, args.peer_wait())?;
    debug!("ownership released, exiting");
    dpy.close();
    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("selcast={level}")));

    if let Some(path) = &args.log_file {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let name = path
            .file_name()
            .context("log file path has no file name")?;
        // A blocking appender: the non-blocking writer's worker thread would
        // not survive the daemonization fork.
        let appender = tracing_appender::rolling::never(dir, name);
        init_fmt(filter, &args.log_format, appender, false);
    } else {
        init_fmt(filter, &args.log_format, std::io::stderr, true);
    }
    Ok(())
}

fn init_fmt<W>(filter: EnvFilter, format: &str, writer: W, ansi: bool)
where
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi);
    match format {
        "json" => builder.json().init(),
        "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }
}
