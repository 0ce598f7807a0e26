//! # breadcrumbs - Listener Entry Point
//!
//! Receives the datagrams a traced driver sends, prints one
//! `breadcrumb:occurrence` line per datagram and, on exit, the breakpoint
//! that would stop a rerun right where this run ended.

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, warn};
use std::fs::File;
use std::io::BufWriter;
use std::net::SocketAddrV4;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;

use breadcrumbs::cli::Args;
use breadcrumbs::config::CONFIG_ENV;
use breadcrumbs::domain::ListenerError;
use breadcrumbs::listener::BreadcrumbTrail;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_NOPERM: i32 = 77;

/// Largest datagram looked at; anything longer is malformed anyway
const RECV_BUF_LEN: usize = 64;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let denied = err.chain().any(|cause| {
        cause
            .downcast_ref::<std::io::Error>()
            .is_some_and(|e| e.kind() == std::io::ErrorKind::PermissionDenied)
    });
    if denied {
        EXIT_NOPERM
    } else {
        EXIT_ERROR
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    let addr = SocketAddrV4::new(args.bind, args.port);
    let socket = UdpSocket::bind(addr)
        .await
        .map_err(|source| ListenerError::BindFailed { addr: addr.to_string(), source })
        .context("Failed to start listener")?;

    if !quiet {
        println!("breadcrumbs v{}", env!("CARGO_PKG_VERSION"));
        println!("listening: {addr}");
        if let Some(ref export_path) = args.export {
            println!("export: {}", export_path.display());
        }
    }

    let mut trail = BreadcrumbTrail::new();

    // Setup Ctrl+C handler
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let started = Instant::now();
    let duration = args.duration;
    let duration_limit = async move {
        if duration > 0 {
            tokio::time::sleep_until(started + Duration::from_secs(duration)).await;
        } else {
            std::future::pending::<()>().await;
        }
    };
    tokio::pin!(duration_limit);

    let mut buf = [0u8; RECV_BUF_LEN];
    let mut received: u64 = 0;

    let exit_reason = loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => {
                let (len, peer) = result
                    .map_err(ListenerError::from)
                    .context("Failed to receive datagram")?;

                let Some(entry) = trail.record_datagram(&buf[..len]) else {
                    warn!("ignoring {len}-byte datagram from {peer}");
                    continue;
                };
                debug!("breadcrumb {} from {peer}", entry.breadcrumb);
                if !quiet {
                    println!("{entry}");
                }

                received += 1;
                if args.count > 0 && received >= args.count {
                    break "count reached";
                }
            }
            () = &mut duration_limit => {
                break "duration limit reached";
            }
            _ = &mut ctrl_c => {
                break "interrupted";
            }
        }
    };

    eprintln!(
        "\n{}: {:.1}s, {} breadcrumbs, {} malformed",
        exit_reason,
        started.elapsed().as_secs_f64(),
        trail.len(),
        trail.malformed()
    );

    match (trail.last(), trail.suggested_breakpoint()) {
        (Some(last), Some(breakpoint)) => {
            println!("last: {last}");
            println!("rerun with {CONFIG_ENV}=<this-host>:{},{breakpoint}", args.port);
        }
        _ => println!("last: none"),
    }

    if let Some(export_path) = args.export {
        let file = File::create(&export_path).context("Failed to create trail output file")?;
        trail.export(BufWriter::new(file)).context("Failed to export trail")?;

        if !quiet {
            println!("saved: {}", export_path.display());
        }
    }

    Ok(())
}
