//! CLI argument definitions

use clap::Parser;
use std::net::Ipv4Addr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "breadcrumbs",
    about = "Receive GPU breadcrumbs and report where a hang happened",
    after_help = "\
WORKFLOW:
    breadcrumbs --port 9999
    GPU_BREADCRUMBS=<this-host>:9999,break=-1:0 ./app        Discovery run
    GPU_BREADCRUMBS=<this-host>:9999,break=LAST:HITS ./app   Stop before the hang

    Raise the GPU hangcheck period first, e.g.
    echo -n 60000 > /sys/kernel/debug/dri/0/hangcheck_period_ms"
)]
pub struct Args {
    /// UDP port to listen on
    #[arg(short, long, default_value = "9999")]
    pub port: u16,

    /// Address to bind
    #[arg(short, long, default_value_t = Ipv4Addr::UNSPECIFIED)]
    pub bind: Ipv4Addr,

    /// Export the received trail as JSON
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Stop after N seconds (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub duration: u64,

    /// Stop after N breadcrumbs (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub count: u64,

    /// Only print the summary
    #[arg(short, long)]
    pub quiet: bool,
}
