use crate::cli::run;

pub mod cli;
mod config;
mod covers;
pub mod domain;
pub mod http;
mod ingest;
mod proxy;
mod public_endpoint;
pub mod remote;
pub mod storage;
mod tags;

fn main() -> anyhow::Result<()> {
    run()
}
