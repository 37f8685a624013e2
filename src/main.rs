mod commands;

use std::io::prelude::*;
use clap::{AppSettings, Parser, Subcommand};
use clap_num::maybe_hex;
use anyhow::Result;
use env_logger::fmt::Color;
use log::LevelFilter;

#[macro_use]
extern crate log;

/// Build and check the SPI flash boot configuration of BL60x/BL70x firmware images
#[derive(Parser, Debug)]
#[clap(
    global_setting(AppSettings::DeriveDisplayOrder)
)]
pub struct Args {
    /// Verbosity. Can be repeated
    #[clap(short, long, parse(from_occurrences), global = true)]
    verbose: u8,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a boot header, flash cfg or full image from a config file
    Build(BuildArgs),
    /// Decode a blob and print it as a config file
    Dump(InspectArgs),
    /// Check the magic codes, CRCs and image hash of a blob
    Verify(InspectArgs),
}

#[derive(clap::Args, Debug)]
pub struct BuildArgs {
    /// Config file
    pub config: String,

    /// Output file
    #[clap(short, long)]
    pub output: String,

    /// Only emit the 92 byte flash cfg section
    #[clap(long, conflicts_with_all = &["firmware", "image"])]
    pub flash_cfg_only: bool,

    /// Firmware the boot header describes
    #[clap(short, long)]
    pub firmware: Option<String>,

    /// Append the firmware at img_start after the header
    #[clap(long, requires = "firmware")]
    pub image: bool,
}

#[derive(clap::Args, Debug)]
pub struct InspectArgs {
    /// Blob to inspect
    pub input: String,

    /// Expected flash cfg magic code of a standalone flash cfg
    #[clap(long, parse(try_from_str = maybe_hex))]
    pub magic: Option<u32>,
}

fn init_logging(level: u8) {
    let lf = match level {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    // stdout carries the dump output
    env_logger::Builder::new()
        .filter_level(lf)
        .target(env_logger::Target::Stderr)
        .format(|buf, record| {
            let mut style = buf.style();
            let level = match record.level() {
                log::Level::Error => style.set_color(Color::Red).set_intense(true).value("ERROR"),
                log::Level::Warn =>  style.set_color(Color::Yellow).set_intense(true).value("WARN "),
                log::Level::Info =>  style.set_color(Color::Green).set_intense(true).value("INFO "),
                log::Level::Debug => style.set_color(Color::Cyan).set_intense(true).value("DEBUG"),
                log::Level::Trace => style.set_color(Color::Blue).set_intense(true).value("TRACE"),
            };

            writeln!(buf, "{} {}", level, record.args())
        })
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match &args.command {
        Command::Build(args) => commands::build(args),
        Command::Dump(args) => commands::dump(args),
        Command::Verify(args) => commands::verify(args),
    }
}
