// iio-source/src/bin/riio_source.rs
//
// Copyright (c) 2025, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//

//! Rust application to stream samples from an Industrial I/O device.
//!
//! This drives an [`IioSource`] with a minimal scheduler loop: each tick
//! it runs one work cycle, prints how many samples were produced, and
//! then drains the output ports. It stops after `--count` batches or on
//! Ctrl-C.
//!
//! With `--sim` it streams from a simulated A/D converter, so it can be
//! tried on a machine without IIO hardware.
//!

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use iio_source::{
    sim::{SimChannel, SimContext, SimDevice},
    Backend, Channel, DataFormat, Device, IioSource, SourceConfig, WorkInfo, WorkStatus,
    DFLT_BUFFER_SIZE,
};
use log::{debug, info};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

const SIM_DEV_NAME: &str = "iio:device0";

const DFLT_TIMEOUT_MS: u64 = 1000;

// --------------------------------------------------------------------------

/// Options for the streaming loop, taken from the command line.
#[derive(Debug)]
struct Opts {
    timeout: Duration,
    count: Option<usize>,
}

/// A two-channel A/D converter with a timestamp, like the ADS1015
/// examples, but generated in-process.
fn sim_context() -> (SimContext, SimDevice) {
    let dev = SimDevice::new(SIM_DEV_NAME)
        .with_name("sim-adc")
        .with_attr("sampling_frequency", "1600")
        .with_channel(
            SimChannel::new("voltage0", DataFormat::integer(16, true))
                .with_attr("raw", "0")
                .with_attr("scale", "3.0"),
        )
        .with_channel(
            SimChannel::new("voltage1", DataFormat::integer(16, true))
                .with_attr("raw", "0")
                .with_attr("scale", "3.0"),
        )
        .with_channel(SimChannel::new("timestamp", DataFormat::integer(64, true)));
    (SimContext::new().with_device(dev.clone()), dev)
}

/// Prints the devices of a backend along with their channels and
/// attributes.
fn list<B: Backend>(backend: &B) -> Result<()> {
    let devs = backend.devices()?;
    println!("{} device(s) found:", devs.len());

    for dev in devs {
        println!(
            "\t{}: {}",
            dev.id(),
            dev.name().unwrap_or_else(|| "<unknown>".to_string())
        );
        for attr in dev.attrs() {
            let val = dev
                .attr_read_str(&attr)
                .unwrap_or_else(|_| String::from("Unknown"));
            println!("\t\t{}: {}", attr, val);
        }

        let chans = dev.channels();
        println!("\t\t{} channel(s) found:", chans.len());
        for chan in chans {
            let dir = if chan.is_output() { "output" } else { "input" };
            let kind = if chan.is_scan_element() {
                chan.data_format().to_string()
            }
            else {
                String::from("attributes only")
            };
            println!("\t\t\t{} ({}, {})", chan.id(), dir, kind);
            for attr in chan.attrs() {
                let val = chan
                    .attr_read_str(&attr)
                    .unwrap_or_else(|_| String::from("Unknown"));
                println!("\t\t\t\t'{}': {}", attr, val);
            }
        }
    }
    Ok(())
}

/// Builds the source configuration from the command line.
fn config(args: &ArgMatches, dev_name: &str) -> SourceConfig {
    let chans: Vec<String> = args
        .get_many::<String>("channel")
        .map(|vals| vals.cloned().collect())
        .unwrap_or_default();

    SourceConfig::new(dev_name)
        .channel_ids(chans)
        .buffer_size(
            args.get_one::<usize>("buffer_size")
                .copied()
                .unwrap_or(DFLT_BUFFER_SIZE),
        )
        .enable_ports(!args.get_one::<bool>("no_ports").copied().unwrap_or(false))
}

/// Runs the source until the batch count is reached or `quit` is set.
///
/// `before_tick` is called ahead of each work cycle.
fn stream<D, F>(
    src: &mut IioSource<D>,
    opts: &Opts,
    quit: &AtomicBool,
    mut before_tick: F,
) -> Result<()>
where
    D: Device,
    F: FnMut() -> Result<()>,
{
    println!(
        "Streaming from '{}': {} control(s), {} port(s)",
        src.config().device_id,
        src.controls().len(),
        src.outputs().len()
    );
    for port in src.outputs() {
        println!("  {} [{}]", port.name(), port.format());
    }

    src.activate().context("Unable to activate the source")?;

    let mut nbatch = 0;
    while !quit.load(Ordering::SeqCst) {
        if opts.count.map_or(false, |n| nbatch >= n) {
            break;
        }
        before_tick()?;

        let info = WorkInfo::new(opts.timeout, src.min_out_elements());
        match src.work(&info)? {
            WorkStatus::Produced(n) => {
                nbatch += 1;
                println!("Batch {}: {} sample(s)", nbatch, n);
            }
            WorkStatus::Yielded => debug!("No data before the timeout"),
            WorkStatus::Backpressured => debug!("Ports are full"),
            WorkStatus::Idle => {
                // Nothing can ever arrive without a buffer
                info!("Source has no buffer to stream");
                break;
            }
        }

        let names: Vec<String> = src.outputs().iter().map(|p| p.name().to_string()).collect();
        for name in names {
            if let Some(port) = src.output_mut(&name) {
                let _ = port.take();
            }
        }
    }

    src.deactivate();
    for port in src.outputs() {
        println!("{}: {} sample(s) total", port.name(), port.total_produced());
    }
    Ok(())
}

#[cfg(feature = "libiio")]
fn hw_context(args: &ArgMatches) -> Result<iio_source::iio::Context> {
    let ctx = if let Some(uri) = args.get_one::<String>("uri") {
        iio_source::iio::Context::from_uri(uri)
    }
    else {
        iio_source::iio::Context::new()
    };
    ctx.context("Couldn't open IIO context")
}

#[cfg(feature = "libiio")]
fn run_hw(args: &ArgMatches, opts: &Opts, quit: &AtomicBool) -> Result<()> {
    let ctx = hw_context(args)?;
    info!("Using {} (libiio {})", ctx.description(), iio_source::iio::library_version());

    if args.get_one::<bool>("list").copied().unwrap_or(false) {
        return list(&ctx);
    }

    let dev_name = match args.get_one::<String>("device") {
        Some(name) => name,
        None => bail!("A device must be specified with --device"),
    };

    let mut src = IioSource::new(&ctx, config(args, dev_name))
        .with_context(|| format!("Couldn't open source for '{}'", dev_name))?;
    stream(&mut src, opts, quit, || Ok(()))
}

#[cfg(not(feature = "libiio"))]
fn run_hw(_args: &ArgMatches, _opts: &Opts, _quit: &AtomicBool) -> Result<()> {
    bail!("Built without libiio support; use --sim")
}

fn run() -> Result<()> {
    let cmd = Command::new("riio_source")
        .version(clap::crate_version!())
        .about("Rust IIO streaming source.")
        .disable_help_flag(true)
        .arg(
            Arg::new("help")
                .short('?')
                .long("help")
                .global(true)
                .action(ArgAction::Help)
                .help("Print help information"),
        )
        .arg(
            Arg::new("list")
                .short('l')
                .long("list")
                .action(ArgAction::SetTrue)
                .help("List the devices and exit"),
        )
        .arg(
            Arg::new("sim")
                .short('s')
                .long("sim")
                .action(ArgAction::SetTrue)
                .help("Stream from a simulated device"),
        )
        .arg(
            Arg::new("device")
                .short('d')
                .long("device")
                .action(ArgAction::Set)
                .help("Specifies the ID of the IIO device to stream"),
        )
        .arg(
            Arg::new("channel")
                .short('c')
                .long("channel")
                .action(ArgAction::Append)
                .help("Specifies a channel to stream (default: all inputs)"),
        )
        .arg(
            Arg::new("buffer_size")
                .short('b')
                .long("buffer-size")
                .action(ArgAction::Set)
                .value_parser(value_parser!(usize))
                .help("The number of samples per channel in each refill"),
        )
        .arg(
            Arg::new("no_ports")
                .long("no-ports")
                .action(ArgAction::SetTrue)
                .help("Don't declare output ports or reserve a buffer"),
        )
        .arg(
            Arg::new("timeout_ms")
                .short('t')
                .long("timeout-ms")
                .action(ArgAction::Set)
                .value_parser(value_parser!(u64))
                .help("The longest a tick may wait for data, in milliseconds"),
        )
        .arg(
            Arg::new("count")
                .short('n')
                .long("count")
                .action(ArgAction::Set)
                .value_parser(value_parser!(usize))
                .help("Stop after this many batches"),
        );

    #[cfg(feature = "libiio")]
    let cmd = cmd.arg(
        Arg::new("uri")
            .short('u')
            .long("uri")
            .action(ArgAction::Set)
            .conflicts_with("sim")
            .help("Use the context with the provided URI"),
    );

    let args = cmd.get_matches();

    let opts = Opts {
        timeout: Duration::from_millis(
            args.get_one::<u64>("timeout_ms")
                .copied()
                .unwrap_or(DFLT_TIMEOUT_MS),
        ),
        count: args.get_one::<usize>("count").copied(),
    };

    let quit = Arc::new(AtomicBool::new(false));
    let q = quit.clone();
    ctrlc::set_handler(move || {
        q.store(true, Ordering::SeqCst);
    })
    .context("Error setting Ctrl-C handler")?;

    if !args.get_one::<bool>("sim").copied().unwrap_or(false) {
        return run_hw(&args, &opts, &quit);
    }

    let (ctx, dev) = sim_context();
    if args.get_one::<bool>("list").copied().unwrap_or(false) {
        return list(&ctx);
    }

    let dev_name = args
        .get_one::<String>("device")
        .map(|s| s.as_str())
        .unwrap_or(SIM_DEV_NAME);

    let mut src = IioSource::new(&ctx, config(&args, dev_name))
        .with_context(|| format!("Couldn't open source for '{}'", dev_name))?;

    // The simulated sample clock: one full buffer per tick
    stream(&mut src, &opts, &quit, || {
        if has_live_buffer(&dev) {
            dev.signal_ready()?;
        }
        Ok(())
    })
}

/// Determines if the simulated device has a buffer to signal.
fn has_live_buffer(dev: &SimDevice) -> bool {
    dev.stats().live_buffers > 0
}

// --------------------------------------------------------------------------

fn main() {
    env_logger::init();

    if let Err(err) = run() {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}
