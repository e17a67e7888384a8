// Copyright 2025-2026 CEMAXECUTER LLC

use ais_receiver::burst::BurstDecoder;
use ais_receiver::Decoder;

use crate::config::{Cli, RuntimeConfig};
use crate::daemon::{self, Role};
use crate::error::InitError;
use crate::logging;
use crate::pipeline::LoopSummary;
use crate::session::{DecoderFactory, Session};
use crate::signals::{self, ProcessFlags};
use crate::stats;

/// Whole process lifecycle. Returns the exit status.
pub fn run(cli: &Cli) -> i32 {
    if let Err(e) = logging::init(cli.log_file.as_deref(), cli.verbose) {
        eprintln!("aisrx: {}", e);
        return 1;
    }
    log::info!("Starting up...");

    let code = match RuntimeConfig::load(cli) {
        Ok(config) => run_with_config(config),
        Err(e) => {
            log::error!("Initial configuration failed: {}", e);
            1
        }
    };

    logging::close();
    code
}

fn run_with_config(config: RuntimeConfig) -> i32 {
    if config.daemonize {
        match daemon::fork_to_background() {
            Ok(Role::Parent(pid)) => {
                log::info!("Forked daemon process {}, parent quitting", pid);
                return 0;
            }
            Ok(Role::Child) => {}
            Err(e) => {
                log::error!("{}", e);
                return 1;
            }
        }
        if let Some(ref path) = config.pidfile {
            if let Err(e) = daemon::write_pidfile(path) {
                log::error!("{}", e);
                return 1;
            }
        }
    }

    if let Err(e) = signals::install_handlers() {
        log::error!("{}", e);
        return 1;
    }

    let squelch = config.squelch_db;
    let mut make_decoder =
        |_label: char| -> Box<dyn Decoder> { Box::new(BurstDecoder::new(squelch)) };
    let mut clock = stats::wall_clock;

    let code = match serve(&config, signals::process_flags(), &mut make_decoder, &mut clock) {
        Ok(_) => 0,
        Err(e) => {
            log::error!("{}", e);
            1
        }
    };
    // Configuration is released only after teardown
    drop(config);
    code
}

/// Start every subsystem, run the capture loop until drained, then tear
/// down. A startup failure tears down whatever had been acquired.
pub fn serve(
    config: &RuntimeConfig,
    flags: &ProcessFlags,
    make_decoder: &mut DecoderFactory<'_>,
    clock: &mut dyn FnMut() -> i64,
) -> Result<LoopSummary, InitError> {
    let mut session = Session::start(config, make_decoder)?;
    log::info!("Started");

    let summary = session.run(config, flags, clock);

    log::info!("Closing down...");
    session.teardown();
    Ok(summary)
}
