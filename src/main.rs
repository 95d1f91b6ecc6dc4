use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use ticketpool::cli::{Cli, Command, VendorCommand};
use ticketpool::controller::Controller;
use ticketpool::error::exit_code;
use ticketpool::logging::{self, LogTarget};

/// How often headless mode prints a status line
const STATUS_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS as u8),
        Err(e) => {
            eprintln!("Error: {e:#}");
            if let Some(pool_err) = e.downcast_ref::<ticketpool::Error>() {
                ExitCode::from(pool_err.exit_code() as u8)
            } else {
                ExitCode::from(exit_code::GENERAL_ERROR as u8)
            }
        }
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    cli.validate()
        .map_err(ticketpool::Error::InvalidArgument)
        .context("Invalid arguments")?;

    match &cli.command {
        Command::Run {
            duration, quiet, ..
        } => {
            run_engine(&cli, *duration, *quiet)?;
        }
        Command::Status { json } => {
            ticketpool::commands::status::run(&cli.db, *json)?;
        }
        Command::Start => ticketpool::commands::system::start(&cli.db)?,
        Command::Stop => ticketpool::commands::system::stop(&cli.db)?,
        Command::Restart { group } => ticketpool::commands::system::restart(&cli.db, *group)?,
        Command::Config { setting } => {
            ticketpool::commands::config::run(&cli.db, *setting)?;
        }
        Command::Vendors { action } => match action {
            VendorCommand::List { json } => ticketpool::commands::vendors::list(&cli.db, *json)?,
            VendorCommand::Add {
                name,
                tickets,
                rate,
            } => ticketpool::commands::vendors::add(&cli.db, name, *tickets, *rate)?,
            VendorCommand::Update {
                id,
                name,
                tickets,
                rate,
            } => ticketpool::commands::vendors::update(
                &cli.db,
                *id,
                name.clone(),
                *tickets,
                *rate,
            )?,
            VendorCommand::Remove { id } => ticketpool::commands::vendors::remove(&cli.db, *id)?,
        },
        Command::Sales { limit, json, csv } => {
            ticketpool::commands::sales::run(&cli.db, *limit, *json, *csv)?;
        }
        Command::Completions { shell } => {
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "ticketpool", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn run_engine(cli: &Cli, duration: Option<Duration>, quiet: bool) -> anyhow::Result<()> {
    // The console owns the terminal, so logs only go to a file there
    let target = match (&cli.log_file, quiet) {
        (Some(path), _) => LogTarget::File(path.clone()),
        (None, true) => LogTarget::Stderr,
        (None, false) => LogTarget::Off,
    };
    logging::init(cli.log_level.into(), target).context("Failed to set up logging")?;

    eprintln!("Database: {}", cli.db.display());
    let controller = ticketpool::commands::run::boot_engine(&cli.db, cli.engine_settings())
        .context("Failed to start engine")?;

    let result = if quiet {
        run_headless(&controller, duration)
    } else {
        ticketpool::tui::run(controller.clone(), duration).map_err(anyhow::Error::from)
    };

    controller.shutdown();
    result
}

fn run_headless(controller: &Arc<Controller>, duration: Option<Duration>) -> anyhow::Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl-C handler")?;

    let start = Instant::now();
    let mut last_report = Instant::now();

    eprintln!("Engine running (Ctrl-C to stop)...");

    while running.load(Ordering::SeqCst) {
        if let Some(max_duration) = duration
            && start.elapsed() >= max_duration
        {
            break;
        }

        if last_report.elapsed() >= STATUS_INTERVAL {
            let snap = controller.market().pool().snapshot();
            let status = controller
                .status()
                .map(|s| s.to_string())
                .unwrap_or_else(|_| "unknown".to_string());
            eprintln!(
                "Status: {} | Tickets: {}/{} | Elapsed: {:?}",
                status,
                snap.total_tickets,
                snap.max_capacity,
                Duration::from_secs(start.elapsed().as_secs())
            );
            last_report = Instant::now();
        }

        std::thread::sleep(Duration::from_millis(50));
    }

    eprintln!("Shutting down...");
    Ok(())
}
