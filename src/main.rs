use anyhow::Context;
use clap::{Parser, Subcommand};
use microcut::communication::list_ports;
use microcut::motion::run_until_idle;
use microcut::{init_logging, load_job, open_controller, tick_period, Config};
use microcut_core::{AppEvent, EventBus, EventCategory, EventFilter, JobEvent};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// Stage and laser control for the cutting microscope
#[derive(Parser, Debug)]
#[command(name = "microcut", version = microcut::VERSION, about)]
struct Cli {
    /// Path to a TOML or JSON config file (default: platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use the in-memory stage and laser instead of the serial ports
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Trace the shapes of a job file, one editor string per line
    Run {
        /// Job file
        job: PathBuf,

        /// Gate the laser along the edges
        #[arg(long)]
        cut: bool,
    },
    /// Print controller status and position
    Status,
    /// Home one axis
    Home {
        /// Axis number (1..=3)
        axis: u8,
    },
    /// List serial ports
    Ports,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => match Config::default_path() {
            Ok(path) => Ok(Config::load_or_default(&path)?),
            Err(e) => {
                tracing::warn!("{}, using default configuration", e);
                Ok(Config::default())
            }
        },
    }
}

fn log_events(events: &EventBus) {
    let filter = EventFilter::Categories(vec![
        EventCategory::Connection,
        EventCategory::Job,
        EventCategory::Laser,
    ]);
    events.subscribe(filter, |event| match event {
        AppEvent::Job(JobEvent::StepChanged { .. }) => tracing::debug!("{}", event.description()),
        AppEvent::Job(JobEvent::Aborted { .. }) => tracing::error!("{}", event.description()),
        _ => tracing::info!("{}", event.description()),
    });
}

/// Stop channel that flips to `true` on Ctrl-C
fn stop_on_interrupt() -> watch::Receiver<bool> {
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current move");
            let _ = stop_tx.send(true);
        }
    });
    stop_rx
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    let cli = Cli::parse();
    tracing::debug!("microcut {} built {}", microcut::VERSION, microcut::BUILD_DATE);

    if let Commands::Ports = cli.command {
        for port in list_ports()? {
            println!("{}\t{}", port.port_name, port.description);
        }
        return Ok(());
    }

    let config = load_config(cli.config.as_ref())?;
    let events = Arc::new(EventBus::new());
    log_events(&events);
    let period = tick_period(&config);
    let controller = Arc::new(Mutex::new(open_controller(
        &config,
        cli.simulate,
        Arc::clone(&events),
    )?));
    let stop = stop_on_interrupt();

    match cli.command {
        Commands::Run { job, cut } => {
            let instructions = load_job(&job)?;
            tracing::info!("Loaded {} instructions from {}", instructions.len(), job.display());

            controller.lock().initialize()?;
            run_until_idle(Arc::clone(&controller), period, stop.clone()).await?;

            if *stop.borrow() {
                tracing::warn!("Interrupted before the job started");
                return Ok(());
            }
            controller.lock().perform(instructions, cut)?;
            run_until_idle(Arc::clone(&controller), period, stop).await?;
            println!("Finished at {}", controller.lock().logical_position());
        }
        Commands::Status => {
            let mut controller = controller.lock();
            let status = controller.update_status()?;
            let position = controller.refresh_positions()?;
            println!("{}\t{}", status, position);
        }
        Commands::Home { axis } => {
            controller.lock().go_home(axis)?;
            run_until_idle(Arc::clone(&controller), period, stop).await?;
            println!("Axis {} at {}", axis, controller.lock().position(axis)?);
        }
        Commands::Ports => {}
    }

    Ok(())
}
