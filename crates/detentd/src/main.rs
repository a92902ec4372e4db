//! detentd - runs an encoder/switch surface from a YAML config
//!
//! Usage: `detentd [--config <path>] [--list-ports]`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use detent_core::{
    default_config_path, event_queue, load_config, start_midi_backend, BackendHandle,
    BridgeCounters, ChannelPool, ControlSurface, EmulatedGpio, EventSink, LogTransport, MidiBackend,
    OscTransport, SurfaceBuilder, SurfaceConfig, UdpOscTransport,
};

/// How often the main loop drains inbound events
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Interval between drop-counter reports
const STATS_EVERY: u32 = 2000;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    // Initialize logger - set RUST_LOG=debug for per-event output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if args.iter().any(|arg| arg == "--list-ports") {
        for port in detent_core::list_midi_ports() {
            println!("{}", port);
        }
        return Ok(());
    }

    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let config = load_config(&config_path);

    let pool = Arc::new(ChannelPool::with_capacity(
        config.max_encoders,
        config.max_switches,
    ));
    let backend = start_backend(&config, pool.clone());
    log::info!("detentd: MIDI backend {}", backend.handle.name());

    let osc = match config.osc_port() {
        Some(port) => Some(Arc::new(
            UdpOscTransport::connect(port).context("Failed to open OSC socket")?,
        ) as Arc<dyn OscTransport>),
        None => None,
    };
    let sink = EventSink::new(backend.transport.clone(), osc);

    let gpio = Arc::new(EmulatedGpio::new());
    let mut builder = SurfaceBuilder::new(pool, sink, backend.events, gpio.clone())
        .poll_interval(config.poll_interval());
    if config.expander_interrupts {
        builder = builder.expander(gpio);
    }
    let mut surface = builder.build().context("Failed to build control surface")?;

    apply_slots(&surface, &config)?;

    let _handle = backend.handle;
    run(&mut surface, backend.counters.as_deref())
}

/// Start the configured backend, falling back to a logging transport
fn start_backend(config: &SurfaceConfig, pool: Arc<ChannelPool>) -> MidiBackend {
    match start_midi_backend(config, pool) {
        Ok(backend) => backend,
        Err(e) => {
            log::warn!("detentd: {}, logging MIDI output instead", e);
            let (_producer, events) = event_queue(config.queue_capacity);
            MidiBackend {
                transport: Arc::new(LogTransport),
                events,
                counters: None,
                inbound: None,
                handle: BackendHandle::Detached,
            }
        }
    }
}

fn apply_slots(surface: &ControlSurface, config: &SurfaceConfig) -> Result<()> {
    for enc in &config.encoders {
        surface
            .setup_encoder(enc.slot, &enc.setup)
            .with_context(|| format!("Failed to set up encoder slot {}", enc.slot))?;
    }
    for sw in &config.switches {
        surface
            .setup_switch(sw.slot, sw.pin)
            .with_context(|| format!("Failed to set up switch slot {}", sw.slot))?;
    }
    log::info!(
        "detentd: {} encoder(s), {} switch(es) active",
        surface.pool().enabled_encoders().count(),
        surface.pool().enabled_switches().count()
    );
    Ok(())
}

fn run(surface: &mut ControlSurface, counters: Option<&BridgeCounters>) -> Result<()> {
    let mut passes: u32 = 0;
    loop {
        while let Some(event) = surface.next_event() {
            log::info!(
                "detentd: Program-Change ch={} prog={}",
                event.channel(),
                event.data1
            );
        }

        passes = passes.wrapping_add(1);
        if passes % STATS_EVERY == 0 {
            if let Some(c) = counters {
                log::debug!(
                    "detentd: dropped out={} in={} queue={} passthrough={}",
                    c.outbound_dropped(),
                    c.inbound_dropped(),
                    c.queue_full(),
                    c.passthrough_dropped()
                );
            }
        }
        std::thread::sleep(EVENT_POLL_INTERVAL);
    }
}
