use log::{error, info};
use std::time::Duration;
use sx127x_board::{Board, BoardConfig, BoardError};
use sx127x_hal::sim::SimBackend;

fn usage() -> ! {
    eprintln!(
        "Usage: sx127x_board [board.toml] [half_period_ms] [count]\n\
         \n\
         Brings the board up on the simulated HAL, opens the SPI device,\n\
         attaches DIO0/DIO1/switch handlers, blinks the LED and tears down.\n\
         \n\
         Examples:\n\
           sx127x_board config/board_sim.toml 100 2\n\
           RUST_LOG=debug sx127x_board"
    );
    std::process::exit(2)
}

fn parse_u64(s: &str, name: &str) -> u64 {
    s.parse::<u64>().unwrap_or_else(|_| {
        eprintln!("Invalid {name}: {s}");
        usage()
    })
}

fn run(config: BoardConfig, half_period: Duration, count: u32) -> Result<(), BoardError> {
    let sim = SimBackend::realtime();
    let mut board = Board::setup_with(sim.clone(), config)?;
    let pins = *board.pins();

    let spi = board.spi()?;
    let spi_config = spi.lock().map_err(|_| BoardError::SpiPoisoned)?.config();
    info!("SPI{}.{} ready", spi_config.bus, spi_config.chip_select);

    board.add_events(
        Box::new(|pin: u8| info!("DIO0 (pin {pin}) rising edge")),
        Box::new(|pin: u8| info!("DIO1 (pin {pin}) rising edge")),
        Some(Box::new(|pin: u8| info!("switch (pin {pin}) released"))),
    )?;
    sim.pulse(pins.dio0);
    sim.pulse(pins.dio1);

    board.blink(half_period, count)?;
    info!("switch reads {}", if board.read_switch()? { "high" } else { "low" });

    board.teardown()?;
    Ok(())
}

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    if args.len() > 3 {
        usage();
    }
    let config = match args.next() {
        Some(path) if path == "-h" || path == "--help" => usage(),
        Some(path) => BoardConfig::from_file(&path).unwrap_or_else(|e| {
            eprintln!("failed to load board config: {e}");
            std::process::exit(1)
        }),
        None => BoardConfig::default(),
    };
    let half_period = args
        .next()
        .map(|s| parse_u64(&s, "half_period_ms"))
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.startup.half_period());
    let count = args
        .next()
        .map(|s| parse_u64(&s, "count"))
        .unwrap_or(3);
    let count = u32::try_from(count).unwrap_or_else(|_| {
        eprintln!("Invalid count: {count}");
        usage()
    });

    if let Err(e) = run(config, half_period, count) {
        error!("board error: {e}");
        eprintln!("board error: {e}");
        std::process::exit(1);
    }
}
