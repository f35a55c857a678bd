use crate::config::SpiConfig;
use crate::traits::{Edge, HalBackend, HalError, InputPin, IrqHandler, OutputPin, Pull, SpiBus};
use log::{debug, trace};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Attached handler. Stays in the map while it runs, so a concurrent
/// `clear_irq` or release removes it for good.
type SharedHandler = Arc<Mutex<IrqHandler>>;

/// Number of SPI buses exposed by the simulated board (SPI0 and SPI1).
const SIM_SPI_BUSES: u8 = 2;

/// Everything the simulated hardware observed, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    OutputClaimed { pin: u8, initial_high: bool },
    InputClaimed { pin: u8, pull: Pull },
    PinReleased { pin: u8 },
    Write { pin: u8, high: bool },
    Sleep(Duration),
    IrqAttached { pin: u8, edge: Edge },
    IrqCleared { pin: u8 },
    IrqFired { pin: u8, edge: Edge },
    SpiOpened(SpiConfig),
    SpiTransfer { bus: u8, len: usize },
    SpiDeinit { bus: u8 },
}

#[derive(Default)]
struct SimState {
    events: Vec<SimEvent>,
    claimed: HashSet<u8>,
    levels: HashMap<u8, bool>,
    handlers: HashMap<u8, (Edge, SharedHandler)>,
    failing_pins: HashSet<u8>,
    fail_spi_deinit: bool,
    spi_response: Vec<u8>,
    spi_sent: Vec<u8>,
    slept: Duration,
}

/// In-memory board. Clones share state, so a test can keep one handle while the
/// board owns another.
#[derive(Clone, Default)]
pub struct SimBackend {
    state: Arc<Mutex<SimState>>,
    realtime: bool,
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose `sleep` actually blocks the calling thread.
    pub fn realtime() -> Self {
        Self {
            realtime: true,
            ..Self::default()
        }
    }

    /// Make any later claim of `pin` fail with [`HalError::InvalidPin`].
    pub fn fail_claim(&self, pin: u8) {
        lock(&self.state).failing_pins.insert(pin);
    }

    pub fn fail_spi_deinit(&self) {
        lock(&self.state).fail_spi_deinit = true;
    }

    /// Bytes clocked back on MISO, repeated as needed. Empty means loopback.
    pub fn set_spi_response(&self, bytes: &[u8]) {
        lock(&self.state).spi_response = bytes.to_vec();
    }

    /// Drive an input pin externally. Dispatches the attached handler when the
    /// transition matches its edge.
    pub fn set_input(&self, pin: u8, high: bool) {
        let fired = {
            let mut state = lock(&self.state);
            let previous = state.levels.insert(pin, high).unwrap_or(false);
            let attached = state
                .handlers
                .get(&pin)
                .map(|(edge, handler)| (*edge, Arc::clone(handler)));
            match attached {
                Some((edge, handler)) if edge.matches(previous, high) => {
                    state.events.push(SimEvent::IrqFired { pin, edge });
                    Some((edge, handler))
                }
                _ => None,
            }
        };

        // The handler runs without the state lock held so it may inspect the
        // backend or release its own pin.
        if let Some((edge, handler)) = fired {
            trace!("sim: {edge:?} edge on pin {pin}");
            let mut handler = handler.lock().unwrap_or_else(PoisonError::into_inner);
            (*handler)(pin);
        }
    }

    /// Pulse an input low then high, producing exactly one rising edge.
    pub fn pulse(&self, pin: u8) {
        self.set_input(pin, false);
        self.set_input(pin, true);
    }

    pub fn events(&self) -> Vec<SimEvent> {
        lock(&self.state).events.clone()
    }

    /// Levels written to `pin` after it was claimed.
    pub fn writes(&self, pin: u8) -> Vec<bool> {
        lock(&self.state)
            .events
            .iter()
            .filter_map(|e| match e {
                SimEvent::Write { pin: p, high } if *p == pin => Some(*high),
                _ => None,
            })
            .collect()
    }

    pub fn level(&self, pin: u8) -> Option<bool> {
        lock(&self.state).levels.get(&pin).copied()
    }

    pub fn is_claimed(&self, pin: u8) -> bool {
        lock(&self.state).claimed.contains(&pin)
    }

    pub fn irq_edge(&self, pin: u8) -> Option<Edge> {
        lock(&self.state).handlers.get(&pin).map(|(edge, _)| *edge)
    }

    pub fn irq_count(&self) -> usize {
        lock(&self.state).handlers.len()
    }

    pub fn total_sleep(&self) -> Duration {
        lock(&self.state).slept
    }

    pub fn spi_sent(&self) -> Vec<u8> {
        lock(&self.state).spi_sent.clone()
    }

    fn claim(&self, pin: u8) -> Result<(), HalError> {
        let mut state = lock(&self.state);
        if state.failing_pins.contains(&pin) {
            return Err(HalError::InvalidPin(pin));
        }
        if !state.claimed.insert(pin) {
            return Err(HalError::PinUnavailable(pin));
        }
        trace!("sim: pin {pin} claimed");
        Ok(())
    }
}

impl HalBackend for SimBackend {
    fn output_pin(&mut self, pin: u8, initial_high: bool) -> Result<Box<dyn OutputPin>, HalError> {
        self.claim(pin)?;
        let mut state = lock(&self.state);
        state.levels.insert(pin, initial_high);
        state.events.push(SimEvent::OutputClaimed { pin, initial_high });
        Ok(Box::new(SimOutputPin {
            pin,
            high: initial_high,
            state: Arc::clone(&self.state),
        }))
    }

    fn input_pin(&mut self, pin: u8, pull: Pull) -> Result<Box<dyn InputPin>, HalError> {
        self.claim(pin)?;
        let mut state = lock(&self.state);
        // An externally driven level wins over the pull resistor.
        state.levels.entry(pin).or_insert(pull == Pull::Up);
        state.events.push(SimEvent::InputClaimed { pin, pull });
        Ok(Box::new(SimInputPin {
            pin,
            state: Arc::clone(&self.state),
        }))
    }

    fn open_spi(&mut self, config: &SpiConfig) -> Result<Box<dyn SpiBus>, HalError> {
        if config.bus >= SIM_SPI_BUSES {
            return Err(HalError::InvalidBus(config.bus));
        }
        debug!(
            "sim: SPI{}.{} opened at {} baud",
            config.bus, config.chip_select, config.baud_rate
        );
        lock(&self.state).events.push(SimEvent::SpiOpened(*config));
        Ok(Box::new(SimSpi {
            config: *config,
            open: true,
            state: Arc::clone(&self.state),
        }))
    }

    fn sleep(&self, duration: Duration) {
        {
            let mut state = lock(&self.state);
            state.slept += duration;
            state.events.push(SimEvent::Sleep(duration));
        }
        if self.realtime {
            std::thread::sleep(duration);
        }
    }
}

struct SimOutputPin {
    pin: u8,
    high: bool,
    state: Arc<Mutex<SimState>>,
}

impl OutputPin for SimOutputPin {
    fn pin(&self) -> u8 {
        self.pin
    }

    fn set_high(&mut self) -> Result<(), HalError> {
        self.drive(true)
    }

    fn set_low(&mut self) -> Result<(), HalError> {
        self.drive(false)
    }

    fn is_set_high(&self) -> bool {
        self.high
    }
}

impl SimOutputPin {
    fn drive(&mut self, high: bool) -> Result<(), HalError> {
        let mut state = lock(&self.state);
        state.levels.insert(self.pin, high);
        state.events.push(SimEvent::Write { pin: self.pin, high });
        self.high = high;
        Ok(())
    }
}

impl Drop for SimOutputPin {
    fn drop(&mut self) {
        release(&self.state, self.pin);
    }
}

struct SimInputPin {
    pin: u8,
    state: Arc<Mutex<SimState>>,
}

impl InputPin for SimInputPin {
    fn pin(&self) -> u8 {
        self.pin
    }

    fn is_high(&self) -> Result<bool, HalError> {
        Ok(lock(&self.state).levels.get(&self.pin).copied().unwrap_or(false))
    }

    fn set_irq(&mut self, edge: Edge, handler: IrqHandler) -> Result<(), HalError> {
        let mut state = lock(&self.state);
        state
            .handlers
            .insert(self.pin, (edge, Arc::new(Mutex::new(handler))));
        state.events.push(SimEvent::IrqAttached { pin: self.pin, edge });
        Ok(())
    }

    fn clear_irq(&mut self) -> Result<(), HalError> {
        let mut state = lock(&self.state);
        if state.handlers.remove(&self.pin).is_some() {
            state.events.push(SimEvent::IrqCleared { pin: self.pin });
        }
        Ok(())
    }
}

impl Drop for SimInputPin {
    fn drop(&mut self) {
        lock(&self.state).handlers.remove(&self.pin);
        release(&self.state, self.pin);
    }
}

fn release(state: &Mutex<SimState>, pin: u8) {
    let mut state = lock(state);
    state.claimed.remove(&pin);
    state.events.push(SimEvent::PinReleased { pin });
}

struct SimSpi {
    config: SpiConfig,
    open: bool,
    state: Arc<Mutex<SimState>>,
}

impl SpiBus for SimSpi {
    fn config(&self) -> SpiConfig {
        self.config
    }

    fn transfer(&mut self, buf: &mut [u8]) -> Result<(), HalError> {
        if !self.open {
            return Err(HalError::SpiClosed(self.config.bus));
        }
        let mut state = lock(&self.state);
        state.spi_sent.extend_from_slice(buf);
        if !state.spi_response.is_empty() {
            let response = state.spi_response.iter().cycle();
            for (byte, reply) in buf.iter_mut().zip(response) {
                *byte = *reply;
            }
        }
        state.events.push(SimEvent::SpiTransfer {
            bus: self.config.bus,
            len: buf.len(),
        });
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), HalError> {
        let mut scratch = data.to_vec();
        self.transfer(&mut scratch)
    }

    fn deinit(&mut self) -> Result<(), HalError> {
        if !self.open {
            return Err(HalError::SpiClosed(self.config.bus));
        }
        let mut state = lock(&self.state);
        if state.fail_spi_deinit {
            return Err(HalError::CommError(format!(
                "SPI{} refused to deinitialize",
                self.config.bus
            )));
        }
        self.open = false;
        state.events.push(SimEvent::SpiDeinit { bus: self.config.bus });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn double_claim_is_rejected() {
        let mut sim = SimBackend::new();
        let _led = sim.output_pin(2, false).unwrap();
        assert!(matches!(sim.output_pin(2, false), Err(HalError::PinUnavailable(2))));
        assert!(matches!(sim.input_pin(2, Pull::None), Err(HalError::PinUnavailable(2))));
    }

    #[test]
    fn dropping_a_pin_releases_the_claim() {
        let mut sim = SimBackend::new();
        let led = sim.output_pin(2, false).unwrap();
        drop(led);
        assert!(!sim.is_claimed(2));
        assert!(sim.output_pin(2, true).is_ok());
    }

    #[test]
    fn injected_claim_failure() {
        let mut sim = SimBackend::new();
        sim.fail_claim(7);
        assert!(matches!(sim.input_pin(7, Pull::Up), Err(HalError::InvalidPin(7))));
    }

    #[test]
    fn pull_up_reads_high_until_driven() {
        let mut sim = SimBackend::new();
        let switch = sim.input_pin(0, Pull::Up).unwrap();
        assert!(switch.is_high().unwrap());
        sim.set_input(0, false);
        assert!(!switch.is_high().unwrap());
    }

    #[test]
    fn rising_handler_fires_once_per_edge() {
        let mut sim = SimBackend::new();
        let mut dio = sim.input_pin(5, Pull::None).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        dio.set_irq(
            Edge::Rising,
            Box::new(move |_: u8| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

        sim.set_input(5, true);
        sim.set_input(5, true);
        sim.set_input(5, false);
        sim.pulse(5);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(sim.irq_edge(5), Some(Edge::Rising));
    }

    #[test]
    fn cleared_handler_no_longer_fires() {
        let mut sim = SimBackend::new();
        let mut dio = sim.input_pin(4, Pull::None).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        dio.set_irq(
            Edge::Rising,
            Box::new(move |_: u8| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
        dio.clear_irq().unwrap();
        sim.pulse(4);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(sim.irq_count(), 0);
    }

    #[test]
    fn handler_that_releases_its_pin_stays_detached() {
        let mut sim = SimBackend::new();
        let dio = Arc::new(Mutex::new(Some(sim.input_pin(5, Pull::None).unwrap())));
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        let owned = Arc::clone(&dio);
        let handler: IrqHandler = Box::new(move |_: u8| {
            counter.fetch_add(1, Ordering::SeqCst);
            // Release the pin from inside its own interrupt handler.
            owned.lock().unwrap().take();
        });
        dio.lock()
            .unwrap()
            .as_mut()
            .unwrap()
            .set_irq(Edge::Rising, handler)
            .unwrap();

        sim.pulse(5);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!sim.is_claimed(5));
        assert_eq!(sim.irq_count(), 0);

        let _fresh = sim.input_pin(5, Pull::None).unwrap();
        sim.pulse(5);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(sim.irq_edge(5), None);
    }

    #[test]
    fn clear_from_another_thread_during_dispatch_sticks() {
        let mut sim = SimBackend::new();
        let dio = Arc::new(Mutex::new(sim.input_pin(4, Pull::None).unwrap()));
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        let owned = Arc::clone(&dio);
        let handler: IrqHandler = Box::new(move |_: u8| {
            counter.fetch_add(1, Ordering::SeqCst);
            let owned = Arc::clone(&owned);
            std::thread::spawn(move || owned.lock().unwrap().clear_irq().unwrap())
                .join()
                .unwrap();
        });
        dio.lock().unwrap().set_irq(Edge::Rising, handler).unwrap();

        sim.pulse(4);
        assert_eq!(sim.irq_count(), 0);
        sim.pulse(4);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn spi_rejects_unknown_bus() {
        let mut sim = SimBackend::new();
        assert!(matches!(
            sim.open_spi(&SpiConfig::new(3, 0)),
            Err(HalError::InvalidBus(3))
        ));
    }

    #[test]
    fn spi_is_unusable_after_deinit() {
        let mut sim = SimBackend::new();
        let mut spi = sim.open_spi(&SpiConfig::default()).unwrap();
        spi.write(&[0x42]).unwrap();
        spi.deinit().unwrap();
        assert!(matches!(spi.write(&[0x42]), Err(HalError::SpiClosed(1))));
        assert!(matches!(spi.deinit(), Err(HalError::SpiClosed(1))));
        assert_eq!(sim.spi_sent(), vec![0x42]);
    }

    #[test]
    fn spi_response_is_clocked_back() {
        let mut sim = SimBackend::new();
        sim.set_spi_response(&[0x12]);
        let mut spi = sim.open_spi(&SpiConfig::default()).unwrap();
        let mut buf = [0x42, 0x00];
        spi.transfer(&mut buf).unwrap();
        assert_eq!(buf, [0x12, 0x12]);
    }

    #[test]
    fn sleep_is_accounted_without_blocking() {
        let sim = SimBackend::new();
        sim.sleep(Duration::from_secs(3600));
        assert_eq!(sim.total_sleep(), Duration::from_secs(3600));
    }
}
