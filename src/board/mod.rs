//! Board bring-up for the Raspberry Pi + modtronix inAir9B SX127x module.
//!
//! A [`Board`] value is the set of live pin handles plus the SPI device. It only
//! exists between [`Board::setup`] and [`Board::teardown`]; teardown consumes it.

use log::{debug, info};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sx127x_hal::{Edge, HalBackend, InputPin, IrqHandler, OutputPin, Pull, SpiBus, SpiConfig};

use crate::config::BoardConfig;
use crate::error::BoardError;
use crate::pins::PinAssignment;

/// SPI device shared between the board and the radio driver.
pub type SpiHandle = Arc<Mutex<Box<dyn SpiBus>>>;

/// Input line that can raise an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLine {
    Dio0,
    Dio1,
    Switch,
}

/// Fire `callback` on every rising edge of `pin`.
pub fn add_event_detect(pin: &mut dyn InputPin, callback: IrqHandler) -> Result<(), BoardError> {
    pin.set_irq(Edge::Rising, callback)?;
    debug!("rising-edge handler attached to pin {}", pin.pin());
    Ok(())
}

pub struct Board<H: HalBackend> {
    hal: H,
    config: BoardConfig,
    led: Box<dyn OutputPin>,
    switch: Box<dyn InputPin>,
    dio0: Box<dyn InputPin>,
    dio1: Box<dyn InputPin>,
    spi: Option<SpiHandle>,
}

impl<H: HalBackend> Board<H> {
    /// Set up the reference board wiring.
    pub fn setup(hal: H) -> Result<Self, BoardError> {
        Self::setup_with(hal, BoardConfig::default())
    }

    /// Claim and configure every pin in `config`, then give the startup blink.
    ///
    /// LED: output, driven low. Switch: input with pull-up. DIO0/DIO1: plain inputs.
    /// Pins claimed before a failing claim are released again.
    pub fn setup_with(mut hal: H, config: BoardConfig) -> Result<Self, BoardError> {
        config.validate()?;
        let pins = config.pins;

        let led = hal.output_pin(pins.led, false)?;
        let switch = hal.input_pin(pins.switch, Pull::Up)?;
        let dio0 = hal.input_pin(pins.dio0, Pull::None)?;
        let dio1 = hal.input_pin(pins.dio1, Pull::None)?;
        info!(
            "{}: LED={} SWITCH={} DIO0={} DIO1={} configured",
            config.board.name, pins.led, pins.switch, pins.dio0, pins.dio1
        );

        let mut board = Self {
            hal,
            config,
            led,
            switch,
            dio0,
            dio1,
            spi: None,
        };
        let startup = board.config.startup;
        board.blink(startup.half_period(), startup.blink_count)?;
        Ok(board)
    }

    /// Deinitialize the SPI device, detach interrupt handlers and release the
    /// pins, handing the HAL back.
    ///
    /// Fails with [`BoardError::SpiNotOpen`] if no SPI device was opened.
    pub fn teardown(mut self) -> Result<H, BoardError> {
        let spi = self.spi.as_ref().ok_or(BoardError::SpiNotOpen)?;
        {
            let mut bus = spi.lock().map_err(|_| BoardError::SpiPoisoned)?;
            bus.deinit()?;
        }
        for line in [&mut self.dio0, &mut self.dio1, &mut self.switch] {
            line.clear_irq()?;
        }
        info!("{}: torn down", self.config.board.name);
        Ok(self.hal)
    }

    /// Open the SPI device on the configured bus and chip select.
    pub fn spi(&mut self) -> Result<SpiHandle, BoardError> {
        let SpiConfig { bus, chip_select, .. } = self.config.spi;
        self.spi_device(bus, chip_select)
    }

    /// Open the SPI device on `bus`/`chip_select` at the configured baud rate.
    ///
    /// Asking again for the open device returns the same handle. Asking for a
    /// different one while a device is open fails with [`BoardError::SpiBusy`].
    pub fn spi_device(&mut self, bus: u8, chip_select: u8) -> Result<SpiHandle, BoardError> {
        if let Some(handle) = &self.spi {
            let open = handle.lock().map_err(|_| BoardError::SpiPoisoned)?.config();
            if open.bus == bus && open.chip_select == chip_select {
                return Ok(Arc::clone(handle));
            }
            return Err(BoardError::SpiBusy {
                bus: open.bus,
                chip_select: open.chip_select,
            });
        }

        let config = SpiConfig {
            bus,
            chip_select,
            baud_rate: self.config.spi.baud_rate,
        };
        let device = self.hal.open_spi(&config)?;
        info!(
            "{}: SPI{}.{} open at {} baud",
            self.config.board.name, bus, chip_select, config.baud_rate
        );
        let handle: SpiHandle = Arc::new(Mutex::new(device));
        self.spi = Some(Arc::clone(&handle));
        Ok(handle)
    }

    pub fn add_event(&mut self, line: EventLine, callback: IrqHandler) -> Result<(), BoardError> {
        let pin = match line {
            EventLine::Dio0 => &mut *self.dio0,
            EventLine::Dio1 => &mut *self.dio1,
            EventLine::Switch => &mut *self.switch,
        };
        add_event_detect(pin, callback)
    }

    /// Attach the radio interrupt handlers, and the switch handler if given.
    ///
    /// The inAir9B does not break out DIO2..DIO5, so only DIO0 and DIO1 are wired.
    /// Handlers run from the HAL's interrupt dispatch, possibly concurrently with
    /// each other and with the board owner; they must be short and non-blocking.
    pub fn add_events(
        &mut self,
        dio0: IrqHandler,
        dio1: IrqHandler,
        switch: Option<IrqHandler>,
    ) -> Result<(), BoardError> {
        self.add_event(EventLine::Dio0, dio0)?;
        self.add_event(EventLine::Dio1, dio1)?;
        if let Some(callback) = switch {
            self.add_event(EventLine::Switch, callback)?;
        }
        Ok(())
    }

    /// Blink the LED `count` times, blocking for `2 * count * half_period`.
    ///
    /// The LED is left off. `count == 0` touches nothing.
    pub fn blink(&mut self, half_period: Duration, count: u32) -> Result<(), BoardError> {
        if count == 0 {
            return Ok(());
        }
        debug!("blink {count}x at {half_period:?}");
        self.led.set_high()?;
        for _ in 0..count {
            self.hal.sleep(half_period);
            self.led.set_low()?;
            self.hal.sleep(half_period);
            self.led.set_high()?;
        }
        self.led.set_low()?;
        Ok(())
    }

    pub fn set_led(&mut self, on: bool) -> Result<(), BoardError> {
        self.led.set_level(on)?;
        Ok(())
    }

    pub fn led_is_on(&self) -> bool {
        self.led.is_set_high()
    }

    /// Switch level; high when released because of the pull-up.
    pub fn read_switch(&self) -> Result<bool, BoardError> {
        Ok(self.switch.is_high()?)
    }

    pub fn pins(&self) -> &PinAssignment {
        &self.config.pins
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }
}
