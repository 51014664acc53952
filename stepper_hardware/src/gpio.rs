//! Step/dir stepper drivers (A4988, DRV8825, TMC in standalone mode) on
//! Raspberry Pi GPIO.
//!
//! The driver has no position feedback, so the counter is the number of
//! pulses emitted, signed by the logical direction.
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rppal::gpio::{Gpio, OutputPin};
use stepper_traits::{
    Actuator, Bus, Clock, Completion, HwResult, MonotonicClock, MoveCommand, MoveOutcome, Port,
    SLOT_COUNT,
};
use tracing::{debug, trace, warn};

use crate::error::HwError;
use crate::util::gpio_step_interval;

/// BCM pin numbers for one driver.
#[derive(Debug, Clone, Copy)]
pub struct StepDirPins {
    pub step: u8,
    pub dir: u8,
    /// Active-low enable; `None` when tied to ground.
    pub enable: Option<u8>,
}

struct Pins {
    step: OutputPin,
    dir: OutputPin,
    enable: Option<OutputPin>,
}

pub struct GpioBus {
    gpio: Gpio,
    pins: [Option<StepDirPins>; SLOT_COUNT],
    max_steps_per_sec: u32,
    bound: Arc<Mutex<[bool; SLOT_COUNT]>>,
}

impl GpioBus {
    pub fn new(
        pins: [Option<StepDirPins>; SLOT_COUNT],
        max_steps_per_sec: u32,
    ) -> crate::error::Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        Ok(Self {
            gpio,
            pins,
            max_steps_per_sec,
            bound: Arc::new(Mutex::new([false; SLOT_COUNT])),
        })
    }

    fn output(&self, pin: u8) -> crate::error::Result<OutputPin> {
        self.gpio
            .get(pin)
            .map(|p| p.into_output_low())
            .map_err(|e| HwError::Gpio(format!("pin {pin}: {e}")))
    }
}

impl Bus for GpioBus {
    type Actuator = GpioStepper;

    fn open(&self, port: Port) -> HwResult<GpioStepper> {
        let Some(cfg) = self.pins[port.index()] else {
            return Err(Box::new(HwError::NotConnected(port)));
        };
        {
            let mut bound = self
                .bound
                .lock()
                .map_err(|_| HwError::Gpio("bus lock poisoned".into()))?;
            if bound[port.index()] {
                return Err(Box::new(HwError::PortBusy(port)));
            }
            bound[port.index()] = true;
        }
        let pins = (|| -> crate::error::Result<Pins> {
            Ok(Pins {
                step: self.output(cfg.step)?,
                dir: self.output(cfg.dir)?,
                enable: cfg.enable.map(|p| self.output(p)).transpose()?,
            })
        })();
        let pins = match pins {
            Ok(p) => p,
            Err(e) => {
                if let Ok(mut bound) = self.bound.lock() {
                    bound[port.index()] = false;
                }
                return Err(Box::new(e));
            }
        };
        debug!(%port, step = cfg.step, dir = cfg.dir, "gpio stepper bound");
        Ok(GpioStepper {
            port,
            pins: Arc::new(Mutex::new(pins)),
            position: Arc::new(AtomicI32::new(0)),
            generation: Arc::new(AtomicU64::new(0)),
            reverse: AtomicBool::new(false),
            max_steps_per_sec: self.max_steps_per_sec,
            bound: self.bound.clone(),
        })
    }
}

pub struct GpioStepper {
    port: Port,
    pins: Arc<Mutex<Pins>>,
    position: Arc<AtomicI32>,
    generation: Arc<AtomicU64>,
    reverse: AtomicBool,
    max_steps_per_sec: u32,
    bound: Arc<Mutex<[bool; SLOT_COUNT]>>,
}

impl GpioStepper {
    fn with_pins<T>(&self, f: impl FnOnce(&mut Pins) -> T) -> crate::error::Result<T> {
        let mut pins = self
            .pins
            .lock()
            .map_err(|_| HwError::Gpio("pin lock poisoned".into()))?;
        Ok(f(&mut pins))
    }
}

impl Actuator for GpioStepper {
    fn port(&self) -> Port {
        self.port
    }

    fn position(&self) -> HwResult<i32> {
        Ok(self.position.load(Ordering::SeqCst))
    }

    fn reset_position(&self) -> HwResult<()> {
        self.position.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn start_move(&self, cmd: MoveCommand) -> HwResult<Completion> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if cmd.steps == 0 {
            return Ok(Completion::ready());
        }
        let Some(interval) = gpio_step_interval(self.max_steps_per_sec, cmd.speed) else {
            return Ok(Completion::resolved(MoveOutcome::Stalled));
        };
        let forward = cmd.speed >= 0;
        // Reversed polarity flips the wire level, not the logical count.
        let dir_high = forward != self.reverse.load(Ordering::SeqCst);
        self.with_pins(|p| {
            if let Some(en) = p.enable.as_mut() {
                en.set_low();
            }
            if dir_high {
                p.dir.set_high();
            } else {
                p.dir.set_low();
            }
        })?;

        let (tx, completion) = Completion::channel();
        let pins = self.pins.clone();
        let position = self.position.clone();
        let gen_now = self.generation.clone();
        let port = self.port;
        let delta = if forward { 1 } else { -1 };
        std::thread::Builder::new()
            .name(format!("gpio-step-{port}"))
            .spawn(move || {
                let clock = MonotonicClock::new();
                let half = interval / 2;
                for _ in 0..cmd.steps {
                    if gen_now.load(Ordering::SeqCst) != generation {
                        tx.complete(MoveOutcome::Interrupted);
                        return;
                    }
                    let Ok(mut p) = pins.lock() else {
                        warn!(%port, "pin lock poisoned; abandoning move");
                        tx.complete(MoveOutcome::Stalled);
                        return;
                    };
                    p.step.set_high();
                    clock.sleep(half);
                    p.step.set_low();
                    drop(p);
                    position.fetch_add(delta, Ordering::SeqCst);
                    clock.sleep(interval - half);
                }
                trace!(%port, steps = cmd.steps, "gpio move done");
                tx.complete(MoveOutcome::Reached);
            })
            .map_err(HwError::Io)?;
        Ok(completion)
    }

    fn brake(&self) -> HwResult<()> {
        // Stop pulsing; an enabled driver holds the shaft.
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn power_off(&self) -> HwResult<()> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.with_pins(|p| {
            if let Some(en) = p.enable.as_mut() {
                en.set_high();
            }
            p.step.set_low();
        })?;
        Ok(())
    }

    fn set_reverse(&self, reverse: bool) -> HwResult<()> {
        self.reverse.store(reverse, Ordering::SeqCst);
        Ok(())
    }

    fn reverse(&self) -> bool {
        self.reverse.load(Ordering::SeqCst)
    }
}

impl Drop for GpioStepper {
    fn drop(&mut self) {
        if let Ok(mut bound) = self.bound.lock() {
            bound[self.port.index()] = false;
        }
    }
}
