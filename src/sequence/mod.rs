//! Test sequence driven by the HMI's page events.
//!
//! The [`Sequencer`] pulls decoded lines off the link, tracks which page the HMI
//! is showing and runs the step that belongs to it:
//!
//! | Inbound      | Step                                                        |
//! |--------------|-------------------------------------------------------------|
//! | `page0`      | home: clock on                                              |
//! | `page2`      | flash the test program (3 attempts) then `page 3`           |
//! | `page3`      | wait for the display button then `page 4`                   |
//! | `page4`      | wait for the board button then `page 5`                     |
//! | `page5`      | float switch check, flash firmware, then pass or fail       |
//! | `testCable`  | harness continuity (5 polls), then pass or fail             |
//!
//! Steps run one at a time on the dispatch task and may take seconds; the link's
//! writer keeps draining frames from the periodic producers meanwhile. A failing
//! step renders its diagnostic on the error page and the sequence stays where it
//! is until the HMI reports another page.

pub mod command;
pub mod display;
pub mod pages;
pub mod wrap;

pub use command::Command;
pub use display::{Animation, AnimationState, ClockGate};
pub use wrap::{ErrorLayout, FixedAdvance, TextMeasure};

use crate::config::{FixtureConfig, FlashingConfig, OverflowPolicy, PinConfig, SequenceConfig};
use crate::error::{FixtureError, FixtureResult, FlashFailure};
use crate::hardware::{DigitalIo, FlashReport, Flasher};
use crate::link::SerialLink;
use futures::FutureExt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Flashing attempts per image.
pub const FLASH_ATTEMPTS: u32 = 3;
/// Harness reads before the cable is declared faulty.
pub const CABLE_ATTEMPTS: u32 = 5;

/// Periodic task names.
pub const CLOCK_TASK: &str = "clock";
pub const LOADING_TASK: &str = "loading";

pub struct Sequencer {
    link: Arc<SerialLink>,
    flasher: Arc<dyn Flasher>,
    io: Arc<dyn DigitalIo>,
    images: FlashingConfig,
    timing: SequenceConfig,
    pins: PinConfig,
    layout: ErrorLayout,
    page: Mutex<u8>,
    animation: Animation,
    clock: ClockGate,
}

impl Sequencer {
    /// Build a sequencer over a link that delivers through its inbound queue.
    pub fn new(
        link: Arc<SerialLink>,
        flasher: Arc<dyn Flasher>,
        io: Arc<dyn DigitalIo>,
        config: &FixtureConfig,
    ) -> FixtureResult<Self> {
        if link.uses_callback() {
            return Err(FixtureError::DeliveryMode(
                "the test sequence polls the inbound queue; callback delivery is not supported"
                    .into(),
            ));
        }
        Ok(Self {
            link,
            flasher,
            io,
            images: config.flashing.clone(),
            timing: config.sequence.clone(),
            pins: config.pins.clone(),
            layout: ErrorLayout::from_config(&config.display),
            page: Mutex::new(pages::HOME),
            animation: Animation::new(),
            clock: ClockGate::new(),
        })
    }

    /// Register the clock and loading-animation producers on the link.
    ///
    /// Both skip a tick when the outbound queue is full, so they never evict
    /// frames the sequence queued itself.
    pub fn install_producers(&self) -> FixtureResult<()> {
        self.link.register_periodic_task(
            CLOCK_TASK,
            self.clock.producer(),
            self.timing.clock_period(),
            Some(OverflowPolicy::DropNewest),
        )?;
        self.link.register_periodic_task(
            LOADING_TASK,
            self.animation.producer(),
            self.timing.animation_period(),
            Some(OverflowPolicy::DropNewest),
        )?;
        Ok(())
    }

    pub fn current_page(&self) -> u8 {
        *self.page.lock()
    }

    pub fn animation(&self) -> &Animation {
        &self.animation
    }

    pub fn clock_gate(&self) -> &ClockGate {
        &self.clock
    }

    /// Dispatch inbound lines until `cancel` fires or the link closes.
    pub async fn run(&self, cancel: CancellationToken) -> FixtureResult<()> {
        info!("test sequence started");
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = self.link.recv() => line?,
            };
            match line {
                Some(line) => self.handle_line(&line).await,
                None => break,
            }
        }
        info!("test sequence stopped");
        Ok(())
    }

    /// Handle one inbound line. Step errors and panics stop here.
    pub async fn handle_line(&self, line: &str) {
        let Some(command) = Command::parse(line) else {
            return;
        };

        match AssertUnwindSafe(self.dispatch(&command)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(command = %command.name, error = %e, "test step failed");
                if e.is_recoverable() {
                    if let Err(e) = self.show_error(&e.to_string()).await {
                        error!(error = %e, "could not render diagnostic");
                    }
                }
            }
            Err(_) => error!(command = %command.name, "test step panicked"),
        }
    }

    async fn dispatch(&self, command: &Command) -> FixtureResult<()> {
        if let Some(page) = command.page() {
            self.enter_page(page);
            return match page {
                pages::PROGRAM => self.program_test_firmware(command).await,
                pages::DISPLAY_BUTTON => {
                    self.button_check(pages::DISPLAY_BUTTON_EVENT, pages::BOARD_BUTTON)
                        .await
                }
                pages::BOARD_BUTTON => {
                    self.button_check(pages::BOARD_BUTTON_EVENT, pages::FINAL)
                        .await
                }
                pages::FINAL => self.final_programming(command).await,
                _ => Ok(()),
            };
        }

        if command.name == pages::TEST_CABLE {
            return self.test_cable().await;
        }

        debug!(command = %command.name, "ignoring command");
        Ok(())
    }

    fn enter_page(&self, page: u8) {
        *self.page.lock() = page;
        self.clock.set_open(page == pages::HOME);
        debug!(page, "page changed");
    }

    async fn goto(&self, page: u8) -> FixtureResult<()> {
        self.link.send(pages::goto_page(page)).await
    }

    #[instrument(skip(self))]
    async fn program_test_firmware(&self, command: &Command) -> FixtureResult<()> {
        let wave = wave_target(command);
        self.goto(pages::PROGRAM).await?;
        if let Some(target) = wave {
            self.animation.show(target);
        }

        let result = self.flash_with_retry(&self.images.test_program).await;
        if wave.is_some() {
            self.stop_animation().await?;
        }

        match result {
            Ok(_) => self.goto(pages::DISPLAY_BUTTON).await,
            Err(failure) => self.show_error(&failure.summary()).await,
        }
    }

    async fn button_check(&self, event: &str, next: u8) -> FixtureResult<()> {
        self.wait_for_event(event, self.timing.button_timeout()).await?;
        self.goto(next).await
    }

    #[instrument(skip(self))]
    async fn final_programming(&self, command: &Command) -> FixtureResult<()> {
        let wave = wave_target(command);
        if let Some(target) = wave {
            self.animation.show(target);
        }

        let float_switch = [self.pins.float_switch];
        let asserted = self.io.set_pins(&float_switch, true).await;
        let switched = match asserted {
            Ok(()) => {
                self.wait_for_event(pages::FLOAT_SWITCH_EVENT, self.timing.float_switch_timeout())
                    .await
            }
            Err(e) => Err(e),
        };
        let released = self.io.set_pins(&float_switch, false).await;
        if wave.is_some() {
            self.stop_animation().await?;
        }
        released?;

        let switched = match switched {
            Ok(()) => true,
            Err(e @ FixtureError::TestTimeout { .. }) => {
                warn!(error = %e, "float switch check failed");
                false
            }
            Err(other) => return Err(other),
        };

        let flashed = self.flash_with_retry(&self.images.firmware).await.is_ok();
        info!(switched, flashed, "final programming finished");
        self.goto(if switched && flashed { pages::PASS } else { pages::FAIL })
            .await
    }

    #[instrument(skip(self))]
    async fn test_cable(&self) -> FixtureResult<()> {
        let outputs = self.pins.harness_outputs();
        let inputs = self.pins.harness_inputs();

        self.io.set_pins(&outputs, true).await?;
        let verdict = self.poll_harness(&inputs).await;
        self.io.toggle_pins(&outputs).await?;

        let passed = verdict?;
        info!(passed, "cable test finished");
        self.goto(if passed { pages::PASS } else { pages::FAIL })
            .await
    }

    async fn poll_harness(&self, inputs: &[u8]) -> FixtureResult<bool> {
        for attempt in 1..=CABLE_ATTEMPTS {
            let levels = self.io.read_pins(inputs).await?;
            if levels.iter().all(|&level| level) {
                return Ok(true);
            }
            debug!(attempt, ?levels, "harness incomplete");
            if attempt < CABLE_ATTEMPTS {
                tokio::time::sleep(self.timing.cable_poll_interval()).await;
            }
        }
        Ok(false)
    }

    /// Flash `image`, retrying a fixed number of times with a fixed delay.
    async fn flash_with_retry(&self, image: &Path) -> Result<FlashReport, FlashFailure> {
        let mut attempt = 1;
        loop {
            match self.flasher.flash(image).await {
                Ok(report) => {
                    info!(image = %image.display(), attempt, "flashing succeeded");
                    return Ok(report);
                }
                Err(failure) if attempt >= FLASH_ATTEMPTS => {
                    error!(
                        image = %image.display(),
                        reason = %failure.kind,
                        "flashing failed after {} attempts",
                        FLASH_ATTEMPTS
                    );
                    return Err(failure);
                }
                Err(failure) => {
                    warn!(attempt, reason = %failure.summary(), "flashing attempt failed");
                    attempt += 1;
                    tokio::time::sleep(self.timing.flash_retry_delay()).await;
                }
            }
        }
    }

    /// Poll the inbound queue for `event`, discarding anything else.
    async fn wait_for_event(&self, event: &str, timeout: Duration) -> FixtureResult<()> {
        let started = Instant::now();
        loop {
            while let Some(line) = self.link.receive() {
                if line.trim_end() == event {
                    debug!(event, "event received");
                    return Ok(());
                }
                debug!(line = line.trim_end(), "discarding while waiting for {}", event);
            }
            if started.elapsed() >= timeout {
                return Err(FixtureError::TestTimeout {
                    event: event.to_string(),
                    waited: timeout,
                });
            }
            tokio::time::sleep(self.timing.poll_interval()).await;
        }
    }

    /// Hide the loading animation and clear its waveform once the producer has
    /// seen the change.
    async fn stop_animation(&self) -> FixtureResult<()> {
        self.animation.hide();
        tokio::time::sleep(self.timing.animation_period() * 2).await;
        self.link
            .send(pages::clear_waveform(pages::ANIMATION_CLEAR_TARGET))
            .await
    }

    /// Operator toggle of the loading animation on `target`.
    pub async fn toggle_animation(&self, target: u32) -> FixtureResult<()> {
        if self.animation.toggle(target) {
            info!(target, "loading animation shown");
            Ok(())
        } else {
            info!(target, "loading animation hidden");
            self.stop_animation().await
        }
    }

    /// Switch to the error page and draw `message` on it.
    pub async fn show_error(&self, message: &str) -> FixtureResult<()> {
        self.goto(pages::ERROR).await?;
        for frame in self.layout.frames(message) {
            self.link.send(frame).await?;
        }
        Ok(())
    }

    /// Drive every fixture output low.
    pub async fn release_outputs(&self) -> FixtureResult<()> {
        let mut outputs = vec![self.pins.float_switch];
        outputs.extend(self.pins.harness_outputs());
        self.io.set_pins(&outputs, false).await
    }
}

fn wave_target(command: &Command) -> Option<u32> {
    command.param(pages::WAVE_PARAM)?.parse().ok()
}
