//! Mock Fixture Hardware
//!
//! Simulated collaborators for running the sequence without a bench.
//! All mock devices use async-safe operations (tokio::time::sleep, not std::thread::sleep).
//!
//! # Available Mocks
//!
//! - `ScriptedFlasher` - plays back a script of flash results and counts attempts
//! - `LoopbackIo` - harness outputs wired straight back to their paired inputs

use super::capabilities::{DigitalIo, FlashReport, Flasher};
use crate::config::PinConfig;
use crate::error::{FixtureResult, FlashFailure, FlashFailureKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::{sleep, Duration};

// =============================================================================
// ScriptedFlasher - Simulated Flashing Tool
// =============================================================================

type FlashResult = Result<FlashReport, FlashFailure>;

/// Flasher that returns scripted results, then a fallback once the script runs out.
///
/// # Example
///
/// ```rust,ignore
/// let flasher = ScriptedFlasher::failing_then_ok(2);
/// assert!(flasher.flash(Path::new("test.cfg")).await.is_err());
/// assert!(flasher.flash(Path::new("test.cfg")).await.is_err());
/// assert!(flasher.flash(Path::new("test.cfg")).await.is_ok());
/// assert_eq!(flasher.attempts(), 3);
/// ```
pub struct ScriptedFlasher {
    script: Mutex<VecDeque<FlashResult>>,
    fallback: FlashResult,
    delay: Duration,
    attempts: AtomicUsize,
    images: Mutex<Vec<PathBuf>>,
}

impl ScriptedFlasher {
    fn with_fallback(fallback: FlashResult) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: Duration::ZERO,
            attempts: AtomicUsize::new(0),
            images: Mutex::new(Vec::new()),
        }
    }

    /// Every attempt succeeds.
    pub fn always_ok() -> Self {
        Self::with_fallback(Ok(FlashReport::default()))
    }

    /// Every attempt fails with `stderr` as the tool's output.
    pub fn always_failing(stderr: &str) -> Self {
        Self::with_fallback(Err(Self::failure(stderr)))
    }

    /// The first `failures` attempts fail, the rest succeed.
    pub fn failing_then_ok(failures: usize) -> Self {
        let flasher = Self::always_ok();
        flasher
            .script
            .lock()
            .extend((0..failures).map(|_| Err(Self::failure("Error: init mode failed"))));
        flasher
    }

    /// Each attempt takes `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failure(stderr: &str) -> FlashFailure {
        FlashFailure {
            kind: FlashFailureKind::ToolFailed { code: Some(1) },
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Images passed to `flash`, in call order.
    pub fn images(&self) -> Vec<PathBuf> {
        self.images.lock().clone()
    }
}

#[async_trait]
impl Flasher for ScriptedFlasher {
    async fn flash(&self, image: &Path) -> FlashResult {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.images.lock().push(image.to_path_buf());
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

// =============================================================================
// LoopbackIo - Simulated Harness
// =============================================================================

/// Digital I/O where each harness input reads its paired output.
///
/// Unwired pins keep whatever level was last set on them. A wire can be cut
/// with [`LoopbackIo::break_wire`]; its input then always reads low.
pub struct LoopbackIo {
    levels: Mutex<HashMap<u8, bool>>,
    wiring: HashMap<u8, u8>,
    broken: Mutex<HashSet<u8>>,
}

impl LoopbackIo {
    pub fn new(pins: &PinConfig) -> Self {
        Self {
            levels: Mutex::new(HashMap::new()),
            wiring: pins
                .harness
                .iter()
                .map(|pair| (pair.input, pair.output))
                .collect(),
            broken: Mutex::new(HashSet::new()),
        }
    }

    /// Cut the wire feeding `input`.
    pub fn break_wire(&self, input: u8) {
        self.broken.lock().insert(input);
    }

    /// Current level of `pin` as last driven.
    pub fn level(&self, pin: u8) -> bool {
        self.levels.lock().get(&pin).copied().unwrap_or(false)
    }
}

#[async_trait]
impl DigitalIo for LoopbackIo {
    async fn read_pins(&self, pins: &[u8]) -> FixtureResult<Vec<bool>> {
        let broken = self.broken.lock();
        Ok(pins
            .iter()
            .map(|pin| match self.wiring.get(pin) {
                Some(_) if broken.contains(pin) => false,
                Some(output) => self.level(*output),
                None => self.level(*pin),
            })
            .collect())
    }

    async fn set_pins(&self, pins: &[u8], level: bool) -> FixtureResult<()> {
        let mut levels = self.levels.lock();
        for &pin in pins {
            levels.insert(pin, level);
        }
        Ok(())
    }

    async fn toggle_pins(&self, pins: &[u8]) -> FixtureResult<()> {
        let mut levels = self.levels.lock();
        for &pin in pins {
            let level = levels.entry(pin).or_insert(false);
            *level = !*level;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn script_then_fallback() {
        let flasher = ScriptedFlasher::failing_then_ok(1);
        assert!(flasher.flash(Path::new("a.cfg")).await.is_err());
        assert!(flasher.flash(Path::new("b.cfg")).await.is_ok());
        assert!(flasher.flash(Path::new("c.cfg")).await.is_ok());
        assert_eq!(flasher.attempts(), 3);
        assert_eq!(flasher.images()[1], PathBuf::from("b.cfg"));
    }

    #[tokio::test]
    async fn loopback_mirrors_outputs() {
        let pins = PinConfig::default();
        let io = LoopbackIo::new(&pins);
        let inputs = pins.harness_inputs();

        assert_eq!(io.read_pins(&inputs).await.unwrap(), vec![false; 4]);
        io.set_pins(&pins.harness_outputs(), true).await.unwrap();
        assert_eq!(io.read_pins(&inputs).await.unwrap(), vec![true; 4]);

        io.break_wire(inputs[2]);
        assert_eq!(
            io.read_pins(&inputs).await.unwrap(),
            vec![true, true, false, true]
        );

        io.toggle_pins(&pins.harness_outputs()).await.unwrap();
        assert!(!io.level(pins.harness[0].output));
    }
}
