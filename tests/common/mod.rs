//! Shared helpers: an in-memory HMI on the far end of a duplex pipe.

#![allow(dead_code)]

use hmi_fixture::config::{
    DisplayConfig, FixtureConfig, FlashingConfig, PinConfig, SequenceConfig, SerialConfig,
};
use hmi_fixture::link::codec::take_frames;
use hmi_fixture::link::{SerialLink, SerialLinkBuilder};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

/// Host end of the link: reads frames the fixture sends, writes HMI events.
pub struct Hmi {
    stream: DuplexStream,
    pending: Vec<u8>,
    frames: VecDeque<String>,
}

impl Hmi {
    pub fn new(stream: DuplexStream) -> Self {
        Self {
            stream,
            pending: Vec::new(),
            frames: VecDeque::new(),
        }
    }

    pub async fn write(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    /// Read more bytes; returns `false` on end of stream.
    async fn fill(&mut self) -> bool {
        let mut buf = [0u8; 512];
        let n = self.stream.read(&mut buf).await.unwrap();
        self.pending.extend_from_slice(&buf[..n]);
        self.frames.extend(take_frames(&mut self.pending));
        n > 0
    }

    /// Next frame, failing the test after two seconds.
    pub async fn next_frame(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Some(frame) = self.frames.pop_front() {
                    return frame;
                }
                assert!(self.fill().await, "link closed the channel");
            }
        })
        .await
        .expect("timed out waiting for a frame")
    }

    /// Next frame that `keep` accepts; others are skipped.
    pub async fn next_matching(&mut self, keep: impl Fn(&str) -> bool) -> String {
        loop {
            let frame = self.next_frame().await;
            if keep(&frame) {
                return frame;
            }
        }
    }

    /// Every frame that arrives until the line stays quiet for `quiet`.
    pub async fn drain(&mut self, quiet: Duration) -> Vec<String> {
        loop {
            match tokio::time::timeout(quiet, self.fill()).await {
                Ok(true) => continue,
                Ok(false) | Err(_) => break,
            }
        }
        self.frames.drain(..).collect()
    }

    /// Whether the fixture side has closed the channel.
    pub async fn closed(&mut self) -> bool {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.fill().await {}
        })
        .await
        .is_ok()
    }
}

pub fn serial_config() -> SerialConfig {
    let mut config = SerialConfig::new("duplex", 9600);
    config.timeout_ms = 20;
    config.join_timeout_ms = 500;
    config
}

/// A started link and the HMI on the other end.
pub fn link_pair(builder: SerialLinkBuilder) -> (SerialLink, Hmi) {
    let (port, host) = tokio::io::duplex(4096);
    (builder.attach(port), Hmi::new(host))
}

pub fn default_link_pair() -> (SerialLink, Hmi) {
    link_pair(SerialLinkBuilder::from_config(serial_config()))
}

/// Fixture configuration with timings short enough for tests.
pub fn fixture_config() -> FixtureConfig {
    FixtureConfig {
        application: Default::default(),
        serial: serial_config(),
        display: DisplayConfig::default(),
        flashing: FlashingConfig {
            tool: "openocd".into(),
            working_dir: PathBuf::from("openocd"),
            interface_cfg: "interface/raspberrypi-native.cfg".into(),
            test_program: PathBuf::from("test_program.cfg"),
            firmware: PathBuf::from("firmware.cfg"),
            use_sudo: false,
        },
        sequence: SequenceConfig {
            flash_retry_delay_ms: 10,
            button_timeout_ms: 200,
            float_switch_timeout_ms: 200,
            poll_interval_ms: 10,
            cable_poll_interval_ms: 5,
            clock_period_ms: 1000,
            animation_period_ms: 10,
        },
        pins: PinConfig::default(),
    }
}

pub fn is_clock_frame(frame: &str) -> bool {
    frame.starts_with("hourTxt") || frame.starts_with("minuteTxt")
}
