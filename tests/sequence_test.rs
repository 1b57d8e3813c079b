//! Integration tests for the page-driven test sequence.
//!
//! The sequencer runs against a link attached to an in-memory HMI, a scripted
//! flasher and a loopback harness.

mod common;

use common::{default_link_pair, fixture_config, is_clock_frame, Hmi};
use hmi_fixture::config::FixtureConfig;
use hmi_fixture::hardware::{LoopbackIo, ScriptedFlasher};
use hmi_fixture::link::codec::take_frames;
use hmi_fixture::link::SerialLinkBuilder;
use hmi_fixture::sequence::{pages, Sequencer, FLASH_ATTEMPTS};
use hmi_fixture::SerialLink;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

struct Bench {
    link: Arc<SerialLink>,
    hmi: Hmi,
    flasher: Arc<ScriptedFlasher>,
    io: Arc<LoopbackIo>,
    sequencer: Arc<Sequencer>,
    config: FixtureConfig,
}

fn bench(flasher: ScriptedFlasher) -> Bench {
    let config = fixture_config();
    let (link, hmi) = default_link_pair();
    let link = Arc::new(link);
    let flasher = Arc::new(flasher);
    let io = Arc::new(LoopbackIo::new(&config.pins));
    let sequencer = Arc::new(
        Sequencer::new(link.clone(), flasher.clone(), io.clone(), &config).unwrap(),
    );
    Bench {
        link,
        hmi,
        flasher,
        io,
        sequencer,
        config,
    }
}

/// Feed `line` to the link as the HMI would and wait until it is queued.
async fn hmi_reports(bench: &mut Bench, line: &str) {
    bench.hmi.write(line.as_bytes()).await;
    // The reader needs a moment to move the line into the inbound queue.
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_program_page_retries_until_success() {
    let mut bench = bench(ScriptedFlasher::failing_then_ok(2));

    bench.sequencer.handle_line("page2\r\n").await;

    assert_eq!(bench.flasher.attempts(), 3);
    assert_eq!(bench.flasher.images(), vec![PathBuf::from("test_program.cfg"); 3]);
    assert_eq!(bench.hmi.next_frame().await, "page 2");
    assert_eq!(bench.hmi.next_frame().await, "page 3");
    assert_eq!(bench.sequencer.current_page(), pages::PROGRAM);
    bench.link.close().await;
}

#[tokio::test]
async fn test_program_page_gives_up_after_three_attempts() {
    let reason = "Error: unable to connect to the target, check the SWD wiring, the reset line \
                  and the supply of the board under test before trying again";
    let mut bench = bench(ScriptedFlasher::always_failing(reason));

    bench.sequencer.handle_line("page2\r\n").await;

    assert_eq!(bench.flasher.attempts(), FLASH_ATTEMPTS as usize);
    assert_eq!(bench.hmi.next_frame().await, "page 2");
    assert_eq!(bench.hmi.next_frame().await, "page 8");

    let diagnostic = bench.hmi.drain(Duration::from_millis(100)).await;
    assert_eq!(diagnostic.len(), 3);
    assert!(diagnostic.iter().all(|frame| frame.starts_with("xstr ")));
    assert!(diagnostic[0].contains("Error: unable to connect"));
    assert!(diagnostic[2].ends_with("...\""));
    bench.link.close().await;
}

#[tokio::test]
async fn test_button_wait_times_out_without_advancing() {
    let mut bench = bench(ScriptedFlasher::always_ok());
    hmi_reports(&mut bench, "PcbBtn On\r\n").await;

    let started = Instant::now();
    bench.sequencer.handle_line("page3\r\n").await;
    let elapsed = started.elapsed();

    let timeout = bench.config.sequence.button_timeout();
    let poll = bench.config.sequence.poll_interval();
    assert!(elapsed >= timeout);
    assert!(
        elapsed < timeout + poll + Duration::from_millis(150),
        "button wait took {:?}",
        elapsed
    );

    assert_eq!(bench.hmi.next_frame().await, "page 8");
    let diagnostic = bench.hmi.drain(Duration::from_millis(100)).await;
    assert!(diagnostic.iter().any(|frame| frame.contains("DispBtn On")));
    assert!(!diagnostic.iter().any(|frame| frame == "page 4"));
    bench.link.close().await;
}

#[tokio::test]
async fn test_buttons_advance_through_pages() {
    let mut bench = bench(ScriptedFlasher::always_ok());

    hmi_reports(&mut bench, "DispBtn On\r\n").await;
    bench.sequencer.handle_line("page3\r\n").await;
    assert_eq!(bench.hmi.next_frame().await, "page 4");

    hmi_reports(&mut bench, "noise\r\nPcbBtn On\r\n").await;
    bench.sequencer.handle_line("page4\r\n").await;
    assert_eq!(bench.hmi.next_frame().await, "page 5");
    bench.link.close().await;
}

#[tokio::test]
async fn test_final_page_flashes_firmware_after_float_switch() {
    let mut bench = bench(ScriptedFlasher::always_ok());
    let float_switch = bench.config.pins.float_switch;

    hmi_reports(&mut bench, "FloatSw On\r\n").await;
    bench.sequencer.handle_line("page5\r\n").await;

    assert_eq!(bench.hmi.next_frame().await, "page 6");
    assert_eq!(bench.flasher.images(), vec![PathBuf::from("firmware.cfg")]);
    assert!(!bench.io.level(float_switch), "float switch must be released");
    bench.link.close().await;
}

#[tokio::test]
async fn test_final_page_still_flashes_but_fails_without_float_switch() {
    let mut bench = bench(ScriptedFlasher::always_ok());

    bench.sequencer.handle_line("page5\r\n").await;

    assert_eq!(bench.hmi.next_frame().await, "page 7");
    assert_eq!(bench.flasher.images(), vec![PathBuf::from("firmware.cfg")]);
    assert!(!bench.io.level(bench.config.pins.float_switch));
    bench.link.close().await;
}

#[tokio::test]
async fn test_final_page_fails_when_firmware_will_not_flash() {
    let mut bench = bench(ScriptedFlasher::always_failing("Error: target voltage too low"));

    hmi_reports(&mut bench, "FloatSw On\r\n").await;
    bench.sequencer.handle_line("page5\r\n").await;

    assert_eq!(bench.hmi.next_frame().await, "page 7");
    assert_eq!(bench.flasher.attempts(), FLASH_ATTEMPTS as usize);
    bench.link.close().await;
}

#[tokio::test]
async fn test_cable_passes_when_every_wire_reads_back() {
    let mut bench = bench(ScriptedFlasher::always_ok());

    bench.sequencer.handle_line("testCable\r\n").await;

    assert_eq!(bench.hmi.next_frame().await, "page 6");
    for output in bench.config.pins.harness_outputs() {
        assert!(!bench.io.level(output), "output {} left high", output);
    }
    bench.link.close().await;
}

#[tokio::test]
async fn test_cable_fails_on_a_broken_wire() {
    let mut bench = bench(ScriptedFlasher::always_ok());
    bench.io.break_wire(bench.config.pins.harness[1].input);

    bench.sequencer.handle_line("testCable\r\n").await;

    assert_eq!(bench.hmi.next_frame().await, "page 7");
    bench.link.close().await;
}

#[tokio::test]
async fn test_clock_runs_only_on_home_page() {
    let bench = bench(ScriptedFlasher::always_ok());
    assert!(bench.sequencer.clock_gate().is_open());

    bench.sequencer.handle_line("page6\r\n").await;
    assert!(!bench.sequencer.clock_gate().is_open());
    assert_eq!(bench.sequencer.current_page(), pages::PASS);

    bench.sequencer.handle_line("page0\r\n").await;
    assert!(bench.sequencer.clock_gate().is_open());
    bench.link.close().await;
}

#[tokio::test]
async fn test_unknown_commands_are_ignored() {
    let mut bench = bench(ScriptedFlasher::always_ok());

    bench.sequencer.handle_line("telemetry;temp=21\r\n").await;
    bench.sequencer.handle_line("\r\n").await;

    assert!(bench.hmi.drain(Duration::from_millis(50)).await.is_empty());
    assert_eq!(bench.sequencer.current_page(), pages::HOME);
    bench.link.close().await;
}

#[tokio::test]
async fn test_program_page_end_to_end_with_animation() {
    let mut bench = bench(ScriptedFlasher::always_ok().with_delay(Duration::from_millis(100)));
    bench.sequencer.install_producers().unwrap();

    let cancel = CancellationToken::new();
    let runner = {
        let sequencer = bench.sequencer.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { sequencer.run(cancel).await })
    };

    bench.hmi.write(b"page2;waveid=7\r\n").await;

    let mut frames = Vec::new();
    loop {
        let frame = bench.hmi.next_matching(|frame| !is_clock_frame(frame)).await;
        let done = frame == "page 3";
        frames.push(frame);
        if done {
            break;
        }
    }

    assert_eq!(frames.first().map(String::as_str), Some("page 2"));
    assert!(frames.iter().any(|frame| frame.starts_with("add 7,0,")));
    let clear = frames
        .iter()
        .position(|frame| frame == "cle 2,255")
        .expect("animation was never cleared");
    let last_add = frames
        .iter()
        .rposition(|frame| frame.starts_with("add 7,"))
        .unwrap();
    assert!(last_add < clear);
    assert_eq!(clear, frames.len() - 2);
    assert!(!bench.sequencer.clock_gate().is_open());

    cancel.cancel();
    runner.await.unwrap().unwrap();
    bench.link.close().await;
}

#[tokio::test]
async fn test_sequence_frames_survive_a_running_animation() {
    let config = fixture_config();
    let (port, mut host) = tokio::io::duplex(64);
    let link = Arc::new(
        SerialLinkBuilder::from_config(config.serial.clone())
            .outbound_capacity(4)
            .attach(port),
    );
    let sequencer = Sequencer::new(
        link.clone(),
        Arc::new(ScriptedFlasher::always_ok()),
        Arc::new(LoopbackIo::new(&config.pins)),
        &config,
    )
    .unwrap();
    sequencer.install_producers().unwrap();
    sequencer.animation().show(7);

    // The animation outruns a slow HMI and keeps the queue full.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let sender = {
        let link = link.clone();
        tokio::spawn(async move { link.send("page 0").await })
    };

    let mut raw = Vec::new();
    let mut buf = [0u8; 64];
    let delivered = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let n = host.read(&mut buf).await.unwrap();
            raw.extend_from_slice(&buf[..n]);
            if take_frames(&mut raw).iter().any(|frame| frame == "page 0") {
                return;
            }
        }
    })
    .await;

    assert!(delivered.is_ok(), "page 0 never reached the HMI");
    sender.await.unwrap().unwrap();
    assert!(link.dropped_frames() > 0);
    link.close().await;
}
