//! Operator console on stdin.
//!
//! `quit` stops the fixture, `anim <id>` toggles the loading animation on
//! waveform object `<id>`, and any other line goes to the HMI verbatim.

use crate::error::FixtureResult;
use crate::link::SerialLink;
use crate::sequence::Sequencer;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Quit,
    ToggleAnimation(u32),
    Send(String),
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if line.eq_ignore_ascii_case("quit") {
            return Some(Self::Quit);
        }
        if let Some(target) = line
            .strip_prefix("anim ")
            .and_then(|id| id.trim().parse().ok())
        {
            return Some(Self::ToggleAnimation(target));
        }
        Some(Self::Send(line.to_string()))
    }
}

/// Read operator commands from `input` until `quit`, end of input or `cancel`.
///
/// `quit` cancels `cancel` so the rest of the fixture shuts down with it.
pub async fn run_console<R>(
    input: R,
    link: &SerialLink,
    sequencer: &Sequencer,
    cancel: CancellationToken,
) -> FixtureResult<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            info!("console input closed");
            break;
        };

        match ConsoleCommand::parse(&line) {
            Some(ConsoleCommand::Quit) => {
                info!("quit requested from console");
                cancel.cancel();
                break;
            }
            Some(ConsoleCommand::ToggleAnimation(target)) => {
                if let Err(e) = sequencer.toggle_animation(target).await {
                    warn!(error = %e, "animation toggle failed");
                }
            }
            Some(ConsoleCommand::Send(frame)) => link.send(frame).await?,
            None => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_vocabulary() {
        assert_eq!(ConsoleCommand::parse("quit\n"), Some(ConsoleCommand::Quit));
        assert_eq!(
            ConsoleCommand::parse("anim 2"),
            Some(ConsoleCommand::ToggleAnimation(2))
        );
        assert_eq!(
            ConsoleCommand::parse("page 6"),
            Some(ConsoleCommand::Send("page 6".into()))
        );
        assert_eq!(
            ConsoleCommand::parse("anim two"),
            Some(ConsoleCommand::Send("anim two".into()))
        );
        assert_eq!(ConsoleCommand::parse("   "), None);
    }
}
