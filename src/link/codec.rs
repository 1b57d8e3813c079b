//! Wire format of the HMI link.
//!
//! Outbound frames are UTF-8 text followed by three `0xFF` bytes, the HMI's
//! end-of-command marker. Inbound lines are reduced to printable ASCII and
//! re-terminated with `\r\n` before they reach the sequence logic.

/// End-of-command marker appended to every outbound frame.
pub const FRAME_TRAILER: [u8; 3] = [0xFF, 0xFF, 0xFF];

/// Terminator appended to every decoded inbound line.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Encode one outbound frame.
pub fn encode_frame(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() + FRAME_TRAILER.len());
    bytes.extend_from_slice(text.as_bytes());
    bytes.extend_from_slice(&FRAME_TRAILER);
    bytes
}

/// Keep only printable ASCII (32..=126); everything else is dropped.
pub fn filter_printable(raw: &[u8]) -> Vec<u8> {
    raw.iter()
        .copied()
        .filter(|b| (32..=126).contains(b))
        .collect()
}

/// Turn raw bytes read from the wire into a terminated line.
///
/// Returns `None` when nothing printable is left.
pub fn decode_line(raw: &[u8]) -> Option<String> {
    let printable = filter_printable(raw);
    if printable.is_empty() {
        return None;
    }
    let mut line = String::from_utf8_lossy(&printable).into_owned();
    line.push_str(LINE_TERMINATOR);
    Some(line)
}

/// Split complete frames off the front of `buffer`, leaving any partial frame.
///
/// This is the HMI-side view of the stream; the fixture never reads its own
/// frames back, but simulators and tests do.
pub fn take_frames(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut frames = Vec::new();
    while let Some(end) = buffer
        .windows(FRAME_TRAILER.len())
        .position(|window| window == FRAME_TRAILER)
    {
        let frame: Vec<u8> = buffer.drain(..end + FRAME_TRAILER.len()).collect();
        frames.push(String::from_utf8_lossy(&frame[..end]).into_owned());
    }
    frames
}
