//! Page numbers, inbound event names and outbound command builders.

/// Idle screen with the clock.
pub const HOME: u8 = 0;
/// Test firmware is being programmed.
pub const PROGRAM: u8 = 2;
/// Operator presses the display button.
pub const DISPLAY_BUTTON: u8 = 3;
/// Operator presses the board button.
pub const BOARD_BUTTON: u8 = 4;
/// Float switch check and production firmware.
pub const FINAL: u8 = 5;
pub const PASS: u8 = 6;
pub const FAIL: u8 = 7;
/// Diagnostic text page.
pub const ERROR: u8 = 8;

/// Continuity test request.
pub const TEST_CABLE: &str = "testCable";

pub const DISPLAY_BUTTON_EVENT: &str = "DispBtn On";
pub const BOARD_BUTTON_EVENT: &str = "PcbBtn On";
pub const FLOAT_SWITCH_EVENT: &str = "FloatSw On";

/// Parameter of `page2`/`page5` naming the waveform object to animate.
pub const WAVE_PARAM: &str = "waveid";

/// Waveform object cleared when the animation stops.
pub const ANIMATION_CLEAR_TARGET: u32 = 2;

/// Nextion colour codes (RGB565).
const RED: u16 = 63488;
const WHITE: u16 = 65535;

pub fn goto_page(page: u8) -> String {
    format!("page {}", page)
}

pub fn set_text(object: &str, value: &str) -> String {
    format!("{}.txt=\"{}\"", object, value)
}

pub fn waveform_point(wave_id: u32, channel: u8, value: u8) -> String {
    format!("add {},{},{}", wave_id, channel, value)
}

/// Clear every channel of a waveform object.
pub fn clear_waveform(wave_id: u32) -> String {
    format!("cle {},255", wave_id)
}

/// Where and how an `xstr` draw is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub font_id: u32,
}

/// Draw `text` in red on white, left aligned and vertically centred.
pub fn draw_text(area: TextBox, text: &str) -> String {
    format!(
        "xstr {},{},{},{},{},{},{},0,1,1,\"{}\"",
        area.x,
        area.y,
        area.width,
        area.height,
        area.font_id,
        RED,
        WHITE,
        text.replace('"', "'")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_vocabulary() {
        assert_eq!(goto_page(PASS), "page 6");
        assert_eq!(set_text("hourTxt", "09"), "hourTxt.txt=\"09\"");
        assert_eq!(waveform_point(7, 0, 150), "add 7,0,150");
        assert_eq!(clear_waveform(ANIMATION_CLEAR_TARGET), "cle 2,255");
    }

    #[test]
    fn quotes_cannot_break_out_of_xstr() {
        let area = TextBox {
            x: 20,
            y: 90,
            width: 440,
            height: 36,
            font_id: 0,
        };
        assert_eq!(
            draw_text(area, "bad \"image\""),
            "xstr 20,90,440,36,0,63488,65535,0,1,1,\"bad 'image'\""
        );
    }
}
