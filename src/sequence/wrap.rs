//! Word wrapping for diagnostic text on the error page.

use super::pages::{self, TextBox};
use crate::config::DisplayConfig;

/// Maximum number of diagnostic lines the error page can show.
pub const MAX_LINES: usize = 3;

const ELLIPSIS: &str = "...";

/// Pixel width of rendered text.
pub trait TextMeasure {
    fn width(&self, text: &str) -> u32;
}

/// Every character advances the pen by the same amount.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedAdvance {
    pub advance_px: f32,
}

impl FixedAdvance {
    pub fn from_config(config: &DisplayConfig) -> Self {
        Self {
            advance_px: config.font_size as f32 * config.char_width_ratio,
        }
    }
}

impl TextMeasure for FixedAdvance {
    fn width(&self, text: &str) -> u32 {
        (text.chars().count() as f32 * self.advance_px).ceil() as u32
    }
}

/// Greedy word wrap into at most `max_lines` lines of at most `max_width` pixels.
///
/// Words wider than a line are split by character. Lines past the limit are
/// merged into the last one, which is then cut and ends in `...`.
pub fn wrap<M: TextMeasure + ?Sized>(
    text: &str,
    measure: &M,
    max_width: u32,
    max_lines: usize,
) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if measure.width(&candidate) <= max_width {
            current = candidate;
            continue;
        }

        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        for ch in word.chars() {
            current.push(ch);
            if measure.width(&current) > max_width && current.chars().count() > 1 {
                current.pop();
                lines.push(std::mem::take(&mut current));
                current.push(ch);
            }
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }

    let max_lines = max_lines.max(1);
    if lines.len() > max_lines {
        let overflow = lines.split_off(max_lines - 1).join(" ");
        lines.push(truncate_to_width(&overflow, measure, max_width));
    }
    lines
}

fn truncate_to_width<M: TextMeasure + ?Sized>(text: &str, measure: &M, max_width: u32) -> String {
    if measure.width(text) <= max_width {
        return text.to_string();
    }
    let mut kept: String = text.to_string();
    // Too narrow for the marker: cut the text itself.
    if measure.width(ELLIPSIS) > max_width {
        while !kept.is_empty() && measure.width(&kept) > max_width {
            kept.pop();
        }
        return kept.trim_end().to_string();
    }
    while !kept.is_empty() && measure.width(&format!("{}{}", kept, ELLIPSIS)) > max_width {
        kept.pop();
    }
    format!("{}{}", kept.trim_end(), ELLIPSIS)
}

/// Lays diagnostic text out on the error page.
pub struct ErrorLayout {
    measure: Box<dyn TextMeasure + Send + Sync>,
    width: u32,
    origin_x: u32,
    origin_y: u32,
    line_height: u32,
    font_id: u32,
}

impl ErrorLayout {
    pub fn from_config(config: &DisplayConfig) -> Self {
        Self::with_measure(config, FixedAdvance::from_config(config))
    }

    pub fn with_measure<M>(config: &DisplayConfig, measure: M) -> Self
    where
        M: TextMeasure + Send + Sync + 'static,
    {
        Self {
            measure: Box::new(measure),
            width: config.line_width_px,
            origin_x: config.error_origin_x,
            origin_y: config.error_origin_y,
            line_height: config.line_height_px,
            font_id: config.error_font_id,
        }
    }

    pub fn lines(&self, message: &str) -> Vec<String> {
        wrap(message, self.measure.as_ref(), self.width, MAX_LINES)
    }

    /// One `xstr` draw per wrapped line, top to bottom.
    pub fn frames(&self, message: &str) -> Vec<String> {
        self.lines(message)
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let area = TextBox {
                    x: self.origin_x,
                    y: self.origin_y + i as u32 * self.line_height,
                    width: self.width,
                    height: self.line_height,
                    font_id: self.font_id,
                };
                pages::draw_text(area, line)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEN_PX: FixedAdvance = FixedAdvance { advance_px: 10.0 };

    #[test]
    fn short_text_stays_on_one_line() {
        assert_eq!(wrap("flash ok", &TEN_PX, 100, 3), vec!["flash ok"]);
    }

    #[test]
    fn greedy_break_between_words() {
        assert_eq!(
            wrap("Error: target not halted", &TEN_PX, 120, 3),
            vec!["Error:", "target not", "halted"]
        );
    }

    #[test]
    fn long_message_merges_into_three_lines_within_budget() {
        let message = "Error: init mode failed (unable to connect to the target) \
                       check the SWD wiring and the power supply of the board under test";
        let lines = wrap(message, &TEN_PX, 150, MAX_LINES);
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|line| TEN_PX.width(line) <= 150));
        assert!(lines[2].ends_with("..."));
    }

    #[test]
    fn narrow_budget_drops_the_ellipsis() {
        let lines = wrap("a b c d", &TEN_PX, 20, 3);
        assert_eq!(lines, vec!["a", "b", "c"]);
        assert!(lines.iter().all(|line| TEN_PX.width(line) <= 20));
    }

    #[test]
    fn overlong_word_is_split() {
        let lines = wrap("abcdefghijkl", &TEN_PX, 50, 3);
        assert_eq!(lines, vec!["abcde", "fghij", "kl"]);
    }

    #[test]
    fn frames_step_down_by_line_height() {
        let config = DisplayConfig {
            line_width_px: 120,
            font_size: 20,
            char_width_ratio: 0.5,
            error_origin_x: 20,
            error_origin_y: 90,
            line_height_px: 36,
            ..DisplayConfig::default()
        };
        let frames = ErrorLayout::from_config(&config).frames("Error: target not halted");
        assert_eq!(frames.len(), 3);
        assert!(frames[0].starts_with("xstr 20,90,120,36,0,"));
        assert!(frames[1].starts_with("xstr 20,126,"));
        assert!(frames[2].ends_with("\"halted\""));
    }
}
