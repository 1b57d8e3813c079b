//! Inbound HMI commands.
//!
//! The HMI reports events as `name;key=value;key=value\r\n`. Only the name is
//! mandatory; parameters that are not `key=value` pairs are kept with an empty key.

/// One parsed inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub params: Vec<(String, String)>,
}

impl Command {
    /// Parse a decoded line. Returns `None` for blank lines.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split(';');
        let name = strip_terminator(parts.next()?).trim().to_string();
        if name.is_empty() {
            return None;
        }

        let params = parts
            .map(strip_terminator)
            .filter(|raw| !raw.is_empty())
            .map(|raw| match raw.split_once('=') {
                Some((key, value)) => (key.trim().to_string(), value.trim().to_string()),
                None => (String::new(), raw.trim().to_string()),
            })
            .collect();

        Some(Self { name, params })
    }

    /// Value of the first parameter named `key` (case-insensitive).
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Page number for `pageN` commands.
    pub fn page(&self) -> Option<u8> {
        self.name.strip_prefix("page")?.parse().ok()
    }
}

fn strip_terminator(raw: &str) -> &str {
    raw.trim_end_matches(['\r', '\n'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_with_parameter() {
        let cmd = Command::parse("page2;waveid=7\r\n").unwrap();
        assert_eq!(cmd.name, "page2");
        assert_eq!(cmd.page(), Some(2));
        assert_eq!(cmd.param("waveid"), Some("7"));
        assert_eq!(cmd.param("WaveID"), Some("7"));
    }

    #[test]
    fn bare_name_loses_terminator() {
        let cmd = Command::parse("testCable\r\n").unwrap();
        assert_eq!(cmd.name, "testCable");
        assert!(cmd.params.is_empty());
        assert_eq!(cmd.page(), None);
    }

    #[test]
    fn blank_lines_are_not_commands() {
        assert_eq!(Command::parse("\r\n"), None);
        assert_eq!(Command::parse(";x=1\r\n"), None);
    }

    #[test]
    fn pages_need_a_number() {
        assert_eq!(Command::parse("pageX\r\n").unwrap().page(), None);
        assert_eq!(Command::parse("page10\r\n").unwrap().page(), Some(10));
    }
}
