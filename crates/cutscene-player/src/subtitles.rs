//! Timestamped subtitle table.
//!
//! Accepted input, one cue per line:
//!
//! ```text
//! # comment
//! 00:01.500-00:04.000 First line of dialogue
//! 00:05 Text shown until the next cue
//! ```
//!
//! Times are `[hh:]mm:ss[.fff]`. SubRip blocks (`00:00:01,000 --> 00:00:02,000`
//! followed by text lines) are accepted as well.

use std::io::{self, Read};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleEntry {
    pub timestamp_ms: u64,
    /// Empty for an entry that clears the previous cue.
    pub text: String,
}

/// Sorted subtitle entries with "latest at or before" lookup.
#[derive(Debug, Clone, Default)]
pub struct SubtitleIndex {
    entries: Vec<SubtitleEntry>,
}

struct Cue {
    start: u64,
    end: Option<u64>,
    text: String,
}

impl SubtitleIndex {
    /// Build from entries in any order; equal timestamps keep input order.
    pub fn new(mut entries: Vec<SubtitleEntry>) -> Self {
        entries.sort_by_key(|e| e.timestamp_ms);
        Self { entries }
    }

    pub fn load<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(Self::parse(&String::from_utf8_lossy(&bytes)))
    }

    pub fn parse(content: &str) -> Self {
        let mut cues = parse_cues(content);
        cues.sort_by_key(|c| c.start);

        let mut entries = Vec::with_capacity(cues.len() * 2);
        for (i, cue) in cues.iter().enumerate() {
            entries.push(SubtitleEntry {
                timestamp_ms: cue.start,
                text: cue.text.clone(),
            });
            if let Some(end) = cue.end {
                let overlapped = cues.get(i + 1).is_some_and(|next| next.start <= end);
                if !overlapped && end > cue.start {
                    entries.push(SubtitleEntry {
                        timestamp_ms: end,
                        text: String::new(),
                    });
                }
            }
        }
        Self::new(entries)
    }

    /// The last entry whose timestamp is at or before `time_ms`.
    pub fn lookup(&self, time_ms: u64) -> Option<&SubtitleEntry> {
        let idx = self.entries.partition_point(|e| e.timestamp_ms <= time_ms);
        idx.checked_sub(1).map(|i| &self.entries[i])
    }

    /// Text to display at `time_ms`; `None` when nothing or a clear is active.
    pub fn text_at(&self, time_ms: u64) -> Option<&str> {
        self.lookup(time_ms)
            .map(|e| e.text.as_str())
            .filter(|t| !t.is_empty())
    }

    pub fn entries(&self) -> &[SubtitleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_cues(content: &str) -> Vec<Cue> {
    let mut cues = Vec::new();
    let mut lines = content.lines().enumerate().peekable();

    while let Some((n, raw)) = lines.next() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.parse::<u32>().is_ok() {
            continue;
        }

        if let Some((start, end)) = line.split_once("-->") {
            let (Some(start), Some(end)) = (parse_time_ms(start), parse_time_ms(end)) else {
                log::warn!("Subtitle line {}: bad SubRip timing {line:?}", n + 1);
                continue;
            };
            let mut text = Vec::new();
            while let Some((_, next)) = lines.peek() {
                if next.trim().is_empty() {
                    break;
                }
                text.push(next.trim());
                lines.next();
            }
            cues.push(Cue {
                start,
                end: Some(end),
                text: text.join("\n"),
            });
            continue;
        }

        match parse_line(line) {
            Some(cue) => cues.push(cue),
            None => log::warn!("Subtitle line {}: unrecognised {line:?}", n + 1),
        }
    }
    cues
}

fn parse_line(line: &str) -> Option<Cue> {
    let (timing, text) = match line.split_once(char::is_whitespace) {
        Some((timing, text)) => (timing, text.trim()),
        None => (line, ""),
    };
    let (start, end) = match timing.split_once('-') {
        Some((start, end)) => (parse_time_ms(start)?, Some(parse_time_ms(end)?)),
        None => (parse_time_ms(timing)?, None),
    };
    Some(Cue {
        start,
        end,
        text: text.to_string(),
    })
}

/// Parse `[hh:]mm:ss[.fff]` or plain seconds; `,` works as the decimal mark.
fn parse_time_ms(s: &str) -> Option<u64> {
    let s = s.trim().replace(',', ".");
    let (whole, frac) = match s.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (s.as_str(), ""),
    };

    let mut seconds: u64 = 0;
    let parts: Vec<&str> = whole.split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    for part in parts {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        seconds = seconds.checked_mul(60)?.checked_add(part.parse::<u64>().ok()?)?;
    }

    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut millis: u64 = 0;
    for (i, digit) in frac.bytes().take(3).enumerate() {
        millis += u64::from(digit - b'0') * 10u64.pow(2 - i as u32);
    }

    seconds.checked_mul(1000)?.checked_add(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(timestamp_ms: u64, text: &str) -> SubtitleEntry {
        SubtitleEntry {
            timestamp_ms,
            text: text.to_string(),
        }
    }

    #[test]
    fn empty_index_has_no_entries() {
        let index = SubtitleIndex::default();
        assert!(index.is_empty());
        assert_eq!(index.lookup(0), None);
        assert_eq!(index.lookup(u64::MAX), None);
    }

    #[test]
    fn lookup_returns_latest_at_or_before() {
        let index = SubtitleIndex::new(vec![
            entry(2000, "second"),
            entry(1000, "first"),
            entry(5000, "third"),
        ]);
        assert_eq!(index.lookup(999), None);
        assert_eq!(index.lookup(1000).unwrap().text, "first");
        assert_eq!(index.lookup(1999).unwrap().text, "first");
        assert_eq!(index.lookup(2000).unwrap().text, "second");
        assert_eq!(index.lookup(4999).unwrap().text, "second");
        assert_eq!(index.lookup(60_000).unwrap().text, "third");
    }

    #[test]
    fn parses_time_formats() {
        assert_eq!(parse_time_ms("5"), Some(5000));
        assert_eq!(parse_time_ms("01:02"), Some(62_000));
        assert_eq!(parse_time_ms("01:02.5"), Some(62_500));
        assert_eq!(parse_time_ms("1:00:00.250"), Some(3_600_250));
        assert_eq!(parse_time_ms("00:00:01,234"), Some(1234));
        assert_eq!(parse_time_ms("00:01.23456"), Some(1234));
        assert_eq!(parse_time_ms("ab:cd"), None);
        assert_eq!(parse_time_ms(""), None);
        assert_eq!(parse_time_ms("1:2:3:4"), None);
    }

    #[test]
    fn parses_line_format_with_clears() {
        let index = SubtitleIndex::parse(
            "# intro\n\
             00:01.000-00:02.000 Hello there\n\
             \n\
             00:05.000 General Kenobi\n",
        );
        assert_eq!(
            index.entries(),
            &[
                entry(1000, "Hello there"),
                entry(2000, ""),
                entry(5000, "General Kenobi"),
            ]
        );
        assert_eq!(index.text_at(1500), Some("Hello there"));
        assert_eq!(index.text_at(3000), None);
        assert_eq!(index.text_at(9000), Some("General Kenobi"));
    }

    #[test]
    fn overlapping_cue_suppresses_clear() {
        let index = SubtitleIndex::parse("00:01-00:04 one\n00:03-00:05 two\n");
        assert_eq!(
            index.entries(),
            &[entry(1000, "one"), entry(3000, "two"), entry(5000, "")]
        );
    }

    #[test]
    fn parses_subrip_blocks() {
        let index = SubtitleIndex::parse(
            "1\n00:00:01,000 --> 00:00:02,500\nLine one\nLine two\n\n\
             2\n00:00:04,000 --> 00:00:05,000\nLast\n",
        );
        assert_eq!(index.text_at(1200), Some("Line one\nLine two"));
        assert_eq!(index.text_at(3000), None);
        assert_eq!(index.text_at(4500), Some("Last"));
        assert_eq!(index.text_at(5000), None);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let index = SubtitleIndex::parse("nonsense here\n00:02 ok\nxx-yy nope\n");
        assert_eq!(index.entries(), &[entry(2000, "ok")]);
    }

    #[test]
    fn oversized_timestamps_are_skipped() {
        assert_eq!(parse_time_ms("99999999999999999"), None);
        assert_eq!(parse_time_ms("99999999999999999:00"), None);
        let index = SubtitleIndex::parse("99999999999999999 hi\n00:02 ok\n");
        assert_eq!(index.entries(), &[entry(2000, "ok")]);
    }

    #[test]
    fn load_tolerates_invalid_utf8() {
        let mut bytes = b"00:01 caf".to_vec();
        bytes.push(0xE9);
        let index = SubtitleIndex::load(bytes.as_slice()).unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.text_at(1000).unwrap().starts_with("caf"));
    }
}
