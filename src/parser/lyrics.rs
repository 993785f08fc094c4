use std::sync::LazyLock;

use regex::Regex;

use super::digits::{myanmar_digit, FALLBACK_DIGIT};
use crate::model::{VerseKind, VerseSegment};

static VERSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([၀၁၂၃၄၅၆၇၈၉])\s*။\s*").unwrap());
static SUB_VERSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s*\((က|ခ|ဂ)\)\s*(.+)$").unwrap());

const CHORUS_MARKER: &str = "ထပ်ဆို";

/// Lyrics end at the first of these found, checked in this order.
const METADATA_MARKERS: &[&str] = &[
    "<p>",
    "Hymn Number:",
    "PPTX File",
    "Download PPTX",
    "PDF File",
    "Download PDF",
];

/// Lines dropped from inside a segment.
const LYRIC_NOISE: &[&str] = &[
    "Acknowledgement",
    "Title",
    "Composer",
    "All rights reserved",
    "Myanmar Hymn",
];

struct OpenSegment {
    number: Option<u32>,
    kind: VerseKind,
    lines: Vec<String>,
    /// Opened by a numbered verse marker, even if its first line was empty.
    from_marker: bool,
}

impl OpenSegment {
    fn verse(number: u32, first_line: &str) -> Self {
        let lines = if first_line.is_empty() {
            Vec::new()
        } else {
            vec![first_line.to_string()]
        };
        OpenSegment { number: Some(number), kind: VerseKind::Verse, lines, from_marker: true }
    }

    fn chorus() -> Self {
        OpenSegment {
            number: None,
            kind: VerseKind::Chorus,
            lines: Vec::new(),
            from_marker: false,
        }
    }
}

/// Everything before the first metadata marker.
pub fn lyric_region(text: &str) -> &str {
    METADATA_MARKERS
        .iter()
        .find_map(|m| text.find(m))
        .map_or(text, |idx| &text[..idx])
}

/// Split the lyric region into verse/chorus segments in page order.
/// Boundaries come only from marker lines; blank lines are ignored.
pub fn segment(text: &str) -> Vec<VerseSegment> {
    let mut out = Vec::new();
    let mut current: Option<OpenSegment> = None;

    for line in lyric_region(text).lines().map(str::trim).filter(|l| !l.is_empty()) {
        // ── Chorus marker ──
        if line == CHORUS_MARKER {
            close(&mut out, current.take());
            current = Some(OpenSegment::chorus());
            continue;
        }

        // ── Numbered verse: "၁။ first line" ──
        if let Some(caps) = VERSE_RE.captures(line) {
            close(&mut out, current.take());
            let digit = caps[1].chars().next().map_or(FALLBACK_DIGIT, myanmar_digit);
            current = Some(OpenSegment::verse(digit, &line[caps[0].len()..]));
            continue;
        }

        // Text before the first marker is title/header material
        let Some(open) = current.as_mut() else {
            continue;
        };

        // ── Sub-verse: "4 (က) first line" ──
        if open.from_marker || !open.lines.is_empty() {
            if let Some(caps) = SUB_VERSE_RE.captures(line) {
                if let Ok(number) = caps[1].parse::<u32>() {
                    close(&mut out, current.take());
                    current = Some(OpenSegment::verse(number, &caps[3]));
                    continue;
                }
            }
        }

        if !LYRIC_NOISE.iter().any(|n| line.contains(n)) {
            open.lines.push(line.to_string());
        }
    }

    close(&mut out, current);
    out
}

fn close(out: &mut Vec<VerseSegment>, seg: Option<OpenSegment>) {
    if let Some(seg) = seg.filter(|s| !s.lines.is_empty()) {
        out.push(VerseSegment {
            number: seg.number,
            kind: seg.kind,
            text: seg.lines.join("\n"),
        });
    }
}
