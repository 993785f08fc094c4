use tracing::warn;

use crate::model::HymnRecord;

pub const HEADER: &str = "Reference ID,Hymn Number,Title (Myanmar),Title (English),Composer,Category,Scriptures,PDF,PPTX,Verse Count,Lyrics";

/// Rows with fewer fields than this are dropped when reading.
const MIN_FIELDS: usize = 11;

/// One CSV row. Text columns are stored unescaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRow {
    pub reference_id: i64,
    pub hymn_number: i64,
    pub title_native: String,
    pub title_translated: String,
    pub composer: String,
    pub category: String,
    pub scriptures: String,
    pub pdf: String,
    pub pptx: String,
    pub verse_count: usize,
    pub lyrics: String,
}

impl CsvRow {
    pub fn from_record(r: &HymnRecord) -> Self {
        CsvRow {
            reference_id: r.source_id,
            hymn_number: r.hymn_number,
            title_native: r.title_native.clone(),
            title_translated: r.title_translated.clone(),
            composer: r.composer.clone().unwrap_or_default(),
            category: r.category.clone().unwrap_or_default(),
            scriptures: r.scripture_reference.clone().unwrap_or_default(),
            pdf: r.attachments.pdf_path.clone().unwrap_or_default(),
            pptx: r.attachments.slides_path.clone().unwrap_or_default(),
            verse_count: r.verses.len(),
            lyrics: r.lyrics_text(),
        }
    }

    pub fn to_line(&self) -> String {
        [
            self.reference_id.to_string(),
            self.hymn_number.to_string(),
            escape(&self.title_native),
            escape(&self.title_translated),
            escape(&self.composer),
            escape(&self.category),
            escape(&self.scriptures),
            escape(&self.pdf),
            escape(&self.pptx),
            self.verse_count.to_string(),
            escape(&self.lyrics),
        ]
        .join(",")
    }

    fn from_fields(fields: &[String]) -> Option<Self> {
        if fields.len() < MIN_FIELDS {
            return None;
        }
        let reference_id = fields[0].trim().parse::<i64>().ok()?;
        Some(CsvRow {
            reference_id,
            hymn_number: fields[1].trim().parse().unwrap_or(reference_id),
            title_native: fields[2].clone(),
            title_translated: fields[3].clone(),
            composer: fields[4].clone(),
            category: fields[5].clone(),
            scriptures: fields[6].clone(),
            pdf: fields[7].clone(),
            pptx: fields[8].clone(),
            verse_count: fields[9].trim().parse().unwrap_or(0),
            lyrics: fields[10].clone(),
        })
    }
}

/// Quote a text field, doubling embedded quotes. Empty text stays unquoted.
pub fn escape(text: &str) -> String {
    if text.is_empty() {
        String::new()
    } else {
        format!("\"{}\"", text.replace('"', "\"\""))
    }
}

/// Header line plus one line per row, each newline-terminated.
pub fn render(header: &str, rows: &[CsvRow]) -> String {
    let mut out = String::with_capacity(header.len() + rows.len() * 256);
    out.push_str(header);
    out.push('\n');
    for row in rows {
        out.push_str(&row.to_line());
        out.push('\n');
    }
    out
}

pub fn render_records(records: &[HymnRecord]) -> String {
    let rows: Vec<CsvRow> = records.iter().map(CsvRow::from_record).collect();
    render(HEADER, &rows)
}

#[derive(Debug)]
pub struct ParsedCsv {
    pub header: String,
    pub rows: Vec<CsvRow>,
    /// Non-blank records that were too short or had no numeric id.
    pub dropped: usize,
}

/// Read a hymn CSV. Quoted fields may span lines, so records are split on
/// newlines outside quotes only.
pub fn parse(content: &str) -> ParsedCsv {
    let mut records = split_records(content).into_iter();
    let header = records
        .next()
        .map(|r| r.join(","))
        .unwrap_or_else(|| HEADER.to_string());

    let mut rows = Vec::new();
    let mut dropped = 0;
    for (i, fields) in records.enumerate() {
        match CsvRow::from_fields(&fields) {
            Some(row) => rows.push(row),
            None => {
                dropped += 1;
                // +2: one for the header, one for 1-based numbering
                warn!("Dropping malformed CSV record {} ({} fields)", i + 2, fields.len());
            }
        }
    }

    ParsedCsv { header, rows, dropped }
}

fn split_records(content: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            '\r' if !in_quotes && chars.peek() == Some(&'\n') => {}
            '\n' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
                push_record(&mut records, std::mem::take(&mut fields));
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() || !fields.is_empty() {
        fields.push(current);
        push_record(&mut records, fields);
    }
    records
}

fn push_record(records: &mut Vec<Vec<String>>, fields: Vec<String>) {
    let blank = fields.iter().all(|f| f.trim().is_empty());
    if !blank {
        records.push(fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{sample_record, VerseKind, VerseSegment};

    fn verse(n: u32, text: &str) -> VerseSegment {
        VerseSegment { number: Some(n), kind: VerseKind::Verse, text: text.into() }
    }

    fn chorus(text: &str) -> VerseSegment {
        VerseSegment { number: None, kind: VerseKind::Chorus, text: text.into() }
    }

    #[test]
    fn lyrics_column_is_one_quoted_field() {
        let rec = sample_record(1, vec![verse(1, "hello"), chorus("world")]);
        let line = CsvRow::from_record(&rec).to_line();
        assert!(line.ends_with(",2,\"[Verse 1]\nhello\n\n[Chorus]\nworld\""), "{}", line);
    }

    #[test]
    fn quotes_doubled_and_empty_unquoted() {
        assert_eq!(escape(r#"say "amen""#), r#""say ""amen""""#);
        assert_eq!(escape(""), "");
    }

    #[test]
    fn written_csv_reads_back() {
        let mut a = sample_record(12, vec![verse(1, "line \"one\"\nline, two"), chorus("refrain")]);
        a.hymn_number = 27;
        a.attachments.pdf_path = Some("files/hymn-12.pdf".into());
        let b = sample_record(13, vec![verse(1, "x")]);

        let parsed = parse(&render_records(&[a.clone(), b.clone()]));
        assert_eq!(parsed.header, HEADER);
        assert_eq!(parsed.dropped, 0);
        assert_eq!(parsed.rows.len(), 2);

        for (row, rec) in parsed.rows.iter().zip([&a, &b]) {
            assert_eq!(row.reference_id, rec.source_id);
            assert_eq!(row.hymn_number, rec.hymn_number);
            assert_eq!(row.lyrics, rec.lyrics_text());
        }
        assert_eq!(parsed.rows[0].pdf, "files/hymn-12.pdf");
        assert_eq!(parsed.rows[0].verse_count, 2);
    }

    #[test]
    fn short_rows_are_dropped() {
        let content = format!("{}\n1,1,\"a\"\n2,2,,,,,,,,0,\n\n", HEADER);
        let parsed = parse(&content);
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].reference_id, 2);
        assert_eq!(parsed.dropped, 1);
    }

    #[test]
    fn crlf_line_endings() {
        let content = format!("{}\r\n5,5,\"t\",,,,,,,0,\"a\r\nb\"\r\n", HEADER);
        let parsed = parse(&content);
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].lyrics, "a\r\nb");
    }
}
