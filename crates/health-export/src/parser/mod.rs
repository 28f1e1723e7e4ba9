//! Streaming reader for Apple Health `export.xml`
//!
//! The export is one flat `<HealthData>` element holding millions of
//! `<Record>`, `<Workout>` and `<ActivitySummary>` leaves. [`ExportParser`]
//! pulls XML events one at a time and yields a [`RawEntry`] per leaf, so
//! memory stays bounded by the largest single element no matter how large the
//! document is. Every other element is skipped, but its attributes must still
//! be valid UTF-8.
//!
//! A parser is forward-only: once it returns `None` (end of document or after
//! an error) it stays finished. Parsing again needs a fresh reader, see
//! [`ExportSource::entries`].

mod archive;

pub use archive::{ExportSource, EXPORT_MEMBER_NAME};

use std::io::{self, BufRead, Read};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{HealthError, Result};
use crate::models::{EntryKind, RawEntry};

/// Parse a byte stream holding an export document
pub fn parse<R: BufRead>(reader: R) -> ExportParser<R> {
    ExportParser::new(reader)
}

/// Leaf element currently open, waiting for its end tag
struct OpenEntry {
    entry: RawEntry,
    depth: usize,
}

/// Pull-based iterator over the leaf entries of an export document
pub struct ExportParser<R: BufRead> {
    reader: Reader<LineCounter<R>>,
    buf: Vec<u8>,
    depth: usize,
    seen_root: bool,
    open: Option<OpenEntry>,
    emitted: u64,
    finished: bool,
}

impl<R: BufRead> ExportParser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Reader::from_reader(LineCounter::new(reader)),
            buf: Vec::with_capacity(1024),
            depth: 0,
            seen_root: false,
            open: None,
            emitted: 0,
            finished: false,
        }
    }

    /// Entries yielded so far
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// True once the document end or an error has been reached
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Byte offset of the reader in the document
    pub fn position(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    fn next_entry(&mut self) -> Result<Option<RawEntry>> {
        loop {
            self.buf.clear();
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .map_err(|e| position_error(&self.reader, e.to_string()))?;

            match event {
                Event::Start(e) => {
                    self.depth += 1;
                    self.seen_root = true;
                    match (entry_kind(&e), self.open.as_mut()) {
                        (Some(kind), None) => {
                            let entry = read_entry(kind, &e, &self.reader)?;
                            self.open = Some(OpenEntry {
                                entry,
                                depth: self.depth,
                            });
                        }
                        (None, Some(open))
                            if self.depth == open.depth + 1
                                && e.name().as_ref() == b"MetadataEntry" =>
                        {
                            read_metadata(&e, &mut open.entry, &self.reader)?;
                        }
                        _ => check_attributes(&e, &self.reader)?,
                    }
                }
                Event::Empty(e) => {
                    self.seen_root = true;
                    match (entry_kind(&e), self.open.as_mut()) {
                        (Some(kind), None) => {
                            let entry = read_entry(kind, &e, &self.reader)?;
                            self.emitted += 1;
                            return Ok(Some(entry));
                        }
                        // Empty elements do not change depth, so a direct child sits at the entry's depth
                        (None, Some(open))
                            if self.depth == open.depth && e.name().as_ref() == b"MetadataEntry" =>
                        {
                            read_metadata(&e, &mut open.entry, &self.reader)?;
                        }
                        _ => check_attributes(&e, &self.reader)?,
                    }
                }
                Event::End(_) => {
                    let closes_open = matches!(&self.open, Some(open) if open.depth == self.depth);
                    self.depth = self.depth.saturating_sub(1);
                    if closes_open {
                        if let Some(open) = self.open.take() {
                            self.emitted += 1;
                            return Ok(Some(open.entry));
                        }
                    }
                }
                Event::Text(text) => {
                    if std::str::from_utf8(&text).is_err() {
                        return Err(position_error(&self.reader, "invalid UTF-8 in text content"));
                    }
                }
                Event::Eof => {
                    if self.depth > 0 {
                        return Err(position_error(
                            &self.reader,
                            format!(
                                "unexpected end of document with {} unclosed element(s)",
                                self.depth
                            ),
                        ));
                    }
                    if !self.seen_root {
                        return Err(position_error(&self.reader, "document has no root element"));
                    }
                    return Ok(None);
                }
                _ => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for ExportParser<R> {
    type Item = Result<RawEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.finished = true;
                tracing::debug!(
                    entries = self.emitted,
                    bytes = ExportParser::position(self),
                    "Reached end of export document"
                );
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

fn entry_kind(e: &BytesStart<'_>) -> Option<EntryKind> {
    match e.name().as_ref() {
        b"Record" => Some(EntryKind::Record),
        b"Workout" => Some(EntryKind::Workout),
        b"ActivitySummary" => Some(EntryKind::ActivitySummary),
        _ => None,
    }
}

fn read_entry<R>(
    kind: EntryKind,
    e: &BytesStart<'_>,
    reader: &Reader<LineCounter<R>>,
) -> Result<RawEntry> {
    let tag = match kind {
        EntryKind::ActivitySummary => "ActivitySummary",
        EntryKind::Record | EntryKind::Workout => "",
    };
    let mut entry = RawEntry::new(kind, tag);

    for attr in e.attributes() {
        let attr = attr.map_err(|err| position_error(reader, err.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|err| position_error(reader, err.to_string()))?
            .into_owned();

        match (kind, attr.key.as_ref()) {
            (EntryKind::ActivitySummary, b"dateComponents") => entry.start_date = value,
            (EntryKind::ActivitySummary, key) => {
                entry
                    .metadata
                    .insert(String::from_utf8_lossy(key).into_owned(), value);
            }
            (EntryKind::Record, b"type") | (EntryKind::Workout, b"workoutActivityType") => {
                entry.type_tag = value
            }
            (_, b"startDate") => entry.start_date = value,
            (_, b"endDate") => entry.end_date = value,
            (_, b"sourceName") => entry.source_name = value,
            (EntryKind::Record, b"value") | (EntryKind::Workout, b"duration") => {
                entry.value = Some(value)
            }
            (EntryKind::Record, b"unit") | (EntryKind::Workout, b"durationUnit") => {
                entry.unit = Some(value)
            }
            (
                EntryKind::Workout,
                key @ (b"totalDistance"
                | b"totalDistanceUnit"
                | b"totalEnergyBurned"
                | b"totalEnergyBurnedUnit"),
            ) => {
                entry
                    .metadata
                    .insert(String::from_utf8_lossy(key).into_owned(), value);
            }
            _ => {}
        }
    }

    Ok(entry)
}

fn read_metadata<R>(
    e: &BytesStart<'_>,
    entry: &mut RawEntry,
    reader: &Reader<LineCounter<R>>,
) -> Result<()> {
    let mut key = None;
    let mut value = None;

    for attr in e.attributes() {
        let attr = attr.map_err(|err| position_error(reader, err.to_string()))?;
        match attr.key.as_ref() {
            b"key" | b"value" => {
                let text = attr
                    .unescape_value()
                    .map_err(|err| position_error(reader, err.to_string()))?
                    .into_owned();
                if attr.key.as_ref() == b"key" {
                    key = Some(text);
                } else {
                    value = Some(text);
                }
            }
            _ => {}
        }
    }

    if let (Some(key), Some(value)) = (key, value) {
        entry.metadata.insert(key, value);
    }
    Ok(())
}

/// Validate the encoding of an element that is otherwise skipped
fn check_attributes<R>(e: &BytesStart<'_>, reader: &Reader<LineCounter<R>>) -> Result<()> {
    if std::str::from_utf8(e.name().as_ref()).is_err() {
        return Err(position_error(reader, "invalid UTF-8 in element name"));
    }
    for attr in e.attributes() {
        let attr = attr.map_err(|err| position_error(reader, err.to_string()))?;
        if std::str::from_utf8(attr.key.as_ref()).is_err() || std::str::from_utf8(&attr.value).is_err() {
            return Err(position_error(
                reader,
                format!(
                    "invalid UTF-8 in attribute of <{}>",
                    String::from_utf8_lossy(e.name().as_ref())
                ),
            ));
        }
    }
    Ok(())
}

fn position_error<R>(reader: &Reader<LineCounter<R>>, msg: impl Into<String>) -> HealthError {
    HealthError::parse(
        reader.buffer_position() as u64,
        reader.get_ref().line(),
        msg,
    )
}

/// `BufRead` adapter that counts the newlines handed to the XML reader
pub struct LineCounter<R> {
    inner: R,
    newlines: u64,
}

impl<R> LineCounter<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, newlines: 0 }
    }

    /// 1-based line of the last consumed byte
    pub fn line(&self) -> u64 {
        self.newlines + 1
    }
}

impl<R: Read> Read for LineCounter<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.newlines += count_newlines(&buf[..n]);
        Ok(n)
    }
}

impl<R: BufRead> BufRead for LineCounter<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        // Data handed out by fill_buf is still buffered, so this does no I/O.
        if let Ok(buf) = self.inner.fill_buf() {
            let seen = amt.min(buf.len());
            self.newlines += count_newlines(&buf[..seen]);
        }
        self.inner.consume(amt);
    }
}

fn count_newlines(bytes: &[u8]) -> u64 {
    bytes.iter().filter(|b| **b == b'\n').count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_EXPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE HealthData [
<!ELEMENT HealthData (ExportDate,Me,(Record|Correlation|Workout|ActivitySummary)*)>
<!ATTLIST HealthData locale CDATA #REQUIRED>
]>
<HealthData locale="en_US">
  <ExportDate value="2024-03-01 09:00:00 +0100"/>
  <Me HKCharacteristicTypeIdentifierDateOfBirth="1990-01-01"/>
  <Record type="HKQuantityTypeIdentifierStepCount" sourceName="iPhone" unit="count" value="42"
          creationDate="2020-01-01 10:06:00 +0100"
          startDate="2020-01-01 10:00:00 +0100" endDate="2020-01-01 10:05:00 +0100"/>
  <Record type="HKQuantityTypeIdentifierHeartRate" sourceName="Watch" unit="count/min" value="60"
          startDate="2020-01-01 10:00:00 +0100" endDate="2020-01-01 10:00:05 +0100">
    <MetadataEntry key="HKMetadataKeyHeartRateMotionContext" value="1"/>
    <HeartRateVariabilityMetadataList>
      <InstantaneousBeatsPerMinute bpm="61" time="10:00:01"/>
    </HeartRateVariabilityMetadataList>
  </Record>
  <ActivitySummary dateComponents="2020-01-01" activeEnergyBurned="500"/>
  <Workout workoutActivityType="HKWorkoutActivityTypeRunning" duration="30.5" durationUnit="min"
           totalDistance="5.1" totalDistanceUnit="km" sourceName="Watch"
           startDate="2020-01-02 07:00:00 +0100" endDate="2020-01-02 07:30:30 +0100">
    <MetadataEntry key="HKIndoorWorkout" value="0"/>
    <WorkoutEvent type="HKWorkoutEventTypeSegment" date="2020-01-02 07:10:00 +0100"/>
  </Workout>
</HealthData>
"#;

    fn collect(doc: &str) -> Vec<Result<RawEntry>> {
        parse(doc.as_bytes()).collect()
    }

    #[test]
    fn test_parse_small_export() {
        let entries: Vec<RawEntry> = parse(SMALL_EXPORT.as_bytes())
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(entries.len(), 4);

        let steps = &entries[0];
        assert_eq!(steps.kind, EntryKind::Record);
        assert_eq!(steps.type_tag, "HKQuantityTypeIdentifierStepCount");
        assert_eq!(steps.value.as_deref(), Some("42"));
        assert_eq!(steps.unit.as_deref(), Some("count"));
        assert_eq!(steps.source_name, "iPhone");
        assert_eq!(steps.start_date, "2020-01-01 10:00:00 +0100");
        assert!(steps.metadata.is_empty());

        let hr = &entries[1];
        assert_eq!(hr.metadata.len(), 1);
        assert_eq!(
            hr.metadata.get("HKMetadataKeyHeartRateMotionContext").map(String::as_str),
            Some("1")
        );

        let summary = &entries[2];
        assert_eq!(summary.kind, EntryKind::ActivitySummary);
        assert_eq!(summary.type_tag, "ActivitySummary");
        assert_eq!(summary.start_date, "2020-01-01");
        assert_eq!(
            summary.metadata.get("activeEnergyBurned").map(String::as_str),
            Some("500")
        );

        let workout = &entries[3];
        assert_eq!(workout.kind, EntryKind::Workout);
        assert_eq!(workout.type_tag, "HKWorkoutActivityTypeRunning");
        assert_eq!(workout.value.as_deref(), Some("30.5"));
        assert_eq!(workout.unit.as_deref(), Some("min"));
        assert_eq!(workout.metadata.get("totalDistance").map(String::as_str), Some("5.1"));
        assert_eq!(workout.metadata.get("HKIndoorWorkout").map(String::as_str), Some("0"));
    }

    #[test]
    fn test_parser_is_not_restartable() {
        let mut parser = parse(SMALL_EXPORT.as_bytes());
        assert_eq!(parser.by_ref().count(), 4);
        assert!(parser.is_finished());
        assert!(parser.next().is_none());
        assert_eq!(parser.emitted(), 4);
    }

    #[test]
    fn test_escaped_attribute_values() {
        let doc = r#"<HealthData><Record type="HKQuantityTypeIdentifierStepCount" sourceName="Jan&apos;s iPhone &amp; Watch" value="1" unit="count" startDate="a" endDate="b"/></HealthData>"#;
        let entries = collect(doc);
        let entry = entries[0].as_ref().unwrap();
        assert_eq!(entry.source_name, "Jan's iPhone & Watch");
    }

    #[test]
    fn test_record_inside_correlation_is_yielded() {
        let doc = r#"<HealthData>
  <Correlation type="HKCorrelationTypeIdentifierBloodPressure" startDate="a" endDate="b">
    <Record type="HKQuantityTypeIdentifierBloodPressureSystolic" value="120" unit="mmHg" startDate="a" endDate="b"/>
  </Correlation>
</HealthData>"#;
        let entries = collect(doc);
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].as_ref().unwrap().type_tag,
            "HKQuantityTypeIdentifierBloodPressureSystolic"
        );
    }

    #[test]
    fn test_truncated_document_fails_after_valid_entries() {
        let doc = r#"<HealthData>
  <Record type="HKQuantityTypeIdentifierStepCount" value="1" unit="count" startDate="a" endDate="b"/>
  <Record type="HKQuantityTypeIdentifierStepCount" value="2" unit="count" startDate="a" endDate="b"/>
"#;
        let entries = collect(doc);
        assert_eq!(entries.len(), 3);
        assert!(entries[0].is_ok());
        assert!(entries[1].is_ok());
        match &entries[2] {
            Err(HealthError::Parse { line, message, .. }) => {
                assert!(message.contains("unclosed"));
                assert!(*line >= 3);
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_mismatched_end_tag_fails() {
        let doc = "<HealthData>\n<Record type=\"x\" startDate=\"a\" endDate=\"b\">\n</Workout>\n</HealthData>";
        let result: Result<Vec<RawEntry>> = parse(doc.as_bytes()).collect();
        assert!(matches!(result, Err(HealthError::Parse { .. })));
    }

    #[test]
    fn test_truncated_inside_tag_fails() {
        let doc = "<HealthData>\n<Record type=\"HKQuantityTypeIdentifierStepCount\" val";
        let result: Result<Vec<RawEntry>> = parse(doc.as_bytes()).collect();
        assert!(matches!(result, Err(HealthError::Parse { .. })));
    }

    #[test]
    fn test_invalid_utf8_attribute_fails() {
        let mut doc = b"<HealthData><Record type=\"HKQuantityTypeIdentifierStepCount\" sourceName=\"".to_vec();
        doc.extend_from_slice(&[0xff, 0xfe]);
        doc.extend_from_slice(b"\" startDate=\"a\" endDate=\"b\"/></HealthData>");
        let result: Result<Vec<RawEntry>> = parse(doc.as_slice()).collect();
        assert!(matches!(result, Err(HealthError::Parse { .. })));
    }

    #[test]
    fn test_invalid_utf8_in_skipped_element_fails() {
        let record = br#"<Record type="HKQuantityTypeIdentifierStepCount" value="1" unit="count" startDate="a" endDate="b"/>"#;

        let mut doc = b"<HealthData>\n<Me name=\"".to_vec();
        doc.extend_from_slice(&[0xff, 0xfe]);
        doc.extend_from_slice(b"\"/>\n");
        doc.extend_from_slice(record);
        doc.extend_from_slice(b"</HealthData>");
        let result: Result<Vec<RawEntry>> = parse(doc.as_slice()).collect();
        match result {
            Err(HealthError::Parse { line, message, .. }) => {
                assert!(message.contains("<Me>"));
                assert_eq!(line, 2);
            }
            other => panic!("expected parse error, got {:?}", other),
        }

        // Same for a container element with children
        let mut doc = b"<HealthData><Correlation type=\"".to_vec();
        doc.push(0xc3);
        doc.extend_from_slice(b"\">");
        doc.extend_from_slice(record);
        doc.extend_from_slice(b"</Correlation></HealthData>");
        let result: Result<Vec<RawEntry>> = parse(doc.as_slice()).collect();
        assert!(matches!(result, Err(HealthError::Parse { .. })));
    }

    #[test]
    fn test_empty_input_fails() {
        let result: Result<Vec<RawEntry>> = parse("".as_bytes()).collect();
        assert!(matches!(result, Err(HealthError::Parse { .. })));
    }

    #[test]
    fn test_error_terminates_iteration() {
        let doc = "<HealthData><Record";
        let mut parser = parse(doc.as_bytes());
        assert!(matches!(parser.next(), Some(Err(_))));
        assert!(parser.next().is_none());
    }

    #[test]
    fn test_line_counter_tracks_consumed_lines() {
        let mut reader = LineCounter::new("a\nb\nc".as_bytes());
        assert_eq!(reader.line(), 1);
        let len = reader.fill_buf().unwrap().len();
        reader.consume(len);
        assert_eq!(reader.line(), 3);
    }

    #[test]
    fn test_many_entries_stream_without_buffering() {
        struct Repeat {
            header: bool,
            remaining: usize,
            footer: bool,
            chunk: Vec<u8>,
            pos: usize,
        }

        impl Read for Repeat {
            fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
                if self.pos >= self.chunk.len() {
                    self.pos = 0;
                    self.chunk = if self.header {
                        self.header = false;
                        b"<HealthData>".to_vec()
                    } else if self.remaining > 0 {
                        self.remaining -= 1;
                        br#"<Record type="HKQuantityTypeIdentifierStepCount" value="1" unit="count" startDate="2020-01-01 10:00:00 +0000" endDate="2020-01-01 10:01:00 +0000"/>"#.to_vec()
                    } else if self.footer {
                        self.footer = false;
                        b"</HealthData>".to_vec()
                    } else {
                        return Ok(0);
                    };
                }
                let n = out.len().min(self.chunk.len() - self.pos);
                out[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
                self.pos += n;
                Ok(n)
            }
        }

        let source = Repeat {
            header: true,
            remaining: 100_000,
            footer: true,
            chunk: Vec::new(),
            pos: 0,
        };
        let mut parser = parse(io::BufReader::new(source));
        let mut count = 0usize;
        for entry in parser.by_ref() {
            entry.unwrap();
            count += 1;
        }
        assert_eq!(count, 100_000);
        assert!(parser.buf.capacity() < 64 * 1024);
    }
}
