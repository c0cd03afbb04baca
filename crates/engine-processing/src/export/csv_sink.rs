use crate::export::coercion::coerce;
use async_trait::async_trait;
use csv_core::{QuoteStyle, Terminator, WriteResult};
use connectors::{
    sql::base::{error::SinkError, sink::RowSink},
    store::ObjectWriter,
};
use engine_core::observer::SharedObserver;
use model::{core::column::Column, events::IngestEvent, records::row::RowData};

/// Tracks 10% steps of a split's expected row count.
#[derive(Debug)]
pub struct Progress {
    expected: u64,
    next_percent: u8,
}

impl Progress {
    pub fn new(expected: u64) -> Self {
        Self {
            expected: expected.max(1),
            next_percent: 10,
        }
    }

    pub fn expected(&self) -> u64 {
        self.expected
    }

    /// Percent steps reached since the last call, given `rows` written so far.
    pub fn advance(&mut self, rows: u64) -> Vec<u8> {
        let mut reached = Vec::new();
        while self.next_percent <= 100
            && rows.saturating_mul(100) >= self.expected.saturating_mul(self.next_percent as u64)
        {
            reached.push(self.next_percent);
            self.next_percent += 10;
        }
        reached
    }
}

/// Encodes rows as CSV and streams them into an object writer one batch at a
/// time.
pub struct CsvSink {
    writer: Box<dyn ObjectWriter>,
    encoder: RecordEncoder,
    columns: Vec<Column>,
    rows: u64,
    progress: Progress,
    observer: SharedObserver,
    table: String,
    split_id: u64,
}

impl CsvSink {
    /// Writes the header row immediately, so even an empty split produces a
    /// valid file.
    pub fn new(
        writer: Box<dyn ObjectWriter>,
        columns: &[Column],
        expected_rows: u64,
        observer: SharedObserver,
        table: &str,
        split_id: u64,
    ) -> Result<Self, SinkError> {
        let mut encoder = RecordEncoder::new();
        encoder.write_record(columns.iter().map(|c| Some(c.name.as_str())));

        Ok(Self {
            writer,
            encoder,
            columns: columns.to_vec(),
            rows: 0,
            progress: Progress::new(expected_rows),
            observer,
            table: table.to_string(),
            split_id,
        })
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Moves whatever the encoder buffered into the object writer.
    async fn drain(&mut self) -> Result<(), SinkError> {
        let bytes = self.encoder.take();
        if !bytes.is_empty() {
            self.writer.write_all(&bytes).await?;
        }
        Ok(())
    }

    /// Flushes the tail of the file and publishes it. Returns the number of
    /// data rows written.
    pub async fn finish(mut self) -> Result<u64, SinkError> {
        self.drain().await?;
        self.writer.finish().await?;
        Ok(self.rows)
    }
}

#[async_trait]
impl RowSink for CsvSink {
    async fn write_rows(&mut self, rows: &[RowData]) -> Result<(), SinkError> {
        for row in rows {
            let fields = self
                .columns
                .iter()
                .map(|column| {
                    let value = row.get(&column.name).and_then(|f| f.value.as_ref());
                    coerce(column, value)
                })
                .collect::<Vec<_>>();
            self.encoder.write_record(fields.iter().map(|f| f.as_deref()));
            self.rows += 1;
        }
        self.drain().await?;

        for percent in self.progress.advance(self.rows) {
            self.observer
                .on_event(&IngestEvent::ExportProgress {
                    table: self.table.clone(),
                    split_id: self.split_id,
                    rows: self.rows,
                    expected: self.progress.expected(),
                    percent,
                })
                .await;
        }
        Ok(())
    }
}

/// Output space requested from the buffer per encoder call.
const ENCODE_CHUNK: usize = 4096;

/// CSV record encoder that quotes every value and writes NULL as an empty,
/// unquoted field, so the warehouse can tell NULL apart from `""`.
struct RecordEncoder {
    core: csv_core::Writer,
    buf: Vec<u8>,
}

impl RecordEncoder {
    fn new() -> Self {
        let core = csv_core::WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .terminator(Terminator::Any(b'\n'))
            .build();
        Self {
            core,
            buf: Vec::new(),
        }
    }

    fn write_record<'a, I>(&mut self, fields: I)
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut written = false;
        for (i, field) in fields.into_iter().enumerate() {
            if i > 0 {
                self.emit(|core, out| core.delimiter(out));
                written = true;
            }
            if let Some(value) = field {
                let mut input = value.as_bytes();
                self.emit(|core, out| {
                    let (res, nin, nout) = core.field(input, out);
                    input = &input[nin..];
                    (res, nout)
                });
                written = true;
            }
        }

        if written {
            self.emit(|core, out| core.terminator(out));
        } else {
            // The core writer turns an empty record into `""`; a lone NULL
            // stays a blank line.
            self.buf.push(b'\n');
        }
    }

    /// Runs one encoder step, growing the buffer until the step has consumed
    /// all of its input.
    fn emit<F>(&mut self, mut step: F)
    where
        F: FnMut(&mut csv_core::Writer, &mut [u8]) -> (WriteResult, usize),
    {
        loop {
            let start = self.buf.len();
            self.buf.resize(start + ENCODE_CHUNK, 0);
            let (res, n) = step(&mut self.core, &mut self.buf[start..]);
            self.buf.truncate(start + n);
            if res == WriteResult::InputEmpty {
                break;
            }
        }
    }

    fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_fires_every_ten_percent() {
        let mut progress = Progress::new(200);
        assert_eq!(progress.advance(19), Vec::<u8>::new());
        assert_eq!(progress.advance(20), vec![10]);
        assert_eq!(progress.advance(65), vec![20, 30]);
        assert_eq!(progress.advance(200), vec![40, 50, 60, 70, 80, 90, 100]);
        assert_eq!(progress.advance(250), Vec::<u8>::new());
    }

    fn encode(records: &[&[Option<&str>]]) -> String {
        let mut encoder = RecordEncoder::new();
        for record in records {
            encoder.write_record(record.iter().copied());
        }
        String::from_utf8(encoder.take()).unwrap()
    }

    #[test]
    fn null_and_empty_text_encode_differently() {
        let encoded = encode(&[&[Some("a"), Some("")], &[Some("a"), None]]);
        assert_eq!(encoded, "\"a\",\"\"\n\"a\",\n");

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(encoded.as_bytes());
        let rows: Vec<_> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][1], "");
        assert_eq!(&rows[1][1], "");
    }

    #[test]
    fn quotes_and_separators_are_escaped() {
        assert_eq!(
            encode(&[&[None, Some("x,\"y\"\nz"), None]]),
            ",\"x,\"\"y\"\"\nz\",\n"
        );
        assert_eq!(encode(&[&[None], &[Some("")]]), "\n\"\"\n");
    }

    #[test]
    fn long_values_span_several_chunks() {
        let long = "q\"".repeat(ENCODE_CHUNK);
        let encoded = encode(&[&[Some(long.as_str())]]);
        assert_eq!(encoded.len(), 2 + long.len() + ENCODE_CHUNK + 1);
        assert!(encoded.ends_with("\"\n"));
    }

    #[test]
    fn empty_split_expects_one_row() {
        let mut progress = Progress::new(0);
        assert_eq!(progress.expected(), 1);
        assert_eq!(progress.advance(0), Vec::<u8>::new());
    }
}
