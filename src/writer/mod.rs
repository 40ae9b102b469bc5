//! The CSV/text dump (C11): a buffered header plus one row per bar,
//! framed with a trailing separator and a configurable numeric sink.

use std::{fmt::Debug, fs::File, io::Write, path::Path};

use crate::error::{EngineResult, WriterError};

const SEPARATOR_WIDTH: usize = 79;

/// Sink-agnostic row writer, driven once per bar by Cerebro (§4.9).
pub trait Writer: Debug {
    /// Opens the sink and writes the framing separator plus header row.
    fn start(&mut self, columns: &[String]) -> EngineResult<()>;

    /// Emits one row for the current bar.
    fn next(&mut self, values: &[f64]) -> EngineResult<()>;

    /// Writes the trailing separator and flushes the sink.
    fn stop(&mut self) -> EngineResult<()>;
}

/// The built-in CSV writer: `=`-framed, NaN either elided or written as
/// `nan`, numeric rounding configurable (§6 "Writer output (CSV)").
#[derive(Debug)]
pub struct CsvWriter<W> {
    sink: W,
    delimiter: char,
    filter_nan: bool,
    precision: Option<usize>,
    columns: usize,
}

impl<W: Write + Debug> CsvWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            delimiter: ',',
            filter_nan: false,
            precision: None,
            columns: 0,
        }
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// When `true`, a NaN field is written empty rather than as `nan`.
    pub fn with_nan_filtered(mut self, filter_nan: bool) -> Self {
        self.filter_nan = filter_nan;
        self
    }

    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = Some(precision);
        self
    }

    fn format_value(&self, value: f64) -> String {
        if value.is_nan() {
            return if self.filter_nan { String::new() } else { "nan".to_string() };
        }
        match self.precision {
            Some(p) => format!("{value:.p$}"),
            None => value.to_string(),
        }
    }

    fn write_separator(&mut self) -> EngineResult<()> {
        writeln!(self.sink, "{}", "=".repeat(SEPARATOR_WIDTH)).map_err(WriterError::Io)?;
        Ok(())
    }
}

impl CsvWriter<File> {
    pub fn to_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let file = File::create(path).map_err(WriterError::Io)?;
        Ok(Self::new(file))
    }
}

impl CsvWriter<Vec<u8>> {
    pub fn to_memory() -> Self {
        Self::new(Vec::new())
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.sink
    }
}

impl<W: Write + Debug> Writer for CsvWriter<W> {
    fn start(&mut self, columns: &[String]) -> EngineResult<()> {
        self.columns = columns.len();
        self.write_separator()?;
        let header = columns.join(&self.delimiter.to_string());
        writeln!(self.sink, "{header}").map_err(WriterError::Io)?;
        Ok(())
    }

    fn next(&mut self, values: &[f64]) -> EngineResult<()> {
        if self.columns == 0 {
            return Err(WriterError::NoHeader.into());
        }
        let row = values
            .iter()
            .map(|v| self.format_value(*v))
            .collect::<Vec<_>>()
            .join(&self.delimiter.to_string());
        writeln!(self.sink, "{row}").map_err(WriterError::Io)?;
        Ok(())
    }

    fn stop(&mut self) -> EngineResult<()> {
        self.write_separator()?;
        self.sink.flush().map_err(WriterError::Io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_the_table_with_a_79_char_separator() {
        let mut writer = CsvWriter::to_memory();
        writer.start(&["open".to_string(), "close".to_string()]).unwrap();
        writer.next(&[10.0, 11.5]).unwrap();
        writer.stop().unwrap();

        let text = String::from_utf8(writer.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0].len(), SEPARATOR_WIDTH);
        assert_eq!(lines[1], "open,close");
        assert_eq!(lines[2], "10,11.5");
        assert_eq!(lines[3].len(), SEPARATOR_WIDTH);
    }

    #[test]
    fn nan_is_elided_when_filtering_is_enabled() {
        let mut writer = CsvWriter::to_memory().with_nan_filtered(true);
        writer.start(&["sma".to_string()]).unwrap();
        writer.next(&[f64::NAN]).unwrap();
        let text = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(text.lines().nth(1), Some(""));
    }

    #[test]
    fn nan_is_written_literally_by_default() {
        let mut writer = CsvWriter::to_memory();
        writer.start(&["sma".to_string()]).unwrap();
        writer.next(&[f64::NAN]).unwrap();
        let text = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(text.lines().nth(1), Some("nan"));
    }

    #[test]
    fn precision_rounds_to_the_configured_decimal_places() {
        let mut writer = CsvWriter::to_memory().with_precision(2);
        writer.start(&["close".to_string()]).unwrap();
        writer.next(&[10.0 / 3.0]).unwrap();
        let text = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(text.lines().nth(1), Some("3.33"));
    }

    #[test]
    fn emitting_a_row_before_a_header_is_an_error() {
        let mut writer = CsvWriter::to_memory();
        assert!(writer.next(&[1.0]).is_err());
    }
}
