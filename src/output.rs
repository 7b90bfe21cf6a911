use std::path::PathBuf;

use csv_core::WriteResult;

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Table,
    Jsonl,
    Csv,
}

#[derive(clap::Parser)]
#[group(id = "output::Args")]
pub struct Args {
    /// Write to this file instead of the standard output.
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
    #[arg(long, short='f', value_enum, default_value_t = Format::Table)]
    format: Format,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not open the specified output file at {1:?}")]
    OpenOutputFile(#[source] std::io::Error, PathBuf),
    #[error("could not write data to the output file at {1:?}")]
    WriteFile(#[source] std::io::Error, PathBuf),
    #[error("could not write data to the terminal")]
    WriteStdout(#[source] std::io::Error),
    #[error("could not serialize a record to JSON")]
    SerializeJson(#[source] serde_json::Error),
    #[error("could not fit a CSV field into the output buffer")]
    SerializeCsv,
}

/// A row of output.
pub trait Record: serde::Serialize {
    /// Column names for the table and CSV formats.
    const HEADERS: &'static [&'static str];

    /// Cells for the table and CSV formats, in the order of [`Record::HEADERS`].
    fn cells(&self) -> Vec<String>;
}

impl Args {
    pub fn to_output(self) -> Result<Output, Error> {
        let io = match &self.output {
            None => Box::new(std::io::stdout().lock()) as Box<_>,
            Some(path) => Box::new(
                std::fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)
                    .map_err(|e| Error::OpenOutputFile(e, path.clone()))?,
            ) as Box<_>,
        };
        Ok(Output::new(self.format, self.output, io))
    }
}

pub struct Output {
    path: Option<PathBuf>,
    io: Box<dyn std::io::Write>,
    formatter: Formatter,
}

enum Formatter {
    Csv { written_headers: bool },
    Table { comfy: comfy_table::Table, written_headers: bool },
    Jsonl,
}

impl Output {
    pub fn new(format: Format, path: Option<PathBuf>, io: Box<dyn std::io::Write>) -> Self {
        let formatter = match format {
            Format::Table => {
                let mut comfy = comfy_table::Table::new();
                comfy.set_content_arrangement(comfy_table::ContentArrangement::Dynamic);
                Formatter::Table { comfy, written_headers: false }
            }
            Format::Jsonl => Formatter::Jsonl,
            Format::Csv => Formatter::Csv { written_headers: false },
        };
        Self { path, io, formatter }
    }

    pub fn record<R: Record>(&mut self, record: &R) -> Result<(), Error> {
        match &mut self.formatter {
            Formatter::Csv { written_headers } => {
                if !std::mem::replace(written_headers, true) {
                    self.write_csv_row(R::HEADERS)?;
                }
                self.write_csv_row(&record.cells())?;
            }
            Formatter::Table { comfy, written_headers } => {
                if !std::mem::replace(written_headers, true) {
                    comfy.set_header(R::HEADERS.to_vec());
                }
                comfy.add_row(record.cells());
            }
            Formatter::Jsonl => {
                serde_json::to_writer(&mut self.io, record).map_err(Error::SerializeJson)?;
                writeln!(self.io).map_err(|e| self.write_error(e))?
            }
        }
        Ok(())
    }

    fn write_csv_row<V: AsRef<str>>(&mut self, values: &[V]) -> Result<(), Error> {
        let row = csv_row(values)?;
        self.io.write_all(&row).map_err(|e| self.write_error(e))
    }

    fn write_error(&self, e: std::io::Error) -> Error {
        match &self.path {
            None => Error::WriteStdout(e),
            Some(p) => Error::WriteFile(e, p.into()),
        }
    }

    pub fn commit(mut self) -> Result<(), Error> {
        if let Formatter::Table { comfy, written_headers: true } = &self.formatter {
            writeln!(self.io, "{comfy}").map_err(|e| self.write_error(e))?;
        }
        self.io.flush().map_err(|e| self.write_error(e))
    }
}

fn csv_row<V: AsRef<str>>(values: &[V]) -> Result<Vec<u8>, Error> {
    // Every byte quoted and escaped, plus the delimiter or terminator.
    let max_len = 2 + 2 * values.iter().map(|v| v.as_ref().len()).max().unwrap_or(0);
    let mut buffer = vec![0; max_len];
    let mut row = Vec::new();
    let mut writer = csv_core::Writer::new();
    for (index, value) in values.iter().enumerate() {
        if index != 0 {
            let (WriteResult::InputEmpty, ob) = writer.delimiter(&mut buffer) else {
                return Err(Error::SerializeCsv);
            };
            row.extend_from_slice(&buffer[..ob]);
        }
        let (WriteResult::InputEmpty, _, ob) = writer.field(value.as_ref().as_bytes(), &mut buffer)
        else {
            return Err(Error::SerializeCsv);
        };
        row.extend_from_slice(&buffer[..ob]);
    }
    let (WriteResult::InputEmpty, ob) = writer.terminator(&mut buffer) else {
        return Err(Error::SerializeCsv);
    };
    row.extend_from_slice(&buffer[..ob]);
    Ok(row)
}
