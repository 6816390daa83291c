use crate::dispatch::WorkerResult;
use clap::ValueEnum;
use serde::Deserialize;
use serde_json::json;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Text,
    Json,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Text
    }
}

pub struct RequestReport<'a> {
    result: &'a WorkerResult,
}

impl<'a> RequestReport<'a> {
    pub fn new(result: &'a WorkerResult) -> RequestReport<'a> {
        RequestReport { result }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self.result.outcome {
            Ok(ref timings) => json!({ "request": self.result.worker, "phases": timings }),
            Err(ref e) => json!({ "request": self.result.worker, "error": e.to_string() }),
        }
    }

    pub fn write_to<W: Write>(&self, out: &mut W, format: OutputFormat) -> io::Result<()> {
        match format {
            OutputFormat::Text => writeln!(out, "{}", self),
            OutputFormat::Json => writeln!(out, "{}", self.to_json()),
        }
    }
}

impl<'a> Display for RequestReport<'a> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self.result.outcome {
            Ok(ref timings) => write!(f, "Request #{}\n{}", self.result.worker, timings),
            Err(ref e) => write!(f, "Request #{} failed: {}", self.result.worker, e),
        }
    }
}
