use std::io::{self, Write};

use serde::Serialize;

use crate::app::{AttrsResult, ConvertResult, CvResult, LocateResult, TablesResult};

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_locate(result: &LocateResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_cv(result: &CvResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_tables(result: &TablesResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_attrs(result: &AttrsResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_convert(result: &ConvertResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn to_json<T: Serialize>(value: &T) -> io::Result<String> {
        serde_json::to_string_pretty(value).map_err(io::Error::other)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = Self::to_json(value)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
