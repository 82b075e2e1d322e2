use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonStyle {
    Pretty,
    Compact,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn render<T: Serialize>(value: &T, style: JsonStyle) -> io::Result<String> {
        let json = match style {
            JsonStyle::Pretty => serde_json::to_string_pretty(value),
            JsonStyle::Compact => serde_json::to_string(value),
        };
        json.map_err(|err| io::Error::new(io::ErrorKind::Other, err))
    }

    pub fn emit<T: Serialize>(value: &T, style: JsonStyle, path: Option<&Path>) -> io::Result<()> {
        let json = Self::render(value, style)?;
        match path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, json.as_bytes())?;
                eprintln!("Output written to {}", path.display());
            }
            None => {
                let mut stdout = io::stdout();
                stdout.write_all(json.as_bytes())?;
                stdout.write_all(b"\n")?;
            }
        }
        Ok(())
    }
}
