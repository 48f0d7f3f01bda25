use serde::Serialize;

use crate::error::{Error, Result};

/// Marker that identifies Android package-style process names.
const PACKAGE_PREFIX: &str = "com.";

/// One row of `memuc listvms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceRecord {
    pub index: u16,
    pub name: String,
    /// Raw status column as reported by memuc.
    pub status: u16,
    pub enabled: bool,
}

/// One running Android package, as found in `adb shell ps`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessRecord {
    pub name: String,
}

/// Parses the comma-separated `listvms` output.
///
/// Columns are `index,name,<unused>,status,...`. Lines of one byte or less
/// are blank separators and skipped. Any malformed row aborts the whole parse.
pub fn parse_instances(text: &str) -> Result<Vec<InstanceRecord>> {
    let mut records = Vec::new();

    for line in text.split('\n') {
        if line.len() <= 1 {
            continue;
        }
        let line = line.strip_suffix('\r').unwrap_or(line);
        let fields: Vec<&str> = line.split(',').collect();

        let index = parse_unsigned(line, &fields, 0)?;
        let name = field(line, &fields, 1)?.to_string();
        let status = parse_unsigned(line, &fields, 3)?;

        records.push(InstanceRecord {
            index,
            name,
            status,
            enabled: status != 0,
        });
    }

    Ok(records)
}

/// Extracts package names from `adb shell ps` output.
///
/// Only lines mentioning a package survive. The listing always wraps its
/// matches in one extra leading and trailing match, so those two are
/// dropped; two or fewer matches therefore produce nothing.
pub fn parse_processes(text: &str) -> Vec<ProcessRecord> {
    let matched: Vec<&str> = text
        .split('\n')
        .filter(|line| line.contains(PACKAGE_PREFIX))
        .collect();

    if matched.len() <= 2 {
        return Vec::new();
    }

    matched[1..matched.len() - 1]
        .iter()
        .filter_map(|line| {
            let start = line.find(PACKAGE_PREFIX)?;
            let name = &line[start..];
            let name = name.strip_suffix('\r').unwrap_or(name);
            Some(ProcessRecord {
                name: name.to_string(),
            })
        })
        .collect()
}

fn field<'a>(line: &str, fields: &[&'a str], position: usize) -> Result<&'a str> {
    fields
        .get(position)
        .copied()
        .ok_or_else(|| Error::MalformedField {
            line: line.to_string(),
            field: position,
            reason: format!("expected at least {} columns", position + 1),
        })
}

fn parse_unsigned(line: &str, fields: &[&str], position: usize) -> Result<u16> {
    let raw = field(line, fields, position)?;
    // str::parse accepts a leading '+', which memuc never prints.
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::MalformedField {
            line: line.to_string(),
            field: position,
            reason: format!("{raw:?} is not an unsigned integer"),
        });
    }
    raw.parse::<u16>().map_err(|err| Error::MalformedField {
        line: line.to_string(),
        field: position,
        reason: err.to_string(),
    })
}
