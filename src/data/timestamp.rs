//! Outer join on a shared timestamp column.
//!
//! Alternative to [`merge_by_row_index`](super::merge::merge_by_row_index) for channels
//! sampled at different rates. Tables are parsed field-wise; the output has one key
//! column followed by every channel's remaining columns in channel order.
//!
//! Keys are sorted numerically when all of them parse as numbers, lexicographically
//! otherwise. A key repeated inside one channel yields the cartesian product of the
//! matching rows across channels. A channel without a row for a key contributes empty
//! fields.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use csv::{ReaderBuilder, StringRecord, Terminator, WriterBuilder};
use tracing::debug;

use super::merge::{MergedRow, MergedTable};
use crate::error::{AppResult, TelemetryError};
use crate::telemetry::RenderedChannels;

/// A channel table parsed for joining.
#[derive(Debug)]
struct KeyedTable {
    columns: Vec<String>,
    rows: Vec<(String, Vec<String>)>,
    index: HashMap<String, Vec<usize>>,
}

impl KeyedTable {
    fn parse(channel: &str, text: &str, key_column: &str) -> AppResult<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(text.as_bytes());

        let headers = reader.headers()?.clone();
        let key_idx = headers
            .iter()
            .position(|h| h.trim() == key_column)
            .ok_or_else(|| TelemetryError::MissingColumn {
                channel: channel.to_string(),
                column: key_column.to_string(),
            })?;

        let columns = without(&headers, key_idx);
        let mut rows = Vec::new();
        let mut index: HashMap<String, Vec<usize>> = HashMap::new();
        for record in reader.records() {
            let record = record?;
            let key = record.get(key_idx).unwrap_or_default().trim().to_string();
            index.entry(key.clone()).or_default().push(rows.len());
            rows.push((key, without(&record, key_idx)));
        }

        debug!(channel, rows = rows.len(), columns = columns.len(), "channel parsed for join");
        Ok(Self {
            columns,
            rows,
            index,
        })
    }

    fn matches(&self, key: &str) -> &[usize] {
        self.index.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn without(record: &StringRecord, skip: usize) -> Vec<String> {
    record
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != skip)
        .map(|(_, field)| field.to_string())
        .collect()
}

/// Sort keys numerically if every key is a number, otherwise as strings.
fn sort_keys(keys: &mut [String]) {
    let numeric: Option<Vec<f64>> = keys.iter().map(|k| k.parse::<f64>().ok()).collect();
    match numeric {
        Some(_) => keys.sort_by(|a, b| {
            let (a, b) = (a.parse::<f64>(), b.parse::<f64>());
            match (a, b) {
                (Ok(a), Ok(b)) => a.total_cmp(&b),
                _ => Ordering::Equal,
            }
        }),
        None => keys.sort(),
    }
}

fn csv_line(fields: &[String]) -> AppResult<String> {
    let mut writer = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(fields)?;
    let bytes = writer
        .into_inner()
        .map_err(|e| TelemetryError::Io(e.into_error()))?;
    let mut line = String::from_utf8_lossy(&bytes).into_owned();
    if line.ends_with('\n') {
        line.pop();
    }
    Ok(line)
}

/// Outer-join the named channels of `rendered` on `key_column`, in `order`.
pub fn join_on_timestamp(
    order: &[String],
    rendered: &RenderedChannels,
    key_column: &str,
) -> AppResult<MergedTable> {
    let mut tables = Vec::with_capacity(order.len());
    for name in order {
        let text = rendered
            .get(name)
            .ok_or_else(|| TelemetryError::MissingChannel(name.clone()))?;
        tables.push(KeyedTable::parse(name, text, key_column)?);
    }

    let mut header = vec![key_column.to_string()];
    for table in &tables {
        header.extend(table.columns.iter().cloned());
    }
    let headers = header
        .iter()
        .map(|column| csv_line(std::slice::from_ref(column)))
        .collect::<AppResult<Vec<_>>>()?;

    let mut seen: HashSet<&String> = HashSet::new();
    let mut keys: Vec<String> = tables
        .iter()
        .flat_map(|table| table.rows.iter().map(|(key, _)| key))
        .filter(|key| seen.insert(*key))
        .cloned()
        .collect();
    sort_keys(&mut keys);

    let mut rows = Vec::new();
    for key in &keys {
        // (fields, contributing channels) for every combination built so far
        let mut combos: Vec<(Vec<String>, usize)> = vec![(vec![key.clone()], 0)];
        for table in &tables {
            let matches = table.matches(key);
            let mut next = Vec::with_capacity(combos.len() * matches.len().max(1));
            for (fields, segments) in &combos {
                if matches.is_empty() {
                    let mut fields = fields.clone();
                    fields.extend(std::iter::repeat(String::new()).take(table.columns.len()));
                    next.push((fields, *segments));
                } else {
                    for &row in matches {
                        let mut fields = fields.clone();
                        fields.extend(table.rows[row].1.iter().cloned());
                        next.push((fields, segments + 1));
                    }
                }
            }
            combos = next;
        }

        for (fields, segments) in combos {
            rows.push(MergedRow {
                text: csv_line(&fields)?,
                segments,
            });
        }
    }

    debug!(keys = keys.len(), rows = rows.len(), "timestamp join complete");
    Ok(MergedTable::from_parts(headers, rows, tables.len()))
}
