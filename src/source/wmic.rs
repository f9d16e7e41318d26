//! Out-of-process [`ProcessInfoSource`] that shells out to `wmic`.
//!
//! The query asks only for the requested ids and the five columns a
//! [`ProcessRecord`] needs, in CSV form. `wmic` sorts columns alphabetically
//! and prepends a `Node` column, so rows are decoded by header name rather
//! than by position. Fields are never quoted.

use std::process::Stdio;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use csv::{ReaderBuilder, StringRecord, Trim};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{BoxFuture, OutstandingQueries, ProcessInfoSource};
use crate::models::{ProcessId, ProcessRecord};
use crate::{AppError, Result};

const COLUMNS: &str = "CreationDate,ExecutablePath,Name,ParentProcessId,ProcessId";

/// Runs `wmic process … get … /format:csv` for every lookup.
#[derive(Debug, Clone)]
pub struct WmicSource {
    wmic_path: String,
}

impl WmicSource {
    /// Create a source that invokes the given `wmic` executable.
    #[must_use]
    pub fn new(wmic_path: impl Into<String>) -> Self {
        Self {
            wmic_path: wmic_path.into(),
        }
    }

    /// Arguments passed to `wmic` for a lookup of `ids`.
    #[must_use]
    pub fn query_args(ids: &[ProcessId]) -> Vec<String> {
        let filter = ids
            .iter()
            .map(|id| format!("ProcessId={id}"))
            .collect::<Vec<_>>()
            .join(" or ");
        vec![
            "process".into(),
            "where".into(),
            filter,
            "get".into(),
            COLUMNS.into(),
            "/format:csv".into(),
        ]
    }

    async fn run_query(&self, ids: &[ProcessId], queries: &OutstandingQueries) -> Result<Vec<u8>> {
        let mut child = Command::new(&self.wmic_path)
            .args(Self::query_args(ids))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| AppError::Query(format!("failed to spawn {}: {err}", self.wmic_path)))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Query("wmic stdout was not captured".into()))?;

        let ticket = queries.track(child);
        let mut raw = Vec::new();
        let read = stdout.read_to_end(&mut raw).await;

        let Some(mut child) = queries.release(ticket) else {
            return Err(AppError::Query("wmic query was killed".into()));
        };
        read.map_err(|err| AppError::Query(format!("failed to read wmic output: {err}")))?;

        let status = child
            .wait()
            .await
            .map_err(|err| AppError::Query(format!("failed to wait for wmic: {err}")))?;
        if !status.success() {
            return Err(AppError::Query(format!("wmic exited with {status}")));
        }

        Ok(raw)
    }
}

impl ProcessInfoSource for WmicSource {
    fn lookup<'a>(
        &'a self,
        ids: &'a [ProcessId],
        queries: &'a OutstandingQueries,
    ) -> BoxFuture<'a, Result<Vec<ProcessRecord>>> {
        Box::pin(async move {
            if ids.is_empty() {
                return Ok(Vec::new());
            }

            let raw = self.run_query(ids, queries).await?;
            let records = parse_csv(&decode_output(&raw));
            debug!(requested = ids.len(), found = records.len(), "wmic lookup complete");
            Ok(records)
        })
    }
}

/// Decode `wmic` output, which is UTF-16LE when redirected to some sinks and
/// the ANSI code page otherwise.
#[must_use]
pub fn decode_output(raw: &[u8]) -> String {
    let looks_utf16 = raw.starts_with(&[0xFF, 0xFE]) || (raw.len() >= 2 && raw[1] == 0);
    if !looks_utf16 {
        return String::from_utf8_lossy(raw).into_owned();
    }

    let body = raw.strip_prefix(&[0xFF, 0xFE]).unwrap_or(raw);
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Column positions of one `wmic` CSV header.
///
/// `wmic` never quotes its fields, so a comma inside `ExecutablePath` shows up
/// as extra fields in that row. Columns before the path are read from the
/// left, columns after it are shifted right by the overflow, and the overflow
/// is joined back into the path.
#[derive(Debug, Clone, Copy)]
struct Columns {
    width: usize,
    created: usize,
    path: usize,
    name: usize,
    parent: usize,
    id: usize,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Option<Self> {
        let position = |name: &str| headers.iter().position(|c| c.eq_ignore_ascii_case(name));
        Some(Self {
            width: headers.len(),
            created: position("CreationDate")?,
            path: position("ExecutablePath")?,
            name: position("Name")?,
            parent: position("ParentProcessId")?,
            id: position("ProcessId")?,
        })
    }

    fn field<'r>(&self, row: &'r StringRecord, column: usize, overflow: usize) -> Option<&'r str> {
        let index = if column > self.path {
            column + overflow
        } else {
            column
        };
        row.get(index).map(str::trim)
    }

    fn record(&self, row: &StringRecord) -> Option<ProcessRecord> {
        let Some(overflow) = row.len().checked_sub(self.width) else {
            debug!(fields = row.len(), expected = self.width, "skipping short wmic row");
            return None;
        };

        let id = self.field(row, self.id, overflow)?.parse::<ProcessId>().ok()?;
        let parent_id = self
            .field(row, self.parent, overflow)?
            .parse::<ProcessId>()
            .ok()?;
        let name = self.field(row, self.name, overflow)?;
        let start_time = self
            .field(row, self.created, overflow)
            .and_then(parse_cim_datetime)
            .unwrap_or_else(|| {
                debug!(pid = id, "unparseable creation date, treating as oldest");
                DateTime::UNIX_EPOCH
            });

        let path = (self.path..=self.path + overflow)
            .filter_map(|index| row.get(index))
            .collect::<Vec<_>>()
            .join(",");

        let mut record = ProcessRecord::new(id, parent_id, name, start_time);
        let path = path.trim();
        if !path.is_empty() {
            record = record.with_path(path);
        }
        Some(record)
    }
}

/// Parse `wmic … /format:csv` output into records, in output order.
///
/// Rows with too few fields or unparseable ids are skipped. Extra fields are
/// treated as commas inside `ExecutablePath`.
#[must_use]
pub fn parse_csv(text: &str) -> Vec<ProcessRecord> {
    // wmic terminates lines with `\r\r\n` and leads with a blank line.
    let body = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .trim(Trim::Headers)
        .from_reader(body.as_bytes());

    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(err) => {
            warn!(%err, "unreadable wmic csv header");
            return Vec::new();
        }
    };
    let Some(columns) = Columns::from_headers(&headers) else {
        if !headers.is_empty() {
            warn!(header = ?headers, "unexpected wmic csv header");
        }
        return Vec::new();
    };

    reader
        .records()
        .filter_map(|row| match row {
            Ok(row) => columns.record(&row),
            Err(err) => {
                debug!(%err, "skipping unreadable wmic row");
                None
            }
        })
        .collect()
}

/// Parse a CIM datetime (`yyyymmddHHMMSS.ffffff±UUU`, offset in minutes).
#[must_use]
pub fn parse_cim_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if raw.len() != 25 || !raw.is_ascii() {
        return None;
    }

    let (stamp, offset) = raw.split_at(21);
    let local = NaiveDateTime::parse_from_str(stamp, "%Y%m%d%H%M%S%.f").ok()?;
    let minutes: i64 = offset.parse().ok()?;
    let utc = local.checked_sub_signed(TimeDelta::try_minutes(minutes)?)?;
    Some(utc.and_utc())
}
