//! ---
//! mesh_section: "02-storage-resilience"
//! mesh_subsection: "module"
//! mesh_type: "source"
//! mesh_scope: "code"
//! mesh_description: "Resilient gateway over the remote tabular store."
//! mesh_version: "v0.1.0"
//! mesh_owner: "tbd"
//! ---
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::protocol::{RangeSpec, RemoteError, Row, TabularStore};

#[derive(Default)]
struct MemoryInner {
    sheets: HashMap<String, Vec<Row>>,
    fault_queue: VecDeque<RemoteError>,
    stall_queue: VecDeque<Duration>,
    fail_always: Option<RemoteError>,
    calls: u64,
}

/// In-memory [`TabularStore`] with scriptable faults.
///
/// Serves two purposes: it proves the backing store is swappable behind the
/// protocol trait, and it is the deterministic double every gateway,
/// adapter, and resolver test runs against. Faults queued with
/// [`fail_next`](Self::fail_next) are consumed one per call (batch reads
/// count as one call, like the real protocol's batch endpoint).
#[derive(Default)]
pub struct MemorySheetStore {
    inner: Mutex<MemoryInner>,
}

impl MemorySheetStore {
    /// Create an empty store with no sheets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace a sheet, header row included.
    pub fn insert_sheet(&self, name: impl Into<String>, rows: Vec<Row>) {
        self.inner.lock().sheets.insert(name.into(), rows);
    }

    /// Snapshot a sheet's rows (header included). Empty if absent.
    pub fn rows(&self, name: &str) -> Vec<Row> {
        self.inner
            .lock()
            .sheets
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of store calls observed so far.
    pub fn calls(&self) -> u64 {
        self.inner.lock().calls
    }

    /// Queue a failure for the next call.
    pub fn fail_next(&self, err: RemoteError) {
        self.inner.lock().fault_queue.push_back(err);
    }

    /// Fail every call until [`clear_faults`](Self::clear_faults).
    pub fn fail_always(&self, err: RemoteError) {
        self.inner.lock().fail_always = Some(err);
    }

    /// Queue a response delay for the next call (exercises call timeouts).
    pub fn stall_next(&self, delay: Duration) {
        self.inner.lock().stall_queue.push_back(delay);
    }

    /// Drop all queued and standing faults.
    pub fn clear_faults(&self) {
        let mut inner = self.inner.lock();
        inner.fault_queue.clear();
        inner.stall_queue.clear();
        inner.fail_always = None;
    }

    /// Count a call, then surface any scripted stall/fault for it.
    async fn admit(&self) -> Result<(), RemoteError> {
        let (stall, fault) = {
            let mut inner = self.inner.lock();
            inner.calls += 1;
            let stall = inner.stall_queue.pop_front();
            let fault = inner
                .fault_queue
                .pop_front()
                .or_else(|| inner.fail_always.clone());
            (stall, fault)
        };
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        match fault {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn read_locked(
        sheets: &HashMap<String, Vec<Row>>,
        sheet: &str,
        range: Option<&str>,
    ) -> Result<Vec<Row>, RemoteError> {
        let rows = sheets
            .get(sheet)
            .ok_or_else(|| RemoteError::not_found(format!("no such sheet: {sheet}")))?;
        let Some(range) = range else {
            return Ok(rows.clone());
        };
        let parsed = ParsedRange::parse(range)?;
        let last_row = parsed.end_row.unwrap_or(rows.len()).min(rows.len());
        if parsed.start_row > last_row {
            return Ok(Vec::new());
        }
        let mut out = Vec::with_capacity(last_row - parsed.start_row + 1);
        for row in &rows[parsed.start_row - 1..last_row] {
            let last_col = parsed.end_col.unwrap_or(row.len()).min(row.len());
            if parsed.start_col > last_col {
                out.push(Vec::new());
            } else {
                out.push(row[parsed.start_col - 1..last_col].to_vec());
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl TabularStore for MemorySheetStore {
    async fn read(&self, sheet: &str, range: Option<&str>) -> Result<Vec<Row>, RemoteError> {
        self.admit().await?;
        let inner = self.inner.lock();
        Self::read_locked(&inner.sheets, sheet, range)
    }

    async fn write(&self, sheet: &str, range: &str, rows: Vec<Row>) -> Result<(), RemoteError> {
        self.admit().await?;
        let parsed = ParsedRange::parse(range)?;
        let mut inner = self.inner.lock();
        let target = inner
            .sheets
            .get_mut(sheet)
            .ok_or_else(|| RemoteError::not_found(format!("no such sheet: {sheet}")))?;
        for (offset, new_row) in rows.into_iter().enumerate() {
            let row_index = parsed.start_row - 1 + offset;
            while target.len() <= row_index {
                target.push(Vec::new());
            }
            let row = &mut target[row_index];
            for (col_offset, cell) in new_row.into_iter().enumerate() {
                let col_index = parsed.start_col - 1 + col_offset;
                while row.len() <= col_index {
                    row.push(String::new());
                }
                row[col_index] = cell;
            }
        }
        Ok(())
    }

    async fn append(&self, sheet: &str, rows: Vec<Row>) -> Result<(), RemoteError> {
        self.admit().await?;
        let mut inner = self.inner.lock();
        inner.sheets.entry(sheet.to_owned()).or_default().extend(rows);
        Ok(())
    }

    async fn batch_read(
        &self,
        specs: &[RangeSpec],
    ) -> Result<IndexMap<RangeSpec, Vec<Row>>, RemoteError> {
        self.admit().await?;
        let inner = self.inner.lock();
        let mut out = IndexMap::with_capacity(specs.len());
        for spec in specs {
            let rows = Self::read_locked(&inner.sheets, &spec.sheet, spec.range.as_deref())?;
            out.insert(spec.clone(), rows);
        }
        Ok(out)
    }

    async fn clear(&self, sheet: &str, range: Option<&str>) -> Result<(), RemoteError> {
        self.admit().await?;
        let mut inner = self.inner.lock();
        let target = inner
            .sheets
            .get_mut(sheet)
            .ok_or_else(|| RemoteError::not_found(format!("no such sheet: {sheet}")))?;
        match range {
            None => target.clear(),
            Some(range) => {
                let parsed = ParsedRange::parse(range)?;
                let last_row = parsed.end_row.unwrap_or(target.len()).min(target.len());
                for row in target
                    .iter_mut()
                    .take(last_row)
                    .skip(parsed.start_row.saturating_sub(1))
                {
                    let last_col = parsed.end_col.unwrap_or(row.len()).min(row.len());
                    for cell in row
                        .iter_mut()
                        .take(last_col)
                        .skip(parsed.start_col.saturating_sub(1))
                    {
                        cell.clear();
                    }
                }
            }
        }
        Ok(())
    }
}

/// A1-subset range: `A5`, `A5:K9`, `A2:D` (open-ended rows).
#[derive(Debug, PartialEq, Eq)]
struct ParsedRange {
    start_row: usize,
    start_col: usize,
    end_row: Option<usize>,
    end_col: Option<usize>,
}

impl ParsedRange {
    fn parse(range: &str) -> Result<Self, RemoteError> {
        let mut parts = range.split(':');
        let start = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| RemoteError::bad_request(format!("empty range: {range:?}")))?;
        let (start_col, start_row) = parse_cell(start)?;
        let start_row = start_row
            .ok_or_else(|| RemoteError::bad_request(format!("range start needs a row: {range:?}")))?;

        let (end_col, end_row) = match parts.next() {
            None => (Some(start_col), Some(start_row)),
            Some(end) => {
                let (col, row) = parse_cell(end)?;
                (Some(col), row)
            }
        };
        if parts.next().is_some() {
            return Err(RemoteError::bad_request(format!("malformed range: {range:?}")));
        }
        Ok(Self {
            start_row,
            start_col,
            end_row,
            end_col,
        })
    }
}

/// Split `AB12` into a 1-based column index and optional row number.
fn parse_cell(cell: &str) -> Result<(usize, Option<usize>), RemoteError> {
    let letters: String = cell.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let digits = &cell[letters.len()..];
    if letters.is_empty() {
        return Err(RemoteError::bad_request(format!("cell needs a column: {cell:?}")));
    }
    let mut col = 0usize;
    for c in letters.chars() {
        col = col * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
    }
    let row = if digits.is_empty() {
        None
    } else {
        Some(
            digits
                .parse::<usize>()
                .ok()
                .filter(|r| *r >= 1)
                .ok_or_else(|| RemoteError::bad_request(format!("bad row in cell: {cell:?}")))?,
        )
    };
    Ok((col, row))
}
