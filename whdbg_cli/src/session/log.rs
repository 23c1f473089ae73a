//! Append-only history of captured requests

use whdbg_common::RequestRecord;

/// Client-local display flags for one record
#[derive(Debug, Clone, Copy, Default)]
struct Overlay {
    read: bool,
    expanded: bool,
}

/// A real record as seen by the renderer
#[derive(Debug, Clone, Copy)]
pub struct LogEntry<'a> {
    /// Position in arrival order, stable for the session
    pub index: usize,
    pub record: &'a RequestRecord,
    pub read: bool,
    pub expanded: bool,
}

/// Captured requests in arrival order.
///
/// Placeholders from the feed are stored so indices match the stream, but no
/// view ever exposes them. Read/expanded state lives beside the records and
/// never touches them.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: Vec<Option<RequestRecord>>,
    overlay: Vec<Overlay>,
    real: usize,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record (or placeholder). Returns the index of a real record.
    pub fn append(&mut self, record: Option<RequestRecord>) -> Option<usize> {
        let index = self.entries.len();
        let is_real = record.is_some();

        self.entries.push(record);
        self.overlay.push(Overlay::default());

        if is_real {
            self.real += 1;
            Some(index)
        } else {
            None
        }
    }

    /// Toggle the expanded state of a record and mark it read.
    ///
    /// Returns the new expanded state, or `None` if `index` is not a record.
    pub fn toggle_read(&mut self, index: usize) -> Option<bool> {
        if !matches!(self.entries.get(index), Some(Some(_))) {
            return None;
        }
        let overlay = &mut self.overlay[index];
        overlay.expanded = !overlay.expanded;
        overlay.read = true;
        Some(overlay.expanded)
    }

    /// Records newest first, placeholders removed
    pub fn newest_first(&self) -> impl Iterator<Item = LogEntry<'_>> + '_ {
        self.entries
            .iter()
            .zip(self.overlay.iter())
            .enumerate()
            .rev()
            .filter_map(|(index, (record, overlay))| {
                record.as_ref().map(|record| LogEntry {
                    index,
                    record,
                    read: overlay.read,
                    expanded: overlay.expanded,
                })
            })
    }

    pub fn get(&self, index: usize) -> Option<LogEntry<'_>> {
        let record = self.entries.get(index)?.as_ref()?;
        let overlay = self.overlay[index];
        Some(LogEntry {
            index,
            record,
            read: overlay.read,
            expanded: overlay.expanded,
        })
    }

    /// Number of real records
    pub fn len(&self) -> usize {
        self.real
    }

    pub fn is_empty(&self) -> bool {
        self.real == 0
    }

    /// Number of records never expanded
    pub fn unread(&self) -> usize {
        self.newest_first().filter(|e| !e.read).count()
    }
}
