//! In-memory record accumulator

/// Ordered, append-only list of records awaiting packaging
#[derive(Debug, Clone)]
pub struct RecordBatch<T> {
    records: Vec<T>,
    threshold: usize,
}

impl<T> RecordBatch<T> {
    pub fn new(threshold: usize) -> Self {
        Self {
            records: Vec::new(),
            threshold: threshold.max(1),
        }
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = T>) {
        self.records.extend(records);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.threshold
    }

    /// Take every record if the threshold is reached
    pub fn take_full(&mut self) -> Option<Vec<T>> {
        if self.is_full() {
            Some(std::mem::take(&mut self.records))
        } else {
            None
        }
    }

    /// Put records back ahead of anything appended since they were taken
    pub fn restore(&mut self, mut records: Vec<T>) {
        records.append(&mut self.records);
        self.records = records;
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }
}
