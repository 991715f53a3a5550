// Matric number policy.
//
// The store allocates a monotonic sequence value inside the approval
// transaction; the policy only turns that value into the printed number.

/// Formats a sequence value into a matric number
pub trait MatricNumberFormat: Send + Sync {
    fn format(&self, sequence: u64) -> String;
}

/// `{prefix}-{sequence zero-padded to width}`, e.g. `HF-0001`
#[derive(Debug, Clone)]
pub struct PrefixedSequence {
    prefix: String,
    width: usize,
}

impl PrefixedSequence {
    pub fn new(prefix: impl Into<String>, width: usize) -> Self {
        Self {
            prefix: prefix.into(),
            width,
        }
    }
}

impl Default for PrefixedSequence {
    fn default() -> Self {
        Self::new("HF", 4)
    }
}

impl MatricNumberFormat for PrefixedSequence {
    fn format(&self, sequence: u64) -> String {
        format!("{}-{:0width$}", self.prefix, sequence, width = self.width)
    }
}
