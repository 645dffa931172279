/// Outcome of one `work_on` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Items that came back and were written into their batch slot.
    pub returned: usize,
    /// Items still missing when the batch was declared done.
    pub not_returned: usize,
    /// Whether every submitted item returned.
    pub complete: bool,
}

impl BatchOutcome {
    pub(crate) fn complete(returned: usize) -> Self {
        Self {
            returned,
            not_returned: 0,
            complete: true,
        }
    }
}
