//! A minimal work item for the demos in `main`: fitness is the square of a
//! candidate position, standing in for whatever an optimization run would
//! actually evaluate.

use domain::{BufferId, ProcessingStatus, WorkItem};

#[derive(Debug, Clone)]
pub struct Candidate {
    buffer_id: Option<BufferId>,
    submission_counter: u64,
    submission_position: usize,
    status: ProcessingStatus,
    pub position: f64,
    pub fitness: Option<f64>,
}

impl Candidate {
    #[must_use]
    pub fn new(position: f64) -> Self {
        Self {
            buffer_id: None,
            submission_counter: 0,
            submission_position: 0,
            status: ProcessingStatus::Unprocessed,
            position,
            fitness: None,
        }
    }
}

impl WorkItem for Candidate {
    fn buffer_id(&self) -> Option<BufferId> {
        self.buffer_id
    }

    fn set_buffer_id(&mut self, id: BufferId) {
        self.buffer_id = Some(id);
    }

    fn submission_counter(&self) -> u64 {
        self.submission_counter
    }

    fn set_submission_counter(&mut self, counter: u64) {
        self.submission_counter = counter;
    }

    fn submission_position(&self) -> usize {
        self.submission_position
    }

    fn set_submission_position(&mut self, position: usize) {
        self.submission_position = position;
    }

    fn processing_status(&self) -> ProcessingStatus {
        self.status
    }

    fn set_processing_status(&mut self, status: ProcessingStatus) {
        self.status = status;
    }

    fn process(&mut self) {
        self.fitness = Some(self.position * self.position);
        self.status = ProcessingStatus::ProcessedOk;
    }
}
