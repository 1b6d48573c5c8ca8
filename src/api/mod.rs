pub mod jobs;

pub use jobs::{generate_job_id, media_source_from_upload, JobManager, JobSubmission};
