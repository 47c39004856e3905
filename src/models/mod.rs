pub mod artifact;
pub mod descriptor;
pub mod job;
pub mod report;
