pub mod classify;
pub mod compute;
pub mod drive;
pub mod lister;
pub mod orchestrator;
pub mod planner;
pub mod poller;
pub mod registry;
pub mod retriever;
pub mod s3;
pub mod storage;
pub mod submitter;
