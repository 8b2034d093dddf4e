pub mod export;
pub mod history;
pub mod storage;
