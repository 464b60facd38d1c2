#![allow(dead_code)]

pub mod db;
pub mod fixtures;
pub mod logs;

pub use db::TestDb;
pub use fixtures::{Dataset, WorldBuilder};
pub use logs::CapturedLogs;
