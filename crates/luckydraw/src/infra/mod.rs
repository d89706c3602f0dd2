pub mod connector;
pub mod db;
pub mod file_utils;
pub mod scheduler;
