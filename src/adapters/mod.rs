// Adapters layer: concrete implementations for external systems (http, database, filesystem).

pub mod db;
pub mod http;
pub mod storage;
