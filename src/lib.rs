pub mod config;
pub mod error;
pub mod extract;
pub mod http_client;
pub mod load;
pub mod parquet_table;
pub mod pipeline;
pub mod player_directory;
pub mod player_week;
pub mod raw_cache;
pub mod sleeper_api;
pub mod week_fetch;
