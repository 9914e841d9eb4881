pub mod app;
pub mod array;
pub mod attributes;
pub mod bounds;
pub mod config;
pub mod cv;
pub mod domain;
pub mod dreq;
pub mod error;
pub mod fetch;
pub mod fs_util;
pub mod json;
pub mod locator;
pub mod output;
pub mod providers;
pub mod rule;
pub mod store;
pub mod table;
pub mod units;
pub mod variable;
