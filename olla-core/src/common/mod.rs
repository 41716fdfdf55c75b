//! Small shared helpers used across `olla-core` that don't belong to any
//! single component: duration (de)serialisation for TOML config fields.

pub mod duration_serde;
