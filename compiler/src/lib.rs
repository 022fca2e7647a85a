// blockc — Block compiler for ESP32
//
// Library root. Loading (workspace, registry), generation (codegen, rules,
// names, pipeline) and the companion service (config, logging, ports,
// toolchain, server).

pub mod block;
pub mod codegen;
pub mod config;
pub mod diag;
pub mod id;
pub mod logging;
pub mod names;
pub mod pipeline;
pub mod ports;
pub mod registry;
pub mod rules;
pub mod server;
pub mod toolchain;
pub mod validate;
pub mod workspace;
