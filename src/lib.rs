//=====================================================
// File: lib.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: sciblock library root
// Objective: Snippet execution engine with line-accurate diagnostics and
//            data/plot block adapters built on top of it
//=====================================================

pub mod ast;
pub mod blocks;
pub mod capture;
pub mod config;
pub mod error;
pub mod executor;
pub mod interpreter;
pub mod modules;
pub mod parser;
pub mod source_registry;
pub mod stdlib_registry;
pub mod surface;
pub mod tokenizer;

pub use blocks::{DataBlock, Fields, PlotBlock, PlotOutput};
pub use capture::{CaptureError, ImageCapture, ImageData, LogDisplay, SurfaceDisplay, SvgCapture};
pub use config::Config;
pub use error::{BlockError, ContractViolation};
pub use executor::{ExecutionDiagnostic, Executor, Namespace};
pub use interpreter::Value;
pub use source_registry::SourceRegistry;
pub use surface::{PlotSurface, SurfaceLifecycle};
