//! svarog: a hierarchical elaboration front end for hardware description
//! sources.
//!
//! Given a set of parsed design units (modules, interfaces, programs,
//! packages, primitives, checkers, and configurations) spread across named
//! source libraries, the [`Compilation`] resolves top-level instances and
//! recursively instantiates a typed symbol tree, honoring library search
//! order, per-configuration cell and instance overrides, parameter
//! overrides, and bind directives.
//!
//! ```
//! use svarog::{Compilation, CompilationOptions};
//!
//! let mut compilation = Compilation::new(CompilationOptions::default());
//! compilation.add_source("top.sv", "module leaf; endmodule module top; leaf u(); endmodule");
//! compilation.elaborate();
//! assert!(!compilation.diagnostics().has_errors());
//! let leaf = compilation.find_instance("top.u").unwrap();
//! assert_eq!(compilation.definition_name(leaf), Some("leaf"));
//! ```

mod checker;
mod compilation;
mod config;
mod diag;
mod elab;
mod instance;
mod intern;
mod library;
mod overrides;
mod packages;
mod params;
mod parse;
mod ports;
mod registry;
mod source;
mod symbol;
mod syntax;
pub mod tracer;
mod value;

pub use crate::{
    compilation::{Compilation, CompilationOptions, Limits},
    config::{ConfigBlock, ConfigId, ConfigRule, ResolvedConfig},
    diag::{DiagCode, Diagnostic, Diagnostics, Severity},
    intern::NameId,
    library::{LibMapEntry, LibraryId, SourceLibrary, parse_libmap},
    overrides::OverrideNodeId,
    params::ParameterSymbol,
    ports::{PortConnection, PortConnectionMap, PortSymbol},
    registry::{Definition, DefinitionId},
    source::{SourceLoc, SourceRange},
    symbol::{
        BodyId, CheckerFormal, CheckerInstance, Instance, InstanceArray, InstanceBody, Lazy, NetSymbol,
        PrimitiveInstance, Symbol, SymbolId, UninstantiatedInst,
    },
    syntax::{DesignKind, GateKind, PortDirection},
    tracer::{ElabTracer, NoopTracer, RecordingTracer, StderrTracer, TraceEvent},
    value::ConstantValue,
};
