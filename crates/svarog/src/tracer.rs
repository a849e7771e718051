//! Elaboration tracing hooks.
//!
//! Implement [`ElabTracer`] to observe elaboration as it happens without
//! touching the diagnostics stream. [`NoopTracer`] is the default,
//! [`StderrTracer`] backs the driver's `--trace` flag, and
//! [`RecordingTracer`] collects events for tests.

/// Callbacks fired while the elaborator works.
pub trait ElabTracer {
    /// A cell name resolved to a definition in a library.
    fn definition_resolved(&mut self, name: &str, library: &str) {
        let _ = (name, library);
    }

    /// An instance (module-like or checker) was created.
    fn instance_created(&mut self, name: &str) {
        let _ = name;
    }

    /// Elaboration adopted a configuration (top selection or redirect).
    fn config_adopted(&mut self, name: &str) {
        let _ = name;
    }
}

/// Does nothing; the default tracer.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl ElabTracer for NoopTracer {}

/// Prints every event to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrTracer;

impl ElabTracer for StderrTracer {
    fn definition_resolved(&mut self, name: &str, library: &str) {
        eprintln!("resolve {name} -> {library}");
    }

    fn instance_created(&mut self, name: &str) {
        eprintln!("instance {name}");
    }

    fn config_adopted(&mut self, name: &str) {
        eprintln!("config {name}");
    }
}

/// Records events for later inspection; used by tests.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    pub events: Vec<TraceEvent>,
}

/// One recorded elaboration event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    DefinitionResolved { name: String, library: String },
    InstanceCreated { name: String },
    ConfigAdopted { name: String },
}

impl ElabTracer for RecordingTracer {
    fn definition_resolved(&mut self, name: &str, library: &str) {
        self.events.push(TraceEvent::DefinitionResolved {
            name: name.to_owned(),
            library: library.to_owned(),
        });
    }

    fn instance_created(&mut self, name: &str) {
        self.events.push(TraceEvent::InstanceCreated { name: name.to_owned() });
    }

    fn config_adopted(&mut self, name: &str) {
        self.events.push(TraceEvent::ConfigAdopted { name: name.to_owned() });
    }
}
