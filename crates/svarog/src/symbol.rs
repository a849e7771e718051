//! The elaborated symbol tree.
//!
//! Symbols are a tagged sum stored in an append-only arena owned by the
//! compilation; references between them are plain ids, so instances can
//! point at bodies and bodies back at their parent instance without shared
//! ownership. Lazily computed attributes (port lists, connection maps) use a
//! one-shot [`Lazy`] cell: re-entrant observation during `InProgress` means
//! the first entrant is still working and the re-entrant caller backs off.

use ahash::AHashSet;
use smallvec::SmallVec;

use crate::{
    config::ResolvedConfig,
    intern::NameId,
    overrides::OverrideNodeId,
    params::ParameterSymbol,
    ports::{PortConnectionMap, PortSymbol},
    registry::DefinitionId,
    source::SourceRange,
    syntax::GateKind,
};

/// Handle to a symbol in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct SymbolId(pub(crate) u32);

impl SymbolId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to an instance body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct BodyId(pub(crate) u32);

impl BodyId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One-shot cell for lazily computed attributes.
#[derive(Debug, Default)]
pub enum Lazy<T> {
    #[default]
    Unset,
    InProgress,
    Ready(T),
}

impl<T> Lazy<T> {
    #[must_use]
    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::InProgress)
    }
}

/// An elaborated symbol.
#[derive(Debug)]
pub enum Symbol {
    Instance(Instance),
    InstanceArray(InstanceArray),
    Primitive(PrimitiveInstance),
    Checker(CheckerInstance),
    Uninstantiated(UninstantiatedInst),
    Net(NetSymbol),
}

impl Symbol {
    /// Display name, if the variant carries one (interior array nodes don't).
    #[must_use]
    pub fn name(&self) -> Option<NameId> {
        match self {
            Self::Instance(inst) => Some(inst.name),
            Self::InstanceArray(array) => array.name,
            Self::Primitive(prim) => Some(prim.name),
            Self::Checker(checker) => Some(checker.name),
            Self::Uninstantiated(inst) => Some(inst.name),
            Self::Net(net) => Some(net.name),
        }
    }

    #[must_use]
    pub fn body(&self) -> Option<BodyId> {
        match self {
            Self::Instance(inst) => Some(inst.body),
            Self::Checker(checker) => Some(checker.body),
            _ => None,
        }
    }
}

/// A realized occurrence of a module-like definition.
#[derive(Debug)]
pub struct Instance {
    pub name: NameId,
    pub range: SourceRange,
    /// Absolute indices from the outermost array dimension; empty for a
    /// non-array instance.
    pub array_path: SmallVec<[i64; 2]>,
    pub body: BodyId,
}

/// An n-dimensional replication. Interior nodes carry no name; only the
/// outermost array keeps the user-visible name.
#[derive(Debug)]
pub struct InstanceArray {
    pub name: Option<NameId>,
    pub range: SourceRange,
    /// `(left, right)` bounds, or `None` when the dimension failed to
    /// evaluate and the array was substituted empty.
    pub bounds: Option<(i64, i64)>,
    pub elements: Vec<SymbolId>,
}

/// A gate or UDP instance.
#[derive(Debug)]
pub struct PrimitiveInstance {
    pub name: NameId,
    pub range: SourceRange,
    /// Built-in gate kind, or `None` for a user-defined primitive.
    pub gate: Option<GateKind>,
    /// UDP definition, when `gate` is `None`.
    pub definition: Option<DefinitionId>,
    pub terminal_count: usize,
}

/// A checker instance: its body is re-elaborated per instantiation with the
/// actual arguments substituted for formal assertion ports.
#[derive(Debug)]
pub struct CheckerInstance {
    pub name: NameId,
    pub range: SourceRange,
    pub body: BodyId,
    pub formals: Vec<CheckerFormal>,
    /// Checker-in-checker nesting depth, bounded by the compilation limits.
    pub depth: u32,
}

/// One resolved formal argument of a checker instance.
#[derive(Debug)]
pub struct CheckerFormal {
    pub name: NameId,
    /// Rendered actual argument, or the formal's default, or `None` when
    /// genuinely unconnected.
    pub actual: Option<Box<str>>,
    pub is_output: bool,
}

/// Placeholder for an instantiation whose definition could not be resolved,
/// or that sits inside an untaken generate arm. Carries the textual
/// connections so later diagnostics can still render them.
#[derive(Debug)]
pub struct UninstantiatedInst {
    pub name: NameId,
    pub type_name: NameId,
    pub range: SourceRange,
    pub param_text: Vec<Box<str>>,
    pub connection_text: Vec<Box<str>>,
}

/// A net: declared, or created implicitly by a port connection expression.
#[derive(Debug)]
pub struct NetSymbol {
    pub name: NameId,
    pub range: SourceRange,
    pub net_type: &'static str,
    pub implicit: bool,
}

/// The members and resolved state of one instance.
#[derive(Debug)]
pub struct InstanceBody {
    pub definition: DefinitionId,
    /// The symbol owning this body. `None` only transiently during creation;
    /// every completed instance satisfies `body.parent == that instance`.
    pub parent: Option<SymbolId>,
    pub uninstantiated: bool,
    pub from_bind: bool,
    pub parameters: Vec<ParameterSymbol>,
    pub members: Vec<SymbolId>,
    pub ports: Lazy<Vec<PortSymbol>>,
    pub connections: Lazy<PortConnectionMap>,
    pub override_node: Option<OverrideNodeId>,
    pub config: Option<ResolvedConfig>,
    /// Names declared in this scope (nets, instances); consulted for
    /// implicit-net creation and wildcard port lookup.
    pub scope_names: AHashSet<NameId>,
}

/// Arena owning every symbol and body of a compilation.
#[derive(Debug, Default)]
pub struct SymbolArena {
    symbols: Vec<Symbol>,
    bodies: Vec<InstanceBody>,
    roots: Vec<SymbolId>,
}

impl SymbolArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_symbol(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(u32::try_from(self.symbols.len()).expect("symbol count overflow"));
        self.symbols.push(symbol);
        id
    }

    pub fn add_body(&mut self, body: InstanceBody) -> BodyId {
        let id = BodyId(u32::try_from(self.bodies.len()).expect("body count overflow"));
        self.bodies.push(body);
        id
    }

    #[must_use]
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    #[must_use]
    pub fn body(&self, id: BodyId) -> &InstanceBody {
        &self.bodies[id.index()]
    }

    pub fn body_mut(&mut self, id: BodyId) -> &mut InstanceBody {
        &mut self.bodies[id.index()]
    }

    pub fn add_root(&mut self, id: SymbolId) {
        self.roots.push(id);
    }

    #[must_use]
    pub fn roots(&self) -> &[SymbolId] {
        &self.roots
    }

    /// Finds a direct member of `body` by name, preferring instances over
    /// nets so hierarchical paths resolve the way users expect.
    #[must_use]
    pub fn member_by_name(&self, body: BodyId, name: NameId) -> Option<SymbolId> {
        let members = &self.body(body).members;
        members
            .iter()
            .copied()
            .find(|&id| !matches!(self.symbol(id), Symbol::Net(_)) && self.symbol(id).name() == Some(name))
            .or_else(|| members.iter().copied().find(|&id| self.symbol(id).name() == Some(name)))
    }
}
