//! Port lists and port-connection resolution.
//!
//! The port list of a body is computed lazily on first demand because
//! interface-port resolution may depend on other port connections; the
//! connection map itself is memoised per instance so re-entrant resolution
//! observes the already-built map instead of redoing work.

use ahash::AHashSet;
use indexmap::IndexMap;

use crate::{
    diag::{DiagCode, Diagnostics},
    intern::{Interner, NameId},
    library::LibraryRegistry,
    registry::{DefinitionId, DefinitionRegistry, LookupContext, LookupResult},
    source::SourceRange,
    symbol::{BodyId, Symbol, SymbolArena},
    syntax::{DesignKind, DesignUnitSyntax, PortConnSyntax, PortDirection},
    value::{collect_idents, render_expr},
};

/// A resolved port of an instance body.
#[derive(Debug, Clone)]
pub struct PortSymbol {
    pub name: NameId,
    pub direction: PortDirection,
    /// Interface definition for an interface-typed port.
    pub iface: Option<DefinitionId>,
    pub modport: Option<NameId>,
    pub has_default: bool,
    pub range: SourceRange,
}

/// How one port ended up connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortConnection {
    /// Ordinary value connection, kept as rendered text.
    Expr(Box<str>),
    /// Interface port connected to an instance or instance array.
    Iface(crate::symbol::SymbolId),
    /// Wildcard found nothing; the port's declared default applies.
    Default,
    /// Wildcard found a same-named net or variable in the enclosing scope.
    Implicit(NameId),
    Unconnected,
}

/// Connection map in port declaration order.
pub type PortConnectionMap = IndexMap<NameId, PortConnection>;

/// Builds the port list for a definition, resolving interface port types
/// against the registry from the definition's own library.
pub fn build_port_list(
    syntax: &DesignUnitSyntax,
    caller_lib: crate::library::LibraryId,
    registry: &DefinitionRegistry,
    libs: &LibraryRegistry,
    interner: &Interner,
) -> Vec<PortSymbol> {
    syntax
        .ports
        .iter()
        .map(|port| {
            let iface = port.iface.and_then(|iface_name| {
                let ctx = LookupContext {
                    caller_lib: Some(caller_lib),
                    ..LookupContext::default()
                };
                // probe quietly: a name in type position that is not an
                // interface definition is a plain data port
                let mut probe = Diagnostics::new();
                match registry.get_definition(iface_name, ctx, libs, interner, &mut probe, port.range) {
                    Some(LookupResult::Def(def)) if registry.def(def).kind == DesignKind::Interface => Some(def),
                    _ => None,
                }
            });
            PortSymbol {
                name: port.name,
                direction: port.direction,
                iface,
                modport: port.modport,
                has_default: port.default.is_some(),
                range: port.range,
            }
        })
        .collect()
}

/// Names referenced by connection expressions that are not yet declared in
/// the enclosing scope; each becomes one implicit net, deduplicated across
/// the whole instantiation statement.
#[must_use]
pub fn implicit_net_names(connections: &[&[PortConnSyntax]], scope_names: &AHashSet<NameId>) -> Vec<NameId> {
    let mut seen = AHashSet::default();
    let mut out = Vec::new();
    let mut idents = Vec::new();
    for conns in connections {
        for conn in *conns {
            let expr = match conn {
                PortConnSyntax::Ordered(Some(expr), _) => expr,
                PortConnSyntax::Named { expr: Some(expr), .. } => expr,
                _ => continue,
            };
            idents.clear();
            collect_idents(expr, &mut idents);
            for &name in &idents {
                if !scope_names.contains(&name) && seen.insert(name) {
                    out.push(name);
                }
            }
        }
    }
    out
}

/// Everything needed to resolve one instance's connections.
pub struct ConnectionInput<'a> {
    pub ports: &'a [PortSymbol],
    pub conns: &'a [PortConnSyntax],
    pub inst_range: SourceRange,
}

/// Builds the connection map for one instance.
///
/// `parent_body` is the scope the connection expressions live in; `None`
/// for top-level roots (which have no enclosing scope to look names up in).
pub fn build_connections(
    input: &ConnectionInput<'_>,
    arena: &SymbolArena,
    parent_body: Option<BodyId>,
    registry: &DefinitionRegistry,
    interner: &Interner,
    diags: &mut Diagnostics,
) -> PortConnectionMap {
    let mut map: PortConnectionMap = input.ports.iter().map(|p| (p.name, PortConnection::Unconnected)).collect();

    let has_ordered = input
        .conns
        .iter()
        .any(|c| matches!(c, PortConnSyntax::Ordered(Some(_), _)));
    let has_named = input
        .conns
        .iter()
        .any(|c| matches!(c, PortConnSyntax::Named { .. } | PortConnSyntax::Wildcard(_)));
    if has_ordered && has_named {
        diags.report(
            DiagCode::MixedOrderedNamedPorts,
            input.inst_range,
            "cannot mix ordered and named port connections",
        );
    }

    let mut wildcard = false;
    let mut explicit: AHashSet<NameId> = AHashSet::default();
    let mut ordered_index = 0usize;

    for conn in input.conns {
        match conn {
            PortConnSyntax::Ordered(expr, range) => {
                let Some(port) = input.ports.get(ordered_index) else {
                    if expr.is_some() {
                        diags.report(
                            DiagCode::TooManyPortConnections,
                            *range,
                            format!("instance has only {} ports", input.ports.len()),
                        );
                    }
                    ordered_index += 1;
                    continue;
                };
                ordered_index += 1;
                explicit.insert(port.name);
                match expr {
                    Some(expr) => {
                        connect_port(port, expr, &mut map, arena, parent_body, registry, interner, diags);
                    }
                    None => {
                        map.insert(port.name, PortConnection::Unconnected);
                    }
                }
            }
            PortConnSyntax::Named {
                name,
                expr,
                has_parens,
                range,
            } => {
                let Some(port) = input.ports.iter().find(|p| p.name == *name) else {
                    diags.report(
                        DiagCode::UnknownNamedPort,
                        *range,
                        format!("no port named '{}'", interner.resolve(*name)),
                    );
                    continue;
                };
                if !explicit.insert(port.name) {
                    diags.report(
                        DiagCode::DuplicatePortConnection,
                        *range,
                        format!("port '{}' connected more than once", interner.resolve(*name)),
                    );
                    continue;
                }
                match (expr, has_parens) {
                    (Some(expr), _) => {
                        connect_port(port, expr, &mut map, arena, parent_body, registry, interner, diags);
                    }
                    // `.name()` is explicitly unconnected
                    (None, true) => {
                        map.insert(port.name, PortConnection::Unconnected);
                        if port.iface.is_some() {
                            diags.report(
                                DiagCode::IfacePortUnconnected,
                                *range,
                                format!("interface port '{}' cannot be left unconnected", interner.resolve(*name)),
                            );
                        }
                    }
                    // `.name` shorthand: same-named net in the enclosing scope
                    (None, false) => {
                        map.insert(port.name, PortConnection::Implicit(*name));
                    }
                }
            }
            PortConnSyntax::Wildcard(_) => wildcard = true,
        }
    }

    if wildcard {
        let scope_names = parent_body.map(|b| &arena.body(b).scope_names);
        for port in input.ports {
            if explicit.contains(&port.name) {
                continue;
            }
            let in_scope = scope_names.is_some_and(|names| names.contains(&port.name));
            let conn = if in_scope {
                if port.iface.is_some() {
                    resolve_iface_by_name(port, port.name, arena, parent_body, registry, interner, diags)
                } else {
                    PortConnection::Implicit(port.name)
                }
            } else if port.has_default {
                PortConnection::Default
            } else {
                PortConnection::Unconnected
            };
            map.insert(port.name, conn);
        }
    }

    map
}

fn connect_port(
    port: &PortSymbol,
    expr: &crate::syntax::ExprNode,
    map: &mut PortConnectionMap,
    arena: &SymbolArena,
    parent_body: Option<BodyId>,
    registry: &DefinitionRegistry,
    interner: &Interner,
    diags: &mut Diagnostics,
) {
    if port.iface.is_some() {
        // the connection must name an interface instance (or array) in scope
        let target = match &expr.expr {
            crate::syntax::Expr::Ident(name) => Some(*name),
            crate::syntax::Expr::Hier(path) if path.len() == 1 => Some(path[0]),
            _ => None,
        };
        let conn = match target {
            Some(name) => resolve_iface_by_name(port, name, arena, parent_body, registry, interner, diags),
            None => {
                diags.report(
                    DiagCode::IfacePortTypeMismatch,
                    expr.range,
                    format!("interface port '{}' must connect to an interface instance", interner.resolve(port.name)),
                );
                PortConnection::Unconnected
            }
        };
        map.insert(port.name, conn);
        return;
    }
    map.insert(
        port.name,
        PortConnection::Expr(render_expr(expr, interner).into_boxed_str()),
    );
}

fn resolve_iface_by_name(
    port: &PortSymbol,
    name: NameId,
    arena: &SymbolArena,
    parent_body: Option<BodyId>,
    registry: &DefinitionRegistry,
    interner: &Interner,
    diags: &mut Diagnostics,
) -> PortConnection {
    let Some(iface_def) = port.iface else {
        return PortConnection::Implicit(name);
    };
    let expected_name = registry.def(iface_def).name;
    let candidate = parent_body.and_then(|body| arena.member_by_name(body, name));
    let matches = candidate.is_some_and(|id| iface_symbol_matches(id, expected_name, arena, registry));
    match candidate {
        Some(id) if matches => PortConnection::Iface(id),
        _ => {
            diags.report(
                DiagCode::IfacePortTypeMismatch,
                port.range,
                format!(
                    "'{}' does not match interface port '{}' of type '{}'",
                    interner.resolve(name),
                    interner.resolve(port.name),
                    interner.resolve(expected_name),
                ),
            );
            PortConnection::Unconnected
        }
    }
}

/// An instance of the right interface definition, or an array whose
/// elements are. Definitions are matched by name so configuration-driven
/// library redirection still satisfies the port type.
fn iface_symbol_matches(id: crate::symbol::SymbolId, expected: NameId, arena: &SymbolArena, registry: &DefinitionRegistry) -> bool {
    match arena.symbol(id) {
        Symbol::Instance(inst) => {
            let body = arena.body(inst.body);
            registry.def(body.definition).name == expected
        }
        Symbol::InstanceArray(array) => array
            .elements
            .first()
            .is_some_and(|&first| iface_symbol_matches(first, expected, arena, registry)),
        _ => false,
    }
}
