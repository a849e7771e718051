//! Instance creation: single instances, n-dimensional instance arrays,
//! gate/UDP primitives, and the lazy port-list/connection plumbing.
//!
//! Array handling walks declared dimensions left to right. A dimension that
//! fails to evaluate substitutes an empty array so dangling references stay
//! quiet, and a dimension wider than `max_instance_array` truncates with one
//! diagnostic while sibling branches continue.

use smallvec::SmallVec;

use crate::{
    diag::DiagCode,
    elab::{BodyCtx, Elaborator},
    intern::NameId,
    overrides::OverrideKey,
    params::ParameterBuilder,
    ports::{ConnectionInput, PortConnection, build_connections, build_port_list},
    registry::DefinitionId,
    source::SourceRange,
    symbol::{BodyId, Instance, InstanceArray, Lazy, PrimitiveInstance, Symbol, SymbolId},
    syntax::{GateKind, HierInstanceSyntax, RangeSyntax},
    value::{EvalScope, eval},
};

/// A fully evaluated instance-array dimension.
#[derive(Debug, Clone, Copy)]
struct Dim {
    left: i64,
    right: i64,
}

impl Dim {
    fn width(self) -> u64 {
        self.left.abs_diff(self.right) + 1
    }

    /// Absolute indices in declaration order (left bound first).
    fn indices(self) -> Box<dyn Iterator<Item = i64>> {
        if self.left <= self.right {
            Box::new(self.left..=self.right)
        } else {
            Box::new((self.right..=self.left).rev())
        }
    }
}

impl Elaborator<'_> {
    /// Creates one instance symbol plus its body and wires up the
    /// back-pointer invariant (`body.parent == instance`).
    pub(crate) fn create_instance_symbol(
        &mut self,
        name: NameId,
        range: SourceRange,
        array_path: SmallVec<[i64; 2]>,
        ctx: &BodyCtx,
        builder: &mut ParameterBuilder,
    ) -> (SymbolId, BodyId) {
        let body_id = self.build_body(ctx, builder);
        let symbol_id = self.arena.add_symbol(Symbol::Instance(Instance {
            name,
            range,
            array_path,
            body: body_id,
        }));
        self.arena.body_mut(body_id).parent = Some(symbol_id);
        self.tracer.instance_created(self.interner.resolve(name));
        (symbol_id, body_id)
    }

    /// Materializes one named instance (possibly an array) of a module-like
    /// definition and appends it to the parent body.
    pub(crate) fn create_module_instance(
        &mut self,
        parent_body: BodyId,
        def: DefinitionId,
        inst: &HierInstanceSyntax,
        builder: ParameterBuilder,
        config: Option<crate::config::ResolvedConfig>,
        parent_scope: &EvalScope,
        uninstantiated: bool,
    ) {
        let parent_node = self.arena.body(parent_body).override_node;
        let inst_node = parent_node.and_then(|node| {
            self.overrides
                .child_for_instance(node, OverrideKey::Syntax(inst.id), inst.name)
        });

        // evaluate every declared dimension before building anything
        let mut dims: SmallVec<[Dim; 2]> = SmallVec::new();
        for range_syntax in &inst.dims {
            match eval_dim(range_syntax, parent_scope) {
                Some(dim) => {
                    if dim.width() > u64::from(self.options.limits.max_instance_array) {
                        self.diags.report(
                            DiagCode::MaxInstanceArrayExceeded,
                            range_syntax.range,
                            format!(
                                "instance array width {} exceeds the limit of {}",
                                dim.width(),
                                self.options.limits.max_instance_array
                            ),
                        );
                        self.push_empty_array(parent_body, inst);
                        return;
                    }
                    dims.push(dim);
                }
                None => {
                    self.push_empty_array(parent_body, inst);
                    return;
                }
            }
        }

        // the bind marker applies to this instance only, not to the children
        // its body creates
        let from_bind = self.bind_in_progress;
        self.bind_in_progress = false;
        // the instance node's own values apply to every element; per-element
        // nodes (keyed by array index) layer on top inside the array walk
        let mut builder = builder;
        if let Some(node_id) = inst_node {
            builder.apply_override_node(self.overrides.node(node_id), parent_scope, self.interner, self.diags);
        }
        let symbol_id = if dims.is_empty() {
            let ctx = BodyCtx {
                def,
                uninstantiated,
                from_bind,
                override_node: inst_node,
                config,
            };
            let (symbol_id, body_id) = self.create_instance_symbol(inst.name, inst.range, SmallVec::new(), &ctx, &mut builder);
            self.connect_instance(body_id, inst, Some(parent_body));
            symbol_id
        } else {
            self.build_array_level(
                parent_body,
                def,
                inst,
                &builder,
                &config,
                parent_scope,
                uninstantiated,
                from_bind,
                &dims,
                0,
                &mut SmallVec::new(),
                inst_node,
            )
        };
        self.bind_in_progress = from_bind;
        self.arena.body_mut(parent_body).members.push(symbol_id);
    }

    /// Builds one level of an instance array; leaves get bodies, interior
    /// nodes are unnamed arrays.
    #[expect(clippy::too_many_arguments, reason = "recursive builder threads all accumulators explicitly")]
    fn build_array_level(
        &mut self,
        parent_body: BodyId,
        def: DefinitionId,
        inst: &HierInstanceSyntax,
        builder: &ParameterBuilder,
        config: &Option<crate::config::ResolvedConfig>,
        parent_scope: &EvalScope,
        uninstantiated: bool,
        from_bind: bool,
        dims: &[Dim],
        level: usize,
        path: &mut SmallVec<[i64; 2]>,
        node: Option<crate::overrides::OverrideNodeId>,
    ) -> SymbolId {
        let dim = dims[level];
        let mut elements = Vec::with_capacity(usize::try_from(dim.width()).unwrap_or(0));
        for index in dim.indices() {
            path.push(index);
            let element_node = node.and_then(|n| self.overrides.child_by_index(n, index));
            let element = if level + 1 == dims.len() {
                let mut leaf_builder = builder.clone();
                if let Some(node_id) = element_node {
                    leaf_builder.apply_override_node(self.overrides.node(node_id), parent_scope, self.interner, self.diags);
                }
                let ctx = BodyCtx {
                    def,
                    uninstantiated,
                    from_bind,
                    override_node: element_node,
                    config: config.clone(),
                };
                let (symbol_id, body_id) = self.create_instance_symbol(inst.name, inst.range, path.clone(), &ctx, &mut leaf_builder);
                self.connect_instance(body_id, inst, Some(parent_body));
                symbol_id
            } else {
                self.build_array_level(
                    parent_body,
                    def,
                    inst,
                    builder,
                    config,
                    parent_scope,
                    uninstantiated,
                    from_bind,
                    dims,
                    level + 1,
                    path,
                    element_node,
                )
            };
            elements.push(element);
            path.pop();
        }
        // only the outermost array keeps the user-visible name
        let name = if level == 0 { Some(inst.name) } else { None };
        self.arena.add_symbol(Symbol::InstanceArray(InstanceArray {
            name,
            range: inst.range,
            bounds: Some((dim.left, dim.right)),
            elements,
        }))
    }

    fn push_empty_array(&mut self, parent_body: BodyId, inst: &HierInstanceSyntax) {
        let symbol = self.arena.add_symbol(Symbol::InstanceArray(InstanceArray {
            name: Some(inst.name),
            range: inst.range,
            bounds: None,
            elements: Vec::new(),
        }));
        self.arena.body_mut(parent_body).members.push(symbol);
    }

    // -- primitives ----------------------------------------------------------

    pub(crate) fn create_gate_instance(&mut self, parent_body: BodyId, gate: GateKind, inst: &HierInstanceSyntax) {
        let terminal_count = inst.connections.len();
        if terminal_count < gate.min_terminals() {
            self.diags.report(
                DiagCode::PrimitivePortCountWrong,
                inst.range,
                format!(
                    "'{gate}' gate requires at least {} terminals, found {terminal_count}",
                    gate.min_terminals()
                ),
            );
        }
        let symbol = self.arena.add_symbol(Symbol::Primitive(PrimitiveInstance {
            name: inst.name,
            range: inst.range,
            gate: Some(gate),
            definition: None,
            terminal_count,
        }));
        self.arena.body_mut(parent_body).members.push(symbol);
    }

    pub(crate) fn create_udp_instance(&mut self, parent_body: BodyId, def: DefinitionId, inst: &HierInstanceSyntax) {
        let expected = self.registry.def(def).syntax.ports.len();
        let terminal_count = inst.connections.len();
        if expected != 0 && terminal_count != expected {
            self.diags.report(
                DiagCode::PrimitivePortCountWrong,
                inst.range,
                format!("primitive expects {expected} terminals, found {terminal_count}"),
            );
        }
        let symbol = self.arena.add_symbol(Symbol::Primitive(PrimitiveInstance {
            name: inst.name,
            range: inst.range,
            gate: None,
            definition: Some(def),
            terminal_count,
        }));
        self.arena.body_mut(parent_body).members.push(symbol);
    }

    // -- ports ---------------------------------------------------------------

    /// Fills the body's port list on first demand. Re-entrant callers that
    /// arrive while the list is still being built simply observe the
    /// in-progress state and back off.
    pub(crate) fn ensure_port_list(&mut self, body_id: BodyId) {
        match self.arena.body(body_id).ports {
            Lazy::Ready(_) | Lazy::InProgress => return,
            Lazy::Unset => {}
        }
        self.arena.body_mut(body_id).ports = Lazy::InProgress;
        let def_id = self.arena.body(body_id).definition;
        let def = self.registry.def(def_id);
        let ports = build_port_list(&def.syntax, def.library, self.registry, self.libs, self.interner);
        self.arena.body_mut(body_id).ports = Lazy::Ready(ports);
    }

    /// Builds the memoised connection map for one instance. Idempotent: the
    /// first entrant allocates the map, re-entrants observe it and return.
    pub(crate) fn connect_instance(&mut self, body_id: BodyId, inst: &HierInstanceSyntax, parent_body: Option<BodyId>) {
        match self.arena.body(body_id).connections {
            Lazy::Ready(_) | Lazy::InProgress => return,
            Lazy::Unset => {}
        }
        self.arena.body_mut(body_id).connections = Lazy::InProgress;
        self.ensure_port_list(body_id);
        let ports = match self.arena.body(body_id).ports.ready() {
            Some(ports) => ports.clone(),
            None => Vec::new(),
        };
        let input = ConnectionInput {
            ports: &ports,
            conns: &inst.connections,
            inst_range: inst.range,
        };
        let map = build_connections(&input, self.arena, parent_body, self.registry, self.interner, self.diags);
        self.arena.body_mut(body_id).connections = Lazy::Ready(map);
    }
}

/// Default connections for a top-level instance's interface ports: with
/// `AllowTopLevelIfacePorts` each such port auto-instantiates its interface
/// definition; otherwise the port is diagnosed as unconnectable.
pub(crate) fn connect_top_iface_ports(elab: &mut Elaborator<'_>, body_id: BodyId) {
    elab.ensure_port_list(body_id);
    let ports = match elab.arena.body(body_id).ports.ready() {
        Some(ports) => ports.clone(),
        None => return,
    };
    let mut map: crate::ports::PortConnectionMap =
        ports.iter().map(|p| (p.name, PortConnection::Unconnected)).collect();
    for port in &ports {
        let Some(iface_def) = port.iface else { continue };
        if elab.options.allow_toplevel_iface_ports {
            let mut builder = ParameterBuilder::new(&elab.registry.def(iface_def).syntax, false);
            let ctx = BodyCtx {
                def: iface_def,
                uninstantiated: false,
                from_bind: false,
                override_node: None,
                config: None,
            };
            let (symbol_id, _) = elab.create_instance_symbol(port.name, port.range, SmallVec::new(), &ctx, &mut builder);
            elab.arena.body_mut(body_id).members.push(symbol_id);
            elab.arena.body_mut(body_id).scope_names.insert(port.name);
            map.insert(port.name, PortConnection::Iface(symbol_id));
        } else {
            elab.diags.report(
                DiagCode::IfacePortUnconnected,
                port.range,
                format!(
                    "top-level interface port '{}' has no connection",
                    elab.interner.resolve(port.name)
                ),
            );
        }
    }
    elab.arena.body_mut(body_id).connections = Lazy::Ready(map);
}

fn eval_dim(range_syntax: &RangeSyntax, scope: &EvalScope) -> Option<Dim> {
    let left = eval(&range_syntax.left, scope).as_i64()?;
    match &range_syntax.right {
        Some(right) => {
            let right = eval(right, scope).as_i64()?;
            Some(Dim { left, right })
        }
        // `[n]` count shorthand
        None => {
            if left <= 0 {
                return None;
            }
            Some(Dim {
                left: 0,
                right: left - 1,
            })
        }
    }
}
