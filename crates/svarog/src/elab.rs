//! The elaborator: selects top-level roots, resolves instantiation
//! statements in scope, applies configuration rules, creates bind instances,
//! and drives member expansion.
//!
//! Elaboration is re-entrant but single-threaded; recursion depth is bounded
//! by `Limits::max_hierarchy_depth` and a branch that trips a cap is
//! truncated with a diagnostic while its siblings continue.

use ahash::AHashSet;
use smallvec::SmallVec;

use crate::{
    compilation::CompilationOptions,
    config::{ConfigId, ConfigRule, ResolvedConfig},
    diag::{DiagCode, Diagnostics},
    intern::{Interner, NameId},
    library::{LibraryId, LibraryRegistry},
    overrides::{BindDirective, BindId, HierarchyOverrideGraph},
    packages::{PackageEnv, PackageTable},
    params::{OverrideOrigin, ParameterBuilder},
    registry::{DefinitionId, DefinitionRegistry, LookupContext, LookupResult},
    source::SourceRange,
    symbol::{BodyId, InstanceBody, Lazy, NetSymbol, Symbol, SymbolArena, UninstantiatedInst},
    syntax::{
        BlockKind, DesignKind, GateKind, HierInstanceSyntax, InstantiationSyntax, MemberSyntax, StmtSyntax,
    },
    tracer::ElabTracer,
    value::{EvalScope, eval, render_expr},
};

/// Carries the per-body walk state that instantiation handling needs.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct WalkFlags {
    /// Inside an untaken generate arm or an unresolvable body.
    pub uninstantiated: bool,
    /// Inside a `fork...join` block.
    pub in_fork_join: bool,
    /// Inside procedural code of a checker body.
    pub in_checker_proc: bool,
}

/// Inputs for creating one body; assembled by instantiation handling and the
/// top-level driver.
#[derive(Debug)]
pub(crate) struct BodyCtx {
    pub def: DefinitionId,
    pub uninstantiated: bool,
    pub from_bind: bool,
    pub override_node: Option<crate::overrides::OverrideNodeId>,
    pub config: Option<ResolvedConfig>,
}

pub(crate) struct Elaborator<'a> {
    pub(crate) registry: &'a DefinitionRegistry,
    pub(crate) libs: &'a LibraryRegistry,
    pub(crate) interner: &'a Interner,
    pub(crate) options: &'a CompilationOptions,
    pub(crate) arena: &'a mut SymbolArena,
    pub(crate) overrides: &'a mut HierarchyOverrideGraph,
    pub(crate) binds: &'a [BindDirective],
    pub(crate) packages: &'a mut PackageTable,
    pub(crate) diags: &'a mut Diagnostics,
    pub(crate) tracer: &'a mut dyn ElabTracer,
    pub(crate) depth: u32,
    pub(crate) used_configs: Vec<ConfigId>,
    pub(crate) std_package: Option<DefinitionId>,
    /// Set while the instantiation being processed came from a bind
    /// directive; bodies created under it are marked `from_bind`.
    pub(crate) bind_in_progress: bool,
}

impl Elaborator<'_> {
    /// Entry point: pick tops and elaborate the whole tree.
    pub(crate) fn run(&mut self) {
        self.register_path_binds();
        let tops = self.select_tops();
        for top in tops {
            match top {
                TopEntry::Def { def, name, config } => {
                    self.create_top_instance(def, name, config);
                }
            }
        }
        // dangling instance-override paths are only known once the rooted
        // traversals have finished
        for &config in &self.used_configs.clone() {
            self.registry.config(config).report_dangling_paths(self.diags);
        }
    }

    // -- top selection ------------------------------------------------------

    fn select_tops(&mut self) -> Vec<TopEntry> {
        let mut tops = Vec::new();
        if self.options.tops.is_empty() {
            self.collect_implicit_tops(&mut tops);
            return tops;
        }
        let options = self.options;
        for spec in &options.tops {
            // `name:config` marks the entry as naming a configuration
            let (rest, wants_config) = match spec.split_once(':') {
                Some((name, "config")) => (name, true),
                Some(_) => {
                    self.diags.report(
                        DiagCode::UnknownModule,
                        SourceRange::default(),
                        format!("malformed top-level entry '{spec}': only a `:config` suffix is recognized"),
                    );
                    continue;
                }
                None => (spec.as_str(), false),
            };
            let (lib_part, name_part) = match rest.split_once('.') {
                Some((lib, name)) => (Some(lib), name),
                None => (None, rest),
            };
            let explicit_lib = lib_part.and_then(|l| self.interner.get(l));
            if lib_part.is_some() && explicit_lib.is_none() {
                self.diags.report(
                    DiagCode::UnknownLibrary,
                    SourceRange::default(),
                    format!("unknown library '{}'", lib_part.expect("checked some")),
                );
                continue;
            }
            let target = self.interner.get(name_part).and_then(|n| self.lookup_top(n, explicit_lib));
            match target {
                Some(LookupResult::Config(config)) => self.push_config_tops(config, &mut tops),
                Some(LookupResult::Def(_)) if wants_config => {
                    self.diags.report(
                        DiagCode::NotAConfig,
                        SourceRange::default(),
                        format!("'{name_part}' is not a configuration"),
                    );
                }
                Some(LookupResult::Def(def)) => {
                    let name = self.interner.get(name_part).expect("definition name is interned");
                    tops.push(TopEntry::Def {
                        def,
                        name,
                        config: None,
                    });
                }
                None => {
                    self.diags.report(
                        DiagCode::UnknownModule,
                        SourceRange::default(),
                        format!("unknown top-level module '{rest}'"),
                    );
                }
            }
        }
        tops
    }

    fn lookup_top(&self, name: NameId, explicit_lib: Option<NameId>) -> Option<LookupResult> {
        if let Some(lib_name) = explicit_lib {
            let lib = self.libs.lookup(lib_name)?;
            return self.registry.find_in_library(name, lib);
        }
        for lib in self.libs.search_order() {
            if let Some(found) = self.registry.find_in_library(name, lib) {
                return Some(found);
            }
        }
        None
    }

    fn push_config_tops(&mut self, config: ConfigId, tops: &mut Vec<TopEntry>) {
        self.used_configs.push(config);
        let block = self.registry.config(config);
        self.tracer.config_adopted(self.interner.resolve(block.name));
        let cells: Vec<_> = block.top_cells.clone();
        let default_liblist = block.default_liblist.clone();
        for cell in cells {
            // design-statement cells resolve from the config's own library
            // plus the global order; the default liblist governs only the
            // instances inside
            let ctx = LookupContext {
                caller_lib: Some(self.registry.config(config).library),
                ..LookupContext::default()
            };
            let found = if let Some(lib) = cell.library {
                self.registry.find_in_library(cell.cell, lib)
            } else {
                let mut probe = Diagnostics::new();
                self.registry
                    .get_definition(cell.cell, ctx, self.libs, self.interner, &mut probe, cell.range)
            };
            match found {
                Some(LookupResult::Def(def)) => {
                    let resolved = ResolvedConfig {
                        config,
                        liblist: default_liblist.clone(),
                        path: vec![cell.cell],
                    };
                    tops.push(TopEntry::Def {
                        def,
                        name: cell.cell,
                        config: Some(resolved),
                    });
                }
                _ => {
                    self.diags.report(
                        DiagCode::InvalidTopCell,
                        cell.range,
                        format!("design statement names unknown cell '{}'", self.interner.resolve(cell.cell)),
                    );
                }
            }
        }
    }

    /// Modules that are instantiated nowhere and have no unbound parameter
    /// ports become implicit tops, in registration order.
    fn collect_implicit_tops(&mut self, tops: &mut Vec<TopEntry>) {
        let mut instantiated: AHashSet<NameId> = AHashSet::default();
        for (_, def) in self.registry.iter_defs() {
            collect_instantiated_names(&def.syntax.members, &mut instantiated);
        }
        for bind in self.binds {
            instantiated.insert(bind.inst.type_name);
        }
        for (id, def) in self.registry.iter_defs() {
            if def.kind != DesignKind::Module || instantiated.contains(&def.name) {
                continue;
            }
            let builder = ParameterBuilder::new(&def.syntax, false);
            if builder.has_unbound_port(&def.syntax) {
                continue;
            }
            tops.push(TopEntry::Def {
                def: id,
                name: def.name,
                config: None,
            });
        }
    }

    // -- binds --------------------------------------------------------------

    /// Routes dotted bind targets into the override graph and validates
    /// definition-name targets.
    fn register_path_binds(&mut self) {
        for (index, bind) in self.binds.iter().enumerate() {
            let id = BindId(u32::try_from(index).expect("bind count overflow"));
            if let [single] = bind.target.as_slice() {
                // definition-name target: applied when bodies of that
                // definition are elaborated; primitives have no bodies
                let is_primitive = self
                    .libs
                    .search_order()
                    .iter()
                    .filter_map(|&lib| self.registry.find_in_library(*single, lib))
                    .any(|found| matches!(found, LookupResult::Def(def) if self.registry.def(def).kind == DesignKind::Primitive));
                if is_primitive {
                    self.diags.report(
                        DiagCode::BindTargetPrimitive,
                        bind.range,
                        format!("cannot bind into primitive '{}'", self.interner.resolve(*single)),
                    );
                }
            } else {
                self.overrides.add_bind_at_path(&bind.target, id);
            }
        }
    }

    /// Binds that name this body's definition directly.
    fn definition_binds(&self, def: DefinitionId) -> SmallVec<[BindId; 2]> {
        let def_name = self.registry.def(def).name;
        self.binds
            .iter()
            .enumerate()
            .filter(|(_, bind)| matches!(bind.target.as_slice(), [single] if *single == def_name))
            .map(|(index, _)| BindId(u32::try_from(index).expect("bind count overflow")))
            .collect()
    }

    // -- body construction --------------------------------------------------

    /// Creates a top-level instance and elaborates it.
    fn create_top_instance(&mut self, def: DefinitionId, name: NameId, config: Option<ResolvedConfig>) {
        if let Some(resolved) = &config {
            if !self.used_configs.contains(&resolved.config) {
                self.used_configs.push(resolved.config);
            }
        }
        let kind = self.registry.def(def).kind;
        if !matches!(kind, DesignKind::Module | DesignKind::Program | DesignKind::Interface) {
            self.diags.report(
                DiagCode::InvalidTopCell,
                self.registry.def(def).syntax.range,
                format!("'{}' cannot be a top-level instance", self.interner.resolve(name)),
            );
            return;
        }
        let override_node = self.overrides.child_by_name(self.overrides.root(), name);
        let mut builder = ParameterBuilder::new(&self.registry.def(def).syntax, false);
        if let Some(node_id) = override_node {
            // top-level defparam values evaluate with nothing in scope
            builder.apply_override_node(self.overrides.node(node_id), &EvalScope::default(), self.interner, self.diags);
        }
        let ctx = BodyCtx {
            def,
            uninstantiated: false,
            from_bind: false,
            override_node,
            config,
        };
        let range = self.registry.def(def).syntax.range;
        let (symbol_id, body_id) = self.create_instance_symbol(name, range, SmallVec::new(), &ctx, &mut builder);
        self.arena.add_root(symbol_id);
        self.connect_top_iface_ports(body_id);
    }

    /// Elaborates one body: implicit std import, header imports, port
    /// parameters, members, then deferred binds.
    pub(crate) fn build_body(&mut self, ctx: &BodyCtx, builder: &mut ParameterBuilder) -> BodyId {
        let registry = self.registry;
        let def = registry.def(ctx.def);
        let syntax = &def.syntax;

        let depth_exceeded = self.depth >= self.options.limits.max_hierarchy_depth;
        if depth_exceeded {
            self.diags.report(
                DiagCode::MaxInstanceDepthExceeded,
                syntax.range,
                format!("instance hierarchy exceeds {} levels", self.options.limits.max_hierarchy_depth),
            );
        }
        let uninstantiated = ctx.uninstantiated;
        if uninstantiated {
            builder.force_invalid();
        }

        let mut scope_names = AHashSet::default();
        collect_declared_names(&syntax.members, &mut scope_names);

        let body_id = self.arena.add_body(InstanceBody {
            definition: ctx.def,
            parent: None,
            uninstantiated,
            from_bind: ctx.from_bind,
            parameters: Vec::new(),
            members: Vec::new(),
            ports: Lazy::Unset,
            connections: Lazy::Unset,
            override_node: ctx.override_node,
            config: ctx.config.clone(),
            scope_names,
        });

        // wildcard import of the standard package precedes everything
        let mut scope = EvalScope::default();
        if let Some(std_pkg) = self.std_package {
            let mut env = PackageEnv {
                registry: self.registry,
                libs: self.libs,
                interner: self.interner,
                diags: &mut *self.diags,
            };
            self.packages.import_all(std_pkg, &mut scope, &mut env);
        }
        self.apply_imports(&syntax.members, def.library, &mut scope);

        // defparams are hoisted so they are visible before any child of this
        // body is created, regardless of where they appear in the source
        self.hoist_defparams(body_id, &syntax.members, builder, &scope);

        let port_params = builder.build_port_params(syntax, &mut scope, self.interner, self.diags);
        self.arena.body_mut(body_id).parameters = port_params;

        if depth_exceeded {
            return body_id;
        }

        self.depth += 1;
        self.walk_members(body_id, &syntax.members, &mut scope, builder, WalkFlags::default());

        // deferred members: binds append after primary members
        let mut bind_ids: SmallVec<[BindId; 2]> = self.definition_binds(ctx.def);
        if let Some(node_id) = ctx.override_node {
            bind_ids.extend(self.overrides.node(node_id).binds.iter().copied());
        }
        for bind in bind_ids {
            self.apply_bind(body_id, bind, &scope);
        }
        self.depth -= 1;
        body_id
    }

    fn apply_imports(&mut self, members: &[MemberSyntax], caller_lib: LibraryId, scope: &mut EvalScope) {
        for member in members {
            if let MemberSyntax::Import(import) = member {
                let mut env = PackageEnv {
                    registry: self.registry,
                    libs: self.libs,
                    interner: self.interner,
                    diags: &mut *self.diags,
                };
                let Some(pkg) = self.packages.resolve_package(import.package, caller_lib, import.range, &mut env) else {
                    continue;
                };
                match import.item {
                    crate::syntax::ImportItem::Wildcard => {
                        let mut env = PackageEnv {
                            registry: self.registry,
                            libs: self.libs,
                            interner: self.interner,
                            diags: &mut *self.diags,
                        };
                        self.packages.import_all(pkg, scope, &mut env);
                    }
                    crate::syntax::ImportItem::Name(name) => {
                        let mut env = PackageEnv {
                            registry: self.registry,
                            libs: self.libs,
                            interner: self.interner,
                            diags: &mut *self.diags,
                        };
                        match self.packages.resolve_member(pkg, name, &mut env) {
                            Some(value) => {
                                scope.insert(name, value);
                            }
                            None => {
                                self.diags.report(
                                    DiagCode::UnknownPackageMember,
                                    import.range,
                                    format!(
                                        "package '{}' has no member '{}'",
                                        self.interner.resolve(import.package),
                                        self.interner.resolve(name)
                                    ),
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    /// Moves defparam members into the override graph before children exist.
    fn hoist_defparams(
        &mut self,
        body_id: BodyId,
        members: &[MemberSyntax],
        builder: &mut ParameterBuilder,
        scope: &EvalScope,
    ) {
        for member in members {
            match member {
                MemberSyntax::Defparam(defparam) => match defparam.path.as_slice() {
                    [] => {}
                    [param] => {
                        // same-scope defparam targets this body's parameter
                        let named = [crate::syntax::NamedParamSyntax {
                            name: *param,
                            value: Some(defparam.value.clone()),
                            range: defparam.range,
                        }];
                        builder.apply_rule_overrides(&named, OverrideOrigin::Defparam, scope, self.interner, self.diags);
                    }
                    _ => {
                        let node = match self.arena.body(body_id).override_node {
                            Some(node) => node,
                            None => {
                                // grow a detached node on demand; children find
                                // it through the body, not the root trie
                                let node = self.overrides.insert_detached();
                                self.arena.body_mut(body_id).override_node = Some(node);
                                node
                            }
                        };
                        self.overrides.add_param_override(node, &defparam.path, defparam.value.clone(), defparam.range);
                    }
                },
                MemberSyntax::Block(block) => self.hoist_defparams(body_id, &block.members, builder, scope),
                _ => {}
            }
        }
    }

    // -- member walk --------------------------------------------------------

    pub(crate) fn walk_members(
        &mut self,
        body_id: BodyId,
        members: &[MemberSyntax],
        scope: &mut EvalScope,
        builder: &ParameterBuilder,
        flags: WalkFlags,
    ) {
        for member in members {
            match member {
                MemberSyntax::Param(decl) => {
                    let symbol = builder.build(decl, scope, self.interner, self.diags);
                    self.arena.body_mut(body_id).parameters.push(symbol);
                }
                MemberSyntax::Net(net) => {
                    if flags.uninstantiated {
                        continue;
                    }
                    let net_type = self.registry.def(self.arena.body(body_id).definition).default_net_type;
                    for &name in &net.names {
                        let symbol = self.arena.add_symbol(Symbol::Net(NetSymbol {
                            name,
                            range: net.range,
                            net_type,
                            implicit: false,
                        }));
                        self.arena.body_mut(body_id).members.push(symbol);
                    }
                }
                MemberSyntax::Instantiation(inst) => {
                    self.handle_instantiation(body_id, inst, scope, flags);
                }
                MemberSyntax::Defparam(_) => {} // hoisted before the walk
                MemberSyntax::Bind(_) => {}     // extracted before registration
                MemberSyntax::GenerateIf(generate) => {
                    let taken = eval(&generate.cond, scope).is_true();
                    let (live, dead) = if taken {
                        (&generate.then_members, &generate.else_members)
                    } else {
                        (&generate.else_members, &generate.then_members)
                    };
                    self.walk_members(body_id, live, scope, builder, flags);
                    let dead_flags = WalkFlags {
                        uninstantiated: true,
                        ..flags
                    };
                    self.walk_members(body_id, dead, scope, builder, dead_flags);
                }
                MemberSyntax::Block(block) => {
                    let block_flags = WalkFlags {
                        in_fork_join: flags.in_fork_join || block.kind == BlockKind::ForkJoin,
                        ..flags
                    };
                    self.walk_members(body_id, &block.members, scope, builder, block_flags);
                }
                MemberSyntax::Procedure(procedure) => {
                    self.check_procedure(body_id, procedure);
                    let proc_flags = WalkFlags {
                        in_checker_proc: self.body_is_checker(body_id),
                        ..flags
                    };
                    self.walk_stmts(body_id, &procedure.stmts, scope, proc_flags);
                }
                MemberSyntax::Import(_) | MemberSyntax::Export(_) => {} // applied before the walk
            }
        }
    }

    fn walk_stmts(&mut self, body_id: BodyId, stmts: &[StmtSyntax], scope: &mut EvalScope, flags: WalkFlags) {
        for stmt in stmts {
            match stmt {
                StmtSyntax::Block { kind, stmts, .. } => {
                    let block_flags = WalkFlags {
                        in_fork_join: flags.in_fork_join || *kind == BlockKind::ForkJoin,
                        ..flags
                    };
                    self.walk_stmts(body_id, stmts, scope, block_flags);
                }
                StmtSyntax::Instantiation(inst) => {
                    // only checkers may be instantiated in statement context;
                    // anything else here is a parse-level misreading we skip
                    if self.is_checker_name(inst, body_id) {
                        self.handle_instantiation(body_id, inst, scope, flags);
                    }
                }
                StmtSyntax::BlockingAssign(_) | StmtSyntax::NonblockingAssign(_) | StmtSyntax::Other(_) => {}
            }
        }
    }

    pub(crate) fn body_is_checker(&self, body_id: BodyId) -> bool {
        self.registry.def(self.arena.body(body_id).definition).kind == DesignKind::Checker
    }

    fn is_checker_name(&self, inst: &InstantiationSyntax, body_id: BodyId) -> bool {
        let caller_lib = self.registry.def(self.arena.body(body_id).definition).library;
        let mut order = vec![caller_lib];
        order.extend(self.libs.search_order());
        order
            .into_iter()
            .filter_map(|lib| self.registry.find_in_library(inst.type_name, lib))
            .next()
            .is_some_and(|found| matches!(found, LookupResult::Def(def) if self.registry.def(def).kind == DesignKind::Checker))
    }

    // -- instantiation handling ---------------------------------------------

    pub(crate) fn handle_instantiation(
        &mut self,
        parent_body: BodyId,
        stmt: &InstantiationSyntax,
        parent_scope: &EvalScope,
        flags: WalkFlags,
    ) {
        // untaken branches only record placeholders
        if flags.uninstantiated || self.arena.body(parent_body).uninstantiated {
            for inst in &stmt.instances {
                self.create_uninstantiated(parent_body, stmt, inst);
            }
            return;
        }

        // built-in gates dispatch before any registry lookup
        if let Ok(gate) = self.interner.resolve(stmt.type_name).parse::<GateKind>() {
            self.create_implicit_nets(parent_body, stmt);
            for inst in &stmt.instances {
                self.create_gate_instance(parent_body, gate, inst);
            }
            return;
        }

        self.create_implicit_nets(parent_body, stmt);

        let parent_def = self.arena.body(parent_body).definition;
        let parent_kind = self.registry.def(parent_def).kind;
        let caller_lib = self.registry.def(parent_def).library;
        let parent_config = self.arena.body(parent_body).config.clone();

        // cell-level rule from the active config, shared by every sibling
        let cell_rule_src = parent_config.as_ref().and_then(|resolved| {
            let explicit_lib = stmt.library.and_then(|name| self.libs.lookup(name));
            self.registry.config(resolved.config).cell_rule(stmt.type_name, explicit_lib)
        });

        for inst in &stmt.instances {
            // per-instance rules may make sibling definitions diverge, so
            // every sibling is resolved individually
            let instance_rule_src = parent_config.as_ref().and_then(|resolved| {
                let mut path = resolved.path.clone();
                path.push(inst.name);
                let rule = self.registry.config(resolved.config).instance_rule(&path);
                if rule.is_some() && parent_kind != DesignKind::Module {
                    self.diags.report(
                        DiagCode::InvalidInstanceForParent,
                        rule.expect("checked some").range,
                        format!(
                            "instance override path descends through '{}', which is not a module",
                            self.interner.resolve(self.registry.def(parent_def).name)
                        ),
                    );
                    return None;
                }
                rule
            });

            // compose the effective rule slot-wise: instance over cell
            let effective = compose_rules(instance_rule_src, cell_rule_src);
            let lookup_ctx = LookupContext {
                explicit_lib: stmt.library,
                caller_lib: Some(caller_lib),
                rule: effective.as_ref(),
                inherited_liblist: parent_config.as_ref().and_then(|c| c.liblist.as_deref()),
            };
            let found = self.registry.get_definition(
                stmt.type_name,
                lookup_ctx,
                self.libs,
                self.interner,
                self.diags,
                stmt.type_range,
            );
            let Some(found) = found else {
                self.create_uninstantiated(parent_body, stmt, inst);
                continue;
            };

            // a config result re-roots elaboration at its sole top cell
            let (def, child_config) = match found {
                LookupResult::Def(def) => {
                    let child_config = parent_config.as_ref().map(|c| c.descend(inst.name));
                    (def, child_config)
                }
                LookupResult::Config(config) => match self.reroot_config(config, stmt.type_range) {
                    Some((def, resolved)) => (def, Some(resolved)),
                    None => {
                        self.create_uninstantiated(parent_body, stmt, inst);
                        continue;
                    }
                },
            };

            let target = self.registry.def(def);
            self.tracer.definition_resolved(
                self.interner.resolve(target.name),
                self.interner.resolve(self.libs.get(target.library).name),
            );

            if let Some(violation) = containment_violation(parent_kind, target.kind) {
                self.diags.report(DiagCode::ContainmentViolation, inst.range, violation);
                continue;
            }

            match target.kind {
                DesignKind::Primitive => {
                    self.create_udp_instance(parent_body, def, inst);
                }
                DesignKind::Checker => {
                    self.create_checker_instance(parent_body, def, stmt, inst, parent_scope, flags);
                }
                DesignKind::Package => unreachable!("package lookups never reach instantiation dispatch"),
                DesignKind::Module | DesignKind::Interface | DesignKind::Program => {
                    let mut builder = ParameterBuilder::new(&self.registry.def(def).syntax, false);
                    builder.apply_assignments(&stmt.params, parent_scope, stmt.range, self.interner, self.diags);
                    if let Some(rule) = cell_rule_src {
                        builder.apply_rule_overrides(
                            &rule.param_overrides,
                            OverrideOrigin::CellRule,
                            parent_scope,
                            self.interner,
                            self.diags,
                        );
                    }
                    if let Some(rule) = instance_rule_src {
                        builder.apply_rule_overrides(
                            &rule.param_overrides,
                            OverrideOrigin::InstanceRule,
                            parent_scope,
                            self.interner,
                            self.diags,
                        );
                    }
                    self.create_module_instance(parent_body, def, inst, builder, child_config, parent_scope, flags.uninstantiated);
                }
            }
        }
    }

    /// Resolves a config redirect to `(definition, fresh context)`.
    fn reroot_config(&mut self, config: ConfigId, range: SourceRange) -> Option<(DefinitionId, ResolvedConfig)> {
        let mut current = config;
        // config-to-config indirection is bounded to keep cycles finite
        for _ in 0..8 {
            if !self.used_configs.contains(&current) {
                self.used_configs.push(current);
            }
            let block = self.registry.config(current);
            self.tracer.config_adopted(self.interner.resolve(block.name));
            if block.top_cells.len() != 1 {
                self.diags.report(
                    DiagCode::AmbiguousConfigRedirect,
                    range,
                    format!(
                        "config '{}' used as a redirect target must have exactly one top cell",
                        self.interner.resolve(block.name)
                    ),
                );
                return None;
            }
            let cell = block.top_cells[0];
            let default_liblist = block.default_liblist.clone();
            let block_lib = block.library;
            let found = if let Some(lib) = cell.library {
                self.registry.find_in_library(cell.cell, lib)
            } else {
                let ctx = LookupContext {
                    caller_lib: Some(block_lib),
                    ..LookupContext::default()
                };
                let mut probe = Diagnostics::new();
                self.registry
                    .get_definition(cell.cell, ctx, self.libs, self.interner, &mut probe, cell.range)
            };
            match found {
                Some(LookupResult::Def(def)) => {
                    return Some((
                        def,
                        ResolvedConfig {
                            config: current,
                            liblist: default_liblist,
                            path: vec![cell.cell],
                        },
                    ));
                }
                Some(LookupResult::Config(next)) => current = next,
                None => {
                    self.diags.report(
                        DiagCode::InvalidTopCell,
                        cell.range,
                        format!("config top cell '{}' does not resolve", self.interner.resolve(cell.cell)),
                    );
                    return None;
                }
            }
        }
        self.diags.report(DiagCode::AmbiguousConfigRedirect, range, "config redirection does not terminate");
        None
    }

    // -- placeholders and implicit nets --------------------------------------

    pub(crate) fn create_uninstantiated(&mut self, parent_body: BodyId, stmt: &InstantiationSyntax, inst: &HierInstanceSyntax) {
        let param_text = stmt
            .params
            .ordered
            .iter()
            .map(|e| render_expr(e, self.interner).into_boxed_str())
            .chain(stmt.params.named.iter().map(|n| {
                let value = n.value.as_ref().map_or(String::new(), |e| render_expr(e, self.interner));
                format!(".{}({})", self.interner.resolve(n.name), value).into_boxed_str()
            }))
            .collect();
        let connection_text = inst
            .connections
            .iter()
            .map(|conn| render_connection(conn, self.interner).into_boxed_str())
            .collect();
        let symbol = self.arena.add_symbol(Symbol::Uninstantiated(UninstantiatedInst {
            name: inst.name,
            type_name: stmt.type_name,
            range: inst.range,
            param_text,
            connection_text,
        }));
        self.arena.body_mut(parent_body).members.push(symbol);
    }

    /// Implicit nets for the whole statement, emitted into the enclosing
    /// scope before any of the statement's instances, deduplicated by name.
    fn create_implicit_nets(&mut self, parent_body: BodyId, stmt: &InstantiationSyntax) {
        let connections: Vec<&[crate::syntax::PortConnSyntax]> =
            stmt.instances.iter().map(|inst| inst.connections.as_slice()).collect();
        let names = crate::ports::implicit_net_names(&connections, &self.arena.body(parent_body).scope_names);
        let net_type = self.registry.def(self.arena.body(parent_body).definition).default_net_type;
        for name in names {
            let symbol = self.arena.add_symbol(Symbol::Net(NetSymbol {
                name,
                range: stmt.range,
                net_type,
                implicit: true,
            }));
            let body = self.arena.body_mut(parent_body);
            body.members.push(symbol);
            body.scope_names.insert(name);
        }
    }

    /// Creates a bind instance inside `body_id`.
    fn apply_bind(&mut self, body_id: BodyId, bind_id: BindId, scope: &EvalScope) {
        let bind = &self.binds[bind_id.index()];
        if self.arena.body(body_id).from_bind {
            self.diags.report(
                DiagCode::BindUnderBind,
                bind.range,
                format!(
                    "bind directive in '{}' targets an instance that itself came from a bind",
                    self.interner.resolve(bind.from_unit)
                ),
            );
            return;
        }
        let flags = WalkFlags::default();
        // reuse the standard instantiation path with the bind marker set
        self.bind_in_progress = true;
        self.handle_instantiation(body_id, &bind.inst, scope, flags);
        self.bind_in_progress = false;
    }

    fn connect_top_iface_ports(&mut self, body_id: BodyId) {
        crate::instance::connect_top_iface_ports(self, body_id);
    }
}

/// One resolved top-level entry.
enum TopEntry {
    Def {
        def: DefinitionId,
        name: NameId,
        config: Option<ResolvedConfig>,
    },
}

/// Builds the slot-wise composition of instance and cell rules.
fn compose_rules(instance: Option<&ConfigRule>, cell: Option<&ConfigRule>) -> Option<ConfigRule> {
    match (instance, cell) {
        (None, None) => None,
        (Some(rule), None) | (None, Some(rule)) => Some(ConfigRule {
            use_cell: rule.use_cell,
            liblist: rule.liblist.clone(),
            param_overrides: Vec::new(),
            range: rule.range,
        }),
        (Some(inst), Some(cell)) => Some(ConfigRule {
            use_cell: inst.use_cell.or(cell.use_cell),
            liblist: inst.liblist.clone().or_else(|| cell.liblist.clone()),
            param_overrides: Vec::new(),
            range: inst.range,
        }),
    }
}

/// Names every instantiation statement mentions, for implicit-top detection.
fn collect_instantiated_names(members: &[MemberSyntax], out: &mut AHashSet<NameId>) {
    for member in members {
        match member {
            MemberSyntax::Instantiation(inst) => {
                out.insert(inst.type_name);
            }
            MemberSyntax::Bind(bind) => {
                out.insert(bind.inst.type_name);
            }
            MemberSyntax::Block(block) => collect_instantiated_names(&block.members, out),
            MemberSyntax::GenerateIf(generate) => {
                collect_instantiated_names(&generate.then_members, out);
                collect_instantiated_names(&generate.else_members, out);
            }
            MemberSyntax::Procedure(procedure) => collect_stmt_instantiations(&procedure.stmts, out),
            _ => {}
        }
    }
}

fn collect_stmt_instantiations(stmts: &[StmtSyntax], out: &mut AHashSet<NameId>) {
    for stmt in stmts {
        match stmt {
            StmtSyntax::Instantiation(inst) => {
                out.insert(inst.type_name);
            }
            StmtSyntax::Block { stmts, .. } => collect_stmt_instantiations(stmts, out),
            _ => {}
        }
    }
}

/// Names declared by members (nets and instances), for forward references
/// and implicit-net suppression.
fn collect_declared_names(members: &[MemberSyntax], out: &mut AHashSet<NameId>) {
    for member in members {
        match member {
            MemberSyntax::Net(net) => out.extend(net.names.iter().copied()),
            MemberSyntax::Instantiation(inst) => out.extend(inst.instances.iter().map(|i| i.name)),
            MemberSyntax::Block(block) => collect_declared_names(&block.members, out),
            MemberSyntax::GenerateIf(generate) => {
                collect_declared_names(&generate.then_members, out);
                collect_declared_names(&generate.else_members, out);
            }
            MemberSyntax::Param(decl) => {
                out.insert(decl.name);
            }
            _ => {}
        }
    }
}

fn containment_violation(parent: DesignKind, child: DesignKind) -> Option<&'static str> {
    match (parent, child) {
        (DesignKind::Program, DesignKind::Module) => Some("a program may not contain module instances"),
        (DesignKind::Interface, DesignKind::Program) => Some("an interface may not contain program instances"),
        (DesignKind::Checker, DesignKind::Module | DesignKind::Interface | DesignKind::Program) => {
            Some("a checker body may not contain module-like instances")
        }
        _ => None,
    }
}

fn render_connection(conn: &crate::syntax::PortConnSyntax, interner: &Interner) -> String {
    match conn {
        crate::syntax::PortConnSyntax::Ordered(Some(expr), _) => render_expr(expr, interner),
        crate::syntax::PortConnSyntax::Ordered(None, _) => String::new(),
        crate::syntax::PortConnSyntax::Named { name, expr, .. } => {
            let value = expr.as_ref().map_or(String::new(), |e| render_expr(e, interner));
            format!(".{}({})", interner.resolve(*name), value)
        }
        crate::syntax::PortConnSyntax::Wildcard(_) => ".*".to_owned(),
    }
}
