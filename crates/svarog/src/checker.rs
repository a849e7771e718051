//! Checker instances.
//!
//! A checker is half instance, half macro: its body is re-elaborated per
//! instantiation with the actual arguments substituted for the formal
//! assertion ports. Instantiation is bounded by
//! `Limits::max_checker_instance_depth` to stop recursive checker chains,
//! and is illegal inside `fork...join` blocks and inside the procedural
//! body of another checker.

use smallvec::SmallVec;

use crate::{
    diag::DiagCode,
    elab::{BodyCtx, Elaborator, WalkFlags},
    params::ParameterBuilder,
    registry::DefinitionId,
    symbol::{BodyId, CheckerFormal, CheckerInstance, Symbol},
    syntax::{
        HierInstanceSyntax, InstantiationSyntax, PortConnSyntax, PortDirection, ProcedureKind, ProcedureSyntax,
        StmtSyntax,
    },
    value::{EvalScope, render_expr},
};

impl Elaborator<'_> {
    pub(crate) fn create_checker_instance(
        &mut self,
        parent_body: BodyId,
        def: DefinitionId,
        stmt: &InstantiationSyntax,
        inst: &HierInstanceSyntax,
        parent_scope: &EvalScope,
        flags: WalkFlags,
    ) {
        if flags.in_fork_join {
            self.diags.report(
                DiagCode::CheckerInForkJoin,
                inst.range,
                "checkers cannot be instantiated inside fork-join blocks",
            );
            return;
        }
        if flags.in_checker_proc {
            self.diags.report(
                DiagCode::CheckerInCheckerProc,
                inst.range,
                "checkers cannot be instantiated in the procedural body of another checker",
            );
            return;
        }

        let depth = self.checker_depth(parent_body) + 1;
        if depth > self.options.limits.max_checker_instance_depth {
            self.diags.report(
                DiagCode::MaxCheckerDepthExceeded,
                inst.range,
                format!(
                    "checker instantiation exceeds {} levels",
                    self.options.limits.max_checker_instance_depth
                ),
            );
            self.create_uninstantiated(parent_body, stmt, inst);
            return;
        }

        let formals = self.resolve_formals(def, inst);

        let mut builder = ParameterBuilder::new(&self.registry.def(def).syntax, false);
        builder.apply_assignments(&stmt.params, parent_scope, stmt.range, self.interner, self.diags);
        let config = self.arena.body(parent_body).config.as_ref().map(|c| c.descend(inst.name));
        let from_bind = self.bind_in_progress;
        self.bind_in_progress = false;
        let ctx = BodyCtx {
            def,
            uninstantiated: false,
            from_bind,
            override_node: None,
            config,
        };
        let body_id = self.build_body(&ctx, &mut builder);
        self.bind_in_progress = from_bind;
        let symbol_id = self.arena.add_symbol(Symbol::Checker(CheckerInstance {
            name: inst.name,
            range: inst.range,
            body: body_id,
            formals,
            depth,
        }));
        self.arena.body_mut(body_id).parent = Some(symbol_id);
        self.arena.body_mut(parent_body).members.push(symbol_id);
        self.tracer.instance_created(self.interner.resolve(inst.name));
    }

    /// Checker nesting depth of the enclosing body. A checker body's owning
    /// symbol is always a checker instance, which records its own depth.
    fn checker_depth(&self, parent_body: BodyId) -> u32 {
        match self.arena.body(parent_body).parent.map(|p| self.arena.symbol(p)) {
            Some(Symbol::Checker(checker)) => checker.depth,
            _ => 0,
        }
    }

    /// Matches actual connections against the checker's formal ports.
    ///
    /// Input ports with no connection fall back to the formal's default
    /// expression when present; output ports are realised as ordinary formal
    /// arguments.
    fn resolve_formals(&mut self, def: DefinitionId, inst: &HierInstanceSyntax) -> Vec<CheckerFormal> {
        let def = self.registry.def(def);
        let mut formals = Vec::with_capacity(def.syntax.ports.len());
        let mut ordered: SmallVec<[Option<&crate::syntax::ExprNode>; 8]> = SmallVec::new();
        let mut named: SmallVec<[(crate::intern::NameId, Option<&crate::syntax::ExprNode>); 8]> = SmallVec::new();
        for conn in &inst.connections {
            match conn {
                PortConnSyntax::Ordered(expr, _) => ordered.push(expr.as_ref()),
                PortConnSyntax::Named { name, expr, .. } => named.push((*name, expr.as_ref())),
                PortConnSyntax::Wildcard(_) => {}
            }
        }
        for (index, port) in def.syntax.ports.iter().enumerate() {
            let actual = ordered
                .get(index)
                .copied()
                .flatten()
                .or_else(|| named.iter().find(|(name, _)| *name == port.name).and_then(|(_, e)| *e));
            let rendered = match actual {
                Some(expr) => Some(render_expr(expr, self.interner).into_boxed_str()),
                None => port
                    .default
                    .as_ref()
                    .map(|expr| render_expr(expr, self.interner).into_boxed_str()),
            };
            formals.push(CheckerFormal {
                name: port.name,
                actual: rendered,
                is_output: port.direction == PortDirection::Output,
            });
        }
        formals
    }

    /// Statement-kind restrictions inside checker procedures: `always` is
    /// forbidden outright, and blocking assignment is diagnosed in
    /// `always_ff`.
    pub(crate) fn check_procedure(&mut self, body_id: BodyId, procedure: &ProcedureSyntax) {
        if !self.body_is_checker(body_id) {
            return;
        }
        match procedure.kind {
            ProcedureKind::Always => {
                self.diags.report(
                    DiagCode::AlwaysInChecker,
                    procedure.range,
                    "checkers only allow always_comb, always_ff, and always_latch procedures",
                );
            }
            ProcedureKind::AlwaysFf => {
                report_blocking_assigns(self, &procedure.stmts);
            }
            _ => {}
        }
    }
}

fn report_blocking_assigns(elab: &mut Elaborator<'_>, stmts: &[StmtSyntax]) {
    for stmt in stmts {
        match stmt {
            StmtSyntax::BlockingAssign(range) => {
                elab.diags.report(
                    DiagCode::BlockingInAlwaysFf,
                    *range,
                    "blocking assignment is not allowed in always_ff",
                );
            }
            StmtSyntax::Block { stmts, .. } => report_blocking_assigns(elab, stmts),
            _ => {}
        }
    }
}
