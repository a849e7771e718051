//! Parameter resolution for instance bodies.
//!
//! A [`ParameterBuilder`] accumulates override values from instantiation
//! syntax (`#(...)`), configuration rules, and hierarchy-override nodes
//! (defparams), then produces resolved [`ParameterSymbol`]s as the body is
//! built: port parameters up front in declaration order, body parameters as
//! the member walk reaches them. The most specific override wins: a defparam
//! dominates a per-instance config rule, which dominates a cell rule, which
//! dominates an inline assignment, which dominates the declaration default.

use ahash::{AHashMap, AHashSet};

use crate::{
    diag::{DiagCode, Diagnostics},
    intern::{Interner, NameId},
    overrides::HierarchyOverrideNode,
    source::SourceRange,
    syntax::{DesignUnitSyntax, MemberSyntax, NamedParamSyntax, ParamAssignmentsSyntax, ParamDeclSyntax},
    value::{ConstantValue, EvalScope, eval, render_expr},
};

/// A resolved parameter in an instance body.
#[derive(Debug, Clone)]
pub struct ParameterSymbol {
    pub name: NameId,
    pub value: ConstantValue,
    pub is_local: bool,
    pub is_port: bool,
    pub is_type: bool,
    pub range: SourceRange,
}

/// Where an override value came from; higher wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OverrideOrigin {
    Assignment,
    CellRule,
    InstanceRule,
    Defparam,
}

#[derive(Debug, Clone)]
pub struct ParameterBuilder {
    force_invalid: bool,
    overrides: AHashMap<NameId, (ConstantValue, OverrideOrigin)>,
    known: AHashSet<NameId>,
    locals: AHashSet<NameId>,
    port_order: Vec<NameId>,
}

impl ParameterBuilder {
    /// Collects the target definition's parameter names so overrides can be
    /// validated before any body member is elaborated.
    #[must_use]
    pub fn new(syntax: &DesignUnitSyntax, force_invalid: bool) -> Self {
        let mut builder = Self {
            force_invalid,
            overrides: AHashMap::default(),
            known: AHashSet::default(),
            locals: AHashSet::default(),
            port_order: Vec::new(),
        };
        for decl in &syntax.param_ports {
            builder.note_decl(decl);
            builder.port_order.push(decl.name);
        }
        collect_body_params(&syntax.members, &mut builder);
        builder
    }

    fn note_decl(&mut self, decl: &ParamDeclSyntax) {
        if decl.is_local {
            self.locals.insert(decl.name);
        } else {
            self.known.insert(decl.name);
        }
    }

    /// All downstream evaluation should short-circuit: the body belongs to an
    /// untaken generate arm or an unresolvable definition.
    pub fn force_invalid(&mut self) {
        self.force_invalid = true;
    }

    fn insert(&mut self, name: NameId, value: ConstantValue, origin: OverrideOrigin) {
        match self.overrides.get(&name) {
            Some((_, existing)) if *existing > origin => {}
            _ => {
                self.overrides.insert(name, (value, origin));
            }
        }
    }

    fn check_named_target(&self, name: NameId, range: SourceRange, interner: &Interner, diags: &mut Diagnostics) -> bool {
        if self.locals.contains(&name) {
            diags.report(
                DiagCode::LocalParamOverride,
                range,
                format!("local parameter '{}' cannot be overridden", interner.resolve(name)),
            );
            return false;
        }
        if !self.known.contains(&name) {
            diags.report(
                DiagCode::UnknownNamedParam,
                range,
                format!("no parameter named '{}'", interner.resolve(name)),
            );
            return false;
        }
        true
    }

    /// Applies `#(...)` assignment syntax from an instantiation site.
    ///
    /// Ordered assignments bind positionally to port parameters only; named
    /// assignments may target any non-local parameter. Values evaluate in
    /// the *instantiating* scope.
    pub fn apply_assignments(
        &mut self,
        params: &ParamAssignmentsSyntax,
        parent_scope: &EvalScope,
        range: SourceRange,
        interner: &Interner,
        diags: &mut Diagnostics,
    ) {
        if !params.ordered.is_empty() && !params.named.is_empty() {
            diags.report(
                DiagCode::MixedOrderedNamedParams,
                range,
                "cannot mix ordered and named parameter assignments",
            );
        }
        if params.ordered.len() > self.port_order.len() {
            diags.report(
                DiagCode::TooManyOrderedParams,
                range,
                format!(
                    "{} parameter values given but only {} parameter ports declared",
                    params.ordered.len(),
                    self.port_order.len()
                ),
            );
        }
        let ordered_pairs: Vec<_> =
            params.ordered.iter().zip(self.port_order.clone()).collect();
        for (value, name) in ordered_pairs {
            if self.locals.contains(&name) {
                diags.report(
                    DiagCode::LocalParamOverride,
                    value.range,
                    format!("local parameter '{}' cannot be overridden", interner.resolve(name)),
                );
                continue;
            }
            let value = eval(value, parent_scope);
            self.insert(name, value, OverrideOrigin::Assignment);
        }
        self.apply_named(&params.named, OverrideOrigin::Assignment, parent_scope, interner, diags);
    }

    /// Applies named parameter overrides from a configuration rule.
    pub fn apply_rule_overrides(
        &mut self,
        overrides: &[NamedParamSyntax],
        origin: OverrideOrigin,
        parent_scope: &EvalScope,
        interner: &Interner,
        diags: &mut Diagnostics,
    ) {
        self.apply_named(overrides, origin, parent_scope, interner, diags);
    }

    fn apply_named(
        &mut self,
        named: &[NamedParamSyntax],
        origin: OverrideOrigin,
        parent_scope: &EvalScope,
        interner: &Interner,
        diags: &mut Diagnostics,
    ) {
        for assignment in named {
            if !self.check_named_target(assignment.name, assignment.range, interner, diags) {
                continue;
            }
            let value = match &assignment.value {
                Some(expr) => eval(expr, parent_scope),
                // `.P()` leaves the declaration default in force
                None => continue,
            };
            self.insert(assignment.name, value, origin);
        }
    }

    /// Applies defparam-style values carried by a hierarchy override node.
    pub fn apply_override_node(
        &mut self,
        node: &HierarchyOverrideNode,
        defparam_scope: &EvalScope,
        interner: &Interner,
        diags: &mut Diagnostics,
    ) {
        for entry in &node.params {
            if !self.check_named_target(entry.target, entry.range, interner, diags) {
                continue;
            }
            let value = eval(&entry.value, defparam_scope);
            self.insert(entry.target, value, OverrideOrigin::Defparam);
        }
    }

    /// Resolves one declaration into a symbol, extending `own_scope` so later
    /// defaults can reference earlier parameters.
    pub fn build(
        &self,
        decl: &ParamDeclSyntax,
        own_scope: &mut EvalScope,
        interner: &Interner,
        diags: &mut Diagnostics,
    ) -> ParameterSymbol {
        let value = if self.force_invalid {
            ConstantValue::Invalid
        } else if let Some((value, _)) = self.overrides.get(&decl.name).filter(|_| !decl.is_local) {
            value.clone()
        } else if let Some(default) = &decl.default {
            if decl.is_type {
                // type parameters resolve to a rendered type name
                ConstantValue::Str(render_expr(default, interner).into_boxed_str())
            } else {
                eval(default, own_scope)
            }
        } else if decl.is_port {
            // an unbound parameter port is only an error if the body is a
            // candidate for implicit top selection; callers check that
            ConstantValue::Invalid
        } else {
            diags.report(
                DiagCode::MissingParamInitializer,
                decl.range,
                format!("parameter '{}' has no initializer", interner.resolve(decl.name)),
            );
            ConstantValue::Invalid
        };
        own_scope.insert(decl.name, value.clone());
        ParameterSymbol {
            name: decl.name,
            value,
            is_local: decl.is_local,
            is_port: decl.is_port,
            is_type: decl.is_type,
            range: decl.range,
        }
    }

    /// Builds all port parameters in declaration order.
    pub fn build_port_params(
        &self,
        syntax: &DesignUnitSyntax,
        own_scope: &mut EvalScope,
        interner: &Interner,
        diags: &mut Diagnostics,
    ) -> Vec<ParameterSymbol> {
        syntax
            .param_ports
            .iter()
            .map(|decl| self.build(decl, own_scope, interner, diags))
            .collect()
    }

    /// True if some parameter port has neither a default nor an override.
    /// Used by implicit-top detection to skip modules that cannot elaborate
    /// standalone.
    #[must_use]
    pub fn has_unbound_port(&self, syntax: &DesignUnitSyntax) -> bool {
        syntax
            .param_ports
            .iter()
            .any(|decl| decl.default.is_none() && !decl.is_local && !self.overrides.contains_key(&decl.name))
    }
}

/// Records every body parameter name so named assignments can be validated
/// up front. Generate arms are included: a name that only exists in an
/// untaken arm is still a declared name, not a typo.
fn collect_body_params(members: &[MemberSyntax], builder: &mut ParameterBuilder) {
    for member in members {
        match member {
            MemberSyntax::Param(decl) => builder.note_decl(decl),
            MemberSyntax::Block(block) => collect_body_params(&block.members, builder),
            MemberSyntax::GenerateIf(generate) => {
                collect_body_params(&generate.then_members, builder);
                collect_body_params(&generate.else_members, builder);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        parse::{ParseContext, parse_source},
        syntax::{SyntaxIdAllocator, UnitSyntax},
    };

    fn unit(text: &str) -> (DesignUnitSyntax, Interner, Diagnostics) {
        let mut interner = Interner::new();
        let mut ids = SyntaxIdAllocator::default();
        let mut diags = Diagnostics::new();
        let units = parse_source(
            text,
            0,
            &mut ParseContext {
                interner: &mut interner,
                ids: &mut ids,
                diags: &mut diags,
                bare_param_assignment: false,
            },
        );
        let UnitSyntax::Design(unit) = units.into_iter().next().expect("one unit") else {
            panic!("expected design unit");
        };
        (unit, interner, diags)
    }

    #[test]
    fn defaults_see_earlier_parameters() {
        let (unit, interner, mut diags) = unit("module m #(parameter W = 4, parameter D = W * 2)();\nendmodule\n");
        let builder = ParameterBuilder::new(&unit, false);
        let mut scope = EvalScope::default();
        let params = builder.build_port_params(&unit, &mut scope, &interner, &mut diags);
        assert_eq!(params[1].value, ConstantValue::Int(8));
        assert!(diags.is_empty());
    }

    #[test]
    fn defparam_beats_assignment() {
        let (unit, mut interner, mut diags) = unit("module m #(parameter W = 4)();\nendmodule\n");
        let w = interner.intern("W");
        let mut builder = ParameterBuilder::new(&unit, false);
        let scope = EvalScope::default();
        builder.insert(w, ConstantValue::Int(1), OverrideOrigin::Assignment);
        builder.insert(w, ConstantValue::Int(2), OverrideOrigin::Defparam);
        builder.insert(w, ConstantValue::Int(3), OverrideOrigin::CellRule);
        let mut own = scope;
        let params = builder.build_port_params(&unit, &mut own, &interner, &mut diags);
        assert_eq!(params[0].value, ConstantValue::Int(2));
    }

    #[test]
    fn local_param_override_is_reported() {
        let (unit, mut interner, mut diags) = unit("module m #(localparam L = 1)();\nendmodule\n");
        let l = interner.intern("L");
        let mut builder = ParameterBuilder::new(&unit, false);
        let named = [NamedParamSyntax {
            name: l,
            value: None,
            range: SourceRange::default(),
        }];
        builder.apply_rule_overrides(&named, OverrideOrigin::InstanceRule, &EvalScope::default(), &interner, &mut diags);
        assert!(diags.contains(DiagCode::LocalParamOverride));
    }

    #[test]
    fn missing_body_initializer_is_reported() {
        let (unit, interner, mut diags) = unit("module m;\n  parameter P;\nendmodule\n");
        let builder = ParameterBuilder::new(&unit, false);
        let MemberSyntax::Param(decl) = &unit.members[0] else {
            panic!("expected param");
        };
        let mut scope = EvalScope::default();
        let symbol = builder.build(decl, &mut scope, &interner, &mut diags);
        assert!(symbol.value.is_invalid());
        assert!(diags.contains(DiagCode::MissingParamInitializer));
    }

    #[test]
    fn forced_invalid_emits_no_diagnostics() {
        let (unit, interner, mut diags) = unit("module m;\n  parameter P;\nendmodule\n");
        let mut builder = ParameterBuilder::new(&unit, false);
        builder.force_invalid();
        let MemberSyntax::Param(decl) = &unit.members[0] else {
            panic!("expected param");
        };
        let mut scope = EvalScope::default();
        let symbol = builder.build(decl, &mut scope, &interner, &mut diags);
        assert!(symbol.value.is_invalid());
        assert!(diags.is_empty());
    }
}
