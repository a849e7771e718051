//! Package elaboration and export resolution.
//!
//! A package's own body is force-elaborated on the first lookup that misses,
//! because wildcard imports inside it may discover new exports. Cyclic
//! imports (package A imports B which exports back into A) are tolerated by
//! a re-entry flag: a lookup that re-enters a package already being
//! elaborated returns "not found" instead of looping.

use ahash::{AHashMap, AHashSet};

use crate::{
    diag::{DiagCode, Diagnostics},
    intern::{Interner, NameId},
    library::LibraryRegistry,
    params::ParameterBuilder,
    registry::{DefinitionId, DefinitionRegistry, LookupContext, LookupResult},
    source::SourceRange,
    syntax::{DesignKind, ImportItem, MemberSyntax},
    value::{ConstantValue, EvalScope},
};

/// A lowered `export` declaration.
#[derive(Debug, Clone, Copy)]
struct PackageExport {
    /// `None` is the `*::*` form.
    package: Option<NameId>,
    item: ImportItem,
}

/// One import recorded while elaborating a package.
#[derive(Debug, Clone, Copy)]
struct PackageImport {
    package: DefinitionId,
    item: ImportItem,
}

#[derive(Debug, Default)]
struct PackageElab {
    values: AHashMap<NameId, ConstantValue>,
    imports: Vec<PackageImport>,
    exports: Vec<PackageExport>,
}

/// Shared context threaded through package resolution.
pub struct PackageEnv<'a> {
    pub registry: &'a DefinitionRegistry,
    pub libs: &'a LibraryRegistry,
    pub interner: &'a Interner,
    pub diags: &'a mut Diagnostics,
}

/// Memoised package elaborations for one compilation.
#[derive(Debug, Default)]
pub struct PackageTable {
    elaborated: AHashMap<DefinitionId, PackageElab>,
    in_progress: AHashSet<DefinitionId>,
}

impl PackageTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `pkg_name` to a package definition from `caller_lib`'s
    /// perspective, diagnosing non-packages and unknown names.
    pub fn resolve_package(
        &self,
        pkg_name: NameId,
        caller_lib: crate::library::LibraryId,
        range: SourceRange,
        env: &mut PackageEnv<'_>,
    ) -> Option<DefinitionId> {
        let ctx = LookupContext {
            caller_lib: Some(caller_lib),
            ..LookupContext::default()
        };
        // package lookups share the liblist walk but must land on a package
        let mut probe = Diagnostics::new();
        match env.registry.get_definition(pkg_name, ctx, env.libs, env.interner, &mut probe, range) {
            Some(LookupResult::Def(def)) if env.registry.def(def).kind == DesignKind::Package => Some(def),
            _ => {
                env.diags.report(
                    DiagCode::UnknownPackage,
                    range,
                    format!("unknown package '{}'", env.interner.resolve(pkg_name)),
                );
                None
            }
        }
    }

    /// Looks `name` up in `pkg`, force-elaborating on first miss and then
    /// consulting export declarations for names that arrived via imports.
    pub fn resolve_member(&mut self, pkg: DefinitionId, name: NameId, env: &mut PackageEnv<'_>) -> Option<ConstantValue> {
        if self.in_progress.contains(&pkg) {
            return None;
        }
        self.ensure_elaborated(pkg, env);
        let elab = self.elaborated.get(&pkg)?;
        if let Some(value) = elab.values.get(&name) {
            return Some(value.clone());
        }
        // may this package re-export `name` from one of its imports?
        let exports = elab.exports.clone();
        let imports = elab.imports.clone();
        for export in &exports {
            let item_allows = match export.item {
                ImportItem::Wildcard => true,
                ImportItem::Name(exported) => exported == name,
            };
            if !item_allows {
                continue;
            }
            for import in &imports {
                if let Some(filter) = export.package {
                    if env.registry.def(import.package).name != filter {
                        continue;
                    }
                }
                let import_brings = match import.item {
                    ImportItem::Wildcard => true,
                    ImportItem::Name(imported) => imported == name,
                };
                if !import_brings {
                    continue;
                }
                if let Some(value) = self.resolve_member(import.package, name, env) {
                    return Some(value);
                }
            }
        }
        None
    }

    /// Copies every directly declared value of `pkg` into `scope` (the
    /// wildcard-import effect).
    pub fn import_all(&mut self, pkg: DefinitionId, scope: &mut EvalScope, env: &mut PackageEnv<'_>) {
        if self.in_progress.contains(&pkg) {
            return;
        }
        self.ensure_elaborated(pkg, env);
        if let Some(elab) = self.elaborated.get(&pkg) {
            for (&name, value) in &elab.values {
                scope.entry(name).or_insert_with(|| value.clone());
            }
        }
    }

    fn ensure_elaborated(&mut self, pkg: DefinitionId, env: &mut PackageEnv<'_>) {
        if self.elaborated.contains_key(&pkg) {
            return;
        }
        self.in_progress.insert(pkg);
        let elab = self.elaborate_body(pkg, env);
        self.in_progress.remove(&pkg);
        self.elaborated.insert(pkg, elab);
    }

    fn elaborate_body(&mut self, pkg: DefinitionId, env: &mut PackageEnv<'_>) -> PackageElab {
        // copy the registry reference out so `syntax` does not pin `env`
        let registry = env.registry;
        let def = registry.def(pkg);
        let syntax = &def.syntax;
        let caller_lib = def.library;
        let builder = ParameterBuilder::new(syntax, false);
        let mut elab = PackageElab::default();
        let mut scope = EvalScope::default();

        // imports first, in textual order, so later defaults can see them
        for member in &syntax.members {
            if let MemberSyntax::Import(import) = member {
                let Some(imported) = self.resolve_package(import.package, caller_lib, import.range, env) else {
                    continue;
                };
                elab.imports.push(PackageImport {
                    package: imported,
                    item: import.item,
                });
                match import.item {
                    ImportItem::Wildcard => self.import_all(imported, &mut scope, env),
                    ImportItem::Name(name) => match self.resolve_member(imported, name, env) {
                        Some(value) => {
                            scope.insert(name, value);
                        }
                        None => {
                            env.diags.report(
                                DiagCode::UnknownPackageMember,
                                import.range,
                                format!(
                                    "package '{}' has no member '{}'",
                                    env.interner.resolve(import.package),
                                    env.interner.resolve(name)
                                ),
                            );
                        }
                    },
                }
            }
        }

        for decl in &syntax.param_ports {
            let symbol = builder.build(decl, &mut scope, env.interner, env.diags);
            elab.values.insert(symbol.name, symbol.value);
        }
        collect_members(&syntax.members, &builder, &mut scope, &mut elab, env);
        elab
    }
}

fn collect_members(
    members: &[MemberSyntax],
    builder: &ParameterBuilder,
    scope: &mut EvalScope,
    elab: &mut PackageElab,
    env: &mut PackageEnv<'_>,
) {
    for member in members {
        match member {
            MemberSyntax::Param(decl) => {
                let symbol = builder.build(decl, scope, env.interner, env.diags);
                elab.values.insert(symbol.name, symbol.value);
            }
            MemberSyntax::Export(export) => {
                elab.exports.push(PackageExport {
                    package: export.package,
                    item: export.item,
                });
            }
            MemberSyntax::Block(block) => collect_members(&block.members, builder, scope, elab, env),
            _ => {}
        }
    }
}
