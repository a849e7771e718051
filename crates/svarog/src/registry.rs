//! The definition registry: parsed design units indexed by `(name, library)`
//! and the name-resolution algorithm that turns an instantiation site into a
//! concrete definition or config.
//!
//! Resolution is pure: two identical queries within one compilation return
//! the same definition. Failures emit one diagnostic at the first offending
//! site (the diagnostics sink dedups by range) and return `None`, which the
//! elaborator converts into an uninstantiated placeholder.

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::{
    config::{ConfigBlock, ConfigId, ConfigRule},
    diag::{DiagCode, Diagnostics},
    intern::{Interner, NameId},
    library::{LibraryId, LibraryRegistry},
    source::SourceRange,
    syntax::{DesignKind, DesignUnitSyntax},
};

/// Handle to a registered definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct DefinitionId(pub(crate) u32);

impl DefinitionId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A registered design unit. Immutable after registration.
#[derive(Debug)]
pub struct Definition {
    pub kind: DesignKind,
    pub name: NameId,
    pub library: LibraryId,
    pub syntax: DesignUnitSyntax,
    /// Net type given to implicit nets created in this definition's scope.
    pub default_net_type: &'static str,
    pub timescale: Option<Box<str>>,
}

/// Result of a name lookup: either a module-like definition or a config that
/// re-roots elaboration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupResult {
    Def(DefinitionId),
    Config(ConfigId),
}

/// Everything a lookup needs beyond the name itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct LookupContext<'a> {
    /// Explicit `lib.cell` qualifier on the instantiation, bypassing liblists.
    pub explicit_lib: Option<NameId>,
    /// Library of the definition containing the instantiation.
    pub caller_lib: Option<LibraryId>,
    /// Config rule selected for this site, if any.
    pub rule: Option<&'a ConfigRule>,
    /// Liblist inherited from the enclosing resolved config.
    pub inherited_liblist: Option<&'a [LibraryId]>,
}

#[derive(Debug, Default)]
pub struct DefinitionRegistry {
    defs: Vec<Definition>,
    configs: Vec<ConfigBlock>,
    by_name: AHashMap<(NameId, LibraryId), DefinitionId>,
    configs_by_name: AHashMap<(NameId, LibraryId), ConfigId>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition; duplicate `(name, library)` pairs are
    /// diagnosed and the first registration kept.
    pub fn add_definition(&mut self, def: Definition, interner: &Interner, diags: &mut Diagnostics) -> DefinitionId {
        let key = (def.name, def.library);
        if let Some(&existing) = self.by_name.get(&key) {
            diags.report(
                DiagCode::DuplicateDefinition,
                def.syntax.range,
                format!("duplicate definition of '{}' in the same library", interner.resolve(def.name)),
            );
            return existing;
        }
        let id = DefinitionId(u32::try_from(self.defs.len()).expect("definition count overflow"));
        self.defs.push(def);
        self.by_name.insert(key, id);
        id
    }

    pub fn add_config(&mut self, config: ConfigBlock, interner: &Interner, diags: &mut Diagnostics) -> ConfigId {
        let key = (config.name, config.library);
        if let Some(&existing) = self.configs_by_name.get(&key) {
            diags.report(
                DiagCode::DuplicateDefinition,
                config.range,
                format!("duplicate config '{}' in the same library", interner.resolve(config.name)),
            );
            return existing;
        }
        let id = ConfigId(u32::try_from(self.configs.len()).expect("config count overflow"));
        self.configs.push(config);
        self.configs_by_name.insert(key, id);
        id
    }

    #[must_use]
    pub fn def(&self, id: DefinitionId) -> &Definition {
        &self.defs[id.index()]
    }

    #[must_use]
    pub fn config(&self, id: ConfigId) -> &ConfigBlock {
        &self.configs[id.index()]
    }

    #[must_use]
    pub fn iter_defs(&self) -> impl Iterator<Item = (DefinitionId, &Definition)> {
        self.defs
            .iter()
            .enumerate()
            .map(|(i, d)| (DefinitionId(u32::try_from(i).expect("checked at insert")), d))
    }

    #[must_use]
    pub fn iter_configs(&self) -> impl Iterator<Item = (ConfigId, &ConfigBlock)> {
        self.configs
            .iter()
            .enumerate()
            .map(|(i, c)| (ConfigId(u32::try_from(i).expect("checked at insert")), c))
    }

    /// Direct `(name, library)` probe with no search-order semantics.
    #[must_use]
    pub fn find_in_library(&self, name: NameId, library: LibraryId) -> Option<LookupResult> {
        if let Some(&id) = self.by_name.get(&(name, library)) {
            return Some(LookupResult::Def(id));
        }
        self.configs_by_name.get(&(name, library)).copied().map(LookupResult::Config)
    }

    /// Resolves an unqualified (or `lib.`-qualified) cell name from a caller
    /// scope, honoring an optional config rule and inherited liblist.
    ///
    /// Emits the appropriate lookup-failure diagnostic and returns `None`
    /// when nothing matches; the caller substitutes a placeholder.
    pub fn get_definition(
        &self,
        name: NameId,
        ctx: LookupContext<'_>,
        libs: &LibraryRegistry,
        interner: &Interner,
        diags: &mut Diagnostics,
        range: SourceRange,
    ) -> Option<LookupResult> {
        // A use rule may redirect both the cell name and the library.
        let (target_lib, target_cell, want_config) = match ctx.rule.and_then(|r| r.use_cell) {
            Some(cell) => (cell.library, cell.cell, cell.target_config),
            None => (None, name, false),
        };

        // Qualified names bypass the liblist entirely.
        if let Some(lib_name) = ctx.explicit_lib {
            let Some(lib) = libs.lookup(lib_name) else {
                diags.report(
                    DiagCode::UnknownLibrary,
                    range,
                    format!("unknown library '{}'", interner.resolve(lib_name)),
                );
                return None;
            };
            return self.require(target_cell, lib, want_config, interner, diags, range);
        }
        if let Some(lib) = target_lib {
            return self.require(target_cell, lib, want_config, interner, diags, range);
        }

        // Effective search order: rule liblist, else inherited config
        // liblist, else caller's library followed by the global order.
        let search: SmallVec<[LibraryId; 8]> = if let Some(list) = ctx.rule.and_then(|r| r.liblist.as_ref()) {
            list.iter().copied().collect()
        } else if let Some(list) = ctx.inherited_liblist {
            list.iter().copied().collect()
        } else {
            let mut order: SmallVec<[LibraryId; 8]> = SmallVec::new();
            if let Some(caller) = ctx.caller_lib {
                order.push(caller);
            }
            for lib in libs.search_order() {
                if !order.contains(&lib) {
                    order.push(lib);
                }
            }
            order
        };

        for lib in search {
            if let Some(found) = self.find_in_library(target_cell, lib) {
                if want_config && !matches!(found, LookupResult::Config(_)) {
                    diags.report(
                        DiagCode::NotAConfig,
                        range,
                        format!("'{}' is not a configuration", interner.resolve(target_cell)),
                    );
                    return None;
                }
                return Some(found);
            }
        }
        diags.report(
            DiagCode::UnknownModule,
            range,
            format!("unknown module '{}'", interner.resolve(target_cell)),
        );
        None
    }

    fn require(
        &self,
        cell: NameId,
        lib: LibraryId,
        want_config: bool,
        interner: &Interner,
        diags: &mut Diagnostics,
        range: SourceRange,
    ) -> Option<LookupResult> {
        match self.find_in_library(cell, lib) {
            Some(found) => {
                if want_config && !matches!(found, LookupResult::Config(_)) {
                    diags.report(
                        DiagCode::NotAConfig,
                        range,
                        format!("'{}' is not a configuration", interner.resolve(cell)),
                    );
                    return None;
                }
                Some(found)
            }
            None => {
                diags.report(
                    DiagCode::UnknownModule,
                    range,
                    format!("unknown module '{}'", interner.resolve(cell)),
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceRange;

    fn make_def(name: NameId, library: LibraryId) -> Definition {
        Definition {
            kind: DesignKind::Module,
            name,
            library,
            syntax: DesignUnitSyntax {
                kind: DesignKind::Module,
                name,
                range: SourceRange::default(),
                param_ports: Vec::new(),
                ports: Vec::new(),
                members: Vec::new(),
                timescale: None,
            },
            default_net_type: "wire",
            timescale: None,
        }
    }

    #[test]
    fn earliest_library_in_search_order_wins() {
        let mut interner = Interner::new();
        let mut libs = LibraryRegistry::new(&mut interner);
        let lib1 = libs.register(interner.intern("lib1"));
        let lib2 = libs.register(interner.intern("lib2"));
        let mut diags = Diagnostics::new();
        let mut registry = DefinitionRegistry::new();
        let name = interner.intern("mod");
        let in_lib1 = registry.add_definition(make_def(name, lib1), &interner, &mut diags);
        let in_lib2 = registry.add_definition(make_def(name, lib2), &interner, &mut diags);

        let found = registry
            .get_definition(name, LookupContext::default(), &libs, &interner, &mut diags, SourceRange::default())
            .expect("resolves");
        assert_eq!(found, LookupResult::Def(in_lib1));

        // identical queries return identical results: the registry is pure
        let again = registry
            .get_definition(name, LookupContext::default(), &libs, &interner, &mut diags, SourceRange::default())
            .expect("resolves");
        assert_eq!(found, again);

        libs.set_search_order(&[lib2, lib1]);
        let found = registry
            .get_definition(name, LookupContext::default(), &libs, &interner, &mut diags, SourceRange::default())
            .expect("resolves");
        assert_eq!(found, LookupResult::Def(in_lib2));
        assert!(diags.is_empty());
    }

    #[test]
    fn unknown_library_and_unknown_module() {
        let mut interner = Interner::new();
        let libs = LibraryRegistry::new(&mut interner);
        let mut diags = Diagnostics::new();
        let registry = DefinitionRegistry::new();
        let name = interner.intern("mod");
        let ghost = interner.intern("ghost");

        let ctx = LookupContext {
            explicit_lib: Some(ghost),
            ..LookupContext::default()
        };
        assert!(registry.get_definition(name, ctx, &libs, &interner, &mut diags, SourceRange::new(1, 2)).is_none());
        assert!(diags.contains(DiagCode::UnknownLibrary));

        assert!(registry
            .get_definition(name, LookupContext::default(), &libs, &interner, &mut diags, SourceRange::new(3, 4))
            .is_none());
        assert!(diags.contains(DiagCode::UnknownModule));
    }
}
