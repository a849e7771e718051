//! Configuration blocks: parsed `config ... endconfig` units lowered into a
//! resolvable model.
//!
//! A config carries top cells, a default liblist, per-cell overrides, and a
//! trie of per-instance overrides keyed by hierarchical path (first the top
//! module name, then each path segment). Rules for the same path merge
//! component-wise: liblist, use-cell, and parameter overrides are orthogonal
//! slots, and a second rule touching an occupied slot is a
//! `ConflictingConfigRule` error with the first rule winning.

use std::cell::Cell;

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::{
    diag::{DiagCode, Diagnostics},
    intern::{Interner, NameId},
    library::{LibraryId, LibraryRegistry},
    source::SourceRange,
    syntax::{ConfigCellSyntax, ConfigRuleSyntax, ConfigSyntax, NamedParamSyntax, ParamDeclSyntax},
};

/// Longest accepted `instance` override path, in segments.
///
/// The trie is as deep as the longest rule path and is walked recursively
/// when dangling paths are reported, so the depth must stay bounded no
/// matter what the source says.
const MAX_INSTANCE_PATH_SEGMENTS: usize = 128;

/// Handle to a lowered config block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct ConfigId(pub(crate) u32);

impl ConfigId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// `[lib.]cell[:config]`: the target of a `design` entry or `use` clause.
#[derive(Debug, Clone, Copy)]
pub struct ConfigCellId {
    pub library: Option<LibraryId>,
    pub cell: NameId,
    pub target_config: bool,
    pub range: SourceRange,
}

/// The payload of one `cell`/`instance`/`default` rule.
#[derive(Debug, Default)]
pub struct ConfigRule {
    pub use_cell: Option<ConfigCellId>,
    pub liblist: Option<SmallVec<[LibraryId; 4]>>,
    pub param_overrides: Vec<NamedParamSyntax>,
    pub range: SourceRange,
}

impl ConfigRule {
    /// Merges `other` into `self` component-wise.
    ///
    /// Returns `false` when `other` collides with an occupied slot; the
    /// existing value is kept in that case.
    fn merge(&mut self, other: ConfigRule) -> bool {
        let mut clean = true;
        match (&self.liblist, other.liblist) {
            (None, Some(libs)) => self.liblist = Some(libs),
            (Some(_), Some(_)) => clean = false,
            _ => {}
        }
        match (&self.use_cell, other.use_cell) {
            (None, Some(cell)) => self.use_cell = Some(cell),
            (Some(_), Some(_)) => clean = false,
            _ => {}
        }
        if !other.param_overrides.is_empty() {
            if self.param_overrides.is_empty() {
                self.param_overrides = other.param_overrides;
            } else {
                clean = false;
            }
        }
        clean
    }
}

/// A `cell` rule, optionally restricted to cells found in a specific library.
#[derive(Debug)]
pub struct CellOverride {
    pub specific_lib: Option<LibraryId>,
    pub rule: ConfigRule,
}

/// One node of the per-instance override trie.
///
/// `visited` is flipped during elaboration so dangling paths can be reported
/// afterwards; it is interior-mutable because the trie is shared immutably
/// through `ResolvedConfig` while the symbol arena is being built.
#[derive(Debug, Default)]
pub struct InstanceOverrideNode {
    pub rule: Option<ConfigRule>,
    pub children: AHashMap<NameId, InstanceOverrideNode>,
    visited: Cell<bool>,
}

impl InstanceOverrideNode {
    /// Walks one path segment down.
    #[must_use]
    pub fn child(&self, name: NameId) -> Option<&InstanceOverrideNode> {
        self.children.get(&name)
    }

    pub fn mark_visited(&self) {
        self.visited.set(true);
    }

    fn collect_unvisited(&self, diags: &mut Diagnostics) {
        if !self.visited.get() {
            if let Some(rule) = &self.rule {
                diags.report(
                    DiagCode::InvalidInstancePath,
                    rule.range,
                    "instance override path does not match any elaborated position",
                );
            }
        }
        for node in self.children.values() {
            node.collect_unvisited(diags);
        }
    }
}

/// A lowered configuration.
#[derive(Debug)]
pub struct ConfigBlock {
    pub name: NameId,
    pub library: LibraryId,
    pub range: SourceRange,
    pub top_cells: Vec<ConfigCellId>,
    pub default_liblist: Option<SmallVec<[LibraryId; 4]>>,
    pub cell_overrides: AHashMap<NameId, Vec<CellOverride>>,
    /// Roots keyed by top-cell name; deeper levels by instance name.
    pub instance_overrides: AHashMap<NameId, InstanceOverrideNode>,
    pub localparams: Vec<ParamDeclSyntax>,
}

impl ConfigBlock {
    /// Lowers parsed config syntax, registering referenced libraries.
    pub fn from_syntax(
        syntax: ConfigSyntax,
        library: LibraryId,
        libs: &mut LibraryRegistry,
        interner: &Interner,
        diags: &mut Diagnostics,
    ) -> Self {
        let mut block = Self {
            name: syntax.name,
            library,
            range: syntax.range,
            top_cells: Vec::new(),
            default_liblist: None,
            cell_overrides: AHashMap::default(),
            instance_overrides: AHashMap::default(),
            localparams: syntax.localparams,
        };
        for cell in syntax.design {
            // empty cell names are dropped during normalisation
            if interner.resolve(cell.cell).is_empty() {
                continue;
            }
            block.top_cells.push(lower_cell(&cell, libs));
        }
        for rule in syntax.rules {
            match rule {
                ConfigRuleSyntax::DefaultLiblist { libs: names, range } => {
                    let list = names.iter().map(|&n| libs.register(n)).collect();
                    if block.default_liblist.is_some() {
                        diags.report(DiagCode::ConflictingConfigRule, range, "default liblist given twice");
                    } else {
                        block.default_liblist = Some(list);
                    }
                }
                ConfigRuleSyntax::Cell { library: lib_name, cell, body } => {
                    let specific_lib = lib_name.map(|n| libs.register(n));
                    let rule = lower_rule_body(body, libs);
                    block.cell_overrides.entry(cell).or_default().push(CellOverride { specific_lib, rule });
                }
                ConfigRuleSyntax::Instance { path, body } => {
                    let rule = lower_rule_body(body, libs);
                    block.add_instance_rule(&path, rule, diags);
                }
            }
        }
        block
    }

    fn add_instance_rule(&mut self, path: &[NameId], rule: ConfigRule, diags: &mut Diagnostics) {
        if path.len() > MAX_INSTANCE_PATH_SEGMENTS {
            diags.report(
                DiagCode::MaxInstanceDepthExceeded,
                rule.range,
                format!(
                    "instance override path has {} segments, more than the supported {MAX_INSTANCE_PATH_SEGMENTS}",
                    path.len()
                ),
            );
            return;
        }
        let Some((&root, rest)) = path.split_first() else {
            return;
        };
        let mut node = self.instance_overrides.entry(root).or_default();
        for &segment in rest {
            node = node.children.entry(segment).or_default();
        }
        match &mut node.rule {
            None => node.rule = Some(rule),
            Some(existing) => {
                if !existing.merge(rule) {
                    diags.report(
                        DiagCode::ConflictingConfigRule,
                        existing.range,
                        "conflicting instance override rules for the same hierarchical path",
                    );
                }
            }
        }
    }

    /// Looks up a per-instance rule for a path rooted at a top-cell name.
    /// Marks every node on the way as visited.
    #[must_use]
    pub fn instance_rule(&self, path: &[NameId]) -> Option<&ConfigRule> {
        let (&root, rest) = path.split_first()?;
        let mut node = self.instance_overrides.get(&root)?;
        node.mark_visited();
        for &segment in rest {
            node = node.child(segment)?;
            node.mark_visited();
        }
        node.rule.as_ref()
    }

    /// True if any override exists below `path` (used to decide whether
    /// sibling instances need individual handling).
    #[must_use]
    pub fn has_overrides_below(&self, path: &[NameId]) -> bool {
        let Some((&root, rest)) = path.split_first() else {
            return !self.instance_overrides.is_empty();
        };
        let Some(mut node) = self.instance_overrides.get(&root) else {
            return false;
        };
        for &segment in rest {
            match node.child(segment) {
                Some(child) => node = child,
                None => return false,
            }
        }
        node.rule.is_some() || !node.children.is_empty()
    }

    /// Reports `InvalidInstancePath` for every rule node that elaboration
    /// never reached.
    pub fn report_dangling_paths(&self, diags: &mut Diagnostics) {
        for node in self.instance_overrides.values() {
            node.collect_unvisited(diags);
        }
    }

    /// Picks the cell override that applies to `cell`, preferring a
    /// library-specific rule matching `explicit_lib` and falling back to the
    /// unqualified one.
    #[must_use]
    pub fn cell_rule(&self, cell: NameId, explicit_lib: Option<LibraryId>) -> Option<&ConfigRule> {
        let overrides = self.cell_overrides.get(&cell)?;
        if let Some(lib) = explicit_lib {
            if let Some(found) = overrides.iter().find(|o| o.specific_lib == Some(lib)) {
                return Some(&found.rule);
            }
        }
        overrides
            .iter()
            .find(|o| o.specific_lib.is_none())
            .or_else(|| overrides.first())
            .map(|o| &o.rule)
    }
}

fn lower_cell(cell: &ConfigCellSyntax, libs: &mut LibraryRegistry) -> ConfigCellId {
    ConfigCellId {
        library: cell.library.map(|n| libs.register(n)),
        cell: cell.cell,
        target_config: cell.target_config,
        range: cell.range,
    }
}

fn lower_rule_body(body: crate::syntax::ConfigRuleBody, libs: &mut LibraryRegistry) -> ConfigRule {
    ConfigRule {
        use_cell: body.use_cell.map(|c| lower_cell(&c, libs)),
        liblist: body.liblist.map(|names| names.iter().map(|&n| libs.register(n)).collect()),
        param_overrides: body.param_overrides,
        range: body.range,
    }
}

/// Per-traversal configuration context, inherited by child instances.
///
/// `path` tracks the position under the config's root (starting with the top
/// cell name) so per-instance rules can be found without back-pointers into
/// the trie.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: ConfigId,
    /// Effective inherited liblist (a rule's liblist or the default).
    pub liblist: Option<SmallVec<[LibraryId; 4]>>,
    pub path: Vec<NameId>,
}

impl ResolvedConfig {
    /// Context for a child instance named `name`, keeping the same config.
    #[must_use]
    pub fn descend(&self, name: NameId) -> Self {
        let mut path = self.path.clone();
        path.push(name);
        Self {
            config: self.config,
            liblist: self.liblist.clone(),
            path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{library::LibraryRegistry, syntax::SyntaxIdAllocator};

    fn lower(text: &str) -> (ConfigBlock, Diagnostics, Interner, LibraryRegistry) {
        let mut interner = Interner::new();
        let mut ids = SyntaxIdAllocator::default();
        let mut diags = Diagnostics::new();
        let units = crate::parse::parse_source(
            text,
            0,
            &mut crate::parse::ParseContext {
                interner: &mut interner,
                ids: &mut ids,
                diags: &mut diags,
                bare_param_assignment: false,
            },
        );
        let mut libs = LibraryRegistry::new(&mut interner);
        let crate::syntax::UnitSyntax::Config(syntax) = units.into_iter().next().expect("one unit") else {
            panic!("expected config");
        };
        let block = ConfigBlock::from_syntax(syntax, crate::library::DEFAULT_LIB, &mut libs, &interner, &mut diags);
        (block, diags, interner, libs)
    }

    #[test]
    fn orthogonal_slots_merge() {
        let (block, diags, interner, _) = lower(
            "config cfg;\n design top;\n instance top.a liblist lib1;\n instance top.a use mod2;\nendconfig\n",
        );
        assert!(diags.is_empty(), "{:?}", diags.all());
        let top = interner.get("top").unwrap();
        let a = interner.get("a").unwrap();
        let rule = block.instance_rule(&[top, a]).expect("merged rule");
        assert!(rule.liblist.is_some());
        assert!(rule.use_cell.is_some());
    }

    #[test]
    fn same_slot_conflict_reports_and_keeps_first() {
        let (block, diags, interner, _) = lower(
            "config cfg;\n design top;\n instance top.a use mod1;\n instance top.a use mod2;\nendconfig\n",
        );
        assert!(diags.contains(DiagCode::ConflictingConfigRule));
        let top = interner.get("top").unwrap();
        let a = interner.get("a").unwrap();
        let rule = block.instance_rule(&[top, a]).expect("rule survives");
        let cell = rule.use_cell.expect("use cell");
        assert_eq!(interner.resolve(cell.cell), "mod1");
    }

    #[test]
    fn overlong_instance_path_is_capped() {
        let mut interner = Interner::new();
        let mut diags = Diagnostics::new();
        let mut block = ConfigBlock {
            name: interner.intern("cfg"),
            library: crate::library::DEFAULT_LIB,
            range: SourceRange::default(),
            top_cells: Vec::new(),
            default_liblist: None,
            cell_overrides: AHashMap::default(),
            instance_overrides: AHashMap::default(),
            localparams: Vec::new(),
        };
        let path: Vec<_> = (0..200).map(|i| interner.intern(&format!("s{i}"))).collect();
        block.add_instance_rule(&path, ConfigRule::default(), &mut diags);
        assert!(diags.contains(DiagCode::MaxInstanceDepthExceeded));
        // the rule is dropped, so the later dangling-path walk stays shallow
        assert!(block.instance_rule(&path).is_none());
        block.report_dangling_paths(&mut diags);
    }

    #[test]
    fn dangling_paths_report_after_traversal() {
        let (block, mut diags, interner, _) = lower(
            "config cfg;\n design top;\n instance top.a.b use mod1;\n instance top.c use mod2;\nendconfig\n",
        );
        let top = interner.get("top").unwrap();
        let c = interner.get("c").unwrap();
        // only top.c was reached during (simulated) elaboration
        let _ = block.instance_rule(&[top, c]);
        block.report_dangling_paths(&mut diags);
        assert!(diags.contains(DiagCode::InvalidInstancePath));
        assert!(!diags.has_errors());
    }

    #[test]
    fn cell_rule_prefers_matching_library() {
        let mut interner = Interner::new();
        let mut libs = LibraryRegistry::new(&mut interner);
        let lib1 = libs.register(interner.intern("lib1"));
        let mem = interner.intern("mem");
        let mut block = ConfigBlock {
            name: interner.intern("cfg"),
            library: crate::library::DEFAULT_LIB,
            range: SourceRange::default(),
            top_cells: Vec::new(),
            default_liblist: None,
            cell_overrides: AHashMap::default(),
            instance_overrides: AHashMap::default(),
            localparams: Vec::new(),
        };
        block.cell_overrides.insert(
            mem,
            vec![
                CellOverride {
                    specific_lib: Some(lib1),
                    rule: ConfigRule {
                        liblist: Some(SmallVec::from_slice(&[lib1])),
                        ..ConfigRule::default()
                    },
                },
                CellOverride {
                    specific_lib: None,
                    rule: ConfigRule::default(),
                },
            ],
        );
        let picked = block.cell_rule(mem, Some(lib1)).expect("rule");
        assert!(picked.liblist.is_some());
        let picked = block.cell_rule(mem, None).expect("rule");
        assert!(picked.liblist.is_none());
    }
}
