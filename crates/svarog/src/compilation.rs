//! The public compilation object: owns every arena, drives parsing and
//! elaboration, and exposes the elaborated tree to callers.

use serde_json::{Map, Value, json};

use crate::{
    config::ConfigBlock,
    diag::Diagnostics,
    intern::{Interner, NameId},
    library::{DEFAULT_LIB, LibraryId, LibraryRegistry},
    overrides::{BindDirective, HierarchyOverrideGraph},
    packages::PackageTable,
    parse::{ParseContext, parse_source},
    registry::{Definition, DefinitionId, DefinitionRegistry},
    source::SourceMap,
    symbol::{BodyId, InstanceBody, Symbol, SymbolArena, SymbolId},
    syntax::{DesignKind, DesignUnitSyntax, MemberSyntax, SyntaxIdAllocator, UnitSyntax},
    tracer::{ElabTracer, NoopTracer},
    value::ConstantValue,
};

/// Hard caps on elaboration; exceeding one truncates that branch with a
/// diagnostic while other branches continue.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Widest allowed instance-array dimension.
    pub max_instance_array: u32,
    /// Deepest allowed checker-in-checker chain.
    pub max_checker_instance_depth: u32,
    /// Deepest allowed instance hierarchy.
    pub max_hierarchy_depth: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_instance_array: 65_535,
            max_checker_instance_depth: 1024,
            max_hierarchy_depth: 128,
        }
    }
}

/// User-facing knobs for one compilation.
#[derive(Debug, Clone, Default)]
pub struct CompilationOptions {
    /// Explicit top list: `name`, `lib.name`, `name:config`, `lib.name:config`.
    /// Empty means implicit-top detection.
    pub tops: Vec<String>,
    pub limits: Limits,
    /// Auto-instantiate interface definitions for top-level interface ports.
    pub allow_toplevel_iface_ports: bool,
    /// Accept `#value` without parentheses as a parameter assignment.
    pub allow_bare_val_param_assignment: bool,
}

/// One compilation: sources in, elaborated tree and diagnostics out.
///
/// The compilation owns the arena that holds all definitions, instances,
/// bodies, and override nodes; everything else refers into it by id.
pub struct Compilation {
    options: CompilationOptions,
    interner: Interner,
    sources: SourceMap,
    libs: LibraryRegistry,
    registry: DefinitionRegistry,
    ids: SyntaxIdAllocator,
    binds: Vec<BindDirective>,
    overrides: HierarchyOverrideGraph,
    arena: SymbolArena,
    packages: PackageTable,
    diags: Diagnostics,
    tracer: Box<dyn ElabTracer>,
    std_package: Option<DefinitionId>,
    elaborated: bool,
}

impl Compilation {
    #[must_use]
    pub fn new(options: CompilationOptions) -> Self {
        let mut interner = Interner::new();
        let libs = LibraryRegistry::new(&mut interner);
        let mut compilation = Self {
            options,
            interner,
            sources: SourceMap::new(),
            libs,
            registry: DefinitionRegistry::new(),
            ids: SyntaxIdAllocator::default(),
            binds: Vec::new(),
            overrides: HierarchyOverrideGraph::new(),
            arena: SymbolArena::new(),
            packages: PackageTable::new(),
            diags: Diagnostics::new(),
            tracer: Box::new(NoopTracer),
            std_package: None,
            elaborated: false,
        };
        compilation.create_std_package();
        compilation
    }

    /// Replaces the tracer (e.g. with `StderrTracer` for `--trace`).
    pub fn set_tracer(&mut self, tracer: Box<dyn ElabTracer>) {
        self.tracer = tracer;
    }

    /// Every compilation carries an (empty) standard package that all bodies
    /// implicitly wildcard-import.
    fn create_std_package(&mut self) {
        let name = self.interner.intern("std");
        let def = Definition {
            kind: DesignKind::Package,
            name,
            library: DEFAULT_LIB,
            syntax: DesignUnitSyntax {
                kind: DesignKind::Package,
                name,
                range: crate::source::SourceRange::default(),
                param_ports: Vec::new(),
                ports: Vec::new(),
                members: Vec::new(),
                timescale: None,
            },
            default_net_type: "wire",
            timescale: None,
        };
        let id = self.registry.add_definition(def, &self.interner, &mut self.diags);
        self.std_package = Some(id);
    }

    /// Registers a library by name, creating it if needed.
    pub fn register_library(&mut self, name: &str) -> LibraryId {
        let name = self.interner.intern(name);
        self.libs.register(name)
    }

    /// Sets the explicit library search order (the `-L` flag).
    pub fn set_search_order(&mut self, names: &[&str]) {
        let order: Vec<LibraryId> = names.iter().map(|n| self.register_library(n)).collect();
        self.libs.set_search_order(&order);
    }

    /// Parses `text` into the default library.
    pub fn add_source(&mut self, file_name: &str, text: &str) {
        self.add_to_library(DEFAULT_LIB, file_name, text);
    }

    /// Parses `text` into the named library.
    pub fn add_source_to_library(&mut self, library: &str, file_name: &str, text: &str) {
        let library = self.register_library(library);
        self.add_to_library(library, file_name, text);
    }

    fn add_to_library(&mut self, library: LibraryId, file_name: &str, text: &str) {
        assert!(!self.elaborated, "sources must be added before elaborate()");
        let base = self.sources.add_file(file_name, text);
        let units = parse_source(
            text,
            base,
            &mut ParseContext {
                interner: &mut self.interner,
                ids: &mut self.ids,
                diags: &mut self.diags,
                bare_param_assignment: self.options.allow_bare_val_param_assignment,
            },
        );
        for unit in units {
            match unit {
                UnitSyntax::Design(mut syntax) => {
                    let unit_name = syntax.name;
                    extract_binds(&mut syntax.members, unit_name, &mut self.binds);
                    let timescale = syntax.timescale.clone();
                    let def = Definition {
                        kind: syntax.kind,
                        name: syntax.name,
                        library,
                        syntax,
                        default_net_type: "wire",
                        timescale,
                    };
                    self.registry.add_definition(def, &self.interner, &mut self.diags);
                }
                UnitSyntax::Config(syntax) => {
                    let block = ConfigBlock::from_syntax(syntax, library, &mut self.libs, &self.interner, &mut self.diags);
                    self.registry.add_config(block, &self.interner, &mut self.diags);
                }
            }
        }
    }

    /// Elaborates the design. Idempotent: the tree is built once.
    pub fn elaborate(&mut self) {
        if self.elaborated {
            return;
        }
        self.elaborated = true;
        let mut elaborator = crate::elab::Elaborator {
            registry: &self.registry,
            libs: &self.libs,
            interner: &self.interner,
            options: &self.options,
            arena: &mut self.arena,
            overrides: &mut self.overrides,
            binds: &self.binds,
            packages: &mut self.packages,
            diags: &mut self.diags,
            tracer: self.tracer.as_mut(),
            depth: 0,
            used_configs: Vec::new(),
            std_package: self.std_package,
            bind_in_progress: false,
        };
        elaborator.run();
    }

    // -- inspection ----------------------------------------------------------

    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diags
    }

    /// Renders diagnostics with file/line/column positions.
    #[must_use]
    pub fn render_diagnostics(&self) -> String {
        self.diags.render(&self.sources)
    }

    #[must_use]
    pub fn roots(&self) -> &[SymbolId] {
        self.arena.roots()
    }

    #[must_use]
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        self.arena.symbol(id)
    }

    #[must_use]
    pub fn body(&self, id: BodyId) -> &InstanceBody {
        self.arena.body(id)
    }

    /// Resolves a dotted hierarchical path (`top.b.f1`, `top.m[2]`) to a
    /// symbol in the elaborated tree.
    #[must_use]
    pub fn find_instance(&self, path: &str) -> Option<SymbolId> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let (name, index) = split_index(first);
        let name = self.interner.get(name)?;
        let mut current = self
            .roots()
            .iter()
            .copied()
            .find(|&id| self.arena.symbol(id).name() == Some(name))?;
        if let Some(index) = index {
            current = self.array_element(current, index)?;
        }
        for segment in segments {
            let (name, index) = split_index(segment);
            let name = self.interner.get(name)?;
            let body = self.arena.symbol(current).body()?;
            current = self.arena.member_by_name(body, name)?;
            if let Some(index) = index {
                current = self.array_element(current, index)?;
            }
        }
        Some(current)
    }

    fn array_element(&self, id: SymbolId, index: i64) -> Option<SymbolId> {
        match self.arena.symbol(id) {
            Symbol::InstanceArray(array) => {
                // elements are stored left-bound first
                let (left, right) = array.bounds?;
                let position = if left <= right {
                    usize::try_from((index - left).unsigned_abs()).ok()?
                } else {
                    usize::try_from((left - index).unsigned_abs()).ok()?
                };
                array.elements.get(position).copied()
            }
            _ => None,
        }
    }

    /// The definition an instance resolved to.
    #[must_use]
    pub fn instance_definition(&self, id: SymbolId) -> Option<&Definition> {
        let body = self.arena.symbol(id).body()?;
        Some(self.registry.def(self.arena.body(body).definition))
    }

    /// The definition's name as text; handy in assertions.
    #[must_use]
    pub fn definition_name(&self, id: SymbolId) -> Option<&str> {
        self.instance_definition(id).map(|def| self.interner.resolve(def.name))
    }

    /// The name of the library the instance's definition came from.
    #[must_use]
    pub fn library_name(&self, id: SymbolId) -> Option<&str> {
        self.instance_definition(id)
            .map(|def| self.interner.resolve(self.libs.get(def.library).name))
    }

    /// A resolved parameter value on an instance.
    #[must_use]
    pub fn parameter_value(&self, id: SymbolId, name: &str) -> Option<&ConstantValue> {
        let name = self.interner.get(name)?;
        let body = self.arena.symbol(id).body()?;
        self.arena
            .body(body)
            .parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    /// Resolves a `NameId` to text (for walking the tree manually).
    #[must_use]
    pub fn name_text(&self, name: NameId) -> &str {
        self.interner.resolve(name)
    }

    // -- debug serialization -------------------------------------------------

    /// Renders the elaborated tree as JSON. The schema is a debugging aid,
    /// not a stability commitment.
    #[must_use]
    pub fn dump_json(&self) -> Value {
        let design: Vec<Value> = self.roots().iter().map(|&id| self.symbol_json(id)).collect();
        json!({ "design": design })
    }

    /// [`Self::dump_json`] rendered as a pretty-printed string.
    #[must_use]
    pub fn dump_json_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.dump_json()).expect("tree rendering cannot fail")
    }

    fn symbol_json(&self, id: SymbolId) -> Value {
        match self.arena.symbol(id) {
            Symbol::Instance(inst) => {
                let body = self.arena.body(inst.body);
                let def = self.registry.def(body.definition);
                let mut map = Map::new();
                map.insert("name".into(), self.interner.resolve(inst.name).into());
                map.insert("kind".into(), def.kind.to_string().into());
                map.insert("definition".into(), self.interner.resolve(def.name).into());
                map.insert("library".into(), self.interner.resolve(self.libs.get(def.library).name).into());
                if !inst.array_path.is_empty() {
                    map.insert("arrayPath".into(), inst.array_path.iter().copied().collect::<Vec<i64>>().into());
                }
                if body.uninstantiated {
                    map.insert("uninstantiated".into(), true.into());
                }
                if body.from_bind {
                    map.insert("fromBind".into(), true.into());
                }
                if !body.parameters.is_empty() {
                    let mut params = Map::new();
                    for param in &body.parameters {
                        params.insert(
                            self.interner.resolve(param.name).to_owned(),
                            serde_json::to_value(&param.value).unwrap_or(Value::Null),
                        );
                    }
                    map.insert("parameters".into(), Value::Object(params));
                }
                let members: Vec<Value> = body.members.iter().map(|&m| self.symbol_json(m)).collect();
                if !members.is_empty() {
                    map.insert("members".into(), members.into());
                }
                Value::Object(map)
            }
            Symbol::InstanceArray(array) => {
                let mut map = Map::new();
                if let Some(name) = array.name {
                    map.insert("name".into(), self.interner.resolve(name).into());
                }
                map.insert("kind".into(), "array".into());
                match array.bounds {
                    Some((left, right)) => {
                        map.insert("range".into(), vec![left, right].into());
                    }
                    None => {
                        map.insert("range".into(), Value::Null);
                    }
                }
                let elements: Vec<Value> = array.elements.iter().map(|&e| self.symbol_json(e)).collect();
                map.insert("elements".into(), elements.into());
                Value::Object(map)
            }
            Symbol::Primitive(prim) => json!({
                "name": self.interner.resolve(prim.name),
                "kind": "primitive",
                "gate": prim.gate.map(|g| g.to_string()),
                "terminals": prim.terminal_count,
            }),
            Symbol::Checker(checker) => {
                let body = self.arena.body(checker.body);
                let def = self.registry.def(body.definition);
                let formals: Vec<Value> = checker
                    .formals
                    .iter()
                    .map(|f| {
                        json!({
                            "name": self.interner.resolve(f.name),
                            "actual": f.actual.as_deref(),
                            "output": f.is_output,
                        })
                    })
                    .collect();
                json!({
                    "name": self.interner.resolve(checker.name),
                    "kind": "checker",
                    "definition": self.interner.resolve(def.name),
                    "formals": formals,
                })
            }
            Symbol::Uninstantiated(inst) => json!({
                "name": self.interner.resolve(inst.name),
                "kind": "uninstantiated",
                "type": self.interner.resolve(inst.type_name),
            }),
            Symbol::Net(net) => json!({
                "name": self.interner.resolve(net.name),
                "kind": "net",
                "netType": net.net_type,
                "implicit": net.implicit,
            }),
        }
    }
}

/// Splits `name[3]` into `("name", Some(3))`.
fn split_index(segment: &str) -> (&str, Option<i64>) {
    match segment.find('[') {
        Some(open) if segment.ends_with(']') => {
            let index = segment[open + 1..segment.len() - 1].parse().ok();
            (&segment[..open], index)
        }
        _ => (segment, None),
    }
}

/// Pulls bind directives out of a unit's member tree before the definition
/// becomes immutable; they apply to other scopes, not the one that wrote
/// them.
fn extract_binds(members: &mut Vec<MemberSyntax>, from_unit: NameId, out: &mut Vec<BindDirective>) {
    let mut index = 0;
    while index < members.len() {
        let is_bind = matches!(members[index], MemberSyntax::Bind(_));
        if is_bind {
            let MemberSyntax::Bind(bind) = members.remove(index) else {
                unreachable!("checked by matches!");
            };
            out.push(BindDirective {
                target: bind.target,
                inst: bind.inst,
                from_unit,
                range: bind.range,
            });
        } else {
            match &mut members[index] {
                MemberSyntax::Block(block) => extract_binds(&mut block.members, from_unit, out),
                MemberSyntax::GenerateIf(generate) => {
                    extract_binds(&mut generate.then_members, from_unit, out);
                    extract_binds(&mut generate.else_members, from_unit, out);
                }
                _ => {}
            }
            index += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_index_parses_suffix() {
        assert_eq!(split_index("m"), ("m", None));
        assert_eq!(split_index("m[3]"), ("m", Some(3)));
        assert_eq!(split_index("m[-2]"), ("m", Some(-2)));
    }
}
