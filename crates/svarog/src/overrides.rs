//! The hierarchy override graph: a trie mirroring the instance hierarchy
//! that carries defparam-style parameter overrides and bind directives.
//!
//! Nodes are dual-keyed. A defparam that names a specific syntactic
//! occurrence binds through `children_by_syntax` (with array elements keyed
//! by index below the instance's node); a defparam that names an unambiguous
//! instance binds through `children_by_name`. Instance creation consults the
//! syntax key first, then falls back to the name key.

use ahash::AHashMap;

use crate::{
    intern::NameId,
    source::SourceRange,
    syntax::{ExprNode, InstantiationSyntax, SyntaxId},
};

/// Handle to a node in the override graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverrideNodeId(u32);

impl OverrideNodeId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Syntax-identity key: a specific instantiation occurrence, or an element
/// of an instance array by absolute index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverrideKey {
    Syntax(SyntaxId),
    Index(i64),
}

/// A single parameter value override carried by a node.
#[derive(Debug, Clone)]
pub struct ParamOverride {
    pub target: NameId,
    pub value: ExprNode,
    pub range: SourceRange,
}

/// Index into the compilation's bind-directive table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindId(pub(crate) u32);

impl BindId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A bind directive extracted from a design unit body.
///
/// `target` is either a single definition name (the bind applies to every
/// body of that definition) or a hierarchical instance path rooted at a top
/// instance.
#[derive(Debug)]
pub struct BindDirective {
    pub target: Vec<NameId>,
    pub inst: InstantiationSyntax,
    /// Name of the unit the directive appeared in, for diagnostics.
    pub from_unit: NameId,
    pub range: SourceRange,
}

#[derive(Debug, Default)]
pub struct HierarchyOverrideNode {
    pub params: Vec<ParamOverride>,
    pub binds: Vec<BindId>,
    children_by_syntax: AHashMap<OverrideKey, OverrideNodeId>,
    children_by_name: AHashMap<NameId, OverrideNodeId>,
}

/// Arena of override nodes. Node 0 is the root, whose named children are
/// top-level instances.
#[derive(Debug)]
pub struct HierarchyOverrideGraph {
    nodes: Vec<HierarchyOverrideNode>,
}

impl Default for HierarchyOverrideGraph {
    fn default() -> Self {
        Self {
            nodes: vec![HierarchyOverrideNode::default()],
        }
    }
}

impl HierarchyOverrideGraph {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn root(&self) -> OverrideNodeId {
        OverrideNodeId(0)
    }

    #[must_use]
    pub fn node(&self, id: OverrideNodeId) -> &HierarchyOverrideNode {
        &self.nodes[id.index()]
    }

    /// Child lookup for instance creation: syntax identity first, then name.
    #[must_use]
    pub fn child_for_instance(&self, parent: OverrideNodeId, key: OverrideKey, name: NameId) -> Option<OverrideNodeId> {
        let node = self.node(parent);
        node.children_by_syntax
            .get(&key)
            .or_else(|| node.children_by_name.get(&name))
            .copied()
    }

    #[must_use]
    pub fn child_by_name(&self, parent: OverrideNodeId, name: NameId) -> Option<OverrideNodeId> {
        self.node(parent).children_by_name.get(&name).copied()
    }

    #[must_use]
    pub fn child_by_index(&self, parent: OverrideNodeId, index: i64) -> Option<OverrideNodeId> {
        self.node(parent).children_by_syntax.get(&OverrideKey::Index(index)).copied()
    }

    pub fn get_or_insert_by_name(&mut self, parent: OverrideNodeId, name: NameId) -> OverrideNodeId {
        if let Some(&existing) = self.nodes[parent.index()].children_by_name.get(&name) {
            return existing;
        }
        let id = self.push_node();
        self.nodes[parent.index()].children_by_name.insert(name, id);
        id
    }

    pub fn get_or_insert_by_syntax(&mut self, parent: OverrideNodeId, key: OverrideKey) -> OverrideNodeId {
        if let Some(&existing) = self.nodes[parent.index()].children_by_syntax.get(&key) {
            return existing;
        }
        let id = self.push_node();
        self.nodes[parent.index()].children_by_syntax.insert(key, id);
        id
    }

    /// Descends `path` by name from `start`, creating nodes, and records the
    /// parameter override at the final node. The last path segment is the
    /// parameter name; everything before it is instance path.
    pub fn add_param_override(&mut self, start: OverrideNodeId, path: &[NameId], value: ExprNode, range: SourceRange) {
        debug_assert!(!path.is_empty(), "defparam paths have at least a parameter name");
        let (&param, instance_path) = path.split_last().expect("non-empty path");
        let mut node = start;
        for &segment in instance_path {
            node = self.get_or_insert_by_name(node, segment);
        }
        self.nodes[node.index()].params.push(ParamOverride {
            target: param,
            value,
            range,
        });
    }

    /// Allocates a node that hangs off no parent. Bodies that discover
    /// defparams mid-elaboration use this; their children reach the node
    /// through the body rather than the root trie.
    pub fn insert_detached(&mut self) -> OverrideNodeId {
        self.push_node()
    }

    /// Descends `path` by name from the root and attaches a bind directive.
    pub fn add_bind_at_path(&mut self, path: &[NameId], bind: BindId) {
        let mut node = self.root();
        for &segment in path {
            node = self.get_or_insert_by_name(node, segment);
        }
        self.nodes[node.index()].binds.push(bind);
    }

    fn push_node(&mut self) -> OverrideNodeId {
        let id = OverrideNodeId(u32::try_from(self.nodes.len()).expect("override node count overflow"));
        self.nodes.push(HierarchyOverrideNode::default());
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        intern::Interner,
        syntax::{Expr, SyntaxIdAllocator},
    };

    fn expr(v: i64) -> ExprNode {
        ExprNode {
            expr: Expr::Int(v),
            range: SourceRange::default(),
        }
    }

    #[test]
    fn syntax_key_wins_over_name_key() {
        let mut interner = Interner::new();
        let mut ids = SyntaxIdAllocator::default();
        let mut graph = HierarchyOverrideGraph::new();
        let name = interner.intern("u1");
        let syntax_id = ids.allocate();

        let by_name = graph.get_or_insert_by_name(graph.root(), name);
        let by_syntax = graph.get_or_insert_by_syntax(graph.root(), OverrideKey::Syntax(syntax_id));
        assert_ne!(by_name, by_syntax);

        let found = graph
            .child_for_instance(graph.root(), OverrideKey::Syntax(syntax_id), name)
            .expect("child");
        assert_eq!(found, by_syntax);

        let other = ids.allocate();
        let found = graph
            .child_for_instance(graph.root(), OverrideKey::Syntax(other), name)
            .expect("falls back to name");
        assert_eq!(found, by_name);
    }

    #[test]
    fn param_override_lands_on_final_node() {
        let mut interner = Interner::new();
        let mut graph = HierarchyOverrideGraph::new();
        let a = interner.intern("a");
        let b = interner.intern("b");
        let w = interner.intern("W");
        graph.add_param_override(graph.root(), &[a, b, w], expr(7), SourceRange::default());

        let node_a = graph.child_by_name(graph.root(), a).expect("a");
        let node_b = graph.child_by_name(node_a, b).expect("b");
        let overrides = &graph.node(node_b).params;
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].target, w);
    }
}
