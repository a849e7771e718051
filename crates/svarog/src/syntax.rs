//! The parsed-tree data model consumed by the elaboration core.
//!
//! These types are what the parser lowers source text into: design-unit
//! headers, body members, configuration blocks, and the small expression
//! language used for parameter values and dimension ranges. The elaborator
//! never looks at source text again once these exist.

use num_bigint::BigInt;
use smallvec::SmallVec;

use crate::{intern::NameId, source::SourceRange};

/// Identity of a syntactic occurrence.
///
/// Hierarchy overrides are dual-keyed: a defparam may target a specific
/// syntactic instance or an unambiguous name. `SyntaxId` is the former key;
/// it is assigned once at parse time and never reused within a compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SyntaxId(u32);

/// Hands out `SyntaxId`s during parsing.
#[derive(Debug, Default)]
pub struct SyntaxIdAllocator {
    next: u32,
}

impl SyntaxIdAllocator {
    pub fn allocate(&mut self) -> SyntaxId {
        let id = SyntaxId(self.next);
        self.next += 1;
        id
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LogAnd,
    LogOr,
}

/// Constant-expression subset: literals, names, arithmetic, comparison.
#[derive(Debug, Clone)]
pub enum Expr {
    Int(i64),
    /// Integer literal wider than `i64` (based literals can be arbitrary width).
    Big(BigInt),
    Real(f64),
    Str(Box<str>),
    Ident(NameId),
    /// Dotted name, e.g. a defparam value referencing `pkg.param` or a
    /// hierarchical reference inside a port expression.
    Hier(Vec<NameId>),
    Unary(UnaryOp, Box<ExprNode>),
    Binary(BinOp, Box<ExprNode>, Box<ExprNode>),
}

/// Expression plus its source range.
#[derive(Debug, Clone)]
pub struct ExprNode {
    pub expr: Expr,
    pub range: SourceRange,
}

/// A dimension range: `[left:right]` or the count shorthand `[n]`.
#[derive(Debug, Clone)]
pub struct RangeSyntax {
    pub left: ExprNode,
    pub right: Option<ExprNode>,
    pub range: SourceRange,
}

// ---------------------------------------------------------------------------
// Design units
// ---------------------------------------------------------------------------

/// Kinds of non-config design units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr, serde::Serialize)]
#[strum(serialize_all = "lowercase")]
pub enum DesignKind {
    Module,
    Interface,
    Program,
    Package,
    Primitive,
    Checker,
}

/// Built-in gate types, dispatched by instantiation type name.
///
/// `and`/`or`/`nand`/`nor`/`xor`/`xnor` take one output and N >= 2 inputs;
/// `buf`/`not` take N >= 1 outputs and exactly one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::IntoStaticStr, serde::Serialize)]
#[strum(serialize_all = "lowercase")]
pub enum GateKind {
    And,
    Or,
    Nand,
    Nor,
    Xor,
    Xnor,
    Buf,
    Not,
}

impl GateKind {
    /// Minimum number of terminals a gate of this kind accepts.
    #[must_use]
    pub fn min_terminals(self) -> usize {
        match self {
            // one output + at least two inputs
            Self::And | Self::Or | Self::Nand | Self::Nor | Self::Xor | Self::Xnor => 3,
            // at least one output + one input
            Self::Buf | Self::Not => 2,
        }
    }
}

/// A parsed module/interface/program/package/primitive/checker.
#[derive(Debug)]
pub struct DesignUnitSyntax {
    pub kind: DesignKind,
    pub name: NameId,
    pub range: SourceRange,
    /// Parameter ports from the `#(...)` header, in declaration order.
    pub param_ports: Vec<ParamDeclSyntax>,
    pub ports: Vec<PortDeclSyntax>,
    pub members: Vec<MemberSyntax>,
    pub timescale: Option<Box<str>>,
}

/// A parameter declaration, either a parameter port or a body member.
#[derive(Debug, Clone)]
pub struct ParamDeclSyntax {
    pub name: NameId,
    pub is_type: bool,
    pub is_local: bool,
    pub is_port: bool,
    pub default: Option<ExprNode>,
    pub range: SourceRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, serde::Serialize)]
#[strum(serialize_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
    Inout,
    Ref,
}

/// An ANSI port declaration.
#[derive(Debug, Clone)]
pub struct PortDeclSyntax {
    pub name: NameId,
    pub direction: PortDirection,
    /// Interface-typed port: the interface definition name.
    pub iface: Option<NameId>,
    /// Modport restriction on an interface port (`iface.modport name`).
    pub modport: Option<NameId>,
    /// Default value, taken when a `.*` connection finds nothing by name.
    pub default: Option<ExprNode>,
    pub range: SourceRange,
}

// ---------------------------------------------------------------------------
// Body members
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum MemberSyntax {
    Param(ParamDeclSyntax),
    Net(NetDeclSyntax),
    Instantiation(InstantiationSyntax),
    Defparam(DefparamSyntax),
    Bind(BindSyntax),
    GenerateIf(GenerateIfSyntax),
    Block(BlockSyntax),
    Procedure(ProcedureSyntax),
    Import(ImportSyntax),
    Export(ExportSyntax),
}

/// `wire a, b;` / `logic x;`: names that already exist in the scope, so
/// port expressions referencing them do not create implicit nets.
#[derive(Debug)]
pub struct NetDeclSyntax {
    pub names: Vec<NameId>,
    pub range: SourceRange,
}

/// One instantiation statement: a type name, parameter assignments, and one
/// or more named instances sharing them.
#[derive(Debug)]
pub struct InstantiationSyntax {
    /// Explicit library qualifier (`lib.cell inst();`), bypassing the liblist.
    pub library: Option<NameId>,
    pub type_name: NameId,
    pub type_range: SourceRange,
    pub params: ParamAssignmentsSyntax,
    pub instances: Vec<HierInstanceSyntax>,
    pub range: SourceRange,
}

/// Parameter value assignments from `#(...)` at an instantiation site.
#[derive(Debug, Default)]
pub struct ParamAssignmentsSyntax {
    pub ordered: Vec<ExprNode>,
    pub named: Vec<NamedParamSyntax>,
}

#[derive(Debug)]
pub struct NamedParamSyntax {
    pub name: NameId,
    /// `None` for an explicitly empty `.P()`.
    pub value: Option<ExprNode>,
    pub range: SourceRange,
}

/// One named instance within an instantiation statement.
#[derive(Debug)]
pub struct HierInstanceSyntax {
    pub id: SyntaxId,
    pub name: NameId,
    pub dims: SmallVec<[RangeSyntax; 2]>,
    pub connections: Vec<PortConnSyntax>,
    pub range: SourceRange,
}

#[derive(Debug)]
pub enum PortConnSyntax {
    /// Positional connection; `None` for an empty slot in the list.
    Ordered(Option<ExprNode>, SourceRange),
    /// `.name(expr)`, `.name()` (explicitly unconnected), or `.name` shorthand.
    Named {
        name: NameId,
        expr: Option<ExprNode>,
        /// Distinguishes `.name()` (empty parens, unconnected) from the
        /// `.name` shorthand (connect to same-named net in scope).
        has_parens: bool,
        range: SourceRange,
    },
    /// `.*`: implicit named lookup of every remaining port.
    Wildcard(SourceRange),
}

/// `defparam a.b.P = value;`
#[derive(Debug)]
pub struct DefparamSyntax {
    pub path: Vec<NameId>,
    pub value: ExprNode,
    pub range: SourceRange,
}

/// `bind target mod inst(...);` where target is a definition name or a
/// hierarchical instance path.
#[derive(Debug)]
pub struct BindSyntax {
    pub target: Vec<NameId>,
    pub inst: InstantiationSyntax,
    pub range: SourceRange,
}

/// `if (COND) begin ... end else begin ... end` at generate level with a
/// constant condition. The untaken arm's members become uninstantiated
/// placeholders.
#[derive(Debug)]
pub struct GenerateIfSyntax {
    pub cond: ExprNode,
    pub then_members: Vec<MemberSyntax>,
    pub else_members: Vec<MemberSyntax>,
    pub range: SourceRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// `begin ... end`
    Sequential,
    /// `fork ... join` (and variants)
    ForkJoin,
}

#[derive(Debug)]
pub struct BlockSyntax {
    pub kind: BlockKind,
    pub members: Vec<MemberSyntax>,
    pub range: SourceRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
pub enum ProcedureKind {
    #[strum(serialize = "always")]
    Always,
    #[strum(serialize = "always_comb")]
    AlwaysComb,
    #[strum(serialize = "always_ff")]
    AlwaysFf,
    #[strum(serialize = "always_latch")]
    AlwaysLatch,
    #[strum(serialize = "initial")]
    Initial,
    #[strum(serialize = "final")]
    Final,
}

#[derive(Debug)]
pub struct ProcedureSyntax {
    pub kind: ProcedureKind,
    pub stmts: Vec<StmtSyntax>,
    pub range: SourceRange,
}

/// Procedural statements, kept only as deep as the checker rules need.
#[derive(Debug)]
pub enum StmtSyntax {
    /// `lhs = rhs;`
    BlockingAssign(SourceRange),
    /// `lhs <= rhs;`
    NonblockingAssign(SourceRange),
    Block {
        kind: BlockKind,
        stmts: Vec<StmtSyntax>,
        range: SourceRange,
    },
    /// Checker (or other) instantiation in statement position.
    Instantiation(InstantiationSyntax),
    /// Anything else the parser skipped over.
    Other(SourceRange),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportItem {
    Wildcard,
    Name(NameId),
}

/// `import P::*;` / `import P::name;`
#[derive(Debug)]
pub struct ImportSyntax {
    pub package: NameId,
    pub item: ImportItem,
    pub range: SourceRange,
}

/// `export *::*;` / `export P::*;` / `export P::name;`
#[derive(Debug)]
pub struct ExportSyntax {
    /// `None` means `*`: re-export everything imported into this package.
    pub package: Option<NameId>,
    pub item: ImportItem,
    pub range: SourceRange,
}

// ---------------------------------------------------------------------------
// Configurations
// ---------------------------------------------------------------------------

/// `[lib.]cell` with an optional `: config` suffix.
#[derive(Debug, Clone, Copy)]
pub struct ConfigCellSyntax {
    pub library: Option<NameId>,
    pub cell: NameId,
    pub target_config: bool,
    pub range: SourceRange,
}

/// The `use`/`liblist` payload of a `cell`/`instance`/`default` rule.
#[derive(Debug, Default)]
pub struct ConfigRuleBody {
    pub liblist: Option<Vec<NameId>>,
    pub use_cell: Option<ConfigCellSyntax>,
    pub param_overrides: Vec<NamedParamSyntax>,
    pub range: SourceRange,
}

#[derive(Debug)]
pub enum ConfigRuleSyntax {
    DefaultLiblist { libs: Vec<NameId>, range: SourceRange },
    Cell { library: Option<NameId>, cell: NameId, body: ConfigRuleBody },
    Instance { path: Vec<NameId>, body: ConfigRuleBody },
}

/// `config name; design ...; <rules> endconfig`
#[derive(Debug)]
pub struct ConfigSyntax {
    pub name: NameId,
    pub range: SourceRange,
    pub design: Vec<ConfigCellSyntax>,
    pub rules: Vec<ConfigRuleSyntax>,
    pub localparams: Vec<ParamDeclSyntax>,
}

/// Everything parsed out of one source file.
#[derive(Debug)]
pub enum UnitSyntax {
    Design(DesignUnitSyntax),
    Config(ConfigSyntax),
}
