//! Lexer and recursive-descent parser for the language subset the
//! elaboration core consumes.
//!
//! The parser lowers source text straight into the [`crate::syntax`] model:
//! design-unit headers, body members, configuration blocks, and constant
//! expressions. Everything it does not understand inside procedural code is
//! skipped with balanced-block awareness and recorded as an opaque
//! statement, so elaboration-relevant structure survives even in files that
//! use more of the language than the subset covers. Parse failures report
//! `SyntaxError` and recover at the next `;` or closing keyword.

use num_bigint::BigInt;
use num_traits::{Num, ToPrimitive};
use smallvec::SmallVec;
use strum::EnumString;

use crate::{
    diag::{DiagCode, Diagnostics},
    intern::{Interner, NameId},
    source::SourceRange,
    syntax::{
        BinOp, BindSyntax, BlockKind, BlockSyntax, ConfigCellSyntax, ConfigRuleBody, ConfigRuleSyntax, ConfigSyntax,
        DefparamSyntax, DesignKind, DesignUnitSyntax, Expr, ExprNode, GenerateIfSyntax, HierInstanceSyntax, ImportItem,
        ImportSyntax, InstantiationSyntax, MemberSyntax, NamedParamSyntax, NetDeclSyntax, ParamAssignmentsSyntax,
        ParamDeclSyntax, PortConnSyntax, PortDeclSyntax, PortDirection, ProcedureKind, ProcedureSyntax, RangeSyntax,
        StmtSyntax, SyntaxIdAllocator, UnaryOp, UnitSyntax, ExportSyntax,
    },
};

/// Maximum expression/statement/member nesting the parser will follow
/// before reporting an error instead of recursing further.
#[cfg(not(debug_assertions))]
const MAX_NESTING_DEPTH: u32 = 200;
/// Debug builds use a lower limit because stack frames are much larger
/// (no inlining, debug info); the guard must fire before the stack runs out.
#[cfg(debug_assertions)]
const MAX_NESTING_DEPTH: u32 = 64;

/// Keywords the subset understands. Everything else lexes as an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
enum Kw {
    Module,
    Endmodule,
    Interface,
    Endinterface,
    Program,
    Endprogram,
    Package,
    Endpackage,
    Primitive,
    Endprimitive,
    Checker,
    Endchecker,
    Config,
    Endconfig,
    Design,
    Default,
    Liblist,
    Cell,
    Instance,
    Use,
    Parameter,
    Localparam,
    Type,
    Input,
    Output,
    Inout,
    Ref,
    Wire,
    Logic,
    Reg,
    Int,
    Integer,
    Bit,
    Event,
    Property,
    Sequence,
    Defparam,
    Bind,
    Generate,
    Endgenerate,
    Genvar,
    If,
    Else,
    For,
    Begin,
    End,
    Fork,
    Join,
    JoinAny,
    JoinNone,
    Always,
    AlwaysComb,
    AlwaysFf,
    AlwaysLatch,
    Initial,
    Final,
    Import,
    Export,
    Assign,
    Posedge,
    Negedge,
    Table,
    Endtable,
}

impl Kw {
    fn is_unit_end(self) -> bool {
        matches!(
            self,
            Self::Endmodule | Self::Endinterface | Self::Endprogram | Self::Endpackage | Self::Endprimitive | Self::Endchecker | Self::Endconfig
        )
    }

    fn data_type(self) -> bool {
        matches!(
            self,
            Self::Wire | Self::Logic | Self::Reg | Self::Int | Self::Integer | Self::Bit | Self::Event | Self::Property | Self::Sequence | Self::Type
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(NameId),
    Kw(Kw),
    Int(i64),
    Big(BigInt),
    Real(f64),
    Str(Box<str>),
    LParen,
    RParen,
    LBrack,
    RBrack,
    LBrace,
    RBrace,
    Semi,
    Colon,
    ColonColon,
    Comma,
    Dot,
    Hash,
    At,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Shl,
    Shr,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Bang,
    AndAnd,
    OrOr,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Question,
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    range: SourceRange,
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

struct Lexer<'a> {
    bytes: &'a [u8],
    pos: usize,
    base: u32,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str, base: u32) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
            base,
        }
    }

    fn range(&self, start: usize) -> SourceRange {
        SourceRange::new(self.base as usize + start, self.base as usize + self.pos)
    }

    fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek_byte() {
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(b) = self.peek_byte() {
                        self.pos += 1;
                        if b == b'\n' {
                            break;
                        }
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    self.pos += 2;
                    while self.pos < self.bytes.len() {
                        if self.peek_byte() == Some(b'*') && self.peek_at(1) == Some(b'/') {
                            self.pos += 2;
                            break;
                        }
                        self.pos += 1;
                    }
                }
                // `(* attributes *)` are skipped as trivia.
                Some(b'(') if self.peek_at(1) == Some(b'*') => {
                    self.pos += 2;
                    while self.pos < self.bytes.len() {
                        if self.peek_byte() == Some(b'*') && self.peek_at(1) == Some(b')') {
                            self.pos += 2;
                            break;
                        }
                        self.pos += 1;
                    }
                }
                // Compiler directives are line-oriented; the subset ignores them.
                Some(b'`') => {
                    while let Some(b) = self.peek_byte() {
                        self.pos += 1;
                        if b == b'\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_all(mut self, interner: &mut Interner, diags: &mut Diagnostics) -> Vec<Token> {
        let mut out = Vec::new();
        loop {
            self.skip_trivia();
            let start = self.pos;
            let Some(byte) = self.peek_byte() else {
                out.push(Token {
                    tok: Tok::Eof,
                    range: self.range(start),
                });
                return out;
            };
            let tok = match byte {
                b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'$' => {
                    while matches!(self.peek_byte(), Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'$')) {
                        self.pos += 1;
                    }
                    let text = std::str::from_utf8(&self.bytes[start..self.pos]).expect("identifier bytes are ascii");
                    match text.parse::<Kw>() {
                        Ok(kw) => Tok::Kw(kw),
                        Err(_) => Tok::Ident(interner.intern(text)),
                    }
                }
                b'0'..=b'9' | b'\'' => self.lex_number(start, diags),
                b'"' => {
                    self.pos += 1;
                    let mut text = String::new();
                    loop {
                        match self.peek_byte() {
                            None | Some(b'\n') => {
                                diags.report(DiagCode::SyntaxError, self.range(start), "unterminated string literal");
                                break;
                            }
                            Some(b'"') => {
                                self.pos += 1;
                                break;
                            }
                            Some(b'\\') => {
                                self.pos += 1;
                                if let Some(esc) = self.peek_byte() {
                                    self.pos += 1;
                                    text.push(match esc {
                                        b'n' => '\n',
                                        b't' => '\t',
                                        other => other as char,
                                    });
                                }
                            }
                            Some(b) => {
                                self.pos += 1;
                                text.push(b as char);
                            }
                        }
                    }
                    Tok::Str(text.into_boxed_str())
                }
                _ => {
                    self.pos += 1;
                    match byte {
                        b'(' => Tok::LParen,
                        b')' => Tok::RParen,
                        b'[' => Tok::LBrack,
                        b']' => Tok::RBrack,
                        b'{' => Tok::LBrace,
                        b'}' => Tok::RBrace,
                        b';' => Tok::Semi,
                        b',' => Tok::Comma,
                        b'.' => Tok::Dot,
                        b'#' => Tok::Hash,
                        b'@' => Tok::At,
                        b'+' => Tok::Plus,
                        b'-' => Tok::Minus,
                        b'*' => Tok::Star,
                        b'/' => Tok::Slash,
                        b'%' => Tok::Percent,
                        b'?' => Tok::Question,
                        b'~' => Tok::Tilde,
                        b'^' => Tok::Caret,
                        b':' => {
                            if self.peek_byte() == Some(b':') {
                                self.pos += 1;
                                Tok::ColonColon
                            } else {
                                Tok::Colon
                            }
                        }
                        b'=' => {
                            if self.peek_byte() == Some(b'=') {
                                self.pos += 1;
                                Tok::EqEq
                            } else {
                                Tok::Assign
                            }
                        }
                        b'!' => {
                            if self.peek_byte() == Some(b'=') {
                                self.pos += 1;
                                Tok::NotEq
                            } else {
                                Tok::Bang
                            }
                        }
                        b'<' => match self.peek_byte() {
                            Some(b'=') => {
                                self.pos += 1;
                                Tok::Le
                            }
                            Some(b'<') => {
                                self.pos += 1;
                                Tok::Shl
                            }
                            _ => Tok::Lt,
                        },
                        b'>' => match self.peek_byte() {
                            Some(b'=') => {
                                self.pos += 1;
                                Tok::Ge
                            }
                            Some(b'>') => {
                                self.pos += 1;
                                Tok::Shr
                            }
                            _ => Tok::Gt,
                        },
                        b'&' => {
                            if self.peek_byte() == Some(b'&') {
                                self.pos += 1;
                                Tok::AndAnd
                            } else {
                                Tok::Amp
                            }
                        }
                        b'|' => {
                            if self.peek_byte() == Some(b'|') {
                                self.pos += 1;
                                Tok::OrOr
                            } else {
                                Tok::Pipe
                            }
                        }
                        other => {
                            diags.report(
                                DiagCode::SyntaxError,
                                self.range(start),
                                format!("unexpected character `{}`", other as char),
                            );
                            continue;
                        }
                    }
                }
            };
            out.push(Token {
                tok,
                range: self.range(start),
            });
        }
    }

    /// Lexes decimal, real, and based (`8'hFF`, `'b1010`) literals.
    fn lex_number(&mut self, start: usize, diags: &mut Diagnostics) -> Tok {
        while matches!(self.peek_byte(), Some(b'0'..=b'9' | b'_')) {
            self.pos += 1;
        }
        // Real literal: digits '.' digits, with optional exponent.
        if self.peek_byte() == Some(b'.') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
            self.pos += 1;
            while matches!(self.peek_byte(), Some(b'0'..=b'9' | b'_')) {
                self.pos += 1;
            }
            if matches!(self.peek_byte(), Some(b'e' | b'E')) {
                self.pos += 1;
                if matches!(self.peek_byte(), Some(b'+' | b'-')) {
                    self.pos += 1;
                }
                while matches!(self.peek_byte(), Some(b'0'..=b'9')) {
                    self.pos += 1;
                }
            }
            let text: String = std::str::from_utf8(&self.bytes[start..self.pos])
                .expect("number bytes are ascii")
                .replace('_', "");
            return match text.parse::<f64>() {
                Ok(v) => Tok::Real(v),
                Err(_) => {
                    diags.report(DiagCode::SyntaxError, self.range(start), format!("bad real literal `{text}`"));
                    Tok::Real(0.0)
                }
            };
        }
        // Based literal: [size] ' [s] base digits
        if self.peek_byte() == Some(b'\'') {
            self.pos += 1;
            if matches!(self.peek_byte(), Some(b's' | b'S')) {
                self.pos += 1;
            }
            let radix = match self.peek_byte() {
                Some(b'h' | b'H') => 16,
                Some(b'd' | b'D') => 10,
                Some(b'o' | b'O') => 8,
                Some(b'b' | b'B') => 2,
                _ => {
                    diags.report(DiagCode::SyntaxError, self.range(start), "missing base after `'`");
                    return Tok::Int(0);
                }
            };
            self.pos += 1;
            let digits_start = self.pos;
            while matches!(self.peek_byte(), Some(b'0'..=b'9' | b'a'..=b'f' | b'A'..=b'F' | b'x' | b'X' | b'z' | b'Z' | b'_' | b'?')) {
                self.pos += 1;
            }
            let digits: String = std::str::from_utf8(&self.bytes[digits_start..self.pos])
                .expect("number bytes are ascii")
                .chars()
                .filter(|c| *c != '_')
                // Unknown/high-impedance digits collapse to zero at elaboration.
                .map(|c| if matches!(c, 'x' | 'X' | 'z' | 'Z' | '?') { '0' } else { c })
                .collect();
            return match BigInt::from_str_radix(&digits, radix) {
                Ok(v) => match v.to_i64() {
                    Some(small) => Tok::Int(small),
                    None => Tok::Big(v),
                },
                Err(_) => {
                    diags.report(DiagCode::SyntaxError, self.range(start), "bad based literal");
                    Tok::Int(0)
                }
            };
        }
        let text: String = std::str::from_utf8(&self.bytes[start..self.pos])
            .expect("number bytes are ascii")
            .replace('_', "");
        match text.parse::<i64>() {
            Ok(v) => Tok::Int(v),
            Err(_) => match text.parse::<BigInt>() {
                Ok(v) => Tok::Big(v),
                Err(_) => {
                    diags.report(DiagCode::SyntaxError, self.range(start), format!("bad integer literal `{text}`"));
                    Tok::Int(0)
                }
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Mutable parse-time state shared across files of one compilation.
pub struct ParseContext<'a> {
    pub interner: &'a mut Interner,
    pub ids: &'a mut SyntaxIdAllocator,
    pub diags: &'a mut Diagnostics,
    /// Accept `#value` (no parentheses) as a single ordered parameter
    /// assignment, e.g. `mod #5 m();`.
    pub bare_param_assignment: bool,
}

/// Parses one source buffer into design units and configs.
///
/// `base` is the buffer's global offset from [`crate::source::SourceMap::add_file`].
pub fn parse_source(text: &str, base: u32, ctx: &mut ParseContext<'_>) -> Vec<UnitSyntax> {
    let tokens = Lexer::new(text, base).lex_all(ctx.interner, ctx.diags);
    Parser {
        tokens,
        pos: 0,
        ctx,
        depth: 0,
    }
    .parse_units()
}

struct Parser<'a, 'c> {
    tokens: Vec<Token>,
    pos: usize,
    ctx: &'a mut ParseContext<'c>,
    depth: u32,
}

impl Parser<'_, '_> {
    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].tok
    }

    fn peek_ahead(&self, ahead: usize) -> &Tok {
        let idx = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[idx].tok
    }

    fn here(&self) -> SourceRange {
        self.tokens[self.pos].range
    }

    fn prev_range(&self) -> SourceRange {
        self.tokens[self.pos.saturating_sub(1)].range
    }

    fn bump(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == tok {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: Kw) -> bool {
        self.eat(&Tok::Kw(kw))
    }

    fn at_kw(&self, kw: Kw) -> bool {
        *self.peek() == Tok::Kw(kw)
    }

    fn error(&mut self, message: impl Into<String>) {
        let range = self.here();
        self.ctx.diags.report(DiagCode::SyntaxError, range, message);
    }

    fn expect(&mut self, tok: &Tok, what: &str) -> bool {
        if self.eat(tok) {
            true
        } else {
            self.error(format!("expected {what}"));
            false
        }
    }

    fn expect_ident(&mut self, what: &str) -> Option<NameId> {
        match *self.peek() {
            Tok::Ident(name) => {
                self.bump();
                Some(name)
            }
            _ => {
                self.error(format!("expected {what}"));
                None
            }
        }
    }

    /// Skips to just past the next `;`, stopping early at a unit-closing
    /// keyword (which is left for the caller).
    fn recover_to_semi(&mut self) {
        loop {
            match self.peek() {
                Tok::Eof => return,
                Tok::Semi => {
                    self.bump();
                    return;
                }
                Tok::Kw(kw) if kw.is_unit_end() => return,
                _ => {
                    self.bump();
                }
            }
        }
    }

    // -- top level ----------------------------------------------------------

    fn parse_units(mut self) -> Vec<UnitSyntax> {
        let mut units = Vec::new();
        loop {
            match *self.peek() {
                Tok::Eof => return units,
                Tok::Kw(Kw::Module) => self.unit(DesignKind::Module, Kw::Endmodule, &mut units),
                Tok::Kw(Kw::Interface) => self.unit(DesignKind::Interface, Kw::Endinterface, &mut units),
                Tok::Kw(Kw::Program) => self.unit(DesignKind::Program, Kw::Endprogram, &mut units),
                Tok::Kw(Kw::Package) => self.unit(DesignKind::Package, Kw::Endpackage, &mut units),
                Tok::Kw(Kw::Checker) => self.unit(DesignKind::Checker, Kw::Endchecker, &mut units),
                Tok::Kw(Kw::Primitive) => {
                    if let Some(unit) = self.parse_primitive() {
                        units.push(UnitSyntax::Design(unit));
                    }
                }
                Tok::Kw(Kw::Config) => {
                    if let Some(config) = self.parse_config() {
                        units.push(UnitSyntax::Config(config));
                    }
                }
                Tok::Kw(Kw::Bind) => {
                    // compilation-unit-level bind: attach to a synthetic unit later;
                    // the subset requires binds inside a unit, so report and skip.
                    self.error("bind directives must appear inside a design unit");
                    self.recover_to_semi();
                }
                _ => {
                    self.error("expected a design unit or config declaration");
                    self.recover_to_semi();
                }
            }
        }
    }

    fn unit(&mut self, kind: DesignKind, end: Kw, units: &mut Vec<UnitSyntax>) {
        if let Some(unit) = self.parse_design_unit(kind, end) {
            units.push(UnitSyntax::Design(unit));
        }
    }

    fn parse_design_unit(&mut self, kind: DesignKind, end: Kw) -> Option<DesignUnitSyntax> {
        let start = self.here();
        self.bump(); // unit keyword
        let name = self.expect_ident(&format!("{kind} name"))?;

        let mut param_ports = Vec::new();
        if self.eat(&Tok::Hash) {
            self.expect(&Tok::LParen, "`(` after `#`");
            param_ports = self.parse_param_port_list();
        }
        let mut ports = Vec::new();
        if self.eat(&Tok::LParen) {
            ports = self.parse_port_list(kind);
        }
        self.expect(&Tok::Semi, "`;` after header");

        let members = self.parse_members(end);
        self.eat_kw(end);
        // optional end label `: name`
        if self.eat(&Tok::Colon) {
            let _ = self.expect_ident("end label");
        }
        Some(DesignUnitSyntax {
            kind,
            name,
            range: start.merge(self.prev_range()),
            param_ports,
            ports,
            members,
            timescale: None,
        })
    }

    /// `primitive p(out, a, b); table ... endtable endprimitive`
    fn parse_primitive(&mut self) -> Option<DesignUnitSyntax> {
        let start = self.here();
        self.bump();
        let name = self.expect_ident("primitive name")?;
        let mut ports = Vec::new();
        if self.eat(&Tok::LParen) {
            loop {
                match *self.peek() {
                    Tok::Ident(port) => {
                        let range = self.here();
                        self.bump();
                        // first terminal of a UDP is its output
                        let direction = if ports.is_empty() { PortDirection::Output } else { PortDirection::Input };
                        ports.push(PortDeclSyntax {
                            name: port,
                            direction,
                            iface: None,
                            modport: None,
                            default: None,
                            range,
                        });
                    }
                    _ => {
                        self.error("expected primitive terminal name");
                    }
                }
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
            self.expect(&Tok::RParen, "`)`");
        }
        self.expect(&Tok::Semi, "`;`");
        // The table body carries no elaboration-relevant structure.
        while !self.at_kw(Kw::Endprimitive) && *self.peek() != Tok::Eof {
            self.bump();
        }
        self.eat_kw(Kw::Endprimitive);
        Some(DesignUnitSyntax {
            kind: DesignKind::Primitive,
            name,
            range: start.merge(self.prev_range()),
            param_ports: Vec::new(),
            ports,
            members: Vec::new(),
            timescale: None,
        })
    }

    // -- headers ------------------------------------------------------------

    /// `#(parameter A = 1, localparam type T = x, B = 2)`
    fn parse_param_port_list(&mut self) -> Vec<ParamDeclSyntax> {
        let mut params = Vec::new();
        if self.eat(&Tok::RParen) {
            return params;
        }
        let mut is_local = false;
        loop {
            let start = self.here();
            if self.eat_kw(Kw::Parameter) {
                is_local = false;
            } else if self.eat_kw(Kw::Localparam) {
                is_local = true;
            }
            let is_type = self.eat_kw(Kw::Type);
            if !is_type {
                self.skip_data_type();
            }
            let Some(name) = self.expect_ident("parameter name") else {
                self.recover_to_semi();
                return params;
            };
            let default = if self.eat(&Tok::Assign) { self.parse_expr() } else { None };
            params.push(ParamDeclSyntax {
                name,
                is_type,
                is_local,
                is_port: true,
                default,
                range: start.merge(self.prev_range()),
            });
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(&Tok::RParen, "`)` after parameter ports");
        params
    }

    /// ANSI port list. Direction and interface type persist across commas the
    /// way the surface language specifies.
    fn parse_port_list(&mut self, kind: DesignKind) -> Vec<PortDeclSyntax> {
        let mut ports = Vec::new();
        if self.eat(&Tok::RParen) {
            return ports;
        }
        let mut direction = if kind == DesignKind::Checker { PortDirection::Input } else { PortDirection::Inout };
        let mut iface: Option<NameId> = None;
        let mut modport: Option<NameId> = None;
        loop {
            let start = self.here();
            let explicit_direction = match *self.peek() {
                Tok::Kw(Kw::Input) => Some(PortDirection::Input),
                Tok::Kw(Kw::Output) => Some(PortDirection::Output),
                Tok::Kw(Kw::Inout) => Some(PortDirection::Inout),
                Tok::Kw(Kw::Ref) => Some(PortDirection::Ref),
                _ => None,
            };
            if let Some(dir) = explicit_direction {
                self.bump();
                direction = dir;
                iface = None;
                modport = None;
            }
            let had_type = self.skip_data_type();
            if had_type {
                iface = None;
                modport = None;
            }
            // `iface_name [.modport] port_name`: two identifiers in a row
            // mean the first is an interface type.
            if let (Tok::Ident(first), next) = (self.peek().clone(), self.peek_ahead(1).clone()) {
                if matches!(next, Tok::Ident(_)) {
                    self.bump();
                    iface = Some(first);
                    modport = None;
                } else if next == Tok::Dot {
                    if let Tok::Ident(mp) = *self.peek_ahead(2) {
                        if matches!(self.peek_ahead(3), Tok::Ident(_)) {
                            self.bump();
                            self.bump();
                            self.bump();
                            iface = Some(first);
                            modport = Some(mp);
                        }
                    }
                }
            }
            let Some(name) = self.expect_ident("port name") else {
                self.recover_to_semi();
                return ports;
            };
            // packed/unpacked dimensions on the port are irrelevant here
            while self.eat(&Tok::LBrack) {
                self.skip_to_rbrack();
            }
            let default = if self.eat(&Tok::Assign) { self.parse_expr() } else { None };
            ports.push(PortDeclSyntax {
                name,
                direction,
                iface,
                modport,
                default,
                range: start.merge(self.prev_range()),
            });
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(&Tok::RParen, "`)` after port list");
        ports
    }

    /// Skips a leading data type (keyword form plus packed dimensions).
    /// Returns whether anything was consumed.
    fn skip_data_type(&mut self) -> bool {
        let mut any = false;
        while let Tok::Kw(kw) = *self.peek() {
            if kw.data_type() && kw != Kw::Type {
                self.bump();
                any = true;
                while self.eat(&Tok::LBrack) {
                    self.skip_to_rbrack();
                    any = true;
                }
            } else {
                break;
            }
        }
        any
    }

    fn skip_to_rbrack(&mut self) {
        let mut depth = 1usize;
        loop {
            match self.peek() {
                Tok::Eof => return,
                Tok::LBrack => {
                    depth += 1;
                    self.bump();
                }
                Tok::RBrack => {
                    self.bump();
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    // -- members ------------------------------------------------------------

    fn parse_members(&mut self, end: Kw) -> Vec<MemberSyntax> {
        let mut members = Vec::new();
        loop {
            match *self.peek() {
                Tok::Eof => return members,
                Tok::Kw(kw) if kw == end || kw.is_unit_end() => return members,
                Tok::Kw(Kw::End) | Tok::Kw(Kw::Join) | Tok::Kw(Kw::JoinAny) | Tok::Kw(Kw::JoinNone) | Tok::Kw(Kw::Else) => {
                    return members;
                }
                _ => {
                    if let Some(member) = self.parse_member() {
                        members.push(member);
                    }
                }
            }
        }
    }

    fn parse_member(&mut self) -> Option<MemberSyntax> {
        // generate arms and member blocks nest through this function,
        // outside `parse_stmt`'s guard
        if self.depth >= MAX_NESTING_DEPTH {
            self.error("member nesting too deep");
            self.recover_to_semi();
            return None;
        }
        self.depth += 1;
        let member = self.parse_member_inner();
        self.depth -= 1;
        member
    }

    fn parse_member_inner(&mut self) -> Option<MemberSyntax> {
        match *self.peek() {
            Tok::Kw(Kw::Parameter) => self.parse_param_member(false),
            Tok::Kw(Kw::Localparam) => self.parse_param_member(true),
            Tok::Kw(Kw::Wire) | Tok::Kw(Kw::Logic) | Tok::Kw(Kw::Reg) | Tok::Kw(Kw::Int) | Tok::Kw(Kw::Integer) | Tok::Kw(Kw::Bit) | Tok::Kw(Kw::Event) | Tok::Kw(Kw::Genvar) => {
                self.parse_net_member()
            }
            Tok::Kw(Kw::Defparam) => self.parse_defparam(),
            Tok::Kw(Kw::Bind) => self.parse_bind(),
            Tok::Kw(Kw::Generate) => {
                self.bump();
                let members = self.parse_generate_region();
                self.eat_kw(Kw::Endgenerate);
                // flatten: a generate region is purely syntactic
                members.map(MemberSyntax::GenerateIf)
            }
            Tok::Kw(Kw::If) => {
                let generate_if = self.parse_generate_if()?;
                Some(MemberSyntax::GenerateIf(generate_if))
            }
            Tok::Kw(Kw::Begin) => {
                let block = self.parse_member_block(BlockKind::Sequential, Kw::Begin, Kw::End)?;
                Some(MemberSyntax::Block(block))
            }
            Tok::Kw(Kw::Fork) => {
                let block = self.parse_member_block(BlockKind::ForkJoin, Kw::Fork, Kw::Join)?;
                Some(MemberSyntax::Block(block))
            }
            Tok::Kw(Kw::Always) | Tok::Kw(Kw::AlwaysComb) | Tok::Kw(Kw::AlwaysFf) | Tok::Kw(Kw::AlwaysLatch) | Tok::Kw(Kw::Initial) | Tok::Kw(Kw::Final) => {
                self.parse_procedure()
            }
            Tok::Kw(Kw::Import) => self.parse_import(),
            Tok::Kw(Kw::Export) => self.parse_export(),
            Tok::Kw(Kw::Assign) => {
                // continuous assignments carry no hierarchy
                self.recover_to_semi();
                None
            }
            Tok::Ident(_) => self.parse_instantiation_member(),
            _ => {
                self.error("unexpected token in body");
                self.recover_to_semi();
                None
            }
        }
    }

    fn parse_param_member(&mut self, is_local: bool) -> Option<MemberSyntax> {
        let start = self.here();
        self.bump();
        let is_type = self.eat_kw(Kw::Type);
        if !is_type {
            self.skip_data_type();
        }
        let mut decls: Vec<ParamDeclSyntax> = Vec::new();
        loop {
            let Some(name) = self.expect_ident("parameter name") else {
                self.recover_to_semi();
                break;
            };
            let default = if self.eat(&Tok::Assign) { self.parse_expr() } else { None };
            decls.push(ParamDeclSyntax {
                name,
                is_type,
                is_local,
                is_port: false,
                default,
                range: start.merge(self.prev_range()),
            });
            if !self.eat(&Tok::Comma) {
                self.expect(&Tok::Semi, "`;`");
                break;
            }
        }
        // A declaration list becomes one member per name; fold extra names
        // into a synthetic sequential block to keep the single-return shape.
        match decls.len() {
            0 => None,
            1 => Some(MemberSyntax::Param(decls.pop().expect("len checked"))),
            _ => Some(MemberSyntax::Block(BlockSyntax {
                kind: BlockKind::Sequential,
                members: decls.into_iter().map(MemberSyntax::Param).collect(),
                range: start.merge(self.prev_range()),
            })),
        }
    }

    fn parse_net_member(&mut self) -> Option<MemberSyntax> {
        let start = self.here();
        self.skip_data_type();
        self.eat_kw(Kw::Genvar);
        let mut names = Vec::new();
        loop {
            match *self.peek() {
                Tok::Ident(name) => {
                    self.bump();
                    names.push(name);
                    while self.eat(&Tok::LBrack) {
                        self.skip_to_rbrack();
                    }
                    // initializer on a variable declaration
                    if self.eat(&Tok::Assign) {
                        let _ = self.parse_expr();
                    }
                }
                _ => {
                    self.error("expected net or variable name");
                    self.recover_to_semi();
                    return if names.is_empty() {
                        None
                    } else {
                        Some(MemberSyntax::Net(NetDeclSyntax {
                            names,
                            range: start.merge(self.prev_range()),
                        }))
                    };
                }
            }
            if !self.eat(&Tok::Comma) {
                self.expect(&Tok::Semi, "`;`");
                break;
            }
        }
        Some(MemberSyntax::Net(NetDeclSyntax {
            names,
            range: start.merge(self.prev_range()),
        }))
    }

    fn parse_defparam(&mut self) -> Option<MemberSyntax> {
        let start = self.here();
        self.bump();
        let path = self.parse_dotted_path()?;
        if !self.expect(&Tok::Assign, "`=` in defparam") {
            self.recover_to_semi();
            return None;
        }
        let value = self.parse_expr()?;
        self.expect(&Tok::Semi, "`;`");
        Some(MemberSyntax::Defparam(DefparamSyntax {
            path,
            value,
            range: start.merge(self.prev_range()),
        }))
    }

    fn parse_bind(&mut self) -> Option<MemberSyntax> {
        let start = self.here();
        self.bump();
        let target = self.parse_dotted_path()?;
        let inst = self.parse_instantiation()?;
        Some(MemberSyntax::Bind(BindSyntax {
            target,
            inst,
            range: start.merge(self.prev_range()),
        }))
    }

    fn parse_dotted_path(&mut self) -> Option<Vec<NameId>> {
        let mut path = vec![self.expect_ident("hierarchical name")?];
        while self.eat(&Tok::Dot) {
            path.push(self.expect_ident("path segment")?);
        }
        Some(path)
    }

    fn parse_generate_region(&mut self) -> Option<GenerateIfSyntax> {
        if self.at_kw(Kw::If) {
            return self.parse_generate_if();
        }
        self.error("only constant `if` generate constructs are supported");
        while !self.at_kw(Kw::Endgenerate) && *self.peek() != Tok::Eof {
            self.bump();
        }
        None
    }

    fn parse_generate_if(&mut self) -> Option<GenerateIfSyntax> {
        // `else if` chains recurse here directly, without passing through
        // `parse_member`'s guard
        if self.depth >= MAX_NESTING_DEPTH {
            self.error("generate nesting too deep");
            self.recover_to_semi();
            return None;
        }
        self.depth += 1;
        let generate_if = self.parse_generate_if_inner();
        self.depth -= 1;
        generate_if
    }

    fn parse_generate_if_inner(&mut self) -> Option<GenerateIfSyntax> {
        let start = self.here();
        self.bump(); // if
        self.expect(&Tok::LParen, "`(`");
        let cond = self.parse_expr()?;
        self.expect(&Tok::RParen, "`)`");
        let then_members = self.parse_generate_arm();
        let else_members = if self.eat_kw(Kw::Else) {
            if self.at_kw(Kw::If) {
                let nested = self.parse_generate_if()?;
                vec![MemberSyntax::GenerateIf(nested)]
            } else {
                self.parse_generate_arm()
            }
        } else {
            Vec::new()
        };
        Some(GenerateIfSyntax {
            cond,
            then_members,
            else_members,
            range: start.merge(self.prev_range()),
        })
    }

    fn parse_generate_arm(&mut self) -> Vec<MemberSyntax> {
        if self.eat_kw(Kw::Begin) {
            // optional block label
            if self.eat(&Tok::Colon) {
                let _ = self.expect_ident("block label");
            }
            let members = self.parse_members(Kw::End);
            self.eat_kw(Kw::End);
            if self.eat(&Tok::Colon) {
                let _ = self.expect_ident("end label");
            }
            members
        } else {
            self.parse_member().into_iter().collect()
        }
    }

    fn parse_member_block(&mut self, kind: BlockKind, _open: Kw, close: Kw) -> Option<BlockSyntax> {
        let start = self.here();
        self.bump();
        if self.eat(&Tok::Colon) {
            let _ = self.expect_ident("block label");
        }
        let members = self.parse_members(close);
        // join_any/join_none close a fork as well
        if !(self.eat_kw(close) || (kind == BlockKind::ForkJoin && (self.eat_kw(Kw::JoinAny) || self.eat_kw(Kw::JoinNone)))) {
            self.error("unterminated block");
        }
        Some(BlockSyntax {
            kind,
            members,
            range: start.merge(self.prev_range()),
        })
    }

    fn parse_procedure(&mut self) -> Option<MemberSyntax> {
        let start = self.here();
        let kind = match *self.peek() {
            Tok::Kw(Kw::Always) => ProcedureKind::Always,
            Tok::Kw(Kw::AlwaysComb) => ProcedureKind::AlwaysComb,
            Tok::Kw(Kw::AlwaysFf) => ProcedureKind::AlwaysFf,
            Tok::Kw(Kw::AlwaysLatch) => ProcedureKind::AlwaysLatch,
            Tok::Kw(Kw::Initial) => ProcedureKind::Initial,
            Tok::Kw(Kw::Final) => ProcedureKind::Final,
            _ => unreachable!("caller checked the procedure keyword"),
        };
        self.bump();
        let stmts = self.parse_stmt().into_iter().collect();
        Some(MemberSyntax::Procedure(ProcedureSyntax {
            kind,
            stmts,
            range: start.merge(self.prev_range()),
        }))
    }

    fn parse_stmt(&mut self) -> Option<StmtSyntax> {
        if self.depth >= MAX_NESTING_DEPTH {
            self.error("statement nesting too deep");
            self.recover_to_semi();
            return None;
        }
        self.depth += 1;
        let stmt = self.parse_stmt_inner();
        self.depth -= 1;
        stmt
    }

    fn parse_stmt_inner(&mut self) -> Option<StmtSyntax> {
        let start = self.here();
        match self.peek().clone() {
            Tok::At => {
                // event control prefixes the real statement
                self.bump();
                if self.eat(&Tok::LParen) {
                    let mut depth = 1usize;
                    while depth > 0 && *self.peek() != Tok::Eof {
                        match self.bump().tok {
                            Tok::LParen => depth += 1,
                            Tok::RParen => depth -= 1,
                            _ => {}
                        }
                    }
                } else {
                    self.bump(); // @ident or @*
                }
                self.parse_stmt()
            }
            Tok::Kw(Kw::Begin) => {
                self.bump();
                if self.eat(&Tok::Colon) {
                    let _ = self.expect_ident("block label");
                }
                let stmts = self.parse_stmt_list(&[Kw::End]);
                self.eat_kw(Kw::End);
                if self.eat(&Tok::Colon) {
                    let _ = self.expect_ident("end label");
                }
                Some(StmtSyntax::Block {
                    kind: BlockKind::Sequential,
                    stmts,
                    range: start.merge(self.prev_range()),
                })
            }
            Tok::Kw(Kw::Fork) => {
                self.bump();
                if self.eat(&Tok::Colon) {
                    let _ = self.expect_ident("block label");
                }
                let stmts = self.parse_stmt_list(&[Kw::Join, Kw::JoinAny, Kw::JoinNone]);
                if !(self.eat_kw(Kw::Join) || self.eat_kw(Kw::JoinAny) || self.eat_kw(Kw::JoinNone)) {
                    self.error("unterminated fork");
                }
                Some(StmtSyntax::Block {
                    kind: BlockKind::ForkJoin,
                    stmts,
                    range: start.merge(self.prev_range()),
                })
            }
            Tok::Ident(_) => {
                // `type inst (...)` instantiation vs. assignment
                if matches!(self.peek_ahead(1), Tok::Ident(_)) || *self.peek_ahead(1) == Tok::Hash {
                    let inst = self.parse_instantiation()?;
                    return Some(StmtSyntax::Instantiation(inst));
                }
                self.classify_assignment(start)
            }
            Tok::Semi => {
                self.bump();
                Some(StmtSyntax::Other(start))
            }
            _ => {
                // anything else: skip one statement's worth of tokens
                self.recover_to_semi();
                Some(StmtSyntax::Other(start.merge(self.prev_range())))
            }
        }
    }

    fn parse_stmt_list(&mut self, closers: &[Kw]) -> Vec<StmtSyntax> {
        let mut stmts = Vec::new();
        loop {
            match *self.peek() {
                Tok::Eof => return stmts,
                Tok::Kw(kw) if closers.contains(&kw) || kw.is_unit_end() => return stmts,
                _ => {
                    if let Some(stmt) = self.parse_stmt() {
                        stmts.push(stmt);
                    }
                }
            }
        }
    }

    /// Scans one `;`-terminated statement starting at an identifier and
    /// classifies it as a blocking or nonblocking assignment.
    fn classify_assignment(&mut self, start: SourceRange) -> Option<StmtSyntax> {
        let mut saw_le = false;
        let mut saw_assign = false;
        loop {
            match self.peek() {
                Tok::Eof => break,
                Tok::Semi => {
                    self.bump();
                    break;
                }
                Tok::Kw(kw) if kw.is_unit_end() => break,
                Tok::Le if !saw_assign => {
                    saw_le = true;
                    self.bump();
                }
                Tok::Assign if !saw_le => {
                    saw_assign = true;
                    self.bump();
                }
                _ => {
                    self.bump();
                }
            }
        }
        let range = start.merge(self.prev_range());
        if saw_le {
            Some(StmtSyntax::NonblockingAssign(range))
        } else if saw_assign {
            Some(StmtSyntax::BlockingAssign(range))
        } else {
            Some(StmtSyntax::Other(range))
        }
    }

    fn parse_import(&mut self) -> Option<MemberSyntax> {
        let start = self.here();
        self.bump();
        let package = self.expect_ident("package name")?;
        self.expect(&Tok::ColonColon, "`::`");
        let item = if self.eat(&Tok::Star) {
            ImportItem::Wildcard
        } else {
            ImportItem::Name(self.expect_ident("imported name")?)
        };
        // import lists like `import a::*, b::c;`: splitting into separate members
        // is unnecessary for the subset; accept and drop the tail.
        while self.eat(&Tok::Comma) {
            let _ = self.expect_ident("package name");
            self.expect(&Tok::ColonColon, "`::`");
            if !self.eat(&Tok::Star) {
                let _ = self.expect_ident("imported name");
            }
        }
        self.expect(&Tok::Semi, "`;`");
        Some(MemberSyntax::Import(ImportSyntax {
            package,
            item,
            range: start.merge(self.prev_range()),
        }))
    }

    fn parse_export(&mut self) -> Option<MemberSyntax> {
        let start = self.here();
        self.bump();
        let package = if self.eat(&Tok::Star) {
            None
        } else {
            Some(self.expect_ident("package name")?)
        };
        self.expect(&Tok::ColonColon, "`::`");
        let item = if self.eat(&Tok::Star) {
            ImportItem::Wildcard
        } else {
            ImportItem::Name(self.expect_ident("exported name")?)
        };
        self.expect(&Tok::Semi, "`;`");
        Some(MemberSyntax::Export(ExportSyntax {
            package,
            item,
            range: start.merge(self.prev_range()),
        }))
    }

    // -- instantiation ------------------------------------------------------

    fn parse_instantiation_member(&mut self) -> Option<MemberSyntax> {
        // `ident ident` / `ident #(...)` / `ident . ident ident` start an
        // instantiation; a bare `ident =` is an assignment we skip.
        let starts_instantiation = match (self.peek().clone(), self.peek_ahead(1).clone()) {
            (Tok::Ident(_), Tok::Ident(_)) | (Tok::Ident(_), Tok::Hash) => true,
            (Tok::Ident(_), Tok::Dot) => {
                matches!(*self.peek_ahead(2), Tok::Ident(_)) && matches!(*self.peek_ahead(3), Tok::Ident(_) | Tok::Hash)
            }
            _ => false,
        };
        if !starts_instantiation {
            self.recover_to_semi();
            return None;
        }
        self.parse_instantiation().map(MemberSyntax::Instantiation)
    }

    fn parse_instantiation(&mut self) -> Option<InstantiationSyntax> {
        let start = self.here();
        let first = self.expect_ident("type name")?;
        let first_range = self.prev_range();
        let (library, type_name, type_range) = if *self.peek() == Tok::Dot && matches!(*self.peek_ahead(1), Tok::Ident(_)) {
            self.bump();
            let cell = self.expect_ident("cell name")?;
            (Some(first), cell, first_range.merge(self.prev_range()))
        } else {
            (None, first, first_range)
        };

        let mut params = ParamAssignmentsSyntax::default();
        if self.eat(&Tok::Hash) {
            if self.eat(&Tok::LParen) {
                params = self.parse_param_assignments();
            } else if self.ctx.bare_param_assignment {
                if let Some(value) = self.parse_primary() {
                    params.ordered.push(value);
                }
            } else {
                self.error("expected `(` after `#`");
            }
        }

        let mut instances = Vec::new();
        loop {
            let inst_start = self.here();
            let Some(name) = self.expect_ident("instance name") else {
                self.recover_to_semi();
                break;
            };
            let mut dims: SmallVec<[RangeSyntax; 2]> = SmallVec::new();
            while self.eat(&Tok::LBrack) {
                let dim_start = self.prev_range();
                let Some(left) = self.parse_expr() else {
                    self.skip_to_rbrack();
                    continue;
                };
                let right = if self.eat(&Tok::Colon) { self.parse_expr() } else { None };
                self.expect(&Tok::RBrack, "`]`");
                dims.push(RangeSyntax {
                    left,
                    right,
                    range: dim_start.merge(self.prev_range()),
                });
            }
            let mut connections = Vec::new();
            if self.eat(&Tok::LParen) {
                connections = self.parse_port_connections();
            }
            instances.push(HierInstanceSyntax {
                id: self.ctx.ids.allocate(),
                name,
                dims,
                connections,
                range: inst_start.merge(self.prev_range()),
            });
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(&Tok::Semi, "`;` after instantiation");
        Some(InstantiationSyntax {
            library,
            type_name,
            type_range,
            params,
            instances,
            range: start.merge(self.prev_range()),
        })
    }

    /// `#(8, .W(4), .T())`: ordered and named entries in source order.
    fn parse_param_assignments(&mut self) -> ParamAssignmentsSyntax {
        let mut params = ParamAssignmentsSyntax::default();
        if self.eat(&Tok::RParen) {
            return params;
        }
        loop {
            if self.eat(&Tok::Dot) {
                let start = self.prev_range();
                let Some(name) = self.expect_ident("parameter name") else {
                    self.recover_to_semi();
                    return params;
                };
                self.expect(&Tok::LParen, "`(`");
                let value = if *self.peek() == Tok::RParen { None } else { self.parse_expr() };
                self.expect(&Tok::RParen, "`)`");
                params.named.push(NamedParamSyntax {
                    name,
                    value,
                    range: start.merge(self.prev_range()),
                });
            } else if let Some(value) = self.parse_expr() {
                params.ordered.push(value);
            } else {
                self.recover_to_semi();
                return params;
            }
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(&Tok::RParen, "`)` after parameter assignments");
        params
    }

    fn parse_port_connections(&mut self) -> Vec<PortConnSyntax> {
        let mut connections = Vec::new();
        if self.eat(&Tok::RParen) {
            return connections;
        }
        loop {
            let start = self.here();
            match self.peek().clone() {
                Tok::Dot => {
                    self.bump();
                    if self.eat(&Tok::Star) {
                        connections.push(PortConnSyntax::Wildcard(start.merge(self.prev_range())));
                    } else {
                        let Some(name) = self.expect_ident("port name") else {
                            self.recover_to_semi();
                            return connections;
                        };
                        if self.eat(&Tok::LParen) {
                            let expr = if *self.peek() == Tok::RParen { None } else { self.parse_expr() };
                            self.expect(&Tok::RParen, "`)`");
                            connections.push(PortConnSyntax::Named {
                                name,
                                expr,
                                has_parens: true,
                                range: start.merge(self.prev_range()),
                            });
                        } else {
                            connections.push(PortConnSyntax::Named {
                                name,
                                expr: None,
                                has_parens: false,
                                range: start.merge(self.prev_range()),
                            });
                        }
                    }
                }
                Tok::Comma | Tok::RParen => {
                    connections.push(PortConnSyntax::Ordered(None, start));
                }
                _ => {
                    let expr = self.parse_expr();
                    connections.push(PortConnSyntax::Ordered(expr, start.merge(self.prev_range())));
                }
            }
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(&Tok::RParen, "`)` after port connections");
        connections
    }

    // -- configs ------------------------------------------------------------

    fn parse_config(&mut self) -> Option<ConfigSyntax> {
        let start = self.here();
        self.bump();
        let name = self.expect_ident("config name")?;
        self.expect(&Tok::Semi, "`;`");
        let mut design = Vec::new();
        let mut rules = Vec::new();
        let mut localparams = Vec::new();
        loop {
            match *self.peek() {
                Tok::Eof => break,
                Tok::Kw(Kw::Endconfig) => {
                    self.bump();
                    break;
                }
                Tok::Kw(Kw::Design) => {
                    self.bump();
                    while let Some(cell) = self.try_parse_config_cell() {
                        design.push(cell);
                    }
                    self.expect(&Tok::Semi, "`;` after design statement");
                }
                Tok::Kw(Kw::Default) => {
                    let rule_start = self.here();
                    self.bump();
                    if !self.expect(&Tok::Kw(Kw::Liblist), "`liblist`") {
                        self.recover_to_semi();
                        continue;
                    }
                    let libs = self.parse_name_list();
                    self.expect(&Tok::Semi, "`;`");
                    rules.push(ConfigRuleSyntax::DefaultLiblist {
                        libs,
                        range: rule_start.merge(self.prev_range()),
                    });
                }
                Tok::Kw(Kw::Cell) => {
                    self.bump();
                    let Some((library, cell)) = self.parse_lib_qualified_name() else {
                        self.recover_to_semi();
                        continue;
                    };
                    let Some(body) = self.parse_config_rule_body() else {
                        continue;
                    };
                    rules.push(ConfigRuleSyntax::Cell { library, cell, body });
                }
                Tok::Kw(Kw::Instance) => {
                    self.bump();
                    let Some(path) = self.parse_dotted_path() else {
                        self.recover_to_semi();
                        continue;
                    };
                    let Some(body) = self.parse_config_rule_body() else {
                        continue;
                    };
                    rules.push(ConfigRuleSyntax::Instance { path, body });
                }
                Tok::Kw(Kw::Localparam) => {
                    if let Some(member) = self.parse_param_member(true) {
                        match member {
                            MemberSyntax::Param(decl) => localparams.push(decl),
                            MemberSyntax::Block(block) => {
                                for inner in block.members {
                                    if let MemberSyntax::Param(decl) = inner {
                                        localparams.push(decl);
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                }
                _ => {
                    self.error("unexpected token in config");
                    self.recover_to_semi();
                }
            }
        }
        Some(ConfigSyntax {
            name,
            range: start.merge(self.prev_range()),
            design,
            rules,
            localparams,
        })
    }

    fn try_parse_config_cell(&mut self) -> Option<ConfigCellSyntax> {
        if !matches!(*self.peek(), Tok::Ident(_)) {
            return None;
        }
        let start = self.here();
        let (library, cell) = self.parse_lib_qualified_name()?;
        let target_config = if self.eat(&Tok::Colon) {
            if !self.eat_kw(Kw::Config) {
                self.error("expected `config` after `:`");
            }
            true
        } else {
            false
        };
        Some(ConfigCellSyntax {
            library,
            cell,
            target_config,
            range: start.merge(self.prev_range()),
        })
    }

    fn parse_lib_qualified_name(&mut self) -> Option<(Option<NameId>, NameId)> {
        let first = self.expect_ident("cell name")?;
        if self.eat(&Tok::Dot) {
            let cell = self.expect_ident("cell name")?;
            Some((Some(first), cell))
        } else {
            Some((None, first))
        }
    }

    fn parse_name_list(&mut self) -> Vec<NameId> {
        let mut names = Vec::new();
        while let Tok::Ident(name) = *self.peek() {
            self.bump();
            names.push(name);
            // liblists are space-separated; tolerate commas too
            self.eat(&Tok::Comma);
        }
        names
    }

    /// `use [lib.]cell [: config] [#(...)] ;` or `liblist a b ;`
    fn parse_config_rule_body(&mut self) -> Option<ConfigRuleBody> {
        let start = self.here();
        let mut body = ConfigRuleBody::default();
        if self.eat_kw(Kw::Liblist) {
            body.liblist = Some(self.parse_name_list());
        } else if self.eat_kw(Kw::Use) {
            if matches!(*self.peek(), Tok::Ident(_)) {
                body.use_cell = self.try_parse_config_cell();
            }
            if self.eat(&Tok::Hash) {
                self.expect(&Tok::LParen, "`(` after `#`");
                let params = self.parse_param_assignments();
                if !params.ordered.is_empty() {
                    self.error("config parameter overrides must be named");
                }
                body.param_overrides = params.named;
            }
            if body.use_cell.is_none() && body.param_overrides.is_empty() {
                self.error("`use` clause names neither a cell nor parameters");
            }
        } else {
            self.error("expected `use` or `liblist` in config rule");
            self.recover_to_semi();
            return None;
        }
        self.expect(&Tok::Semi, "`;` after config rule");
        body.range = start.merge(self.prev_range());
        Some(body)
    }

    // -- expressions --------------------------------------------------------

    fn parse_expr(&mut self) -> Option<ExprNode> {
        if self.depth >= MAX_NESTING_DEPTH {
            self.error("expression nesting too deep");
            return None;
        }
        self.depth += 1;
        let expr = self.parse_bin_expr(0);
        self.depth -= 1;
        expr
    }

    fn parse_bin_expr(&mut self, min_prec: u8) -> Option<ExprNode> {
        let mut lhs = self.parse_unary()?;
        loop {
            let (op, prec) = match self.peek() {
                Tok::OrOr => (BinOp::LogOr, 1),
                Tok::AndAnd => (BinOp::LogAnd, 2),
                Tok::EqEq => (BinOp::Eq, 3),
                Tok::NotEq => (BinOp::Ne, 3),
                Tok::Lt => (BinOp::Lt, 4),
                Tok::Le => (BinOp::Le, 4),
                Tok::Gt => (BinOp::Gt, 4),
                Tok::Ge => (BinOp::Ge, 4),
                Tok::Shl => (BinOp::Shl, 5),
                Tok::Shr => (BinOp::Shr, 5),
                Tok::Plus => (BinOp::Add, 6),
                Tok::Minus => (BinOp::Sub, 6),
                Tok::Star => (BinOp::Mul, 7),
                Tok::Slash => (BinOp::Div, 7),
                Tok::Percent => (BinOp::Rem, 7),
                _ => break,
            };
            if prec < min_prec {
                break;
            }
            self.bump();
            let rhs = self.parse_bin_expr(prec + 1)?;
            let range = lhs.range.merge(rhs.range);
            lhs = ExprNode {
                expr: Expr::Binary(op, Box::new(lhs), Box::new(rhs)),
                range,
            };
        }
        Some(lhs)
    }

    fn parse_unary(&mut self) -> Option<ExprNode> {
        // unary chains recurse once per operator, so they share the same
        // depth budget as every other recursive entry point
        if self.depth >= MAX_NESTING_DEPTH {
            self.error("expression nesting too deep");
            return None;
        }
        self.depth += 1;
        let expr = self.parse_unary_inner();
        self.depth -= 1;
        expr
    }

    fn parse_unary_inner(&mut self) -> Option<ExprNode> {
        let start = self.here();
        let op = match self.peek() {
            Tok::Minus => Some(UnaryOp::Neg),
            Tok::Bang => Some(UnaryOp::Not),
            Tok::Plus => {
                self.bump();
                return self.parse_unary();
            }
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let operand = self.parse_unary()?;
            let range = start.merge(operand.range);
            return Some(ExprNode {
                expr: Expr::Unary(op, Box::new(operand)),
                range,
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Option<ExprNode> {
        let start = self.here();
        let token = self.bump();
        let expr = match token.tok {
            Tok::Int(v) => Expr::Int(v),
            Tok::Big(v) => Expr::Big(v),
            Tok::Real(v) => Expr::Real(v),
            Tok::Str(s) => Expr::Str(s),
            Tok::Ident(name) => {
                let mut path = vec![name];
                while *self.peek() == Tok::Dot && matches!(*self.peek_ahead(1), Tok::Ident(_)) {
                    self.bump();
                    if let Tok::Ident(segment) = self.bump().tok {
                        path.push(segment);
                    }
                }
                // bit/part selects are irrelevant to constant folding; skip them
                while self.eat(&Tok::LBrack) {
                    self.skip_to_rbrack();
                }
                if path.len() == 1 {
                    Expr::Ident(path[0])
                } else {
                    Expr::Hier(path)
                }
            }
            Tok::LParen => {
                let inner = self.parse_expr()?;
                self.expect(&Tok::RParen, "`)`");
                return Some(ExprNode {
                    expr: inner.expr,
                    range: start.merge(self.prev_range()),
                });
            }
            Tok::LBrace => {
                // concatenations are opaque to constant folding
                let mut depth = 1usize;
                while depth > 0 && *self.peek() != Tok::Eof {
                    match self.bump().tok {
                        Tok::LBrace => depth += 1,
                        Tok::RBrace => depth -= 1,
                        _ => {}
                    }
                }
                Expr::Hier(Vec::new())
            }
            _ => {
                self.error("expected an expression");
                return None;
            }
        };
        Some(ExprNode {
            expr,
            range: start.merge(self.prev_range()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::SyntaxIdAllocator;

    fn parse(text: &str) -> (Vec<UnitSyntax>, Diagnostics, Interner) {
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
        (units, diags, interner)
    }

    #[test]
    fn parses_module_with_instances() {
        let (units, diags, interner) = parse(
            "module top;\n  mod #(.W(8)) m1(), m2[3:0]();\n  lib2.mod q(.a(x), .b(), .*);\nendmodule\n",
        );
        assert!(diags.is_empty(), "{:?}", diags.all());
        assert_eq!(units.len(), 1);
        let UnitSyntax::Design(unit) = &units[0] else {
            panic!("expected design unit")
        };
        assert_eq!(unit.kind, DesignKind::Module);
        assert_eq!(unit.members.len(), 2);
        let MemberSyntax::Instantiation(inst) = &unit.members[0] else {
            panic!("expected instantiation")
        };
        assert_eq!(inst.instances.len(), 2);
        assert_eq!(inst.params.named.len(), 1);
        assert_eq!(inst.instances[1].dims.len(), 1);
        let MemberSyntax::Instantiation(qualified) = &unit.members[1] else {
            panic!("expected instantiation")
        };
        assert_eq!(qualified.library.map(|l| interner.resolve(l)), Some("lib2"));
        assert_eq!(qualified.instances[0].connections.len(), 3);
    }

    #[test]
    fn parses_config_block() {
        let (units, diags, interner) = parse(
            "config cfg;\n  design rtlLib.top;\n  default liblist rtlLib gateLib;\n  cell mem use gateLib.mem;\n  instance top.a.b liblist gateLib;\n  instance top.c use cfg2 : config;\nendconfig\n",
        );
        assert!(diags.is_empty(), "{:?}", diags.all());
        let UnitSyntax::Config(config) = &units[0] else {
            panic!("expected config")
        };
        assert_eq!(interner.resolve(config.name), "cfg");
        assert_eq!(config.design.len(), 1);
        assert!(config.design[0].library.is_some());
        assert_eq!(config.rules.len(), 4);
        let ConfigRuleSyntax::Instance { path, body } = &config.rules[2] else {
            panic!("expected instance rule")
        };
        assert_eq!(path.len(), 3);
        assert!(body.liblist.is_some());
        let ConfigRuleSyntax::Instance { body, .. } = &config.rules[3] else {
            panic!("expected instance rule")
        };
        assert!(body.use_cell.expect("use cell").target_config);
    }

    #[test]
    fn based_literals_and_wide_ints() {
        let (units, diags, _) = parse("module m;\n  parameter P = 16'hFFFF;\n  parameter W = 'h1_0000_0000_0000_0000;\nendmodule\n");
        assert!(diags.is_empty(), "{:?}", diags.all());
        let UnitSyntax::Design(unit) = &units[0] else {
            panic!()
        };
        let MemberSyntax::Param(p) = &unit.members[0] else {
            panic!()
        };
        assert!(matches!(p.default.as_ref().unwrap().expr, Expr::Int(65535)));
        let MemberSyntax::Param(w) = &unit.members[1] else {
            panic!()
        };
        assert!(matches!(w.default.as_ref().unwrap().expr, Expr::Big(_)));
    }

    #[test]
    fn pathological_nesting_degrades_to_syntax_errors() {
        // unary chains recurse once per operator
        let deep_unary = format!("module m;\n  parameter P = {}1;\nendmodule\n", "!".repeat(400));
        let (_, diags, _) = parse(&deep_unary);
        assert!(diags.contains(DiagCode::SyntaxError));

        // member blocks nest through parse_member, outside the stmt guard
        let deep_blocks = format!("module m;\n{}\nendmodule\n", "begin ".repeat(400));
        let (_, diags, _) = parse(&deep_blocks);
        assert!(diags.contains(DiagCode::SyntaxError));

        // generate-if chains take the same member-level path
        let deep_generates = format!("module m;\n{}\nendmodule\n", "if (1) begin ".repeat(400));
        let (_, diags, _) = parse(&deep_generates);
        assert!(diags.contains(DiagCode::SyntaxError));

        // else-if chains recurse through parse_generate_if directly
        let deep_else_ifs = format!("module m;\n{}x a();\nendmodule\n", "if (1) x a(); else ".repeat(400));
        let (_, diags, _) = parse(&deep_else_ifs);
        assert!(diags.contains(DiagCode::SyntaxError));
    }

    #[test]
    fn recovers_from_garbage_statement() {
        let (units, diags, _) = parse("module m;\n  ???;\n  mod u();\nendmodule\n");
        assert!(diags.contains(DiagCode::SyntaxError));
        let UnitSyntax::Design(unit) = &units[0] else {
            panic!()
        };
        assert!(unit.members.iter().any(|m| matches!(m, MemberSyntax::Instantiation(_))));
    }

    #[test]
    fn generate_if_arms() {
        let (units, diags, _) = parse(
            "module m;\n  parameter SEL = 1;\n  if (SEL) begin : yes\n    foo a();\n  end else begin : no\n    bar b();\n  end\nendmodule\n",
        );
        assert!(diags.is_empty(), "{:?}", diags.all());
        let UnitSyntax::Design(unit) = &units[0] else {
            panic!()
        };
        let MemberSyntax::GenerateIf(generate) = &unit.members[1] else {
            panic!("expected generate if")
        };
        assert_eq!(generate.then_members.len(), 1);
        assert_eq!(generate.else_members.len(), 1);
    }
}
