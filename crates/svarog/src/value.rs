//! Constant values and the small expression evaluator.
//!
//! Parameter values, instance-array ranges, and generate conditions all pass
//! through here. Values use a hybrid representation: `i64` for the common
//! case, promoting to `BigInt` when a literal or an arithmetic result
//! overflows. Evaluation failure is a value (`Invalid`), not an error: the
//! caller substitutes a placeholder and keeps elaborating, and uninstantiated
//! bodies force every parameter to `Invalid` so downstream evaluation
//! short-circuits without further diagnostics.

use std::fmt;

use ahash::AHashMap;
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use crate::{
    intern::{Interner, NameId},
    syntax::{BinOp, Expr, ExprNode, UnaryOp},
};

/// A resolved constant.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Int(i64),
    /// Integer wider than `i64`.
    Big(BigInt),
    Real(f64),
    Str(Box<str>),
    /// Evaluation failed, or the enclosing body is uninstantiated.
    Invalid,
}

impl ConstantValue {
    /// Narrows to `i64` when the value is integral and fits.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Big(v) => v.to_i64(),
            _ => None,
        }
    }

    /// Truthiness for generate conditions: nonzero integer or nonempty string.
    #[must_use]
    pub fn is_true(&self) -> bool {
        match self {
            Self::Int(v) => *v != 0,
            Self::Big(v) => !v.is_zero(),
            Self::Real(v) => *v != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::Invalid => false,
        }
    }

    #[must_use]
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid)
    }

    fn from_bigint(v: BigInt) -> Self {
        match v.to_i64() {
            Some(small) => Self::Int(small),
            None => Self::Big(v),
        }
    }
}

impl fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Big(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "\"{s}\""),
            Self::Invalid => write!(f, "<invalid>"),
        }
    }
}

impl serde::Serialize for ConstantValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::Big(v) => serializer.serialize_str(&v.to_string()),
            Self::Real(v) => serializer.serialize_f64(*v),
            Self::Str(s) => serializer.serialize_str(s),
            Self::Invalid => serializer.serialize_none(),
        }
    }
}

/// Name bindings visible to an expression: the enclosing body's resolved
/// parameters plus anything imported into its scope.
pub type EvalScope = AHashMap<NameId, ConstantValue>;

/// Evaluates `node` against `scope`.
///
/// Unresolvable names, type mismatches, and division by zero all produce
/// `Invalid`; the evaluator never reports its own diagnostics because the
/// call sites know whether a failure matters (a failed dimension range is an
/// error, a failed value inside an uninstantiated body is expected).
#[must_use]
pub fn eval(node: &ExprNode, scope: &EvalScope) -> ConstantValue {
    match &node.expr {
        Expr::Int(v) => ConstantValue::Int(*v),
        Expr::Big(v) => ConstantValue::Big(v.clone()),
        Expr::Real(v) => ConstantValue::Real(*v),
        Expr::Str(s) => ConstantValue::Str(s.clone()),
        Expr::Ident(name) => scope.get(name).cloned().unwrap_or(ConstantValue::Invalid),
        // Hierarchical values are not constant at elaboration time.
        Expr::Hier(_) => ConstantValue::Invalid,
        Expr::Unary(op, operand) => eval_unary(*op, &eval(operand, scope)),
        Expr::Binary(op, lhs, rhs) => eval_binary(*op, &eval(lhs, scope), &eval(rhs, scope)),
    }
}

fn eval_unary(op: UnaryOp, operand: &ConstantValue) -> ConstantValue {
    match (op, operand) {
        (UnaryOp::Neg, ConstantValue::Int(v)) => match v.checked_neg() {
            Some(neg) => ConstantValue::Int(neg),
            None => ConstantValue::from_bigint(-BigInt::from(*v)),
        },
        (UnaryOp::Neg, ConstantValue::Big(v)) => ConstantValue::from_bigint(-v.clone()),
        (UnaryOp::Neg, ConstantValue::Real(v)) => ConstantValue::Real(-v),
        (UnaryOp::Not, v) => ConstantValue::Int(i64::from(!v.is_true())),
        _ => ConstantValue::Invalid,
    }
}

fn eval_binary(op: BinOp, lhs: &ConstantValue, rhs: &ConstantValue) -> ConstantValue {
    use ConstantValue as CV;
    match op {
        BinOp::LogAnd => return CV::Int(i64::from(lhs.is_true() && rhs.is_true())),
        BinOp::LogOr => return CV::Int(i64::from(lhs.is_true() || rhs.is_true())),
        _ => {}
    }
    match (lhs, rhs) {
        (CV::Invalid, _) | (_, CV::Invalid) => CV::Invalid,
        (CV::Real(a), b) => eval_real(op, *a, b),
        (a, CV::Real(b)) => match a.as_i64() {
            Some(a) => eval_real(op, a as f64, &CV::Real(*b)),
            None => CV::Invalid,
        },
        (CV::Str(a), CV::Str(b)) => eval_cmp_only(op, a.cmp(b)),
        (a, b) => {
            // Fast path on i64 with checked ops; widen to BigInt on overflow.
            if let (CV::Int(a), CV::Int(b)) = (a, b) {
                if let Some(v) = eval_i64(op, *a, *b) {
                    return v;
                }
            }
            let (Some(a), Some(b)) = (to_big(a), to_big(b)) else {
                return CV::Invalid;
            };
            eval_big(op, &a, &b)
        }
    }
}

fn to_big(v: &ConstantValue) -> Option<BigInt> {
    match v {
        ConstantValue::Int(v) => Some(BigInt::from(*v)),
        ConstantValue::Big(v) => Some(v.clone()),
        _ => None,
    }
}

fn eval_i64(op: BinOp, a: i64, b: i64) -> Option<ConstantValue> {
    use ConstantValue as CV;
    let v = match op {
        BinOp::Add => a.checked_add(b)?,
        BinOp::Sub => a.checked_sub(b)?,
        BinOp::Mul => a.checked_mul(b)?,
        BinOp::Div => {
            if b == 0 {
                return Some(CV::Invalid);
            }
            a.checked_div(b)?
        }
        BinOp::Rem => {
            if b == 0 {
                return Some(CV::Invalid);
            }
            a.checked_rem(b)?
        }
        BinOp::Shl => {
            let shift = u32::try_from(b).ok()?;
            a.checked_shl(shift)?
        }
        BinOp::Shr => {
            let shift = u32::try_from(b).ok()?;
            a.checked_shr(shift)?
        }
        BinOp::Eq => i64::from(a == b),
        BinOp::Ne => i64::from(a != b),
        BinOp::Lt => i64::from(a < b),
        BinOp::Le => i64::from(a <= b),
        BinOp::Gt => i64::from(a > b),
        BinOp::Ge => i64::from(a >= b),
        BinOp::LogAnd | BinOp::LogOr => unreachable!("handled before numeric dispatch"),
    };
    Some(CV::Int(v))
}

fn eval_big(op: BinOp, a: &BigInt, b: &BigInt) -> ConstantValue {
    use ConstantValue as CV;
    match op {
        BinOp::Add => CV::from_bigint(a + b),
        BinOp::Sub => CV::from_bigint(a - b),
        BinOp::Mul => CV::from_bigint(a * b),
        BinOp::Div => {
            if b.is_zero() {
                CV::Invalid
            } else {
                CV::from_bigint(a / b)
            }
        }
        BinOp::Rem => {
            if b.is_zero() {
                CV::Invalid
            } else {
                CV::from_bigint(a % b)
            }
        }
        BinOp::Shl => match b.to_u32() {
            Some(shift) => CV::from_bigint(a << shift),
            None => CV::Invalid,
        },
        BinOp::Shr => match b.to_u32() {
            Some(shift) => CV::from_bigint(a >> shift),
            None => CV::Invalid,
        },
        _ => eval_cmp_only(op, a.cmp(b)),
    }
}

fn eval_real(op: BinOp, a: f64, b: &ConstantValue) -> ConstantValue {
    use ConstantValue as CV;
    let b = match b {
        CV::Real(v) => *v,
        other => match other.as_i64() {
            Some(v) => v as f64,
            None => return CV::Invalid,
        },
    };
    match op {
        BinOp::Add => CV::Real(a + b),
        BinOp::Sub => CV::Real(a - b),
        BinOp::Mul => CV::Real(a * b),
        BinOp::Div => {
            if b == 0.0 {
                CV::Invalid
            } else {
                CV::Real(a / b)
            }
        }
        BinOp::Eq => CV::Int(i64::from(a == b)),
        BinOp::Ne => CV::Int(i64::from(a != b)),
        BinOp::Lt => CV::Int(i64::from(a < b)),
        BinOp::Le => CV::Int(i64::from(a <= b)),
        BinOp::Gt => CV::Int(i64::from(a > b)),
        BinOp::Ge => CV::Int(i64::from(a >= b)),
        _ => CV::Invalid,
    }
}

fn eval_cmp_only(op: BinOp, ord: std::cmp::Ordering) -> ConstantValue {
    use std::cmp::Ordering;
    let v = match op {
        BinOp::Eq => ord == Ordering::Equal,
        BinOp::Ne => ord != Ordering::Equal,
        BinOp::Lt => ord == Ordering::Less,
        BinOp::Le => ord != Ordering::Greater,
        BinOp::Gt => ord == Ordering::Greater,
        BinOp::Ge => ord != Ordering::Less,
        _ => return ConstantValue::Invalid,
    };
    ConstantValue::Int(i64::from(v))
}

/// Collects the simple identifiers referenced by an expression.
///
/// Port-connection processing uses this to discover names that need implicit
/// nets: each identifier not already declared in the enclosing scope gets a
/// net of the scope's default net type, once per name.
pub fn collect_idents(node: &ExprNode, out: &mut Vec<NameId>) {
    match &node.expr {
        Expr::Ident(name) => out.push(*name),
        Expr::Unary(_, operand) => collect_idents(operand, out),
        Expr::Binary(_, lhs, rhs) => {
            collect_idents(lhs, out);
            collect_idents(rhs, out);
        }
        Expr::Int(_) | Expr::Big(_) | Expr::Real(_) | Expr::Str(_) | Expr::Hier(_) => {}
    }
}

/// Renders an expression roughly as written, for placeholder diagnostics.
#[must_use]
pub fn render_expr(node: &ExprNode, interner: &Interner) -> String {
    match &node.expr {
        Expr::Int(v) => v.to_string(),
        Expr::Big(v) => v.to_string(),
        Expr::Real(v) => v.to_string(),
        Expr::Str(s) => format!("\"{s}\""),
        Expr::Ident(name) => interner.resolve(*name).to_owned(),
        Expr::Hier(path) => path
            .iter()
            .map(|n| interner.resolve(*n))
            .collect::<Vec<_>>()
            .join("."),
        Expr::Unary(op, operand) => {
            let op = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Not => "!",
            };
            format!("{op}{}", render_expr(operand, interner))
        }
        Expr::Binary(op, lhs, rhs) => {
            let op = match op {
                BinOp::Add => "+",
                BinOp::Sub => "-",
                BinOp::Mul => "*",
                BinOp::Div => "/",
                BinOp::Rem => "%",
                BinOp::Shl => "<<",
                BinOp::Shr => ">>",
                BinOp::Eq => "==",
                BinOp::Ne => "!=",
                BinOp::Lt => "<",
                BinOp::Le => "<=",
                BinOp::Gt => ">",
                BinOp::Ge => ">=",
                BinOp::LogAnd => "&&",
                BinOp::LogOr => "||",
            };
            format!("{} {op} {}", render_expr(lhs, interner), render_expr(rhs, interner))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceRange;

    fn node(expr: Expr) -> ExprNode {
        ExprNode {
            expr,
            range: SourceRange::default(),
        }
    }

    #[test]
    fn overflow_widens_to_big() {
        let lhs = node(Expr::Int(i64::MAX));
        let expr = node(Expr::Binary(BinOp::Add, Box::new(lhs), Box::new(node(Expr::Int(1)))));
        let scope = EvalScope::default();
        match eval(&expr, &scope) {
            ConstantValue::Big(v) => assert_eq!(v, BigInt::from(i64::MAX) + 1),
            other => panic!("expected Big, got {other:?}"),
        }
    }

    #[test]
    fn division_by_zero_is_invalid() {
        let expr = node(Expr::Binary(
            BinOp::Div,
            Box::new(node(Expr::Int(1))),
            Box::new(node(Expr::Int(0))),
        ));
        assert!(eval(&expr, &EvalScope::default()).is_invalid());
    }

    #[test]
    fn unknown_name_is_invalid_and_known_name_resolves() {
        let mut interner = Interner::new();
        let w = interner.intern("W");
        let expr = node(Expr::Binary(
            BinOp::Mul,
            Box::new(node(Expr::Ident(w))),
            Box::new(node(Expr::Int(2))),
        ));
        assert!(eval(&expr, &EvalScope::default()).is_invalid());

        let mut scope = EvalScope::default();
        scope.insert(w, ConstantValue::Int(8));
        assert_eq!(eval(&expr, &scope), ConstantValue::Int(16));
    }
}
