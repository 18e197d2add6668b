use crate::{context::Context, Error, Value};
use std::fmt;
use std::sync::Arc;

/// A user lambda evaluated against the current context
pub type LambdaFn = dyn Fn(&Context<'_>) -> Result<Value, Error> + Send + Sync;

/// A lazy expression evaluated against a [`Context`].
///
/// Every combinator parameter documented as "integer or expression" accepts
/// an `Expr`, built from literals (via `From`), [`this`] paths, arithmetic
/// and comparison operators, [`len_`], or user lambdas ([`lam`]).
///
/// ```
/// use binform::{this, len_};
///
/// let count = this().f("width") * this().f("height");
/// let total = len_(this().f("items")) + 1;
/// ```
#[derive(Clone)]
pub enum Expr {
    /// A constant value
    Lit(Box<Value>),
    /// A context-relative path, e.g. `this().up().f("size")`
    Path(Path),
    /// A binary operation over two sub-expressions
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// Negation or logical not
    Unary(UnOp, Box<Expr>),
    /// Length of a list, byte string, or text value
    Len(Box<Expr>),
    /// A user lambda
    Apply(Arc<LambdaFn>),
}

/// Binary operators available inside expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
}

/// Unary operators available inside expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
enum Seg {
    Field(String),
    Parent,
    Root,
    Index(usize),
}

/// A context-relative access path under construction. Start one with
/// [`this`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Path {
    segs: Vec<Seg>,
}

/// Starts an empty access path; `this().f("a")` reads field `a` of the
/// current record, `this().up()` steps to the parent record, `this().root()`
/// jumps to the topmost one.
pub fn this() -> Path {
    Path::default()
}

impl Path {
    /// Appends a field access
    pub fn f(mut self, name: &str) -> Path {
        self.segs.push(Seg::Field(name.to_string()));
        self
    }

    /// Appends a parent-record step (the `_` of the expression language)
    pub fn up(mut self) -> Path {
        self.segs.push(Seg::Parent);
        self
    }

    /// Appends a jump to the topmost record (`_root`)
    pub fn root(mut self) -> Path {
        self.segs.push(Seg::Root);
        self
    }

    /// Appends a list index access
    pub fn at(mut self, idx: usize) -> Path {
        self.segs.push(Seg::Index(idx));
        self
    }

    pub(crate) fn eval(&self, ctx: &Context) -> Result<Value, Error> {
        self.eval_from(ctx, 0)
    }

    fn eval_from(&self, ctx: &Context, i: usize) -> Result<Value, Error> {
        let seg = match self.segs.get(i) {
            Some(seg) => seg,
            None => return ctx.frame_value().map_err(|_| self.miss(i)),
        };
        match seg {
            Seg::Parent => {
                let up = ctx.parent().ok_or_else(|| self.miss(i))?;
                self.eval_from(up, i + 1)
            }
            Seg::Root => self.eval_from(ctx.root_frame(), i + 1),
            Seg::Field(name) => {
                let v = ctx.get(name).map_err(|_| self.miss(i))?;
                self.descend(v, ctx, i + 1)
            }
            Seg::Index(_) => {
                let v = ctx.frame_value().map_err(|_| self.miss(i))?;
                self.descend(v, ctx, i)
            }
        }
    }

    fn descend(&self, v: Value, ctx: &Context, i: usize) -> Result<Value, Error> {
        let seg = match self.segs.get(i) {
            Some(seg) => seg,
            None => return Ok(v),
        };
        match (seg, v) {
            (Seg::Field(name), Value::Struct(c)) => {
                let sub = ctx.enter_struct(&c);
                let v = sub.get(name).map_err(|_| self.miss(i))?;
                self.descend(v, &sub, i + 1)
            }
            (Seg::Index(idx), Value::List(l)) => {
                let sub = ctx.enter_list(&l, *idx);
                let item = l.get(*idx).cloned().ok_or_else(|| self.miss(i))?;
                let item = sub.force(item)?;
                self.descend(item, &sub, i + 1)
            }
            _ => Err(self.miss(i)),
        }
    }

    #[cold]
    fn miss(&self, i: usize) -> Error {
        Error::context(format!("{} (failed at segment {})", self, i))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "this")?;
        for seg in &self.segs {
            match seg {
                Seg::Field(name) => write!(f, ".{}", name)?,
                Seg::Parent => write!(f, "._")?,
                Seg::Root => write!(f, "._root")?,
                Seg::Index(idx) => write!(f, "[{}]", idx)?,
            }
        }
        Ok(())
    }
}

/// Wraps a closure into an expression: `lam(|ctx| ctx.get("width"))`
pub fn lam<F>(f: F) -> Expr
where
    F: Fn(&Context<'_>) -> Result<Value, Error> + Send + Sync + 'static,
{
    Expr::Apply(Arc::new(f))
}

/// The length of the list, byte string, or text the inner expression
/// evaluates to
pub fn len_<E: Into<Expr>>(e: E) -> Expr {
    Expr::Len(Box::new(e.into()))
}

const EVAL_DEPTH_LIMIT: usize = 128;

std::thread_local! {
    static EVAL_DEPTH: std::cell::Cell<usize> = std::cell::Cell::new(0);
}

struct DepthGuard;

impl DepthGuard {
    fn acquire() -> Result<DepthGuard, Error> {
        let depth = EVAL_DEPTH.with(|d| {
            let depth = d.get() + 1;
            d.set(depth);
            depth
        });
        // the guard exists before the check so the error path unwinds the
        // counter too
        let guard = DepthGuard;
        if depth > EVAL_DEPTH_LIMIT {
            Err(Error::context(
                "recursion limit reached while resolving expressions (circular reference?)",
            ))
        } else {
            Ok(guard)
        }
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        EVAL_DEPTH.with(|d| d.set(d.get() - 1));
    }
}

impl Expr {
    /// Evaluates the expression against a context
    pub fn eval(&self, ctx: &Context) -> Result<Value, Error> {
        let _guard = DepthGuard::acquire()?;
        match self {
            Expr::Lit(v) => Ok((**v).clone()),
            Expr::Path(p) => p.eval(ctx),
            Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs.eval(ctx)?, rhs.eval(ctx)?),
            Expr::Unary(op, e) => match (op, e.eval(ctx)?) {
                (UnOp::Neg, v) => Ok(Value::Int(-v.as_int()?)),
                (UnOp::Not, v) => Ok(Value::Bool(!v.as_bool()?)),
            },
            Expr::Len(e) => {
                let v = e.eval(ctx)?;
                let n = match &v {
                    Value::List(l) => l.len(),
                    Value::Bytes(b) => b.len(),
                    Value::Str(s) => s.chars().count(),
                    _ => {
                        return Err(Error::format(format!(
                            "cannot take length of {}",
                            v.type_name()
                        )))
                    }
                };
                Ok(Value::Int(n as i64))
            }
            Expr::Apply(f) => f(ctx),
        }
    }

    /// Evaluates to a non-negative count or size
    pub fn eval_len(&self, ctx: &Context) -> Result<u64, Error> {
        self.eval(ctx)?.as_len()
    }

    /// Evaluates to an integer
    pub fn eval_int(&self, ctx: &Context) -> Result<i64, Error> {
        self.eval(ctx)?.as_int()
    }

    /// Evaluates to a truth value
    pub fn eval_bool(&self, ctx: &Context) -> Result<bool, Error> {
        self.eval(ctx)?.as_bool()
    }
}

fn eval_binary(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, Error> {
    use BinOp::*;
    match op {
        Eq => return Ok(Value::Bool(lhs == rhs)),
        Ne => return Ok(Value::Bool(lhs != rhs)),
        And => return Ok(Value::Bool(lhs.as_bool()? && rhs.as_bool()?)),
        Or => return Ok(Value::Bool(lhs.as_bool()? || rhs.as_bool()?)),
        _ => {}
    }

    if let (Value::Float(_), _) | (_, Value::Float(_)) = (&lhs, &rhs) {
        let (a, b) = (lhs.as_float()?, rhs.as_float()?);
        return match op {
            Add => Ok(Value::Float(a + b)),
            Sub => Ok(Value::Float(a - b)),
            Mul => Ok(Value::Float(a * b)),
            Div => Ok(Value::Float(a / b)),
            Lt => Ok(Value::Bool(a < b)),
            Le => Ok(Value::Bool(a <= b)),
            Gt => Ok(Value::Bool(a > b)),
            Ge => Ok(Value::Bool(a >= b)),
            _ => Err(Error::format("operator not defined for floats")),
        };
    }

    let (a, b) = (lhs.as_int()?, rhs.as_int()?);
    let out = match op {
        Add => Value::Int(a.wrapping_add(b)),
        Sub => Value::Int(a.wrapping_sub(b)),
        Mul => Value::Int(a.wrapping_mul(b)),
        Div => {
            if b == 0 {
                return Err(Error::format("division by zero in expression"));
            }
            Value::Int(a / b)
        }
        Rem => {
            if b == 0 {
                return Err(Error::format("division by zero in expression"));
            }
            Value::Int(a % b)
        }
        Lt => Value::Bool(a < b),
        Le => Value::Bool(a <= b),
        Gt => Value::Bool(a > b),
        Ge => Value::Bool(a >= b),
        BitAnd => Value::Int(a & b),
        BitOr => Value::Int(a | b),
        Eq | Ne | And | Or => unreachable!(),
    };
    Ok(out)
}

impl PartialEq for Expr {
    fn eq(&self, other: &Expr) -> bool {
        match (self, other) {
            (Expr::Lit(a), Expr::Lit(b)) => a == b,
            (Expr::Path(a), Expr::Path(b)) => a == b,
            (Expr::Binary(op1, a1, b1), Expr::Binary(op2, a2, b2)) => {
                op1 == op2 && a1 == a2 && b1 == b2
            }
            (Expr::Unary(op1, a), Expr::Unary(op2, b)) => op1 == op2 && a == b,
            (Expr::Len(a), Expr::Len(b)) => a == b,
            (Expr::Apply(a), Expr::Apply(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Lit(v) => write!(f, "Lit({:?})", v),
            Expr::Path(p) => write!(f, "{}", p),
            Expr::Binary(op, a, b) => write!(f, "({:?} {:?} {:?})", a, op, b),
            Expr::Unary(op, a) => write!(f, "({:?} {:?})", op, a),
            Expr::Len(a) => write!(f, "len({:?})", a),
            Expr::Apply(_) => write!(f, "<lambda>"),
        }
    }
}

impl From<Path> for Expr {
    fn from(p: Path) -> Expr {
        Expr::Path(p)
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Expr {
        Expr::Lit(Box::new(v))
    }
}

macro_rules! expr_from_literal {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Expr {
            fn from(x: $ty) -> Expr {
                Expr::Lit(Box::new(Value::from(x)))
            }
        })*
    };
}

expr_from_literal!(i64, i32, u8, u32, usize, bool, &str);

macro_rules! expr_binop {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<R: Into<Expr>> std::ops::$trait<R> for Expr {
            type Output = Expr;
            fn $method(self, rhs: R) -> Expr {
                Expr::Binary($op, Box::new(self), Box::new(rhs.into()))
            }
        }

        impl<R: Into<Expr>> std::ops::$trait<R> for Path {
            type Output = Expr;
            fn $method(self, rhs: R) -> Expr {
                Expr::Binary($op, Box::new(Expr::Path(self)), Box::new(rhs.into()))
            }
        }
    };
}

expr_binop!(Add, add, BinOp::Add);
expr_binop!(Sub, sub, BinOp::Sub);
expr_binop!(Mul, mul, BinOp::Mul);
expr_binop!(Div, div, BinOp::Div);
expr_binop!(Rem, rem, BinOp::Rem);
expr_binop!(BitAnd, bitand, BinOp::BitAnd);
expr_binop!(BitOr, bitor, BinOp::BitOr);

macro_rules! expr_comparison {
    ($($method:ident => $op:expr),* $(,)?) => {
        impl Expr {
            $(
            /// Comparison producing a boolean expression
            pub fn $method<R: Into<Expr>>(self, rhs: R) -> Expr {
                Expr::Binary($op, Box::new(self), Box::new(rhs.into()))
            }
            )*
        }

        impl Path {
            $(
            /// Comparison producing a boolean expression
            pub fn $method<R: Into<Expr>>(self, rhs: R) -> Expr {
                Expr::from(self).$method(rhs)
            }
            )*
        }
    };
}

expr_comparison! {
    eq_ => BinOp::Eq,
    ne_ => BinOp::Ne,
    lt => BinOp::Lt,
    le => BinOp::Le,
    gt => BinOp::Gt,
    ge => BinOp::Ge,
}
