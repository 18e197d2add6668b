use crate::{
    bytes::Bytes, Construct, Container, Context, Element, Error, Expr, Meta, Stream, Value,
};

/// A field enforcing a constant, used for signatures and schema assertions.
///
/// Parsing reads through the inner construct and fails with a constant
/// mismatch when the result differs from the expected value. Building
/// always emits the expected value; a supplied value is tolerated only when
/// it equals the expectation (a constant is an assertion, not a field).
///
/// ```
/// use binform::{Const, ConstructExt, Value};
///
/// let d = Const::bytes(b"BMP");
/// assert!(d.parse_bytes(b"BMP").is_ok());
/// assert!(d.parse_bytes(b"JPG").is_err());
/// assert_eq!(d.build_bytes(&Value::None).unwrap(), b"BMP");
/// ```
#[derive(Debug)]
pub struct Const {
    value: Value,
    subcon: Box<dyn Construct>,
}

impl Const {
    /// A constant parsed and built through `subcon`
    pub fn new<V: Into<Value>, C: Construct + 'static>(value: V, subcon: C) -> Const {
        Const {
            value: value.into(),
            subcon: Box::new(subcon),
        }
    }

    /// A literal byte-string constant
    pub fn bytes(value: &[u8]) -> Const {
        Const {
            value: Value::Bytes(value.to_vec()),
            subcon: Box::new(Bytes::new(Value::Int(value.len() as i64))),
        }
    }
}

impl Construct for Const {
    fn parse(&self, stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        let obj = self.subcon.parse(stream, ctx)?;
        if obj != self.value {
            return Err(Error::constant(format!(
                "expected {} but parsed {}",
                self.value, obj
            )));
        }
        Ok(obj)
    }

    fn build(&self, obj: &Value, stream: &mut Stream, ctx: &Context) -> Result<(), Error> {
        if !obj.is_none() && *obj != self.value {
            return Err(Error::constant(format!(
                "building expected none or {} but got {}",
                self.value, obj
            )));
        }
        self.subcon.build(&self.value, stream, ctx)
    }

    fn static_sizeof(&self, ctx: &Context) -> Result<u64, Error> {
        self.subcon.static_sizeof(ctx)
    }

    fn sizeof(&self, _obj: &Value, ctx: &Context) -> Result<u64, Error> {
        self.subcon.sizeof(&self.value, ctx)
    }

    fn preprocess_size(
        &self,
        obj: Value,
        ctx: &Context,
        offset: u64,
    ) -> Result<(Value, Meta), Error> {
        let size = self.subcon.sizeof(&self.value, ctx)?;
        Ok((obj, Meta::span(offset, size)))
    }

    fn to_element(
        &self,
        _obj: &Value,
        _parent: &mut Element,
        _name: &str,
        _ctx: &Context,
    ) -> Result<Option<Element>, Error> {
        Ok(None)
    }

    fn from_element(
        &self,
        _parent: &Element,
        _name: &str,
        _out: &mut Container,
        _is_root: bool,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn builds_from_none(&self) -> bool {
        true
    }

    fn type_tag(&self) -> &'static str {
        "Const"
    }
}

/// A zero-byte field whose value is computed from the context.
///
/// Parsing and building evaluate the expression; the stream is untouched
/// and the size is zero.
#[derive(Debug)]
pub struct Computed {
    expr: Expr,
}

impl Computed {
    /// A computed field evaluating `expr`
    pub fn new<E: Into<Expr>>(expr: E) -> Computed {
        Computed { expr: expr.into() }
    }
}

impl Construct for Computed {
    fn parse(&self, _stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        self.expr.eval(ctx)
    }

    fn build(&self, _obj: &Value, _stream: &mut Stream, _ctx: &Context) -> Result<(), Error> {
        Ok(())
    }

    fn preprocess(&self, _obj: Value, _ctx: &Context) -> Result<Value, Error> {
        Ok(Value::Deferred(self.expr.clone()))
    }

    fn static_sizeof(&self, _ctx: &Context) -> Result<u64, Error> {
        Ok(0)
    }

    fn to_element(
        &self,
        _obj: &Value,
        _parent: &mut Element,
        _name: &str,
        _ctx: &Context,
    ) -> Result<Option<Element>, Error> {
        Ok(None)
    }

    fn from_element(
        &self,
        _parent: &Element,
        _name: &str,
        _out: &mut Container,
        _is_root: bool,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn builds_from_none(&self) -> bool {
        true
    }

    fn type_tag(&self) -> &'static str {
        "Computed"
    }
}

/// A field recomputed at build time from an expression.
///
/// Parsing defers to the inner construct. Building ignores the supplied
/// value and builds whatever the expression evaluates to. Preprocessing
/// installs the expression as a deferred value, so sibling expressions that
/// reference this field -- even ones that in turn reference later siblings --
/// see the final value. A record of mutually-referencing rebuilds therefore
/// needs preprocessing before it can build, which the
/// [`build_bytes`](crate::ConstructExt::build_bytes) entry point performs.
///
/// ```
/// use binform::{field, len_, this, Array, ConstructExt, Rebuild, Struct, container};
///
/// let d = Struct::new(vec![
///     field("count", Rebuild::new(binform::byte(), len_(this().f("items")))),
///     field("items", Array::new(this().f("count"), binform::byte())),
/// ]);
/// let input = container! { "items" => binform::items![1, 2, 3] };
/// let built = d.build_bytes(&input.into()).unwrap();
/// assert_eq!(built, vec![3, 1, 2, 3]);
/// ```
#[derive(Debug)]
pub struct Rebuild {
    subcon: Box<dyn Construct>,
    expr: Expr,
}

impl Rebuild {
    /// A rebuilt field storing through `subcon`
    pub fn new<C: Construct + 'static, E: Into<Expr>>(subcon: C, expr: E) -> Rebuild {
        Rebuild {
            subcon: Box::new(subcon),
            expr: expr.into(),
        }
    }
}

impl Construct for Rebuild {
    fn parse(&self, stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        self.subcon.parse(stream, ctx)
    }

    fn build(&self, _obj: &Value, stream: &mut Stream, ctx: &Context) -> Result<(), Error> {
        let obj = self.expr.eval(ctx)?;
        self.subcon.build(&obj, stream, ctx)
    }

    fn preprocess(&self, _obj: Value, _ctx: &Context) -> Result<Value, Error> {
        Ok(Value::Deferred(self.expr.clone()))
    }

    fn preprocess_size(
        &self,
        obj: Value,
        ctx: &Context,
        offset: u64,
    ) -> Result<(Value, Meta), Error> {
        match self.subcon.static_sizeof(ctx) {
            Ok(size) => Ok((obj, Meta::span(offset, size))),
            Err(err) if err.is_unknown_size() => {
                let value = self.expr.eval(ctx)?;
                let size = self.subcon.sizeof(&value, ctx)?;
                Ok((obj, Meta::span(offset, size)))
            }
            Err(err) => Err(err),
        }
    }

    fn static_sizeof(&self, ctx: &Context) -> Result<u64, Error> {
        self.subcon.static_sizeof(ctx)
    }

    fn sizeof(&self, obj: &Value, ctx: &Context) -> Result<u64, Error> {
        self.subcon.sizeof(obj, ctx)
    }

    fn to_element(
        &self,
        _obj: &Value,
        _parent: &mut Element,
        _name: &str,
        _ctx: &Context,
    ) -> Result<Option<Element>, Error> {
        Ok(None)
    }

    fn from_element(
        &self,
        _parent: &Element,
        _name: &str,
        _out: &mut Container,
        _is_root: bool,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn builds_from_none(&self) -> bool {
        true
    }

    fn type_tag(&self) -> &'static str {
        "Rebuild"
    }
}

/// A field with a constant fallback: building from a missing value uses the
/// fallback, building from a present value uses that value. No deferred
/// resolution takes place.
#[derive(Debug)]
pub struct DefaultValue {
    subcon: Box<dyn Construct>,
    value: Expr,
}

impl DefaultValue {
    /// A field defaulting to `value` when built from nothing
    pub fn new<C: Construct + 'static, E: Into<Expr>>(subcon: C, value: E) -> DefaultValue {
        DefaultValue {
            subcon: Box::new(subcon),
            value: value.into(),
        }
    }
}

impl Construct for DefaultValue {
    fn parse(&self, stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        self.subcon.parse(stream, ctx)
    }

    fn build(&self, obj: &Value, stream: &mut Stream, ctx: &Context) -> Result<(), Error> {
        if obj.is_none() {
            let fallback = self.value.eval(ctx)?;
            self.subcon.build(&fallback, stream, ctx)
        } else {
            self.subcon.build(obj, stream, ctx)
        }
    }

    fn preprocess_size(
        &self,
        obj: Value,
        ctx: &Context,
        offset: u64,
    ) -> Result<(Value, Meta), Error> {
        match self.subcon.static_sizeof(ctx) {
            Ok(size) => Ok((obj, Meta::span(offset, size))),
            Err(err) if err.is_unknown_size() => {
                let value = if obj.is_none() {
                    self.value.eval(ctx)?
                } else {
                    obj.clone()
                };
                let size = self.subcon.sizeof(&value, ctx)?;
                Ok((obj, Meta::span(offset, size)))
            }
            Err(err) => Err(err),
        }
    }

    fn static_sizeof(&self, ctx: &Context) -> Result<u64, Error> {
        self.subcon.static_sizeof(ctx)
    }

    fn sizeof(&self, obj: &Value, ctx: &Context) -> Result<u64, Error> {
        self.subcon.sizeof(obj, ctx)
    }

    fn to_element(
        &self,
        _obj: &Value,
        _parent: &mut Element,
        _name: &str,
        _ctx: &Context,
    ) -> Result<Option<Element>, Error> {
        Ok(None)
    }

    fn from_element(
        &self,
        _parent: &Element,
        _name: &str,
        _out: &mut Container,
        _is_root: bool,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn builds_from_none(&self) -> bool {
        true
    }

    fn type_tag(&self) -> &'static str {
        "Default"
    }
}

/// A zero-size assertion: parsing and building evaluate the condition and
/// fail when it does not hold.
#[derive(Debug)]
pub struct Check {
    cond: Expr,
}

impl Check {
    /// Asserts that `cond` holds during parsing and building
    pub fn new<E: Into<Expr>>(cond: E) -> Check {
        Check { cond: cond.into() }
    }

    fn run(&self, ctx: &Context) -> Result<(), Error> {
        if self.cond.eval_bool(ctx)? {
            Ok(())
        } else {
            Err(Error::explicit("check failed"))
        }
    }
}

impl Construct for Check {
    fn parse(&self, _stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        self.run(ctx)?;
        Ok(Value::None)
    }

    fn build(&self, _obj: &Value, _stream: &mut Stream, ctx: &Context) -> Result<(), Error> {
        self.run(ctx)
    }

    fn static_sizeof(&self, _ctx: &Context) -> Result<u64, Error> {
        Ok(0)
    }

    fn to_element(
        &self,
        _obj: &Value,
        _parent: &mut Element,
        _name: &str,
        _ctx: &Context,
    ) -> Result<Option<Element>, Error> {
        Ok(None)
    }

    fn from_element(
        &self,
        _parent: &Element,
        _name: &str,
        _out: &mut Container,
        _is_root: bool,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn builds_from_none(&self) -> bool {
        true
    }

    fn type_tag(&self) -> &'static str {
        "Check"
    }
}

/// A field that fails unconditionally, useful as a switch default for keys
/// that must not occur
#[derive(Debug, Clone, Copy, Default)]
pub struct Fail;

impl Construct for Fail {
    fn parse(&self, _stream: &mut Stream, _ctx: &Context) -> Result<Value, Error> {
        Err(Error::explicit("fail field activated during parsing"))
    }

    fn build(&self, _obj: &Value, _stream: &mut Stream, _ctx: &Context) -> Result<(), Error> {
        Err(Error::explicit("fail field activated during building"))
    }

    fn type_tag(&self) -> &'static str {
        "Fail"
    }
}

/// A no-op field: parses to nothing, builds nothing, occupies no bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct Pass;

impl Construct for Pass {
    fn parse(&self, _stream: &mut Stream, _ctx: &Context) -> Result<Value, Error> {
        Ok(Value::None)
    }

    fn build(&self, _obj: &Value, _stream: &mut Stream, _ctx: &Context) -> Result<(), Error> {
        Ok(())
    }

    fn static_sizeof(&self, _ctx: &Context) -> Result<u64, Error> {
        Ok(0)
    }

    fn to_element(
        &self,
        _obj: &Value,
        _parent: &mut Element,
        _name: &str,
        _ctx: &Context,
    ) -> Result<Option<Element>, Error> {
        Ok(None)
    }

    fn from_element(
        &self,
        _parent: &Element,
        _name: &str,
        _out: &mut Container,
        _is_root: bool,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn builds_from_none(&self) -> bool {
        true
    }

    fn is_noop(&self) -> bool {
        true
    }

    fn type_tag(&self) -> &'static str {
        "Pass"
    }
}

/// Asserts end of stream: parsing fails when unread bytes remain
#[derive(Debug, Clone, Copy, Default)]
pub struct Terminated;

impl Construct for Terminated {
    fn parse(&self, stream: &mut Stream, _ctx: &Context) -> Result<Value, Error> {
        if stream.remaining() > 0 {
            return Err(Error::explicit("expected end of stream"));
        }
        Ok(Value::None)
    }

    fn build(&self, _obj: &Value, _stream: &mut Stream, _ctx: &Context) -> Result<(), Error> {
        Ok(())
    }

    fn static_sizeof(&self, _ctx: &Context) -> Result<u64, Error> {
        Ok(0)
    }

    fn to_element(
        &self,
        _obj: &Value,
        _parent: &mut Element,
        _name: &str,
        _ctx: &Context,
    ) -> Result<Option<Element>, Error> {
        Ok(None)
    }

    fn from_element(
        &self,
        _parent: &Element,
        _name: &str,
        _out: &mut Container,
        _is_root: bool,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn builds_from_none(&self) -> bool {
        true
    }

    fn type_tag(&self) -> &'static str {
        "Terminated"
    }
}

/// A zero-size field yielding the current stream offset, for adjusting
/// relative offsets into absolute positions
#[derive(Debug, Clone, Copy, Default)]
pub struct Tell;

impl Construct for Tell {
    fn parse(&self, stream: &mut Stream, _ctx: &Context) -> Result<Value, Error> {
        Ok(Value::Int(stream.tell() as i64))
    }

    fn build(&self, _obj: &Value, _stream: &mut Stream, _ctx: &Context) -> Result<(), Error> {
        Ok(())
    }

    fn static_sizeof(&self, _ctx: &Context) -> Result<u64, Error> {
        Ok(0)
    }

    fn to_element(
        &self,
        _obj: &Value,
        _parent: &mut Element,
        _name: &str,
        _ctx: &Context,
    ) -> Result<Option<Element>, Error> {
        Ok(None)
    }

    fn from_element(
        &self,
        _parent: &Element,
        _name: &str,
        _out: &mut Container,
        _is_root: bool,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn builds_from_none(&self) -> bool {
        true
    }

    fn type_tag(&self) -> &'static str {
        "Tell"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConstructExt;

    #[test]
    fn test_const_build_rejects_other_values() {
        let d = Const::bytes(b"MZ");
        assert!(d.build_bytes(&Value::Bytes(b"ZM".to_vec())).is_err());
        assert_eq!(
            d.build_bytes(&Value::Bytes(b"MZ".to_vec())).unwrap(),
            b"MZ"
        );
    }

    #[test]
    fn test_const_over_number() {
        let d = Const::new(255u32, crate::le_u32());
        assert_eq!(d.build_bytes(&Value::None).unwrap(), vec![0xff, 0, 0, 0]);
        assert!(d.parse_bytes(&[0xfe, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_computed_is_zero_size() {
        let d = Computed::new(7);
        assert_eq!(d.parse_bytes(b"").unwrap(), Value::Int(7));
        assert_eq!(d.static_size().unwrap(), 0);
        assert_eq!(d.build_bytes(&Value::None).unwrap(), b"");
    }

    #[test]
    fn test_default_value() {
        let d = DefaultValue::new(crate::byte(), 3);
        assert_eq!(d.build_bytes(&Value::None).unwrap(), vec![3]);
        assert_eq!(d.build_bytes(&Value::Int(9)).unwrap(), vec![9]);
    }

    #[test]
    fn test_terminated() {
        assert!(Terminated.parse_bytes(b"").is_ok());
        assert!(Terminated.parse_bytes(b"x").is_err());
    }

    #[test]
    fn test_fail() {
        assert!(Fail.parse_bytes(b"").is_err());
    }
}
