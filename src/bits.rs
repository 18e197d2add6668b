use crate::{Construct, Container, Context, Element, Error, Meta, Stream, Value};

/// An unsigned integer of an arbitrary bit width, MSB-first. Only
/// meaningful inside a [`Bitwise`] block, where sizes count bits.
///
/// ```
/// use binform::{bit_struct, field, BitsInteger, ConstructExt, Value};
///
/// let d = bit_struct(vec![
///     field("a", BitsInteger::new(3)),
///     field("b", BitsInteger::new(5)),
/// ]);
/// let v = d.parse_bytes(&[0b1010_1010]).unwrap();
/// assert_eq!(v.as_struct().unwrap().get("a"), Some(&Value::Int(0b101)));
/// assert_eq!(v.as_struct().unwrap().get("b"), Some(&Value::Int(0b01010)));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct BitsInteger {
    bits: u32,
}

impl BitsInteger {
    /// An unsigned field of `bits` bits
    pub fn new(bits: u32) -> BitsInteger {
        debug_assert!(bits >= 1 && bits <= 64);
        BitsInteger { bits }
    }
}

impl Construct for BitsInteger {
    fn parse(&self, stream: &mut Stream, _ctx: &Context) -> Result<Value, Error> {
        let v = stream.read_bits(self.bits)?;
        i64::try_from(v)
            .map(Value::Int)
            .map_err(|_| Error::format(format!("value {} out of representable range", v)))
    }

    fn build(&self, obj: &Value, stream: &mut Stream, _ctx: &Context) -> Result<(), Error> {
        let x = obj.as_int()?;
        let x = u64::try_from(x)
            .map_err(|_| Error::format(format!("cannot encode negative value {} as bits", x)))?;
        stream.write_bits(x, self.bits)
    }

    fn static_sizeof(&self, _ctx: &Context) -> Result<u64, Error> {
        Ok(u64::from(self.bits))
    }

    fn attr_encode(&self, obj: &Value) -> Result<String, Error> {
        Ok(obj.as_int()?.to_string())
    }

    fn attr_decode(&self, s: &str) -> Result<Value, Error> {
        s.parse::<i64>()
            .map(Value::Int)
            .map_err(|_| Error::xml(format!("unparseable integer literal: {}", s)))
    }

    fn is_simple(&self) -> bool {
        true
    }

    fn type_tag(&self) -> &'static str {
        "BitsInteger"
    }
}

/// Switches the stream into its bit view around an inner construct.
///
/// Inside the block all sizes and offsets count bits; the block itself
/// reports its size in bytes and requires the inner bit count to be a whole
/// number of bytes. Leaving the block with dangling bits is a stream error.
/// Blocks do not nest.
#[derive(Debug)]
pub struct Bitwise {
    subcon: Box<dyn Construct>,
}

impl Bitwise {
    /// Runs `subcon` against the bit view
    pub fn new<C: Construct + 'static>(subcon: C) -> Bitwise {
        Bitwise {
            subcon: Box::new(subcon),
        }
    }
}

impl Construct for Bitwise {
    fn parse(&self, stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        stream.enter_bits()?;
        let obj = self.subcon.parse(stream, ctx)?;
        stream.exit_bits()?;
        Ok(obj)
    }

    fn build(&self, obj: &Value, stream: &mut Stream, ctx: &Context) -> Result<(), Error> {
        stream.enter_bits()?;
        self.subcon.build(obj, stream, ctx)?;
        stream.exit_bits()
    }

    fn preprocess(&self, obj: Value, ctx: &Context) -> Result<Value, Error> {
        self.subcon.preprocess(obj, ctx)
    }

    fn preprocess_size(
        &self,
        obj: Value,
        ctx: &Context,
        offset: u64,
    ) -> Result<(Value, Meta), Error> {
        // inner meta counts bits relative to the block start
        let (obj, inner) = self.subcon.preprocess_size(obj, ctx, 0)?;
        Ok((obj, Meta::span(offset, bits_to_bytes(inner.size)?)))
    }

    fn static_sizeof(&self, ctx: &Context) -> Result<u64, Error> {
        bits_to_bytes(self.subcon.static_sizeof(ctx)?)
    }

    fn sizeof(&self, obj: &Value, ctx: &Context) -> Result<u64, Error> {
        bits_to_bytes(self.subcon.sizeof(obj, ctx)?)
    }

    fn to_element(
        &self,
        obj: &Value,
        parent: &mut Element,
        name: &str,
        ctx: &Context,
    ) -> Result<Option<Element>, Error> {
        self.subcon.to_element(obj, parent, name, ctx)
    }

    fn from_element(
        &self,
        parent: &Element,
        name: &str,
        out: &mut Container,
        is_root: bool,
    ) -> Result<(), Error> {
        self.subcon.from_element(parent, name, out, is_root)
    }

    fn attr_encode(&self, obj: &Value) -> Result<String, Error> {
        self.subcon.attr_encode(obj)
    }

    fn attr_decode(&self, s: &str) -> Result<Value, Error> {
        self.subcon.attr_decode(s)
    }

    fn is_simple(&self) -> bool {
        self.subcon.is_simple()
    }

    fn is_array(&self) -> bool {
        self.subcon.is_array()
    }

    fn is_struct(&self) -> bool {
        self.subcon.is_struct()
    }

    fn tag_names(&self) -> Vec<String> {
        self.subcon.tag_names()
    }

    fn type_tag(&self) -> &'static str {
        "Bitwise"
    }
}

/// Re-enters byte semantics inside a [`Bitwise`] block: the inner construct
/// reads and writes whole bytes (eight bits each, MSB-first, at any bit
/// offset), and its byte size is scaled back to the surrounding bit units.
#[derive(Debug)]
pub struct Bytewise {
    subcon: Box<dyn Construct>,
}

impl Bytewise {
    /// Runs `subcon` with byte-sized units inside a bit view
    pub fn new<C: Construct + 'static>(subcon: C) -> Bytewise {
        Bytewise {
            subcon: Box::new(subcon),
        }
    }
}

impl Construct for Bytewise {
    fn parse(&self, stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        self.subcon.parse(stream, ctx)
    }

    fn build(&self, obj: &Value, stream: &mut Stream, ctx: &Context) -> Result<(), Error> {
        self.subcon.build(obj, stream, ctx)
    }

    fn preprocess(&self, obj: Value, ctx: &Context) -> Result<Value, Error> {
        self.subcon.preprocess(obj, ctx)
    }

    fn static_sizeof(&self, ctx: &Context) -> Result<u64, Error> {
        Ok(self.subcon.static_sizeof(ctx)? * 8)
    }

    fn sizeof(&self, obj: &Value, ctx: &Context) -> Result<u64, Error> {
        Ok(self.subcon.sizeof(obj, ctx)? * 8)
    }

    fn to_element(
        &self,
        obj: &Value,
        parent: &mut Element,
        name: &str,
        ctx: &Context,
    ) -> Result<Option<Element>, Error> {
        self.subcon.to_element(obj, parent, name, ctx)
    }

    fn from_element(
        &self,
        parent: &Element,
        name: &str,
        out: &mut Container,
        is_root: bool,
    ) -> Result<(), Error> {
        self.subcon.from_element(parent, name, out, is_root)
    }

    fn attr_encode(&self, obj: &Value) -> Result<String, Error> {
        self.subcon.attr_encode(obj)
    }

    fn attr_decode(&self, s: &str) -> Result<Value, Error> {
        self.subcon.attr_decode(s)
    }

    fn is_simple(&self) -> bool {
        self.subcon.is_simple()
    }

    fn is_array(&self) -> bool {
        self.subcon.is_array()
    }

    fn is_struct(&self) -> bool {
        self.subcon.is_struct()
    }

    fn tag_names(&self) -> Vec<String> {
        self.subcon.tag_names()
    }

    fn type_tag(&self) -> &'static str {
        "Bytewise"
    }
}

/// A record inside a bit view: `bit_struct(fields)` is
/// `Bitwise::new(Struct::new(fields))`
pub fn bit_struct(fields: Vec<Box<dyn Construct>>) -> Bitwise {
    Bitwise::new(crate::Struct::new(fields))
}

fn bits_to_bytes(bits: u64) -> Result<u64, Error> {
    if bits % 8 != 0 {
        return Err(Error::format(format!(
            "bit block spans {} bit(s), not a whole number of bytes",
            bits
        )));
    }
    Ok(bits / 8)
}
