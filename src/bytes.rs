use crate::{Construct, Context, Error, Expr, Stream, Value};

/// A field of raw bytes whose length comes from an expression.
///
/// Parsing returns the bytes as-is; building writes the given bytes and
/// fails when their length disagrees with the evaluated expression.
///
/// ```
/// use binform::{field, this, Bytes, ConstructExt, Struct};
///
/// let d = Struct::new(vec![
///     field("length", binform::byte()),
///     field("data", Bytes::new(this().f("length"))),
/// ]);
/// let v = d.parse_bytes(b"\x04beef").unwrap();
/// assert_eq!(v.as_struct().unwrap().get("data").unwrap().as_bytes().unwrap(), b"beef");
/// ```
#[derive(Debug)]
pub struct Bytes {
    length: Expr,
}

impl Bytes {
    /// A byte field of `length` bytes
    pub fn new<E: Into<Expr>>(length: E) -> Bytes {
        Bytes {
            length: length.into(),
        }
    }
}

impl Construct for Bytes {
    fn parse(&self, stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        let length = self.length.eval_len(ctx)?;
        Ok(Value::Bytes(stream.read(length as usize)?))
    }

    fn build(&self, obj: &Value, stream: &mut Stream, ctx: &Context) -> Result<(), Error> {
        let length = self.length.eval_len(ctx)?;
        let data = obj.as_bytes()?;
        if data.len() as u64 != length {
            return Err(Error::format(format!(
                "expected {} byte(s) to build, got {}",
                length,
                data.len()
            )));
        }
        stream.write(data)
    }

    fn static_sizeof(&self, ctx: &Context) -> Result<u64, Error> {
        self.length
            .eval_len(ctx)
            .map_err(|_| Error::unknown_size("byte field length is context dependent"))
    }

    fn sizeof(&self, obj: &Value, ctx: &Context) -> Result<u64, Error> {
        match self.static_sizeof(ctx) {
            Ok(n) => Ok(n),
            Err(_) => Ok(obj.as_bytes()?.len() as u64),
        }
    }

    fn attr_encode(&self, obj: &Value) -> Result<String, Error> {
        Ok(hex_encode(obj.as_bytes()?))
    }

    fn attr_decode(&self, s: &str) -> Result<Value, Error> {
        hex_decode(s).map(Value::Bytes)
    }

    fn is_simple(&self) -> bool {
        true
    }

    fn type_tag(&self) -> &'static str {
        "Bytes"
    }
}

/// A field consuming every byte left in the stream.
///
/// Parsing reads to the end; building writes the given bytes without
/// checks. The size is value-dependent.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyBytes;

impl Construct for GreedyBytes {
    fn parse(&self, stream: &mut Stream, _ctx: &Context) -> Result<Value, Error> {
        Ok(Value::Bytes(stream.read_to_end()?))
    }

    fn build(&self, obj: &Value, stream: &mut Stream, _ctx: &Context) -> Result<(), Error> {
        stream.write(obj.as_bytes()?)
    }

    fn sizeof(&self, obj: &Value, _ctx: &Context) -> Result<u64, Error> {
        Ok(obj.as_bytes()?.len() as u64)
    }

    fn attr_encode(&self, obj: &Value) -> Result<String, Error> {
        Ok(hex_encode(obj.as_bytes()?))
    }

    fn attr_decode(&self, s: &str) -> Result<Value, Error> {
        hex_decode(s).map(Value::Bytes)
    }

    fn is_simple(&self) -> bool {
        true
    }

    fn type_tag(&self) -> &'static str {
        "GreedyBytes"
    }
}

pub(crate) fn hex_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

pub(crate) fn hex_decode(s: &str) -> Result<Vec<u8>, Error> {
    if s.len() % 2 != 0 {
        return Err(Error::xml(format!("odd-length hex literal: {}", s)));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .map_err(|_| Error::xml(format!("unparseable hex literal: {}", s)))
        })
        .collect()
}
