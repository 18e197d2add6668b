use crate::{
    misc::Pass, Construct, Container, Context, Element, Error, Expr, Stream, Struct, Value,
};

/// Pads an inner construct out to a fixed length.
///
/// Parsing parses the inner construct, then skips up to the evaluated
/// length; building writes the inner construct, then emits pattern bytes up
/// to the length. An inner construct that runs past the length is a range
/// error.
#[derive(Debug)]
pub struct Padded {
    length: Expr,
    subcon: Box<dyn Construct>,
    pattern: u8,
}

impl Padded {
    /// Pads `subcon` to `length` bytes with zeroes
    pub fn new<E: Into<Expr>, C: Construct + 'static>(length: E, subcon: C) -> Padded {
        Padded {
            length: length.into(),
            subcon: Box::new(subcon),
            pattern: 0,
        }
    }

    /// Uses `pattern` instead of zero as the filler byte
    pub fn with_pattern(mut self, pattern: u8) -> Padded {
        self.pattern = pattern;
        self
    }

    fn pad_for(&self, consumed: u64, ctx: &Context) -> Result<u64, Error> {
        let length = self.length.eval_len(ctx)?;
        length.checked_sub(consumed).ok_or_else(|| {
            Error::range(format!(
                "inner construct took {} byte(s) but only {} were allowed",
                consumed, length
            ))
        })
    }
}

impl Construct for Padded {
    fn parse(&self, stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        let start = stream.tell();
        let obj = self.subcon.parse(stream, ctx)?;
        let pad = self.pad_for(stream.tell() - start, ctx)?;
        skip_fill(stream, pad)?;
        Ok(obj)
    }

    fn build(&self, obj: &Value, stream: &mut Stream, ctx: &Context) -> Result<(), Error> {
        let start = stream.tell();
        self.subcon.build(obj, stream, ctx)?;
        let pad = self.pad_for(stream.tell() - start, ctx)?;
        write_fill(stream, self.pattern, pad)
    }

    fn static_sizeof(&self, ctx: &Context) -> Result<u64, Error> {
        self.length
            .eval_len(ctx)
            .map_err(|_| Error::unknown_size("padded length is context dependent"))
    }

    fn sizeof(&self, _obj: &Value, ctx: &Context) -> Result<u64, Error> {
        self.static_sizeof(ctx)
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

    fn name(&self) -> Option<&str> {
        self.subcon.name()
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

    fn builds_from_none(&self) -> bool {
        self.subcon.builds_from_none()
    }

    fn tag_names(&self) -> Vec<String> {
        self.subcon.tag_names()
    }

    fn type_tag(&self) -> &'static str {
        "Padded"
    }
}

/// A run of filler bytes: parsing skips them, building writes zeroes (or a
/// chosen pattern)
pub fn padding<E: Into<Expr>>(length: E) -> Padded {
    Padded::new(length, Pass)
}

/// Pads an inner construct to the next multiple of a modulus.
///
/// The eventual amount read or written by the inner construct decides the
/// padding, so variable-size inner constructs work. A modulus below two is
/// a range error.
#[derive(Debug)]
pub struct Aligned {
    modulus: Expr,
    subcon: Box<dyn Construct>,
    pattern: u8,
}

impl Aligned {
    /// Aligns `subcon` to `modulus` bytes with zero filler
    pub fn new<E: Into<Expr>, C: Construct + 'static>(modulus: E, subcon: C) -> Aligned {
        Aligned {
            modulus: modulus.into(),
            subcon: Box::new(subcon),
            pattern: 0,
        }
    }

    fn pad_for(&self, consumed: u64, ctx: &Context) -> Result<u64, Error> {
        let modulus = self.modulus.eval_len(ctx)?;
        if modulus < 2 {
            return Err(Error::range(format!(
                "alignment modulus must be at least 2, got {}",
                modulus
            )));
        }
        Ok((modulus - consumed % modulus) % modulus)
    }
}

impl Construct for Aligned {
    fn parse(&self, stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        let start = stream.tell();
        let obj = self.subcon.parse(stream, ctx)?;
        let pad = self.pad_for(stream.tell() - start, ctx)?;
        skip_fill(stream, pad)?;
        Ok(obj)
    }

    fn build(&self, obj: &Value, stream: &mut Stream, ctx: &Context) -> Result<(), Error> {
        let start = stream.tell();
        self.subcon.build(obj, stream, ctx)?;
        let pad = self.pad_for(stream.tell() - start, ctx)?;
        write_fill(stream, self.pattern, pad)
    }

    fn static_sizeof(&self, ctx: &Context) -> Result<u64, Error> {
        let inner = self.subcon.static_sizeof(ctx)?;
        Ok(inner + self.pad_for(inner, ctx)?)
    }

    fn sizeof(&self, obj: &Value, ctx: &Context) -> Result<u64, Error> {
        let inner = self.subcon.sizeof(obj, ctx)?;
        Ok(inner + self.pad_for(inner, ctx)?)
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

    fn name(&self) -> Option<&str> {
        self.subcon.name()
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

    fn builds_from_none(&self) -> bool {
        self.subcon.builds_from_none()
    }

    fn tag_names(&self) -> Vec<String> {
        self.subcon.tag_names()
    }

    fn type_tag(&self) -> &'static str {
        "Aligned"
    }
}

/// A record whose every member is aligned to the same modulus (a struct of
/// aligned fields, not an aligned struct)
pub fn aligned_struct(modulus: u64, fields: Vec<Box<dyn Construct>>) -> Struct {
    let wrapped = fields
        .into_iter()
        .map(|f| {
            let aligned = Aligned::new(Value::Int(modulus as i64), f);
            Box::new(aligned) as Box<dyn Construct>
        })
        .collect();
    Struct::new(wrapped)
}

fn skip_fill(stream: &mut Stream, pad: u64) -> Result<(), Error> {
    if stream.in_bits() {
        for _ in 0..pad {
            stream.read_bits(1)?;
        }
        Ok(())
    } else {
        stream.read(pad as usize).map(|_| ())
    }
}

fn write_fill(stream: &mut Stream, pattern: u8, pad: u64) -> Result<(), Error> {
    if stream.in_bits() {
        for _ in 0..pad {
            stream.write_bits(0, 1)?;
        }
        Ok(())
    } else {
        stream.write(&vec![pattern; pad as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{be_u16, byte, field, ConstructExt};

    #[test]
    fn test_padding() {
        let d = padding(4);
        assert_eq!(d.build_bytes(&Value::None).unwrap(), vec![0; 4]);
        assert_eq!(d.parse_bytes(b"****").unwrap(), Value::None);
        assert_eq!(d.static_size().unwrap(), 4);
    }

    #[test]
    fn test_padded_rejects_overlong_inner() {
        let d = Padded::new(1, be_u16());
        assert!(d.parse_bytes(&[1, 2]).is_err());
    }

    #[test]
    fn test_aligned_roundtrip() {
        let d = Aligned::new(4, be_u16());
        assert_eq!(d.parse_bytes(&[0, 1, 0, 0]).unwrap(), Value::Int(1));
        assert_eq!(d.build_bytes(&Value::Int(1)).unwrap(), vec![0, 1, 0, 0]);
        assert_eq!(d.static_size().unwrap(), 4);
    }

    #[test]
    fn test_aligned_struct() {
        let d = aligned_struct(4, vec![field("a", byte()), field("b", be_u16())]);
        let built = d
            .build_bytes(&Value::Struct(crate::container! { "a" => 0xff, "b" => 0xffff }))
            .unwrap();
        assert_eq!(built, vec![0xff, 0, 0, 0, 0xff, 0xff, 0, 0]);
    }

    #[test]
    fn test_bad_modulus() {
        let d = Aligned::new(1, byte());
        assert!(d.parse_bytes(&[1]).is_err());
    }
}
