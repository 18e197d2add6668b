use crate::{Construct, Container, Context, Element, Error, Stream, Value};

/// A byte-count prefix followed by a payload isolated to exactly that many
/// bytes.
///
/// Parsing reads the length field, takes that many bytes, and hands the
/// payload construct a substream of just those bytes -- greedy payloads stop
/// at the boundary. Building renders the payload first, then writes its
/// length and the bytes. With `include_length` the length field counts
/// itself.
///
/// `expected_sizeof` reads only the prefix, which is what lazy readers use
/// to skip bodies without parsing them.
///
/// ```
/// use binform::{byte, le_u16, ConstructExt, GreedyRange, Prefixed};
///
/// let d = Prefixed::new(byte(), GreedyRange::new(le_u16()));
/// let v = d.parse_bytes(&[4, 1, 0, 2, 0, 0xff]).unwrap();
/// assert_eq!(v.as_list().unwrap().len(), 2);
/// ```
#[derive(Debug)]
pub struct Prefixed {
    length_field: Box<dyn Construct>,
    subcon: Box<dyn Construct>,
    include_length: bool,
}

impl Prefixed {
    /// A payload prefixed by its byte count stored in `length_field`
    pub fn new<P, C>(length_field: P, subcon: C) -> Prefixed
    where
        P: Construct + 'static,
        C: Construct + 'static,
    {
        Prefixed {
            length_field: Box::new(length_field),
            subcon: Box::new(subcon),
            include_length: false,
        }
    }

    /// Counts the length field itself in the stored length
    pub fn with_included_length(mut self) -> Prefixed {
        self.include_length = true;
        self
    }

    fn prefix_adjustment(&self, ctx: &Context) -> Result<u64, Error> {
        if self.include_length {
            self.length_field.static_sizeof(ctx)
        } else {
            Ok(0)
        }
    }
}

impl Construct for Prefixed {
    fn parse(&self, stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        let length = self.length_field.parse(stream, ctx)?.as_len()?;
        let length = length
            .checked_sub(self.prefix_adjustment(ctx)?)
            .ok_or_else(|| Error::range("length prefix smaller than its own size"))?;
        let data = stream.read(length as usize)?;
        let mut substream = Stream::from_bytes(data);
        self.subcon.parse(&mut substream, ctx)
    }

    fn build(&self, obj: &Value, stream: &mut Stream, ctx: &Context) -> Result<(), Error> {
        let mut substream = Stream::new();
        self.subcon.build(obj, &mut substream, ctx)?;
        let data = substream.into_bytes();
        let length = data.len() as u64 + self.prefix_adjustment(ctx)?;
        self.length_field
            .build(&Value::Int(length as i64), stream, ctx)?;
        stream.write(&data)
    }

    fn static_sizeof(&self, ctx: &Context) -> Result<u64, Error> {
        Ok(self.length_field.static_sizeof(ctx)? + self.subcon.static_sizeof(ctx)?)
    }

    fn sizeof(&self, obj: &Value, ctx: &Context) -> Result<u64, Error> {
        let body = self.subcon.sizeof(obj, ctx)?;
        let prefix = self
            .length_field
            .sizeof(&Value::Int(body as i64), ctx)?;
        Ok(prefix + body)
    }

    fn expected_sizeof(&self, stream: &mut Stream, ctx: &Context) -> Result<u64, Error> {
        let start = stream.tell();
        let length = self.length_field.parse(stream, ctx)?.as_len()?;
        let length = length
            .checked_sub(self.prefix_adjustment(ctx)?)
            .ok_or_else(|| Error::range("length prefix smaller than its own size"))?;
        Ok((stream.tell() - start) + length)
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
        "Prefixed"
    }
}
