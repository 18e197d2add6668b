use crate::{
    arrays::{preprocess_elements, seq_from_element, seq_to_element, sum_sizes},
    Construct, Container, Context, Element, Error, Expr, ListContainer, Meta, Stream, Value,
};

fn resolve_offset(offset: i64, stream: &Stream) -> Result<u64, Error> {
    let target = if offset < 0 {
        stream.len() as i64 + offset
    } else {
        offset
    };
    u64::try_from(target)
        .map_err(|_| Error::stream(format!("offset {} resolves before stream start", offset), 0))
}

/// Jumps the stream forth and back for one field.
///
/// Parsing and building save the cursor, seek to the evaluated offset
/// (negative offsets count from the end), process the inner construct, and
/// restore the cursor. The field's own size is zero -- bytes land at the
/// target instead -- and preprocessing records the target's footprint as the
/// field's `ptr_size`, reachable from sibling expressions as
/// `_<field>_ptrsize`.
///
/// ```
/// use binform::{byte, ConstructExt, Pointer, Value};
///
/// let d = Pointer::new(4, byte());
/// assert_eq!(d.parse_bytes(b"abcdeZ").unwrap(), Value::Int(b'e' as i64));
/// ```
#[derive(Debug)]
pub struct Pointer {
    offset: Expr,
    subcon: Box<dyn Construct>,
}

impl Pointer {
    /// Processes `subcon` at the evaluated absolute offset
    pub fn new<E: Into<Expr>, C: Construct + 'static>(offset: E, subcon: C) -> Pointer {
        Pointer {
            offset: offset.into(),
            subcon: Box::new(subcon),
        }
    }
}

impl Construct for Pointer {
    fn parse(&self, stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        let target = resolve_offset(self.offset.eval_int(ctx)?, stream)?;
        let fallback = stream.tell();
        stream.seek(target)?;
        let result = self.subcon.parse(stream, ctx);
        stream.seek(fallback)?;
        result
    }

    fn build(&self, obj: &Value, stream: &mut Stream, ctx: &Context) -> Result<(), Error> {
        let target = resolve_offset(self.offset.eval_int(ctx)?, stream)?;
        let fallback = stream.tell();
        stream.seek(target)?;
        let result = self.subcon.build(obj, stream, ctx);
        stream.seek(fallback)?;
        result
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
        // the pointer occupies no bytes of its own; the target region gets
        // offsets relative to its own start
        let (obj, child) = self.subcon.preprocess_size(obj, ctx, 0)?;
        Ok((
            obj,
            Meta {
                offset,
                size: 0,
                end_offset: offset,
                ptr_size: child.size,
            },
        ))
    }

    fn static_sizeof(&self, _ctx: &Context) -> Result<u64, Error> {
        Ok(0)
    }

    fn full_sizeof(&self, obj: &Value, ctx: &Context) -> Result<u64, Error> {
        self.subcon.full_sizeof(obj, ctx)
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
        "Pointer"
    }
}

/// An offset-and-size windowed homogeneous sequence, for formats whose
/// headers carry the location and byte length of an element array.
///
/// Parsing seeks to the evaluated offset and reads elements until exactly
/// the evaluated number of bytes is consumed: when the element size is
/// statically known the window must be a whole multiple of it, and in
/// every case an element that runs past the window is a range error. Like
/// a pointer the field's own size is zero; preprocessing records the
/// sequence footprint as `ptr_size`, so a sibling rebuild can derive the
/// header's size field from `_<field>_ptrsize`.
#[derive(Debug)]
pub struct Area {
    subcon: Box<dyn Construct>,
    offset: Expr,
    size: Expr,
    count: Option<Expr>,
}

impl Area {
    /// Elements of `subcon` filling `size` bytes at `offset`
    pub fn new<C, O, S>(subcon: C, offset: O, size: S) -> Area
    where
        C: Construct + 'static,
        O: Into<Expr>,
        S: Into<Expr>,
    {
        Area {
            subcon: Box::new(subcon),
            offset: offset.into(),
            size: size.into(),
            count: None,
        }
    }

    /// Additionally checks the parsed element count
    pub fn with_count<E: Into<Expr>>(mut self, count: E) -> Area {
        self.count = Some(count.into());
        self
    }
}

impl Construct for Area {
    fn parse(&self, stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        let size = self.size.eval_len(ctx)?;
        let mut list = ListContainer::new();
        if size > 0 {
            let target = resolve_offset(self.offset.eval_int(ctx)?, stream)?;
            if let Ok(elem_size) = self.subcon.static_sizeof(ctx) {
                if elem_size > 0 && size % elem_size != 0 {
                    return Err(Error::range(format!(
                        "window of {} byte(s) is not a multiple of the {} byte element",
                        size, elem_size
                    )));
                }
            }

            let fallback = stream.tell();
            stream.seek(target)?;
            let end = target + size;
            loop {
                let start = stream.tell();
                let v = {
                    let ictx = ctx.enter_list(&list, list.len());
                    self.subcon.parse(stream, &ictx)?
                };
                let pos = stream.tell();
                if pos == start {
                    return Err(Error::range("zero-sized element inside an area window"));
                }
                let at = list.len();
                list.push(v);
                list.set_meta(at, Meta::span(start, pos - start));
                if pos >= end {
                    if pos > end {
                        return Err(Error::range(format!(
                            "element parsing overran the area window by {} byte(s)",
                            pos - end
                        )));
                    }
                    break;
                }
            }
            stream.seek(fallback)?;
        }

        if let Some(count) = &self.count {
            let expected = count.eval_len(ctx)?;
            if list.len() as u64 != expected {
                return Err(Error::range(format!(
                    "expected {} element(s) in area, parsed {}",
                    expected,
                    list.len()
                )));
            }
        }
        Ok(Value::List(list))
    }

    fn build(&self, obj: &Value, stream: &mut Stream, ctx: &Context) -> Result<(), Error> {
        let list = obj.as_list()?;
        let size = self.size.eval_len(ctx)?;
        if list.is_empty() && size == 0 {
            return Ok(());
        }

        let target = resolve_offset(self.offset.eval_int(ctx)?, stream)?;
        let fallback = stream.tell();
        stream.seek(target)?;
        for (i, v) in list.iter().enumerate() {
            let ictx = ctx.enter_list(list, i);
            self.subcon.build(v, stream, &ictx)?;
        }
        let written = stream.tell() - target;
        if written != size {
            return Err(Error::range(format!(
                "area elements occupy {} byte(s) but the window holds {}",
                written, size
            )));
        }
        stream.seek(fallback)
    }

    fn preprocess(&self, obj: Value, ctx: &Context) -> Result<Value, Error> {
        preprocess_elements(&*self.subcon, obj, ctx)
    }

    fn preprocess_size(
        &self,
        obj: Value,
        ctx: &Context,
        offset: u64,
    ) -> Result<(Value, Meta), Error> {
        // window-relative element offsets; the area itself is a fancy
        // pointer with no size of its own
        let mut list = match obj {
            Value::List(l) => l,
            Value::None => ListContainer::new(),
            other => {
                return Err(Error::format(format!(
                    "expected list, got {}",
                    other.type_name()
                )))
            }
        };
        let mut running = 0;
        for i in 0..list.len() {
            let child = list.get(i).cloned().unwrap_or(Value::None);
            let (new, meta) = {
                let ictx = ctx.enter_list(&list, i);
                self.subcon.preprocess_size(child, &ictx, running)?
            };
            running += meta.size;
            list.set(i, new);
            list.set_meta(i, meta);
        }
        Ok((
            Value::List(list),
            Meta {
                offset,
                size: 0,
                end_offset: offset,
                ptr_size: running,
            },
        ))
    }

    fn static_sizeof(&self, _ctx: &Context) -> Result<u64, Error> {
        Ok(0)
    }

    fn full_sizeof(&self, obj: &Value, ctx: &Context) -> Result<u64, Error> {
        sum_sizes(&*self.subcon, obj.as_list()?, ctx)
    }

    fn to_element(
        &self,
        obj: &Value,
        parent: &mut Element,
        name: &str,
        ctx: &Context,
    ) -> Result<Option<Element>, Error> {
        seq_to_element(&*self.subcon, obj.as_list()?, parent, name, ctx)?;
        Ok(None)
    }

    fn from_element(
        &self,
        parent: &Element,
        name: &str,
        out: &mut Container,
        _is_root: bool,
    ) -> Result<(), Error> {
        let list = seq_from_element(&*self.subcon, parent, name)?;
        out.set(name, Value::List(list));
        Ok(())
    }

    fn is_array(&self) -> bool {
        true
    }

    fn is_simple(&self) -> bool {
        self.subcon.is_simple()
    }

    fn tag_names(&self) -> Vec<String> {
        self.subcon.tag_names()
    }

    fn type_tag(&self) -> &'static str {
        "Area"
    }
}
