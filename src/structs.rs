use crate::{Construct, Container, Context, Element, Error, Meta, Stream, Value};

/// An ordered sequence of named fields, parsed and built in declaration
/// order.
///
/// Parsing produces a [`Container`] keyed by field name; every field is
/// parsed in a child context over the partially-built record, so its
/// expressions see the fields declared before it. Offset, size, and end
/// offset are recorded per field both while parsing and while
/// preprocessing, and are reachable from sibling expressions through the
/// flattened `_<field>_offset` aliases. Building walks the declaration
/// order and fails when a field without a build-from-nothing fallback has
/// no entry in the record. The static size is the sum of the member sizes
/// when every member is static.
///
/// ```
/// use binform::{byte, field, this, Array, ConstructExt, Struct, Value};
///
/// let d = Struct::new(vec![
///     field("width", byte()),
///     field("height", byte()),
///     field("pixels", Array::new(this().f("width") * this().f("height"), byte())),
/// ]);
///
/// let v = d.parse_bytes(&[2, 2, 9, 9, 9, 9]).unwrap();
/// assert_eq!(v.as_struct().unwrap().get("width"), Some(&Value::Int(2)));
/// assert_eq!(d.build_bytes(&v).unwrap(), vec![2, 2, 9, 9, 9, 9]);
/// ```
#[derive(Debug)]
pub struct Struct {
    fields: Vec<Box<dyn Construct>>,
}

impl Struct {
    /// A record with the given members; name them with
    /// [`field`](crate::field), or pass unnamed constructs (constants,
    /// padding) boxed directly
    pub fn new(fields: Vec<Box<dyn Construct>>) -> Struct {
        Struct { fields }
    }

    fn unpack(obj: Value) -> Result<Container, Error> {
        match obj {
            Value::Struct(c) => Ok(c),
            Value::None => Ok(Container::new()),
            other => Err(Error::format(format!(
                "expected struct, got {}",
                other.type_name()
            ))),
        }
    }
}

impl Construct for Struct {
    fn parse(&self, stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        let mut con = Container::new();
        for f in &self.fields {
            let start = stream.tell();
            let v = {
                let fctx = ctx.enter_struct(&con);
                f.parse(stream, &fctx)?
            };
            let end = stream.tell();
            if let Some(name) = f.name() {
                con.set(name, v);
                con.set_meta(name, Meta::span(start, end - start));
            }
        }
        Ok(Value::Struct(con))
    }

    fn build(&self, obj: &Value, stream: &mut Stream, ctx: &Context) -> Result<(), Error> {
        let empty;
        let con = match obj {
            Value::Struct(c) => c,
            Value::None => {
                empty = Container::new();
                &empty
            }
            other => {
                return Err(Error::format(format!(
                    "expected struct, got {}",
                    other.type_name()
                )))
            }
        };

        for f in &self.fields {
            let name = f.name();
            let v = match name.and_then(|n| con.get(n)) {
                Some(v) => v.clone(),
                None => {
                    if let (Some(n), false) = (name, f.builds_from_none()) {
                        return Err(Error::context(format!(
                            "no value for field {} while building",
                            n
                        )));
                    }
                    Value::None
                }
            };
            let fctx = ctx.enter_struct(con);
            f.build(&v, stream, &fctx)?;
        }
        Ok(())
    }

    fn preprocess(&self, obj: Value, ctx: &Context) -> Result<Value, Error> {
        let mut con = Self::unpack(obj)?;
        for f in &self.fields {
            let name = f.name();
            let child = name
                .and_then(|n| con.get(n).cloned())
                .unwrap_or(Value::None);
            let new = {
                let fctx = ctx.enter_struct(&con);
                f.preprocess(child, &fctx)?
            };
            if let Some(n) = name {
                con.set(n, new);
            }
        }
        Ok(Value::Struct(con))
    }

    fn preprocess_size(
        &self,
        obj: Value,
        ctx: &Context,
        offset: u64,
    ) -> Result<(Value, Meta), Error> {
        let mut con = Self::unpack(obj)?;
        let mut running = offset;
        for f in &self.fields {
            let name = f.name();
            let child = name
                .and_then(|n| con.get(n).cloned())
                .unwrap_or(Value::None);
            let (new, meta) = {
                let fctx = ctx.enter_struct(&con);
                f.preprocess_size(child, &fctx, running)?
            };
            running += meta.size;
            if let Some(n) = name {
                con.set(n, new);
                con.set_meta(n, meta);
            }
        }
        Ok((Value::Struct(con), Meta::span(offset, running - offset)))
    }

    fn static_sizeof(&self, ctx: &Context) -> Result<u64, Error> {
        let mut total = 0;
        for f in &self.fields {
            total += f.static_sizeof(ctx)?;
        }
        Ok(total)
    }

    fn sizeof(&self, obj: &Value, ctx: &Context) -> Result<u64, Error> {
        if let Ok(n) = self.static_sizeof(ctx) {
            return Ok(n);
        }
        let con = obj.as_struct()?;
        let fctx = ctx.enter_struct(con);
        let mut total = 0;
        for f in &self.fields {
            match f.static_sizeof(&fctx) {
                Ok(n) => total += n,
                Err(err) if err.is_unknown_size() => {
                    let child = f
                        .name()
                        .and_then(|n| con.get(n).cloned())
                        .unwrap_or(Value::None);
                    let child = fctx.force(child)?;
                    total += f.sizeof(&child, &fctx)?;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(total)
    }

    fn full_sizeof(&self, obj: &Value, ctx: &Context) -> Result<u64, Error> {
        let con = obj.as_struct()?;
        let fctx = ctx.enter_struct(con);
        let mut total = 0;
        for f in &self.fields {
            let child = f
                .name()
                .and_then(|n| con.get(n).cloned())
                .unwrap_or(Value::None);
            let child = fctx.force(child)?;
            total += f.full_sizeof(&child, &fctx)?;
        }
        Ok(total)
    }

    fn to_element(
        &self,
        obj: &Value,
        _parent: &mut Element,
        name: &str,
        ctx: &Context,
    ) -> Result<Option<Element>, Error> {
        let con = obj.as_struct()?;
        let mut elem = Element::new(name);
        let fctx = ctx.enter_struct(con);
        for f in &self.fields {
            let fname = match f.name() {
                Some(n) if !n.starts_with('_') => n,
                _ => continue,
            };
            let child = con.get(fname).cloned().unwrap_or(Value::None);
            if let Some(child_elem) = f.to_element(&child, &mut elem, fname, &fctx)? {
                elem.append(child_elem);
            }
        }
        Ok(Some(elem))
    }

    fn from_element(
        &self,
        parent: &Element,
        name: &str,
        out: &mut Container,
        is_root: bool,
    ) -> Result<(), Error> {
        let elem = if is_root {
            parent
        } else {
            parent
                .find(name)
                .ok_or_else(|| Error::xml(format!("missing element {}", name)))?
        };
        let mut sub = Container::new();
        for f in &self.fields {
            let fname = f.name().unwrap_or("");
            f.from_element(elem, fname, &mut sub, false)?;
        }
        out.set(name, Value::Struct(sub));
        Ok(())
    }

    fn is_struct(&self) -> bool {
        true
    }

    fn type_tag(&self) -> &'static str {
        "Struct"
    }
}

/// A record whose value surface is a single chosen member; the other
/// members are schema glue (constants, rebuilds, padding).
///
/// Parsing parses every member but returns only the focused one. Building
/// hands the given value to the focused member and builds the rest from
/// nothing.
///
/// ```
/// use binform::{byte, field, Const, ConstructExt, FocusedSeq, Value};
///
/// let d = FocusedSeq::new(
///     "num",
///     vec![
///         Box::new(Const::bytes(b"SIG")),
///         field("num", byte()),
///     ],
/// );
/// assert_eq!(d.parse_bytes(b"SIG\xff").unwrap(), Value::Int(255));
/// assert_eq!(d.build_bytes(&Value::Int(255)).unwrap(), b"SIG\xff");
/// ```
#[derive(Debug)]
pub struct FocusedSeq {
    focus: String,
    fields: Vec<Box<dyn Construct>>,
}

impl FocusedSeq {
    /// A sequence focused on the member named `focus`
    pub fn new(focus: impl Into<String>, fields: Vec<Box<dyn Construct>>) -> FocusedSeq {
        FocusedSeq {
            focus: focus.into(),
            fields,
        }
    }

    fn focused(&self) -> Result<&dyn Construct, Error> {
        self.fields
            .iter()
            .find(|f| f.name() == Some(self.focus.as_str()))
            .map(|f| &**f as &dyn Construct)
            .ok_or_else(|| Error::context(format!("no member named {}", self.focus)))
    }
}

impl Construct for FocusedSeq {
    fn parse(&self, stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        let mut con = Container::new();
        let mut focused = Value::None;
        for f in &self.fields {
            let v = {
                let fctx = ctx.enter_struct(&con);
                f.parse(stream, &fctx)?
            };
            if let Some(name) = f.name() {
                if name == self.focus {
                    focused = v.clone();
                }
                con.set(name, v);
            }
        }
        Ok(focused)
    }

    fn build(&self, obj: &Value, stream: &mut Stream, ctx: &Context) -> Result<(), Error> {
        let mut con = Container::new();
        con.set(&self.focus, obj.clone());
        for f in &self.fields {
            let v = if f.name() == Some(self.focus.as_str()) {
                obj.clone()
            } else {
                Value::None
            };
            let fctx = ctx.enter_struct(&con);
            f.build(&v, stream, &fctx)?;
        }
        Ok(())
    }

    fn static_sizeof(&self, ctx: &Context) -> Result<u64, Error> {
        let mut total = 0;
        for f in &self.fields {
            total += f.static_sizeof(ctx)?;
        }
        Ok(total)
    }

    fn sizeof(&self, obj: &Value, ctx: &Context) -> Result<u64, Error> {
        if let Ok(n) = self.static_sizeof(ctx) {
            return Ok(n);
        }
        let mut con = Container::new();
        con.set(&self.focus, obj.clone());
        let fctx = ctx.enter_struct(&con);
        let mut total = 0;
        for f in &self.fields {
            match f.static_sizeof(&fctx) {
                Ok(n) => total += n,
                Err(err) if err.is_unknown_size() && f.name() == Some(self.focus.as_str()) => {
                    total += f.sizeof(obj, &fctx)?;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(total)
    }

    fn to_element(
        &self,
        obj: &Value,
        parent: &mut Element,
        name: &str,
        ctx: &Context,
    ) -> Result<Option<Element>, Error> {
        // the focused member's own rename loses to the caller-supplied name
        // (a count-prefixed wrapper names its payload internally)
        let f = self.focused()?;
        let bare = f.renamed_inner().unwrap_or(f);
        let mut con = Container::new();
        con.set(&self.focus, obj.clone());
        let fctx = ctx.enter_struct(&con);
        bare.to_element(obj, parent, name, &fctx)
    }

    fn from_element(
        &self,
        parent: &Element,
        name: &str,
        out: &mut Container,
        is_root: bool,
    ) -> Result<(), Error> {
        let f = self.focused()?;
        let bare = f.renamed_inner().unwrap_or(f);
        if bare.is_simple() || bare.is_array() {
            return bare.from_element(parent, name, out, is_root);
        }
        // locate the element by the caller's name, then hand it over as the
        // root so the focused member does not search for its internal name
        let elem = if is_root {
            parent
        } else {
            parent
                .find(name)
                .ok_or_else(|| Error::xml(format!("missing element {}", name)))?
        };
        bare.from_element(elem, name, out, true)
    }

    fn is_simple(&self) -> bool {
        self.focused().map(|f| f.is_simple()).unwrap_or(false)
    }

    fn is_array(&self) -> bool {
        self.focused().map(|f| f.is_array()).unwrap_or(false)
    }

    fn tag_names(&self) -> Vec<String> {
        self.focused().map(|f| f.tag_names()).unwrap_or_default()
    }

    fn type_tag(&self) -> &'static str {
        "FocusedSeq"
    }
}
