use crate::{
    element::{list_to_string, string_to_list},
    Construct, Container, Context, Element, Error, Expr, ListContainer, Meta, Stream, Value,
};
use std::fmt;
use std::sync::Arc;

/// A homogeneous sequence with an exact element count from an expression.
///
/// Parsing reads exactly `count` elements into a [`ListContainer`], each in
/// a child context that exposes `_index`. Building requires the given list
/// to have exactly `count` elements. The static size is `count × element
/// size` when both are known.
///
/// ```
/// use binform::{byte, Array, ConstructExt, Value};
///
/// let d = Array::new(3, byte());
/// let v = d.parse_bytes(&[1, 2, 3]).unwrap();
/// assert_eq!(v.as_list().unwrap().len(), 3);
/// assert_eq!(d.build_bytes(&v).unwrap(), vec![1, 2, 3]);
/// ```
#[derive(Debug)]
pub struct Array {
    count: Expr,
    subcon: Box<dyn Construct>,
}

impl Array {
    /// A sequence of `count` elements
    pub fn new<E: Into<Expr>, C: Construct + 'static>(count: E, subcon: C) -> Array {
        Array {
            count: count.into(),
            subcon: Box::new(subcon),
        }
    }
}

impl Construct for Array {
    fn parse(&self, stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        let count = self.count.eval_len(ctx)?;
        let mut list = ListContainer::new();
        for i in 0..count {
            let start = stream.tell();
            let v = {
                let ictx = ctx.enter_list(&list, i as usize);
                self.subcon.parse(stream, &ictx)?
            };
            let end = stream.tell();
            list.push(v);
            list.set_meta(i as usize, Meta::span(start, end - start));
        }
        Ok(Value::List(list))
    }

    fn build(&self, obj: &Value, stream: &mut Stream, ctx: &Context) -> Result<(), Error> {
        let count = self.count.eval_len(ctx)?;
        let list = obj.as_list()?;
        if list.len() as u64 != count {
            return Err(Error::range(format!(
                "expected {} element(s), found {}",
                count,
                list.len()
            )));
        }
        build_elements(&*self.subcon, list, stream, ctx)
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
        preprocess_size_elements(&*self.subcon, obj, ctx, offset)
    }

    fn static_sizeof(&self, ctx: &Context) -> Result<u64, Error> {
        let count = self
            .count
            .eval_len(ctx)
            .map_err(|_| Error::unknown_size("sequence count is context dependent"))?;
        Ok(count * self.subcon.static_sizeof(ctx)?)
    }

    fn sizeof(&self, obj: &Value, ctx: &Context) -> Result<u64, Error> {
        match self.static_sizeof(ctx) {
            Ok(n) => Ok(n),
            Err(err) if err.is_unknown_size() => sum_sizes(&*self.subcon, obj.as_list()?, ctx),
            Err(err) => Err(err),
        }
    }

    fn full_sizeof(&self, obj: &Value, ctx: &Context) -> Result<u64, Error> {
        let list = obj.as_list()?;
        let mut total = 0;
        for (i, v) in list.iter().enumerate() {
            let ictx = ctx.enter_list(list, i);
            total += self.subcon.full_sizeof(v, &ictx)?;
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
        "Array"
    }
}

/// A homogeneous sequence that parses until the stream runs dry.
///
/// Parsing repeats the element until it fails cleanly -- a stream underflow
/// or a format-class mismatch -- then rewinds to the end of the last
/// complete element and stops. Explicit failures raised by user expressions
/// propagate. Building writes every element. The size is value-dependent.
#[derive(Debug)]
pub struct GreedyRange {
    subcon: Box<dyn Construct>,
}

impl GreedyRange {
    /// A sequence consuming elements to the end of the stream
    pub fn new<C: Construct + 'static>(subcon: C) -> GreedyRange {
        GreedyRange {
            subcon: Box::new(subcon),
        }
    }
}

impl Construct for GreedyRange {
    fn parse(&self, stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        let mut list = ListContainer::new();
        loop {
            let fallback = stream.tell();
            let parsed = {
                let ictx = ctx.enter_list(&list, list.len());
                self.subcon.parse(stream, &ictx)
            };
            match parsed {
                Ok(v) => {
                    let end = stream.tell();
                    let at = list.len();
                    list.push(v);
                    list.set_meta(at, Meta::span(fallback, end - fallback));
                }
                Err(err) if err.ends_sequence() => {
                    stream.seek(fallback)?;
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(Value::List(list))
    }

    fn build(&self, obj: &Value, stream: &mut Stream, ctx: &Context) -> Result<(), Error> {
        build_elements(&*self.subcon, obj.as_list()?, stream, ctx)
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
        preprocess_size_elements(&*self.subcon, obj, ctx, offset)
    }

    fn sizeof(&self, obj: &Value, ctx: &Context) -> Result<u64, Error> {
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
        "GreedyRange"
    }
}

type Predicate = dyn Fn(&Value, &ListContainer, &Context) -> Result<bool, Error> + Send + Sync;

/// A homogeneous sequence that repeats until a predicate holds for the last
/// element, which stays in the result.
///
/// Building replays the predicate over the given elements and fails when no
/// element matches it.
pub struct RepeatUntil {
    predicate: Arc<Predicate>,
    subcon: Box<dyn Construct>,
}

impl RepeatUntil {
    /// Repeats `subcon` until `predicate(last, all_so_far, ctx)` holds
    pub fn new<C, F>(predicate: F, subcon: C) -> RepeatUntil
    where
        C: Construct + 'static,
        F: Fn(&Value, &ListContainer, &Context) -> Result<bool, Error> + Send + Sync + 'static,
    {
        RepeatUntil {
            predicate: Arc::new(predicate),
            subcon: Box::new(subcon),
        }
    }
}

impl fmt::Debug for RepeatUntil {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RepeatUntil")
            .field("subcon", &self.subcon)
            .finish_non_exhaustive()
    }
}

impl Construct for RepeatUntil {
    fn parse(&self, stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        let mut list = ListContainer::new();
        loop {
            let start = stream.tell();
            let v = {
                let ictx = ctx.enter_list(&list, list.len());
                self.subcon.parse(stream, &ictx)?
            };
            let end = stream.tell();
            let at = list.len();
            list.push(v.clone());
            list.set_meta(at, Meta::span(start, end - start));
            if (self.predicate)(&v, &list, ctx)? {
                return Ok(Value::List(list));
            }
        }
    }

    fn build(&self, obj: &Value, stream: &mut Stream, ctx: &Context) -> Result<(), Error> {
        let list = obj.as_list()?;
        for (i, v) in list.iter().enumerate() {
            {
                let ictx = ctx.enter_list(list, i);
                self.subcon.build(v, stream, &ictx)?;
            }
            if (self.predicate)(v, list, ctx)? {
                return Ok(());
            }
        }
        Err(Error::range(
            "no element matched the repeat predicate while building",
        ))
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
        preprocess_size_elements(&*self.subcon, obj, ctx, offset)
    }

    fn sizeof(&self, obj: &Value, ctx: &Context) -> Result<u64, Error> {
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
        "RepeatUntil"
    }
}

/// An element count followed by that many elements.
///
/// Building derives the count from the list length, so no count needs to be
/// supplied. `expected_sizeof` reads only the prefix and reports
/// `prefix size + count × element size` without touching the body.
///
/// ```
/// use binform::{byte, items, le_u16, ConstructExt, PrefixedArray, Value};
///
/// let d = PrefixedArray::new(byte(), le_u16());
/// assert_eq!(
///     d.build_bytes(&Value::List(items![256, 257])).unwrap(),
///     vec![2, 0, 1, 1, 1]
/// );
/// ```
#[derive(Debug)]
pub struct PrefixedArray {
    count_field: Box<dyn Construct>,
    subcon: Box<dyn Construct>,
}

impl PrefixedArray {
    /// A sequence prefixed by its element count stored in `count_field`
    pub fn new<P, C>(count_field: P, subcon: C) -> PrefixedArray
    where
        P: Construct + 'static,
        C: Construct + 'static,
    {
        PrefixedArray {
            count_field: Box::new(count_field),
            subcon: Box::new(subcon),
        }
    }
}

impl Construct for PrefixedArray {
    fn parse(&self, stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        let count = self.count_field.parse(stream, ctx)?.as_len()?;
        let mut list = ListContainer::new();
        for i in 0..count {
            let start = stream.tell();
            let v = {
                let ictx = ctx.enter_list(&list, i as usize);
                self.subcon.parse(stream, &ictx)?
            };
            let end = stream.tell();
            list.push(v);
            list.set_meta(i as usize, Meta::span(start, end - start));
        }
        Ok(Value::List(list))
    }

    fn build(&self, obj: &Value, stream: &mut Stream, ctx: &Context) -> Result<(), Error> {
        let list = obj.as_list()?;
        self.count_field
            .build(&Value::Int(list.len() as i64), stream, ctx)?;
        build_elements(&*self.subcon, list, stream, ctx)
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
        let prefix = self.count_field.static_sizeof(ctx)?;
        let (obj, items) = preprocess_size_elements(&*self.subcon, obj, ctx, offset + prefix)?;
        Ok((obj, Meta::span(offset, prefix + items.size)))
    }

    fn sizeof(&self, obj: &Value, ctx: &Context) -> Result<u64, Error> {
        let list = obj.as_list()?;
        let prefix = self
            .count_field
            .sizeof(&Value::Int(list.len() as i64), ctx)?;
        Ok(prefix + sum_sizes(&*self.subcon, list, ctx)?)
    }

    fn expected_sizeof(&self, stream: &mut Stream, ctx: &Context) -> Result<u64, Error> {
        let start = stream.tell();
        let count = self.count_field.parse(stream, ctx)?.as_len()?;
        let prefix = stream.tell() - start;
        Ok(prefix + count * self.subcon.static_sizeof(ctx)?)
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
        "PrefixedArray"
    }
}

pub(crate) fn build_elements(
    subcon: &dyn Construct,
    list: &ListContainer,
    stream: &mut Stream,
    ctx: &Context,
) -> Result<(), Error> {
    for (i, v) in list.iter().enumerate() {
        let ictx = ctx.enter_list(list, i);
        subcon.build(v, stream, &ictx)?;
    }
    Ok(())
}

pub(crate) fn preprocess_elements(
    subcon: &dyn Construct,
    obj: Value,
    ctx: &Context,
) -> Result<Value, Error> {
    let mut list = unpack_list(obj)?;
    for i in 0..list.len() {
        let child = list.get(i).cloned().unwrap_or(Value::None);
        let new = {
            let ictx = ctx.enter_list(&list, i);
            subcon.preprocess(child, &ictx)?
        };
        list.set(i, new);
    }
    Ok(Value::List(list))
}

pub(crate) fn preprocess_size_elements(
    subcon: &dyn Construct,
    obj: Value,
    ctx: &Context,
    offset: u64,
) -> Result<(Value, Meta), Error> {
    let mut list = unpack_list(obj)?;
    let mut running = offset;
    for i in 0..list.len() {
        let child = list.get(i).cloned().unwrap_or(Value::None);
        let (new, meta) = {
            let ictx = ctx.enter_list(&list, i);
            subcon.preprocess_size(child, &ictx, running)?
        };
        running += meta.size;
        list.set(i, new);
        list.set_meta(i, meta);
    }
    Ok((Value::List(list), Meta::span(offset, running - offset)))
}

pub(crate) fn sum_sizes(
    subcon: &dyn Construct,
    list: &ListContainer,
    ctx: &Context,
) -> Result<u64, Error> {
    let mut total = 0;
    for (i, v) in list.iter().enumerate() {
        let ictx = ctx.enter_list(list, i);
        total += subcon.sizeof(v, &ictx)?;
    }
    Ok(total)
}

fn unpack_list(obj: Value) -> Result<ListContainer, Error> {
    match obj {
        Value::List(l) => Ok(l),
        Value::None => Ok(ListContainer::new()),
        other => Err(Error::format(format!(
            "expected list, got {}",
            other.type_name()
        ))),
    }
}

fn item_tag(subcon: &dyn Construct) -> String {
    subcon
        .tag_names()
        .into_iter()
        .next()
        .unwrap_or_else(|| subcon.type_tag().to_string())
}

/// Renders a sequence into the element tree: one CSV-bracketed attribute
/// for simple elements, repeated child elements otherwise
pub(crate) fn seq_to_element(
    subcon: &dyn Construct,
    list: &ListContainer,
    parent: &mut Element,
    name: &str,
    ctx: &Context,
) -> Result<(), Error> {
    if subcon.is_array() {
        return Err(Error::xml(
            "nested sequences have no element representation",
        ));
    }

    if subcon.is_simple() {
        let mut parts = Vec::with_capacity(list.len());
        for v in list.iter() {
            parts.push(subcon.attr_encode(v)?);
        }
        parent.set_attr(name, format!("[{}]", list_to_string(&parts)));
        return Ok(());
    }

    let tag = item_tag(subcon);
    for (i, v) in list.iter().enumerate() {
        let child = {
            let ictx = ctx.enter_list(list, i);
            subcon.to_element(v, parent, &tag, &ictx)?
        };
        if let Some(child) = child {
            parent.append(child);
        }
    }
    Ok(())
}

/// Reads a sequence back out of the element tree
pub(crate) fn seq_from_element(
    subcon: &dyn Construct,
    parent: &Element,
    name: &str,
) -> Result<ListContainer, Error> {
    if subcon.is_array() {
        return Err(Error::xml(
            "nested sequences have no element representation",
        ));
    }

    let mut list = ListContainer::new();
    if subcon.is_simple() {
        let attr = parent
            .attr(name)
            .ok_or_else(|| Error::xml(format!("missing attribute {}", name)))?;
        let inner = attr
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .ok_or_else(|| Error::xml(format!("expected a bracketed list in {}", name)))?;
        for part in string_to_list(inner) {
            list.push(subcon.attr_decode(&part)?);
        }
        return Ok(list);
    }

    let mut tags = subcon.tag_names();
    if tags.is_empty() {
        tags.push(subcon.type_tag().to_string());
    }
    for child in parent.children() {
        if !tags.iter().any(|t| t == child.tag()) {
            continue;
        }
        let mut tmp = Container::new();
        subcon.from_element(child, child.tag(), &mut tmp, true)?;
        let v = tmp.remove(child.tag()).ok_or_else(|| {
            Error::xml(format!("element {} produced no value", child.tag()))
        })?;
        list.push(v);
    }
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{byte, items, le_u16, ConstructExt};

    #[test]
    fn test_array_count_mismatch() {
        let d = Array::new(3, byte());
        assert!(d.build_bytes(&Value::List(items![1, 2])).is_err());
    }

    #[test]
    fn test_array_meta_per_index() {
        let d = Array::new(2, le_u16());
        let v = d.parse_bytes(&[1, 0, 2, 0]).unwrap();
        let list = v.as_list().unwrap();
        assert_eq!(list.meta(0).unwrap().offset, 0);
        assert_eq!(list.meta(1).unwrap().offset, 2);
        assert_eq!(list.meta(1).unwrap().end_offset, 4);
    }

    #[test]
    fn test_greedy_range_stops_cleanly() {
        let d = GreedyRange::new(le_u16());
        let v = d.parse_bytes(&[1, 0, 2, 0, 3]).unwrap();
        let list = v.as_list().unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_repeat_until_includes_match() {
        let d = RepeatUntil::new(|v: &Value, _: &ListContainer, _: &Context| {
            Ok(v.as_int()? == 0)
        }, byte());
        let v = d.parse_bytes(&[5, 3, 0, 9]).unwrap();
        assert_eq!(v.as_list().unwrap().len(), 3);

        let built = d.build_bytes(&Value::List(items![5, 3, 0])).unwrap();
        assert_eq!(built, vec![5, 3, 0]);
        assert!(d.build_bytes(&Value::List(items![5, 3])).is_err());
    }

    #[test]
    fn test_prefixed_array_roundtrip() {
        let d = PrefixedArray::new(byte(), le_u16());
        let v = d.parse_bytes(&[2, 1, 0, 2, 0]).unwrap();
        assert_eq!(v.as_list().unwrap().len(), 2);
        assert_eq!(d.build_bytes(&v).unwrap(), vec![2, 1, 0, 2, 0]);
    }

    #[test]
    fn test_prefixed_array_expected_size() {
        let d = PrefixedArray::new(byte(), le_u16());
        let mut stream = Stream::from_bytes(vec![3, 1, 0, 2, 0, 3, 0]);
        let ctx = Context::root();
        assert_eq!(d.expected_sizeof(&mut stream, &ctx).unwrap(), 7);
        assert_eq!(stream.tell(), 1);
    }
}
