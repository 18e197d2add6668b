/*!

A declarative, symmetrical codec library for binary data, aimed at reverse
engineering file formats.

A format is described once, by composing primitive and composite building
blocks, and the same description then drives every direction:

- **parse**: bytes into a structured [`Value`]
- **build**: a structured [`Value`] back into bytes
- **preprocess**: decorate a value with offset/size metadata and install
  deferred rebuild expressions, so cross-referencing length and offset
  fields compute themselves
- **element interchange**: the same value as an [`Element`] tree, round-trip

## Quick start

```rust
use binform::{byte, field, this, Array, Const, ConstructExt, Struct, Value};

let bitmap = Struct::new(vec![
    Box::new(Const::bytes(b"BMP")),
    field("width", byte()),
    field("height", byte()),
    field("pixels", Array::new(this().f("width") * this().f("height"), byte())),
]);

let data = [0x42, 0x4d, 0x50, 3, 2, 7, 8, 9, 11, 12, 13];
let v = bitmap.parse_bytes(&data)?;
assert_eq!(v.as_struct()?.get("width"), Some(&Value::Int(3)));
assert_eq!(v.as_struct()?.get("pixels").unwrap().as_list()?.len(), 6);

// the same description builds the same bytes back
assert_eq!(bitmap.build_bytes(&v)?, data);
# Ok::<(), binform::Error>(())
```

## Expressions and rebuilds

Dynamic parameters -- array counts, byte lengths, pointer offsets, switch
keys -- are [expressions](Expr) evaluated against the surrounding record:
`this().f("width") * this().f("height")`, `len_(this().f("items"))`, or an
arbitrary closure via [`lam`].

A [`Rebuild`] field recomputes itself while building, and preprocessing
lets rebuilds reference fields that are themselves rebuilt later:

```rust
use binform::{container, field, le_u32, this, ConstructExt, Rebuild, Struct, Value};

let d = Struct::new(vec![
    field("a", Rebuild::new(le_u32(), this().f("b"))),
    field("b", Rebuild::new(le_u32(), this().f("c"))),
    field("c", le_u32()),
]);

let built = d.build_bytes(&Value::Struct(container! { "c" => 7 }))?;
let v = d.parse_bytes(&built)?;
assert_eq!(v.as_struct()?.get("a"), Some(&Value::Int(7)));
# Ok::<(), binform::Error>(())
```

## Element interchange

[`ConstructExt::to_xml`]/[`ConstructExt::from_xml`] mirror the description
over a minimal [`Element`] tree: records become elements, simple fields
become attributes, sequences of simple fields collapse into one
CSV-bracketed attribute, and switch branches use the case name as the child
tag. Serializing the tree to markup text is left to the caller.

## Scope

The engine favors expressiveness over speed: values are owned, expression
evaluation is interpreted, and nothing is zero-copy. Descriptions are
immutable and freely shared across threads; streams and values belong to a
single operation.

*/
#![warn(missing_docs)]

mod adapters;
mod alignment;
mod arrays;
mod bits;
mod bytes;
mod conditional;
mod construct;
mod context;
mod element;
mod errors;
mod expr;
mod misc;
mod number;
mod pointer;
mod prefixed;
mod stream;
mod strings;
mod structs;
mod tunnel;
mod value;

pub use self::adapters::{Enum, FlagsEnum};
pub use self::alignment::{aligned_struct, padding, Aligned, Padded};
pub use self::arrays::{Array, GreedyRange, PrefixedArray, RepeatUntil};
pub use self::bits::{bit_struct, BitsInteger, Bitwise, Bytewise};
pub use self::bytes::{Bytes, GreedyBytes};
pub use self::conditional::{IfThenElse, Switch};
pub use self::construct::{field, Construct, ConstructExt, Renamed};
pub use self::context::Context;
pub use self::element::Element;
pub use self::errors::{Error, ErrorKind};
pub use self::expr::{lam, len_, this, BinOp, Expr, Path, UnOp};
pub use self::misc::{Check, Computed, Const, DefaultValue, Fail, Pass, Rebuild, Tell, Terminated};
pub use self::number::{
    be_f32, be_f64, be_i16, be_i32, be_i64, be_u16, be_u32, be_u64, byte, int8, le_f32, le_f64,
    le_i16, le_i32, le_i64, le_u16, le_u32, le_u64, Endian, Flag, FormatField,
};
pub use self::pointer::{Area, Pointer};
pub use self::prefixed::Prefixed;
pub use self::stream::Stream;
pub use self::strings::{CString, PaddedString, TextEncoding};
pub use self::structs::{FocusedSeq, Struct};
pub use self::tunnel::{Codec, Compressed, ZlibCodec};
pub use self::value::{Container, ListContainer, Meta, Value};
