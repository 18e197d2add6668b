use crate::{Construct, Context, Error, Expr, Stream, Value};

/// A named character encoding for text fields.
///
/// Decoding is strict: bytes the encoding cannot represent fail with a
/// format error instead of being replaced, and encoding rejects characters
/// the target encoding cannot express.
///
/// ```
/// use binform::TextEncoding;
///
/// let enc = TextEncoding::windows1252();
/// assert_eq!(enc.decode(b"caf\xe9").unwrap(), "café");
/// assert_eq!(enc.encode("café").unwrap(), b"caf\xe9");
/// assert!(TextEncoding::utf8().decode(b"\xff").is_err());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TextEncoding(&'static encoding_rs::Encoding);

impl TextEncoding {
    /// UTF-8
    pub fn utf8() -> TextEncoding {
        TextEncoding(encoding_rs::UTF_8)
    }

    /// Windows code page 1252
    pub fn windows1252() -> TextEncoding {
        TextEncoding(encoding_rs::WINDOWS_1252)
    }

    /// Looks an encoding up by label, e.g. `"latin1"` or `"utf-16le"`
    pub fn named(label: &str) -> Option<TextEncoding> {
        encoding_rs::Encoding::for_label(label.as_bytes()).map(TextEncoding)
    }

    /// Decodes bytes, rejecting undecodable input
    pub fn decode(&self, data: &[u8]) -> Result<String, Error> {
        self.0
            .decode_without_bom_handling_and_without_replacement(data)
            .map(|s| s.into_owned())
            .ok_or_else(|| {
                Error::format(format!("bytes are not valid {}", self.0.name()))
            })
    }

    /// Encodes text, rejecting unmappable characters
    pub fn encode(&self, s: &str) -> Result<Vec<u8>, Error> {
        let (out, _, had_errors) = self.0.encode(s);
        if had_errors {
            return Err(Error::format(format!(
                "text is not representable in {}",
                self.0.name()
            )));
        }
        Ok(out.into_owned())
    }
}

/// NUL-terminated text in a chosen encoding.
///
/// Parsing accumulates bytes up to a terminator (which is consumed and
/// discarded) and decodes them; building encodes and appends the
/// terminator. Text containing a NUL cannot be built.
#[derive(Debug)]
pub struct CString {
    encoding: TextEncoding,
}

impl CString {
    /// NUL-terminated text decoded per `encoding`
    pub fn new(encoding: TextEncoding) -> CString {
        CString { encoding }
    }
}

impl Construct for CString {
    fn parse(&self, stream: &mut Stream, _ctx: &Context) -> Result<Value, Error> {
        let mut data = Vec::new();
        loop {
            let b = stream.read(1)?[0];
            if b == 0 {
                break;
            }
            data.push(b);
        }
        Ok(Value::Str(self.encoding.decode(&data)?))
    }

    fn build(&self, obj: &Value, stream: &mut Stream, _ctx: &Context) -> Result<(), Error> {
        let data = self.encoding.encode(obj.as_str()?)?;
        if data.contains(&0) {
            return Err(Error::format("text contains an embedded terminator"));
        }
        stream.write(&data)?;
        stream.write(&[0])
    }

    fn sizeof(&self, obj: &Value, _ctx: &Context) -> Result<u64, Error> {
        Ok(self.encoding.encode(obj.as_str()?)?.len() as u64 + 1)
    }

    fn attr_encode(&self, obj: &Value) -> Result<String, Error> {
        Ok(obj.as_str()?.to_string())
    }

    fn attr_decode(&self, s: &str) -> Result<Value, Error> {
        Ok(Value::Str(s.to_string()))
    }

    fn is_simple(&self) -> bool {
        true
    }

    fn type_tag(&self) -> &'static str {
        "CString"
    }
}

/// Fixed-width text padded with NULs in a chosen encoding.
///
/// Parsing reads the full width and strips trailing NULs before decoding;
/// building pads the encoded text up to the width and rejects text that
/// does not fit.
#[derive(Debug)]
pub struct PaddedString {
    length: Expr,
    encoding: TextEncoding,
}

impl PaddedString {
    /// Text occupying exactly `length` bytes
    pub fn new<E: Into<Expr>>(length: E, encoding: TextEncoding) -> PaddedString {
        PaddedString {
            length: length.into(),
            encoding,
        }
    }
}

impl Construct for PaddedString {
    fn parse(&self, stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        let length = self.length.eval_len(ctx)?;
        let mut data = stream.read(length as usize)?;
        while data.last() == Some(&0) {
            data.pop();
        }
        Ok(Value::Str(self.encoding.decode(&data)?))
    }

    fn build(&self, obj: &Value, stream: &mut Stream, ctx: &Context) -> Result<(), Error> {
        let length = self.length.eval_len(ctx)?;
        let data = self.encoding.encode(obj.as_str()?)?;
        let pad = length.checked_sub(data.len() as u64).ok_or_else(|| {
            Error::range(format!(
                "encoded text takes {} byte(s) but the field holds {}",
                data.len(),
                length
            ))
        })?;
        stream.write(&data)?;
        stream.write(&vec![0; pad as usize])
    }

    fn static_sizeof(&self, ctx: &Context) -> Result<u64, Error> {
        self.length
            .eval_len(ctx)
            .map_err(|_| Error::unknown_size("string field length is context dependent"))
    }

    fn attr_encode(&self, obj: &Value) -> Result<String, Error> {
        Ok(obj.as_str()?.to_string())
    }

    fn attr_decode(&self, s: &str) -> Result<Value, Error> {
        Ok(Value::Str(s.to_string()))
    }

    fn is_simple(&self) -> bool {
        true
    }

    fn type_tag(&self) -> &'static str {
        "PaddedString"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConstructExt;

    #[test]
    fn test_cstring_roundtrip() {
        let d = CString::new(TextEncoding::utf8());
        let v = d.parse_bytes(b"caf\xc3\xa9\x00tail").unwrap();
        assert_eq!(v, Value::Str("café".into()));
        assert_eq!(d.build_bytes(&v).unwrap(), b"caf\xc3\xa9\x00");
        assert_eq!(d.size_of(&v).unwrap(), 6);
    }

    #[test]
    fn test_cstring_requires_terminator() {
        let d = CString::new(TextEncoding::utf8());
        assert!(d.parse_bytes(b"oops").is_err());
    }

    #[test]
    fn test_padded_string() {
        let d = PaddedString::new(8, TextEncoding::windows1252());
        let v = d.parse_bytes(b"caf\xe9\x00\x00\x00\x00").unwrap();
        assert_eq!(v, Value::Str("café".into()));
        assert_eq!(d.build_bytes(&v).unwrap(), b"caf\xe9\x00\x00\x00\x00");
        assert!(d.build_bytes(&Value::Str("much too long".into())).is_err());
    }

    #[test]
    fn test_unmappable_text_rejected() {
        let d = PaddedString::new(8, TextEncoding::windows1252());
        assert!(d.build_bytes(&Value::Str("日本語".into())).is_err());
    }
}
