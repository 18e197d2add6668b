use crate::{Construct, Container, Context, Element, Error, Stream, Value};
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use std::fmt;
use std::io::{Read, Write};

/// A byte-to-byte transformation applied between the stream and an inner
/// construct.
///
/// Implementations must be bijective on well-formed inputs:
/// `decode(encode(x)) == x`.
pub trait Codec: fmt::Debug + Send + Sync {
    /// Transforms plain bytes into their stream representation
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>, Error>;

    /// Transforms stream bytes back into plain bytes
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, Error>;
}

/// The zlib instance of [`Codec`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ZlibCodec;

impl Codec for ZlibCodec {
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        ZlibDecoder::new(data).read_to_end(&mut out)?;
        Ok(out)
    }
}

/// Tunnels an inner construct through a byte codec, typically compression.
///
/// Parsing reads the rest of the stream (wrap in a
/// [`Prefixed`](crate::Prefixed) to bound it), decodes it, and parses the
/// inner construct from the decoded bytes; building reverses the process.
/// The size on the wire depends on the codec, so no size view is available.
///
/// Element-tree interchange serializes the decoded inner form, which makes
/// it lossy under codecs with multiple valid encodings.
///
/// ```
/// use binform::{ConstructExt, Compressed, GreedyBytes, Value, ZlibCodec};
///
/// let d = Compressed::new(GreedyBytes, ZlibCodec);
/// let v = Value::Bytes(b"aaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_vec());
/// let wire = d.build_bytes(&v).unwrap();
/// assert!(wire.len() < 28);
/// assert_eq!(d.parse_bytes(&wire).unwrap(), v);
/// ```
#[derive(Debug)]
pub struct Compressed {
    subcon: Box<dyn Construct>,
    codec: Box<dyn Codec>,
}

impl Compressed {
    /// Tunnels `subcon` through `codec`
    pub fn new<C, K>(subcon: C, codec: K) -> Compressed
    where
        C: Construct + 'static,
        K: Codec + 'static,
    {
        Compressed {
            subcon: Box::new(subcon),
            codec: Box::new(codec),
        }
    }
}

impl Construct for Compressed {
    fn parse(&self, stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        let wire = stream.read_to_end()?;
        let plain = self.codec.decode(&wire)?;
        let mut substream = Stream::from_bytes(plain);
        self.subcon.parse(&mut substream, ctx)
    }

    fn build(&self, obj: &Value, stream: &mut Stream, ctx: &Context) -> Result<(), Error> {
        let mut substream = Stream::new();
        self.subcon.build(obj, &mut substream, ctx)?;
        let wire = self.codec.encode(&substream.into_bytes())?;
        stream.write(&wire)
    }

    fn preprocess(&self, obj: Value, ctx: &Context) -> Result<Value, Error> {
        self.subcon.preprocess(obj, ctx)
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
        "Compressed"
    }
}
