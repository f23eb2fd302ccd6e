//! Pluggable body codecs and the registry that names them.
//!
//! # Design
//! An encoder wraps a byte sink and a decoder wraps a byte source; both are
//! built on demand by constructor functions stored under a lower-case
//! format name. Values cross the trait-object boundary through
//! `erased_serde`, so a codec written for serde works for any caller type.
//!
//! A [`CodecRegistry`] can be owned by a client. Clients without one consult
//! the process-wide registry from [`CodecRegistry::global`], which starts
//! out with "json" and "xml". Register custom formats during start-up,
//! before requests are issued.

use std::collections::HashMap;
use std::fmt;
use std::io::{BufReader, Read, Write};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::media_type;

/// Failure inside an encoder or decoder.
pub type CodecError = Box<dyn std::error::Error + Send + Sync>;

/// Builds an [`Encoder`] around a byte sink.
pub type EncoderFn = Arc<dyn for<'w> Fn(&'w mut dyn Write) -> Box<dyn Encoder + 'w> + Send + Sync>;

/// Builds a [`Decoder`] around a byte source.
pub type DecoderFn = Arc<dyn for<'r> Fn(&'r mut dyn Read) -> Box<dyn Decoder + 'r> + Send + Sync>;

/// Serializes values onto the sink it was built with.
pub trait Encoder {
    fn encode(&mut self, value: &dyn erased_serde::Serialize) -> std::result::Result<(), CodecError>;
}

/// Deserializes values from the source it was built with.
pub trait Decoder {
    /// The format deserializer positioned at the next value.
    fn deserializer(&mut self) -> Box<dyn erased_serde::Deserializer<'static> + '_>;

    /// Called after a value has been read; rejects trailing input.
    fn finish(&mut self) -> std::result::Result<(), CodecError> {
        Ok(())
    }
}

impl dyn Decoder + '_ {
    pub fn decode<T: DeserializeOwned>(&mut self) -> std::result::Result<T, CodecError> {
        let value = {
            let mut de = self.deserializer();
            erased_serde::deserialize::<T>(&mut *de)?
        };
        self.finish()?;
        Ok(value)
    }
}

struct JsonEncoder<'w> {
    writer: &'w mut dyn Write,
}

impl Encoder for JsonEncoder<'_> {
    fn encode(&mut self, value: &dyn erased_serde::Serialize) -> std::result::Result<(), CodecError> {
        serde_json::to_writer(&mut self.writer, value)?;
        Ok(())
    }
}

struct JsonDecoder<'r> {
    de: serde_json::Deserializer<serde_json::de::IoRead<&'r mut dyn Read>>,
}

impl Decoder for JsonDecoder<'_> {
    fn deserializer(&mut self) -> Box<dyn erased_serde::Deserializer<'static> + '_> {
        Box::new(<dyn erased_serde::Deserializer>::erase(&mut self.de))
    }

    fn finish(&mut self) -> std::result::Result<(), CodecError> {
        self.de.end()?;
        Ok(())
    }
}

struct XmlEncoder<'w> {
    writer: &'w mut dyn Write,
}

impl Encoder for XmlEncoder<'_> {
    fn encode(&mut self, value: &dyn erased_serde::Serialize) -> std::result::Result<(), CodecError> {
        // quick-xml serializes into a fmt::Write, not an io::Write
        let document = quick_xml::se::to_string(value)?;
        self.writer.write_all(document.as_bytes())?;
        Ok(())
    }
}

struct XmlDecoder<'r> {
    de: quick_xml::de::Deserializer<'static, quick_xml::de::IoReader<BufReader<&'r mut dyn Read>>>,
}

impl Decoder for XmlDecoder<'_> {
    fn deserializer(&mut self) -> Box<dyn erased_serde::Deserializer<'static> + '_> {
        Box::new(<dyn erased_serde::Deserializer>::erase(&mut self.de))
    }
}

pub fn json_encoder<'w>(writer: &'w mut dyn Write) -> Box<dyn Encoder + 'w> {
    Box::new(JsonEncoder { writer })
}

pub fn json_decoder<'r>(reader: &'r mut dyn Read) -> Box<dyn Decoder + 'r> {
    Box::new(JsonDecoder {
        de: serde_json::Deserializer::from_reader(reader),
    })
}

pub fn xml_encoder<'w>(writer: &'w mut dyn Write) -> Box<dyn Encoder + 'w> {
    Box::new(XmlEncoder { writer })
}

pub fn xml_decoder<'r>(reader: &'r mut dyn Read) -> Box<dyn Decoder + 'r> {
    Box::new(XmlDecoder {
        de: quick_xml::de::Deserializer::from_reader(BufReader::new(reader)),
    })
}

/// Format name to encoder/decoder constructors.
///
/// Registering a format that is already present replaces its constructor.
/// Formats are resolved in the order they were first registered.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    encoders: HashMap<String, EncoderFn>,
    decoders: HashMap<String, DecoderFn>,
    formats: Vec<String>,
}

impl CodecRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in "json" and "xml" codecs.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_encoder("json", json_encoder);
        registry.register_decoder("json", json_decoder);
        registry.register_encoder("xml", xml_encoder);
        registry.register_decoder("xml", xml_decoder);
        registry
    }

    /// The process-wide registry used by clients that do not own one.
    pub fn global() -> &'static RwLock<CodecRegistry> {
        static GLOBAL: OnceLock<RwLock<CodecRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| RwLock::new(CodecRegistry::with_defaults()))
    }

    pub fn register_encoder<F>(&mut self, format: &str, ctor: F)
    where
        F: for<'w> Fn(&'w mut dyn Write) -> Box<dyn Encoder + 'w> + Send + Sync + 'static,
    {
        let format = self.track(format);
        self.encoders.insert(format, Arc::new(ctor));
    }

    pub fn register_decoder<F>(&mut self, format: &str, ctor: F)
    where
        F: for<'r> Fn(&'r mut dyn Read) -> Box<dyn Decoder + 'r> + Send + Sync + 'static,
    {
        let format = self.track(format);
        self.decoders.insert(format, Arc::new(ctor));
    }

    fn track(&mut self, format: &str) -> String {
        let format = format.to_ascii_lowercase();
        if !self.formats.contains(&format) {
            self.formats.push(format.clone());
        }
        format
    }

    /// Registered format names in resolution order.
    pub fn formats(&self) -> impl Iterator<Item = &str> {
        self.formats.iter().map(String::as_str)
    }

    /// Resolve a media type to one of the registered formats.
    pub fn resolve(&self, media_type: &str) -> Result<&str> {
        media_type::resolve(media_type, self.formats())
    }

    /// Shared handle to the encoder constructor for `format`.
    pub fn encoder_fn(&self, format: &str) -> Option<EncoderFn> {
        self.encoders.get(&format.to_ascii_lowercase()).cloned()
    }

    /// Shared handle to the decoder constructor for `format`.
    pub fn decoder_fn(&self, format: &str) -> Option<DecoderFn> {
        self.decoders.get(&format.to_ascii_lowercase()).cloned()
    }

    pub fn encoder<'w>(&self, format: &str, writer: &'w mut dyn Write) -> Option<Box<dyn Encoder + 'w>> {
        self.encoder_fn(format).map(|ctor| ctor(writer))
    }

    pub fn decoder<'r>(&self, format: &str, reader: &'r mut dyn Read) -> Option<Box<dyn Decoder + 'r>> {
        self.decoder_fn(format).map(|ctor| ctor(reader))
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("formats", &self.formats)
            .finish()
    }
}

/// Register an encoder in the process-wide registry.
pub fn register_encoder<F>(format: &str, ctor: F)
where
    F: for<'w> Fn(&'w mut dyn Write) -> Box<dyn Encoder + 'w> + Send + Sync + 'static,
{
    CodecRegistry::global()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register_encoder(format, ctor);
}

/// Register a decoder in the process-wide registry.
pub fn register_decoder<F>(format: &str, ctor: F)
where
    F: for<'r> Fn(&'r mut dyn Read) -> Box<dyn Decoder + 'r> + Send + Sync + 'static,
{
    CodecRegistry::global()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register_decoder(format, ctor);
}
