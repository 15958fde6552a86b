//! DER encoding and decoding helpers
//!
//! OCSP requests are small, fixed-shape structures, so they are encoded by
//! hand with the helpers below. Decoding goes through `asn1_rs::Any` (as
//! re-exported by `x509-parser`) so every element keeps a handle on its raw
//! encoding. The raw `tbsResponseData` bytes are what the responder signed.

use crate::error::OcspError;
use chrono::{DateTime, NaiveDateTime, Utc};
use x509_parser::oid_registry::asn1_rs::{Any, FromDer};

/// Universal tag bytes used by OCSP structures
pub mod tag {
    pub const BOOLEAN: u8 = 0x01;
    pub const INTEGER: u8 = 0x02;
    pub const BIT_STRING: u8 = 0x03;
    pub const OCTET_STRING: u8 = 0x04;
    pub const NULL: u8 = 0x05;
    pub const OID: u8 = 0x06;
    pub const ENUMERATED: u8 = 0x0A;
    pub const GENERALIZED_TIME: u8 = 0x18;
    pub const SEQUENCE: u8 = 0x30;

    /// Context-specific, constructed `[n]` (EXPLICIT tagging or constructed IMPLICIT)
    pub const fn context(n: u8) -> u8 {
        0xA0 | n
    }

    /// Context-specific, primitive `[n]` (IMPLICIT tagging of a primitive type)
    pub const fn context_primitive(n: u8) -> u8 {
        0x80 | n
    }
}

// ============================================================================
// DER Encoding Helpers
// ============================================================================

/// Encode a SEQUENCE
pub fn sequence(contents: &[u8]) -> Vec<u8> {
    tlv(tag::SEQUENCE, contents)
}

/// Encode an OCTET STRING
pub fn octet_string(contents: &[u8]) -> Vec<u8> {
    tlv(tag::OCTET_STRING, contents)
}

/// Encode an unsigned big-endian value as an INTEGER
///
/// Redundant leading zero bytes are stripped and a single 0x00 is added back
/// when the high bit is set, so the value stays positive.
pub fn integer(value: &[u8]) -> Vec<u8> {
    let first_significant = value.iter().position(|&b| b != 0).unwrap_or(value.len());
    let trimmed = &value[first_significant..];

    let mut int_value = Vec::with_capacity(trimmed.len() + 1);
    match trimmed.first() {
        None => int_value.push(0x00),
        Some(&first_byte) => {
            if first_byte & 0x80 != 0 {
                int_value.push(0x00);
            }
            int_value.extend_from_slice(trimmed);
        }
    }
    tlv(tag::INTEGER, &int_value)
}

/// Encode an INTEGER whose content octets are already in two's-complement form
///
/// Certificate serial numbers are copied verbatim so that a responder
/// echoing our CertID produces byte-identical content.
pub fn integer_raw(content: &[u8]) -> Vec<u8> {
    tlv(tag::INTEGER, content)
}

/// Encode an ENUMERATED
pub fn enumerated(value: u8) -> Vec<u8> {
    tlv(tag::ENUMERATED, &[value])
}

/// Encode an OBJECT IDENTIFIER from its arcs
pub fn oid(components: &[u64]) -> Vec<u8> {
    tlv(tag::OID, &oid_contents(components))
}

/// Content octets of an OBJECT IDENTIFIER (without tag and length)
pub fn oid_contents(components: &[u64]) -> Vec<u8> {
    if components.len() < 2 {
        return Vec::new();
    }

    let mut encoded = encode_base128(40 * components[0] + components[1]);
    for &component in &components[2..] {
        encoded.extend_from_slice(&encode_base128(component));
    }
    encoded
}

/// Encode NULL
pub fn null() -> Vec<u8> {
    vec![tag::NULL, 0x00]
}

/// Encode a BOOLEAN
pub fn boolean(value: bool) -> Vec<u8> {
    tlv(tag::BOOLEAN, &[if value { 0xFF } else { 0x00 }])
}

/// Encode a BIT STRING with no unused bits
pub fn bit_string(bits: &[u8]) -> Vec<u8> {
    let mut contents = Vec::with_capacity(bits.len() + 1);
    contents.push(0x00);
    contents.extend_from_slice(bits);
    tlv(tag::BIT_STRING, &contents)
}

/// Encode a GeneralizedTime (`YYYYMMDDHHMMSSZ`)
pub fn generalized_time(time: &DateTime<Utc>) -> Vec<u8> {
    tlv(
        tag::GENERALIZED_TIME,
        time.format("%Y%m%d%H%M%SZ").to_string().as_bytes(),
    )
}

/// Encode context-specific explicit tag
pub fn explicit(tag_number: u8, contents: &[u8]) -> Vec<u8> {
    tlv(tag::context(tag_number), contents)
}

/// Encode Tag-Length-Value
pub fn tlv(tag: u8, contents: &[u8]) -> Vec<u8> {
    let mut result = vec![tag];
    result.extend_from_slice(&length(contents.len()));
    result.extend_from_slice(contents);
    result
}

/// Encode DER length
pub fn length(content_len: usize) -> Vec<u8> {
    if content_len < 128 {
        vec![content_len as u8]
    } else {
        let mut length_bytes = Vec::new();
        let mut len = content_len;
        while len > 0 {
            length_bytes.insert(0, (len & 0xFF) as u8);
            len >>= 8;
        }
        let mut result = vec![0x80 | length_bytes.len() as u8];
        result.extend_from_slice(&length_bytes);
        result
    }
}

/// Encode value in base-128 (for OID components)
fn encode_base128(mut value: u64) -> Vec<u8> {
    let mut result = vec![(value & 0x7F) as u8];
    value >>= 7;
    while value > 0 {
        result.insert(0, (value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
    result
}

// ============================================================================
// DER Decoding
// ============================================================================

/// A single decoded DER element
#[derive(Debug, Clone, Copy)]
pub struct DerElement<'a> {
    /// Identifier octet (all OCSP tags fit in the low-tag-number form)
    pub tag: u8,
    /// Content octets
    pub contents: &'a [u8],
    /// Full encoding, identifier and length included
    pub raw: &'a [u8],
}

impl<'a> DerElement<'a> {
    /// Parse exactly one element, rejecting trailing bytes
    pub fn parse_single(input: &'a [u8], context: &str) -> Result<Self, OcspError> {
        let (element, rest) = read_element(input, context)?;
        if !rest.is_empty() {
            return Err(OcspError::MalformedResponse(format!(
                "{}: {} trailing bytes",
                context,
                rest.len()
            )));
        }
        Ok(element)
    }

    /// Require a specific identifier octet
    pub fn expect_tag(self, expected: u8, context: &str) -> Result<Self, OcspError> {
        if self.tag != expected {
            return Err(OcspError::MalformedResponse(format!(
                "{}: expected tag 0x{:02X}, found 0x{:02X}",
                context, expected, self.tag
            )));
        }
        Ok(self)
    }

    /// Iterate over the children of a constructed element
    pub fn reader(&self, context: &'static str) -> DerReader<'a> {
        DerReader::new(self.contents, context)
    }

    /// Decode the content of an INTEGER or ENUMERATED that fits in a u32
    pub fn small_uint(&self, context: &str) -> Result<u32, OcspError> {
        let negative = self.contents.first().map_or(true, |b| b & 0x80 != 0);
        let trimmed: &[u8] = match self.contents {
            [0x00, rest @ ..] if !rest.is_empty() => rest,
            other => other,
        };
        if negative || trimmed.len() > 4 {
            return Err(OcspError::MalformedResponse(format!(
                "{}: integer out of range",
                context
            )));
        }
        Ok(trimmed.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b)))
    }

    /// Decode the content of a BIT STRING with no unused bits
    pub fn bit_string_bytes(&self, context: &str) -> Result<&'a [u8], OcspError> {
        match self.contents.split_first() {
            Some((0, bits)) => Ok(bits),
            _ => Err(OcspError::MalformedResponse(format!(
                "{}: unsupported BIT STRING padding",
                context
            ))),
        }
    }

    /// Decode a GeneralizedTime
    pub fn generalized_time(&self, context: &str) -> Result<DateTime<Utc>, OcspError> {
        if self.tag != tag::GENERALIZED_TIME {
            return Err(OcspError::MalformedResponse(format!(
                "{}: expected GeneralizedTime, found tag 0x{:02X}",
                context, self.tag
            )));
        }
        let text = std::str::from_utf8(self.contents).map_err(|_| {
            OcspError::MalformedResponse(format!("{}: GeneralizedTime is not ASCII", context))
        })?;
        parse_generalized_time(text).map_err(|e| {
            OcspError::MalformedResponse(format!("{}: {}", context, e))
        })
    }
}

/// Read one element from the front of `input`
pub fn read_element<'a>(
    input: &'a [u8],
    context: &str,
) -> Result<(DerElement<'a>, &'a [u8]), OcspError> {
    let (rest, any) = Any::from_der(input).map_err(|e| {
        OcspError::MalformedResponse(format!("{}: invalid DER: {:?}", context, e))
    })?;

    let consumed = input.len() - rest.len();
    let raw = &input[..consumed];
    let tag = raw[0];
    if tag & 0x1F == 0x1F {
        return Err(OcspError::MalformedResponse(format!(
            "{}: high tag numbers are not used by OCSP",
            context
        )));
    }

    Ok((
        DerElement {
            tag,
            contents: any.data,
            raw,
        },
        rest,
    ))
}

/// Sequential reader over the children of a constructed element
#[derive(Debug, Clone)]
pub struct DerReader<'a> {
    rest: &'a [u8],
    context: &'static str,
}

impl<'a> DerReader<'a> {
    pub fn new(contents: &'a [u8], context: &'static str) -> Self {
        Self {
            rest: contents,
            context,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }

    /// Identifier octet of the next element, if any
    pub fn peek_tag(&self) -> Option<u8> {
        self.rest.first().copied()
    }

    /// Read the next element, failing at end of input
    pub fn next_element(&mut self) -> Result<DerElement<'a>, OcspError> {
        if self.rest.is_empty() {
            return Err(OcspError::MalformedResponse(format!(
                "{}: unexpected end of SEQUENCE",
                self.context
            )));
        }
        let (element, rest) = read_element(self.rest, self.context)?;
        self.rest = rest;
        Ok(element)
    }

    /// Read the next element and require its tag
    pub fn expect(&mut self, expected: u8) -> Result<DerElement<'a>, OcspError> {
        let context = self.context;
        self.next_element()?.expect_tag(expected, context)
    }

    /// Read the next element only if it carries `tag`
    pub fn optional(&mut self, tag: u8) -> Result<Option<DerElement<'a>>, OcspError> {
        if self.peek_tag() == Some(tag) {
            self.next_element().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Require that every child has been consumed
    pub fn finish(self) -> Result<(), OcspError> {
        if self.rest.is_empty() {
            Ok(())
        } else {
            Err(OcspError::MalformedResponse(format!(
                "{}: unexpected trailing elements",
                self.context
            )))
        }
    }
}

impl<'a> Iterator for DerReader<'a> {
    type Item = Result<DerElement<'a>, OcspError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            None
        } else {
            Some(self.next_element())
        }
    }
}

/// Parse ASN.1 GeneralizedTime to `DateTime<Utc>`
///
/// GeneralizedTime format: YYYYMMDDHHMMSS[.fff]Z
pub fn parse_generalized_time(time_str: &str) -> Result<DateTime<Utc>, String> {
    let body = time_str
        .strip_suffix('Z')
        .ok_or_else(|| format!("GeneralizedTime '{}' is not in UTC", time_str))?;

    NaiveDateTime::parse_from_str(body, "%Y%m%d%H%M%S")
        .or_else(|_| NaiveDateTime::parse_from_str(body, "%Y%m%d%H%M%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("Failed to parse GeneralizedTime '{}': {}", time_str, e))
}
