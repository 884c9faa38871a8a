/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use crate::codecs::{
    base64::{Base64Decoder, Base64Encoder},
    quoted_printable::{QuotedPrintableDecoder, QuotedPrintableEncoder},
    uuencode::{UuDecoder, UuEncoder},
    yencode::{YDecoder, YEncoder},
    Encoding,
};

use super::Filter;

enum EncoderState {
    Identity,
    Base64(Base64Encoder),
    QuotedPrintable(QuotedPrintableEncoder),
    UuEncode(UuEncoder),
}

/// Applies a Content-Transfer-Encoding to a stream. Identity encodings
/// (7bit, 8bit, binary) pass bytes through untouched.
pub struct EncodeFilter {
    encoding: Encoding,
    state: EncoderState,
    out: Vec<u8>,
}

impl EncodeFilter {
    pub fn new(encoding: Encoding) -> Self {
        EncodeFilter {
            encoding,
            state: EncodeFilter::state_for(encoding),
            out: Vec::new(),
        }
    }

    fn state_for(encoding: Encoding) -> EncoderState {
        match encoding {
            Encoding::Base64 => EncoderState::Base64(Base64Encoder::new()),
            Encoding::QuotedPrintable => {
                EncoderState::QuotedPrintable(QuotedPrintableEncoder::new())
            }
            Encoding::UuEncode => EncoderState::UuEncode(UuEncoder::new(0o644, "unknown")),
            _ => EncoderState::Identity,
        }
    }
}

impl Filter for EncodeFilter {
    fn filter(&mut self, input: &[u8]) -> &[u8] {
        self.out.clear();
        match &mut self.state {
            EncoderState::Identity => self.out.extend_from_slice(input),
            EncoderState::Base64(encoder) => encoder.encode_step(input, &mut self.out),
            EncoderState::QuotedPrintable(encoder) => encoder.encode_step(input, &mut self.out),
            EncoderState::UuEncode(encoder) => encoder.encode_step(input, &mut self.out),
        }
        &self.out
    }

    fn complete(&mut self, input: &[u8]) -> &[u8] {
        self.out.clear();
        match &mut self.state {
            EncoderState::Identity => self.out.extend_from_slice(input),
            EncoderState::Base64(encoder) => encoder.encode_close(input, &mut self.out),
            EncoderState::QuotedPrintable(encoder) => encoder.encode_close(input, &mut self.out),
            EncoderState::UuEncode(encoder) => encoder.encode_close(input, &mut self.out),
        }
        &self.out
    }

    fn reset(&mut self) {
        self.state = EncodeFilter::state_for(self.encoding);
        self.out.clear();
    }

    fn copy(&self) -> Box<dyn Filter> {
        Box::new(EncodeFilter::new(self.encoding))
    }
}

enum DecoderState {
    Identity,
    Base64(Base64Decoder),
    QuotedPrintable(QuotedPrintableDecoder),
    UuDecode(UuDecoder),
}

/// Reverses a Content-Transfer-Encoding on a stream.
pub struct DecodeFilter {
    encoding: Encoding,
    state: DecoderState,
    out: Vec<u8>,
}

impl DecodeFilter {
    pub fn new(encoding: Encoding) -> Self {
        DecodeFilter {
            encoding,
            state: DecodeFilter::state_for(encoding),
            out: Vec::new(),
        }
    }

    fn state_for(encoding: Encoding) -> DecoderState {
        match encoding {
            Encoding::Base64 => DecoderState::Base64(Base64Decoder::new()),
            Encoding::QuotedPrintable => {
                DecoderState::QuotedPrintable(QuotedPrintableDecoder::new())
            }
            Encoding::UuEncode => DecoderState::UuDecode(UuDecoder::new(false)),
            _ => DecoderState::Identity,
        }
    }
}

impl Filter for DecodeFilter {
    fn filter(&mut self, input: &[u8]) -> &[u8] {
        self.out.clear();
        match &mut self.state {
            DecoderState::Identity => self.out.extend_from_slice(input),
            DecoderState::Base64(decoder) => decoder.decode_step(input, &mut self.out),
            DecoderState::QuotedPrintable(decoder) => decoder.decode_step(input, &mut self.out),
            DecoderState::UuDecode(decoder) => decoder.decode_step(input, &mut self.out),
        }
        &self.out
    }

    fn complete(&mut self, input: &[u8]) -> &[u8] {
        self.out.clear();
        match &mut self.state {
            DecoderState::Identity => self.out.extend_from_slice(input),
            DecoderState::Base64(decoder) => decoder.decode_step(input, &mut self.out),
            DecoderState::QuotedPrintable(decoder) => decoder.decode_close(input, &mut self.out),
            DecoderState::UuDecode(decoder) => decoder.decode_close(input, &mut self.out),
        }
        &self.out
    }

    fn reset(&mut self) {
        self.state = DecodeFilter::state_for(self.encoding);
        self.out.clear();
    }

    fn copy(&self) -> Box<dyn Filter> {
        Box::new(DecodeFilter::new(self.encoding))
    }
}

/// yEnc encoding as a filter. The payload size must be known up front
/// for the `=ybegin` header.
pub struct YEncodeFilter {
    name: String,
    size: usize,
    encoder: YEncoder,
    out: Vec<u8>,
}

impl YEncodeFilter {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        let name = name.into();
        YEncodeFilter {
            encoder: YEncoder::new(name.clone(), size),
            name,
            size,
            out: Vec::new(),
        }
    }
}

impl Filter for YEncodeFilter {
    fn filter(&mut self, input: &[u8]) -> &[u8] {
        self.out.clear();
        self.encoder.encode_step(input, &mut self.out);
        &self.out
    }

    fn complete(&mut self, input: &[u8]) -> &[u8] {
        self.out.clear();
        self.encoder.encode_close(input, &mut self.out);
        &self.out
    }

    fn reset(&mut self) {
        self.encoder = YEncoder::new(self.name.clone(), self.size);
        self.out.clear();
    }

    fn copy(&self) -> Box<dyn Filter> {
        Box::new(YEncodeFilter::new(self.name.clone(), self.size))
    }
}

/// yEnc decoding as a filter, tracking the running CRC32 and per-part
/// CRC32 alongside the frame metadata.
pub struct YDecodeFilter {
    decoder: YDecoder,
    out: Vec<u8>,
}

impl Default for YDecodeFilter {
    fn default() -> Self {
        YDecodeFilter::new()
    }
}

impl YDecodeFilter {
    pub fn new() -> Self {
        YDecodeFilter {
            decoder: YDecoder::new(),
            out: Vec::new(),
        }
    }

    pub fn decoder(&self) -> &YDecoder {
        &self.decoder
    }
}

impl Filter for YDecodeFilter {
    fn filter(&mut self, input: &[u8]) -> &[u8] {
        self.out.clear();
        self.decoder.decode_step(input, &mut self.out);
        &self.out
    }

    fn complete(&mut self, input: &[u8]) -> &[u8] {
        self.out.clear();
        self.decoder.decode_close(input, &mut self.out);
        &self.out
    }

    fn reset(&mut self) {
        self.decoder.reset();
        self.out.clear();
    }

    fn copy(&self) -> Box<dyn Filter> {
        Box::new(YDecodeFilter::new())
    }
}
