//! # Compression
//!
//! Multi-algorithm compression with a bounded working buffer.
//!
//! Input is fed to the encoder in 64 KiB slices and decoded output is pulled
//! out 64 KiB at a time, so neither direction needs a second full-size
//! scratch copy of the payload. The result is still returned as one
//! contiguous buffer.
//!
//! The algorithm is always explicit on both sides; compressed bytes are never
//! sniffed to guess how they were produced.

use crate::error::{constants, ProtocolError, Result};
use flate2::{Compression, Decompress, FlushDecompress, Status};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

/// Size of the working buffer used by the streaming paths
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Brotli encoder/decoder internal buffer size
const BROTLI_BUFFER_SIZE: usize = 4096;

/// Brotli window size (log2)
const BROTLI_LG_WINDOW: u32 = 22;

const LZ4_FRAME_MAGIC: u32 = 0x184D_2204;
const LZ4_SKIPPABLE_MAGIC: u32 = 0x184D_2A50;

/// Original-size multiplier used by [`estimate_compressed_size`]
const ESTIMATED_RATIO: f64 = 0.6;

/// Supported compression algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionAlgorithm {
    /// No compression; bytes are copied through
    Store,
    /// Raw deflate stream (no header or checksum)
    Deflate,
    /// Deflate wrapped in a gzip header and CRC trailer
    #[default]
    Gzip,
    /// Brotli
    Brotli,
    /// LZ4 frame format
    Lz4,
    /// Zstandard
    Zstd,
}

impl CompressionAlgorithm {
    pub const ALL: [CompressionAlgorithm; 6] = [
        CompressionAlgorithm::Store,
        CompressionAlgorithm::Deflate,
        CompressionAlgorithm::Gzip,
        CompressionAlgorithm::Brotli,
        CompressionAlgorithm::Lz4,
        CompressionAlgorithm::Zstd,
    ];

    /// Stable identifier byte
    pub fn id(self) -> u8 {
        match self {
            CompressionAlgorithm::Store => 0,
            CompressionAlgorithm::Deflate => 1,
            CompressionAlgorithm::Gzip => 2,
            CompressionAlgorithm::Brotli => 3,
            CompressionAlgorithm::Lz4 => 4,
            CompressionAlgorithm::Zstd => 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CompressionAlgorithm::Store => "store",
            CompressionAlgorithm::Deflate => "deflate",
            CompressionAlgorithm::Gzip => "gzip",
            CompressionAlgorithm::Brotli => "brotli",
            CompressionAlgorithm::Lz4 => "lz4",
            CompressionAlgorithm::Zstd => "zstd",
        }
    }
}

impl TryFrom<u8> for CompressionAlgorithm {
    type Error = ProtocolError;

    fn try_from(id: u8) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|algorithm| algorithm.id() == id)
            .ok_or_else(|| ProtocolError::UnsupportedAlgorithm(format!("id {id}")))
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|algorithm| algorithm.name() == lowered)
            .ok_or_else(|| ProtocolError::UnsupportedAlgorithm(s.to_string()))
    }
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Speed/size trade-off, mapped onto each algorithm's native scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionLevel {
    NoCompression,
    Fastest,
    #[default]
    Optimal,
    SmallestSize,
}

impl CompressionLevel {
    fn flate(self) -> Compression {
        match self {
            CompressionLevel::NoCompression => Compression::none(),
            CompressionLevel::Fastest => Compression::fast(),
            CompressionLevel::Optimal => Compression::default(),
            CompressionLevel::SmallestSize => Compression::best(),
        }
    }

    fn brotli_quality(self) -> u32 {
        match self {
            CompressionLevel::NoCompression => 0,
            CompressionLevel::Fastest => 1,
            CompressionLevel::Optimal => 5,
            CompressionLevel::SmallestSize => 11,
        }
    }

    fn zstd(self) -> i32 {
        match self {
            CompressionLevel::NoCompression | CompressionLevel::Fastest => 1,
            CompressionLevel::Optimal => 3,
            CompressionLevel::SmallestSize => 19,
        }
    }
}

/// Streaming encoder over an in-memory sink
enum StreamEncoder {
    Store(Vec<u8>),
    Deflate(flate2::write::DeflateEncoder<Vec<u8>>),
    Gzip(flate2::write::GzEncoder<Vec<u8>>),
    Brotli(Box<brotli::CompressorWriter<Vec<u8>>>),
    Lz4(lz4_flex::frame::FrameEncoder<Vec<u8>>),
    Zstd(zstd::stream::write::Encoder<'static, Vec<u8>>),
}

impl StreamEncoder {
    fn new(algorithm: CompressionAlgorithm, level: CompressionLevel) -> Result<Self> {
        let encoder = match algorithm {
            CompressionAlgorithm::Store => StreamEncoder::Store(Vec::new()),
            CompressionAlgorithm::Deflate => StreamEncoder::Deflate(
                flate2::write::DeflateEncoder::new(Vec::new(), level.flate()),
            ),
            CompressionAlgorithm::Gzip => {
                StreamEncoder::Gzip(flate2::write::GzEncoder::new(Vec::new(), level.flate()))
            }
            CompressionAlgorithm::Brotli => {
                StreamEncoder::Brotli(Box::new(brotli::CompressorWriter::new(
                    Vec::new(),
                    BROTLI_BUFFER_SIZE,
                    level.brotli_quality(),
                    BROTLI_LG_WINDOW,
                )))
            }
            CompressionAlgorithm::Lz4 => {
                StreamEncoder::Lz4(lz4_flex::frame::FrameEncoder::new(Vec::new()))
            }
            CompressionAlgorithm::Zstd => StreamEncoder::Zstd(
                zstd::stream::write::Encoder::new(Vec::new(), level.zstd())
                    .map_err(compression_failed)?,
            ),
        };
        Ok(encoder)
    }

    fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let written = match self {
            StreamEncoder::Store(out) => {
                out.extend_from_slice(chunk);
                Ok(())
            }
            StreamEncoder::Deflate(encoder) => encoder.write_all(chunk),
            StreamEncoder::Gzip(encoder) => encoder.write_all(chunk),
            StreamEncoder::Brotli(encoder) => encoder.write_all(chunk),
            StreamEncoder::Lz4(encoder) => encoder.write_all(chunk),
            StreamEncoder::Zstd(encoder) => encoder.write_all(chunk),
        };
        written.map_err(compression_failed)
    }

    fn finish(self) -> Result<Vec<u8>> {
        match self {
            StreamEncoder::Store(out) => Ok(out),
            StreamEncoder::Deflate(encoder) => encoder.finish().map_err(compression_failed),
            StreamEncoder::Gzip(encoder) => encoder.finish().map_err(compression_failed),
            // into_inner flushes and closes the brotli stream
            StreamEncoder::Brotli(encoder) => Ok((*encoder).into_inner()),
            StreamEncoder::Lz4(encoder) => encoder
                .finish()
                .map_err(|e| ProtocolError::CompressionError(e.to_string())),
            StreamEncoder::Zstd(encoder) => encoder.finish().map_err(compression_failed),
        }
    }
}

/// Raw deflate inflater that insists on seeing the end-of-stream marker.
///
/// flate2's `read::DeflateDecoder` reports a truncated raw stream as a clean
/// EOF, which would turn a cut-off packet into silently short output.
struct RawInflater<'a> {
    input: &'a [u8],
    inflater: Decompress,
    done: bool,
}

impl<'a> RawInflater<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            inflater: Decompress::new(false),
            done: false,
        }
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.done {
            return Ok(0);
        }
        loop {
            let consumed_before = self.inflater.total_in();
            let produced_before = self.inflater.total_out();
            let offset = consumed_before as usize;

            let status = self
                .inflater
                .decompress(&self.input[offset..], buf, FlushDecompress::None)
                .map_err(|e| ProtocolError::DecompressionError(e.to_string()))?;

            let produced = (self.inflater.total_out() - produced_before) as usize;
            let consumed = (self.inflater.total_in() - consumed_before) as usize;

            if status == Status::StreamEnd {
                self.done = true;
                return Ok(produced);
            }
            if produced > 0 {
                return Ok(produced);
            }
            if consumed == 0 {
                return Err(ProtocolError::DecompressionError(
                    constants::ERR_TRUNCATED_STREAM.to_string(),
                ));
            }
        }
    }
}

fn take_u32(data: &mut &[u8]) -> Option<u32> {
    let slice = *data;
    let bytes: [u8; 4] = slice.get(..4)?.try_into().ok()?;
    *data = &slice[4..];
    Some(u32::from_le_bytes(bytes))
}

fn skip(data: &mut &[u8], len: usize) -> Option<()> {
    let slice = *data;
    *data = slice.get(len..)?;
    Some(())
}

/// Walk LZ4 frame headers and block sizes and require every frame to reach
/// its end mark.
///
/// `lz4_flex`'s frame reader treats EOF in place of a block header as the end
/// of the stream, so a frame missing its tail would otherwise decode cleanly.
/// Unknown magic is left for the decoder to reject.
fn check_lz4_frames(mut data: &[u8]) -> Result<()> {
    fn walk_frame(data: &mut &[u8]) -> Option<bool> {
        let magic = take_u32(data)?;
        if magic & 0xFFFF_FFF0 == LZ4_SKIPPABLE_MAGIC {
            let len = take_u32(data)? as usize;
            skip(data, len)?;
            return Some(true);
        }
        if magic != LZ4_FRAME_MAGIC {
            return Some(false);
        }

        let flg = *data.first()?;
        // FLG, BD and header checksum, plus content size and dictionary id
        let mut header_len = 3;
        if flg & 0x08 != 0 {
            header_len += 8;
        }
        if flg & 0x01 != 0 {
            header_len += 4;
        }
        skip(data, header_len)?;

        let block_checksum = if flg & 0x10 != 0 { 4 } else { 0 };
        loop {
            let block = take_u32(data)?;
            if block == 0 {
                break;
            }
            skip(data, (block & 0x7FFF_FFFF) as usize + block_checksum)?;
        }
        if flg & 0x04 != 0 {
            skip(data, 4)?;
        }
        Some(true)
    }

    while !data.is_empty() {
        match walk_frame(&mut data) {
            Some(true) => {}
            Some(false) => break,
            None => {
                return Err(ProtocolError::DecompressionError(
                    constants::ERR_TRUNCATED_STREAM.to_string(),
                ))
            }
        }
    }
    Ok(())
}

/// Streaming decoder over an in-memory source
enum StreamDecoder<'a> {
    Store(&'a [u8]),
    Deflate(RawInflater<'a>),
    Gzip(flate2::read::GzDecoder<&'a [u8]>),
    Brotli(Box<brotli::Decompressor<&'a [u8]>>),
    Lz4(lz4_flex::frame::FrameDecoder<&'a [u8]>),
    Zstd(zstd::stream::read::Decoder<'static, &'a [u8]>),
}

impl<'a> StreamDecoder<'a> {
    fn new(data: &'a [u8], algorithm: CompressionAlgorithm) -> Result<Self> {
        let decoder = match algorithm {
            CompressionAlgorithm::Store => StreamDecoder::Store(data),
            CompressionAlgorithm::Deflate => StreamDecoder::Deflate(RawInflater::new(data)),
            CompressionAlgorithm::Gzip => StreamDecoder::Gzip(flate2::read::GzDecoder::new(data)),
            CompressionAlgorithm::Brotli => StreamDecoder::Brotli(Box::new(
                brotli::Decompressor::new(data, BROTLI_BUFFER_SIZE),
            )),
            CompressionAlgorithm::Lz4 => {
                check_lz4_frames(data)?;
                StreamDecoder::Lz4(lz4_flex::frame::FrameDecoder::new(data))
            }
            CompressionAlgorithm::Zstd => StreamDecoder::Zstd(
                zstd::stream::read::Decoder::with_buffer(data).map_err(decompression_failed)?,
            ),
        };
        Ok(decoder)
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        let read = match self {
            StreamDecoder::Store(remaining) => remaining.read(buf),
            StreamDecoder::Deflate(inflater) => return inflater.read_chunk(buf),
            StreamDecoder::Gzip(decoder) => decoder.read(buf),
            StreamDecoder::Brotli(decoder) => decoder.read(buf),
            StreamDecoder::Lz4(decoder) => decoder.read(buf),
            StreamDecoder::Zstd(decoder) => decoder.read(buf),
        };
        read.map_err(decompression_failed)
    }
}

fn compression_failed(e: std::io::Error) -> ProtocolError {
    ProtocolError::CompressionError(format!("{}: {e}", constants::ERR_COMPRESSION_FAILED))
}

fn decompression_failed(e: std::io::Error) -> ProtocolError {
    ProtocolError::DecompressionError(format!("{}: {e}", constants::ERR_DECOMPRESSION_FAILED))
}

fn append_limited(out: &mut Vec<u8>, chunk: &[u8], limit: usize) -> Result<()> {
    if out.len() + chunk.len() > limit {
        return Err(ProtocolError::DecompressionError(
            constants::ERR_DECOMPRESSION_LIMIT.to_string(),
        ));
    }
    out.extend_from_slice(chunk);
    Ok(())
}

/// Compresses data using the specified algorithm
///
/// Empty input yields an empty buffer without touching the encoder.
///
/// # Errors
/// Returns `ProtocolError::CompressionError` if the encoder fails
pub fn compress(
    data: &[u8],
    algorithm: CompressionAlgorithm,
    level: CompressionLevel,
) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let mut encoder = StreamEncoder::new(algorithm, level)?;
    for chunk in data.chunks(CHUNK_SIZE) {
        encoder.write_chunk(chunk)?;
    }
    encoder.finish()
}

/// Decompresses data that was compressed with the specified algorithm
///
/// # Errors
/// Returns `ProtocolError::DecompressionError` if the stream is corrupted
/// or truncated
pub fn decompress(data: &[u8], algorithm: CompressionAlgorithm) -> Result<Vec<u8>> {
    decompress_with_limit(data, algorithm, usize::MAX)
}

/// Decompresses data, rejecting output larger than `limit` bytes.
///
/// The limit is checked after every chunk, so a decompression bomb is
/// stopped before it can allocate much past the limit.
pub fn decompress_with_limit(
    data: &[u8],
    algorithm: CompressionAlgorithm,
    limit: usize,
) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let mut decoder = StreamDecoder::new(data, algorithm)?;
    let mut out = Vec::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = decoder.read_chunk(&mut buffer)?;
        if n == 0 {
            break;
        }
        append_limited(&mut out, &buffer[..n], limit)?;
    }
    Ok(out)
}

/// Non-blocking [`compress`]: yields to the scheduler after every chunk.
pub async fn compress_async(
    data: &[u8],
    algorithm: CompressionAlgorithm,
    level: CompressionLevel,
) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let mut encoder = StreamEncoder::new(algorithm, level)?;
    for chunk in data.chunks(CHUNK_SIZE) {
        encoder.write_chunk(chunk)?;
        tokio::task::yield_now().await;
    }
    encoder.finish()
}

/// Non-blocking [`decompress_with_limit`]: yields to the scheduler after every chunk.
pub async fn decompress_async(
    data: &[u8],
    algorithm: CompressionAlgorithm,
    limit: usize,
) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let mut decoder = StreamDecoder::new(data, algorithm)?;
    let mut out = Vec::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = decoder.read_chunk(&mut buffer)?;
        if n == 0 {
            break;
        }
        append_limited(&mut out, &buffer[..n], limit)?;
        tokio::task::yield_now().await;
    }
    Ok(out)
}

/// UTF-8 text helpers.
///
/// `CompressionAlgorithm::default()` (gzip) matches what text-oriented peers
/// expect. Empty text compresses to an empty buffer.
pub fn compress_str(
    text: &str,
    algorithm: CompressionAlgorithm,
    level: CompressionLevel,
) -> Result<Vec<u8>> {
    compress(text.as_bytes(), algorithm, level)
}

/// Inverse of [`compress_str`].
///
/// # Errors
/// `DecompressionError` for a corrupt stream or output that is not UTF-8
pub fn decompress_to_string(data: &[u8], algorithm: CompressionAlgorithm) -> Result<String> {
    into_utf8(decompress(data, algorithm)?)
}

pub async fn compress_str_async(
    text: &str,
    algorithm: CompressionAlgorithm,
    level: CompressionLevel,
) -> Result<Vec<u8>> {
    compress_async(text.as_bytes(), algorithm, level).await
}

pub async fn decompress_to_string_async(
    data: &[u8],
    algorithm: CompressionAlgorithm,
    limit: usize,
) -> Result<String> {
    into_utf8(decompress_async(data, algorithm, limit).await?)
}

fn into_utf8(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|e| ProtocolError::DecompressionError(format!("output is not UTF-8: {e}")))
}

/// Rough compressed size of `text`: 60% of its UTF-8 length.
///
/// A sizing hint for buffers only; actual output depends on the data and
/// the algorithm.
pub fn estimate_compressed_size(text: &str) -> usize {
    (text.len() as f64 * ESTIMATED_RATIO) as usize
}
