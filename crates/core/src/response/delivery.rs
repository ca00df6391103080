//! Delivery of cached responses with negotiated compression.

use super::{Body, CachedResponse};
use crate::Error;
use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};
use std::fs::File;
use std::io::{self, Read, Write};
use std::str::FromStr;

/// Read size used when streaming file bodies through an encoder.
const CHUNK_SIZE: usize = 64 * 1024;

/// Destination a response is emitted to: status first, then headers, then body.
pub trait ResponseSink {
    fn status(&mut self, status: u16) -> io::Result<()>;
    fn header(&mut self, name: &str, value: &str) -> io::Result<()>;
    fn body(&mut self) -> &mut dyn Write;
}

/// Sink collecting the whole response in memory.
#[derive(Debug, Default, Clone)]
pub struct BufferedSink {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl BufferedSink {
    /// First value of header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl ResponseSink for BufferedSink {
    fn status(&mut self, status: u16) -> io::Result<()> {
        self.status = status;
        Ok(())
    }

    fn header(&mut self, name: &str, value: &str) -> io::Result<()> {
        self.headers.push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn body(&mut self) -> &mut dyn Write {
        &mut self.body
    }
}

/// Compression schemes offered on delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Gzip,
    Deflate,
}

impl ContentEncoding {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentEncoding::Gzip => "gzip",
            ContentEncoding::Deflate => "deflate",
        }
    }
}

impl FromStr for ContentEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Ok(ContentEncoding::Gzip),
            "deflate" => Ok(ContentEncoding::Deflate),
            other => Err(Error::Unsupported(format!("compression scheme {other:?}"))),
        }
    }
}

/// Pick a supported encoding from an `Accept-Encoding` header value.
///
/// Honours q-values and `*`; `q=0` excludes a scheme. Ties prefer gzip.
/// `None` means the body goes out uncompressed.
pub fn negotiate_encoding(accept_encoding: &str) -> Option<ContentEncoding> {
    let mut gzip = None;
    let mut deflate = None;
    let mut any = None;

    for item in accept_encoding.split(',') {
        let mut parts = item.split(';');
        let token = parts.next().unwrap_or_default().trim();
        if token.is_empty() {
            continue;
        }
        let q = parts
            .filter_map(|p| p.trim().strip_prefix("q="))
            .map(|q| q.trim().parse::<f32>().unwrap_or(0.0))
            .next()
            .unwrap_or(1.0);

        match token {
            "*" => any = Some(q),
            t => match t.parse::<ContentEncoding>() {
                Ok(ContentEncoding::Gzip) => gzip = Some(q),
                Ok(ContentEncoding::Deflate) => deflate = Some(q),
                Err(_) => {}
            },
        }
    }

    let gzip = gzip.or(any).unwrap_or(0.0);
    let deflate = deflate.or(any).unwrap_or(0.0);
    if gzip <= 0.0 && deflate <= 0.0 {
        None
    } else if gzip >= deflate {
        Some(ContentEncoding::Gzip)
    } else {
        Some(ContentEncoding::Deflate)
    }
}

enum Encoder<'a> {
    Gzip(GzEncoder<&'a mut dyn Write>),
    Deflate(ZlibEncoder<&'a mut dyn Write>),
}

impl<'a> Encoder<'a> {
    fn new(encoding: ContentEncoding, out: &'a mut dyn Write) -> Self {
        match encoding {
            ContentEncoding::Gzip => Encoder::Gzip(GzEncoder::new(out, Compression::default())),
            ContentEncoding::Deflate => Encoder::Deflate(ZlibEncoder::new(out, Compression::default())),
        }
    }

    fn finish(self) -> io::Result<()> {
        match self {
            Encoder::Gzip(e) => e.finish().map(drop),
            Encoder::Deflate(e) => e.finish().map(drop),
        }
    }
}

impl Write for Encoder<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Encoder::Gzip(e) => e.write(buf),
            Encoder::Deflate(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Encoder::Gzip(e) => e.flush(),
            Encoder::Deflate(e) => e.flush(),
        }
    }
}

fn copy_chunked<W: Write + ?Sized>(mut src: impl Read, dst: &mut W) -> io::Result<u64> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = src.read(&mut buf)?;
        if n == 0 {
            return Ok(total);
        }
        dst.write_all(&buf[..n])?;
        total += n as u64;
    }
}

enum Source<'a> {
    Inline(&'a [u8]),
    File(File),
}

impl Source<'_> {
    fn write_to<W: Write + ?Sized>(self, dst: &mut W) -> io::Result<()> {
        match self {
            Source::Inline(bytes) => dst.write_all(bytes),
            Source::File(file) => copy_chunked(file, dst).map(drop),
        }
    }
}

impl CachedResponse {
    /// Emit status, headers and body into `sink`.
    ///
    /// With `negotiate` set and an acceptable scheme in `accept_encoding` the
    /// body is compressed: inline bodies in one pass, files streamed in fixed
    /// size chunks. Returns the encoding applied, if any.
    pub fn send<S: ResponseSink>(
        &self, sink: &mut S, accept_encoding: Option<&str>, negotiate: bool,
    ) -> Result<Option<ContentEncoding>, Error> {
        let encoding = if negotiate { accept_encoding.and_then(negotiate_encoding) } else { None };

        // open before emitting anything so a vanished file fails cleanly
        let source = match &self.body {
            Body::Inline(bytes) => Source::Inline(bytes),
            Body::File(path) => Source::File(File::open(path)?),
        };

        sink.status(self.status)?;
        let mut has_vary = false;
        for (name, value) in &self.headers {
            if encoding.is_some() && name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            has_vary |= name.eq_ignore_ascii_case("vary");
            for v in value.values() {
                sink.header(name, v)?;
            }
        }
        if let Some(enc) = encoding {
            sink.header("Content-Encoding", enc.as_str())?;
            if !has_vary {
                sink.header("Vary", "Accept-Encoding")?;
            }
        }

        let out = sink.body();
        match encoding {
            None => source.write_to(out)?,
            Some(enc) => {
                let mut encoder = Encoder::new(enc, out);
                source.write_to(&mut encoder)?;
                encoder.finish()?;
            }
        }

        tracing::debug!(status = self.status, encoding = encoding.map(ContentEncoding::as_str), "response sent");
        Ok(encoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::{GzDecoder, ZlibDecoder};

    fn gunzip(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        GzDecoder::new(data).read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_negotiate() {
        assert_eq!(negotiate_encoding("gzip, deflate"), Some(ContentEncoding::Gzip));
        assert_eq!(negotiate_encoding("deflate"), Some(ContentEncoding::Deflate));
        assert_eq!(negotiate_encoding("gzip;q=0.5, deflate;q=0.8"), Some(ContentEncoding::Deflate));
        assert_eq!(negotiate_encoding("br"), None);
        assert_eq!(negotiate_encoding("gzip;q=0"), None);
        assert_eq!(negotiate_encoding("*"), Some(ContentEncoding::Gzip));
        assert_eq!(negotiate_encoding("*, gzip;q=0"), Some(ContentEncoding::Deflate));
        assert_eq!(negotiate_encoding(""), None);
    }

    #[test]
    fn test_unknown_scheme_rejected() {
        assert!(matches!("br".parse::<ContentEncoding>(), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_send_plain() {
        let resp = CachedResponse::new("hello", 200).with_header("Content-Type", "text/plain");
        let mut sink = BufferedSink::default();

        let enc = resp.send(&mut sink, Some("gzip"), false).unwrap();
        assert_eq!(enc, None);
        assert_eq!(sink.status, 200);
        assert_eq!(sink.header("content-type"), Some("text/plain"));
        assert_eq!(sink.body, b"hello");
    }

    #[test]
    fn test_send_multi_value_header() {
        let resp = CachedResponse::new("", 204).with_header("Link", vec!["<a>".to_string(), "<b>".to_string()]);
        let mut sink = BufferedSink::default();
        resp.send(&mut sink, None, true).unwrap();
        let links: Vec<_> = sink.headers.iter().filter(|(n, _)| n == "Link").collect();
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn test_send_gzip_inline() {
        let resp = CachedResponse::new("hello hello hello", 200).with_header("Content-Length", "17");
        let mut sink = BufferedSink::default();

        let enc = resp.send(&mut sink, Some("gzip, deflate"), true).unwrap();
        assert_eq!(enc, Some(ContentEncoding::Gzip));
        assert_eq!(sink.header("Content-Encoding"), Some("gzip"));
        assert_eq!(sink.header("Vary"), Some("Accept-Encoding"));
        assert_eq!(sink.header("Content-Length"), None);
        assert_eq!(gunzip(&sink.body), b"hello hello hello");
    }

    #[test]
    fn test_send_deflate_file_in_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref");
        let content: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &content).unwrap();

        let resp = CachedResponse::file(&path, 200);
        let mut sink = BufferedSink::default();
        let enc = resp.send(&mut sink, Some("deflate"), true).unwrap();
        assert_eq!(enc, Some(ContentEncoding::Deflate));

        let mut out = Vec::new();
        ZlibDecoder::new(sink.body.as_slice()).read_to_end(&mut out).unwrap();
        assert_eq!(out, content);
    }

    #[test]
    fn test_send_file_unacceptable_encoding_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref");
        std::fs::write(&path, b"plain file").unwrap();

        let mut sink = BufferedSink::default();
        let enc = CachedResponse::file(&path, 200).send(&mut sink, Some("br"), true).unwrap();
        assert_eq!(enc, None);
        assert_eq!(sink.header("Content-Encoding"), None);
        assert_eq!(sink.body, b"plain file");
    }

    #[test]
    fn test_send_missing_file() {
        let mut sink = BufferedSink::default();
        let result = CachedResponse::file("/nonexistent/disscache/ref", 200).send(&mut sink, None, false);
        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(sink.status, 0);
    }
}
