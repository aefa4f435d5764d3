use std::{fmt::Display, ops::Range, str::FromStr};

use atoi::FromRadix16Checked;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;
use strum_macros::{AsRefStr, EnumString};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::form;

pub const MAX_HEAD_LEN: usize = 16 * 1024;
pub const MAX_BODY_LEN: usize = 1024 * 1024;
// chunk size line, extensions included
const MAX_CHUNK_LINE_LEN: usize = 1024;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const MULTIPART_CONTENT_TYPE: &str = "multipart/form-data";

#[derive(PartialEq, Eq, Debug, Clone, Copy, EnumString, AsRefStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    /// only these carry form fields in the body
    pub fn has_form_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum StatusCode {
    Ok,
    BadRequest,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    RequestTimeout,
    PayloadTooLarge,
    UnprocessableEntity,
    InternalServerError,
    NotImplemented,
}

impl StatusCode {
    pub fn code(&self) -> u16 {
        match *self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
            Self::RequestTimeout => 408,
            Self::PayloadTooLarge => 413,
            Self::UnprocessableEntity => 422,
            Self::InternalServerError => 500,
            Self::NotImplemented => 501,
        }
    }

    pub fn reason(&self) -> &'static str {
        match *self {
            Self::Ok => "OK",
            Self::BadRequest => "Bad Request",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::RequestTimeout => "Request Timeout",
            Self::PayloadTooLarge => "Payload Too Large",
            Self::UnprocessableEntity => "Unprocessable Entity",
            Self::InternalServerError => "Internal Server Error",
            Self::NotImplemented => "Not Implemented",
        }
    }
}

impl Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection closed before the request was complete")]
    UnexpectedEof,
    #[error("malformed request line")]
    MalformedRequestLine,
    #[error("malformed header at line {0}")]
    MalformedHeader(usize),
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(String),
    #[error("invalid content length")]
    InvalidContentLength,
    #[error("unsupported transfer encoding: {0}")]
    UnsupportedTransferEncoding(String),
    #[error("malformed chunk in chunked body")]
    MalformedChunk,
    #[error("request head exceeds {} bytes", MAX_HEAD_LEN)]
    HeadTooLarge,
    #[error("request body of {0} bytes is too large")]
    BodyTooLarge(usize),
}

impl HttpError {
    pub fn status(&self) -> StatusCode {
        match *self {
            Self::Io(_) | Self::UnexpectedEof => StatusCode::BadRequest,
            Self::MalformedRequestLine | Self::MalformedHeader(_) => StatusCode::BadRequest,
            Self::InvalidContentLength | Self::UnsupportedVersion(_) => StatusCode::BadRequest,
            Self::MalformedChunk => StatusCode::BadRequest,
            Self::UnsupportedMethod(_) | Self::UnsupportedTransferEncoding(_) => {
                StatusCode::NotImplemented
            }
            Self::HeadTooLarge | Self::BodyTooLarge(_) => StatusCode::PayloadTooLarge,
        }
    }
}

#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

#[derive(Debug, PartialEq)]
struct Head {
    method: Method,
    path: String,
    query: Option<String>,
    headers: Vec<(String, String)>,
    body: BodyFraming,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum BodyFraming {
    Length(usize),
    Chunked,
}

#[derive(Debug, PartialEq, Eq)]
enum Chunk {
    Data(Range<usize>),
    Last,
}

impl Request {
    /// header lookup, case insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Lookup order: urlencoded body, query string, multipart body.
    /// Bodies count only for POST, PUT and PATCH.
    pub fn form_value(&self, key: &str) -> Option<String> {
        let content_type = match self.header("content-type") {
            Some(ct) if self.method.has_form_body() => ct,
            _ => return self.query_value(key),
        };

        match form::mime_type(content_type).as_str() {
            FORM_CONTENT_TYPE => {
                form::urlencoded_value(&self.body, key).or_else(|| self.query_value(key))
            }
            // multipart fields are appended after the query ones, so the query wins
            MULTIPART_CONTENT_TYPE => self.query_value(key).or_else(|| {
                form::boundary(content_type)
                    .and_then(|b| form::multipart_value(&self.body, &b, key))
            }),
            _ => self.query_value(key),
        }
    }

    fn query_value(&self, key: &str) -> Option<String> {
        self.query
            .as_deref()
            .and_then(|q| form::urlencoded_value(q.as_bytes(), key))
    }
}

fn find_header<'h>(headers: &'h [(String, String)], name: &str) -> Option<&'h str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Reads one request. The whole body is buffered.
pub async fn read_request<R>(src: &mut R) -> Result<Request, HttpError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(4096);

    let (head, head_len) = loop {
        if let Some(found) = parse_head(&buf)? {
            break found;
        }
        if src.read_buf(&mut buf).await? == 0 {
            return Err(HttpError::UnexpectedEof);
        }
    };

    buf.advance(head_len);
    let body = match head.body {
        BodyFraming::Length(len) => read_sized_body(src, buf, len).await?,
        BodyFraming::Chunked => read_chunked_body(src, buf).await?,
    };

    Ok(Request {
        method: head.method,
        path: head.path,
        query: head.query,
        headers: head.headers,
        body,
    })
}

async fn read_sized_body<R>(src: &mut R, mut buf: BytesMut, len: usize) -> Result<Bytes, HttpError>
where
    R: AsyncRead + Unpin,
{
    while buf.len() < len {
        buf.reserve(len - buf.len());
        if src.read_buf(&mut buf).await? == 0 {
            return Err(HttpError::UnexpectedEof);
        }
    }
    Ok(buf.split_to(len).freeze())
}

async fn read_chunked_body<R>(src: &mut R, mut buf: BytesMut) -> Result<Bytes, HttpError>
where
    R: AsyncRead + Unpin,
{
    let mut body = BytesMut::new();

    loop {
        match parse_chunk(&buf)? {
            Some((Chunk::Data(range), used)) => {
                if body.len() + range.len() > MAX_BODY_LEN {
                    return Err(HttpError::BodyTooLarge(body.len() + range.len()));
                }
                body.put_slice(&buf[range]);
                buf.advance(used);
            }
            Some((Chunk::Last, _)) => return Ok(body.freeze()),
            None => {
                if buf.len() > MAX_BODY_LEN + MAX_CHUNK_LINE_LEN {
                    return Err(HttpError::BodyTooLarge(buf.len()));
                }
                if src.read_buf(&mut buf).await? == 0 {
                    return Err(HttpError::UnexpectedEof);
                }
            }
        }
    }
}

/// returns Chunk when found one, or None if not enough data.
/// Chunk extensions and trailers are skipped.
fn parse_chunk(buf: &[u8]) -> Result<Option<(Chunk, usize)>, HttpError> {
    let line_end = match buf.windows(2).position(|w| w == b"\r\n") {
        Some(i) => i,
        None if buf.len() > MAX_CHUNK_LINE_LEN => return Err(HttpError::MalformedChunk),
        None => return Ok(None),
    };

    let size_field = match buf[..line_end].iter().position(|b| *b == b';') {
        Some(i) => &buf[..i],
        None => &buf[..line_end],
    };
    let size_field = size_field.trim_ascii();
    let (maybe_size, used) = usize::from_radix_16_checked(size_field);
    let size = match maybe_size {
        Some(size) if used == size_field.len() && used > 0 => size,
        _ => return Err(HttpError::MalformedChunk),
    };

    let data_start = line_end + 2;
    if size == 0 {
        // no trailers: the empty line follows right away
        if buf[data_start..].starts_with(b"\r\n") {
            return Ok(Some((Chunk::Last, data_start + 2)));
        }
        return match buf[line_end..].windows(4).position(|w| w == b"\r\n\r\n") {
            Some(i) => Ok(Some((Chunk::Last, line_end + i + 4))),
            None => Ok(None),
        };
    }

    let data_end = data_start
        .checked_add(size)
        .ok_or(HttpError::MalformedChunk)?;
    if buf.len() < data_end + 2 {
        return Ok(None);
    }
    if &buf[data_end..data_end + 2] != b"\r\n" {
        return Err(HttpError::MalformedChunk);
    }
    Ok(Some((Chunk::Data(data_start..data_end), data_end + 2)))
}

/// returns Head when found one, or None if not enough data
fn parse_head(buf: &[u8]) -> Result<Option<(Head, usize)>, HttpError> {
    let end = match buf.windows(4).position(|w| w == b"\r\n\r\n") {
        Some(end) => end,
        None if buf.len() > MAX_HEAD_LEN => return Err(HttpError::HeadTooLarge),
        None => return Ok(None),
    };
    if end > MAX_HEAD_LEN {
        return Err(HttpError::HeadTooLarge);
    }

    let text = std::str::from_utf8(&buf[..end]).map_err(|_| HttpError::MalformedRequestLine)?;
    let mut lines = text.split("\r\n");

    let request_line = lines.next().ok_or(HttpError::MalformedRequestLine)?;
    let mut parts = request_line.split(' ');
    let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next())
    {
        (Some(m), Some(t), Some(v), None) => (m, t, v),
        _ => return Err(HttpError::MalformedRequestLine),
    };

    let method =
        Method::from_str(method).map_err(|_| HttpError::UnsupportedMethod(method.to_owned()))?;
    if version != "HTTP/1.1" && version != "HTTP/1.0" {
        return Err(HttpError::UnsupportedVersion(version.to_owned()));
    }
    if !target.starts_with('/') {
        return Err(HttpError::MalformedRequestLine);
    }
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
        None => (target.to_owned(), None),
    };

    let mut headers = Vec::new();
    for (i, line) in lines.enumerate() {
        let (name, value) = line
            .split_once(':')
            .ok_or(HttpError::MalformedHeader(i + 1))?;
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(HttpError::MalformedHeader(i + 1));
        }
        headers.push((name.to_owned(), value.trim().to_owned()));
    }

    // transfer-encoding overrides content-length
    let body = match find_header(&headers, "transfer-encoding") {
        Some(te) if te.eq_ignore_ascii_case("chunked") => BodyFraming::Chunked,
        Some(te) => return Err(HttpError::UnsupportedTransferEncoding(te.to_owned())),
        None => BodyFraming::Length(parse_content_length(&headers)?),
    };

    Ok(Some((
        Head {
            method,
            path,
            query,
            headers,
            body,
        },
        end + 4,
    )))
}

fn parse_content_length(headers: &[(String, String)]) -> Result<usize, HttpError> {
    let content_length = match find_header(headers, "content-length") {
        Some(v) => match atoi::atoi::<usize>(v.as_bytes()) {
            Some(len) if len.to_string() == v => len,
            _ => return Err(HttpError::InvalidContentLength),
        },
        None => 0,
    };
    if content_length > MAX_BODY_LEN {
        return Err(HttpError::BodyTooLarge(content_length));
    }
    Ok(content_length)
}

#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    headers: Vec<(&'static str, String)>,
    body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode) -> Response {
        Response {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Response {
        match serde_json::to_vec(value) {
            Ok(body) => Response::new(status).with_body("application/json", body),
            Err(e) => Response::text(StatusCode::InternalServerError, e.to_string()),
        }
    }

    pub fn text(status: StatusCode, msg: impl Into<String>) -> Response {
        let mut msg = msg.into();
        msg.push('\n');
        Response::new(status).with_body("text/plain; charset=utf-8", msg)
    }

    pub fn with_body(self, content_type: &str, body: impl Into<Bytes>) -> Response {
        Response {
            body: body.into(),
            ..self
        }
        .header("Content-Type", content_type)
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Response {
        self.headers.push((name, value.into()));
        self
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// HEAD responses keep the Content-Length of the body they leave out
    pub fn to_bytes(&self, head_only: bool) -> BytesMut {
        let mut out = BytesMut::with_capacity(128 + self.body.len());
        out.put_slice(format!("HTTP/1.1 {}\r\n", self.status).as_bytes());
        for (name, value) in &self.headers {
            out.put_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        out.put_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        out.put_slice(b"Connection: close\r\n\r\n");
        if !head_only {
            out.put_slice(&self.body);
        }
        out
    }
}
