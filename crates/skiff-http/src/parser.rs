//! Streaming wire parser adapters.
//!
//! `httparse` handles the byte-to-token grammar; the adapters here own
//! buffering across reads, body framing by content length, and turning a
//! parsed head plus body into one discrete message. Back-to-back pipelined
//! messages in a single read buffer come out one `poll` call at a time.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

use crate::request::{Method, Request, Version};

/// Maximum number of header fields accepted per message.
const MAX_HEADERS: usize = 64;

/// Error while parsing an HTTP message stream.
///
/// Any parse error is fatal for the connection that produced the bytes:
/// the stream can no longer be trusted to be in sync.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("malformed message head: {0}")]
    Head(#[from] httparse::Error),
    #[error("unsupported method \"{0}\"")]
    UnsupportedMethod(String),
    #[error("unsupported protocol version")]
    UnsupportedVersion,
    #[error("invalid content-length header")]
    InvalidContentLength,
}

/// Streaming parser turning raw transport bytes into discrete requests.
#[derive(Default)]
pub struct RequestParser {
    buffer: BytesMut,
    state: ParseState,
}

#[derive(Default)]
enum ParseState {
    #[default]
    Head,
    Body {
        head: MessageHead,
        body: BytesMut,
        remaining: usize,
    },
}

struct MessageHead {
    method: Method,
    target: String,
    headers: Vec<(String, String)>,
    version: Version,
}

impl RequestParser {
    /// Consume transport bytes into the parser.
    pub fn consume(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Advance parsing and return the next completed request.
    ///
    /// Call repeatedly after [`consume`](Self::consume) until it returns
    /// `None`: one read burst can hold several pipelined messages.
    pub fn poll_request(&mut self) -> Result<Option<Request>, ParseError> {
        loop {
            match std::mem::take(&mut self.state) {
                ParseState::Head => {
                    let Some(head) = self.parse_head()? else {
                        return Ok(None);
                    };

                    let remaining = content_length(&head.headers)?;
                    self.state = ParseState::Body {
                        head,
                        body: BytesMut::new(),
                        remaining,
                    };
                }
                ParseState::Body {
                    head,
                    mut body,
                    mut remaining,
                } => {
                    let take = remaining.min(self.buffer.len());
                    body.extend_from_slice(&self.buffer[..take]);
                    self.buffer.advance(take);
                    remaining -= take;

                    if remaining > 0 {
                        self.state = ParseState::Body {
                            head,
                            body,
                            remaining,
                        };
                        return Ok(None);
                    }

                    // State is back at `Head` for the next pipelined message
                    let request = Request::new(
                        head.method,
                        head.target,
                        head.headers,
                        body.freeze(),
                        head.version,
                    );
                    return Ok(Some(request));
                }
            }
        }
    }

    fn parse_head(&mut self) -> Result<Option<MessageHead>, ParseError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Request::new(&mut headers);

        let consumed = match parsed.parse(&self.buffer)? {
            httparse::Status::Complete(consumed) => consumed,
            httparse::Status::Partial => return Ok(None),
        };

        let token = parsed.method.unwrap_or_default();
        let method = Method::parse(token)
            .ok_or_else(|| ParseError::UnsupportedMethod(token.to_string()))?;

        let version = match parsed.version {
            Some(0) => Version::Http10,
            Some(1) => Version::Http11,
            _ => return Err(ParseError::UnsupportedVersion),
        };

        let target = parsed.path.unwrap_or_default().to_string();

        let fields = parsed
            .headers
            .iter()
            .map(|header| {
                let value = String::from_utf8_lossy(header.value).into_owned();
                (header.name.to_string(), value)
            })
            .collect();

        self.buffer.advance(consumed);

        Ok(Some(MessageHead {
            method,
            target,
            headers: fields,
            version,
        }))
    }
}

/// Head of a parsed client-side response.
pub(crate) struct ResponseHead {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
}

/// Streaming parser for the single response of a one-shot fetch.
///
/// A response without a content length has no self-delimiting body; call
/// [`finish`](Self::finish) at end of input to complete it.
#[derive(Default)]
pub(crate) struct ResponseParser {
    buffer: BytesMut,
    state: ResponseState,
}

#[derive(Default)]
enum ResponseState {
    #[default]
    Head,
    Body {
        head: ResponseHead,
        body: BytesMut,
        remaining: Option<usize>,
    },
    Done,
}

impl ResponseParser {
    /// Consume transport bytes into the parser.
    pub fn consume(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Advance parsing and return the response once complete.
    pub fn poll_response(&mut self) -> Result<Option<(ResponseHead, Bytes)>, ParseError> {
        loop {
            match std::mem::take(&mut self.state) {
                ResponseState::Head => {
                    let Some(head) = self.parse_head()? else {
                        return Ok(None);
                    };

                    let remaining = response_content_length(&head.headers)?;
                    self.state = ResponseState::Body {
                        head,
                        body: BytesMut::new(),
                        remaining,
                    };
                }
                ResponseState::Body {
                    head,
                    mut body,
                    remaining,
                } => {
                    match remaining {
                        Some(remaining) => {
                            let take = remaining.min(self.buffer.len());
                            body.extend_from_slice(&self.buffer[..take]);
                            self.buffer.advance(take);
                            let remaining = remaining - take;

                            if remaining > 0 {
                                self.state = ResponseState::Body {
                                    head,
                                    body,
                                    remaining: Some(remaining),
                                };
                                return Ok(None);
                            }

                            self.state = ResponseState::Done;
                            return Ok(Some((head, body.freeze())));
                        }
                        None => {
                            // Without a content length only end of input
                            // delimits the body
                            body.extend_from_slice(&self.buffer);
                            self.buffer.clear();
                            self.state = ResponseState::Body {
                                head,
                                body,
                                remaining: None,
                            };
                            return Ok(None);
                        }
                    }
                }
                ResponseState::Done => {
                    self.state = ResponseState::Done;
                    return Ok(None);
                }
            }
        }
    }

    /// Complete an end-of-input delimited response, if one is in progress.
    pub fn finish(&mut self) -> Option<(ResponseHead, Bytes)> {
        match std::mem::take(&mut self.state) {
            ResponseState::Body {
                head,
                body,
                remaining: None,
            } => {
                self.state = ResponseState::Done;
                Some((head, body.freeze()))
            }
            _ => None,
        }
    }

    fn parse_head(&mut self) -> Result<Option<ResponseHead>, ParseError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Response::new(&mut headers);

        let consumed = match parsed.parse(&self.buffer)? {
            httparse::Status::Complete(consumed) => consumed,
            httparse::Status::Partial => return Ok(None),
        };

        let status = parsed.code.unwrap_or_default();
        let reason = parsed.reason.unwrap_or_default().to_string();

        let fields = parsed
            .headers
            .iter()
            .map(|header| {
                let value = String::from_utf8_lossy(header.value).into_owned();
                (header.name.to_string(), value)
            })
            .collect();

        self.buffer.advance(consumed);

        Ok(Some(ResponseHead {
            status,
            reason,
            headers: fields,
        }))
    }
}

fn content_length(headers: &[(String, String)]) -> Result<usize, ParseError> {
    match find_content_length(headers)? {
        Some(length) => Ok(length),
        None => Ok(0),
    }
}

fn response_content_length(headers: &[(String, String)]) -> Result<Option<usize>, ParseError> {
    find_content_length(headers)
}

fn find_content_length(headers: &[(String, String)]) -> Result<Option<usize>, ParseError> {
    let Some(value) = headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
        .map(|(_, value)| value)
    else {
        return Ok(None);
    };

    let length = value
        .trim()
        .parse()
        .map_err(|_| ParseError::InvalidContentLength)?;
    Ok(Some(length))
}
