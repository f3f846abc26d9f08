//! Protocol responses, independent of any HTTP framework.

use std::io;

use modprox_storage::Archive;

use crate::error::ProtocolError;

/// Content type of list, manifest and error bodies.
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
/// Content type of info and upload confirmation bodies.
pub const APPLICATION_JSON: &str = "application/json";
/// Content type of archive bodies.
pub const APPLICATION_ZIP: &str = "application/zip";

/// Response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
    Conflict,
    PayloadTooLarge,
    ServiceUnavailable,
}

impl Status {
    /// The HTTP status code.
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::Conflict => 409,
            Status::PayloadTooLarge => 413,
            Status::ServiceUnavailable => 503,
        }
    }

    /// Whether this is a success status.
    pub fn is_success(self) -> bool {
        self == Status::Ok
    }
}

/// Response payload.
#[derive(Debug)]
pub enum ResponseBody {
    /// A small body held in memory.
    Bytes(Vec<u8>),
    /// An archive to be streamed to the client.
    Stream(Archive),
}

/// A complete protocol response.
#[derive(Debug)]
pub struct ProxyResponse {
    pub status: Status,
    pub content_type: &'static str,
    pub body: ResponseBody,
}

impl ProxyResponse {
    /// A `200` response with an in-memory body.
    pub fn ok(content_type: &'static str, body: Vec<u8>) -> Self {
        ProxyResponse {
            status: Status::Ok,
            content_type,
            body: ResponseBody::Bytes(body),
        }
    }

    /// A `200` response streaming an archive.
    pub fn archive(archive: Archive) -> Self {
        ProxyResponse {
            status: Status::Ok,
            content_type: APPLICATION_ZIP,
            body: ResponseBody::Stream(archive),
        }
    }

    /// The error response for `err`: its status and its message as text.
    pub fn from_error(err: &ProtocolError) -> Self {
        ProxyResponse {
            status: err.status(),
            content_type: TEXT_PLAIN,
            body: ResponseBody::Bytes(format!("{err}\n").into_bytes()),
        }
    }

    /// Drain the body into memory.
    pub fn into_bytes(self) -> io::Result<Vec<u8>> {
        match self.body {
            ResponseBody::Bytes(bytes) => Ok(bytes),
            ResponseBody::Stream(archive) => archive.into_bytes(),
        }
    }
}
