//! Request path parsing.
//!
//! Paths arrive with upper-case letters escaped (`!a` for `A`); elements are
//! unescaped before the coordinate and version are validated.

use std::fmt;

use modprox_storage::{unescape_path, Coordinate, Version};

use crate::error::{ProtocolError, Result};

/// The request methods the proxy answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
        })
    }
}

/// Per-version artifact kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// `{version}.info`
    Info,
    /// `{version}.mod`
    Mod,
    /// `{version}.zip`
    Zip,
}

impl ArtifactKind {
    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "info" => Some(ArtifactKind::Info),
            "mod" => Some(ArtifactKind::Mod),
            "zip" => Some(ArtifactKind::Zip),
            _ => None,
        }
    }
}

/// A parsed proxy request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `GET /{base_url}/{module}/@v/list`
    List { coordinate: Coordinate },
    /// `GET /{base_url}/{module}/@latest`
    Latest { coordinate: Coordinate },
    /// `GET /{base_url}/{module}/@v/{version}.{info,mod,zip}`
    Artifact {
        coordinate: Coordinate,
        version: Version,
        kind: ArtifactKind,
    },
    /// `POST /admin/upload/{base_url}/{module}/{version}`
    Upload {
        coordinate: Coordinate,
        version: Version,
    },
}

const UPLOAD_PREFIX: &str = "admin/upload/";

impl Route {
    /// Parse a request line.
    ///
    /// Unknown shapes are [`ProtocolError::NoRoute`]; known shapes with a
    /// malformed coordinate or version are `Invalid` storage errors.
    pub fn parse(method: Method, path: &str) -> Result<Route> {
        let no_route = || ProtocolError::NoRoute {
            method: method.to_string(),
            path: path.to_string(),
        };
        let rest = path.strip_prefix('/').ok_or_else(no_route)?;

        match method {
            Method::Post => {
                let rest = rest.strip_prefix(UPLOAD_PREFIX).ok_or_else(no_route)?;
                let (module_path, version) = rest.rsplit_once('/').ok_or_else(no_route)?;
                Ok(Route::Upload {
                    coordinate: parse_coordinate(module_path)?,
                    version: parse_version(version)?,
                })
            }
            Method::Get => {
                if let Some(module_path) = rest.strip_suffix("/@latest") {
                    return Ok(Route::Latest {
                        coordinate: parse_coordinate(module_path)?,
                    });
                }

                let (module_path, file) = rest.rsplit_once("/@v/").ok_or_else(no_route)?;
                if file == "list" {
                    return Ok(Route::List {
                        coordinate: parse_coordinate(module_path)?,
                    });
                }
                if file.contains('/') {
                    return Err(no_route());
                }
                let (version, ext) = file.rsplit_once('.').ok_or_else(no_route)?;
                let kind = ArtifactKind::from_extension(ext).ok_or_else(no_route)?;
                Ok(Route::Artifact {
                    coordinate: parse_coordinate(module_path)?,
                    version: parse_version(version)?,
                    kind,
                })
            }
        }
    }

    /// The coordinate the request is about.
    pub fn coordinate(&self) -> &Coordinate {
        match self {
            Route::List { coordinate }
            | Route::Latest { coordinate }
            | Route::Artifact { coordinate, .. }
            | Route::Upload { coordinate, .. } => coordinate,
        }
    }
}

fn parse_coordinate(escaped: &str) -> Result<Coordinate> {
    let path = unescape_path(escaped)?;
    Ok(Coordinate::parse(&path)?)
}

fn parse_version(escaped: &str) -> Result<Version> {
    let raw = unescape_path(escaped)?;
    Ok(Version::parse(&raw)?)
}
