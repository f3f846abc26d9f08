//! Module proxy protocol layer.
//!
//! Turns proxy requests into calls on the storage capabilities and storage
//! results into protocol responses. It holds no state of its own beyond the
//! injected store, sink and limits, so any backend works unchanged.
//!
//! Request shapes:
//!
//! | Request                                          | Route                |
//! |--------------------------------------------------|----------------------|
//! | `GET /{base_url}/{module}/@v/list`               | [`Route::List`]      |
//! | `GET /{base_url}/{module}/@v/{version}.info`     | [`Route::Artifact`]  |
//! | `GET /{base_url}/{module}/@v/{version}.mod`      | [`Route::Artifact`]  |
//! | `GET /{base_url}/{module}/@v/{version}.zip`      | [`Route::Artifact`]  |
//! | `GET /{base_url}/{module}/@latest`               | [`Route::Latest`]    |
//! | `POST /admin/upload/{base_url}/{module}/{version}` | [`Route::Upload`]  |

pub mod error;
pub mod resolver;
pub mod response;
pub mod route;
pub mod upload;

pub use error::{ProtocolError, Result};
pub use resolver::Resolver;
pub use response::{ProxyResponse, ResponseBody, Status};
pub use route::{ArtifactKind, Method, Route};
pub use upload::{Limits, Part, UploadForm};
