//! The resolver: proxy routes in, storage calls out.

use std::sync::Arc;

use tracing::{debug, error, info};

use modprox_storage::{
    latest, Backend, Coordinate, ErrorKind, StorageError, Version, VersionSink, VersionStore,
};

use crate::error::{ProtocolError, Result};
use crate::response::{ProxyResponse, APPLICATION_JSON, TEXT_PLAIN};
use crate::route::{ArtifactKind, Route};
use crate::upload::{Limits, UploadForm};

/// Answers proxy requests against an injected store and sink.
///
/// Stateless across requests; share it behind an `Arc` and call it from as
/// many threads as needed.
#[derive(Clone)]
pub struct Resolver {
    store: Arc<dyn VersionStore>,
    sink: Arc<dyn VersionSink>,
    limits: Limits,
}

impl Resolver {
    /// Build a resolver from separate read and write capabilities.
    pub fn new(store: Arc<dyn VersionStore>, sink: Arc<dyn VersionSink>) -> Self {
        Resolver {
            store,
            sink,
            limits: Limits::default(),
        }
    }

    /// Build a resolver over one backend offering both capabilities.
    pub fn from_backend<B: Backend + 'static>(backend: Arc<B>) -> Self {
        let store: Arc<dyn VersionStore> = backend.clone();
        let sink: Arc<dyn VersionSink> = backend;
        Resolver::new(store, sink)
    }

    /// Replace the upload limits.
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// The upload limits in force.
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// An empty upload form governed by this resolver's limits.
    pub fn upload_form(&self) -> UploadForm {
        UploadForm::new(self.limits.clone())
    }

    /// Answer a read route.
    ///
    /// An [`Route::Upload`] carries no payload here and is answered with a
    /// bad request; uploads go through [`Resolver::upload`].
    pub fn resolve(&self, route: &Route) -> ProxyResponse {
        let result = match route {
            Route::List { coordinate } => self.list(coordinate),
            Route::Latest { coordinate } => self.latest(coordinate),
            Route::Artifact {
                coordinate,
                version,
                kind,
            } => self.artifact(coordinate, version, *kind),
            Route::Upload { .. } => Err(StorageError::invalid(
                "upload route requires a multipart payload",
            )
            .into()),
        };
        respond(route.coordinate(), result)
    }

    /// Commit an upload.
    pub fn upload(
        &self,
        coordinate: &Coordinate,
        version: &Version,
        form: UploadForm,
    ) -> ProxyResponse {
        let result = self.commit(coordinate, version, form);
        if result.is_ok() {
            info!(%coordinate, %version, "published version");
        }
        respond(coordinate, result)
    }

    fn list(&self, coordinate: &Coordinate) -> Result<ProxyResponse> {
        let versions = self.store.list_versions(coordinate)?;
        let body: String = versions.iter().map(|v| format!("{v}\n")).collect();
        Ok(ProxyResponse::ok(TEXT_PLAIN, body.into_bytes()))
    }

    fn latest(&self, coordinate: &Coordinate) -> Result<ProxyResponse> {
        let versions = self.store.list_versions(coordinate)?;
        let newest = latest(&versions)
            .ok_or_else(|| StorageError::module_not_found(coordinate))?;
        let info = self.store.info(coordinate, newest)?;
        Ok(ProxyResponse::ok(APPLICATION_JSON, info.to_json()?))
    }

    fn artifact(
        &self,
        coordinate: &Coordinate,
        version: &Version,
        kind: ArtifactKind,
    ) -> Result<ProxyResponse> {
        match kind {
            ArtifactKind::Info => {
                let info = self.store.info(coordinate, version)?;
                Ok(ProxyResponse::ok(APPLICATION_JSON, info.to_json()?))
            }
            ArtifactKind::Mod => {
                let manifest = self.store.manifest(coordinate, version)?;
                Ok(ProxyResponse::ok(TEXT_PLAIN, manifest))
            }
            ArtifactKind::Zip => {
                let archive = self.store.archive(coordinate, version)?;
                Ok(ProxyResponse::archive(archive))
            }
        }
    }

    fn commit(
        &self,
        coordinate: &Coordinate,
        version: &Version,
        form: UploadForm,
    ) -> Result<ProxyResponse> {
        let artifacts = form.into_new_version(version)?;
        self.sink.put_version(coordinate, version, artifacts)?;

        let body = serde_json::json!({
            "module": coordinate.to_string(),
            "version": version.to_string(),
        });
        Ok(ProxyResponse::ok(APPLICATION_JSON, body.to_string().into_bytes()))
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

fn respond(coordinate: &Coordinate, result: Result<ProxyResponse>) -> ProxyResponse {
    match result {
        Ok(response) => response,
        Err(err) => {
            match &err {
                ProtocolError::Storage(e) if e.kind() == ErrorKind::BackendUnavailable => {
                    error!(%coordinate, error = %e, "storage backend failure");
                }
                _ => debug!(%coordinate, error = %err, "request rejected"),
            }
            ProxyResponse::from_error(&err)
        }
    }
}
