//! End-to-end proxy scenarios against both shipped backends.

use std::sync::Arc;

use modprox_protocol::{Method, ProxyResponse, Resolver, Route, Status};
use modprox_storage::{DiskStore, MemoryStore};

fn get(resolver: &Resolver, path: &str) -> ProxyResponse {
    match Route::parse(Method::Get, path) {
        Ok(route) => resolver.resolve(&route),
        Err(err) => ProxyResponse::from_error(&err),
    }
}

fn post(resolver: &Resolver, path: &str, parts: &[(&str, &[u8])]) -> ProxyResponse {
    let route = match Route::parse(Method::Post, path) {
        Ok(route) => route,
        Err(err) => return ProxyResponse::from_error(&err),
    };
    let Route::Upload {
        coordinate,
        version,
    } = route
    else {
        panic!("not an upload route: {path}");
    };
    let mut form = resolver.upload_form();
    for (name, data) in parts {
        if let Err(err) = form.add_named(name, data.to_vec()) {
            return ProxyResponse::from_error(&err);
        }
    }
    resolver.upload(&coordinate, &version, form)
}

fn body(response: ProxyResponse) -> Vec<u8> {
    response.into_bytes().unwrap()
}

const ARCHIVE: &[u8] = b"PK\x03\x04\x14\x00 example archive bytes";

fn upload_foo(resolver: &Resolver, archive: &[u8]) -> ProxyResponse {
    post(
        resolver,
        "/admin/upload/example.com/foo/v1.0.0",
        &[
            ("info", br#"{"version":"v1.0.0"}"#),
            ("mod", b"module example.com/foo"),
            ("zip", archive),
        ],
    )
}

fn upload_then_fetch(resolver: Resolver) {
    let response = upload_foo(&resolver, ARCHIVE);
    assert_eq!(response.status, Status::Ok);

    assert_eq!(body(get(&resolver, "/example.com/foo/@v/list")), b"v1.0.0\n");
    assert_eq!(
        body(get(&resolver, "/example.com/foo/@v/v1.0.0.mod")),
        b"module example.com/foo"
    );
    assert_eq!(body(get(&resolver, "/example.com/foo/@v/v1.0.0.zip")), ARCHIVE);

    let info: serde_json::Value =
        serde_json::from_slice(&body(get(&resolver, "/example.com/foo/@v/v1.0.0.info"))).unwrap();
    assert_eq!(info["Version"], "v1.0.0");
}

fn reupload_is_rejected(resolver: Resolver) {
    assert_eq!(upload_foo(&resolver, ARCHIVE).status, Status::Ok);

    let again = upload_foo(&resolver, b"PK different bytes");
    assert_eq!(again.status, Status::Conflict);

    assert_eq!(body(get(&resolver, "/example.com/foo/@v/v1.0.0.zip")), ARCHIVE);
    assert_eq!(body(get(&resolver, "/example.com/foo/@v/list")), b"v1.0.0\n");
}

fn unknowns_are_not_found(resolver: Resolver) {
    assert_eq!(
        get(&resolver, "/example.com/foo/@v/list").status,
        Status::NotFound
    );
    upload_foo(&resolver, ARCHIVE);
    for path in [
        "/example.com/foo/@v/v2.0.0.info",
        "/example.com/foo/@v/v2.0.0.mod",
        "/example.com/foo/@v/v2.0.0.zip",
        "/example.com/bar/@v/v1.0.0.mod",
    ] {
        assert_eq!(get(&resolver, path).status, Status::NotFound, "{path}");
    }
}

fn incomplete_upload_is_invisible(resolver: Resolver) {
    let response = post(
        &resolver,
        "/admin/upload/example.com/foo/v1.0.0",
        &[("info", b"{}"), ("zip", ARCHIVE)],
    );
    assert_eq!(response.status, Status::BadRequest);
    assert_eq!(
        get(&resolver, "/example.com/foo/@v/list").status,
        Status::NotFound
    );
    assert_eq!(
        get(&resolver, "/example.com/foo/@v/v1.0.0.zip").status,
        Status::NotFound
    );
}

fn concurrent_uploads_all_land(resolver: Resolver) {
    let resolver = &resolver;
    std::thread::scope(|s| {
        for minor in 0..8 {
            s.spawn(move || {
                let version = format!("v1.{minor}.0");
                let info = format!(r#"{{"Version":"{version}"}}"#);
                let response = post(
                    resolver,
                    &format!("/admin/upload/example.com/foo/{version}"),
                    &[
                        ("info", info.as_bytes()),
                        ("mod", b"module example.com/foo"),
                        ("zip", version.as_bytes()),
                    ],
                );
                assert_eq!(response.status, Status::Ok);
            });
        }
    });

    let listed = String::from_utf8(body(get(resolver, "/example.com/foo/@v/list"))).unwrap();
    let expected: String = (0..8).map(|minor| format!("v1.{minor}.0\n")).collect();
    assert_eq!(listed, expected);
    for minor in 0..8 {
        let version = format!("v1.{minor}.0");
        assert_eq!(
            body(get(resolver, &format!("/example.com/foo/@v/{version}.zip"))),
            version.as_bytes()
        );
    }
}

fn run(scenario: fn(Resolver)) {
    scenario(Resolver::from_backend(Arc::new(MemoryStore::new())));

    let dir = tempfile::tempdir().unwrap();
    let disk = DiskStore::open(dir.path()).unwrap();
    scenario(Resolver::from_backend(Arc::new(disk)));
}

#[test]
fn upload_then_fetch_round_trips() {
    run(upload_then_fetch);
}

#[test]
fn reupload_keeps_original_artifacts() {
    run(reupload_is_rejected);
}

#[test]
fn unknown_coordinates_and_versions() {
    run(unknowns_are_not_found);
}

#[test]
fn incomplete_uploads_are_rejected() {
    run(incomplete_upload_is_invisible);
}

#[test]
fn concurrent_uploads_of_distinct_versions() {
    run(concurrent_uploads_all_land);
}

#[test]
fn disk_store_serves_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let resolver = Resolver::from_backend(Arc::new(DiskStore::open(dir.path()).unwrap()));
        assert_eq!(upload_foo(&resolver, ARCHIVE).status, Status::Ok);
    }
    let resolver = Resolver::from_backend(Arc::new(DiskStore::open(dir.path()).unwrap()));
    assert_eq!(body(get(&resolver, "/example.com/foo/@v/v1.0.0.zip")), ARCHIVE);
    assert_eq!(upload_foo(&resolver, ARCHIVE).status, Status::Conflict);
}
