//! Behaviour every backend must show, run against each implementation.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::coordinate::Coordinate;
use crate::error::ErrorKind;
use crate::info::VersionInfo;
use crate::store::{Backend, NewVersion};
use crate::version::Version;

pub(crate) type Factory<'a> = &'a dyn Fn() -> Box<dyn Backend>;

pub(crate) fn payload(version: &Version, archive: &[u8]) -> NewVersion {
    payload_owned(version, archive.to_vec())
}

pub(crate) fn payload_owned(version: &Version, archive: Vec<u8>) -> NewVersion {
    NewVersion {
        info: VersionInfo::now(version),
        manifest: b"module example.com/foo".to_vec(),
        archive,
    }
}

fn coord() -> Coordinate {
    Coordinate::parse("example.com/foo").unwrap()
}

fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

pub(crate) fn run_all(factory: Factory<'_>) {
    round_trip(factory());
    publish_once(factory());
    list_is_sorted(factory());
    unknown_coordinate(factory());
    unknown_version(factory());
    invalid_payload_not_listed(factory());
    concurrent_distinct_versions(factory());
    concurrent_same_version(factory());
    readers_never_see_partial_versions(factory());
}

fn round_trip(backend: Box<dyn Backend>) {
    let version = v("v1.0.0");
    let archive = b"PK\x03\x04 archive bytes".to_vec();
    backend
        .put_version(&coord(), &version, payload(&version, &archive))
        .unwrap();

    assert_eq!(backend.list_versions(&coord()).unwrap(), vec![version.clone()]);
    assert_eq!(backend.info(&coord(), &version).unwrap().version, "v1.0.0");
    assert_eq!(
        backend.manifest(&coord(), &version).unwrap(),
        b"module example.com/foo"
    );
    let fetched = backend.archive(&coord(), &version).unwrap();
    assert_eq!(fetched.len, archive.len() as u64);
    assert_eq!(fetched.into_bytes().unwrap(), archive);
    assert!(backend.exists(&coord(), &version).unwrap());
}

fn publish_once(backend: Box<dyn Backend>) {
    let version = v("v1.0.0");
    backend
        .put_version(&coord(), &version, payload(&version, b"first"))
        .unwrap();
    let original_info = backend.info(&coord(), &version).unwrap();

    let err = backend
        .put_version(&coord(), &version, payload(&version, b"second"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    let archive = backend.archive(&coord(), &version).unwrap();
    assert_eq!(archive.into_bytes().unwrap(), b"first");
    assert_eq!(backend.info(&coord(), &version).unwrap(), original_info);
    assert_eq!(backend.list_versions(&coord()).unwrap().len(), 1);
}

fn list_is_sorted(backend: Box<dyn Backend>) {
    for s in ["v2.0.0", "v1.0.0", "v1.10.0", "v1.2.0", "v1.0.0-rc.1"] {
        let version = v(s);
        backend
            .put_version(&coord(), &version, payload(&version, b"zip"))
            .unwrap();
    }
    let listed: Vec<String> = backend
        .list_versions(&coord())
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        listed,
        vec!["v1.0.0-rc.1", "v1.0.0", "v1.2.0", "v1.10.0", "v2.0.0"]
    );
}

fn unknown_coordinate(backend: Box<dyn Backend>) {
    let err = backend.list_versions(&coord()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(!backend.exists(&coord(), &v("v1.0.0")).unwrap());
}

fn unknown_version(backend: Box<dyn Backend>) {
    let version = v("v1.0.0");
    backend
        .put_version(&coord(), &version, payload(&version, b"zip"))
        .unwrap();

    let missing = v("v9.9.9");
    assert_eq!(
        backend.info(&coord(), &missing).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        backend.manifest(&coord(), &missing).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        backend.archive(&coord(), &missing).unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

fn invalid_payload_not_listed(backend: Box<dyn Backend>) {
    let version = v("v1.0.0");
    let mut bad = payload(&version, b"zip");
    bad.manifest.clear();
    let err = backend.put_version(&coord(), &version, bad).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
    assert_eq!(
        backend.list_versions(&coord()).unwrap_err().kind(),
        ErrorKind::NotFound
    );

    let mismatched = payload(&v("v2.0.0"), b"zip");
    let err = backend
        .put_version(&coord(), &version, mismatched)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
}

fn concurrent_distinct_versions(backend: Box<dyn Backend>) {
    let backend = &*backend;
    std::thread::scope(|s| {
        for i in 0..16 {
            s.spawn(move || {
                let version = v(&format!("v1.{i}.0"));
                let archive = format!("archive {i}").into_bytes();
                backend
                    .put_version(&coord(), &version, payload(&version, &archive))
                    .unwrap();
            });
        }
    });

    let listed = backend.list_versions(&coord()).unwrap();
    assert_eq!(listed.len(), 16);
    for i in 0..16 {
        let version = v(&format!("v1.{i}.0"));
        let archive = backend.archive(&coord(), &version).unwrap();
        assert_eq!(archive.into_bytes().unwrap(), format!("archive {i}").into_bytes());
    }
}

fn concurrent_same_version(backend: Box<dyn Backend>) {
    let backend = &*backend;
    let version = v("v1.0.0");
    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let version = version.clone();
                s.spawn(move || {
                    let archive = format!("writer {i}").into_bytes();
                    backend
                        .put_version(&coord(), &version, payload(&version, &archive))
                        .map(|()| archive)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    for loser in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(loser.kind(), ErrorKind::AlreadyExists);
    }

    let stored = backend.archive(&coord(), &version).unwrap();
    assert_eq!(&stored.into_bytes().unwrap(), winners[0]);
}

fn readers_never_see_partial_versions(backend: Box<dyn Backend>) {
    let backend = &*backend;
    let done = AtomicBool::new(false);
    std::thread::scope(|s| {
        let done = &done;
        s.spawn(move || {
            for i in 0..40 {
                let version = v(&format!("v0.{i}.0"));
                let archive = vec![i as u8; 4096];
                backend
                    .put_version(&coord(), &version, payload(&version, &archive))
                    .unwrap();
            }
            done.store(true, Ordering::SeqCst);
        });

        s.spawn(move || loop {
            let finished = done.load(Ordering::SeqCst);
            if let Ok(listed) = backend.list_versions(&coord()) {
                for version in listed {
                    backend.info(&coord(), &version).unwrap();
                    backend.manifest(&coord(), &version).unwrap();
                    let archive = backend.archive(&coord(), &version).unwrap();
                    assert_eq!(archive.into_bytes().unwrap().len(), 4096);
                }
            }
            if finished {
                break;
            }
        });
    });
}
