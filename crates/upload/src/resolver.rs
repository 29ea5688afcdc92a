//! Destination resolution.
//!
//! The first segment of the destination may name a folder somebody shared
//! with the signed-in user, or a folder in the user's own drive root. Shared
//! folders live on another drive, so they must be addressed through the
//! owning drive rather than as a plain path below `root`.

use driveup_protocol::constants::LOOKUP_LIMIT;
use driveup_protocol::{LookupScope, RemoteAddress, RemoteRoot};
use driveup_transfer::{encode_path, join_remote_path};
use tracing::{debug, info};

use crate::error::UploadError;
use crate::store::RemoteStore;

/// Maps source-relative paths to remote addresses under one resolved root.
///
/// Built once per run by [`resolve_destination`] and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocatorFactory {
    root: RemoteRoot,
    prefix: Option<String>,
}

impl RemoteLocatorFactory {
    pub fn new(root: RemoteRoot, prefix: Option<String>) -> Self {
        let prefix = prefix.filter(|p| !p.trim_matches(['/', '\\']).is_empty());
        Self { root, prefix }
    }

    pub fn root(&self) -> &RemoteRoot {
        &self.root
    }

    /// Unescaped path every located item is placed under.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Builds the escaped address of `relative` below the prefix.
    pub fn locate(&self, relative: &str) -> RemoteAddress {
        RemoteAddress {
            root: self.root.clone(),
            path: encode_path(&join_remote_path(self.prefix.as_deref(), relative)),
        }
    }
}

/// Resolves `destination` into a [`RemoteLocatorFactory`].
///
/// Looks up the first path segment among shared items and drive-root
/// children at the same time. One match mounts that item with the remaining
/// segments as prefix. No match means the whole destination is a path in the
/// user's own drive. More than one match is ambiguous and fails.
pub async fn resolve_destination(
    store: &dyn RemoteStore,
    destination: &str,
) -> Result<RemoteLocatorFactory, UploadError> {
    let destination = destination.trim_matches(['/', '\\']);
    let (first, rest) = split_first_segment(destination);

    if first.is_empty() {
        info!("uploading into drive root");
        return Ok(RemoteLocatorFactory::new(RemoteRoot::MyDrive, None));
    }

    let (shared, children) = tokio::try_join!(
        store.lookup_by_name(LookupScope::SharedWithMe, first, LOOKUP_LIMIT),
        store.lookup_by_name(LookupScope::DriveRoot, first, LOOKUP_LIMIT),
    )?;

    debug!(
        name = first,
        shared = shared.len(),
        root_children = children.len(),
        "destination lookup complete"
    );

    let mut matches = shared.into_iter().chain(children);
    let Some(item) = matches.next() else {
        info!(destination, "no shared or root item matched; using own drive");
        return Ok(RemoteLocatorFactory::new(
            RemoteRoot::MyDrive,
            Some(destination.to_string()),
        ));
    };
    if matches.next().is_some() {
        return Err(UploadError::AmbiguousDestination(first.to_string()));
    }

    let root = item.mount_root();
    info!(name = first, root = %root, "destination mounted through existing item");
    Ok(RemoteLocatorFactory::new(root, rest.map(str::to_string)))
}

/// Splits on the first `/` or `\`.
fn split_first_segment(path: &str) -> (&str, Option<&str>) {
    match path.split_once(['/', '\\']) {
        Some((first, rest)) => (first, Some(rest)),
        None => (path, None),
    }
}
