use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A local file selected for upload.
///
/// Produced once by directory enumeration and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub full_path: PathBuf,
    /// Path relative to the source directory, `/`-separated.
    pub relative_path: String,
    pub length: u64,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub accessed: DateTime<Utc>,
}

/// Root a [`RemoteAddress`] is resolved against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RemoteRoot {
    /// Root folder of the signed-in user's own drive.
    MyDrive,
    /// An item mounted by name, possibly living on another user's drive.
    Item {
        drive_id: Option<String>,
        item_id: String,
    },
}

impl fmt::Display for RemoteRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteRoot::MyDrive => f.write_str("me/drive/root"),
            RemoteRoot::Item {
                drive_id: Some(drive_id),
                item_id,
            } => write!(f, "drives/{drive_id}/items/{item_id}"),
            RemoteRoot::Item {
                drive_id: None,
                item_id,
            } => write!(f, "me/drive/items/{item_id}"),
        }
    }
}

/// Escaped, path-addressed location of one remote item.
///
/// The item does not need to exist yet; creating an upload session at the
/// address creates it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteAddress {
    pub root: RemoteRoot,
    /// Escaped `/`-separated path below `root`, without a leading separator.
    pub path: String,
}

impl fmt::Display for RemoteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:/{}:", self.root, self.path)
    }
}

/// Collection searched by a by-name lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupScope {
    /// Items other users have shared with the signed-in user.
    SharedWithMe,
    /// Direct children of the signed-in user's drive root.
    DriveRoot,
}

/// An item returned by a by-name lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteItem {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_item: Option<RemoteItemReference>,
}

/// Pointer from a shared item or shortcut to the item it stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteItemReference {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_reference: Option<ItemParent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemParent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_id: Option<String>,
}

impl RemoteItem {
    /// Returns the root this item mounts.
    ///
    /// Shared items and shortcuts resolve to the owning drive and item they
    /// reference; a plain folder resolves to itself on the caller's drive.
    pub fn mount_root(&self) -> RemoteRoot {
        match &self.remote_item {
            Some(remote) => RemoteRoot::Item {
                drive_id: remote
                    .parent_reference
                    .as_ref()
                    .and_then(|p| p.drive_id.clone()),
                item_id: remote.id.clone(),
            },
            None => RemoteRoot::Item {
                drive_id: None,
                item_id: self.id.clone(),
            },
        }
    }
}
